//! Rewrites user-entered notation into the canonical infix grammar.
//!
//! Input usually comes from a LaTeX math field (`\frac{dy}{dx} = 2x\cdot y`)
//! but plain text (`2x*y`, `sin(x)y`, `x**2`) is accepted as well. The passes
//! run in a fixed order; later passes assume the earlier ones already ran.

use crate::equation_engine::{is_function_name, CONSTANTS, FUNCTIONS};
use crate::error::SyntaxError;
use serde::Serialize;
use std::fmt;

/// Normalized expression text, ready for [`compile`](crate::equation_engine::compile).
///
/// Only produced by [`normalize`], so every implicit multiplication is
/// explicit and no formatting commands remain.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct CanonicalExpression(String);

impl CanonicalExpression {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for CanonicalExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CanonicalExpression {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

const LAYOUT_COMMANDS: &[&str] = &[
    "left.",
    "right.",
    "displaystyle",
    "textstyle",
    "qquad",
    "quad",
    "left",
    "right",
    "bigl",
    "bigr",
    "Bigl",
    "Bigr",
    "big",
    "Big",
    ",",
    ";",
    ":",
    "!",
    " ",
];

/// Plain-text spellings of inverse functions, longest first.
const PLAIN_SPELLINGS: &[(&str, &str)] = &[
    ("arcsinh", "asinh"),
    ("arccosh", "acosh"),
    ("arctanh", "atanh"),
    ("arsinh", "asinh"),
    ("arcosh", "acosh"),
    ("artanh", "atanh"),
    ("arcsin", "asin"),
    ("arccos", "acos"),
    ("arctan", "atan"),
];

/// Command spellings that differ from the canonical function name.
const FUNCTION_ALIASES: &[(&str, &str)] = &[("lg", "log"), ("tg", "tan"), ("ctg", "cot")];

/// Normalizes raw equation text into a [`CanonicalExpression`].
///
/// If the text contains `=`, only the right-hand side of the last `=` is
/// kept so `dy/dx = x + y` is accepted as-is.
pub fn normalize(raw: &str) -> Result<CanonicalExpression, SyntaxError> {
    let text = right_hand_side(raw);
    let text = strip_layout(text);
    let text = rewrite_multiplication(&text);
    let text = rewrite_division(&text);
    let text = expand_groups(&text);
    let text = rewrite_delimiters(&text);
    let text = rewrite_functions(&text);
    let text = rewrite_constants(&text);
    let text = rewrite_exponents(&text);
    let text = drop_subscripts(&text);
    let text = drop_unknown_commands(&text);
    let text: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    let text = insert_implicit_multiplication(&text);
    let text = tidy_multiplication(&text);

    if text.is_empty() {
        return Err(SyntaxError::Empty);
    }
    if !text.chars().any(|c| c.is_ascii_alphanumeric()) {
        return Err(SyntaxError::Degenerate(text));
    }
    log::debug!("normalized {raw:?} -> {text:?}");
    Ok(CanonicalExpression(text))
}

fn right_hand_side(raw: &str) -> &str {
    raw.rsplit('=').next().unwrap_or(raw)
}

// --- Passes ---

fn strip_layout(input: &str) -> String {
    let mut text = unwrap_command(input, "operatorname", "\\");
    for command in ["mathrm", "textrm", "mathit", "text"] {
        text = unwrap_command(&text, command, "");
    }
    for command in LAYOUT_COMMANDS {
        text = replace_command(&text, command, "");
    }
    text.replace('~', " ")
}

fn rewrite_multiplication(input: &str) -> String {
    let mut text = input.replace("**", "^");
    for command in ["cdot", "times", "ast"] {
        text = replace_command(&text, command, "*");
    }
    text.replace(['·', '×', '⋅', '∙'], "*")
}

fn rewrite_division(input: &str) -> String {
    let text = replace_command(input, "div", "/");
    text.replace(['÷', '∕'], "/").replace(['−', '–'], "-")
}

/// Expands `\frac`, `\sqrt` and `\sqrt[n]` groups until none are left.
/// Each pass rewrites the outermost groups; nested ones are copied verbatim
/// and picked up by the next pass.
fn expand_groups(input: &str) -> String {
    let mut text = input.replace('√', "\\sqrt ");
    loop {
        let next = expand_groups_once(&text);
        if next == text {
            return text;
        }
        text = next;
    }
}

fn expand_groups_once(input: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(input.len());
    let mut i = 0;
    while i < chars.len() {
        if chars[i] != '\\' {
            out.push(chars[i]);
            i += 1;
            continue;
        }
        let (word, after) = read_command(&chars, i);
        match word.as_str() {
            "frac" | "dfrac" | "tfrac" | "cfrac" => {
                let numerator = read_argument(&chars, after);
                let denominator =
                    numerator.as_ref().and_then(|(_, next)| read_argument(&chars, *next));
                if let (Some((num, _)), Some((den, next))) = (numerator, denominator) {
                    out.push_str(&format!("(({num})/({den}))"));
                    i = next;
                    continue;
                }
            }
            "sqrt" => {
                let index_start = skip_spaces(&chars, after);
                if chars.get(index_start) == Some(&'[') {
                    let index = read_balanced(&chars, index_start, '[', ']');
                    let radicand = index.as_ref().and_then(|(_, next)| read_argument(&chars, *next));
                    if let (Some((n, _)), Some((radicand, next))) = (index, radicand) {
                        out.push_str(&format!("(({radicand})^(1/({n})))"));
                        i = next;
                        continue;
                    }
                } else if let Some((radicand, next)) = read_argument(&chars, after) {
                    out.push_str(&format!("sqrt({radicand})"));
                    i = next;
                    continue;
                }
            }
            _ => {}
        }
        out.push('\\');
        out.push_str(&word);
        i = after.max(i + 1);
    }
    out
}

fn rewrite_delimiters(input: &str) -> String {
    let mut text = input.to_string();
    for (command, replacement) in [
        ("{", "("),
        ("}", ")"),
        ("lbrace", "("),
        ("rbrace", ")"),
        ("lbrack", "("),
        ("rbrack", ")"),
        ("lvert", "|"),
        ("rvert", "|"),
        ("vert", "|"),
        ("mid", "|"),
    ] {
        text = replace_command(&text, command, replacement);
    }
    let text = text.replace(['{', '['], "(").replace(['}', ']'], ")");
    pair_absolute_values(&text)
}

/// Turns `|a|` into `abs(a)`. A bar closes the innermost open bar when it
/// sits at the same grouping depth and directly follows an operand.
fn pair_absolute_values(input: &str) -> String {
    let mut out = String::with_capacity(input.len() + 8);
    let mut open_bars: Vec<usize> = Vec::new();
    let mut depth = 0usize;
    for c in input.chars() {
        match c {
            '(' => {
                depth += 1;
                out.push(c);
            }
            ')' => {
                depth = depth.saturating_sub(1);
                out.push(c);
            }
            '|' => {
                if open_bars.last() == Some(&depth) && ends_operand(&out) {
                    open_bars.pop();
                    depth = depth.saturating_sub(1);
                    out.push(')');
                } else {
                    depth += 1;
                    open_bars.push(depth);
                    out.push_str("abs(");
                }
            }
            _ => out.push(c),
        }
    }
    out
}

fn rewrite_functions(input: &str) -> String {
    let mut text = input.to_string();
    for (spelling, canonical) in PLAIN_SPELLINGS {
        text = text.replace(spelling, canonical);
    }

    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;
    while i < chars.len() {
        if chars[i] != '\\' {
            out.push(chars[i]);
            i += 1;
            continue;
        }
        let (word, after) = read_command(&chars, i);
        match function_spelling(&word) {
            Some(name) => i = apply_function(&chars, after, name, &mut out),
            None => {
                out.push('\\');
                out.push_str(&word);
                i = after.max(i + 1);
            }
        }
    }
    out
}

/// Emits a function found at `start` and returns where scanning resumes.
///
/// Handles `\log_{10}`, `\sin^{-1}` (inverse), `\sin^2(x)` (power of the
/// call) and bare arguments such as `\sin x`.
fn apply_function(chars: &[char], start: usize, name: &'static str, out: &mut String) -> usize {
    let mut name = name;
    let mut i = skip_spaces(chars, start);

    if name == "log" && chars.get(i) == Some(&'_') {
        if let Some((base, next)) = read_argument(chars, i + 1) {
            let based = match base.trim() {
                "10" => Some("log10"),
                "2" => Some("log2"),
                "e" => Some("ln"),
                _ => None,
            };
            if let Some(based) = based {
                name = based;
                i = skip_spaces(chars, next);
            }
        }
    }

    let mut power = None;
    let mut cursor = i;
    if chars.get(i) == Some(&'^') {
        if let Some((exponent, next)) = read_argument(chars, i + 1) {
            match inverse_of(name) {
                Some(inverse) if exponent.trim() == "-1" => {
                    name = inverse;
                    i = skip_spaces(chars, next);
                    cursor = i;
                }
                _ => {
                    power = Some(exponent);
                    cursor = skip_spaces(chars, next);
                }
            }
        }
    }

    let argument = match chars.get(cursor) {
        Some('(') => read_argument(chars, cursor).map(|(inner, next)| (inner, next, true)),
        Some(_) => read_atom(chars, cursor).map(|(atom, next)| (atom, next, false)),
        None => None,
    };

    match (power, argument) {
        (None, Some((_, _, true))) | (_, None) => {
            out.push_str(name);
            i
        }
        (None, Some((atom, next, false))) => {
            out.push_str(&format!("{name}({})", rewrite_functions(&atom)));
            next
        }
        (Some(exponent), Some((argument, next, _))) => {
            out.push_str(&format!(
                "({name}({}))^({})",
                rewrite_functions(&argument),
                rewrite_functions(&exponent)
            ));
            next
        }
    }
}

fn rewrite_constants(input: &str) -> String {
    let mut text = input
        .replace('π', "pi")
        .replace('∞', "inf")
        .replace("Infinity", "inf")
        .replace("infinity", "inf");
    for (command, literal) in [
        ("pi", "pi"),
        ("uppi", "pi"),
        ("infty", "inf"),
        ("infin", "inf"),
        ("e", "e"),
    ] {
        text = replace_command(&text, command, literal);
    }
    text
}

/// `^{..}` becomes `^(..)`; single-digit groups collapse to `^n` unless a
/// digit follows, where collapsing would change the exponent.
fn rewrite_exponents(input: &str) -> String {
    let text = input.replace("^{", "^(");
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;
    while i < chars.len() {
        let single_digit = chars[i] == '^'
            && chars.get(i + 1) == Some(&'(')
            && chars.get(i + 2).is_some_and(|c| c.is_ascii_digit())
            && chars.get(i + 3) == Some(&')')
            && !chars
                .get(i + 4)
                .is_some_and(|c| c.is_ascii_digit() || *c == '.');
        if single_digit {
            out.push('^');
            out.push(chars[i + 2]);
            i += 4;
            continue;
        }
        out.push(chars[i]);
        i += 1;
    }
    out
}

fn drop_subscripts(input: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(input.len());
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '_' {
            i = read_argument(&chars, i + 1).map_or(i + 1, |(_, next)| next);
            continue;
        }
        out.push(chars[i]);
        i += 1;
    }
    out
}

fn drop_unknown_commands(input: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(input.len());
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '\\' {
            let (word, after) = read_command(&chars, i);
            // A backslash before a symbol swallows that symbol too.
            i = if word.is_empty() { i + 2 } else { after };
            continue;
        }
        out.push(chars[i]);
        i += 1;
    }
    out
}

#[derive(Debug, Clone, PartialEq)]
enum Piece {
    Number(String),
    Word(String),
    Function(String),
    Open,
    Close,
    Symbol(char),
}

impl Piece {
    fn starts_operand(&self) -> bool {
        matches!(
            self,
            Piece::Number(_) | Piece::Word(_) | Piece::Function(_) | Piece::Open
        )
    }

    fn ends_operand(&self) -> bool {
        matches!(self, Piece::Number(_) | Piece::Word(_) | Piece::Close)
    }
}

/// Splits whitespace-free text into pieces. Letter runs are segmented by
/// longest match against the function and constant tables, so `sin` stays
/// whole while `xy` splits into `x` and `y`.
fn split_pieces(text: &str) -> Vec<Piece> {
    let mut words: Vec<&'static str> = FUNCTIONS
        .iter()
        .map(|(name, _)| *name)
        .chain(CONSTANTS.iter().map(|(name, _)| *name))
        .collect();
    words.sort_by_key(|word| std::cmp::Reverse(word.len()));

    let chars: Vec<char> = text.chars().collect();
    let mut pieces = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_ascii_digit() || c == '.' {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            pieces.push(Piece::Number(chars[start..i].iter().collect()));
        } else if c.is_alphabetic() {
            match words.iter().find(|word| starts_with_at(&chars, i, word)) {
                Some(word) => {
                    i += word.chars().count();
                    if is_function_name(word) {
                        pieces.push(Piece::Function(word.to_string()));
                    } else {
                        pieces.push(Piece::Word(word.to_string()));
                    }
                }
                None => {
                    pieces.push(Piece::Word(c.to_string()));
                    i += 1;
                }
            }
        } else {
            pieces.push(match c {
                '(' => Piece::Open,
                ')' => Piece::Close,
                other => Piece::Symbol(other),
            });
            i += 1;
        }
    }
    pieces
}

/// End (exclusive) of the atom or parenthesized group starting at `start`.
/// A leading `-` is accepted when `signed`.
fn operand_end(pieces: &[Piece], start: usize, signed: bool) -> Option<usize> {
    let start = if signed && pieces.get(start) == Some(&Piece::Symbol('-')) {
        start + 1
    } else {
        start
    };
    match pieces.get(start)? {
        Piece::Number(_) | Piece::Word(_) => Some(start + 1),
        Piece::Open => {
            let mut depth = 0usize;
            for (offset, piece) in pieces[start..].iter().enumerate() {
                match piece {
                    Piece::Open => depth += 1,
                    Piece::Close => {
                        depth -= 1;
                        if depth == 0 {
                            return Some(start + offset + 1);
                        }
                    }
                    _ => {}
                }
            }
            None
        }
        _ => None,
    }
}

fn is_minus_one(exponent: &[Piece]) -> bool {
    let inner = match exponent {
        [Piece::Open, inner @ .., Piece::Close] => inner,
        other => other,
    };
    matches!(inner, [Piece::Symbol('-'), Piece::Number(one)] if one == "1")
}

/// Plain-text counterpart of the LaTeX function powers: `sin^2(x)` becomes
/// `(sin(x))^2` and `sin^-1(x)` becomes `asin(x)`.
fn hoist_function_powers(pieces: Vec<Piece>) -> Vec<Piece> {
    let mut out = Vec::with_capacity(pieces.len() + 4);
    // Closing pieces to emit once the argument ending at `.0` is copied.
    let mut pending: Vec<(usize, Vec<Piece>)> = Vec::new();
    let mut i = 0;
    while i < pieces.len() {
        while pending.last().is_some_and(|(end, _)| *end == i) {
            if let Some((_, suffix)) = pending.pop() {
                out.extend(suffix);
            }
        }
        if let (Piece::Function(name), Some(Piece::Symbol('^'))) = (&pieces[i], pieces.get(i + 1)) {
            let spans = operand_end(&pieces, i + 2, true).and_then(|after_exponent| {
                operand_end(&pieces, after_exponent, false).map(|end| (after_exponent, end))
            });
            if let Some((after_exponent, end)) = spans {
                let exponent = &pieces[i + 2..after_exponent];
                match inverse_of(name) {
                    Some(inverse) if is_minus_one(exponent) => {
                        out.push(Piece::Function(inverse.to_string()));
                    }
                    _ => {
                        out.push(Piece::Open);
                        out.push(pieces[i].clone());
                        let mut suffix = vec![Piece::Close, Piece::Symbol('^')];
                        suffix.extend_from_slice(exponent);
                        pending.push((end, suffix));
                    }
                }
                i = after_exponent;
                continue;
            }
        }
        out.push(pieces[i].clone());
        i += 1;
    }
    while let Some((_, suffix)) = pending.pop() {
        out.extend(suffix);
    }
    out
}

fn insert_implicit_multiplication(text: &str) -> String {
    let pieces = hoist_function_powers(split_pieces(text));
    let mut out = String::with_capacity(text.len() + 8);
    let mut previous_ends_operand = false;
    let mut i = 0;
    while i < pieces.len() {
        let piece = &pieces[i];
        if previous_ends_operand && piece.starts_operand() {
            out.push('*');
        }
        match piece {
            Piece::Function(name) => {
                out.push_str(name);
                // A function directly followed by an atom applies to it: sinx -> sin(x).
                if let Some(Piece::Number(atom) | Piece::Word(atom)) = pieces.get(i + 1) {
                    out.push('(');
                    out.push_str(atom);
                    out.push(')');
                    previous_ends_operand = true;
                    i += 2;
                    continue;
                }
            }
            Piece::Number(text) | Piece::Word(text) => out.push_str(text),
            Piece::Open => out.push('('),
            Piece::Close => out.push(')'),
            Piece::Symbol(c) => out.push(*c),
        }
        previous_ends_operand = piece.ends_operand();
        i += 1;
    }
    out
}

fn tidy_multiplication(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        if c == '*' && matches!(out.chars().last(), None | Some('*' | '(' | '-' | '+' | ',')) {
            continue;
        }
        out.push(c);
    }
    out
}

// --- Scanning helpers ---

fn function_spelling(word: &str) -> Option<&'static str> {
    if let Some((_, canonical)) = FUNCTION_ALIASES.iter().find(|(alias, _)| *alias == word) {
        return Some(*canonical);
    }
    FUNCTIONS
        .iter()
        .map(|(name, _)| *name)
        .find(|name| *name == word)
}

fn inverse_of(name: &str) -> Option<&'static str> {
    match name {
        "sin" => Some("asin"),
        "cos" => Some("acos"),
        "tan" => Some("atan"),
        "sinh" => Some("asinh"),
        "cosh" => Some("acosh"),
        "tanh" => Some("atanh"),
        _ => None,
    }
}

/// Replaces `\command` with `replacement`. Alphabetic commands only match
/// at a word boundary, so `\sin` does not match inside `\sinh`.
fn replace_command(input: &str, command: &str, replacement: &str) -> String {
    let needle = format!("\\{command}");
    let guarded = command.ends_with(|c: char| c.is_ascii_alphabetic());
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(pos) = rest.find(&needle) {
        let after = &rest[pos + needle.len()..];
        out.push_str(&rest[..pos]);
        if guarded && after.starts_with(|c: char| c.is_ascii_alphabetic()) {
            out.push_str(&needle);
        } else {
            out.push_str(replacement);
        }
        rest = after;
    }
    out.push_str(rest);
    out
}

/// Replaces `\command{inner}` with `prefix` followed by `inner`.
fn unwrap_command(input: &str, command: &str, prefix: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(input.len());
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '\\' {
            let (word, after) = read_command(&chars, i);
            if word == command {
                if let Some((inner, next)) = read_argument(&chars, after) {
                    out.push_str(prefix);
                    out.push_str(inner.trim());
                    i = next;
                    continue;
                }
            }
        }
        out.push(chars[i]);
        i += 1;
    }
    out
}

fn starts_with_at(chars: &[char], start: usize, word: &str) -> bool {
    let mut index = start;
    for expected in word.chars() {
        if chars.get(index) != Some(&expected) {
            return false;
        }
        index += 1;
    }
    true
}

fn skip_spaces(chars: &[char], mut i: usize) -> usize {
    while chars.get(i).is_some_and(|c| c.is_whitespace()) {
        i += 1;
    }
    i
}

/// Reads the alphabetic command name after the backslash at `start`.
fn read_command(chars: &[char], start: usize) -> (String, usize) {
    let mut end = start + 1;
    while chars.get(end).is_some_and(|c| c.is_ascii_alphabetic()) {
        end += 1;
    }
    (chars[start + 1..end.min(chars.len())].iter().collect(), end)
}

/// Reads a `{..}`/`(..)` group, a `\command`, or a single character.
fn read_argument(chars: &[char], start: usize) -> Option<(String, usize)> {
    let i = skip_spaces(chars, start);
    match chars.get(i)? {
        '{' => read_balanced(chars, i, '{', '}'),
        '(' => read_balanced(chars, i, '(', ')'),
        '\\' => {
            let (word, after) = read_command(chars, i);
            if word.is_empty() {
                None
            } else {
                Some((format!("\\{word}"), after))
            }
        }
        c => Some((c.to_string(), i + 1)),
    }
}

/// Reads a bare function argument: a number, a `\command`, or one letter.
fn read_atom(chars: &[char], start: usize) -> Option<(String, usize)> {
    let c = *chars.get(start)?;
    if c.is_ascii_digit() || c == '.' {
        let mut end = start;
        while chars.get(end).is_some_and(|d| d.is_ascii_digit() || *d == '.') {
            end += 1;
        }
        return Some((chars[start..end].iter().collect(), end));
    }
    if c == '\\' || c.is_alphabetic() {
        return read_argument(chars, start);
    }
    None
}

fn read_balanced(chars: &[char], start: usize, open: char, close: char) -> Option<(String, usize)> {
    let mut depth = 0usize;
    for (offset, c) in chars[start..].iter().enumerate() {
        if *c == open {
            depth += 1;
        } else if *c == close {
            depth -= 1;
            if depth == 0 {
                let inner = chars[start + 1..start + offset].iter().collect();
                return Some((inner, start + offset + 1));
            }
        }
    }
    None
}

fn ends_operand(out: &str) -> bool {
    out.trim_end()
        .chars()
        .last()
        .is_some_and(|c| c.is_alphanumeric() || c == ')' || c == '.')
}

#[cfg(test)]
mod tests {
    use super::normalize;
    use crate::equation_engine::compile;
    use crate::error::SyntaxError;

    fn canonical(raw: &str) -> String {
        normalize(raw)
            .unwrap_or_else(|err| panic!("{raw:?} should normalize: {err}"))
            .into_string()
    }

    #[test]
    fn implicit_multiplication_is_made_explicit() {
        assert_eq!(canonical("2(x+1)"), "2*(x+1)");
        assert_eq!(canonical("xy"), "x*y");
        assert_eq!(canonical("sin(x)y"), "sin(x)*y");
        assert_eq!(canonical("(x+1)(y-1)"), "(x+1)*(y-1)");
        assert_eq!(canonical("x2"), "x*2");
    }

    #[test]
    fn explicit_and_implicit_products_agree() {
        assert_eq!(canonical("2x + y"), canonical("2*x + y"));
        assert_eq!(canonical("2x+y"), "2*x+y");
    }

    #[test]
    fn function_names_are_not_split() {
        assert_eq!(canonical("sin(x)+cos(y)"), "sin(x)+cos(y)");
        assert_eq!(canonical("xsin(y)"), "x*sin(y)");
        assert_eq!(canonical("exp(x)"), "exp(x)");
        assert_eq!(canonical("ex"), "e*x");
        assert_eq!(canonical("sinh(x)"), "sinh(x)");
        assert_eq!(canonical("log10(x)"), "log10(x)");
    }

    #[test]
    fn bare_function_arguments_are_wrapped() {
        assert_eq!(canonical("\\sin x"), "sin(x)");
        assert_eq!(canonical("sinx y"), "sin(x)*y");
        assert_eq!(canonical("\\ln 2"), "ln(2)");
    }

    #[test]
    fn latex_operators_and_layout_are_rewritten() {
        assert_eq!(canonical("2x\\cdot y"), "2*x*y");
        assert_eq!(canonical("x \\times y"), "x*y");
        assert_eq!(canonical("x\\div y"), "x/y");
        assert_eq!(canonical("x\\,y"), "x*y");
        assert_eq!(canonical("y\\left(1-y\\right)"), "y*(1-y)");
        assert_eq!(canonical("x·y ÷ 2"), "x*y/2");
    }

    #[test]
    fn nested_fractions_expand_completely() {
        assert_eq!(canonical("\\frac{1}{x}"), "((1)/(x))");
        assert_eq!(
            canonical("\\frac{\\frac{x}{2}}{1+\\frac{1}{y}}"),
            "((((x)/(2)))/(1+((1)/(y))))"
        );
        assert_eq!(canonical("\\frac12"), "((1)/(2))");
    }

    #[test]
    fn roots_and_absolute_values_become_calls() {
        assert_eq!(canonical("\\sqrt{x^{2}+1}"), "sqrt(x^2+1)");
        assert_eq!(canonical("\\sqrt[3]{x}"), "((x)^(1/(3)))");
        assert_eq!(canonical("√x"), "sqrt(x)");
        assert_eq!(canonical("|x|"), "abs(x)");
        assert_eq!(canonical("\\left|x-y\\right|"), "abs(x-y)");
        assert_eq!(canonical("||x|-1|"), "abs(abs(x)-1)");
        assert_eq!(canonical("2|y|x"), "2*abs(y)*x");
    }

    #[test]
    fn plain_function_powers_wrap_the_application() {
        assert_eq!(canonical("sin^2(x)"), "(sin(x))^2");
        assert_eq!(canonical("sin^2x"), "(sin(x))^2");
        assert_eq!(canonical("3cos^2(2x)y"), "3*(cos(2*x))^2*y");
        assert_eq!(canonical("sin^2(cos^3(y))"), "(sin((cos(y))^3))^2");
        assert_eq!(canonical("tan^-1(x)"), "atan(x)");
        assert_eq!(canonical("\\sin^{2}(x)"), canonical("sin^2(x)"));

        let expr = normalize("sin^2(x) + cos^2(x)").expect("normalize");
        let f = compile(&expr).expect("function powers should compile");
        assert!((f.evaluate(0.7, 0.0) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn function_spellings_are_canonicalized() {
        assert_eq!(canonical("\\arcsin(x)"), "asin(x)");
        assert_eq!(canonical("arctan(y)"), "atan(y)");
        assert_eq!(canonical("\\sin^{-1}(x)"), "asin(x)");
        assert_eq!(canonical("\\sin^{2}(x)"), "(sin(x))^2");
        assert_eq!(canonical("\\operatorname{sech}(x)"), "sech(x)");
        assert_eq!(canonical("\\log_{10}(x)"), "log10(x)");
        assert_eq!(canonical("\\log_{e}(x)"), "ln(x)");
        assert_eq!(canonical("\\lg(x)"), "log(x)");
    }

    #[test]
    fn constants_are_canonicalized() {
        assert_eq!(canonical("2\\pi x"), "2*pi*x");
        assert_eq!(canonical("π"), "pi");
        assert_eq!(canonical("\\infty"), "inf");
        assert_eq!(canonical("\\mathrm{e}^{x}"), "e^(x)");
    }

    #[test]
    fn exponent_groups_collapse_only_when_single_digit() {
        assert_eq!(canonical("x^{2}"), "x^2");
        assert_eq!(canonical("x^{12}"), "x^(12)");
        assert_eq!(canonical("e^{-x}"), "e^(-x)");
        assert_eq!(canonical("x**2"), "x^2");
        assert_eq!(canonical("x^{2}y"), "x^2*y");
    }

    #[test]
    fn subscripts_and_unknown_commands_are_dropped() {
        assert_eq!(canonical("y_{0} + x_1"), "y+x");
        assert_eq!(canonical("x + \\color y"), "x+y");
        assert_eq!(canonical("\\displaystyle x"), "x");
    }

    #[test]
    fn equation_prefix_is_stripped() {
        assert_eq!(canonical("\\frac{dy}{dx} = x + y"), "x+y");
        assert_eq!(canonical("y' = -2y"), "-2*y");
    }

    #[test]
    fn stray_multiplication_is_removed() {
        assert_eq!(canonical("-*x"), "-x");
        assert_eq!(canonical("*x"), "x");
        assert_eq!(canonical("x\\cdot\\cdot y"), "x*y");
    }

    #[test]
    fn normalization_is_idempotent() {
        let inputs = [
            "2x + y",
            "\\frac{1}{1+x^{2}}",
            "sin(x)y",
            "e^{-x}\\cdot y",
            "|x| - \\sqrt{y}",
            "-2(x+1)",
            "\\sin^{2}(x) + \\cos x",
            "x\\ln(y) + \\pi",
            "y(1-y)",
            "\\infty",
            "atan2(y, x)",
        ];
        for input in inputs {
            let once = canonical(input);
            let twice = canonical(&once);
            assert_eq!(once, twice, "normalization of {input:?} is not idempotent");
        }
    }

    #[test]
    fn empty_input_is_a_syntax_error() {
        assert_eq!(normalize("").unwrap_err(), SyntaxError::Empty);
        assert_eq!(normalize("  \\, \\quad ").unwrap_err(), SyntaxError::Empty);
        assert_eq!(normalize("dy/dx =").unwrap_err(), SyntaxError::Empty);
        assert!(matches!(
            normalize("+-").unwrap_err(),
            SyntaxError::Degenerate(_)
        ));
    }
}
