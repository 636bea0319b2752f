//! Structural tags for a canonical right-hand side, derived from its text
//! alone. Nothing here evaluates the expression.

use crate::equation_engine::{Function, Variables, CONSTANTS};
use crate::normalizer::CanonicalExpression;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum EquationType {
    ExponentialGrowth,
    LinearHomogeneous,
    LinearNonhomogeneous,
    NonlinearQuadratic,
    NonlinearOther,
    Unknown,
}

impl EquationType {
    pub fn label(self) -> &'static str {
        match self {
            EquationType::ExponentialGrowth => "Exponential growth/decay",
            EquationType::LinearHomogeneous => "Linear homogeneous",
            EquationType::LinearNonhomogeneous => "Linear non-homogeneous",
            EquationType::NonlinearQuadratic => "Non-linear (quadratic)",
            EquationType::NonlinearOther => "Non-linear",
            EquationType::Unknown => "Unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EquationProfile {
    pub is_linear: bool,
    pub has_independent_variable: bool,
    pub has_trigonometric: bool,
    pub has_exponential: bool,
    #[serde(rename = "type")]
    pub equation_type: EquationType,
}

#[derive(Debug, Clone, PartialEq)]
enum Lexeme {
    Ident(String),
    Number(f64),
    Op(char),
}

fn lex(text: &str) -> Vec<Lexeme> {
    let chars: Vec<char> = text.chars().collect();
    let mut lexemes = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        let start = i;
        if c.is_ascii_digit() || c == '.' {
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            let literal: String = chars[start..i].iter().collect();
            lexemes.push(Lexeme::Number(literal.parse().unwrap_or(f64::NAN)));
        } else if c.is_alphabetic() {
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            lexemes.push(Lexeme::Ident(chars[start..i].iter().collect()));
        } else {
            lexemes.push(Lexeme::Op(c));
            i += 1;
        }
    }
    lexemes
}

/// Classifies over the default variables `x` and `y`.
pub fn classify(expr: &CanonicalExpression) -> EquationProfile {
    classify_with(expr, &Variables::default())
}

pub fn classify_with(expr: &CanonicalExpression, variables: &Variables) -> EquationProfile {
    let lexemes = lex(expr.as_str());
    let is_ident = |lexeme: &Lexeme, name: &str| matches!(lexeme, Lexeme::Ident(id) if id == name);

    let has_dependent = lexemes.iter().any(|l| is_ident(l, &variables.dependent));
    let has_independent = lexemes.iter().any(|l| is_ident(l, &variables.independent));
    let has_trigonometric = lexemes.iter().any(|l| match l {
        Lexeme::Ident(name) => Function::lookup(name).is_some_and(Function::is_trigonometric),
        _ => false,
    });
    let has_exponential = lexemes.iter().enumerate().any(|(i, l)| match l {
        Lexeme::Ident(name) if name == "exp" => true,
        Lexeme::Ident(name) if name == "e" => lexemes.get(i + 1) == Some(&Lexeme::Op('^')),
        _ => false,
    });

    let powers = dependent_powers(&lexemes, &variables.dependent);
    let is_linear = powers.order() < 2.0;

    let equation_type = if lexemes.len() == 1 && is_ident(&lexemes[0], &variables.dependent) {
        EquationType::ExponentialGrowth
    } else if is_scaled_dependent(&lexemes, &variables.dependent) {
        EquationType::ExponentialGrowth
    } else if is_linear && !has_independent {
        EquationType::LinearHomogeneous
    } else if is_linear {
        EquationType::LinearNonhomogeneous
    } else if powers.squared || powers.run >= 2 {
        EquationType::NonlinearQuadratic
    } else if has_dependent {
        EquationType::NonlinearOther
    } else {
        EquationType::Unknown
    };

    EquationProfile {
        is_linear,
        has_independent_variable: has_independent,
        has_trigonometric,
        has_exponential,
        equation_type,
    }
}

/// How the dependent variable is raised to a power in the text.
#[derive(Debug, Clone, Copy, PartialEq)]
struct DependentPowers {
    /// Largest literal exponent (`y^2`, `y^(12)`), 1 for a plain occurrence.
    exponent: f64,
    /// Some occurrence carries the literal exponent 2.
    squared: bool,
    /// Longest explicit self-multiplication (`y*y*y` is 3).
    run: usize,
}

impl DependentPowers {
    fn order(&self) -> f64 {
        self.exponent.max(self.run as f64)
    }
}

fn dependent_powers(lexemes: &[Lexeme], dependent: &str) -> DependentPowers {
    let is_dependent = |i: usize| matches!(lexemes.get(i), Some(Lexeme::Ident(id)) if id == dependent);
    let mut powers = DependentPowers {
        exponent: 0.0,
        squared: false,
        run: 0,
    };
    for i in 0..lexemes.len() {
        if !is_dependent(i) {
            continue;
        }
        powers.exponent = powers.exponent.max(1.0);
        if lexemes.get(i + 1) == Some(&Lexeme::Op('^')) {
            let exponent = match (lexemes.get(i + 2), lexemes.get(i + 3), lexemes.get(i + 4)) {
                (Some(Lexeme::Number(n)), _, _) => Some(*n),
                (Some(Lexeme::Op('(')), Some(Lexeme::Number(n)), Some(Lexeme::Op(')'))) => Some(*n),
                _ => None,
            };
            if let Some(n) = exponent.filter(|n| n.is_finite()) {
                powers.exponent = powers.exponent.max(n);
                powers.squared |= n == 2.0;
            }
        }
        let mut run = 1;
        let mut j = i;
        while lexemes.get(j + 1) == Some(&Lexeme::Op('*')) && is_dependent(j + 2) {
            run += 1;
            j += 2;
        }
        powers.run = powers.run.max(run);
    }
    powers
}

/// `k*y`, `y*k`, `y/k` or `-y`, where `k` is a literal or named constant.
fn is_scaled_dependent(lexemes: &[Lexeme], dependent: &str) -> bool {
    let rest = match lexemes.first() {
        Some(Lexeme::Op('-')) => &lexemes[1..],
        _ => lexemes,
    };
    let is_dependent = |l: &Lexeme| matches!(l, Lexeme::Ident(id) if id == dependent);
    let is_scalar = |l: &Lexeme| match l {
        Lexeme::Number(_) => true,
        Lexeme::Ident(name) => CONSTANTS.iter().any(|(constant, _)| *constant == name.as_str()),
        Lexeme::Op(_) => false,
    };
    match rest {
        [only] => lexemes.len() == 2 && is_dependent(only),
        [a, Lexeme::Op('*'), b] => {
            (is_scalar(a) && is_dependent(b)) || (is_dependent(a) && is_scalar(b))
        }
        [a, Lexeme::Op('/'), b] => is_dependent(a) && is_scalar(b),
        _ => false,
    }
}
