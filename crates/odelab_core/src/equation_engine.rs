use crate::error::CompileError;
use crate::normalizer::CanonicalExpression;
use crate::traits::{Scalar, SlopeFunction};
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::f64::consts::{E, PI};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Built-in functions callable from an expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    Sin,
    Cos,
    Tan,
    Sec,
    Csc,
    Cot,
    Asin,
    Acos,
    Atan,
    Sinh,
    Cosh,
    Tanh,
    Sech,
    Csch,
    Coth,
    Asinh,
    Acosh,
    Atanh,
    Exp,
    Ln,
    Log10,
    Log2,
    Sqrt,
    Cbrt,
    Abs,
    Atan2,
    Pow,
    Min,
    Max,
    Hypot,
}

/// Canonical function names. `log` is the base-10 logarithm; `ln` is natural.
pub const FUNCTIONS: &[(&str, Function)] = &[
    ("sin", Function::Sin),
    ("cos", Function::Cos),
    ("tan", Function::Tan),
    ("sec", Function::Sec),
    ("csc", Function::Csc),
    ("cot", Function::Cot),
    ("asin", Function::Asin),
    ("acos", Function::Acos),
    ("atan", Function::Atan),
    ("sinh", Function::Sinh),
    ("cosh", Function::Cosh),
    ("tanh", Function::Tanh),
    ("sech", Function::Sech),
    ("csch", Function::Csch),
    ("coth", Function::Coth),
    ("asinh", Function::Asinh),
    ("acosh", Function::Acosh),
    ("atanh", Function::Atanh),
    ("exp", Function::Exp),
    ("ln", Function::Ln),
    ("log", Function::Log10),
    ("log10", Function::Log10),
    ("log2", Function::Log2),
    ("sqrt", Function::Sqrt),
    ("cbrt", Function::Cbrt),
    ("abs", Function::Abs),
    ("atan2", Function::Atan2),
    ("pow", Function::Pow),
    ("min", Function::Min),
    ("max", Function::Max),
    ("hypot", Function::Hypot),
];

/// Named constants. `e` is Euler's number; `inf` is positive infinity.
pub const CONSTANTS: &[(&str, f64)] = &[("pi", PI), ("e", E), ("inf", f64::INFINITY)];

pub fn is_function_name(name: &str) -> bool {
    FUNCTIONS.iter().any(|(candidate, _)| *candidate == name)
}

impl Function {
    pub fn lookup(name: &str) -> Option<Self> {
        FUNCTIONS
            .iter()
            .find(|(candidate, _)| *candidate == name)
            .map(|(_, function)| *function)
    }

    pub fn arity(self) -> usize {
        match self {
            Function::Atan2 | Function::Pow | Function::Min | Function::Max | Function::Hypot => 2,
            _ => 1,
        }
    }

    pub fn is_trigonometric(self) -> bool {
        matches!(
            self,
            Function::Sin
                | Function::Cos
                | Function::Tan
                | Function::Sec
                | Function::Csc
                | Function::Cot
                | Function::Asin
                | Function::Acos
                | Function::Atan
                | Function::Atan2
        )
    }

    fn apply_unary<T: Scalar>(self, a: T) -> T {
        let one = T::one();
        match self {
            Function::Sin => a.sin(),
            Function::Cos => a.cos(),
            Function::Tan => a.tan(),
            Function::Sec => one / a.cos(),
            Function::Csc => one / a.sin(),
            Function::Cot => one / a.tan(),
            Function::Asin => a.asin(),
            Function::Acos => a.acos(),
            Function::Atan => a.atan(),
            Function::Sinh => a.sinh(),
            Function::Cosh => a.cosh(),
            Function::Tanh => a.tanh(),
            Function::Sech => one / a.cosh(),
            Function::Csch => one / a.sinh(),
            Function::Coth => one / a.tanh(),
            Function::Asinh => a.asinh(),
            Function::Acosh => a.acosh(),
            Function::Atanh => a.atanh(),
            Function::Exp => a.exp(),
            Function::Ln => a.ln(),
            Function::Log10 => a.log10(),
            Function::Log2 => a.log2(),
            Function::Sqrt => a.sqrt(),
            Function::Cbrt => a.cbrt(),
            Function::Abs => a.abs(),
            Function::Atan2 | Function::Pow | Function::Min | Function::Max | Function::Hypot => {
                T::nan()
            }
        }
    }

    fn apply_binary<T: Scalar>(self, a: T, b: T) -> T {
        match self {
            Function::Atan2 => a.atan2(b),
            Function::Pow => a.powf(b),
            Function::Min => a.min(b),
            Function::Max => a.max(b),
            Function::Hypot => a.hypot(b),
            _ => T::nan(),
        }
    }
}

/// OpCodes for the Stack-based Virtual Machine.
/// The VM operates on a stack of `Scalar` values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OpCode {
    /// Pushes a constant `f64` value onto the stack.
    LoadConst(f64),
    /// Pushes a variable onto the stack: 0 is the independent variable, 1 the dependent one.
    LoadVar(usize),
    /// Pops top two values (b, a), pushes (a + b).
    Add,
    /// Pops top two values (b, a), pushes (a - b).
    Sub,
    /// Pops top two values (b, a), pushes (a * b).
    Mul,
    /// Pops top two values (b, a), pushes (a / b).
    Div,
    /// Pops top two values (b, a), pushes (a ^ b).
    Pow,
    /// Pops top value (a), pushes -a.
    Neg,
    /// Pops top value (a), pushes f(a).
    Call1(Function),
    /// Pops top two values (b, a), pushes f(a, b).
    Call2(Function),
}

/// Represents a compiled sequence of operations.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Bytecode {
    pub ops: Vec<OpCode>,
}

impl Bytecode {
    /// Deepest stack the program reaches, used to size the VM stack up front.
    pub fn max_stack_depth(&self) -> usize {
        let mut depth = 0usize;
        let mut max_depth = 0usize;
        for op in &self.ops {
            match op {
                OpCode::LoadConst(_) | OpCode::LoadVar(_) => depth += 1,
                OpCode::Add
                | OpCode::Sub
                | OpCode::Mul
                | OpCode::Div
                | OpCode::Pow
                | OpCode::Call2(_) => depth = depth.saturating_sub(1),
                OpCode::Neg | OpCode::Call1(_) => {}
            }
            max_depth = max_depth.max(depth);
        }
        max_depth
    }
}

/// Stack-based Virtual Machine for evaluating equations.
///
/// The VM is stateless; `execute` takes all necessary context:
/// - `bytecode`: Instructions to run.
/// - `vars`: `[independent, dependent]` (read-only).
/// - `stack`: A mutable buffer for intermediate computations.
///
/// Non-finite intermediate values flow through untouched.
pub struct VM;

impl VM {
    pub fn execute<T: Scalar>(bytecode: &Bytecode, vars: &[T], stack: &mut Vec<T>) -> T {
        stack.clear();

        for op in &bytecode.ops {
            match op {
                OpCode::LoadConst(val) => {
                    stack.push(T::from_f64(*val).unwrap_or_else(T::nan));
                }
                OpCode::LoadVar(idx) => {
                    stack.push(vars.get(*idx).copied().unwrap_or_else(T::nan));
                }
                OpCode::Add => {
                    let (a, b) = pop_pair(stack);
                    stack.push(a + b);
                }
                OpCode::Sub => {
                    let (a, b) = pop_pair(stack);
                    stack.push(a - b);
                }
                OpCode::Mul => {
                    let (a, b) = pop_pair(stack);
                    stack.push(a * b);
                }
                OpCode::Div => {
                    let (a, b) = pop_pair(stack);
                    stack.push(a / b);
                }
                OpCode::Pow => {
                    let (a, b) = pop_pair(stack);
                    stack.push(a.powf(b));
                }
                OpCode::Neg => {
                    let a = pop(stack);
                    stack.push(-a);
                }
                OpCode::Call1(function) => {
                    let a = pop(stack);
                    stack.push(function.apply_unary(a));
                }
                OpCode::Call2(function) => {
                    let (a, b) = pop_pair(stack);
                    stack.push(function.apply_binary(a, b));
                }
            }
        }

        // Compiled programs always leave exactly one value; NaN marks a malformed program.
        stack.pop().unwrap_or_else(T::nan)
    }
}

fn pop<T: Scalar>(stack: &mut Vec<T>) -> T {
    stack.pop().unwrap_or_else(T::nan)
}

fn pop_pair<T: Scalar>(stack: &mut Vec<T>) -> (T, T) {
    let b = pop(stack);
    let a = pop(stack);
    (a, b)
}

// --- AST & Parser ---

/// Abstract Syntax Tree nodes for expressions.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Variable(String),
    Binary(Box<Expr>, char, Box<Expr>), // char is operator +, -, *, /, ^
    Unary(char, Box<Expr>),             // -
    Call(String, Vec<Expr>),            // functions like sin(x) or atan2(y, x)
}

/// Names of the two free variables an expression may reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Variables {
    pub independent: String,
    pub dependent: String,
}

impl Default for Variables {
    fn default() -> Self {
        Self {
            independent: "x".to_string(),
            dependent: "y".to_string(),
        }
    }
}

impl Variables {
    pub fn new(independent: &str, dependent: &str) -> Result<Self, CompileError> {
        let variables = Self {
            independent: independent.to_string(),
            dependent: dependent.to_string(),
        };
        variables.validate()?;
        Ok(variables)
    }

    /// Variables must survive normalization unchanged, which splits letter
    /// runs into single letters and reserves `e`.
    pub fn validate(&self) -> Result<(), CompileError> {
        for name in [&self.independent, &self.dependent] {
            let mut chars = name.chars();
            let valid = matches!((chars.next(), chars.next()), (Some(c), None) if c.is_ascii_alphabetic() && c != 'e');
            if !valid {
                return Err(CompileError::InvalidVariable(name.clone()));
            }
        }
        if self.independent == self.dependent {
            return Err(CompileError::DuplicateVariable(self.independent.clone()));
        }
        Ok(())
    }
}

/// Compiles an AST (`Expr`) into `Bytecode`.
/// Resolves variable names to indices and constants to literals.
pub struct Compiler {
    pub var_map: HashMap<String, usize>,
}

impl Compiler {
    pub fn new(variables: &Variables) -> Result<Self, CompileError> {
        variables.validate()?;
        let mut var_map = HashMap::new();
        var_map.insert(variables.independent.clone(), 0);
        var_map.insert(variables.dependent.clone(), 1);
        Ok(Self { var_map })
    }

    pub fn compile(&self, expr: &Expr) -> Result<Bytecode, CompileError> {
        let mut ops = Vec::new();
        self.compile_recursive(expr, &mut ops)?;
        Ok(Bytecode { ops })
    }

    fn compile_recursive(&self, expr: &Expr, ops: &mut Vec<OpCode>) -> Result<(), CompileError> {
        match expr {
            Expr::Number(n) => ops.push(OpCode::LoadConst(*n)),
            Expr::Variable(name) => {
                if let Some(&idx) = self.var_map.get(name) {
                    ops.push(OpCode::LoadVar(idx));
                } else if let Some((_, value)) = CONSTANTS.iter().find(|(c, _)| c == name) {
                    ops.push(OpCode::LoadConst(*value));
                } else {
                    return Err(CompileError::UnknownIdentifier(name.clone()));
                }
            }
            Expr::Binary(left, op, right) => {
                self.compile_recursive(left, ops)?;
                self.compile_recursive(right, ops)?;
                ops.push(match op {
                    '+' => OpCode::Add,
                    '-' => OpCode::Sub,
                    '*' => OpCode::Mul,
                    '/' => OpCode::Div,
                    '^' => OpCode::Pow,
                    other => return Err(CompileError::UnexpectedToken(format!("operator '{other}'"))),
                });
            }
            Expr::Unary(op, operand) => {
                self.compile_recursive(operand, ops)?;
                match op {
                    '-' => ops.push(OpCode::Neg),
                    other => return Err(CompileError::UnexpectedToken(format!("operator '{other}'"))),
                }
            }
            Expr::Call(name, args) => {
                let function = Function::lookup(name)
                    .ok_or_else(|| CompileError::UnknownFunction(name.clone()))?;
                if args.len() != function.arity() {
                    return Err(CompileError::Arity {
                        name: name.clone(),
                        expected: function.arity(),
                        got: args.len(),
                    });
                }
                for arg in args {
                    self.compile_recursive(arg, ops)?;
                }
                ops.push(if function.arity() == 2 {
                    OpCode::Call2(function)
                } else {
                    OpCode::Call1(function)
                });
            }
        }
        Ok(())
    }
}

// --- Simple Parser ---

/// Parses a string expression into an AST.
pub fn parse(input: &str) -> Result<Expr, CompileError> {
    let tokens = tokenize(input)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let expr = parser.parse_expression()?;
    match parser.peek() {
        None => Ok(expr),
        Some(Token::RParen) => Err(CompileError::Unbalanced("unmatched ')'".to_string())),
        Some(token) => Err(CompileError::UnexpectedToken(token.describe())),
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Identifier(String),
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    LParen,
    RParen,
    Comma,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Number(n) => format!("number {n}"),
            Token::Identifier(name) => format!("identifier '{name}'"),
            Token::Plus => "'+'".to_string(),
            Token::Minus => "'-'".to_string(),
            Token::Star => "'*'".to_string(),
            Token::Slash => "'/'".to_string(),
            Token::Caret => "'^'".to_string(),
            Token::LParen => "'('".to_string(),
            Token::RParen => "')'".to_string(),
            Token::Comma => "','".to_string(),
        }
    }
}

fn tokenize(input: &str) -> Result<Vec<Token>, CompileError> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(position, c)) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if c.is_ascii_digit() || c == '.' {
            let mut num_str = String::new();
            while let Some(&(_, d)) = chars.peek() {
                if d.is_ascii_digit() || d == '.' {
                    num_str.push(d);
                    chars.next();
                } else {
                    break;
                }
            }
            let value = num_str
                .parse()
                .map_err(|_| CompileError::InvalidNumber(num_str.clone()))?;
            tokens.push(Token::Number(value));
        } else if c.is_alphabetic() {
            let mut ident = String::new();
            while let Some(&(_, d)) = chars.peek() {
                if d.is_alphanumeric() || d == '_' {
                    ident.push(d);
                    chars.next();
                } else {
                    break;
                }
            }
            tokens.push(Token::Identifier(ident));
        } else {
            tokens.push(match c {
                '+' => Token::Plus,
                '-' => Token::Minus,
                '*' => Token::Star,
                '/' => Token::Slash,
                '^' => Token::Caret,
                '(' => Token::LParen,
                ')' => Token::RParen,
                ',' => Token::Comma,
                found => return Err(CompileError::UnexpectedCharacter { found, position }),
            });
            chars.next();
        }
    }
    Ok(tokens)
}

/// Nesting bound for parentheses, calls, signs and exponents. Every nested
/// level passes through `parse_unary`, so the parser's stack stays bounded.
const MAX_NESTING: usize = 256;

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn consume(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn parse_expression(&mut self) -> Result<Expr, CompileError> {
        self.parse_term()
    }

    fn parse_term(&mut self) -> Result<Expr, CompileError> {
        let mut left = self.parse_factor()?;

        while let Some(token) = self.peek() {
            let op = match token {
                Token::Plus => '+',
                Token::Minus => '-',
                _ => break,
            };
            self.consume();
            let right = self.parse_factor()?;
            left = Expr::Binary(Box::new(left), op, Box::new(right));
        }
        Ok(left)
    }

    fn parse_factor(&mut self) -> Result<Expr, CompileError> {
        let mut left = self.parse_unary()?;

        while let Some(token) = self.peek() {
            let op = match token {
                Token::Star => '*',
                Token::Slash => '/',
                _ => break,
            };
            self.consume();
            let right = self.parse_unary()?;
            left = Expr::Binary(Box::new(left), op, Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, CompileError> {
        if self.depth >= MAX_NESTING {
            return Err(CompileError::TooDeep(MAX_NESTING));
        }
        self.depth += 1;
        let expr = self.parse_signed();
        self.depth -= 1;
        expr
    }

    /// Unary minus binds looser than `^`, so `-x^2` is `-(x^2)`.
    fn parse_signed(&mut self) -> Result<Expr, CompileError> {
        match self.peek() {
            Some(Token::Minus) => {
                self.consume();
                let expr = self.parse_unary()?;
                Ok(Expr::Unary('-', Box::new(expr)))
            }
            Some(Token::Plus) => {
                self.consume();
                self.parse_unary()
            }
            _ => self.parse_power(),
        }
    }

    /// `^` is right-associative: `2^3^2` is `2^(3^2)`.
    fn parse_power(&mut self) -> Result<Expr, CompileError> {
        let base = self.parse_primary()?;
        if let Some(Token::Caret) = self.peek() {
            self.consume();
            let exponent = self.parse_unary()?;
            return Ok(Expr::Binary(Box::new(base), '^', Box::new(exponent)));
        }
        Ok(base)
    }

    fn parse_primary(&mut self) -> Result<Expr, CompileError> {
        match self.consume() {
            Some(Token::Number(n)) => Ok(Expr::Number(n)),
            Some(Token::Identifier(name)) => {
                if let Some(Token::LParen) = self.peek() {
                    self.consume(); // eat '('
                    let args = self.parse_arguments()?;
                    Ok(Expr::Call(name, args))
                } else {
                    Ok(Expr::Variable(name))
                }
            }
            Some(Token::LParen) => {
                let expr = self.parse_expression()?;
                self.expect_closing()?;
                Ok(expr)
            }
            Some(Token::RParen) => Err(CompileError::Unbalanced("unmatched ')'".to_string())),
            Some(token) => Err(CompileError::UnexpectedToken(token.describe())),
            None => Err(CompileError::UnexpectedEnd),
        }
    }

    fn parse_arguments(&mut self) -> Result<Vec<Expr>, CompileError> {
        let mut args = Vec::new();
        if let Some(Token::RParen) = self.peek() {
            self.consume();
            return Ok(args);
        }
        loop {
            args.push(self.parse_expression()?);
            match self.peek() {
                Some(Token::Comma) => {
                    self.consume();
                }
                _ => break,
            }
        }
        self.expect_closing()?;
        Ok(args)
    }

    fn expect_closing(&mut self) -> Result<(), CompileError> {
        match self.consume() {
            Some(Token::RParen) => Ok(()),
            None => Err(CompileError::Unbalanced("expected ')'".to_string())),
            Some(token) => Err(CompileError::UnexpectedToken(token.describe())),
        }
    }
}

// --- CompiledEvaluator ---

/// A compiled right-hand side `f(independent, dependent)`.
///
/// Holds no mutable state, so one evaluator can be shared by both
/// integrators and the direction-field sampler, including across threads.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledEvaluator {
    source: CanonicalExpression,
    variables: Variables,
    bytecode: Bytecode,
    stack_depth: usize,
}

impl CompiledEvaluator {
    pub fn source(&self) -> &CanonicalExpression {
        &self.source
    }

    pub fn variables(&self) -> &Variables {
        &self.variables
    }

    pub fn bytecode(&self) -> &Bytecode {
        &self.bytecode
    }

    pub fn evaluate(&self, independent: f64, dependent: f64) -> f64 {
        self.evaluate_as(independent, dependent)
    }

    pub fn evaluate_as<T: Scalar>(&self, independent: T, dependent: T) -> T {
        let mut stack = Vec::with_capacity(self.stack_depth);
        VM::execute(&self.bytecode, &[independent, dependent], &mut stack)
    }

    pub fn fingerprint(&self) -> u64 {
        fingerprint(&self.source, &self.variables)
    }

    /// True when the program reads the dependent variable at all.
    pub fn uses_dependent(&self) -> bool {
        self.bytecode.ops.contains(&OpCode::LoadVar(1))
    }
}

impl SlopeFunction for CompiledEvaluator {
    fn slope(&self, x: f64, y: f64) -> f64 {
        self.evaluate(x, y)
    }
}

/// Compiles a canonical expression over the default variables `x` and `y`.
pub fn compile(expr: &CanonicalExpression) -> Result<CompiledEvaluator, CompileError> {
    compile_with(expr, &Variables::default())
}

pub fn compile_with(
    expr: &CanonicalExpression,
    variables: &Variables,
) -> Result<CompiledEvaluator, CompileError> {
    let compiler = Compiler::new(variables)?;
    let parsed = parse(expr.as_str())?;
    let bytecode = compiler.compile(&parsed)?;
    let stack_depth = bytecode.max_stack_depth();
    log::debug!(
        "compiled {expr} into {} ops (stack depth {stack_depth})",
        bytecode.ops.len()
    );
    Ok(CompiledEvaluator {
        source: expr.clone(),
        variables: variables.clone(),
        bytecode,
        stack_depth,
    })
}

fn fingerprint(expr: &CanonicalExpression, variables: &Variables) -> u64 {
    let mut hasher = DefaultHasher::new();
    expr.hash(&mut hasher);
    variables.hash(&mut hasher);
    hasher.finish()
}

/// Reuses compiled evaluators keyed by a fingerprint of their source.
#[derive(Debug, Default)]
pub struct EvaluatorCache {
    entries: HashMap<u64, Arc<CompiledEvaluator>>,
}

impl EvaluatorCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get_or_compile(
        &mut self,
        expr: &CanonicalExpression,
        variables: &Variables,
    ) -> Result<Arc<CompiledEvaluator>, CompileError> {
        let key = fingerprint(expr, variables);
        if let Some(hit) = self.entries.get(&key) {
            // Guard against fingerprint collisions.
            if hit.source() == expr && hit.variables() == variables {
                return Ok(Arc::clone(hit));
            }
        }
        let compiled = Arc::new(compile_with(expr, variables)?);
        self.entries.insert(key, Arc::clone(&compiled));
        Ok(compiled)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::{
        compile, compile_with, parse, Bytecode, Compiler, EvaluatorCache, Expr, OpCode, Variables,
    };
    use crate::error::CompileError;
    use crate::normalizer::normalize;
    use std::sync::Arc;

    fn evaluator(raw: &str) -> super::CompiledEvaluator {
        let canonical = normalize(raw).expect("expression should normalize");
        compile(&canonical).expect("expression should compile")
    }

    fn compile_error(raw: &str) -> CompileError {
        let canonical = normalize(raw).expect("expression should normalize");
        compile(&canonical).expect_err("compilation should fail")
    }

    #[test]
    fn respects_operator_precedence() {
        let f = evaluator("1 + 2*3^2");
        assert_eq!(f.evaluate(0.0, 0.0), 19.0);
        let f = evaluator("-x^2");
        assert_eq!(f.evaluate(3.0, 0.0), -9.0);
        let f = evaluator("2^3^2");
        assert_eq!(f.evaluate(0.0, 0.0), 512.0);
        let f = evaluator("8/2/2");
        assert_eq!(f.evaluate(0.0, 0.0), 2.0);
        let f = evaluator("2^-1");
        assert_eq!(f.evaluate(0.0, 0.0), 0.5);
    }

    #[test]
    fn binds_independent_and_dependent_variables() {
        let f = evaluator("x - 2y");
        assert_eq!(f.evaluate(5.0, 1.0), 3.0);
    }

    #[test]
    fn function_result_times_variable_is_not_a_nested_call() {
        let f = evaluator("sin(x)y");
        assert_eq!(f.evaluate(0.0, 2.0), 0.0);
        let half_pi = std::f64::consts::FRAC_PI_2;
        assert!((f.evaluate(half_pi, 2.0) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn evaluates_function_table_and_constants() {
        let f = evaluator("ln(e) + log(100) + sqrt(16) + abs(-3) + cos(pi)");
        assert!((f.evaluate(0.0, 0.0) - (1.0 + 2.0 + 4.0 + 3.0 - 1.0)).abs() < 1e-12);
        let f = evaluator("atan2(y, x)");
        assert!((f.evaluate(1.0, 1.0) - std::f64::consts::FRAC_PI_4).abs() < 1e-12);
        let f = evaluator("\\frac{1}{1+x^{2}}");
        assert!((f.evaluate(1.0, 0.0) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn non_finite_results_are_returned_not_raised() {
        let f = evaluator("ln(x)");
        assert!(f.evaluate(-1.0, 0.0).is_nan());
        assert_eq!(f.evaluate(0.0, 0.0), f64::NEG_INFINITY);
        let f = evaluator("1/y");
        assert_eq!(f.evaluate(0.0, 0.0), f64::INFINITY);
    }

    #[test]
    fn evaluates_in_other_scalar_types() {
        let f = evaluator("x*y + 1");
        let value: f32 = f.evaluate_as(2.0f32, 3.0f32);
        assert_eq!(value, 7.0);
    }

    #[test]
    fn rejects_unknown_identifiers_and_functions() {
        assert_eq!(compile_error("x + t"), CompileError::UnknownIdentifier("t".into()));
        let err = compile(&normalize("foo(x)").expect("normalize"))
            .expect_err("unknown name should fail");
        // `foo` splits into single letters, so the first one is reported.
        assert_eq!(err, CompileError::UnknownIdentifier("f".into()));
        let parsed = parse("foo(x)").expect("raw text should parse");
        assert_eq!(parsed, Expr::Call("foo".into(), vec![Expr::Variable("x".into())]));
        let compiler = Compiler::new(&Variables::default()).expect("default variables are valid");
        assert_eq!(
            compiler.compile(&parsed),
            Err(CompileError::UnknownFunction("foo".into()))
        );
    }

    #[test]
    fn rejects_unbalanced_parentheses() {
        assert!(matches!(compile_error("(x+1"), CompileError::Unbalanced(_)));
        assert!(matches!(compile_error("x+1)"), CompileError::Unbalanced(_)));
        assert!(matches!(compile_error("sin(x"), CompileError::Unbalanced(_)));
    }

    #[test]
    fn rejects_arity_mismatch() {
        assert_eq!(
            compile_error("atan2(x)"),
            CompileError::Arity {
                name: "atan2".into(),
                expected: 2,
                got: 1
            }
        );
        assert_eq!(
            compile_error("sin(x, y)"),
            CompileError::Arity {
                name: "sin".into(),
                expected: 1,
                got: 2
            }
        );
    }

    #[test]
    fn rejects_stray_characters() {
        assert!(matches!(
            compile_error("x # y"),
            CompileError::UnexpectedCharacter { found: '#', .. }
        ));
        assert!(matches!(compile_error("x + "), CompileError::UnexpectedEnd));
    }

    #[test]
    fn supports_custom_variable_symbols() {
        let variables = Variables::new("t", "u").expect("variables should be valid");
        let canonical = normalize("2t + u").expect("normalize");
        let f = compile_with(&canonical, &variables).expect("compile");
        assert_eq!(f.evaluate(1.0, 3.0), 5.0);
        assert!(matches!(
            Variables::new("e", "y"),
            Err(CompileError::InvalidVariable(_))
        ));
        assert!(matches!(
            Variables::new("x", "x"),
            Err(CompileError::DuplicateVariable(_))
        ));
    }

    #[test]
    fn evaluator_is_shareable_across_threads() {
        let f = Arc::new(evaluator("x + y"));
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let f = Arc::clone(&f);
                std::thread::spawn(move || f.evaluate(i as f64, 1.0))
            })
            .collect();
        let results: Vec<f64> = handles
            .into_iter()
            .map(|h| h.join().expect("thread should finish"))
            .collect();
        assert_eq!(results, vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn stack_depth_matches_program_shape() {
        let bytecode = Bytecode {
            ops: vec![
                OpCode::LoadVar(0),
                OpCode::LoadVar(1),
                OpCode::LoadConst(2.0),
                OpCode::Mul,
                OpCode::Add,
            ],
        };
        assert_eq!(bytecode.max_stack_depth(), 3);
    }

    #[test]
    fn cache_reuses_compiled_evaluators() {
        let mut cache = EvaluatorCache::new();
        let variables = Variables::default();
        let canonical = normalize("x + y").expect("normalize");
        let first = cache.get_or_compile(&canonical, &variables).expect("compile");
        let second = cache.get_or_compile(&canonical, &variables).expect("compile");
        assert!(Arc::ptr_eq(&first, &second));
        let other = normalize("x - y").expect("normalize");
        cache.get_or_compile(&other, &variables).expect("compile");
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn deep_nesting_is_rejected_instead_of_overflowing() {
        let raw = format!("{}x{}", "(".repeat(10_000), ")".repeat(10_000));
        assert_eq!(compile_error(&raw), CompileError::TooDeep(256));

        let signs = format!("{}x", "-".repeat(5_000));
        assert_eq!(parse(&signs), Err(CompileError::TooDeep(256)));
        let tower = vec!["2"; 5_000].join("^");
        assert_eq!(parse(&tower), Err(CompileError::TooDeep(256)));
    }

    #[test]
    fn unary_plus_leaves_no_trace() {
        assert_eq!(parse("+x"), Ok(Expr::Variable("x".to_string())));
        let bytecode = Compiler::new(&Variables::default())
            .expect("default variables")
            .compile(&parse("+-y").expect("parse"))
            .expect("compile");
        assert_eq!(bytecode.ops, vec![OpCode::LoadVar(1), OpCode::Neg]);
    }

    #[test]
    fn moderate_nesting_still_compiles() {
        let raw = format!("{}x + y{}", "(".repeat(100), ")".repeat(100));
        let f = evaluator(&raw);
        assert_eq!(f.evaluate(2.0, 3.0), 5.0);
        let calls = format!("{}y{}", "abs(".repeat(50), ")".repeat(50));
        assert_eq!(evaluator(&calls).evaluate(0.0, -4.0), 4.0);
    }
}
