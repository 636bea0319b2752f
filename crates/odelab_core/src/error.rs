//! Error types for the odelab core.
//!
//! Parse-time failures (`SyntaxError`, `CompileError`) are fatal to the
//! requested operation. Numerical anomalies during integration or sampling
//! are not errors at all unless the caller opts into
//! [`NonFinitePolicy::Halt`](crate::problem::NonFinitePolicy::Halt).

use thiserror::Error;

/// Raised by the normalizer when nothing evaluable is left.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SyntaxError {
    #[error("Expression is empty after normalization.")]
    Empty,
    /// The text survived normalization but holds no operand at all (e.g. `+-`).
    #[error("Expression \"{0}\" contains no numbers, variables or constants.")]
    Degenerate(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompileError {
    #[error("Unexpected character '{found}' at position {position}.")]
    UnexpectedCharacter { found: char, position: usize },
    #[error("Invalid number literal \"{0}\".")]
    InvalidNumber(String),
    #[error("Unknown identifier: {0}")]
    UnknownIdentifier(String),
    #[error("Unknown function: {0}")]
    UnknownFunction(String),
    #[error("Function {name} expects {expected} argument(s), got {got}.")]
    Arity {
        name: String,
        expected: usize,
        got: usize,
    },
    #[error("Unbalanced parentheses: {0}")]
    Unbalanced(String),
    #[error("Unexpected {0}.")]
    UnexpectedToken(String),
    #[error("Unexpected end of expression.")]
    UnexpectedEnd,
    #[error("Expression nests deeper than {0} levels.")]
    TooDeep(usize),
    #[error("Invalid variable symbol \"{0}\": expected a single ASCII letter other than 'e'.")]
    InvalidVariable(String),
    #[error("Independent and dependent variables must differ (both are \"{0}\").")]
    DuplicateVariable(String),
}

/// Raised when an `InitialValueProblem` cannot be constructed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProblemError {
    #[error("{name} must be finite, got {value}.")]
    NonFinite { name: &'static str, value: f64 },
    #[error("Final abscissa ({xf}) must be greater than the initial abscissa ({x0}).")]
    EmptyInterval { x0: f64, xf: f64 },
    #[error("Step size must be positive, got {0}.")]
    NonPositiveStep(f64),
    #[error("Integration would need about {required} steps, more than the limit of {limit}.")]
    TooManySteps { required: f64, limit: usize },
}

/// Only produced when the caller asks integration to stop on blow-up.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum IntegrationError {
    #[error("Solution became non-finite at x = {x} (step {step}).")]
    NonFinite { x: f64, step: usize },
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("Unknown integration method \"{0}\" (expected \"euler\" or \"rk4\").")]
pub struct UnknownMethod(pub String);

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FieldError {
    #[error("Direction field bounds must be finite with max > min on both axes.")]
    InvalidBounds,
    #[error("Arrow scale must be finite and positive, got {0}.")]
    InvalidArrowScale(f64),
    #[error("Slope ceiling must be positive, got {0}.")]
    InvalidSlopeCeiling(f64),
    #[error("A {x} by {y} direction field exceeds the limit of {limit} sample points.")]
    GridTooLarge { x: usize, y: usize, limit: usize },
}

/// Why two trajectories could not be paired. `analyze` reports these as `None`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AlignmentError {
    #[error("No reference solution was supplied.")]
    MissingReference,
    #[error("Trajectory has {candidate} points but the reference has {reference}.")]
    LengthMismatch { candidate: usize, reference: usize },
    #[error("Abscissa {index} differs: {candidate} vs {reference}.")]
    AbscissaMismatch {
        index: usize,
        candidate: f64,
        reference: f64,
    },
    #[error("Reference is undefined at every sample point.")]
    NoValidPairs,
}
