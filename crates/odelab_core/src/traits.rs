use num_traits::{Float, FromPrimitive};
use std::fmt::Debug;

/// A trait for types the bytecode VM can evaluate in.
/// Must support basic arithmetic, debug printing, and conversion from f64.
pub trait Scalar: Float + FromPrimitive + Debug + 'static {}

impl<T: Float + FromPrimitive + Debug + 'static> Scalar for T {}

/// Right-hand side `f(x, y)` of a scalar first-order ODE `dy/dx = f(x, y)`.
///
/// Implementations must be pure: the integrators and the direction-field
/// sampler call `slope` any number of times, in any order, possibly from
/// several threads.
pub trait SlopeFunction {
    /// x: independent variable
    /// y: dependent variable
    fn slope(&self, x: f64, y: f64) -> f64;
}

impl<F> SlopeFunction for F
where
    F: Fn(f64, f64) -> f64,
{
    fn slope(&self, x: f64, y: f64) -> f64 {
        self(x, y)
    }
}

/// A trait for single-step methods that advance `(x, y)` by one step.
pub trait Stepper {
    /// Number of `slope` evaluations performed by one call to `step`.
    fn evaluations_per_step(&self) -> usize;

    /// Order of the global truncation error.
    fn order(&self) -> u32;

    /// Performs one step of size h starting at (x, y) and returns the new ordinate.
    /// The caller owns the abscissa bookkeeping.
    fn step(&self, f: &(impl SlopeFunction + ?Sized), x: f64, y: f64, h: f64) -> f64;
}
