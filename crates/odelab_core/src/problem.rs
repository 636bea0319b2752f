use crate::error::ProblemError;
use crate::solvers::Method;
use crate::traits::SlopeFunction;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Upper bound on the number of steps one integration may take.
pub const DEFAULT_MAX_STEPS: usize = 1_000_000;

/// What an integrator does once an ordinate stops being finite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NonFinitePolicy {
    /// Keep stepping; NaN/±inf flow into the rest of the trajectory.
    #[default]
    Propagate,
    /// Stop and report `IntegrationError::NonFinite`.
    Halt,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IntegrationSettings {
    pub non_finite: NonFinitePolicy,
    pub max_steps: usize,
}

impl Default for IntegrationSettings {
    fn default() -> Self {
        Self {
            non_finite: NonFinitePolicy::Propagate,
            max_steps: DEFAULT_MAX_STEPS,
        }
    }
}

/// `dy/dx = f(x, y)`, `y(x0) = y0`, integrated to `xf` with fixed step `h`.
///
/// Construction validates the numbers once so the integrators can assume
/// `x0 < xf`, `h > 0` and a bounded number of steps.
pub struct InitialValueProblem<'f, F: SlopeFunction + ?Sized> {
    f: &'f F,
    x0: f64,
    y0: f64,
    xf: f64,
    h: f64,
    max_steps: usize,
}

// The slope function is usually a closure or fn item, so it is left out.
impl<'f, F: SlopeFunction + ?Sized> fmt::Debug for InitialValueProblem<'f, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InitialValueProblem")
            .field("x0", &self.x0)
            .field("y0", &self.y0)
            .field("xf", &self.xf)
            .field("h", &self.h)
            .field("max_steps", &self.max_steps)
            .finish_non_exhaustive()
    }
}

impl<'f, F: SlopeFunction + ?Sized> Clone for InitialValueProblem<'f, F> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<'f, F: SlopeFunction + ?Sized> Copy for InitialValueProblem<'f, F> {}

impl<'f, F: SlopeFunction + ?Sized> InitialValueProblem<'f, F> {
    pub fn new(f: &'f F, x0: f64, y0: f64, xf: f64, h: f64) -> Result<Self, ProblemError> {
        Self::with_max_steps(f, x0, y0, xf, h, DEFAULT_MAX_STEPS)
    }

    pub fn with_max_steps(
        f: &'f F,
        x0: f64,
        y0: f64,
        xf: f64,
        h: f64,
        max_steps: usize,
    ) -> Result<Self, ProblemError> {
        for (name, value) in [("x0", x0), ("y0", y0), ("xf", xf), ("h", h)] {
            if !value.is_finite() {
                return Err(ProblemError::NonFinite { name, value });
            }
        }
        if h <= 0.0 {
            return Err(ProblemError::NonPositiveStep(h));
        }
        if xf <= x0 {
            return Err(ProblemError::EmptyInterval { x0, xf });
        }
        let required = ((xf - x0) / h).ceil();
        if required > max_steps as f64 {
            return Err(ProblemError::TooManySteps {
                required,
                limit: max_steps,
            });
        }
        Ok(Self {
            f,
            x0,
            y0,
            xf,
            h,
            max_steps,
        })
    }

    pub fn f(&self) -> &'f F {
        self.f
    }

    pub fn x0(&self) -> f64 {
        self.x0
    }

    pub fn y0(&self) -> f64 {
        self.y0
    }

    pub fn xf(&self) -> f64 {
        self.xf
    }

    pub fn h(&self) -> f64 {
        self.h
    }

    /// Same problem with a different step size, e.g. for convergence studies.
    pub fn with_step(&self, h: f64) -> Result<Self, ProblemError> {
        Self::with_max_steps(self.f, self.x0, self.y0, self.xf, h, self.max_steps)
    }
}

/// Sample path produced by one integrator run.
///
/// `xs` and `ys` always have `step_count + 1` entries; the first point is the
/// initial condition and the last abscissa is exactly `xf`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Trajectory {
    method: Method,
    #[serde(rename = "abscissas")]
    xs: Vec<f64>,
    #[serde(rename = "ordinates")]
    ys: Vec<f64>,
    step_count: usize,
    evaluation_count: usize,
}

impl Trajectory {
    pub(crate) fn new(
        method: Method,
        xs: Vec<f64>,
        ys: Vec<f64>,
        evaluations_per_step: usize,
    ) -> Self {
        debug_assert_eq!(xs.len(), ys.len());
        let step_count = xs.len().saturating_sub(1);
        Self {
            method,
            xs,
            ys,
            step_count,
            evaluation_count: step_count * evaluations_per_step,
        }
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn xs(&self) -> &[f64] {
        &self.xs
    }

    pub fn ys(&self) -> &[f64] {
        &self.ys
    }

    pub fn step_count(&self) -> usize {
        self.step_count
    }

    pub fn evaluation_count(&self) -> usize {
        self.evaluation_count
    }

    pub fn len(&self) -> usize {
        self.xs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.xs.is_empty()
    }

    pub fn points(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.xs.iter().copied().zip(self.ys.iter().copied())
    }

    pub fn last(&self) -> Option<(f64, f64)> {
        Some((*self.xs.last()?, *self.ys.last()?))
    }

    /// True if any ordinate is NaN or infinite.
    pub fn diverged(&self) -> bool {
        self.ys.iter().any(|y| !y.is_finite())
    }
}
