//! Accuracy and cost of integrator runs against a reference solution.

use crate::equation_engine::{compile_with, Variables};
use crate::error::AlignmentError;
use crate::normalizer::normalize;
use crate::problem::Trajectory;
use crate::solvers::Method;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

/// Relative tolerance when checking that two grids share abscissas.
const ABSCISSA_TOLERANCE: f64 = 1e-9;

/// A reference path `{grid, exact, formula}`, typically a closed-form
/// solution tabulated on a candidate's grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceSolution {
    pub grid: Vec<f64>,
    pub exact: Vec<f64>,
    pub formula: String,
}

impl ReferenceSolution {
    /// Evaluates `formula`, a function of the independent variable only, at
    /// every abscissa of `grid`.
    pub fn tabulate(formula: &str, grid: &[f64], variables: &Variables) -> Result<Self> {
        let canonical = normalize(formula)
            .with_context(|| format!("Reference formula \"{formula}\" is not valid"))?;
        let evaluator = compile_with(&canonical, variables)
            .with_context(|| format!("Reference formula \"{formula}\" failed to compile"))?;
        if evaluator.uses_dependent() {
            bail!(
                "Reference formula \"{formula}\" must depend on {} only, not {}.",
                variables.independent,
                variables.dependent
            );
        }
        let exact = grid.iter().map(|&x| evaluator.evaluate(x, 0.0)).collect();
        Ok(Self {
            grid: grid.to_vec(),
            exact,
            formula: canonical.into_string(),
        })
    }

    /// Uses another run (usually a finer or higher-order one on the same
    /// grid) as the reference.
    pub fn from_trajectory(trajectory: &Trajectory) -> Self {
        Self {
            grid: trajectory.xs().to_vec(),
            exact: trajectory.ys().to_vec(),
            formula: format!("{} (h-sampled)", trajectory.method()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorReport {
    pub max_error: f64,
    pub avg_error: f64,
    pub final_error: f64,
    /// Pairings that survived dropping undefined reference values.
    pub compared_points: usize,
    pub evaluation_count: usize,
}

impl ErrorReport {
    /// `max_error / evaluation_count`; lower is better.
    pub fn efficiency(&self) -> f64 {
        if self.evaluation_count == 0 {
            return f64::INFINITY;
        }
        self.max_error / self.evaluation_count as f64
    }
}

/// Compares `candidate` with `reference` point by point.
///
/// Returns `None` when there is no reference, the two cannot be aligned, or
/// the reference is undefined everywhere. A NaN candidate value counts as an
/// infinite error.
pub fn analyze(candidate: &Trajectory, reference: Option<&ReferenceSolution>) -> Option<ErrorReport> {
    match try_analyze(candidate, reference) {
        Ok(report) => Some(report),
        Err(err) => {
            log::debug!("{} error analysis skipped: {err}", candidate.method());
            None
        }
    }
}

fn try_analyze(
    candidate: &Trajectory,
    reference: Option<&ReferenceSolution>,
) -> Result<ErrorReport, AlignmentError> {
    let reference = reference.ok_or(AlignmentError::MissingReference)?;
    if candidate.len() != reference.grid.len() || reference.grid.len() != reference.exact.len() {
        return Err(AlignmentError::LengthMismatch {
            candidate: candidate.len(),
            reference: reference.grid.len().min(reference.exact.len()),
        });
    }

    let mut max_error = 0.0f64;
    let mut sum = 0.0;
    let mut final_error = None;
    let mut compared_points = 0usize;

    for (index, ((x, y), (&grid_x, &exact))) in candidate
        .points()
        .zip(reference.grid.iter().zip(&reference.exact))
        .enumerate()
    {
        if (x - grid_x).abs() > ABSCISSA_TOLERANCE * x.abs().max(1.0) {
            return Err(AlignmentError::AbscissaMismatch {
                index,
                candidate: x,
                reference: grid_x,
            });
        }
        if !exact.is_finite() {
            continue;
        }
        let mut error = (y - exact).abs();
        if error.is_nan() {
            error = f64::INFINITY;
        }
        max_error = max_error.max(error);
        sum += error;
        final_error = Some(error);
        compared_points += 1;
    }

    let final_error = final_error.ok_or(AlignmentError::NoValidPairs)?;
    Ok(ErrorReport {
        max_error,
        avg_error: sum / compared_points as f64,
        final_error,
        compared_points,
        evaluation_count: candidate.evaluation_count(),
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MethodScore {
    pub method: Method,
    pub report: ErrorReport,
    pub efficiency: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MethodComparison {
    pub scores: Vec<MethodScore>,
    /// Lowest efficiency; equal efficiencies go to the method with fewer
    /// evaluations. `None` when no run could be analyzed.
    pub winner: Option<Method>,
}

pub fn compare_methods(
    trajectories: &[Trajectory],
    reference: Option<&ReferenceSolution>,
) -> MethodComparison {
    let scores: Vec<MethodScore> = trajectories
        .iter()
        .filter_map(|trajectory| {
            let report = analyze(trajectory, reference)?;
            Some(MethodScore {
                method: trajectory.method(),
                efficiency: report.efficiency(),
                report,
            })
        })
        .collect();

    let winner = scores
        .iter()
        .min_by(|a, b| {
            a.efficiency
                .total_cmp(&b.efficiency)
                .then(a.report.evaluation_count.cmp(&b.report.evaluation_count))
        })
        .map(|score| score.method);

    MethodComparison { scores, winner }
}
