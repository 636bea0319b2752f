//! One-call pipeline: text in, everything a front end plots out.

use crate::analysis::{compare_methods, MethodComparison, ReferenceSolution};
use crate::classifier::{classify_with, EquationProfile};
use crate::direction_field::{sample, DirectionFieldSettings, FieldSegment};
use crate::equation_engine::{compile_with, Variables};
use crate::normalizer::{normalize, CanonicalExpression};
use crate::problem::{InitialValueProblem, IntegrationSettings, Trajectory};
use crate::solvers::Method;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

fn default_methods() -> Vec<Method> {
    Method::ALL.to_vec()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationRequest {
    pub equation: String,
    #[serde(default)]
    pub variables: Variables,
    pub x0: f64,
    pub y0: f64,
    pub xf: f64,
    pub h: f64,
    #[serde(default = "default_methods")]
    pub methods: Vec<Method>,
    #[serde(default)]
    pub integration: IntegrationSettings,
    /// Sample a direction field when present.
    #[serde(default)]
    pub direction_field: Option<DirectionFieldSettings>,
    /// Closed-form solution in the independent variable, tabulated on the
    /// integration grid. Ignored when `reference` is given.
    #[serde(default)]
    pub reference_formula: Option<String>,
    #[serde(default)]
    pub reference: Option<ReferenceSolution>,
}

impl SimulationRequest {
    pub fn new(equation: impl Into<String>, x0: f64, y0: f64, xf: f64, h: f64) -> Self {
        Self {
            equation: equation.into(),
            variables: Variables::default(),
            x0,
            y0,
            xf,
            h,
            methods: default_methods(),
            integration: IntegrationSettings::default(),
            direction_field: None,
            reference_formula: None,
            reference: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationReport {
    pub canonical: CanonicalExpression,
    pub profile: EquationProfile,
    pub trajectories: Vec<Trajectory>,
    pub direction_field: Option<Vec<FieldSegment>>,
    pub reference: Option<ReferenceSolution>,
    pub comparison: Option<MethodComparison>,
}

/// Normalize, compile, classify, integrate with every requested method, then
/// optionally sample a direction field and score the runs against a reference.
pub fn simulate(request: &SimulationRequest) -> Result<SimulationReport> {
    if request.methods.is_empty() {
        bail!("At least one integration method is required.");
    }
    request
        .variables
        .validate()
        .context("Invalid variable symbols")?;

    let canonical = normalize(&request.equation)
        .with_context(|| format!("Failed to normalize \"{}\"", request.equation))?;
    let evaluator = compile_with(&canonical, &request.variables)
        .with_context(|| format!("Failed to compile \"{canonical}\""))?;
    let profile = classify_with(&canonical, &request.variables);

    let problem = InitialValueProblem::with_max_steps(
        &evaluator,
        request.x0,
        request.y0,
        request.xf,
        request.h,
        request.integration.max_steps,
    )
    .context("Invalid initial value problem")?;

    let trajectories = request
        .methods
        .iter()
        .map(|method| {
            method
                .try_integrate(&problem, request.integration.non_finite)
                .with_context(|| format!("{method} integration failed"))
        })
        .collect::<Result<Vec<_>>>()?;

    let direction_field = request
        .direction_field
        .as_ref()
        .map(|settings| sample(&evaluator, settings))
        .transpose()
        .context("Invalid direction field settings")?;

    let reference = match (&request.reference, &request.reference_formula) {
        (Some(reference), _) => Some(reference.clone()),
        (None, Some(formula)) => {
            let grid = trajectories.first().map(Trajectory::xs).unwrap_or_default();
            Some(ReferenceSolution::tabulate(formula, grid, &request.variables)?)
        }
        (None, None) => None,
    };
    let comparison = reference
        .as_ref()
        .map(|reference| compare_methods(&trajectories, Some(reference)));

    log::debug!(
        "simulated {canonical} ({}) with {} method(s)",
        profile.equation_type.label(),
        trajectories.len()
    );

    Ok(SimulationReport {
        canonical,
        profile,
        trajectories,
        direction_field,
        reference,
        comparison,
    })
}
