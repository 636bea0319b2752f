//! Method comparison and the one-call simulation entry point.

use crate::equation::WasmEquation;
use odelab_core::analysis::{compare_methods, MethodComparison, ReferenceSolution};
use odelab_core::equation_engine::CompiledEvaluator;
use odelab_core::problem::InitialValueProblem;
use odelab_core::simulation::{simulate as core_simulate, SimulationRequest};
use odelab_core::solvers::Method;
use serde::Deserialize;
use serde_wasm_bindgen::{from_value, to_value};
use wasm_bindgen::prelude::*;

/// What the caller handed over as the reference solution: a closed-form
/// formula string or a `{ grid, exact, formula }` table.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum ReferenceInput {
    Formula(String),
    Table(ReferenceSolution),
}

fn reference_from_js(value: JsValue) -> Result<Option<ReferenceInput>, JsValue> {
    from_value(value).map_err(|e| JsValue::from_str(&format!("Invalid reference solution: {}", e)))
}

/// Runs every method on the same grid and scores them against `reference`.
pub(crate) fn compare_runs(
    evaluator: &CompiledEvaluator,
    x0: f64,
    y0: f64,
    xf: f64,
    h: f64,
    reference: Option<ReferenceInput>,
) -> anyhow::Result<MethodComparison> {
    let problem = InitialValueProblem::new(evaluator, x0, y0, xf, h)?;
    let runs: Vec<_> = Method::ALL.iter().map(|method| method.integrate(&problem)).collect();
    let reference = match reference {
        None => None,
        Some(ReferenceInput::Formula(formula)) => Some(ReferenceSolution::tabulate(
            &formula,
            runs[0].xs(),
            evaluator.variables(),
        )?),
        Some(ReferenceInput::Table(table)) => Some(table),
    };
    Ok(compare_methods(&runs, reference.as_ref()))
}

#[wasm_bindgen]
impl WasmEquation {
    /// `reference` may be a closed-form formula string, a
    /// `{ grid, exact, formula }` object, or null.
    pub fn compare(
        &self,
        x0: f64,
        y0: f64,
        xf: f64,
        h: f64,
        reference: JsValue,
    ) -> Result<JsValue, JsValue> {
        let reference = reference_from_js(reference)?;
        let comparison = compare_runs(&self.evaluator, x0, y0, xf, h, reference)
            .map_err(|e| JsValue::from_str(&format!("Comparison failed: {:#}", e)))?;
        to_value(&comparison).map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
    }
}

#[wasm_bindgen]
pub fn simulate(request: JsValue) -> Result<JsValue, JsValue> {
    console_error_panic_hook::set_once();

    let request: SimulationRequest = from_value(request)
        .map_err(|e| JsValue::from_str(&format!("Invalid simulation request: {}", e)))?;
    let report = core_simulate(&request)
        .map_err(|e| JsValue::from_str(&format!("Simulation failed: {:#}", e)))?;
    to_value(&report).map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
}
