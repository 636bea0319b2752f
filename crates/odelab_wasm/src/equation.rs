//! Compiled equation wrapper: evaluation, integration and direction fields.

use anyhow::Context;
use js_sys::Float64Array;
use odelab_core::classifier::{classify_with, EquationProfile};
use odelab_core::direction_field::{sample, DirectionFieldSettings, FieldSegment};
use odelab_core::equation_engine::{compile_with, CompiledEvaluator, Variables};
use odelab_core::normalizer::normalize;
use odelab_core::problem::{InitialValueProblem, Trajectory};
use odelab_core::solvers::Method;
use serde_wasm_bindgen::{from_value, to_value};
use wasm_bindgen::prelude::*;

#[wasm_bindgen]
pub struct WasmEquation {
    pub(crate) evaluator: CompiledEvaluator,
    profile: EquationProfile,
    last: Option<Trajectory>,
}

pub(crate) fn variables_from(
    independent: Option<String>,
    dependent: Option<String>,
) -> anyhow::Result<Variables> {
    let defaults = Variables::default();
    let variables = Variables::new(
        independent.as_deref().unwrap_or(&defaults.independent),
        dependent.as_deref().unwrap_or(&defaults.dependent),
    )?;
    Ok(variables)
}

pub(crate) fn build_equation(
    equation: &str,
    variables: &Variables,
) -> anyhow::Result<WasmEquation> {
    let canonical = normalize(equation).with_context(|| format!("Cannot read \"{equation}\""))?;
    let evaluator = compile_with(&canonical, variables)?;
    let profile = classify_with(&canonical, variables);
    Ok(WasmEquation {
        evaluator,
        profile,
        last: None,
    })
}

pub(crate) fn run(
    evaluator: &CompiledEvaluator,
    method: &str,
    x0: f64,
    y0: f64,
    xf: f64,
    h: f64,
) -> anyhow::Result<Trajectory> {
    let method: Method = method.parse()?;
    let problem = InitialValueProblem::new(evaluator, x0, y0, xf, h)?;
    Ok(method.integrate(&problem))
}

/// Flattens segments to `[x0, y0, x1, y1, ...]` for line drawing.
pub(crate) fn flatten_segments(segments: &[FieldSegment]) -> Vec<f64> {
    segments
        .iter()
        .flat_map(|s| [s.start[0], s.start[1], s.end[0], s.end[1]])
        .collect()
}

fn field_settings(settings: JsValue) -> Result<DirectionFieldSettings, JsValue> {
    if settings.is_undefined() || settings.is_null() {
        return Ok(DirectionFieldSettings::default());
    }
    from_value(settings)
        .map_err(|e| JsValue::from_str(&format!("Invalid direction field settings: {}", e)))
}

#[wasm_bindgen]
impl WasmEquation {
    #[wasm_bindgen(constructor)]
    pub fn new(
        equation: &str,
        independent: Option<String>,
        dependent: Option<String>,
    ) -> Result<WasmEquation, JsValue> {
        console_error_panic_hook::set_once();

        variables_from(independent, dependent)
            .and_then(|variables| build_equation(equation, &variables))
            .map_err(|e| JsValue::from_str(&format!("Equation setup failed: {:#}", e)))
    }

    pub fn canonical(&self) -> String {
        self.evaluator.source().to_string()
    }

    pub fn profile(&self) -> Result<JsValue, JsValue> {
        to_value(&self.profile).map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
    }

    pub fn type_label(&self) -> String {
        self.profile.equation_type.label().to_string()
    }

    pub fn evaluate(&self, x: f64, y: f64) -> f64 {
        self.evaluator.evaluate(x, y)
    }

    /// Integrates and keeps the result for `abscissas`/`ordinates`.
    pub fn integrate(
        &mut self,
        method: &str,
        x0: f64,
        y0: f64,
        xf: f64,
        h: f64,
    ) -> Result<JsValue, JsValue> {
        let trajectory = run(&self.evaluator, method, x0, y0, xf, h)
            .map_err(|e| JsValue::from_str(&format!("Integration failed: {:#}", e)))?;
        let value = to_value(&trajectory)
            .map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)));
        self.last = Some(trajectory);
        value
    }

    pub fn abscissas(&self) -> Float64Array {
        Float64Array::from(self.last.as_ref().map(Trajectory::xs).unwrap_or_default())
    }

    pub fn ordinates(&self) -> Float64Array {
        Float64Array::from(self.last.as_ref().map(Trajectory::ys).unwrap_or_default())
    }

    pub fn step_count(&self) -> usize {
        self.last.as_ref().map_or(0, Trajectory::step_count)
    }

    pub fn evaluation_count(&self) -> usize {
        self.last.as_ref().map_or(0, Trajectory::evaluation_count)
    }

    pub fn direction_field(&self, settings: JsValue) -> Result<JsValue, JsValue> {
        let settings = field_settings(settings)?;
        let segments = sample(&self.evaluator, &settings)
            .map_err(|e| JsValue::from_str(&format!("Direction field failed: {}", e)))?;
        to_value(&segments).map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
    }

    /// Same as `direction_field`, packed as `[x0, y0, x1, y1, ...]` per segment.
    pub fn direction_field_lines(&self, settings: JsValue) -> Result<Float64Array, JsValue> {
        let settings = field_settings(settings)?;
        let segments = sample(&self.evaluator, &settings)
            .map_err(|e| JsValue::from_str(&format!("Direction field failed: {}", e)))?;
        Ok(Float64Array::from(flatten_segments(&segments).as_slice()))
    }
}


#[cfg(all(test, target_arch = "wasm32"))]
mod wasm_tests {
    use super::WasmEquation;
    use wasm_bindgen::JsValue;
    use wasm_bindgen_test::wasm_bindgen_test;

    #[wasm_bindgen_test]
    fn integrate_exposes_typed_arrays() {
        let mut equation = WasmEquation::new("y", None, None).expect("equation");
        equation
            .integrate("rk4", 0.0, 1.0, 1.0, 0.25)
            .expect("integration should succeed");
        assert_eq!(equation.abscissas().length(), 5);
        assert_eq!(equation.ordinates().length(), 5);
        assert_eq!(equation.step_count(), 4);
        assert_eq!(equation.evaluation_count(), 16);
    }

    #[wasm_bindgen_test]
    fn constructor_reports_parse_errors() {
        let message = WasmEquation::new("2 +* )", None, None)
            .err()
            .and_then(|err| err.as_string())
            .unwrap_or_default();
        assert!(message.starts_with("Equation setup failed"));
    }

    #[wasm_bindgen_test]
    fn direction_field_defaults_when_settings_missing() {
        let equation = WasmEquation::new("x", None, None).expect("equation");
        let lines = equation
            .direction_field_lines(JsValue::UNDEFINED)
            .expect("field");
        assert_eq!(lines.length(), 4 * 441);
    }
}
