use crate::error::{IntegrationError, UnknownMethod};
use crate::problem::{InitialValueProblem, NonFinitePolicy, Trajectory};
use crate::traits::{SlopeFunction, Stepper};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A planned abscissa this close below `xf` (relative to `h`) is treated as
/// the final point, so rounding never leaves a sliver step at the end.
const LANDING_TOLERANCE: f64 = 1e-9;

/// Explicit (forward) Euler, order 1.
#[derive(Debug, Clone, Copy, Default)]
pub struct Euler;

impl Stepper for Euler {
    fn evaluations_per_step(&self) -> usize {
        1
    }

    fn order(&self) -> u32 {
        1
    }

    fn step(&self, f: &(impl SlopeFunction + ?Sized), x: f64, y: f64, h: f64) -> f64 {
        y + h * f.slope(x, y)
    }
}

/// Classic Runge-Kutta 4th Order Solver
#[derive(Debug, Clone, Copy, Default)]
pub struct RK4;

impl Stepper for RK4 {
    fn evaluations_per_step(&self) -> usize {
        4
    }

    fn order(&self) -> u32 {
        4
    }

    fn step(&self, f: &(impl SlopeFunction + ?Sized), x: f64, y: f64, h: f64) -> f64 {
        let half = 0.5 * h;

        // k1 = f(x, y)
        let k1 = f.slope(x, y);
        // k2 = f(x + h/2, y + h*k1/2)
        let k2 = f.slope(x + half, y + half * k1);
        // k3 = f(x + h/2, y + h*k2/2)
        let k3 = f.slope(x + half, y + half * k2);
        // k4 = f(x + h, y + h*k3)
        let k4 = f.slope(x + h, y + h * k3);

        // y_next = y + h/6 * (k1 + 2k2 + 2k3 + k4)
        y + h / 6.0 * (k1 + 2.0 * k2 + 2.0 * k3 + k4)
    }
}

/// The integrators a caller can pick by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Method {
    Euler,
    #[serde(rename = "rk4")]
    RungeKutta4,
}

impl Method {
    pub const ALL: [Method; 2] = [Method::Euler, Method::RungeKutta4];

    pub fn name(self) -> &'static str {
        match self {
            Method::Euler => "Euler",
            Method::RungeKutta4 => "RK4",
        }
    }

    pub fn evaluations_per_step(self) -> usize {
        match self {
            Method::Euler => Euler.evaluations_per_step(),
            Method::RungeKutta4 => RK4.evaluations_per_step(),
        }
    }

    pub fn order(self) -> u32 {
        match self {
            Method::Euler => Euler.order(),
            Method::RungeKutta4 => RK4.order(),
        }
    }

    /// Integrates letting NaN/±inf propagate through the rest of the path.
    pub fn integrate<F: SlopeFunction + ?Sized>(
        self,
        problem: &InitialValueProblem<'_, F>,
    ) -> Trajectory {
        self.march(problem, NonFinitePolicy::Propagate).0
    }

    pub fn try_integrate<F: SlopeFunction + ?Sized>(
        self,
        problem: &InitialValueProblem<'_, F>,
        policy: NonFinitePolicy,
    ) -> Result<Trajectory, IntegrationError> {
        match self.march(problem, policy) {
            (_, Some(err)) => Err(err),
            (trajectory, None) => Ok(trajectory),
        }
    }

    fn march<F: SlopeFunction + ?Sized>(
        self,
        problem: &InitialValueProblem<'_, F>,
        policy: NonFinitePolicy,
    ) -> (Trajectory, Option<IntegrationError>) {
        match self {
            Method::Euler => march(&Euler, self, problem, policy),
            Method::RungeKutta4 => march(&RK4, self, problem, policy),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Method {
    type Err = UnknownMethod;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "euler" => Ok(Method::Euler),
            "rk4" | "runge-kutta-4" | "rungekutta4" | "runge-kutta" => Ok(Method::RungeKutta4),
            _ => Err(UnknownMethod(s.to_string())),
        }
    }
}

/// Fixed-step loop shared by every `Stepper`.
///
/// Abscissas are `x0 + n*h` rather than a running sum, and the step that
/// would reach or pass `xf` is clipped so the last abscissa is exactly `xf`.
fn march<S: Stepper, F: SlopeFunction + ?Sized>(
    stepper: &S,
    method: Method,
    problem: &InitialValueProblem<'_, F>,
    policy: NonFinitePolicy,
) -> (Trajectory, Option<IntegrationError>) {
    let f = problem.f();
    let (x0, xf, h) = (problem.x0(), problem.xf(), problem.h());
    let capacity = ((xf - x0) / h).ceil() as usize + 1;
    let mut xs = Vec::with_capacity(capacity);
    let mut ys = Vec::with_capacity(capacity);

    let mut x = x0;
    let mut y = problem.y0();
    let mut n = 0usize;
    let mut reported = false;
    xs.push(x);
    ys.push(y);

    while x < xf {
        let planned = x0 + (n + 1) as f64 * h;
        let (dx, next) = if planned >= xf - LANDING_TOLERANCE * h {
            (xf - x, xf)
        } else {
            (h, planned)
        };
        y = stepper.step(f, x, y, dx);
        x = next;
        n += 1;
        xs.push(x);
        ys.push(y);

        if !y.is_finite() && !reported {
            reported = true;
            match policy {
                NonFinitePolicy::Halt => {
                    let partial = Trajectory::new(method, xs, ys, stepper.evaluations_per_step());
                    return (partial, Some(IntegrationError::NonFinite { x, step: n }));
                }
                NonFinitePolicy::Propagate => {
                    log::warn!("{method}: solution became non-finite at x = {x} (step {n})");
                }
            }
        }
    }

    log::debug!("{method}: integrated [{x0}, {xf}] with h = {h} in {n} steps");
    (
        Trajectory::new(method, xs, ys, stepper.evaluations_per_step()),
        None,
    )
}

#[cfg(test)]
mod tests {
    use super::{Euler, Method, RK4};
    use crate::equation_engine::compile;
    use crate::error::IntegrationError;
    use crate::normalizer::normalize;
    use crate::problem::{InitialValueProblem, NonFinitePolicy};
    use crate::traits::Stepper;

    fn growth(_x: f64, y: f64) -> f64 {
        y
    }

    #[test]
    fn euler_matches_hand_computed_scenario() {
        let problem = InitialValueProblem::new(&growth, 0.0, 1.0, 1.5, 0.5).expect("valid problem");
        let trajectory = Method::Euler.integrate(&problem);
        assert_eq!(trajectory.xs(), &[0.0, 0.5, 1.0, 1.5]);
        assert_eq!(trajectory.ys(), &[1.0, 1.5, 2.25, 3.375]);

        let (_, y_final) = trajectory.last().expect("non-empty trajectory");
        let error = (1.5f64.exp() - y_final).abs();
        assert!((error - 1.1067).abs() < 1e-3, "final error was {}", error);
    }

    #[test]
    fn rk4_reaches_e_at_unit_abscissa() {
        let problem = InitialValueProblem::new(&growth, 0.0, 1.0, 1.5, 0.5).expect("valid problem");
        let trajectory = Method::RungeKutta4.integrate(&problem);
        assert_eq!(trajectory.xs()[2], 1.0);
        let y = trajectory.ys()[2];
        assert!((y - std::f64::consts::E).abs() < 1e-3, "y(1) was {}", y);
    }

    #[test]
    fn last_abscissa_lands_exactly_on_xf() {
        let problem = InitialValueProblem::new(&growth, 0.0, 1.0, 1.0, 0.3).expect("valid problem");
        for method in Method::ALL {
            let trajectory = method.integrate(&problem);
            assert_eq!(trajectory.step_count(), 4);
            assert_eq!(trajectory.len(), 5);
            assert_eq!(trajectory.xs()[4], 1.0);
            assert!((trajectory.xs()[3] - 0.9).abs() < 1e-12);
        }
    }

    #[test]
    fn evaluation_counts_follow_stage_counts() {
        let problem = InitialValueProblem::new(&growth, 0.0, 1.0, 1.0, 0.3).expect("valid problem");
        assert_eq!(Method::Euler.integrate(&problem).evaluation_count(), 4);
        assert_eq!(Method::RungeKutta4.integrate(&problem).evaluation_count(), 16);

        let problem = InitialValueProblem::new(&growth, 0.0, 1.0, 2.0, 0.01).expect("valid problem");
        let euler = Method::Euler.integrate(&problem);
        let rk4 = Method::RungeKutta4.integrate(&problem);
        assert_eq!(euler.step_count(), 200);
        assert_eq!(euler.evaluation_count(), euler.step_count());
        assert_eq!(rk4.evaluation_count(), 4 * rk4.step_count());
    }

    #[test]
    fn halving_the_step_shows_expected_convergence_order() {
        let exact = std::f64::consts::E;
        let final_error = |method: Method, h: f64| {
            let problem = InitialValueProblem::new(&growth, 0.0, 1.0, 1.0, h).expect("valid problem");
            let (_, y) = method.integrate(&problem).last().expect("non-empty trajectory");
            (exact - y).abs()
        };

        let euler_ratio = final_error(Method::Euler, 0.1) / final_error(Method::Euler, 0.05);
        assert!((euler_ratio - 2.0).abs() < 0.4, "Euler ratio was {}", euler_ratio);

        let rk4_ratio = final_error(Method::RungeKutta4, 0.1) / final_error(Method::RungeKutta4, 0.05);
        assert!((rk4_ratio - 16.0).abs() < 3.2, "RK4 ratio was {}", rk4_ratio);
    }

    #[test]
    fn non_finite_values_propagate_by_default() {
        let blows_up = |x: f64, _y: f64| if x >= 0.5 { f64::NAN } else { 1.0 };
        let problem = InitialValueProblem::new(&blows_up, 0.0, 0.0, 1.0, 0.25).expect("valid problem");
        let trajectory = Method::Euler.integrate(&problem);
        assert_eq!(trajectory.len(), 5);
        assert_eq!(trajectory.ys()[2], 0.5);
        assert!(trajectory.ys()[3].is_nan());
        assert!(trajectory.ys()[4].is_nan());
        assert_eq!(trajectory.xs()[4], 1.0);
        assert!(trajectory.diverged());
    }

    #[test]
    fn halt_policy_reports_first_non_finite_point() {
        let blows_up = |x: f64, _y: f64| if x >= 0.5 { f64::NAN } else { 1.0 };
        let problem = InitialValueProblem::new(&blows_up, 0.0, 0.0, 1.0, 0.25).expect("valid problem");
        let err = Method::Euler
            .try_integrate(&problem, NonFinitePolicy::Halt)
            .expect_err("integration should halt");
        assert_eq!(err, IntegrationError::NonFinite { x: 0.75, step: 3 });

        let ok = Method::Euler.try_integrate(&problem, NonFinitePolicy::Propagate);
        assert!(ok.is_ok());
    }

    #[test]
    fn compiled_evaluator_drives_the_integrators() {
        let evaluator = compile(&normalize("dy/dx = y").expect("normalize")).expect("compile");
        let problem = InitialValueProblem::new(&evaluator, 0.0, 1.0, 1.5, 0.5).expect("valid problem");
        assert_eq!(Method::Euler.integrate(&problem).ys(), &[1.0, 1.5, 2.25, 3.375]);
    }

    #[test]
    fn steppers_report_their_order() {
        assert_eq!(Euler.order(), 1);
        assert_eq!(RK4.order(), 4);
        assert_eq!(Method::RungeKutta4.order(), 4);
    }

    #[test]
    fn parses_method_names() {
        assert_eq!("rk4".parse::<Method>(), Ok(Method::RungeKutta4));
        assert_eq!(" Euler ".parse::<Method>(), Ok(Method::Euler));
        assert!("midpoint".parse::<Method>().is_err());
        assert_eq!(Method::RungeKutta4.to_string(), "RK4");
    }
}
