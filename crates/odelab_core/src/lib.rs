pub mod analysis;
pub mod classifier;
pub mod direction_field;
pub mod equation_engine;
pub mod error;
pub mod normalizer;
pub mod problem;
pub mod simulation;
pub mod solvers;
/// The `odelab_core` crate provides the numerical engine behind odelab, a
/// workbench for scalar first-order ODEs `dy/dx = f(x, y)`.
///
/// Key components:
/// - **Normalizer**: Rewrites LaTeX or plain-text input into one canonical infix form.
/// - **Equation Engine**: Parses canonical text and compiles it to bytecode for a small stack VM.
/// - **Classifier**: Tags the equation (linear, quadratic, trigonometric, ...) from its text.
/// - **Solvers**: Fixed-step Euler and RK4 that always land exactly on the final abscissa.
/// - **Analysis**: Error and efficiency of runs against a reference solution.
/// - **Direction Field**: Aspect-corrected slope arrows over a rectangular window.
/// - **Traits**: `Scalar` (numeric type abstraction), `SlopeFunction` (right-hand sides), `Stepper` (single-step methods).
pub mod traits;

pub use analysis::{analyze, compare_methods, ErrorReport, ReferenceSolution};
pub use classifier::{classify, EquationProfile, EquationType};
pub use direction_field::{sample, Bounds, DirectionFieldSettings, FieldSegment};
pub use equation_engine::{compile, CompiledEvaluator, Variables};
pub use normalizer::{normalize, CanonicalExpression};
pub use problem::{InitialValueProblem, NonFinitePolicy, Trajectory};
pub use simulation::{simulate, SimulationReport, SimulationRequest};
pub use solvers::Method;
