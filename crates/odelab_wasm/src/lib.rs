//! Browser bindings for `odelab_core`.
//!
//! `WasmEquation` wraps one compiled right-hand side; `simulate` runs the
//! whole pipeline from a single request object. Errors cross the boundary as
//! strings prefixed with the operation that failed.

mod analysis;
mod equation;

pub use analysis::simulate;
pub use equation::WasmEquation;
