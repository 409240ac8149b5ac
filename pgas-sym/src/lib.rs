#![forbid(unsafe_code)]

mod error;
mod linear;
mod value;
pub mod solver;

pub use error::SymError;
pub use linear::LinearForm;
pub use solver::{Bounds, ConstraintSolver, RangeSolver, Tristate};
#[cfg(feature = "z3")]
pub use solver::z3_solver::Z3Solver;
pub use value::{SymVal, SymbolId};
