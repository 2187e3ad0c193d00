//! Solver
//!
//! A small mixed-integer engine: model registration, branch and bound over binary
//! variables, and a callback seam for lazy constraints.
pub mod branch_and_bound;
pub mod callback;
pub mod model;

pub use branch_and_bound::{SolveOutcome, SolveStatus, Solver, SolverSettings};
pub use callback::{Callback, CallbackContext, CallbackWhere, LazyCuts};
pub use model::{Constraint, Direction, LinExpr, Model, Sense, VarId, VarType};
