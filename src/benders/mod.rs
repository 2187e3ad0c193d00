//! Benders
//!
//! Decomposition of the flow model into a master problem over the tree structure
//! and one subproblem per datapoint. Subproblems are never solved as LPs: the
//! separation oracle routes each datapoint through the candidate tree and adds a
//! cut whenever the master over-estimates what the datapoint can contribute.
pub mod master;
pub mod oracle;
pub mod stats;

pub use master::{build_master, MasterModel};
pub use oracle::BendersOracle;
pub use stats::{CallbackReport, CallbackStats};
