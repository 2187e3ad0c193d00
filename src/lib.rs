// Modules
pub mod benders;
pub mod classification;
pub mod config;
pub mod constants;
pub mod data;
pub mod errors;
pub mod fairness;
pub mod formulation;
pub mod learner;
pub mod objective;
pub mod prescriptive;
pub mod solver;
pub mod tree;
pub mod validation;

// Individual classes, and functions
pub use classification::{ClassificationMode, ClassificationTree};
pub use config::{Formulation, TreeConfig, TreeIO};
pub use data::Matrix;
pub use errors::FlowTreeError;
pub use fairness::{FairClassificationTree, FairnessType};
pub use prescriptive::{OutcomeSignals, PrescriptiveTree};
pub use tree::FittedTree;
