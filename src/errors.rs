//! Errors
//!
//! Custom error types used throughout the `flowtree` crate.
use crate::solver::SolveStatus;
use thiserror::Error;

/// Errors that can occur while building, solving or using a flow tree.
#[derive(Debug, Error)]
pub enum FlowTreeError {
    /// Two inputs that must describe the same datapoints have different lengths.
    #[error("Found input variables with inconsistent numbers of samples: {0} has {2} rows, expected {1}.")]
    ShapeMismatch(String, usize, usize),
    /// No rows or no columns were provided.
    #[error("Input data must contain at least one row and one column.")]
    EmptyData,
    /// Columns of the covariate matrix that hold values other than 0 or 1.
    #[error("Found columns {0:?} that contain values other than 0 or 1.")]
    NonBinaryFeatures(Vec<usize>),
    /// Datapoint index and offending weight.
    #[error("Inverse propensity weights must be in the range (0, 1], found {1} at row {0}.")]
    InvalidPropensity(usize, f64),
    /// The treatment vector does not enumerate `0..K-1` densely.
    #[error("The set of treatments must be discrete starting from {{0, 1, ...}}.")]
    NonDenseTreatments,
    /// First value is the number of treatments, second is the number of columns provided.
    #[error("Found counterfactual estimates for {1} treatments. There are {0} unique treatments in the data.")]
    CounterfactualShape(usize, usize),
    /// Outcome (or counterfactual estimate) that is NaN or infinite.
    #[error("Outcome at row {0} is not a finite number.")]
    NonFiniteOutcome(usize),
    /// The treatment filter excludes every treatment.
    #[error("The treatment filter {0:?} excludes all {1} treatments.")]
    EmptyTreatmentSet(Vec<usize>, usize),
    /// First value is the name of the parameter, second is expected, third is what was passed.
    #[error("Invalid parameter value passed for {0}, expected {1} but {2} provided.")]
    InvalidParameter(String, String, String),
    /// Prediction data with a different number of columns than the training data.
    #[error("Columns of the input do not match the fitted tree: expected {0}, found {1}.")]
    ColumnMismatch(usize, usize),
    /// `predict` (or an accessor of fitted values) was called before `fit`.
    #[error("The tree has not been fitted yet.")]
    NotFitted,
    /// A candidate the solver believes is integral routes a datapoint to no terminal node.
    #[error("Datapoint {datapoint} reaches node {node}, which neither branches nor predicts.")]
    StructuralInconsistency {
        /// Row of the datapoint being routed.
        datapoint: usize,
        /// Node at which routing got stuck.
        node: usize,
    },
    /// The LP engine failed in an unexpected way.
    #[error("Solver error: {0}")]
    Solver(String),
    /// The search finished without any feasible tree.
    #[error("No feasible tree found (solver status {0:?}).")]
    NoFeasibleTree(SolveStatus),
    /// Unable to build the worker pool.
    #[error("Unable to build thread pool: {0}")]
    ThreadPool(String),
    /// Unable to write model to file.
    #[error("Unable to write model to file: {0}")]
    UnableToWrite(String),
    /// Unable to read model from file.
    #[error("Unable to read model from a file {0}")]
    UnableToRead(String),
}
