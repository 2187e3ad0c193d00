//! Tree Configuration
//!
//! Configuration shared by the classification and prescriptive drivers, and the
//! JSON persistence trait used for configurations and fitted trees.
use crate::constants::{DEFAULT_TIME_LIMIT, MAX_DEPTH};
use crate::errors::FlowTreeError;
use hashbrown::HashSet;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// How the flow network enters the model.
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum Formulation {
    /// Every flow variable and constraint is declared up front.
    #[default]
    Direct,
    /// Only the tree structure is declared; per-datapoint subproblems are
    /// separated lazily from inside the search.
    Benders,
}

fn default_depth() -> usize {
    1
}
fn default_time_limit() -> Option<f64> {
    Some(DEFAULT_TIME_LIMIT)
}
fn default_separate_fractional() -> bool {
    true
}

/// Configuration of a tree fit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TreeConfig {
    /// Depth of the complete tree the model may use.
    #[serde(default = "default_depth")]
    pub depth: usize,
    /// Wall-clock limit of the search in seconds.
    #[serde(default = "default_time_limit")]
    pub time_limit: Option<f64>,
    /// Limit on the number of search nodes.
    #[serde(default)]
    pub node_limit: Option<usize>,
    /// Number of threads for the separation oracle.
    #[serde(default)]
    pub num_threads: Option<usize>,
    #[serde(default)]
    pub formulation: Formulation,
    /// Treatments that may never be assigned.
    #[serde(default)]
    pub treatments_filter: Option<HashSet<usize>>,
    /// Let the Benders oracle also separate at fractional nodes.
    #[serde(default = "default_separate_fractional")]
    pub separate_fractional: bool,
    /// Log search progress every N nodes.
    #[serde(default)]
    pub log_interval: usize,
}

impl Default for TreeConfig {
    fn default() -> Self {
        TreeConfig {
            depth: 1,
            time_limit: Some(DEFAULT_TIME_LIMIT),
            node_limit: None,
            num_threads: None,
            formulation: Formulation::Direct,
            treatments_filter: None,
            separate_fractional: true,
            log_interval: 0,
        }
    }
}

impl TreeConfig {
    pub fn validate_parameters(&self) -> Result<(), FlowTreeError> {
        if self.depth > MAX_DEPTH {
            return Err(FlowTreeError::InvalidParameter(
                "depth".to_string(),
                format!("a value no larger than {}", MAX_DEPTH),
                self.depth.to_string(),
            ));
        }
        if let Some(t) = self.time_limit {
            if !(t > 0.0) {
                return Err(FlowTreeError::InvalidParameter(
                    "time_limit".to_string(),
                    "a positive number of seconds".to_string(),
                    t.to_string(),
                ));
            }
        }
        if self.num_threads == Some(0) {
            return Err(FlowTreeError::InvalidParameter(
                "num_threads".to_string(),
                "at least one thread".to_string(),
                "0".to_string(),
            ));
        }
        Ok(())
    }

    /// Set the depth of the tree.
    pub fn set_depth(mut self, depth: usize) -> Self {
        self.depth = depth;
        self
    }

    /// Set the time limit in seconds, `None` for no limit.
    pub fn set_time_limit(mut self, time_limit: Option<f64>) -> Self {
        self.time_limit = time_limit;
        self
    }

    /// Set the node limit of the search.
    pub fn set_node_limit(mut self, node_limit: Option<usize>) -> Self {
        self.node_limit = node_limit;
        self
    }

    /// Set the number of threads.
    /// * `num_threads` - Threads used to separate datapoints, all cores if `None`.
    pub fn set_num_threads(mut self, num_threads: Option<usize>) -> Self {
        self.num_threads = num_threads;
        self
    }

    /// Set the formulation.
    pub fn set_formulation(mut self, formulation: Formulation) -> Self {
        self.formulation = formulation;
        self
    }

    /// Set the treatments that may not be prescribed.
    pub fn set_treatments_filter(mut self, treatments_filter: Option<HashSet<usize>>) -> Self {
        self.treatments_filter = treatments_filter;
        self
    }

    /// Set whether the Benders oracle separates fractional points.
    pub fn set_separate_fractional(mut self, separate_fractional: bool) -> Self {
        self.separate_fractional = separate_fractional;
        self
    }

    /// Set the progress logging interval.
    pub fn set_log_interval(mut self, log_interval: usize) -> Self {
        self.log_interval = log_interval;
        self
    }
}

/// IO
pub trait TreeIO: Serialize + DeserializeOwned + Sized {
    /// Save as a json object to a file.
    ///
    /// * `path` - Path to save to.
    fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), FlowTreeError> {
        fs::write(path, self.json_dump()?).map_err(|e| FlowTreeError::UnableToWrite(e.to_string()))
    }

    /// Dump as a json object
    fn json_dump(&self) -> Result<String, FlowTreeError> {
        serde_json::to_string(self).map_err(|e| FlowTreeError::UnableToWrite(e.to_string()))
    }

    /// Load from a json string
    fn from_json(json_str: &str) -> Result<Self, FlowTreeError> {
        serde_json::from_str::<Self>(json_str).map_err(|e| FlowTreeError::UnableToRead(e.to_string()))
    }

    /// Load from a path to a json object.
    fn load<P: AsRef<Path>>(path: P) -> Result<Self, FlowTreeError> {
        let json_str = fs::read_to_string(path).map_err(|e| FlowTreeError::UnableToRead(e.to_string()))?;
        Self::from_json(&json_str)
    }
}

impl TreeIO for TreeConfig {}
