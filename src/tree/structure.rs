//! Structure values
//!
//! A snapshot of the structural decisions `b`, `p` and `w` of a tree, and the
//! deterministic routing of a datapoint through them.
use super::topology::TreeTopology;
use crate::constants::SELECTION_THRESHOLD;
use crate::errors::FlowTreeError;
use serde::{Deserialize, Serialize};

/// Role of a node under a structural assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeStatus {
    /// Branches on the given feature.
    Branching(usize),
    /// Predicts the given treatment.
    Terminal(usize),
    /// Below a terminal ancestor.
    Pruned,
    /// Neither branches nor predicts, which no feasible assignment allows.
    Undetermined,
}

/// Values of the structural variables, indexed the way the model declares them:
/// `b[(n - 1) * n_features + f]` for internal nodes, `p[n - 1]` and
/// `w[(n - 1) * n_treatments + k]` for every node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructureValues {
    pub n_features: usize,
    pub n_treatments: usize,
    pub b: Vec<f64>,
    pub p: Vec<f64>,
    pub w: Vec<f64>,
}

/// Root-to-terminal path taken by one datapoint.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TreePath {
    /// Path nodes whose left arc leaves the path.
    pub left: Vec<usize>,
    /// Path nodes whose right arc leaves the path.
    pub right: Vec<usize>,
    /// Every node on the path, root first.
    pub target: Vec<usize>,
    pub terminal: usize,
    pub treatment: usize,
}

impl StructureValues {
    pub fn b(&self, n: usize, f: usize) -> f64 {
        self.b[(n - 1) * self.n_features + f]
    }

    pub fn p(&self, n: usize) -> f64 {
        self.p[n - 1]
    }

    pub fn w(&self, n: usize, k: usize) -> f64 {
        self.w[(n - 1) * self.n_treatments + k]
    }

    /// Treatment with the largest selected weight at `n`, if any is selected.
    fn assigned_treatment(&self, n: usize) -> Option<usize> {
        (0..self.n_treatments)
            .filter(|k| self.w(n, *k) > SELECTION_THRESHOLD)
            .max_by(|a, b| self.w(n, *a).total_cmp(&self.w(n, *b)))
    }

    pub fn node_status(&self, topology: &TreeTopology, n: usize) -> NodeStatus {
        if topology.ancestors(n).iter().any(|m| self.p(*m) > SELECTION_THRESHOLD) {
            return NodeStatus::Pruned;
        }
        if self.p(n) > SELECTION_THRESHOLD {
            return match self.assigned_treatment(n) {
                Some(k) => NodeStatus::Terminal(k),
                None => NodeStatus::Undetermined,
            };
        }
        if topology.is_internal(n) {
            if let Some(f) = (0..self.n_features).find(|f| self.b(n, *f) > SELECTION_THRESHOLD) {
                return NodeStatus::Branching(f);
            }
        }
        NodeStatus::Undetermined
    }

    /// Follow the branching decisions from the root for a row of binary features.
    ///
    /// * `row` - Feature values of the datapoint, `true` for one.
    /// * `datapoint` - Row index, only used to report an inconsistency.
    pub fn route(&self, topology: &TreeTopology, row: &[bool], datapoint: usize) -> Result<TreePath, FlowTreeError> {
        let mut path = TreePath::default();
        let mut current = topology.root();
        loop {
            path.target.push(current);
            match self.node_status(topology, current) {
                NodeStatus::Terminal(k) => {
                    if topology.is_internal(current) {
                        path.left.push(current);
                        path.right.push(current);
                    }
                    path.terminal = current;
                    path.treatment = k;
                    return Ok(path);
                }
                NodeStatus::Branching(f) => {
                    if row[f] {
                        path.left.push(current);
                        current = topology.right_child(current);
                    } else {
                        path.right.push(current);
                        current = topology.left_child(current);
                    }
                }
                NodeStatus::Pruned | NodeStatus::Undetermined => {
                    return Err(FlowTreeError::StructuralInconsistency {
                        datapoint,
                        node: current,
                    });
                }
            }
        }
    }
}
