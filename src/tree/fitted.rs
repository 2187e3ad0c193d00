//! Fitted tree
//!
//! The structure read back from a solve, and prediction by traversal.
use super::structure::{NodeStatus, StructureValues};
use super::topology::TreeTopology;
use crate::config::TreeIO;
use crate::data::Matrix;
use crate::errors::FlowTreeError;
use crate::validation::{check_binary, check_columns_match};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedTree {
    pub depth: usize,
    pub feature_names: Vec<String>,
    /// Integral values of `b`, `p` and `w`.
    pub structure: StructureValues,
}

impl TreeIO for FittedTree {}

impl FittedTree {
    pub fn new(depth: usize, feature_names: Vec<String>, structure: StructureValues) -> Self {
        FittedTree {
            depth,
            feature_names,
            structure,
        }
    }

    pub fn topology(&self) -> Result<TreeTopology, FlowTreeError> {
        TreeTopology::new(self.depth)
    }

    pub fn n_features(&self) -> usize {
        self.structure.n_features
    }

    /// Status of every node that is not pruned, in index order.
    pub fn nodes(&self) -> Result<Vec<(usize, NodeStatus)>, FlowTreeError> {
        let topology = self.topology()?;
        Ok(topology
            .all_nodes()
            .map(|n| (n, self.structure.node_status(&topology, n)))
            .filter(|(_, status)| *status != NodeStatus::Pruned)
            .collect())
    }

    /// Number of nodes that branch on a feature.
    pub fn n_branching(&self) -> Result<usize, FlowTreeError> {
        Ok(self
            .nodes()?
            .iter()
            .filter(|(_, status)| matches!(status, NodeStatus::Branching(_)))
            .count())
    }

    /// Treatment index predicted for one row of binary features.
    pub fn predict_row(&self, topology: &TreeTopology, row: &[bool]) -> Result<usize, FlowTreeError> {
        self.structure.route(topology, row, 0).map(|path| path.treatment)
    }

    /// Treatment index predicted for every row of `data`.
    ///
    /// * `data` - Binary features, one column per fitted feature.
    /// * `parallel` - Predict rows on the rayon pool.
    pub fn predict(&self, data: &Matrix<f64>, parallel: bool) -> Result<Vec<usize>, FlowTreeError> {
        check_columns_match(self.n_features(), data)?;
        if data.rows == 0 {
            return Ok(Vec::new());
        }
        let x = check_binary(data)?;
        let topology = self.topology()?;
        let cols = data.cols;
        if parallel {
            x.par_chunks(cols).map(|row| self.predict_row(&topology, row)).collect()
        } else {
            x.chunks(cols).map(|row| self.predict_row(&topology, row)).collect()
        }
    }

    fn feature_name(&self, f: usize) -> &str {
        self.feature_names.get(f).map_or("?", |s| s.as_str())
    }
}

impl Display for FittedTree {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let topology = TreeTopology::new(self.depth).map_err(|_| fmt::Error)?;
        let mut print_buffer: Vec<usize> = vec![topology.root()];
        let mut r = String::new();
        while let Some(n) = print_buffer.pop() {
            let indent = "      ".repeat(topology.node_depth(n));
            match self.structure.node_status(&topology, n) {
                NodeStatus::Branching(feature) => {
                    let (left, right) = (topology.left_child(n), topology.right_child(n));
                    r += format!(
                        "{}{}:[{} = 0] yes={},no={}\n",
                        indent,
                        n,
                        self.feature_name(feature),
                        left,
                        right
                    )
                    .as_str();
                    print_buffer.push(right);
                    print_buffer.push(left);
                }
                NodeStatus::Terminal(k) => r += format!("{}{}:leaf={}\n", indent, n, k).as_str(),
                NodeStatus::Pruned => {}
                NodeStatus::Undetermined => r += format!("{}{}:undetermined\n", indent, n).as_str(),
            }
        }
        write!(f, "{}", r)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    /// Depth 2 where the root splits on x1, node 2 predicts 0 and node 3 splits on x0.
    fn fitted() -> FittedTree {
        let mut b = vec![0.0; 3 * 2];
        b[1] = 1.0; // b[1,1]
        b[2 * 2] = 1.0; // b[3,0]
        let mut p = vec![0.0; 7];
        p[1] = 1.0; // p[2]
        p[5] = 1.0; // p[6]
        p[6] = 1.0; // p[7]
        let mut w = vec![0.0; 7 * 2];
        w[2] = 1.0; // w[2,0]
        w[5 * 2] = 1.0; // w[6,0]
        w[6 * 2 + 1] = 1.0; // w[7,1]
        FittedTree::new(
            2,
            vec![String::from("a"), String::from("b")],
            StructureValues {
                n_features: 2,
                n_treatments: 2,
                b,
                p,
                w,
            },
        )
    }

    #[test]
    fn test_predict() {
        let tree = fitted();
        // Column major rows: (0,0), (0,1), (1,1), (1,0)
        let data = vec![0.0, 0.0, 1.0, 1.0, 0.0, 1.0, 1.0, 0.0];
        let x = Matrix::new(&data, 4, 2);
        assert_eq!(tree.predict(&x, false).unwrap(), vec![0, 0, 1, 0]);
        assert_eq!(tree.predict(&x, true).unwrap(), vec![0, 0, 1, 0]);
        assert_eq!(tree.n_branching().unwrap(), 2);
    }

    #[test]
    fn test_predict_checks_columns() {
        let tree = fitted();
        let data = vec![0.0, 1.0, 1.0];
        let x = Matrix::new(&data, 1, 3);
        assert!(matches!(tree.predict(&x, false), Err(FlowTreeError::ColumnMismatch(2, 3))));
        let data = vec![0.5, 1.0];
        let x = Matrix::new(&data, 1, 2);
        assert!(matches!(tree.predict(&x, false), Err(FlowTreeError::NonBinaryFeatures(_))));
    }

    #[test]
    fn test_predict_no_rows() {
        let tree = fitted();
        let data: Vec<f64> = Vec::new();
        let x = Matrix::new(&data, 0, 2);
        assert!(tree.predict(&x, false).unwrap().is_empty());
        assert!(tree.predict(&x, true).unwrap().is_empty());
    }

    #[test]
    fn test_display() {
        let printed = format!("{}", fitted());
        let expected = "1:[b = 0] yes=2,no=3\n      2:leaf=0\n      3:[a = 0] yes=6,no=7\n            6:leaf=0\n            7:leaf=1\n";
        assert_eq!(printed, expected);
    }

    #[test]
    fn test_save_load() {
        let tree = fitted();
        let dir = tempdir().unwrap();
        let path = dir.path().join("tree.json");
        tree.save(&path).unwrap();
        let loaded = FittedTree::load(&path).unwrap();
        assert_eq!(loaded, tree);
    }
}
