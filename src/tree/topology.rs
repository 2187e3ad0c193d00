//! Tree Topology
//!
//! A complete binary tree of fixed depth, addressed by heap indices:
//! the root is `1` and the children of `n` are `2n` and `2n + 1`.
use crate::constants::MAX_DEPTH;
use crate::errors::FlowTreeError;

#[derive(Debug, Clone, PartialEq)]
pub struct TreeTopology {
    depth: usize,
    nodes: Vec<usize>,
    leaves: Vec<usize>,
    /// Strict ancestors of every index, parent first. Slot 0 is unused.
    ancestors: Vec<Vec<usize>>,
}

impl TreeTopology {
    /// Enumerate the complete tree of the given depth.
    pub fn new(depth: usize) -> Result<Self, FlowTreeError> {
        if depth > MAX_DEPTH {
            return Err(FlowTreeError::InvalidParameter(
                "depth".to_string(),
                format!("a value no larger than {}", MAX_DEPTH),
                depth.to_string(),
            ));
        }
        let first_leaf = 1usize << depth;
        let total = (first_leaf << 1) - 1;
        let mut topology = TreeTopology {
            depth,
            nodes: (1..first_leaf).collect(),
            leaves: (first_leaf..=total).collect(),
            ancestors: vec![Vec::new(); total + 1],
        };
        for n in 2..=total {
            if let Some(parent) = topology.parent(n) {
                let mut a = Vec::with_capacity(topology.ancestors[parent].len() + 1);
                a.push(parent);
                a.extend_from_slice(&topology.ancestors[parent]);
                topology.ancestors[n] = a;
            }
        }
        Ok(topology)
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn root(&self) -> usize {
        1
    }

    /// Internal (branching) nodes.
    pub fn nodes(&self) -> &[usize] {
        &self.nodes
    }

    pub fn leaves(&self) -> &[usize] {
        &self.leaves
    }

    /// Internal nodes followed by leaves, i.e. `1..=n_total()`.
    pub fn all_nodes(&self) -> impl Iterator<Item = usize> + '_ {
        self.nodes.iter().chain(self.leaves.iter()).copied()
    }

    /// Number of nodes and leaves together.
    pub fn n_total(&self) -> usize {
        self.nodes.len() + self.leaves.len()
    }

    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn ancestors(&self, n: usize) -> &[usize] {
        &self.ancestors[n]
    }

    pub fn left_child(&self, n: usize) -> usize {
        2 * n
    }

    pub fn right_child(&self, n: usize) -> usize {
        2 * n + 1
    }

    pub fn parent(&self, n: usize) -> Option<usize> {
        if n > 1 {
            Some(n / 2)
        } else {
            None
        }
    }

    /// Distance from the root, which has depth zero.
    pub fn node_depth(&self, n: usize) -> usize {
        self.ancestors[n].len()
    }

    pub fn is_internal(&self, n: usize) -> bool {
        n >= 1 && n < self.leaves[0]
    }

    pub fn is_leaf(&self, n: usize) -> bool {
        n >= self.leaves[0] && n < self.leaves[0] * 2
    }
}
