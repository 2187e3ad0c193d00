//! Formulation
//!
//! The flow network encoding of a decision tree: every datapoint sends one unit of
//! flow from the root, arcs open only where the branching decisions route it, and
//! flow may leave the tree only at a node that predicts the datapoint's treatment.
pub mod multiple_sink;
pub mod single_sink;
pub mod structure;

pub use structure::{tree_structure_constraints, TreeVars};

use crate::data::TrainingData;
use crate::objective::Objective;
use crate::solver::{Direction, LinExpr, Model, Sense, VarId};
use crate::tree::topology::TreeTopology;
use hashbrown::HashSet;
use serde::{Deserialize, Serialize};

/// Whether absorbed flow is aggregated per node or split per treatment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SinkKind {
    /// One sink per node, reachable only for the datapoint's own treatment.
    #[default]
    Single,
    /// One sink per node and treatment.
    Multiple,
}

/// Flow variables `z[i,n]` and `zeta[i,n]` (or `zeta[i,n,k]`).
#[derive(Debug, Clone)]
pub struct FlowVars {
    pub sink: SinkKind,
    n_total: usize,
    n_treatments: usize,
    z: Vec<VarId>,
    zeta: Vec<VarId>,
}

impl FlowVars {
    pub(crate) fn new(sink: SinkKind, n_total: usize, n_treatments: usize) -> Self {
        FlowVars {
            sink,
            n_total,
            n_treatments,
            z: Vec::new(),
            zeta: Vec::new(),
        }
    }

    /// Flow of datapoint `i` entering node `n`.
    pub fn z(&self, i: usize, n: usize) -> VarId {
        self.z[i * self.n_total + n - 1]
    }

    /// Flow of datapoint `i` absorbed at `n` (single sink).
    pub fn zeta(&self, i: usize, n: usize) -> VarId {
        self.zeta[i * self.n_total + n - 1]
    }

    /// Flow of datapoint `i` absorbed at `n` under treatment `k` (multiple sink).
    pub fn zeta_k(&self, i: usize, n: usize, k: usize) -> VarId {
        self.zeta[(i * self.n_total + n - 1) * self.n_treatments + k]
    }

    /// Flow of datapoint `i` absorbed at `n` while `n` predicts `k`.
    ///
    /// A single sink network only absorbs a datapoint under its reference treatment.
    pub fn absorbed(&self, i: usize, n: usize, k: usize, reference: usize) -> Option<VarId> {
        match self.sink {
            SinkKind::Single => (k == reference).then(|| self.zeta(i, n)),
            SinkKind::Multiple => Some(self.zeta_k(i, n, k)),
        }
    }

    /// Every absorption variable of datapoint `i` at node `n`.
    pub fn sinks(&self, i: usize, n: usize) -> Vec<VarId> {
        match self.sink {
            SinkKind::Single => vec![self.zeta(i, n)],
            SinkKind::Multiple => (0..self.n_treatments).map(|k| self.zeta_k(i, n, k)).collect(),
        }
    }
}

/// `Σ_i coeff_i · (flow of i absorbed under treatment k, over every node) (sense) rhs`.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowConstraint {
    pub name: String,
    pub treatment: usize,
    /// Datapoint and its coefficient.
    pub coeffs: Vec<(usize, f64)>,
    pub sense: Sense,
    pub rhs: f64,
}

/// A fully declared flow model.
pub struct FlowModel {
    pub model: Model,
    pub tree: TreeVars,
    pub flow: FlowVars,
}

impl FlowModel {
    /// Add constraints over the absorbed flow, on top of the tree and flow network.
    pub fn add_side_constraints(&mut self, topology: &TreeTopology, data: &TrainingData, side: &[FlowConstraint]) {
        for constraint in side {
            let mut lhs = LinExpr::new();
            for &(i, coeff) in constraint.coeffs.iter() {
                for n in topology.all_nodes() {
                    if let Some(v) = self.flow.absorbed(i, n, constraint.treatment, data.t[i]) {
                        lhs.add_term(v, coeff);
                    }
                }
            }
            self.model
                .add_constr(constraint.name.as_str(), lhs, constraint.sense, LinExpr::constant(constraint.rhs));
        }
    }
}

/// Declare structure, flow and objective for `objective` over `data`.
pub fn build_flow_model(
    topology: &TreeTopology,
    data: &TrainingData,
    objective: &Objective,
    treatments_filter: Option<&HashSet<usize>>,
) -> FlowModel {
    let mut model = Model::new(Direction::Maximize);
    let tree = TreeVars::declare(&mut model, topology, data.n_features, data.n_treatments);
    tree_structure_constraints(&mut model, topology, &tree, treatments_filter);
    let flow = match objective.sink() {
        SinkKind::Single => single_sink::declare(&mut model, topology, data, &tree),
        SinkKind::Multiple => multiple_sink::declare(&mut model, topology, data, &tree),
    };
    model.set_objective(objective.flow_objective(topology, data, &tree, &flow));
    log::info!(
        "Built {:?}-sink flow model: {} variables, {} constraints.",
        flow.sink,
        model.num_vars(),
        model.num_constraints()
    );
    FlowModel { model, tree, flow }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::default_feature_names;
    use crate::solver::{SolveStatus, Solver};

    /// Label is x0 XOR x1, which only a full depth 2 tree separates.
    fn xor() -> TrainingData {
        TrainingData {
            x: vec![false, false, false, true, true, false, true, true],
            n_rows: 4,
            n_features: 2,
            feature_names: default_feature_names(2),
            t: vec![0, 1, 1, 0],
            n_treatments: 2,
            y: vec![1.0; 4],
            ipw: None,
            y_hat: Some(vec![1.0, 0.0, 0.0, 1.0, 0.0, 1.0, 1.0, 0.0]),
        }
    }

    #[test]
    fn test_side_constraint_limits_predictions() {
        // At most one of the four rows may be predicted 1.
        let topology = TreeTopology::new(2).unwrap();
        let data = xor();
        let objective = Objective::Classification {
            weights: vec![1.0; 4],
            lambda: 0.0,
            sink: SinkKind::Multiple,
        };
        let mut built = build_flow_model(&topology, &data, &objective, None);
        let before = built.model.num_constraints();
        let side = FlowConstraint {
            name: String::from("cap"),
            treatment: 1,
            coeffs: data.datapoints().map(|i| (i, 1.0)).collect(),
            sense: Sense::Le,
            rhs: 1.0,
        };
        built.add_side_constraints(&topology, &data, &[side]);
        assert_eq!(built.model.num_constraints(), before + 1);
        let cap = &built.model.constraints()[before];
        assert_eq!(cap.expr.terms.len(), 4 * topology.n_total());
        assert_eq!(cap.expr.terms[0], (built.flow.zeta_k(0, 1, 1), 1.0));

        let outcome = Solver::default().optimize(&built.model, None).unwrap();
        assert_eq!(outcome.status, SolveStatus::Optimal);
        assert!((outcome.objective.unwrap() - 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_single_sink_absorbs_reference_treatment_only() {
        let topology = TreeTopology::new(1).unwrap();
        let data = xor();
        let mut model = Model::new(Direction::Maximize);
        let tree = TreeVars::declare(&mut model, &topology, 2, 2);
        let flow = single_sink::declare(&mut model, &topology, &data, &tree);
        assert_eq!(flow.absorbed(1, 2, 1, data.t[1]), Some(flow.zeta(1, 2)));
        assert_eq!(flow.absorbed(1, 2, 0, data.t[1]), None);
    }

    #[test]
    fn test_solved_flow_is_conserved() {
        let topology = TreeTopology::new(2).unwrap();
        let data = xor();
        let objectives = [
            Objective::Classification {
                weights: vec![1.0; 4],
                lambda: 0.0,
                sink: SinkKind::Single,
            },
            Objective::Classification {
                weights: vec![1.0; 4],
                lambda: 0.0,
                sink: SinkKind::Multiple,
            },
            Objective::DirectMethod,
        ];
        for objective in objectives.iter() {
            let built = build_flow_model(&topology, &data, objective, None);
            let outcome = Solver::default().optimize(&built.model, None).unwrap();
            assert_eq!(outcome.status, SolveStatus::Optimal);
            assert!((outcome.objective.unwrap() - 4.0).abs() < 1e-6);
            let values = outcome.values.as_ref().unwrap();
            let value = |v: VarId| values[v.index()];
            let structure = built.tree.values(value);
            let flow = &built.flow;

            for i in data.datapoints() {
                let absorbed = |n: usize| flow.sinks(i, n).into_iter().map(value).sum::<f64>();
                assert!((value(flow.z(i, topology.root())) - 1.0).abs() < 1e-6);
                let total: f64 = topology.all_nodes().map(absorbed).sum();
                assert!((total - 1.0).abs() < 1e-6, "{:?} row {} absorbs {}", objective.sink(), i, total);
                for &n in topology.nodes() {
                    let out = value(flow.z(i, topology.left_child(n)))
                        + value(flow.z(i, topology.right_child(n)))
                        + absorbed(n);
                    assert!((value(flow.z(i, n)) - out).abs() < 1e-6);
                }
                for &n in topology.leaves() {
                    assert!((value(flow.z(i, n)) - absorbed(n)).abs() < 1e-6);
                }
                let path = structure.route(&topology, data.row(i), i).unwrap();
                assert!((absorbed(path.terminal) - 1.0).abs() < 1e-6);
                assert_eq!(path.treatment, data.t[i]);
            }
        }
    }
}
