//! Single sink
//!
//! One absorption variable per datapoint and node; flow of datapoint `i` may only be
//! absorbed where the node assigns `i`'s reference treatment.
use super::structure::{branching_sum, TreeVars};
use super::{FlowVars, SinkKind};
use crate::data::TrainingData;
use crate::solver::{LinExpr, Model, Sense};
use crate::tree::topology::TreeTopology;

/// Declare `z`, `zeta` and the flow and arc constraints.
pub fn declare(model: &mut Model, topology: &TreeTopology, data: &TrainingData, tree: &TreeVars) -> FlowVars {
    let mut flow = FlowVars::new(SinkKind::Single, topology.n_total(), data.n_treatments);
    for i in data.datapoints() {
        for n in topology.all_nodes() {
            flow.zeta.push(model.add_continuous(format!("zeta[{},{}]", i, n), 0.0, f64::INFINITY));
        }
    }
    for i in data.datapoints() {
        for n in topology.all_nodes() {
            flow.z.push(model.add_continuous(format!("z[{},{}]", i, n), 0.0, f64::INFINITY));
        }
    }
    flow_constraints(model, topology, data, &flow);
    arc_constraints(model, topology, data, tree, &flow);
    flow
}

/// `z[i,n] = z[i,l(n)] + z[i,r(n)] + zeta[i,n]` on internal nodes, `zeta[i,n] = z[i,n]` on leaves.
fn flow_constraints(model: &mut Model, topology: &TreeTopology, data: &TrainingData, flow: &FlowVars) {
    for &n in topology.nodes() {
        let (l, r) = (topology.left_child(n), topology.right_child(n));
        for i in data.datapoints() {
            model.add_constr(
                format!("flow[{},{}]", i, n),
                LinExpr::sum([flow.z(i, n)]),
                Sense::Eq,
                LinExpr::sum([flow.z(i, l), flow.z(i, r), flow.zeta(i, n)]),
            );
        }
    }
    for &n in topology.leaves() {
        for i in data.datapoints() {
            model.add_constr(
                format!("sink[{},{}]", i, n),
                LinExpr::sum([flow.zeta(i, n)]),
                Sense::Eq,
                LinExpr::sum([flow.z(i, n)]),
            );
        }
    }
}

/// Children arcs open only for a selected feature routing `i` that way, and the sink
/// arc only for `i`'s own treatment.
fn arc_constraints(model: &mut Model, topology: &TreeTopology, data: &TrainingData, tree: &TreeVars, flow: &FlowVars) {
    for i in data.datapoints() {
        for &n in topology.nodes() {
            model.add_constr(
                format!("left_arc[{},{}]", i, n),
                LinExpr::sum([flow.z(i, topology.left_child(n))]),
                Sense::Le,
                branching_sum(tree, n, |f| !data.value(i, f)),
            );
        }
    }
    for i in data.datapoints() {
        for &n in topology.nodes() {
            model.add_constr(
                format!("right_arc[{},{}]", i, n),
                LinExpr::sum([flow.z(i, topology.right_child(n))]),
                Sense::Le,
                branching_sum(tree, n, |f| data.value(i, f)),
            );
        }
    }
    for n in topology.all_nodes() {
        for i in data.datapoints() {
            model.add_constr(
                format!("terminal_arc[{},{}]", i, n),
                LinExpr::sum([flow.zeta(i, n)]),
                Sense::Le,
                LinExpr::sum([tree.w(n, data.t[i])]),
            );
        }
    }
}
