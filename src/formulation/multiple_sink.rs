//! Multiple sink
//!
//! Absorbed flow is split per treatment, so a datapoint can leave the tree under
//! whichever treatment its terminal node prescribes. Every datapoint sends exactly
//! one unit of flow from the root.
use super::structure::{branching_sum, TreeVars};
use super::{FlowVars, SinkKind};
use crate::data::TrainingData;
use crate::solver::{LinExpr, Model, Sense};
use crate::tree::topology::TreeTopology;

/// Declare `z`, `zeta` per treatment, and the flow, source and arc constraints.
pub fn declare(model: &mut Model, topology: &TreeTopology, data: &TrainingData, tree: &TreeVars) -> FlowVars {
    let mut flow = FlowVars::new(SinkKind::Multiple, topology.n_total(), data.n_treatments);
    for i in data.datapoints() {
        for n in topology.all_nodes() {
            for k in 0..data.n_treatments {
                flow.zeta
                    .push(model.add_continuous(format!("zeta[{},{},{}]", i, n, k), 0.0, f64::INFINITY));
            }
        }
    }
    for i in data.datapoints() {
        for n in topology.all_nodes() {
            flow.z.push(model.add_continuous(format!("z[{},{}]", i, n), 0.0, f64::INFINITY));
        }
    }

    for &n in topology.nodes() {
        let (l, r) = (topology.left_child(n), topology.right_child(n));
        for i in data.datapoints() {
            let mut outflow = LinExpr::sum([flow.z(i, l), flow.z(i, r)]);
            outflow.add_expr(&LinExpr::sum(flow.sinks(i, n)), 1.0);
            model.add_constr(format!("flow[{},{}]", i, n), LinExpr::sum([flow.z(i, n)]), Sense::Eq, outflow);
        }
    }
    for &n in topology.leaves() {
        for i in data.datapoints() {
            model.add_constr(
                format!("sink[{},{}]", i, n),
                LinExpr::sum(flow.sinks(i, n)),
                Sense::Eq,
                LinExpr::sum([flow.z(i, n)]),
            );
        }
    }
    for i in data.datapoints() {
        model.add_constr(
            format!("source[{}]", i),
            LinExpr::sum([flow.z(i, topology.root())]),
            Sense::Eq,
            LinExpr::constant(1.0),
        );
    }

    for i in data.datapoints() {
        for &n in topology.nodes() {
            model.add_constr(
                format!("left_arc[{},{}]", i, n),
                LinExpr::sum([flow.z(i, topology.left_child(n))]),
                Sense::Le,
                branching_sum(tree, n, |f| !data.value(i, f)),
            );
            model.add_constr(
                format!("right_arc[{},{}]", i, n),
                LinExpr::sum([flow.z(i, topology.right_child(n))]),
                Sense::Le,
                branching_sum(tree, n, |f| data.value(i, f)),
            );
        }
    }
    for n in topology.all_nodes() {
        for k in 0..data.n_treatments {
            for i in data.datapoints() {
                model.add_constr(
                    format!("terminal_arc[{},{},{}]", i, n, k),
                    LinExpr::sum([flow.zeta_k(i, n, k)]),
                    Sense::Le,
                    LinExpr::sum([tree.w(n, k)]),
                );
            }
        }
    }
    flow
}
