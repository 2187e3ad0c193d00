//! Tree structure
//!
//! Branching, terminal and assignment variables, and the constraints that make
//! every integral assignment of them a valid decision tree.
use crate::solver::{LinExpr, Model, Sense, VarId};
use crate::tree::structure::StructureValues;
use crate::tree::topology::TreeTopology;
use hashbrown::HashSet;

/// Structural variables of a tree, laid out like [`StructureValues`].
#[derive(Debug, Clone)]
pub struct TreeVars {
    pub n_features: usize,
    pub n_treatments: usize,
    b: Vec<VarId>,
    p: Vec<VarId>,
    w: Vec<VarId>,
}

impl TreeVars {
    /// Declare `b[n,f]` for internal nodes and `p[n]`, `w[n,k]` for every node, all binary.
    pub fn declare(model: &mut Model, topology: &TreeTopology, n_features: usize, n_treatments: usize) -> Self {
        let mut b = Vec::with_capacity(topology.n_nodes() * n_features);
        for &n in topology.nodes() {
            for f in 0..n_features {
                b.push(model.add_binary(format!("b[{},{}]", n, f)));
            }
        }
        let p = topology.all_nodes().map(|n| model.add_binary(format!("p[{}]", n))).collect();
        let mut w = Vec::with_capacity(topology.n_total() * n_treatments);
        for n in topology.all_nodes() {
            for k in 0..n_treatments {
                w.push(model.add_binary(format!("w[{},{}]", n, k)));
            }
        }
        TreeVars {
            n_features,
            n_treatments,
            b,
            p,
            w,
        }
    }

    pub fn b(&self, n: usize, f: usize) -> VarId {
        self.b[(n - 1) * self.n_features + f]
    }

    pub fn p(&self, n: usize) -> VarId {
        self.p[n - 1]
    }

    pub fn w(&self, n: usize, k: usize) -> VarId {
        self.w[(n - 1) * self.n_treatments + k]
    }

    pub fn all_b(&self) -> &[VarId] {
        &self.b
    }

    /// Read the structure out of a full assignment of the model's variables.
    pub fn values<F: Fn(VarId) -> f64>(&self, value: F) -> StructureValues {
        StructureValues {
            n_features: self.n_features,
            n_treatments: self.n_treatments,
            b: self.b.iter().map(|v| value(*v)).collect(),
            p: self.p.iter().map(|v| value(*v)).collect(),
            w: self.w.iter().map(|v| value(*v)).collect(),
        }
    }
}

/// Sum of `b[n,f]` over the features `f` for which `include(f)` holds.
pub fn branching_sum<F: Fn(usize) -> bool>(vars: &TreeVars, n: usize, include: F) -> LinExpr {
    LinExpr::sum((0..vars.n_features).filter(|f| include(*f)).map(|f| vars.b(n, f)))
}

/// Add the structural constraints:
///
/// * `sum_f b[n,f] + p[n] + sum_{m in A(n)} p[m] = 1` for internal nodes,
/// * `p[n] + sum_{m in A(n)} p[m] = 1` for leaves,
/// * `sum_k w[n,k] = p[n]` over allowed treatments and `sum_k w[n,k] = 0` over filtered ones.
///
/// An empty filter adds exactly the unfiltered constraints.
pub fn tree_structure_constraints(
    model: &mut Model,
    topology: &TreeTopology,
    vars: &TreeVars,
    treatments_filter: Option<&HashSet<usize>>,
) {
    for &n in topology.nodes() {
        let mut lhs = branching_sum(vars, n, |_| true);
        lhs.add_term(vars.p(n), 1.0);
        for &m in topology.ancestors(n) {
            lhs.add_term(vars.p(m), 1.0);
        }
        model.add_constr(format!("structure[{}]", n), lhs, Sense::Eq, LinExpr::constant(1.0));
    }

    for &n in topology.leaves() {
        let mut lhs = LinExpr::sum([vars.p(n)]);
        for &m in topology.ancestors(n) {
            lhs.add_term(vars.p(m), 1.0);
        }
        model.add_constr(format!("leaf_structure[{}]", n), lhs, Sense::Eq, LinExpr::constant(1.0));
    }

    match treatments_filter.filter(|f| !f.is_empty()) {
        Some(filter) => {
            log::info!("Treatment filtered formulation used, excluding {:?}", filter);
            for n in topology.all_nodes() {
                let allowed = LinExpr::sum((0..vars.n_treatments).filter(|k| !filter.contains(k)).map(|k| vars.w(n, k)));
                model.add_constr(format!("assignment[{}]", n), allowed, Sense::Eq, LinExpr::sum([vars.p(n)]));
            }
            for n in topology.all_nodes() {
                let excluded = LinExpr::sum((0..vars.n_treatments).filter(|k| filter.contains(k)).map(|k| vars.w(n, k)));
                model.add_constr(format!("filtered[{}]", n), excluded, Sense::Eq, LinExpr::constant(0.0));
            }
        }
        None => {
            for n in topology.all_nodes() {
                let all = LinExpr::sum((0..vars.n_treatments).map(|k| vars.w(n, k)));
                model.add_constr(format!("assignment[{}]", n), all, Sense::Eq, LinExpr::sum([vars.p(n)]));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::Direction;

    fn build(depth: usize, filter: Option<&HashSet<usize>>) -> (Model, TreeVars) {
        let topology = TreeTopology::new(depth).unwrap();
        let mut model = Model::new(Direction::Maximize);
        let vars = TreeVars::declare(&mut model, &topology, 3, 2);
        tree_structure_constraints(&mut model, &topology, &vars, filter);
        (model, vars)
    }

    #[test]
    fn test_variable_counts() {
        let (model, vars) = build(2, None);
        // b: 3 nodes x 3 features, p: 7, w: 7 x 2
        assert_eq!(model.num_vars(), 9 + 7 + 14);
        assert_eq!(model.num_binaries(), model.num_vars());
        assert_eq!(model.var(vars.b(3, 2)).name, "b[3,2]");
        assert_eq!(model.var(vars.w(7, 1)).name, "w[7,1]");
        // 3 internal + 4 leaf + 7 assignment rows
        assert_eq!(model.num_constraints(), 14);
    }

    #[test]
    fn test_leaf_row_sums_path() {
        let (model, vars) = build(2, None);
        let row = model.constraints().iter().find(|c| c.name == "leaf_structure[6]").unwrap();
        assert_eq!(row.expr.terms, vec![(vars.p(6), 1.0), (vars.p(3), 1.0), (vars.p(1), 1.0)]);
        assert_eq!(row.rhs, 1.0);
    }

    #[test]
    fn test_empty_filter_matches_unfiltered() {
        let (unfiltered, _) = build(2, None);
        let empty = HashSet::new();
        let (filtered, _) = build(2, Some(&empty));
        assert_eq!(unfiltered.constraints(), filtered.constraints());
    }

    #[test]
    fn test_filter_adds_zero_rows() {
        let filter: HashSet<usize> = [1].into_iter().collect();
        let (model, vars) = build(1, Some(&filter));
        assert_eq!(model.num_constraints(), 1 + 2 + 3 + 3);
        let zero = model.constraints().iter().find(|c| c.name == "filtered[2]").unwrap();
        assert_eq!(zero.expr.terms, vec![(vars.w(2, 1), 1.0)]);
        assert_eq!(zero.rhs, 0.0);
        let allowed = model.constraints().iter().find(|c| c.name == "assignment[2]").unwrap();
        assert_eq!(allowed.expr.terms, vec![(vars.w(2, 0), 1.0), (vars.p(2), -1.0)]);
    }

    #[test]
    fn test_depth_zero_root_must_predict() {
        let (model, vars) = build(0, None);
        let root = &model.constraints()[0];
        assert_eq!(root.name, "leaf_structure[1]");
        assert_eq!(root.expr.terms, vec![(vars.p(1), 1.0)]);
        assert!(vars.all_b().is_empty());
    }
}
