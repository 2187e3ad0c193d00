//! Separation oracle
//!
//! At every callback point the oracle routes each datapoint through the candidate
//! tree, compares the master's surrogate `g[i]` with the reward the datapoint
//! actually collects, and submits
//!
//! `g[i] <= r* + (r_max - r*) (Σ_{n∈left} Σ_{x_if=0} b[n,f] + Σ_{n∈right} Σ_{x_if=1} b[n,f]) + Σ_{n∈target} Σ_k (r_k - r*)+ w[n,k]`
//!
//! when it is violated. Here `r_k` is the reward of predicting `k` for `i`, `r*`
//! the reward at the current terminal node and `r_max` the largest reward.
//! The cut is tight for the current tree and never binding for any tree that
//! routes `i` elsewhere.
use super::stats::CallbackStats;
use crate::constants::CUT_TOLERANCE;
use crate::data::TrainingData;
use crate::errors::FlowTreeError;
use crate::formulation::structure::branching_sum;
use crate::formulation::TreeVars;
use crate::objective::Objective;
use crate::solver::{Callback, CallbackContext, CallbackWhere, Constraint, LinExpr, Sense, VarId};
use crate::tree::structure::{StructureValues, TreePath};
use crate::tree::topology::TreeTopology;
use log::debug;
use rayon::prelude::*;
use std::time::Instant;

pub struct BendersOracle<'a> {
    topology: &'a TreeTopology,
    data: &'a TrainingData,
    objective: &'a Objective,
    tree: &'a TreeVars,
    g: &'a [VarId],
    pub stats: CallbackStats,
}

impl<'a> BendersOracle<'a> {
    pub fn new(
        topology: &'a TreeTopology,
        data: &'a TrainingData,
        objective: &'a Objective,
        tree: &'a TreeVars,
        g: &'a [VarId],
    ) -> Self {
        BendersOracle {
            topology,
            data,
            objective,
            tree,
            g,
            stats: CallbackStats::new(),
        }
    }

    /// Cut tying `g[i]` to the structure along `path`.
    pub fn cut(&self, i: usize, path: &TreePath) -> Constraint {
        let current = self.objective.reward(self.data, i, path.treatment);
        let (_, best) = self.objective.reward_range(self.data, i);

        let mut rhs = LinExpr::constant(current);
        let mut detours = LinExpr::new();
        for &n in path.left.iter() {
            detours.add_expr(&branching_sum(self.tree, n, |f| !self.data.value(i, f)), 1.0);
        }
        for &n in path.right.iter() {
            detours.add_expr(&branching_sum(self.tree, n, |f| self.data.value(i, f)), 1.0);
        }
        rhs.add_expr(&detours, best - current);
        for &n in path.target.iter() {
            for k in 0..self.data.n_treatments {
                let gain = self.objective.reward(self.data, i, k) - current;
                if gain > 0.0 {
                    rhs.add_term(self.tree.w(n, k), gain);
                }
            }
        }
        Constraint::new(
            format!("benders[{:06}]", i),
            LinExpr::sum([self.g[i]]),
            Sense::Le,
            rhs,
        )
    }

    /// Separate datapoint `i`, returning whether a cut was submitted.
    fn separate(&self, ctx: &CallbackContext<'_>, values: &StructureValues, i: usize) -> Result<bool, FlowTreeError> {
        let path = match values.route(self.topology, self.data.row(i), i) {
            Ok(path) => path,
            Err(e) => match ctx.location() {
                CallbackWhere::Integer => return Err(e),
                // A fractional point need not round to a complete tree.
                CallbackWhere::General => return Ok(false),
            },
        };
        let achievable = self.objective.reward(self.data, i, path.treatment);
        if ctx.value(self.g[i]) <= achievable + CUT_TOLERANCE {
            return Ok(false);
        }
        let cut = self.cut(i, &path);
        if ctx.violation(&cut) <= CUT_TOLERANCE {
            return Ok(false);
        }
        ctx.add_lazy(cut);
        Ok(true)
    }
}

impl Callback for BendersOracle<'_> {
    fn invoke(&self, ctx: &CallbackContext<'_>) -> Result<(), FlowTreeError> {
        let start = Instant::now();
        let values = self.tree.values(|v| ctx.value(v));
        let separated: Vec<bool> = self
            .data
            .datapoints()
            .into_par_iter()
            .map(|i| self.separate(ctx, &values, i))
            .collect::<Result<Vec<bool>, FlowTreeError>>()?;
        let added = separated.iter().filter(|s| **s).count();
        self.stats.record(ctx.location(), added > 0, start.elapsed());
        if added > 0 {
            debug!("{:?} callback added {} Benders cuts.", ctx.location(), added);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::benders::master::build_master;
    use crate::data::default_feature_names;
    use crate::solver::{LazyCuts, Model};

    /// Four rows of one feature; the label equals the feature.
    fn data() -> TrainingData {
        TrainingData {
            x: vec![false, false, true, true],
            n_rows: 4,
            n_features: 1,
            feature_names: default_feature_names(1),
            t: vec![0, 0, 1, 1],
            n_treatments: 2,
            y: vec![1.0; 4],
            ipw: Some(vec![1.0; 4]),
            y_hat: None,
        }
    }

    fn set(values: &mut [f64], model: &Model, name: &str, value: f64) {
        let index = model.variables().iter().position(|v| v.name == name).unwrap();
        values[index] = value;
    }

    /// Root splits on x0, node 2 predicts 0, node 3 predicts 1, every surrogate at its upper bound.
    fn split_point(model: &Model, right_treatment: usize) -> Vec<f64> {
        let mut values = vec![0.0; model.num_vars()];
        set(&mut values, model, "b[1,0]", 1.0);
        set(&mut values, model, "p[2]", 1.0);
        set(&mut values, model, "p[3]", 1.0);
        set(&mut values, model, "w[2,0]", 1.0);
        set(&mut values, model, &format!("w[3,{}]", right_treatment), 1.0);
        for i in 0..4 {
            set(&mut values, model, &format!("g[{}]", i), 1.0);
        }
        values
    }

    #[test]
    fn test_no_cut_at_correct_tree() {
        let topology = TreeTopology::new(1).unwrap();
        let data = data();
        let objective = Objective::InversePropensity;
        let master = build_master(&topology, &data, &objective, None);
        let oracle = BendersOracle::new(&topology, &data, &objective, &master.tree, &master.g);
        let values = split_point(&master.model, 1);
        let cuts = LazyCuts::new();
        oracle
            .invoke(&CallbackContext::new(CallbackWhere::Integer, &values, &cuts))
            .unwrap();
        assert!(cuts.is_empty());
        let report = oracle.stats.report();
        assert_eq!(report.callback_counter_integer, 1);
        assert_eq!(report.callback_counter_integer_success, 0);
    }

    #[test]
    fn test_cuts_for_misrouted_rows() {
        let topology = TreeTopology::new(1).unwrap();
        let data = data();
        let objective = Objective::InversePropensity;
        let master = build_master(&topology, &data, &objective, None);
        let oracle = BendersOracle::new(&topology, &data, &objective, &master.tree, &master.g);
        // Node 3 predicts 0, so rows 2 and 3 collect nothing.
        let values = split_point(&master.model, 0);
        let cuts = LazyCuts::new();
        oracle
            .invoke(&CallbackContext::new(CallbackWhere::Integer, &values, &cuts))
            .unwrap();
        let cuts = cuts.into_sorted();
        assert_eq!(cuts.len(), 2);
        assert_eq!(cuts[0].name, "benders[000002]");
        for cut in cuts.iter() {
            // Violated by exactly the over-estimate of the surrogate.
            assert!((cut.violation(&values) - 1.0).abs() < 1e-12);
            assert_eq!(cut.sense, Sense::Le);
            assert_eq!(cut.rhs, 0.0);
        }
        // No feature sends row 2 left of the root, so only the assignment terms remain.
        let g2 = master.g[2];
        let expected = vec![
            (g2, 1.0),
            (master.tree.w(1, 1), -1.0),
            (master.tree.w(3, 1), -1.0),
        ];
        assert_eq!(cuts[0].expr.terms, expected);
        let report = oracle.stats.report();
        assert_eq!(report.callback_counter_integer_success, 1);
        assert!(report.callback_counter_integer_success <= report.callback_counter_integer);
    }

    #[test]
    fn test_cut_is_slack_for_other_trees() {
        let topology = TreeTopology::new(1).unwrap();
        let data = data();
        let objective = Objective::InversePropensity;
        let master = build_master(&topology, &data, &objective, None);
        let oracle = BendersOracle::new(&topology, &data, &objective, &master.tree, &master.g);
        let wrong = split_point(&master.model, 0);
        let path = master
            .tree
            .values(|v| wrong[v.index()])
            .route(&topology, data.row(2), 2)
            .unwrap();
        let cut = oracle.cut(2, &path);
        assert!(cut.violation(&split_point(&master.model, 1)) == 0.0);
    }

    #[test]
    fn test_fractional_point_separates_rounded_tree() {
        let topology = TreeTopology::new(1).unwrap();
        let data = data();
        let objective = Objective::InversePropensity;
        let master = build_master(&topology, &data, &objective, None);
        let oracle = BendersOracle::new(&topology, &data, &objective, &master.tree, &master.g);
        // Rounds to the tree whose right leaf predicts 0.
        let mut values = split_point(&master.model, 0);
        set(&mut values, &master.model, "b[1,0]", 0.9);
        set(&mut values, &master.model, "w[3,0]", 0.9);
        set(&mut values, &master.model, "w[3,1]", 0.1);
        let cuts = LazyCuts::new();
        oracle
            .invoke(&CallbackContext::new(CallbackWhere::General, &values, &cuts))
            .unwrap();
        let cuts = cuts.into_sorted();
        let names: Vec<&str> = cuts.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["benders[000002]", "benders[000003]"]);
        for cut in cuts.iter() {
            assert!((cut.violation(&values) - 0.9).abs() < 1e-12);
        }
        let report = oracle.stats.report();
        assert_eq!(report.callback_counter_general, 1);
        assert_eq!(report.callback_counter_general_success, 1);
        assert_eq!(report.callback_counter_integer, 0);
    }

    #[test]
    fn test_inconsistent_integer_point_aborts() {
        let topology = TreeTopology::new(1).unwrap();
        let data = data();
        let objective = Objective::InversePropensity;
        let master = build_master(&topology, &data, &objective, None);
        let oracle = BendersOracle::new(&topology, &data, &objective, &master.tree, &master.g);
        // Nothing selected anywhere.
        let values = vec![0.0; master.model.num_vars()];
        let cuts = LazyCuts::new();
        let result = oracle.invoke(&CallbackContext::new(CallbackWhere::Integer, &values, &cuts));
        assert!(matches!(
            result,
            Err(FlowTreeError::StructuralInconsistency { node: 1, .. })
        ));

        let cuts = LazyCuts::new();
        oracle
            .invoke(&CallbackContext::new(CallbackWhere::General, &values, &cuts))
            .unwrap();
        assert!(cuts.is_empty());
    }
}
