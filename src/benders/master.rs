//! Master problem
use crate::data::TrainingData;
use crate::formulation::{tree_structure_constraints, TreeVars};
use crate::objective::Objective;
use crate::solver::{Direction, Model, VarId};
use crate::tree::topology::TreeTopology;
use hashbrown::HashSet;

/// Tree structure plus one surrogate `g[i]` per datapoint, without flow variables.
pub struct MasterModel {
    pub model: Model,
    pub tree: TreeVars,
    pub g: Vec<VarId>,
}

/// Declare the master problem. Every `g[i]` starts at the full range of rewards
/// datapoint `i` could collect, and is only tightened by lazy cuts.
pub fn build_master(
    topology: &TreeTopology,
    data: &TrainingData,
    objective: &Objective,
    treatments_filter: Option<&HashSet<usize>>,
) -> MasterModel {
    let mut model = Model::new(Direction::Maximize);
    let tree = TreeVars::declare(&mut model, topology, data.n_features, data.n_treatments);
    tree_structure_constraints(&mut model, topology, &tree, treatments_filter);
    let g: Vec<VarId> = data
        .datapoints()
        .map(|i| {
            let (lo, hi) = objective.reward_range(data, i);
            model.add_continuous(format!("g[{}]", i), lo, hi)
        })
        .collect();
    model.set_objective(objective.surrogate_objective(&tree, &g));
    log::info!(
        "Built Benders master: {} variables, {} constraints.",
        model.num_vars(),
        model.num_constraints()
    );
    MasterModel { model, tree, g }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::default_feature_names;

    #[test]
    fn test_surrogate_bounds() {
        let topology = TreeTopology::new(1).unwrap();
        let data = TrainingData {
            x: vec![true, false],
            n_rows: 2,
            n_features: 1,
            feature_names: default_feature_names(1),
            t: vec![0, 1],
            n_treatments: 2,
            y: vec![1.0, 1.0],
            ipw: None,
            y_hat: Some(vec![0.5, -1.0, 2.0, 3.0]),
        };
        let master = build_master(&topology, &data, &Objective::DirectMethod, None);
        assert_eq!(master.g.len(), 2);
        let g0 = master.model.var(master.g[0]);
        assert_eq!((g0.lb, g0.ub), (-1.0, 0.5));
        let g1 = master.model.var(master.g[1]);
        assert_eq!((g1.lb, g1.ub), (2.0, 3.0));
        // structure variables: b 1, p 3, w 6
        assert_eq!(master.model.num_binaries(), 10);
        assert_eq!(master.model.num_vars(), 12);
    }
}
