//! Learner
//!
//! Builds the direct or Benders model for an objective, runs the search inside
//! a rayon pool and reads the fitted structure back.
use crate::benders::{build_master, BendersOracle, CallbackReport};
use crate::config::{Formulation, TreeConfig};
use crate::data::TrainingData;
use crate::errors::FlowTreeError;
use crate::formulation::{build_flow_model, FlowConstraint, TreeVars};
use crate::objective::Objective;
use crate::solver::{SolveOutcome, SolveStatus, Solver, SolverSettings};
use crate::tree::{FittedTree, TreeTopology};
use crate::validation::check_treatments_filter;
use log::info;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What the search reported for a fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolveSummary {
    pub status: SolveStatus,
    pub objective: Option<f64>,
    pub best_bound: f64,
    pub nodes: usize,
    pub lazy_cuts: usize,
    /// Seconds spent in the search.
    pub elapsed: f64,
    /// Separation statistics, for the Benders formulation only.
    pub callback: Option<CallbackReport>,
}

impl SolveSummary {
    fn new(outcome: &SolveOutcome, callback: Option<CallbackReport>) -> Self {
        SolveSummary {
            status: outcome.status,
            objective: outcome.objective,
            best_bound: outcome.best_bound,
            nodes: outcome.nodes,
            lazy_cuts: outcome.lazy_cuts,
            elapsed: outcome.elapsed.as_secs_f64(),
            callback,
        }
    }
}

pub fn solver_settings(cfg: &TreeConfig) -> SolverSettings {
    SolverSettings {
        time_limit: cfg.time_limit.map(Duration::from_secs_f64),
        node_limit: cfg.node_limit,
        fractional_callbacks: cfg.separate_fractional,
        log_interval: cfg.log_interval,
        ..SolverSettings::default()
    }
}

fn extract(
    cfg: &TreeConfig,
    data: &TrainingData,
    tree: &TreeVars,
    outcome: &SolveOutcome,
) -> Result<FittedTree, FlowTreeError> {
    let values = outcome
        .values
        .as_ref()
        .ok_or(FlowTreeError::NoFeasibleTree(outcome.status))?;
    let structure = tree.values(|v| values[v.index()]);
    Ok(FittedTree::new(cfg.depth, data.feature_names.clone(), structure))
}

/// Learn the tree maximising `objective` over `data`.
///
/// * `cfg` - Depth, formulation, limits and treatment filter.
/// * `data` - Validated training set.
/// * `objective` - What the tree maximises.
pub fn fit_structure(
    cfg: &TreeConfig,
    data: &TrainingData,
    objective: &Objective,
) -> Result<(FittedTree, SolveSummary), FlowTreeError> {
    fit_constrained(cfg, data, objective, &[])
}

fn check_side_constraints(cfg: &TreeConfig, data: &TrainingData, side: &[FlowConstraint]) -> Result<(), FlowTreeError> {
    if side.is_empty() {
        return Ok(());
    }
    if cfg.formulation == Formulation::Benders {
        return Err(FlowTreeError::InvalidParameter(
            String::from("formulation"),
            String::from("Direct when constraints on the flow are given"),
            String::from("Benders"),
        ));
    }
    for constraint in side {
        if constraint.treatment >= data.n_treatments {
            return Err(FlowTreeError::InvalidParameter(
                constraint.name.clone(),
                format!("a treatment below {}", data.n_treatments),
                constraint.treatment.to_string(),
            ));
        }
        if let Some((i, _)) = constraint.coeffs.iter().find(|(i, _)| *i >= data.n_rows) {
            return Err(FlowTreeError::InvalidParameter(
                constraint.name.clone(),
                format!("datapoints below {}", data.n_rows),
                i.to_string(),
            ));
        }
    }
    Ok(())
}

/// [`fit_structure`] with extra constraints on the absorbed flow of a direct model.
pub fn fit_constrained(
    cfg: &TreeConfig,
    data: &TrainingData,
    objective: &Objective,
    side: &[FlowConstraint],
) -> Result<(FittedTree, SolveSummary), FlowTreeError> {
    cfg.validate_parameters()?;
    objective.validate(data)?;
    if let Some(filter) = &cfg.treatments_filter {
        check_treatments_filter(filter, data.n_treatments)?;
    }
    check_side_constraints(cfg, data, side)?;
    let topology = TreeTopology::new(cfg.depth)?;
    let solver = Solver::new(solver_settings(cfg));
    let filter = cfg.treatments_filter.as_ref();

    let mut builder = rayon::ThreadPoolBuilder::new();
    if let Some(n) = cfg.num_threads {
        builder = builder.num_threads(n);
    }
    let pool = builder.build().map_err(|e| FlowTreeError::ThreadPool(e.to_string()))?;

    let (fitted, summary) = pool.install(|| -> Result<(FittedTree, SolveSummary), FlowTreeError> {
        match cfg.formulation {
            Formulation::Direct => {
                let mut flow = build_flow_model(&topology, data, objective, filter);
                flow.add_side_constraints(&topology, data, side);
                let outcome = solver.optimize(&flow.model, None)?;
                let summary = SolveSummary::new(&outcome, None);
                extract(cfg, data, &flow.tree, &outcome).map(|f| (f, summary))
            }
            Formulation::Benders => {
                let master = build_master(&topology, data, objective, filter);
                let oracle = BendersOracle::new(&topology, data, objective, &master.tree, &master.g);
                let outcome = solver.optimize(&master.model, Some(&oracle))?;
                let summary = SolveSummary::new(&outcome, Some(oracle.stats.report()));
                extract(cfg, data, &master.tree, &outcome).map(|f| (f, summary))
            }
        }
    })?;

    info!(
        "Fitted depth {} tree: status {:?}, objective {:?}, bound {:.6}, {} nodes, {} lazy cuts in {:.3}s.",
        cfg.depth,
        summary.status,
        summary.objective,
        summary.best_bound,
        summary.nodes,
        summary.lazy_cuts,
        summary.elapsed
    );
    if let Some(report) = &summary.callback {
        info!(
            "Benders callbacks: {}/{} integer, {}/{} general with cuts.",
            report.callback_counter_integer_success,
            report.callback_counter_integer,
            report.callback_counter_general_success,
            report.callback_counter_general
        );
    }
    Ok((fitted, summary))
}
