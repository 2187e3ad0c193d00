//! Branch and Bound
//!
//! Depth-first branch and bound over the binary variables of a [`Model`],
//! with LP relaxations solved by `minilp` and lazy constraints collected from a [`Callback`].
use super::callback::{Callback, CallbackContext, CallbackWhere, LazyCuts};
use super::model::{Constraint, Direction, Model, Sense, VarId, VarType};
use crate::constants::{GAP_TOLERANCE, INTEGRALITY_TOLERANCE, MAX_CUT_ROUNDS};
use crate::errors::FlowTreeError;
use log::{debug, info, warn};
use minilp::{ComparisonOp, LinearExpr, OptimizationDirection, Problem, Solution};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Final state of a search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SolveStatus {
    /// The incumbent is proven optimal.
    Optimal,
    /// Wall-clock limit reached; the incumbent (if any) is the best found.
    TimeLimit,
    /// Node limit reached; the incumbent (if any) is the best found.
    NodeLimit,
    Infeasible,
    Unbounded,
}

/// Settings of the search.
#[derive(Debug, Clone)]
pub struct SolverSettings {
    pub time_limit: Option<Duration>,
    pub node_limit: Option<usize>,
    pub int_tol: f64,
    /// Absolute gap under which a node is pruned.
    pub gap_tol: f64,
    /// Callback rounds allowed at a single fractional node.
    pub max_cut_rounds: usize,
    /// Invoke the callback at fractional nodes as well as integral ones.
    pub fractional_callbacks: bool,
    /// Log progress every N nodes, zero disables it.
    pub log_interval: usize,
}

impl Default for SolverSettings {
    fn default() -> Self {
        SolverSettings {
            time_limit: None,
            node_limit: None,
            int_tol: INTEGRALITY_TOLERANCE,
            gap_tol: GAP_TOLERANCE,
            max_cut_rounds: MAX_CUT_ROUNDS,
            fractional_callbacks: true,
            log_interval: 0,
        }
    }
}

/// Result of [`Solver::optimize`].
#[derive(Debug, Clone)]
pub struct SolveOutcome {
    pub status: SolveStatus,
    /// Best integral assignment found, binaries rounded to exact 0/1.
    pub values: Option<Vec<f64>>,
    pub objective: Option<f64>,
    /// Bound on the optimal objective from the open part of the search.
    pub best_bound: f64,
    pub nodes: usize,
    pub lazy_cuts: usize,
    pub elapsed: Duration,
}

impl SolveOutcome {
    pub fn has_solution(&self) -> bool {
        self.values.is_some()
    }

    /// Fitted value of `var` in the incumbent.
    pub fn value(&self, var: VarId) -> Option<f64> {
        self.values.as_ref().map(|v| v[var.index()])
    }
}

struct SearchNode {
    solution: Solution,
    depth: usize,
    /// Length of the cut pool when this node's relaxation was last updated.
    cuts_seen: usize,
}

struct Incumbent {
    values: Vec<f64>,
    objective: f64,
}

/// Mutable state of one call to [`Solver::optimize`].
struct Search<'a> {
    model: &'a Model,
    settings: &'a SolverSettings,
    callback: Option<&'a dyn Callback>,
    lp_vars: Vec<minilp::Variable>,
    binaries: Vec<usize>,
    sign: f64,
    stack: Vec<SearchNode>,
    pool: Vec<Constraint>,
    incumbent: Option<Incumbent>,
}

/// Branch and bound driver.
#[derive(Debug, Clone, Default)]
pub struct Solver {
    pub settings: SolverSettings,
}

impl Solver {
    pub fn new(settings: SolverSettings) -> Self {
        Solver { settings }
    }

    /// Solve `model`, invoking `callback` at every node where it applies.
    pub fn optimize(&self, model: &Model, callback: Option<&dyn Callback>) -> Result<SolveOutcome, FlowTreeError> {
        let start = Instant::now();
        let (problem, lp_vars) = relaxation(model);
        let root = match problem.solve() {
            Ok(solution) => solution,
            Err(minilp::Error::Infeasible) => return Ok(empty_outcome(SolveStatus::Infeasible, start)),
            Err(minilp::Error::Unbounded) => return Ok(empty_outcome(SolveStatus::Unbounded, start)),
        };
        info!(
            "Root relaxation: obj={:.6}, {} vars ({} binary), {} constraints",
            root.objective() + model.objective_constant(),
            model.num_vars(),
            model.num_binaries(),
            model.num_constraints()
        );

        let mut search = Search {
            model,
            settings: &self.settings,
            callback,
            lp_vars,
            binaries: model
                .variables()
                .iter()
                .enumerate()
                .filter(|(_, v)| v.var_type == VarType::Binary)
                .map(|(i, _)| i)
                .collect(),
            sign: match model.direction {
                Direction::Maximize => 1.0,
                Direction::Minimize => -1.0,
            },
            stack: vec![SearchNode {
                solution: root,
                depth: 0,
                cuts_seen: 0,
            }],
            pool: Vec::new(),
            incumbent: None,
        };

        let mut status = SolveStatus::Optimal;
        let mut nodes = 0;
        while let Some(node) = search.stack.pop() {
            if let Some(limit) = self.settings.time_limit {
                if start.elapsed() >= limit {
                    warn!("Reached time limit after {} nodes, returning the best tree found so far.", nodes);
                    search.stack.push(node);
                    status = SolveStatus::TimeLimit;
                    break;
                }
            }
            if let Some(limit) = self.settings.node_limit {
                if nodes >= limit {
                    warn!("Reached node limit of {}.", limit);
                    search.stack.push(node);
                    status = SolveStatus::NodeLimit;
                    break;
                }
            }
            nodes += 1;
            search.process(node)?;
            if self.settings.log_interval > 0 && nodes % self.settings.log_interval == 0 {
                info!(
                    "Node {}: open={}, cuts={}, incumbent={:?}",
                    nodes,
                    search.stack.len(),
                    search.pool.len(),
                    search.incumbent.as_ref().map(|inc| inc.objective)
                );
            }
        }

        let constant = model.objective_constant();
        let incumbent_obj = search.incumbent.as_ref().map(|inc| inc.objective);
        let best_bound = search
            .stack
            .iter()
            .map(|n| n.solution.objective() + constant)
            .chain(incumbent_obj)
            .fold(None, |acc: Option<f64>, b| match acc {
                Some(a) if search.sign * a >= search.sign * b => Some(a),
                _ => Some(b),
            })
            .unwrap_or(f64::NAN);
        if status == SolveStatus::Optimal && search.incumbent.is_none() {
            status = SolveStatus::Infeasible;
        }
        info!(
            "Search finished with status {:?} after {} nodes and {} lazy cuts in {:.3}s.",
            status,
            nodes,
            search.pool.len(),
            start.elapsed().as_secs_f64()
        );

        let lazy_cuts = search.pool.len();
        let (values, objective) = match search.incumbent {
            Some(inc) => (Some(inc.values), Some(inc.objective)),
            None => (None, None),
        };
        Ok(SolveOutcome {
            status,
            values,
            objective,
            best_bound,
            nodes,
            lazy_cuts,
            elapsed: start.elapsed(),
        })
    }
}

impl<'a> Search<'a> {
    fn process(&mut self, node: SearchNode) -> Result<(), FlowTreeError> {
        let pending = self.pool[node.cuts_seen..].to_vec();
        let mut solution = match apply_cuts(node.solution, &pending, &self.lp_vars)? {
            Some(s) => s,
            None => return Ok(()),
        };
        let mut rounds = 0;
        loop {
            let bound = solution.objective() + self.model.objective_constant();
            if self.prunable(bound) {
                return Ok(());
            }
            let values: Vec<f64> = self.lp_vars.iter().map(|v| *solution.var_value(*v)).collect();
            let branch_var = self.most_fractional(&values);
            let location = match branch_var {
                Some(_) => CallbackWhere::General,
                None => CallbackWhere::Integer,
            };

            let cuts = self.run_callback(location, &values, rounds)?;
            let violated = cuts.iter().any(|c| c.violation(&values) > self.settings.int_tol);
            if !cuts.is_empty() {
                debug!("{} lazy cuts at depth {} ({:?})", cuts.len(), node.depth, location);
                rounds += 1;
                let applied = apply_cuts(solution, &cuts, &self.lp_vars)?;
                self.pool.extend(cuts);
                solution = match applied {
                    Some(s) => s,
                    None => return Ok(()),
                };
                if violated {
                    continue;
                }
            }

            match branch_var {
                None => {
                    self.update_incumbent(values);
                }
                Some(j) => {
                    let cuts_seen = self.pool.len();
                    let depth = node.depth + 1;
                    let up_first = values[j] >= 0.5;
                    let var = self.lp_vars[j];
                    let down = fix(solution.clone(), var, 0.0)?;
                    let up = fix(solution, var, 1.0)?;
                    // Stack order: the child pushed last is explored first.
                    let (first, second) = if up_first { (down, up) } else { (up, down) };
                    for child in [first, second].into_iter().flatten() {
                        self.stack.push(SearchNode {
                            solution: child,
                            depth,
                            cuts_seen,
                        });
                    }
                }
            }
            return Ok(());
        }
    }

    fn run_callback(
        &self,
        location: CallbackWhere,
        values: &[f64],
        rounds: usize,
    ) -> Result<Vec<Constraint>, FlowTreeError> {
        let callback = match self.callback {
            Some(cb) => cb,
            None => return Ok(Vec::new()),
        };
        if location == CallbackWhere::General
            && (!self.settings.fractional_callbacks || rounds >= self.settings.max_cut_rounds)
        {
            return Ok(Vec::new());
        }
        let cuts = LazyCuts::new();
        let ctx = CallbackContext::new(location, values, &cuts);
        callback.invoke(&ctx)?;
        Ok(cuts.into_sorted())
    }

    fn prunable(&self, bound: f64) -> bool {
        match &self.incumbent {
            Some(inc) => self.sign * bound <= self.sign * inc.objective + self.settings.gap_tol,
            None => false,
        }
    }

    fn most_fractional(&self, values: &[f64]) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;
        for &j in self.binaries.iter() {
            let frac = (values[j] - values[j].floor()).min(values[j].ceil() - values[j]);
            if frac > self.settings.int_tol && best.map_or(true, |(_, f)| frac > f) {
                best = Some((j, frac));
            }
        }
        best.map(|(j, _)| j)
    }

    fn update_incumbent(&mut self, mut values: Vec<f64>) {
        for &j in self.binaries.iter() {
            values[j] = values[j].round();
        }
        let objective = self.model.objective_value(&values);
        let improves = match &self.incumbent {
            Some(inc) => self.sign * objective > self.sign * inc.objective + self.settings.gap_tol,
            None => true,
        };
        if improves {
            debug!("New incumbent with objective {:.6}", objective);
            self.incumbent = Some(Incumbent { values, objective });
        }
    }
}

fn relaxation(model: &Model) -> (Problem, Vec<minilp::Variable>) {
    let mut problem = Problem::new(match model.direction {
        Direction::Maximize => OptimizationDirection::Maximize,
        Direction::Minimize => OptimizationDirection::Minimize,
    });
    let lp_vars: Vec<minilp::Variable> = model
        .variables()
        .iter()
        .map(|v| problem.add_var(v.obj, (v.lb, v.ub)))
        .collect();
    for constraint in model.constraints() {
        problem.add_constraint(lp_expr(constraint, &lp_vars), comparison(constraint.sense), constraint.rhs);
    }
    (problem, lp_vars)
}

fn lp_expr(constraint: &Constraint, lp_vars: &[minilp::Variable]) -> LinearExpr {
    let mut expr = LinearExpr::empty();
    for (var, coeff) in constraint.expr.terms.iter() {
        expr.add(lp_vars[var.index()], *coeff);
    }
    expr
}

fn comparison(sense: Sense) -> ComparisonOp {
    match sense {
        Sense::Le => ComparisonOp::Le,
        Sense::Ge => ComparisonOp::Ge,
        Sense::Eq => ComparisonOp::Eq,
    }
}

/// Add `cuts` to a relaxation. `None` means the relaxation became infeasible.
fn apply_cuts(
    mut solution: Solution,
    cuts: &[Constraint],
    lp_vars: &[minilp::Variable],
) -> Result<Option<Solution>, FlowTreeError> {
    for cut in cuts {
        solution = match solution.add_constraint(lp_expr(cut, lp_vars), comparison(cut.sense), cut.rhs) {
            Ok(s) => s,
            Err(minilp::Error::Infeasible) => return Ok(None),
            Err(e) => return Err(FlowTreeError::Solver(format!("{:?}", e))),
        };
    }
    Ok(Some(solution))
}

fn fix(solution: Solution, var: minilp::Variable, value: f64) -> Result<Option<Solution>, FlowTreeError> {
    match solution.fix_var(var, value) {
        Ok(s) => Ok(Some(s)),
        Err(minilp::Error::Infeasible) => Ok(None),
        Err(e) => Err(FlowTreeError::Solver(format!("{:?}", e))),
    }
}

fn empty_outcome(status: SolveStatus, start: Instant) -> SolveOutcome {
    info!("Root relaxation is {:?}.", status);
    SolveOutcome {
        status,
        values: None,
        objective: None,
        best_bound: f64::NAN,
        nodes: 0,
        lazy_cuts: 0,
        elapsed: start.elapsed(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::model::LinExpr;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn init_logger() {
        use log::LevelFilter;
        let _ = env_logger::builder()
            .is_test(true)
            .filter_module("minilp", LevelFilter::Error)
            .filter_level(LevelFilter::Warn)
            .try_init();
    }

    /// max 5a + 4b + 3c  s.t. 2a + 3b + c <= 5, 4a + b + 2c <= 11, 3a + 4b + 2c <= 8
    fn knapsack() -> (Model, Vec<VarId>) {
        let mut model = Model::new(Direction::Maximize);
        let vars: Vec<VarId> = (0..3).map(|i| model.add_binary(format!("x{}", i))).collect();
        let rows = [([2.0, 3.0, 1.0], 5.0), ([4.0, 1.0, 2.0], 11.0), ([3.0, 4.0, 2.0], 8.0)];
        for (r, (coeffs, rhs)) in rows.iter().enumerate() {
            let mut lhs = LinExpr::new();
            for (v, c) in vars.iter().zip(coeffs.iter()) {
                lhs.add_term(*v, *c);
            }
            model.add_constr(format!("r{}", r), lhs, Sense::Le, LinExpr::constant(*rhs));
        }
        let mut obj = LinExpr::new();
        for (v, c) in vars.iter().zip([5.0, 4.0, 3.0].iter()) {
            obj.add_term(*v, *c);
        }
        model.set_objective(obj);
        (model, vars)
    }

    #[test]
    fn test_knapsack_optimum() {
        init_logger();
        let (model, vars) = knapsack();
        let outcome = Solver::default().optimize(&model, None).unwrap();
        assert_eq!(outcome.status, SolveStatus::Optimal);
        // a + b is worth 9 and fits; a + c is worth 8.
        assert!((outcome.objective.unwrap() - 9.0).abs() < 1e-6);
        let x: Vec<f64> = vars.iter().map(|v| outcome.value(*v).unwrap()).collect();
        assert_eq!(x, vec![1.0, 1.0, 0.0]);
    }

    #[test]
    fn test_infeasible_model() {
        let mut model = Model::new(Direction::Maximize);
        let x = model.add_binary("x");
        let y = model.add_binary("y");
        model.add_constr("sum", LinExpr::sum([x, y]), Sense::Ge, LinExpr::constant(1.5));
        model.add_constr("cap", LinExpr::sum([x, y]), Sense::Le, LinExpr::constant(1.2));
        let outcome = Solver::default().optimize(&model, None).unwrap();
        assert_eq!(outcome.status, SolveStatus::Infeasible);
        assert!(!outcome.has_solution());
    }

    #[test]
    fn test_integer_infeasible_after_branching() {
        // 2x + 2y = 1 has the LP solution x = 0.5 but no binary one.
        let mut model = Model::new(Direction::Maximize);
        let x = model.add_binary("x");
        let y = model.add_binary("y");
        model.add_constr(
            "odd",
            LinExpr {
                terms: vec![(x, 2.0), (y, 2.0)],
                constant: 0.0,
            },
            Sense::Eq,
            LinExpr::constant(1.0),
        );
        let outcome = Solver::default().optimize(&model, None).unwrap();
        assert_eq!(outcome.status, SolveStatus::Infeasible);
    }

    /// Forbids selecting both variables through a lazy constraint only.
    struct ForbidPair {
        a: VarId,
        b: VarId,
        calls: AtomicUsize,
    }

    impl Callback for ForbidPair {
        fn invoke(&self, ctx: &CallbackContext<'_>) -> Result<(), FlowTreeError> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            if ctx.location() == CallbackWhere::Integer && ctx.value(self.a) + ctx.value(self.b) > 1.5 {
                ctx.add_lazy(Constraint::new(
                    "pair",
                    LinExpr::sum([self.a, self.b]),
                    Sense::Le,
                    LinExpr::constant(1.0),
                ));
            }
            Ok(())
        }
    }

    #[test]
    fn test_lazy_constraint_excludes_optimum() {
        init_logger();
        let (model, vars) = knapsack();
        let cb = ForbidPair {
            a: vars[0],
            b: vars[1],
            calls: AtomicUsize::new(0),
        };
        let outcome = Solver::default().optimize(&model, Some(&cb)).unwrap();
        assert_eq!(outcome.status, SolveStatus::Optimal);
        // Without {a, b} together the best is a + c = 8.
        assert!((outcome.objective.unwrap() - 8.0).abs() < 1e-6);
        assert!(outcome.lazy_cuts >= 1);
        assert!(cb.calls.load(Ordering::Relaxed) >= 1);
    }

    struct Failing;

    impl Callback for Failing {
        fn invoke(&self, ctx: &CallbackContext<'_>) -> Result<(), FlowTreeError> {
            match ctx.location() {
                CallbackWhere::Integer => Err(FlowTreeError::StructuralInconsistency { datapoint: 0, node: 1 }),
                CallbackWhere::General => Ok(()),
            }
        }
    }

    #[test]
    fn test_callback_error_aborts() {
        let (model, _) = knapsack();
        let result = Solver::default().optimize(&model, Some(&Failing));
        assert!(matches!(
            result,
            Err(FlowTreeError::StructuralInconsistency { datapoint: 0, node: 1 })
        ));
    }

    /// Stalls at integral nodes so the clock runs out once an incumbent exists.
    struct Stall(Duration);

    impl Callback for Stall {
        fn invoke(&self, ctx: &CallbackContext<'_>) -> Result<(), FlowTreeError> {
            if ctx.location() == CallbackWhere::Integer {
                std::thread::sleep(self.0);
            }
            Ok(())
        }
    }

    #[test]
    fn test_time_limit_keeps_incumbent() {
        // max x + y  s.t. 2x + 2y <= 3: the root is fractional and both branches stay open.
        let mut model = Model::new(Direction::Maximize);
        let x = model.add_binary("x");
        let y = model.add_binary("y");
        model.add_constr(
            "cap",
            LinExpr {
                terms: vec![(x, 2.0), (y, 2.0)],
                constant: 0.0,
            },
            Sense::Le,
            LinExpr::constant(3.0),
        );
        model.set_objective(LinExpr::sum([x, y]));
        let settings = SolverSettings {
            time_limit: Some(Duration::from_millis(50)),
            ..Default::default()
        };
        let stall = Stall(Duration::from_millis(200));
        let outcome = Solver::new(settings).optimize(&model, Some(&stall)).unwrap();
        assert_eq!(outcome.status, SolveStatus::TimeLimit);
        assert!(outcome.has_solution());
        assert!((outcome.objective.unwrap() - 1.0).abs() < 1e-6);
        assert!(outcome.best_bound >= outcome.objective.unwrap() - 1e-6);
        let picked = outcome.value(x).unwrap() + outcome.value(y).unwrap();
        assert_eq!(picked, 1.0);
    }

    #[test]
    fn test_node_limit_keeps_incumbent() {
        let (model, _) = knapsack();
        let settings = SolverSettings {
            node_limit: Some(0),
            ..Default::default()
        };
        let outcome = Solver::new(settings).optimize(&model, None).unwrap();
        assert_eq!(outcome.status, SolveStatus::NodeLimit);
        assert!(!outcome.has_solution());
        assert!(outcome.best_bound >= 9.0 - 1e-6);
    }
}
