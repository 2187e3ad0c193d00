//! Objective
//!
//! The closed set of objectives a tree can be learned under. Each one knows which
//! flow network it needs, how to weight the flow variables of that network, and
//! the value a single datapoint contributes once its terminal node is known.
use crate::data::TrainingData;
use crate::errors::FlowTreeError;
use crate::formulation::{FlowVars, SinkKind, TreeVars};
use crate::solver::{LinExpr, VarId};
use crate::tree::topology::TreeTopology;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Objective {
    /// Observed outcome of correctly routed datapoints, divided by the propensity of the observed treatment.
    InversePropensity,
    /// Counterfactual estimate of the assigned treatment.
    DirectMethod,
    /// Direct method plus an inverse propensity correction on the observed treatment.
    DoublyRobust,
    /// Weighted count of correctly classified datapoints, minus `lambda` per branching node.
    ///
    /// `sink` picks the network; side constraints on predicted classes need one sink per class.
    Classification {
        weights: Vec<f64>,
        lambda: f64,
        #[serde(default)]
        sink: SinkKind,
    },
}

/// Propensity of the observed treatment; callers have checked it is present.
fn propensity(data: &TrainingData, i: usize) -> f64 {
    data.ipw.as_ref().map_or(1.0, |p| p[i])
}

fn counterfactual(data: &TrainingData, i: usize, k: usize) -> f64 {
    data.y_hat(i, k).unwrap_or(0.0)
}

impl Objective {
    pub fn sink(&self) -> SinkKind {
        match self {
            Objective::InversePropensity => SinkKind::Single,
            Objective::Classification { sink, .. } => *sink,
            Objective::DirectMethod | Objective::DoublyRobust => SinkKind::Multiple,
        }
    }

    /// Check `data` carries every signal this objective reads.
    pub fn validate(&self, data: &TrainingData) -> Result<(), FlowTreeError> {
        let needs_ipw = matches!(self, Objective::InversePropensity | Objective::DoublyRobust);
        let needs_y_hat = matches!(self, Objective::DirectMethod | Objective::DoublyRobust);
        if needs_ipw && data.ipw.is_none() {
            return Err(FlowTreeError::InvalidParameter(
                String::from("ipw"),
                String::from("propensity weights for every row"),
                String::from("None"),
            ));
        }
        if needs_y_hat && data.y_hat.is_none() {
            return Err(FlowTreeError::InvalidParameter(
                String::from("y_hat"),
                String::from("counterfactual outcomes for every row and treatment"),
                String::from("None"),
            ));
        }
        if let Objective::Classification { weights, lambda, .. } = self {
            if weights.len() != data.n_rows {
                return Err(FlowTreeError::ShapeMismatch(
                    String::from("weights"),
                    data.n_rows,
                    weights.len(),
                ));
            }
            if !(0.0..=1.0).contains(lambda) {
                return Err(FlowTreeError::InvalidParameter(
                    String::from("lambda"),
                    String::from("a value in [0, 1]"),
                    lambda.to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Value of routing datapoint `i` to a node predicting its reference treatment,
    /// for single sink objectives.
    fn score(&self, data: &TrainingData, i: usize) -> f64 {
        match self {
            Objective::InversePropensity => data.y[i] / propensity(data, i),
            Objective::Classification { weights, lambda, .. } => (1.0 - lambda) * weights[i],
            Objective::DirectMethod | Objective::DoublyRobust => 0.0,
        }
    }

    /// Objective contribution of datapoint `i` when it terminates at a node predicting `k`.
    ///
    /// Single sink flow is optional, so a negative score is never worse than zero.
    pub fn reward(&self, data: &TrainingData, i: usize, k: usize) -> f64 {
        match self {
            Objective::InversePropensity | Objective::Classification { .. } => {
                if k == data.t[i] {
                    self.score(data, i).max(0.0)
                } else {
                    0.0
                }
            }
            Objective::DirectMethod => counterfactual(data, i, k),
            Objective::DoublyRobust => {
                let direct = counterfactual(data, i, k);
                if k == data.t[i] {
                    direct + (data.y[i] - direct) / propensity(data, i)
                } else {
                    direct
                }
            }
        }
    }

    /// Smallest and largest reward of datapoint `i` over every treatment.
    pub fn reward_range(&self, data: &TrainingData, i: usize) -> (f64, f64) {
        (0..data.n_treatments)
            .map(|k| self.reward(data, i, k))
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), r| (lo.min(r), hi.max(r)))
    }

    fn penalty(&self, tree: &TreeVars) -> LinExpr {
        let mut expr = LinExpr::new();
        if let Objective::Classification { lambda, .. } = self {
            if *lambda > 0.0 {
                for b in tree.all_b() {
                    expr.add_term(*b, -lambda);
                }
            }
        }
        expr
    }

    /// Linear objective over the flow variables of a direct model.
    pub fn flow_objective(
        &self,
        topology: &TreeTopology,
        data: &TrainingData,
        tree: &TreeVars,
        flow: &FlowVars,
    ) -> LinExpr {
        let mut expr = LinExpr::new();
        match self.sink() {
            SinkKind::Single => {
                for i in data.datapoints() {
                    expr.add_term(flow.z(i, topology.root()), self.score(data, i));
                }
            }
            SinkKind::Multiple => {
                for i in data.datapoints() {
                    for n in topology.all_nodes() {
                        for k in 0..data.n_treatments {
                            expr.add_term(flow.zeta_k(i, n, k), self.reward(data, i, k));
                        }
                    }
                }
            }
        }
        expr.add_expr(&self.penalty(tree), 1.0);
        expr
    }

    /// `Σ_i g[i]` plus the structural penalty, for a Benders master problem.
    pub fn surrogate_objective(&self, tree: &TreeVars, g: &[VarId]) -> LinExpr {
        let mut expr = LinExpr::sum(g.iter().copied());
        expr.add_expr(&self.penalty(tree), 1.0);
        expr
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::default_feature_names;

    fn data() -> TrainingData {
        TrainingData {
            x: vec![false, true],
            n_rows: 2,
            n_features: 1,
            feature_names: default_feature_names(1),
            t: vec![0, 1],
            n_treatments: 2,
            y: vec![1.0, -2.0],
            ipw: Some(vec![0.5, 0.25]),
            y_hat: Some(vec![0.2, 0.6, 0.9, -0.4]),
        }
    }

    #[test]
    fn test_sinks() {
        assert_eq!(Objective::InversePropensity.sink(), SinkKind::Single);
        assert_eq!(Objective::DirectMethod.sink(), SinkKind::Multiple);
        assert_eq!(Objective::DoublyRobust.sink(), SinkKind::Multiple);
        let classification = Objective::Classification {
            weights: vec![1.0; 2],
            lambda: 0.0,
            sink: SinkKind::Single,
        };
        assert_eq!(classification.sink(), SinkKind::Single);
        let per_class = Objective::Classification {
            weights: vec![1.0; 2],
            lambda: 0.0,
            sink: SinkKind::Multiple,
        };
        assert_eq!(per_class.sink(), SinkKind::Multiple);
        let data = data();
        // The reward does not depend on the network.
        assert_eq!(per_class.reward(&data, 1, 1), classification.reward(&data, 1, 1));
        assert_eq!(per_class.reward(&data, 1, 0), 0.0);
    }

    #[test]
    fn test_inverse_propensity_rewards() {
        let data = data();
        let objective = Objective::InversePropensity;
        assert_eq!(objective.reward(&data, 0, 0), 2.0);
        assert_eq!(objective.reward(&data, 0, 1), 0.0);
        // Row 1 scores -8, which the flow can always avoid.
        assert_eq!(objective.reward(&data, 1, 1), 0.0);
        assert_eq!(objective.reward_range(&data, 0), (0.0, 2.0));
    }

    #[test]
    fn test_doubly_robust_corrects_observed_treatment_only() {
        let data = data();
        let objective = Objective::DoublyRobust;
        // 0.2 + (1.0 - 0.2) / 0.5
        assert!((objective.reward(&data, 0, 0) - 1.8).abs() < 1e-12);
        assert!((objective.reward(&data, 0, 1) - 0.6).abs() < 1e-12);
        // -0.4 + (-2.0 + 0.4) / 0.25
        assert!((objective.reward(&data, 1, 1) + 6.8).abs() < 1e-12);
        assert!((objective.reward(&data, 1, 0) - 0.9).abs() < 1e-12);
        let (lo, hi) = objective.reward_range(&data, 1);
        assert!((lo + 6.8).abs() < 1e-12 && (hi - 0.9).abs() < 1e-12);
    }

    #[test]
    fn test_direct_method_rewards() {
        let data = data();
        assert_eq!(Objective::DirectMethod.reward(&data, 1, 0), 0.9);
        assert_eq!(Objective::DirectMethod.reward(&data, 1, 1), -0.4);
    }

    #[test]
    fn test_validate() {
        let mut data = data();
        assert!(Objective::DoublyRobust.validate(&data).is_ok());
        data.y_hat = None;
        assert!(Objective::DirectMethod.validate(&data).is_err());
        assert!(Objective::InversePropensity.validate(&data).is_ok());
        data.ipw = None;
        assert!(Objective::InversePropensity.validate(&data).is_err());
        let bad_lambda = Objective::Classification {
            weights: vec![1.0; 2],
            lambda: 1.5,
            sink: SinkKind::Single,
        };
        assert!(bad_lambda.validate(&data).is_err());
        let bad_weights = Objective::Classification {
            weights: vec![1.0; 3],
            lambda: 0.0,
            sink: SinkKind::Single,
        };
        assert!(matches!(
            bad_weights.validate(&data),
            Err(FlowTreeError::ShapeMismatch(_, 2, 3))
        ));
    }
}
