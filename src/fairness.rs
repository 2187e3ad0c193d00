//! Fairness
//!
//! Classification trees whose rate of positive predictions may differ by at most
//! `fairness_bound` between any two levels of a protected feature, plus the group
//! rates used to audit any set of predictions.
//!
//! Every absorbed unit of flow under the positive class is one positive prediction,
//! so each parity condition is a pair of linear constraints on the per-class sinks.
use crate::classification::{class_weights, default_lambda, labelled_data, levels, ClassificationMode};
use crate::config::{TreeConfig, TreeIO};
use crate::data::Matrix;
use crate::errors::FlowTreeError;
use crate::formulation::{FlowConstraint, SinkKind};
use crate::learner::{fit_constrained, SolveSummary};
use crate::objective::Objective;
use crate::solver::Sense;
use crate::tree::FittedTree;
use crate::validation::check_consistent_length;
use log::info;
use serde::{Deserialize, Serialize};

/// Which rows a parity condition compares.
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Debug)]
pub enum FairnessType {
    /// Positive prediction rate over all rows.
    #[serde(rename = "SP")]
    StatisticalParity,
    /// Statistical parity within every level of the legitimate factor.
    #[serde(rename = "CSP")]
    ConditionalStatisticalParity,
    /// Positive prediction rate among rows whose label is not the positive class.
    #[serde(rename = "PE")]
    PredictiveEquality,
    /// Positive prediction rate among rows of the positive class.
    #[serde(rename = "EOpp")]
    EqualOpportunity,
    /// Predictive equality and equal opportunity together.
    #[serde(rename = "EOdds")]
    EqualizedOdds,
    /// Equal opportunity within every level of the legitimate factor.
    #[serde(rename = "CEO")]
    ConditionalEqualOpportunity,
}

impl FairnessType {
    fn tag(&self) -> &'static str {
        match self {
            FairnessType::StatisticalParity => "sp",
            FairnessType::ConditionalStatisticalParity => "csp",
            FairnessType::PredictiveEquality => "pe",
            FairnessType::EqualOpportunity => "eopp",
            FairnessType::EqualizedOdds => "eodds",
            FairnessType::ConditionalEqualOpportunity => "ceo",
        }
    }
}

/// Named subsets of rows inside which groups are compared.
fn strata(kind: FairnessType, labels: &[usize], positive: usize, legit: &[f64]) -> Vec<(String, Vec<usize>)> {
    let rows = 0..labels.len();
    let negatives = || -> (String, Vec<usize>) {
        (String::from("neg"), rows.clone().filter(|i| labels[*i] != positive).collect())
    };
    let positives = || -> (String, Vec<usize>) {
        (String::from("pos"), rows.clone().filter(|i| labels[*i] == positive).collect())
    };
    let per_level = |only_positive: bool| -> Vec<(String, Vec<usize>)> {
        levels(legit)
            .iter()
            .enumerate()
            .map(|(l, level)| {
                let members: Vec<usize> = rows
                    .clone()
                    .filter(|i| legit[*i] == *level && (!only_positive || labels[*i] == positive))
                    .collect();
                (format!("legit{}", l), members)
            })
            .collect()
    };
    match kind {
        FairnessType::StatisticalParity => vec![(String::from("all"), rows.clone().collect())],
        FairnessType::ConditionalStatisticalParity => per_level(false),
        FairnessType::PredictiveEquality => vec![negatives()],
        FairnessType::EqualOpportunity => vec![positives()],
        FairnessType::EqualizedOdds => vec![negatives(), positives()],
        FairnessType::ConditionalEqualOpportunity => per_level(true),
    }
}

/// Parity constraints on the positive class for every protected column, stratum
/// and pair of protected levels present in that stratum.
///
/// * `labels` - Class index of every row.
/// * `positive` - Class index of the positive class.
/// * `protected` - One column per protected feature.
/// * `legit` - Legitimate factor of every row, used by the conditional types.
pub fn fairness_constraints(
    kind: FairnessType,
    bound: f64,
    labels: &[usize],
    positive: usize,
    protected: &Matrix<f64>,
    legit: &[f64],
) -> Vec<FlowConstraint> {
    let strata = strata(kind, labels, positive, legit);
    let mut constraints = Vec::new();
    for c in 0..protected.cols {
        let column = protected.get_col(c);
        let groups = levels(column);
        for (name, rows) in strata.iter() {
            let members: Vec<Vec<usize>> = groups
                .iter()
                .map(|g| rows.iter().copied().filter(|i| column[*i] == *g).collect())
                .collect();
            for a in 0..groups.len() {
                for b in (a + 1)..groups.len() {
                    if members[a].is_empty() || members[b].is_empty() {
                        continue;
                    }
                    let mut coeffs: Vec<(usize, f64)> = members[a]
                        .iter()
                        .map(|i| (*i, 1.0 / members[a].len() as f64))
                        .collect();
                    coeffs.extend(members[b].iter().map(|i| (*i, -1.0 / members[b].len() as f64)));
                    let base = format!("{}[{},{},{},{}]", kind.tag(), c, a, b, name);
                    constraints.push(FlowConstraint {
                        name: format!("{}_upper", base),
                        treatment: positive,
                        coeffs: coeffs.clone(),
                        sense: Sense::Le,
                        rhs: bound,
                    });
                    constraints.push(FlowConstraint {
                        name: format!("{}_lower", base),
                        treatment: positive,
                        coeffs,
                        sense: Sense::Ge,
                        rhs: -bound,
                    });
                }
            }
        }
    }
    constraints
}

/// Share of the rows of `group` (within `condition` and true `label`, when given)
/// that received `prediction`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupRate {
    pub group: f64,
    pub condition: Option<f64>,
    pub label: Option<f64>,
    pub prediction: f64,
    pub rate: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GroupRates {
    pub rates: Vec<GroupRate>,
}

impl GroupRates {
    pub fn get(&self, group: f64, condition: Option<f64>, label: Option<f64>, prediction: f64) -> Option<f64> {
        self.rates
            .iter()
            .find(|r| r.group == group && r.condition == condition && r.label == label && r.prediction == prediction)
            .map(|r| r.rate)
    }
}

fn group_rates(
    protected: &[f64],
    condition: Option<&[f64]>,
    y: Option<&[f64]>,
    y_pred: &[f64],
) -> Result<GroupRates, FlowTreeError> {
    check_consistent_length("y_pred", protected.len(), y_pred.len())?;
    if let Some(condition) = condition {
        check_consistent_length("legit_factor", protected.len(), condition.len())?;
    }
    if let Some(y) = y {
        check_consistent_length("y", protected.len(), y.len())?;
    }
    let optional_levels = |values: Option<&[f64]>| -> Vec<Option<f64>> {
        match values {
            Some(v) => levels(v).into_iter().map(Some).collect(),
            None => vec![None],
        }
    };
    let within = |values: Option<&[f64]>, i: usize, level: Option<f64>| match (values, level) {
        (Some(v), Some(l)) => v[i] == l,
        _ => true,
    };
    let predictions = levels(y_pred);
    let mut rates = Vec::new();
    for group in levels(protected) {
        for cond in optional_levels(condition) {
            for label in optional_levels(y) {
                let members: Vec<usize> = (0..protected.len())
                    .filter(|i| protected[*i] == group && within(condition, *i, cond) && within(y, *i, label))
                    .collect();
                if members.is_empty() {
                    continue;
                }
                for prediction in predictions.iter() {
                    let hits = members.iter().filter(|i| y_pred[**i] == *prediction).count();
                    rates.push(GroupRate {
                        group,
                        condition: cond,
                        label,
                        prediction: *prediction,
                        rate: hits as f64 / members.len() as f64,
                    });
                }
            }
        }
    }
    Ok(GroupRates { rates })
}

/// `P(ŷ = prediction | protected = group)`.
pub fn statistical_parity(protected: &[f64], y_pred: &[f64]) -> Result<GroupRates, FlowTreeError> {
    group_rates(protected, None, None, y_pred)
}

/// `P(ŷ = prediction | protected = group, legit = condition)`.
pub fn conditional_statistical_parity(
    protected: &[f64],
    legit: &[f64],
    y_pred: &[f64],
) -> Result<GroupRates, FlowTreeError> {
    group_rates(protected, Some(legit), None, y_pred)
}

/// `P(ŷ = prediction | protected = group, y = label)`.
pub fn equalized_odds(protected: &[f64], y: &[f64], y_pred: &[f64]) -> Result<GroupRates, FlowTreeError> {
    group_rates(protected, None, Some(y), y_pred)
}

/// `P(ŷ = prediction | protected = group, legit = condition, y = label)`.
pub fn conditional_equalized_odds(
    protected: &[f64],
    legit: &[f64],
    y: &[f64],
    y_pred: &[f64],
) -> Result<GroupRates, FlowTreeError> {
    group_rates(protected, Some(legit), Some(y), y_pred)
}

fn default_positive_class() -> f64 {
    1.0
}

fn default_fairness_bound() -> f64 {
    1.0
}

/// Classification tree with a per-class sink network and optional parity constraints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FairClassificationTree {
    pub cfg: TreeConfig,
    #[serde(default = "default_lambda")]
    pub lambda: f64,
    #[serde(default)]
    pub mode: ClassificationMode,
    /// Label whose prediction rate is compared across groups.
    #[serde(default = "default_positive_class")]
    pub positive_class: f64,
    /// No constraint is added when `None`.
    #[serde(default)]
    pub fairness_type: Option<FairnessType>,
    #[serde(default = "default_fairness_bound")]
    pub fairness_bound: f64,
    #[serde(default)]
    pub feature_names: Option<Vec<String>>,
    #[serde(default)]
    pub classes: Vec<f64>,
    #[serde(default)]
    pub tree: Option<FittedTree>,
    #[serde(default)]
    pub summary: Option<SolveSummary>,
}

impl TreeIO for FairClassificationTree {}

impl Default for FairClassificationTree {
    fn default() -> Self {
        Self::new(TreeConfig::default())
    }
}

impl FairClassificationTree {
    pub fn new(cfg: TreeConfig) -> Self {
        FairClassificationTree {
            cfg,
            lambda: default_lambda(),
            mode: ClassificationMode::Accuracy,
            positive_class: default_positive_class(),
            fairness_type: None,
            fairness_bound: default_fairness_bound(),
            feature_names: None,
            classes: Vec::new(),
            tree: None,
            summary: None,
        }
    }

    pub fn set_lambda(mut self, lambda: f64) -> Self {
        self.lambda = lambda;
        self
    }

    pub fn set_mode(mut self, mode: ClassificationMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn set_positive_class(mut self, positive_class: f64) -> Self {
        self.positive_class = positive_class;
        self
    }

    pub fn set_fairness(mut self, fairness_type: Option<FairnessType>, fairness_bound: f64) -> Self {
        self.fairness_type = fairness_type;
        self.fairness_bound = fairness_bound;
        self
    }

    pub fn set_feature_names(mut self, feature_names: Vec<String>) -> Self {
        self.feature_names = Some(feature_names);
        self
    }

    /// Fit the tree.
    ///
    /// * `x` - Binary features, one row per datapoint.
    /// * `y` - Class label of every datapoint.
    /// * `protected` - Protected features, one column each.
    /// * `legit` - Legitimate factor of every datapoint.
    pub fn fit(&mut self, x: &Matrix<f64>, y: &[f64], protected: &Matrix<f64>, legit: &[f64]) -> Result<(), FlowTreeError> {
        if !(self.fairness_bound > 0.0 && self.fairness_bound <= 1.0) {
            return Err(FlowTreeError::InvalidParameter(
                String::from("fairness_bound"),
                String::from("a value in (0, 1]"),
                self.fairness_bound.to_string(),
            ));
        }
        let (data, classes) = labelled_data(x, y, self.feature_names.as_ref())?;
        check_consistent_length("protect_feat", x.rows, protected.rows)?;
        check_consistent_length("protect_feat data", protected.rows * protected.cols, protected.data.len())?;
        check_consistent_length("legit_factor", x.rows, legit.len())?;
        let positive = classes
            .iter()
            .position(|c| *c == self.positive_class)
            .ok_or_else(|| {
                FlowTreeError::InvalidParameter(
                    String::from("positive_class"),
                    format!("one of the labels {:?}", classes),
                    self.positive_class.to_string(),
                )
            })?;
        self.classes = classes;

        let side = match self.fairness_type {
            Some(kind) => fairness_constraints(kind, self.fairness_bound, &data.t, positive, protected, legit),
            None => Vec::new(),
        };
        let objective = Objective::Classification {
            weights: class_weights(self.mode, self.classes.len(), &data.t),
            lambda: self.lambda,
            sink: SinkKind::Multiple,
        };
        info!(
            "Fitting fair classification tree ({:?}, bound {}) on {} rows with {} parity constraints.",
            self.fairness_type,
            self.fairness_bound,
            data.n_rows,
            side.len()
        );
        let (tree, summary) = fit_constrained(&self.cfg, &data, &objective, &side)?;
        self.tree = Some(tree);
        self.summary = Some(summary);
        Ok(())
    }

    pub fn fitted(&self) -> Result<&FittedTree, FlowTreeError> {
        self.tree.as_ref().ok_or(FlowTreeError::NotFitted)
    }

    /// Predicted label of every row of `x`.
    pub fn predict(&self, x: &Matrix<f64>) -> Result<Vec<f64>, FlowTreeError> {
        let classes = self.fitted()?.predict(x, true)?;
        Ok(classes.into_iter().map(|k| self.classes[k]).collect())
    }
}
