//! Prescriptive Tree
//!
//! Learns which treatment to assign to each region of the feature space from
//! observational data: binary covariates, the treatment each datapoint received,
//! its outcome, and propensity scores and/or counterfactual outcome estimates.
use crate::config::{TreeConfig, TreeIO};
use crate::data::{default_feature_names, Matrix, TrainingData};
use crate::errors::FlowTreeError;
use crate::learner::{fit_structure, SolveSummary};
use crate::objective::Objective;
use crate::tree::FittedTree;
use crate::validation::{check_binary, check_consistent_length, check_ipw, check_treatments, check_y, check_y_hat};
use log::info;
use serde::{Deserialize, Serialize};

/// Observational signals a prescriptive tree is learned from.
pub enum OutcomeSignals<'a> {
    /// Propensity of the treatment each datapoint received.
    InversePropensity { ipw: &'a [f64] },
    /// Estimated outcome of every datapoint under every treatment, one column per treatment.
    DirectMethod { y_hat: &'a Matrix<'a, f64> },
    DoublyRobust {
        ipw: &'a [f64],
        y_hat: &'a Matrix<'a, f64>,
    },
}

impl OutcomeSignals<'_> {
    fn objective(&self) -> Objective {
        match self {
            OutcomeSignals::InversePropensity { .. } => Objective::InversePropensity,
            OutcomeSignals::DirectMethod { .. } => Objective::DirectMethod,
            OutcomeSignals::DoublyRobust { .. } => Objective::DoublyRobust,
        }
    }

    fn ipw(&self) -> Option<&[f64]> {
        match self {
            OutcomeSignals::InversePropensity { ipw } | OutcomeSignals::DoublyRobust { ipw, .. } => Some(*ipw),
            OutcomeSignals::DirectMethod { .. } => None,
        }
    }

    fn y_hat(&self) -> Option<&Matrix<'_, f64>> {
        match self {
            OutcomeSignals::DirectMethod { y_hat } | OutcomeSignals::DoublyRobust { y_hat, .. } => Some(*y_hat),
            OutcomeSignals::InversePropensity { .. } => None,
        }
    }
}

/// Optimal prescriptive tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrescriptiveTree {
    pub cfg: TreeConfig,
    #[serde(default)]
    pub feature_names: Option<Vec<String>>,
    #[serde(default)]
    pub tree: Option<FittedTree>,
    #[serde(default)]
    pub summary: Option<SolveSummary>,
}

impl TreeIO for PrescriptiveTree {}

impl Default for PrescriptiveTree {
    fn default() -> Self {
        Self::new(TreeConfig::default())
    }
}

impl PrescriptiveTree {
    pub fn new(cfg: TreeConfig) -> Self {
        PrescriptiveTree {
            cfg,
            feature_names: None,
            tree: None,
            summary: None,
        }
    }

    /// Set names for the feature columns, used when printing the tree.
    pub fn set_feature_names(mut self, feature_names: Vec<String>) -> Self {
        self.feature_names = Some(feature_names);
        self
    }

    /// Fit the tree.
    ///
    /// * `x` - Binary covariates, one row per datapoint.
    /// * `t` - Treatment received by every datapoint, a dense enumeration `0..K-1`.
    /// * `y` - Observed outcome of every datapoint; larger is better.
    /// * `signals` - Propensities and/or counterfactual estimates.
    pub fn fit(&mut self, x: &Matrix<f64>, t: &[usize], y: &[f64], signals: OutcomeSignals) -> Result<(), FlowTreeError> {
        let data = self.training_data(x, t, y, &signals)?;
        let objective = signals.objective();
        info!(
            "Fitting prescriptive tree ({:?}) on {} rows, {} features, {} treatments.",
            objective, data.n_rows, data.n_features, data.n_treatments
        );
        let (tree, summary) = fit_structure(&self.cfg, &data, &objective)?;
        self.tree = Some(tree);
        self.summary = Some(summary);
        Ok(())
    }

    fn training_data(
        &self,
        x: &Matrix<f64>,
        t: &[usize],
        y: &[f64],
        signals: &OutcomeSignals,
    ) -> Result<TrainingData, FlowTreeError> {
        let features = check_binary(x)?;
        check_consistent_length("t", x.rows, t.len())?;
        let n_treatments = check_treatments(t)?;
        check_y(x.rows, y)?;
        let ipw = match signals.ipw() {
            Some(ipw) => {
                check_ipw(x.rows, ipw)?;
                Some(ipw.to_vec())
            }
            None => None,
        };
        let y_hat = match signals.y_hat() {
            Some(y_hat) => Some(check_y_hat(x.rows, n_treatments, y_hat)?),
            None => None,
        };
        let feature_names = match &self.feature_names {
            Some(names) => {
                check_consistent_length("feature_names", x.cols, names.len())?;
                names.clone()
            }
            None => default_feature_names(x.cols),
        };
        Ok(TrainingData {
            x: features,
            n_rows: x.rows,
            n_features: x.cols,
            feature_names,
            t: t.to_vec(),
            n_treatments,
            y: y.to_vec(),
            ipw,
            y_hat,
        })
    }

    pub fn fitted(&self) -> Result<&FittedTree, FlowTreeError> {
        self.tree.as_ref().ok_or(FlowTreeError::NotFitted)
    }

    /// Treatment prescribed for every row of `x`.
    pub fn predict(&self, x: &Matrix<f64>) -> Result<Vec<usize>, FlowTreeError> {
        self.fitted()?.predict(x, true)
    }
}
