//! Classification Tree
//!
//! Optimal classification tree over binary features. Every class is a "treatment"
//! of the flow network and each datapoint's label is its reference treatment.
use crate::config::{TreeConfig, TreeIO};
use crate::data::{default_feature_names, Matrix, TrainingData};
use crate::errors::FlowTreeError;
use crate::formulation::SinkKind;
use crate::learner::{fit_structure, SolveSummary};
use crate::objective::Objective;
use crate::tree::FittedTree;
use crate::validation::{check_binary, check_consistent_length, check_y};
use log::info;
use serde::{Deserialize, Serialize};

/// How correctly classified datapoints are weighted.
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum ClassificationMode {
    /// Every datapoint counts once.
    #[default]
    Accuracy,
    /// Datapoints of class `c` count `1 / (n_classes * count(c))`, so every class weighs the same.
    Balance,
}

pub(crate) fn default_lambda() -> f64 {
    0.0
}

/// Weight of every datapoint given its class index.
pub(crate) fn class_weights(mode: ClassificationMode, n_classes: usize, labels: &[usize]) -> Vec<f64> {
    match mode {
        ClassificationMode::Accuracy => vec![1.0; labels.len()],
        ClassificationMode::Balance => {
            let mut counts = vec![0usize; n_classes];
            for k in labels.iter() {
                counts[*k] += 1;
            }
            labels.iter().map(|k| 1.0 / (n_classes as f64 * counts[*k] as f64)).collect()
        }
    }
}

/// Sorted distinct values of `values`.
pub(crate) fn levels(values: &[f64]) -> Vec<f64> {
    let mut levels = values.to_vec();
    levels.sort_by(|a, b| a.total_cmp(b));
    levels.dedup();
    levels
}

/// Training set whose reference treatment is the class index of every label,
/// together with the label value of every class.
pub(crate) fn labelled_data(
    x: &Matrix<f64>,
    y: &[f64],
    feature_names: Option<&Vec<String>>,
) -> Result<(TrainingData, Vec<f64>), FlowTreeError> {
    let features = check_binary(x)?;
    check_y(x.rows, y)?;
    let feature_names = match feature_names {
        Some(names) => {
            check_consistent_length("feature_names", x.cols, names.len())?;
            names.clone()
        }
        None => default_feature_names(x.cols),
    };
    let classes = levels(y);
    let labels: Vec<usize> = y
        .iter()
        .map(|v| classes.partition_point(|c| c.total_cmp(v).is_lt()))
        .collect();
    let data = TrainingData {
        x: features,
        n_rows: x.rows,
        n_features: x.cols,
        feature_names,
        t: labels,
        n_treatments: classes.len(),
        y: vec![1.0; x.rows],
        ipw: None,
        y_hat: None,
    };
    Ok((data, classes))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationTree {
    pub cfg: TreeConfig,
    /// Weight of one branching node against the classification term, in `[0, 1]`.
    #[serde(default = "default_lambda")]
    pub lambda: f64,
    #[serde(default)]
    pub mode: ClassificationMode,
    #[serde(default)]
    pub feature_names: Option<Vec<String>>,
    /// Sorted distinct labels seen in `fit`; class `k` of the tree is `classes[k]`.
    #[serde(default)]
    pub classes: Vec<f64>,
    #[serde(default)]
    pub tree: Option<FittedTree>,
    #[serde(default)]
    pub summary: Option<SolveSummary>,
}

impl TreeIO for ClassificationTree {}

impl Default for ClassificationTree {
    fn default() -> Self {
        Self::new(TreeConfig::default())
    }
}

impl ClassificationTree {
    pub fn new(cfg: TreeConfig) -> Self {
        ClassificationTree {
            cfg,
            lambda: default_lambda(),
            mode: ClassificationMode::Accuracy,
            feature_names: None,
            classes: Vec::new(),
            tree: None,
            summary: None,
        }
    }

    /// Set the penalty on branching nodes.
    pub fn set_lambda(mut self, lambda: f64) -> Self {
        self.lambda = lambda;
        self
    }

    pub fn set_mode(mut self, mode: ClassificationMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn set_feature_names(mut self, feature_names: Vec<String>) -> Self {
        self.feature_names = Some(feature_names);
        self
    }

    fn weights(&self, labels: &[usize]) -> Vec<f64> {
        class_weights(self.mode, self.classes.len(), labels)
    }

    /// Fit the tree.
    ///
    /// * `x` - Binary features, one row per datapoint.
    /// * `y` - Class label of every datapoint.
    pub fn fit(&mut self, x: &Matrix<f64>, y: &[f64]) -> Result<(), FlowTreeError> {
        let (data, classes) = labelled_data(x, y, self.feature_names.as_ref())?;
        self.classes = classes;
        let objective = Objective::Classification {
            weights: self.weights(&data.t),
            lambda: self.lambda,
            sink: SinkKind::Single,
        };
        info!(
            "Fitting classification tree ({:?}, lambda {}) on {} rows, {} features, {} classes.",
            self.mode,
            self.lambda,
            data.n_rows,
            data.n_features,
            data.n_treatments
        );
        let (tree, summary) = fit_structure(&self.cfg, &data, &objective)?;
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
