//! Data
//!
//! The borrowed input matrix and the validated, owned training set built from it.

/// Contiguous column major matrix data container.
///
/// Holds a borrowed slice in column-major (Fortran-style) order, the layout
/// used by columnar data frames, so each feature column is a contiguous slice.
pub struct Matrix<'a, T> {
    /// The raw data stored in a single slice.
    pub data: &'a [T],
    /// Number of rows in the matrix.
    pub rows: usize,
    /// Number of columns in the matrix.
    pub cols: usize,
}

impl<'a, T> Matrix<'a, T> {
    /// Create a new Matrix.
    pub fn new(data: &'a [T], rows: usize, cols: usize) -> Self {
        Matrix { data, rows, cols }
    }

    /// Get a single reference to an item in the matrix.
    ///
    /// * `i` - The ith row of the data to get.
    /// * `j` - the jth column of the data to get.
    pub fn get(&self, i: usize, j: usize) -> &T {
        &self.data[j * self.rows + i]
    }

    /// Get an entire column in the matrix.
    pub fn get_col(&self, col: usize) -> &[T] {
        &self.data[col * self.rows..(col + 1) * self.rows]
    }

    /// Get access to a row of the data, as an iterator.
    pub fn get_row_iter(&self, row: usize) -> std::iter::StepBy<std::iter::Skip<std::slice::Iter<'a, T>>> {
        self.data.iter().skip(row).step_by(self.rows.max(1))
    }
}

impl<'a, T> Matrix<'a, T>
where
    T: Copy,
{
    /// Get a row of the data as a vector.
    pub fn get_row(&self, row: usize) -> Vec<T> {
        self.get_row_iter(row).take(self.cols).copied().collect()
    }
}

/// Validated training set, owned so the model and the separation oracle can
/// share it read-only across threads.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingData {
    /// Binary features, row major.
    pub x: Vec<bool>,
    pub n_rows: usize,
    pub n_features: usize,
    pub feature_names: Vec<String>,
    /// Reference treatment of every row: the observed treatment, or the class for classification.
    pub t: Vec<usize>,
    pub n_treatments: usize,
    /// Observed outcome of every row.
    pub y: Vec<f64>,
    /// Propensity of the observed treatment.
    pub ipw: Option<Vec<f64>>,
    /// Counterfactual outcome estimates, row major `n_rows x n_treatments`.
    pub y_hat: Option<Vec<f64>>,
}

impl TrainingData {
    pub fn row(&self, i: usize) -> &[bool] {
        &self.x[i * self.n_features..(i + 1) * self.n_features]
    }

    pub fn value(&self, i: usize, f: usize) -> bool {
        self.x[i * self.n_features + f]
    }

    pub fn y_hat(&self, i: usize, k: usize) -> Option<f64> {
        self.y_hat.as_ref().map(|v| v[i * self.n_treatments + k])
    }

    pub fn datapoints(&self) -> std::ops::Range<usize> {
        0..self.n_rows
    }
}

/// Default names `x0, x1, ...` for unnamed features.
pub fn default_feature_names(n: usize) -> Vec<String> {
    (0..n).map(|j| format!("x{}", j)).collect()
}
