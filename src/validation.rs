//! Validation
//!
//! Shape and domain checks applied to every input before a model is built.
use crate::data::Matrix;
use crate::errors::FlowTreeError;
use hashbrown::HashSet;

/// Fail if `found` rows were provided for `name` where `expected` are required.
pub fn check_consistent_length(name: &str, expected: usize, found: usize) -> Result<(), FlowTreeError> {
    if expected != found {
        return Err(FlowTreeError::ShapeMismatch(name.to_string(), expected, found));
    }
    Ok(())
}

/// Check that every entry of `x` is 0 or 1, returning the features row major.
pub fn check_binary(x: &Matrix<f64>) -> Result<Vec<bool>, FlowTreeError> {
    if x.rows == 0 || x.cols == 0 {
        return Err(FlowTreeError::EmptyData);
    }
    check_consistent_length("X data", x.rows * x.cols, x.data.len())?;
    let bad: Vec<usize> = (0..x.cols)
        .filter(|j| x.get_col(*j).iter().any(|v| *v != 0.0 && *v != 1.0))
        .collect();
    if !bad.is_empty() {
        return Err(FlowTreeError::NonBinaryFeatures(bad));
    }
    let mut rows = Vec::with_capacity(x.rows * x.cols);
    for i in 0..x.rows {
        rows.extend(x.get_row_iter(i).take(x.cols).map(|v| *v == 1.0));
    }
    Ok(rows)
}

/// Check that the treatments enumerate `0..K-1` with every value present, returning `K`.
pub fn check_treatments(t: &[usize]) -> Result<usize, FlowTreeError> {
    let seen: HashSet<usize> = t.iter().copied().collect();
    let max = t.iter().copied().max().ok_or(FlowTreeError::EmptyData)?;
    if max != seen.len() - 1 {
        return Err(FlowTreeError::NonDenseTreatments);
    }
    Ok(seen.len())
}

/// Check that the outcomes are finite and there is one per row.
pub fn check_y(rows: usize, y: &[f64]) -> Result<(), FlowTreeError> {
    check_consistent_length("y", rows, y.len())?;
    match y.iter().position(|v| !v.is_finite()) {
        Some(i) => Err(FlowTreeError::NonFiniteOutcome(i)),
        None => Ok(()),
    }
}

/// Check that there is one propensity per row and each lies in (0, 1].
pub fn check_ipw(rows: usize, ipw: &[f64]) -> Result<(), FlowTreeError> {
    check_consistent_length("ipw", rows, ipw.len())?;
    match ipw.iter().position(|v| !(*v > 0.0 && *v <= 1.0)) {
        Some(i) => Err(FlowTreeError::InvalidPropensity(i, ipw[i])),
        None => Ok(()),
    }
}

/// Check the counterfactual estimates, one column per treatment, returning them row major.
pub fn check_y_hat(rows: usize, n_treatments: usize, y_hat: &Matrix<f64>) -> Result<Vec<f64>, FlowTreeError> {
    check_consistent_length("y_hat", rows, y_hat.rows)?;
    if y_hat.cols != n_treatments {
        return Err(FlowTreeError::CounterfactualShape(n_treatments, y_hat.cols));
    }
    check_consistent_length("y_hat data", y_hat.rows * y_hat.cols, y_hat.data.len())?;
    let mut values = Vec::with_capacity(rows * n_treatments);
    for i in 0..rows {
        let row = y_hat.get_row(i);
        if row.iter().any(|v| !v.is_finite()) {
            return Err(FlowTreeError::NonFiniteOutcome(i));
        }
        values.extend(row);
    }
    Ok(values)
}

/// Check that prediction data has the columns the tree was fitted on.
pub fn check_columns_match(expected: usize, x: &Matrix<f64>) -> Result<(), FlowTreeError> {
    if x.cols != expected {
        return Err(FlowTreeError::ColumnMismatch(expected, x.cols));
    }
    Ok(())
}

/// Check that the filter names known treatments and leaves at least one allowed.
pub fn check_treatments_filter(filter: &HashSet<usize>, n_treatments: usize) -> Result<(), FlowTreeError> {
    if let Some(k) = filter.iter().find(|k| **k >= n_treatments) {
        return Err(FlowTreeError::InvalidParameter(
            "treatments_filter".to_string(),
            format!("treatments below {}", n_treatments),
            k.to_string(),
        ));
    }
    if filter.len() >= n_treatments {
        let mut excluded: Vec<usize> = filter.iter().copied().collect();
        excluded.sort_unstable();
        return Err(FlowTreeError::EmptyTreatmentSet(excluded, n_treatments));
    }
    Ok(())
}
