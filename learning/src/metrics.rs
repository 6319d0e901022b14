use ndarray::{ArrayView1, ArrayView2};

use crate::{MlErr, Result};

const EPS: f64 = 1e-15;

/// Mean cross-entropy of the predicted class probabilities against the true labels.
///
/// Probabilities are clipped to `[1e-15, 1 - 1e-15]` and every row is renormalized
/// before taking the logarithm.
///
/// # Errors
/// If the amount of rows and labels differ, the set is empty, or a label has no column.
pub fn log_loss(y: ArrayView1<'_, usize>, proba: ArrayView2<'_, f32>) -> Result<f64> {
    if y.len() != proba.nrows() {
        return Err(MlErr::SizeMismatch {
            a: "labels",
            b: "probabilities",
            got: proba.nrows(),
            expected: y.len(),
        });
    }

    if y.is_empty() {
        return Err(MlErr::EmptyDataset);
    }

    let mut total = 0.0;

    for (&label, row) in y.iter().zip(proba.rows()) {
        if label >= row.len() {
            return Err(MlErr::SizeMismatch {
                a: "label",
                b: "classes",
                got: label,
                expected: row.len(),
            });
        }

        let clip = |p: f32| (p as f64).clamp(EPS, 1.0 - EPS);
        let norm: f64 = row.iter().map(|&p| clip(p)).sum();
        total -= (clip(row[label]) / norm).ln();
    }

    Ok(total / y.len() as f64)
}

/// Fraction of predictions that match the true labels.
pub fn accuracy(y: ArrayView1<'_, usize>, y_pred: ArrayView1<'_, usize>) -> Result<f64> {
    if y.len() != y_pred.len() {
        return Err(MlErr::SizeMismatch {
            a: "labels",
            b: "predictions",
            got: y_pred.len(),
            expected: y.len(),
        });
    }

    if y.is_empty() {
        return Err(MlErr::EmptyDataset);
    }

    let hits = y.iter().zip(&y_pred).filter(|(a, b)| a == b).count();
    Ok(hits as f64 / y.len() as f64)
}
