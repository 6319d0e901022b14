use std::collections::BTreeSet;

use ndarray::{Array1, Array2, ArrayView2, Axis};

use crate::{MlErr, Result};

/// Standardizes every feature to zero mean and unit variance.
#[derive(Debug, Clone, Default)]
pub struct StandardScaler {
    mean: Array1<f32>,
    scale: Array1<f32>,
}

impl StandardScaler {
    /// Learns the per column mean and population standard deviation of `x`.
    ///
    /// Columns with no variance get a scale of 1 so they map to zeros.
    pub fn fit(x: ArrayView2<'_, f32>) -> Result<Self> {
        let mean = x.mean_axis(Axis(0)).ok_or(MlErr::EmptyDataset)?;
        let scale = x
            .std_axis(Axis(0), 0.0)
            .mapv(|s| if s > f32::EPSILON { s } else { 1.0 });

        Ok(Self { mean, scale })
    }

    /// Applies the learned standardization.
    ///
    /// # Errors
    /// If `x` doesn't have the amount of columns the scaler was fitted with.
    pub fn transform(&self, x: ArrayView2<'_, f32>) -> Result<Array2<f32>> {
        if x.ncols() != self.mean.len() {
            return Err(MlErr::SizeMismatch {
                a: "features",
                b: "scaler",
                got: x.ncols(),
                expected: self.mean.len(),
            });
        }

        Ok((&x - &self.mean) / &self.scale)
    }

    pub fn fit_transform(x: ArrayView2<'_, f32>) -> Result<(Self, Array2<f32>)> {
        let scaler = Self::fit(x)?;
        let scaled = scaler.transform(x)?;
        Ok((scaler, scaled))
    }

    pub fn mean(&self) -> &Array1<f32> {
        &self.mean
    }

    pub fn scale(&self) -> &Array1<f32> {
        &self.scale
    }
}

/// Maps string labels to `0..n_classes`, classes are kept sorted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LabelEncoder {
    classes: Vec<String>,
}

impl LabelEncoder {
    /// Learns the distinct labels in `labels`.
    pub fn fit<'a, I>(labels: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let classes: BTreeSet<&str> = labels.into_iter().collect();
        Self {
            classes: classes.into_iter().map(str::to_string).collect(),
        }
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    /// Encodes every label.
    ///
    /// # Errors
    /// If a label wasn't seen while fitting.
    pub fn transform<'a, I>(&self, labels: I) -> Result<Array1<usize>>
    where
        I: IntoIterator<Item = &'a str>,
    {
        labels
            .into_iter()
            .map(|label| {
                self.classes
                    .binary_search_by(|c| c.as_str().cmp(label))
                    .map_err(|_| MlErr::UnknownLabel(label.to_string()))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    #[test]
    fn scaled_columns_have_zero_mean_and_unit_variance() {
        let x = array![[1.0f32, 10.0], [2.0, 10.0], [3.0, 10.0]];
        let (scaler, scaled) = StandardScaler::fit_transform(x.view()).unwrap();

        assert_eq!(*scaler.mean(), array![2.0f32, 10.0]);
        let means = scaled.mean_axis(Axis(0)).unwrap();
        assert!(means.iter().all(|m| m.abs() < 1e-6));

        let std = scaled.std_axis(Axis(0), 0.0);
        assert!((std[0] - 1.0).abs() < 1e-5);
        assert_eq!(scaled.column(1), array![0.0f32, 0.0, 0.0]);
    }

    #[test]
    fn transform_checks_the_width() {
        let scaler = StandardScaler::fit(array![[1.0f32, 2.0]].view()).unwrap();
        assert!(scaler.transform(array![[1.0f32]].view()).is_err());
    }

    #[test]
    fn labels_are_sorted_and_encoded() {
        let encoder = LabelEncoder::fit(["time pressure", "no stress", "interruption", "no stress"]);

        assert_eq!(encoder.classes(), ["interruption", "no stress", "time pressure"]);
        assert_eq!(
            encoder.transform(["no stress", "time pressure"]).unwrap(),
            array![1usize, 2]
        );
        assert!(matches!(
            encoder.transform(["relaxed"]),
            Err(MlErr::UnknownLabel(_))
        ));
    }
}
