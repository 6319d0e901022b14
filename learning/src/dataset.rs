use std::num::NonZeroUsize;

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rand::{Rng, SeedableRng, rngs::StdRng, seq::SliceRandom};

use crate::{MlErr, Result};

/// Samples as rows of `x` with their encoded class labels in `y`.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    x: Array2<f32>,
    y: Array1<usize>,
}

impl Dataset {
    /// Creates a new `Dataset`.
    ///
    /// # Arguments
    /// * `x` - The feature matrix, one sample per row.
    /// * `y` - The label of every sample.
    ///
    /// # Errors
    /// If the amount of rows in `x` and labels in `y` differ.
    pub fn new(x: Array2<f32>, y: Array1<usize>) -> Result<Self> {
        if x.nrows() != y.len() {
            return Err(MlErr::SizeMismatch {
                a: "features",
                b: "labels",
                got: y.len(),
                expected: x.nrows(),
            });
        }

        Ok(Self { x, y })
    }

    pub fn x(&self) -> ArrayView2<'_, f32> {
        self.x.view()
    }

    pub fn y(&self) -> ArrayView1<'_, usize> {
        self.y.view()
    }

    pub fn len(&self) -> usize {
        self.y.len()
    }

    pub fn is_empty(&self) -> bool {
        self.y.is_empty()
    }

    pub fn n_features(&self) -> usize {
        self.x.ncols()
    }

    /// Returns a new dataset with the samples at `indices`, in that order.
    pub fn select(&self, indices: &[usize]) -> Self {
        Self {
            x: self.x.select(Axis(0), indices),
            y: self.y.select(Axis(0), indices),
        }
    }

    /// Shuffles the samples in place.
    pub fn shuffle<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        let mut perm: Vec<usize> = (0..self.len()).collect();
        perm.shuffle(rng);
        *self = self.select(&perm);
    }

    /// Splits the dataset into `n` contiguous partitions.
    ///
    /// When the samples don't divide evenly, the first `len % n` partitions hold one
    /// extra sample each.
    ///
    /// # Errors
    /// If `n` is zero.
    pub fn partition(&self, n: usize) -> Result<Vec<Dataset>> {
        if n == 0 {
            return Err(MlErr::InvalidPartitions(n));
        }

        let (base, extra) = (self.len() / n, self.len() % n);
        let mut start = 0;

        let parts = (0..n)
            .map(|i| {
                let size = base + usize::from(i < extra);
                let indices: Vec<usize> = (start..start + size).collect();
                start += size;
                self.select(&indices)
            })
            .collect();

        Ok(parts)
    }

    /// Iterates over the samples in batches of at most `size` rows.
    pub fn batches(
        &self,
        size: NonZeroUsize,
    ) -> impl Iterator<Item = (ArrayView2<'_, f32>, ArrayView1<'_, usize>)> {
        self.x
            .axis_chunks_iter(Axis(0), size.get())
            .zip(self.y.axis_chunks_iter(Axis(0), size.get()))
    }

    /// Counts the samples of every class in `0..n_classes`, labels beyond are ignored.
    pub fn class_counts(&self, n_classes: usize) -> Vec<usize> {
        let mut counts = vec![0; n_classes];

        for &label in &self.y {
            if let Some(count) = counts.get_mut(label) {
                *count += 1;
            }
        }

        counts
    }
}

/// Splits `data` into a train and a test set.
///
/// # Arguments
/// * `data` - The dataset to split.
/// * `test_size` - The fraction of samples that go to the test set.
/// * `seed` - Seed of the shuffling, the same seed always gives the same split.
/// * `stratify` - Whether to keep the class proportions on both sides.
///
/// # Returns
/// The `(train, test)` pair.
pub fn train_test_split(
    data: &Dataset,
    test_size: f32,
    seed: u64,
    stratify: bool,
) -> Result<(Dataset, Dataset)> {
    if !(test_size > 0.0 && test_size < 1.0) {
        return Err(MlErr::InvalidSplit(test_size));
    }

    if data.is_empty() {
        return Err(MlErr::EmptyDataset);
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut train = Vec::with_capacity(data.len());
    let mut test = Vec::new();
    let n_test = (((data.len() as f32) * test_size).ceil() as usize).min(data.len());

    if stratify {
        let n_classes = data.y.iter().max().map_or(0, |&m| m + 1);
        let mut by_class = vec![Vec::new(); n_classes];

        for (i, &label) in data.y.iter().enumerate() {
            by_class[label].push(i);
        }

        let counts: Vec<usize> = by_class.iter().map(Vec::len).collect();
        let quotas = allocate(&counts, n_test);

        for (mut indices, quota) in by_class.into_iter().zip(quotas) {
            indices.shuffle(&mut rng);
            let (class_test, class_train) = indices.split_at(quota);
            test.extend_from_slice(class_test);
            train.extend_from_slice(class_train);
        }

        train.shuffle(&mut rng);
        test.shuffle(&mut rng);
    } else {
        let mut indices: Vec<usize> = (0..data.len()).collect();
        indices.shuffle(&mut rng);

        let (t, r) = indices.split_at(n_test);
        test.extend_from_slice(t);
        train.extend_from_slice(r);
    }

    Ok((data.select(&train), data.select(&test)))
}

/// Shares `total` out between classes proportionally to their `counts`.
///
/// Every class gets the floor of its exact share, what's left goes to the
/// classes with the largest remainders, lower labels first on ties.
fn allocate(counts: &[usize], total: usize) -> Vec<usize> {
    let n: usize = counts.iter().sum();
    if n == 0 {
        return vec![0; counts.len()];
    }

    let mut quotas: Vec<usize> = counts.iter().map(|&c| c * total / n).collect();
    let mut by_remainder: Vec<usize> = (0..counts.len()).collect();
    by_remainder.sort_by_key(|&i| std::cmp::Reverse(counts[i] * total % n));

    let left = total.saturating_sub(quotas.iter().sum());
    for &i in by_remainder.iter().take(left) {
        quotas[i] += 1;
    }

    quotas
}
