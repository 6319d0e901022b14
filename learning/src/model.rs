//! Multinomial logistic regression trained with mini-batch gradient descent.
//!
//! The weights live in one flat buffer laid out as the `[coef, intercept]` parameter
//! pair exchanged with the server: `coef` is `(n_classes, n_features)` in row-major
//! order, followed by the `n_classes` intercepts when `fit_intercept` is set.

use std::num::NonZeroUsize;

use comms::Parameters;
use log::debug;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rand::{Rng, seq::SliceRandom};

use crate::{
    MlErr, Result,
    dataset::Dataset,
    metrics,
    optimization::{GradientDescent, Optimizer},
};

/// Regularization term added to the mean cross-entropy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Penalty {
    None,
    /// `||coef||^2 / (2 * c * n_samples)`, smaller `c` means stronger regularization.
    L2 { c: f32 },
}

/// Hyperparameters of a `LogisticRegression`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LogisticConfig {
    pub penalty: Penalty,
    /// Epochs over the local data per `fit` call.
    pub max_iter: usize,
    /// Keep the current weights between `fit` calls instead of starting from zeros.
    pub warm_start: bool,
    pub fit_intercept: bool,
    pub learning_rate: f32,
    pub batch_size: NonZeroUsize,
    /// Largest weight change under which an epoch counts as converged.
    pub tol: f32,
}

impl Default for LogisticConfig {
    fn default() -> Self {
        Self {
            penalty: Penalty::L2 { c: 1.0 },
            max_iter: 1,
            warm_start: true,
            fit_intercept: true,
            learning_rate: 0.1,
            batch_size: NonZeroUsize::new(32).unwrap_or(NonZeroUsize::MIN),
            tol: 1e-4,
        }
    }
}

/// Outcome of a `fit` call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitReport {
    pub epochs: usize,
    pub converged: bool,
    /// The regularized training loss after the last epoch.
    pub loss: f64,
}

/// A linear classifier over `n_classes` classes.
#[derive(Debug, Clone)]
pub struct LogisticRegression {
    config: LogisticConfig,
    n_classes: usize,
    n_features: usize,
    weights: Vec<f32>,
}

impl LogisticRegression {
    /// Creates a new, uninitialized, `LogisticRegression`.
    ///
    /// The model must either be fitted, or have `set_initial_params` or `set_parameters`
    /// called before predicting.
    pub fn new(config: LogisticConfig) -> Self {
        Self {
            config,
            n_classes: 0,
            n_features: 0,
            weights: Vec::new(),
        }
    }

    pub fn config(&self) -> &LogisticConfig {
        &self.config
    }

    pub fn n_classes(&self) -> usize {
        self.n_classes
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn is_initialized(&self) -> bool {
        !self.weights.is_empty()
    }

    fn n_coef(&self) -> usize {
        self.n_classes * self.n_features
    }

    fn shapes(&self) -> Vec<Vec<usize>> {
        let mut shapes = vec![vec![self.n_classes, self.n_features]];
        if self.config.fit_intercept {
            shapes.push(vec![self.n_classes]);
        }
        shapes
    }

    /// Sets every weight to zero for the given dimensions.
    ///
    /// Parameters only exist once a model has been fitted, but the server may ask for
    /// them before the first round, so they are created upfront.
    pub fn set_initial_params(&mut self, n_classes: usize, n_features: usize) {
        self.n_classes = n_classes;
        self.n_features = n_features;

        let intercepts = if self.config.fit_intercept { n_classes } else { 0 };
        self.weights = vec![0.0; n_classes * n_features + intercepts];
    }

    /// The coefficient matrix, `(n_classes, n_features)`.
    pub fn coef(&self) -> Result<ArrayView2<'_, f32>> {
        if !self.is_initialized() {
            return Err(MlErr::NotInitialized);
        }

        ArrayView2::from_shape((self.n_classes, self.n_features), &self.weights[..self.n_coef()])
            .map_err(|_| MlErr::SizeMismatch {
                a: "coef",
                b: "weights",
                got: self.weights.len(),
                expected: self.n_coef(),
            })
    }

    /// The intercept of every class, `None` when the model doesn't fit one.
    pub fn intercept(&self) -> Option<ArrayView1<'_, f32>> {
        (self.config.fit_intercept && self.is_initialized())
            .then(|| ArrayView1::from(&self.weights[self.n_coef()..]))
    }

    /// Returns the model parameters as `[coef]` or `[coef, intercept]`.
    pub fn parameters(&self) -> Result<Parameters> {
        if !self.is_initialized() {
            return Err(MlErr::NotInitialized);
        }

        Parameters::new(self.shapes(), self.weights.clone()).map_err(|_| MlErr::SizeMismatch {
            a: "parameter shapes",
            b: "weights",
            got: self.weights.len(),
            expected: self.n_coef(),
        })
    }

    /// Replaces the model weights with `params`.
    ///
    /// An uninitialized model adopts the dimensions of `params`, an initialized one
    /// requires them to match its own.
    pub fn set_parameters(&mut self, params: &Parameters) -> Result<()> {
        let shapes = params.shapes();
        let tensors = if self.config.fit_intercept { 2 } else { 1 };

        if shapes.len() != tensors {
            return Err(MlErr::SizeMismatch {
                a: "parameter tensors",
                b: "model tensors",
                got: shapes.len(),
                expected: tensors,
            });
        }

        let &[n_classes, n_features] = shapes[0].as_slice() else {
            return Err(MlErr::SizeMismatch {
                a: "coef rank",
                b: "model coef rank",
                got: shapes[0].len(),
                expected: 2,
            });
        };

        if self.config.fit_intercept && shapes[1].as_slice() != [n_classes] {
            return Err(MlErr::SizeMismatch {
                a: "intercept",
                b: "coef classes",
                got: shapes[1].iter().product(),
                expected: n_classes,
            });
        }

        if self.is_initialized() && (n_classes, n_features) != (self.n_classes, self.n_features) {
            return Err(MlErr::SizeMismatch {
                a: "parameters",
                b: "model",
                got: n_classes * n_features,
                expected: self.n_coef(),
            });
        }

        self.n_classes = n_classes;
        self.n_features = n_features;
        self.weights.clear();
        self.weights.extend_from_slice(params.values());
        Ok(())
    }

    /// Class probabilities of every row of `x`, `(rows, n_classes)`.
    pub fn predict_proba(&self, x: ArrayView2<'_, f32>) -> Result<Array2<f32>> {
        let mut logits = self.decision_function(x)?;
        softmax_rows(&mut logits);
        Ok(logits)
    }

    /// The most likely class of every row of `x`.
    pub fn predict(&self, x: ArrayView2<'_, f32>) -> Result<Array1<usize>> {
        let proba = self.predict_proba(x)?;
        Ok(proba.map_axis(Axis(1), |row| argmax(row)))
    }

    /// Accuracy of the model over `data`.
    pub fn score(&self, data: &Dataset) -> Result<f64> {
        let y_pred = self.predict(data.x())?;
        metrics::accuracy(data.y(), y_pred.view())
    }

    /// Trains on `data` with plain gradient descent.
    pub fn fit<R: Rng + ?Sized>(&mut self, data: &Dataset, rng: &mut R) -> Result<FitReport> {
        let mut optimizer = GradientDescent::new(self.config.learning_rate);
        self.fit_with(data, &mut optimizer, rng)
    }

    /// Trains on `data` for up to `max_iter` epochs, stepping with `optimizer`.
    ///
    /// Samples are shuffled every epoch. Training stops early once no weight moves more
    /// than `tol` within an epoch. Not converging is reported, not an error.
    ///
    /// # Errors
    /// If `data` is empty, or its features or labels don't fit the model dimensions.
    pub fn fit_with<O, R>(&mut self, data: &Dataset, optimizer: &mut O, rng: &mut R) -> Result<FitReport>
    where
        O: Optimizer,
        R: Rng + ?Sized,
    {
        if data.is_empty() {
            return Err(MlErr::EmptyDataset);
        }

        if !self.is_initialized() {
            let n_classes = data.y().iter().max().map_or(0, |&m| m + 1);
            self.set_initial_params(n_classes, data.n_features());
        } else if !self.config.warm_start {
            self.weights.fill(0.0);
        }

        self.check_dataset(data)?;

        let n = data.len();
        let mut grad = vec![0.0; self.weights.len()];
        let mut previous = self.weights.clone();
        let mut order: Vec<usize> = (0..n).collect();
        let mut report = FitReport {
            epochs: 0,
            converged: false,
            loss: f64::NAN,
        };

        for _ in 0..self.config.max_iter {
            order.shuffle(rng);
            let epoch_data = data.select(&order);

            for (x, y) in epoch_data.batches(self.config.batch_size) {
                self.gradient(x, y, n, &mut grad)?;
                optimizer.update_params(&mut self.weights, &grad);
            }

            report.epochs += 1;

            let max_change = self
                .weights
                .iter()
                .zip(&previous)
                .map(|(w, p)| (w - p).abs())
                .fold(0.0, f32::max);

            if max_change < self.config.tol {
                report.converged = true;
                break;
            }

            previous.copy_from_slice(&self.weights);
        }

        report.loss = self.loss(data)?;

        if !report.converged {
            debug!(epochs = report.epochs; "logistic regression did not converge");
        }

        Ok(report)
    }

    /// The regularized mean cross-entropy of the model over `data`.
    pub fn loss(&self, data: &Dataset) -> Result<f64> {
        let proba = self.predict_proba(data.x())?;
        let ce = metrics::log_loss(data.y(), proba.view())?;

        let reg = match self.config.penalty {
            Penalty::None => 0.0,
            Penalty::L2 { c } => {
                let sq: f64 = self.weights[..self.n_coef()]
                    .iter()
                    .map(|&w| (w as f64).powi(2))
                    .sum();
                sq / (2.0 * c as f64 * data.len() as f64)
            }
        };

        Ok(ce + reg)
    }

    fn check_dataset(&self, data: &Dataset) -> Result<()> {
        if data.n_features() != self.n_features {
            return Err(MlErr::SizeMismatch {
                a: "dataset features",
                b: "model features",
                got: data.n_features(),
                expected: self.n_features,
            });
        }

        if let Some(&label) = data.y().iter().find(|&&l| l >= self.n_classes) {
            return Err(MlErr::SizeMismatch {
                a: "label",
                b: "model classes",
                got: label,
                expected: self.n_classes,
            });
        }

        Ok(())
    }

    fn decision_function(&self, x: ArrayView2<'_, f32>) -> Result<Array2<f32>> {
        let coef = self.coef()?;

        if x.ncols() != self.n_features {
            return Err(MlErr::SizeMismatch {
                a: "input features",
                b: "model features",
                got: x.ncols(),
                expected: self.n_features,
            });
        }

        let mut logits = x.dot(&coef.t());
        if let Some(intercept) = self.intercept() {
            logits += &intercept;
        }

        Ok(logits)
    }

    /// Writes the gradient of the batch objective into `grad`, laid out like the weights.
    ///
    /// # Arguments
    /// * `x` - The batch features.
    /// * `y` - The batch labels.
    /// * `n` - The total amount of training samples, scales the penalty.
    /// * `grad` - Output buffer, as long as the weights.
    fn gradient(
        &self,
        x: ArrayView2<'_, f32>,
        y: ArrayView1<'_, usize>,
        n: usize,
        grad: &mut [f32],
    ) -> Result<()> {
        let b = x.nrows() as f32;
        let mut delta = self.predict_proba(x)?;

        for (mut row, &label) in delta.rows_mut().into_iter().zip(&y) {
            row[label] -= 1.0;
        }

        let coef = self.coef()?;
        let mut grad_coef = delta.t().dot(&x) / b;

        if let Penalty::L2 { c } = self.config.penalty {
            grad_coef.scaled_add(1.0 / (c * n as f32), &coef);
        }

        let n_coef = self.n_coef();
        grad[..n_coef]
            .iter_mut()
            .zip(grad_coef.iter())
            .for_each(|(g, &v)| *g = v);

        if self.config.fit_intercept {
            let grad_intercept = delta.sum_axis(Axis(0)) / b;
            grad[n_coef..]
                .iter_mut()
                .zip(grad_intercept.iter())
                .for_each(|(g, &v)| *g = v);
        }

        Ok(())
    }
}

fn softmax_rows(logits: &mut Array2<f32>) {
    for mut row in logits.rows_mut() {
        let max = row.fold(f32::NEG_INFINITY, |m, &v| m.max(v));
        row.mapv_inplace(|v| (v - max).exp());
        let sum = row.sum();
        row /= sum;
    }
}

fn argmax(row: ArrayView1<'_, f32>) -> usize {
    row.iter()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |best, (i, &p)| {
            if p > best.1 { (i, p) } else { best }
        })
        .0
}
