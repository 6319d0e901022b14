use comms::{Config, Metrics, Parameters, Scalar};
use learning::{Dataset, LogisticRegression, metrics};
use log::{debug, info};
use rand::rngs::StdRng;

use crate::{
    client::{Client, EvaluateOutput, FitOutput},
    error::Result,
};

/// A `Client` training a logistic regression on its partition of the dataset.
pub struct LogRegClient {
    model: LogisticRegression,
    train: Dataset,
    test: Dataset,
    rng: StdRng,
}

impl LogRegClient {
    /// Creates a new `LogRegClient`.
    ///
    /// # Arguments
    /// * `model` - The local model, already initialized.
    /// * `train` - The local training partition.
    /// * `test` - The data to evaluate the global model on.
    /// * `rng` - The source of randomness for shuffling the training data.
    pub fn new(model: LogisticRegression, train: Dataset, test: Dataset, rng: StdRng) -> Self {
        Self {
            model,
            train,
            test,
            rng,
        }
    }

    pub fn model(&self) -> &LogisticRegression {
        &self.model
    }
}

impl Client for LogRegClient {
    fn get_parameters(&mut self) -> Result<Parameters> {
        Ok(self.model.parameters()?)
    }

    fn fit(&mut self, parameters: &Parameters, config: &Config) -> Result<FitOutput> {
        self.model.set_parameters(parameters)?;
        let report = self.model.fit(&self.train, &mut self.rng)?;

        if !report.converged {
            debug!(epochs = report.epochs; "local training didn't converge");
        }

        let rnd = config.get("rnd").and_then(Scalar::as_i64).unwrap_or_default();
        info!("training finished for round {rnd}");

        Ok(FitOutput {
            parameters: self.model.parameters()?,
            num_examples: self.train.len() as u64,
            metrics: Metrics::from([("train_loss".to_string(), Scalar::Float(report.loss))]),
        })
    }

    fn evaluate(&mut self, parameters: &Parameters, _config: &Config) -> Result<EvaluateOutput> {
        self.model.set_parameters(parameters)?;

        let proba = self.model.predict_proba(self.test.x())?;
        let loss = metrics::log_loss(self.test.y(), proba.view())?;
        let accuracy = self.model.score(&self.test)?;

        Ok(EvaluateOutput {
            loss,
            num_examples: self.test.len() as u64,
            metrics: Metrics::from([("accuracy".to_string(), Scalar::Float(accuracy))]),
        })
    }
}

#[cfg(test)]
mod tests {
    use learning::{LogisticConfig, MlErr};
    use ndarray::array;
    use rand::SeedableRng;

    use super::*;
    use crate::error::ClientErr;

    fn client() -> LogRegClient {
        let train = Dataset::new(
            array![[-2.0f32], [-1.5], [-1.0], [1.0], [1.5], [2.0]],
            array![0usize, 0, 0, 1, 1, 1],
        )
        .unwrap();
        let test = Dataset::new(array![[-1.0f32], [1.0]], array![0usize, 1]).unwrap();

        let mut model = LogisticRegression::new(LogisticConfig {
            max_iter: 50,
            learning_rate: 0.5,
            ..Default::default()
        });
        model.set_initial_params(2, 1);

        LogRegClient::new(model, train, test, StdRng::seed_from_u64(0))
    }

    #[test]
    fn initial_parameters_are_zeros() {
        let params = client().get_parameters().unwrap();

        assert_eq!(params.shapes(), &[vec![2usize, 1], vec![2]]);
        assert!(params.values().iter().all(|v| *v == 0.0));
    }

    #[test]
    fn fit_reports_the_training_partition_size() {
        let mut client = client();
        let params = client.get_parameters().unwrap();
        let config = Config::from([("rnd".to_string(), Scalar::Int(1))]);

        let out = client.fit(&params, &config).unwrap();

        assert_eq!(out.num_examples, 6);
        assert_eq!(out.parameters.shapes(), params.shapes());
        assert_ne!(out.parameters, params);
    }

    #[test]
    fn trained_parameters_evaluate_well() {
        let mut client = client();
        let params = client.get_parameters().unwrap();
        let trained = client.fit(&params, &Config::new()).unwrap().parameters;

        let out = client.evaluate(&trained, &Config::new()).unwrap();

        assert_eq!(out.num_examples, 2);
        assert_eq!(out.metrics["accuracy"], Scalar::Float(1.0));
        assert!(out.loss < 2f64.ln());
    }

    #[test]
    fn mismatched_parameters_are_rejected() {
        let mut client = client();
        let params = Parameters::zeros(vec![vec![3, 1], vec![3]]).unwrap();

        let err = client.evaluate(&params, &Config::new()).unwrap_err();
        assert!(matches!(err, ClientErr::Ml(MlErr::SizeMismatch { .. })));
    }
}
