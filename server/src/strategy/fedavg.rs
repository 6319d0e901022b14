use comms::{Config, Metrics, Parameters};
use log::warn;

use super::{
    ConfigFn, EvaluateFn, SampleSize, Strategy,
    aggregate::{weighted_average, weighted_loss_avg, weighted_metrics_avg},
};
use crate::{
    error::{Result, ServerErr},
    proxy::{ClientId, EvaluateIns, EvaluateRes, FitIns, FitRes},
};

/// How much each client's parameters count in the average.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Weighting {
    /// Proportional to the amount of examples the client trained on.
    #[default]
    Examples,
    /// Every client counts the same.
    Uniform,
}

/// Sampling and aggregation settings of `FedAvg`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FedAvgConfig {
    /// Share of the available clients sampled for training.
    pub fraction_fit: f64,
    /// Share of the available clients sampled for evaluation, `0` disables it.
    pub fraction_evaluate: f64,
    pub min_fit_clients: usize,
    pub min_evaluate_clients: usize,
    /// Clients to wait for before any sampling.
    pub min_available_clients: usize,
    /// Aggregate a round even if some of its clients failed.
    pub accept_failures: bool,
    pub weighting: Weighting,
}

impl Default for FedAvgConfig {
    fn default() -> Self {
        Self {
            fraction_fit: 0.1,
            fraction_evaluate: 0.1,
            min_fit_clients: 2,
            min_evaluate_clients: 2,
            min_available_clients: 2,
            accept_failures: true,
            weighting: Weighting::Examples,
        }
    }
}

/// Federated averaging: the new global model is the average of the clients' models.
pub struct FedAvg {
    config: FedAvgConfig,
    initial_parameters: Option<Parameters>,
    evaluate_fn: Option<Box<dyn EvaluateFn>>,
    on_fit_config: Option<ConfigFn>,
    on_evaluate_config: Option<ConfigFn>,
}

impl FedAvg {
    pub fn new(config: FedAvgConfig) -> Self {
        Self {
            config,
            initial_parameters: None,
            evaluate_fn: None,
            on_fit_config: None,
            on_evaluate_config: None,
        }
    }

    pub fn config(&self) -> &FedAvgConfig {
        &self.config
    }

    /// Starts training from `parameters` instead of asking a client for them.
    pub fn with_initial_parameters(mut self, parameters: Parameters) -> Self {
        self.initial_parameters = Some(parameters);
        self
    }

    /// Evaluates the global model on the server side after every round.
    pub fn with_evaluate_fn<E: EvaluateFn + 'static>(mut self, evaluate_fn: E) -> Self {
        self.evaluate_fn = Some(Box::new(evaluate_fn));
        self
    }

    /// Sets the config sent with every fit request of a round.
    pub fn with_on_fit_config<F>(mut self, on_fit_config: F) -> Self
    where
        F: Fn(u64) -> Config + Send + Sync + 'static,
    {
        self.on_fit_config = Some(Box::new(on_fit_config));
        self
    }

    /// Sets the config sent with every evaluate request of a round.
    pub fn with_on_evaluate_config<F>(mut self, on_evaluate_config: F) -> Self
    where
        F: Fn(u64) -> Config + Send + Sync + 'static,
    {
        self.on_evaluate_config = Some(Box::new(on_evaluate_config));
        self
    }

    fn sample_size(&self, available: usize, fraction: f64, min_clients: usize) -> SampleSize {
        let size = (available as f64 * fraction).floor() as usize;

        SampleSize {
            size: size.max(min_clients),
            min: self.config.min_available_clients,
        }
    }

    fn weight(&self, num_examples: u64) -> f64 {
        match self.config.weighting {
            Weighting::Examples => num_examples as f64,
            Weighting::Uniform => 1.0,
        }
    }
}

impl Default for FedAvg {
    fn default() -> Self {
        Self::new(FedAvgConfig::default())
    }
}

impl Strategy for FedAvg {
    fn initialize_parameters(&mut self) -> Option<Parameters> {
        self.initial_parameters.take()
    }

    fn num_fit_clients(&self, available: usize) -> SampleSize {
        self.sample_size(available, self.config.fraction_fit, self.config.min_fit_clients)
    }

    fn configure_fit(&self, round: u64, parameters: &Parameters) -> FitIns {
        FitIns {
            parameters: parameters.clone(),
            config: self
                .on_fit_config
                .as_ref()
                .map(|f| f(round))
                .unwrap_or_default(),
        }
    }

    fn aggregate_fit(
        &self,
        round: u64,
        results: &[(ClientId, FitRes)],
        failures: &[ServerErr],
    ) -> Result<Option<(Parameters, Metrics)>> {
        if results.is_empty() {
            return Ok(None);
        }

        if !failures.is_empty() && !self.config.accept_failures {
            warn!(round = round, failures = failures.len(); "rejecting round with failures");
            return Ok(None);
        }

        let weighted: Vec<_> = results
            .iter()
            .map(|(_, res)| (&res.parameters, self.weight(res.num_examples)))
            .collect();

        let parameters = weighted_average(&weighted)?;
        let metrics = weighted_metrics_avg(
            results
                .iter()
                .map(|(_, res)| (res.num_examples, &res.metrics)),
        );

        Ok(Some((parameters, metrics)))
    }

    fn num_evaluation_clients(&self, available: usize) -> SampleSize {
        self.sample_size(
            available,
            self.config.fraction_evaluate,
            self.config.min_evaluate_clients,
        )
    }

    fn configure_evaluate(&self, round: u64, parameters: &Parameters) -> Option<EvaluateIns> {
        if self.config.fraction_evaluate == 0.0 {
            return None;
        }

        Some(EvaluateIns {
            parameters: parameters.clone(),
            config: self
                .on_evaluate_config
                .as_ref()
                .map(|f| f(round))
                .unwrap_or_default(),
        })
    }

    fn aggregate_evaluate(
        &self,
        round: u64,
        results: &[(ClientId, EvaluateRes)],
        failures: &[ServerErr],
    ) -> Option<(f64, Metrics)> {
        if results.is_empty() {
            return None;
        }

        if !failures.is_empty() && !self.config.accept_failures {
            warn!(round = round, failures = failures.len(); "rejecting evaluation with failures");
            return None;
        }

        let losses: Vec<_> = results
            .iter()
            .map(|(_, res)| (res.num_examples, res.loss))
            .collect();

        let loss = weighted_loss_avg(&losses)?;
        let metrics = weighted_metrics_avg(
            results
                .iter()
                .map(|(_, res)| (res.num_examples, &res.metrics)),
        );

        Some((loss, metrics))
    }

    fn evaluate(&self, round: u64, parameters: &Parameters) -> Result<Option<(f64, Metrics)>> {
        self.evaluate_fn
            .as_ref()
            .map(|f| f.evaluate(round, parameters))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use comms::Scalar;

    use super::*;

    fn fit_res(values: Vec<f32>, num_examples: u64) -> FitRes {
        FitRes {
            parameters: Parameters::new(vec![vec![values.len()]], values).unwrap(),
            num_examples,
            metrics: Metrics::new(),
        }
    }

    #[test]
    fn sample_sizes_respect_the_minimums() {
        let strategy = FedAvg::default();

        assert_eq!(strategy.num_fit_clients(5), SampleSize { size: 2, min: 2 });
        assert_eq!(strategy.num_fit_clients(40), SampleSize { size: 4, min: 2 });
        assert_eq!(strategy.num_evaluation_clients(3), SampleSize { size: 2, min: 2 });
    }

    #[test]
    fn fraction_evaluate_zero_skips_distributed_evaluation() {
        let strategy = FedAvg::new(FedAvgConfig {
            fraction_evaluate: 0.0,
            ..Default::default()
        });
        let params = Parameters::zeros(vec![vec![2]]).unwrap();

        assert!(strategy.configure_evaluate(1, &params).is_none());
    }

    #[test]
    fn fit_config_comes_from_the_hook() {
        let strategy = FedAvg::default()
            .with_on_fit_config(|round| Config::from([("rnd".to_string(), Scalar::from(round))]));
        let params = Parameters::zeros(vec![vec![2]]).unwrap();

        let ins = strategy.configure_fit(3, &params);

        assert_eq!(ins.config["rnd"], Scalar::Int(3));
        assert_eq!(ins.parameters, params);
    }

    #[test]
    fn aggregate_fit_weights_by_examples() {
        let strategy = FedAvg::default();
        let results = [(1, fit_res(vec![0.0, 4.0], 1)), (2, fit_res(vec![4.0, 0.0], 3))];

        let (params, _) = strategy.aggregate_fit(1, &results, &[]).unwrap().unwrap();

        assert_eq!(params.values(), &[3.0f32, 1.0]);
    }

    #[test]
    fn aggregate_fit_uniform_ignores_examples() {
        let strategy = FedAvg::new(FedAvgConfig {
            weighting: Weighting::Uniform,
            ..Default::default()
        });
        let results = [(1, fit_res(vec![0.0, 4.0], 1)), (2, fit_res(vec![4.0, 0.0], 3))];

        let (params, _) = strategy.aggregate_fit(1, &results, &[]).unwrap().unwrap();

        assert_eq!(params.values(), &[2.0f32, 2.0]);
    }

    #[test]
    fn aggregate_fit_without_results_keeps_the_model() {
        let strategy = FedAvg::default();
        assert!(strategy.aggregate_fit(1, &[], &[]).unwrap().is_none());
    }

    #[test]
    fn failures_are_rejected_unless_accepted() {
        let results = [(1, fit_res(vec![1.0], 1))];
        let failures = [ServerErr::ClientGone(2)];

        let accepting = FedAvg::default();
        assert!(accepting.aggregate_fit(1, &results, &failures).unwrap().is_some());

        let strict = FedAvg::new(FedAvgConfig {
            accept_failures: false,
            ..Default::default()
        });
        assert!(strict.aggregate_fit(1, &results, &failures).unwrap().is_none());
    }

    #[test]
    fn aggregate_evaluate_weights_losses() {
        let strategy = FedAvg::default();
        let res = |loss, num_examples| EvaluateRes {
            loss,
            num_examples,
            metrics: Metrics::from([("accuracy".to_string(), Scalar::Float(loss))]),
        };

        let (loss, metrics) = strategy
            .aggregate_evaluate(1, &[(1, res(1.0, 1)), (2, res(2.0, 1))], &[])
            .unwrap();

        assert_eq!(loss, 1.5);
        assert_eq!(metrics["accuracy"], Scalar::Float(1.5));
    }

    #[test]
    fn evaluate_runs_the_hook() {
        let strategy = FedAvg::default().with_evaluate_fn(
            |round: u64, params: &Parameters| -> Result<(f64, Metrics)> {
                let len = Scalar::from(params.len() as u64);
                Ok((round as f64, Metrics::from([("len".to_string(), len)])))
            },
        );

        let (loss, metrics) = strategy
            .evaluate(4, &Parameters::zeros(vec![vec![3]]).unwrap())
            .unwrap()
            .unwrap();

        assert_eq!(loss, 4.0);
        assert_eq!(metrics["len"], Scalar::Int(3));
        let empty = Parameters::zeros(vec![]).unwrap();
        assert!(FedAvg::default().evaluate(4, &empty).unwrap().is_none());
    }
}
