//! How the server turns client results into the next global model.

mod aggregate;
mod fedavg;

use comms::{Config, Metrics, Parameters};

use crate::{
    error::{Result, ServerErr},
    proxy::{ClientId, EvaluateIns, EvaluateRes, FitIns, FitRes},
};

pub use aggregate::{weighted_average, weighted_loss_avg, weighted_metrics_avg};
pub use fedavg::{FedAvg, FedAvgConfig, Weighting};

/// How many clients a round asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleSize {
    /// The amount of clients to sample.
    pub size: usize,
    /// The amount of clients to wait for before sampling.
    pub min: usize,
}

/// The decisions the round loop delegates.
pub trait Strategy: Send + Sync {
    /// The starting global parameters, `None` to ask a connected client for them.
    fn initialize_parameters(&mut self) -> Option<Parameters>;

    /// How many of the `available` clients to train with this round.
    fn num_fit_clients(&self, available: usize) -> SampleSize;

    /// The instructions sent to every sampled client for training round `round`.
    fn configure_fit(&self, round: u64, parameters: &Parameters) -> FitIns;

    /// Combines the training results of round `round`.
    ///
    /// # Returns
    /// The new global parameters along with aggregated metrics, or `None` to keep the
    /// current parameters.
    ///
    /// # Errors
    /// If the results can't be combined, e.g. their shapes differ.
    fn aggregate_fit(
        &self,
        round: u64,
        results: &[(ClientId, FitRes)],
        failures: &[ServerErr],
    ) -> Result<Option<(Parameters, Metrics)>>;

    /// How many of the `available` clients to evaluate with this round.
    fn num_evaluation_clients(&self, available: usize) -> SampleSize;

    /// The instructions sent to every sampled client for evaluation, `None` skips
    /// distributed evaluation for `round`.
    fn configure_evaluate(&self, round: u64, parameters: &Parameters) -> Option<EvaluateIns>;

    /// Combines the evaluation results of round `round` into a loss and metrics.
    fn aggregate_evaluate(
        &self,
        round: u64,
        results: &[(ClientId, EvaluateRes)],
        failures: &[ServerErr],
    ) -> Option<(f64, Metrics)>;

    /// Evaluates `parameters` on the server side, `None` if there's no way to.
    fn evaluate(&self, round: u64, parameters: &Parameters) -> Result<Option<(f64, Metrics)>>;
}

/// A server side evaluation of the global model.
pub trait EvaluateFn: Send + Sync {
    fn evaluate(&self, round: u64, parameters: &Parameters) -> Result<(f64, Metrics)>;
}

impl<F> EvaluateFn for F
where
    F: Fn(u64, &Parameters) -> Result<(f64, Metrics)> + Send + Sync,
{
    fn evaluate(&self, round: u64, parameters: &Parameters) -> Result<(f64, Metrics)> {
        self(round, parameters)
    }
}

/// Maps a round to the `Config` sent along with its requests.
pub type ConfigFn = Box<dyn Fn(u64) -> Config + Send + Sync>;
