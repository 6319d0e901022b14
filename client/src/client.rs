use comms::{Config, Metrics, Parameters};

use crate::error::Result;

/// The outcome of a local training request.
#[derive(Debug, Clone, PartialEq)]
pub struct FitOutput {
    pub parameters: Parameters,
    pub num_examples: u64,
    pub metrics: Metrics,
}

/// The outcome of a local evaluation request.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluateOutput {
    pub loss: f64,
    pub num_examples: u64,
    pub metrics: Metrics,
}

/// A participant of federated training, it owns a model and some private data.
pub trait Client: Send {
    /// The current parameters of the local model.
    fn get_parameters(&mut self) -> Result<Parameters>;

    /// Trains the local model on local data starting from `parameters`.
    ///
    /// # Arguments
    /// * `parameters` - The global parameters to start from.
    /// * `config` - The server's instructions for this round.
    ///
    /// # Returns
    /// The trained parameters and the amount of examples they were trained on.
    fn fit(&mut self, parameters: &Parameters, config: &Config) -> Result<FitOutput>;

    /// Evaluates `parameters` on local data.
    ///
    /// # Arguments
    /// * `parameters` - The global parameters to evaluate.
    /// * `config` - The server's instructions for this round.
    fn evaluate(&mut self, parameters: &Parameters, config: &Config) -> Result<EvaluateOutput>;
}
