use comms::{Config, Metrics, Parameters};

use crate::error::Result;

/// Identifier the server assigns to every connected client.
pub type ClientId = u64;

/// A fit request: the global parameters and the round's instructions.
#[derive(Debug, Clone, PartialEq)]
pub struct FitIns {
    pub parameters: Parameters,
    pub config: Config,
}

/// A client's locally trained parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct FitRes {
    pub parameters: Parameters,
    pub num_examples: u64,
    pub metrics: Metrics,
}

/// An evaluate request: the global parameters to evaluate on local data.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluateIns {
    pub parameters: Parameters,
    pub config: Config,
}

/// A client's evaluation of the global parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluateRes {
    pub loss: f64,
    pub num_examples: u64,
    pub metrics: Metrics,
}

/// The server side handle of a client.
///
/// The round loop only talks to clients through this trait, whatever carries the
/// requests to them.
#[trait_variant::make(ClientProxy: Send)]
pub trait ClientProxyTemplate: Clone + Send + Sync + 'static {
    fn id(&self) -> ClientId;

    /// Asks the client for its current parameters.
    async fn get_parameters(&self) -> Result<Parameters>;

    /// Asks the client to train on its local data starting from `ins.parameters`.
    async fn fit(&self, round: u64, ins: &FitIns) -> Result<FitRes>;

    /// Asks the client to evaluate `ins.parameters` on its local data.
    async fn evaluate(&self, round: u64, ins: &EvaluateIns) -> Result<EvaluateRes>;

    /// Tells the client training is over and waits for it to acknowledge.
    async fn disconnect(&self) -> Result<()>;
}
