use std::{sync::Arc, time::Duration};

use comms::{Metrics, Parameters};
use futures::future;
use log::{info, warn};
use tokio::time;

use crate::{
    client_manager::ClientManager,
    error::{Result, ServerErr},
    history::History,
    proxy::{ClientId, ClientProxy},
    strategy::{SampleSize, Strategy},
};

/// Runs the federated rounds over the clients of a `ClientManager`.
pub struct Server<S: Strategy, P: ClientProxy> {
    manager: Arc<ClientManager<P>>,
    strategy: S,
    parameters: Parameters,
    round_timeout: Option<Duration>,
}

impl<S: Strategy, P: ClientProxy> Server<S, P> {
    pub fn new(manager: Arc<ClientManager<P>>, strategy: S) -> Self {
        Self {
            manager,
            strategy,
            parameters: Parameters::default(),
            round_timeout: None,
        }
    }

    /// Bounds how long each client request of a round may take, `None` waits forever.
    pub fn with_round_timeout(mut self, round_timeout: Option<Duration>) -> Self {
        self.round_timeout = round_timeout;
        self
    }

    /// The current global parameters.
    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    pub fn manager(&self) -> &Arc<ClientManager<P>> {
        &self.manager
    }

    /// Runs `num_rounds` rounds of federated training.
    ///
    /// Every round trains on a sample of the clients, aggregates their parameters into the
    /// new global model and then evaluates it, both on the server and on the clients.
    ///
    /// # Returns
    /// The losses and metrics of every round.
    ///
    /// # Errors
    /// If the initial parameters can't be obtained, aggregation fails or the server side
    /// evaluation fails. Failing clients only count as round failures.
    pub async fn fit(&mut self, num_rounds: u64) -> Result<History> {
        let mut history = History::default();

        self.parameters = self.init_parameters().await?;

        if let Some((loss, metrics)) = self.strategy.evaluate(0, &self.parameters)? {
            info!(loss = loss; "initial parameters evaluated");
            history.add_loss_centralized(0, loss);
            history.add_metrics_centralized(0, metrics);
        }

        for round in 1..=num_rounds {
            info!(round = round; "starting round");

            if let Some((parameters, _)) = self.fit_round(round).await? {
                self.parameters = parameters;
            }

            if let Some((loss, metrics)) = self.strategy.evaluate(round, &self.parameters)? {
                info!(round = round, loss = loss; "centralized evaluation done");
                history.add_loss_centralized(round, loss);
                history.add_metrics_centralized(round, metrics);
            }

            if let Some((loss, metrics)) = self.evaluate_round(round).await {
                info!(round = round, loss = loss; "distributed evaluation done");
                history.add_loss_distributed(round, loss);
                history.add_metrics_distributed(round, metrics);
            }
        }

        info!(rounds = num_rounds; "training finished");
        Ok(history)
    }

    /// The strategy's initial parameters, or those of a connected client if it has none.
    async fn init_parameters(&mut self) -> Result<Parameters> {
        if let Some(parameters) = self.strategy.initialize_parameters() {
            info!("using the strategy's initial parameters");
            return Ok(parameters);
        }

        info!("requesting initial parameters from a random client");
        let clients = self.manager.sample(1, 1, self.round_timeout).await;
        let client = clients.first().ok_or(ServerErr::NoClients)?;

        let parameters =
            with_timeout(self.round_timeout, client.id(), client.get_parameters()).await?;
        info!(client = client.id(); "received initial parameters");
        Ok(parameters)
    }

    /// Trains on a sample of the clients and aggregates their results.
    ///
    /// # Returns
    /// The aggregated parameters and metrics, `None` if the round produced nothing to
    /// aggregate.
    pub async fn fit_round(&self, round: u64) -> Result<Option<(Parameters, Metrics)>> {
        let SampleSize { size, min } = self.strategy.num_fit_clients(self.manager.num_available());
        let clients = self.manager.sample(size, min, self.round_timeout).await;

        if clients.is_empty() {
            warn!(round = round; "no clients sampled for training, skipping");
            return Ok(None);
        }

        let ins = self.strategy.configure_fit(round, &self.parameters);
        info!(round = round, clients = clients.len(); "sending fit requests");

        let replies = future::join_all(clients.iter().map(|client| {
            with_timeout(self.round_timeout, client.id(), client.fit(round, &ins))
        }))
        .await;

        let (results, failures) = split_replies(&clients, replies);
        info!(
            round = round,
            results = results.len(),
            failures = failures.len();
            "fit round finished"
        );

        self.strategy.aggregate_fit(round, &results, &failures)
    }

    /// Evaluates the global parameters on a sample of the clients.
    ///
    /// # Returns
    /// The aggregated loss and metrics, `None` if distributed evaluation is off for this
    /// round or no client answered.
    pub async fn evaluate_round(&self, round: u64) -> Option<(f64, Metrics)> {
        let ins = self.strategy.configure_evaluate(round, &self.parameters)?;

        let SampleSize { size, min } = self
            .strategy
            .num_evaluation_clients(self.manager.num_available());
        let clients = self.manager.sample(size, min, self.round_timeout).await;

        if clients.is_empty() {
            warn!(round = round; "no clients sampled for evaluation, skipping");
            return None;
        }

        let replies = future::join_all(clients.iter().map(|client| {
            with_timeout(self.round_timeout, client.id(), client.evaluate(round, &ins))
        }))
        .await;

        let (results, failures) = split_replies(&clients, replies);
        self.strategy.aggregate_evaluate(round, &results, &failures)
    }

    /// Tells every registered client training is over.
    pub async fn disconnect_all(&self) {
        let clients = self.manager.all();

        let replies = future::join_all(clients.iter().map(|client| {
            with_timeout(self.round_timeout, client.id(), client.disconnect())
        }))
        .await;

        for (client, reply) in clients.iter().zip(replies) {
            if let Err(e) = reply {
                warn!(client = client.id(); "failed to disconnect: {e}");
            }
        }
    }
}

/// Awaits `fut`, failing with `ServerErr::Timeout` if it takes longer than `timeout`.
async fn with_timeout<T, F>(timeout: Option<Duration>, client: ClientId, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match timeout {
        Some(timeout) => time::timeout(timeout, fut)
            .await
            .map_err(|_| ServerErr::Timeout(client))?,
        None => fut.await,
    }
}

/// Pairs every successful reply with its client and keeps the failures apart.
fn split_replies<P, T>(
    clients: &[P],
    replies: Vec<Result<T>>,
) -> (Vec<(ClientId, T)>, Vec<ServerErr>)
where
    P: ClientProxy,
{
    let mut results = Vec::with_capacity(replies.len());
    let mut failures = Vec::new();

    for (client, reply) in clients.iter().zip(replies) {
        match reply {
            Ok(res) => results.push((client.id(), res)),
            Err(e) => {
                warn!(client = client.id(); "request failed: {e}");
                failures.push(e);
            }
        }
    }

    (results, failures)
}
