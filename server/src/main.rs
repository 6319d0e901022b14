use std::sync::Arc;

use comms::{Config, Scalar};
use learning::{
    LogisticConfig, LogisticRegression,
    data::{self, DataPaths, LoadOptions},
};
use log::{info, warn};
use server::{CentralizedEvaluator, ClientManager, FedAvg, FedAvgConfig, Server, ServerConfig, net};
use tokio::{net::TcpListener, signal};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let config = ServerConfig::from_env()?;
    let data = data::load_data(&DataPaths::under(&config.data_dir), &LoadOptions::default())?;
    info!(
        classes = data.n_classes(),
        features = data.n_features(),
        test_rows = data.test.len();
        "evaluation data loaded"
    );

    let model = LogisticRegression::new(LogisticConfig::default());
    let evaluator = CentralizedEvaluator::new(model, data.test, data.classes)
        .with_output(config.predictions_path.clone());

    let strategy = FedAvg::new(FedAvgConfig {
        fraction_fit: config.fraction_fit,
        fraction_evaluate: config.fraction_evaluate,
        min_fit_clients: config.min_clients,
        min_evaluate_clients: config.min_clients,
        min_available_clients: config.min_clients,
        ..Default::default()
    })
    .with_evaluate_fn(evaluator)
    .with_on_fit_config(|round| Config::from([("rnd".to_string(), Scalar::from(round))]));

    let addr = config.addr();
    let listener = TcpListener::bind(&addr).await?;
    info!("listening at {addr}");

    let manager = Arc::new(ClientManager::new());
    let accepting = tokio::spawn(net::serve(listener, manager.clone()));
    let mut server = Server::new(manager, strategy).with_round_timeout(config.round_timeout);

    tokio::select! {
        history = server.fit(config.rounds) => {
            let history = history?;
            info!("wrapping up, disconnecting...\n{history}");
        }
        _ = signal::ctrl_c() => {
            warn!("received SIGTERM");
        }
    }

    server.disconnect_all().await;
    accepting.abort();

    Ok(())
}
