use client::{ClientConfig, LogRegClient};
use learning::{
    LogisticConfig, LogisticRegression,
    data::{self, DataPaths, LoadOptions},
};
use log::info;
use rand::{Rng, SeedableRng, rngs::StdRng};
use tokio::{net::TcpStream, signal};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let config = ClientConfig::from_env()?;
    let data = data::load_data(&DataPaths::under(&config.data_dir), &LoadOptions::default())?;

    let partition_id = config
        .partition_id
        .unwrap_or_else(|| rand::rng().random_range(0..config.partitions));
    let mut partitions = data.train.partition(config.partitions)?;
    let train = partitions.swap_remove(partition_id);
    info!(
        partition = partition_id,
        rows = train.len();
        "training partition selected"
    );

    let rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };

    let mut model = LogisticRegression::new(LogisticConfig::default());
    model.set_initial_params(data.classes.len(), data.feature_names.len());
    let mut logreg = LogRegClient::new(model, train, data.test, rng);

    let stream = TcpStream::connect(&config.server_addr).await?;
    let (rx, tx) = stream.into_split();
    let (rx, tx) = comms::channel(rx, tx);
    info!("connected to the server at {}", config.server_addr);

    tokio::select! {
        ret = client::run(&mut logreg, rx, tx) => {
            ret?;
            info!("wrapping up, disconnecting...");
        }
        _ = signal::ctrl_c() => {
            info!("received SIGTERM");
        }
    }

    Ok(())
}
