use std::{fs, sync::Arc};

use client::LogRegClient;
use comms::{Config, Scalar};
use learning::{Dataset, LogisticConfig, LogisticRegression};
use ndarray::{Array1, Array2};
use rand::{SeedableRng, rngs::StdRng};
use server::{CentralizedEvaluator, ClientManager, FedAvg, FedAvgConfig, Server, net};
use tokio::net::{TcpListener, TcpStream};

const CLASSES: usize = 3;

const CENTERS: [[f32; 2]; CLASSES] = [[0.0, 3.0], [-3.0, -2.0], [3.0, -2.0]];

/// Three well separated clusters in the plane, `per_class` points each.
fn blobs(per_class: usize) -> Dataset {
    let mut x = Vec::with_capacity(per_class * CLASSES * 2);
    let mut y = Vec::with_capacity(per_class * CLASSES);

    for i in 0..per_class {
        let jitter = (i % 5) as f32 * 0.1 - 0.2;

        for (class, [cx, cy]) in CENTERS.into_iter().enumerate() {
            x.extend([cx + jitter, cy - jitter]);
            y.push(class);
        }
    }

    let x = Array2::from_shape_vec((per_class * CLASSES, 2), x).unwrap();
    Dataset::new(x, Array1::from(y)).unwrap()
}

fn model() -> LogisticRegression {
    LogisticRegression::new(LogisticConfig {
        max_iter: 5,
        learning_rate: 0.5,
        ..Default::default()
    })
}

async fn spawn_client(
    addr: std::net::SocketAddr,
    train: Dataset,
    seed: u64,
) -> tokio::task::JoinHandle<client::Result<()>> {
    let stream = TcpStream::connect(addr).await.unwrap();

    tokio::spawn(async move {
        let mut model = model();
        model.set_initial_params(CLASSES, 2);
        let mut logreg = LogRegClient::new(model, train, blobs(4), StdRng::seed_from_u64(seed));

        let (rx, tx) = stream.into_split();
        let (rx, tx) = comms::channel(rx, tx);
        client::run(&mut logreg, rx, tx).await
    })
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn two_clients_complete_every_round() {
    let out_dir = std::env::temp_dir().join(format!("federation-{}", std::process::id()));
    fs::create_dir_all(&out_dir).unwrap();
    let predictions = out_dir.join("prediction_results.csv");

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let manager = Arc::new(ClientManager::new());
    let accepting = tokio::spawn(net::serve(listener, manager.clone()));

    let parts = blobs(20).partition(2).unwrap();
    let mut clients = Vec::new();
    for (seed, train) in parts.into_iter().enumerate() {
        clients.push(spawn_client(addr, train, seed as u64).await);
    }

    let classes = vec!["a".to_string(), "b".to_string(), "c".to_string()];
    let evaluator = CentralizedEvaluator::new(model(), blobs(5), classes)
        .with_output(predictions.clone());
    let strategy = FedAvg::new(FedAvgConfig {
        fraction_fit: 1.0,
        fraction_evaluate: 1.0,
        ..Default::default()
    })
    .with_evaluate_fn(evaluator)
    .with_on_fit_config(|round| Config::from([("rnd".to_string(), Scalar::from(round))]));

    let mut server = Server::new(manager, strategy);
    let history = server.fit(3).await.unwrap();
    server.disconnect_all().await;

    for client in clients {
        client.await.unwrap().unwrap();
    }
    accepting.abort();

    assert_eq!(history.losses_centralized.len(), 4);
    assert_eq!(history.losses_distributed.len(), 3);

    let (_, first) = history.losses_centralized[0];
    let (_, last) = history.losses_centralized[3];
    assert!(last < first, "loss went from {first} to {last}");

    let (_, metrics) = history.metrics_centralized.last().unwrap();
    assert_eq!(metrics["accuracy"], Scalar::Float(1.0));

    let csv = fs::read_to_string(&predictions).unwrap();
    let mut lines = csv.lines();
    assert_eq!(
        lines.next(),
        Some("index,prob_a,prob_b,prob_c,prediction,real")
    );
    assert_eq!(lines.count(), 15);

    fs::remove_dir_all(&out_dir).ok();
}
