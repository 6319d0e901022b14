//! The federated learning server: it keeps track of the connected clients, runs the
//! training rounds and aggregates the clients' models with federated averaging.

pub mod client_manager;
pub mod config;
pub mod error;
pub mod evaluation;
pub mod history;
pub mod net;
pub mod proxy;
pub mod server;
pub mod strategy;

pub use client_manager::ClientManager;
pub use config::ServerConfig;
pub use error::{Result, ServerErr};
pub use evaluation::CentralizedEvaluator;
pub use history::History;
pub use proxy::{ClientId, ClientProxy, EvaluateIns, EvaluateRes, FitIns, FitRes};
pub use server::Server;
pub use strategy::{EvaluateFn, FedAvg, FedAvgConfig, Strategy, Weighting};
