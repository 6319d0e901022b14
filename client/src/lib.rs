//! A federated learning client: it trains a model on its own data and exchanges only
//! the model's parameters with the server.

pub mod client;
pub mod config;
pub mod error;
pub mod logreg;
pub mod runtime;

pub use client::{Client, EvaluateOutput, FitOutput};
pub use config::ClientConfig;
pub use error::{ClientErr, Result};
pub use logreg::LogRegClient;
pub use runtime::run;
