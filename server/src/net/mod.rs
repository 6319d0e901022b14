//! Serving federated clients over framed byte streams.

mod connection;
mod listener;

pub use connection::{Connection, RemoteClient};
pub use listener::{accept_client, serve};
