use std::{error::Error, fmt, io};

use learning::MlErr;

use crate::proxy::ClientId;

/// The server module's result type.
pub type Result<T> = std::result::Result<T, ServerErr>;

/// Federated server failures.
#[derive(Debug)]
pub enum ServerErr {
    Io(io::Error),
    Ml(MlErr),
    Csv(csv::Error),
    UnexpectedMessage {
        client: ClientId,
        got: &'static str,
    },
    ClientFailed {
        client: ClientId,
        detail: String,
    },
    ClientGone(ClientId),
    Timeout(ClientId),
    NoClients,
    Aggregation(String),
    InvalidConfig {
        var: &'static str,
        value: String,
    },
}

impl fmt::Display for ServerErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerErr::Io(e) => write!(f, "io error: {e}"),
            ServerErr::Ml(e) => write!(f, "learning error: {e}"),
            ServerErr::Csv(e) => write!(f, "csv error: {e}"),
            ServerErr::UnexpectedMessage { client, got } => {
                write!(f, "unexpected message from client {client}: got {got}")
            }
            ServerErr::ClientFailed { client, detail } => {
                write!(f, "client {client} failed: {detail}")
            }
            ServerErr::ClientGone(client) => write!(f, "client {client} is no longer connected"),
            ServerErr::Timeout(client) => write!(f, "client {client} didn't answer in time"),
            ServerErr::NoClients => write!(f, "no client available to ask for parameters"),
            ServerErr::Aggregation(detail) => write!(f, "aggregation failed: {detail}"),
            ServerErr::InvalidConfig { var, value } => {
                write!(f, "invalid value {value:?} for {var}")
            }
        }
    }
}

impl Error for ServerErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ServerErr::Io(e) => Some(e),
            ServerErr::Ml(e) => Some(e),
            ServerErr::Csv(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for ServerErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<MlErr> for ServerErr {
    fn from(value: MlErr) -> Self {
        Self::Ml(value)
    }
}

impl From<csv::Error> for ServerErr {
    fn from(value: csv::Error) -> Self {
        Self::Csv(value)
    }
}
