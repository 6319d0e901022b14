use std::{error::Error, fmt, io};

use learning::MlErr;

/// The client module's result type.
pub type Result<T> = std::result::Result<T, ClientErr>;

/// Federated client failures.
#[derive(Debug)]
pub enum ClientErr {
    Io(io::Error),
    Ml(MlErr),
    UnexpectedMessage {
        expected: &'static str,
        got: &'static str,
    },
    InvalidConfig {
        var: &'static str,
        value: String,
    },
    NonFinite {
        what: String,
        value: f64,
    },
}

impl fmt::Display for ClientErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientErr::Io(e) => write!(f, "io error: {e}"),
            ClientErr::Ml(e) => write!(f, "learning error: {e}"),
            ClientErr::UnexpectedMessage { expected, got } => {
                write!(f, "unexpected message: expected {expected}, got {got}")
            }
            ClientErr::InvalidConfig { var, value } => {
                write!(f, "invalid value {value:?} for {var}")
            }
            ClientErr::NonFinite { what, value } => {
                write!(f, "{what} is not finite: {value}")
            }
        }
    }
}

impl Error for ClientErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ClientErr::Io(e) => Some(e),
            ClientErr::Ml(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for ClientErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<MlErr> for ClientErr {
    fn from(value: MlErr) -> Self {
        Self::Ml(value)
    }
}
