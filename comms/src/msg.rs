use std::{borrow::Cow, io};

use crate::{
    Deserialize, Serialize,
    params::ParamsView,
    scalar::{Config, Metrics},
};

type Header = u32;
const HEADER_SIZE: usize = size_of::<Header>();

const ERR_H: Header = 0;
const CONTROL_H: Header = 1;
const PARAMS_H: Header = 2;

/// The payload data for the `Data` variant of the `Msg` enum.
#[derive(Debug)]
pub enum Payload<'a> {
    Params(ParamsView<'a>),
}

/// The command for the `Control` variant of the `Msg` enum.
///
/// Requests that carry model parameters (`Fit`, `Evaluate`) are followed by a
/// `Payload::Params` frame, and so is the `FitRes` reply preceded by one.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    Join,
    GetParameters,
    Fit {
        round: u64,
        config: Config,
    },
    Evaluate {
        round: u64,
        config: Config,
    },
    FitRes {
        num_examples: u64,
        metrics: Metrics,
    },
    EvaluateRes {
        loss: f64,
        num_examples: u64,
        metrics: Metrics,
    },
    Disconnect,
}

/// The application layer message for the entire system.
#[derive(Debug)]
pub enum Msg<'a> {
    Control(Command),
    Data(Payload<'a>),
    Err(Cow<'a, str>),
}

impl Msg<'_> {
    /// A short name of the message kind, used for logging and errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Msg::Control(Command::Join) => "control/join",
            Msg::Control(Command::GetParameters) => "control/get_parameters",
            Msg::Control(Command::Fit { .. }) => "control/fit",
            Msg::Control(Command::Evaluate { .. }) => "control/evaluate",
            Msg::Control(Command::FitRes { .. }) => "control/fit_res",
            Msg::Control(Command::EvaluateRes { .. }) => "control/evaluate_res",
            Msg::Control(Command::Disconnect) => "control/disconnect",
            Msg::Data(Payload::Params(_)) => "data/params",
            Msg::Err(_) => "err",
        }
    }

    fn buf_is_too_small<T>(size: usize) -> io::Result<T> {
        Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("The given buffer is too small {size}, must at least be {HEADER_SIZE} bytes"),
        ))
    }

    fn invalid_kind<T>(kind: Header) -> io::Result<T> {
        Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Received an invalid kind header {kind}"),
        ))
    }
}

impl<'a> Serialize<'a> for Msg<'a> {
    fn serialize(&'a self, buf: &mut Vec<u8>) -> io::Result<Option<&'a [u8]>> {
        match self {
            Msg::Err(e) => {
                buf.extend_from_slice(&ERR_H.to_be_bytes());
                Ok(Some(e.as_bytes()))
            }
            Msg::Control(cmd) => {
                buf.extend_from_slice(&CONTROL_H.to_be_bytes());
                serde_json::to_writer(buf, cmd)?;
                Ok(None)
            }
            Msg::Data(Payload::Params(params)) => {
                buf.extend_from_slice(&PARAMS_H.to_be_bytes());
                params.encode(buf).map(Some)
            }
        }
    }
}

impl<'a> Deserialize<'a> for Msg<'a> {
    fn deserialize(buf: &'a [u8]) -> io::Result<Self> {
        if buf.len() < HEADER_SIZE {
            return Self::buf_is_too_small(buf.len());
        }

        let (kind_buf, rest) = buf.split_at(HEADER_SIZE);

        // SAFETY: We splitted the buffer to be of size `HEADER_SIZE` just above.
        let kind = Header::from_be_bytes(kind_buf.try_into().unwrap());

        match kind {
            ERR_H => {
                let string = std::str::from_utf8(rest)
                    .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;

                Ok(Self::Err(Cow::Borrowed(string)))
            }
            CONTROL_H => {
                let cmd = serde_json::from_slice(rest)?;
                Ok(Self::Control(cmd))
            }
            PARAMS_H => {
                let params = ParamsView::decode(rest)?;
                Ok(Self::Data(Payload::Params(params)))
            }
            kind => Self::invalid_kind(kind),
        }
    }
}
