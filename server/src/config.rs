use std::{env, path::PathBuf, str::FromStr, time::Duration};

use crate::error::{Result, ServerErr};

const DEFAULT_HOST: &str = "localhost";
const DEFAULT_PORT: u16 = 5040;
const DEFAULT_ROUNDS: u64 = 10;
const DEFAULT_MIN_CLIENTS: usize = 2;
const DEFAULT_FRACTION: f64 = 0.1;
const DEFAULT_PREDICTIONS_PATH: &str = "prediction_results.csv";

/// Startup settings of the server binary.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub rounds: u64,
    pub min_clients: usize,
    pub fraction_fit: f64,
    pub fraction_evaluate: f64,
    pub data_dir: PathBuf,
    pub predictions_path: PathBuf,
    pub round_timeout: Option<Duration>,
}

impl ServerConfig {
    /// Reads the configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    /// Builds the configuration from `lookup`, falling back to the defaults for
    /// every unset variable.
    ///
    /// # Errors
    /// `ServerErr::InvalidConfig` if a set variable doesn't parse or is out of range.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = Self {
            host: lookup("HOST").unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: parse_or(&lookup, "PORT", DEFAULT_PORT)?,
            rounds: parse_or(&lookup, "ROUNDS", DEFAULT_ROUNDS)?,
            min_clients: parse_or(&lookup, "MIN_CLIENTS", DEFAULT_MIN_CLIENTS)?,
            fraction_fit: fraction_or(&lookup, "FRACTION_FIT")?,
            fraction_evaluate: fraction_or(&lookup, "FRACTION_EVALUATE")?,
            data_dir: lookup("DATA_DIR").map_or_else(|| PathBuf::from("."), PathBuf::from),
            predictions_path: lookup("PREDICTIONS_PATH")
                .map_or_else(|| PathBuf::from(DEFAULT_PREDICTIONS_PATH), PathBuf::from),
            round_timeout: lookup("ROUND_TIMEOUT_SECS")
                .map(|raw| parse("ROUND_TIMEOUT_SECS", &raw).map(Duration::from_secs))
                .transpose()?,
        };

        if config.min_clients == 0 {
            return Err(ServerErr::InvalidConfig {
                var: "MIN_CLIENTS",
                value: "0".to_string(),
            });
        }

        Ok(config)
    }

    /// The `host:port` address to listen at.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse<T: FromStr>(var: &'static str, raw: &str) -> Result<T> {
    raw.trim().parse().map_err(|_| ServerErr::InvalidConfig {
        var,
        value: raw.to_string(),
    })
}

fn parse_or<F, T>(lookup: &F, var: &'static str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    lookup(var).map_or(Ok(default), |raw| parse(var, &raw))
}

fn fraction_or<F>(lookup: &F, var: &'static str) -> Result<f64>
where
    F: Fn(&str) -> Option<String>,
{
    let fraction = parse_or(lookup, var, DEFAULT_FRACTION)?;

    if !(0.0..=1.0).contains(&fraction) {
        return Err(ServerErr::InvalidConfig {
            var,
            value: fraction.to_string(),
        });
    }

    Ok(fraction)
}
