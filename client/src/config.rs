use std::{env, path::PathBuf, str::FromStr};

use crate::error::{ClientErr, Result};

const DEFAULT_SERVER_ADDR: &str = "localhost:5040";
const DEFAULT_PARTITIONS: usize = 5;

/// Startup settings of the client binary.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    pub server_addr: String,
    pub data_dir: PathBuf,
    /// The amount of parts the training data is split into.
    pub partitions: usize,
    /// The part this client trains on, `None` picks one at random.
    pub partition_id: Option<usize>,
    pub seed: Option<u64>,
}

impl ClientConfig {
    /// Reads the configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    /// Builds the configuration from `lookup`, falling back to the defaults for
    /// every unset variable.
    ///
    /// # Errors
    /// `ClientErr::InvalidConfig` if a set variable doesn't parse, there are no
    /// partitions or the partition id is out of range.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let partitions = lookup("PARTITIONS")
            .map_or(Ok(DEFAULT_PARTITIONS), |raw| parse("PARTITIONS", &raw))?;

        if partitions == 0 {
            return Err(ClientErr::InvalidConfig {
                var: "PARTITIONS",
                value: "0".to_string(),
            });
        }

        let partition_id: Option<usize> = lookup("PARTITION_ID")
            .map(|raw| parse("PARTITION_ID", &raw))
            .transpose()?;

        if let Some(id) = partition_id.filter(|id| *id >= partitions) {
            return Err(ClientErr::InvalidConfig {
                var: "PARTITION_ID",
                value: id.to_string(),
            });
        }

        Ok(Self {
            server_addr: lookup("SERVER_ADDR").unwrap_or_else(|| DEFAULT_SERVER_ADDR.to_string()),
            data_dir: lookup("DATA_DIR").map_or_else(|| PathBuf::from("."), PathBuf::from),
            partitions,
            partition_id,
            seed: lookup("SEED").map(|raw| parse("SEED", &raw)).transpose()?,
        })
    }
}

fn parse<T: FromStr>(var: &'static str, raw: &str) -> Result<T> {
    raw.trim().parse().map_err(|_| ClientErr::InvalidConfig {
        var,
        value: raw.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_nothing_is_set() {
        let config = ClientConfig::from_lookup(|_| None).unwrap();

        assert_eq!(config.server_addr, "localhost:5040");
        assert_eq!(config.partitions, 5);
        assert_eq!(config.partition_id, None);
        assert_eq!(config.seed, None);
    }

    #[test]
    fn partition_id_must_be_in_range() {
        let lookup = |var: &str| match var {
            "PARTITIONS" => Some("3".to_string()),
            "PARTITION_ID" => Some("3".to_string()),
            _ => None,
        };

        let err = ClientConfig::from_lookup(lookup).unwrap_err();
        assert!(matches!(err, ClientErr::InvalidConfig { var: "PARTITION_ID", .. }));
    }

    #[test]
    fn overrides_are_parsed() {
        let lookup = |var: &str| match var {
            "SERVER_ADDR" => Some("10.0.0.1:6000".to_string()),
            "PARTITION_ID" => Some("4".to_string()),
            "SEED" => Some("7".to_string()),
            _ => None,
        };

        let config = ClientConfig::from_lookup(lookup).unwrap();

        assert_eq!(config.server_addr, "10.0.0.1:6000");
        assert_eq!(config.partition_id, Some(4));
        assert_eq!(config.seed, Some(7));
    }
}
