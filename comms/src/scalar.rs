use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize};

/// A single configuration or metric value exchanged between server and clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

/// Instructions sent alongside a fit or evaluate request, keyed by name.
pub type Config = BTreeMap<String, Scalar>;

/// Values reported back by clients or by the server side evaluation, keyed by name.
pub type Metrics = BTreeMap<String, Scalar>;

impl Scalar {
    /// Returns the value as an `f64` if it's numeric.
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Scalar::Int(i) => Some(i as f64),
            Scalar::Float(f) => Some(f),
            _ => None,
        }
    }

    /// Returns the value as an `i64` if it's an integer.
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Scalar::Int(i) => Some(i),
            _ => None,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Bool(b) => write!(f, "{b}"),
            Scalar::Int(i) => write!(f, "{i}"),
            Scalar::Float(x) => write!(f, "{x}"),
            Scalar::Str(s) => f.write_str(s),
        }
    }
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<u64> for Scalar {
    /// Saturates at `i64::MAX`.
    fn from(value: u64) -> Self {
        Self::Int(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn untagged_json_keeps_numeric_kinds() {
        let mut config = Config::new();
        config.insert("rnd".into(), 3u64.into());
        config.insert("lr".into(), 0.5.into());
        config.insert("name".into(), "fedavg".into());

        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(json, r#"{"lr":0.5,"name":"fedavg","rnd":3}"#);

        let back: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(back["rnd"], Scalar::Int(3));
        assert_eq!(back["lr"].as_f64(), Some(0.5));
        assert_eq!(back["name"].as_i64(), None);
    }

    #[test]
    fn large_unsigned_values_saturate() {
        assert_eq!(Scalar::from(7u64), Scalar::Int(7));
        assert_eq!(Scalar::from(u64::MAX), Scalar::Int(i64::MAX));
    }
}
