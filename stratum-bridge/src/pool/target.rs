//! Pool target addressing.

use std::fmt;
use std::str::FromStr;

use crate::error::BridgeError;

/// Upstream pool address as requested by a client (`host:port`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PoolTarget {
    pub host: String,
    pub port: u16,
}

impl PoolTarget {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl FromStr for PoolTarget {
    type Err = BridgeError;

    /// Parse `host:port`. Exactly one colon is accepted, so bracketed IPv6
    /// literals are not supported.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        let [host, port] = parts.as_slice() else {
            return Err(BridgeError::InvalidTarget(s.to_string()));
        };

        if host.is_empty() {
            return Err(BridgeError::InvalidTarget(s.to_string()));
        }

        let port = port
            .parse::<u16>()
            .map_err(|_| BridgeError::InvalidTarget(s.to_string()))?;

        Ok(Self::new(*host, port))
    }
}

impl fmt::Display for PoolTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}
