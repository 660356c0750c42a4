//! Runtime configuration.
//!
//! Every option can be given as a flag or through the matching `BRIDGE_*`
//! environment variable.

use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;

/// Bridge browser Stratum miners on WebSocket to a TCP pool
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct BridgeConfig {
    /// Address for the WebSocket listener
    #[arg(long, env = "BRIDGE_BIND", default_value = "0.0.0.0:8080")]
    pub bind: SocketAddr,

    /// Worker identity used to authorize with the pool and credited for
    /// every submitted share
    #[arg(long, env = "BRIDGE_WORKER")]
    pub worker: String,

    /// Secondary authorize parameter (pool password or option string)
    #[arg(long, env = "BRIDGE_PASSWORD", default_value = "x")]
    pub password: String,

    /// Client version tag sent in mining.subscribe
    #[arg(long, env = "BRIDGE_USER_AGENT", default_value = "python-minotaurx/2.0")]
    pub user_agent: String,

    /// Delay before reconnecting after an upstream socket error
    #[arg(long, env = "BRIDGE_RECONNECT_DELAY_MS", default_value_t = 5000)]
    pub reconnect_delay_ms: u64,

    /// Upstream chunks buffered per client before a slow client skips ahead
    #[arg(long, env = "BRIDGE_BROADCAST_CAPACITY", default_value_t = 256)]
    pub broadcast_capacity: usize,
}

impl BridgeConfig {
    pub fn pool(&self) -> PoolConfig {
        PoolConfig {
            worker: self.worker.clone(),
            password: self.password.clone(),
            user_agent: self.user_agent.clone(),
            reconnect_delay: Duration::from_millis(self.reconnect_delay_ms),
            broadcast_capacity: self.broadcast_capacity.max(1),
        }
    }

    pub fn server(&self) -> ServerConfig {
        ServerConfig { bind: self.bind }
    }
}

/// Upstream pool connection settings.
///
/// The pool host and port are not here: they come from the first client's
/// upgrade path.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Worker identity for mining.authorize and submit rewriting
    pub worker: String,

    /// Second mining.authorize parameter
    pub password: String,

    /// User agent string for mining.subscribe
    pub user_agent: String,

    /// Fixed delay between a socket error and the retry
    pub reconnect_delay: Duration,

    /// Broadcast channel capacity
    pub broadcast_capacity: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            worker: String::new(),
            password: "x".to_string(),
            user_agent: "python-minotaurx/2.0".to_string(),
            reconnect_delay: Duration::from_secs(5),
            broadcast_capacity: 256,
        }
    }
}

/// Listener settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 8080)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BridgeConfig::try_parse_from(["stratum-bridged", "--worker", "RWorker"])
            .unwrap();

        let pool = config.pool();
        assert_eq!(pool.worker, "RWorker");
        assert_eq!(pool.password, "x");
        assert_eq!(pool.user_agent, "python-minotaurx/2.0");
        assert_eq!(pool.reconnect_delay, Duration::from_secs(5));
        assert_eq!(config.server().bind, ServerConfig::default().bind);
    }

    #[test]
    fn test_overrides() {
        let config = BridgeConfig::try_parse_from([
            "stratum-bridged",
            "--worker",
            "RWorker",
            "--password",
            "c=RVN",
            "--bind",
            "127.0.0.1:9000",
            "--reconnect-delay-ms",
            "250",
            "--broadcast-capacity",
            "0",
        ])
        .unwrap();

        let pool = config.pool();
        assert_eq!(pool.password, "c=RVN");
        assert_eq!(pool.reconnect_delay, Duration::from_millis(250));
        assert_eq!(pool.broadcast_capacity, 1);
        assert_eq!(config.server().bind, "127.0.0.1:9000".parse().unwrap());
    }

    #[test]
    fn test_worker_is_required() {
        // Only meaningful when the environment does not supply it.
        if std::env::var_os("BRIDGE_WORKER").is_none() {
            assert!(BridgeConfig::try_parse_from(["stratum-bridged"]).is_err());
        }
    }
}
