//! Upstream pool connection.
//!
//! A single TCP connection to the Stratum pool is shared by every browser
//! client. [`PoolManager`] owns it; sessions only see it through the
//! [`Upstream`] trait and never close it.

mod connection;
mod manager;
mod target;

pub use manager::{PoolManager, PoolState};
pub use target::PoolTarget;

use crate::error::BridgeResult;

/// Write access to the shared pool connection.
///
/// Implemented by [`PoolManager`]; tests substitute an in-memory recorder.
pub trait Upstream: Send + Sync {
    /// Whether a connection exists that will accept writes.
    fn is_live(&self) -> bool;

    /// Queue one complete, newline-terminated line.
    fn send(&self, line: String) -> BridgeResult<()>;
}
