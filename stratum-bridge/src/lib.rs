//! Bridge browser Stratum miners speaking WebSocket to a TCP Stratum pool.
//!
//! All clients share one upstream connection, opened on behalf of the first
//! client to arrive. The bridge authorizes that connection with its own worker
//! identity, drops `mining.authorize` requests from clients, and rewrites
//! every `mining.submit` to that identity. Pool traffic is broadcast verbatim
//! to every connected client.

pub mod config;
pub mod daemon;
pub mod error;
pub mod pool;
pub mod server;
pub mod session;
pub mod stratum;
pub mod tracing;
