//! Client admission hooks.
//!
//! Deciding who may use the bridge is left to the deployment. The router
//! calls [`Admission::verify`] before accepting the WebSocket upgrade and
//! [`Admission::setup`] after the target is accepted, right before the
//! session is created.

use std::net::SocketAddr;

use async_trait::async_trait;

use crate::error::BridgeResult;

/// What is known about a client at upgrade time.
#[derive(Debug, Clone)]
pub struct RequestInfo {
    /// Remote socket address
    pub peer: SocketAddr,
    /// Requested path without the leading `/` (the `host:port` target)
    pub path: String,
    /// `Origin` header, if the browser sent one
    pub origin: Option<String>,
    /// Whether the client reached the fronting proxy over TLS
    /// (`X-Forwarded-Proto: https`)
    pub secure: bool,
}

#[async_trait]
pub trait Admission: Send + Sync {
    /// Accept or reject the upgrade. Rejected clients get `401`.
    async fn verify(&self, info: &RequestInfo) -> bool;

    /// Prepare for an admitted client. An error closes its socket before a
    /// session exists.
    async fn setup(&self, _info: &RequestInfo) -> BridgeResult<()> {
        Ok(())
    }
}

/// Admit everyone.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAll;

#[async_trait]
impl Admission for AllowAll {
    async fn verify(&self, _info: &RequestInfo) -> bool {
        true
    }
}
