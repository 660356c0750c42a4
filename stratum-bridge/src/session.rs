//! Per-client session.
//!
//! A session is the pipeline between one browser client and the shared pool
//! connection:
//!
//! - **client → pool**: each WebSocket payload is split into lines, each
//!   line parsed on its own, then dropped (`mining.authorize`), rewritten
//!   (`mining.submit`), or forwarded unchanged.
//! - **pool → client**: chunks from the pool broadcast are relayed as text
//!   frames, verbatim.
//!
//! A session never owns the pool connection. Closing it only closes the
//! client's socket.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::Message;
use bytes::Bytes;
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{BridgeError, BridgeResult};
use crate::pool::{PoolTarget, Upstream};
use crate::stratum::{AUTHORIZE, ClientMessage, SUBMIT, SubmitRewrite, encode_line, split_lines};

/// What to do with one framed client line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Routed {
    /// Forward unchanged (re-serialized).
    Forward(String),
    /// `mining.submit` with its worker rewritten.
    Submit(String),
    /// `mining.authorize`; the pool is authorized once by the bridge.
    Authorize,
}

/// Decide the fate of one line. Returned lines are newline-terminated.
pub fn route(line: &str, rewrite: &dyn SubmitRewrite) -> BridgeResult<Routed> {
    let mut msg = ClientMessage::parse(line)?;

    if msg.is(AUTHORIZE) {
        return Ok(Routed::Authorize);
    }

    if msg.is(SUBMIT) {
        let params = msg.take_params().ok_or_else(|| {
            BridgeError::InvalidMessage("mining.submit without params".to_string())
        })?;
        msg.set_params(rewrite.rewrite(params)?);
        return Ok(Routed::Submit(encode_line(&msg.into_value())?));
    }

    Ok(Routed::Forward(encode_line(&msg.into_value())?))
}

/// One admitted client.
///
/// `S` is the write half of the client transport: the WebSocket sink in
/// production, a channel in tests.
pub struct ClientSession<S> {
    peer: SocketAddr,
    target: PoolTarget,
    upstream: Arc<dyn Upstream>,
    rewrite: Arc<dyn SubmitRewrite>,
    /// `None` once closed
    sink: Option<S>,
}

impl<S> ClientSession<S>
where
    S: Sink<Message> + Unpin,
{
    pub fn new(
        peer: SocketAddr,
        target: PoolTarget,
        upstream: Arc<dyn Upstream>,
        rewrite: Arc<dyn SubmitRewrite>,
        sink: S,
    ) -> Self {
        info!(peer = %peer, target = %target, "Client connection accepted");

        Self {
            peer,
            target,
            upstream,
            rewrite,
            sink: Some(sink),
        }
    }

    #[cfg(test)]
    fn is_open(&self) -> bool {
        self.sink.is_some()
    }

    /// Handle one payload from the client.
    ///
    /// Without a live pool connection the whole payload is dropped; nothing
    /// is queued for later. A line that fails to parse is dropped alone and
    /// the rest of the payload is still processed.
    pub fn on_data(&self, payload: &str) {
        if !self.upstream.is_live() {
            warn!(peer = %self.peer, "No active pool connection, dropping client data");
            return;
        }

        for line in split_lines(payload) {
            match route(line, self.rewrite.as_ref()) {
                Ok(Routed::Authorize) => {
                    info!(peer = %self.peer, "Ignoring authorize from client");
                }
                Ok(Routed::Submit(line)) => {
                    info!(peer = %self.peer, submit = %line.trim_end(), "Forwarding submit");
                    self.forward(line);
                }
                Ok(Routed::Forward(line)) => {
                    debug!(peer = %self.peer, msg = %line.trim_end(), "Forwarding message");
                    self.forward(line);
                }
                Err(e) => {
                    error!(peer = %self.peer, error = %e, "Error parsing message from client");
                }
            }
        }
    }

    fn forward(&self, line: String) {
        if let Err(e) = self.upstream.send(line) {
            warn!(peer = %self.peer, error = %e, "Pool connection went away, message dropped");
        }
    }

    /// Write one chunk of pool data to the client as a text frame.
    pub async fn relay(&mut self, chunk: Bytes) -> BridgeResult<()> {
        let sink = self.sink.as_mut().ok_or(BridgeError::Disconnected)?;
        let text = String::from_utf8_lossy(&chunk).into_owned();

        sink.send(Message::Text(text.into()))
            .await
            .map_err(|_| BridgeError::Disconnected)
    }

    /// Transport errors are logged only; the transport's own close ends the
    /// session.
    pub fn on_error(&self, err: &dyn fmt::Display) {
        error!(peer = %self.peer, error = %err, "WebSocket error");
    }

    /// Close the client transport. Safe to call repeatedly.
    pub async fn close(&mut self) {
        if let Some(mut sink) = self.sink.take() {
            info!(peer = %self.peer, target = %self.target, "Client connection closed");
            let _ = sink.close().await;
        }
    }

    /// Pump the session until the client goes away or shutdown.
    pub async fn run<St, E>(
        mut self,
        mut stream: St,
        mut chunks: broadcast::Receiver<Bytes>,
        shutdown: CancellationToken,
    ) where
        St: Stream<Item = Result<Message, E>> + Unpin,
        E: fmt::Display,
    {
        loop {
            tokio::select! {
                msg = stream.next() => match msg {
                    Some(Ok(Message::Text(text))) => self.on_data(text.as_str()),
                    Some(Ok(Message::Binary(data))) => self.on_data(&String::from_utf8_lossy(&data)),
                    Some(Ok(Message::Close(_))) | None => break,
                    // Ping/pong are answered by the transport
                    Some(Ok(_)) => {}
                    Some(Err(e)) => self.on_error(&e),
                },

                chunk = chunks.recv() => match chunk {
                    Ok(chunk) => {
                        if let Err(e) = self.relay(chunk).await {
                            self.on_error(&e);
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(peer = %self.peer, skipped, "Client fell behind pool data");
                    }
                    Err(RecvError::Closed) => break,
                },

                _ = shutdown.cancelled() => break,
            }
        }

        self.close().await;
    }
}
