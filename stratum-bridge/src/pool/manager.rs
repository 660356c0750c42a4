//! Pool connection manager.
//!
//! Owns the one upstream connection shared by every client session. The
//! lifecycle is an explicit state machine:
//!
//! ```text
//!                connect()                    socket up
//! Disconnected ───────────► Connecting ───────────────────► Connected
//!      ▲                       │  ▲                            │  │
//!      │                       │  │ retry timer                │  │
//!      │            error      ▼  │ (same target)    error     │  │
//!      │                  ReconnectPending ◄───────────────────┘  │
//!      │                                                          │
//!      └──────────────────────── clean close ─────────────────────┘
//! ```
//!
//! Transition actions:
//!
//! - **Connecting → Connected**: send `mining.subscribe` then
//!   `mining.authorize`.
//! - **error**: drop the socket and schedule one retry to the same target
//!   after the configured delay. Retries are unbounded and not backed off.
//! - **clean close**: drop the socket. No retry; the next client upgrade
//!   calls [`PoolManager::connect`] again.
//!
//! Only one connection exists at a time. While one is `Connecting` or
//! `Connected`, [`connect`](PoolManager::connect) is a no-op even for a
//! different target, so a client asking for another pool is attached to the
//! current one. Upstream data is broadcast to every subscriber, whichever
//! target they asked for.
//!
//! All transitions happen inside one short critical section on the shared
//! state; no lock is held across an await point.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use super::Upstream;
use super::connection::{Connection, Ended};
use super::target::PoolTarget;
use crate::config::PoolConfig;
use crate::error::{BridgeError, BridgeResult};

/// Upstream lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolState {
    /// No socket and no retry pending.
    Disconnected,
    /// Socket is being opened. Writes are queued.
    Connecting,
    /// Socket is up and the handshake has been sent.
    Connected,
    /// Last socket failed; a retry timer is running.
    ReconnectPending,
}

impl fmt::Display for PoolState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PoolState::Disconnected => "disconnected",
            PoolState::Connecting => "connecting",
            PoolState::Connected => "connected",
            PoolState::ReconnectPending => "reconnect-pending",
        };
        f.write_str(name)
    }
}

/// Write side of the live connection.
struct Link {
    /// Distinguishes successive connections
    id: u64,
    outbound: mpsc::UnboundedSender<String>,
}

struct Shared {
    state: PoolState,
    /// Target of the most recent connect attempt
    target: Option<PoolTarget>,
    /// Present exactly while `Connecting` or `Connected`
    link: Option<Link>,
    next_id: u64,
}

struct Inner {
    config: PoolConfig,
    shared: Mutex<Shared>,
    chunks: broadcast::Sender<Bytes>,
    shutdown: CancellationToken,
    tracker: TaskTracker,
}

/// Handle to the shared pool connection.
///
/// Cheap to clone; all clones refer to the same connection.
#[derive(Clone)]
pub struct PoolManager {
    inner: Arc<Inner>,
}

impl PoolManager {
    /// Create a manager with no connection.
    ///
    /// Cancelling `shutdown` closes the connection and stops pending retries.
    pub fn new(config: PoolConfig, shutdown: CancellationToken) -> Self {
        let (chunks, _) = broadcast::channel(config.broadcast_capacity.max(1));

        Self {
            inner: Arc::new(Inner {
                config,
                shared: Mutex::new(Shared {
                    state: PoolState::Disconnected,
                    target: None,
                    link: None,
                    next_id: 1,
                }),
                chunks,
                shutdown,
                tracker: TaskTracker::new(),
            }),
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    /// Ensure an upstream connection exists.
    ///
    /// No-op while a connection is `Connecting` or `Connected`, regardless
    /// of `target`. Otherwise records `target` as the current target and
    /// starts connecting in the background.
    pub fn connect(&self, target: PoolTarget) {
        if self.inner.shutdown.is_cancelled() {
            return;
        }

        let (id, outbound_rx) = {
            let mut shared = self.inner.shared.lock();

            if shared.link.is_some() {
                if shared.target.as_ref() != Some(&target) {
                    debug!(
                        requested = %target,
                        current = ?shared.target.as_ref().map(ToString::to_string),
                        "Pool already connected, ignoring requested target"
                    );
                }
                return;
            }

            let id = shared.next_id;
            shared.next_id += 1;

            let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
            shared.link = Some(Link {
                id,
                outbound: outbound_tx,
            });
            shared.state = PoolState::Connecting;
            shared.target = Some(target.clone());

            (id, outbound_rx)
        };

        let manager = self.clone();
        self.inner
            .tracker
            .spawn(async move { manager.drive(id, target, outbound_rx).await });
    }

    /// Queue one newline-terminated line for the pool.
    pub fn send(&self, line: String) -> BridgeResult<()> {
        let shared = self.inner.shared.lock();
        let link = shared.link.as_ref().ok_or(BridgeError::NotConnected)?;

        link.outbound
            .send(line)
            .map_err(|_| BridgeError::Disconnected)
    }

    /// Whether a connection is `Connecting` or `Connected`.
    pub fn is_live(&self) -> bool {
        self.inner.shared.lock().link.is_some()
    }

    pub fn state(&self) -> PoolState {
        self.inner.shared.lock().state
    }

    /// Target of the most recent connect attempt.
    pub fn target(&self) -> Option<PoolTarget> {
        self.inner.shared.lock().target.clone()
    }

    /// Receive every chunk the pool sends from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Bytes> {
        self.inner.chunks.subscribe()
    }

    /// Wait for the connection task and any retry timers to finish.
    ///
    /// A live connection only finishes on shutdown, so call this after
    /// cancelling the token.
    pub async fn closed(&self) {
        self.inner.tracker.close();
        self.inner.tracker.wait().await;
    }

    /// Run one connection from open to close.
    async fn drive(
        self,
        id: u64,
        target: PoolTarget,
        outbound: mpsc::UnboundedReceiver<String>,
    ) {
        info!(pool = %target, "Connecting to pool");

        let opened = tokio::select! {
            opened = Connection::open(&target) => opened,
            _ = self.inner.shutdown.cancelled() => {
                self.finish(id, &target, Ended::Shutdown);
                return;
            }
        };

        let mut conn = match opened {
            Ok(conn) => conn,
            Err(e) => {
                self.finish(id, &target, Ended::Failed(e));
                return;
            }
        };

        self.mark_connected(id);
        info!(pool = %target, "Connected to pool");

        if let Err(e) = conn.handshake(&self.inner.config).await {
            self.finish(id, &target, Ended::Failed(e));
            return;
        }

        let ended = conn
            .run(
                outbound,
                self.inner.chunks.clone(),
                self.inner.shutdown.clone(),
            )
            .await;

        self.finish(id, &target, ended);
    }

    fn mark_connected(&self, id: u64) {
        let mut shared = self.inner.shared.lock();
        if shared.link.as_ref().is_some_and(|link| link.id == id) {
            shared.state = PoolState::Connected;
        }
    }

    /// Leave `Connecting`/`Connected` for connection `id`.
    fn finish(&self, id: u64, target: &PoolTarget, ended: Ended) {
        let mut shared = self.inner.shared.lock();
        if !shared.link.as_ref().is_some_and(|link| link.id == id) {
            return;
        }
        shared.link = None;

        match ended {
            Ended::Failed(e) => {
                error!(pool = %target, error = %e, "Pool socket error");
                shared.state = PoolState::ReconnectPending;
                drop(shared);
                self.schedule_reconnect(target.clone());
            }
            Ended::Closed => {
                warn!(pool = %target, "Pool socket closed");
                shared.state = PoolState::Disconnected;
            }
            Ended::Shutdown => {
                debug!(pool = %target, "Pool connection shut down");
                shared.state = PoolState::Disconnected;
            }
        }
    }

    /// Retry `target` once after the fixed delay.
    ///
    /// The timer is not cancelled by a newer connect; if a connection is
    /// live when it fires, the retry is a no-op.
    fn schedule_reconnect(&self, target: PoolTarget) {
        let delay = self.inner.config.reconnect_delay;
        info!(pool = %target, delay_ms = delay.as_millis() as u64, "Scheduling pool reconnect");

        let manager = self.clone();
        self.inner.tracker.spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => manager.connect(target),
                _ = manager.inner.shutdown.cancelled() => {}
            }
        });
    }
}

impl Upstream for PoolManager {
    fn is_live(&self) -> bool {
        PoolManager::is_live(self)
    }

    fn send(&self, line: String) -> BridgeResult<()> {
        PoolManager::send(self, line)
    }
}

impl fmt::Debug for PoolManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shared = self.inner.shared.lock();
        f.debug_struct("PoolManager")
            .field("state", &shared.state)
            .field("target", &shared.target)
            .finish()
    }
}
