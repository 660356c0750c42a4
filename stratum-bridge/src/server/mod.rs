//! WebSocket listener and router construction.

mod admission;
mod router;

pub use admission::{Admission, AllowAll, RequestInfo};

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::Router;
use axum::routing::get;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{Level, info, warn};

use crate::config::ServerConfig;
use crate::pool::PoolManager;
use crate::stratum::{FixedWorker, SubmitRewrite};

/// Shared state available to all handlers.
#[derive(Clone)]
pub(crate) struct SharedState {
    pub pool: PoolManager,
    pub admission: Arc<dyn Admission>,
    pub rewrite: Arc<dyn SubmitRewrite>,
    pub shutdown: CancellationToken,
}

/// Accept browser clients until `shutdown` is cancelled.
///
/// Every session bridges through `pool`; submits are rewritten to the pool's
/// configured worker.
pub async fn serve(
    config: ServerConfig,
    pool: PoolManager,
    admission: Arc<dyn Admission>,
    shutdown: CancellationToken,
) -> Result<()> {
    let rewrite = Arc::new(FixedWorker::new(pool.config().worker.clone()));
    let app = build_router(pool, admission, rewrite, shutdown.clone());

    let listener = TcpListener::bind(config.bind).await?;
    let actual_addr = listener.local_addr()?;

    info!(url = %format!("ws://{}/<host>:<port>", actual_addr), "Bridge listening.");

    if !actual_addr.ip().is_loopback() {
        warn!(
            "Bridge is bound to a non-localhost address ({}) without TLS. \
             Put a TLS-terminating proxy in front for wss:// clients.",
            actual_addr.ip()
        );
    }

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        shutdown.cancelled().await;
    })
    .await?;

    Ok(())
}

/// Build the router: a banner at `/` and the upgrade route at `/<host>:<port>`.
///
/// Must be served with `into_make_service_with_connect_info::<SocketAddr>()`.
pub fn build_router(
    pool: PoolManager,
    admission: Arc<dyn Admission>,
    rewrite: Arc<dyn SubmitRewrite>,
    shutdown: CancellationToken,
) -> Router {
    let state = SharedState {
        pool,
        admission,
        rewrite,
        shutdown,
    };

    Router::new()
        .route("/", get(router::banner))
        .route("/{*target}", get(router::upgrade))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .with_state(state)
}
