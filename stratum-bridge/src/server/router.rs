//! Upgrade routing.
//!
//! The request path names the pool: `GET /pool.example.com:3333` upgrades to
//! a WebSocket bridged to that pool (or, while a pool connection is already
//! up, to whichever pool that is).

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::{WebSocket, WebSocketUpgrade, rejection::WebSocketUpgradeRejection};
use axum::extract::{ConnectInfo, Path, State};
use axum::http::{HeaderMap, HeaderName, StatusCode, header};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::sync::broadcast;
use tracing::{error, warn};

use super::SharedState;
use super::admission::RequestInfo;
use crate::pool::PoolTarget;
use crate::session::ClientSession;

const X_FORWARDED_PROTO: HeaderName = HeaderName::from_static("x-forwarded-proto");

/// Plain HTTP response for anything that is not an upgrade.
pub(super) async fn banner() -> &'static str {
    "Stratum bridge running...\n"
}

pub(super) async fn upgrade(
    State(state): State<SharedState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Path(path): Path<String>,
    headers: HeaderMap,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let Ok(ws) = ws else {
        return banner().await.into_response();
    };

    let info = request_info(peer, path, &headers);

    if !state.admission.verify(&info).await {
        warn!(peer = %peer, path = %info.path, "Client rejected by admission check");
        return StatusCode::UNAUTHORIZED.into_response();
    }

    // Subscribed before the 101 response: the client gets every chunk the
    // pool sends once its upgrade completes.
    let chunks = state.pool.subscribe();
    ws.on_upgrade(move |socket| accept(state, info, chunks, socket))
}

/// Collect what admission hooks see about a request.
///
/// TLS is terminated in front of the bridge, so `secure` comes from the
/// proxy's `X-Forwarded-Proto` header.
fn request_info(peer: SocketAddr, path: String, headers: &HeaderMap) -> RequestInfo {
    let header_str = |name: HeaderName| headers.get(name).and_then(|v| v.to_str().ok());

    RequestInfo {
        peer,
        path,
        origin: header_str(header::ORIGIN).map(str::to_owned),
        secure: header_str(X_FORWARDED_PROTO)
            .is_some_and(|proto| proto.eq_ignore_ascii_case("https")),
    }
}

/// Bind an upgraded socket to the pool and run its session.
async fn accept(
    state: SharedState,
    info: RequestInfo,
    chunks: broadcast::Receiver<Bytes>,
    mut socket: WebSocket,
) {
    let target = match info.path.parse::<PoolTarget>() {
        Ok(target) => target,
        Err(e) => {
            error!(peer = %info.peer, error = %e, "Rejecting client");
            let _ = socket.close().await;
            return;
        }
    };

    state.pool.connect(target.clone());

    if let Err(e) = state.admission.setup(&info).await {
        error!(peer = %info.peer, error = %e, "Rejecting client");
        let _ = socket.close().await;
        return;
    }

    let (sink, stream) = socket.split();
    let session = ClientSession::new(
        info.peer,
        target,
        Arc::new(state.pool.clone()),
        state.rewrite.clone(),
        sink,
    );

    session.run(stream, chunks, state.shutdown.clone()).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn peer() -> SocketAddr {
        SocketAddr::from(([192, 0, 2, 7], 50000))
    }

    #[test]
    fn test_request_info_from_plain_request() {
        let info = request_info(peer(), "pool.example.com:3333".into(), &HeaderMap::new());

        assert_eq!(info.peer, peer());
        assert_eq!(info.path, "pool.example.com:3333");
        assert_eq!(info.origin, None);
        assert!(!info.secure);
    }

    #[test]
    fn test_request_info_behind_tls_proxy() {
        let mut headers = HeaderMap::new();
        headers.insert(header::ORIGIN, HeaderValue::from_static("https://miner.example"));
        headers.insert(X_FORWARDED_PROTO, HeaderValue::from_static("HTTPS"));

        let info = request_info(peer(), "pool.example.com:3333".into(), &headers);

        assert_eq!(info.origin.as_deref(), Some("https://miner.example"));
        assert!(info.secure);
    }

    #[test]
    fn test_forwarded_http_is_not_secure() {
        let mut headers = HeaderMap::new();
        headers.insert(X_FORWARDED_PROTO, HeaderValue::from_static("http"));

        assert!(!request_info(peer(), String::new(), &headers).secure);
    }
}
