//! End-to-end tests: real WebSocket clients, a fake TCP pool, and the bridge
//! listening on an ephemeral port in between.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use stratum_bridge::config::PoolConfig;
use stratum_bridge::error::{BridgeError, BridgeResult};
use stratum_bridge::pool::PoolManager;
use stratum_bridge::server::{self, Admission, AllowAll, RequestInfo};
use stratum_bridge::stratum::FixedWorker;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;

const WORKER: &str = "RBridgeWallet.bridge";
const WAIT: Duration = Duration::from_secs(5);

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;
type PoolLines = Lines<BufReader<OwnedReadHalf>>;

struct Bridge {
    addr: SocketAddr,
    pool: PoolManager,
    shutdown: CancellationToken,
}

impl Drop for Bridge {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn start_bridge(admission: Arc<dyn Admission>) -> Bridge {
    let shutdown = CancellationToken::new();
    let pool = PoolManager::new(
        PoolConfig {
            worker: WORKER.to_string(),
            ..PoolConfig::default()
        },
        shutdown.clone(),
    );
    let app = server::build_router(
        pool.clone(),
        admission,
        Arc::new(FixedWorker::new(WORKER)),
        shutdown.clone(),
    );

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await
            .unwrap();
        }
    });

    Bridge {
        addr,
        pool,
        shutdown,
    }
}

async fn client(bridge: &Bridge, path: &str) -> Client {
    let (ws, _) = connect_async(format!("ws://{}/{}", bridge.addr, path))
        .await
        .unwrap();
    ws
}

/// Accept the bridge's pool connection and consume its handshake.
async fn accept_pool(listener: &TcpListener) -> (PoolLines, OwnedWriteHalf) {
    let (stream, _) = timeout(WAIT, listener.accept()).await.unwrap().unwrap();
    let (read, write) = stream.into_split();
    let mut lines = BufReader::new(read).lines();

    let subscribe = next_json(&mut lines).await;
    assert_eq!(subscribe["method"], "mining.subscribe");
    let authorize = next_json(&mut lines).await;
    assert_eq!(authorize["method"], "mining.authorize");
    assert_eq!(authorize["params"], json!([WORKER, "x"]));

    (lines, write)
}

async fn next_json(lines: &mut PoolLines) -> Value {
    let line = timeout(WAIT, lines.next_line())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    serde_json::from_str(&line).unwrap()
}

async fn next_text(ws: &mut Client) -> String {
    loop {
        let msg = timeout(WAIT, ws.next()).await.unwrap().unwrap().unwrap();
        if let Message::Text(text) = msg {
            return text.as_str().to_string();
        }
    }
}

#[tokio::test]
async fn test_submit_rewritten_and_authorize_dropped() {
    let pool_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let pool_addr = pool_listener.local_addr().unwrap();
    let bridge = start_bridge(Arc::new(AllowAll)).await;

    let mut ws = client(&bridge, &pool_addr.to_string()).await;
    let (mut pool_lines, _pool_write) = accept_pool(&pool_listener).await;

    let payload = concat!(
        r#"{"id":1,"method":"mining.authorize","params":["someone","pw"]}"#,
        "\n",
        r#"{"id":2,"method":"mining.submit","params":["someone","job1","00000001","5f5e1000","deadbeef"]}"#,
        "\n",
    );
    ws.send(Message::text(payload.to_string())).await.unwrap();

    let submit = next_json(&mut pool_lines).await;
    assert_eq!(submit["method"], "mining.submit");
    assert_eq!(submit["id"], 2);
    assert_eq!(
        submit["params"],
        json!([WORKER, "job1", "00000001", "5f5e1000", "deadbeef"])
    );
}

#[tokio::test]
async fn test_pool_data_broadcast_to_every_client() {
    let pool_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let pool_addr = pool_listener.local_addr().unwrap();
    let bridge = start_bridge(Arc::new(AllowAll)).await;

    let mut first = client(&bridge, &pool_addr.to_string()).await;
    let (mut pool_lines, mut pool_write) = accept_pool(&pool_listener).await;

    // Asks for a different pool but shares the live connection
    let mut second = client(&bridge, "127.0.0.1:1").await;
    second
        .send(Message::text(
            "{\"id\":3,\"method\":\"mining.extranonce.subscribe\",\"params\":[]}\n".to_string(),
        ))
        .await
        .unwrap();
    let forwarded = next_json(&mut pool_lines).await;
    assert_eq!(forwarded["method"], "mining.extranonce.subscribe");
    assert_eq!(bridge.pool.target().unwrap().port, pool_addr.port());

    let notify = "{\"id\":null,\"method\":\"mining.notify\",\"params\":[\"job1\"]}\n";
    pool_write.write_all(notify.as_bytes()).await.unwrap();

    assert_eq!(next_text(&mut first).await, notify);
    assert_eq!(next_text(&mut second).await, notify);
}

#[tokio::test]
async fn test_invalid_target_is_closed() {
    let bridge = start_bridge(Arc::new(AllowAll)).await;
    let mut ws = client(&bridge, "not-a-target").await;

    let ended = timeout(WAIT, async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => {}
            }
        }
    })
    .await;

    assert!(ended.is_ok());
    assert!(!bridge.pool.is_live());
}

struct DenyAll;

#[async_trait]
impl Admission for DenyAll {
    async fn verify(&self, _info: &RequestInfo) -> bool {
        false
    }
}

#[tokio::test]
async fn test_rejected_upgrade_gets_401() {
    let bridge = start_bridge(Arc::new(DenyAll)).await;

    let err = connect_async(format!("ws://{}/127.0.0.1:3333", bridge.addr))
        .await
        .unwrap_err();

    match err {
        tungstenite::Error::Http(response) => assert_eq!(response.status(), 401),
        other => panic!("unexpected error: {other}"),
    }
    assert!(!bridge.pool.is_live());
}

struct FailSetup;

#[async_trait]
impl Admission for FailSetup {
    async fn verify(&self, _info: &RequestInfo) -> bool {
        true
    }

    async fn setup(&self, _info: &RequestInfo) -> BridgeResult<()> {
        Err(BridgeError::Setup("no slot for this client".into()))
    }
}

#[tokio::test]
async fn test_failed_setup_closes_client() {
    let pool_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let pool_addr = pool_listener.local_addr().unwrap();
    let bridge = start_bridge(Arc::new(FailSetup)).await;

    let mut ws = client(&bridge, &pool_addr.to_string()).await;
    // The target was accepted, so the pool connection comes up regardless.
    let (mut pool_lines, _pool_write) = accept_pool(&pool_listener).await;

    let _ = ws
        .send(Message::text(
            "{\"id\":2,\"method\":\"mining.submit\",\"params\":[\"someone\"]}\n".to_string(),
        ))
        .await;

    let ended = timeout(WAIT, async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => {}
            }
        }
    })
    .await;
    assert!(ended.is_ok(), "client was not closed");

    assert!(
        timeout(Duration::from_millis(300), pool_lines.next_line())
            .await
            .is_err(),
        "nothing may reach the pool from a client without a session"
    );
}

#[tokio::test]
async fn test_plain_http_gets_banner() {
    let bridge = start_bridge(Arc::new(AllowAll)).await;

    for path in ["/", "/pool.example.com:3333"] {
        let mut stream = TcpStream::connect(bridge.addr).await.unwrap();
        let request = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n");
        stream.write_all(request.as_bytes()).await.unwrap();

        let mut response = String::new();
        timeout(WAIT, stream.read_to_string(&mut response))
            .await
            .unwrap()
            .unwrap();

        assert!(response.starts_with("HTTP/1.1 200"), "{response}");
        assert!(response.ends_with("Stratum bridge running...\n"), "{response}");
    }

    assert!(!bridge.pool.is_live());
}
