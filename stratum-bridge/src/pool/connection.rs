//! Upstream TCP connection.
//!
//! One [`Connection`] is owned by exactly one task. That task is the only
//! code touching the socket: it writes the handshake, drains the queue of
//! lines produced by client sessions, and publishes whatever the pool sends
//! as raw chunks. Nothing here re-frames pool data.

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::trace;

use super::target::PoolTarget;
use crate::config::PoolConfig;
use crate::error::{BridgeError, BridgeResult};
use crate::stratum::{Request, encode_line};

const READ_CHUNK: usize = 4096;

/// How the I/O loop finished.
#[derive(Debug)]
pub(super) enum Ended {
    /// Pool closed the socket (EOF) without an error.
    Closed,
    /// Socket error; the connection is dead.
    Failed(BridgeError),
    /// Process shutdown.
    Shutdown,
}

/// Buffered pool socket.
pub(super) struct Connection {
    reader: OwnedReadHalf,
    writer: BufWriter<OwnedWriteHalf>,
    read_buf: BytesMut,
}

impl Connection {
    /// Open a TCP connection to the pool.
    ///
    /// Nagle is disabled so each forwarded share leaves immediately. No idle
    /// timeout is applied; Stratum sessions may be quiet for minutes.
    pub async fn open(target: &PoolTarget) -> BridgeResult<Self> {
        let stream = TcpStream::connect((target.host.as_str(), target.port)).await?;
        stream.set_nodelay(true)?;
        Ok(Self::new(stream))
    }

    pub fn new(stream: TcpStream) -> Self {
        let (read_half, write_half) = stream.into_split();

        Self {
            reader: read_half,
            writer: BufWriter::new(write_half),
            read_buf: BytesMut::with_capacity(READ_CHUNK),
        }
    }

    /// Send `mining.subscribe` followed by `mining.authorize`.
    ///
    /// Responses are not awaited; they arrive through the normal read path
    /// and reach the clients like any other pool data.
    pub async fn handshake(&mut self, config: &PoolConfig) -> BridgeResult<()> {
        let subscribe = encode_line(&Request::subscribe(&config.user_agent))?;
        let authorize = encode_line(&Request::authorize(&config.worker, &config.password))?;

        self.write_line(&subscribe).await?;
        self.write_line(&authorize).await
    }

    async fn write_line(&mut self, line: &str) -> BridgeResult<()> {
        trace!(tx = %line.trim_end(), "Sending to pool");

        self.writer.write_all(line.as_bytes()).await?;
        self.writer.flush().await?;

        Ok(())
    }

    /// Pump the socket until it closes, fails, or shutdown is requested.
    ///
    /// `outbound` carries complete, newline-terminated lines. Chunks read
    /// from the pool go to `chunks` as-is; having no subscribers is fine.
    pub async fn run(
        mut self,
        mut outbound: mpsc::UnboundedReceiver<String>,
        chunks: broadcast::Sender<Bytes>,
        shutdown: CancellationToken,
    ) -> Ended {
        loop {
            self.read_buf.reserve(READ_CHUNK);

            tokio::select! {
                read = self.reader.read_buf(&mut self.read_buf) => {
                    match read {
                        Ok(0) => return Ended::Closed,
                        Ok(n) => {
                            let chunk = self.read_buf.split().freeze();
                            trace!(bytes = n, "Received from pool");
                            let _ = chunks.send(chunk);
                        }
                        Err(e) => return Ended::Failed(e.into()),
                    }
                }

                Some(line) = outbound.recv() => {
                    if let Err(e) = self.write_line(&line).await {
                        return Ended::Failed(e);
                    }
                }

                _ = shutdown.cancelled() => return Ended::Shutdown,
            }
        }
    }
}
