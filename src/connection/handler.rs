//! Per-Client Loop
//!
//! ```text
//!  read into buffer ──> decode every complete request ──> Db::execute
//!        ^                                                     │
//!        │                                                     ▼
//!        └──────────── flush replies (in request order) <── encode
//! ```
//!
//! TCP is a byte stream, so a read can end in the middle of a request or
//! hold several pipelined ones. Bytes stay in the buffer until they form a
//! whole request. All replies for one read go out in a single flush.

use crate::protocol::{parse_command, ParseError, Reply};
use crate::storage::Db;
use bytes::BytesMut;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufWriter};
use tracing::{debug, info, trace, warn};

/// Upper bound on buffered, not yet decodable input.
const MAX_BUFFER_SIZE: usize = 1024 * 1024 * 1024;

const INITIAL_BUFFER_SIZE: usize = 4096;

/// Process-wide connection counters.
#[derive(Debug, Default)]
pub struct ConnectionStats {
    pub connections_accepted: AtomicU64,
    pub active_connections: AtomicU64,
    pub commands_processed: AtomicU64,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn accepted(&self) -> u64 {
        self.connections_accepted.load(Ordering::Relaxed)
    }

    pub fn active(&self) -> u64 {
        self.active_connections.load(Ordering::Relaxed)
    }

    pub fn commands(&self) -> u64 {
        self.commands_processed.load(Ordering::Relaxed)
    }

    fn opened(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    fn closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] ParseError),

    #[error("client disconnected")]
    Disconnected,

    #[error("connection closed mid-request")]
    UnexpectedEof,

    #[error("request buffer limit exceeded")]
    BufferFull,
}

impl ConnectionError {
    /// Whether this is an ordinary way for a client to go away.
    fn is_hangup(&self) -> bool {
        match self {
            Self::Disconnected => true,
            Self::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::ConnectionReset | std::io::ErrorKind::BrokenPipe
            ),
            _ => false,
        }
    }
}

/// One client session over any byte stream.
pub struct ConnectionHandler<S> {
    stream: BufWriter<S>,
    peer: SocketAddr,
    buffer: BytesMut,
    out: BytesMut,
    db: Arc<Db>,
    stats: Arc<ConnectionStats>,
}

impl<S> ConnectionHandler<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, peer: SocketAddr, db: Arc<Db>, stats: Arc<ConnectionStats>) -> Self {
        stats.opened();
        Self {
            stream: BufWriter::new(stream),
            peer,
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            out: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            db,
            stats,
        }
    }

    /// Serves requests until the client leaves or sends garbage.
    ///
    /// A clean disconnect between requests returns `Ok`.
    pub async fn run(mut self) -> Result<(), ConnectionError> {
        info!(client = %self.peer, "Client connected");

        let result = match self.serve().await {
            Err(ConnectionError::Disconnected) => Ok(()),
            Err(ConnectionError::Protocol(e)) => {
                warn!(client = %self.peer, error = %e, "Protocol error, closing connection");
                self.reject(&e).await;
                Err(ConnectionError::Protocol(e))
            }
            other => other,
        };

        self.stats.closed();
        debug!(client = %self.peer, "Client disconnected");
        result
    }

    async fn serve(&mut self) -> Result<(), ConnectionError> {
        loop {
            self.execute_buffered()?;
            if !self.out.is_empty() {
                self.flush_replies().await?;
            }
            self.fill_buffer().await?;
        }
    }

    /// Runs every complete request in the buffer, queueing the replies.
    fn execute_buffered(&mut self) -> Result<(), ConnectionError> {
        while let Some((frame, consumed)) = parse_command(&self.buffer)? {
            let _ = self.buffer.split_to(consumed);
            if frame.is_empty() {
                continue;
            }

            let reply = self.db.execute(&frame);
            self.stats.commands_processed.fetch_add(1, Ordering::Relaxed);
            reply.write_to(&mut self.out);
        }
        Ok(())
    }

    async fn flush_replies(&mut self) -> Result<(), ConnectionError> {
        let pending = self.out.split();
        self.stream.write_all(&pending).await?;
        self.stream.flush().await?;
        trace!(client = %self.peer, bytes = pending.len(), "Sent replies");
        Ok(())
    }

    async fn fill_buffer(&mut self) -> Result<(), ConnectionError> {
        if self.buffer.len() >= MAX_BUFFER_SIZE {
            return Err(ConnectionError::BufferFull);
        }
        self.buffer.reserve(INITIAL_BUFFER_SIZE);

        let n = self.stream.get_mut().read_buf(&mut self.buffer).await?;
        if n == 0 {
            return Err(if self.buffer.is_empty() {
                ConnectionError::Disconnected
            } else {
                ConnectionError::UnexpectedEof
            });
        }
        trace!(client = %self.peer, bytes = n, "Read data");
        Ok(())
    }

    /// Best-effort error reply before hanging up on a malformed request.
    async fn reject(&mut self, error: &ParseError) {
        let reply = Reply::error(format!("ERR Protocol error: {}", error));
        let mut buf = BytesMut::new();
        reply.write_to(&mut buf);
        if self.stream.write_all(&buf).await.is_ok() {
            let _ = self.stream.flush().await;
        }
    }
}

/// Runs a session to completion, logging anything unusual.
pub async fn handle_connection<S>(stream: S, peer: SocketAddr, db: Arc<Db>, stats: Arc<ConnectionStats>)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let handler = ConnectionHandler::new(stream, peer, db, stats);
    if let Err(e) = handler.run().await {
        if e.is_hangup() {
            debug!(client = %peer, error = %e, "Connection dropped");
        } else {
            info!(client = %peer, error = %e, "Connection ended with error");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{DbConfig, WheelConfig};
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio_test::io::Builder;

    fn test_db() -> Arc<Db> {
        Arc::new(Db::new(DbConfig {
            wheel: WheelConfig {
                tick: Duration::from_millis(10),
                slots: 64,
            },
            ..DbConfig::default()
        }))
    }

    fn peer() -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], 40000))
    }

    #[tokio::test]
    async fn test_mock_ping() {
        let stream = Builder::new()
            .read(b"*1\r\n$4\r\nPING\r\n")
            .write(b"+PONG\r\n")
            .build();
        let stats = Arc::new(ConnectionStats::new());

        let result = ConnectionHandler::new(stream, peer(), test_db(), Arc::clone(&stats))
            .run()
            .await;
        assert!(result.is_ok());
        assert_eq!(stats.commands(), 1);
        assert_eq!(stats.accepted(), 1);
        assert_eq!(stats.active(), 0);
    }

    #[tokio::test]
    async fn test_pipelined_replies_in_order() {
        let stream = Builder::new()
            .read(b"*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$1\r\nv\r\nGET k\r\n\r\n*2\r\n$4\r\nINCR\r\n$1\r\nk\r\n")
            .write(b"+OK\r\n")
            .write(b"$1\r\nv\r\n")
            .write(b"-ERR value is not an integer or out of range\r\n")
            .build();
        let stats = Arc::new(ConnectionStats::new());

        ConnectionHandler::new(stream, peer(), test_db(), Arc::clone(&stats))
            .run()
            .await
            .unwrap();
        assert_eq!(stats.commands(), 3);
    }

    #[tokio::test]
    async fn test_request_split_across_reads() {
        let stream = Builder::new()
            .read(b"*2\r\n$4\r\nEC")
            .read(b"HO\r\n$5\r\nhel")
            .read(b"lo\r\n")
            .write(b"$5\r\nhello\r\n")
            .build();

        ConnectionHandler::new(stream, peer(), test_db(), Arc::new(ConnectionStats::new()))
            .run()
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_malformed_request_closes_connection() {
        let stream = Builder::new()
            .read(b"*1\r\n$x\r\n")
            .write(b"-ERR Protocol error: invalid length: x\r\n")
            .build();

        let result =
            ConnectionHandler::new(stream, peer(), test_db(), Arc::new(ConnectionStats::new()))
                .run()
                .await;
        assert!(matches!(result, Err(ConnectionError::Protocol(_))));
    }

    #[tokio::test]
    async fn test_eof_mid_request() {
        let stream = Builder::new().read(b"*2\r\n$3\r\nGET\r\n").build();

        let result =
            ConnectionHandler::new(stream, peer(), test_db(), Arc::new(ConnectionStats::new()))
                .run()
                .await;
        assert!(matches!(result, Err(ConnectionError::UnexpectedEof)));
    }

    async fn start_server() -> (SocketAddr, Arc<ConnectionStats>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let db = test_db();
        let stats = Arc::new(ConnectionStats::new());

        let server_stats = Arc::clone(&stats);
        tokio::spawn(async move {
            while let Ok((stream, client)) = listener.accept().await {
                tokio::spawn(handle_connection(
                    stream,
                    client,
                    Arc::clone(&db),
                    Arc::clone(&server_stats),
                ));
            }
        });

        (addr, stats)
    }

    async fn read_exact_reply(client: &mut TcpStream, len: usize) -> Vec<u8> {
        let mut buf = vec![0u8; len];
        tokio::time::timeout(Duration::from_secs(2), client.read_exact(&mut buf))
            .await
            .expect("reply timed out")
            .unwrap();
        buf
    }

    #[tokio::test]
    async fn test_tcp_round_trip() {
        let (addr, stats) = start_server().await;
        let mut client = TcpStream::connect(addr).await.unwrap();

        client
            .write_all(b"*3\r\n$5\r\nRPUSH\r\n$1\r\nl\r\n$1\r\na\r\nLRANGE l 0 -1\r\n")
            .await
            .unwrap();
        let expected = b":1\r\n*1\r\n$1\r\na\r\n";
        assert_eq!(read_exact_reply(&mut client, expected.len()).await, expected);

        assert_eq!(stats.accepted(), 1);
        assert_eq!(stats.active(), 1);

        drop(client);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(stats.active(), 0);
        assert_eq!(stats.commands(), 2);
    }

    #[tokio::test]
    async fn test_clients_share_keyspace() {
        let (addr, _) = start_server().await;
        let mut a = TcpStream::connect(addr).await.unwrap();
        let mut b = TcpStream::connect(addr).await.unwrap();

        a.write_all(b"SET shared 1\r\n").await.unwrap();
        assert_eq!(read_exact_reply(&mut a, 5).await, b"+OK\r\n");

        b.write_all(b"INCR shared\r\n").await.unwrap();
        assert_eq!(read_exact_reply(&mut b, 4).await, b":2\r\n");
    }
}
