//! Connection Handler Implementation
//!
//! This module contains the per-connection read/decode/dispatch/write loop.
//!
//! ## Connection Lifecycle
//!
//! ```text
//! 1. Client connects
//!        │
//!        ▼
//! 2. ConnectionHandler created (empty buffer, fresh CommandDecoder)
//!        │
//!        ▼
//! 3. Main loop:
//!    ┌──────────────────────────────┐
//!    │ a. Read bytes from socket    │
//!    │ b. Decode every complete     │
//!    │    command in the buffer     │
//!    │ c. Dispatch each, queue the  │
//!    │    replies in order          │
//!    │ d. Flush once for the batch  │
//!    │ e. Repeat                    │
//!    └──────────────────────────────┘
//!        │
//!        ▼
//! 4. QUIT / EOF / framing error / I/O error
//!        │
//!        ▼
//! 5. Handler task ends, decoder state is dropped
//! ```
//!
//! ## Buffer Management
//!
//! A `BytesMut` accumulates incoming data. The decoder only removes bytes it
//! has fully interpreted, so anything left in the buffer after a batch is the
//! start of the next command. When the decoder knows how many bytes it is
//! waiting for (a large bulk argument), the buffer is grown up front.

use crate::commands::Dispatcher;
use crate::protocol::{CommandDecoder, DecoderLimits, FrameError, Reply};
use bytes::BytesMut;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufWriter};
use tracing::{debug, info, trace, warn};

/// Initial buffer capacity
const INITIAL_BUFFER_SIZE: usize = 4096;

/// Largest single reservation made on behalf of a pending bulk argument
const MAX_RESERVE: usize = 1024 * 1024;

/// Statistics for connection handling
#[derive(Debug, Default)]
pub struct ConnectionStats {
    /// Total number of connections accepted
    pub connections_accepted: AtomicU64,
    /// Currently active connections
    pub active_connections: AtomicU64,
    /// Total commands processed
    pub commands_processed: AtomicU64,
    /// Connections closed because of a framing error
    pub protocol_errors: AtomicU64,
    /// Total bytes read
    pub bytes_read: AtomicU64,
    /// Total bytes written
    pub bytes_written: AtomicU64,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_opened(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn command_processed(&self) {
        self.commands_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn protocol_error(&self) {
        self.protocol_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bytes_read(&self, count: usize) {
        self.bytes_read.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn bytes_written(&self, count: usize) {
        self.bytes_written
            .fetch_add(count as u64, Ordering::Relaxed);
    }
}

/// Errors that can occur while handling a connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// I/O error (network issue)
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Malformed request framing; the stream cannot be resynchronized
    #[error("Protocol error: {0}")]
    Protocol(#[from] FrameError),

    /// Client disconnected normally
    #[error("Client disconnected")]
    ClientDisconnected,

    /// Unexpected end of stream (partial command)
    #[error("Unexpected end of stream")]
    UnexpectedEof,
}

/// How a batch of decoded commands ended.
enum BatchOutcome {
    /// Every complete command was handled; read more.
    Continue,
    /// The client sent QUIT.
    Quit,
}

/// Handles a single client connection.
///
/// Generic over the stream so the same loop serves TCP sockets and in-memory
/// test streams.
pub struct ConnectionHandler<S> {
    /// The client stream, buffered so replies of one batch share a flush
    stream: BufWriter<S>,

    /// Client's address (for logging)
    addr: SocketAddr,

    /// Buffer for incoming data
    buffer: BytesMut,

    /// This connection's framing state
    decoder: CommandDecoder,

    /// Scratch space for serializing one reply
    reply_buf: Vec<u8>,

    /// The dispatcher (shared across connections)
    dispatcher: Arc<Dispatcher>,

    /// Connection statistics (shared)
    stats: Arc<ConnectionStats>,
}

impl<S> ConnectionHandler<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Creates a new connection handler.
    ///
    /// # Arguments
    ///
    /// * `stream` - The client stream
    /// * `addr` - The client's socket address
    /// * `dispatcher` - The shared command dispatcher
    /// * `limits` - Framing limits for this connection's decoder
    /// * `stats` - Shared connection statistics
    pub fn new(
        stream: S,
        addr: SocketAddr,
        dispatcher: Arc<Dispatcher>,
        limits: DecoderLimits,
        stats: Arc<ConnectionStats>,
    ) -> Self {
        stats.connection_opened();

        Self {
            stream: BufWriter::new(stream),
            addr,
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            decoder: CommandDecoder::with_limits(limits),
            reply_buf: Vec::with_capacity(INITIAL_BUFFER_SIZE),
            dispatcher,
            stats,
        }
    }

    /// Runs the main connection loop.
    ///
    /// Returns `Ok(())` when the client quits or disconnects between
    /// commands.
    pub async fn run(mut self) -> Result<(), ConnectionError> {
        info!(client = %self.addr, "Client connected");

        let result = self.main_loop().await;

        let result = match result {
            Ok(()) => {
                info!(client = %self.addr, "Client disconnected gracefully");
                Ok(())
            }
            Err(ConnectionError::ClientDisconnected) => {
                debug!(client = %self.addr, "Client disconnected");
                Ok(())
            }
            Err(ConnectionError::IoError(io_err))
                if io_err.kind() == std::io::ErrorKind::ConnectionReset =>
            {
                debug!(client = %self.addr, "Connection reset by client");
                Err(ConnectionError::IoError(io_err))
            }
            Err(e) => {
                warn!(client = %self.addr, error = %e, "Connection error");
                Err(e)
            }
        };

        // Any half-decoded command dies with the connection
        self.decoder.reset();
        self.stats.connection_closed();
        result
    }

    /// The main read-dispatch-respond loop.
    async fn main_loop(&mut self) -> Result<(), ConnectionError> {
        loop {
            match self.process_batch().await? {
                BatchOutcome::Quit => {
                    self.stream.flush().await?;
                    let _ = self.stream.shutdown().await;
                    return Ok(());
                }
                BatchOutcome::Continue => {}
            }

            self.stream.flush().await?;
            self.read_more_data().await?;
        }
    }

    /// Dispatches every complete command currently buffered, in order.
    ///
    /// Replies are only queued in the write buffer here; the caller flushes
    /// once for the whole batch.
    async fn process_batch(&mut self) -> Result<BatchOutcome, ConnectionError> {
        loop {
            let command = match self.decoder.decode(&mut self.buffer) {
                Ok(Some(command)) => command,
                Ok(None) => {
                    trace!(
                        client = %self.addr,
                        buffered = self.buffer.len(),
                        needed = self.decoder.bytes_needed(),
                        "Incomplete command, need more data"
                    );
                    return Ok(BatchOutcome::Continue);
                }
                Err(e) => return Err(self.fail_protocol(e).await),
            };

            trace!(client = %self.addr, command = %command, "Decoded command");

            let reply = self.dispatcher.dispatch(command);
            self.stats.command_processed();

            if reply.is_quit() {
                return Ok(BatchOutcome::Quit);
            }

            self.queue_reply(&reply).await?;
        }
    }

    /// Reports a framing error to the client, then gives up on the stream.
    async fn fail_protocol(&mut self, e: FrameError) -> ConnectionError {
        warn!(client = %self.addr, error = %e, "Protocol error, closing connection");
        self.stats.protocol_error();

        let reply = Reply::error(format!("ERR Protocol error: {}", e));
        if let Err(io_err) = self.queue_reply(&reply).await {
            return io_err;
        }
        if let Err(io_err) = self.stream.flush().await {
            return io_err.into();
        }
        ConnectionError::Protocol(e)
    }

    /// Serializes a reply into the write buffer without flushing.
    async fn queue_reply(&mut self, reply: &Reply) -> Result<(), ConnectionError> {
        self.reply_buf.clear();
        reply.serialize_into(&mut self.reply_buf);
        self.stream.write_all(&self.reply_buf).await?;
        self.stats.bytes_written(self.reply_buf.len());
        trace!(client = %self.addr, bytes = self.reply_buf.len(), "Queued reply");
        Ok(())
    }

    /// Reads more data from the stream into the buffer.
    async fn read_more_data(&mut self) -> Result<(), ConnectionError> {
        let wanted = self.decoder.bytes_needed().clamp(1024, MAX_RESERVE);
        if self.buffer.capacity() - self.buffer.len() < wanted {
            self.buffer.reserve(wanted);
        }

        let n = self.stream.get_mut().read_buf(&mut self.buffer).await?;

        if n == 0 {
            // Connection closed by client
            if self.buffer.is_empty() && self.decoder.is_idle() {
                return Err(ConnectionError::ClientDisconnected);
            } else {
                // Partial command in buffer
                return Err(ConnectionError::UnexpectedEof);
            }
        }

        self.stats.bytes_read(n);
        trace!(client = %self.addr, bytes = n, "Read data");

        Ok(())
    }
}

/// Handles a client connection.
///
/// This is a convenience function that creates a ConnectionHandler
/// and runs it to completion.
pub async fn handle_connection<S>(
    stream: S,
    addr: SocketAddr,
    dispatcher: Arc<Dispatcher>,
    limits: DecoderLimits,
    stats: Arc<ConnectionStats>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let handler = ConnectionHandler::new(stream, addr, dispatcher, limits, stats);
    if let Err(e) = handler.run().await {
        debug!(client = %addr, error = %e, "Connection ended with error");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{builtin, ArgShape, CommandRegistry, Keyspace};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio_test::io::Builder;

    fn test_addr() -> SocketAddr {
        "127.0.0.1:50000".parse().unwrap()
    }

    fn create_dispatcher() -> Arc<Dispatcher> {
        let registry = builtin::registry(Arc::new(Keyspace::new()));
        Arc::new(Dispatcher::new(Arc::new(registry)))
    }

    async fn run_mock(
        stream: tokio_test::io::Mock,
    ) -> (Result<(), ConnectionError>, Arc<ConnectionStats>) {
        let stats = Arc::new(ConnectionStats::new());
        let handler = ConnectionHandler::new(
            stream,
            test_addr(),
            create_dispatcher(),
            DecoderLimits::default(),
            Arc::clone(&stats),
        );
        (handler.run().await, stats)
    }

    #[tokio::test]
    async fn test_split_delivery() {
        let stream = Builder::new()
            .read(b"*2\r\n$4\r\nEC")
            .read(b"HO\r\n$5\r\nhel")
            .read(b"lo\r")
            .read(b"\n")
            .write(b"$5\r\nhello\r\n")
            .build();

        let (result, stats) = run_mock(stream).await;
        assert!(result.is_ok());
        assert_eq!(stats.commands_processed.load(Ordering::Relaxed), 1);
        assert_eq!(stats.active_connections.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_pipelined_replies_are_written_in_order() {
        let stream = Builder::new()
            .read(b"*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$1\r\nv\r\n*2\r\n$3\r\nGET\r\n$1\r\nk\r\nPING\r\n")
            .write(b"+OK\r\n$1\r\nv\r\n+PONG\r\n")
            .build();

        let (result, stats) = run_mock(stream).await;
        assert!(result.is_ok());
        assert_eq!(stats.commands_processed.load(Ordering::Relaxed), 3);
    }

    #[tokio::test]
    async fn test_quit_flushes_earlier_replies() {
        let stream = Builder::new()
            .read(b"*1\r\n$4\r\nPING\r\n*1\r\n$4\r\nQUIT\r\n*1\r\n$4\r\nPING\r\n")
            .write(b"+PONG\r\n")
            .build();

        let (result, stats) = run_mock(stream).await;
        assert!(result.is_ok());
        // The PING after QUIT is never dispatched
        assert_eq!(stats.commands_processed.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn test_protocol_error_closes_connection() {
        let stream = Builder::new()
            .read(b"*1\r\n$4\r\nPING\r\n*1\r\n:1\r\n")
            .write(b"+PONG\r\n-ERR Protocol error: expected '$', got ':'\r\n")
            .build();

        let (result, stats) = run_mock(stream).await;
        assert!(matches!(
            result,
            Err(ConnectionError::Protocol(FrameError::UnexpectedByte { .. }))
        ));
        assert_eq!(stats.protocol_errors.load(Ordering::Relaxed), 1);
        assert_eq!(stats.commands_processed.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_partial_command_at_eof_is_dropped() {
        let stream = Builder::new().read(b"*2\r\n$3\r\nGET\r\n").build();

        let (result, stats) = run_mock(stream).await;
        assert!(matches!(result, Err(ConnectionError::UnexpectedEof)));
        assert_eq!(stats.commands_processed.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_command_errors_keep_connection_open() {
        let stream = Builder::new()
            .read(b"*1\r\n$3\r\nFOO\r\n*2\r\n$3\r\nGET\r\n$1\r\nk\r\n")
            .write(b"-unknown command 'foo'\r\n$-1\r\n")
            .build();

        let (result, _) = run_mock(stream).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_no_value_reply() {
        let registry = CommandRegistry::builder()
            .register("noop", ArgShape::none(), |_| Ok(None))
            .build();
        let dispatcher = Arc::new(Dispatcher::new(Arc::new(registry)));
        let stream = Builder::new()
            .read(b"*1\r\n$4\r\nNOOP\r\nNOOP\r\n")
            .write(b"-ERR not yet implemented\r\n\r\n")
            .build();

        let handler = ConnectionHandler::new(
            stream,
            test_addr(),
            dispatcher,
            DecoderLimits::default(),
            Arc::new(ConnectionStats::new()),
        );
        assert!(handler.run().await.is_ok());
    }

    async fn create_test_server() -> (SocketAddr, Arc<ConnectionStats>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let dispatcher = create_dispatcher();
        let stats = Arc::new(ConnectionStats::new());

        let stats_clone = Arc::clone(&stats);
        tokio::spawn(async move {
            while let Ok((stream, client_addr)) = listener.accept().await {
                tokio::spawn(handle_connection(
                    stream,
                    client_addr,
                    Arc::clone(&dispatcher),
                    DecoderLimits::default(),
                    Arc::clone(&stats_clone),
                ));
            }
        });

        (addr, stats)
    }

    #[tokio::test]
    async fn test_tcp_ping_pong() {
        let (addr, _) = create_test_server().await;

        let mut client = TcpStream::connect(addr).await.unwrap();
        client.write_all(b"*1\r\n$4\r\nPING\r\n").await.unwrap();

        let mut buf = [0u8; 64];
        let n = client.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"+PONG\r\n");
    }

    #[tokio::test]
    async fn test_tcp_inline_and_quit() {
        let (addr, stats) = create_test_server().await;

        let mut client = TcpStream::connect(addr).await.unwrap();
        client.write_all(b"ECHO hello world\r\nQUIT\r\n").await.unwrap();

        let mut received = Vec::new();
        let read = tokio::time::timeout(
            tokio::time::Duration::from_secs(2),
            client.read_to_end(&mut received),
        )
        .await;
        assert!(matches!(read, Ok(Ok(_))));
        assert_eq!(received, b"+hello world\r\n");

        tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
        assert_eq!(stats.active_connections.load(Ordering::Relaxed), 0);
        assert_eq!(stats.connections_accepted.load(Ordering::Relaxed), 1);
    }
}
