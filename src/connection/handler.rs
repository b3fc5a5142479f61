//! Connection Handler Module
//!
//! Each client gets its own task that owns a [`Session`], reads commands,
//! and writes replies. Published messages for the session arrive on a push
//! queue and are written between replies.
//!
//! ## Connection Lifecycle
//!
//! ```text
//! 1. Client connects (TCP handshake)
//!        │
//!        ▼
//! 2. Session created, push queue registered (ServerContext::connect)
//!        │
//!        ▼
//! 3. ┌──────────────────────────────────────────────┐
//!    │                Main Loop                     │
//!    │                                              │
//!    │  parse buffered frames ──> execute ──> write │
//!    │        ▲                                     │
//!    │        │                                     │
//!    │  select! { socket readable | push queued }   │
//!    └──────────────────────────────────────────────┘
//!        │
//!        ▼
//! 4. QUIT / client disconnects / error
//!        │
//!        ▼
//! 5. ServerContext::disconnect (drops subscriptions), task ends
//! ```
//!
//! ## Buffer Management
//!
//! TCP is a stream protocol, so a read may hold half a command or several
//! pipelined ones. Bytes accumulate in a `BytesMut` until the parser can
//! take a whole frame off the front.

use crate::commands::CommandHandler;
use crate::protocol::{ParseError, RespParser, RespValue};
use crate::session::Session;
use bytes::BytesMut;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;
use tokio::sync::mpsc::Receiver;
use tracing::{debug, error, info, trace, warn};

/// Maximum size for the read buffer (64 KB)
const MAX_BUFFER_SIZE: usize = 64 * 1024;

/// Initial buffer capacity
const INITIAL_BUFFER_SIZE: usize = 4096;

/// Statistics for connection handling
#[derive(Debug, Default)]
pub struct ConnectionStats {
    /// Total number of connections accepted
    pub connections_accepted: AtomicU64,
    /// Currently active connections
    pub active_connections: AtomicU64,
    /// Total commands processed
    pub commands_processed: AtomicU64,
    /// Total bytes read
    pub bytes_read: AtomicU64,
    /// Total bytes written
    pub bytes_written: AtomicU64,
    /// Published messages written to subscribers
    pub messages_pushed: AtomicU64,
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

    pub fn message_pushed(&self) {
        self.messages_pushed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bytes_read(&self, count: usize) {
        self.bytes_read.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn bytes_written(&self, count: usize) {
        self.bytes_written.fetch_add(count as u64, Ordering::Relaxed);
    }
}

/// What woke the main loop up.
enum Event {
    Read(std::io::Result<usize>),
    Push(Option<RespValue>),
}

/// Handles a single client connection.
pub struct ConnectionHandler {
    /// The TCP stream for this connection
    stream: BufWriter<TcpStream>,

    /// Client's address (for logging)
    addr: SocketAddr,

    /// Buffer for incoming data
    buffer: BytesMut,

    /// The command handler (shared across connections)
    command_handler: CommandHandler,

    /// RESP parser
    parser: RespParser,

    session: Session,

    /// Frames pushed to this client by other sessions
    pushes: Receiver<RespValue>,

    /// Connection statistics (shared)
    stats: Arc<ConnectionStats>,
}

impl ConnectionHandler {
    /// Creates a handler and registers a fresh session with the server.
    pub fn new(stream: TcpStream, addr: SocketAddr, command_handler: CommandHandler) -> Self {
        let context = command_handler.context();
        let stats = Arc::clone(context.stats());
        stats.connection_opened();

        let session = Session::new(Some(addr));
        let pushes = context.connect(&session);

        Self {
            stream: BufWriter::new(stream),
            addr,
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            command_handler,
            parser: RespParser::new(),
            session,
            pushes,
            stats,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Runs the connection until the client leaves. The session is always
    /// unregistered on the way out, whatever ended the loop.
    pub async fn run(mut self) -> Result<(), ConnectionError> {
        info!(client = %self.addr, session = %self.session.id(), "Client connected");

        let result = self.main_loop().await;

        match &result {
            Ok(()) => info!(client = %self.addr, "Client disconnected gracefully"),
            Err(e) => match e {
                ConnectionError::ClientDisconnected => {
                    debug!(client = %self.addr, "Client disconnected")
                }
                ConnectionError::IoError(io_err)
                    if io_err.kind() == std::io::ErrorKind::ConnectionReset =>
                {
                    debug!(client = %self.addr, "Connection reset by client")
                }
                _ => warn!(client = %self.addr, error = %e, "Connection error"),
            },
        }

        self.command_handler.context().disconnect(&self.session);
        self.stats.connection_closed();
        result
    }

    /// The read-execute-respond loop.
    async fn main_loop(&mut self) -> Result<(), ConnectionError> {
        loop {
            while let Some(frame) = self.try_parse_command()? {
                let reply = self.command_handler.execute(&self.session, frame);
                self.stats.command_processed();

                for frame in reply.into_frames() {
                    self.write_frame(&frame).await?;
                }
                self.stream.flush().await?;

                if self.session.is_closing() {
                    return Ok(());
                }
            }

            match self.next_event().await? {
                Event::Read(read) => self.handle_read(read?)?,
                Event::Push(Some(frame)) => {
                    self.write_frame(&frame).await?;
                    self.stream.flush().await?;
                    self.stats.message_pushed();
                }
                // The registry dropped our sender: the server no longer
                // tracks this session.
                Event::Push(None) => return Ok(()),
            }
        }
    }

    /// Waits for either more bytes from the client or a pushed frame.
    async fn next_event(&mut self) -> Result<Event, ConnectionError> {
        if self.buffer.len() >= MAX_BUFFER_SIZE {
            error!(
                client = %self.addr,
                size = self.buffer.len(),
                "Buffer size limit exceeded"
            );
            return Err(ConnectionError::BufferFull);
        }

        if self.buffer.capacity() - self.buffer.len() < 1024 {
            self.buffer.reserve(4096);
        }

        let event = tokio::select! {
            read = self.stream.get_mut().read_buf(&mut self.buffer) => Event::Read(read),
            push = self.pushes.recv() => Event::Push(push),
        };
        Ok(event)
    }

    fn handle_read(&mut self, n: usize) -> Result<(), ConnectionError> {
        if n == 0 {
            return if self.buffer.is_empty() {
                Err(ConnectionError::ClientDisconnected)
            } else {
                Err(ConnectionError::UnexpectedEof)
            };
        }

        self.stats.bytes_read(n);
        trace!(client = %self.addr, bytes = n, "Read data");
        Ok(())
    }

    /// Attempts to parse a command from the buffer.
    fn try_parse_command(&mut self) -> Result<Option<RespValue>, ConnectionError> {
        if self.buffer.is_empty() {
            return Ok(None);
        }

        match self.parser.parse(&self.buffer) {
            Ok(Some((value, consumed))) => {
                let _ = self.buffer.split_to(consumed);
                trace!(
                    client = %self.addr,
                    consumed = consumed,
                    remaining = self.buffer.len(),
                    "Parsed command"
                );
                Ok(Some(value))
            }
            Ok(None) => {
                trace!(
                    client = %self.addr,
                    buffered = self.buffer.len(),
                    "Incomplete command, need more data"
                );
                Ok(None)
            }
            Err(e) => {
                warn!(client = %self.addr, error = %e, "Parse error");
                Err(ConnectionError::ParseError(e))
            }
        }
    }

    /// Queues one frame on the buffered writer.
    async fn write_frame(&mut self, frame: &RespValue) -> Result<(), ConnectionError> {
        let bytes = frame.serialize();
        self.stream.write_all(&bytes).await?;
        self.stats.bytes_written(bytes.len());
        trace!(client = %self.addr, bytes = bytes.len(), "Sent frame");
        Ok(())
    }
}

/// Errors that can occur while handling a connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// I/O error (network issue)
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// RESP parse error
    #[error("Parse error: {0}")]
    ParseError(#[from] ParseError),

    /// Client disconnected normally
    #[error("Client disconnected")]
    ClientDisconnected,

    /// Unexpected end of stream (partial command)
    #[error("Unexpected end of stream")]
    UnexpectedEof,

    /// Buffer size limit exceeded
    #[error("Buffer size limit exceeded")]
    BufferFull,
}

/// Creates a [`ConnectionHandler`] and runs it to completion.
pub async fn handle_connection(stream: TcpStream, addr: SocketAddr, command_handler: CommandHandler) {
    let handler = ConnectionHandler::new(stream, addr, command_handler);
    if let Err(e) = handler.run().await {
        match e {
            ConnectionError::ClientDisconnected => {}
            ConnectionError::IoError(ref io_err)
                if io_err.kind() == std::io::ErrorKind::ConnectionReset => {}
            _ => {
                debug!(client = %addr, error = %e, "Connection ended with error");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pubsub;
    use crate::server::ServerContext;
    use crate::storage::Databases;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::time::{sleep, timeout, Duration};

    async fn create_test_server() -> (SocketAddr, Arc<ServerContext>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let context = Arc::new(ServerContext::with_databases(
            Arc::new(Databases::new(4)),
            addr.port(),
            false,
        ));

        let handler = CommandHandler::new(Arc::clone(&context));
        tokio::spawn(async move {
            while let Ok((stream, client_addr)) = listener.accept().await {
                tokio::spawn(handle_connection(stream, client_addr, handler.clone()));
            }
        });

        (addr, context)
    }

    /// Reads until exactly `expected` has arrived or two seconds pass.
    async fn read_exact_reply(client: &mut TcpStream, expected: &[u8]) {
        let mut buf = vec![0u8; expected.len()];
        timeout(Duration::from_secs(2), client.read_exact(&mut buf))
            .await
            .expect("timed out waiting for reply")
            .unwrap();
        assert_eq!(
            String::from_utf8_lossy(&buf),
            String::from_utf8_lossy(expected)
        );
    }

    #[tokio::test]
    async fn test_ping_pong() {
        let (addr, _) = create_test_server().await;
        let mut client = TcpStream::connect(addr).await.unwrap();

        client.write_all(b"*1\r\n$4\r\nPING\r\n").await.unwrap();
        read_exact_reply(&mut client, b"+PONG\r\n").await;
    }

    #[tokio::test]
    async fn test_set_get() {
        let (addr, _) = create_test_server().await;
        let mut client = TcpStream::connect(addr).await.unwrap();

        client
            .write_all(b"*3\r\n$3\r\nSET\r\n$4\r\nname\r\n$4\r\nAriz\r\n")
            .await
            .unwrap();
        read_exact_reply(&mut client, b"+OK\r\n").await;

        client
            .write_all(b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n")
            .await
            .unwrap();
        read_exact_reply(&mut client, b"$4\r\nAriz\r\n").await;
    }

    #[tokio::test]
    async fn test_pipelined_commands() {
        let (addr, _) = create_test_server().await;
        let mut client = TcpStream::connect(addr).await.unwrap();

        client
            .write_all(b"*3\r\n$3\r\nSET\r\n$2\r\nk1\r\n$2\r\nv1\r\n*3\r\n$3\r\nSET\r\n$2\r\nk2\r\n$2\r\nv2\r\n*2\r\n$3\r\nGET\r\n$2\r\nk1\r\n*2\r\n$3\r\nGET\r\n$2\r\nk2\r\n")
            .await
            .unwrap();
        read_exact_reply(&mut client, b"+OK\r\n+OK\r\n$2\r\nv1\r\n$2\r\nv2\r\n").await;
    }

    #[tokio::test]
    async fn test_inline_command() {
        let (addr, _) = create_test_server().await;
        let mut client = TcpStream::connect(addr).await.unwrap();

        client.write_all(b"ECHO hello\r\n").await.unwrap();
        read_exact_reply(&mut client, b"$5\r\nhello\r\n").await;
    }

    #[tokio::test]
    async fn test_publish_reaches_other_connection() {
        let (addr, _) = create_test_server().await;
        let mut subscriber = TcpStream::connect(addr).await.unwrap();
        let mut publisher = TcpStream::connect(addr).await.unwrap();

        subscriber
            .write_all(b"*3\r\n$9\r\nSUBSCRIBE\r\n$4\r\nnews\r\n$6\r\nsports\r\n")
            .await
            .unwrap();
        read_exact_reply(
            &mut subscriber,
            b"*3\r\n$9\r\nsubscribe\r\n$4\r\nnews\r\n:1\r\n*3\r\n$9\r\nsubscribe\r\n$6\r\nsports\r\n:2\r\n",
        )
        .await;

        publisher
            .write_all(b"*3\r\n$7\r\nPUBLISH\r\n$4\r\nnews\r\n$2\r\nhi\r\n")
            .await
            .unwrap();
        read_exact_reply(&mut publisher, b":1\r\n").await;
        read_exact_reply(
            &mut subscriber,
            b"*3\r\n$7\r\nmessage\r\n$4\r\nnews\r\n$2\r\nhi\r\n",
        )
        .await;

        subscriber
            .write_all(b"*2\r\n$3\r\nGET\r\n$1\r\nk\r\n")
            .await
            .unwrap();
        read_exact_reply(
            &mut subscriber,
            b"-ERR Can't execute 'get': only (P)SUBSCRIBE / (P)UNSUBSCRIBE / PING / QUIT are allowed in this context\r\n",
        )
        .await;
    }

    #[tokio::test]
    async fn test_disconnect_drops_subscriptions() {
        let (addr, context) = create_test_server().await;
        let mut subscriber = TcpStream::connect(addr).await.unwrap();

        subscriber
            .write_all(b"*2\r\n$9\r\nSUBSCRIBE\r\n$4\r\nnews\r\n")
            .await
            .unwrap();
        read_exact_reply(&mut subscriber, b"*3\r\n$9\r\nsubscribe\r\n$4\r\nnews\r\n:1\r\n").await;
        assert_eq!(pubsub::subscribers(context.admin(), b"news").len(), 1);

        drop(subscriber);
        sleep(Duration::from_millis(50)).await;

        assert!(pubsub::subscribers(context.admin(), b"news").is_empty());
        assert!(context.clients().is_empty());
    }

    #[tokio::test]
    async fn test_quit_closes_connection() {
        let (addr, _) = create_test_server().await;
        let mut client = TcpStream::connect(addr).await.unwrap();

        client.write_all(b"*1\r\n$4\r\nQUIT\r\n").await.unwrap();
        read_exact_reply(&mut client, b"+OK\r\n").await;

        let mut buf = [0u8; 16];
        let n = timeout(Duration::from_secs(2), client.read(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn test_connection_stats() {
        let (addr, context) = create_test_server().await;
        let stats = Arc::clone(context.stats());

        assert_eq!(stats.active_connections.load(Ordering::Relaxed), 0);

        let mut client = TcpStream::connect(addr).await.unwrap();
        sleep(Duration::from_millis(50)).await;

        assert_eq!(stats.connections_accepted.load(Ordering::Relaxed), 1);
        assert_eq!(stats.active_connections.load(Ordering::Relaxed), 1);
        assert_eq!(context.clients().len(), 1);

        client.write_all(b"*1\r\n$4\r\nPING\r\n").await.unwrap();
        read_exact_reply(&mut client, b"+PONG\r\n").await;
        sleep(Duration::from_millis(50)).await;

        assert!(stats.commands_processed.load(Ordering::Relaxed) >= 1);
        assert!(stats.bytes_read.load(Ordering::Relaxed) > 0);
        assert!(stats.bytes_written.load(Ordering::Relaxed) > 0);

        drop(client);
        sleep(Duration::from_millis(50)).await;

        assert_eq!(stats.active_connections.load(Ordering::Relaxed), 0);
        assert!(context.clients().is_empty());
    }
}
