//! Multi-connection receiving server.

use std::io::{self, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use tracing::{debug, info, instrument, warn};

use super::{DEFAULT_MAX_CONNECTIONS, POLL_INTERVAL, TimedRead, TransportError, WorkerPool};
use crate::env_var;
use crate::protocol::Message;
use crate::protocol::metrics::{FrameDirection, Metrics};

/// Handles every complete message a receiver reads, before it is acknowledged.
pub trait MessageProcessor: Send + Sync + 'static {
    /// Observe one message
    fn process(&self, message: &Message);
}

/// Default processor: logs each message through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingProcessor;

impl MessageProcessor for LoggingProcessor {
    fn process(&self, message: &Message) {
        info!(
            op_code = %message.op_code(),
            payload = %String::from_utf8_lossy(message.data()),
            "received message"
        );
    }
}

impl<F> MessageProcessor for F
where
    F: Fn(&Message) + Send + Sync + 'static,
{
    fn process(&self, message: &Message) {
        self(message);
    }
}

/// Receiver configuration options.
#[derive(Debug, Clone)]
pub struct ReceiverConfig {
    /// Interface to bind
    pub host: String,
    /// Port to bind; `0` picks an ephemeral port
    pub port: u16,
    /// Connections serviced concurrently
    pub max_connections: usize,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            host: crate::DEFAULT_HOST.to_string(),
            port: crate::DEFAULT_PORT,
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }
}

impl ReceiverConfig {
    /// Defaults overridden by `LOGWIRE_HOST`, `LOGWIRE_PORT`, and `LOGWIRE_MAX_CONNECTIONS`.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: env_var("LOGWIRE_HOST").unwrap_or(defaults.host),
            port: env_var("LOGWIRE_PORT").unwrap_or(defaults.port),
            max_connections: env_var("LOGWIRE_MAX_CONNECTIONS")
                .unwrap_or(defaults.max_connections),
        }
    }

    /// Set the bind address
    #[must_use]
    pub fn with_address(mut self, host: impl Into<String>, port: u16) -> Self {
        self.host = host.into();
        self.port = port;
        self
    }

    /// Set the connection limit
    #[must_use]
    pub fn with_max_connections(mut self, max_connections: usize) -> Self {
        self.max_connections = max_connections;
        self
    }
}

/// Accepts connections and acknowledges every complete frame read from them.
#[derive(Debug)]
pub struct Receiver<P: MessageProcessor = LoggingProcessor> {
    config: ReceiverConfig,
    processor: Arc<P>,
    stopping: Arc<AtomicBool>,
}

impl Receiver<LoggingProcessor> {
    /// Create a receiver that logs what it receives
    #[must_use]
    pub fn new(config: ReceiverConfig) -> Self {
        Self::with_processor(config, LoggingProcessor)
    }
}

impl<P: MessageProcessor> Receiver<P> {
    /// Create a receiver with a custom processor
    pub fn with_processor(config: ReceiverConfig, processor: P) -> Self {
        Self {
            config,
            processor: Arc::new(processor),
            stopping: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Active configuration
    #[must_use]
    pub fn config(&self) -> &ReceiverConfig {
        &self.config
    }

    /// Whether the stopping flag is raised
    #[must_use]
    pub fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::SeqCst)
    }

    /// Raise the stopping flag. The accept loop and every connection notice
    /// within one [`POLL_INTERVAL`].
    pub fn stop(&self) {
        self.stopping.store(true, Ordering::SeqCst);
    }

    /// Bind and serve on the calling thread until [`Receiver::stop`] is called.
    pub fn start(&self) -> Result<(), TransportError> {
        self.stopping.store(false, Ordering::SeqCst);
        let listener = self.bind()?;
        self.serve(listener)
    }

    /// Bind on the calling thread, then serve on a background thread.
    pub fn spawn(self) -> Result<ReceiverHandle, TransportError> {
        self.stopping.store(false, Ordering::SeqCst);
        let listener = self.bind()?;
        let local_addr = listener.local_addr()?;
        let stopping = Arc::clone(&self.stopping);

        let thread = thread::Builder::new()
            .name("logwire-receiver".to_string())
            .spawn(move || self.serve(listener))?;

        Ok(ReceiverHandle {
            local_addr,
            stopping,
            thread: Some(thread),
        })
    }

    #[instrument(level = "info", skip(self), fields(host = %self.config.host, port = self.config.port))]
    fn bind(&self) -> Result<TcpListener, TransportError> {
        let address = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind((self.config.host.as_str(), self.config.port))
            .map_err(|source| TransportError::Bind {
                address: address.clone(),
                source,
            })?;
        // Accept is polled so the loop can observe the stopping flag.
        listener.set_nonblocking(true)?;
        info!(local_addr = ?listener.local_addr().ok(), "listening");
        Ok(listener)
    }

    fn serve(&self, listener: TcpListener) -> Result<(), TransportError> {
        let pool = WorkerPool::new(self.config.max_connections, "logwire-conn")?;

        let result = loop {
            if self.is_stopping() {
                break Ok(());
            }
            match listener.accept() {
                Ok((stream, peer)) => {
                    let processor = Arc::clone(&self.processor);
                    let stopping = Arc::clone(&self.stopping);
                    pool.execute(move || {
                        handle_connection(stream, peer, processor.as_ref(), &stopping);
                    });
                }
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                    thread::sleep(POLL_INTERVAL);
                }
                Err(err)
                    if matches!(
                        err.kind(),
                        io::ErrorKind::Interrupted | io::ErrorKind::ConnectionAborted
                    ) => {}
                Err(err) => break Err(TransportError::from(err)),
            }
        };

        drop(listener);
        self.stopping.store(true, Ordering::SeqCst);
        pool.join();
        info!("receiver stopped");
        result
    }
}

/// Handle to a receiver running on a background thread.
///
/// Dropping the handle stops the receiver and waits for it.
#[derive(Debug)]
pub struct ReceiverHandle {
    local_addr: SocketAddr,
    stopping: Arc<AtomicBool>,
    thread: Option<JoinHandle<Result<(), TransportError>>>,
}

impl ReceiverHandle {
    /// Address the listener is bound to
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Whether the stopping flag is raised
    #[must_use]
    pub fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::SeqCst)
    }

    /// Stop accepting, wind down open connections, and join the server thread.
    pub fn stop(mut self) -> Result<(), TransportError> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<(), TransportError> {
        self.stopping.store(true, Ordering::SeqCst);
        match self.thread.take() {
            Some(thread) => thread
                .join()
                .unwrap_or_else(|_| Err(io::Error::other("receiver thread panicked").into())),
            None => Ok(()),
        }
    }
}

impl Drop for ReceiverHandle {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown() {
            warn!(error = %err, "receiver exited with error");
        }
    }
}

/// How a connection's read loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ConnectionEnd {
    /// Peer closed, or the stopping flag was raised.
    Closed,
    /// A frame ended before its declared length.
    Truncated,
}

#[instrument(level = "debug", skip_all, fields(%peer))]
fn handle_connection<P: MessageProcessor + ?Sized>(
    stream: TcpStream,
    peer: SocketAddr,
    processor: &P,
    stopping: &AtomicBool,
) {
    Metrics::record_connection_open();
    info!("connected");

    let stop = || stopping.load(Ordering::SeqCst);
    let outcome = stream
        .set_nonblocking(false)
        .map_err(TransportError::from)
        .and_then(|()| serve_connection(&stream, processor, &stop));
    match outcome {
        Ok(ConnectionEnd::Closed) => {}
        Ok(ConnectionEnd::Truncated) => warn!("partial frame received; dropping connection"),
        Err(err) => {
            Metrics::record_error();
            debug!(error = %err, "connection failed");
        }
    }

    let _ = stream.shutdown(Shutdown::Both);
    Metrics::record_connection_close();
    info!("disconnected");
}

/// Read, process, and acknowledge frames until the stream ends.
pub(crate) fn serve_connection<S, P>(
    conn: &S,
    processor: &P,
    stop: &dyn Fn() -> bool,
) -> Result<ConnectionEnd, TransportError>
where
    S: TimedRead + ?Sized,
    for<'a> &'a S: Write,
    P: MessageProcessor + ?Sized,
{
    loop {
        let message = Message::read_from(conn, Some(stop), None)?;
        if !message.data_complete() {
            if message == Message::incomplete() {
                return Ok(ConnectionEnd::Closed);
            }
            Metrics::record_incomplete_frame();
            return Ok(ConnectionEnd::Truncated);
        }

        Metrics::record_frame(FrameDirection::Received, message.op_code());
        processor.process(&message);
        Message::ack().write_to(conn)?;
        Metrics::record_frame(FrameDirection::Sent, Message::ack().op_code());
    }
}
