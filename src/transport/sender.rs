//! Acknowledged sender owning a single outbound connection.

use std::io::{self, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::thread;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, instrument, trace, warn};

use super::{DEFAULT_ACK_TIMEOUT, Destination, RetryPolicy, TransportError};
use crate::protocol::Message;
use crate::protocol::metrics::{FrameDirection, Metrics};

/// Sender configuration options.
#[derive(Debug, Clone)]
pub struct SenderConfig {
    /// How long to wait for the acknowledgement frame.
    pub ack_timeout: Duration,
    /// Optional connect timeout. `None` uses the OS default.
    pub connect_timeout: Option<Duration>,
    /// Optional write timeout for the connection.
    pub write_timeout: Option<Duration>,
    /// Retry schedule for connection-class failures.
    pub retry: RetryPolicy,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            ack_timeout: DEFAULT_ACK_TIMEOUT,
            connect_timeout: None,
            write_timeout: None,
            retry: RetryPolicy::default(),
        }
    }
}

impl SenderConfig {
    /// Replace the retry schedule
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Replace the ack timeout
    #[must_use]
    pub fn with_ack_timeout(mut self, ack_timeout: Duration) -> Self {
        self.ack_timeout = ack_timeout;
        self
    }
}

/// Sends frames to one destination and waits for each to be acknowledged.
///
/// The connection is opened lazily and dropped on any connection-class
/// error, so the next attempt reconnects. Sends take `&mut self`: one
/// send-and-ack cycle completes before the next starts.
#[derive(Debug)]
pub struct Sender {
    destination: Destination,
    config: SenderConfig,
    connection: Option<TcpStream>,
}

impl Sender {
    /// Create a sender with default configuration
    #[must_use]
    pub fn new(destination: Destination) -> Self {
        Self::with_config(destination, SenderConfig::default())
    }

    /// Create a sender with explicit configuration
    #[must_use]
    pub fn with_config(destination: Destination, config: SenderConfig) -> Self {
        Self {
            destination,
            config,
            connection: None,
        }
    }

    /// Target of this sender
    #[must_use]
    pub fn destination(&self) -> &Destination {
        &self.destination
    }

    /// Active configuration
    #[must_use]
    pub fn config(&self) -> &SenderConfig {
        &self.config
    }

    /// Whether a connection is currently held
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// Send `message` and wait for the ack, retrying connection-class failures.
    ///
    /// Framing errors are returned before anything is written. After the
    /// retry cap is reached the last error is returned and the connection is
    /// left closed.
    #[instrument(level = "debug", skip(self, message), fields(destination = %self.destination, op_code = %message.op_code()))]
    pub fn send(&mut self, message: &Message) -> Result<(), TransportError> {
        let frame = message.to_bytes()?;
        let attempts = self.config.retry.attempts();

        let mut attempt = 1;
        loop {
            match self.send_frame(&frame) {
                Ok(()) => {
                    Metrics::record_frame(FrameDirection::Sent, message.op_code());
                    return Ok(());
                }
                Err(err) => {
                    self.close();
                    Metrics::record_error();
                    if !err.is_reconnect() {
                        return Err(err);
                    }
                    if attempt >= attempts {
                        warn!(attempts, error = %err, "giving up on send");
                        return Err(err);
                    }

                    let delay = self.config.retry.delay_after(attempt);
                    debug!(attempt, ?delay, error = %err, "send failed; reconnecting");
                    Metrics::record_retry();
                    thread::sleep(delay);
                    attempt += 1;
                }
            }
        }
    }

    /// Serialize `record` as JSON and send it.
    pub fn send_log_record<R: Serialize + ?Sized>(
        &mut self,
        record: &R,
    ) -> Result<(), TransportError> {
        let payload = serde_json::to_vec(record)?;
        self.send(&Message::json(payload))
    }

    /// Probe the destination with an ack round-trip.
    ///
    /// May open, drop, or re-open the connection as a side effect.
    pub fn has_live_receiver(&mut self) -> bool {
        match self.send(&Message::ack()) {
            Ok(()) => true,
            Err(err) => {
                debug!(destination = %self.destination, error = %err, "liveness probe failed");
                false
            }
        }
    }

    /// Drop the current connection, if any.
    pub fn close(&mut self) {
        if let Some(stream) = self.connection.take() {
            trace!(destination = %self.destination, "closing connection");
            let _ = stream.shutdown(std::net::Shutdown::Both);
        }
    }

    fn send_frame(&mut self, frame: &[u8]) -> Result<(), TransportError> {
        let ack_timeout = self.config.ack_timeout;
        let mut stream = self.connection()?;
        stream.write_all(frame)?;
        stream.flush()?;
        recv_ack(stream, ack_timeout)
    }

    fn connection(&mut self) -> Result<&TcpStream, TransportError> {
        if self.connection.is_none() {
            self.connection = Some(self.connect()?);
        }
        self.connection
            .as_ref()
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotConnected).into())
    }

    fn connect(&self) -> Result<TcpStream, TransportError> {
        let addrs = (self.destination.host(), self.destination.port()).to_socket_addrs()?;

        let mut last_err = None;
        for addr in addrs {
            let attempt = match self.config.connect_timeout {
                Some(timeout) => TcpStream::connect_timeout(&addr, timeout),
                None => TcpStream::connect(addr),
            };
            match attempt {
                Ok(stream) => {
                    stream.set_nodelay(true)?;
                    stream.set_write_timeout(self.config.write_timeout)?;
                    debug!(destination = %self.destination, %addr, "connected");
                    return Ok(stream);
                }
                Err(err) => last_err = Some(err),
            }
        }

        Err(last_err
            .unwrap_or_else(|| {
                io::Error::new(
                    io::ErrorKind::AddrNotAvailable,
                    format!("{} did not resolve to any address", self.destination),
                )
            })
            .into())
    }
}

impl Drop for Sender {
    fn drop(&mut self) {
        self.close();
    }
}

/// Read one frame and require it to be exactly [`Message::ack`].
fn recv_ack(stream: &TcpStream, timeout: Duration) -> Result<(), TransportError> {
    let reply = Message::read_from(stream, None, Some(timeout))?;
    if !reply.is_ack() {
        return Err(TransportError::MissingAck { received: reply });
    }
    Metrics::record_frame(FrameDirection::Received, reply.op_code());
    Ok(())
}
