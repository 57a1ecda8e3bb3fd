//! Resilient partial receive.
//!
//! A blocking socket read is sliced into [`POLL_INTERVAL`] attempts so a stop
//! predicate or an overall deadline can take effect while the peer is silent.

use std::io::{self, Read};
use std::net::TcpStream;
use std::time::{Duration, Instant};

use tracing::trace;

use super::POLL_INTERVAL;

/// A byte source with an adjustable read timeout.
///
/// All methods take `&self`, matching `TcpStream`, so a timeout guard can be
/// held across reads.
pub trait TimedRead {
    /// Current read timeout
    fn read_timeout(&self) -> io::Result<Option<Duration>>;

    /// Replace the read timeout
    fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()>;

    /// One read call, returning as soon as any bytes are available
    fn read_some(&self, buf: &mut [u8]) -> io::Result<usize>;
}

impl TimedRead for TcpStream {
    fn read_timeout(&self) -> io::Result<Option<Duration>> {
        TcpStream::read_timeout(self)
    }

    fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        TcpStream::set_read_timeout(self, timeout)
    }

    fn read_some(&self, buf: &mut [u8]) -> io::Result<usize> {
        let mut stream = self;
        stream.read(buf)
    }
}

/// Overrides a source's read timeout until dropped.
pub struct ReadTimeoutGuard<'a, S: TimedRead + ?Sized> {
    source: &'a S,
    previous: Option<Duration>,
}

impl<'a, S: TimedRead + ?Sized> ReadTimeoutGuard<'a, S> {
    /// Install `timeout` on `source`, remembering the old value.
    pub fn new(source: &'a S, timeout: Duration) -> io::Result<Self> {
        let previous = source.read_timeout()?;
        source.set_read_timeout(Some(timeout))?;
        Ok(Self { source, previous })
    }
}

impl<S: TimedRead + ?Sized> Drop for ReadTimeoutGuard<'_, S> {
    fn drop(&mut self) {
        if let Err(err) = self.source.set_read_timeout(self.previous) {
            trace!(error = %err, "failed to restore read timeout");
        }
    }
}

/// Read up to `buf.len()` bytes, polling every [`POLL_INTERVAL`].
///
/// Returns `Ok(0)` when `stop` fires, `timeout` elapses, or the peer closes.
/// A successful read returns immediately and may be shorter than requested.
pub fn recv_partial<S: TimedRead + ?Sized>(
    source: &S,
    buf: &mut [u8],
    stop: Option<&dyn Fn() -> bool>,
    timeout: Option<Duration>,
) -> io::Result<usize> {
    let deadline = timeout.map(|t| Instant::now() + t);
    recv_until(source, buf, stop, deadline)
}

pub(crate) fn recv_until<S: TimedRead + ?Sized>(
    source: &S,
    buf: &mut [u8],
    stop: Option<&dyn Fn() -> bool>,
    deadline: Option<Instant>,
) -> io::Result<usize> {
    if buf.is_empty() {
        return Ok(0);
    }

    let _guard = ReadTimeoutGuard::new(source, POLL_INTERVAL)?;
    loop {
        if stop.is_some_and(|stop| stop()) {
            trace!("receive stopped by predicate");
            return Ok(0);
        }
        if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            trace!("receive deadline elapsed");
            return Ok(0);
        }

        match source.read_some(buf) {
            Ok(read) => return Ok(read),
            Err(err) if is_poll_timeout(&err) => {}
            Err(err) => return Err(err),
        }
    }
}

fn is_poll_timeout(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
    )
}
