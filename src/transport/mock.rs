//! Scripted byte source for exercising receive paths without sockets.

use std::collections::VecDeque;
use std::io::{self, Write};
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use super::{POLL_INTERVAL, TimedRead};

/// One scripted outcome of a read call.
#[derive(Debug)]
pub(crate) enum Step {
    Data(Vec<u8>),
    Timeout,
    Error(io::ErrorKind),
}

/// Plays back [`Step`]s. Once drained it reports end-of-stream, or keeps
/// timing out when built with [`ScriptedSource::silent`].
#[derive(Debug)]
pub(crate) struct ScriptedSource {
    steps: Mutex<VecDeque<Step>>,
    timeout: Mutex<Option<Duration>>,
    timeouts_seen: Mutex<Vec<Option<Duration>>>,
    written: Mutex<Vec<u8>>,
    silent_when_drained: bool,
}

impl ScriptedSource {
    pub(crate) fn new(steps: Vec<Step>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            timeout: Mutex::new(None),
            timeouts_seen: Mutex::new(Vec::new()),
            written: Mutex::new(Vec::new()),
            silent_when_drained: false,
        }
    }

    pub(crate) fn silent() -> Self {
        Self {
            silent_when_drained: true,
            ..Self::new(Vec::new())
        }
    }

    pub(crate) fn timeouts_seen(&self) -> Vec<Option<Duration>> {
        self.timeouts_seen.lock().unwrap().clone()
    }

    pub(crate) fn written(&self) -> Vec<u8> {
        self.written.lock().unwrap().clone()
    }

    fn block_for_timeout(&self) -> io::Error {
        let timeout = self.timeout.lock().unwrap().unwrap_or(POLL_INTERVAL);
        thread::sleep(timeout);
        io::Error::from(io::ErrorKind::WouldBlock)
    }
}

impl TimedRead for ScriptedSource {
    fn read_timeout(&self) -> io::Result<Option<Duration>> {
        Ok(*self.timeout.lock().unwrap())
    }

    fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        *self.timeout.lock().unwrap() = timeout;
        self.timeouts_seen.lock().unwrap().push(timeout);
        Ok(())
    }

    fn read_some(&self, buf: &mut [u8]) -> io::Result<usize> {
        let step = self.steps.lock().unwrap().pop_front();
        match step {
            Some(Step::Data(mut bytes)) => {
                let n = buf.len().min(bytes.len());
                buf[..n].copy_from_slice(&bytes[..n]);
                if n < bytes.len() {
                    let rest = bytes.split_off(n);
                    self.steps.lock().unwrap().push_front(Step::Data(rest));
                }
                Ok(n)
            }
            Some(Step::Timeout) => Err(self.block_for_timeout()),
            Some(Step::Error(kind)) => Err(io::Error::from(kind)),
            None if self.silent_when_drained => Err(self.block_for_timeout()),
            None => Ok(0),
        }
    }
}

impl Write for &ScriptedSource {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.written.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
