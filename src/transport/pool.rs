//! Fixed-size worker pool for servicing accepted connections.

use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Sender, unbounded};
use tracing::{error, trace};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// A bounded set of worker threads fed from a shared job queue.
///
/// At most `size` jobs run at once; further jobs wait in the queue. Dropping
/// the pool closes the queue, lets workers finish what is queued, and joins them.
#[derive(Debug)]
pub struct WorkerPool {
    jobs: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `size` workers (at least one).
    pub fn new(size: usize, name: &str) -> io::Result<Self> {
        let (jobs, queue) = unbounded::<Job>();

        let mut workers = Vec::with_capacity(size.max(1));
        for index in 0..size.max(1) {
            let queue = queue.clone();
            let worker = thread::Builder::new()
                .name(format!("{name}-{index}"))
                .spawn(move || {
                    while let Ok(job) = queue.recv() {
                        if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
                            error!("worker job panicked");
                        }
                    }
                    trace!("worker exiting");
                })?;
            workers.push(worker);
        }

        Ok(Self {
            jobs: Some(jobs),
            workers,
        })
    }

    /// Number of worker threads
    #[must_use]
    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Queue a job. Returns `false` if the pool is shutting down.
    pub fn execute<F>(&self, job: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        match &self.jobs {
            Some(jobs) => jobs.send(Box::new(job)).is_ok(),
            None => false,
        }
    }

    /// Close the queue and wait for every worker to finish.
    pub fn join(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.jobs.take();
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                error!("worker thread panicked");
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}
