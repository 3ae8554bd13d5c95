//! Bounded chunk I/O worker pool
//!
//! Chunk operations are blocking file system calls. They are handed to a
//! fixed set of OS threads over a `crossbeam-channel` queue; the async
//! caller is resumed through a `oneshot` once its job has run. Fan-out of a
//! multi-chunk request is `run_all`, which joins every sub-operation before
//! returning.

use crossbeam_channel::{Receiver, Sender};
use futures::future::join_all;
use scatterfs_common::{Error, Result};
use std::panic::{self, AssertUnwindSafe};
use std::thread::JoinHandle;
use tokio::sync::oneshot;
use tracing::{debug, warn};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Fixed-size pool of I/O threads
pub struct IoPool {
    sender: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

impl IoPool {
    /// Start `workers` I/O threads
    pub fn new(workers: usize) -> Result<Self> {
        if workers == 0 {
            return Err(Error::Configuration(
                "I/O pool needs at least one worker".into(),
            ));
        }

        let (sender, receiver) = crossbeam_channel::unbounded::<Job>();
        let mut handles = Vec::with_capacity(workers);
        for idx in 0..workers {
            let receiver: Receiver<Job> = receiver.clone();
            let handle = std::thread::Builder::new()
                .name(format!("scatterfs-io-{idx}"))
                .spawn(move || {
                    while let Ok(job) = receiver.recv() {
                        // a panicking job drops its result sender, which fails only its waiter
                        if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
                            warn!("Chunk I/O job panicked");
                        }
                    }
                })?;
            handles.push(handle);
        }
        debug!("Started {} chunk I/O workers", workers);

        Ok(Self {
            sender: Some(sender),
            workers: handles,
        })
    }

    /// Number of worker threads
    pub fn workers(&self) -> usize {
        self.workers.len()
    }

    /// Run one blocking job on the pool and wait for its result
    pub async fn run<F, T>(&self, job: F) -> Result<T>
    where
        F: FnOnce() -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let sender = self
            .sender
            .as_ref()
            .ok_or_else(|| Error::internal("I/O pool is shut down"))?;

        let (tx, rx) = oneshot::channel();
        sender
            .send(Box::new(move || {
                // the waiter may have gone away; nothing to report to then
                let _ = tx.send(job());
            }))
            .map_err(|_| Error::internal("I/O pool is shut down"))?;

        rx.await
            .map_err(|_| Error::internal("I/O job panicked before returning"))?
    }

    /// Run all jobs concurrently and return their results in input order
    pub async fn run_all<F, T>(&self, jobs: Vec<F>) -> Vec<Result<T>>
    where
        F: FnOnce() -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        join_all(jobs.into_iter().map(|job| self.run(job))).await
    }
}

impl Drop for IoPool {
    fn drop(&mut self) {
        // closing the queue lets workers drain and exit
        self.sender.take();
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                warn!("Chunk I/O worker panicked");
            }
        }
    }
}

/// Fold per-chunk byte counts into one total.
///
/// Any failed piece fails the whole operation. Pieces that already
/// succeeded stay applied.
pub fn sum_transferred(results: Vec<Result<u64>>) -> Result<u64> {
    let mut total = 0u64;
    let mut first_err = None;
    let mut failed = 0usize;
    for result in results {
        match result {
            Ok(n) => total += n,
            Err(e) => {
                failed += 1;
                first_err.get_or_insert(e);
            }
        }
    }
    match first_err {
        None => Ok(total),
        Some(e) => {
            warn!(
                failed,
                completed_bytes = total,
                "Chunk operation failed partially: {e}"
            );
            Err(e)
        }
    }
}
