//! Bounded worker pool for connection handlers.
//!
//! A fixed set of named worker threads drains one bounded `crossbeam`
//! channel. Submitting never blocks: when every worker is busy and the queue
//! is full the job is dropped and the caller logs the rejection.

use crossbeam::channel::{bounded, Receiver, Sender, TrySendError};
use std::io;
use std::thread::{self, JoinHandle};
use tracing::{debug, error};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Why a job was not queued. The job is dropped along with anything it owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Rejected {
    /// Every worker is busy and the queue is at capacity
    #[error("worker pool saturated")]
    Full,
    /// The pool has shut down
    #[error("worker pool closed")]
    Closed,
}

/// `workers` threads fed by a queue of `workers` slots.
pub struct WorkerPool {
    sender: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `size` workers named `<name>-<index>`.
    pub fn new(name: &str, size: usize) -> io::Result<Self> {
        let size = size.max(1);
        let (sender, receiver) = bounded::<Job>(size);

        let mut workers = Vec::with_capacity(size);
        for index in 0..size {
            let receiver = receiver.clone();
            workers.push(
                thread::Builder::new()
                    .name(format!("{name}-{index}"))
                    .spawn(move || worker_loop(receiver))?,
            );
        }

        debug!(name, size, "worker pool started");
        Ok(Self {
            sender: Some(sender),
            workers,
        })
    }

    /// Queue `job` without blocking.
    pub fn try_submit<F>(&self, job: F) -> Result<(), Rejected>
    where
        F: FnOnce() + Send + 'static,
    {
        let Some(sender) = &self.sender else {
            return Err(Rejected::Closed);
        };
        match sender.try_send(Box::new(job)) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(Rejected::Full),
            Err(TrySendError::Disconnected(_)) => Err(Rejected::Closed),
        }
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Stop accepting jobs and wait for the workers to finish queued work.
    pub fn join(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.sender.take();
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

fn worker_loop(receiver: Receiver<Job>) {
    while let Ok(job) = receiver.recv() {
        job();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam::channel::unbounded;
    use std::time::Duration;

    #[test]
    fn test_runs_submitted_jobs() {
        let pool = WorkerPool::new("test", 2).unwrap();
        let (tx, rx) = unbounded();
        for i in 0..2 {
            let tx = tx.clone();
            pool.try_submit(move || tx.send(i).unwrap()).unwrap();
        }

        let mut seen: Vec<i32> = (0..2)
            .map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap())
            .collect();
        seen.sort();
        assert_eq!(seen, vec![0, 1]);
        assert_eq!(pool.size(), 2);
    }

    #[test]
    fn test_rejects_when_saturated() {
        let pool = WorkerPool::new("test", 1).unwrap();
        let (started_tx, started_rx) = unbounded();
        let (release_tx, release_rx) = unbounded::<()>();

        // Occupy the only worker.
        let release = release_rx.clone();
        pool.try_submit(move || {
            started_tx.send(()).unwrap();
            release.recv().unwrap();
        })
        .unwrap();
        started_rx.recv_timeout(Duration::from_secs(5)).unwrap();

        // Fill the single queue slot.
        let release = release_rx.clone();
        pool.try_submit(move || release.recv().unwrap()).unwrap();

        let rejected = pool.try_submit(|| {});
        assert_eq!(rejected, Err(Rejected::Full));

        release_tx.send(()).unwrap();
        release_tx.send(()).unwrap();
        pool.join();
    }
}
