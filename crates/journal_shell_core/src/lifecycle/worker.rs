//! Background worker pool for long-running loads.
//!
//! # Invariants
//! - Jobs run on pool threads, never on the owning thread.
//! - A panicking job is logged and does not take its worker down.
//! - Dropping the pool closes the queue and joins every worker.

use crossbeam_channel::{unbounded, Sender};
use log::{debug, error};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread::JoinHandle;

type Job = Box<dyn FnOnce() + Send + 'static>;

#[derive(Debug)]
pub enum WorkerPoolError {
    InvalidSize,
    Spawn(std::io::Error),
    Closed,
}

impl Display for WorkerPoolError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidSize => write!(f, "worker pool needs at least one thread"),
            Self::Spawn(err) => write!(f, "failed to spawn worker thread: {err}"),
            Self::Closed => write!(f, "worker pool is closed"),
        }
    }
}

impl Error for WorkerPoolError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Spawn(err) => Some(err),
            _ => None,
        }
    }
}

pub struct WorkerPool {
    sender: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn new(threads: usize, name: &str) -> Result<Self, WorkerPoolError> {
        if threads == 0 {
            return Err(WorkerPoolError::InvalidSize);
        }

        let (sender, receiver) = unbounded::<Job>();
        let mut workers = Vec::with_capacity(threads);
        for index in 0..threads {
            let receiver = receiver.clone();
            let handle = std::thread::Builder::new()
                .name(format!("{name}-{index}"))
                .spawn(move || {
                    for job in receiver.iter() {
                        if catch_unwind(AssertUnwindSafe(job)).is_err() {
                            error!("event=worker_job module=lifecycle status=error reason=panic");
                        }
                    }
                })
                .map_err(WorkerPoolError::Spawn)?;
            workers.push(handle);
        }

        debug!("event=worker_pool_start module=lifecycle status=ok threads={threads}");
        Ok(Self {
            sender: Some(sender),
            workers,
        })
    }

    pub fn submit(&self, job: impl FnOnce() + Send + 'static) -> Result<(), WorkerPoolError> {
        let sender = self.sender.as_ref().ok_or(WorkerPoolError::Closed)?;
        sender
            .send(Box::new(job))
            .map_err(|_| WorkerPoolError::Closed)
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Stops accepting jobs and waits for queued ones to finish.
    pub fn close(&mut self) {
        if self.sender.take().is_none() {
            return;
        }
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                error!("event=worker_pool_close module=lifecycle status=error reason=join_failed");
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::{WorkerPool, WorkerPoolError};
    use crossbeam_channel::unbounded;
    use std::time::Duration;

    #[test]
    fn runs_jobs_off_the_calling_thread() {
        let pool = WorkerPool::new(2, "test-worker").unwrap();
        let (tx, rx) = unbounded();
        let caller = std::thread::current().id();
        pool.submit(move || {
            tx.send(std::thread::current().id()).unwrap();
        })
        .unwrap();

        let worker = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_ne!(worker, caller);
        assert_eq!(pool.size(), 2);
    }

    #[test]
    fn survives_panicking_job() {
        let pool = WorkerPool::new(1, "test-worker").unwrap();
        pool.submit(|| panic!("boom")).unwrap();
        let (tx, rx) = unbounded();
        pool.submit(move || tx.send(42).unwrap()).unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 42);
    }

    #[test]
    fn rejects_zero_threads_and_closed_submit() {
        assert!(matches!(
            WorkerPool::new(0, "test-worker"),
            Err(WorkerPoolError::InvalidSize)
        ));
        let mut pool = WorkerPool::new(1, "test-worker").unwrap();
        pool.close();
        assert!(matches!(pool.submit(|| {}), Err(WorkerPoolError::Closed)));
    }
}
