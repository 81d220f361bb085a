//! Single-concurrency work queue
//!
//! Jobs run one at a time in arrival order (the underlying tokio mutex is
//! fair). The priority is recorded in logs only; it never reorders jobs.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::Mutex;
use tracing::trace;

/// Ordering hint of a queued job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    Read,
    Write,
}

pub struct SerialQueue {
    name: &'static str,
    lock: Mutex<()>,
    waiting: AtomicUsize,
}

impl SerialQueue {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            lock: Mutex::new(()),
            waiting: AtomicUsize::new(0),
        }
    }

    /// Run `job` once every earlier job has finished.
    ///
    /// The future is not polled before its turn.
    pub async fn run<Fut, T>(&self, priority: Priority, job: Fut) -> T
    where
        Fut: Future<Output = T>,
    {
        let depth = self.waiting.fetch_add(1, Ordering::SeqCst);
        trace!(
            queue = self.name,
            ?priority,
            depth,
            "[Queue] Job enqueued"
        );
        let _guard = self.lock.lock().await;
        self.waiting.fetch_sub(1, Ordering::SeqCst);
        job.await
    }

    /// Jobs waiting for their turn.
    pub fn pending(&self) -> usize {
        self.waiting.load(Ordering::SeqCst)
    }
}
