//! Write Pipeline.
//!
//! `sync=true` writes go straight through [`MemoryStore`] and return after
//! the backend acknowledges. `sync=false` writes are handed to a single
//! background worker over a bounded channel, batched up to
//! [`BATCH_SIZE`] per backend call, FIFO with respect to the enqueuing
//! thread. The spec's Open Questions note that exit-hook semantics differ
//! across runtimes; this engine resolves that by requiring callers to invoke
//! [`WritePipeline::shutdown`] explicitly rather than registering a
//! process-exit hook.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::warn;
use uuid::Uuid;

use crate::error::Result;
use crate::memory::{MemoryStore, MemoryType, RememberOptions};

/// Bound on the background write queue. Enqueue blocks (briefly, in
/// practice) rather than drops once this many writes are outstanding.
const QUEUE_CAPACITY: usize = 256;

/// Maximum writes folded into a single `exec_batch` call by the worker.
const BATCH_SIZE: usize = 8;

/// Default timeout passed to an implicit `flush` a caller forgets to bound.
pub const DEFAULT_FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

enum Job {
    Write {
        id: String,
        what: String,
        ty: MemoryType,
        opts: RememberOptions,
    },
    Shutdown,
}

pub struct WritePipeline {
    store: Arc<MemoryStore>,
    tx: mpsc::Sender<Job>,
    pending: Arc<AtomicUsize>,
    notify: Arc<Notify>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl WritePipeline {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        let pending = Arc::new(AtomicUsize::new(0));
        let notify = Arc::new(Notify::new());

        let worker = tokio::spawn(run_worker(rx, store.clone(), pending.clone(), notify.clone()));

        Self {
            store,
            tx,
            pending,
            notify,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// `sync=true` writes through immediately; `sync=false` enqueues and
    /// returns the eventual id right away.
    pub async fn remember(&self, what: &str, ty: MemoryType, opts: RememberOptions) -> Result<String> {
        if opts.sync {
            return self.store.remember(what, ty, opts).await;
        }

        let id = Uuid::new_v4().to_string();
        self.pending.fetch_add(1, Ordering::SeqCst);
        let job = Job::Write {
            id: id.clone(),
            what: what.to_string(),
            ty,
            opts,
        };
        if self.tx.send(job).await.is_err() {
            // Worker is gone (shut down); nothing left to enqueue into.
            self.pending.fetch_sub(1, Ordering::SeqCst);
            warn!("write pipeline worker unavailable, dropping background write");
        }
        Ok(id)
    }

    /// Blocks until the queue drains or `timeout` elapses. Returns whether
    /// the queue was empty when it returned.
    pub async fn flush(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.pending.load(Ordering::SeqCst) == 0 {
                return true;
            }
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return self.pending.load(Ordering::SeqCst) == 0;
            }
            let notified = self.notify.notified();
            tokio::select! {
                _ = notified => {}
                _ = tokio::time::sleep(remaining) => {}
            }
        }
    }

    /// Drains the queue (bounded by `timeout`) and stops the worker. Any
    /// work still outstanding at the deadline is logged and discarded.
    pub async fn shutdown(&self, timeout: Duration) {
        let _ = self.tx.send(Job::Shutdown).await;
        let drained = self.flush(timeout).await;
        if !drained {
            warn!(
                pending = self.pending.load(Ordering::SeqCst),
                "shutdown timed out with background writes still queued; discarding"
            );
        }
        if let Some(handle) = self.worker.lock().await.take() {
            let _ = tokio::time::timeout(timeout, handle).await;
        }
    }
}

async fn run_worker(
    mut rx: mpsc::Receiver<Job>,
    store: Arc<MemoryStore>,
    pending: Arc<AtomicUsize>,
    notify: Arc<Notify>,
) {
    loop {
        let first = match rx.recv().await {
            None | Some(Job::Shutdown) => return,
            Some(Job::Write { id, what, ty, opts }) => (id, what, ty, opts),
        };

        let mut batch = vec![first];
        let mut shutting_down = false;
        while batch.len() < BATCH_SIZE {
            match rx.try_recv() {
                Ok(Job::Write { id, what, ty, opts }) => batch.push((id, what, ty, opts)),
                Ok(Job::Shutdown) => {
                    shutting_down = true;
                    break;
                }
                Err(_) => break,
            }
        }

        let n = batch.len();
        if let Err(err) = store.apply_batch_with_ids(batch).await {
            warn!(%err, "background write batch failed; dropped");
        }
        pending.fetch_sub(n, Ordering::SeqCst);
        notify.notify_waiters();

        if shutting_down {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigStore;
    use crate::time::SystemClock;
    use crate::transport::test_support::MockTransport;
    use crate::transport::Transport;

    fn pipeline() -> (WritePipeline, Arc<dyn Transport>) {
        let transport: Arc<dyn Transport> = Arc::new(MockTransport::new());
        let clock: Arc<dyn crate::time::Clock> = Arc::new(SystemClock);
        let config = Arc::new(ConfigStore::new(transport.clone(), clock.clone()));
        let store = Arc::new(MemoryStore::new(transport.clone(), clock, config));
        (WritePipeline::new(store), transport)
    }

    #[tokio::test]
    async fn sync_write_is_visible_immediately() {
        let (pipeline, _transport) = pipeline();
        let mut opts = RememberOptions::new();
        opts.sync = true;
        let id = pipeline.remember("synchronous", MemoryType::World, opts).await.unwrap();
        assert!(!id.is_empty());
    }

    #[tokio::test]
    async fn background_write_lands_after_flush() {
        let (pipeline, _transport) = pipeline();
        let mut opts = RememberOptions::new();
        opts.sync = false;
        let id = pipeline
            .remember("background", MemoryType::World, opts)
            .await
            .unwrap();
        assert!(!id.is_empty());

        let drained = pipeline.flush(Duration::from_secs(2)).await;
        assert!(drained);
    }

    #[tokio::test]
    async fn shutdown_drains_outstanding_writes() {
        let (pipeline, _transport) = pipeline();
        for _ in 0..20 {
            let mut opts = RememberOptions::new();
            opts.sync = false;
            pipeline.remember("queued", MemoryType::World, opts).await.unwrap();
        }
        pipeline.shutdown(Duration::from_secs(2)).await;
    }
}
