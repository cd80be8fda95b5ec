//! Background embedding refresh
//!
//! After an update changes a memory's text, its embedding is recomputed off
//! the request path. Jobs go through a bounded queue drained by a fixed pool
//! of workers:
//!
//! - queue full: the new job is rejected and counted, the caller is not blocked
//! - write failure: retried with exponential backoff up to `max_attempts`,
//!   then logged and dropped
//! - concurrent jobs for one memory: last write wins

use super::backend::MemoryBackend;
use super::types::Id;
use crate::config::RefreshConfig;
use crate::embedding::Embedder;
use crate::error::Error;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

/// A pending embedding recomputation
#[derive(Debug, Clone)]
pub struct RefreshJob {
    pub memory_id: Id,
    pub text: String,
}

#[derive(Default)]
struct Counters {
    scheduled: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    rejected: AtomicU64,
}

/// Snapshot of refresh counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RefreshStats {
    pub scheduled: u64,
    pub completed: u64,
    pub failed: u64,
    pub rejected: u64,
}

impl RefreshStats {
    /// Accepted jobs not yet finished
    pub fn in_flight(&self) -> u64 {
        self.scheduled.saturating_sub(self.completed + self.failed)
    }
}

/// Handle to the refresh worker pool
#[derive(Clone)]
pub struct EmbeddingRefresher {
    sender: mpsc::Sender<RefreshJob>,
    counters: Arc<Counters>,
    workers: Arc<std::sync::Mutex<Vec<JoinHandle<()>>>>,
}

impl EmbeddingRefresher {
    /// Spawn the worker pool. Must be called inside a Tokio runtime.
    pub fn start(backend: Arc<dyn MemoryBackend>, embedder: Embedder, config: &RefreshConfig) -> Self {
        let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));
        let receiver = Arc::new(Mutex::new(receiver));
        let counters = Arc::new(Counters::default());

        let handles: Vec<JoinHandle<()>> = (0..config.workers.max(1))
            .map(|worker| {
                let worker_ctx = Worker {
                    id: worker,
                    backend: backend.clone(),
                    embedder: embedder.clone(),
                    counters: counters.clone(),
                    max_attempts: config.max_attempts.max(1),
                    retry_base: Duration::from_millis(config.retry_base_ms),
                };
                let receiver = receiver.clone();
                tokio::spawn(async move { worker_ctx.run(receiver).await })
            })
            .collect();

        tracing::debug!(
            workers = config.workers,
            capacity = config.queue_capacity,
            "Embedding refresher started"
        );

        Self {
            sender,
            counters,
            workers: Arc::new(std::sync::Mutex::new(handles)),
        }
    }

    /// Enqueue a job without waiting. Returns false if it was rejected.
    pub fn schedule(&self, job: RefreshJob) -> bool {
        let memory_id = job.memory_id;
        // Count first: a worker may finish the job before try_send returns.
        self.counters.scheduled.fetch_add(1, Ordering::SeqCst);
        let result = self.sender.try_send(job);
        if result.is_err() {
            self.counters.scheduled.fetch_sub(1, Ordering::SeqCst);
        }
        match result {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.counters.rejected.fetch_add(1, Ordering::SeqCst);
                tracing::warn!(memory = %memory_id, "Refresh queue full, embedding update dropped");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.counters.rejected.fetch_add(1, Ordering::SeqCst);
                tracing::warn!(memory = %memory_id, "Refresh pool stopped, embedding update dropped");
                false
            }
        }
    }

    /// Current counters
    pub fn stats(&self) -> RefreshStats {
        // Finished counters are read before `scheduled` so a snapshot never
        // shows more finished than scheduled jobs.
        let completed = self.counters.completed.load(Ordering::SeqCst);
        let failed = self.counters.failed.load(Ordering::SeqCst);
        let rejected = self.counters.rejected.load(Ordering::SeqCst);
        RefreshStats {
            scheduled: self.counters.scheduled.load(Ordering::SeqCst),
            completed,
            failed,
            rejected,
        }
    }

    /// Wait until no accepted job is outstanding. Returns false on timeout.
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.stats().in_flight() == 0 {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    /// Abort the workers. Jobs still queued are discarded.
    pub async fn shutdown(&self) {
        let handles: Vec<JoinHandle<()>> = match self.workers.lock() {
            Ok(mut guard) => guard.drain(..).collect(),
            Err(poisoned) => poisoned.into_inner().drain(..).collect(),
        };
        for handle in &handles {
            handle.abort();
        }
        let _ = futures::future::join_all(handles).await;
        tracing::debug!("Embedding refresher stopped");
    }
}

struct Worker {
    id: usize,
    backend: Arc<dyn MemoryBackend>,
    embedder: Embedder,
    counters: Arc<Counters>,
    max_attempts: u32,
    retry_base: Duration,
}

impl Worker {
    async fn run(self, receiver: Arc<Mutex<mpsc::Receiver<RefreshJob>>>) {
        loop {
            let job = { receiver.lock().await.recv().await };
            let Some(job) = job else {
                tracing::debug!(worker = self.id, "Refresh queue closed");
                return;
            };
            self.process(job).await;
        }
    }

    async fn process(&self, job: RefreshJob) {
        let embedding = self.embedder.embed(&job.text).await;

        for attempt in 1..=self.max_attempts {
            match self.backend.set_embedding(job.memory_id, embedding.clone()).await {
                Ok(()) => {
                    self.counters.completed.fetch_add(1, Ordering::SeqCst);
                    tracing::debug!(memory = %job.memory_id, attempt, "Embedding refreshed");
                    return;
                }
                Err(Error::NotFound(_)) => {
                    self.counters.failed.fetch_add(1, Ordering::SeqCst);
                    tracing::warn!(memory = %job.memory_id, "Memory gone, embedding update dropped");
                    return;
                }
                Err(e) if attempt < self.max_attempts => {
                    let delay = self.retry_base * 2u32.saturating_pow(attempt - 1);
                    tracing::warn!(
                        memory = %job.memory_id,
                        attempt,
                        error = %e,
                        delay_ms = delay.as_millis() as u64,
                        "Embedding write failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    self.counters.failed.fetch_add(1, Ordering::SeqCst);
                    tracing::error!(
                        memory = %job.memory_id,
                        attempts = self.max_attempts,
                        error = %e,
                        "Embedding refresh gave up"
                    );
                }
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::MemoryConfig;
    use crate::crypto::StoredText;
    use crate::embedding::fallback_embedding;
    use crate::error::Result;
    use crate::memory::backend::InMemoryBackend;
    use crate::memory::types::{Folder, FolderSummary, MemoryRecord, NewMemory, RecordChanges};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::AtomicU32;

    /// Backend wrapper that fails the first `fail_writes` embedding writes
    /// and, optionally, every nearest-neighbour query.
    pub(crate) struct FlakyBackend {
        pub inner: InMemoryBackend,
        pub fail_writes: AtomicU32,
        pub fail_search: bool,
        pub write_delay: Option<Duration>,
    }

    impl FlakyBackend {
        pub fn new(fail_writes: u32) -> Self {
            Self {
                inner: InMemoryBackend::new(),
                fail_writes: AtomicU32::new(fail_writes),
                fail_search: false,
                write_delay: None,
            }
        }
    }

    #[async_trait]
    impl MemoryBackend for FlakyBackend {
        async fn ensure_folder(&self, owner: Id, name: &str) -> Result<Folder> {
            self.inner.ensure_folder(owner, name).await
        }
        async fn folders(&self, owner: Id) -> Result<Vec<FolderSummary>> {
            self.inner.folders(owner).await
        }
        async fn insert(&self, memory: NewMemory) -> Result<MemoryRecord> {
            self.inner.insert(memory).await
        }
        async fn get(&self, id: Id) -> Result<Option<MemoryRecord>> {
            self.inner.get(id).await
        }
        async fn apply(&self, id: Id, changes: RecordChanges) -> Result<MemoryRecord> {
            self.inner.apply(id, changes).await
        }
        async fn set_embedding(&self, id: Id, embedding: Vec<f32>) -> Result<()> {
            if let Some(delay) = self.write_delay {
                tokio::time::sleep(delay).await;
            }
            let remaining = self.fail_writes.load(Ordering::SeqCst);
            if remaining > 0 {
                self.fail_writes.store(remaining - 1, Ordering::SeqCst);
                return Err(Error::Storage("disk on fire".to_string()));
            }
            self.inner.set_embedding(id, embedding).await
        }
        async fn nearest(&self, owner: Id, query: &[f32], limit: usize) -> Result<Vec<(MemoryRecord, f32)>> {
            if self.fail_search {
                return Err(Error::Storage("index unavailable".to_string()));
            }
            self.inner.nearest(owner, query, limit).await
        }
        async fn recent(&self, owner: Id, folder: Option<&str>, limit: usize) -> Result<Vec<MemoryRecord>> {
            self.inner.recent(owner, folder, limit).await
        }
        fn name(&self) -> &str {
            "flaky"
        }
    }

    fn embedder() -> Embedder {
        Embedder::offline(&MemoryConfig {
            embedding_dimension: 8,
            fallback_components: 8,
            ..Default::default()
        })
    }

    fn config(workers: usize, capacity: usize) -> RefreshConfig {
        RefreshConfig {
            queue_capacity: capacity,
            workers,
            max_attempts: 3,
            retry_base_ms: 1,
        }
    }

    async fn seed(backend: &dyn MemoryBackend) -> Id {
        let folder = backend.ensure_folder(Id(1), "Семья").await.unwrap();
        backend
            .insert(NewMemory {
                owner_id: Id(1),
                folder_id: folder.id,
                title: StoredText::plain("old"),
                content: StoredText::plain("old"),
                embedding: vec![0.0; 8],
                created_at: Utc::now(),
            })
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn test_job_updates_embedding() {
        let backend = Arc::new(InMemoryBackend::new());
        let id = seed(backend.as_ref()).await;
        let refresher = EmbeddingRefresher::start(backend.clone(), embedder(), &config(2, 16));

        assert!(refresher.schedule(RefreshJob {
            memory_id: id,
            text: "new text".to_string(),
        }));
        assert!(refresher.wait_idle(Duration::from_secs(2)).await);

        let record = backend.get(id).await.unwrap().unwrap();
        assert_eq!(record.embedding, Some(fallback_embedding("new text", 8, 8)));
        assert_eq!(refresher.stats().completed, 1);
        refresher.shutdown().await;
    }

    #[tokio::test]
    async fn test_retries_then_succeeds() {
        let backend = Arc::new(FlakyBackend::new(2));
        let id = seed(backend.as_ref()).await;
        let refresher = EmbeddingRefresher::start(backend.clone(), embedder(), &config(1, 4));

        refresher.schedule(RefreshJob {
            memory_id: id,
            text: "x".to_string(),
        });
        assert!(refresher.wait_idle(Duration::from_secs(2)).await);
        let stats = refresher.stats();
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.failed, 0);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let backend = Arc::new(FlakyBackend::new(10));
        let id = seed(backend.as_ref()).await;
        let refresher = EmbeddingRefresher::start(backend.clone(), embedder(), &config(1, 4));

        refresher.schedule(RefreshJob {
            memory_id: id,
            text: "x".to_string(),
        });
        assert!(refresher.wait_idle(Duration::from_secs(2)).await);
        assert_eq!(refresher.stats().failed, 1);
        // three attempts consumed three injected failures
        assert_eq!(backend.fail_writes.load(Ordering::SeqCst), 7);
        assert_eq!(backend.get(id).await.unwrap().unwrap().embedding, Some(vec![0.0; 8]));
    }

    #[tokio::test]
    async fn test_missing_memory_not_retried() {
        let backend = Arc::new(InMemoryBackend::new());
        let refresher = EmbeddingRefresher::start(backend, embedder(), &config(1, 4));
        refresher.schedule(RefreshJob {
            memory_id: Id(404),
            text: "x".to_string(),
        });
        assert!(refresher.wait_idle(Duration::from_secs(2)).await);
        assert_eq!(refresher.stats().failed, 1);
    }

    #[tokio::test]
    async fn test_full_queue_rejects_new_jobs() {
        let mut slow = FlakyBackend::new(0);
        slow.write_delay = Some(Duration::from_millis(200));
        let backend = Arc::new(slow);
        let id = seed(backend.as_ref()).await;
        let refresher = EmbeddingRefresher::start(backend, embedder(), &config(1, 1));

        let accepted = (0..10)
            .filter(|i| {
                refresher.schedule(RefreshJob {
                    memory_id: id,
                    text: format!("v{}", i),
                })
            })
            .count();

        let stats = refresher.stats();
        assert!(accepted < 10);
        assert_eq!(stats.scheduled as usize, accepted);
        assert_eq!(stats.rejected as usize, 10 - accepted);
        refresher.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_finished_never_exceeds_scheduled() {
        let backend = Arc::new(InMemoryBackend::new());
        let id = seed(backend.as_ref()).await;
        let refresher = EmbeddingRefresher::start(backend, embedder(), &config(4, 512));

        for i in 0..300 {
            refresher.schedule(RefreshJob {
                memory_id: id,
                text: format!("v{}", i),
            });
            let stats = refresher.stats();
            assert!(stats.completed + stats.failed <= stats.scheduled, "{:?}", stats);
        }
        assert!(refresher.wait_idle(Duration::from_secs(5)).await);
        let stats = refresher.stats();
        assert_eq!(stats.scheduled, 300);
        assert_eq!(stats.completed, 300);
        refresher.shutdown().await;
    }

    #[test]
    fn test_in_flight() {
        let stats = RefreshStats {
            scheduled: 5,
            completed: 2,
            failed: 1,
            rejected: 9,
        };
        assert_eq!(stats.in_flight(), 2);
    }
}
