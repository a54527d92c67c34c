//! OffloadManager implementation for background task execution.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use smol_str::SmolStr;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info_span, warn};

use super::policy::{OffloadConfig, TimeoutPolicy};

#[cfg(feature = "metrics")]
use crate::metrics::{
    OFFLOAD_TASK_DURATION, OFFLOAD_TASKS_ACTIVE, OFFLOAD_TASKS_COMPLETED, OFFLOAD_TASKS_SPAWNED,
    OFFLOAD_TASKS_TIMEOUT,
};

/// Key identifying one offloaded task.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OffloadKey {
    /// Kind of the task (e.g. "revalidate").
    pub kind: SmolStr,
    /// Unique identifier within the manager.
    pub id: u64,
}

impl fmt::Display for OffloadKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.kind, self.id)
    }
}

/// Handle to a spawned offload task.
#[derive(Debug)]
pub struct OffloadHandle {
    handle: JoinHandle<()>,
}

impl OffloadHandle {
    /// Check if the task is finished.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Abort the task.
    pub fn abort(&self) {
        self.handle.abort();
    }
}

const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Debug)]
struct OffloadManagerInner {
    config: OffloadConfig,
    tasks: DashMap<OffloadKey, OffloadHandle>,
    key_counter: AtomicU64,
}

/// Manager for offloading tasks to background execution.
///
/// The request cache uses it to run stale-while-revalidate refreshes. Tasks
/// are tracked until they finish, so callers can wait for or abort them.
#[derive(Clone, Debug)]
pub struct OffloadManager {
    inner: Arc<OffloadManagerInner>,
}

impl OffloadManager {
    /// Create a new OffloadManager with the given configuration.
    pub fn new(config: OffloadConfig) -> Self {
        Self {
            inner: Arc::new(OffloadManagerInner {
                config,
                tasks: DashMap::new(),
                key_counter: AtomicU64::new(0),
            }),
        }
    }

    /// Create a new OffloadManager with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(OffloadConfig::default())
    }

    /// Returns the configuration this manager was built with.
    pub fn config(&self) -> &OffloadConfig {
        &self.inner.config
    }

    fn next_key(&self, kind: impl Into<SmolStr>) -> OffloadKey {
        let id = self.inner.key_counter.fetch_add(1, Ordering::Relaxed);
        OffloadKey {
            kind: kind.into(),
            id,
        }
    }

    /// Spawn a task of the given kind.
    ///
    /// The kind is used for metrics labels and tracing.
    pub fn spawn<F>(&self, kind: impl Into<SmolStr>, task: F) -> OffloadKey
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let key = self.next_key(kind);
        debug!(%key, "spawning offload task");

        let handle = self.spawn_inner(task, key.clone());
        self.inner.tasks.insert(key.clone(), handle);

        #[cfg(feature = "metrics")]
        {
            metrics::counter!(*OFFLOAD_TASKS_SPAWNED, "kind" => key.kind.to_string()).increment(1);
            metrics::gauge!(*OFFLOAD_TASKS_ACTIVE, "kind" => key.kind.to_string()).increment(1.0);
        }

        key
    }

    /// Get the number of currently active tasks.
    pub fn active_task_count(&self) -> usize {
        self.inner.tasks.iter().filter(|e| !e.is_finished()).count()
    }

    /// Clean up finished task handles.
    pub fn cleanup_finished(&self) {
        self.inner.tasks.retain(|_, handle| !handle.is_finished());
    }

    /// Cancel all running tasks.
    pub fn cancel_all(&self) {
        for entry in self.inner.tasks.iter() {
            entry.abort();
        }
    }

    /// Cancel a specific task by key.
    pub fn cancel(&self, key: &OffloadKey) -> bool {
        if let Some(entry) = self.inner.tasks.get(key) {
            entry.abort();
            true
        } else {
            false
        }
    }

    /// Check if a task with the given key is in flight.
    pub fn is_in_flight(&self, key: &OffloadKey) -> bool {
        self.inner.tasks.get(key).is_some_and(|h| !h.is_finished())
    }

    /// Wait for all currently tracked tasks to complete.
    ///
    /// Polls with a short sleep rather than `yield_now` so that a paused test
    /// clock can still auto-advance while waiting.
    pub async fn wait_all(&self) {
        loop {
            self.cleanup_finished();

            if self.inner.tasks.is_empty() {
                break;
            }

            tokio::time::sleep(WAIT_POLL_INTERVAL).await;
        }
    }

    /// Wait for all tasks with a timeout.
    ///
    /// Returns `true` if all tasks completed within the timeout,
    /// `false` if the timeout was reached.
    pub async fn wait_all_timeout(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.wait_all()).await.is_ok()
    }

    fn spawn_inner<F>(&self, task: F, key: OffloadKey) -> OffloadHandle
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let timeout_policy = self.inner.config.timeout_policy.clone();
        let inner = self.inner.clone();

        let span = info_span!("offload_task", kind = %key.kind, id = key.id);

        let handle = match timeout_policy {
            TimeoutPolicy::None => tokio::spawn(
                async move {
                    let start = Instant::now();
                    task.await;
                    inner.tasks.remove(&key);
                    Self::record_completion(start, &key);
                }
                .instrument(span),
            ),
            TimeoutPolicy::Cancel(duration) => tokio::spawn(
                async move {
                    let start = Instant::now();
                    match tokio::time::timeout(duration, task).await {
                        Ok(()) => Self::record_completion(start, &key),
                        Err(_) => {
                            warn!(%key, "Offload task cancelled due to timeout");
                            Self::record_timeout(start, &key);
                        }
                    }
                    inner.tasks.remove(&key);
                }
                .instrument(span),
            ),
            TimeoutPolicy::Warn(duration) => tokio::spawn(
                async move {
                    let start = Instant::now();
                    task.await;
                    let elapsed = start.elapsed();
                    if elapsed > duration {
                        warn!(
                            %key,
                            elapsed_ms = elapsed.as_millis(),
                            threshold_ms = duration.as_millis(),
                            "Offload task exceeded timeout threshold"
                        );
                    }
                    inner.tasks.remove(&key);
                    Self::record_completion(start, &key);
                }
                .instrument(span),
            ),
        };

        OffloadHandle { handle }
    }

    #[cfg(feature = "metrics")]
    fn record_completion(start: Instant, key: &OffloadKey) {
        let duration = start.elapsed().as_secs_f64();
        let kind = key.kind.to_string();
        metrics::counter!(*OFFLOAD_TASKS_COMPLETED, "kind" => kind.clone()).increment(1);
        metrics::gauge!(*OFFLOAD_TASKS_ACTIVE, "kind" => kind.clone()).decrement(1.0);
        metrics::histogram!(*OFFLOAD_TASK_DURATION, "kind" => kind).record(duration);
    }

    #[cfg(not(feature = "metrics"))]
    fn record_completion(_start: Instant, _key: &OffloadKey) {}

    #[cfg(feature = "metrics")]
    fn record_timeout(start: Instant, key: &OffloadKey) {
        let duration = start.elapsed().as_secs_f64();
        let kind = key.kind.to_string();
        metrics::counter!(*OFFLOAD_TASKS_TIMEOUT, "kind" => kind.clone()).increment(1);
        metrics::gauge!(*OFFLOAD_TASKS_ACTIVE, "kind" => kind.clone()).decrement(1.0);
        metrics::histogram!(*OFFLOAD_TASK_DURATION, "kind" => kind).record(duration);
    }

    #[cfg(not(feature = "metrics"))]
    fn record_timeout(_start: Instant, _key: &OffloadKey) {}
}

impl Default for OffloadManager {
    fn default() -> Self {
        Self::with_defaults()
    }
}
