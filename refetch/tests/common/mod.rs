//! Shared helpers for request cache integration tests.

#![allow(dead_code)]

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;
use refetch::{
    BackoffBase, CacheKey, CancellationToken, FetchOptions, MaxAttempts, Producer, RequestCache,
};
use tokio::time::Instant;

/// Error returned by test producers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError(pub &'static str);

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "api error: {}", self.0)
    }
}

impl std::error::Error for ApiError {}

pub type Cache = RequestCache<String, ApiError>;

pub fn key(id: u32) -> CacheKey {
    CacheKey::builder("item").part("id", id).build()
}

pub fn ms(millis: u64) -> Duration {
    Duration::from_millis(millis)
}

/// Options with the given TTL, attempts and backoff base.
pub fn options(ttl: Duration, attempts: u8, backoff: Duration) -> FetchOptions {
    FetchOptions::builder()
        .ttl(ttl)
        .max_attempts(MaxAttempts::new(attempts).unwrap())
        .backoff_base(BackoffBase::new(backoff).unwrap())
        .build()
}

/// One minute TTL, a single attempt.
pub fn once() -> FetchOptions {
    options(Duration::from_secs(60), 1, ms(10))
}

/// Lets spawned tasks reach their first await point.
pub async fn let_tasks_run() {
    tokio::time::sleep(ms(1)).await;
}

type Respond = dyn Fn(u32) -> Result<String, ApiError> + Send + Sync;

struct Inner {
    calls: AtomicU32,
    delay: Duration,
    respond: Box<Respond>,
    invoked_at: Mutex<Vec<Instant>>,
    signals: Mutex<Vec<CancellationToken>>,
}

/// A producer that counts invocations and answers after a fixed delay.
///
/// `respond` receives the 1-based invocation number.
#[derive(Clone)]
pub struct Counting {
    inner: Arc<Inner>,
}

impl Counting {
    pub fn new(
        delay: Duration,
        respond: impl Fn(u32) -> Result<String, ApiError> + Send + Sync + 'static,
    ) -> Self {
        Counting {
            inner: Arc::new(Inner {
                calls: AtomicU32::new(0),
                delay,
                respond: Box::new(respond),
                invoked_at: Mutex::new(Vec::new()),
                signals: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Succeeds with `payload-{n}`.
    pub fn ok(delay: Duration) -> Self {
        Self::new(delay, |n| Ok(format!("payload-{n}")))
    }

    /// Always fails.
    pub fn failing(delay: Duration) -> Self {
        Self::new(delay, |_| Err(ApiError("down")))
    }

    /// Fails the first `failures` invocations, then succeeds.
    pub fn flaky(delay: Duration, failures: u32) -> Self {
        Self::new(delay, move |n| {
            if n <= failures {
                Err(ApiError("flaky"))
            } else {
                Ok(format!("payload-{n}"))
            }
        })
    }

    pub fn calls(&self) -> u32 {
        self.inner.calls.load(Ordering::SeqCst)
    }

    pub fn invoked_at(&self) -> Vec<Instant> {
        self.inner.invoked_at.lock().unwrap().clone()
    }

    /// Cancellation token handed to the most recent invocation.
    pub fn last_signal(&self) -> CancellationToken {
        self.inner
            .signals
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("producer was never invoked")
    }
}

impl Producer for Counting {
    type Output = String;
    type Error = ApiError;
    type Future = BoxFuture<'static, Result<String, ApiError>>;

    fn produce(&self, signal: CancellationToken) -> Self::Future {
        let n = self.inner.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.invoked_at.lock().unwrap().push(Instant::now());
        self.inner.signals.lock().unwrap().push(signal.clone());
        let outcome = (self.inner.respond)(n);
        let delay = self.inner.delay;
        Box::pin(async move {
            if delay.is_zero() {
                return outcome;
            }
            tokio::select! {
                _ = signal.cancelled() => Err(ApiError("aborted")),
                _ = tokio::time::sleep(delay) => outcome,
            }
        })
    }
}

/// Installs a test subscriber honouring `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
