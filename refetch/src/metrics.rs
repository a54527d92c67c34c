//! Metrics declaration and recording helpers.
//!
//! With the `metrics` feature disabled every helper is an empty inline
//! function and the calls compile away.

use refetch_core::CacheStatus;

#[cfg(feature = "metrics")]
use lazy_static::lazy_static;

#[cfg(feature = "metrics")]
lazy_static! {
    // Lookup metrics

    /// Track number of fetches answered from a fresh entry.
    pub static ref CACHE_HIT_COUNTER: &'static str = {
        metrics::describe_counter!(
            "refetch_cache_hit_total",
            "Total number of fetches served from a fresh cache entry."
        );
        "refetch_cache_hit_total"
    };
    /// Track number of fetches that started a new request.
    pub static ref CACHE_MISS_COUNTER: &'static str = {
        metrics::describe_counter!(
            "refetch_cache_miss_total",
            "Total number of fetches that started a new request."
        );
        "refetch_cache_miss_total"
    };
    /// Track number of fetches answered with stale data.
    pub static ref CACHE_STALE_COUNTER: &'static str = {
        metrics::describe_counter!(
            "refetch_cache_stale_total",
            "Total number of fetches served stale data while revalidating."
        );
        "refetch_cache_stale_total"
    };
    /// Track number of fetches that joined an in-flight request.
    pub static ref CACHE_JOINED_COUNTER: &'static str = {
        metrics::describe_counter!(
            "refetch_cache_joined_total",
            "Total number of fetches deduplicated onto an in-flight request."
        );
        "refetch_cache_joined_total"
    };

    // Producer metrics

    /// Track number of producer invocations.
    pub static ref PRODUCER_ATTEMPTS: &'static str = {
        metrics::describe_counter!(
            "refetch_producer_attempts_total",
            "Total number of producer invocations, retries included."
        );
        "refetch_producer_attempts_total"
    };
    /// Track number of retries scheduled after a failed attempt.
    pub static ref PRODUCER_RETRIES: &'static str = {
        metrics::describe_counter!(
            "refetch_producer_retries_total",
            "Total number of retries scheduled after a failed attempt."
        );
        "refetch_producer_retries_total"
    };
    /// Track settled requests by outcome.
    pub static ref REQUESTS_SETTLED: &'static str = {
        metrics::describe_counter!(
            "refetch_requests_settled_total",
            "Total number of in-flight requests settled, labelled by outcome."
        );
        "refetch_requests_settled_total"
    };
    /// Histogram of in-flight request duration.
    pub static ref REQUEST_DURATION: &'static str = {
        metrics::describe_histogram!(
            "refetch_request_duration_seconds",
            metrics::Unit::Seconds,
            "Duration of in-flight requests in seconds, backoff included."
        );
        "refetch_request_duration_seconds"
    };

    // Offload manager metrics

    /// Track number of offload tasks spawned.
    pub static ref OFFLOAD_TASKS_SPAWNED: &'static str = {
        metrics::describe_counter!(
            "refetch_offload_tasks_spawned_total",
            "Total number of offload tasks spawned."
        );
        "refetch_offload_tasks_spawned_total"
    };
    /// Track number of offload tasks completed.
    pub static ref OFFLOAD_TASKS_COMPLETED: &'static str = {
        metrics::describe_counter!(
            "refetch_offload_tasks_completed_total",
            "Total number of offload tasks completed."
        );
        "refetch_offload_tasks_completed_total"
    };
    /// Track number of offload tasks that timed out.
    pub static ref OFFLOAD_TASKS_TIMEOUT: &'static str = {
        metrics::describe_counter!(
            "refetch_offload_tasks_timeout_total",
            "Total number of offload tasks that timed out."
        );
        "refetch_offload_tasks_timeout_total"
    };
    /// Gauge of currently active offload tasks.
    pub static ref OFFLOAD_TASKS_ACTIVE: &'static str = {
        metrics::describe_gauge!(
            "refetch_offload_tasks_active",
            "Number of currently active offload tasks."
        );
        "refetch_offload_tasks_active"
    };
    /// Histogram of offload task duration.
    pub static ref OFFLOAD_TASK_DURATION: &'static str = {
        metrics::describe_histogram!(
            "refetch_offload_task_duration_seconds",
            metrics::Unit::Seconds,
            "Duration of offload tasks in seconds."
        );
        "refetch_offload_task_duration_seconds"
    };
}

/// How an in-flight request ended, as reported in metrics labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    /// The producer returned a payload.
    Success,
    /// Every attempt failed.
    Failure,
    /// The request was cancelled.
    Cancelled,
    /// The outcome arrived after the request was detached and was dropped.
    Discarded,
}

impl Settlement {
    /// Returns the settlement as a string slice.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Settlement::Success => "success",
            Settlement::Failure => "failure",
            Settlement::Cancelled => "cancelled",
            Settlement::Discarded => "discarded",
        }
    }
}

/// Record how a fetch was served.
#[cfg(feature = "metrics")]
#[inline]
pub fn record_status(status: CacheStatus) {
    let counter = match status {
        CacheStatus::Hit => *CACHE_HIT_COUNTER,
        CacheStatus::Miss => *CACHE_MISS_COUNTER,
        CacheStatus::Stale => *CACHE_STALE_COUNTER,
        CacheStatus::Joined => *CACHE_JOINED_COUNTER,
    };
    metrics::counter!(counter).increment(1);
}

/// No-op version when metrics feature is disabled.
#[cfg(not(feature = "metrics"))]
#[inline]
pub fn record_status(_status: CacheStatus) {}

/// Record one producer invocation; `attempt` is 1-based.
#[cfg(feature = "metrics")]
#[inline]
pub fn record_attempt(attempt: u32) {
    metrics::counter!(*PRODUCER_ATTEMPTS).increment(1);
    if attempt > 1 {
        metrics::counter!(*PRODUCER_RETRIES).increment(1);
    }
}

/// No-op version when metrics feature is disabled.
#[cfg(not(feature = "metrics"))]
#[inline]
pub fn record_attempt(_attempt: u32) {}

/// Record the end of an in-flight request.
#[cfg(feature = "metrics")]
#[inline]
pub fn record_settlement(settlement: Settlement, duration: std::time::Duration) {
    metrics::counter!(*REQUESTS_SETTLED, "outcome" => settlement.as_str()).increment(1);
    metrics::histogram!(*REQUEST_DURATION, "outcome" => settlement.as_str())
        .record(duration.as_secs_f64());
}

/// No-op version when metrics feature is disabled.
#[cfg(not(feature = "metrics"))]
#[inline]
pub fn record_settlement(_settlement: Settlement, _duration: std::time::Duration) {}
