#![doc = include_str!("../README.md")]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

/// The request cache engine.
///
/// [`RequestCache`] deduplicates concurrent fetches of the same key, stores
/// payloads with a TTL, serves stale payloads while refreshing them in the
/// background, and retries failed producers with linear backoff.
pub mod cache;

/// Cache-wide configuration.
pub mod config;

/// Metrics collection for cache observability.
///
/// When the `metrics` feature is enabled, this module provides counters
/// and histograms for:
/// - Hits, misses, stale reads and joined fetches
/// - Producer attempts and retries
/// - Request settlement and background task timing
pub mod metrics;

/// Background task offloading for stale-while-revalidate.
///
/// Stale reads are answered immediately while the refresh runs on the
/// [`OffloadManager`](offload::OffloadManager).
pub mod offload;

/// Subscription handles returned by fetch operations.
pub mod subscription;

mod inflight;
mod retry;
mod store;

pub use cache::{RequestCache, RequestCacheBuilder};
pub use config::CacheConfig;
pub use subscription::{Revalidation, Subscription};

pub use refetch_core::{
    BackoffBase, CacheEntry, CacheKey, CacheStatus, CancellationToken, EntryState, FetchError,
    FetchOptions, FetchOptionsBuilder, FetchResult, InvalidKeyError, KeyBuilder, KeyPart,
    MaxAttempts, OptionsError, Producer,
};

/// The `refetch` prelude.
///
/// ```rust
/// use refetch::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        CacheKey, CancellationToken, FetchError, FetchOptions, Producer, RequestCache,
        Subscription,
    };
}
