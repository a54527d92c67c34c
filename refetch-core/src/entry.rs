//! Cache entry snapshots.
//!
//! The cache keeps at most one entry per [`CacheKey`](crate::CacheKey). An
//! entry moves through these states:
//!
//! - [`EntryState::Idle`] - nothing is known about the key
//! - [`EntryState::Pending`] - a request is in flight and no payload is stored
//! - [`EntryState::Fresh`] - payload younger than its TTL
//! - [`EntryState::Stale`] - payload older than its TTL; still served, but the
//!   next access triggers a background refetch
//! - [`EntryState::Failed`] - the last request exhausted its retries
//!
//! [`CacheEntry`] is a detached snapshot: mutating it has no effect on the
//! cache.

use std::sync::Arc;

use chrono::{DateTime, Utc};

/// Freshness state of a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EntryState {
    /// No entry and no request in flight.
    #[default]
    Idle,
    /// A request is in flight and nothing usable is stored yet.
    Pending,
    /// Payload is within its TTL.
    Fresh,
    /// Payload has outlived its TTL.
    Stale,
    /// The last request failed after exhausting its retries.
    Failed,
}

impl EntryState {
    /// Returns the state as a string slice.
    #[inline]
    pub const fn as_str(&self) -> &'static str {
        match self {
            EntryState::Idle => "idle",
            EntryState::Pending => "pending",
            EntryState::Fresh => "fresh",
            EntryState::Stale => "stale",
            EntryState::Failed => "failed",
        }
    }
}

/// Snapshot of the cache's record for one key.
#[derive(Debug)]
pub struct CacheEntry<T, E> {
    /// Last successfully fetched payload.
    pub payload: Option<T>,
    /// Wall-clock time the payload was fetched.
    pub fetched_at: Option<DateTime<Utc>>,
    /// Observed state at the time of the snapshot.
    pub state: EntryState,
    /// Last error; only present while `state` is [`EntryState::Failed`].
    pub error: Option<Arc<E>>,
}

impl<T: Clone, E> Clone for CacheEntry<T, E> {
    fn clone(&self) -> Self {
        Self {
            payload: self.payload.clone(),
            fetched_at: self.fetched_at,
            state: self.state,
            error: self.error.clone(),
        }
    }
}

impl<T, E> CacheEntry<T, E> {
    /// Returns `true` if the payload may be served.
    pub fn is_usable(&self) -> bool {
        matches!(self.state, EntryState::Fresh | EntryState::Stale) && self.payload.is_some()
    }
}
