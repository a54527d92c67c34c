//! Stored cache records.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use refetch_core::{CacheEntry, EntryState};
use tokio::time::Instant;

/// The cache's record for one key.
///
/// Freshness is measured on the tokio clock so that paused-time tests see
/// exact TTL boundaries; the wall-clock time is kept for reporting only.
#[derive(Debug)]
pub(crate) struct Record<T, E> {
    payload: Option<T>,
    fetched_at: Option<Instant>,
    fetched_at_utc: Option<DateTime<Utc>>,
    ttl: Duration,
    failure: Option<Arc<E>>,
}

impl<T, E> Record<T, E> {
    pub(crate) fn fresh(payload: T, ttl: Duration) -> Self {
        Record {
            payload: Some(payload),
            fetched_at: Some(Instant::now()),
            fetched_at_utc: Some(Utc::now()),
            ttl,
            failure: None,
        }
    }

    pub(crate) fn failed(error: Arc<E>) -> Self {
        Record {
            payload: None,
            fetched_at: None,
            fetched_at_utc: None,
            ttl: Duration::ZERO,
            failure: Some(error),
        }
    }

    /// Marks the record failed. The last good payload is kept but no longer
    /// served.
    pub(crate) fn fail(&mut self, error: Arc<E>) {
        self.failure = Some(error);
    }

    /// State of the record judged against `ttl`.
    pub(crate) fn state_for(&self, ttl: Duration, now: Instant) -> EntryState {
        if self.failure.is_some() {
            return EntryState::Failed;
        }
        match self.fetched_at {
            Some(at) if now.saturating_duration_since(at) < ttl => EntryState::Fresh,
            Some(_) => EntryState::Stale,
            None => EntryState::Idle,
        }
    }

    /// State of the record judged against the TTL it was stored with.
    pub(crate) fn state(&self, now: Instant) -> EntryState {
        self.state_for(self.ttl, now)
    }
}

impl<T: Clone, E> Record<T, E> {
    /// Payload and state, if the payload may be served under `ttl`.
    pub(crate) fn usable(&self, ttl: Duration, now: Instant) -> Option<(T, EntryState)> {
        match self.state_for(ttl, now) {
            state @ (EntryState::Fresh | EntryState::Stale) => {
                self.payload.clone().map(|payload| (payload, state))
            }
            _ => None,
        }
    }

    pub(crate) fn payload(&self) -> Option<T> {
        self.payload.clone()
    }

    pub(crate) fn snapshot(&self, now: Instant) -> CacheEntry<T, E> {
        let state = self.state(now);
        CacheEntry {
            payload: self.payload.clone(),
            fetched_at: self.fetched_at_utc,
            state,
            error: match state {
                EntryState::Failed => self.failure.clone(),
                _ => None,
            },
        }
    }
}
