//! The request cache engine.
//!
//! [`RequestCache`] owns two maps:
//!
//! - the **entry store**: at most one [`Record`] per key (payload, fetch time,
//!   failure);
//! - the **in-flight registry**: at most one [`InFlight`] per key (cancellation
//!   token, attempt count, observers).
//!
//! Every check-then-act sequence on these maps runs without an `.await` in
//! between, under the registry's per-key lock. When both maps are touched
//! the registry is locked first and the entry store second, which is also the
//! order in which a settling request publishes its outcome: the entry is
//! written, the registry record is removed, and only then are observers
//! notified.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use refetch_core::{
    CacheEntry, CacheKey, CacheStatus, CancellationToken, EntryState, FetchError, FetchOptions,
    FetchResult, InvalidKeyError, Producer,
};
use tokio::time::Instant;
use tracing::{Instrument, debug, debug_span, trace};

use crate::config::CacheConfig;
use crate::inflight::InFlight;
use crate::metrics::{Settlement, record_attempt, record_settlement, record_status};
use crate::offload::{OffloadConfig, OffloadManager};
use crate::retry::{self, Attempted};
use crate::store::Record;
use crate::subscription::{ObserverHandle, Subscription};

/// In-memory request cache with deduplication, retry and cancellation.
///
/// The cache is a cheap-to-clone handle; clones share the same state.
/// Operations that may start a producer spawn Tokio tasks and must be called
/// from within a Tokio runtime.
///
/// # Example
///
/// ```
/// use refetch::{CacheKey, CancellationToken, FetchOptions, RequestCache};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let cache: RequestCache<Vec<String>, std::io::Error> = RequestCache::new();
/// let key = CacheKey::builder("categories").build();
///
/// let categories = cache
///     .fetch(&key, |_signal: CancellationToken| async {
///         Ok(vec!["cars".to_string(), "phones".to_string()])
///     }, FetchOptions::default())
///     .unwrap()
///     .await
///     .unwrap();
///
/// assert_eq!(categories.len(), 2);
/// assert_eq!(cache.get(&key), Some(categories));
/// # }
/// ```
pub struct RequestCache<T, E> {
    shared: Arc<Shared<T, E>>,
}

impl<T, E> Clone for RequestCache<T, E> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T, E> fmt::Debug for RequestCache<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestCache")
            .field("entries", &self.shared.entries.len())
            .field("in_flight", &self.shared.in_flight.len())
            .field("defaults", &self.shared.defaults)
            .finish()
    }
}

pub(crate) struct Shared<T, E> {
    entries: DashMap<CacheKey, Record<T, E>>,
    in_flight: DashMap<CacheKey, InFlight<T, E>>,
    offload: OffloadManager,
    defaults: FetchOptions,
    ids: AtomicU64,
}

impl<T, E> RequestCache<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    /// Creates a cache with default configuration.
    pub fn new() -> Self {
        Self::with_config(CacheConfig::default())
    }

    /// Creates a builder.
    pub fn builder() -> RequestCacheBuilder<T, E> {
        RequestCacheBuilder::default()
    }

    /// Creates a cache from configuration.
    pub fn with_config(config: CacheConfig) -> Self {
        RequestCache {
            shared: Arc::new(Shared {
                entries: DashMap::new(),
                in_flight: DashMap::new(),
                offload: OffloadManager::new(config.offload),
                defaults: config.defaults,
                ids: AtomicU64::new(0),
            }),
        }
    }

    /// Fetches the resource identified by `key`.
    ///
    /// 1. With `use_cache`, a fresh entry resolves the subscription at once
    ///    and the producer is not called. A stale entry also resolves at once,
    ///    and a background refresh is started unless one is running.
    /// 2. If a request for `key` is already in flight, the caller joins it.
    /// 3. Otherwise a new request is started and `producer` is invoked, with
    ///    retries governed by `options`.
    ///
    /// Fails only when `key` is invalid, before any state is touched.
    pub fn fetch<P>(
        &self,
        key: &CacheKey,
        producer: P,
        options: FetchOptions,
    ) -> Result<Subscription<T, E>, InvalidKeyError>
    where
        P: Producer<Output = T, Error = E>,
    {
        key.validate()?;
        Ok(self.shared.fetch(key.clone(), producer, options))
    }

    /// Same as [`fetch`](Self::fetch) with the cache's default options.
    pub fn load<P>(
        &self,
        key: &CacheKey,
        producer: P,
    ) -> Result<Subscription<T, E>, InvalidKeyError>
    where
        P: Producer<Output = T, Error = E>,
    {
        self.fetch(key, producer, self.shared.defaults)
    }

    /// Discards the entry for `key` and fetches it again, bypassing the cache.
    ///
    /// Both steps happen under the registry lock for `key`, so no caller can
    /// observe the gap between them. A request already in flight is joined
    /// rather than duplicated.
    pub fn refresh<P>(
        &self,
        key: &CacheKey,
        producer: P,
        options: FetchOptions,
    ) -> Result<Subscription<T, E>, InvalidKeyError>
    where
        P: Producer<Output = T, Error = E>,
    {
        key.validate()?;
        Ok(self
            .shared
            .observe_or_start(key.clone(), producer, options.bypass_cache(), true))
    }

    /// Removes the entry for `key`. A request in flight is not affected.
    pub fn invalidate(&self, key: &CacheKey) -> Result<(), InvalidKeyError> {
        key.validate()?;
        if self.shared.entries.remove(key).is_some() {
            debug!(key = %key, "entry invalidated");
        }
        Ok(())
    }

    /// Cancels the request in flight for `key`, if any.
    ///
    /// Every observer and update listener still attached receives
    /// [`FetchError::Cancelled`]. The stored entry is left untouched.
    pub fn cancel(&self, key: &CacheKey) -> bool {
        let Some((_, flight)) = self.shared.in_flight.remove(key) else {
            return false;
        };
        flight.token.cancel();
        record_settlement(Settlement::Cancelled, flight.started_at.elapsed());
        let delivered = flight.settle(&Err(FetchError::Cancelled));
        debug!(key = %key, delivered, "request cancelled");
        true
    }

    /// Cancels every request in flight and every background task.
    pub fn shutdown(&self) {
        let keys: Vec<CacheKey> = self
            .shared
            .in_flight
            .iter()
            .map(|flight| flight.key().clone())
            .collect();
        for key in &keys {
            self.cancel(key);
        }
        self.shared.offload.cancel_all();
        debug!(cancelled = keys.len(), "request cache shut down");
    }

    /// Returns the stored payload if it may be served (fresh or stale).
    pub fn get(&self, key: &CacheKey) -> Option<T> {
        let now = Instant::now();
        self.shared
            .entries
            .get(key)
            .and_then(|record| match record.state(now) {
                EntryState::Fresh | EntryState::Stale => record.payload(),
                _ => None,
            })
    }

    /// Returns the observed state of `key`.
    pub fn state(&self, key: &CacheKey) -> EntryState {
        let stored = self
            .shared
            .entries
            .get(key)
            .map(|record| record.state(Instant::now()));
        match stored {
            Some(state @ (EntryState::Fresh | EntryState::Stale)) => state,
            _ if self.shared.in_flight.contains_key(key) => EntryState::Pending,
            Some(state) => state,
            None => EntryState::Idle,
        }
    }

    /// Returns a snapshot of the entry for `key`.
    pub fn entry(&self, key: &CacheKey) -> Option<CacheEntry<T, E>> {
        let mut snapshot = self
            .shared
            .entries
            .get(key)
            .map(|record| record.snapshot(Instant::now()))?;
        if snapshot.state == EntryState::Failed && self.shared.in_flight.contains_key(key) {
            snapshot.state = EntryState::Pending;
            snapshot.error = None;
        }
        Some(snapshot)
    }

    /// Returns `true` if a request for `key` is in flight.
    pub fn is_in_flight(&self, key: &CacheKey) -> bool {
        self.shared.in_flight.contains_key(key)
    }

    /// Number of requests in flight.
    pub fn in_flight_count(&self) -> usize {
        self.shared.in_flight.len()
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.shared.entries.len()
    }

    /// Returns `true` if no entry is stored.
    pub fn is_empty(&self) -> bool {
        self.shared.entries.is_empty()
    }

    /// Removes every entry. Requests in flight are not affected.
    pub fn clear(&self) {
        self.shared.entries.clear();
    }

    /// Options used by [`load`](Self::load).
    pub fn defaults(&self) -> &FetchOptions {
        &self.shared.defaults
    }

    /// The manager running background revalidations.
    pub fn offload(&self) -> &OffloadManager {
        &self.shared.offload
    }
}

impl<T, E> Default for RequestCache<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T, E> Shared<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    fn next_id(&self) -> u64 {
        self.ids.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn fetch<P>(
        self: &Arc<Self>,
        key: CacheKey,
        producer: P,
        options: FetchOptions,
    ) -> Subscription<T, E>
    where
        P: Producer<Output = T, Error = E>,
    {
        if options.use_cache {
            // The entry guard is released before the registry is locked.
            let cached = self
                .entries
                .get(&key)
                .and_then(|record| record.usable(options.ttl, Instant::now()));
            match cached {
                Some((payload, EntryState::Fresh)) => return self.hit(key, payload),
                Some((payload, _)) => return self.serve_stale(key, payload, producer, options),
                None => {}
            }
        }
        self.observe_or_start(key, producer, options, false)
    }

    fn hit(&self, key: CacheKey, payload: T) -> Subscription<T, E> {
        trace!(key = %key, "cache hit");
        record_status(CacheStatus::Hit);
        Subscription::ready(key, payload)
    }

    fn serve_stale<P>(
        self: &Arc<Self>,
        key: CacheKey,
        payload: T,
        producer: P,
        options: FetchOptions,
    ) -> Subscription<T, E>
    where
        P: Producer<Output = T, Error = E>,
    {
        let updates = match self.in_flight.entry(key.clone()) {
            Entry::Occupied(mut occupied) => {
                trace!(key = %key, "refresh already in flight");
                occupied.get_mut().listen()
            }
            Entry::Vacant(vacant) => {
                let mut flight = InFlight::new(self.next_id(), true);
                let updates = flight.listen();
                let generation = flight.generation;
                let token = flight.token.clone();
                vacant.insert(flight);
                self.revalidate(key.clone(), generation, producer, options, token);
                updates
            }
        };
        debug!(key = %key, "serving stale payload");
        record_status(CacheStatus::Stale);
        Subscription::stale(key, payload, updates)
    }

    pub(crate) fn observe_or_start<P>(
        self: &Arc<Self>,
        key: CacheKey,
        producer: P,
        options: FetchOptions,
        invalidate: bool,
    ) -> Subscription<T, E>
    where
        P: Producer<Output = T, Error = E>,
    {
        let id = self.next_id();
        let (status, generation, receiver) = match self.in_flight.entry(key.clone()) {
            Entry::Occupied(mut occupied) => {
                if invalidate {
                    self.entries.remove(&key);
                }
                let flight = occupied.get_mut();
                (CacheStatus::Joined, flight.generation, flight.observe(id))
            }
            Entry::Vacant(vacant) => {
                if invalidate {
                    self.entries.remove(&key);
                } else if options.use_cache {
                    // A request for this key may have settled since the entry lookup.
                    let cached = self
                        .entries
                        .get(&key)
                        .and_then(|record| record.usable(options.ttl, Instant::now()));
                    if let Some((payload, EntryState::Fresh)) = cached {
                        drop(vacant);
                        return self.hit(key, payload);
                    }
                }
                let mut flight = InFlight::new(self.next_id(), false);
                let receiver = flight.observe(id);
                let generation = flight.generation;
                let token = flight.token.clone();
                vacant.insert(flight);
                self.start(key.clone(), generation, producer, options, token);
                (CacheStatus::Miss, generation, receiver)
            }
        };
        debug!(key = %key, status = status.as_str(), generation, "observing request");
        record_status(status);
        let handle = ObserverHandle::new(Arc::clone(self), generation, id);
        Subscription::pending(key, status, receiver, handle)
    }

    fn start<P>(
        self: &Arc<Self>,
        key: CacheKey,
        generation: u64,
        producer: P,
        options: FetchOptions,
        token: CancellationToken,
    ) where
        P: Producer<Output = T, Error = E>,
    {
        let span = debug_span!("refetch.request", key = %key, generation);
        let guard = DetachGuard::new(Arc::clone(self), key, generation);
        tokio::spawn(Self::drive(guard, producer, options, token).instrument(span));
    }

    fn revalidate<P>(
        self: &Arc<Self>,
        key: CacheKey,
        generation: u64,
        producer: P,
        options: FetchOptions,
        token: CancellationToken,
    ) where
        P: Producer<Output = T, Error = E>,
    {
        let span = debug_span!("refetch.revalidate", key = %key, generation);
        let guard = DetachGuard::new(Arc::clone(self), key, generation);
        let task = Self::drive(guard, producer, options, token);
        self.offload.spawn("revalidate", task.instrument(span));
    }

    /// Runs the producer and settles the request.
    ///
    /// The guard is owned by the future, so a task dropped at any point,
    /// including before its first poll, detaches the request.
    async fn drive<P>(
        mut guard: DetachGuard<T, E>,
        producer: P,
        options: FetchOptions,
        token: CancellationToken,
    ) where
        P: Producer<Output = T, Error = E>,
    {
        let attempted = {
            let DetachGuard {
                shared,
                key,
                generation,
                ..
            } = &guard;
            retry::run(&producer, &options, &token, |attempt| {
                record_attempt(attempt);
                if let Some(mut flight) = shared.in_flight.get_mut(key)
                    && flight.generation == *generation
                {
                    flight.attempts = attempt;
                }
            })
            .await
        };
        guard.armed = false;
        guard.shared.settle(&guard.key, guard.generation, attempted, options.ttl);
    }

    fn settle(&self, key: &CacheKey, generation: u64, attempted: Attempted<T, E>, ttl: Duration) {
        let (outcome, settlement): (FetchResult<T, E>, _) = match attempted {
            Attempted::Succeeded(payload) => (Ok(payload), Settlement::Success),
            Attempted::Exhausted { error, attempts } => (
                Err(FetchError::Producer {
                    error: Arc::new(error),
                    attempts,
                }),
                Settlement::Failure,
            ),
            Attempted::Cancelled => (Err(FetchError::Cancelled), Settlement::Cancelled),
        };

        let flight = match self.in_flight.entry(key.clone()) {
            Entry::Occupied(occupied) if occupied.get().generation == generation => {
                match &outcome {
                    Ok(payload) => {
                        self.entries
                            .insert(key.clone(), Record::fresh(payload.clone(), ttl));
                    }
                    Err(FetchError::Producer { error, .. }) => {
                        match self.entries.entry(key.clone()) {
                            Entry::Occupied(mut record) => record.get_mut().fail(Arc::clone(error)),
                            Entry::Vacant(vacant) => {
                                vacant.insert(Record::failed(Arc::clone(error)));
                            }
                        }
                    }
                    Err(_) => {}
                }
                occupied.remove()
            }
            _ => {
                trace!(key = %key, generation, "discarding outcome of detached request");
                // Whoever removed a cancelled request already counted it.
                if settlement != Settlement::Cancelled {
                    record_settlement(Settlement::Discarded, Duration::ZERO);
                }
                return;
            }
        };

        record_settlement(settlement, flight.started_at.elapsed());
        let attempts = flight.attempts;
        let delivered = flight.settle(&outcome);
        debug!(
            key = %key,
            outcome = settlement.as_str(),
            attempts,
            delivered,
            "request settled"
        );
    }
}

impl<T, E> Shared<T, E> {
    /// Detaches one observer. When the last observer of a request that the
    /// cache does not keep alive leaves, the request is removed from the
    /// registry and its producer is told to stop.
    pub(crate) fn release(&self, key: &CacheKey, generation: u64, id: u64) {
        let orphan = match self.in_flight.entry(key.clone()) {
            Entry::Occupied(mut occupied) if occupied.get().generation == generation => {
                if !occupied.get_mut().release(id) {
                    return;
                }
                if !occupied.get().is_orphaned() {
                    let observers = occupied.get().observer_count();
                    trace!(key = %key, generation, observers, "observer released");
                    return;
                }
                occupied.remove()
            }
            _ => return,
        };
        orphan.token.cancel();
        record_settlement(Settlement::Cancelled, orphan.started_at.elapsed());
        debug!(key = %key, generation, "last observer released, request cancelled");
    }

    /// Drops a request whose driving task ended without settling it.
    ///
    /// Dropping the record closes every observer and listener channel, which
    /// they report as [`FetchError::Detached`].
    fn detach(&self, key: &CacheKey, generation: u64) {
        if let Some((_, flight)) = self
            .in_flight
            .remove_if(key, |_, flight| flight.generation == generation)
        {
            flight.token.cancel();
            record_settlement(Settlement::Cancelled, flight.started_at.elapsed());
            debug!(key = %key, generation, "request detached before settling");
        }
    }
}

/// Detaches a request unless its driving task settled it.
struct DetachGuard<T, E> {
    shared: Arc<Shared<T, E>>,
    key: CacheKey,
    generation: u64,
    armed: bool,
}

impl<T, E> DetachGuard<T, E> {
    fn new(shared: Arc<Shared<T, E>>, key: CacheKey, generation: u64) -> Self {
        DetachGuard {
            shared,
            key,
            generation,
            armed: true,
        }
    }
}

impl<T, E> Drop for DetachGuard<T, E> {
    fn drop(&mut self) {
        if self.armed {
            self.shared.detach(&self.key, self.generation);
        }
    }
}

/// Builder for [`RequestCache`].
pub struct RequestCacheBuilder<T, E> {
    config: CacheConfig,
    _types: PhantomData<fn() -> (T, E)>,
}

impl<T, E> Default for RequestCacheBuilder<T, E> {
    fn default() -> Self {
        Self {
            config: CacheConfig::default(),
            _types: PhantomData,
        }
    }
}

impl<T, E> fmt::Debug for RequestCacheBuilder<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestCacheBuilder")
            .field("config", &self.config)
            .finish()
    }
}

impl<T, E> RequestCacheBuilder<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    /// Set the options used by [`RequestCache::load`].
    pub fn defaults(mut self, options: FetchOptions) -> Self {
        self.config.defaults = options;
        self
    }

    /// Set the background revalidation settings.
    pub fn offload(mut self, offload: OffloadConfig) -> Self {
        self.config.offload = offload;
        self
    }

    /// Replace the whole configuration.
    pub fn config(self, config: CacheConfig) -> Self {
        Self { config, ..self }
    }

    /// Build the cache.
    pub fn build(self) -> RequestCache<T, E> {
        RequestCache::with_config(self.config)
    }
}
