//! Handles returned by fetch operations.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, ready};

use refetch_core::{CacheKey, CacheStatus, FetchError, FetchResult};
use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;

use crate::cache::Shared;

/// A caller's interest in one fetch.
///
/// A subscription resolves to the outcome of the fetch it was returned by:
/// immediately for cache hits and stale reads, or when the request it
/// observes settles. Await it directly, call [`wait`](Self::wait) to keep the
/// handle, or poll it without blocking with [`try_result`](Self::try_result).
///
/// Dropping an unsettled subscription is the same as [`cancel`](Self::cancel).
pub struct Subscription<T, E> {
    key: CacheKey,
    status: CacheStatus,
    slot: Slot<T, E>,
    observer: Option<ObserverHandle<T, E>>,
    updates: Option<oneshot::Receiver<FetchResult<T, E>>>,
}

enum Slot<T, E> {
    Waiting(oneshot::Receiver<FetchResult<T, E>>),
    Settled(FetchResult<T, E>),
}

/// Ties a subscription to the in-flight request it observes.
pub(crate) struct ObserverHandle<T, E> {
    shared: Arc<Shared<T, E>>,
    generation: u64,
    id: u64,
}

impl<T, E> ObserverHandle<T, E> {
    pub(crate) fn new(shared: Arc<Shared<T, E>>, generation: u64, id: u64) -> Self {
        ObserverHandle {
            shared,
            generation,
            id,
        }
    }

    fn release(self, key: &CacheKey) {
        self.shared.release(key, self.generation, self.id);
    }
}

impl<T, E> Subscription<T, E> {
    pub(crate) fn ready(key: CacheKey, payload: T) -> Self {
        Subscription {
            key,
            status: CacheStatus::Hit,
            slot: Slot::Settled(Ok(payload)),
            observer: None,
            updates: None,
        }
    }

    pub(crate) fn stale(
        key: CacheKey,
        payload: T,
        updates: oneshot::Receiver<FetchResult<T, E>>,
    ) -> Self {
        Subscription {
            key,
            status: CacheStatus::Stale,
            slot: Slot::Settled(Ok(payload)),
            observer: None,
            updates: Some(updates),
        }
    }

    pub(crate) fn pending(
        key: CacheKey,
        status: CacheStatus,
        receiver: oneshot::Receiver<FetchResult<T, E>>,
        observer: ObserverHandle<T, E>,
    ) -> Self {
        Subscription {
            key,
            status,
            slot: Slot::Waiting(receiver),
            observer: Some(observer),
            updates: None,
        }
    }

    /// The key this subscription was created for.
    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    /// How the fetch was served.
    pub fn status(&self) -> CacheStatus {
        self.status
    }

    /// Returns `true` once the outcome is known.
    pub fn is_settled(&self) -> bool {
        matches!(self.slot, Slot::Settled(_))
    }

    /// Stops observing.
    ///
    /// The subscription resolves to [`FetchError::Cancelled`]. Other
    /// subscriptions to the same request are not affected; when this was the
    /// last one, the request itself is cancelled and its producer is signalled.
    /// Cancelling twice, or after the request settled, does nothing, even if
    /// the outcome has not been read yet.
    pub fn cancel(&mut self) {
        if let Slot::Waiting(rx) = &mut self.slot
            && let Ok(outcome) = rx.try_recv()
        {
            self.settle(outcome);
        }
        if self.is_settled() {
            return;
        }
        self.slot = Slot::Settled(Err(FetchError::Cancelled));
        if let Some(observer) = self.observer.take() {
            observer.release(&self.key);
        }
    }

    /// Takes the pending background refresh of a stale read.
    ///
    /// Only subscriptions with [`CacheStatus::Stale`] carry one, and it can
    /// be taken once.
    pub fn updates(&mut self) -> Option<Revalidation<T, E>> {
        self.updates.take().map(|rx| Revalidation { rx })
    }

    fn settle(&mut self, outcome: FetchResult<T, E>) {
        self.slot = Slot::Settled(outcome);
        self.observer = None;
    }
}

impl<T: Clone, E> Subscription<T, E> {
    /// Waits for the outcome.
    ///
    /// Unlike awaiting the subscription by value, the handle stays usable and
    /// the outcome can be read again.
    pub async fn wait(&mut self) -> FetchResult<T, E> {
        self.await
    }

    /// Returns the outcome if it is already known, without waiting.
    pub fn try_result(&mut self) -> Option<&FetchResult<T, E>> {
        if let Slot::Waiting(rx) = &mut self.slot {
            let outcome = match rx.try_recv() {
                Ok(outcome) => outcome,
                Err(TryRecvError::Empty) => return None,
                Err(TryRecvError::Closed) => Err(FetchError::Detached),
            };
            self.settle(outcome);
        }
        match &self.slot {
            Slot::Settled(outcome) => Some(outcome),
            Slot::Waiting(_) => None,
        }
    }
}

impl<T: Clone, E> Future for Subscription<T, E> {
    type Output = FetchResult<T, E>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = &mut *self;
        if let Slot::Waiting(rx) = &mut this.slot {
            let outcome = match ready!(Pin::new(rx).poll(cx)) {
                Ok(outcome) => outcome,
                Err(_) => Err(FetchError::Detached),
            };
            this.settle(outcome);
        }
        match &this.slot {
            Slot::Settled(outcome) => Poll::Ready(outcome.clone()),
            Slot::Waiting(_) => Poll::Pending,
        }
    }
}

// Payloads are never pinned in place.
impl<T, E> Unpin for Subscription<T, E> {}

impl<T, E> Drop for Subscription<T, E> {
    fn drop(&mut self) {
        if let Some(observer) = self.observer.take() {
            observer.release(&self.key);
        }
    }
}

impl<T, E> fmt::Debug for Subscription<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("key", &self.key)
            .field("status", &self.status)
            .field("settled", &self.is_settled())
            .field("updates", &self.updates.is_some())
            .finish()
    }
}

/// The background refresh started by a stale read.
///
/// Resolves once the refresh settles. The refreshed payload is already in
/// the cache by then.
#[derive(Debug)]
pub struct Revalidation<T, E> {
    rx: oneshot::Receiver<FetchResult<T, E>>,
}

impl<T, E> Future for Revalidation<T, E> {
    type Output = FetchResult<T, E>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match ready!(Pin::new(&mut self.rx).poll(cx)) {
            Ok(outcome) => Poll::Ready(outcome),
            Err(_) => Poll::Ready(Err(FetchError::Detached)),
        }
    }
}
