//! In-flight request records.
//!
//! One [`InFlight`] exists per key while a producer runs for it. Callers are
//! attached as *observers* (they keep the request alive and receive its
//! outcome) or as *update listeners* (stale-while-revalidate subscribers that
//! only want to hear about the refresh).

use refetch_core::{CancellationToken, FetchResult};
use tokio::sync::oneshot;
use tokio::time::Instant;

struct Observer<T, E> {
    id: u64,
    sender: oneshot::Sender<FetchResult<T, E>>,
}

pub(crate) struct InFlight<T, E> {
    /// Unique per request; a detached request cannot settle into a newer one.
    pub(crate) generation: u64,
    pub(crate) token: CancellationToken,
    pub(crate) attempts: u32,
    pub(crate) started_at: Instant,
    /// Kept alive by the cache itself rather than by its observers.
    pub(crate) background: bool,
    observers: Vec<Observer<T, E>>,
    listeners: Vec<oneshot::Sender<FetchResult<T, E>>>,
}

impl<T, E> InFlight<T, E> {
    pub(crate) fn new(generation: u64, background: bool) -> Self {
        InFlight {
            generation,
            token: CancellationToken::new(),
            attempts: 0,
            started_at: Instant::now(),
            background,
            observers: Vec::new(),
            listeners: Vec::new(),
        }
    }

    pub(crate) fn observe(&mut self, id: u64) -> oneshot::Receiver<FetchResult<T, E>> {
        let (sender, receiver) = oneshot::channel();
        self.observers.push(Observer { id, sender });
        receiver
    }

    /// Registers an update listener and pins the request to the cache.
    pub(crate) fn listen(&mut self) -> oneshot::Receiver<FetchResult<T, E>> {
        let (sender, receiver) = oneshot::channel();
        self.listeners.push(sender);
        self.background = true;
        receiver
    }

    /// Removes the observer; returns `false` if it was not attached.
    pub(crate) fn release(&mut self, id: u64) -> bool {
        let before = self.observers.len();
        self.observers.retain(|observer| observer.id != id);
        self.observers.len() != before
    }

    /// No observer is left and the cache has no interest of its own.
    pub(crate) fn is_orphaned(&self) -> bool {
        !self.background && self.observers.is_empty()
    }

    pub(crate) fn observer_count(&self) -> usize {
        self.observers.len()
    }
}

impl<T: Clone, E> InFlight<T, E> {
    /// Delivers the outcome to observers in registration order, then to
    /// update listeners. Returns how many receivers were still listening.
    pub(crate) fn settle(self, outcome: &FetchResult<T, E>) -> usize {
        self.observers
            .into_iter()
            .map(|observer| observer.sender)
            .chain(self.listeners)
            .map(|sender| sender.send(outcome.clone()).is_ok())
            .filter(|delivered| *delivered)
            .count()
    }
}
