//! The producer abstraction: how the cache obtains payloads.

use std::future::Future;

use tokio_util::sync::CancellationToken;

/// Caller-supplied operation that performs the actual fetch.
///
/// The cache may invoke a producer several times (once per attempt), always
/// handing it the cancellation signal of the request it serves. Cancellation
/// is advisory: a producer should watch the token and abort its own work
/// (e.g. drop the underlying network call), but the cache discards the result
/// of a cancelled request either way.
///
/// Any `Fn(CancellationToken) -> impl Future<Output = Result<T, E>>` closure
/// is a producer:
///
/// ```
/// use refetch_core::{CancellationToken, Producer};
///
/// fn assert_producer<P: Producer>(_: &P) {}
///
/// let producer = |_signal: CancellationToken| async { Ok::<_, std::io::Error>(vec![1, 2, 3]) };
/// assert_producer(&producer);
/// ```
pub trait Producer: Send + Sync + 'static {
    /// Payload returned on success.
    type Output: Clone + Send + Sync + 'static;

    /// Error returned on failure.
    type Error: Send + Sync + 'static;

    /// The future that resolves to the payload or error.
    type Future: Future<Output = Result<Self::Output, Self::Error>> + Send + 'static;

    /// Start one attempt.
    fn produce(&self, signal: CancellationToken) -> Self::Future;
}

impl<F, Fut, T, E> Producer for F
where
    F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Clone + Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    type Output = T;
    type Error = E;
    type Future = Fut;

    fn produce(&self, signal: CancellationToken) -> Self::Future {
        self(signal)
    }
}
