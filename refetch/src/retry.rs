//! Bounded retry with linear, cancellable backoff.

use refetch_core::{CancellationToken, FetchOptions, Producer};
use tracing::{debug, trace};

/// How a run of attempts ended.
#[derive(Debug)]
pub(crate) enum Attempted<T, E> {
    Succeeded(T),
    Exhausted { error: E, attempts: u32 },
    Cancelled,
}

/// Invokes `producer` until it succeeds, attempts run out, or `token` fires.
///
/// After failed attempt `n` the loop sleeps `backoff_base * n`. A cancellation
/// during an attempt or during the sleep ends the run at once; an error
/// returned after the token fired counts as a cancellation, not a failure.
/// `on_attempt` is called with the 1-based number before every invocation.
pub(crate) async fn run<P>(
    producer: &P,
    options: &FetchOptions,
    token: &CancellationToken,
    mut on_attempt: impl FnMut(u32),
) -> Attempted<P::Output, P::Error>
where
    P: Producer,
{
    let max_attempts = options.attempts();
    let mut attempt = 1;

    loop {
        on_attempt(attempt);
        trace!(attempt, max_attempts, "invoking producer");

        let result = tokio::select! {
            biased;
            _ = token.cancelled() => return Attempted::Cancelled,
            result = producer.produce(token.clone()) => result,
        };

        match result {
            Ok(payload) => return Attempted::Succeeded(payload),
            Err(_) if token.is_cancelled() => return Attempted::Cancelled,
            Err(error) if attempt >= max_attempts => {
                return Attempted::Exhausted {
                    error,
                    attempts: attempt,
                };
            }
            Err(_) => {}
        }

        let delay = options.backoff_base.delay_after(attempt);
        debug!(attempt, delay_ms = delay.as_millis(), "producer failed, backing off");

        tokio::select! {
            biased;
            _ = token.cancelled() => return Attempted::Cancelled,
            _ = tokio::time::sleep(delay) => {}
        }

        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use refetch_core::{BackoffBase, MaxAttempts};
    use tokio::time::Instant;

    fn options(max_attempts: u8, backoff_ms: u64) -> FetchOptions {
        FetchOptions::builder()
            .max_attempts(MaxAttempts::new(max_attempts).unwrap())
            .backoff_base(BackoffBase::new(Duration::from_millis(backoff_ms)).unwrap())
            .build()
    }

    #[tokio::test(start_paused = true)]
    async fn stops_after_max_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let producer = move |_: CancellationToken| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err::<u32, _>("down") }
        };

        let outcome = run(&producer, &options(4, 10), &CancellationToken::new(), |_| {}).await;

        assert!(matches!(
            outcome,
            Attempted::Exhausted {
                error: "down",
                attempts: 4
            }
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_grows_linearly() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let producer = move |_: CancellationToken| {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            async move { if n < 2 { Err("flaky") } else { Ok(n) } }
        };

        let mut seen = Vec::new();
        let start = Instant::now();
        let outcome = run(&producer, &options(3, 10), &CancellationToken::new(), |attempt| {
            seen.push((attempt, start.elapsed()));
        })
        .await;

        assert!(matches!(outcome, Attempted::Succeeded(2)));
        assert_eq!(
            seen,
            vec![
                (1, Duration::ZERO),
                (2, Duration::from_millis(10)),
                (3, Duration::from_millis(30)),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_during_backoff_short_circuits() {
        let token = CancellationToken::new();
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let producer = move |_: CancellationToken| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err::<u32, _>("down") }
        };

        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            canceller.cancel();
        });

        let start = Instant::now();
        let outcome = run(&producer, &options(3, 60_000), &token, |_| {}).await;

        assert!(matches!(outcome, Attempted::Cancelled));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(start.elapsed(), Duration::from_millis(500));
    }

    #[tokio::test]
    async fn error_after_cancel_is_not_retried() {
        let token = CancellationToken::new();
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let producer = move |signal: CancellationToken| {
            counter.fetch_add(1, Ordering::SeqCst);
            signal.cancel();
            async { Err::<u32, _>("aborted") }
        };

        let outcome = run(&producer, &options(5, 1), &token, |_| {}).await;

        assert!(matches!(outcome, Attempted::Cancelled));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
