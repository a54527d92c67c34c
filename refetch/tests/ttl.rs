//! Freshness, stale-while-revalidate and explicit invalidation.

mod common;

use std::time::Duration;

use common::{Cache, Counting, key, ms, once, options};
use refetch::{CacheKey, CacheStatus, EntryState, FetchOptions, InvalidKeyError, KeyPart};

#[tokio::test(start_paused = true)]
async fn entry_is_fresh_until_ttl_then_served_stale() {
    let cache = Cache::new();
    let producer = Counting::ok(ms(50));
    let opts = options(ms(1000), 1, ms(10));

    let first = cache.fetch(&key(1), producer.clone(), opts).unwrap();
    assert_eq!(first.await.unwrap(), "payload-1");

    tokio::time::advance(ms(999)).await;
    let hit = cache.fetch(&key(1), producer.clone(), opts).unwrap();
    assert_eq!(hit.status(), CacheStatus::Hit);
    assert_eq!(hit.await.unwrap(), "payload-1");
    assert_eq!(producer.calls(), 1);

    tokio::time::advance(ms(2)).await;
    let mut stale = cache.fetch(&key(1), producer.clone(), opts).unwrap();
    assert_eq!(stale.status(), CacheStatus::Stale);
    assert_eq!(stale.wait().await.unwrap(), "payload-1");

    let refreshed = stale.updates().expect("stale read carries a refresh");
    assert_eq!(refreshed.await.unwrap(), "payload-2");
    assert_eq!(producer.calls(), 2);
    assert_eq!(cache.get(&key(1)).as_deref(), Some("payload-2"));
    assert_eq!(cache.state(&key(1)), EntryState::Fresh);
}

#[tokio::test(start_paused = true)]
async fn concurrent_stale_reads_start_one_refresh() {
    let cache = Cache::new();
    let producer = Counting::ok(ms(50));
    let opts = options(ms(100), 1, ms(10));

    cache.fetch(&key(1), producer.clone(), opts).unwrap().await.unwrap();
    tokio::time::advance(ms(200)).await;

    let mut first = cache.fetch(&key(1), producer.clone(), opts).unwrap();
    let mut second = cache.fetch(&key(1), producer.clone(), opts).unwrap();
    assert_eq!(first.status(), CacheStatus::Stale);
    assert_eq!(second.status(), CacheStatus::Stale);
    assert!(cache.is_in_flight(&key(1)));
    assert_eq!(cache.state(&key(1)), EntryState::Stale);

    let (a, b) = tokio::join!(first.updates().unwrap(), second.updates().unwrap());
    assert_eq!(a.unwrap(), "payload-2");
    assert_eq!(b.unwrap(), "payload-2");
    assert_eq!(producer.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn stale_refresh_runs_without_listeners() {
    let cache = Cache::new();
    let producer = Counting::ok(ms(50));
    let opts = options(ms(100), 1, ms(10));

    cache.fetch(&key(1), producer.clone(), opts).unwrap().await.unwrap();
    tokio::time::advance(ms(200)).await;

    let stale = cache.fetch(&key(1), producer.clone(), opts).unwrap();
    drop(stale);

    cache.offload().wait_all().await;
    assert_eq!(producer.calls(), 2);
    assert_eq!(cache.get(&key(1)).as_deref(), Some("payload-2"));
}

#[tokio::test(start_paused = true)]
async fn freshness_is_judged_with_the_readers_ttl() {
    let cache = Cache::new();
    let producer = Counting::ok(ms(10));

    cache
        .fetch(&key(1), producer.clone(), options(Duration::from_secs(10), 1, ms(10)))
        .unwrap()
        .await
        .unwrap();
    tokio::time::advance(Duration::from_secs(2)).await;

    let strict = cache
        .fetch(&key(1), producer.clone(), options(Duration::from_secs(1), 1, ms(10)))
        .unwrap();
    assert_eq!(strict.status(), CacheStatus::Stale);
    // Inspection uses the TTL the entry was stored with.
    assert_eq!(cache.state(&key(1)), EntryState::Fresh);

    cache.offload().wait_all().await;
    assert_eq!(producer.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn zero_ttl_payloads_are_immediately_stale() {
    let cache = Cache::new();
    let producer = Counting::ok(ms(10));
    let opts = options(Duration::ZERO, 1, ms(10));

    cache.fetch(&key(1), producer.clone(), opts).unwrap().await.unwrap();
    assert_eq!(cache.state(&key(1)), EntryState::Stale);

    let next = cache.fetch(&key(1), producer.clone(), opts).unwrap();
    assert_eq!(next.status(), CacheStatus::Stale);
}

#[tokio::test(start_paused = true)]
async fn bypassing_the_cache_always_calls_the_producer() {
    let cache = Cache::new();
    let producer = Counting::ok(ms(10));

    cache.fetch(&key(1), producer.clone(), once()).unwrap().await.unwrap();
    let bypass = cache
        .fetch(&key(1), producer.clone(), once().bypass_cache())
        .unwrap();

    assert_eq!(bypass.status(), CacheStatus::Miss);
    assert_eq!(bypass.await.unwrap(), "payload-2");
    assert_eq!(cache.get(&key(1)).as_deref(), Some("payload-2"));
}

#[tokio::test(start_paused = true)]
async fn invalidated_entry_is_fetched_again() {
    let cache = Cache::new();
    let producer = Counting::ok(ms(10));

    cache.fetch(&key(1), producer.clone(), once()).unwrap().await.unwrap();
    cache.invalidate(&key(1)).unwrap();

    assert_eq!(cache.state(&key(1)), EntryState::Idle);
    assert_eq!(cache.get(&key(1)), None);

    let again = cache.fetch(&key(1), producer.clone(), once()).unwrap();
    assert_eq!(again.status(), CacheStatus::Miss);
    assert_eq!(again.await.unwrap(), "payload-2");
}

#[tokio::test(start_paused = true)]
async fn invalidate_leaves_requests_in_flight_alone() {
    let cache = Cache::new();
    let producer = Counting::ok(ms(50));

    let pending = cache.fetch(&key(1), producer.clone(), once()).unwrap();
    cache.invalidate(&key(1)).unwrap();

    assert!(cache.is_in_flight(&key(1)));
    assert_eq!(pending.await.unwrap(), "payload-1");
    assert_eq!(cache.state(&key(1)), EntryState::Fresh);
}

#[tokio::test(start_paused = true)]
async fn refresh_replaces_a_fresh_entry() {
    let cache = Cache::new();
    let producer = Counting::ok(ms(10));

    cache.fetch(&key(1), producer.clone(), once()).unwrap().await.unwrap();
    let refreshed = cache.refresh(&key(1), producer.clone(), once()).unwrap();

    assert_eq!(refreshed.status(), CacheStatus::Miss);
    assert_eq!(cache.state(&key(1)), EntryState::Pending);
    assert_eq!(refreshed.await.unwrap(), "payload-2");
    assert_eq!(producer.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn refresh_joins_a_request_in_flight() {
    let cache = Cache::new();
    let producer = Counting::ok(ms(50));

    let pending = cache.fetch(&key(1), producer.clone(), once()).unwrap();
    let refreshed = cache.refresh(&key(1), producer.clone(), once()).unwrap();

    assert_eq!(refreshed.status(), CacheStatus::Joined);
    let (a, b) = tokio::join!(pending, refreshed);
    assert_eq!(a.unwrap(), b.unwrap());
    assert_eq!(producer.calls(), 1);
}

#[tokio::test]
async fn invalid_keys_are_rejected_before_touching_state() {
    let cache = Cache::new();
    let producer = Counting::ok(ms(10));
    let empty = CacheKey::new("", 0, vec![]);
    let unnamed = CacheKey::new("item", 1, vec![KeyPart::new("", Some("7"))]);

    assert_eq!(
        cache
            .fetch(&empty, producer.clone(), FetchOptions::default())
            .unwrap_err(),
        InvalidKeyError::Empty
    );
    assert_eq!(
        cache
            .refresh(&unnamed, producer.clone(), FetchOptions::default())
            .unwrap_err(),
        InvalidKeyError::UnnamedPart { position: 0 }
    );
    assert_eq!(cache.invalidate(&empty), Err(InvalidKeyError::Empty));

    assert_eq!(producer.calls(), 0);
    assert_eq!(cache.in_flight_count(), 0);
    assert!(cache.is_empty());
}
