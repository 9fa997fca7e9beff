use std::{
    sync::{Arc, atomic::Ordering},
    time::Duration,
};

use crate::{
    QuotalineError,
    store::{MemoryWindowStore, WindowStore},
    window_counter::WindowCounter,
};

use super::{
    runtime::block_on,
    support::{RacingStore, UnreachableStore, keys},
};

#[test]
fn first_count_opens_the_window() {
    block_on(async {
        let store = Arc::new(MemoryWindowStore::new());
        let counter = WindowCounter::new(Arc::clone(&store), Duration::from_secs(1), 3);
        let k = keys("k");

        assert_eq!(counter.count(&k, 99).await.unwrap(), 1);
        assert_eq!(store.window_start(&k.start).await.unwrap(), Some(99));
    });
}

#[test]
fn later_counts_append_to_the_open_window() {
    block_on(async {
        let store = Arc::new(MemoryWindowStore::new());
        let counter = WindowCounter::new(Arc::clone(&store), Duration::from_secs(1), 3);
        let k = keys("k");

        for expected in 1..=5 {
            assert_eq!(counter.count(&k, 1).await.unwrap(), expected);
        }

        // The start marker is written once per window.
        assert_eq!(store.window_start(&k.start).await.unwrap(), Some(1));
    });
}

#[test]
fn expired_window_is_reopened() {
    block_on(async {
        let store = Arc::new(MemoryWindowStore::new());
        let counter = WindowCounter::new(Arc::clone(&store), Duration::from_millis(30), 3);
        let k = keys("k");

        assert_eq!(counter.count(&k, 1).await.unwrap(), 1);
        assert_eq!(counter.count(&k, 1).await.unwrap(), 2);

        tokio::time::sleep(Duration::from_millis(60)).await;

        assert_eq!(counter.count(&k, 2).await.unwrap(), 1);
        assert_eq!(store.window_start(&k.start).await.unwrap(), Some(2));
    });
}

#[test]
fn lost_race_is_retried() {
    block_on(async {
        let store = Arc::new(RacingStore::with_replies([0, 0, 4]));
        let counter = WindowCounter::new(Arc::clone(&store), Duration::from_secs(1), 3);

        assert_eq!(counter.count(&keys("k"), 1).await.unwrap(), 4);
        assert_eq!(store.calls.exists.load(Ordering::SeqCst), 3);
        assert_eq!(store.calls.push_if_exists.load(Ordering::SeqCst), 3);
    });
}

#[test]
fn exhausted_retries_report_zero_without_error() {
    block_on(async {
        let store = Arc::new(RacingStore::default());
        let counter = WindowCounter::new(Arc::clone(&store), Duration::from_secs(1), 3);

        assert_eq!(counter.count(&keys("k"), 1).await.unwrap(), 0);
        assert_eq!(store.calls.push_if_exists.load(Ordering::SeqCst), 3);
        assert_eq!(store.calls.open_window.load(Ordering::SeqCst), 0);
    });
}

#[test]
fn store_errors_abort_without_retry() {
    block_on(async {
        let store = Arc::new(UnreachableStore::default());
        let counter = WindowCounter::new(Arc::clone(&store), Duration::from_secs(1), 3);

        let err = counter.count(&keys("k"), 1).await.unwrap_err();

        assert!(matches!(err, QuotalineError::StoreError(_)));
        assert_eq!(store.calls.total(), 1);
    });
}

#[test]
fn concurrent_openers_get_distinct_counts() {
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(4)
        .enable_all()
        .build()
        .unwrap();

    rt.block_on(async {
        let store = Arc::new(MemoryWindowStore::new());
        let counter = Arc::new(WindowCounter::new(store, Duration::from_secs(5), 3));

        let handles: Vec<_> = (0..50)
            .map(|_| {
                let counter = Arc::clone(&counter);
                tokio::spawn(async move { counter.count(&keys("hot"), 1).await.unwrap() })
            })
            .collect();

        let mut counts = Vec::with_capacity(handles.len());
        for handle in handles {
            counts.push(handle.await.unwrap());
        }
        counts.sort_unstable();

        assert_eq!(counts, (1..=50).collect::<Vec<u64>>());
    });
}
