//! The shared store that holds authoritative window counts.
//!
//! A window for one key is two records with the same time-to-live: a start
//! marker (`<prefix>:<key>:time`) and a count list (`<prefix>:<key>:count`).
//! [`WindowStore`] exposes exactly the primitives the counting protocol needs.
//!
//! - [`MemoryWindowStore`]: linearizable in-process store
//! - `RedisWindowStore` (feature `redis-tokio`): Redis-backed store shared by
//!   every process that points at the same server

use std::{future::Future, sync::Weak, time::Duration};

use tokio_util::sync::CancellationToken;

use crate::{
    QuotalineError, WindowKeys,
    runtime::{new_interval, spawn_task, tick},
};

mod memory_window_store;
pub use memory_window_store::*;

/// Store primitives used by the counting protocol.
///
/// Implementations must make [`WindowStore::open_window`] atomic and
/// [`WindowStore::push_if_exists`] conditional on the key existing at the
/// moment of the append. No in-process lock coordinates counter updates; the
/// store's atomicity is the only guarantee.
pub trait WindowStore: Send + Sync + 'static {
    /// Whether `key` currently exists.
    fn exists(&self, key: &str) -> impl Future<Output = Result<bool, QuotalineError>> + Send;

    /// Open a window in one transaction.
    ///
    /// Sets the start marker to `start_nanos` with `ttl` only if it is absent,
    /// appends one marker to the count list and sets the list's `ttl`.
    /// Returns the list length reported by the append.
    fn open_window(
        &self,
        keys: &WindowKeys,
        start_nanos: u64,
        ttl: Duration,
    ) -> impl Future<Output = Result<u64, QuotalineError>> + Send;

    /// Append one marker to `key` only if it still exists.
    ///
    /// Returns the new length, or `0` when the key was gone.
    fn push_if_exists(&self, key: &str) -> impl Future<Output = Result<u64, QuotalineError>> + Send;

    /// Read a window start marker in unix nanoseconds.
    fn window_start(
        &self,
        key: &str,
    ) -> impl Future<Output = Result<Option<u64>, QuotalineError>> + Send;

    /// Drop records whose time-to-live has passed.
    ///
    /// Called from the limiter's periodic sweep. Stores that expire records on
    /// their own keep the default no-op.
    fn purge_expired(&self) {}
}

impl<S: WindowStore> WindowStore for std::sync::Arc<S> {
    fn exists(&self, key: &str) -> impl Future<Output = Result<bool, QuotalineError>> + Send {
        (**self).exists(key)
    }

    fn open_window(
        &self,
        keys: &WindowKeys,
        start_nanos: u64,
        ttl: Duration,
    ) -> impl Future<Output = Result<u64, QuotalineError>> + Send {
        (**self).open_window(keys, start_nanos, ttl)
    }

    fn push_if_exists(&self, key: &str) -> impl Future<Output = Result<u64, QuotalineError>> + Send {
        (**self).push_if_exists(key)
    }

    fn window_start(
        &self,
        key: &str,
    ) -> impl Future<Output = Result<Option<u64>, QuotalineError>> + Send {
        (**self).window_start(key)
    }

    fn purge_expired(&self) {
        (**self).purge_expired()
    }
}

/// Call [`WindowStore::purge_expired`] every `interval` on the current tokio runtime.
///
/// The loop ends when `cancel` fires or when the store is dropped.
pub(crate) fn spawn_purge_loop<S: WindowStore>(
    store: Weak<S>,
    interval: Duration,
    cancel: CancellationToken,
) {
    spawn_task(async move {
        let mut interval = new_interval(interval);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tick(&mut interval) => {}
            }

            let Some(store) = store.upgrade() else {
                break;
            };

            store.purge_expired();
        }

        tracing::debug!("store purge stopped");
    });
}
