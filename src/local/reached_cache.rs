use std::{
    sync::Weak,
    time::{Duration, SystemTime},
};

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;

use crate::runtime::{new_interval, spawn_task, tick};

#[derive(Debug, Clone, Copy)]
pub(crate) struct ReachedEntry {
    pub expire_at: SystemTime,
    pub reached: bool,
}

/// Process-local record of keys known to be over budget.
///
/// An entry is a conservative mirror of a window the store reported as
/// exhausted. It can only turn a store round-trip into a fast rejection; it
/// never admits anything. Entries stop counting once `now >= expire_at`, so a
/// late sweep only delays memory reclamation.
///
/// # Thread Safety
///
/// Backed by [`DashMap`]; safe for concurrent use by every worker without
/// external locking.
#[derive(Debug, Default)]
pub struct ReachedCache {
    entries: DashMap<String, ReachedEntry>,
}

impl ReachedCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// `false` iff `key` is marked reached and `now` is before its expiry.
    pub fn is_allowed(&self, key: &str, now: SystemTime) -> bool {
        self.reached_until(key, now).is_none()
    }

    /// The instant until which `key` is known to be over budget, if that is still ahead of `now`.
    pub fn reached_until(&self, key: &str, now: SystemTime) -> Option<SystemTime> {
        let entry = self.entries.get(key)?;

        (entry.reached && now < entry.expire_at).then_some(entry.expire_at)
    }

    /// Mark `key` as over budget until `expire_at`, replacing any previous entry.
    pub fn mark_reached(&self, key: &str, expire_at: SystemTime) {
        self.entries.insert(
            key.to_string(),
            ReachedEntry {
                expire_at,
                reached: true,
            },
        );
    }

    /// Drop the entry for `key`, if any.
    pub fn remove(&self, key: &str) {
        self.entries.remove(key);
    }

    /// Number of entries currently held, expired or not.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` when no entries are held.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove every entry whose expiry is not after `now`.
    pub(crate) fn cleanup(&self, now: SystemTime) {
        self.entries.retain(|_, entry| now < entry.expire_at);
    } // end method cleanup

    /// Start the periodic sweep on the current tokio runtime.
    ///
    /// The loop ends when `cancel` fires or when the cache is dropped.
    pub(crate) fn spawn_cleanup_loop(
        cache: Weak<ReachedCache>,
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

                let Some(cache) = cache.upgrade() else {
                    break;
                };

                let before = cache.len();
                cache.cleanup(SystemTime::now());
                tracing::trace!(before, after = cache.len(), "reached cache swept");
            }

            tracing::debug!("reached cache sweep stopped");
        });
    } // end method spawn_cleanup_loop
}
