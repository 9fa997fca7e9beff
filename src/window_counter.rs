use std::{sync::Arc, time::Duration};

use crate::{QuotalineError, WindowKeys, store::WindowStore};

/// Establishes the authoritative count of a key's current window.
///
/// # Algorithm
///
/// 1. **Check:** does the count list exist?
/// 2. **Open:** if not, atomically set the start marker (only if absent),
///    append to the count list and set its TTL. The append reply is the count.
/// 3. **Count:** if it does, append only if the list still exists. A reply of
///    `0` means the window expired between steps 1 and 3; spend one retry and
///    start over.
/// 4. **Give up:** with the retry budget spent, report a count of `0`.
///
/// Contention is resolved by optimistic append-and-retry rather than a lock
/// per key. Store errors abort immediately; only the expiry race is retried.
pub(crate) struct WindowCounter<S> {
    store: Arc<S>,
    window: Duration,
    retry_count: u32,
}

impl<S: WindowStore> WindowCounter<S> {
    pub(crate) fn new(store: Arc<S>, window: Duration, retry_count: u32) -> Self {
        Self {
            store,
            window,
            retry_count,
        }
    }

    pub(crate) fn store(&self) -> &S {
        &self.store
    }

    /// Count one operation in the window that is live for `keys` at `now_nanos`.
    ///
    /// `Ok(0)` means every attempt lost the expiry race.
    pub(crate) async fn count(
        &self,
        keys: &WindowKeys,
        now_nanos: u64,
    ) -> Result<u64, QuotalineError> {
        let mut retry = self.retry_count;

        while retry > 0 {
            if !self.store.exists(&keys.count).await? {
                return self.store.open_window(keys, now_nanos, self.window).await;
            }

            let count = self.store.push_if_exists(&keys.count).await?;
            if count > 0 {
                return Ok(count);
            }

            retry -= 1;
            tracing::trace!(key = %keys.count, retry, "window expired before append, retrying");
        }

        tracing::debug!(
            key = %keys.count,
            retry_count = self.retry_count,
            "window count retries exhausted"
        );

        Ok(0)
    } // end method count
}
