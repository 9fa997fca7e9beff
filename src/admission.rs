use std::{
    sync::Arc,
    time::{Duration, SystemTime},
};

use tokio::time::Instant;

use crate::{
    QuotalineError, RateLimitDecision, WindowKeys,
    common::{WindowKeyGenerator, from_unix_nanos, unix_nanos},
    local::ReachedCache,
    store::WindowStore,
    window_counter::WindowCounter,
};

pub(crate) struct AdmissionEngineOptions {
    pub key_generator: WindowKeyGenerator,
    pub limit: u64,
    pub window: Duration,
    pub retry_count: u32,
}

/// Single-pass allow/deny decision for one key.
///
/// # Behavior
///
/// 1. A task whose deadline already passed fails with
///    [`QuotalineError::TaskTimeout`] without touching the store
/// 2. A key held in the [`ReachedCache`] is rejected without touching the store
/// 3. Otherwise one operation is counted in the store:
///    - `1..=limit` admits
///    - `0` (retries exhausted) or above `limit` rejects, and the cache is
///      refreshed from the window start marker on a best-effort basis
pub(crate) struct AdmissionEngine<S> {
    counter: WindowCounter<S>,
    reached: Arc<ReachedCache>,
    key_generator: WindowKeyGenerator,
    limit: u64,
    window: Duration,
}

impl<S: WindowStore> AdmissionEngine<S> {
    pub(crate) fn new(
        store: Arc<S>,
        reached: Arc<ReachedCache>,
        options: AdmissionEngineOptions,
    ) -> Self {
        let AdmissionEngineOptions {
            key_generator,
            limit,
            window,
            retry_count,
        } = options;

        Self {
            counter: WindowCounter::new(store, window, retry_count),
            reached,
            key_generator,
            limit,
            window,
        }
    }

    pub(crate) async fn decide(
        &self,
        key: &str,
        deadline: Instant,
    ) -> Result<RateLimitDecision, QuotalineError> {
        if Instant::now() >= deadline {
            return Err(QuotalineError::TaskTimeout);
        }

        let now = SystemTime::now();

        if let Some(expire_at) = self.reached.reached_until(key, now) {
            return Ok(RateLimitDecision::rejected_until(Some(expire_at), now));
        }

        let keys = self.key_generator.window_keys(key);
        let count = self.counter.count(&keys, unix_nanos(now)).await?;

        if (1..=self.limit).contains(&count) {
            return Ok(RateLimitDecision::Allowed);
        }

        let expire_at = self.refresh_reached(key, &keys, now).await;

        Ok(RateLimitDecision::rejected_until(expire_at, now))
    } // end method decide

    /// Mirror the exhausted window into the reached cache.
    ///
    /// Returns the window end when it is still ahead of `now`.
    async fn refresh_reached(
        &self,
        key: &str,
        keys: &WindowKeys,
        now: SystemTime,
    ) -> Option<SystemTime> {
        let start_nanos = match self.counter.store().window_start(&keys.start).await {
            Ok(start_nanos) => start_nanos?,
            Err(err) => {
                tracing::debug!(error = ?err, key, "failed to read window start, cache not refreshed");
                return None;
            }
        };

        let expire_at = from_unix_nanos(start_nanos).checked_add(self.window)?;
        if now >= expire_at {
            return None;
        }

        self.reached.mark_reached(key, expire_at);

        Some(expire_at)
    } // end method refresh_reached
}
