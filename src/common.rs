use std::{
    ops::Deref,
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use crate::QuotalineError;

/// Outcome of one admission decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    /// The operation may proceed.
    Allowed,
    /// The key is over budget for its current window.
    ///
    /// This is a normal outcome, distinct from any [`QuotalineError`].
    Rejected {
        /// Best-effort milliseconds until the current window ends, `0` when unknown.
        retry_after_ms: u64,
    },
}

impl RateLimitDecision {
    /// `true` for [`RateLimitDecision::Allowed`].
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }

    pub(crate) fn rejected_until(expire_at: Option<SystemTime>, now: SystemTime) -> Self {
        let retry_after_ms = expire_at
            .and_then(|expire_at| expire_at.duration_since(now).ok())
            .map(millis)
            .unwrap_or(0);

        Self::Rejected { retry_after_ms }
    }
}

/// A validated newtype for the Redis key prefix.
///
/// This is a string with the following constraints:
/// - Must not be empty
/// - Must not be longer than 255 bytes
/// - Must not contain colons
#[derive(Debug, Clone, PartialEq, PartialOrd, Hash, Eq)]
pub struct RedisKey(Arc<str>);

impl RedisKey {
    /// The prefix used when none is configured: `goRateLimit`.
    pub fn default_prefix() -> Self {
        Self(Arc::from("goRateLimit"))
    }
}

impl Default for RedisKey {
    fn default() -> Self {
        Self::default_prefix()
    }
}

impl Deref for RedisKey {
    type Target = Arc<str>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl TryFrom<String> for RedisKey {
    type Error = QuotalineError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value.is_empty() {
            Err(QuotalineError::InvalidRedisKey(
                "Redis key must not be empty".to_string(),
            ))
        } else if value.len() > 255 {
            Err(QuotalineError::InvalidRedisKey(
                "Redis key must not be longer than 255 characters".to_string(),
            ))
        } else if value.contains(':') {
            Err(QuotalineError::InvalidRedisKey(
                "Redis key must not contain colons".to_string(),
            ))
        } else {
            Ok(Self(Arc::from(value)))
        }
    }
}

impl TryFrom<&str> for RedisKey {
    type Error = QuotalineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::try_from(value.to_string())
    }
}

/// The pair of store identifiers that make up one key's window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowKeys {
    /// `<prefix>:<key>:time`, holds the window start in unix nanoseconds.
    pub start: String,
    /// `<prefix>:<key>:count`, a list whose length is the window count.
    pub count: String,
}

#[derive(Clone, Debug)]
pub(crate) struct WindowKeyGenerator {
    prefix: RedisKey,
}

impl WindowKeyGenerator {
    pub(crate) fn new(prefix: RedisKey) -> Self {
        Self { prefix }
    }

    pub(crate) fn window_keys(&self, key: &str) -> WindowKeys {
        WindowKeys {
            start: format!("{}:{}:time", *self.prefix, key),
            count: format!("{}:{}:count", *self.prefix, key),
        }
    }
}

pub(crate) fn unix_nanos(at: SystemTime) -> u64 {
    at.duration_since(UNIX_EPOCH)
        .map(|since_epoch| u64::try_from(since_epoch.as_nanos()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

/// Whole milliseconds in `duration`, saturating at `u64::MAX`.
pub(crate) fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

pub(crate) fn from_unix_nanos(nanos: u64) -> SystemTime {
    UNIX_EPOCH + Duration::from_nanos(nanos)
}
