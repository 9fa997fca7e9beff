use std::time::Duration;

use crate::RedisKey;

const DEFAULT_LIMIT: u64 = 1;
const DEFAULT_WINDOW: Duration = Duration::from_secs(1);
const DEFAULT_TASK_TIMEOUT: Duration = Duration::from_secs(1);
const DEFAULT_QUEUE_CAPACITY: usize = 128;
const DEFAULT_RETRY_COUNT: u32 = 3;
const DEFAULT_WORKER_COUNT: usize = 1;
const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(10);
const MIN_DURATION: Duration = Duration::from_millis(1);

/// Configuration for [`RateLimiter`](crate::RateLimiter).
///
/// Every field has a default. Values outside the valid range are replaced by
/// the default when the limiter is built, so a zeroed struct behaves like
/// [`RateLimiterOptions::default`].
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use quotaline::RateLimiterOptions;
///
/// let options = RateLimiterOptions {
///     limit: 10,
///     window: Duration::from_secs(60),
///     worker_count: 4,
///     ..Default::default()
/// };
/// ```
#[derive(Clone, Debug)]
pub struct RateLimiterOptions {
    /// Namespace for store keys: `<prefix>:<key>:time` and `<prefix>:<key>:count`.
    ///
    /// `None` means `goRateLimit`.
    pub prefix: Option<RedisKey>,

    /// Admissions per window. Must be at least 1, default 1.
    pub limit: u64,

    /// Window length. Must be at least 1ms, default 1s.
    pub window: Duration,

    /// Per-request deadline. Must be at least 1ms, default 1s.
    pub task_timeout: Duration,

    /// Capacity of the bounded task queue. Must be at least 1, default 128.
    pub queue_capacity: usize,

    /// How many times the counting protocol retries after losing a race
    /// against window expiry. Must be at least 1, default 3.
    pub retry_count: u32,

    /// Number of concurrent decision workers. Must be at least 1, default 1.
    pub worker_count: usize,

    /// Period of the reached-cache sweep. Must be at least 1ms, default 10s.
    pub sweep_interval: Duration,
}

impl Default for RateLimiterOptions {
    fn default() -> Self {
        Self {
            prefix: None,
            limit: DEFAULT_LIMIT,
            window: DEFAULT_WINDOW,
            task_timeout: DEFAULT_TASK_TIMEOUT,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            retry_count: DEFAULT_RETRY_COUNT,
            worker_count: DEFAULT_WORKER_COUNT,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

/// Options after default resolution; every value is in range.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct ResolvedOptions {
    pub prefix: RedisKey,
    pub limit: u64,
    pub window: Duration,
    pub task_timeout: Duration,
    pub queue_capacity: usize,
    pub retry_count: u32,
    pub worker_count: usize,
    pub sweep_interval: Duration,
}

impl RateLimiterOptions {
    pub(crate) fn resolve(self) -> ResolvedOptions {
        ResolvedOptions {
            prefix: self.prefix.unwrap_or_default(),
            limit: at_least("limit", self.limit, 1, DEFAULT_LIMIT),
            window: duration_or_default("window", self.window, DEFAULT_WINDOW),
            task_timeout: duration_or_default(
                "task_timeout",
                self.task_timeout,
                DEFAULT_TASK_TIMEOUT,
            ),
            queue_capacity: at_least(
                "queue_capacity",
                self.queue_capacity,
                1,
                DEFAULT_QUEUE_CAPACITY,
            ),
            retry_count: at_least("retry_count", self.retry_count, 1, DEFAULT_RETRY_COUNT),
            worker_count: at_least("worker_count", self.worker_count, 1, DEFAULT_WORKER_COUNT),
            sweep_interval: duration_or_default(
                "sweep_interval",
                self.sweep_interval,
                DEFAULT_SWEEP_INTERVAL,
            ),
        }
    }
}

fn at_least<T>(name: &'static str, value: T, min: T, default: T) -> T
where
    T: PartialOrd + Copy + std::fmt::Debug,
{
    if value < min {
        tracing::warn!(option = name, ?value, ?default, "option below minimum, using default");
        return default;
    }

    value
}

fn duration_or_default(name: &'static str, value: Duration, default: Duration) -> Duration {
    if value < MIN_DURATION {
        tracing::warn!(option = name, ?value, ?default, "duration below 1ms, using default");
        return default;
    }

    value
}
