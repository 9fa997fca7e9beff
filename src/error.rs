/// Error type for this crate.
///
/// A rejected admission is not an error: it is reported as
/// [`RateLimitDecision::Rejected`](crate::RateLimitDecision::Rejected).
#[derive(Debug, thiserror::Error)]
pub enum QuotalineError {
    /// The limiter was constructed without a store handle.
    #[error("store client is missing")]
    ClientMissing,

    /// The task deadline elapsed before a decision was delivered.
    #[error("task timeout")]
    TaskTimeout,

    /// The result slot was dropped without a recorded decision.
    #[error("task closed without a result")]
    TaskClose,

    /// The store's transaction reply could not be read as a count.
    #[error("incr slice out of range")]
    IncrSliceOutOfRange,

    /// The limiter has been shut down and no longer accepts tasks.
    #[error("rate limiter is closed")]
    Closed,

    /// Invalid Redis key or prefix.
    #[error("invalid redis key: {0}")]
    InvalidRedisKey(String),

    /// Invalid Redis connection count.
    #[error("invalid redis client connection count: {0}")]
    InvalidRedisClientConnectionCount(String),

    /// Redis error.
    #[cfg(feature = "redis-tokio")]
    #[error("redis error: {0}")]
    RedisError(#[from] redis::RedisError),

    /// Error raised by a non-Redis [`WindowStore`](crate::store::WindowStore).
    #[error("store error: {0}")]
    StoreError(Box<dyn std::error::Error + Send + Sync>),
}
