#![doc = include_str!("../README.md")]
#![deny(missing_docs)]
#![forbid(unsafe_code)]

mod rate_limiter;
pub use rate_limiter::*;

mod options;
pub use options::*;

mod error;
pub use error::*;

mod common;
pub use common::{RateLimitDecision, RedisKey, WindowKeys};

pub mod local;

pub mod store;

#[cfg(feature = "redis-tokio")]
pub mod redis;

mod admission;
mod runtime;
mod task;
mod window_counter;
mod worker_pool;

#[cfg(test)]
mod tests;
