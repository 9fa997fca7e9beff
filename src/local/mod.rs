//! In-process state kept next to the shared store.
//!
//! # Key Characteristics
//!
//! - **Thread-safe:** Safe for concurrent use across every worker
//! - **Process-scoped:** Each process keeps its own cache; nothing is shared
//! - **Advisory:** The store stays authoritative, the cache only short-circuits
//!   rejections that the store already reported
//!
//! # Examples
//!
//! ```
//! use std::time::{Duration, SystemTime};
//! use quotaline::local::ReachedCache;
//!
//! let cache = ReachedCache::new();
//! let now = SystemTime::now();
//!
//! cache.mark_reached("user_123", now + Duration::from_secs(1));
//! assert!(!cache.is_allowed("user_123", now));
//! assert!(cache.is_allowed("user_123", now + Duration::from_secs(2)));
//! ```

mod reached_cache;
pub use reached_cache::*;
