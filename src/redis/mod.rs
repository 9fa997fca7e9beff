//! Redis-backed [`WindowStore`](crate::store::WindowStore).
//!
//! # Requirements
//!
//! - **Runtime:** Tokio (feature `redis-tokio`)
//! - **Commands:** `EXISTS`, `SET NX PX`, `RPUSH`, `RPUSHX`, `PEXPIRE`, `GET`,
//!   `MULTI`/`EXEC`
//!
//! # Data model
//!
//! For prefix `p` and key `k`:
//!
//! - `p:k:time`: string, window start in unix nanoseconds
//! - `p:k:count`: list, one element per counted operation
//!
//! Both keys carry the window length as their TTL and are created in the same
//! transaction, so they expire together.

mod common;
pub use common::*;

mod redis_window_store;
pub use redis_window_store::*;
