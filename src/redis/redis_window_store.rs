use std::time::Duration;

use redis::Value;

use crate::{
    QuotalineError, WindowKeys, common::millis, redis::RedisWindowClient, store::WindowStore,
};

/// A [`WindowStore`] backed by Redis.
///
/// Every process that uses the same server and prefix shares the same
/// windows. Window creation runs as a `MULTI`/`EXEC` transaction; counting an
/// existing window uses `RPUSHX`, which fails to append once the window has
/// expired.
#[derive(Debug, Clone)]
pub struct RedisWindowStore {
    client: RedisWindowClient,
}

impl RedisWindowStore {
    /// Create a store over `client`.
    pub fn new(client: RedisWindowClient) -> Self {
        Self { client }
    }

    /// Access the underlying client.
    pub fn client(&self) -> &RedisWindowClient {
        &self.client
    }
}

impl WindowStore for RedisWindowStore {
    async fn exists(&self, key: &str) -> Result<bool, QuotalineError> {
        let mut connection = self.client.connection();

        let exists: bool = redis::cmd("EXISTS")
            .arg(key)
            .query_async(&mut connection)
            .await?;

        Ok(exists)
    }

    async fn open_window(
        &self,
        keys: &WindowKeys,
        start_nanos: u64,
        ttl: Duration,
    ) -> Result<u64, QuotalineError> {
        let ttl_ms = ttl_millis(ttl);
        let mut connection = self.client.connection();

        let reply: Vec<Value> = redis::pipe()
            .atomic()
            .cmd("SET")
            .arg(&keys.start)
            .arg(start_nanos)
            .arg("NX")
            .arg("PX")
            .arg(ttl_ms)
            .ignore()
            .cmd("RPUSH")
            .arg(&keys.count)
            .arg("")
            .cmd("PEXPIRE")
            .arg(&keys.count)
            .arg(ttl_ms)
            .ignore()
            .query_async(&mut connection)
            .await?;

        count_from_reply(&reply)
    }

    async fn push_if_exists(&self, key: &str) -> Result<u64, QuotalineError> {
        let mut connection = self.client.connection();

        let count: u64 = redis::cmd("RPUSHX")
            .arg(key)
            .arg(1)
            .query_async(&mut connection)
            .await?;

        Ok(count)
    }

    async fn window_start(&self, key: &str) -> Result<Option<u64>, QuotalineError> {
        let mut connection = self.client.connection();

        let start_nanos: Option<u64> = redis::cmd("GET")
            .arg(key)
            .query_async(&mut connection)
            .await?;

        Ok(start_nanos)
    }
}

/// Read the `RPUSH` length out of the transaction reply.
///
/// The `SET` and `PEXPIRE` replies are ignored, so the append's reply is the
/// only element left.
pub(crate) fn count_from_reply(reply: &[Value]) -> Result<u64, QuotalineError> {
    match reply.first() {
        Some(Value::Int(count)) => {
            u64::try_from(*count).map_err(|_| QuotalineError::IncrSliceOutOfRange)
        }
        _ => Err(QuotalineError::IncrSliceOutOfRange),
    }
}

fn ttl_millis(ttl: Duration) -> u64 {
    millis(ttl).max(1)
}
