use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use redis::{Client, aio::ConnectionManager};

use crate::QuotalineError;

/// Connections shared by every [`RedisWindowStore`](super::RedisWindowStore) command.
///
/// Workers issue window commands concurrently; each command takes the next
/// connection in turn, so one slow reply does not hold up the others. Clones
/// share the connections and the rotation.
#[derive(Clone)]
pub struct RedisWindowClient {
    connections: Arc<[ConnectionManager]>,
    next: Arc<AtomicUsize>,
}

impl std::fmt::Debug for RedisWindowClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisWindowClient")
            .field("connections", &self.connections.len())
            .field("next", &self.next)
            .finish()
    }
}

impl RedisWindowClient {
    /// Open `connections` managed connections to `client`.
    ///
    /// Fails with [`QuotalineError::InvalidRedisClientConnectionCount`] when
    /// `connections` is 0, or with the first connection error.
    pub async fn from_client(client: Client, connections: usize) -> Result<Self, QuotalineError> {
        if connections == 0 {
            return Err(QuotalineError::InvalidRedisClientConnectionCount(
                "at least one connection is required".to_string(),
            ));
        }

        let connections = futures::future::try_join_all(
            (0..connections).map(|_| client.get_connection_manager()),
        )
        .await?;

        Ok(Self {
            connections: connections.into(),
            next: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub(crate) fn connection(&self) -> ConnectionManager {
        let index = self.next.fetch_add(1, Ordering::Relaxed) % self.connections.len();
        self.connections[index].clone()
    }
}
