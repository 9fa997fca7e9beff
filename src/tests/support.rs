use std::{
    collections::VecDeque,
    io,
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};

use parking_lot::Mutex;

use crate::{
    QuotalineError, WindowKeys,
    store::{MemoryWindowStore, WindowStore},
};

#[derive(Debug, Default)]
pub(super) struct Calls {
    pub exists: AtomicUsize,
    pub open_window: AtomicUsize,
    pub push_if_exists: AtomicUsize,
    pub window_start: AtomicUsize,
}

impl Calls {
    pub(super) fn total(&self) -> usize {
        self.exists.load(Ordering::SeqCst)
            + self.open_window.load(Ordering::SeqCst)
            + self.push_if_exists.load(Ordering::SeqCst)
            + self.window_start.load(Ordering::SeqCst)
    }
}

/// A memory store that records calls and can delay every command.
#[derive(Debug, Default)]
pub(super) struct InstrumentedStore {
    pub inner: MemoryWindowStore,
    pub calls: Calls,
    pub delay: Duration,
}

impl InstrumentedStore {
    pub(super) fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Default::default()
        }
    }

    async fn pause(&self) {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }
}

impl WindowStore for InstrumentedStore {
    async fn exists(&self, key: &str) -> Result<bool, QuotalineError> {
        self.calls.exists.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        self.inner.exists(key).await
    }

    async fn open_window(
        &self,
        keys: &WindowKeys,
        start_nanos: u64,
        ttl: Duration,
    ) -> Result<u64, QuotalineError> {
        self.calls.open_window.fetch_add(1, Ordering::SeqCst);
        self.inner.open_window(keys, start_nanos, ttl).await
    }

    async fn push_if_exists(&self, key: &str) -> Result<u64, QuotalineError> {
        self.calls.push_if_exists.fetch_add(1, Ordering::SeqCst);
        self.inner.push_if_exists(key).await
    }

    async fn window_start(&self, key: &str) -> Result<Option<u64>, QuotalineError> {
        self.calls.window_start.fetch_add(1, Ordering::SeqCst);
        self.inner.window_start(key).await
    }
}

/// Reports the count list as present but replays scripted `RPUSHX` replies,
/// defaulting to `0` (the window vanished) once the script runs out.
#[derive(Debug, Default)]
pub(super) struct RacingStore {
    pub push_replies: Mutex<VecDeque<u64>>,
    pub window_start: Option<u64>,
    pub calls: Calls,
}

impl RacingStore {
    pub(super) fn with_replies(replies: impl IntoIterator<Item = u64>) -> Self {
        Self {
            push_replies: Mutex::new(replies.into_iter().collect()),
            ..Default::default()
        }
    }
}

impl WindowStore for RacingStore {
    async fn exists(&self, _key: &str) -> Result<bool, QuotalineError> {
        self.calls.exists.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }

    async fn open_window(
        &self,
        _keys: &WindowKeys,
        _start_nanos: u64,
        _ttl: Duration,
    ) -> Result<u64, QuotalineError> {
        self.calls.open_window.fetch_add(1, Ordering::SeqCst);
        Ok(1)
    }

    async fn push_if_exists(&self, _key: &str) -> Result<u64, QuotalineError> {
        self.calls.push_if_exists.fetch_add(1, Ordering::SeqCst);
        Ok(self.push_replies.lock().pop_front().unwrap_or(0))
    }

    async fn window_start(&self, _key: &str) -> Result<Option<u64>, QuotalineError> {
        self.calls.window_start.fetch_add(1, Ordering::SeqCst);
        Ok(self.window_start)
    }
}

/// A store whose server is unreachable.
#[derive(Debug, Default)]
pub(super) struct UnreachableStore {
    pub calls: Calls,
}

fn refused() -> QuotalineError {
    QuotalineError::StoreError(Box::new(io::Error::new(
        io::ErrorKind::ConnectionRefused,
        "connection refused",
    )))
}

impl WindowStore for UnreachableStore {
    async fn exists(&self, _key: &str) -> Result<bool, QuotalineError> {
        self.calls.exists.fetch_add(1, Ordering::SeqCst);
        Err(refused())
    }

    async fn open_window(
        &self,
        _keys: &WindowKeys,
        _start_nanos: u64,
        _ttl: Duration,
    ) -> Result<u64, QuotalineError> {
        self.calls.open_window.fetch_add(1, Ordering::SeqCst);
        Err(refused())
    }

    async fn push_if_exists(&self, _key: &str) -> Result<u64, QuotalineError> {
        self.calls.push_if_exists.fetch_add(1, Ordering::SeqCst);
        Err(refused())
    }

    async fn window_start(&self, _key: &str) -> Result<Option<u64>, QuotalineError> {
        self.calls.window_start.fetch_add(1, Ordering::SeqCst);
        Err(refused())
    }
}

pub(super) fn keys(key: &str) -> WindowKeys {
    WindowKeys {
        start: format!("test:{key}:time"),
        count: format!("test:{key}:count"),
    }
}
