use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use parking_lot::Mutex;

use crate::{QuotalineError, WindowKeys, store::WindowStore};

#[derive(Debug, Clone, Copy)]
enum Record {
    Marker(u64),
    List(u64),
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    record: Record,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|expires_at| now < expires_at)
    }
}

/// A [`WindowStore`] held in process memory.
///
/// Every operation runs under one lock, so the store is linearizable and the
/// counting protocol keeps its guarantees. Counts are only shared between
/// limiters that share this store instance (wrap it in an `Arc`).
///
/// Expired records are dropped lazily when touched, and in bulk by
/// [`WindowStore::purge_expired`], which the limiter's sweep calls.
#[derive(Debug, Default)]
pub struct MemoryWindowStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryWindowStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records that have not expired.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .lock()
            .values()
            .filter(|entry| entry.is_live(now))
            .count()
    }

    /// `true` when no live record is held.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remaining time-to-live of `key`, `None` if absent or without expiry.
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        let entries = self.entries.lock();
        let entry = entries.get(key).filter(|entry| entry.is_live(now))?;

        entry
            .expires_at
            .map(|expires_at| expires_at.saturating_duration_since(now))
    }

    /// Number of records held, including expired ones not yet purged.
    pub fn raw_len(&self) -> usize {
        self.entries.lock().len()
    }

    fn live<'a>(
        entries: &'a mut HashMap<String, Entry>,
        key: &str,
        now: Instant,
    ) -> Option<&'a mut Entry> {
        if entries.get(key).is_some_and(|entry| !entry.is_live(now)) {
            entries.remove(key);
        }

        entries.get_mut(key)
    }

    fn push(entry: &mut Entry) -> Result<u64, QuotalineError> {
        match &mut entry.record {
            Record::List(len) => {
                *len += 1;
                Ok(*len)
            }
            Record::Marker(_) => Err(wrong_type()),
        }
    }
}

impl WindowStore for MemoryWindowStore {
    async fn exists(&self, key: &str) -> Result<bool, QuotalineError> {
        let now = Instant::now();
        let mut entries = self.entries.lock();

        Ok(Self::live(&mut entries, key, now).is_some())
    }

    async fn open_window(
        &self,
        keys: &WindowKeys,
        start_nanos: u64,
        ttl: Duration,
    ) -> Result<u64, QuotalineError> {
        let now = Instant::now();
        let expires_at = Some(now + ttl);
        let mut entries = self.entries.lock();

        if Self::live(&mut entries, &keys.start, now).is_none() {
            entries.insert(
                keys.start.clone(),
                Entry {
                    record: Record::Marker(start_nanos),
                    expires_at,
                },
            );
        }

        let count = match Self::live(&mut entries, &keys.count, now) {
            Some(entry) => {
                let count = Self::push(entry)?;
                entry.expires_at = expires_at;
                count
            }
            None => {
                entries.insert(
                    keys.count.clone(),
                    Entry {
                        record: Record::List(1),
                        expires_at,
                    },
                );
                1
            }
        };

        Ok(count)
    }

    async fn push_if_exists(&self, key: &str) -> Result<u64, QuotalineError> {
        let now = Instant::now();
        let mut entries = self.entries.lock();

        match Self::live(&mut entries, key, now) {
            Some(entry) => Self::push(entry),
            None => Ok(0),
        }
    }

    async fn window_start(&self, key: &str) -> Result<Option<u64>, QuotalineError> {
        let now = Instant::now();
        let mut entries = self.entries.lock();

        match Self::live(&mut entries, key, now).map(|entry| entry.record) {
            None => Ok(None),
            Some(Record::Marker(start_nanos)) => Ok(Some(start_nanos)),
            Some(Record::List(_)) => Err(wrong_type()),
        }
    }

    fn purge_expired(&self) {
        let now = Instant::now();
        self.entries.lock().retain(|_, entry| entry.is_live(now));
    }
}

fn wrong_type() -> QuotalineError {
    QuotalineError::StoreError(
        "WRONGTYPE operation against a key holding the wrong kind of value".into(),
    )
}
