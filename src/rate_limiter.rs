//! Top-level entrypoint that wires the store, the reached cache and the worker pool.

use std::{sync::Arc, time::Duration};

use parking_lot::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::{
    QuotalineError, RateLimitDecision, RateLimiterOptions,
    admission::{AdmissionEngine, AdmissionEngineOptions},
    common::{WindowKeyGenerator, millis},
    local::ReachedCache,
    store::{WindowStore, spawn_purge_loop},
    task::TaskPool,
    worker_pool::{WorkerPool, WorkerPoolOptions},
};

#[cfg(feature = "redis-tokio")]
use crate::redis::{RedisWindowClient, RedisWindowStore};

/// Distributed fixed-window rate limiter.
///
/// Each call to [`RateLimiter::allow`] becomes a task on a bounded queue. A
/// fixed set of workers decides each task against the shared store, skipping
/// the store for keys the local [`ReachedCache`] already knows are exhausted.
///
/// # Semantics
///
/// - **Fixed window:** the first counted operation for a key opens a window of
///   `window` length; at most `limit` operations are admitted until it expires
/// - **Shared budget:** every limiter that uses the same store and prefix draws
///   from the same windows
/// - **Bounded latency:** every call resolves by its deadline, either with a
///   decision or with [`QuotalineError::TaskTimeout`]
/// - **Backpressure:** when the queue is full, callers wait for a free slot
///
/// A decision that has already started is not interrupted by its deadline; its
/// late outcome is discarded.
///
/// # Runtime
///
/// Construction spawns the workers and the cache sweep, so it must happen
/// inside a Tokio runtime.
///
/// # Examples
///
/// ```no_run
/// use std::time::Duration;
/// use quotaline::{RateLimiter, RateLimiterOptions};
/// use quotaline::redis::{RedisWindowClient, RedisWindowStore};
///
/// # async fn run() -> Result<(), quotaline::QuotalineError> {
/// let client = redis::Client::open("redis://127.0.0.1:6379/")?;
/// let store = RedisWindowStore::new(RedisWindowClient::from_client(client, 1).await?);
///
/// let limiter = RateLimiter::new(
///     Some(store),
///     RateLimiterOptions {
///         limit: 5,
///         window: Duration::from_secs(1),
///         worker_count: 4,
///         ..Default::default()
///     },
/// )?;
///
/// if limiter.allow("user_123").await?.is_allowed() {
///     // proceed
/// }
/// # Ok(())
/// # }
/// ```
pub struct RateLimiter<S: WindowStore> {
    store: Arc<S>,
    reached: Arc<ReachedCache>,
    tasks: Arc<TaskPool>,
    workers: WorkerPool,
    task_timeout: Duration,
    sweep_interval: Duration,
    cleanup_cancel: Mutex<Option<CancellationToken>>,
}

impl<S: WindowStore> RateLimiter<S> {
    /// Create a limiter over `store`.
    ///
    /// Fails with [`QuotalineError::ClientMissing`] when `store` is `None`.
    /// Out-of-range options fall back to their defaults.
    pub fn new(store: Option<S>, options: RateLimiterOptions) -> Result<Self, QuotalineError> {
        let Some(store) = store else {
            return Err(QuotalineError::ClientMissing);
        };

        let options = options.resolve();
        let store = Arc::new(store);
        let reached = Arc::new(ReachedCache::new());
        let tasks = Arc::new(TaskPool::new(options.queue_capacity));

        let engine = Arc::new(AdmissionEngine::new(
            Arc::clone(&store),
            Arc::clone(&reached),
            AdmissionEngineOptions {
                key_generator: WindowKeyGenerator::new(options.prefix.clone()),
                limit: options.limit,
                window: options.window,
                retry_count: options.retry_count,
            },
        ));

        let workers = WorkerPool::run(
            engine,
            Arc::clone(&tasks),
            WorkerPoolOptions {
                queue_capacity: options.queue_capacity,
                worker_count: options.worker_count,
            },
        );

        tracing::debug!(
            prefix = &**options.prefix,
            limit = options.limit,
            window_ms = millis(options.window),
            workers = options.worker_count,
            queue_capacity = options.queue_capacity,
            "rate limiter started"
        );

        let limiter = Self {
            store,
            reached,
            tasks,
            workers,
            task_timeout: options.task_timeout,
            sweep_interval: options.sweep_interval,
            cleanup_cancel: Mutex::new(None),
        };

        limiter.run_cleanup_loop();

        Ok(limiter)
    } // end constructor

    /// Count one operation for `key` and decide whether it may proceed.
    ///
    /// The deadline is `task_timeout` from now.
    ///
    /// # Returns
    ///
    /// - `Ok(Allowed)`: within budget
    /// - `Ok(Rejected { .. })`: over budget for the current window
    /// - `Err(TaskTimeout)`: no decision before the deadline
    /// - `Err(Closed)`: the limiter was shut down
    /// - any store error, passed through
    pub async fn allow(&self, key: &str) -> Result<RateLimitDecision, QuotalineError> {
        self.submit(key, Instant::now() + self.task_timeout).await
    }

    /// Like [`RateLimiter::allow`], bounded by the earlier of `deadline` and `task_timeout`.
    pub async fn allow_until(
        &self,
        key: &str,
        deadline: Instant,
    ) -> Result<RateLimitDecision, QuotalineError> {
        let deadline = deadline.min(Instant::now() + self.task_timeout);
        self.submit(key, deadline).await
    }

    async fn submit(
        &self,
        key: &str,
        deadline: Instant,
    ) -> Result<RateLimitDecision, QuotalineError> {
        let (task, receipt) = self.tasks.acquire(key, deadline);

        if let Err(task) = self.workers.enqueue(task).await {
            self.tasks.release(task);
            return Err(QuotalineError::Closed);
        }

        receipt.wait_result().await
    } // end method submit

    /// The process-local cache of exhausted keys.
    pub fn reached(&self) -> &ReachedCache {
        &self.reached
    }

    /// The backing store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Tasks waiting in the queue.
    pub fn queued(&self) -> usize {
        self.workers.queued()
    }

    /// Idle task envelopes held for reuse.
    pub fn pooled_tasks(&self) -> usize {
        self.tasks.idle()
    }

    /// Start the sweep of the reached cache and of expired store records with
    /// the configured interval.
    ///
    /// Replaces a sweep that is already running.
    pub fn run_cleanup_loop(&self) {
        self.run_cleanup_loop_with_config(self.sweep_interval);
    }

    /// Start the sweep with `interval`, replacing any running sweep.
    pub fn run_cleanup_loop_with_config(&self, interval: Duration) {
        let cancel = CancellationToken::new();

        if let Some(previous) = self.cleanup_cancel.lock().replace(cancel.clone()) {
            previous.cancel();
        }

        ReachedCache::spawn_cleanup_loop(Arc::downgrade(&self.reached), interval, cancel.clone());
        spawn_purge_loop(Arc::downgrade(&self.store), interval, cancel);
    }

    /// Stop the sweep. Idempotent.
    pub fn stop_cleanup_loop(&self) {
        if let Some(cancel) = self.cleanup_cancel.lock().take() {
            cancel.cancel();
        }
    }

    /// Stop accepting work, let the workers drain the queue and wait for them.
    ///
    /// Calls made after this return [`QuotalineError::Closed`].
    pub async fn shutdown(&self) {
        self.stop_cleanup_loop();

        if self.workers.close() {
            tracing::debug!(queued = self.workers.queued(), "rate limiter shutting down");
        }

        self.workers.join().await;
    }

    /// `true` once [`RateLimiter::shutdown`] has been called.
    pub fn is_closed(&self) -> bool {
        self.workers.is_closed()
    }
}

#[cfg(feature = "redis-tokio")]
impl RateLimiter<RedisWindowStore> {
    /// Create a limiter backed by Redis.
    pub fn redis(
        client: RedisWindowClient,
        options: RateLimiterOptions,
    ) -> Result<Self, QuotalineError> {
        Self::new(Some(RedisWindowStore::new(client)), options)
    }
}

impl<S: WindowStore> Drop for RateLimiter<S> {
    fn drop(&mut self) {
        self.stop_cleanup_loop();
        self.workers.close();
    }
}
