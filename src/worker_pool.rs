use std::sync::Arc;

use async_channel::{Receiver, Sender};
use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::{
    QuotalineError,
    admission::AdmissionEngine,
    runtime::spawn_task,
    store::WindowStore,
    task::{Task, TaskPool},
};

pub(crate) struct WorkerPoolOptions {
    pub queue_capacity: usize,
    pub worker_count: usize,
}

/// Bounded task queue drained by a fixed set of workers.
///
/// Enqueueing waits while the queue is full; work is never dropped. Each
/// worker takes one task at a time, runs the admission decision to completion
/// and delivers the outcome, then returns the envelope to the [`TaskPool`].
///
/// Closing the queue lets workers drain what is already queued and exit.
pub(crate) struct WorkerPool {
    sender: Sender<Task>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    pub(crate) fn run<S: WindowStore>(
        engine: Arc<AdmissionEngine<S>>,
        tasks: Arc<TaskPool>,
        options: WorkerPoolOptions,
    ) -> Self {
        let WorkerPoolOptions {
            queue_capacity,
            worker_count,
        } = options;

        let (sender, receiver) = async_channel::bounded(queue_capacity);

        let workers = (0..worker_count)
            .map(|worker_id| {
                spawn_task(Self::work(
                    worker_id,
                    receiver.clone(),
                    Arc::clone(&engine),
                    Arc::clone(&tasks),
                ))
            })
            .collect();

        Self {
            sender,
            workers: Mutex::new(workers),
        }
    } // end method run

    async fn work<S: WindowStore>(
        worker_id: usize,
        receiver: Receiver<Task>,
        engine: Arc<AdmissionEngine<S>>,
        tasks: Arc<TaskPool>,
    ) {
        while let Ok(mut task) = receiver.recv().await {
            let outcome = match task.deadline() {
                Some(deadline) => engine.decide(task.key(), deadline).await,
                None => Err(QuotalineError::TaskTimeout),
            };

            if let Err(err) = &outcome
                && !matches!(err, QuotalineError::TaskTimeout)
            {
                tracing::debug!(worker_id, error = ?err, key = task.key(), "admission failed");
            }

            task.set_result(outcome);
            tasks.release(task);
        }

        tracing::debug!(worker_id, "worker stopped");
    } // end method work

    /// Queue `task`, waiting for a free slot. Hands the task back if the queue is closed.
    pub(crate) async fn enqueue(&self, task: Task) -> Result<(), Task> {
        self.sender
            .send(task)
            .await
            .map_err(|async_channel::SendError(task)| task)
    }

    /// Stop accepting tasks. Returns `false` if the queue was already closed.
    pub(crate) fn close(&self) -> bool {
        self.sender.close()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// Wait for every worker to drain the queue and exit.
    pub(crate) async fn join(&self) {
        let workers = std::mem::take(&mut *self.workers.lock());

        for result in futures::future::join_all(workers).await {
            if let Err(err) = result {
                tracing::error!(error = ?err, "worker task failed");
            }
        }
    }

    pub(crate) fn queued(&self) -> usize {
        self.sender.len()
    }
}
