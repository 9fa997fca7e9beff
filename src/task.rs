use parking_lot::Mutex;
use tokio::{sync::oneshot, time::Instant};

use crate::{QuotalineError, RateLimitDecision};

pub(crate) type TaskOutcome = Result<RateLimitDecision, QuotalineError>;

/// One admission request travelling through the queue.
///
/// The result slot takes at most one outcome; later deliveries are dropped.
#[derive(Debug, Default)]
pub(crate) struct Task {
    key: String,
    deadline: Option<Instant>,
    result: Option<oneshot::Sender<TaskOutcome>>,
}

impl Task {
    pub(crate) fn key(&self) -> &str {
        &self.key
    }

    /// `None` once the task has been reset.
    pub(crate) fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Deliver `outcome` if nothing was delivered yet. Never blocks.
    pub(crate) fn set_result(&mut self, outcome: TaskOutcome) {
        if let Some(sender) = self.result.take() {
            // The caller may already have given up on the receipt.
            let _ = sender.send(outcome);
        }
    }

    /// Clear every field. The key keeps its allocation for the next use.
    pub(crate) fn reset(&mut self) {
        self.key.clear();
        self.deadline = None;
        self.result = None;
    }
}

/// The caller's half of a [`Task`].
#[derive(Debug)]
pub(crate) struct TaskReceipt {
    receiver: oneshot::Receiver<TaskOutcome>,
    deadline: Instant,
}

impl TaskReceipt {
    /// Wait for the outcome or the deadline, whichever comes first.
    ///
    /// When both are ready together the outcome wins.
    pub(crate) async fn wait_result(self) -> TaskOutcome {
        match tokio::time::timeout_at(self.deadline, self.receiver).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(QuotalineError::TaskClose),
            Err(_) => Err(QuotalineError::TaskTimeout),
        }
    }
}

/// Free list of reset [`Task`] envelopes.
#[derive(Debug)]
pub(crate) struct TaskPool {
    free: Mutex<Vec<Task>>,
    capacity: usize,
}

impl TaskPool {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            free: Mutex::new(Vec::with_capacity(capacity)),
            capacity,
        }
    }

    pub(crate) fn acquire(&self, key: &str, deadline: Instant) -> (Task, TaskReceipt) {
        let mut task = self.free.lock().pop().unwrap_or_default();
        let (sender, receiver) = oneshot::channel();

        task.key.push_str(key);
        task.deadline = Some(deadline);
        task.result = Some(sender);

        (task, TaskReceipt { receiver, deadline })
    }

    pub(crate) fn release(&self, mut task: Task) {
        task.reset();

        let mut free = self.free.lock();
        if free.len() < self.capacity {
            free.push(task);
        }
    }

    pub(crate) fn idle(&self) -> usize {
        self.free.lock().len()
    }
}
