use std::{future::Future, time::Duration};

use tokio::{task::JoinHandle, time::MissedTickBehavior};

pub(crate) type Interval = tokio::time::Interval;

/// An interval whose first tick completes after `period`, not immediately.
pub(crate) fn new_interval(period: Duration) -> Interval {
    let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

pub(crate) async fn tick(interval: &mut Interval) {
    interval.tick().await;
}

pub(crate) fn spawn_task<F>(fut: F) -> JoinHandle<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(fut)
}
