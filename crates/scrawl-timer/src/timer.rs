//! One-shot and periodic timer jobs with owned, cancelable handles.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::trace;

static NEXT_TIMER_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of one scheduled job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

impl TimerId {
    fn next() -> Self {
        Self(NEXT_TIMER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer-{}", self.0)
    }
}

/// Owned handle to a scheduled job.
///
/// Dropping the handle cancels the job. There is no way to detach a timer:
/// whoever holds the handle decides its lifetime, so deleting a room or
/// clearing a slot is enough to stop everything it scheduled.
#[derive(Debug)]
pub struct TimerHandle {
    id: TimerId,
    task: JoinHandle<()>,
}

impl TimerHandle {
    pub fn id(&self) -> TimerId {
        self.id
    }

    /// Cancels the job. Equivalent to dropping the handle.
    pub fn cancel(self) {}

    /// Returns `true` if the job will never fire again.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Returns `true` if `id` refers to this job.
    pub fn matches(&self, id: TimerId) -> bool {
        self.id == id
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Fires once after `delay`, sending `make(id)` into `tx`.
pub fn spawn_once<T, F>(delay: Duration, tx: mpsc::UnboundedSender<T>, make: F) -> TimerHandle
where
    T: Send + 'static,
    F: FnOnce(TimerId) -> T + Send + 'static,
{
    let id = TimerId::next();
    let task = tokio::spawn(async move {
        time::sleep(delay).await;
        trace!(%id, "one-shot timer fired");
        let _ = tx.send(make(id));
    });
    TimerHandle { id, task }
}

/// Fires every `period`, starting one period from now, sending
/// `make(id, tick)` into `tx` with `tick` counting from 1.
///
/// Late wake-ups skip the missed ticks and resume from now rather than
/// bursting to catch up. The job ends on its own once the receiver is gone.
pub fn spawn_interval<T, F>(period: Duration, tx: mpsc::UnboundedSender<T>, make: F) -> TimerHandle
where
    T: Send + 'static,
    F: Fn(TimerId, u64) -> T + Send + 'static,
{
    let id = TimerId::next();
    let task = tokio::spawn(async move {
        let mut interval = time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut tick = 0u64;
        loop {
            interval.tick().await;
            tick += 1;
            trace!(%id, tick, "interval timer fired");
            if tx.send(make(id, tick)).is_err() {
                break;
            }
        }
    });
    TimerHandle { id, task }
}
