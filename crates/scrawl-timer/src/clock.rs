//! Clock abstraction so registries can be tested without real waiting.

use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::time::Instant;

/// A source of "now".
///
/// `now()` is a monotonic instant used for every elapsed-time comparison
/// (reconnection windows, idle sweeps). `unix_millis()` is wall-clock time
/// used only for values shown to clients.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> Instant;

    fn unix_millis(&self) -> u64;
}

/// Shared handle to an injected clock.
pub type SharedClock = Arc<dyn Clock>;

/// The real clock.
///
/// Uses `tokio::time::Instant`, so under `#[tokio::test(start_paused = true)]`
/// it follows the paused test clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn unix_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// A clock that only moves when told to.
///
/// Cloning shares the underlying time, so a test keeps one clone and hands
/// the other to the registry under test.
#[derive(Debug, Clone)]
pub struct ManualClock {
    inner: Arc<Mutex<ManualTime>>,
}

#[derive(Debug)]
struct ManualTime {
    now: Instant,
    unix_millis: u64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(ManualTime {
                now: Instant::now(),
                unix_millis: 1_700_000_000_000,
            })),
        }
    }

    /// Moves time forward.
    pub fn advance(&self, by: Duration) {
        let mut t = self.lock();
        t.now += by;
        t.unix_millis += by.as_millis() as u64;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ManualTime> {
        // A poisoned clock only means a test panicked mid-advance.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.lock().now
    }

    fn unix_millis(&self) -> u64 {
        self.lock().unix_millis
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_advance_moves_both_readings() {
        let clock = ManualClock::new();
        let start = clock.now();
        let start_ms = clock.unix_millis();

        clock.advance(Duration::from_secs(30));

        assert_eq!(clock.now() - start, Duration::from_secs(30));
        assert_eq!(clock.unix_millis() - start_ms, 30_000);
    }

    #[test]
    fn test_manual_clock_clones_share_time() {
        let clock = ManualClock::new();
        let shared: SharedClock = Arc::new(clock.clone());
        let before = shared.now();

        clock.advance(Duration::from_secs(5));

        assert_eq!(shared.now() - before, Duration::from_secs(5));
    }

    #[test]
    fn test_system_clock_unix_millis_is_nonzero() {
        assert!(SystemClock.unix_millis() > 0);
    }
}
