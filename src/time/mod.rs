//! Time sources for the engine
//!
//! Every timestamp the engine stores is a [`Duration`] offset from a
//! monotonic epoch chosen when the clock is created. The scheduler reads the
//! clock twice per tick (before and after transmitting), so the clock is
//! behind a trait and can be replaced by a [`ManualClock`] in tests.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Monotonic time source
pub trait Clock: Send + Sync {
    /// Time elapsed since the clock's epoch
    fn now(&self) -> Duration;
}

/// Clock backed by `tokio::time::Instant`
///
/// Follows tokio's paused clock when the runtime is started paused.
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    epoch: tokio::time::Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        MonotonicClock {
            epoch: tokio::time::Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Duration {
        self.epoch.elapsed()
    }
}

/// Clock that only moves when told to
///
/// Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    micros: Arc<AtomicU64>,
    step_micros: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(start: Duration) -> Self {
        let clock = ManualClock::default();
        clock.set(start);
        clock
    }

    pub fn set(&self, now: Duration) {
        self.micros.store(now.as_micros() as u64, Ordering::SeqCst);
    }

    pub fn advance(&self, by: Duration) {
        self.micros.fetch_add(by.as_micros() as u64, Ordering::SeqCst);
    }

    /// Makes every subsequent read advance the clock by `step`
    ///
    /// Used to simulate time spent between two reads, e.g. a slow transmit.
    pub fn auto_advance(&self, step: Duration) {
        self.step_micros.store(step.as_micros() as u64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        let step = self.step_micros.load(Ordering::SeqCst);
        let micros = self.micros.fetch_add(step, Ordering::SeqCst);
        Duration::from_micros(micros)
    }
}

/// Utility functions for time management
pub mod util {
    use std::time::Duration;

    /// Elapsed time from `earlier` to `now`, zero if the clock went backwards
    pub fn elapsed(now: Duration, earlier: Duration) -> Duration {
        now.saturating_sub(earlier)
    }

    /// Formats a duration as whole microseconds for log fields
    pub fn as_micros(duration: Duration) -> u64 {
        duration.as_micros().min(u64::MAX as u128) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock() {
        let clock = ManualClock::new(Duration::from_millis(10));
        assert_eq!(clock.now(), Duration::from_millis(10));

        clock.advance(Duration::from_millis(5));
        assert_eq!(clock.now(), Duration::from_millis(15));

        let shared = clock.clone();
        shared.set(Duration::from_secs(1));
        assert_eq!(clock.now(), Duration::from_secs(1));
    }

    #[test]
    fn test_manual_clock_auto_advance() {
        let clock = ManualClock::new(Duration::ZERO);
        clock.auto_advance(Duration::from_micros(300));
        assert_eq!(clock.now(), Duration::ZERO);
        assert_eq!(clock.now(), Duration::from_micros(300));
        assert_eq!(clock.now(), Duration::from_micros(600));
    }

    #[test]
    fn test_elapsed_saturates() {
        assert_eq!(
            util::elapsed(Duration::from_millis(5), Duration::from_millis(9)),
            Duration::ZERO
        );
        assert_eq!(
            util::elapsed(Duration::from_millis(9), Duration::from_millis(5)),
            Duration::from_millis(4)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_monotonic_clock_follows_tokio_time() {
        let clock = MonotonicClock::new();
        tokio::time::advance(Duration::from_millis(250)).await;
        assert!(clock.now() >= Duration::from_millis(250));
    }
}
