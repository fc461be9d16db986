//! Injectable time source for sweep pacing and the confirmation delay.

#![allow(missing_docs)]

use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::scheduler::cancel::CancelToken;

/// Granularity at which long sleeps re-check the cancel token.
const SLEEP_SLICE: Duration = Duration::from_millis(100);

/// Monotonic clock with a blocking sleep.
pub trait Clock: Send + Sync {
    /// Time since the clock was created.
    fn elapsed(&self) -> Duration;

    fn sleep(&self, duration: Duration);
}

/// Real time.
#[derive(Debug)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn elapsed(&self) -> Duration {
        self.origin.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

#[derive(Debug, Default)]
struct ManualState {
    elapsed: Duration,
    sleeps: Vec<Duration>,
    cancel_at: Option<(Duration, CancelToken)>,
}

/// Clock that advances only when slept on. Sleeping returns immediately.
#[derive(Debug, Default)]
pub struct ManualClock {
    state: Mutex<ManualState>,
}

impl ManualClock {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel `token` once the clock has advanced by at least `after`.
    pub fn cancel_after(&self, after: Duration, token: CancelToken) {
        self.state.lock().cancel_at = Some((after, token));
    }

    /// Every sleep requested so far, in order.
    #[must_use]
    pub fn sleeps(&self) -> Vec<Duration> {
        self.state.lock().sleeps.clone()
    }

    /// Total simulated time slept.
    #[must_use]
    pub fn total_slept(&self) -> Duration {
        self.state.lock().sleeps.iter().sum()
    }
}

impl Clock for ManualClock {
    fn elapsed(&self) -> Duration {
        self.state.lock().elapsed
    }

    fn sleep(&self, duration: Duration) {
        let mut state = self.state.lock();
        state.elapsed += duration;
        state.sleeps.push(duration);
        let now = state.elapsed;
        if let Some((at, token)) = &state.cancel_at
            && now >= *at
        {
            token.cancel();
        }
    }
}

/// Sleep `total` in slices, stopping early if `cancel` fires.
/// Returns `false` when cancelled.
pub fn sleep_unless_cancelled(clock: &dyn Clock, total: Duration, cancel: &CancelToken) -> bool {
    let mut remaining = total;
    while !remaining.is_zero() {
        if cancel.is_cancelled() {
            return false;
        }
        let step = remaining.min(SLEEP_SLICE);
        clock.sleep(step);
        remaining -= step;
    }
    !cancel.is_cancelled()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_advances_on_sleep() {
        let clock = ManualClock::new();
        assert_eq!(clock.elapsed(), Duration::ZERO);
        clock.sleep(Duration::from_secs(2));
        clock.sleep(Duration::from_millis(500));
        assert_eq!(clock.elapsed(), Duration::from_millis(2_500));
        assert_eq!(clock.sleeps().len(), 2);
    }

    #[test]
    fn sliced_sleep_completes_without_cancel() {
        let clock = ManualClock::new();
        let token = CancelToken::new();
        assert!(sleep_unless_cancelled(&clock, Duration::from_millis(350), &token));
        assert_eq!(clock.total_slept(), Duration::from_millis(350));
        assert_eq!(clock.sleeps().len(), 4);
    }

    #[test]
    fn sliced_sleep_stops_when_cancelled() {
        let clock = ManualClock::new();
        let token = CancelToken::new();
        clock.cancel_after(Duration::from_secs(1), token.clone());
        assert!(!sleep_unless_cancelled(&clock, Duration::from_secs(15), &token));
        assert_eq!(clock.total_slept(), Duration::from_secs(1));
    }

    #[test]
    fn system_clock_is_monotonic() {
        let clock = SystemClock::new();
        let a = clock.elapsed();
        clock.sleep(Duration::from_millis(1));
        assert!(clock.elapsed() > a);
    }
}
