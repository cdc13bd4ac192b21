//! Time sources
//!
//! All scheduler timing goes through `Clock` so tests can drive time by hand.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Monotonic time source measured from an arbitrary origin
pub trait Clock: Send + Sync {
    /// Time since the clock's origin
    fn now(&self) -> Duration;

    /// Block the host until `deadline`; only used when every context is
    /// waiting on a timer
    fn sleep_until(&self, deadline: Duration);
}

/// Wall clock backed by `Instant`
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    /// Clock whose origin is the moment of creation
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
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn sleep_until(&self, deadline: Duration) {
        let now = self.now();
        if deadline > now {
            std::thread::sleep(deadline - now);
        }
    }
}

#[derive(Debug, Default)]
struct ManualState {
    now: Duration,
    step: Duration,
}

/// Deterministic clock for tests.
///
/// Time only moves through `advance`, through `sleep_until`, and by `step`
/// on every read. A non-zero step makes executed work "cost" time, which is
/// what the preemption logic measures.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    state: Arc<Mutex<ManualState>>,
}

impl ManualClock {
    /// Clock frozen at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Clock that advances by `step` each time it is read
    pub fn with_step(step: Duration) -> Self {
        let clock = Self::default();
        clock.state.lock().step = step;
        clock
    }

    /// Move time forward
    pub fn advance(&self, by: Duration) {
        self.state.lock().now += by;
    }

    /// Current time without the per-read step
    pub fn peek(&self) -> Duration {
        self.state.lock().now
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        let mut state = self.state.lock();
        let step = state.step;
        state.now += step;
        state.now
    }

    fn sleep_until(&self, deadline: Duration) {
        let mut state = self.state.lock();
        if deadline > state.now {
            state.now = deadline;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_steps_per_read() {
        let clock = ManualClock::with_step(Duration::from_micros(10));
        assert_eq!(clock.now(), Duration::from_micros(10));
        assert_eq!(clock.now(), Duration::from_micros(20));
        clock.advance(Duration::from_millis(1));
        assert_eq!(clock.peek(), Duration::from_micros(1020));
    }

    #[test]
    fn test_manual_clock_sleep_jumps_forward_only() {
        let clock = ManualClock::new();
        clock.sleep_until(Duration::from_millis(5));
        assert_eq!(clock.now(), Duration::from_millis(5));
        clock.sleep_until(Duration::from_millis(1));
        assert_eq!(clock.now(), Duration::from_millis(5));
    }

    #[test]
    fn test_shared_between_clones() {
        let a = ManualClock::new();
        let b = a.clone();
        a.advance(Duration::from_millis(3));
        assert_eq!(b.peek(), Duration::from_millis(3));
    }
}
