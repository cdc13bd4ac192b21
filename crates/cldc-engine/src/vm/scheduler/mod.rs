//! Cooperative scheduler
//!
//! One host thread runs every context. The scheduler decides which context
//! runs next, samples the clock at instruction boundaries to decide when the
//! running one must give way, and bounds each host turn to a wall-clock
//! window before handing control back through `Host::schedule_continuation`.

mod clock;
#[allow(clippy::module_inception)]
mod scheduler;
mod timer;

pub use clock::{Clock, ManualClock, SystemClock};
pub use scheduler::{Scheduler, SchedulerLimits, SchedulerStats};
pub use timer::{TimerAction, TimerId, TimerQueue};

use std::time::Duration;

/// Host event loop integration.
///
/// The VM never blocks the host. When a turn ends with work left over, it
/// asks the host to call `Vm::run_turn` again after `delay`.
pub trait Host {
    /// Arrange for another turn after `delay`
    fn schedule_continuation(&mut self, delay: Duration);
}

/// Host that only records the last continuation request.
///
/// Used when the embedder drives turns itself, e.g. `Vm::run_until_idle`.
#[derive(Debug, Default, Clone)]
pub struct PollingHost {
    /// Delay of the most recent request, cleared by `take`
    pub pending: Option<Duration>,
    /// Number of requests received
    pub requests: u64,
}

impl PollingHost {
    /// Consume the pending request
    pub fn take(&mut self) -> Option<Duration> {
        self.pending.take()
    }
}

impl Host for PollingHost {
    fn schedule_continuation(&mut self, delay: Duration) {
        self.requests += 1;
        self.pending = Some(match self.pending {
            Some(current) => current.min(delay),
            None => delay,
        });
    }
}
