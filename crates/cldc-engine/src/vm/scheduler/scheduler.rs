//! Ready queue and preemption policy

use crate::vm::context::{Context, ContextId};
use crate::vm::options::{SchedulingPolicy, VmOptions};
use crate::vm::scheduler::Clock;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

/// Scheduler statistics
#[derive(Debug, Clone, Default)]
pub struct SchedulerStats {
    /// Host turns started
    pub turns: u64,

    /// Slices handed to contexts
    pub dispatches: u64,

    /// Slices cut short because another context fell behind
    pub preemptions: u64,

    /// Slices cut short because the turn window ran out
    pub window_timeouts: u64,

    /// Contexts placed on the ready queue
    pub enqueued: u64,
}

/// Timing limits applied by the scheduler
#[derive(Debug, Clone)]
pub struct SchedulerLimits {
    /// Wall-clock budget of one host turn
    pub window: Duration,

    /// Minimum time between fairness checks
    pub preemption_interval: Duration,

    /// Slice length under round robin
    pub quantum: Duration,

    /// Instruction boundaries between clock reads
    pub sample_stride: u32,
}

impl From<&VmOptions> for SchedulerLimits {
    fn from(options: &VmOptions) -> Self {
        Self {
            window: options.window(),
            preemption_interval: options.preemption_interval(),
            quantum: options.quantum(),
            sample_stride: options.preemption_sample_stride.max(1),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct ReadyEntry {
    virtual_runtime: f64,
    id: ContextId,
}

#[derive(Debug)]
enum ReadyQueue {
    /// Sorted by ascending virtual runtime
    FairShare(Vec<ReadyEntry>),
    /// Arrival order
    RoundRobin(VecDeque<ContextId>),
}

/// Single-threaded cooperative scheduler.
///
/// Holds the ids of runnable contexts; the contexts themselves are owned by
/// the runtime. Exactly one context runs at a time, between `begin_slice`
/// and `end_slice`.
pub struct Scheduler {
    policy: SchedulingPolicy,
    ready: ReadyQueue,
    clock: Arc<dyn Clock>,
    limits: SchedulerLimits,
    isolate_priority: u8,

    /// Floor for newly enqueued contexts; never decreases
    min_virtual_runtime: f64,
    running_virtual_runtime: Option<f64>,

    window_start: Duration,
    slice_start: Duration,
    tracking_start: Duration,
    last_check: Duration,
    time_scale: f64,
    countdown: u32,

    stats: SchedulerStats,
}

impl Scheduler {
    /// Create a scheduler for the given options
    pub fn new(options: &VmOptions, clock: Arc<dyn Clock>) -> Self {
        let ready = match options.policy {
            SchedulingPolicy::FairShare => ReadyQueue::FairShare(Vec::new()),
            SchedulingPolicy::RoundRobin => ReadyQueue::RoundRobin(VecDeque::new()),
        };
        let limits = SchedulerLimits::from(options);
        Self {
            policy: options.policy,
            ready,
            clock,
            countdown: limits.sample_stride,
            limits,
            isolate_priority: options.isolate_priority.clamp(1, 3),
            min_virtual_runtime: 0.0,
            running_virtual_runtime: None,
            window_start: Duration::ZERO,
            slice_start: Duration::ZERO,
            tracking_start: Duration::ZERO,
            last_check: Duration::ZERO,
            time_scale: 1.0,
            stats: SchedulerStats::default(),
        }
    }

    /// Current time on the scheduler's clock
    pub fn now(&self) -> Duration {
        self.clock.now()
    }

    /// The scheduler's clock
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Active policy
    pub fn policy(&self) -> SchedulingPolicy {
        self.policy
    }

    /// Timing limits
    pub fn limits(&self) -> &SchedulerLimits {
        &self.limits
    }

    /// Counters
    pub fn stats(&self) -> &SchedulerStats {
        &self.stats
    }

    /// Current virtual runtime floor
    pub fn min_virtual_runtime(&self) -> f64 {
        self.min_virtual_runtime
    }

    // ========================================================================
    // Ready queue
    // ========================================================================

    /// Make `ctx` runnable.
    ///
    /// A context that has never run starts at the current floor so it cannot
    /// monopolize the queue. Among equal virtual runtimes the newest entry
    /// goes first.
    pub fn enqueue(&mut self, ctx: &mut Context) {
        self.stats.enqueued += 1;
        match &mut self.ready {
            ReadyQueue::FairShare(queue) => {
                if ctx.virtual_runtime == 0.0 {
                    ctx.virtual_runtime = self.min_virtual_runtime;
                }
                let vr = ctx.virtual_runtime;
                let at = queue.partition_point(|e| e.virtual_runtime < vr);
                queue.insert(
                    at,
                    ReadyEntry {
                        virtual_runtime: vr,
                        id: ctx.id(),
                    },
                );
            }
            ReadyQueue::RoundRobin(queue) => queue.push_back(ctx.id()),
        }
        self.update_min_virtual_runtime();
    }

    /// Take the next context to run
    pub fn next(&mut self) -> Option<ContextId> {
        match &mut self.ready {
            ReadyQueue::FairShare(queue) => {
                if queue.is_empty() {
                    None
                } else {
                    Some(queue.remove(0).id)
                }
            }
            ReadyQueue::RoundRobin(queue) => queue.pop_front(),
        }
    }

    /// Drop `id` from the ready queue if present
    pub fn remove(&mut self, id: ContextId) -> bool {
        match &mut self.ready {
            ReadyQueue::FairShare(queue) => {
                let before = queue.len();
                queue.retain(|e| e.id != id);
                before != queue.len()
            }
            ReadyQueue::RoundRobin(queue) => {
                let before = queue.len();
                queue.retain(|&c| c != id);
                before != queue.len()
            }
        }
    }

    /// Whether `id` is queued
    pub fn contains(&self, id: ContextId) -> bool {
        match &self.ready {
            ReadyQueue::FairShare(queue) => queue.iter().any(|e| e.id == id),
            ReadyQueue::RoundRobin(queue) => queue.contains(&id),
        }
    }

    /// Ready contexts in dispatch order
    pub fn ready_ids(&self) -> Vec<ContextId> {
        match &self.ready {
            ReadyQueue::FairShare(queue) => queue.iter().map(|e| e.id).collect(),
            ReadyQueue::RoundRobin(queue) => queue.iter().copied().collect(),
        }
    }

    /// Number of ready contexts
    pub fn len(&self) -> usize {
        match &self.ready {
            ReadyQueue::FairShare(queue) => queue.len(),
            ReadyQueue::RoundRobin(queue) => queue.len(),
        }
    }

    /// True when nothing is runnable
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn front_virtual_runtime(&self) -> Option<f64> {
        match &self.ready {
            ReadyQueue::FairShare(queue) => queue.first().map(|e| e.virtual_runtime),
            ReadyQueue::RoundRobin(_) => None,
        }
    }

    fn update_min_virtual_runtime(&mut self) {
        let mut vr = self.running_virtual_runtime.unwrap_or(self.min_virtual_runtime);
        if let Some(front) = self.front_virtual_runtime() {
            vr = match self.running_virtual_runtime {
                Some(running) => running.min(front),
                None => front,
            };
        }
        self.min_virtual_runtime = self.min_virtual_runtime.max(vr);
    }

    // ========================================================================
    // Turns and slices
    // ========================================================================

    /// Start a host turn
    pub fn begin_turn(&mut self) {
        self.window_start = self.clock.now();
        self.stats.turns += 1;
    }

    /// Whether the current turn has used up its window
    pub fn window_exceeded(&self) -> bool {
        self.clock.now().saturating_sub(self.window_start) >= self.limits.window
    }

    /// Hand the processor to `ctx`
    pub fn begin_slice(&mut self, ctx: &Context) {
        let now = self.clock.now();
        self.slice_start = now;
        self.tracking_start = now;
        self.last_check = now;
        self.time_scale = time_scale(ctx.priority, self.isolate_priority);
        self.running_virtual_runtime = Some(ctx.virtual_runtime);
        self.countdown = self.limits.sample_stride;
        self.stats.dispatches += 1;
    }

    /// Preemption check at an instruction boundary.
    ///
    /// The clock is only read every `sample_stride` calls. A slice ends when
    /// the turn window is used up, or (fair share) when the running context
    /// has accumulated more virtual runtime than the head of the queue, or
    /// (round robin) when its quantum has elapsed and someone else is ready.
    pub fn should_preempt(&mut self, ctx: &mut Context) -> bool {
        if self.countdown > 1 {
            self.countdown -= 1;
            return false;
        }
        self.countdown = self.limits.sample_stride;

        let now = self.clock.now();
        let total = now.saturating_sub(self.window_start);
        if total > self.limits.window {
            tracing::trace!(context = %ctx.id(), elapsed_us = total.as_micros() as u64, "execution window timeout");
            self.stats.window_timeouts += 1;
            return true;
        }

        match self.policy {
            SchedulingPolicy::RoundRobin => {
                if self.is_empty() {
                    return false;
                }
                let preempt = now.saturating_sub(self.slice_start) >= self.limits.quantum;
                if preempt {
                    self.stats.preemptions += 1;
                }
                preempt
            }
            SchedulingPolicy::FairShare => {
                if now.saturating_sub(self.last_check) < self.limits.preemption_interval {
                    return false;
                }
                self.last_check = now;
                let Some(front) = self.front_virtual_runtime() else {
                    return false;
                };
                self.charge(ctx, now);
                if ctx.virtual_runtime > front {
                    tracing::trace!(context = %ctx.id(), vr = ctx.virtual_runtime, next = front, "preemption");
                    self.stats.preemptions += 1;
                    return true;
                }
                false
            }
        }
    }

    /// Close the running slice, charging its remaining time to `ctx`
    pub fn end_slice(&mut self, ctx: &mut Context) {
        let now = self.clock.now();
        self.charge(ctx, now);
        self.running_virtual_runtime = None;
    }

    fn charge(&mut self, ctx: &mut Context, now: Duration) {
        let elapsed_ms = now.saturating_sub(self.tracking_start).as_secs_f64() * 1000.0;
        ctx.virtual_runtime += elapsed_ms * self.time_scale;
        self.tracking_start = now;
        self.running_virtual_runtime = Some(ctx.virtual_runtime);
        self.update_min_virtual_runtime();
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("policy", &self.policy)
            .field("ready", &self.ready)
            .field("min_virtual_runtime", &self.min_virtual_runtime)
            .field("stats", &self.stats)
            .finish()
    }
}

/// Virtual runtime growth rate for a thread priority (1..=10) within an
/// isolate priority (1..=3).
///
/// Linear from 1.0 at the lowest combined priority down to 0.1 at the
/// highest: higher priority accrues virtual runtime more slowly and is
/// therefore picked more often.
pub fn time_scale(priority: i32, isolate_priority: u8) -> f64 {
    -0.031_034_482_76 * (f64::from(priority) * f64::from(isolate_priority)) + 1.031_034_483
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::context::NORMAL_PRIORITY;
    use crate::vm::scheduler::ManualClock;

    fn scheduler(policy: SchedulingPolicy, clock: &ManualClock) -> Scheduler {
        let options = VmOptions {
            policy,
            preemption_sample_stride: 1,
            ..VmOptions::default()
        };
        Scheduler::new(&options, Arc::new(clock.clone()))
    }

    #[test]
    fn test_time_scale_range() {
        assert!((time_scale(1, 1) - 1.0).abs() < 1e-6);
        assert!((time_scale(10, 3) - 0.1).abs() < 1e-6);
        assert!(time_scale(10, 2) < time_scale(5, 2));
    }

    #[test]
    fn test_fair_share_orders_by_virtual_runtime() {
        let clock = ManualClock::new();
        let mut s = scheduler(SchedulingPolicy::FairShare, &clock);
        let mut a = Context::new(NORMAL_PRIORITY);
        let mut b = Context::new(NORMAL_PRIORITY);
        a.virtual_runtime = 5.0;
        b.virtual_runtime = 2.0;
        s.enqueue(&mut a);
        s.enqueue(&mut b);
        assert_eq!(s.next(), Some(b.id()));
        assert_eq!(s.next(), Some(a.id()));
        assert_eq!(s.next(), None);
    }

    #[test]
    fn test_new_context_starts_at_floor() {
        let clock = ManualClock::new();
        let mut s = scheduler(SchedulingPolicy::FairShare, &clock);
        let mut old = Context::new(NORMAL_PRIORITY);
        old.virtual_runtime = 7.0;
        s.enqueue(&mut old);
        assert_eq!(s.min_virtual_runtime(), 7.0);

        let mut fresh = Context::new(NORMAL_PRIORITY);
        s.enqueue(&mut fresh);
        assert_eq!(fresh.virtual_runtime, 7.0);
        // equal runtimes: the newest entry goes first
        assert_eq!(s.next(), Some(fresh.id()));
    }

    #[test]
    fn test_floor_never_decreases() {
        let clock = ManualClock::new();
        let mut s = scheduler(SchedulingPolicy::FairShare, &clock);
        let mut a = Context::new(NORMAL_PRIORITY);
        a.virtual_runtime = 10.0;
        s.enqueue(&mut a);
        s.next();
        let mut b = Context::new(NORMAL_PRIORITY);
        b.virtual_runtime = 3.0;
        s.enqueue(&mut b);
        assert_eq!(s.min_virtual_runtime(), 10.0);
    }

    #[test]
    fn test_preempts_when_behind_head_of_queue() {
        let clock = ManualClock::new();
        let mut s = scheduler(SchedulingPolicy::FairShare, &clock);
        let mut waiting = Context::new(NORMAL_PRIORITY);
        waiting.virtual_runtime = 1.0;
        s.enqueue(&mut waiting);

        let mut running = Context::new(NORMAL_PRIORITY);
        running.virtual_runtime = 1.0;
        s.begin_turn();
        s.begin_slice(&running);

        // under the preemption interval: no check
        clock.advance(Duration::from_micros(500));
        assert!(!s.should_preempt(&mut running));
        clock.advance(Duration::from_millis(2));
        assert!(s.should_preempt(&mut running));
        assert!(running.virtual_runtime > 1.0);
        assert_eq!(s.stats().preemptions, 1);
    }

    #[test]
    fn test_alone_is_never_preempted_within_window() {
        let clock = ManualClock::new();
        let mut s = scheduler(SchedulingPolicy::FairShare, &clock);
        let mut running = Context::new(NORMAL_PRIORITY);
        s.begin_turn();
        s.begin_slice(&running);
        clock.advance(Duration::from_millis(5));
        assert!(!s.should_preempt(&mut running));
        clock.advance(Duration::from_millis(7));
        assert!(s.should_preempt(&mut running));
        assert_eq!(s.stats().window_timeouts, 1);
    }

    #[test]
    fn test_round_robin_quantum() {
        let clock = ManualClock::new();
        let mut s = scheduler(SchedulingPolicy::RoundRobin, &clock);
        let mut a = Context::new(NORMAL_PRIORITY);
        let mut b = Context::new(NORMAL_PRIORITY);
        s.enqueue(&mut a);
        s.enqueue(&mut b);
        assert_eq!(s.next(), Some(a.id()));
        s.begin_turn();
        s.begin_slice(&a);
        clock.advance(Duration::from_millis(4));
        assert!(!s.should_preempt(&mut a));
        clock.advance(Duration::from_millis(1));
        assert!(s.should_preempt(&mut a));
        s.end_slice(&mut a);
        s.enqueue(&mut a);
        assert_eq!(s.ready_ids(), vec![b.id(), a.id()]);
    }

    #[test]
    fn test_sample_stride_skips_clock_reads() {
        let clock = ManualClock::new();
        let options = VmOptions {
            preemption_sample_stride: 4,
            ..VmOptions::default()
        };
        let mut s = Scheduler::new(&options, Arc::new(clock.clone()));
        let mut running = Context::new(NORMAL_PRIORITY);
        s.begin_turn();
        s.begin_slice(&running);
        clock.advance(Duration::from_millis(50));
        assert!(!s.should_preempt(&mut running));
        assert!(!s.should_preempt(&mut running));
        assert!(!s.should_preempt(&mut running));
        assert!(s.should_preempt(&mut running));
    }
}
