//! Object monitors
//!
//! Every object can act as a reentrant lock with two queues: contexts blocked
//! waiting to enter, and contexts parked in `wait`. Both queues are FIFO, so
//! wake-ups happen in arrival order.
//!
//! The `Monitor` type only holds state. The operations that move contexts
//! between queues and the scheduler live on `Runtime`, since they touch the
//! heap, the parked contexts and the timer queue together.

use crate::vm::context::{Context, ContextId, SuspendReason};
use crate::vm::exceptions::ExceptionKind;
use crate::vm::runtime::Runtime;
use crate::vm::scheduler::TimerAction;
use crate::vm::value::ObjectRef;
use crate::vm::{VmError, VmResult};
use std::collections::VecDeque;
use std::time::Duration;

/// Per-object reentrant lock with entry and wait queues
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Monitor {
    owner: Option<ContextId>,
    level: u32,
    entry_queue: VecDeque<ContextId>,
    wait_queue: VecDeque<ContextId>,
}

impl Monitor {
    /// Current owner, if the lock is held
    pub fn owner(&self) -> Option<ContextId> {
        if self.level > 0 {
            self.owner
        } else {
            None
        }
    }

    /// Recursion depth of the current owner
    pub fn level(&self) -> u32 {
        self.level
    }

    /// Whether `ctx` holds the lock at least once
    pub fn is_held_by(&self, ctx: ContextId) -> bool {
        self.level > 0 && self.owner == Some(ctx)
    }

    /// Take the lock if free, or re-enter it if `ctx` already owns it
    pub fn try_acquire(&mut self, ctx: ContextId) -> bool {
        if self.level == 0 {
            self.owner = Some(ctx);
            self.level = 1;
            true
        } else if self.owner == Some(ctx) {
            self.level += 1;
            true
        } else {
            false
        }
    }

    /// Drop one level of ownership; true once fully released
    ///
    /// The caller has checked `is_held_by`.
    fn release_one(&mut self) -> bool {
        self.level = self.level.saturating_sub(1);
        if self.level == 0 {
            self.owner = None;
        }
        self.level == 0
    }

    /// Drop every level at once, returning how many were held
    fn release_all(&mut self) -> u32 {
        let level = self.level;
        self.level = 0;
        self.owner = None;
        level
    }

    /// Hand the free lock to `ctx` with the given recursion depth
    fn grant(&mut self, ctx: ContextId, level: u32) {
        self.owner = Some(ctx);
        self.level = level.max(1);
    }

    /// Contexts blocked on entry, in wake order
    pub fn entry_queue(&self) -> impl Iterator<Item = ContextId> + '_ {
        self.entry_queue.iter().copied()
    }

    /// Contexts parked in `wait`, in wake order
    pub fn wait_queue(&self) -> impl Iterator<Item = ContextId> + '_ {
        self.wait_queue.iter().copied()
    }

    fn remove_waiter(&mut self, ctx: ContextId) -> bool {
        let before = self.wait_queue.len();
        self.wait_queue.retain(|&c| c != ctx);
        before != self.wait_queue.len()
    }

    fn remove_everywhere(&mut self, ctx: ContextId) {
        self.entry_queue.retain(|&c| c != ctx);
        self.wait_queue.retain(|&c| c != ctx);
    }
}

/// Result of a monitor enter attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockOutcome {
    /// The calling context now holds the lock
    Acquired,
    /// The calling context was queued and must suspend
    Blocked,
}

/// Failure of a monitor operation
#[derive(Debug)]
pub enum MonitorError {
    /// Java-level failure to throw in the calling context
    Throw(ExceptionKind),
    /// Engine failure
    Vm(VmError),
}

impl From<VmError> for MonitorError {
    fn from(e: VmError) -> Self {
        MonitorError::Vm(e)
    }
}

impl Runtime {
    /// Enter the monitor of `object` on behalf of the running context
    pub fn monitor_enter(&mut self, ctx: &mut Context, object: ObjectRef) -> VmResult<LockOutcome> {
        let id = ctx.id();
        let monitor = self.heap.monitor_mut(object)?;
        if monitor.try_acquire(id) {
            if monitor.level() == 1 {
                ctx.owned_monitors.push(object);
            }
            return Ok(LockOutcome::Acquired);
        }
        monitor.entry_queue.push_back(id);
        ctx.lock_level = 1;
        ctx.blocked_on = Some(object);
        Ok(LockOutcome::Blocked)
    }

    /// Exit the monitor of `object`, handing it to the next entry waiter once
    /// the recursion level reaches zero
    pub fn monitor_exit(&mut self, ctx: &mut Context, object: ObjectRef) -> Result<(), MonitorError> {
        let id = ctx.id();
        let monitor = self.heap.monitor_mut(object)?;
        if !monitor.is_held_by(id) {
            return Err(MonitorError::Throw(ExceptionKind::IllegalMonitorState));
        }
        if !monitor.release_one() {
            return Ok(());
        }
        let next = monitor.entry_queue.pop_front();
        ctx.owned_monitors.retain(|&o| o != object);
        if let Some(next) = next {
            self.wakeup(next, object)?;
        }
        Ok(())
    }

    /// Release the monitor completely and park the running context in its
    /// wait queue, arming a timer when `timeout_ms > 0`
    pub fn monitor_wait(
        &mut self,
        ctx: &mut Context,
        object: ObjectRef,
        timeout_ms: i64,
    ) -> Result<SuspendReason, MonitorError> {
        if timeout_ms < 0 {
            return Err(MonitorError::Throw(ExceptionKind::IllegalArgument));
        }
        let id = ctx.id();
        let monitor = self.heap.monitor_mut(object)?;
        if !monitor.is_held_by(id) {
            return Err(MonitorError::Throw(ExceptionKind::IllegalMonitorState));
        }
        let level = monitor.release_all();
        let next = monitor.entry_queue.pop_front();
        ctx.owned_monitors.retain(|&o| o != object);
        if let Some(next) = next {
            self.wakeup(next, object)?;
        }

        self.heap.monitor_mut(object)?.wait_queue.push_back(id);
        ctx.lock_level = level;
        ctx.blocked_on = Some(object);
        if timeout_ms > 0 {
            let deadline = self.scheduler.now() + Duration::from_millis(timeout_ms as u64);
            let timer = self.timers.schedule(deadline, TimerAction::WaitTimeout { ctx: id, object });
            ctx.lock_timer = Some(timer);
        }
        Ok(SuspendReason::Wait { object })
    }

    /// Wake one or all contexts parked in `wait` on `object`
    pub fn monitor_notify(
        &mut self,
        ctx: &Context,
        object: ObjectRef,
        all: bool,
    ) -> Result<(), MonitorError> {
        let monitor = self.heap.monitor_mut(object)?;
        if !monitor.is_held_by(ctx.id()) {
            return Err(MonitorError::Throw(ExceptionKind::IllegalMonitorState));
        }
        let woken: Vec<ContextId> = if all {
            monitor.wait_queue.drain(..).collect()
        } else {
            monitor.wait_queue.pop_front().into_iter().collect()
        };
        for id in woken {
            self.wakeup(id, object)?;
        }
        Ok(())
    }

    /// Wake a parked context that was queued on `object`.
    ///
    /// If the lock is free the context takes it with its saved recursion
    /// level and becomes runnable; otherwise it joins the entry queue.
    pub(crate) fn wakeup(&mut self, id: ContextId, object: ObjectRef) -> VmResult<()> {
        let ctx = self
            .contexts
            .get_mut(&id)
            .ok_or(VmError::UnknownContext(id))?;
        if let Some(timer) = ctx.lock_timer.take() {
            self.timers.cancel(timer);
        }
        let monitor = self.heap.monitor_mut(object)?;
        if monitor.level() != 0 {
            monitor.entry_queue.push_back(id);
            ctx.blocked_on = Some(object);
            return Ok(());
        }
        monitor.grant(id, ctx.lock_level);
        ctx.lock_level = 0;
        ctx.blocked_on = None;
        ctx.owned_monitors.push(object);
        self.resume(id)
    }

    /// Timer expiry for `wait(timeout)`
    pub(crate) fn wait_timed_out(&mut self, id: ContextId, object: ObjectRef) -> VmResult<()> {
        let still_waiting = self.heap.monitor_mut(object)?.remove_waiter(id);
        if still_waiting {
            if let Some(ctx) = self.contexts.get_mut(&id) {
                ctx.lock_timer = None;
            }
            self.wakeup(id, object)?;
        }
        Ok(())
    }

    /// Release every monitor a dying context still owns and wake everything
    /// queued on them, plus anything waiting on its thread object.
    pub(crate) fn release_monitors_of(&mut self, ctx: &mut Context) -> VmResult<()> {
        let id = ctx.id();
        if let Some(timer) = ctx.lock_timer.take() {
            self.timers.cancel(timer);
        }
        if let Some(object) = ctx.blocked_on.take() {
            self.heap.monitor_mut(object)?.remove_everywhere(id);
        }

        let mut to_wake = Vec::new();
        for object in ctx.owned_monitors.drain(..) {
            let monitor = self.heap.monitor_mut(object)?;
            if !monitor.is_held_by(id) {
                continue;
            }
            monitor.release_all();
            to_wake.extend(monitor.wait_queue.drain(..).map(|c| (c, object)));
            to_wake.extend(monitor.entry_queue.drain(..).map(|c| (c, object)));
        }
        if let Some(thread) = ctx.thread {
            if let Some(monitor) = self.heap.get_mut(thread)?.monitor.as_mut() {
                to_wake.extend(monitor.wait_queue.drain(..).map(|c| (c, thread)));
            }
        }

        if !to_wake.is_empty() {
            tracing::debug!(context = %id, count = to_wake.len(), "waking waiters of terminated context");
        }
        for (waiter, object) in to_wake {
            self.wakeup(waiter, object)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids() -> (ContextId, ContextId) {
        (ContextId::new(), ContextId::new())
    }

    #[test]
    fn test_reentrant_acquire() {
        let (a, b) = ids();
        let mut m = Monitor::default();
        assert!(m.try_acquire(a));
        assert!(m.try_acquire(a));
        assert_eq!(m.level(), 2);
        assert!(!m.try_acquire(b));
        assert!(!m.release_one());
        assert!(m.release_one());
        assert_eq!(m.owner(), None);
        assert!(m.try_acquire(b));
        assert_eq!(m.owner(), Some(b));
    }

    #[test]
    fn test_release_all_reports_level() {
        let (a, _) = ids();
        let mut m = Monitor::default();
        m.try_acquire(a);
        m.try_acquire(a);
        m.try_acquire(a);
        assert_eq!(m.release_all(), 3);
        assert!(!m.is_held_by(a));
    }

    #[test]
    fn test_grant_restores_level() {
        let (a, _) = ids();
        let mut m = Monitor::default();
        m.grant(a, 4);
        assert!(m.is_held_by(a));
        assert_eq!(m.level(), 4);
    }

    #[test]
    fn test_remove_waiter() {
        let (a, b) = ids();
        let mut m = Monitor::default();
        m.wait_queue.push_back(a);
        m.wait_queue.push_back(b);
        assert!(m.remove_waiter(a));
        assert!(!m.remove_waiter(a));
        assert_eq!(m.wait_queue().collect::<Vec<_>>(), vec![b]);
    }
}
