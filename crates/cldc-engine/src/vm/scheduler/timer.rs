//! One-shot timers for `Thread.sleep` and `Object.wait(timeout)`
//!
//! Timers live in a min-heap keyed by deadline. Cancellation is lazy: a
//! cancelled id is remembered and skipped when it reaches the top.

use crate::vm::context::ContextId;
use crate::vm::value::ObjectRef;
use rustc_hash::FxHashSet;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::Duration;

/// Handle of a scheduled timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

/// What to do when a timer fires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerAction {
    /// `wait(timeout)` expired without a notify
    WaitTimeout {
        /// Waiting context
        ctx: ContextId,
        /// Object it waits on
        object: ObjectRef,
    },
    /// `Thread.sleep` finished
    Sleep {
        /// Sleeping context
        ctx: ContextId,
    },
}

/// Entry in the timer heap
struct TimerEntry {
    deadline: Duration,
    id: TimerId,
    action: TimerAction,
}

// Reverse ordering for min-heap (earliest deadline first, then oldest id)
impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.id.cmp(&self.id))
    }
}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TimerEntry {}

/// Pending timers ordered by deadline
#[derive(Default)]
pub struct TimerQueue {
    heap: BinaryHeap<TimerEntry>,
    cancelled: FxHashSet<TimerId>,
    next_id: u64,
}

impl TimerQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm a timer
    pub fn schedule(&mut self, deadline: Duration, action: TimerAction) -> TimerId {
        self.next_id += 1;
        let id = TimerId(self.next_id);
        self.heap.push(TimerEntry {
            deadline,
            id,
            action,
        });
        id
    }

    /// Disarm a timer; unknown or already-fired ids are ignored
    pub fn cancel(&mut self, id: TimerId) {
        if self.heap.iter().any(|e| e.id == id) {
            self.cancelled.insert(id);
        }
    }

    /// Remove and return every action whose deadline is at or before `now`
    pub fn pop_expired(&mut self, now: Duration) -> Vec<TimerAction> {
        let mut fired = Vec::new();
        while let Some(entry) = self.heap.peek() {
            if entry.deadline > now {
                break;
            }
            if let Some(entry) = self.heap.pop() {
                if !self.cancelled.remove(&entry.id) {
                    fired.push(entry.action);
                }
            }
        }
        fired
    }

    /// Earliest live deadline
    pub fn next_deadline(&mut self) -> Option<Duration> {
        while let Some(entry) = self.heap.peek() {
            if !self.cancelled.contains(&entry.id) {
                return Some(entry.deadline);
            }
            let id = entry.id;
            self.heap.pop();
            self.cancelled.remove(&id);
        }
        None
    }

    /// Number of live timers
    pub fn len(&self) -> usize {
        self.heap.len() - self.cancelled.len()
    }

    /// True when no live timer is armed
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for TimerQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerQueue")
            .field("armed", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sleep() -> TimerAction {
        TimerAction::Sleep {
            ctx: ContextId::new(),
        }
    }

    #[test]
    fn test_fires_in_deadline_order() {
        let mut timers = TimerQueue::new();
        let late = sleep();
        let early = sleep();
        timers.schedule(Duration::from_millis(20), late);
        timers.schedule(Duration::from_millis(10), early);
        assert_eq!(timers.next_deadline(), Some(Duration::from_millis(10)));
        assert!(timers.pop_expired(Duration::from_millis(5)).is_empty());
        assert_eq!(timers.pop_expired(Duration::from_millis(25)), vec![early, late]);
        assert!(timers.is_empty());
    }

    #[test]
    fn test_cancelled_timer_never_fires() {
        let mut timers = TimerQueue::new();
        let a = timers.schedule(Duration::from_millis(1), sleep());
        let b = sleep();
        timers.schedule(Duration::from_millis(2), b);
        timers.cancel(a);
        assert_eq!(timers.len(), 1);
        assert_eq!(timers.next_deadline(), Some(Duration::from_millis(2)));
        assert_eq!(timers.pop_expired(Duration::from_millis(2)), vec![b]);
    }
}
