//! Contexts: virtual threads
//!
//! A `Context` owns a stack of frames plus everything the scheduler and the
//! monitors need to know about one virtual thread. At any instant a context
//! is in exactly one place: the scheduler's ready queue, a monitor queue or
//! timer (parked in `Runtime::contexts`), or executing.

use crate::vm::frame::Frame;
use crate::vm::scheduler::TimerId;
use crate::vm::value::{ObjectRef, Value};
use crate::vm::{VmError, VmResult};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Lowest thread priority
pub const MIN_PRIORITY: i32 = 1;
/// Default thread priority
pub const NORMAL_PRIORITY: i32 = 5;
/// Highest thread priority
pub const MAX_PRIORITY: i32 = 10;

/// Unique identifier for a Context
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(u64);

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

impl ContextId {
    /// Generate a new unique ContextId
    pub fn new() -> Self {
        ContextId(NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the numeric ID value
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl Default for ContextId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx#{}", self.0)
    }
}

/// Execution state of a Context
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ContextState {
    /// Runnable or executing
    Running,
    /// Suspended until something resumes it
    Pausing,
    /// Terminal; the context is killed after its current slice
    Stopping,
}

/// Reason why a context is suspended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SuspendReason {
    /// Blocked entering a contended monitor
    MonitorEnter {
        /// Locked object
        object: ObjectRef,
    },
    /// Parked in `Object.wait`
    Wait {
        /// Object waited on
        object: ObjectRef,
    },
    /// Another context is running the class initializer
    ClassInit {
        /// Class being initialized
        class: String,
    },
    /// `Thread.sleep`
    Sleep,
}

/// Kind of entry in a method timeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimelineEvent {
    /// Frame pushed
    Enter,
    /// Frame popped
    Leave,
}

/// Per-context profile of method entry and exit times.
///
/// Suspended spans are recorded as a `<pause>` pseudo-method.
#[derive(Debug, Default, Clone)]
pub struct MethodTimeline {
    events: Vec<(TimelineEvent, String, Duration)>,
    paused: bool,
}

impl MethodTimeline {
    /// Record entry into `name`
    pub fn enter(&mut self, name: String, at: Duration) {
        self.events.push((TimelineEvent::Enter, name, at));
    }

    /// Record exit from `name`
    pub fn leave(&mut self, name: String, at: Duration) {
        self.events.push((TimelineEvent::Leave, name, at));
    }

    /// Open a `<pause>` span
    pub fn pause(&mut self, at: Duration) {
        if !self.paused {
            self.paused = true;
            self.enter("<pause>".to_string(), at);
        }
    }

    /// Close the open `<pause>` span
    pub fn unpause(&mut self, at: Duration) {
        if self.paused {
            self.paused = false;
            self.leave("<pause>".to_string(), at);
        }
    }

    /// Recorded events in order
    pub fn events(&self) -> &[(TimelineEvent, String, Duration)] {
        &self.events
    }
}

/// One virtual thread
pub struct Context {
    id: ContextId,
    frames: Vec<Frame>,
    /// Scheduling state
    pub state: ContextState,
    /// Fairness clock in milliseconds, never decreasing
    pub virtual_runtime: f64,
    /// Thread priority, 1..=10
    pub priority: i32,
    /// `java/lang/Thread` object this context runs, if any
    pub thread: Option<ObjectRef>,
    /// Why the context is paused
    pub suspend_reason: Option<SuspendReason>,
    /// Value returned by the bottom frame
    pub result: Option<Value>,
    /// Optional method profile
    pub timeline: Option<MethodTimeline>,
    pub(crate) lock_level: u32,
    pub(crate) lock_timer: Option<TimerId>,
    pub(crate) blocked_on: Option<ObjectRef>,
    pub(crate) owned_monitors: Vec<ObjectRef>,
}

impl Context {
    /// Create an empty context
    pub fn new(priority: i32) -> Self {
        Self {
            id: ContextId::new(),
            frames: Vec::new(),
            state: ContextState::Running,
            virtual_runtime: 0.0,
            priority: priority.clamp(MIN_PRIORITY, MAX_PRIORITY),
            thread: None,
            suspend_reason: None,
            result: None,
            timeline: None,
            lock_level: 0,
            lock_timer: None,
            blocked_on: None,
            owned_monitors: Vec::new(),
        }
    }

    /// Context identity
    pub fn id(&self) -> ContextId {
        self.id
    }

    /// Push a frame, recording entry when profiling
    pub fn push_frame(&mut self, frame: Frame, now: Duration) {
        if let Some(timeline) = self.timeline.as_mut() {
            timeline.enter(frame.method.qualified_name(), now);
        }
        self.frames.push(frame);
    }

    /// Pop the top frame, recording exit when profiling
    pub fn pop_frame(&mut self, now: Duration) -> Option<Frame> {
        let frame = self.frames.pop()?;
        if let Some(timeline) = self.timeline.as_mut() {
            timeline.leave(frame.method.qualified_name(), now);
        }
        Some(frame)
    }

    /// Top frame
    pub fn current(&self) -> Option<&Frame> {
        self.frames.last()
    }

    /// Top frame, mutably
    pub fn current_mut(&mut self) -> Option<&mut Frame> {
        self.frames.last_mut()
    }

    /// Top frame or `NoFrame`
    pub fn top(&self) -> VmResult<&Frame> {
        self.frames.last().ok_or(VmError::NoFrame)
    }

    /// Top frame or `NoFrame`, mutably
    pub fn top_mut(&mut self) -> VmResult<&mut Frame> {
        self.frames.last_mut().ok_or(VmError::NoFrame)
    }

    /// Frame `depth` below the top (0 is the top)
    pub fn frame_at(&self, depth: usize) -> Option<&Frame> {
        let len = self.frames.len();
        self.frames.get(len.checked_sub(depth + 1)?)
    }

    /// Number of frames
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Frames from the bottom up
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub(crate) fn take_frames(&mut self) -> Vec<Frame> {
        std::mem::take(&mut self.frames)
    }

    /// Suspend with a reason
    pub fn pause(&mut self, reason: SuspendReason, now: Duration) {
        self.state = ContextState::Pausing;
        self.suspend_reason = Some(reason);
        if let Some(timeline) = self.timeline.as_mut() {
            timeline.pause(now);
        }
    }

    /// Mark runnable again; the caller enqueues it
    pub fn resume(&mut self, now: Duration) {
        if self.state == ContextState::Pausing {
            self.state = ContextState::Running;
        }
        self.suspend_reason = None;
        if let Some(timeline) = self.timeline.as_mut() {
            timeline.unpause(now);
        }
    }

    /// Mark terminal
    pub fn stop(&mut self) {
        self.state = ContextState::Stopping;
    }

    /// Whether the context should be killed after its current slice
    pub fn is_finished(&self) -> bool {
        self.state == ContextState::Stopping || self.frames.is_empty()
    }

    /// Monitors currently held
    pub fn owned_monitors(&self) -> &[ObjectRef] {
        &self.owned_monitors
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("depth", &self.frames.len())
            .field("virtual_runtime", &self.virtual_runtime)
            .field("priority", &self.priority)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_ids_are_unique() {
        let a = ContextId::new();
        let b = ContextId::new();
        assert_ne!(a, b);
        assert!(b.as_u64() > a.as_u64());
    }

    #[test]
    fn test_priority_is_clamped() {
        assert_eq!(Context::new(0).priority, MIN_PRIORITY);
        assert_eq!(Context::new(42).priority, MAX_PRIORITY);
        assert_eq!(Context::new(NORMAL_PRIORITY).priority, NORMAL_PRIORITY);
    }

    #[test]
    fn test_pause_resume_cycle() {
        let mut ctx = Context::new(NORMAL_PRIORITY);
        ctx.timeline = Some(MethodTimeline::default());
        ctx.pause(SuspendReason::Sleep, Duration::from_millis(1));
        assert_eq!(ctx.state, ContextState::Pausing);
        assert_eq!(ctx.suspend_reason, Some(SuspendReason::Sleep));
        ctx.resume(Duration::from_millis(3));
        assert_eq!(ctx.state, ContextState::Running);
        assert!(ctx.suspend_reason.is_none());

        let events = ctx.timeline.as_ref().unwrap().events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].1, "<pause>");
        assert_eq!(events[1].0, TimelineEvent::Leave);
    }

    #[test]
    fn test_empty_context_is_finished() {
        let mut ctx = Context::new(NORMAL_PRIORITY);
        assert!(ctx.is_finished());
        assert!(ctx.top().is_err());
        ctx.stop();
        assert_eq!(ctx.state, ContextState::Stopping);
    }
}
