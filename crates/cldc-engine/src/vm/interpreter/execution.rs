//! Execution result types for the suspendable interpreter
//!
//! The interpreter runs one context for one slice and reports why it
//! stopped. The scheduler uses this to decide what to do next:
//! - `Preempted` / `Yielded`: re-enqueue the context
//! - `Suspended`: park it until a monitor, timer or initializer wakes it
//! - `Finished` / `Failed`: kill it

use crate::vm::context::SuspendReason;
use crate::vm::exceptions::{ExceptionKind, UncaughtException};
use crate::vm::value::{ObjectRef, Value};

/// Why a slice ended
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionResult {
    /// The scheduler reclaimed the processor at an instruction boundary
    Preempted,

    /// The context gave up the processor voluntarily (`Thread.yield`)
    Yielded,

    /// The context is blocked; its state has been saved in its frames
    Suspended(SuspendReason),

    /// The bottom frame returned, with its value if any
    Finished(Option<Value>),

    /// An exception unwound past the bottom frame
    Failed(UncaughtException),
}

impl ExecutionResult {
    /// Check if the context is done, normally or not
    pub fn is_terminal(&self) -> bool {
        matches!(self, ExecutionResult::Finished(_) | ExecutionResult::Failed(_))
    }

    /// Check if the context stays runnable
    pub fn is_runnable(&self) -> bool {
        matches!(self, ExecutionResult::Preempted | ExecutionResult::Yielded)
    }
}

// ============================================================================
// ControlFlow - result of one instruction
// ============================================================================

/// Control flow directive from opcode execution
///
/// Handlers return `VmResult<ControlFlow>`: `Err` is a host-level failure
/// that kills the context, everything Java-visible is a variant here.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlFlow {
    /// Continue with the instruction at the top frame's `pc`
    Continue,

    /// Pop the current frame, handing the value to the caller
    Return(Option<Value>),

    /// Allocate and throw a VM exception
    Throw(ExceptionKind, Option<String>),

    /// Throw an existing throwable
    Exception(ObjectRef),

    /// Park the context
    ///
    /// The handler has already queued the context wherever its wake-up will
    /// come from, and left `pc` where execution must continue.
    Suspend(SuspendReason),

    /// End the slice but stay runnable
    Yield,
}

impl ControlFlow {
    /// Throw `kind` with a message
    pub fn throw(kind: ExceptionKind, message: impl Into<String>) -> Self {
        ControlFlow::Throw(kind, Some(message.into()))
    }

    /// Throw `kind` without a message
    pub fn throw_bare(kind: ExceptionKind) -> Self {
        ControlFlow::Throw(kind, None)
    }

    /// `NullPointerException`
    pub fn null_pointer() -> Self {
        ControlFlow::Throw(ExceptionKind::NullPointer, None)
    }
}
