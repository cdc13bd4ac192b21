//! CLDC virtual machine runtime
//!
//! This module provides:
//! - Bytecode interpreter with per-instruction preemption checks
//! - Contexts (virtual threads) with pooled activation frames
//! - Object monitors backing `synchronized`, `wait` and `notify`
//! - Cooperative fair-share scheduler driven by a host re-entry hook
//! - Class registry, heap and native method table used by the interpreter

pub mod classes;
pub mod context;
pub mod exceptions;
pub mod frame;
pub mod heap;
pub mod interpreter;
pub mod monitor;
pub mod natives;
pub mod options;
pub mod runtime;
pub mod scheduler;
pub mod value;
mod vm_facade;

pub use classes::{ClassId, ClassRegistry, InitState, Method, RuntimeClass};
pub use context::{Context, ContextId, ContextState, MethodTimeline, SuspendReason};
pub use exceptions::{ExceptionKind, StackEntry, UncaughtException};
pub use frame::{Frame, FramePool};
pub use heap::{ArrayData, Heap, HeapObject, ObjectBody};
pub use interpreter::{ControlFlow, ExecutionResult, Interpreter};
pub use monitor::{LockOutcome, Monitor};
pub use natives::{NativeFn, NativeRegistry, NativeResult};
pub use options::{SchedulingPolicy, VmOptions};
pub use runtime::Runtime;
pub use scheduler::{Clock, Host, ManualClock, Scheduler, SchedulerStats, SystemClock};
pub use value::{ObjectRef, Value};
pub use vm_facade::{ContextFailure, IdleReport, Vm};

use crate::bytecode::AssembleError;

/// Host-level VM failures.
///
/// Java-level errors never appear here: they are exception objects thrown
/// inside the machine. A `VmError` means the engine itself cannot continue
/// executing the affected context.
#[derive(Debug, thiserror::Error)]
pub enum VmError {
    /// Opcode byte outside the supported instruction set
    #[error("Invalid opcode 0x{opcode:02x} at {method} pc={pc}")]
    InvalidOpcode {
        /// Offending byte
        opcode: u8,
        /// Offset of the instruction
        pc: usize,
        /// Executing method
        method: String,
    },

    /// Operand stack underflow
    #[error("Stack underflow")]
    StackUnderflow,

    /// Operand of the wrong computational type
    #[error("Type error: expected {expected}, found {found}")]
    TypeError {
        /// Expected kind
        expected: &'static str,
        /// Actual value
        found: String,
    },

    /// Instruction stream read past the end of the method
    #[error("Code overrun at pc={0}")]
    CodeOverrun(usize),

    /// Local variable index outside the frame
    #[error("Local variable {0} out of range")]
    BadLocal(usize),

    /// Operation required a frame but the context has none
    #[error("Context has no frames")]
    NoFrame,

    /// Unknown context id
    #[error("Unknown context {0}")]
    UnknownContext(ContextId),

    /// Class could not be found or linked at the host level
    #[error("Link error: {0}")]
    Link(String),

    /// Entry point lookup failed
    #[error("Method not found: {0}")]
    MethodNotFound(String),

    /// Source failed to assemble
    #[error(transparent)]
    Assemble(#[from] AssembleError),

    /// Internal invariant violation
    #[error("Internal error: {0}")]
    Internal(String),
}

/// VM execution result
pub type VmResult<T> = Result<T, VmError>;
