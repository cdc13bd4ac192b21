//! CLDC Bytecode Engine
//!
//! This crate provides the execution core of a CLDC virtual machine:
//! - **Bytecode**: class model, descriptors and a `.jasm` assembler (`bytecode` module)
//! - **VM**: interpreter, monitors, contexts and the cooperative scheduler (`vm` module)
//!
//! # Example
//!
//! ```rust,ignore
//! use cldc_engine::{Vm, VmOptions};
//!
//! let mut vm = Vm::new(VmOptions::default())?;
//! vm.load_source(r#"
//! .class public Hello
//! .method public static main()V
//!     ldc "hello"
//!     invokestatic com/sun/cldchi/io/ConsoleOutputStream.println(Ljava/lang/String;)V
//!     return
//! .end method
//! .end class
//! "#)?;
//! vm.run_main("Hello")?;
//! let report = vm.run_until_idle()?;
//! assert!(report.is_clean());
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![cfg_attr(test, allow(clippy::approx_constant))]
#![cfg_attr(test, allow(unused_imports))]

/// Class files, descriptors, opcodes and the text assembler
pub mod bytecode;

/// Virtual machine runtime
pub mod vm;

// ============================================================================
// Re-exports
// ============================================================================

pub use bytecode::{assemble, AssembleError, ClassFile, Opcode};

pub use vm::{
    // Host surface
    ContextFailure,
    IdleReport,
    Vm,
    VmError,
    VmOptions,
    VmResult,
    SchedulingPolicy,
    // Scheduling
    Clock,
    Host,
    ManualClock,
    SchedulerStats,
    SystemClock,
    // Execution state
    Context,
    ContextId,
    ContextState,
    ExceptionKind,
    ObjectRef,
    UncaughtException,
    Value,
};
