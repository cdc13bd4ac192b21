//! Bytecode interpreter
//!
//! Runs one context for one scheduler slice: decodes instructions from the
//! top frame, dispatches them to the per-category handlers in `opcodes`, and
//! stops at the first instruction boundary where the scheduler asks for the
//! processor back, the context blocks, or its last frame is gone.

mod cache;
mod core;
mod execution;
pub mod opcodes;
mod unwind;

pub use cache::{InlineCache, Resolution};
pub use core::Interpreter;
pub use execution::{ControlFlow, ExecutionResult};
