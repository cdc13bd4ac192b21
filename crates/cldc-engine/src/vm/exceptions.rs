//! VM-raised exceptions and the uncaught-exception report

use crate::vm::context::{Context, ContextId};
use crate::vm::heap::ObjectBody;
use crate::vm::runtime::Runtime;
use crate::vm::value::{ObjectRef, Value};
use crate::vm::{VmError, VmResult};
use std::fmt;

/// Exception classes the engine itself throws
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExceptionKind {
    /// Integer division or remainder by zero
    Arithmetic,
    /// Null receiver, array or monitor
    NullPointer,
    /// Array index outside `0..length`
    ArrayIndexOutOfBounds,
    /// String index outside `0..length`
    StringIndexOutOfBounds,
    /// Negative array length
    NegativeArraySize,
    /// Storing an incompatible reference into an array
    ArrayStore,
    /// Failed `checkcast`
    ClassCast,
    /// `Class.forName` on an unknown name
    ClassNotFound,
    /// Monitor operation by a context that does not own the lock
    IllegalMonitorState,
    /// Bad argument to a VM-implemented method
    IllegalArgument,
    /// Starting a thread twice
    IllegalThreadState,
    /// Generic runtime failure
    Runtime,
    /// Class missing or its initializer failed
    NoClassDefFound,
    /// Field reference that resolves to nothing
    NoSuchField,
    /// Method reference that resolves to nothing
    NoSuchMethod,
    /// Linkage mismatch
    IncompatibleClassChange,
    /// Invoking an abstract method
    AbstractMethod,
    /// Native method without an implementation
    UnsatisfiedLink,
    /// Allocation past the heap limit
    OutOfMemory,
}

impl ExceptionKind {
    /// Internal name of the exception class
    pub fn class_name(self) -> &'static str {
        match self {
            ExceptionKind::Arithmetic => "java/lang/ArithmeticException",
            ExceptionKind::NullPointer => "java/lang/NullPointerException",
            ExceptionKind::ArrayIndexOutOfBounds => "java/lang/ArrayIndexOutOfBoundsException",
            ExceptionKind::StringIndexOutOfBounds => "java/lang/StringIndexOutOfBoundsException",
            ExceptionKind::NegativeArraySize => "java/lang/NegativeArraySizeException",
            ExceptionKind::ArrayStore => "java/lang/ArrayStoreException",
            ExceptionKind::ClassCast => "java/lang/ClassCastException",
            ExceptionKind::ClassNotFound => "java/lang/ClassNotFoundException",
            ExceptionKind::IllegalMonitorState => "java/lang/IllegalMonitorStateException",
            ExceptionKind::IllegalArgument => "java/lang/IllegalArgumentException",
            ExceptionKind::IllegalThreadState => "java/lang/IllegalThreadStateException",
            ExceptionKind::Runtime => "java/lang/RuntimeException",
            ExceptionKind::NoClassDefFound => "java/lang/NoClassDefFoundError",
            ExceptionKind::NoSuchField => "java/lang/NoSuchFieldError",
            ExceptionKind::NoSuchMethod => "java/lang/NoSuchMethodError",
            ExceptionKind::IncompatibleClassChange => "java/lang/IncompatibleClassChangeError",
            ExceptionKind::AbstractMethod => "java/lang/AbstractMethodError",
            ExceptionKind::UnsatisfiedLink => "java/lang/UnsatisfiedLinkError",
            ExceptionKind::OutOfMemory => "java/lang/OutOfMemoryError",
        }
    }
}

impl fmt::Display for ExceptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.class_name().replace('/', "."))
    }
}

/// One line of a Java stack trace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackEntry {
    /// Declaring class
    pub class: String,
    /// Method name
    pub method: String,
    /// Method descriptor
    pub descriptor: String,
    /// Offset of the executing instruction
    pub pc: usize,
}

/// Exception that propagated past the bottom frame of a context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UncaughtException {
    /// Terminated context
    pub context: ContextId,
    /// Exception class, dotted
    pub class_name: String,
    /// `detailMessage`, if any
    pub message: Option<String>,
    /// Frames at the throw point, most recent first
    pub trace: Vec<StackEntry>,
}

impl fmt::Display for UncaughtException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(message) => write!(f, "{}: {}", self.class_name, message)?,
            None => write!(f, "{}", self.class_name)?,
        }
        for entry in &self.trace {
            write!(
                f,
                "\n - {}.{}{}, pc={}",
                entry.class.replace('/', "."),
                entry.method,
                entry.descriptor,
                entry.pc
            )?;
        }
        Ok(())
    }
}

/// Snapshot the frames of `ctx`, most recent first
pub fn capture_trace(ctx: &Context) -> Vec<StackEntry> {
    ctx.frames()
        .iter()
        .rev()
        .map(|frame| StackEntry {
            class: frame.method.class_name.to_string(),
            method: frame.method.name.clone(),
            descriptor: frame.method.descriptor.clone(),
            pc: frame.op_pc,
        })
        .collect()
}

impl Runtime {
    /// Allocate an exception of `kind` with an optional detail message
    pub fn new_exception(&mut self, kind: ExceptionKind, message: Option<&str>) -> VmResult<ObjectRef> {
        let class = self
            .classes
            .load(kind.class_name())
            .map_err(|e| VmError::Link(e.to_string()))?;
        let object = self.instantiate(class)?;
        if let Some(message) = message {
            let text = self.new_string(message);
            let slot = self.detail_message_slot()?;
            self.heap.set_field(object, slot, Value::Ref(text))?;
        }
        Ok(object)
    }

    /// Detail message of a throwable
    pub fn exception_message(&self, throwable: ObjectRef) -> VmResult<Option<String>> {
        let slot = self.detail_message_slot()?;
        match self.heap.field(throwable, slot)?.as_object()? {
            Some(text) => Ok(self.heap.string(text)?.map(str::to_string)),
            None => Ok(None),
        }
    }

    fn detail_message_slot(&self) -> VmResult<usize> {
        let throwable = self.classes.well_known().throwable;
        self.classes
            .instance_field_slot(throwable, "detailMessage")
            .ok_or_else(|| VmError::Internal("Throwable has no detailMessage".into()))
    }

    /// Build the uncaught-exception report for `throwable`
    pub fn describe_uncaught(
        &self,
        ctx: &Context,
        throwable: ObjectRef,
        trace: Vec<StackEntry>,
    ) -> VmResult<UncaughtException> {
        let class = self.heap.class_of(throwable)?;
        let class_name = self.classes.get(class)?.name.replace('/', ".");
        let message = match &self.heap.get(throwable)?.body {
            ObjectBody::Instance(_) => self.exception_message(throwable)?,
            _ => None,
        };
        Ok(UncaughtException {
            context: ctx.id(),
            class_name,
            message,
            trace,
        })
    }
}
