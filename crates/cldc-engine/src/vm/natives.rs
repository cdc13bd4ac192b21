//! Native method table
//!
//! Natives are host functions bound by `class.name(descriptor)`. A native
//! frame runs `invokenative; <xreturn>`; `invokenative` calls the bound
//! function, which either produces a value, throws, or asks the interpreter
//! to suspend or yield the calling context.

use crate::vm::context::{Context, SuspendReason};
use crate::vm::exceptions::ExceptionKind;
use crate::vm::heap::{ArrayData, ObjectBody};
use crate::vm::monitor::MonitorError;
use crate::vm::runtime::Runtime;
use crate::vm::scheduler::TimerAction;
use crate::vm::value::{ObjectRef, Value};
use crate::vm::{VmError, VmResult};
use rustc_hash::FxHashMap;
use std::time::Duration;

/// Host implementation of a native method
pub type NativeFn = fn(&mut NativeCall<'_>) -> VmResult<NativeResult>;

/// Arguments and machine state available to a native
pub struct NativeCall<'a> {
    /// Runtime state
    pub rt: &'a mut Runtime,
    /// Calling context
    pub ctx: &'a mut Context,
    /// Receiver for instance methods
    pub receiver: Option<ObjectRef>,
    /// Argument slots, receiver excluded; wide values take two slots
    pub args: &'a [Value],
}

impl NativeCall<'_> {
    /// Receiver, which the interpreter has already null-checked
    pub fn this(&self) -> VmResult<ObjectRef> {
        self.receiver
            .ok_or_else(|| VmError::Internal("native instance call without receiver".into()))
    }

    /// Argument slot `index`
    pub fn arg(&self, index: usize) -> VmResult<Value> {
        self.args
            .get(index)
            .copied()
            .ok_or(VmError::BadLocal(index))
    }

    /// Int argument in slot `index`
    pub fn int(&self, index: usize) -> VmResult<i32> {
        self.arg(index)?.as_int()
    }

    /// Long argument starting at slot `index`
    pub fn long(&self, index: usize) -> VmResult<i64> {
        self.arg(index)?.as_long()
    }

    /// Reference argument in slot `index`
    pub fn object(&self, index: usize) -> VmResult<Option<ObjectRef>> {
        self.arg(index)?.as_object()
    }

    /// String contents of a reference argument; `None` for null
    pub fn string(&self, index: usize) -> VmResult<Option<String>> {
        match self.object(index)? {
            Some(r) => Ok(self.rt.heap.string(r)?.map(str::to_string)),
            None => Ok(None),
        }
    }
}

/// What a native asks the interpreter to do
#[derive(Debug, Clone, PartialEq)]
pub enum NativeResult {
    /// Return without a value
    Void,
    /// Return a value
    Value(Value),
    /// Throw a VM exception with an optional message
    Throw(ExceptionKind, Option<String>),
    /// Throw an existing throwable
    ThrowObject(ObjectRef),
    /// Suspend the calling context; the native has already arranged its wake-up
    Suspend(SuspendReason),
    /// Give up the rest of the slice but stay runnable
    Yield,
}

impl From<MonitorError> for VmResult<NativeResult> {
    fn from(e: MonitorError) -> Self {
        match e {
            MonitorError::Throw(kind) => Ok(NativeResult::Throw(kind, None)),
            MonitorError::Vm(e) => Err(e),
        }
    }
}

/// Native functions by `class.name(descriptor)`
#[derive(Default)]
pub struct NativeRegistry {
    functions: FxHashMap<String, NativeFn>,
}

impl NativeRegistry {
    /// Empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `function` to a method key, replacing any previous binding
    pub fn register(&mut self, key: impl Into<String>, function: NativeFn) {
        self.functions.insert(key.into(), function);
    }

    /// Function bound to a method key
    pub fn lookup(&self, key: &str) -> Option<NativeFn> {
        self.functions.get(key).copied()
    }

    /// Number of bindings
    pub fn len(&self) -> usize {
        self.functions.len()
    }

    /// True when nothing is bound
    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// Table with the core library natives
    pub fn with_builtins() -> Self {
        let mut natives = Self::new();
        let table: &[(&str, NativeFn)] = &[
            ("java/lang/Object.hashCode()I", object_hash_code),
            ("java/lang/Object.getClass()Ljava/lang/Class;", object_get_class),
            ("java/lang/Object.wait(J)V", object_wait),
            ("java/lang/Object.notify()V", object_notify),
            ("java/lang/Object.notifyAll()V", object_notify_all),
            ("java/lang/Class.getName()Ljava/lang/String;", class_get_name),
            ("java/lang/Class.forName(Ljava/lang/String;)Ljava/lang/Class;", class_for_name),
            ("java/lang/String.length()I", string_length),
            ("java/lang/String.charAt(I)C", string_char_at),
            ("java/lang/String.equals(Ljava/lang/Object;)Z", string_equals),
            ("java/lang/String.concat(Ljava/lang/String;)Ljava/lang/String;", string_concat),
            ("java/lang/String.valueOf(I)Ljava/lang/String;", string_value_of_int),
            ("java/lang/String.valueOf(J)Ljava/lang/String;", string_value_of_long),
            ("java/lang/Thread.start0()V", thread_start0),
            ("java/lang/Thread.isAlive()Z", thread_is_alive),
            ("java/lang/Thread.join0()V", thread_join0),
            ("java/lang/Thread.setPriority0(I)V", thread_set_priority0),
            ("java/lang/Thread.currentThread()Ljava/lang/Thread;", thread_current),
            ("java/lang/Thread.sleep(J)V", thread_sleep),
            ("java/lang/Thread.yield()V", thread_yield),
            ("java/lang/Thread.activeCount()I", thread_active_count),
            ("java/lang/System.currentTimeMillis()J", system_current_time_millis),
            ("java/lang/System.identityHashCode(Ljava/lang/Object;)I", system_identity_hash_code),
            (
                "java/lang/System.arraycopy(Ljava/lang/Object;ILjava/lang/Object;II)V",
                system_arraycopy,
            ),
            ("com/sun/cldchi/io/ConsoleOutputStream.write(I)V", console_write),
            ("com/sun/cldchi/io/ConsoleOutputStream.print(Ljava/lang/String;)V", console_print),
        ];
        for &(key, function) in table {
            natives.register(key, function);
        }
        natives
    }
}

impl std::fmt::Debug for NativeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeRegistry")
            .field("functions", &self.functions.len())
            .finish()
    }
}

fn throw(kind: ExceptionKind, message: impl Into<String>) -> VmResult<NativeResult> {
    Ok(NativeResult::Throw(kind, Some(message.into())))
}

// ============================================================================
// java/lang/Object
// ============================================================================

fn object_hash_code(call: &mut NativeCall<'_>) -> VmResult<NativeResult> {
    Ok(NativeResult::Value(Value::Int(call.this()?.index() as i32)))
}

fn object_get_class(call: &mut NativeCall<'_>) -> VmResult<NativeResult> {
    let class = call.rt.heap.class_of(call.this()?)?;
    let mirror = call.rt.class_mirror(class)?;
    Ok(NativeResult::Value(Value::Ref(mirror)))
}

fn object_wait(call: &mut NativeCall<'_>) -> VmResult<NativeResult> {
    let this = call.this()?;
    let timeout = call.long(0)?;
    match call.rt.monitor_wait(call.ctx, this, timeout) {
        Ok(reason) => Ok(NativeResult::Suspend(reason)),
        Err(e) => e.into(),
    }
}

fn object_notify(call: &mut NativeCall<'_>) -> VmResult<NativeResult> {
    let this = call.this()?;
    match call.rt.monitor_notify(call.ctx, this, false) {
        Ok(()) => Ok(NativeResult::Void),
        Err(e) => e.into(),
    }
}

fn object_notify_all(call: &mut NativeCall<'_>) -> VmResult<NativeResult> {
    let this = call.this()?;
    match call.rt.monitor_notify(call.ctx, this, true) {
        Ok(()) => Ok(NativeResult::Void),
        Err(e) => e.into(),
    }
}

// ============================================================================
// java/lang/Class
// ============================================================================

fn class_get_name(call: &mut NativeCall<'_>) -> VmResult<NativeResult> {
    let this = call.this()?;
    let class = match call.rt.heap.get(this)?.body {
        ObjectBody::Mirror(class) => class,
        _ => return Err(VmError::Internal(format!("{} is not a class mirror", this))),
    };
    let name = call.rt.classes.get(class)?.name.replace('/', ".");
    let text = call.rt.new_string(&name);
    Ok(NativeResult::Value(Value::Ref(text)))
}

fn class_for_name(call: &mut NativeCall<'_>) -> VmResult<NativeResult> {
    let Some(name) = call.string(0)? else {
        return Ok(NativeResult::Throw(ExceptionKind::NullPointer, None));
    };
    match call.rt.classes.load(&name.replace('.', "/")) {
        Ok(class) => {
            let mirror = call.rt.class_mirror(class)?;
            Ok(NativeResult::Value(Value::Ref(mirror)))
        }
        Err(_) => throw(ExceptionKind::ClassNotFound, name),
    }
}

// ============================================================================
// java/lang/String
// ============================================================================

fn this_string(call: &NativeCall<'_>) -> VmResult<String> {
    let this = call.this()?;
    call.rt
        .heap
        .string(this)?
        .map(str::to_string)
        .ok_or_else(|| VmError::Internal(format!("{} is not a string", this)))
}

fn string_length(call: &mut NativeCall<'_>) -> VmResult<NativeResult> {
    let length = this_string(call)?.encode_utf16().count();
    Ok(NativeResult::Value(Value::Int(length as i32)))
}

fn string_char_at(call: &mut NativeCall<'_>) -> VmResult<NativeResult> {
    let text = this_string(call)?;
    let index = call.int(0)?;
    match usize::try_from(index).ok().and_then(|i| text.encode_utf16().nth(i)) {
        Some(unit) => Ok(NativeResult::Value(Value::Int(i32::from(unit)))),
        None => throw(ExceptionKind::StringIndexOutOfBounds, index.to_string()),
    }
}

fn string_equals(call: &mut NativeCall<'_>) -> VmResult<NativeResult> {
    let text = this_string(call)?;
    let equal = match call.object(0)? {
        Some(other) => call.rt.heap.string(other)? == Some(text.as_str()),
        None => false,
    };
    Ok(NativeResult::Value(Value::from_bool(equal)))
}

fn string_concat(call: &mut NativeCall<'_>) -> VmResult<NativeResult> {
    let text = this_string(call)?;
    let Some(suffix) = call.string(0)? else {
        return Ok(NativeResult::Throw(ExceptionKind::NullPointer, None));
    };
    let joined = call.rt.new_string(&(text + &suffix));
    Ok(NativeResult::Value(Value::Ref(joined)))
}

fn string_value_of_int(call: &mut NativeCall<'_>) -> VmResult<NativeResult> {
    let text = call.int(0)?.to_string();
    Ok(NativeResult::Value(Value::Ref(call.rt.new_string(&text))))
}

fn string_value_of_long(call: &mut NativeCall<'_>) -> VmResult<NativeResult> {
    let text = call.long(0)?.to_string();
    Ok(NativeResult::Value(Value::Ref(call.rt.new_string(&text))))
}

// ============================================================================
// java/lang/Thread
// ============================================================================

fn thread_start0(call: &mut NativeCall<'_>) -> VmResult<NativeResult> {
    let this = call.this()?;
    if call.rt.started_threads.contains(&this) {
        return Ok(NativeResult::Throw(ExceptionKind::IllegalThreadState, None));
    }
    call.rt.start_thread(this)?;
    Ok(NativeResult::Void)
}

fn thread_is_alive(call: &mut NativeCall<'_>) -> VmResult<NativeResult> {
    let alive = call.rt.threads.contains_key(&call.this()?);
    Ok(NativeResult::Value(Value::from_bool(alive)))
}

fn thread_join0(call: &mut NativeCall<'_>) -> VmResult<NativeResult> {
    let this = call.this()?;
    if !call.rt.threads.contains_key(&this) {
        return Ok(NativeResult::Void);
    }
    match call.rt.monitor_wait(call.ctx, this, 0) {
        Ok(reason) => Ok(NativeResult::Suspend(reason)),
        Err(e) => e.into(),
    }
}

fn thread_set_priority0(call: &mut NativeCall<'_>) -> VmResult<NativeResult> {
    let this = call.this()?;
    let priority = call.int(0)?;
    if let Some(&id) = call.rt.threads.get(&this) {
        if id == call.ctx.id() {
            call.ctx.priority = priority;
        } else if let Some(target) = call.rt.contexts.get_mut(&id) {
            target.priority = priority;
        }
    }
    Ok(NativeResult::Void)
}

fn thread_current(call: &mut NativeCall<'_>) -> VmResult<NativeResult> {
    let thread = match call.ctx.thread {
        Some(thread) => thread,
        None => {
            let thread = call.rt.new_thread_object(call.ctx.priority)?;
            call.ctx.thread = Some(thread);
            call.rt.threads.insert(thread, call.ctx.id());
            call.rt.started_threads.insert(thread);
            thread
        }
    };
    Ok(NativeResult::Value(Value::Ref(thread)))
}

fn thread_sleep(call: &mut NativeCall<'_>) -> VmResult<NativeResult> {
    let millis = call.long(0)?;
    if millis < 0 {
        return throw(ExceptionKind::IllegalArgument, "timeout value is negative");
    }
    if millis == 0 {
        return Ok(NativeResult::Yield);
    }
    let deadline = call.rt.scheduler.now() + Duration::from_millis(millis as u64);
    let timer = call
        .rt
        .timers
        .schedule(deadline, TimerAction::Sleep { ctx: call.ctx.id() });
    call.ctx.lock_timer = Some(timer);
    Ok(NativeResult::Suspend(SuspendReason::Sleep))
}

fn thread_yield(_call: &mut NativeCall<'_>) -> VmResult<NativeResult> {
    Ok(NativeResult::Yield)
}

fn thread_active_count(call: &mut NativeCall<'_>) -> VmResult<NativeResult> {
    Ok(NativeResult::Value(Value::Int(call.rt.threads.len() as i32)))
}

// ============================================================================
// java/lang/System
// ============================================================================

fn system_current_time_millis(call: &mut NativeCall<'_>) -> VmResult<NativeResult> {
    let millis = call.rt.scheduler.now().as_millis() as i64;
    Ok(NativeResult::Value(Value::Long(millis)))
}

fn system_identity_hash_code(call: &mut NativeCall<'_>) -> VmResult<NativeResult> {
    let hash = call.object(0)?.map_or(0, |r| r.index() as i32);
    Ok(NativeResult::Value(Value::Int(hash)))
}

fn system_arraycopy(call: &mut NativeCall<'_>) -> VmResult<NativeResult> {
    let (Some(src), Some(dst)) = (call.object(0)?, call.object(2)?) else {
        return Ok(NativeResult::Throw(ExceptionKind::NullPointer, None));
    };
    let (src_pos, dst_pos, length) = (call.int(1)?, call.int(3)?, call.int(4)?);

    let heap = &call.rt.heap;
    let (Some(source), Some(target)) = (heap.array(src)?, heap.array(dst)?) else {
        return Ok(NativeResult::Throw(ExceptionKind::ArrayStore, None));
    };
    if source.element_type() != target.element_type() {
        return Ok(NativeResult::Throw(ExceptionKind::ArrayStore, None));
    }
    if src_pos < 0
        || dst_pos < 0
        || length < 0
        || src_pos as i64 + length as i64 > source.len() as i64
        || dst_pos as i64 + length as i64 > target.len() as i64
    {
        return Ok(NativeResult::Throw(ExceptionKind::ArrayIndexOutOfBounds, None));
    }

    let (src_pos, dst_pos, length) = (src_pos as usize, dst_pos as usize, length as usize);
    let values: Vec<Value> = (src_pos..src_pos + length)
        .map(|i| source.load(i).unwrap_or(Value::Null))
        .collect();
    let references = matches!(source, ArrayData::Reference(_));

    if references && src != dst {
        let target_class = call.rt.heap.class_of(dst)?;
        let element = match call.rt.classes.get(target_class)?.element {
            Some(crate::vm::classes::ArrayElement::Class(element)) => element,
            _ => return Ok(NativeResult::Throw(ExceptionKind::ArrayStore, None)),
        };
        for (copied, value) in values.iter().enumerate() {
            if let Some(r) = value.as_object()? {
                let class = call.rt.heap.class_of(r)?;
                if !call.rt.classes.is_assignable(class, element) {
                    // elements before the offending one stay copied
                    store_all(call.rt, dst, dst_pos, &values[..copied])?;
                    return Ok(NativeResult::Throw(ExceptionKind::ArrayStore, None));
                }
            }
        }
    }
    store_all(call.rt, dst, dst_pos, &values)?;
    Ok(NativeResult::Void)
}

fn store_all(rt: &mut Runtime, array: ObjectRef, at: usize, values: &[Value]) -> VmResult<()> {
    let data = rt
        .heap
        .array_mut(array)?
        .ok_or_else(|| VmError::Internal(format!("{} is not an array", array)))?;
    for (offset, value) in values.iter().enumerate() {
        data.store(at + offset, *value)?;
    }
    Ok(())
}

// ============================================================================
// com/sun/cldchi/io/ConsoleOutputStream
// ============================================================================

fn console_write(call: &mut NativeCall<'_>) -> VmResult<NativeResult> {
    let byte = call.int(0)? as u8;
    call.rt.console_write(&[byte]);
    Ok(NativeResult::Void)
}

fn console_print(call: &mut NativeCall<'_>) -> VmResult<NativeResult> {
    let text = call.string(0)?.unwrap_or_else(|| "null".to_string());
    call.rt.console_write(text.as_bytes());
    Ok(NativeResult::Void)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins_registered() {
        let natives = NativeRegistry::with_builtins();
        assert!(natives.lookup("java/lang/Object.wait(J)V").is_some());
        assert!(natives.lookup("java/lang/Thread.start0()V").is_some());
        assert!(natives.lookup("java/lang/Thread.stop0()V").is_none());
    }

    #[test]
    fn test_every_native_in_core_library_is_bound() {
        let natives = NativeRegistry::with_builtins();
        for class in crate::bytecode::assemble(include_str!("classes/rt.jasm")).unwrap() {
            for method in class.methods.iter().filter(|m| m.flags.is_native()) {
                let key = format!("{}.{}{}", class.name, method.name, method.descriptor);
                assert!(natives.lookup(&key).is_some(), "unbound native {}", key);
            }
        }
    }
}
