//! Activation frames and the frame free list
//!
//! A frame is one method activation: locals, operand stack, program counter
//! and the method's code. Frames are recycled through a `FramePool` rather
//! than dropped; a frame is always popped off its context before it is
//! returned to the pool, so a freed frame is never observed again.

use crate::bytecode::Opcode;
use crate::vm::classes::{ClassId, Method};
use crate::vm::natives::NativeFn;
use crate::vm::value::{ObjectRef, Value};
use crate::vm::{VmError, VmResult};
use std::sync::Arc;

/// Host call bound to a native frame.
///
/// Native frames run the two-instruction sequence `invokenative; xreturn`;
/// `invokenative` consumes this record.
#[derive(Clone)]
pub struct NativeInvocation {
    /// Host function
    pub function: NativeFn,
    /// Receiver for instance methods
    pub receiver: Option<ObjectRef>,
    /// Argument slots, receiver excluded
    pub args: Vec<Value>,
}

impl std::fmt::Debug for NativeInvocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeInvocation")
            .field("receiver", &self.receiver)
            .field("args", &self.args)
            .finish()
    }
}

/// One method activation record
#[derive(Debug)]
pub struct Frame {
    /// Executing method
    pub method: Arc<Method>,
    /// Local variable slots
    pub locals: Vec<Value>,
    /// Operand stack slots
    pub stack: Vec<Value>,
    /// Offset of the next byte to read
    pub pc: usize,
    /// Offset of the instruction being executed
    pub op_pc: usize,
    /// Object locked on entry to a synchronized method
    pub lock_object: Option<ObjectRef>,
    code: Arc<[u8]>,
    pub(crate) native: Option<NativeInvocation>,
    pub(crate) init_class: Option<ClassId>,
}

impl Frame {
    /// Fresh frame whose locals start with `args`
    pub fn new(method: Arc<Method>, args: Vec<Value>) -> Self {
        let mut frame = Frame {
            code: method.code(),
            method,
            locals: Vec::new(),
            stack: Vec::new(),
            pc: 0,
            op_pc: 0,
            lock_object: None,
            native: None,
            init_class: None,
        };
        frame.fill_locals(args);
        frame
    }

    /// Reinitialize a recycled frame in place
    pub fn reset(&mut self, method: Arc<Method>, args: Vec<Value>) {
        self.code = method.code();
        self.method = method;
        self.stack.clear();
        self.pc = 0;
        self.op_pc = 0;
        self.lock_object = None;
        self.native = None;
        self.init_class = None;
        self.fill_locals(args);
    }

    fn fill_locals(&mut self, args: Vec<Value>) {
        let size = usize::from(self.method.max_locals).max(args.len());
        self.locals.clear();
        self.locals.extend(args);
        self.locals.resize(size, Value::Top);
        self.stack.reserve(usize::from(self.method.max_stack));
    }

    /// The method's bytecode
    pub fn code(&self) -> &[u8] {
        &self.code
    }

    // ========================================================================
    // Bytecode reader
    // ========================================================================

    /// Read an unsigned byte
    pub fn read_u8(&mut self) -> VmResult<u8> {
        let byte = *self
            .code
            .get(self.pc)
            .ok_or(VmError::CodeOverrun(self.pc))?;
        self.pc += 1;
        Ok(byte)
    }

    /// Read a signed byte
    pub fn read_i8(&mut self) -> VmResult<i8> {
        Ok(self.read_u8()? as i8)
    }

    /// Read a big-endian u16
    pub fn read_u16(&mut self) -> VmResult<u16> {
        let hi = self.read_u8()?;
        let lo = self.read_u8()?;
        Ok(u16::from_be_bytes([hi, lo]))
    }

    /// Read a big-endian i16
    pub fn read_i16(&mut self) -> VmResult<i16> {
        Ok(self.read_u16()? as i16)
    }

    /// Read a big-endian i32
    pub fn read_i32(&mut self) -> VmResult<i32> {
        let bytes = self
            .code
            .get(self.pc..self.pc + 4)
            .ok_or(VmError::CodeOverrun(self.pc))?;
        let value = i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        self.pc += 4;
        Ok(value)
    }

    /// Read a big-endian u32
    pub fn read_u32(&mut self) -> VmResult<u32> {
        Ok(self.read_i32()? as u32)
    }

    /// Read a 16-bit branch offset and return its absolute target, measured
    /// from the start of the current instruction
    pub fn read_branch_target(&mut self) -> VmResult<usize> {
        let offset = self.read_i16()?;
        self.target(i32::from(offset))
    }

    /// 32-bit variant of `read_branch_target` for `goto_w` and `jsr_w`
    pub fn read_wide_branch_target(&mut self) -> VmResult<usize> {
        let offset = self.read_i32()?;
        self.target(offset)
    }

    fn target(&self, offset: i32) -> VmResult<usize> {
        let target = self.op_pc as i64 + i64::from(offset);
        if target < 0 || target as usize >= self.code.len() {
            return Err(VmError::CodeOverrun(target.max(0) as usize));
        }
        Ok(target as usize)
    }

    fn align_to_word(&mut self) {
        self.pc = (self.pc + 3) & !3;
    }

    /// Decode a `tableswitch` payload and return the branch target for `key`
    pub fn table_switch(&mut self, key: i32) -> VmResult<usize> {
        self.align_to_word();
        let default = self.read_i32()?;
        let low = self.read_i32()?;
        let high = self.read_i32()?;
        if key < low || key > high {
            return self.target(default);
        }
        self.pc += (key as i64 - low as i64) as usize * 4;
        let offset = self.read_i32()?;
        self.target(offset)
    }

    /// Decode a `lookupswitch` payload and return the branch target for `key`.
    ///
    /// Pairs are sorted by key; the scan stops at the first key not smaller
    /// than `key`.
    pub fn lookup_switch(&mut self, key: i32) -> VmResult<usize> {
        self.align_to_word();
        let default = self.read_i32()?;
        let pairs = self.read_i32()?;
        for _ in 0..pairs.max(0) {
            let candidate = self.read_i32()?;
            let offset = self.read_i32()?;
            if candidate == key {
                return self.target(offset);
            }
            if candidate > key {
                break;
            }
        }
        self.target(default)
    }

    /// Opcode of the instruction currently executing
    pub fn current_opcode(&self) -> Option<Opcode> {
        self.code.get(self.op_pc).copied().and_then(Opcode::from_u8)
    }

    // ========================================================================
    // Operand stack
    // ========================================================================

    /// Push one slot
    #[inline]
    pub fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    /// Push a two-slot value: the value, then its `Top` half
    #[inline]
    pub fn push2(&mut self, value: Value) {
        self.stack.push(value);
        self.stack.push(Value::Top);
    }

    /// Push any value with the right width
    pub fn push_value(&mut self, value: Value) {
        if value.is_wide() {
            self.push2(value);
        } else {
            self.push(value);
        }
    }

    /// Pop one slot
    #[inline]
    pub fn pop(&mut self) -> VmResult<Value> {
        self.stack.pop().ok_or(VmError::StackUnderflow)
    }

    /// Pop a two-slot value pushed by `push2`
    pub fn pop2(&mut self) -> VmResult<Value> {
        match self.pop()? {
            Value::Top => self.pop(),
            other => Err(VmError::TypeError {
                expected: "two-slot value",
                found: format!("{:?}", other),
            }),
        }
    }

    /// Pop an int
    pub fn pop_int(&mut self) -> VmResult<i32> {
        self.pop()?.as_int()
    }

    /// Pop a long
    pub fn pop_long(&mut self) -> VmResult<i64> {
        self.pop2()?.as_long()
    }

    /// Pop a float
    pub fn pop_float(&mut self) -> VmResult<f32> {
        self.pop()?.as_float()
    }

    /// Pop a double
    pub fn pop_double(&mut self) -> VmResult<f64> {
        self.pop2()?.as_double()
    }

    /// Pop a reference; `None` for null
    pub fn pop_ref(&mut self) -> VmResult<Option<ObjectRef>> {
        self.pop()?.as_object()
    }

    /// Slot `depth` below the top of the stack (0 is the top)
    pub fn peek(&self, depth: usize) -> VmResult<Value> {
        let len = self.stack.len();
        let index = len.checked_sub(depth + 1).ok_or(VmError::StackUnderflow)?;
        Ok(self.stack[index])
    }

    /// Receiver of a call whose `arg_slots` argument slots are already on the
    /// stack, without popping anything
    pub fn peek_invoke_object(&self, arg_slots: usize) -> VmResult<Option<ObjectRef>> {
        self.peek(arg_slots)?.as_object()
    }

    /// Pop the top `count` slots in push order
    pub fn pop_slots(&mut self, count: usize) -> VmResult<Vec<Value>> {
        let at = self
            .stack
            .len()
            .checked_sub(count)
            .ok_or(VmError::StackUnderflow)?;
        Ok(self.stack.split_off(at))
    }

    // ========================================================================
    // Locals
    // ========================================================================

    /// Read local `index`
    pub fn load(&self, index: usize) -> VmResult<Value> {
        self.locals
            .get(index)
            .copied()
            .ok_or(VmError::BadLocal(index))
    }

    /// Write local `index`; two-slot values also overwrite `index + 1`
    pub fn store(&mut self, index: usize, value: Value) -> VmResult<()> {
        let width = if value.is_wide() { 2 } else { 1 };
        if index + width > self.locals.len() {
            return Err(VmError::BadLocal(index));
        }
        self.locals[index] = value;
        if width == 2 {
            self.locals[index + 1] = Value::Top;
        }
        Ok(())
    }
}

/// Free list of frames.
///
/// Recycled frames keep their vector capacity, so steady-state calls do not
/// allocate.
#[derive(Debug, Default)]
pub struct FramePool {
    free: Vec<Frame>,
    max_size: usize,
    created: u64,
    reused: u64,
}

impl FramePool {
    /// Create a pool that holds up to `max_size` idle frames
    pub fn new(max_size: usize) -> Self {
        Self {
            free: Vec::with_capacity(max_size.min(64)),
            max_size,
            created: 0,
            reused: 0,
        }
    }

    /// Get a frame for `method` with `args` in its first locals
    pub fn create(&mut self, method: Arc<Method>, args: Vec<Value>) -> Frame {
        match self.free.pop() {
            Some(mut frame) => {
                self.reused += 1;
                frame.reset(method, args);
                frame
            }
            None => {
                self.created += 1;
                Frame::new(method, args)
            }
        }
    }

    /// Return a frame that has already been popped off its context
    pub fn free(&mut self, mut frame: Frame) {
        if self.free.len() < self.max_size {
            frame.native = None;
            frame.lock_object = None;
            self.free.push(frame);
        }
    }

    /// Idle frames held
    pub fn idle(&self) -> usize {
        self.free.len()
    }

    /// Frames allocated fresh vs. recycled
    pub fn counts(&self) -> (u64, u64) {
        (self.created, self.reused)
    }
}
