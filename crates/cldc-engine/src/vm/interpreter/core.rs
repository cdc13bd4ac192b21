//! Dispatch loop
//!
//! The interpreter borrows the runtime and the context it runs for the
//! length of one slice. All execution state lives in the context's frames,
//! so a slice can end at any instruction boundary and the next slice picks
//! up exactly where this one stopped.

use super::cache::Resolution;
use super::execution::{ControlFlow, ExecutionResult};
use crate::bytecode::Opcode;
use crate::vm::classes::{ClassId, InitOutcome, InitState, LinkError, Method, ResolvedField, ResolvedStatic};
use crate::vm::context::Context;
use crate::vm::exceptions::ExceptionKind;
use crate::vm::monitor::MonitorError;
use crate::vm::runtime::Runtime;
use crate::vm::value::Value;
use crate::vm::{VmError, VmResult};
use std::sync::Arc;

/// Map a resolution failure to the Java error it raises
pub(in crate::vm::interpreter) fn link_failure(error: LinkError) -> ControlFlow {
    ControlFlow::Throw(error.exception_kind(), Some(error.to_string()))
}

/// Interpreter for one slice of one context
pub struct Interpreter<'a> {
    /// Machine state
    pub(in crate::vm::interpreter) rt: &'a mut Runtime,

    /// Context being executed; not present in `rt.contexts` meanwhile
    pub(in crate::vm::interpreter) ctx: &'a mut Context,
}

impl<'a> Interpreter<'a> {
    /// Create an interpreter for `ctx`
    pub fn new(rt: &'a mut Runtime, ctx: &'a mut Context) -> Self {
        Self { rt, ctx }
    }

    /// Execute until the slice ends.
    ///
    /// The preemption predicate is consulted before every instruction;
    /// nothing else ends a slice except the context finishing, blocking or
    /// failing.
    pub fn run(&mut self) -> VmResult<ExecutionResult> {
        loop {
            if self.ctx.depth() == 0 {
                return Ok(ExecutionResult::Finished(self.ctx.result));
            }
            if self.rt.scheduler.should_preempt(self.ctx) {
                return Ok(ExecutionResult::Preempted);
            }

            match self.step()? {
                ControlFlow::Continue => {}
                ControlFlow::Return(value) => {
                    if let Some(done) = self.return_from_frame(value)? {
                        return Ok(done);
                    }
                }
                ControlFlow::Throw(kind, message) => {
                    let exception = self.rt.new_exception(kind, message.as_deref())?;
                    if let Some(report) = self.throw(exception)? {
                        return Ok(ExecutionResult::Failed(report));
                    }
                }
                ControlFlow::Exception(exception) => {
                    if let Some(report) = self.throw(exception)? {
                        return Ok(ExecutionResult::Failed(report));
                    }
                }
                ControlFlow::Suspend(reason) => {
                    let now = self.rt.scheduler.now();
                    self.ctx.pause(reason.clone(), now);
                    return Ok(ExecutionResult::Suspended(reason));
                }
                ControlFlow::Yield => return Ok(ExecutionResult::Yielded),
            }
        }
    }

    /// Decode and execute one instruction
    fn step(&mut self) -> VmResult<ControlFlow> {
        let id = self.ctx.id();
        let frame = self.ctx.top_mut()?;
        frame.op_pc = frame.pc;
        let byte = frame.read_u8()?;
        let opcode = Opcode::from_u8(byte).ok_or_else(|| VmError::InvalidOpcode {
            opcode: byte,
            pc: frame.op_pc,
            method: frame.method.qualified_name(),
        })?;
        if self.rt.options.trace_instructions {
            tracing::trace!(
                context = %id,
                method = %frame.method.name,
                pc = frame.op_pc,
                op = opcode.name(),
                depth = frame.stack.len(),
                "exec"
            );
        }
        self.execute_opcode(opcode)
    }

    fn execute_opcode(&mut self, opcode: Opcode) -> VmResult<ControlFlow> {
        use Opcode::*;
        match opcode {
            Nop | Pop | Pop2 | Dup | DupX1 | DupX2 | Dup2 | Dup2X1 | Dup2X2 | Swap => {
                self.exec_stack_ops(opcode)
            }

            AconstNull | IconstM1 | Iconst0 | Iconst1 | Iconst2 | Iconst3 | Iconst4 | Iconst5
            | Lconst0 | Lconst1 | Fconst0 | Fconst1 | Fconst2 | Dconst0 | Dconst1 | Bipush
            | Sipush | Ldc | LdcW | Ldc2W => self.exec_constant_ops(opcode),

            Iload | Lload | Fload | Dload | Aload | Iload0 | Iload1 | Iload2 | Iload3 | Lload0
            | Lload1 | Lload2 | Lload3 | Fload0 | Fload1 | Fload2 | Fload3 | Dload0 | Dload1
            | Dload2 | Dload3 | Aload0 | Aload1 | Aload2 | Aload3 | Istore | Lstore | Fstore
            | Dstore | Astore | Istore0 | Istore1 | Istore2 | Istore3 | Lstore0 | Lstore1
            | Lstore2 | Lstore3 | Fstore0 | Fstore1 | Fstore2 | Fstore3 | Dstore0 | Dstore1
            | Dstore2 | Dstore3 | Astore0 | Astore1 | Astore2 | Astore3 | Iinc | Wide => {
                self.exec_variable_ops(opcode)
            }

            Iaload | Laload | Faload | Daload | Aaload | Baload | Caload | Saload | Iastore
            | Lastore | Fastore | Dastore | Aastore | Bastore | Castore | Sastore | Newarray
            | Anewarray | Arraylength | Multianewarray => self.exec_array_ops(opcode),

            Iadd | Ladd | Fadd | Dadd | Isub | Lsub | Fsub | Dsub | Imul | Lmul | Fmul | Dmul
            | Idiv | Ldiv | Fdiv | Ddiv | Irem | Lrem | Frem | Drem | Ineg | Lneg | Fneg | Dneg
            | Ishl | Lshl | Ishr | Lshr | Iushr | Lushr | Iand | Land | Ior | Lor | Ixor | Lxor => {
                self.exec_arithmetic_ops(opcode)
            }

            I2l | I2f | I2d | L2i | L2f | L2d | F2i | F2l | F2d | D2i | D2l | D2f | I2b | I2c
            | I2s => self.exec_conversion_ops(opcode),

            Lcmp | Fcmpl | Fcmpg | Dcmpl | Dcmpg => self.exec_comparison_ops(opcode),

            Ifeq | Ifne | Iflt | Ifge | Ifgt | Ifle | IfIcmpeq | IfIcmpne | IfIcmplt | IfIcmpge
            | IfIcmpgt | IfIcmple | IfAcmpeq | IfAcmpne | Goto | Jsr | Ret | Tableswitch
            | Lookupswitch | Ireturn | Lreturn | Freturn | Dreturn | Areturn | Return | Ifnull
            | Ifnonnull | GotoW | JsrW => self.exec_control_flow_ops(opcode),

            Getstatic | Putstatic | Getfield | Putfield => self.exec_field_ops(opcode),

            Invokevirtual | Invokespecial | Invokestatic | Invokeinterface => {
                self.exec_call_ops(opcode)
            }

            New | Checkcast | Instanceof => self.exec_object_ops(opcode),

            Athrow => self.exec_exception_ops(opcode),

            Monitorenter | Monitorexit => self.exec_concurrency_ops(opcode),

            InvokeNative => self.exec_native_ops(opcode),
        }
    }

    /// Error for a handler asked to run an opcode outside its category
    pub(in crate::vm::interpreter) fn misrouted(category: &str, opcode: Opcode) -> VmError {
        VmError::Internal(format!("not a {} opcode: {}", category, opcode.name()))
    }

    // ========================================================================
    // Frame exit
    // ========================================================================

    /// Pop the top frame, releasing its monitor and closing its class
    /// initializer. Returns the exception the monitor release raised, if any.
    pub(in crate::vm::interpreter) fn pop_frame(&mut self, completed: bool) -> VmResult<Option<ExceptionKind>> {
        let now = self.rt.scheduler.now();
        let frame = self.ctx.pop_frame(now).ok_or(VmError::NoFrame)?;
        if self.rt.options.trace_frames {
            tracing::trace!(
                context = %self.ctx.id(),
                method = %frame.method.qualified_name(),
                completed,
                "leave frame"
            );
        }
        let mut failure = None;
        if let Some(object) = frame.lock_object {
            match self.rt.monitor_exit(self.ctx, object) {
                Ok(()) => {}
                Err(MonitorError::Throw(kind)) => failure = Some(kind),
                Err(MonitorError::Vm(e)) => return Err(e),
            }
        }
        if let Some(class) = frame.init_class {
            self.rt.finish_initialization(class, completed)?;
        }
        self.rt.frame_pool.free(frame);
        Ok(failure)
    }

    fn return_from_frame(&mut self, value: Option<Value>) -> VmResult<Option<ExecutionResult>> {
        let failure = self.pop_frame(true)?;
        if let Some(kind) = failure {
            let exception = self.rt.new_exception(kind, None)?;
            return Ok(self.throw(exception)?.map(ExecutionResult::Failed));
        }
        match self.ctx.current_mut() {
            Some(caller) => {
                if let Some(value) = value {
                    caller.push_value(value);
                }
                Ok(None)
            }
            None => {
                self.ctx.result = value;
                Ok(Some(ExecutionResult::Finished(value)))
            }
        }
    }

    // ========================================================================
    // Resolution
    // ========================================================================

    pub(in crate::vm::interpreter) fn current_method(&self) -> VmResult<Arc<Method>> {
        Ok(self.ctx.top()?.method.clone())
    }

    /// Resolve a class entry of the current method's pool
    pub(in crate::vm::interpreter) fn resolve_class(&mut self, index: u16) -> VmResult<Result<ClassId, LinkError>> {
        let method = self.current_method()?;
        Ok(self.resolve_class_in(&method, index))
    }

    /// Resolve a class entry of `method`'s pool
    pub(in crate::vm::interpreter) fn resolve_class_in(&mut self, method: &Method, index: u16) -> Result<ClassId, LinkError> {
        if let Some(Resolution::Class(class)) = self.rt.inline_cache.get(method.class, index) {
            return Ok(*class);
        }
        let class = self.rt.classes.resolve_class(&method.pool, index)?;
        self.rt
            .inline_cache
            .insert(method.class, index, Resolution::Class(class));
        Ok(class)
    }

    /// Resolve an instance field entry
    pub(in crate::vm::interpreter) fn resolve_field(&mut self, index: u16) -> VmResult<Result<ResolvedField, LinkError>> {
        let method = self.current_method()?;
        if let Some(Resolution::Field(field)) = self.rt.inline_cache.get(method.class, index) {
            return Ok(Ok(*field));
        }
        let result = self.rt.classes.resolve_field(&method.pool, index);
        if let Ok(field) = result {
            self.rt
                .inline_cache
                .insert(method.class, index, Resolution::Field(field));
        }
        Ok(result)
    }

    /// Resolve a static field entry
    pub(in crate::vm::interpreter) fn resolve_static(&mut self, index: u16) -> VmResult<Result<ResolvedStatic, LinkError>> {
        let method = self.current_method()?;
        if let Some(Resolution::Static(field)) = self.rt.inline_cache.get(method.class, index) {
            return Ok(Ok(*field));
        }
        let result = self.rt.classes.resolve_static_field(&method.pool, index);
        if let Ok(field) = result {
            self.rt
                .inline_cache
                .insert(method.class, index, Resolution::Static(field));
        }
        Ok(result)
    }

    /// Resolve a method entry
    pub(in crate::vm::interpreter) fn resolve_method(&mut self, index: u16) -> VmResult<Result<Arc<Method>, LinkError>> {
        let method = self.current_method()?;
        if let Some(Resolution::Method(target)) = self.rt.inline_cache.get(method.class, index) {
            return Ok(Ok(target.clone()));
        }
        let result = self.rt.classes.resolve_method(&method.pool, index);
        if let Ok(target) = &result {
            self.rt
                .inline_cache
                .insert(method.class, index, Resolution::Method(target.clone()));
        }
        Ok(result)
    }

    // ========================================================================
    // Class initialization
    // ========================================================================

    /// Make sure `class` is initialized before the current instruction uses
    /// it.
    ///
    /// Returns `None` when the instruction may proceed. Otherwise the
    /// instruction has been rewound so that it executes again once the
    /// initializer has run, and the returned flow must be handed back to
    /// the dispatch loop. Callers must not have popped any operands yet.
    pub(in crate::vm::interpreter) fn require_initialized(&mut self, class: ClassId) -> VmResult<Option<ControlFlow>> {
        if self.rt.classes.get(class)?.init_state == InitState::Initialized {
            return Ok(None);
        }
        let frame = self.ctx.top_mut()?;
        let resume_pc = frame.pc;
        frame.pc = frame.op_pc;
        match self.rt.ensure_initialized(self.ctx, class)? {
            InitOutcome::Ready => {
                self.ctx.top_mut()?.pc = resume_pc;
                Ok(None)
            }
            InitOutcome::Pushed => Ok(Some(ControlFlow::Continue)),
            InitOutcome::Blocked(reason) => Ok(Some(ControlFlow::Suspend(reason))),
            InitOutcome::Failed(name) => Ok(Some(ControlFlow::throw(ExceptionKind::NoClassDefFound, name))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::assemble;
    use crate::vm::context::NORMAL_PRIORITY;
    use crate::vm::options::VmOptions;
    use crate::vm::scheduler::ManualClock;

    fn run_static(source: &str, class: &str, name: &str, descriptor: &str, args: Vec<Value>) -> (Runtime, ExecutionResult) {
        let mut rt = Runtime::new(VmOptions::default(), Arc::new(ManualClock::new())).unwrap();
        for file in assemble(source).unwrap() {
            rt.classes.define(file).unwrap();
        }
        let id = rt.classes.load(class).unwrap();
        let method = rt.classes.find_method(id, name, descriptor).unwrap();
        let mut ctx = Context::new(NORMAL_PRIORITY);
        let frame = rt.frame_pool.create(method, args);
        ctx.push_frame(frame, Default::default());
        rt.scheduler.begin_turn();
        rt.scheduler.begin_slice(&ctx);
        let result = Interpreter::new(&mut rt, &mut ctx).run().unwrap();
        (rt, result)
    }

    #[test]
    fn test_invalid_opcode_is_fatal() {
        let mut rt = Runtime::new(VmOptions::default(), Arc::new(ManualClock::new())).unwrap();
        let def = crate::bytecode::MethodDef {
            name: "bad".into(),
            descriptor: "()V".into(),
            flags: crate::bytecode::AccessFlags(crate::bytecode::AccessFlags::STATIC),
            max_locals: 0,
            max_stack: 1,
            code: vec![0xba],
            exception_table: vec![],
        };
        let method = Arc::new(Method::for_test(def));
        let mut ctx = Context::new(NORMAL_PRIORITY);
        let frame = rt.frame_pool.create(method, vec![]);
        ctx.push_frame(frame, Default::default());
        let err = Interpreter::new(&mut rt, &mut ctx).run().unwrap_err();
        assert!(matches!(err, VmError::InvalidOpcode { opcode: 0xba, pc: 0, .. }));
    }

    #[test]
    fn test_static_call_returns_value() {
        let source = r#"
.class public app/Calc
.method public static twice(I)I
    iload_0
    iload_0
    iadd
    ireturn
.end method
.method public static main()I
    bipush 21
    invokestatic app/Calc.twice(I)I
    ireturn
.end method
.end class
"#;
        let (rt, result) = run_static(source, "app/Calc", "main", "()I", vec![]);
        assert_eq!(result, ExecutionResult::Finished(Some(Value::Int(42))));
        let (created, reused) = rt.frame_pool.counts();
        assert_eq!(created + reused, 2);
        assert!(rt.frame_pool.idle() >= 1);
    }

    #[test]
    fn test_static_initializer_runs_before_first_access() {
        let source = r#"
.class public app/Config
.field public static limit I
.method static <clinit>()V
    sipush 500
    putstatic app/Config.limit I
    return
.end method
.method public static read()I
    getstatic app/Config.limit I
    ireturn
.end method
.end class
"#;
        let (rt, result) = run_static(source, "app/Config", "read", "()I", vec![]);
        assert_eq!(result, ExecutionResult::Finished(Some(Value::Int(500))));
        let class = rt.classes.lookup("app/Config").unwrap();
        assert_eq!(rt.classes.get(class).unwrap().init_state, InitState::Initialized);
    }

    #[test]
    fn test_resolution_is_cached() {
        let source = r#"
.class public app/Loop
.field public static total I
.method public static run()I
    iconst_0
    istore_0
top:
    getstatic app/Loop.total I
    iconst_1
    iadd
    putstatic app/Loop.total I
    iinc 0 1
    iload_0
    bipush 10
    if_icmplt top
    getstatic app/Loop.total I
    ireturn
.end method
.end class
"#;
        let (rt, result) = run_static(source, "app/Loop", "run", "()I", vec![]);
        assert_eq!(result, ExecutionResult::Finished(Some(Value::Int(10))));
        let (hits, misses) = rt.inline_cache.counts();
        assert_eq!(misses, 1);
        assert!(hits >= 20);
    }
}
