use crate::bytecode::Opcode;
use crate::vm::classes::Method;
use crate::vm::context::SuspendReason;
use crate::vm::exceptions::ExceptionKind;
use crate::vm::frame::NativeInvocation;
use crate::vm::interpreter::core::link_failure;
use crate::vm::interpreter::execution::ControlFlow;
use crate::vm::interpreter::Interpreter;
use crate::vm::monitor::LockOutcome;
use crate::vm::VmResult;
use std::sync::Arc;

fn incompatible(message: String) -> ControlFlow {
    ControlFlow::throw(ExceptionKind::IncompatibleClassChange, message)
}

impl<'a> Interpreter<'a> {
    pub(in crate::vm::interpreter) fn exec_call_ops(&mut self, opcode: Opcode) -> VmResult<ControlFlow> {
        let frame = self.ctx.top_mut()?;
        let index = frame.read_u16()?;
        if opcode == Opcode::Invokeinterface {
            // argument count and a reserved zero byte
            frame.read_u8()?;
            frame.read_u8()?;
        }
        let method = match self.resolve_method(index)? {
            Ok(method) => method,
            Err(e) => return Ok(link_failure(e)),
        };

        match opcode {
            Opcode::Invokestatic => {
                if !method.is_static() {
                    return Ok(incompatible(format!("expected static method {}", method.qualified_name())));
                }
                if let Some(flow) = self.require_initialized(method.class)? {
                    return Ok(flow);
                }
                self.invoke(method)
            }

            Opcode::Invokespecial => {
                if method.is_static() {
                    return Ok(incompatible(format!("unexpected static method {}", method.qualified_name())));
                }
                if self.ctx.top()?.peek_invoke_object(method.arg_slots)?.is_none() {
                    return Ok(ControlFlow::null_pointer());
                }
                let target = self.select_special(method)?;
                self.invoke(target)
            }

            Opcode::Invokevirtual | Opcode::Invokeinterface => {
                if method.is_static() {
                    return Ok(incompatible(format!("unexpected static method {}", method.qualified_name())));
                }
                let Some(receiver) = self.ctx.top()?.peek_invoke_object(method.arg_slots)? else {
                    return Ok(ControlFlow::null_pointer());
                };
                let class = self.rt.heap.class_of(receiver)?;
                let classes = &self.rt.classes;
                let target = method
                    .vtable_index
                    .and_then(|slot| classes.vtable_entry(class, slot))
                    .filter(|m| m.name == method.name && m.descriptor == method.descriptor)
                    .or_else(|| classes.find_virtual(class, &method.name, &method.descriptor));
                match target {
                    Some(target) => self.invoke(target),
                    None => {
                        let name = classes.get(class)?.name.replace('/', ".");
                        Ok(incompatible(format!(
                            "{} does not implement {}{}",
                            name, method.name, method.descriptor
                        )))
                    }
                }
            }
            _ => Err(Self::misrouted("call", opcode)),
        }
    }

    /// Method `invokespecial` actually runs: constructors and private
    /// methods as resolved, anything else looked up from the caller's
    /// superclass
    fn select_special(&self, method: Arc<Method>) -> VmResult<Arc<Method>> {
        if method.name == "<init>" || method.flags.is_private() {
            return Ok(method);
        }
        let caller = self.ctx.top()?.method.class;
        let Some(parent) = self.rt.classes.get(caller)?.super_class else {
            return Ok(method);
        };
        if !self.rt.classes.is_subclass(parent, method.class) {
            return Ok(method);
        }
        Ok(self
            .rt
            .classes
            .find_virtual(parent, &method.name, &method.descriptor)
            .unwrap_or(method))
    }

    /// Push a frame for `method`, taking its arguments and receiver off the
    /// caller's stack.
    ///
    /// Native methods get their host binding attached to the frame.
    /// Synchronized methods lock the receiver, or the class object for
    /// static methods, before their first instruction; a contended lock
    /// suspends the context with the new frame already in place.
    pub(in crate::vm::interpreter) fn invoke(&mut self, method: Arc<Method>) -> VmResult<ControlFlow> {
        if method.is_abstract() {
            return Ok(ControlFlow::throw(ExceptionKind::AbstractMethod, method.qualified_name()));
        }
        let function = if method.is_native() {
            match self.rt.natives.lookup(&method.qualified_name()) {
                Some(function) => Some(function),
                None => {
                    tracing::warn!(method = %method.qualified_name(), "no native bound");
                    return Ok(ControlFlow::throw(ExceptionKind::UnsatisfiedLink, method.qualified_name()))
                }
            }
        } else {
            None
        };

        let args = self.ctx.top_mut()?.pop_slots(method.call_slots())?;
        let receiver = match args.first() {
            Some(value) if !method.is_static() => value.as_object()?,
            _ => None,
        };
        let mut frame = self.rt.frame_pool.create(method.clone(), args);
        if let Some(function) = function {
            let skip = usize::from(!method.is_static());
            frame.native = Some(NativeInvocation {
                function,
                receiver,
                args: frame.locals[skip..method.call_slots()].to_vec(),
            });
        }

        let lock = match (method.is_synchronized(), receiver) {
            (false, _) => None,
            (true, Some(object)) => Some(object),
            (true, None) => Some(self.rt.class_mirror(method.class)?),
        };
        frame.lock_object = lock;

        if self.rt.options.trace_frames {
            tracing::trace!(
                context = %self.ctx.id(),
                method = %method.qualified_name(),
                depth = self.ctx.depth() + 1,
                "enter frame"
            );
        }
        let now = self.rt.scheduler.now();
        self.ctx.push_frame(frame, now);

        if let Some(object) = lock {
            if self.rt.monitor_enter(self.ctx, object)? == LockOutcome::Blocked {
                return Ok(ControlFlow::Suspend(SuspendReason::MonitorEnter { object }));
            }
        }
        Ok(ControlFlow::Continue)
    }
}
