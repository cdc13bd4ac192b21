use crate::bytecode::Opcode;
use crate::vm::interpreter::execution::ControlFlow;
use crate::vm::interpreter::Interpreter;
use crate::vm::natives::{NativeCall, NativeResult};
use crate::vm::{VmError, VmResult};

impl<'a> Interpreter<'a> {
    /// `invokenative`: call the host function bound to the current frame.
    /// The method's return instruction follows and hands any pushed value
    /// to the caller.
    pub(in crate::vm::interpreter) fn exec_native_ops(&mut self, opcode: Opcode) -> VmResult<ControlFlow> {
        if opcode != Opcode::InvokeNative {
            return Err(Self::misrouted("native", opcode));
        }
        let frame = self.ctx.top_mut()?;
        let invocation = frame.native.take().ok_or_else(|| {
            VmError::Internal(format!("{} has no native binding", frame.method.qualified_name()))
        })?;

        let mut call = NativeCall {
            rt: &mut *self.rt,
            ctx: &mut *self.ctx,
            receiver: invocation.receiver,
            args: &invocation.args,
        };
        let result = (invocation.function)(&mut call)?;

        Ok(match result {
            NativeResult::Void => ControlFlow::Continue,
            NativeResult::Value(value) => {
                self.ctx.top_mut()?.push_value(value);
                ControlFlow::Continue
            }
            NativeResult::Throw(kind, message) => ControlFlow::Throw(kind, message),
            NativeResult::ThrowObject(exception) => ControlFlow::Exception(exception),
            NativeResult::Suspend(reason) => ControlFlow::Suspend(reason),
            NativeResult::Yield => ControlFlow::Yield,
        })
    }
}
