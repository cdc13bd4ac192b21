use crate::bytecode::Opcode;
use crate::vm::interpreter::execution::ControlFlow;
use crate::vm::interpreter::Interpreter;
use crate::vm::VmResult;

impl<'a> Interpreter<'a> {
    pub(in crate::vm::interpreter) fn exec_exception_ops(&mut self, opcode: Opcode) -> VmResult<ControlFlow> {
        match opcode {
            Opcode::Athrow => match self.ctx.top_mut()?.pop_ref()? {
                Some(exception) => Ok(ControlFlow::Exception(exception)),
                None => Ok(ControlFlow::null_pointer()),
            },
            _ => Err(Self::misrouted("exception", opcode)),
        }
    }
}
