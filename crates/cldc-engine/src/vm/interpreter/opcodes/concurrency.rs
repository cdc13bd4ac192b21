use crate::bytecode::Opcode;
use crate::vm::context::SuspendReason;
use crate::vm::interpreter::execution::ControlFlow;
use crate::vm::interpreter::Interpreter;
use crate::vm::monitor::{LockOutcome, MonitorError};
use crate::vm::VmResult;

impl<'a> Interpreter<'a> {
    /// `monitorenter` / `monitorexit`.
    ///
    /// A contended enter parks the context in the monitor's entry queue; the
    /// context resumes after the instruction, already owning the lock.
    pub(in crate::vm::interpreter) fn exec_concurrency_ops(&mut self, opcode: Opcode) -> VmResult<ControlFlow> {
        let Some(object) = self.ctx.top_mut()?.pop_ref()? else {
            return Ok(ControlFlow::null_pointer());
        };
        match opcode {
            Opcode::Monitorenter => match self.rt.monitor_enter(self.ctx, object)? {
                LockOutcome::Acquired => Ok(ControlFlow::Continue),
                LockOutcome::Blocked => Ok(ControlFlow::Suspend(SuspendReason::MonitorEnter { object })),
            },
            Opcode::Monitorexit => match self.rt.monitor_exit(self.ctx, object) {
                Ok(()) => Ok(ControlFlow::Continue),
                Err(MonitorError::Throw(kind)) => Ok(ControlFlow::throw_bare(kind)),
                Err(MonitorError::Vm(e)) => Err(e),
            },
            _ => Err(Self::misrouted("concurrency", opcode)),
        }
    }
}
