//! Exception dispatch
//!
//! A thrown exception is matched against the exception table of the top
//! frame at the throwing instruction. The first covering entry whose catch
//! type accepts the exception wins; otherwise the frame is popped, releasing
//! its monitor, and the search continues in the caller at its call site.

use super::core::Interpreter;
use crate::vm::classes::ClassId;
use crate::vm::exceptions::{capture_trace, UncaughtException};
use crate::vm::value::{ObjectRef, Value};
use crate::vm::VmResult;

impl<'a> Interpreter<'a> {
    /// Throw `exception` in the current context.
    ///
    /// Returns `None` when a handler took it, with the handler's frame on
    /// top and `pc` at the handler. Returns the uncaught report once every
    /// frame has been popped.
    pub(in crate::vm::interpreter) fn throw(&mut self, exception: ObjectRef) -> VmResult<Option<UncaughtException>> {
        let exception_class = self.rt.heap.class_of(exception)?;
        let trace = capture_trace(self.ctx);
        if self.rt.options.print_all_exceptions {
            let name = self.rt.classes.get(exception_class)?.name.replace('/', ".");
            tracing::info!(
                context = %self.ctx.id(),
                exception = %name,
                at = %trace.first().map(|e| format!("{}.{}", e.class, e.method)).unwrap_or_default(),
                "exception thrown"
            );
        }

        while self.ctx.depth() > 0 {
            if let Some(handler) = self.find_handler(exception_class)? {
                let frame = self.ctx.top_mut()?;
                frame.stack.clear();
                frame.push(Value::Ref(exception));
                frame.pc = handler;
                return Ok(None);
            }
            // a monitor the frame no longer owns is not an error while
            // unwinding
            self.pop_frame(false)?;
        }

        Ok(Some(self.rt.describe_uncaught(self.ctx, exception, trace)?))
    }

    /// Handler offset in the top frame for an exception of class
    /// `exception_class` thrown at the frame's current instruction
    fn find_handler(&mut self, exception_class: ClassId) -> VmResult<Option<usize>> {
        let frame = self.ctx.top()?;
        let method = frame.method.clone();
        let pc = frame.op_pc;
        for entry in method.exception_table.iter().filter(|e| e.covers(pc)) {
            if entry.catch_type == 0 {
                return Ok(Some(usize::from(entry.handler_pc)));
            }
            match self.resolve_class_in(&method, entry.catch_type) {
                Ok(catch) if self.rt.classes.is_assignable(exception_class, catch) => {
                    return Ok(Some(usize::from(entry.handler_pc)));
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(
                        method = %method.qualified_name(),
                        error = %e,
                        "skipping handler with unresolvable catch type"
                    );
                }
            }
        }
        Ok(None)
    }
}
