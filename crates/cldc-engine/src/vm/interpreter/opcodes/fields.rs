use crate::bytecode::Opcode;
use crate::vm::interpreter::core::link_failure;
use crate::vm::interpreter::execution::ControlFlow;
use crate::vm::interpreter::Interpreter;
use crate::vm::VmResult;

impl<'a> Interpreter<'a> {
    pub(in crate::vm::interpreter) fn exec_field_ops(&mut self, opcode: Opcode) -> VmResult<ControlFlow> {
        let index = self.ctx.top_mut()?.read_u16()?;
        match opcode {
            // =========================================================
            // Static Fields
            // =========================================================
            Opcode::Getstatic | Opcode::Putstatic => {
                let field = match self.resolve_static(index)? {
                    Ok(field) => field,
                    Err(e) => return Ok(link_failure(e)),
                };
                if let Some(flow) = self.require_initialized(field.class)? {
                    return Ok(flow);
                }
                if opcode == Opcode::Getstatic {
                    let value = self.rt.classes.static_value(field.class, field.slot)?;
                    self.ctx.top_mut()?.push_value(value);
                } else {
                    let frame = self.ctx.top_mut()?;
                    let value = if field.kind.is_wide() { frame.pop2()? } else { frame.pop()? };
                    self.rt.classes.set_static(field.class, field.slot, value)?;
                }
            }

            // =========================================================
            // Instance Fields
            // =========================================================
            Opcode::Getfield => {
                let field = match self.resolve_field(index)? {
                    Ok(field) => field,
                    Err(e) => return Ok(link_failure(e)),
                };
                let frame = self.ctx.top_mut()?;
                let Some(object) = frame.pop_ref()? else {
                    return Ok(ControlFlow::null_pointer());
                };
                let value = self.rt.heap.field(object, field.slot)?;
                frame.push_value(value);
            }
            Opcode::Putfield => {
                let field = match self.resolve_field(index)? {
                    Ok(field) => field,
                    Err(e) => return Ok(link_failure(e)),
                };
                let frame = self.ctx.top_mut()?;
                let value = if field.kind.is_wide() { frame.pop2()? } else { frame.pop()? };
                let Some(object) = frame.pop_ref()? else {
                    return Ok(ControlFlow::null_pointer());
                };
                self.rt.heap.set_field(object, field.slot, value)?;
            }
            _ => return Err(Self::misrouted("field", opcode)),
        }
        Ok(ControlFlow::Continue)
    }
}
