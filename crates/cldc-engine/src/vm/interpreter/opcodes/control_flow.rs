use super::variables::ret;
use crate::bytecode::Opcode;
use crate::vm::frame::Frame;
use crate::vm::interpreter::execution::ControlFlow;
use crate::vm::interpreter::Interpreter;
use crate::vm::value::Value;
use crate::vm::VmResult;

/// Take a 16-bit branch when `taken`
fn branch_if(frame: &mut Frame, taken: bool) -> VmResult<()> {
    let target = frame.read_branch_target()?;
    if taken {
        frame.pc = target;
    }
    Ok(())
}

fn int_branch(frame: &mut Frame, test: impl FnOnce(i32) -> bool) -> VmResult<()> {
    let value = frame.pop_int()?;
    branch_if(frame, test(value))
}

fn int_compare_branch(frame: &mut Frame, test: impl FnOnce(i32, i32) -> bool) -> VmResult<()> {
    let b = frame.pop_int()?;
    let a = frame.pop_int()?;
    branch_if(frame, test(a, b))
}

impl<'a> Interpreter<'a> {
    pub(in crate::vm::interpreter) fn exec_control_flow_ops(&mut self, opcode: Opcode) -> VmResult<ControlFlow> {
        let frame = self.ctx.top_mut()?;
        match opcode {
            // =========================================================
            // Conditional Branches
            // =========================================================
            Opcode::Ifeq => int_branch(frame, |v| v == 0)?,
            Opcode::Ifne => int_branch(frame, |v| v != 0)?,
            Opcode::Iflt => int_branch(frame, |v| v < 0)?,
            Opcode::Ifge => int_branch(frame, |v| v >= 0)?,
            Opcode::Ifgt => int_branch(frame, |v| v > 0)?,
            Opcode::Ifle => int_branch(frame, |v| v <= 0)?,
            Opcode::IfIcmpeq => int_compare_branch(frame, |a, b| a == b)?,
            Opcode::IfIcmpne => int_compare_branch(frame, |a, b| a != b)?,
            Opcode::IfIcmplt => int_compare_branch(frame, |a, b| a < b)?,
            Opcode::IfIcmpge => int_compare_branch(frame, |a, b| a >= b)?,
            Opcode::IfIcmpgt => int_compare_branch(frame, |a, b| a > b)?,
            Opcode::IfIcmple => int_compare_branch(frame, |a, b| a <= b)?,
            Opcode::IfAcmpeq | Opcode::IfAcmpne => {
                let b = frame.pop_ref()?;
                let a = frame.pop_ref()?;
                branch_if(frame, (a == b) == (opcode == Opcode::IfAcmpeq))?;
            }
            Opcode::Ifnull | Opcode::Ifnonnull => {
                let value = frame.pop_ref()?;
                branch_if(frame, value.is_none() == (opcode == Opcode::Ifnull))?;
            }

            // =========================================================
            // Jumps and Subroutines
            // =========================================================
            Opcode::Goto => branch_if(frame, true)?,
            Opcode::GotoW => frame.pc = frame.read_wide_branch_target()?,
            Opcode::Jsr | Opcode::JsrW => {
                let target = if opcode == Opcode::Jsr {
                    frame.read_branch_target()?
                } else {
                    frame.read_wide_branch_target()?
                };
                frame.push(Value::ReturnAddress(frame.pc));
                frame.pc = target;
            }
            Opcode::Ret => {
                let index = usize::from(frame.read_u8()?);
                ret(frame, index)?;
            }
            Opcode::Tableswitch => {
                let key = frame.pop_int()?;
                frame.pc = frame.table_switch(key)?;
            }
            Opcode::Lookupswitch => {
                let key = frame.pop_int()?;
                frame.pc = frame.lookup_switch(key)?;
            }

            // =========================================================
            // Returns
            // =========================================================
            Opcode::Ireturn => return Ok(ControlFlow::Return(Some(Value::Int(frame.pop_int()?)))),
            Opcode::Lreturn => return Ok(ControlFlow::Return(Some(Value::Long(frame.pop_long()?)))),
            Opcode::Freturn => return Ok(ControlFlow::Return(Some(Value::Float(frame.pop_float()?)))),
            Opcode::Dreturn => {
                return Ok(ControlFlow::Return(Some(Value::Double(frame.pop_double()?))))
            }
            Opcode::Areturn => {
                let value = frame.pop_ref()?;
                return Ok(ControlFlow::Return(Some(Value::from_ref(value))));
            }
            Opcode::Return => return Ok(ControlFlow::Return(None)),
            _ => return Err(Self::misrouted("control flow", opcode)),
        }
        Ok(ControlFlow::Continue)
    }
}
