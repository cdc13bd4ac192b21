use crate::bytecode::Opcode;
use crate::vm::interpreter::execution::ControlFlow;
use crate::vm::interpreter::Interpreter;
use crate::vm::value::Value;
use crate::vm::VmResult;
use std::cmp::Ordering;

/// -1, 0 or 1; `unordered` when either operand is NaN
fn compare<T: PartialOrd>(a: T, b: T, unordered: i32) -> i32 {
    match a.partial_cmp(&b) {
        Some(Ordering::Less) => -1,
        Some(Ordering::Equal) => 0,
        Some(Ordering::Greater) => 1,
        None => unordered,
    }
}

impl<'a> Interpreter<'a> {
    pub(in crate::vm::interpreter) fn exec_comparison_ops(&mut self, opcode: Opcode) -> VmResult<ControlFlow> {
        let frame = self.ctx.top_mut()?;
        let result = match opcode {
            Opcode::Lcmp => {
                let b = frame.pop_long()?;
                let a = frame.pop_long()?;
                compare(a, b, 0)
            }
            Opcode::Fcmpl | Opcode::Fcmpg => {
                let b = frame.pop_float()?;
                let a = frame.pop_float()?;
                compare(a, b, if opcode == Opcode::Fcmpg { 1 } else { -1 })
            }
            Opcode::Dcmpl | Opcode::Dcmpg => {
                let b = frame.pop_double()?;
                let a = frame.pop_double()?;
                compare(a, b, if opcode == Opcode::Dcmpg { 1 } else { -1 })
            }
            _ => return Err(Self::misrouted("comparison", opcode)),
        };
        frame.push(Value::Int(result));
        Ok(ControlFlow::Continue)
    }
}
