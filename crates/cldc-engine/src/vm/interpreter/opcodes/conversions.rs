use crate::bytecode::Opcode;
use crate::vm::interpreter::execution::ControlFlow;
use crate::vm::interpreter::Interpreter;
use crate::vm::value::Value;
use crate::vm::VmResult;

impl<'a> Interpreter<'a> {
    /// Primitive widening and narrowing.
    ///
    /// Float-to-integer casts saturate and map NaN to zero, which is what
    /// Rust's `as` does.
    pub(in crate::vm::interpreter) fn exec_conversion_ops(&mut self, opcode: Opcode) -> VmResult<ControlFlow> {
        let frame = self.ctx.top_mut()?;
        let converted = match opcode {
            Opcode::I2l => Value::Long(i64::from(frame.pop_int()?)),
            Opcode::I2f => Value::Float(frame.pop_int()? as f32),
            Opcode::I2d => Value::Double(f64::from(frame.pop_int()?)),
            Opcode::L2i => Value::Int(frame.pop_long()? as i32),
            Opcode::L2f => Value::Float(frame.pop_long()? as f32),
            Opcode::L2d => Value::Double(frame.pop_long()? as f64),
            Opcode::F2i => Value::Int(frame.pop_float()? as i32),
            Opcode::F2l => Value::Long(frame.pop_float()? as i64),
            Opcode::F2d => Value::Double(f64::from(frame.pop_float()?)),
            Opcode::D2i => Value::Int(frame.pop_double()? as i32),
            Opcode::D2l => Value::Long(frame.pop_double()? as i64),
            Opcode::D2f => Value::Float(frame.pop_double()? as f32),
            Opcode::I2b => Value::Int(i32::from(frame.pop_int()? as i8)),
            Opcode::I2c => Value::Int(i32::from(frame.pop_int()? as u16)),
            Opcode::I2s => Value::Int(i32::from(frame.pop_int()? as i16)),
            _ => return Err(Self::misrouted("conversion", opcode)),
        };
        frame.push_value(converted);
        Ok(ControlFlow::Continue)
    }
}
