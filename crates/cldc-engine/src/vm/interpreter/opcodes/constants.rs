use crate::bytecode::{Constant, Opcode};
use crate::vm::interpreter::core::link_failure;
use crate::vm::interpreter::execution::ControlFlow;
use crate::vm::interpreter::Interpreter;
use crate::vm::value::Value;
use crate::vm::{VmError, VmResult};

impl<'a> Interpreter<'a> {
    pub(in crate::vm::interpreter) fn exec_constant_ops(&mut self, opcode: Opcode) -> VmResult<ControlFlow> {
        let frame = self.ctx.top_mut()?;
        match opcode {
            Opcode::AconstNull => frame.push(Value::Null),
            Opcode::IconstM1 => frame.push(Value::Int(-1)),
            Opcode::Iconst0 => frame.push(Value::Int(0)),
            Opcode::Iconst1 => frame.push(Value::Int(1)),
            Opcode::Iconst2 => frame.push(Value::Int(2)),
            Opcode::Iconst3 => frame.push(Value::Int(3)),
            Opcode::Iconst4 => frame.push(Value::Int(4)),
            Opcode::Iconst5 => frame.push(Value::Int(5)),
            Opcode::Lconst0 => frame.push2(Value::Long(0)),
            Opcode::Lconst1 => frame.push2(Value::Long(1)),
            Opcode::Fconst0 => frame.push(Value::Float(0.0)),
            Opcode::Fconst1 => frame.push(Value::Float(1.0)),
            Opcode::Fconst2 => frame.push(Value::Float(2.0)),
            Opcode::Dconst0 => frame.push2(Value::Double(0.0)),
            Opcode::Dconst1 => frame.push2(Value::Double(1.0)),
            Opcode::Bipush => {
                let value = frame.read_i8()?;
                frame.push(Value::Int(i32::from(value)));
            }
            Opcode::Sipush => {
                let value = frame.read_i16()?;
                frame.push(Value::Int(i32::from(value)));
            }
            Opcode::Ldc => {
                let index = u16::from(frame.read_u8()?);
                return self.load_constant(index);
            }
            Opcode::LdcW | Opcode::Ldc2W => {
                let index = frame.read_u16()?;
                return self.load_constant(index);
            }
            _ => return Err(Self::misrouted("constant", opcode)),
        }
        Ok(ControlFlow::Continue)
    }

    /// Push pool entry `index`: numeric literals as-is, strings interned,
    /// class entries as their `java/lang/Class` object
    fn load_constant(&mut self, index: u16) -> VmResult<ControlFlow> {
        let method = self.current_method()?;
        let value = match method.pool.get(index) {
            Some(Constant::Integer(v)) => Value::Int(*v),
            Some(Constant::Float(v)) => Value::Float(*v),
            Some(Constant::Long(v)) => Value::Long(*v),
            Some(Constant::Double(v)) => Value::Double(*v),
            Some(Constant::String(text)) => Value::Ref(self.rt.intern_string(text)),
            Some(Constant::Class(_)) => match self.resolve_class_in(&method, index) {
                Ok(class) => Value::Ref(self.rt.class_mirror(class)?),
                Err(e) => return Ok(link_failure(e)),
            },
            other => {
                return Err(VmError::Internal(format!(
                    "ldc of unloadable constant #{}: {:?}",
                    index, other
                )))
            }
        };
        self.ctx.top_mut()?.push_value(value);
        Ok(ControlFlow::Continue)
    }
}
