use crate::bytecode::Opcode;
use crate::vm::frame::Frame;
use crate::vm::interpreter::execution::ControlFlow;
use crate::vm::interpreter::Interpreter;
use crate::vm::value::Value;
use crate::vm::{VmError, VmResult};

/// Push local `index` with the width of its kind
fn load(frame: &mut Frame, index: usize, wide: bool) -> VmResult<()> {
    let value = frame.load(index)?;
    if wide {
        frame.push2(value);
    } else {
        frame.push(value);
    }
    Ok(())
}

/// Pop into local `index`
fn store(frame: &mut Frame, index: usize, wide: bool) -> VmResult<()> {
    let value = if wide { frame.pop2()? } else { frame.pop()? };
    frame.store(index, value)
}

/// Jump to the return address held in local `index`
pub(super) fn ret(frame: &mut Frame, index: usize) -> VmResult<()> {
    match frame.load(index)? {
        Value::ReturnAddress(target) => {
            frame.pc = target;
            Ok(())
        }
        other => Err(VmError::TypeError {
            expected: "return address",
            found: format!("{:?}", other),
        }),
    }
}

/// Local access with an explicit index operand
fn indexed(frame: &mut Frame, opcode: Opcode, index: usize) -> VmResult<()> {
    match opcode {
        Opcode::Iload | Opcode::Fload | Opcode::Aload => load(frame, index, false),
        Opcode::Lload | Opcode::Dload => load(frame, index, true),
        Opcode::Istore | Opcode::Fstore | Opcode::Astore => store(frame, index, false),
        Opcode::Lstore | Opcode::Dstore => store(frame, index, true),
        Opcode::Ret => ret(frame, index),
        _ => Err(VmError::Internal(format!(
            "{} cannot take a local index",
            opcode.name()
        ))),
    }
}

impl<'a> Interpreter<'a> {
    pub(in crate::vm::interpreter) fn exec_variable_ops(&mut self, opcode: Opcode) -> VmResult<ControlFlow> {
        let frame = self.ctx.top_mut()?;
        match opcode {
            Opcode::Iload
            | Opcode::Lload
            | Opcode::Fload
            | Opcode::Dload
            | Opcode::Aload
            | Opcode::Istore
            | Opcode::Lstore
            | Opcode::Fstore
            | Opcode::Dstore
            | Opcode::Astore => {
                let index = usize::from(frame.read_u8()?);
                indexed(frame, opcode, index)?;
            }

            // =========================================================
            // Short forms
            // =========================================================
            Opcode::Iload0 | Opcode::Fload0 | Opcode::Aload0 => load(frame, 0, false)?,
            Opcode::Iload1 | Opcode::Fload1 | Opcode::Aload1 => load(frame, 1, false)?,
            Opcode::Iload2 | Opcode::Fload2 | Opcode::Aload2 => load(frame, 2, false)?,
            Opcode::Iload3 | Opcode::Fload3 | Opcode::Aload3 => load(frame, 3, false)?,
            Opcode::Lload0 | Opcode::Dload0 => load(frame, 0, true)?,
            Opcode::Lload1 | Opcode::Dload1 => load(frame, 1, true)?,
            Opcode::Lload2 | Opcode::Dload2 => load(frame, 2, true)?,
            Opcode::Lload3 | Opcode::Dload3 => load(frame, 3, true)?,
            Opcode::Istore0 | Opcode::Fstore0 | Opcode::Astore0 => store(frame, 0, false)?,
            Opcode::Istore1 | Opcode::Fstore1 | Opcode::Astore1 => store(frame, 1, false)?,
            Opcode::Istore2 | Opcode::Fstore2 | Opcode::Astore2 => store(frame, 2, false)?,
            Opcode::Istore3 | Opcode::Fstore3 | Opcode::Astore3 => store(frame, 3, false)?,
            Opcode::Lstore0 | Opcode::Dstore0 => store(frame, 0, true)?,
            Opcode::Lstore1 | Opcode::Dstore1 => store(frame, 1, true)?,
            Opcode::Lstore2 | Opcode::Dstore2 => store(frame, 2, true)?,
            Opcode::Lstore3 | Opcode::Dstore3 => store(frame, 3, true)?,

            Opcode::Iinc => {
                let index = usize::from(frame.read_u8()?);
                let delta = i32::from(frame.read_i8()?);
                let value = frame.load(index)?.as_int()?;
                frame.store(index, Value::Int(value.wrapping_add(delta)))?;
            }

            Opcode::Wide => {
                let byte = frame.read_u8()?;
                let modified = Opcode::from_u8(byte).ok_or_else(|| VmError::InvalidOpcode {
                    opcode: byte,
                    pc: frame.op_pc,
                    method: frame.method.qualified_name(),
                })?;
                let index = usize::from(frame.read_u16()?);
                if modified == Opcode::Iinc {
                    let delta = i32::from(frame.read_i16()?);
                    let value = frame.load(index)?.as_int()?;
                    frame.store(index, Value::Int(value.wrapping_add(delta)))?;
                } else {
                    indexed(frame, modified, index)?;
                }
            }
            _ => return Err(Self::misrouted("variable", opcode)),
        }
        Ok(ControlFlow::Continue)
    }
}
