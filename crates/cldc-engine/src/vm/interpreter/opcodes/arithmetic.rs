use crate::bytecode::Opcode;
use crate::vm::exceptions::ExceptionKind;
use crate::vm::frame::Frame;
use crate::vm::interpreter::execution::ControlFlow;
use crate::vm::interpreter::Interpreter;
use crate::vm::value::Value;
use crate::vm::VmResult;

fn int_op(frame: &mut Frame, f: impl FnOnce(i32, i32) -> i32) -> VmResult<()> {
    let b = frame.pop_int()?;
    let a = frame.pop_int()?;
    frame.push(Value::Int(f(a, b)));
    Ok(())
}

fn long_op(frame: &mut Frame, f: impl FnOnce(i64, i64) -> i64) -> VmResult<()> {
    let b = frame.pop_long()?;
    let a = frame.pop_long()?;
    frame.push2(Value::Long(f(a, b)));
    Ok(())
}

/// Long shift: the distance is an int
fn long_shift(frame: &mut Frame, f: impl FnOnce(i64, u32) -> i64) -> VmResult<()> {
    let distance = frame.pop_int()?;
    let a = frame.pop_long()?;
    frame.push2(Value::Long(f(a, (distance & 0x3f) as u32)));
    Ok(())
}

fn float_op(frame: &mut Frame, f: impl FnOnce(f32, f32) -> f32) -> VmResult<()> {
    let b = frame.pop_float()?;
    let a = frame.pop_float()?;
    frame.push(Value::Float(f(a, b)));
    Ok(())
}

fn double_op(frame: &mut Frame, f: impl FnOnce(f64, f64) -> f64) -> VmResult<()> {
    let b = frame.pop_double()?;
    let a = frame.pop_double()?;
    frame.push2(Value::Double(f(a, b)));
    Ok(())
}

fn divide_by_zero() -> ControlFlow {
    ControlFlow::throw(ExceptionKind::Arithmetic, "/ by zero")
}

impl<'a> Interpreter<'a> {
    pub(in crate::vm::interpreter) fn exec_arithmetic_ops(&mut self, opcode: Opcode) -> VmResult<ControlFlow> {
        let frame = self.ctx.top_mut()?;
        match opcode {
            // =========================================================
            // Integer Arithmetic
            // =========================================================
            Opcode::Iadd => int_op(frame, i32::wrapping_add)?,
            Opcode::Isub => int_op(frame, i32::wrapping_sub)?,
            Opcode::Imul => int_op(frame, i32::wrapping_mul)?,
            Opcode::Idiv | Opcode::Irem => {
                if frame.peek(0)?.as_int()? == 0 {
                    return Ok(divide_by_zero());
                }
                // MIN / -1 wraps to MIN, MIN % -1 is 0
                if opcode == Opcode::Idiv {
                    int_op(frame, i32::wrapping_div)?
                } else {
                    int_op(frame, i32::wrapping_rem)?
                }
            }
            Opcode::Ineg => {
                let a = frame.pop_int()?;
                frame.push(Value::Int(a.wrapping_neg()));
            }
            Opcode::Ishl => int_op(frame, |a, b| a.wrapping_shl(b as u32))?,
            Opcode::Ishr => int_op(frame, |a, b| a.wrapping_shr(b as u32))?,
            Opcode::Iushr => int_op(frame, |a, b| ((a as u32).wrapping_shr(b as u32)) as i32)?,
            Opcode::Iand => int_op(frame, |a, b| a & b)?,
            Opcode::Ior => int_op(frame, |a, b| a | b)?,
            Opcode::Ixor => int_op(frame, |a, b| a ^ b)?,

            // =========================================================
            // Long Arithmetic
            // =========================================================
            Opcode::Ladd => long_op(frame, i64::wrapping_add)?,
            Opcode::Lsub => long_op(frame, i64::wrapping_sub)?,
            Opcode::Lmul => long_op(frame, i64::wrapping_mul)?,
            Opcode::Ldiv | Opcode::Lrem => {
                if frame.peek(1)?.as_long()? == 0 {
                    return Ok(divide_by_zero());
                }
                if opcode == Opcode::Ldiv {
                    long_op(frame, i64::wrapping_div)?
                } else {
                    long_op(frame, i64::wrapping_rem)?
                }
            }
            Opcode::Lneg => {
                let a = frame.pop_long()?;
                frame.push2(Value::Long(a.wrapping_neg()));
            }
            Opcode::Lshl => long_shift(frame, i64::wrapping_shl)?,
            Opcode::Lshr => long_shift(frame, i64::wrapping_shr)?,
            Opcode::Lushr => long_shift(frame, |a, n| ((a as u64) >> n) as i64)?,
            Opcode::Land => long_op(frame, |a, b| a & b)?,
            Opcode::Lor => long_op(frame, |a, b| a | b)?,
            Opcode::Lxor => long_op(frame, |a, b| a ^ b)?,

            // =========================================================
            // Floating Point
            // =========================================================
            Opcode::Fadd => float_op(frame, |a, b| a + b)?,
            Opcode::Fsub => float_op(frame, |a, b| a - b)?,
            Opcode::Fmul => float_op(frame, |a, b| a * b)?,
            Opcode::Fdiv => float_op(frame, |a, b| a / b)?,
            Opcode::Frem => float_op(frame, |a, b| a % b)?,
            Opcode::Fneg => {
                let a = frame.pop_float()?;
                frame.push(Value::Float(-a));
            }
            Opcode::Dadd => double_op(frame, |a, b| a + b)?,
            Opcode::Dsub => double_op(frame, |a, b| a - b)?,
            Opcode::Dmul => double_op(frame, |a, b| a * b)?,
            Opcode::Ddiv => double_op(frame, |a, b| a / b)?,
            Opcode::Drem => double_op(frame, |a, b| a % b)?,
            Opcode::Dneg => {
                let a = frame.pop_double()?;
                frame.push2(Value::Double(-a));
            }
            _ => return Err(Self::misrouted("arithmetic", opcode)),
        }
        Ok(ControlFlow::Continue)
    }
}
