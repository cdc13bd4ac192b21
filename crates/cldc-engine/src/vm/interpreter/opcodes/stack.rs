use crate::bytecode::Opcode;
use crate::vm::frame::Frame;
use crate::vm::interpreter::execution::ControlFlow;
use crate::vm::interpreter::Interpreter;
use crate::vm::{VmError, VmResult};

/// Copy the top `count` slots and insert the copy `depth` slots below the
/// top. `dup` is `(1, 1)`, `dup_x1` is `(1, 2)`, `dup2_x2` is `(2, 4)`.
fn insert_copy(frame: &mut Frame, count: usize, depth: usize) -> VmResult<()> {
    let len = frame.stack.len();
    let at = len.checked_sub(depth).ok_or(VmError::StackUnderflow)?;
    let copy: Vec<_> = frame.stack[len - count..].to_vec();
    frame.stack.splice(at..at, copy);
    Ok(())
}

impl<'a> Interpreter<'a> {
    pub(in crate::vm::interpreter) fn exec_stack_ops(&mut self, opcode: Opcode) -> VmResult<ControlFlow> {
        let frame = self.ctx.top_mut()?;
        match opcode {
            Opcode::Nop => {}
            Opcode::Pop => {
                frame.pop()?;
            }
            Opcode::Pop2 => {
                frame.pop_slots(2)?;
            }
            Opcode::Dup => insert_copy(frame, 1, 1)?,
            Opcode::DupX1 => insert_copy(frame, 1, 2)?,
            Opcode::DupX2 => insert_copy(frame, 1, 3)?,
            Opcode::Dup2 => insert_copy(frame, 2, 2)?,
            Opcode::Dup2X1 => insert_copy(frame, 2, 3)?,
            Opcode::Dup2X2 => insert_copy(frame, 2, 4)?,
            Opcode::Swap => {
                let len = frame.stack.len();
                if len < 2 {
                    return Err(VmError::StackUnderflow);
                }
                frame.stack.swap(len - 1, len - 2);
            }
            _ => return Err(Self::misrouted("stack", opcode)),
        }
        Ok(ControlFlow::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::{AccessFlags, MethodDef};
    use crate::vm::classes::Method;
    use crate::vm::value::Value;
    use std::sync::Arc;

    fn frame_with(values: &[i32]) -> Frame {
        let def = MethodDef {
            name: "m".into(),
            descriptor: "()V".into(),
            flags: AccessFlags(AccessFlags::STATIC),
            max_locals: 0,
            max_stack: 8,
            code: vec![0xb1],
            exception_table: vec![],
        };
        let mut frame = Frame::new(Arc::new(Method::for_test(def)), vec![]);
        for &v in values {
            frame.push(Value::Int(v));
        }
        frame
    }

    fn ints(frame: &Frame) -> Vec<i32> {
        frame.stack.iter().map(|v| v.as_int().unwrap()).collect()
    }

    #[test]
    fn test_dup_family_slot_layout() {
        let mut frame = frame_with(&[3, 2, 1]);
        insert_copy(&mut frame, 1, 2).unwrap();
        assert_eq!(ints(&frame), vec![3, 1, 2, 1]);

        let mut frame = frame_with(&[3, 2, 1]);
        insert_copy(&mut frame, 1, 3).unwrap();
        assert_eq!(ints(&frame), vec![1, 3, 2, 1]);

        let mut frame = frame_with(&[2, 1]);
        insert_copy(&mut frame, 2, 2).unwrap();
        assert_eq!(ints(&frame), vec![2, 1, 2, 1]);

        let mut frame = frame_with(&[3, 2, 1]);
        insert_copy(&mut frame, 2, 3).unwrap();
        assert_eq!(ints(&frame), vec![2, 1, 3, 2, 1]);

        let mut frame = frame_with(&[4, 3, 2, 1]);
        insert_copy(&mut frame, 2, 4).unwrap();
        assert_eq!(ints(&frame), vec![2, 1, 4, 3, 2, 1]);
    }

    #[test]
    fn test_dup_underflow() {
        let mut frame = frame_with(&[1]);
        assert!(insert_copy(&mut frame, 1, 2).is_err());
        assert_eq!(ints(&frame), vec![1]);
    }
}
