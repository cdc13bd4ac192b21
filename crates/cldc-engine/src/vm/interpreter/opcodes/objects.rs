use crate::bytecode::Opcode;
use crate::vm::exceptions::ExceptionKind;
use crate::vm::interpreter::core::link_failure;
use crate::vm::interpreter::execution::ControlFlow;
use crate::vm::interpreter::Interpreter;
use crate::vm::value::Value;
use crate::vm::VmResult;

impl<'a> Interpreter<'a> {
    pub(in crate::vm::interpreter) fn exec_object_ops(&mut self, opcode: Opcode) -> VmResult<ControlFlow> {
        let index = self.ctx.top_mut()?.read_u16()?;
        let class = match self.resolve_class(index)? {
            Ok(class) => class,
            Err(e) => return Ok(link_failure(e)),
        };
        match opcode {
            Opcode::New => {
                let c = self.rt.classes.get(class)?;
                if c.is_interface() || c.flags.is_abstract() || c.is_array() {
                    let message = format!("cannot instantiate {}", c.name.replace('/', "."));
                    return Ok(ControlFlow::throw(ExceptionKind::IncompatibleClassChange, message));
                }
                if let Some(flow) = self.require_initialized(class)? {
                    return Ok(flow);
                }
                let object = self.rt.instantiate(class)?;
                self.ctx.top_mut()?.push(Value::Ref(object));
            }
            Opcode::Checkcast => {
                let frame = self.ctx.top_mut()?;
                if let Some(object) = frame.peek(0)?.as_object()? {
                    let actual = self.rt.heap.class_of(object)?;
                    if !self.rt.classes.is_assignable(actual, class) {
                        let message = format!(
                            "{} cannot be cast to {}",
                            self.rt.classes.get(actual)?.name.replace('/', "."),
                            self.rt.classes.get(class)?.name.replace('/', ".")
                        );
                        return Ok(ControlFlow::throw(ExceptionKind::ClassCast, message));
                    }
                }
            }
            Opcode::Instanceof => {
                let frame = self.ctx.top_mut()?;
                let result = match frame.pop_ref()? {
                    Some(object) => {
                        let actual = self.rt.heap.class_of(object)?;
                        self.rt.classes.is_assignable(actual, class)
                    }
                    None => false,
                };
                frame.push(Value::from_bool(result));
            }
            _ => return Err(Self::misrouted("object", opcode)),
        }
        Ok(ControlFlow::Continue)
    }
}
