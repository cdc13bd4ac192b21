use crate::bytecode::opcode::array_type;
use crate::bytecode::Opcode;
use crate::vm::classes::ArrayElement;
use crate::vm::exceptions::ExceptionKind;
use crate::vm::heap::ElementType;
use crate::vm::interpreter::core::link_failure;
use crate::vm::interpreter::execution::ControlFlow;
use crate::vm::interpreter::Interpreter;
use crate::vm::value::{ObjectRef, Value};
use crate::vm::{VmError, VmResult};

fn element_for(code: u8) -> Option<ElementType> {
    Some(match code {
        array_type::BOOLEAN => ElementType::Boolean,
        array_type::CHAR => ElementType::Char,
        array_type::FLOAT => ElementType::Float,
        array_type::DOUBLE => ElementType::Double,
        array_type::BYTE => ElementType::Byte,
        array_type::SHORT => ElementType::Short,
        array_type::INT => ElementType::Int,
        array_type::LONG => ElementType::Long,
        _ => return None,
    })
}

fn out_of_bounds(index: i32) -> ControlFlow {
    ControlFlow::throw(ExceptionKind::ArrayIndexOutOfBounds, index.to_string())
}

fn negative_size(count: i32) -> ControlFlow {
    ControlFlow::throw(ExceptionKind::NegativeArraySize, count.to_string())
}

fn out_of_memory(count: i32) -> ControlFlow {
    ControlFlow::throw(ExceptionKind::OutOfMemory, format!("array of {} elements", count))
}

fn not_an_array(object: ObjectRef) -> VmError {
    VmError::TypeError {
        expected: "array",
        found: object.to_string(),
    }
}

impl<'a> Interpreter<'a> {
    pub(in crate::vm::interpreter) fn exec_array_ops(&mut self, opcode: Opcode) -> VmResult<ControlFlow> {
        match opcode {
            Opcode::Iaload
            | Opcode::Laload
            | Opcode::Faload
            | Opcode::Daload
            | Opcode::Aaload
            | Opcode::Baload
            | Opcode::Caload
            | Opcode::Saload => self.array_load(),

            Opcode::Iastore
            | Opcode::Lastore
            | Opcode::Fastore
            | Opcode::Dastore
            | Opcode::Aastore
            | Opcode::Bastore
            | Opcode::Castore
            | Opcode::Sastore => self.array_store(opcode),

            Opcode::Arraylength => {
                let frame = self.ctx.top_mut()?;
                let Some(array) = frame.pop_ref()? else {
                    return Ok(ControlFlow::null_pointer());
                };
                let len = self.rt.heap.array(array)?.ok_or_else(|| not_an_array(array))?.len();
                frame.push(Value::Int(len as i32));
                Ok(ControlFlow::Continue)
            }

            // =========================================================
            // Allocation
            // =========================================================
            Opcode::Newarray => {
                let frame = self.ctx.top_mut()?;
                let code = frame.read_u8()?;
                let element = element_for(code)
                    .ok_or_else(|| VmError::Internal(format!("bad newarray type {}", code)))?;
                let count = frame.pop_int()?;
                if count < 0 {
                    return Ok(negative_size(count));
                }
                let class = match self.rt.classes.primitive_array(element) {
                    Ok(class) => class,
                    Err(e) => return Ok(link_failure(e)),
                };
                let Some(array) = self.rt.new_array(class, count as usize)? else {
                    return Ok(out_of_memory(count));
                };
                self.ctx.top_mut()?.push(Value::Ref(array));
                Ok(ControlFlow::Continue)
            }
            Opcode::Anewarray => {
                let index = self.ctx.top_mut()?.read_u16()?;
                let element = match self.resolve_class(index)? {
                    Ok(class) => class,
                    Err(e) => return Ok(link_failure(e)),
                };
                let count = self.ctx.top_mut()?.pop_int()?;
                if count < 0 {
                    return Ok(negative_size(count));
                }
                let class = match self.rt.classes.array_of(element) {
                    Ok(class) => class,
                    Err(e) => return Ok(link_failure(e)),
                };
                let Some(array) = self.rt.new_array(class, count as usize)? else {
                    return Ok(out_of_memory(count));
                };
                self.ctx.top_mut()?.push(Value::Ref(array));
                Ok(ControlFlow::Continue)
            }
            Opcode::Multianewarray => {
                let frame = self.ctx.top_mut()?;
                let index = frame.read_u16()?;
                let dimensions = usize::from(frame.read_u8()?);
                let class = match self.resolve_class(index)? {
                    Ok(class) => class,
                    Err(e) => return Ok(link_failure(e)),
                };
                let slots = self.ctx.top_mut()?.pop_slots(dimensions)?;
                let mut counts = Vec::with_capacity(dimensions);
                for slot in slots {
                    let count = slot.as_int()?;
                    if count < 0 {
                        return Ok(negative_size(count));
                    }
                    counts.push(count as usize);
                }
                let Some(array) = self.rt.new_multi_array(class, &counts)? else {
                    return Ok(ControlFlow::throw(ExceptionKind::OutOfMemory, "multianewarray"));
                };
                self.ctx.top_mut()?.push(Value::Ref(array));
                Ok(ControlFlow::Continue)
            }
            _ => Err(Self::misrouted("array", opcode)),
        }
    }

    fn array_load(&mut self) -> VmResult<ControlFlow> {
        let frame = self.ctx.top_mut()?;
        let index = frame.pop_int()?;
        let Some(array) = frame.pop_ref()? else {
            return Ok(ControlFlow::null_pointer());
        };
        let data = self.rt.heap.array(array)?.ok_or_else(|| not_an_array(array))?;
        let value = match usize::try_from(index).ok().and_then(|i| data.load(i)) {
            Some(value) => value,
            None => return Ok(out_of_bounds(index)),
        };
        frame.push_value(value);
        Ok(ControlFlow::Continue)
    }

    fn array_store(&mut self, opcode: Opcode) -> VmResult<ControlFlow> {
        let frame = self.ctx.top_mut()?;
        let value = match opcode {
            Opcode::Lastore | Opcode::Dastore => frame.pop2()?,
            _ => frame.pop()?,
        };
        let index = frame.pop_int()?;
        let Some(array) = frame.pop_ref()? else {
            return Ok(ControlFlow::null_pointer());
        };
        let len = self.rt.heap.array(array)?.ok_or_else(|| not_an_array(array))?.len();
        let Some(slot) = usize::try_from(index).ok().filter(|&i| i < len) else {
            return Ok(out_of_bounds(index));
        };

        if opcode == Opcode::Aastore {
            if let Some(stored) = value.as_object()? {
                let array_class = self.rt.heap.class_of(array)?;
                if let Some(ArrayElement::Class(element)) = self.rt.classes.get(array_class)?.element {
                    let actual = self.rt.heap.class_of(stored)?;
                    if !self.rt.classes.is_assignable(actual, element) {
                        let name = self.rt.classes.get(actual)?.name.replace('/', ".");
                        return Ok(ControlFlow::throw(ExceptionKind::ArrayStore, name));
                    }
                }
            }
        }

        self.rt
            .heap
            .array_mut(array)?
            .ok_or_else(|| not_an_array(array))?
            .store(slot, value)?;
        Ok(ControlFlow::Continue)
    }
}
