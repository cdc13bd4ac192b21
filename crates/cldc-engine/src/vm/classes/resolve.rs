//! Symbolic reference resolution
//!
//! Turns constant pool entries into linked classes, field slots and methods,
//! loading classes as a side effect. Results are cached by the interpreter,
//! not here.

use super::{ClassId, ClassRegistry, LinkError, Method};
use crate::bytecode::{Constant, ConstantPool, Kind, MemberRef};
use std::sync::Arc;

/// Instance field resolved to a layout slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedField {
    /// Slot in the object's field vector
    pub slot: usize,
    /// Field kind
    pub kind: Kind,
}

/// Static field resolved to its declaring class
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedStatic {
    /// Declaring class, which must be initialized before access
    pub class: ClassId,
    /// Slot in the class's static storage
    pub slot: usize,
    /// Field kind
    pub kind: Kind,
}

fn bad_entry(index: u16, expected: &str) -> LinkError {
    LinkError::IncompatibleClassChange(format!("constant #{} is not a {}", index, expected))
}

impl ClassRegistry {
    /// Resolve a `Class` entry
    pub fn resolve_class(&mut self, pool: &ConstantPool, index: u16) -> Result<ClassId, LinkError> {
        match pool.get(index) {
            Some(Constant::Class(name)) => self.load(name),
            _ => Err(bad_entry(index, "class")),
        }
    }

    fn field_ref(pool: &ConstantPool, index: u16) -> Result<&MemberRef, LinkError> {
        match pool.get(index) {
            Some(Constant::Field(member)) => Ok(member),
            _ => Err(bad_entry(index, "field reference")),
        }
    }

    /// Resolve a `Field` entry used by `getfield` / `putfield`
    pub fn resolve_field(&mut self, pool: &ConstantPool, index: u16) -> Result<ResolvedField, LinkError> {
        let member = Self::field_ref(pool, index)?;
        let class = self.load(&member.class)?;
        match self.find_instance_field(class, &member.name, &member.descriptor) {
            Some((slot, kind)) => Ok(ResolvedField { slot, kind }),
            None if self.find_static_field(class, &member.name, &member.descriptor).is_some() => {
                Err(LinkError::IncompatibleClassChange(format!(
                    "expected non-static field {}.{}",
                    member.class, member.name
                )))
            }
            None => Err(LinkError::NoSuchField(format!("{}.{}", member.class, member.name))),
        }
    }

    /// Resolve a `Field` entry used by `getstatic` / `putstatic`
    pub fn resolve_static_field(
        &mut self,
        pool: &ConstantPool,
        index: u16,
    ) -> Result<ResolvedStatic, LinkError> {
        let member = Self::field_ref(pool, index)?;
        let class = self.load(&member.class)?;
        match self.find_static_field(class, &member.name, &member.descriptor) {
            Some((class, slot, kind)) => Ok(ResolvedStatic { class, slot, kind }),
            None if self.find_instance_field(class, &member.name, &member.descriptor).is_some() => {
                Err(LinkError::IncompatibleClassChange(format!(
                    "expected static field {}.{}",
                    member.class, member.name
                )))
            }
            None => Err(LinkError::NoSuchField(format!("{}.{}", member.class, member.name))),
        }
    }

    /// Resolve a `Method` or `InterfaceMethod` entry
    pub fn resolve_method(&mut self, pool: &ConstantPool, index: u16) -> Result<Arc<Method>, LinkError> {
        let (member, interface) = match pool.get(index) {
            Some(Constant::Method(member)) => (member, false),
            Some(Constant::InterfaceMethod(member)) => (member, true),
            _ => return Err(bad_entry(index, "method reference")),
        };
        let class = self.load(&member.class)?;
        if self.class(class).is_interface() != interface {
            return Err(LinkError::IncompatibleClassChange(format!(
                "{} used as {}",
                member.class,
                if interface { "an interface" } else { "a class" }
            )));
        }
        self.find_method(class, &member.name, &member.descriptor)
            .ok_or_else(|| LinkError::NoSuchMethod(member.to_string()))
    }
}
