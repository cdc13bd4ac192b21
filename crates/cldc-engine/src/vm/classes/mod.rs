//! Runtime classes and the class registry
//!
//! Class files are defined up front and linked lazily the first time they
//! are referenced: superclass and interfaces first, then field layout and
//! the virtual table. Array classes are synthesized on demand from their
//! descriptor.

mod bootstrap;
mod init;
mod resolve;

pub use init::InitOutcome;
pub use resolve::{ResolvedField, ResolvedStatic};

use crate::bytecode::descriptor::{self, class_name_of};
use crate::bytecode::{AccessFlags, ClassFile, ConstantPool, ExceptionEntry, Kind, MethodDef, Opcode};
use crate::vm::context::ContextId;
use crate::vm::exceptions::ExceptionKind;
use crate::vm::heap::ElementType;
use crate::vm::value::{ObjectRef, Value};
use crate::vm::{VmError, VmResult};
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::Arc;
use thiserror::Error;

/// Index of a linked class in the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(pub(crate) u32);

impl ClassId {
    /// Registry index
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Class loading and linking failures, raised as Java errors in the
/// context that triggered them
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LinkError {
    /// No definition for the class
    #[error("{0}")]
    NoClassDef(String),

    /// Class is its own ancestor
    #[error("class circularity: {0}")]
    Circularity(String),

    /// Field reference resolves to nothing
    #[error("{0}")]
    NoSuchField(String),

    /// Method reference resolves to nothing
    #[error("{0}")]
    NoSuchMethod(String),

    /// Structural mismatch, e.g. extending an interface or a pool entry of
    /// the wrong kind
    #[error("{0}")]
    IncompatibleClassChange(String),

    /// Class definition rejected
    #[error("bad class {class}: {reason}")]
    Malformed {
        /// Class name
        class: String,
        /// Problem found
        reason: String,
    },
}

impl LinkError {
    /// Java error class for this failure
    pub fn exception_kind(&self) -> ExceptionKind {
        match self {
            LinkError::NoClassDef(_) | LinkError::Circularity(_) | LinkError::Malformed { .. } => {
                ExceptionKind::NoClassDefFound
            }
            LinkError::NoSuchField(_) => ExceptionKind::NoSuchField,
            LinkError::NoSuchMethod(_) => ExceptionKind::NoSuchMethod,
            LinkError::IncompatibleClassChange(_) => ExceptionKind::IncompatibleClassChange,
        }
    }
}

/// Class initialization progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitState {
    /// Linked; `<clinit>` not yet run
    Linked,
    /// `<clinit>` running in the given context
    InProgress(ContextId),
    /// Ready for use
    Initialized,
    /// `<clinit>` threw; every later use fails
    Erroneous,
}

/// Element of an array class
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrayElement {
    /// Primitive elements
    Primitive(ElementType),
    /// Reference elements of the given class
    Class(ClassId),
}

/// One field in a layout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSlot {
    /// Field name
    pub name: String,
    /// Field descriptor
    pub descriptor: String,
    /// Computational kind
    pub kind: Kind,
    /// Declaring class
    pub owner: ClassId,
}

/// Linked method
#[derive(Debug)]
pub struct Method {
    /// Declaring class
    pub class: ClassId,
    /// Declaring class name
    pub class_name: Arc<str>,
    /// Method name
    pub name: String,
    /// Method descriptor
    pub descriptor: String,
    /// Access flags
    pub flags: AccessFlags,
    /// Local slots, arguments included
    pub max_locals: u16,
    /// Operand stack hint
    pub max_stack: u16,
    /// Argument slots, receiver excluded
    pub arg_slots: usize,
    /// Return kind
    pub return_kind: Kind,
    /// Exception table
    pub exception_table: Vec<ExceptionEntry>,
    /// Slot in the declaring class's virtual table
    pub vtable_index: Option<usize>,
    /// Constant pool of the declaring class
    pub pool: Arc<ConstantPool>,
    code: Arc<[u8]>,
}

impl Method {
    fn from_def(
        class: ClassId,
        class_name: Arc<str>,
        pool: Arc<ConstantPool>,
        def: &MethodDef,
    ) -> Result<Self, LinkError> {
        let signature = descriptor::parse_method(&def.descriptor).map_err(|e| LinkError::Malformed {
            class: class_name.to_string(),
            reason: e.to_string(),
        })?;
        let receiver = usize::from(!def.flags.is_static());
        let arg_slots = signature.arg_slots();
        let (code, max_locals, max_stack): (Arc<[u8]>, u16, u16) = if def.flags.is_native() {
            // native frames run `invokenative; <xreturn>`
            let code = vec![Opcode::InvokeNative as u8, return_opcode(signature.ret) as u8];
            (code.into(), (arg_slots + receiver) as u16, 2)
        } else {
            (def.code.clone().into(), def.max_locals, def.max_stack)
        };
        Ok(Self {
            class,
            class_name,
            name: def.name.clone(),
            descriptor: def.descriptor.clone(),
            flags: def.flags,
            max_locals,
            max_stack,
            arg_slots,
            return_kind: signature.ret,
            exception_table: def.exception_table.clone(),
            vtable_index: None,
            pool,
            code,
        })
    }

    /// Bytecode shared with every frame of this method
    pub fn code(&self) -> Arc<[u8]> {
        self.code.clone()
    }

    /// `class.name(descriptor)`, also the native table key
    pub fn qualified_name(&self) -> String {
        format!("{}.{}{}", self.class_name, self.name, self.descriptor)
    }

    /// Static method
    pub fn is_static(&self) -> bool {
        self.flags.is_static()
    }

    /// Native method
    pub fn is_native(&self) -> bool {
        self.flags.is_native()
    }

    /// Synchronized method
    pub fn is_synchronized(&self) -> bool {
        self.flags.is_synchronized()
    }

    /// Abstract method
    pub fn is_abstract(&self) -> bool {
        self.flags.is_abstract()
    }

    /// Slots the caller pops: arguments plus the receiver
    pub fn call_slots(&self) -> usize {
        self.arg_slots + usize::from(!self.is_static())
    }

    #[cfg(test)]
    pub(crate) fn for_test(def: MethodDef) -> Self {
        let mut method = Self::from_def(ClassId(0), Arc::from("Test"), Arc::default(), &def)
            .expect("test method descriptor");
        method.max_locals = method.max_locals.max(def.max_locals);
        method
    }
}

fn return_opcode(kind: Kind) -> Opcode {
    match kind {
        Kind::Void => Opcode::Return,
        Kind::Long => Opcode::Lreturn,
        Kind::Float => Opcode::Freturn,
        Kind::Double => Opcode::Dreturn,
        Kind::Reference => Opcode::Areturn,
        _ => Opcode::Ireturn,
    }
}

/// Linked class
#[derive(Debug)]
pub struct RuntimeClass {
    /// Registry index
    pub id: ClassId,
    /// Internal name
    pub name: Arc<str>,
    /// Superclass; `None` for `java/lang/Object`
    pub super_class: Option<ClassId>,
    /// Directly implemented interfaces
    pub interfaces: Vec<ClassId>,
    /// Access flags
    pub flags: AccessFlags,
    /// Constant pool
    pub pool: Arc<ConstantPool>,
    /// Declared methods
    pub methods: Vec<Arc<Method>>,
    /// Virtual dispatch table, inherited slots first
    pub vtable: Vec<Arc<Method>>,
    /// Instance layout, inherited fields first
    pub instance_fields: Vec<FieldSlot>,
    /// Declared static fields
    pub static_fields: Vec<FieldSlot>,
    /// Static field storage
    pub statics: Vec<Value>,
    /// Initialization progress
    pub init_state: InitState,
    /// `java/lang/Class` object, created on first use
    pub mirror: Option<ObjectRef>,
    /// Element type for array classes
    pub element: Option<ArrayElement>,
}

impl RuntimeClass {
    /// Whether this is an interface
    pub fn is_interface(&self) -> bool {
        self.flags.is_interface()
    }

    /// Whether this is an array class
    pub fn is_array(&self) -> bool {
        self.element.is_some()
    }

    /// Declared method by name and descriptor
    pub fn declared_method(&self, name: &str, descriptor: &str) -> Option<&Arc<Method>> {
        self.methods
            .iter()
            .find(|m| m.name == name && m.descriptor == descriptor)
    }

    /// Class initializer, if declared
    pub fn clinit(&self) -> Option<&Arc<Method>> {
        self.declared_method("<clinit>", "()V")
    }
}

/// Classes the engine refers to directly
#[derive(Debug, Clone, Copy)]
pub struct WellKnown {
    /// `java/lang/Object`
    pub object: ClassId,
    /// `java/lang/Class`
    pub class: ClassId,
    /// `java/lang/String`
    pub string: ClassId,
    /// `java/lang/Thread`
    pub thread: ClassId,
    /// `java/lang/Throwable`
    pub throwable: ClassId,
}

/// All defined and linked classes
#[derive(Debug)]
pub struct ClassRegistry {
    classes: Vec<RuntimeClass>,
    by_name: FxHashMap<String, ClassId>,
    pending: FxHashMap<String, ClassFile>,
    linking: FxHashSet<String>,
    well_known: WellKnown,
}

impl ClassRegistry {
    /// Registry holding the core library
    pub fn new() -> VmResult<Self> {
        let mut registry = Self {
            classes: Vec::new(),
            by_name: FxHashMap::default(),
            pending: FxHashMap::default(),
            linking: FxHashSet::default(),
            well_known: WellKnown {
                object: ClassId(0),
                class: ClassId(0),
                string: ClassId(0),
                thread: ClassId(0),
                throwable: ClassId(0),
            },
        };
        for class in bootstrap::core_classes()? {
            registry.define(class.clone())?;
        }
        let mut load = |name: &str| registry.load(name).map_err(|e| VmError::Link(e.to_string()));
        let well_known = WellKnown {
            object: load("java/lang/Object")?,
            class: load("java/lang/Class")?,
            string: load("java/lang/String")?,
            thread: load("java/lang/Thread")?,
            throwable: load("java/lang/Throwable")?,
        };
        registry.well_known = well_known;
        Ok(registry)
    }

    /// Frequently used classes
    pub fn well_known(&self) -> &WellKnown {
        &self.well_known
    }

    /// Make a class file available for loading
    pub fn define(&mut self, class: ClassFile) -> VmResult<()> {
        if self.by_name.contains_key(&class.name) || self.pending.contains_key(&class.name) {
            return Err(VmError::Link(format!("duplicate class definition {}", class.name)));
        }
        self.pending.insert(class.name.clone(), class);
        Ok(())
    }

    /// Whether `name` is defined, linked or not
    pub fn is_defined(&self, name: &str) -> bool {
        self.by_name.contains_key(name) || self.pending.contains_key(name)
    }

    /// Linked class by id
    pub fn get(&self, id: ClassId) -> VmResult<&RuntimeClass> {
        self.classes
            .get(id.index())
            .ok_or_else(|| VmError::Internal(format!("unknown class id {}", id.0)))
    }

    /// Linked class by id, mutably
    pub fn get_mut(&mut self, id: ClassId) -> VmResult<&mut RuntimeClass> {
        self.classes
            .get_mut(id.index())
            .ok_or_else(|| VmError::Internal(format!("unknown class id {}", id.0)))
    }

    /// Already-linked class by name
    pub fn lookup(&self, name: &str) -> Option<ClassId> {
        self.by_name.get(name).copied()
    }

    /// Number of linked classes
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    /// True before anything is linked
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Find or link a class by internal name
    pub fn load(&mut self, name: &str) -> Result<ClassId, LinkError> {
        if let Some(&id) = self.by_name.get(name) {
            return Ok(id);
        }
        if name.starts_with('[') {
            return self.link_array(name);
        }
        if !self.linking.insert(name.to_string()) {
            return Err(LinkError::Circularity(name.replace('/', ".")));
        }
        let result = match self.pending.remove(name) {
            Some(file) => {
                let result = self.link(&file);
                if result.is_err() {
                    self.pending.insert(name.to_string(), file);
                }
                result
            }
            None => Err(LinkError::NoClassDef(name.replace('/', "."))),
        };
        self.linking.remove(name);
        result
    }

    fn next_id(&self) -> ClassId {
        ClassId(self.classes.len() as u32)
    }

    fn link(&mut self, file: &ClassFile) -> Result<ClassId, LinkError> {
        let super_class = match &file.super_name {
            Some(name) => {
                let id = self.load(name)?;
                if self.class(id).is_interface() {
                    return Err(LinkError::IncompatibleClassChange(format!(
                        "class {} has interface {} as super class",
                        file.name, name
                    )));
                }
                Some(id)
            }
            None => None,
        };
        let mut interfaces = Vec::with_capacity(file.interfaces.len());
        for name in &file.interfaces {
            let id = self.load(name)?;
            if !self.class(id).is_interface() {
                return Err(LinkError::IncompatibleClassChange(format!(
                    "class {} implements non-interface {}",
                    file.name, name
                )));
            }
            interfaces.push(id);
        }

        let id = self.next_id();
        let name: Arc<str> = Arc::from(file.name.as_str());
        let pool = Arc::new(file.constant_pool.clone());

        let (mut instance_fields, mut vtable) = match super_class {
            Some(s) => {
                let parent = self.class(s);
                (parent.instance_fields.clone(), parent.vtable.clone())
            }
            None => (Vec::new(), Vec::new()),
        };
        let mut static_fields = Vec::new();
        for field in &file.fields {
            let kind = descriptor::parse_field(&field.descriptor).map_err(|e| LinkError::Malformed {
                class: file.name.clone(),
                reason: e.to_string(),
            })?;
            let slot = FieldSlot {
                name: field.name.clone(),
                descriptor: field.descriptor.clone(),
                kind,
                owner: id,
            };
            if field.flags.is_static() {
                static_fields.push(slot);
            } else {
                instance_fields.push(slot);
            }
        }
        let statics = static_fields.iter().map(|f| Value::default_for(f.kind)).collect();

        let mut methods = Vec::with_capacity(file.methods.len());
        for def in &file.methods {
            let mut method = Method::from_def(id, name.clone(), pool.clone(), def)?;
            let is_virtual =
                !method.is_static() && !def.flags.is_private() && !method.name.starts_with('<');
            if is_virtual && !file.flags.is_interface() {
                let existing = vtable
                    .iter()
                    .position(|m| m.name == method.name && m.descriptor == method.descriptor);
                let index = existing.unwrap_or(vtable.len());
                method.vtable_index = Some(index);
                let method = Arc::new(method);
                if index == vtable.len() {
                    vtable.push(method.clone());
                } else {
                    vtable[index] = method.clone();
                }
                methods.push(method);
            } else {
                methods.push(Arc::new(method));
            }
        }

        self.classes.push(RuntimeClass {
            id,
            name,
            super_class,
            interfaces,
            flags: file.flags,
            pool,
            methods,
            vtable,
            instance_fields,
            static_fields,
            statics,
            init_state: InitState::Linked,
            mirror: None,
            element: None,
        });
        self.by_name.insert(file.name.clone(), id);
        tracing::debug!(class = %file.name, id = id.0, "linked class");
        Ok(id)
    }

    fn link_array(&mut self, name: &str) -> Result<ClassId, LinkError> {
        let component = &name[1..];
        let element = match component.as_bytes().first() {
            Some(b'L') | Some(b'[') => {
                let class_name = class_name_of(component)
                    .ok_or_else(|| LinkError::NoClassDef(name.replace('/', ".")))?;
                ArrayElement::Class(self.load(class_name)?)
            }
            Some(&c) if component.len() == 1 => match ElementType::from_descriptor(c) {
                Some(e) => ArrayElement::Primitive(e),
                None => return Err(LinkError::NoClassDef(name.to_string())),
            },
            _ => return Err(LinkError::NoClassDef(name.to_string())),
        };
        let object = self.load("java/lang/Object")?;
        let vtable = self.class(object).vtable.clone();
        let id = self.next_id();
        self.classes.push(RuntimeClass {
            id,
            name: Arc::from(name),
            super_class: Some(object),
            interfaces: Vec::new(),
            flags: AccessFlags(AccessFlags::PUBLIC | AccessFlags::FINAL),
            pool: Arc::default(),
            methods: Vec::new(),
            vtable,
            instance_fields: Vec::new(),
            static_fields: Vec::new(),
            statics: Vec::new(),
            init_state: InitState::Initialized,
            mirror: None,
            element: Some(element),
        });
        self.by_name.insert(name.to_string(), id);
        Ok(id)
    }

    /// Array class whose elements are instances of `element`
    pub fn array_of(&mut self, element: ClassId) -> Result<ClassId, LinkError> {
        let name = descriptor::array_of(&self.class(element).name);
        self.load(&name)
    }

    /// Array class for a primitive `newarray` type code
    pub fn primitive_array(&mut self, element: ElementType) -> Result<ClassId, LinkError> {
        let name = match element {
            ElementType::Boolean => "[Z",
            ElementType::Byte => "[B",
            ElementType::Char => "[C",
            ElementType::Short => "[S",
            ElementType::Int => "[I",
            ElementType::Long => "[J",
            ElementType::Float => "[F",
            ElementType::Double => "[D",
            ElementType::Reference => "[Ljava/lang/Object;",
        };
        self.load(name)
    }

    // Ids handed out by this registry always index `classes`.
    fn class(&self, id: ClassId) -> &RuntimeClass {
        &self.classes[id.index()]
    }

    // ========================================================================
    // Member lookup
    // ========================================================================

    /// Method by name and descriptor: the class, its superclasses, then
    /// every superinterface
    pub fn find_method(&self, class: ClassId, name: &str, descriptor: &str) -> Option<Arc<Method>> {
        let mut current = Some(class);
        while let Some(id) = current {
            let c = self.class(id);
            if let Some(m) = c.declared_method(name, descriptor) {
                return Some(m.clone());
            }
            current = c.super_class;
        }
        self.find_interface_method(class, name, descriptor)
    }

    fn find_interface_method(&self, class: ClassId, name: &str, descriptor: &str) -> Option<Arc<Method>> {
        let mut current = Some(class);
        while let Some(id) = current {
            let c = self.class(id);
            for &iface in &c.interfaces {
                if let Some(m) = self.class(iface).declared_method(name, descriptor) {
                    return Some(m.clone());
                }
                if let Some(m) = self.find_interface_method(iface, name, descriptor) {
                    return Some(m);
                }
            }
            current = c.super_class;
        }
        None
    }

    /// Instance method selected for a receiver of class `class`
    pub fn find_virtual(&self, class: ClassId, name: &str, descriptor: &str) -> Option<Arc<Method>> {
        let mut current = Some(class);
        while let Some(id) = current {
            let c = self.class(id);
            if let Some(m) = c.declared_method(name, descriptor) {
                if !m.is_static() {
                    return Some(m.clone());
                }
            }
            current = c.super_class;
        }
        self.find_interface_method(class, name, descriptor)
    }

    /// Virtual table entry of `class`
    pub fn vtable_entry(&self, class: ClassId, index: usize) -> Option<Arc<Method>> {
        self.class(class).vtable.get(index).cloned()
    }

    /// Instance field slot by name, most derived declaration first
    pub fn instance_field_slot(&self, class: ClassId, name: &str) -> Option<usize> {
        self.class(class)
            .instance_fields
            .iter()
            .rposition(|f| f.name == name)
    }

    /// Instance field by name and descriptor as seen from `class`
    pub fn find_instance_field(&self, class: ClassId, name: &str, descriptor: &str) -> Option<(usize, Kind)> {
        let fields = &self.class(class).instance_fields;
        fields
            .iter()
            .rposition(|f| f.name == name && f.descriptor == descriptor)
            .map(|slot| (slot, fields[slot].kind))
    }

    /// Static field by name and descriptor: the class, its interfaces, then
    /// its superclass
    pub fn find_static_field(
        &self,
        class: ClassId,
        name: &str,
        descriptor: &str,
    ) -> Option<(ClassId, usize, Kind)> {
        let c = self.class(class);
        if let Some(slot) = c
            .static_fields
            .iter()
            .position(|f| f.name == name && f.descriptor == descriptor)
        {
            return Some((class, slot, c.static_fields[slot].kind));
        }
        for &iface in &c.interfaces {
            if let Some(found) = self.find_static_field(iface, name, descriptor) {
                return Some(found);
            }
        }
        c.super_class
            .and_then(|s| self.find_static_field(s, name, descriptor))
    }

    /// Read a static field
    pub fn static_value(&self, class: ClassId, slot: usize) -> VmResult<Value> {
        self.get(class)?
            .statics
            .get(slot)
            .copied()
            .ok_or_else(|| VmError::Internal(format!("static slot {} out of range", slot)))
    }

    /// Write a static field
    pub fn set_static(&mut self, class: ClassId, slot: usize, value: Value) -> VmResult<()> {
        let field = self
            .get_mut(class)?
            .statics
            .get_mut(slot)
            .ok_or_else(|| VmError::Internal(format!("static slot {} out of range", slot)))?;
        *field = value;
        Ok(())
    }

    // ========================================================================
    // Type checks
    // ========================================================================

    /// Whether `sub` is a subclass of, or equal to, `sup`
    pub fn is_subclass(&self, sub: ClassId, sup: ClassId) -> bool {
        let mut current = Some(sub);
        while let Some(id) = current {
            if id == sup {
                return true;
            }
            current = self.class(id).super_class;
        }
        false
    }

    fn implements(&self, class: ClassId, iface: ClassId) -> bool {
        let mut current = Some(class);
        while let Some(id) = current {
            let c = self.class(id);
            for &i in &c.interfaces {
                if i == iface || self.implements(i, iface) {
                    return true;
                }
            }
            current = c.super_class;
        }
        false
    }

    /// Whether a value of class `from` may be stored where `to` is expected
    pub fn is_assignable(&self, from: ClassId, to: ClassId) -> bool {
        if from == to || to == self.well_known.object {
            return true;
        }
        let source = self.class(from);
        let target = self.class(to);
        match (source.element, target.element) {
            (Some(ArrayElement::Primitive(a)), Some(ArrayElement::Primitive(b))) => a == b,
            (Some(ArrayElement::Class(a)), Some(ArrayElement::Class(b))) => self.is_assignable(a, b),
            (Some(_), _) | (_, Some(_)) => false,
            (None, None) if target.is_interface() => self.implements(from, to),
            (None, None) => self.is_subclass(from, to),
        }
    }

    /// Whether `class` is `java/lang/Throwable` or one of its subclasses
    pub fn is_throwable(&self, class: ClassId) -> bool {
        self.is_subclass(class, self.well_known.throwable)
    }
}
