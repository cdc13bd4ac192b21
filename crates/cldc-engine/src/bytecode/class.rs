//! Loaded class model
//!
//! A `ClassFile` is the already-parsed, pre-verified form of one class: its
//! symbolic constant pool, field declarations and method bodies. The class
//! registry links these into runtime classes on first use.

use std::fmt;

/// Access and property flags (JVM `ACC_*` values)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct AccessFlags(pub u16);

impl AccessFlags {
    /// `ACC_PUBLIC`
    pub const PUBLIC: u16 = 0x0001;
    /// `ACC_PRIVATE`
    pub const PRIVATE: u16 = 0x0002;
    /// `ACC_PROTECTED`
    pub const PROTECTED: u16 = 0x0004;
    /// `ACC_STATIC`
    pub const STATIC: u16 = 0x0008;
    /// `ACC_FINAL`
    pub const FINAL: u16 = 0x0010;
    /// `ACC_SYNCHRONIZED`
    pub const SYNCHRONIZED: u16 = 0x0020;
    /// `ACC_NATIVE`
    pub const NATIVE: u16 = 0x0100;
    /// `ACC_INTERFACE`
    pub const INTERFACE: u16 = 0x0200;
    /// `ACC_ABSTRACT`
    pub const ABSTRACT: u16 = 0x0400;

    /// Flag value for an assembler keyword
    pub fn from_keyword(word: &str) -> Option<u16> {
        Some(match word {
            "public" => Self::PUBLIC,
            "private" => Self::PRIVATE,
            "protected" => Self::PROTECTED,
            "static" => Self::STATIC,
            "final" => Self::FINAL,
            "synchronized" => Self::SYNCHRONIZED,
            "native" => Self::NATIVE,
            "interface" => Self::INTERFACE,
            "abstract" => Self::ABSTRACT,
            _ => return None,
        })
    }

    /// Check a flag
    pub fn contains(self, flag: u16) -> bool {
        self.0 & flag != 0
    }

    /// `ACC_STATIC` set
    pub fn is_static(self) -> bool {
        self.contains(Self::STATIC)
    }

    /// `ACC_NATIVE` set
    pub fn is_native(self) -> bool {
        self.contains(Self::NATIVE)
    }

    /// `ACC_SYNCHRONIZED` set
    pub fn is_synchronized(self) -> bool {
        self.contains(Self::SYNCHRONIZED)
    }

    /// `ACC_ABSTRACT` set
    pub fn is_abstract(self) -> bool {
        self.contains(Self::ABSTRACT)
    }

    /// `ACC_INTERFACE` set
    pub fn is_interface(self) -> bool {
        self.contains(Self::INTERFACE)
    }

    /// `ACC_PRIVATE` set
    pub fn is_private(self) -> bool {
        self.contains(Self::PRIVATE)
    }
}

/// Symbolic reference to a field or method
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MemberRef {
    /// Owning class (internal name)
    pub class: String,
    /// Member name
    pub name: String,
    /// Field or method descriptor
    pub descriptor: String,
}

impl fmt::Display for MemberRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}{}", self.class, self.name, self.descriptor)
    }
}

/// Constant pool entry
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    /// int literal
    Integer(i32),
    /// float literal
    Float(f32),
    /// long literal
    Long(i64),
    /// double literal
    Double(f64),
    /// String literal
    String(String),
    /// Class reference by internal name
    Class(String),
    /// Field reference
    Field(MemberRef),
    /// Class method reference
    Method(MemberRef),
    /// Interface method reference
    InterfaceMethod(MemberRef),
}

/// Symbolic constant pool; indices are 1-based and index 0 is never valid.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConstantPool {
    entries: Vec<Constant>,
}

impl ConstantPool {
    /// Create an empty pool
    pub fn new() -> Self {
        Self::default()
    }

    /// Entry at a 1-based index
    pub fn get(&self, index: u16) -> Option<&Constant> {
        let index = usize::from(index).checked_sub(1)?;
        self.entries.get(index)
    }

    /// Add an entry, reusing an equal one if present
    pub fn intern(&mut self, constant: Constant) -> u16 {
        if let Some(pos) = self.entries.iter().position(|c| *c == constant) {
            return (pos + 1) as u16;
        }
        self.entries.push(constant);
        self.entries.len() as u16
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when the pool holds no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// One row of a method's exception table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExceptionEntry {
    /// First covered offset (inclusive)
    pub start_pc: u16,
    /// End of the covered range (exclusive)
    pub end_pc: u16,
    /// Handler offset
    pub handler_pc: u16,
    /// Pool index of the caught class, 0 for catch-all
    pub catch_type: u16,
}

impl ExceptionEntry {
    /// Whether the entry's range covers `pc`
    pub fn covers(&self, pc: usize) -> bool {
        usize::from(self.start_pc) <= pc && pc < usize::from(self.end_pc)
    }
}

/// Declared field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDef {
    /// Field name
    pub name: String,
    /// Field descriptor
    pub descriptor: String,
    /// Access flags
    pub flags: AccessFlags,
}

/// Declared method
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDef {
    /// Method name
    pub name: String,
    /// Method descriptor
    pub descriptor: String,
    /// Access flags
    pub flags: AccessFlags,
    /// Local variable slots, including arguments
    pub max_locals: u16,
    /// Operand stack depth hint
    pub max_stack: u16,
    /// Bytecode; empty for native and abstract methods
    pub code: Vec<u8>,
    /// Exception table in declaration order
    pub exception_table: Vec<ExceptionEntry>,
}

/// A pre-verified class ready for linking
#[derive(Debug, Clone, PartialEq)]
pub struct ClassFile {
    /// Internal name, e.g. `java/lang/Object`
    pub name: String,
    /// Superclass; `None` only for `java/lang/Object`
    pub super_name: Option<String>,
    /// Directly implemented interfaces
    pub interfaces: Vec<String>,
    /// Class access flags
    pub flags: AccessFlags,
    /// Constant pool
    pub constant_pool: ConstantPool,
    /// Fields
    pub fields: Vec<FieldDef>,
    /// Methods
    pub methods: Vec<MethodDef>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_is_one_based_and_deduplicates() {
        let mut pool = ConstantPool::new();
        let a = pool.intern(Constant::Integer(7));
        let b = pool.intern(Constant::String("x".into()));
        let c = pool.intern(Constant::Integer(7));
        assert_eq!((a, b, c), (1, 2, 1));
        assert_eq!(pool.get(0), None);
        assert_eq!(pool.get(2), Some(&Constant::String("x".into())));
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn test_exception_range_is_half_open() {
        let entry = ExceptionEntry {
            start_pc: 2,
            end_pc: 6,
            handler_pc: 10,
            catch_type: 0,
        };
        assert!(!entry.covers(1));
        assert!(entry.covers(2));
        assert!(entry.covers(5));
        assert!(!entry.covers(6));
    }
}
