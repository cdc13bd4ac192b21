//! Operand stack and local variable slots
//!
//! A `Value` is one slot. `long` and `double` take two slots: the value itself
//! followed by a `Top` filler, so raw stack instructions such as `dup2` and
//! `pop2` keep the JVM's slot arithmetic.

use crate::bytecode::Kind;
use crate::vm::{VmError, VmResult};
use std::fmt;

/// Handle to a heap object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectRef(pub(crate) u32);

impl ObjectRef {
    /// Arena index of the object
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

/// One operand stack or local variable slot
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    /// Upper half of a two-slot value, or an unset local
    Top,
    /// The null reference
    Null,
    /// int, and also boolean, byte, char and short
    Int(i32),
    /// long
    Long(i64),
    /// float
    Float(f32),
    /// double
    Double(f64),
    /// Object reference
    Ref(ObjectRef),
    /// Return address pushed by `jsr`
    ReturnAddress(usize),
}

impl Value {
    /// Zero value for a field or array element of `kind`
    pub fn default_for(kind: Kind) -> Self {
        match kind {
            Kind::Long => Value::Long(0),
            Kind::Float => Value::Float(0.0),
            Kind::Double => Value::Double(0.0),
            Kind::Reference => Value::Null,
            Kind::Void => Value::Top,
            _ => Value::Int(0),
        }
    }

    /// Whether this value occupies two slots
    pub fn is_wide(self) -> bool {
        matches!(self, Value::Long(_) | Value::Double(_))
    }

    fn mismatch(self, expected: &'static str) -> VmError {
        VmError::TypeError {
            expected,
            found: format!("{:?}", self),
        }
    }

    /// Read an int slot
    pub fn as_int(self) -> VmResult<i32> {
        match self {
            Value::Int(v) => Ok(v),
            other => Err(other.mismatch("int")),
        }
    }

    /// Read a long slot
    pub fn as_long(self) -> VmResult<i64> {
        match self {
            Value::Long(v) => Ok(v),
            other => Err(other.mismatch("long")),
        }
    }

    /// Read a float slot
    pub fn as_float(self) -> VmResult<f32> {
        match self {
            Value::Float(v) => Ok(v),
            other => Err(other.mismatch("float")),
        }
    }

    /// Read a double slot
    pub fn as_double(self) -> VmResult<f64> {
        match self {
            Value::Double(v) => Ok(v),
            other => Err(other.mismatch("double")),
        }
    }

    /// Read a reference slot; `None` for null
    pub fn as_object(self) -> VmResult<Option<ObjectRef>> {
        match self {
            Value::Null => Ok(None),
            Value::Ref(r) => Ok(Some(r)),
            other => Err(other.mismatch("reference")),
        }
    }

    /// Wrap an optional reference
    pub fn from_ref(r: Option<ObjectRef>) -> Self {
        r.map_or(Value::Null, Value::Ref)
    }

    /// Java boolean encoding
    pub fn from_bool(b: bool) -> Self {
        Value::Int(b as i32)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Long(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<ObjectRef> for Value {
    fn from(r: ObjectRef) -> Self {
        Value::Ref(r)
    }
}
