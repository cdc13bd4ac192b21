//! Object heap
//!
//! Objects live in an append-only arena addressed by `ObjectRef`. Nothing is
//! ever collected. Each object carries an optional monitor that is created
//! the first time the object is locked.

use crate::vm::classes::ClassId;
use crate::vm::monitor::Monitor;
use crate::vm::value::{ObjectRef, Value};
use crate::vm::{VmError, VmResult};
use rustc_hash::FxHashMap;

/// Element type of an array
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementType {
    /// boolean[]
    Boolean,
    /// byte[]
    Byte,
    /// char[]
    Char,
    /// short[]
    Short,
    /// int[]
    Int,
    /// long[]
    Long,
    /// float[]
    Float,
    /// double[]
    Double,
    /// Any reference array; the element class lives on the array class
    Reference,
}

impl ElementType {
    /// Element type for a primitive descriptor character
    pub fn from_descriptor(c: u8) -> Option<Self> {
        Some(match c {
            b'Z' => ElementType::Boolean,
            b'B' => ElementType::Byte,
            b'C' => ElementType::Char,
            b'S' => ElementType::Short,
            b'I' => ElementType::Int,
            b'J' => ElementType::Long,
            b'F' => ElementType::Float,
            b'D' => ElementType::Double,
            b'L' | b'[' => ElementType::Reference,
            _ => return None,
        })
    }

    /// Bytes one element takes against the heap limit
    pub fn width(self) -> u64 {
        match self {
            ElementType::Boolean | ElementType::Byte => 1,
            ElementType::Char | ElementType::Short => 2,
            ElementType::Int | ElementType::Float | ElementType::Reference => 4,
            ElementType::Long | ElementType::Double => 8,
        }
    }
}

/// Array storage, one vector per element type
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayData {
    /// boolean[], stored as bytes
    Boolean(Vec<i8>),
    /// byte[]
    Byte(Vec<i8>),
    /// char[]
    Char(Vec<u16>),
    /// short[]
    Short(Vec<i16>),
    /// int[]
    Int(Vec<i32>),
    /// long[]
    Long(Vec<i64>),
    /// float[]
    Float(Vec<f32>),
    /// double[]
    Double(Vec<f64>),
    /// Reference array (`Value::Null` or `Value::Ref`)
    Reference(Vec<Value>),
}

impl ArrayData {
    /// Zero-filled array
    pub fn new(element: ElementType, len: usize) -> Self {
        match element {
            ElementType::Boolean => ArrayData::Boolean(vec![0; len]),
            ElementType::Byte => ArrayData::Byte(vec![0; len]),
            ElementType::Char => ArrayData::Char(vec![0; len]),
            ElementType::Short => ArrayData::Short(vec![0; len]),
            ElementType::Int => ArrayData::Int(vec![0; len]),
            ElementType::Long => ArrayData::Long(vec![0; len]),
            ElementType::Float => ArrayData::Float(vec![0.0; len]),
            ElementType::Double => ArrayData::Double(vec![0.0; len]),
            ElementType::Reference => ArrayData::Reference(vec![Value::Null; len]),
        }
    }

    /// Number of elements
    pub fn len(&self) -> usize {
        match self {
            ArrayData::Boolean(v) | ArrayData::Byte(v) => v.len(),
            ArrayData::Char(v) => v.len(),
            ArrayData::Short(v) => v.len(),
            ArrayData::Int(v) => v.len(),
            ArrayData::Long(v) => v.len(),
            ArrayData::Float(v) => v.len(),
            ArrayData::Double(v) => v.len(),
            ArrayData::Reference(v) => v.len(),
        }
    }

    /// True for zero-length arrays
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Element type tag
    pub fn element_type(&self) -> ElementType {
        match self {
            ArrayData::Boolean(_) => ElementType::Boolean,
            ArrayData::Byte(_) => ElementType::Byte,
            ArrayData::Char(_) => ElementType::Char,
            ArrayData::Short(_) => ElementType::Short,
            ArrayData::Int(_) => ElementType::Int,
            ArrayData::Long(_) => ElementType::Long,
            ArrayData::Float(_) => ElementType::Float,
            ArrayData::Double(_) => ElementType::Double,
            ArrayData::Reference(_) => ElementType::Reference,
        }
    }

    /// Read an element, widening sub-int types to int
    pub fn load(&self, index: usize) -> Option<Value> {
        Some(match self {
            ArrayData::Boolean(v) | ArrayData::Byte(v) => Value::Int(i32::from(*v.get(index)?)),
            ArrayData::Char(v) => Value::Int(i32::from(*v.get(index)?)),
            ArrayData::Short(v) => Value::Int(i32::from(*v.get(index)?)),
            ArrayData::Int(v) => Value::Int(*v.get(index)?),
            ArrayData::Long(v) => Value::Long(*v.get(index)?),
            ArrayData::Float(v) => Value::Float(*v.get(index)?),
            ArrayData::Double(v) => Value::Double(*v.get(index)?),
            ArrayData::Reference(v) => *v.get(index)?,
        })
    }

    /// Write an element, truncating ints to the element width.
    ///
    /// The caller has already checked the index against `len()`.
    pub fn store(&mut self, index: usize, value: Value) -> VmResult<()> {
        let len = self.len();
        let out_of_range = || VmError::Internal(format!("array store {} >= {}", index, len));
        match self {
            ArrayData::Boolean(v) => {
                *v.get_mut(index).ok_or_else(out_of_range)? = (value.as_int()? & 1) as i8
            }
            ArrayData::Byte(v) => *v.get_mut(index).ok_or_else(out_of_range)? = value.as_int()? as i8,
            ArrayData::Char(v) => *v.get_mut(index).ok_or_else(out_of_range)? = value.as_int()? as u16,
            ArrayData::Short(v) => {
                *v.get_mut(index).ok_or_else(out_of_range)? = value.as_int()? as i16
            }
            ArrayData::Int(v) => *v.get_mut(index).ok_or_else(out_of_range)? = value.as_int()?,
            ArrayData::Long(v) => *v.get_mut(index).ok_or_else(out_of_range)? = value.as_long()?,
            ArrayData::Float(v) => {
                *v.get_mut(index).ok_or_else(out_of_range)? = value.as_float()?
            }
            ArrayData::Double(v) => {
                *v.get_mut(index).ok_or_else(out_of_range)? = value.as_double()?
            }
            ArrayData::Reference(v) => {
                value.as_object()?;
                *v.get_mut(index).ok_or_else(out_of_range)? = value
            }
        }
        Ok(())
    }
}

/// Payload of a heap object
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectBody {
    /// Plain instance; one slot per field in layout order
    Instance(Vec<Value>),
    /// Array of any element type
    Array(ArrayData),
    /// `java/lang/String` contents
    Str(String),
    /// `java/lang/Class` mirror of a runtime class
    Mirror(ClassId),
}

/// One heap object
#[derive(Debug)]
pub struct HeapObject {
    /// Runtime class
    pub class: ClassId,
    /// Lock and wait queues, attached on first use
    pub monitor: Option<Monitor>,
    /// Fields, elements or string data
    pub body: ObjectBody,
}

/// Append-only object arena with a string intern table
#[derive(Debug, Default)]
pub struct Heap {
    objects: Vec<HeapObject>,
    interned: FxHashMap<String, ObjectRef>,
    array_bytes: u64,
}

impl Heap {
    /// Create an empty heap
    pub fn new() -> Self {
        Self::default()
    }

    /// Charge `bytes` of array storage against `limit`. Returns false, and
    /// charges nothing, when the heap would go over.
    pub fn reserve(&mut self, bytes: u64, limit: u64) -> bool {
        match self.array_bytes.checked_add(bytes) {
            Some(total) if total <= limit => {
                self.array_bytes = total;
                true
            }
            _ => false,
        }
    }

    /// Array storage handed out so far
    pub fn array_bytes(&self) -> u64 {
        self.array_bytes
    }

    /// Allocate an object with the given body
    pub fn allocate(&mut self, class: ClassId, body: ObjectBody) -> ObjectRef {
        let r = ObjectRef(self.objects.len() as u32);
        self.objects.push(HeapObject {
            class,
            monitor: None,
            body,
        });
        r
    }

    /// Return the canonical string object for `text`
    pub fn intern(&mut self, string_class: ClassId, text: &str) -> ObjectRef {
        if let Some(&r) = self.interned.get(text) {
            return r;
        }
        let r = self.allocate(string_class, ObjectBody::Str(text.to_string()));
        self.interned.insert(text.to_string(), r);
        r
    }

    /// Borrow an object
    pub fn get(&self, r: ObjectRef) -> VmResult<&HeapObject> {
        self.objects
            .get(r.index())
            .ok_or_else(|| VmError::Internal(format!("dangling reference {}", r)))
    }

    /// Mutably borrow an object
    pub fn get_mut(&mut self, r: ObjectRef) -> VmResult<&mut HeapObject> {
        self.objects
            .get_mut(r.index())
            .ok_or_else(|| VmError::Internal(format!("dangling reference {}", r)))
    }

    /// Class of an object
    pub fn class_of(&self, r: ObjectRef) -> VmResult<ClassId> {
        Ok(self.get(r)?.class)
    }

    /// String contents, if `r` is a string
    pub fn string(&self, r: ObjectRef) -> VmResult<Option<&str>> {
        Ok(match &self.get(r)?.body {
            ObjectBody::Str(s) => Some(s.as_str()),
            _ => None,
        })
    }

    /// Array storage, if `r` is an array
    pub fn array(&self, r: ObjectRef) -> VmResult<Option<&ArrayData>> {
        Ok(match &self.get(r)?.body {
            ObjectBody::Array(data) => Some(data),
            _ => None,
        })
    }

    /// Mutable array storage, if `r` is an array
    pub fn array_mut(&mut self, r: ObjectRef) -> VmResult<Option<&mut ArrayData>> {
        Ok(match &mut self.get_mut(r)?.body {
            ObjectBody::Array(data) => Some(data),
            _ => None,
        })
    }

    /// Read an instance field slot
    pub fn field(&self, r: ObjectRef, slot: usize) -> VmResult<Value> {
        match &self.get(r)?.body {
            ObjectBody::Instance(fields) => fields
                .get(slot)
                .copied()
                .ok_or_else(|| VmError::Internal(format!("field slot {} on {}", slot, r))),
            _ => Err(VmError::Internal(format!("{} has no fields", r))),
        }
    }

    /// Write an instance field slot
    pub fn set_field(&mut self, r: ObjectRef, slot: usize, value: Value) -> VmResult<()> {
        match &mut self.get_mut(r)?.body {
            ObjectBody::Instance(fields) => {
                let field = fields
                    .get_mut(slot)
                    .ok_or_else(|| VmError::Internal(format!("field slot {} on {}", slot, r)))?;
                *field = value;
                Ok(())
            }
            _ => Err(VmError::Internal(format!("{} has no fields", r))),
        }
    }

    /// Monitor of `r`, attaching an unowned one if needed
    pub fn monitor_mut(&mut self, r: ObjectRef) -> VmResult<&mut Monitor> {
        Ok(self.get_mut(r)?.monitor.get_or_insert_with(Monitor::default))
    }

    /// Monitor of `r` if one was ever attached
    pub fn monitor(&self, r: ObjectRef) -> VmResult<Option<&Monitor>> {
        Ok(self.get(r)?.monitor.as_ref())
    }

    /// Number of allocated objects
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// True before the first allocation
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserve_stops_at_limit() {
        let mut heap = Heap::new();
        assert!(heap.reserve(600, 1000));
        assert!(!heap.reserve(401, 1000));
        assert_eq!(heap.array_bytes(), 600);
        assert!(heap.reserve(400, 1000));
        assert!(!heap.reserve(u64::MAX, u64::MAX));
    }

    #[test]
    fn test_array_store_truncates() {
        let mut bytes = ArrayData::new(ElementType::Byte, 2);
        bytes.store(0, Value::Int(0x1ff)).unwrap();
        assert_eq!(bytes.load(0), Some(Value::Int(-1)));

        let mut chars = ArrayData::new(ElementType::Char, 1);
        chars.store(0, Value::Int(-1)).unwrap();
        assert_eq!(chars.load(0), Some(Value::Int(0xffff)));

        let mut flags = ArrayData::new(ElementType::Boolean, 1);
        flags.store(0, Value::Int(2)).unwrap();
        assert_eq!(flags.load(0), Some(Value::Int(0)));
    }

    #[test]
    fn test_array_bounds_and_types() {
        let mut ints = ArrayData::new(ElementType::Int, 3);
        assert_eq!(ints.len(), 3);
        assert_eq!(ints.load(3), None);
        assert!(ints.store(0, Value::Long(1)).is_err());
        assert!(ints.store(5, Value::Int(1)).is_err());
    }

    #[test]
    fn test_intern_returns_same_object() {
        let mut heap = Heap::new();
        let class = ClassId(0);
        let a = heap.intern(class, "hi");
        let b = heap.intern(class, "hi");
        let c = heap.intern(class, "ho");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(heap.string(a).unwrap(), Some("hi"));
    }

    #[test]
    fn test_monitor_attached_lazily() {
        let mut heap = Heap::new();
        let r = heap.allocate(ClassId(0), ObjectBody::Instance(vec![]));
        assert!(heap.monitor(r).unwrap().is_none());
        heap.monitor_mut(r).unwrap();
        assert!(heap.monitor(r).unwrap().is_some());
    }
}
