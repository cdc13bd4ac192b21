//! Field and method descriptor parsing

use thiserror::Error;

/// Descriptor parse failure
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("malformed descriptor `{descriptor}`: {reason}")]
pub struct DescriptorError {
    /// The offending descriptor
    pub descriptor: String,
    /// What went wrong
    pub reason: &'static str,
}

/// Computational kind of a field, parameter or return value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    /// `Z`
    Boolean,
    /// `B`
    Byte,
    /// `C`
    Char,
    /// `S`
    Short,
    /// `I`
    Int,
    /// `F`
    Float,
    /// `J`
    Long,
    /// `D`
    Double,
    /// `L...;` or `[...`
    Reference,
    /// `V`, only valid as a return type
    Void,
}

impl Kind {
    /// Operand stack / local slots occupied by a value of this kind
    pub fn slots(self) -> usize {
        match self {
            Kind::Long | Kind::Double => 2,
            Kind::Void => 0,
            _ => 1,
        }
    }

    /// Whether the value occupies two slots
    pub fn is_wide(self) -> bool {
        self.slots() == 2
    }
}

/// Parsed method descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodSignature {
    /// Parameter kinds in declaration order
    pub params: Vec<Kind>,
    /// Return kind
    pub ret: Kind,
}

impl MethodSignature {
    /// Slots taken by the explicit arguments (receiver excluded)
    pub fn arg_slots(&self) -> usize {
        self.params.iter().map(|k| k.slots()).sum()
    }
}

/// Parse a field descriptor such as `I`, `[J` or `Ljava/lang/String;`
pub fn parse_field(descriptor: &str) -> Result<Kind, DescriptorError> {
    let bytes = descriptor.as_bytes();
    let (kind, len) = parse_one(bytes, 0).map_err(|reason| DescriptorError {
        descriptor: descriptor.to_string(),
        reason,
    })?;
    if len != bytes.len() || kind == Kind::Void {
        return Err(DescriptorError {
            descriptor: descriptor.to_string(),
            reason: "not a single field type",
        });
    }
    Ok(kind)
}

/// Parse a method descriptor such as `(IJ[Ljava/lang/Object;)V`
pub fn parse_method(descriptor: &str) -> Result<MethodSignature, DescriptorError> {
    let err = |reason| DescriptorError {
        descriptor: descriptor.to_string(),
        reason,
    };
    let bytes = descriptor.as_bytes();
    if bytes.first() != Some(&b'(') {
        return Err(err("missing `(`"));
    }
    let mut pos = 1;
    let mut params = Vec::new();
    loop {
        match bytes.get(pos) {
            Some(b')') => {
                pos += 1;
                break;
            }
            Some(_) => {
                let (kind, next) = parse_one(bytes, pos).map_err(err)?;
                if kind == Kind::Void {
                    return Err(err("void parameter"));
                }
                params.push(kind);
                pos = next;
            }
            None => return Err(err("missing `)`")),
        }
    }
    let (ret, end) = parse_one(bytes, pos).map_err(err)?;
    if end != bytes.len() {
        return Err(err("trailing characters"));
    }
    Ok(MethodSignature { params, ret })
}

fn parse_one(bytes: &[u8], pos: usize) -> Result<(Kind, usize), &'static str> {
    let kind = match bytes.get(pos) {
        Some(b'Z') => Kind::Boolean,
        Some(b'B') => Kind::Byte,
        Some(b'C') => Kind::Char,
        Some(b'S') => Kind::Short,
        Some(b'I') => Kind::Int,
        Some(b'F') => Kind::Float,
        Some(b'J') => Kind::Long,
        Some(b'D') => Kind::Double,
        Some(b'V') => Kind::Void,
        Some(b'L') => {
            let end = bytes[pos..]
                .iter()
                .position(|&b| b == b';')
                .ok_or("unterminated class name")?;
            if end == 1 {
                return Err("empty class name");
            }
            return Ok((Kind::Reference, pos + end + 1));
        }
        Some(b'[') => {
            let (element, next) = parse_one(bytes, pos + 1)?;
            if element == Kind::Void {
                return Err("void array element");
            }
            return Ok((Kind::Reference, next));
        }
        Some(_) => return Err("unknown type character"),
        None => return Err("unexpected end"),
    };
    Ok((kind, pos + 1))
}

/// Class name referenced by a reference field descriptor.
///
/// `Ljava/lang/String;` yields `java/lang/String`; array descriptors are
/// already class names and are returned unchanged.
pub fn class_name_of(descriptor: &str) -> Option<&str> {
    if descriptor.starts_with('[') {
        Some(descriptor)
    } else {
        descriptor.strip_prefix('L')?.strip_suffix(';')
    }
}

/// Descriptor of an array whose elements are instances of `class_name`
pub fn array_of(class_name: &str) -> String {
    if class_name.starts_with('[') {
        format!("[{}", class_name)
    } else {
        format!("[L{};", class_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_field() {
        assert_eq!(parse_field("I"), Ok(Kind::Int));
        assert_eq!(parse_field("J"), Ok(Kind::Long));
        assert_eq!(parse_field("[[D"), Ok(Kind::Reference));
        assert_eq!(parse_field("Ljava/lang/Object;"), Ok(Kind::Reference));
        assert!(parse_field("V").is_err());
        assert!(parse_field("II").is_err());
        assert!(parse_field("Ljava/lang/Object").is_err());
    }

    #[test]
    fn test_parse_method() {
        let sig = parse_method("(IJ[Ljava/lang/String;D)V").unwrap();
        assert_eq!(
            sig.params,
            vec![Kind::Int, Kind::Long, Kind::Reference, Kind::Double]
        );
        assert_eq!(sig.ret, Kind::Void);
        assert_eq!(sig.arg_slots(), 6);

        let sig = parse_method("()J").unwrap();
        assert!(sig.params.is_empty());
        assert_eq!(sig.ret.slots(), 2);
    }

    #[test]
    fn test_parse_method_rejects_garbage() {
        assert!(parse_method("I)V").is_err());
        assert!(parse_method("(I").is_err());
        assert!(parse_method("(V)V").is_err());
        assert!(parse_method("(I)VV").is_err());
    }

    #[test]
    fn test_class_names() {
        assert_eq!(class_name_of("Ljava/lang/String;"), Some("java/lang/String"));
        assert_eq!(class_name_of("[I"), Some("[I"));
        assert_eq!(class_name_of("I"), None);
        assert_eq!(array_of("java/lang/Object"), "[Ljava/lang/Object;");
        assert_eq!(array_of("[I"), "[[I");
    }
}
