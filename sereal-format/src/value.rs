//! Host value model for the Sereal codec
//!
//! Sereal serializes a dynamic-language value graph: the same container can
//! appear in several slots, references can form cycles, and aliases share a
//! single slot. Containers and strings therefore live behind `Rc` so that
//! *reference identity* (the pointer) is observable by the encoder's offset
//! trackers, and so the decoder can rebuild shared topology.

use std::cell::RefCell;
use std::rc::Rc;

/// Shared, mutable sequence
pub type ArrayRef = Rc<RefCell<Vec<Value>>>;
/// Shared, mutable mapping; ordered pairs so that re-encoding a document is
/// byte-identical
pub type HashRef = Rc<RefCell<Vec<(Value, Value)>>>;
/// Shared, mutable referent slot for explicit references
pub type ScalarRef = Rc<RefCell<Value>>;

/// A value in the Sereal data model
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Undefined
    Undef,
    /// The canonical undefined sentinel (its own wire tag on protocol 3+)
    CanonicalUndef,
    /// Boolean
    Bool(bool),
    /// Signed 64-bit integer
    Int(i64),
    /// Unsigned promotion path for positive values above `i64::MAX`
    UInt(u64),
    /// IEEE-754 single
    Float(f32),
    /// IEEE-754 double
    Double(f64),
    /// IEEE-754 binary128 bit pattern, little-endian
    LongDouble([u8; 16]),
    /// Opaque byte string
    Bytes(Rc<Vec<u8>>),
    /// Unicode string
    Str(Rc<String>),
    /// Ordered sequence
    Array(ArrayRef),
    /// Mapping; keys are stringified on the wire
    Hash(HashRef),
    /// Explicit reference to another value
    Ref(ScalarRef),
    /// The wrapped value is weakly referenced
    Weak(Box<Value>),
    /// The wrapped value occupies an aliased slot
    Alias(Box<Value>),
    /// Blessed object: class name plus payload
    Object {
        /// Class name
        class: String,
        /// Object payload
        data: Box<Value>,
    },
    /// Compiled regex: pattern string plus a subset of the flags `m s i x`
    Regex {
        /// Pattern, as a `Bytes` or `Str` value
        pattern: Box<Value>,
        /// Flag characters, drawn from "msix"
        flags: String,
    },
}

impl Value {
    /// Build a sequence value from a plain vector
    pub fn array(items: Vec<Value>) -> Value {
        Value::Array(Rc::new(RefCell::new(items)))
    }

    /// Build a mapping value from ordered pairs
    pub fn hash(pairs: Vec<(Value, Value)>) -> Value {
        Value::Hash(Rc::new(RefCell::new(pairs)))
    }

    /// Build a byte-string value
    pub fn bytes(data: impl Into<Vec<u8>>) -> Value {
        Value::Bytes(Rc::new(data.into()))
    }

    /// Build a Unicode string value
    pub fn string(data: impl Into<String>) -> Value {
        Value::Str(Rc::new(data.into()))
    }

    /// Build an explicit reference to `referent`
    pub fn reference(referent: Value) -> Value {
        Value::Ref(Rc::new(RefCell::new(referent)))
    }

    /// Reference identity for offset tracking: the shared-pointer address
    /// for heap-backed variants, `None` for plain scalars
    pub fn identity(&self) -> Option<usize> {
        match self {
            Value::Bytes(rc) => Some(Rc::as_ptr(rc) as *const () as usize),
            Value::Str(rc) => Some(Rc::as_ptr(rc) as *const () as usize),
            Value::Array(rc) => Some(Rc::as_ptr(rc) as *const () as usize),
            Value::Hash(rc) => Some(Rc::as_ptr(rc) as *const () as usize),
            Value::Ref(rc) => Some(Rc::as_ptr(rc) as *const () as usize),
            _ => None,
        }
    }

    /// Borrow as a sequence handle
    pub fn as_array(&self) -> Option<&ArrayRef> {
        match self {
            Value::Array(rc) => Some(rc),
            _ => None,
        }
    }

    /// Borrow as a mapping handle
    pub fn as_hash(&self) -> Option<&HashRef> {
        match self {
            Value::Hash(rc) => Some(rc),
            _ => None,
        }
    }

    /// Extract a signed integer
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// True for the string family (`Bytes` or `Str`)
    pub fn is_string(&self) -> bool {
        matches!(self, Value::Bytes(_) | Value::Str(_))
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Value {
        Value::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Value {
        Value::Int(n as i64)
    }
}

impl From<u64> for Value {
    fn from(n: u64) -> Value {
        if n > i64::MAX as u64 {
            Value::UInt(n)
        } else {
            Value::Int(n as i64)
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Value {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Value {
        Value::Double(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Value {
        Value::string(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Value {
        Value::string(s)
    }
}

impl From<&[u8]> for Value {
    fn from(b: &[u8]) -> Value {
        Value::bytes(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_follows_sharing() {
        let shared = Value::array(vec![Value::Int(1)]);
        let clone = shared.clone();
        assert_eq!(shared.identity(), clone.identity());

        let other = Value::array(vec![Value::Int(1)]);
        assert_ne!(shared.identity(), other.identity());
        // structurally equal regardless of identity
        assert_eq!(shared, other);
    }

    #[test]
    fn test_scalars_have_no_identity() {
        assert_eq!(Value::Int(7).identity(), None);
        assert_eq!(Value::Bool(true).identity(), None);
        assert_eq!(Value::Undef.identity(), None);
    }

    #[test]
    fn test_u64_promotion() {
        assert_eq!(Value::from(7u64), Value::Int(7));
        assert_eq!(
            Value::from(u64::MAX),
            Value::UInt(u64::MAX)
        );
    }
}
