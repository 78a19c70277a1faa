//! Type-erased values and argument slots
//!
//! `Value` is what interceptors and method bodies see: a kind-tagged box.
//! `Slot` is what an in-flight call frame stores: primitives as raw
//! little-endian bytes sized by their encoding, references as typed handles.
//! The conversion between the two lives in [`crate::marshal`].

use super::class::Class;
use super::encoding::TypeEncoding;
use super::object::Object;
use super::selector::Selector;

/// Generic numeric wrapper over every primitive width and signedness
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    /// `c`
    I8(i8),
    /// `s`
    I16(i16),
    /// `i`, `l`
    I32(i32),
    /// `q`
    I64(i64),
    /// `C`
    U8(u8),
    /// `S`
    U16(u16),
    /// `I`, `L`
    U32(u32),
    /// `Q`
    U64(u64),
    /// `f`
    F32(f32),
    /// `d`
    F64(f64),
    /// `B`
    Bool(bool),
}

impl Number {
    /// Value as a signed 64-bit integer (floats truncate, bools are 0/1)
    pub fn as_i64(&self) -> i64 {
        match *self {
            Number::I8(v) => v as i64,
            Number::I16(v) => v as i64,
            Number::I32(v) => v as i64,
            Number::I64(v) => v,
            Number::U8(v) => v as i64,
            Number::U16(v) => v as i64,
            Number::U32(v) => v as i64,
            Number::U64(v) => v as i64,
            Number::F32(v) => v as i64,
            Number::F64(v) => v as i64,
            Number::Bool(v) => v as i64,
        }
    }

    /// Value as an unsigned 64-bit integer
    pub fn as_u64(&self) -> u64 {
        match *self {
            Number::U64(v) => v,
            Number::F32(v) => v as u64,
            Number::F64(v) => v as u64,
            _ => self.as_i64() as u64,
        }
    }

    /// Value as a double
    pub fn as_f64(&self) -> f64 {
        match *self {
            Number::F32(v) => v as f64,
            Number::F64(v) => v,
            Number::U64(v) => v as f64,
            _ => self.as_i64() as f64,
        }
    }

    /// Value as a boolean (non-zero is true)
    pub fn as_bool(&self) -> bool {
        match *self {
            Number::Bool(v) => v,
            Number::F32(v) => v != 0.0,
            Number::F64(v) => v != 0.0,
            _ => self.as_u64() != 0,
        }
    }

    /// Convert to the width and signedness of `encoding`
    ///
    /// Returns `None` for non-numeric encodings.
    pub fn coerce(&self, encoding: &TypeEncoding) -> Option<Number> {
        let number = match encoding {
            TypeEncoding::Char => Number::I8(self.as_i64() as i8),
            TypeEncoding::Short => Number::I16(self.as_i64() as i16),
            TypeEncoding::Int | TypeEncoding::Long => Number::I32(self.as_i64() as i32),
            TypeEncoding::LongLong => Number::I64(self.as_i64()),
            TypeEncoding::UChar => Number::U8(self.as_u64() as u8),
            TypeEncoding::UShort => Number::U16(self.as_u64() as u16),
            TypeEncoding::UInt | TypeEncoding::ULong => Number::U32(self.as_u64() as u32),
            TypeEncoding::ULongLong => Number::U64(self.as_u64()),
            TypeEncoding::Float => Number::F32(self.as_f64() as f32),
            TypeEncoding::Double => Number::F64(self.as_f64()),
            TypeEncoding::Bool => Number::Bool(self.as_bool()),
            _ => return None,
        };
        Some(number)
    }

    /// Little-endian bytes of this number
    pub fn to_le_bytes(&self) -> Vec<u8> {
        match *self {
            Number::I8(v) => v.to_le_bytes().to_vec(),
            Number::I16(v) => v.to_le_bytes().to_vec(),
            Number::I32(v) => v.to_le_bytes().to_vec(),
            Number::I64(v) => v.to_le_bytes().to_vec(),
            Number::U8(v) => v.to_le_bytes().to_vec(),
            Number::U16(v) => v.to_le_bytes().to_vec(),
            Number::U32(v) => v.to_le_bytes().to_vec(),
            Number::U64(v) => v.to_le_bytes().to_vec(),
            Number::F32(v) => v.to_le_bytes().to_vec(),
            Number::F64(v) => v.to_le_bytes().to_vec(),
            Number::Bool(v) => vec![v as u8],
        }
    }

    /// Read a number of `encoding`'s width from little-endian bytes
    pub fn from_le_bytes(encoding: &TypeEncoding, bytes: &[u8]) -> Option<Number> {
        fn array<const N: usize>(bytes: &[u8]) -> Option<[u8; N]> {
            bytes.try_into().ok()
        }

        let number = match encoding {
            TypeEncoding::Char => Number::I8(i8::from_le_bytes(array(bytes)?)),
            TypeEncoding::Short => Number::I16(i16::from_le_bytes(array(bytes)?)),
            TypeEncoding::Int | TypeEncoding::Long => Number::I32(i32::from_le_bytes(array(bytes)?)),
            TypeEncoding::LongLong => Number::I64(i64::from_le_bytes(array(bytes)?)),
            TypeEncoding::UChar => Number::U8(u8::from_le_bytes(array(bytes)?)),
            TypeEncoding::UShort => Number::U16(u16::from_le_bytes(array(bytes)?)),
            TypeEncoding::UInt | TypeEncoding::ULong => Number::U32(u32::from_le_bytes(array(bytes)?)),
            TypeEncoding::ULongLong => Number::U64(u64::from_le_bytes(array(bytes)?)),
            TypeEncoding::Float => Number::F32(f32::from_le_bytes(array(bytes)?)),
            TypeEncoding::Double => Number::F64(f64::from_le_bytes(array(bytes)?)),
            TypeEncoding::Bool => Number::Bool(array::<1>(bytes)?[0] != 0),
            _ => return None,
        };
        Some(number)
    }

    /// Short name of the numeric kind
    pub fn type_name(&self) -> &'static str {
        match self {
            Number::I8(_) => "i8",
            Number::I16(_) => "i16",
            Number::I32(_) => "i32",
            Number::I64(_) => "i64",
            Number::U8(_) => "u8",
            Number::U16(_) => "u16",
            Number::U32(_) => "u32",
            Number::U64(_) => "u64",
            Number::F32(_) => "f32",
            Number::F64(_) => "f64",
            Number::Bool(_) => "bool",
        }
    }
}

macro_rules! number_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Number {
                fn from(v: $ty) -> Self {
                    Number::$variant(v)
                }
            }

            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::Number(Number::$variant(v))
                }
            }
        )*
    };
}

number_from!(
    i8 => I8, i16 => I16, i32 => I32, i64 => I64,
    u8 => U8, u16 => U16, u32 => U32, u64 => U64,
    f32 => F32, f64 => F64, bool => Bool,
);

/// Fixed-size blob for argument kinds outside the recognized set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpaqueValue {
    encoding: TypeEncoding,
    bytes: Vec<u8>,
}

impl OpaqueValue {
    /// Wrap raw bytes described by `encoding`
    pub fn new(encoding: TypeEncoding, bytes: Vec<u8>) -> Self {
        Self { encoding, bytes }
    }

    /// Encoding the bytes were captured with
    pub fn encoding(&self) -> &TypeEncoding {
        &self.encoding
    }

    /// Raw bytes
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// Type-erased value crossing the call boundary
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Value {
    /// No value (void return)
    #[default]
    Void,
    /// Numeric or boolean primitive
    Number(Number),
    /// Object reference (nil as `None`)
    Object(Option<Object>),
    /// Class reference
    Class(Option<Class>),
    /// Selector reference
    Selector(Option<Selector>),
    /// Anything else, as raw bytes
    Opaque(OpaqueValue),
}

impl Value {
    /// Nil object reference
    pub fn nil() -> Self {
        Value::Object(None)
    }

    /// Check for the void value
    pub fn is_void(&self) -> bool {
        matches!(self, Value::Void)
    }

    /// Numeric payload
    pub fn as_number(&self) -> Option<Number> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Numeric payload as i64
    pub fn as_i64(&self) -> Option<i64> {
        self.as_number().map(|n| n.as_i64())
    }

    /// Numeric payload as f64
    pub fn as_f64(&self) -> Option<f64> {
        self.as_number().map(|n| n.as_f64())
    }

    /// Numeric payload as bool
    pub fn as_bool(&self) -> Option<bool> {
        self.as_number().map(|n| n.as_bool())
    }

    /// Object payload (`None` for nil or non-objects)
    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Value::Object(obj) => obj.as_ref(),
            _ => None,
        }
    }

    /// Class payload
    pub fn as_class(&self) -> Option<&Class> {
        match self {
            Value::Class(class) => class.as_ref(),
            _ => None,
        }
    }

    /// Selector payload
    pub fn as_selector(&self) -> Option<&Selector> {
        match self {
            Value::Selector(sel) => sel.as_ref(),
            _ => None,
        }
    }

    /// Opaque payload
    pub fn as_opaque(&self) -> Option<&OpaqueValue> {
        match self {
            Value::Opaque(opaque) => Some(opaque),
            _ => None,
        }
    }

    /// Kind name, for diagnostics
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Void => "void",
            Value::Number(n) => n.type_name(),
            Value::Object(_) => "object",
            Value::Class(_) => "class",
            Value::Selector(_) => "selector",
            Value::Opaque(_) => "opaque",
        }
    }
}

impl From<Number> for Value {
    fn from(n: Number) -> Self {
        Value::Number(n)
    }
}

impl From<Object> for Value {
    fn from(obj: Object) -> Self {
        Value::Object(Some(obj))
    }
}

impl From<Class> for Value {
    fn from(class: Class) -> Self {
        Value::Class(Some(class))
    }
}

impl From<Selector> for Value {
    fn from(sel: Selector) -> Self {
        Value::Selector(Some(sel))
    }
}

impl From<OpaqueValue> for Value {
    fn from(opaque: OpaqueValue) -> Self {
        Value::Opaque(opaque)
    }
}

/// Raw storage of one argument in a call frame
#[derive(Debug, Clone, PartialEq)]
pub enum Slot {
    /// Primitive or opaque bytes, sized by the slot's encoding
    Bytes(Vec<u8>),
    /// Object reference
    Object(Option<Object>),
    /// Class reference
    Class(Option<Class>),
    /// Selector reference
    Selector(Option<Selector>),
}

impl Slot {
    /// Kind name, for diagnostics
    pub fn type_name(&self) -> &'static str {
        match self {
            Slot::Bytes(_) => "bytes",
            Slot::Object(_) => "object",
            Slot::Class(_) => "class",
            Slot::Selector(_) => "selector",
        }
    }
}
