//! Argument marshalling between call frames and interceptors
//!
//! Call frames store arguments as raw [`Slot`]s laid out by the method's
//! type encoding. Interceptors work with [`Value`]s. This module converts
//! between the two, one slot at a time, driven by the encoding of the slot.

use crate::runtime::encoding::{ArgKind, TypeEncoding};
use crate::runtime::invocation::Invocation;
use crate::runtime::value::{Number, OpaqueValue, Slot, Value};
use thiserror::Error;

/// Errors that can occur during marshalling
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MarshalError {
    /// Encoding has no computable size, so its bytes cannot be copied
    #[error("Cannot determine size of type encoding {0}")]
    UnknownLayout(String),

    /// Argument index past the end of the frame
    #[error("Argument index {index} out of range ({count} arguments)")]
    IndexOutOfRange {
        /// Requested index
        index: usize,
        /// Explicit argument count
        count: usize,
    },

    /// Value or slot kind does not match the encoding
    #[error("Type mismatch: expected {expected}, got {got}")]
    TypeMismatch {
        /// Encoding that was expected
        expected: String,
        /// Kind that was found
        got: &'static str,
    },
}

fn mismatch(encoding: &TypeEncoding, got: &'static str) -> MarshalError {
    MarshalError::TypeMismatch {
        expected: encoding.to_string(),
        got,
    }
}

/// Decode one slot into a value according to its encoding
pub fn decode(encoding: &TypeEncoding, slot: &Slot) -> Result<Value, MarshalError> {
    match (encoding.kind(), slot) {
        (ArgKind::Void, _) => Ok(Value::Void),
        (ArgKind::Object, Slot::Object(obj)) => Ok(Value::Object(obj.clone())),
        (ArgKind::Class, Slot::Class(class)) => Ok(Value::Class(class.clone())),
        (ArgKind::Selector, Slot::Selector(sel)) => Ok(Value::Selector(sel.clone())),
        (ArgKind::Opaque(None), _) => Err(MarshalError::UnknownLayout(encoding.to_string())),
        (ArgKind::Opaque(Some(layout)), Slot::Bytes(bytes)) => {
            if bytes.len() != layout.size {
                return Err(mismatch(encoding, "bytes"));
            }
            Ok(Value::Opaque(OpaqueValue::new(encoding.clone(), bytes.clone())))
        }
        (kind, Slot::Bytes(bytes)) if kind.is_numeric() => Number::from_le_bytes(encoding, bytes)
            .map(Value::Number)
            .ok_or_else(|| mismatch(encoding, "bytes")),
        (_, slot) => Err(mismatch(encoding, slot.type_name())),
    }
}

/// Encode a value into a slot according to the slot's encoding
///
/// Numbers are coerced to the slot's width; opaque values must carry
/// exactly as many bytes as the encoding occupies.
pub fn encode(encoding: &TypeEncoding, value: &Value) -> Result<Slot, MarshalError> {
    match (encoding.kind(), value) {
        (ArgKind::Void, _) => Ok(Slot::Bytes(Vec::new())),
        (ArgKind::Object, Value::Object(obj)) => Ok(Slot::Object(obj.clone())),
        (ArgKind::Class, Value::Class(class)) => Ok(Slot::Class(class.clone())),
        (ArgKind::Selector, Value::Selector(sel)) => Ok(Slot::Selector(sel.clone())),
        (ArgKind::Opaque(None), _) => Err(MarshalError::UnknownLayout(encoding.to_string())),
        (ArgKind::Opaque(Some(layout)), Value::Opaque(opaque)) => {
            if opaque.bytes().len() != layout.size {
                return Err(mismatch(encoding, "opaque"));
            }
            Ok(Slot::Bytes(opaque.bytes().to_vec()))
        }
        (kind, Value::Number(n)) if kind.is_numeric() => n
            .coerce(encoding)
            .map(|n| Slot::Bytes(n.to_le_bytes()))
            .ok_or_else(|| mismatch(encoding, n.type_name())),
        (_, value) => Err(mismatch(encoding, value.type_name())),
    }
}

/// Zero-initialized slot for an encoding
pub fn zeroed(encoding: &TypeEncoding) -> Result<Slot, MarshalError> {
    match encoding.kind() {
        ArgKind::Object => Ok(Slot::Object(None)),
        ArgKind::Class => Ok(Slot::Class(None)),
        ArgKind::Selector => Ok(Slot::Selector(None)),
        ArgKind::Void => Ok(Slot::Bytes(Vec::new())),
        _ => encoding
            .layout()
            .map(|layout| Slot::Bytes(vec![0; layout.size]))
            .ok_or_else(|| MarshalError::UnknownLayout(encoding.to_string())),
    }
}

/// Zero value of an encoding, used as the default return value of a frame
///
/// Encodings without a known layout produce an empty opaque value.
pub fn zero_value(encoding: &TypeEncoding) -> Value {
    match encoding.kind() {
        ArgKind::Void => Value::Void,
        ArgKind::Object => Value::Object(None),
        ArgKind::Class => Value::Class(None),
        ArgKind::Selector => Value::Selector(None),
        kind if kind.is_numeric() => Number::U64(0)
            .coerce(encoding)
            .map(Value::Number)
            .unwrap_or_default(),
        _ => {
            let size = encoding.layout().map_or(0, |layout| layout.size);
            Value::Opaque(OpaqueValue::new(encoding.clone(), vec![0; size]))
        }
    }
}

/// Decode every explicit argument of an in-flight invocation, in order
pub fn extract_arguments(invocation: &Invocation) -> Result<Vec<Value>, MarshalError> {
    (0..invocation.argument_count())
        .map(|index| extract_argument(invocation, index))
        .collect()
}

/// Decode the explicit argument at `index` (0-based, receiver and selector excluded)
pub fn extract_argument(invocation: &Invocation, index: usize) -> Result<Value, MarshalError> {
    let count = invocation.argument_count();
    let (encoding, slot) = invocation
        .signature()
        .explicit_arguments()
        .get(index)
        .zip(invocation.slot(index))
        .ok_or(MarshalError::IndexOutOfRange { index, count })?;
    decode(encoding, slot)
}

/// Write a value back into the explicit argument slot at `index`
pub fn reinject(invocation: &mut Invocation, value: &Value, index: usize) -> Result<(), MarshalError> {
    let count = invocation.argument_count();
    let encoding = invocation
        .signature()
        .explicit_arguments()
        .get(index)
        .ok_or(MarshalError::IndexOutOfRange { index, count })?;
    let slot = encode(encoding, value)?;
    invocation.set_slot(index, slot)
}
