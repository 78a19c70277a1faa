//! Dynamic message-dispatch object runtime
//!
//! Objects carry a mutable dispatch type (`isa`). Messages are resolved by
//! selector through per-class method tables, and unresolved messages are
//! captured as an [`Invocation`] and handed to the receiver's
//! `forwardInvocation:` handler.

pub mod class;
pub mod class_table;
pub mod encoding;
pub mod invocation;
pub mod object;
pub mod selector;
pub mod value;

pub use class::{Class, ClassId, ForwardFn, Imp, Method, MethodFn};
pub use class_table::Runtime;
pub use encoding::{ArgKind, EncodingError, Layout, Signature, TypeEncoding};
pub use invocation::{dispatch, send, Invocation};
pub use object::{Object, ObjectId, Receiver, WeakObject};
pub use selector::{Selector, FORWARD_INVOCATION};
pub use value::{Number, OpaqueValue, Slot, Value};

use crate::marshal::MarshalError;
use thiserror::Error;

/// Runtime errors
#[derive(Debug, Clone, Error)]
pub enum RuntimeError {
    /// No implementation and no forwarding handler for a selector
    #[error("Unrecognized selector {selector} sent to {class}")]
    UnrecognizedSelector {
        /// Selector that was sent
        selector: String,
        /// Dispatch type of the receiver
        class: String,
    },

    /// Class name already registered
    #[error("Class already exists: {0}")]
    ClassExists(String),

    /// Method already present in a class's own table
    #[error("Method {selector} already exists on {class}")]
    MethodExists {
        /// Selector of the method
        selector: String,
        /// Class name
        class: String,
    },

    /// Wrong number of arguments for a message
    #[error("{selector} expects {expected} arguments, got {got}")]
    ArgumentCount {
        /// Selector that was sent
        selector: String,
        /// Declared explicit argument count
        expected: usize,
        /// Supplied argument count
        got: usize,
    },

    /// Argument marshalling failed
    #[error("Marshal error: {0}")]
    Marshal(#[from] MarshalError),

    /// Malformed type encoding
    #[error("Encoding error: {0}")]
    Encoding(#[from] EncodingError),

    /// Interceptor callback failed
    #[error("Interceptor failed: {0}")]
    Interceptor(String),

    /// Method body failed
    #[error("Method failed: {0}")]
    Failed(String),
}

/// Result type for runtime operations
pub type RuntimeResult<T> = Result<T, RuntimeError>;
