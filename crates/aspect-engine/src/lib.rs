//! Aspect Engine
//!
//! Method interception for a dynamic message-dispatch object runtime:
//! - **Runtime**: classes, objects, selectors and message dispatch with
//!   catch-all forwarding (`runtime` module)
//! - **Marshal**: conversion between call-frame slots and type-erased values
//!   (`marshal` module)
//! - **Aspect**: the interception engine: shadow subclasses, dispatch
//!   redirection, and the trampoline running interceptors (`aspect` module)
//!
//! # Example
//!
//! ```rust,ignore
//! use aspect_engine::{Callback, Engine, Object, Runtime, Selector, Timing, Value};
//! use std::sync::Arc;
//!
//! let runtime = Arc::new(Runtime::new());
//! let greeter = runtime.define_class("Greeter", None)?;
//! greeter.define_method("greet:", "v@:i", |_| Ok(Value::Void))?;
//!
//! let engine = Engine::new(runtime.clone());
//! let obj = Object::new(&greeter);
//! let handle = engine.hook_object(
//!     &obj,
//!     "greet:",
//!     Timing::Before,
//!     Callback::args1(|_ctx, times: i32| println!("greeting {} times", times)),
//! )?;
//!
//! obj.send(&Selector::new("greet:"), &[Value::from(3i32)])?;
//! handle.remove();
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

// ============================================================================
// Core Modules
// ============================================================================

/// Runtime module: classes, objects, selectors, and dispatch
pub mod runtime;

/// Marshal module: argument slot encoding and decoding
pub mod marshal;

/// Aspect module: the interception engine
pub mod aspect;

// ============================================================================
// Re-exports
// ============================================================================

pub use aspect::{
    AspectError, AspectResult, CallContext, Callback, Engine, EngineOptions, RegistrationHandle,
    Target, Timing,
};
pub use marshal::MarshalError;
pub use runtime::{
    Class, Invocation, Number, Object, Receiver, Runtime, RuntimeError, RuntimeResult, Selector,
    Signature, Value,
};
