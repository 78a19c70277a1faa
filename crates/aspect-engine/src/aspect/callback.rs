//! Interceptor callbacks and the call context they receive
//!
//! A callback is an opaque body plus the signature it declares. The
//! signature follows the layout of a method's: slot 0 is the callback
//! itself, slot 1 the call context, and every later slot lines up with the
//! intercepted method's explicit argument of the same position. The engine
//! checks that layout against the method at registration time.

use crate::marshal;
use crate::runtime::{
    Class, Invocation, Object, Receiver, RuntimeError, RuntimeResult, Selector, Signature, Value,
};
use std::cell::RefCell;
use std::fmt;
use std::sync::Arc;

/// Body of a callback: the call context plus the decoded arguments it declared
pub type CallbackFn = dyn Fn(&CallContext<'_>, &[Value]) -> RuntimeResult<()> + Send + Sync;

/// Interceptor callback
#[derive(Clone)]
pub struct Callback {
    signature: Option<Signature>,
    body: Arc<CallbackFn>,
}

impl Callback {
    /// Create a callback with an explicit signature
    pub fn new<F>(signature: Signature, body: F) -> Self
    where
        F: Fn(&CallContext<'_>, &[Value]) -> RuntimeResult<()> + Send + Sync + 'static,
    {
        Self {
            signature: Some(signature),
            body: Arc::new(body),
        }
    }

    /// Create a callback from a type-encoding string
    ///
    /// A malformed encoding leaves the callback without a signature, which
    /// registration rejects.
    pub fn from_encoding<F>(types: &str, body: F) -> Self
    where
        F: Fn(&CallContext<'_>, &[Value]) -> RuntimeResult<()> + Send + Sync + 'static,
    {
        Self {
            signature: Signature::parse(types).ok(),
            body: Arc::new(body),
        }
    }

    /// Create a callback that declares no signature
    pub fn unsigned<F>(body: F) -> Self
    where
        F: Fn(&CallContext<'_>, &[Value]) -> RuntimeResult<()> + Send + Sync + 'static,
    {
        Self {
            signature: None,
            body: Arc::new(body),
        }
    }

    /// Callback taking only the call context
    pub fn context<F, R>(body: F) -> Self
    where
        F: Fn(&CallContext<'_>) -> R + Send + Sync + 'static,
        R: CallbackOutput,
    {
        Self::from_encoding("v@?@", move |ctx: &CallContext<'_>, _: &[Value]| {
            body(ctx).into_result()
        })
    }

    /// Callback taking the call context and the first method argument
    pub fn args1<A, F, R>(body: F) -> Self
    where
        A: ArgType,
        F: Fn(&CallContext<'_>, A) -> R + Send + Sync + 'static,
        R: CallbackOutput,
    {
        let types = format!("v@?@{}", A::ENCODING);
        Self::from_encoding(&types, move |ctx: &CallContext<'_>, args: &[Value]| {
            body(ctx, typed(args, 0)?).into_result()
        })
    }

    /// Callback taking the call context and the first two method arguments
    pub fn args2<A, B, F, R>(body: F) -> Self
    where
        A: ArgType,
        B: ArgType,
        F: Fn(&CallContext<'_>, A, B) -> R + Send + Sync + 'static,
        R: CallbackOutput,
    {
        let types = format!("v@?@{}{}", A::ENCODING, B::ENCODING);
        Self::from_encoding(&types, move |ctx: &CallContext<'_>, args: &[Value]| {
            body(ctx, typed(args, 0)?, typed(args, 1)?).into_result()
        })
    }

    /// Callback taking the call context and the first three method arguments
    pub fn args3<A, B, C, F, R>(body: F) -> Self
    where
        A: ArgType,
        B: ArgType,
        C: ArgType,
        F: Fn(&CallContext<'_>, A, B, C) -> R + Send + Sync + 'static,
        R: CallbackOutput,
    {
        let types = format!("v@?@{}{}{}", A::ENCODING, B::ENCODING, C::ENCODING);
        Self::from_encoding(&types, move |ctx: &CallContext<'_>, args: &[Value]| {
            body(ctx, typed(args, 0)?, typed(args, 1)?, typed(args, 2)?).into_result()
        })
    }

    /// Declared signature, if recoverable
    pub fn signature(&self) -> Option<&Signature> {
        self.signature.as_ref()
    }

    /// Run the callback against an in-flight call
    ///
    /// Only as many arguments as the callback declares are decoded, and none
    /// at all for callbacks that take just the context.
    pub fn call(&self, ctx: &CallContext<'_>) -> RuntimeResult<()> {
        let wanted = self.signature.as_ref().map_or(0, Signature::explicit_count);
        let args = if wanted > 0 {
            let mut args = ctx.arguments()?;
            args.truncate(wanted);
            args
        } else {
            Vec::new()
        };
        (self.body)(ctx, &args)
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.signature {
            Some(signature) => write!(f, "Callback({})", signature),
            None => f.write_str("Callback(?)"),
        }
    }
}

fn typed<T: ArgType>(args: &[Value], index: usize) -> RuntimeResult<T> {
    args.get(index).and_then(T::from_value).ok_or_else(|| {
        RuntimeError::Interceptor(format!(
            "argument {} is not of type {}",
            index,
            T::ENCODING
        ))
    })
}

/// Rust types a typed callback argument can be decoded into
pub trait ArgType: Sized {
    /// Type encoding declared for this argument
    const ENCODING: &'static str;

    /// Extract from a decoded value
    fn from_value(value: &Value) -> Option<Self>;
}

macro_rules! numeric_arg_type {
    ($($ty:ty => $variant:ident, $encoding:literal);* $(;)?) => {
        $(
            impl ArgType for $ty {
                const ENCODING: &'static str = $encoding;

                fn from_value(value: &Value) -> Option<Self> {
                    match value.as_number()? {
                        crate::runtime::Number::$variant(v) => Some(v),
                        _ => None,
                    }
                }
            }
        )*
    };
}

numeric_arg_type! {
    i8 => I8, "c";
    i16 => I16, "s";
    i32 => I32, "i";
    i64 => I64, "q";
    u8 => U8, "C";
    u16 => U16, "S";
    u32 => U32, "I";
    u64 => U64, "Q";
    f32 => F32, "f";
    f64 => F64, "d";
    bool => Bool, "B";
}

impl ArgType for Object {
    const ENCODING: &'static str = "@";

    fn from_value(value: &Value) -> Option<Self> {
        value.as_object().cloned()
    }
}

impl ArgType for Option<Object> {
    const ENCODING: &'static str = "@";

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Object(obj) => Some(obj.clone()),
            _ => None,
        }
    }
}

impl ArgType for Class {
    const ENCODING: &'static str = "#";

    fn from_value(value: &Value) -> Option<Self> {
        value.as_class().cloned()
    }
}

impl ArgType for Selector {
    const ENCODING: &'static str = ":";

    fn from_value(value: &Value) -> Option<Self> {
        value.as_selector().cloned()
    }
}

/// Return types accepted from typed callbacks
pub trait CallbackOutput {
    /// Convert into the callback result
    fn into_result(self) -> RuntimeResult<()>;
}

impl CallbackOutput for () {
    fn into_result(self) -> RuntimeResult<()> {
        Ok(())
    }
}

impl CallbackOutput for RuntimeResult<()> {
    fn into_result(self) -> RuntimeResult<()> {
        self
    }
}

/// Interceptor view of an in-flight call
///
/// Arguments are decoded on request. The context also lets an interceptor
/// rewrite arguments, replace the return value, or run the preserved
/// original implementation.
pub struct CallContext<'a> {
    invocation: RefCell<&'a mut Invocation>,
    alias: Selector,
}

impl<'a> CallContext<'a> {
    pub(crate) fn new(invocation: &'a mut Invocation, alias: Selector) -> Self {
        Self {
            invocation: RefCell::new(invocation),
            alias,
        }
    }

    /// Receiver of the call
    pub fn receiver(&self) -> Receiver {
        self.invocation.borrow().target().clone()
    }

    /// Receiving object, if the call targets an instance
    pub fn object(&self) -> Option<Object> {
        self.invocation.borrow().target().as_object().cloned()
    }

    /// Intercepted selector
    pub fn selector(&self) -> Selector {
        self.invocation.borrow().selector().clone()
    }

    /// Number of explicit arguments of the call
    pub fn argument_count(&self) -> usize {
        self.invocation.borrow().argument_count()
    }

    /// Decode every explicit argument
    pub fn arguments(&self) -> RuntimeResult<Vec<Value>> {
        Ok(marshal::extract_arguments(&self.invocation.borrow())?)
    }

    /// Decode the explicit argument at `index`
    pub fn argument(&self, index: usize) -> RuntimeResult<Value> {
        Ok(marshal::extract_argument(&self.invocation.borrow(), index)?)
    }

    /// Overwrite the explicit argument at `index` for the rest of the call
    pub fn set_argument(&self, index: usize, value: &Value) -> RuntimeResult<()> {
        Ok(marshal::reinject(&mut self.invocation.borrow_mut(), value, index)?)
    }

    /// Current return value of the call
    pub fn return_value(&self) -> Value {
        self.invocation.borrow().return_value().clone()
    }

    /// Replace the return value seen by the caller
    pub fn set_return_value(&self, value: Value) {
        self.invocation.borrow_mut().set_return_value(value);
    }

    /// Run the preserved original implementation with the current arguments
    pub fn invoke_original(&self) -> RuntimeResult<Value> {
        let mut invocation = self.invocation.borrow_mut();
        let selector = invocation.selector().clone();
        invocation.set_selector(self.alias.clone());
        let result = invocation.invoke();
        invocation.set_selector(selector);
        result?;
        Ok(invocation.return_value().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_signatures() {
        let cb = Callback::context(|_| {});
        assert_eq!(cb.signature().unwrap().to_string(), "v@?@");
        assert_eq!(cb.signature().unwrap().explicit_count(), 0);

        let cb = Callback::args2(|_, _: i32, _: Object| {});
        assert_eq!(cb.signature().unwrap().to_string(), "v@?@i@");
        assert_eq!(cb.signature().unwrap().explicit_count(), 2);

        let cb = Callback::args3(|_, _: f64, _: bool, _: Selector| -> RuntimeResult<()> { Ok(()) });
        assert_eq!(cb.signature().unwrap().to_string(), "v@?@dB:");
    }

    #[test]
    fn test_malformed_encoding_drops_signature() {
        let cb = Callback::from_encoding("v@?{Broken", |_, _| Ok(()));
        assert!(cb.signature().is_none());
        assert!(Callback::unsigned(|_, _| Ok(())).signature().is_none());
    }

    #[test]
    fn test_typed_argument_conversion() {
        assert_eq!(i32::from_value(&Value::from(5i32)), Some(5));
        assert_eq!(i32::from_value(&Value::from(5i64)), None);
        assert_eq!(bool::from_value(&Value::from(true)), Some(true));
        assert_eq!(Option::<Object>::from_value(&Value::nil()), Some(None));
        assert!(Object::from_value(&Value::nil()).is_none());

        let err = typed::<u8>(&[Value::from(1.0f32)], 0).unwrap_err();
        assert!(matches!(err, RuntimeError::Interceptor(_)));
    }
}
