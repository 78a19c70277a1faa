//! In-flight invocations and message dispatch

use super::class::{Class, Imp};
use super::encoding::Signature;
use super::object::Receiver;
use super::selector::{Selector, FORWARD_INVOCATION};
use super::value::{Slot, Value};
use super::{RuntimeError, RuntimeResult};
use crate::marshal::{self, MarshalError};

/// A message captured as data: receiver, selector, argument frame, and
/// return value slot
///
/// Forwarding handlers receive the invocation by mutable reference and may
/// rewrite any part of it before (re)dispatching.
#[derive(Debug, Clone)]
pub struct Invocation {
    target: Receiver,
    selector: Selector,
    signature: Signature,
    arguments: Vec<Slot>,
    return_value: Value,
}

impl Invocation {
    /// Create an invocation with the signature the receiver declares for `selector`
    pub fn new(target: Receiver, selector: Selector) -> RuntimeResult<Self> {
        let isa = target.isa();
        let method = isa
            .instance_method(&selector)
            .ok_or_else(|| unrecognized(&selector, &isa))?;
        Self::with_signature(target, selector, method.types().clone())
    }

    /// Create an invocation with an explicit signature and zeroed arguments
    pub fn with_signature(target: Receiver, selector: Selector, signature: Signature) -> RuntimeResult<Self> {
        let arguments = signature
            .explicit_arguments()
            .iter()
            .map(marshal::zeroed)
            .collect::<Result<Vec<_>, MarshalError>>()?;
        let return_value = marshal::zero_value(signature.return_type());
        Ok(Self {
            target,
            selector,
            signature,
            arguments,
            return_value,
        })
    }

    /// Receiver
    pub fn target(&self) -> &Receiver {
        &self.target
    }

    /// Replace the receiver
    pub fn set_target(&mut self, target: Receiver) {
        self.target = target;
    }

    /// Selector being sent
    pub fn selector(&self) -> &Selector {
        &self.selector
    }

    /// Replace the selector (the frame layout is kept)
    pub fn set_selector(&mut self, selector: Selector) {
        self.selector = selector;
    }

    /// Frame signature
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Number of explicit arguments
    pub fn argument_count(&self) -> usize {
        self.arguments.len()
    }

    /// Raw explicit argument slot
    pub fn slot(&self, index: usize) -> Option<&Slot> {
        self.arguments.get(index)
    }

    /// Overwrite a raw explicit argument slot
    pub fn set_slot(&mut self, index: usize, slot: Slot) -> Result<(), MarshalError> {
        let count = self.arguments.len();
        let target = self
            .arguments
            .get_mut(index)
            .ok_or(MarshalError::IndexOutOfRange { index, count })?;
        *target = slot;
        Ok(())
    }

    /// Decode the explicit argument at `index`
    pub fn argument(&self, index: usize) -> RuntimeResult<Value> {
        Ok(marshal::extract_argument(self, index)?)
    }

    /// Decode every explicit argument
    pub fn arguments(&self) -> RuntimeResult<Vec<Value>> {
        Ok(marshal::extract_arguments(self)?)
    }

    /// Encode `value` into the explicit argument at `index`
    pub fn set_argument(&mut self, index: usize, value: &Value) -> RuntimeResult<()> {
        Ok(marshal::reinject(self, value, index)?)
    }

    /// Current return value
    pub fn return_value(&self) -> &Value {
        &self.return_value
    }

    /// Overwrite the return value
    pub fn set_return_value(&mut self, value: Value) {
        self.return_value = value;
    }

    /// Take the return value, leaving `Value::Void`
    pub fn take_return_value(&mut self) -> Value {
        std::mem::take(&mut self.return_value)
    }

    /// Dispatch this invocation to its receiver
    pub fn invoke(&mut self) -> RuntimeResult<()> {
        dispatch(self)
    }
}

fn unrecognized(selector: &Selector, class: &Class) -> RuntimeError {
    RuntimeError::UnrecognizedSelector {
        selector: selector.to_string(),
        class: class.name().to_string(),
    }
}

/// Send `selector` to `receiver` with explicit arguments
///
/// Arguments are encoded according to the receiver's declared signature and
/// must match it in number.
pub fn send(receiver: &Receiver, selector: &Selector, args: &[Value]) -> RuntimeResult<Value> {
    let mut invocation = Invocation::new(receiver.clone(), selector.clone())?;
    if args.len() != invocation.argument_count() {
        return Err(RuntimeError::ArgumentCount {
            selector: selector.to_string(),
            expected: invocation.argument_count(),
            got: args.len(),
        });
    }
    for (index, arg) in args.iter().enumerate() {
        invocation.set_argument(index, arg)?;
    }
    invocation.invoke()?;
    Ok(invocation.take_return_value())
}

/// Dispatch an invocation through its receiver's method tables
///
/// A native implementation runs directly and its result becomes the return
/// value. A method marked for forwarding, or a selector with no
/// implementation at all, is handed to the receiver's `forwardInvocation:`
/// handler. Implementations are cloned out of the tables before running, so
/// bodies are free to mutate classes.
pub fn dispatch(invocation: &mut Invocation) -> RuntimeResult<()> {
    let isa = invocation.target().isa();
    let imp = isa
        .instance_method(invocation.selector())
        .map(|method| method.imp().clone());

    match imp {
        Some(Imp::Native(body)) => {
            let value = body(&*invocation)?;
            invocation.set_return_value(value);
            Ok(())
        }
        Some(Imp::Forwarder(handler)) => handler(invocation),
        Some(Imp::Forward) | None => forward(&isa, invocation),
    }
}

fn forward(isa: &Class, invocation: &mut Invocation) -> RuntimeResult<()> {
    let handler = isa
        .instance_method(&FORWARD_INVOCATION)
        .and_then(|method| match method.imp() {
            Imp::Forwarder(handler) => Some(handler.clone()),
            _ => None,
        });

    match handler {
        Some(handler) => handler(invocation),
        None => Err(unrecognized(invocation.selector(), isa)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::class::Method;
    use crate::runtime::object::Object;
    use crate::runtime::Runtime;

    fn adder(runtime: &Runtime) -> Class {
        let class = runtime.define_class("Adder", None).unwrap();
        class
            .define_method("add:to:", "q@:iq", |inv| {
                let a = inv.argument(0)?.as_i64().unwrap_or_default();
                let b = inv.argument(1)?.as_i64().unwrap_or_default();
                Ok(Value::from(a + b))
            })
            .unwrap();
        class
    }

    #[test]
    fn test_send_native() {
        let runtime = Runtime::new();
        let obj = Object::new(&adder(&runtime));
        let result = obj
            .send(&Selector::new("add:to:"), &[Value::from(2i32), Value::from(40i64)])
            .unwrap();
        assert_eq!(result, Value::from(42i64));
    }

    #[test]
    fn test_send_unrecognized() {
        let runtime = Runtime::new();
        let obj = Object::new(&adder(&runtime));
        let err = obj.send(&Selector::new("missing"), &[]).unwrap_err();
        assert!(matches!(err, RuntimeError::UnrecognizedSelector { ref class, .. } if class == "Adder"));
    }

    #[test]
    fn test_send_argument_count() {
        let runtime = Runtime::new();
        let obj = Object::new(&adder(&runtime));
        let err = obj.send(&Selector::new("add:to:"), &[Value::from(1i32)]).unwrap_err();
        assert!(matches!(err, RuntimeError::ArgumentCount { expected: 2, got: 1, .. }));
    }

    #[test]
    fn test_forward_marker_routes_to_handler() {
        let runtime = Runtime::new();
        let class = adder(&runtime);
        let sel = Selector::new("add:to:");
        let types = class.own_method(&sel).unwrap().types().clone();
        class.replace_method(&sel, Imp::Forward, types);
        class
            .add_method(Method::new(
                FORWARD_INVOCATION.clone(),
                Imp::forwarder(|inv| {
                    inv.set_return_value(Value::from(-1i64));
                    Ok(())
                }),
                Signature::forward_invocation(),
            ))
            .unwrap();

        let obj = Object::new(&class);
        let result = obj.send(&sel, &[Value::from(1i32), Value::from(1i64)]).unwrap();
        assert_eq!(result, Value::from(-1i64));
    }

    #[test]
    fn test_forward_without_handler_fails() {
        let runtime = Runtime::new();
        let class = adder(&runtime);
        let sel = Selector::new("add:to:");
        let types = class.own_method(&sel).unwrap().types().clone();
        class.replace_method(&sel, Imp::Forward, types);

        let obj = Object::new(&class);
        let err = obj.send(&sel, &[Value::from(1i32), Value::from(1i64)]).unwrap_err();
        assert!(matches!(err, RuntimeError::UnrecognizedSelector { .. }));
    }

    #[test]
    fn test_class_message() {
        let runtime = Runtime::new();
        let class = runtime.define_class("Factory", None).unwrap();
        class
            .define_class_method("count", "i@:", |_| Ok(Value::from(7i32)))
            .unwrap();
        let receiver = Receiver::Class(class);
        assert_eq!(receiver.send(&Selector::new("count"), &[]).unwrap(), Value::from(7i32));
    }

    #[test]
    fn test_return_value_defaults_to_zero() {
        let runtime = Runtime::new();
        let obj = Object::new(&adder(&runtime));
        let inv = Invocation::new(Receiver::Object(obj), Selector::new("add:to:")).unwrap();
        assert_eq!(inv.return_value(), &Value::from(0i64));
        assert_eq!(inv.argument_count(), 2);
    }
}
