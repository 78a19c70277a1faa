//! Call signature lookup and callback compatibility

use super::{AspectError, AspectResult};
use crate::runtime::{ArgKind, Class, Method, Selector, Signature};

/// Find the method a type-level hook on `on_type` applies to
///
/// Instance methods are looked up on the type itself, then class methods on
/// its metaclass. Returns the class whose dispatch chain serves the method
/// along with the method.
pub fn resolve(selector: &Selector, on_type: &Class) -> AspectResult<(Class, Method)> {
    if let Some(method) = on_type.instance_method(selector) {
        return Ok((on_type.clone(), method));
    }
    on_type
        .metaclass()
        .and_then(|meta| meta.instance_method(selector).map(|method| (meta.clone(), method)))
        .ok_or_else(|| AspectError::UnrecognizedMethod {
            selector: selector.to_string(),
            class: on_type.name().to_string(),
        })
}

/// Signature of `selector` on `on_type`
pub fn describe(selector: &Selector, on_type: &Class) -> AspectResult<Signature> {
    resolve(selector, on_type).map(|(_, method)| method.types().clone())
}

/// Check whether a callback can receive the arguments of a method
///
/// Slots line up by position: slot 1 of the callback carries the call
/// context and must be object-kinded, and every later slot must have the
/// same kind as the method's slot at that position. A callback may declare
/// fewer arguments than the method, never more.
pub fn compatible(callback: &Signature, method: &Signature) -> bool {
    let callback_args = callback.arguments();
    let method_args = method.arguments();
    if callback_args.len() > method_args.len() {
        return false;
    }
    if let Some(context) = callback_args.get(1) {
        if context.kind() != ArgKind::Object {
            return false;
        }
    }
    callback_args
        .iter()
        .zip(method_args)
        .skip(2)
        .all(|(a, b)| same_kind(a.kind(), b.kind()))
}

fn same_kind(a: ArgKind, b: ArgKind) -> bool {
    match (a, b) {
        (ArgKind::Opaque(Some(a)), ArgKind::Opaque(Some(b))) => a == b,
        (ArgKind::Opaque(_), ArgKind::Opaque(_)) => false,
        (a, b) => a == b,
    }
}

/// Fail with `SignatureMismatch` unless the callback fits the method
pub fn check_compatible(selector: &Selector, callback: &Signature, method: &Signature) -> AspectResult<()> {
    if compatible(callback, method) {
        Ok(())
    } else {
        Err(AspectError::SignatureMismatch {
            selector: selector.to_string(),
            callback: callback.to_string(),
            method: method.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::Value;

    fn sig(s: &str) -> Signature {
        Signature::parse(s).unwrap()
    }

    #[test]
    fn test_zero_argument_compatibility() {
        assert!(compatible(&sig("v@?"), &sig("v@:")));
        assert!(compatible(&sig("v@?@"), &sig("v@:")));
        assert!(compatible(&sig("v@?@"), &sig("q@:iq")));
    }

    #[test]
    fn test_prefix_match() {
        let method = sig("v@:iq@");
        assert!(compatible(&sig("v@?@i"), &method));
        assert!(compatible(&sig("v@?@iq"), &method));
        assert!(compatible(&sig("v@?@iq@"), &method));
        assert!(!compatible(&sig("v@?@iq@i"), &method));
    }

    #[test]
    fn test_kind_mismatch() {
        let method = sig("v@:iq");
        assert!(!compatible(&sig("v@?@@"), &method));
        assert!(!compatible(&sig("v@?@q"), &method));
        // Context slot must be an object reference
        assert!(!compatible(&sig("v@?i"), &method));
        // Block and object references are the same kind
        assert!(compatible(&sig("v@?@?"), &method));
    }

    #[test]
    fn test_opaque_compared_by_layout() {
        let method = sig("v@:{Point=ff}");
        assert!(compatible(&sig("v@?@{Size=ff}"), &method));
        assert!(compatible(&sig("v@?@[2f]"), &method));
        assert!(!compatible(&sig("v@?@{Wide=dd}"), &method));
        assert!(!compatible(&sig("v@?@{Handle}"), &sig("v@:{Handle}")));
    }

    #[test]
    fn test_resolve_instance_then_class_method() {
        let class = Class::allocate("Widget", None);
        class.define_method("draw", "v@:", |_| Ok(Value::Void)).unwrap();
        class.define_class_method("make", "@@:", |_| Ok(Value::nil())).unwrap();

        let (dispatch, _) = resolve(&Selector::new("draw"), &class).unwrap();
        assert_eq!(dispatch, class);

        let (dispatch, method) = resolve(&Selector::new("make"), &class).unwrap();
        assert_eq!(Some(&dispatch), class.metaclass());
        assert_eq!(method.types().to_string(), "@@:");

        assert_eq!(describe(&Selector::new("draw"), &class).unwrap().to_string(), "v@:");
        assert!(matches!(
            describe(&Selector::new("missing"), &class),
            Err(AspectError::UnrecognizedMethod { .. })
        ));
    }

    #[test]
    fn test_check_compatible_error() {
        let err = check_compatible(&Selector::new("run:"), &sig("v@?@@"), &sig("v@:i")).unwrap_err();
        assert_eq!(
            err,
            AspectError::SignatureMismatch {
                selector: "run:".to_string(),
                callback: "v@?@@".to_string(),
                method: "v@:i".to_string(),
            }
        );
    }
}
