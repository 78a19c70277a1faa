//! Dispatch redirection
//!
//! Instance-level interception moves the object onto a private shadow
//! subclass of its dispatch type, shared by every object of that type.
//! The intercepted method's entry on the shadow is replaced with the
//! forwarding marker, so calls reach the shadow's `forwardInvocation:`
//! handler (the trampoline), and the original body is kept under the alias
//! selector. Type-level interception does the same directly on the shared
//! method table of a class or metaclass.

use super::trampoline;
use super::{AspectError, AspectResult, EngineShared};
use crate::runtime::{Class, ClassId, Imp, Method, Object, Selector, Signature, FORWARD_INVOCATION};
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::Arc;
use tracing::debug;

/// Shadow class bookkeeping
#[derive(Debug, Clone)]
pub struct ShadowRecord {
    /// Generated class
    pub shadow: Class,
    /// Dispatch type the shadow was derived from
    pub parent: Class,
    /// Type reported by introspection on shadowed objects
    pub apparent: Class,
}

/// Everything redirection has done so far; only touched under the guard
#[derive(Debug, Default)]
pub struct RedirectionState {
    shadows: FxHashMap<ClassId, ShadowRecord>,
    redirected: FxHashSet<(ClassId, Selector)>,
    forwarders: FxHashSet<ClassId>,
}

impl RedirectionState {
    /// Number of shadow classes created
    pub fn shadow_count(&self) -> usize {
        self.shadows.len()
    }

    /// Shadow record for a generated class
    pub fn shadow(&self, id: ClassId) -> Option<&ShadowRecord> {
        self.shadows.get(&id)
    }

    /// Check whether `selector` has been redirected on `class`
    pub fn is_redirected(&self, class: &Class, selector: &Selector) -> bool {
        self.redirected.contains(&(class.id(), selector.clone()))
    }

    /// Check whether `forwardInvocation:` on `class` resolves to the trampoline
    pub fn routes_to_trampoline(&self, class: &Class) -> bool {
        class
            .ancestors()
            .find(|c| c.has_own_method(&FORWARD_INVOCATION))
            .map_or(false, |owner| self.forwarders.contains(&owner.id()))
    }
}

/// Verify that `selector` can be redirected on a type, without mutating anything
///
/// A method that already forwards is only acceptable when the forwarding
/// was set up by interception (the alias is reachable); hooking the
/// forwarding handler itself is never allowed.
pub(crate) fn check_hookable(shared: &EngineShared, class: &Class, selector: &Selector) -> AspectResult<()> {
    let unsupported = |reason: &str| AspectError::Unsupported {
        selector: selector.to_string(),
        reason: reason.to_string(),
    };

    if *selector == *FORWARD_INVOCATION {
        return Err(unsupported("the forwarding handler cannot be intercepted"));
    }
    let method = class
        .instance_method(selector)
        .ok_or_else(|| unsupported("not implemented by the dispatch type"))?;
    match method.imp() {
        Imp::Native(_) => Ok(()),
        Imp::Forward if class.instance_method(&shared.options.alias(selector)).is_some() => Ok(()),
        Imp::Forward => Err(unsupported("already routed through unrelated forwarding")),
        Imp::Forwarder(_) => Err(unsupported("the method is a forwarding handler")),
    }
}

/// Move `object` onto its shadow class, creating the class on first use
///
/// Returns the shadow. Objects already on a shadow stay there; every object
/// of the same dispatch type shares one shadow.
pub(crate) fn ensure_redirected(
    shared: &Arc<EngineShared>,
    state: &mut RedirectionState,
    object: &Object,
) -> AspectResult<Class> {
    let actual = object.isa();
    if shared.options.is_shadow_name(actual.name()) {
        return Ok(actual);
    }

    let apparent = object.class();
    let name = format!("{}{}", shared.options.shadow_prefix, actual.name());
    let shadow = match shared.runtime.class_named(&name) {
        Some(existing) if state.shadows.contains_key(&existing.id()) => existing,
        Some(_) => return Err(AspectError::ShadowAllocationFailed(name)),
        None => create_shadow(shared, state, &name, &actual, &apparent)?,
    };

    object.set_isa(&shadow);
    debug!(
        object = object.id().as_u64(),
        shadow = %shadow.name(),
        "object moved onto shadow class"
    );
    Ok(shadow)
}

fn create_shadow(
    shared: &Arc<EngineShared>,
    state: &mut RedirectionState,
    name: &str,
    parent: &Class,
    apparent: &Class,
) -> AspectResult<Class> {
    let shadow = shared.runtime.allocate_class(name, Some(parent));
    install_forwarder(shared, state, &shadow);
    shadow.set_introspection_class(Some(apparent.clone()));
    shared
        .runtime
        .register_class(&shadow)
        .map_err(|_| AspectError::ShadowAllocationFailed(name.to_string()))?;

    state.shadows.insert(
        shadow.id(),
        ShadowRecord {
            shadow: shadow.clone(),
            parent: parent.clone(),
            apparent: apparent.clone(),
        },
    );
    debug!(shadow = %name, parent = %parent.name(), "created shadow class");
    Ok(shadow)
}

/// Install the trampoline as `class`'s `forwardInvocation:` handler
///
/// A handler the class already resolved to is kept under the forwarder
/// alias, unless it is the trampoline itself.
pub(crate) fn install_forwarder(shared: &Arc<EngineShared>, state: &mut RedirectionState, class: &Class) {
    let forwarder_alias = Selector::new(&shared.options.forwarder_alias);
    let previous = class.instance_method(&FORWARD_INVOCATION);
    if let Some(previous) = previous {
        if !state.routes_to_trampoline(class) && !class.has_own_method(&forwarder_alias) {
            let preserved = Method::new(
                forwarder_alias.clone(),
                previous.imp().clone(),
                previous.types().clone(),
            );
            if let Err(err) = class.add_method(preserved) {
                panic!(
                    "cannot preserve forwardInvocation: of {} under {}: {}",
                    class.name(),
                    forwarder_alias,
                    err
                );
            }
        }
    }

    class.replace_method(
        &FORWARD_INVOCATION,
        trampoline::forwarder(shared),
        Signature::forward_invocation(),
    );
    state.forwarders.insert(class.id());
    debug!(class = %class.name(), "installed forwarding trampoline");
}

/// Route `selector` on `class` through the trampoline
///
/// The current implementation is kept under the alias selector exactly
/// once; repeated calls are no-ops.
///
/// # Panics
///
/// Panics if the alias slot already holds a different implementation or
/// the method forwards without a reachable alias. Continuing would route
/// calls to an implementation nobody can reach.
pub(crate) fn redirect_method(
    shared: &EngineShared,
    state: &mut RedirectionState,
    class: &Class,
    selector: &Selector,
) -> AspectResult<()> {
    let key = (class.id(), selector.clone());
    if state.redirected.contains(&key) {
        return Ok(());
    }

    let alias = shared.options.alias(selector);
    let method = class
        .instance_method(selector)
        .ok_or_else(|| AspectError::UnrecognizedMethod {
            selector: selector.to_string(),
            class: class.name().to_string(),
        })?;

    match method.imp() {
        Imp::Native(_) => {
            match class.own_method(&alias) {
                Some(existing) if !existing.imp().same_as(method.imp()) => panic!(
                    "{} on {} is occupied by an unrelated implementation",
                    alias,
                    class.name()
                ),
                Some(_) => {}
                None => {
                    let preserved = Method::new(alias.clone(), method.imp().clone(), method.types().clone());
                    if let Err(err) = class.add_method(preserved) {
                        panic!("cannot preserve {} on {}: {}", selector, class.name(), err);
                    }
                }
            }
            class.replace_method(selector, Imp::Forward, method.types().clone());
        }
        Imp::Forward => {
            if class.instance_method(&alias).is_none() {
                panic!(
                    "{} on {} forwards through machinery unrelated to interception",
                    selector,
                    class.name()
                );
            }
        }
        Imp::Forwarder(_) => {
            return Err(AspectError::Unsupported {
                selector: selector.to_string(),
                reason: "the method is a forwarding handler".to_string(),
            })
        }
    }

    state.redirected.insert(key);
    debug!(class = %class.name(), selector = %selector, "redirected method to trampoline");
    Ok(())
}

/// Redirect `selector` on a shared class or metaclass table
pub(crate) fn redirect_type(
    shared: &Arc<EngineShared>,
    state: &mut RedirectionState,
    class: &Class,
    selector: &Selector,
) -> AspectResult<()> {
    if !state.routes_to_trampoline(class) {
        install_forwarder(shared, state, class);
    }
    redirect_method(shared, state, class, selector)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aspect::EngineOptions;
    use crate::runtime::{Runtime, Value};

    fn shared() -> Arc<EngineShared> {
        Arc::new(EngineShared::new(Arc::new(Runtime::new()), EngineOptions::default()))
    }

    fn widget(shared: &EngineShared) -> Class {
        let class = shared.runtime.define_class("Widget", None).unwrap();
        class.define_method("draw", "v@:", |_| Ok(Value::Void)).unwrap();
        class.define_method("size", "i@:", |_| Ok(Value::from(3i32))).unwrap();
        class
    }

    #[test]
    fn test_shadow_created_once_per_type() {
        let shared = shared();
        let class = widget(&shared);
        let a = Object::new(&class);
        let b = Object::new(&class);
        let mut state = RedirectionState::default();

        let shadow_a = ensure_redirected(&shared, &mut state, &a).unwrap();
        let shadow_b = ensure_redirected(&shared, &mut state, &b).unwrap();
        let again = ensure_redirected(&shared, &mut state, &a).unwrap();

        assert_eq!(shadow_a, shadow_b);
        assert_eq!(shadow_a, again);
        assert_eq!(state.shadow_count(), 1);
        assert_eq!(shadow_a.name(), "_Aspect_Widget");
        assert_eq!(shadow_a.superclass(), Some(&class));
        assert_eq!(a.class(), class);
        assert_eq!(a.isa(), shadow_a);
        assert!(state.routes_to_trampoline(&shadow_a));
    }

    #[test]
    fn test_foreign_class_with_shadow_name_is_rejected() {
        let shared = shared();
        let class = widget(&shared);
        shared.runtime.define_class("_Aspect_Widget", None).unwrap();
        let mut state = RedirectionState::default();
        let result = ensure_redirected(&shared, &mut state, &Object::new(&class));
        assert!(matches!(result, Err(AspectError::ShadowAllocationFailed(_))));
    }

    #[test]
    fn test_redirect_method_preserves_original_once() {
        let shared = shared();
        let class = widget(&shared);
        let sel = Selector::new("size");
        let mut state = RedirectionState::default();

        redirect_type(&shared, &mut state, &class, &sel).unwrap();
        redirect_type(&shared, &mut state, &class, &sel).unwrap();

        assert!(state.is_redirected(&class, &sel));
        assert!(class.own_method(&sel).unwrap().imp().is_forward());
        let alias = class.own_method(&Selector::new("aspect_size")).unwrap();
        assert!(matches!(alias.imp(), Imp::Native(_)));
        assert_eq!(alias.types().to_string(), "i@:");
    }

    #[test]
    fn test_check_hookable() {
        let shared = shared();
        let class = widget(&shared);
        assert!(check_hookable(&shared, &class, &Selector::new("draw")).is_ok());
        assert!(check_hookable(&shared, &class, &FORWARD_INVOCATION).is_err());

        // Forwarding set up outside interception
        let sel = Selector::new("draw");
        let types = class.own_method(&sel).unwrap().types().clone();
        class.replace_method(&sel, Imp::Forward, types);
        assert!(matches!(
            check_hookable(&shared, &class, &sel),
            Err(AspectError::Unsupported { .. })
        ));
    }

    #[test]
    fn test_existing_forwarder_is_preserved() {
        let shared = shared();
        let class = widget(&shared);
        class
            .add_method(Method::new(
                FORWARD_INVOCATION.clone(),
                Imp::forwarder(|_| Ok(())),
                Signature::forward_invocation(),
            ))
            .unwrap();
        let mut state = RedirectionState::default();
        install_forwarder(&shared, &mut state, &class);

        let preserved = class
            .own_method(&Selector::new("__aspect_forwardInvocation:"))
            .unwrap();
        assert!(matches!(preserved.imp(), Imp::Forwarder(_)));
        assert!(state.routes_to_trampoline(&class));
    }

    #[test]
    #[should_panic(expected = "forwards through machinery unrelated to interception")]
    fn test_unrelated_forwarding_is_fatal() {
        let shared = shared();
        let class = widget(&shared);
        let sel = Selector::new("draw");
        let types = class.own_method(&sel).unwrap().types().clone();
        class.replace_method(&sel, Imp::Forward, types);
        let mut state = RedirectionState::default();
        let _ = redirect_method(&shared, &mut state, &class, &sel);
    }
}
