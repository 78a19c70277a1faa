//! Method interception engine
//!
//! [`Engine::register`] attaches a [`Callback`] to a method of one object or
//! of every instance of a type, to run before, instead of, or after the
//! original body. Registration checks the callback against the method's
//! signature, records the interceptor, and redirects dispatch for the method
//! through the trampoline. All registration work is serialized by one guard
//! per engine; intercepted calls run concurrently without it.

pub mod callback;
pub mod guard;
pub mod handle;
pub mod redirect;
pub mod registry;
pub mod signature;
pub mod trampoline;

pub use callback::{ArgType, CallContext, Callback, CallbackOutput};
pub use guard::Guard;
pub use handle::RegistrationHandle;
pub use redirect::RedirectionState;
pub use registry::{InterceptorId, InterceptorRecord, Owner, Registry, RegistryEntry, ScopeKey};

use crate::runtime::{Class, Method, Object, Runtime, Selector, Signature};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Registration errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AspectError {
    /// Neither the apparent nor the dispatch type implements the method
    #[error("{class} does not respond to {selector}")]
    UnrecognizedMethod {
        /// Requested selector
        selector: String,
        /// Type that was searched
        class: String,
    },

    /// Callback arguments do not line up with the method's
    #[error("Callback signature {callback} is incompatible with {selector} ({method})")]
    SignatureMismatch {
        /// Requested selector
        selector: String,
        /// Callback encoding
        callback: String,
        /// Method encoding
        method: String,
    },

    /// Callback carries no usable signature
    #[error("Callback signature could not be recovered")]
    MissingCallbackSignature,

    /// Shadow class could not be created
    #[error("Failed to allocate shadow class {0}")]
    ShadowAllocationFailed(String),

    /// Method cannot be intercepted safely
    #[error("Cannot intercept {selector}: {reason}")]
    Unsupported {
        /// Requested selector
        selector: String,
        /// Why interception was refused
        reason: String,
    },
}

/// Result type for registration
pub type AspectResult<T> = Result<T, AspectError>;

/// When an interceptor runs relative to the original implementation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Timing {
    /// Before the original
    #[default]
    Before,
    /// In place of the original
    Instead,
    /// After the original
    After,
}

/// What to register an interceptor on
#[derive(Debug, Clone, Copy)]
pub enum Target<'a> {
    /// A single object
    Object(&'a Object),
    /// Every current and future instance of a type (or the type's class methods)
    Type(&'a Class),
}

/// Engine configuration
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Name prefix marking generated shadow classes
    pub shadow_prefix: String,
    /// Prefix of the selector an original implementation is kept under
    pub alias_prefix: String,
    /// Selector a pre-existing `forwardInvocation:` handler is kept under
    pub forwarder_alias: String,
}

impl EngineOptions {
    /// Alias selector for `selector`
    pub fn alias(&self, selector: &Selector) -> Selector {
        selector.prefixed(&self.alias_prefix)
    }

    /// Check whether a class name marks a generated shadow class
    pub fn is_shadow_name(&self, name: &str) -> bool {
        name.starts_with(&self.shadow_prefix)
    }
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            shadow_prefix: "_Aspect_".to_string(),
            alias_prefix: crate::runtime::selector::ALIAS_PREFIX.to_string(),
            forwarder_alias: "__aspect_forwardInvocation:".to_string(),
        }
    }
}

/// State shared between the engine, its handles, and installed trampolines
pub(crate) struct EngineShared {
    pub(crate) runtime: Arc<Runtime>,
    pub(crate) options: EngineOptions,
    pub(crate) guard: Guard<RedirectionState>,
    pub(crate) registry: Registry,
}

impl EngineShared {
    pub(crate) fn new(runtime: Arc<Runtime>, options: EngineOptions) -> Self {
        Self {
            runtime,
            options,
            guard: Guard::default(),
            registry: Registry::new(),
        }
    }
}

/// Interception engine bound to one runtime
///
/// Cloning is cheap; clones share all state.
#[derive(Clone)]
pub struct Engine {
    shared: Arc<EngineShared>,
}

impl Engine {
    /// Create an engine with default options
    pub fn new(runtime: Arc<Runtime>) -> Self {
        Self::with_options(runtime, EngineOptions::default())
    }

    /// Create an engine with custom options
    pub fn with_options(runtime: Arc<Runtime>, options: EngineOptions) -> Self {
        Self {
            shared: Arc::new(EngineShared::new(runtime, options)),
        }
    }

    /// Runtime the engine operates on
    pub fn runtime(&self) -> &Arc<Runtime> {
        &self.shared.runtime
    }

    /// Engine options
    pub fn options(&self) -> &EngineOptions {
        &self.shared.options
    }

    /// Interceptor registry
    pub fn registry(&self) -> &Registry {
        &self.shared.registry
    }

    /// Number of shadow classes created so far
    pub fn shadow_count(&self) -> usize {
        self.shared.guard.perform_locked(|state| state.shadow_count())
    }

    /// Check whether `selector` has been redirected on `class`
    pub fn is_redirected(&self, class: &Class, selector: &Selector) -> bool {
        self.shared
            .guard
            .perform_locked(|state| state.is_redirected(class, selector))
    }

    /// Register an interceptor
    ///
    /// Nothing is mutated unless every check passes: the callback must carry
    /// a signature, the method must exist, the callback must fit the
    /// method's arguments, and the method must be safely redirectable.
    pub fn register(
        &self,
        target: Target<'_>,
        selector: &Selector,
        timing: Timing,
        callback: Callback,
    ) -> AspectResult<RegistrationHandle> {
        let shared = &self.shared;
        shared.guard.perform_locked(|state| {
            let callback_signature = callback
                .signature()
                .cloned()
                .ok_or(AspectError::MissingCallbackSignature)?;

            let handle = match target {
                Target::Object(object) => {
                    let apparent = object.class();
                    let actual = object.isa();
                    let method = apparent
                        .instance_method(selector)
                        .or_else(|| actual.instance_method(selector))
                        .ok_or_else(|| AspectError::UnrecognizedMethod {
                            selector: selector.to_string(),
                            class: apparent.name().to_string(),
                        })?;
                    check_method(shared, &actual, selector, &callback_signature, &method)?;

                    let scope = ScopeKey::Instance(object.id());
                    let key = shared.options.alias(selector);
                    let owner = Owner::Object(object.downgrade());
                    let handle = record(shared, scope, key, selector, owner, timing, callback);
                    let redirected = redirect::ensure_redirected(shared, state, object)
                        .and_then(|shadow| redirect::redirect_method(shared, state, &shadow, selector));
                    rollback_on_error(shared, &handle, redirected)?;
                    handle
                }
                Target::Type(class) => {
                    let (dispatch, method) = signature::resolve(selector, class)?;
                    check_method(shared, &dispatch, selector, &callback_signature, &method)?;

                    let scope = ScopeKey::Type(dispatch.id());
                    let owner = Owner::Type(dispatch.clone());
                    let handle = record(shared, scope, selector.clone(), selector, owner, timing, callback);
                    let redirected = redirect::redirect_type(shared, state, &dispatch, selector);
                    rollback_on_error(shared, &handle, redirected)?;
                    handle
                }
            };

            debug!(
                interceptor = handle.id().as_u64(),
                selector = %selector,
                timing = ?timing,
                "registered interceptor"
            );
            Ok(handle)
        })
    }

    /// Register an interceptor on a single object
    pub fn hook_object(
        &self,
        object: &Object,
        selector: &str,
        timing: Timing,
        callback: Callback,
    ) -> AspectResult<RegistrationHandle> {
        self.register(Target::Object(object), &Selector::new(selector), timing, callback)
    }

    /// Register an interceptor on every instance of a type
    pub fn hook_type(
        &self,
        class: &Class,
        selector: &str,
        timing: Timing,
        callback: Callback,
    ) -> AspectResult<RegistrationHandle> {
        self.register(Target::Type(class), &Selector::new(selector), timing, callback)
    }
}

fn check_method(
    shared: &EngineShared,
    dispatch: &Class,
    selector: &Selector,
    callback: &Signature,
    method: &Method,
) -> AspectResult<()> {
    signature::check_compatible(selector, callback, method.types())?;
    method
        .types()
        .check_redirectable()
        .map_err(|reason| AspectError::Unsupported {
            selector: selector.to_string(),
            reason: reason.to_string(),
        })?;
    redirect::check_hookable(shared, dispatch, selector)
}

fn record(
    shared: &Arc<EngineShared>,
    scope: ScopeKey,
    key: Selector,
    selector: &Selector,
    owner: Owner,
    timing: Timing,
    callback: Callback,
) -> RegistrationHandle {
    let record = Arc::new(InterceptorRecord::new(selector.clone(), owner, timing, callback));
    let id = record.id();
    shared.registry.add(scope, &key, record);
    RegistrationHandle::new(Arc::downgrade(shared), scope, key, id)
}

fn rollback_on_error(
    shared: &EngineShared,
    handle: &RegistrationHandle,
    result: AspectResult<impl Sized>,
) -> AspectResult<()> {
    if result.is_err() {
        shared
            .registry
            .remove(handle.scope(), handle.selector(), handle.id());
    }
    result.map(|_| ())
}
