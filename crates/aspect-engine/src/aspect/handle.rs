//! Registration handles

use super::registry::{InterceptorId, ScopeKey};
use super::EngineShared;
use crate::runtime::Selector;
use std::fmt;
use std::sync::Weak;
use tracing::debug;

/// Token returned by registration; its only behavior is removal
///
/// The handle holds the engine weakly, so it never keeps the engine (or the
/// hooked object) alive, and removing after the engine is gone is a no-op.
pub struct RegistrationHandle {
    engine: Weak<EngineShared>,
    scope: ScopeKey,
    selector: Selector,
    id: InterceptorId,
}

impl RegistrationHandle {
    pub(crate) fn new(engine: Weak<EngineShared>, scope: ScopeKey, selector: Selector, id: InterceptorId) -> Self {
        Self {
            engine,
            scope,
            selector,
            id,
        }
    }

    /// ID of the registered interceptor
    pub fn id(&self) -> InterceptorId {
        self.id
    }

    /// Scope the interceptor was registered in
    pub fn scope(&self) -> ScopeKey {
        self.scope
    }

    /// Registry selector (the alias for instance-scoped interceptors)
    pub fn selector(&self) -> &Selector {
        &self.selector
    }

    /// Stop the interceptor from firing on future calls
    ///
    /// Returns whether an interceptor was removed. Dispatch redirection is
    /// left in place; calls keep reaching the original implementation.
    pub fn remove(&self) -> bool {
        let Some(shared) = self.engine.upgrade() else {
            return false;
        };
        let removed = shared
            .guard
            .perform_locked(|_| shared.registry.remove(self.scope, &self.selector, self.id));
        if removed {
            debug!(interceptor = self.id.as_u64(), selector = %self.selector, "removed interceptor");
        }
        removed
    }
}

impl fmt::Debug for RegistrationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistrationHandle")
            .field("scope", &self.scope)
            .field("selector", &self.selector)
            .field("id", &self.id)
            .finish()
    }
}
