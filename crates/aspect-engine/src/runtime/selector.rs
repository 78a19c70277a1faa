//! Method identities (selectors)
//!
//! A selector names "a method callable on instances of a type". Selectors
//! compare and hash by name, so two selectors built from the same string are
//! interchangeable.

use once_cell::sync::Lazy;
use std::fmt;
use std::sync::Arc;

/// Prefix used to derive the alias identity of a selector
pub const ALIAS_PREFIX: &str = "aspect_";

/// Selector of the catch-all handler that receives unhandled invocations
pub static FORWARD_INVOCATION: Lazy<Selector> = Lazy::new(|| Selector::new("forwardInvocation:"));

/// Method identity
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Selector(Arc<str>);

impl Selector {
    /// Create a selector from its name
    pub fn new(name: &str) -> Self {
        Selector(Arc::from(name))
    }

    /// Selector name
    pub fn name(&self) -> &str {
        &self.0
    }

    /// Derive a new selector by prefixing this one's name
    pub fn prefixed(&self, prefix: &str) -> Selector {
        let mut name = String::with_capacity(prefix.len() + self.0.len());
        name.push_str(prefix);
        name.push_str(&self.0);
        Selector(Arc::from(name))
    }

    /// Alias identity under which an original implementation is preserved
    pub fn alias(&self) -> Selector {
        self.prefixed(ALIAS_PREFIX)
    }

    /// Check whether the name starts with `prefix`
    pub fn has_prefix(&self, prefix: &str) -> bool {
        self.0.starts_with(prefix)
    }
}

impl From<&str> for Selector {
    fn from(name: &str) -> Self {
        Selector::new(name)
    }
}

impl fmt::Debug for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Selector({})", self.0)
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_selector_equality_by_name() {
        let a = Selector::new("test:name:");
        let b = Selector::from("test:name:");
        assert_eq!(a, b);

        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
    }

    #[test]
    fn test_selector_alias() {
        let sel = Selector::new("greet:");
        let alias = sel.alias();
        assert_eq!(alias.name(), "aspect_greet:");
        assert!(alias.has_prefix(ALIAS_PREFIX));
        assert_ne!(alias, sel);
        // Stable across calls
        assert_eq!(sel.alias(), alias);
    }

    #[test]
    fn test_forward_invocation_selector() {
        assert_eq!(FORWARD_INVOCATION.name(), "forwardInvocation:");
    }
}
