//! Runtime class table

use super::class::Class;
use super::object::Object;
use super::{RuntimeError, RuntimeResult};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;

/// Registry of named classes
///
/// Classes are created in two steps, as in most dynamic runtimes: allocate
/// (set up methods while nobody can see the class), then register under its
/// name. Registration fails on a name collision.
pub struct Runtime {
    classes: RwLock<FxHashMap<String, Class>>,
}

impl Runtime {
    /// Create an empty runtime
    pub fn new() -> Self {
        Self {
            classes: RwLock::new(FxHashMap::default()),
        }
    }

    /// Allocate an unregistered class (and its metaclass)
    pub fn allocate_class(&self, name: &str, superclass: Option<&Class>) -> Class {
        Class::allocate(name, superclass)
    }

    /// Register an allocated class under its name
    pub fn register_class(&self, class: &Class) -> RuntimeResult<()> {
        let mut classes = self.classes.write();
        if classes.contains_key(class.name()) {
            return Err(RuntimeError::ClassExists(class.name().to_string()));
        }
        classes.insert(class.name().to_string(), class.clone());
        Ok(())
    }

    /// Allocate and register a class in one step
    pub fn define_class(&self, name: &str, superclass: Option<&Class>) -> RuntimeResult<Class> {
        let class = self.allocate_class(name, superclass);
        self.register_class(&class)?;
        Ok(class)
    }

    /// Create an instance of `class`
    pub fn instantiate(&self, class: &Class) -> Object {
        Object::new(class)
    }

    /// Look up a registered class by name
    pub fn class_named(&self, name: &str) -> Option<Class> {
        self.classes.read().get(name).cloned()
    }

    /// Number of registered classes
    pub fn class_count(&self) -> usize {
        self.classes.read().len()
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}
