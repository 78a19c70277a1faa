//! Classes, metaclasses and method tables
//!
//! Every class owns a method table mapping selectors to implementations.
//! Lookup walks the superclass chain. Each class is paired with a metaclass
//! holding its class-level methods; the metaclass chain mirrors the class
//! chain, so class methods inherit the same way instance methods do.

use super::encoding::Signature;
use super::invocation::Invocation;
use super::selector::Selector;
use super::value::Value;
use super::{RuntimeError, RuntimeResult};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Body of a natively implemented method
pub type MethodFn = dyn Fn(&Invocation) -> RuntimeResult<Value> + Send + Sync;

/// Handler receiving invocations that have no direct implementation
pub type ForwardFn = dyn Fn(&mut Invocation) -> RuntimeResult<()> + Send + Sync;

/// Unique identifier for a class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(u64);

impl ClassId {
    /// Create a new unique class ID
    pub fn new() -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        ClassId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ClassId {
    fn default() -> Self {
        Self::new()
    }
}

/// Method implementation
#[derive(Clone)]
pub enum Imp {
    /// Ordinary body, run directly by dispatch
    Native(Arc<MethodFn>),
    /// Route the call to the `forwardInvocation:` handler of the receiver
    Forward,
    /// A forwarding handler; only meaningful under `forwardInvocation:`
    Forwarder(Arc<ForwardFn>),
}

impl Imp {
    /// Wrap a closure as a native implementation
    pub fn native<F>(body: F) -> Self
    where
        F: Fn(&Invocation) -> RuntimeResult<Value> + Send + Sync + 'static,
    {
        Imp::Native(Arc::new(body))
    }

    /// Wrap a closure as a forwarding handler
    pub fn forwarder<F>(handler: F) -> Self
    where
        F: Fn(&mut Invocation) -> RuntimeResult<()> + Send + Sync + 'static,
    {
        Imp::Forwarder(Arc::new(handler))
    }

    /// Check for the forwarding marker
    pub fn is_forward(&self) -> bool {
        matches!(self, Imp::Forward)
    }

    /// Check whether two implementations are the same body
    pub fn same_as(&self, other: &Imp) -> bool {
        match (self, other) {
            (Imp::Native(a), Imp::Native(b)) => Arc::ptr_eq(a, b),
            (Imp::Forwarder(a), Imp::Forwarder(b)) => Arc::ptr_eq(a, b),
            (Imp::Forward, Imp::Forward) => true,
            _ => false,
        }
    }
}

impl fmt::Debug for Imp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Imp::Native(_) => f.write_str("Native"),
            Imp::Forward => f.write_str("Forward"),
            Imp::Forwarder(_) => f.write_str("Forwarder"),
        }
    }
}

/// A method table entry
#[derive(Debug, Clone)]
pub struct Method {
    selector: Selector,
    imp: Imp,
    types: Signature,
}

impl Method {
    /// Create a method entry
    pub fn new(selector: Selector, imp: Imp, types: Signature) -> Self {
        Self { selector, imp, types }
    }

    /// Selector the method is registered under
    pub fn selector(&self) -> &Selector {
        &self.selector
    }

    /// Implementation
    pub fn imp(&self) -> &Imp {
        &self.imp
    }

    /// Declared signature
    pub fn types(&self) -> &Signature {
        &self.types
    }
}

struct ClassInner {
    id: ClassId,
    name: String,
    superclass: Option<Class>,
    metaclass: Option<Class>,
    methods: RwLock<FxHashMap<Selector, Method>>,
    /// Class reported by `class()` introspection instead of this one
    introspection: RwLock<Option<Class>>,
}

/// Class handle (cheap to clone, compared by identity)
#[derive(Clone)]
pub struct Class(Arc<ClassInner>);

impl Class {
    /// Allocate a class and its metaclass without registering them
    pub(crate) fn allocate(name: &str, superclass: Option<&Class>) -> Class {
        let metaclass = Class(Arc::new(ClassInner {
            id: ClassId::new(),
            name: name.to_string(),
            superclass: superclass.and_then(|s| s.metaclass().cloned()),
            metaclass: None,
            methods: RwLock::new(FxHashMap::default()),
            introspection: RwLock::new(None),
        }));

        Class(Arc::new(ClassInner {
            id: ClassId::new(),
            name: name.to_string(),
            superclass: superclass.cloned(),
            metaclass: Some(metaclass),
            methods: RwLock::new(FxHashMap::default()),
            introspection: RwLock::new(None),
        }))
    }

    /// Class ID
    pub fn id(&self) -> ClassId {
        self.0.id
    }

    /// Class name (metaclasses share the name of their class)
    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// Direct superclass
    pub fn superclass(&self) -> Option<&Class> {
        self.0.superclass.as_ref()
    }

    /// Metaclass holding class-level methods (`None` for metaclasses)
    pub fn metaclass(&self) -> Option<&Class> {
        self.0.metaclass.as_ref()
    }

    /// Check whether this is a metaclass
    pub fn is_meta(&self) -> bool {
        self.0.metaclass.is_none()
    }

    /// This class followed by each superclass in turn
    pub fn ancestors(&self) -> Ancestors {
        Ancestors {
            next: Some(self.clone()),
        }
    }

    /// Check whether `other` is this class or one of its superclasses
    pub fn is_subclass_of(&self, other: &Class) -> bool {
        self.ancestors().any(|class| class == *other)
    }

    /// Find a method by walking the superclass chain
    pub fn instance_method(&self, selector: &Selector) -> Option<Method> {
        self.ancestors().find_map(|class| class.own_method(selector))
    }

    /// Find a method in this class's own table only
    pub fn own_method(&self, selector: &Selector) -> Option<Method> {
        self.0.methods.read().get(selector).cloned()
    }

    /// Check whether this class's own table has `selector`
    pub fn has_own_method(&self, selector: &Selector) -> bool {
        self.0.methods.read().contains_key(selector)
    }

    /// Check whether instances respond to `selector`
    pub fn instances_respond_to(&self, selector: &Selector) -> bool {
        self.instance_method(selector).is_some()
    }

    /// Number of methods in this class's own table
    pub fn method_count(&self) -> usize {
        self.0.methods.read().len()
    }

    /// Add a method to this class's own table
    ///
    /// Fails if the table already has an entry for the selector; inherited
    /// entries do not count.
    pub fn add_method(&self, method: Method) -> RuntimeResult<()> {
        let mut methods = self.0.methods.write();
        if methods.contains_key(&method.selector) {
            return Err(RuntimeError::MethodExists {
                selector: method.selector.to_string(),
                class: self.name().to_string(),
            });
        }
        methods.insert(method.selector.clone(), method);
        Ok(())
    }

    /// Set the implementation for `selector` in this class's own table
    ///
    /// Returns the implementation previously in the own table, if any.
    pub fn replace_method(&self, selector: &Selector, imp: Imp, types: Signature) -> Option<Imp> {
        self.0
            .methods
            .write()
            .insert(selector.clone(), Method::new(selector.clone(), imp, types))
            .map(|previous| previous.imp)
    }

    /// Define a native instance method from a type encoding and a body
    pub fn define_method<F>(&self, selector: &str, types: &str, body: F) -> RuntimeResult<()>
    where
        F: Fn(&Invocation) -> RuntimeResult<Value> + Send + Sync + 'static,
    {
        let types = Signature::parse(types)?;
        self.add_method(Method::new(Selector::new(selector), Imp::native(body), types))
    }

    /// Define a native class method on the metaclass
    pub fn define_class_method<F>(&self, selector: &str, types: &str, body: F) -> RuntimeResult<()>
    where
        F: Fn(&Invocation) -> RuntimeResult<Value> + Send + Sync + 'static,
    {
        let metaclass = self.metaclass().ok_or_else(|| {
            RuntimeError::Failed(format!("metaclass {} has no metaclass", self.name()))
        })?;
        metaclass.define_method(selector, types, body)
    }

    /// Make `class()` introspection on instances report `class` instead
    pub fn set_introspection_class(&self, class: Option<Class>) {
        *self.0.introspection.write() = class;
    }

    /// Class reported by introspection for instances of this class
    pub fn introspection_class(&self) -> Class {
        self.0
            .introspection
            .read()
            .clone()
            .unwrap_or_else(|| self.clone())
    }
}

impl PartialEq for Class {
    fn eq(&self, other: &Self) -> bool {
        self.0.id == other.0.id
    }
}

impl Eq for Class {}

impl Hash for Class {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.id.hash(state);
    }
}

impl fmt::Debug for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.is_meta() { "Metaclass" } else { "Class" };
        write!(f, "{}({}#{})", kind, self.name(), self.0.id.as_u64())
    }
}

impl fmt::Display for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Iterator over a class and its superclasses
pub struct Ancestors {
    next: Option<Class>,
}

impl Iterator for Ancestors {
    type Item = Class;

    fn next(&mut self) -> Option<Class> {
        let current = self.next.take()?;
        self.next = current.superclass().cloned();
        Some(current)
    }
}
