//! Object instances and message receivers

use super::class::Class;
use super::invocation::send;
use super::selector::Selector;
use super::value::Value;
use super::RuntimeResult;
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// Unique identifier for an object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(u64);

impl ObjectId {
    /// Create a new unique object ID
    pub fn new() -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        ObjectId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ObjectId {
    fn default() -> Self {
        Self::new()
    }
}

struct ObjectInner {
    id: ObjectId,
    /// Dispatch type; may be retargeted at runtime
    isa: RwLock<Class>,
    ivars: Mutex<FxHashMap<String, Value>>,
}

/// Reference-counted object handle
///
/// Objects are compared by identity. The dispatch type (`isa`) decides
/// which method table messages are looked up in; `class()` is what
/// introspection reports and may differ from it.
#[derive(Clone)]
pub struct Object(Arc<ObjectInner>);

impl Object {
    /// Create an instance of `class`
    pub fn new(class: &Class) -> Self {
        Object(Arc::new(ObjectInner {
            id: ObjectId::new(),
            isa: RwLock::new(class.clone()),
            ivars: Mutex::new(FxHashMap::default()),
        }))
    }

    /// Object ID
    pub fn id(&self) -> ObjectId {
        self.0.id
    }

    /// Type used for method dispatch
    pub fn isa(&self) -> Class {
        self.0.isa.read().clone()
    }

    /// Retarget the dispatch type, returning the previous one
    pub fn set_isa(&self, class: &Class) -> Class {
        std::mem::replace(&mut *self.0.isa.write(), class.clone())
    }

    /// Class reported by introspection
    pub fn class(&self) -> Class {
        self.isa().introspection_class()
    }

    /// Check whether the object responds to `selector`
    pub fn responds_to(&self, selector: &Selector) -> bool {
        self.isa().instances_respond_to(selector)
    }

    /// Send a message with explicit arguments
    pub fn send(&self, selector: &Selector, args: &[Value]) -> RuntimeResult<Value> {
        send(&Receiver::Object(self.clone()), selector, args)
    }

    /// Read an instance variable (`Value::Void` when unset)
    pub fn get_ivar(&self, name: &str) -> Value {
        self.0.ivars.lock().get(name).cloned().unwrap_or_default()
    }

    /// Write an instance variable
    pub fn set_ivar(&self, name: &str, value: impl Into<Value>) {
        self.0.ivars.lock().insert(name.to_string(), value.into());
    }

    /// Create a weak handle that does not keep the object alive
    pub fn downgrade(&self) -> WeakObject {
        WeakObject {
            id: self.0.id,
            inner: Arc::downgrade(&self.0),
        }
    }
}

impl PartialEq for Object {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Object {}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{} #{}>", self.isa().name(), self.0.id.as_u64())
    }
}

/// Non-owning object handle
#[derive(Clone)]
pub struct WeakObject {
    id: ObjectId,
    inner: Weak<ObjectInner>,
}

impl WeakObject {
    /// ID of the referenced object (valid even after it is dropped)
    pub fn id(&self) -> ObjectId {
        self.id
    }

    /// Recover a strong handle if the object is still alive
    pub fn upgrade(&self) -> Option<Object> {
        self.inner.upgrade().map(Object)
    }

    /// Check whether the object is still alive
    pub fn is_alive(&self) -> bool {
        self.inner.strong_count() > 0
    }
}

impl fmt::Debug for WeakObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WeakObject(#{})", self.id.as_u64())
    }
}

/// Target of a message: an instance, or a class receiving a class message
#[derive(Debug, Clone, PartialEq)]
pub enum Receiver {
    /// Instance receiver, dispatched through its `isa`
    Object(Object),
    /// Class receiver, dispatched through its metaclass
    Class(Class),
}

impl Receiver {
    /// Type whose method table serves this receiver
    pub fn isa(&self) -> Class {
        match self {
            Receiver::Object(obj) => obj.isa(),
            Receiver::Class(class) => class.metaclass().cloned().unwrap_or_else(|| class.clone()),
        }
    }

    /// Class reported by introspection
    pub fn class(&self) -> Class {
        match self {
            Receiver::Object(obj) => obj.class(),
            Receiver::Class(class) => class.clone(),
        }
    }

    /// Object payload
    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Receiver::Object(obj) => Some(obj),
            Receiver::Class(_) => None,
        }
    }

    /// Send a message with explicit arguments
    pub fn send(&self, selector: &Selector, args: &[Value]) -> RuntimeResult<Value> {
        send(self, selector, args)
    }
}

impl From<Object> for Receiver {
    fn from(obj: Object) -> Self {
        Receiver::Object(obj)
    }
}

impl From<Class> for Receiver {
    fn from(class: Class) -> Self {
        Receiver::Class(class)
    }
}
