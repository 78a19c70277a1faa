//! Interceptor registry
//!
//! Interceptors are grouped per (scope, selector) into a [`RegistryEntry`]
//! with one ordered bucket per [`Timing`]. Instance-scoped entries are keyed
//! by the object and the *aliased* selector; type-scoped entries by the
//! dispatch class (a class, or a metaclass for class methods) and the plain
//! selector.

use super::callback::Callback;
use super::Timing;
use crate::runtime::{Class, ClassId, ObjectId, Selector, WeakObject};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Unique identifier for a registered interceptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InterceptorId(u64);

impl InterceptorId {
    /// Create a new unique interceptor ID
    pub fn new() -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        InterceptorId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for InterceptorId {
    fn default() -> Self {
        Self::new()
    }
}

/// What an entry is scoped to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScopeKey {
    /// A single object
    Instance(ObjectId),
    /// Every instance dispatching through a class (or metaclass)
    Type(ClassId),
}

/// Owner an interceptor was registered on
#[derive(Debug, Clone)]
pub enum Owner {
    /// Object, held weakly
    Object(WeakObject),
    /// Class or metaclass
    Type(Class),
}

/// A registered interceptor
#[derive(Debug)]
pub struct InterceptorRecord {
    id: InterceptorId,
    selector: Selector,
    owner: Owner,
    timing: Timing,
    callback: Callback,
}

impl InterceptorRecord {
    /// Create a record with a fresh ID
    pub fn new(selector: Selector, owner: Owner, timing: Timing, callback: Callback) -> Self {
        Self {
            id: InterceptorId::new(),
            selector,
            owner,
            timing,
            callback,
        }
    }

    /// Record ID
    pub fn id(&self) -> InterceptorId {
        self.id
    }

    /// Intercepted selector (never the alias)
    pub fn selector(&self) -> &Selector {
        &self.selector
    }

    /// Owner the interceptor was registered on
    pub fn owner(&self) -> &Owner {
        &self.owner
    }

    /// Timing bucket
    pub fn timing(&self) -> Timing {
        self.timing
    }

    /// Callback to run
    pub fn callback(&self) -> &Callback {
        &self.callback
    }

    /// Check whether the owner still exists
    pub fn is_live(&self) -> bool {
        match &self.owner {
            Owner::Object(weak) => weak.is_alive(),
            Owner::Type(_) => true,
        }
    }
}

/// Ordered interceptor buckets for one (scope, selector) key
#[derive(Debug, Default)]
pub struct RegistryEntry {
    before: RwLock<Vec<Arc<InterceptorRecord>>>,
    instead: RwLock<Vec<Arc<InterceptorRecord>>>,
    after: RwLock<Vec<Arc<InterceptorRecord>>>,
}

impl RegistryEntry {
    /// Create an empty entry
    pub fn new() -> Self {
        Self::default()
    }

    fn bucket(&self, timing: Timing) -> &RwLock<Vec<Arc<InterceptorRecord>>> {
        match timing {
            Timing::Before => &self.before,
            Timing::Instead => &self.instead,
            Timing::After => &self.after,
        }
    }

    /// Append a record to its timing bucket
    pub fn add(&self, record: Arc<InterceptorRecord>) {
        self.bucket(record.timing()).write().push(record);
    }

    /// Remove a record by ID; returns whether it was present
    pub fn remove(&self, id: InterceptorId) -> bool {
        [Timing::Before, Timing::Instead, Timing::After]
            .into_iter()
            .any(|timing| {
                let mut bucket = self.bucket(timing).write();
                match bucket.iter().position(|record| record.id() == id) {
                    Some(index) => {
                        bucket.remove(index);
                        true
                    }
                    None => false,
                }
            })
    }

    /// Copy of one bucket, in registration order
    ///
    /// Dispatch iterates the copy, so interceptors may register or remove
    /// interceptors while running.
    pub fn snapshot(&self, timing: Timing) -> Vec<Arc<InterceptorRecord>> {
        self.bucket(timing).read().clone()
    }

    /// Number of records across all buckets
    pub fn len(&self) -> usize {
        self.before.read().len() + self.instead.read().len() + self.after.read().len()
    }

    /// Check whether every bucket is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Registry of interceptor entries
pub struct Registry {
    entries: DashMap<(ScopeKey, Selector), Arc<RegistryEntry>>,
}

impl Registry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Add a record under `(scope, selector)`, creating the entry on first use
    pub fn add(&self, scope: ScopeKey, selector: &Selector, record: Arc<InterceptorRecord>) {
        let entry = self
            .entries
            .entry((scope, selector.clone()))
            .or_insert_with(|| Arc::new(RegistryEntry::new()))
            .clone();
        entry.add(record);
    }

    /// Find the entry for `(scope, selector)`
    pub fn lookup(&self, scope: ScopeKey, selector: &Selector) -> Option<Arc<RegistryEntry>> {
        self.entries
            .get(&(scope, selector.clone()))
            .map(|entry| entry.clone())
    }

    /// Remove a record; the (possibly empty) entry is kept
    pub fn remove(&self, scope: ScopeKey, selector: &Selector, id: InterceptorId) -> bool {
        self.lookup(scope, selector)
            .map_or(false, |entry| entry.remove(id))
    }

    /// Number of entries (including empty ones)
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
