//! The explicit root set that seeds every mark phase.

use std::cell::RefCell;

use crate::flags::ObjectFlags;
use crate::object::{Object, ObjectType};
use crate::pool::header_for_object;

// ============================================================================
// RootSet - Ordered root registry
// ============================================================================

/// A process-wide (per mutator thread) ordered sequence of root objects.
///
/// Duplicate membership is permitted; removal drops every occurrence.
pub struct RootSet {
    roots: Vec<*mut Object>,
}

impl RootSet {
    /// Create an empty root set.
    #[must_use]
    pub const fn new() -> Self {
        Self { roots: Vec::new() }
    }

    /// Register a root. Roots are traversed in insertion order.
    pub fn add(&mut self, object: *mut Object) {
        self.roots.push(object);
    }

    /// Unregister every occurrence of `object`.
    pub fn remove(&mut self, object: *mut Object) {
        self.roots.retain(|&root| root != object);
    }

    /// Number of registered roots (duplicates included).
    #[must_use]
    pub fn len(&self) -> usize {
        self.roots.len()
    }

    /// Whether no roots are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Snapshot of the current roots, in insertion order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<*mut Object> {
        self.roots.clone()
    }

    /// Drop all roots.
    pub fn clear(&mut self) {
        self.roots.clear();
    }
}

impl Default for RootSet {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Thread-local root access
// ============================================================================

thread_local! {
    /// Thread-local root set.
    static ROOT_SET: RefCell<RootSet> = const { RefCell::new(RootSet::new()) };
}

/// Execute a function with access to the root set.
pub fn with_roots<F, R>(f: F) -> R
where
    F: FnOnce(&mut RootSet) -> R,
{
    ROOT_SET.with(|roots| f(&mut roots.borrow_mut()))
}

/// Pin `object` in the root set and set its `IN_ROOT_SET` flag.
///
/// A rooted object (and everything reachable from it) survives collection
/// until removed again.
pub fn add_to_root_set<T: ObjectType>(object: *mut T) {
    let object = object.cast::<Object>();
    let header = header_for_object(object);
    if header.is_null() {
        tracing::warn!(?object, "refusing to root pointer without a valid header");
        return;
    }

    with_roots(|roots| roots.add(object));
    // SAFETY: header_for_object validated the magic sentinel.
    unsafe { (*header).flags.insert(ObjectFlags::IN_ROOT_SET) };
}

/// Remove every occurrence of `object` from the root set and clear its
/// `IN_ROOT_SET` flag.
pub fn remove_from_root_set<T: ObjectType>(object: *mut T) {
    let object = object.cast::<Object>();
    with_roots(|roots| roots.remove(object));

    let header = header_for_object(object);
    if header.is_null() {
        return;
    }
    // SAFETY: header_for_object validated the magic sentinel.
    unsafe { (*header).flags.remove(ObjectFlags::IN_ROOT_SET) };
}
