//! The `Object` base type and its lifecycle operations.
//!
//! Every managed type embeds [`Object`] (directly or through its parent) as
//! its first field and is laid out `#[repr(C)]`, so a pointer to the derived
//! type is also a pointer to its `Object` base. Lifecycle operations take
//! raw pointers, mirroring how objects are referenced from reflected fields.

use std::ptr;

use crate::class::{static_class, Class};
use crate::field::{Field, Reflect};
use crate::flags::ObjectFlags;
use crate::pool::{allocate_object, header_for_object};

// ============================================================================
// Object - The managed base type
// ============================================================================

/// Base of every pooled object: a single back-pointer to the type's
/// [`Class`] record, assigned by [`new_object`].
#[repr(C)]
pub struct Object {
    pub(crate) class: *mut Class,
}

impl Object {
    /// The class record describing this object's type.
    #[must_use]
    pub const fn class(&self) -> *mut Class {
        self.class
    }
}

impl Default for Object {
    fn default() -> Self {
        Self {
            class: ptr::null_mut(),
        }
    }
}

// SAFETY: the root object type has no reflected fields.
unsafe impl Reflect for Object {
    const NAME: &'static str = "Object";

    fn reflect_fields(_fields: &mut Vec<Field>) {}
}

// SAFETY: `Object` is its own parent; it is the root of every chain.
unsafe impl ObjectType for Object {
    type Parent = Self;
}

// ============================================================================
// ObjectType - Per-type registration contract
// ============================================================================

/// Contract implemented by every managed object type.
///
/// The destruction hooks default to instantaneous teardown; a type that
/// needs to defer reclamation overrides [`is_destroy_finished`] to report
/// false until its external conditions are met, and relies on a later
/// collection cycle to complete destruction.
///
/// # Safety
///
/// Implementors must be `#[repr(C)]` with an instance of `Parent` as the
/// first field, so the parent's reflected field offsets remain valid when
/// applied to the derived type.
///
/// [`is_destroy_finished`]: ObjectType::is_destroy_finished
pub unsafe trait ObjectType: Reflect + Default + 'static {
    /// The direct parent type; the root `Object` names itself.
    type Parent: ObjectType;

    /// Invoked when destruction begins.
    fn on_begin_destroy(&mut self) {}

    /// Whether teardown may complete. Checked on every destruction attempt.
    fn is_destroy_finished(&self) -> bool {
        true
    }

    /// Invoked once, immediately before the object is marked destroyed.
    fn on_end_destroy(&mut self) {}
}

// ============================================================================
// Allocation
// ============================================================================

/// Allocate and default-construct an object of type `T`.
///
/// The fresh object is flagged unreachable: attach it to a rooted graph (or
/// a handle) before the next collection, or it will be reclaimed.
/// Returns null when the pool cannot grow.
#[must_use]
pub fn new_object<T: ObjectType>() -> *mut T {
    new_object_from_class(static_class::<T>()).cast::<T>()
}

/// Allocate and construct an object described by `class`.
///
/// Runs the class's default-construct callback into the slot, then assigns
/// the class back-pointer. Returns null on allocation failure.
#[must_use]
pub fn new_object_from_class(class: *mut Class) -> *mut Object {
    if class.is_null() {
        return ptr::null_mut();
    }

    // SAFETY: class records are root-pinned pool objects; the pointer stays
    // valid for the life of the registry.
    let payload = allocate_object(unsafe { (*class).size() });
    if payload.is_null() {
        return ptr::null_mut();
    }

    // SAFETY: the slot is sized for the class payload and 16-aligned.
    unsafe {
        (*class).construct(payload);
        let object = payload.cast::<Object>();
        (*object).class = class;
        object
    }
}

// ============================================================================
// Lifecycle queries
// ============================================================================

/// Whether `object` points at a live object: allocated, and neither phase
/// of destruction has begun.
#[must_use]
pub fn is_valid<T: ObjectType>(object: *const T) -> bool {
    let header = header_for_object(object.cast::<Object>());
    if header.is_null() {
        return false;
    }

    // SAFETY: header_for_object validated the magic sentinel.
    let flags = unsafe { (*header).flags };
    flags.intersects(ObjectFlags::ALLOCATED) && !flags.intersects(ObjectFlags::DYING)
}

/// Current lifecycle flags of `object`, or the empty set when no valid
/// header is found.
#[must_use]
pub fn object_flags<T: ObjectType>(object: *const T) -> ObjectFlags {
    let header = header_for_object(object.cast::<Object>());
    if header.is_null() {
        return ObjectFlags::empty();
    }
    // SAFETY: magic validated above.
    unsafe { (*header).flags }
}

/// The slot generation observed through `object`'s header.
///
/// Reads 1 after the first allocation of a slot and bumps again on free.
#[must_use]
pub fn generation<T: ObjectType>(object: *const T) -> u32 {
    let header = header_for_object(object.cast::<Object>());
    if header.is_null() {
        return 0;
    }
    // SAFETY: magic validated above.
    u32::from(unsafe { (*header).generation })
}

// ============================================================================
// Two-phase destruction
// ============================================================================

/// Begin destroying `object`.
///
/// Marks the object as being destroyed (references to it are observed as
/// invalid from this point on), runs its begin-destroy hook, then attempts
/// to complete destruction immediately. Completion is deferred when the
/// type's `is_destroy_finished` reports false; the slot itself is reclaimed
/// only by a subsequent sweep.
pub fn destroy<T: ObjectType>(object: *mut T) {
    let object = object.cast::<Object>();
    let header = header_for_object(object);
    if header.is_null() {
        tracing::warn!(?object, "destroy called on pointer without a valid header");
        return;
    }

    // SAFETY: magic validated; hooks receive the object they were
    // registered for.
    unsafe {
        (*header).flags.insert(ObjectFlags::IS_BEING_DESTROYED);
        (*header).flags.remove(ObjectFlags::IS_DESTROYED);

        let class = (*object).class;
        if !class.is_null() {
            (*class).invoke_begin_destroy(object);
        }
    }

    try_complete_destruction(object);
}

/// Complete destruction if the object reports itself finished.
///
/// No-op unless the object is currently being destroyed. On completion the
/// end-destroy hook runs, `IS_DESTROYED` is set and `IS_BEING_DESTROYED`
/// cleared in one step.
pub fn try_complete_destruction<T: ObjectType>(object: *mut T) {
    let object = object.cast::<Object>();
    let header = header_for_object(object);
    if header.is_null() {
        return;
    }

    // SAFETY: magic validated above.
    unsafe {
        if !(*header).flags.intersects(ObjectFlags::IS_BEING_DESTROYED) {
            return;
        }

        let class = (*object).class;
        let finished = class.is_null() || (*class).invoke_destroy_finished(object);
        if finished {
            if !class.is_null() {
                (*class).invoke_end_destroy(object);
            }
            (*header).flags.insert(ObjectFlags::IS_DESTROYED);
            (*header).flags.remove(ObjectFlags::IS_BEING_DESTROYED);
        }
    }
}
