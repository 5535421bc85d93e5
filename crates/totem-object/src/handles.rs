//! Weak and strong reference handles.
//!
//! Weak handles never keep their target alive; they capture the slot
//! generation at construction and invalidate the moment the header's
//! generation moves on or the target enters destruction. Strong handles
//! retain their target through a hidden registry object that is itself
//! GC-managed and pinned in the root set, so retained objects are traced by
//! the ordinary mark phase.

use std::cell::Cell;
use std::mem;
use std::ptr;

use crate::field::{Field, Reflect, Reflected};
use crate::flags::ObjectFlags;
use crate::object::{is_valid, new_object, object_flags, Object, ObjectType};
use crate::pool::header_for_object;
use crate::roots::add_to_root_set;

// ============================================================================
// WeakHandle - Non-retaining, generation-validated
// ============================================================================

/// A non-retaining handle that knows when its target has gone away.
///
/// Becomes invalid when the target is destroyed or collected; dereferencing
/// an invalid handle yields null, never a dangling pointer.
pub struct WeakHandle<T: ObjectType> {
    object: *mut T,
    generation: u16,
}

impl<T: ObjectType> WeakHandle<T> {
    /// Capture a weak reference to `object`.
    ///
    /// An invalid target is captured as the null handle.
    #[must_use]
    pub fn new(object: *mut T) -> Self {
        if is_valid(object.cast_const()) {
            let header = header_for_object(object.cast::<Object>());
            // SAFETY: is_valid established a magic-checked header.
            let generation = unsafe { (*header).generation };
            Self { object, generation }
        } else {
            Self {
                object: ptr::null_mut(),
                generation: 0,
            }
        }
    }

    /// Whether the target is still the same live object that was captured.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        if !is_valid(self.object.cast_const()) {
            return false;
        }
        let header = header_for_object(self.object.cast::<Object>());
        // SAFETY: is_valid established a magic-checked header.
        !header.is_null() && unsafe { (*header).generation } == self.generation
    }

    /// The target pointer, or null when the handle is no longer valid.
    #[must_use]
    pub fn get(&self) -> *mut T {
        if self.is_valid() {
            self.object
        } else {
            ptr::null_mut()
        }
    }
}

impl<T: ObjectType> Clone for WeakHandle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: ObjectType> Copy for WeakHandle<T> {}

impl<T: ObjectType> From<&WeakHandle<T>> for bool {
    fn from(handle: &WeakHandle<T>) -> Self {
        handle.is_valid()
    }
}

// ============================================================================
// StrongHandle - Retaining, invalidation-aware
// ============================================================================

/// A retaining handle.
///
/// As long as the handle exists its target is traced through the
/// strong-handle registry and survives collection. The handle observes an
/// explicitly destroyed target as invalid, but keeps occupying its registry
/// slot until dropped, so avoid holding strong handles indefinitely.
pub struct StrongHandle<T: ObjectType> {
    object: *mut T,
    index: i32,
}

impl<T: ObjectType> StrongHandle<T> {
    /// Retain `object`, registering it with the strong-handle registry.
    #[must_use]
    pub fn new(object: *mut T) -> Self {
        let index = with_strong_registry(|registry| registry.register(object.cast::<Object>()));
        Self { object, index }
    }

    /// Whether the target is still live.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        is_valid(self.object.cast_const())
    }

    /// The target pointer, or null when the target has been destroyed.
    #[must_use]
    pub fn get(&self) -> *mut T {
        if self.is_valid() {
            self.object
        } else {
            ptr::null_mut()
        }
    }
}

impl<T: ObjectType> Drop for StrongHandle<T> {
    fn drop(&mut self) {
        with_strong_registry(|registry| registry.unregister(self.index));
    }
}

impl<T: ObjectType> From<&StrongHandle<T>> for bool {
    fn from(handle: &StrongHandle<T>) -> Self {
        handle.is_valid()
    }
}

// ============================================================================
// StrongHandleRegistry - The hidden retention object
// ============================================================================

/// Registry of retained object pointers, itself a GC-managed object.
///
/// Null entries are vacated slots; registration fills the first null slot
/// before appending. The `objects` field is reflected so retained objects
/// participate in marking like any other reference.
#[repr(C)]
#[derive(Default)]
pub(crate) struct StrongHandleRegistry {
    base: Object,
    objects: Vec<*mut Object>,
}

impl StrongHandleRegistry {
    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    fn register(&mut self, object: *mut Object) -> i32 {
        if let Some(index) = self.objects.iter().position(|slot| slot.is_null()) {
            self.objects[index] = object;
            index as i32
        } else {
            self.objects.push(object);
            (self.objects.len() - 1) as i32
        }
    }

    fn unregister(&mut self, index: i32) {
        let Ok(index) = usize::try_from(index) else {
            return;
        };
        if index >= self.objects.len() {
            return;
        }

        self.objects[index] = ptr::null_mut();

        // Trim the tail once nothing assigned remains past this slot.
        if self.objects[index..].iter().all(|slot| slot.is_null()) {
            self.objects.truncate(index);
        }
    }

    #[cfg(test)]
    fn retained(&self) -> &[*mut Object] {
        &self.objects
    }
}

// SAFETY: the descriptor matches the registry's layout; `objects` is a
// Vec of object pointers at the recorded offset.
unsafe impl Reflect for StrongHandleRegistry {
    const NAME: &'static str = "StrongHandleRegistry";

    fn reflect_fields(fields: &mut Vec<Field>) {
        #[allow(clippy::cast_possible_truncation)]
        fields.push(<Vec<*mut Object> as Reflected>::field(
            mem::offset_of!(StrongHandleRegistry, objects) as u32,
            "objects",
            &[],
        ));
    }
}

// SAFETY: repr(C) with the `Object` base as first field.
unsafe impl ObjectType for StrongHandleRegistry {
    type Parent = Object;
}

thread_local! {
    /// Thread-local strong-handle registry, created on first use.
    static STRONG_REGISTRY: Cell<*mut StrongHandleRegistry> =
        const { Cell::new(ptr::null_mut()) };
}

/// The registry object, allocating and root-pinning it on first use.
///
/// The root-set pin is re-checked on every access.
fn strong_registry() -> *mut StrongHandleRegistry {
    STRONG_REGISTRY.with(|cell| {
        let mut registry = cell.get();
        if registry.is_null() {
            registry = new_object::<StrongHandleRegistry>();
            assert!(
                !registry.is_null(),
                "failed to allocate the strong-handle registry"
            );
            cell.set(registry);
        }

        if !object_flags(registry.cast_const()).intersects(ObjectFlags::IN_ROOT_SET) {
            add_to_root_set(registry);
        }
        registry
    })
}

fn with_strong_registry<F, R>(f: F) -> R
where
    F: FnOnce(&mut StrongHandleRegistry) -> R,
{
    let registry = strong_registry();
    // SAFETY: the registry is root-pinned and never reclaimed.
    f(unsafe { &mut *registry })
}

pub(crate) fn reset_for_testing() {
    STRONG_REGISTRY.with(|cell| cell.set(ptr::null_mut()));
}

#[cfg(test)]
mod tests {
    use super::{with_strong_registry, StrongHandle, WeakHandle};
    use crate::object::{destroy, new_object, Object};

    #[test]
    fn weak_handles_capture_only_valid_targets() {
        let handle = WeakHandle::<Object>::new(std::ptr::null_mut());
        assert!(!handle.is_valid());
        assert!(handle.get().is_null());

        let object = new_object::<Object>();
        let handle = WeakHandle::new(object);
        assert!(handle.is_valid());
        assert_eq!(handle.get(), object);
        assert!(bool::from(&handle));
    }

    #[test]
    fn weak_handles_invalidate_on_destroy() {
        let object = new_object::<Object>();
        let handle = WeakHandle::new(object);

        destroy(object);
        assert!(!handle.is_valid());
        assert!(handle.get().is_null());
    }

    #[test]
    fn registration_fills_the_first_vacated_slot() {
        let a = new_object::<Object>();
        let b = new_object::<Object>();
        let c = new_object::<Object>();

        let first = StrongHandle::new(a);
        let second = StrongHandle::new(b);
        let third = StrongHandle::new(c);
        assert_eq!((first.index, second.index, third.index), (0, 1, 2));

        drop(second);
        let reused = StrongHandle::new(b);
        assert_eq!(reused.index, 1);

        drop(third);
        drop(reused);
        drop(first);
        with_strong_registry(|registry| assert!(registry.retained().is_empty()));
    }

    #[test]
    fn unregister_trims_trailing_nulls() {
        let a = new_object::<Object>();
        let b = new_object::<Object>();

        let first = StrongHandle::new(a);
        let second = StrongHandle::new(b);

        drop(second);
        with_strong_registry(|registry| assert_eq!(registry.retained().len(), 1));

        drop(first);
        with_strong_registry(|registry| assert!(registry.retained().is_empty()));
    }
}
