//! Type-metadata records and the universal class registry.
//!
//! A [`Class`] is itself a pool-allocated object (its parent is the root
//! object type), created lazily on the first [`static_class`] call for its
//! type and pinned in the root set for the life of the registry. The record
//! carries everything the collector and allocator need at runtime:
//! the parent link, payload size, the reflected field list, and the
//! type-erased construction/destruction callbacks captured at registration.

use std::alloc::{alloc, handle_alloc_error, Layout};
use std::any::TypeId;
use std::cell::RefCell;
use std::collections::HashMap;
use std::mem;
use std::ptr;

use crate::field::{Field, Reflect};
use crate::flags::ObjectFlags;
use crate::object::{is_valid, Object, ObjectType};
use crate::pool::{allocate_object, ObjectHeader, MAGIC_OBJECT_HEADER};
use crate::roots::add_to_root_set;

// ============================================================================
// Class - Per-type metadata record
// ============================================================================

/// Runtime metadata for one registered type.
#[repr(C)]
pub struct Class {
    base: Object,
    parent: *mut Class,
    name: &'static str,
    size: u32,
    fields: Vec<Field>,
    construct_fn: unsafe fn(*mut u8),
    drop_fn: unsafe fn(*mut u8),
    begin_destroy_fn: unsafe fn(*mut Object),
    destroy_finished_fn: unsafe fn(*const Object) -> bool,
    end_destroy_fn: unsafe fn(*mut Object),
    static_instance: *mut Object,
}

impl Class {
    /// The type's display name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// The parent class, or null for the root object type and for value
    /// aggregates.
    #[must_use]
    pub const fn parent(&self) -> *mut Self {
        self.parent
    }

    /// Payload size in bytes of instances of this type.
    #[must_use]
    pub const fn size(&self) -> u32 {
        self.size
    }

    /// The reflected field descriptors, parents first, in declaration
    /// order.
    #[must_use]
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// The canonical (statically allocated, never collected) instance of
    /// this type, or null for value aggregates.
    #[must_use]
    pub const fn static_instance(&self) -> *mut Object {
        self.static_instance
    }

    /// Whether this class is `other` or has `other` somewhere in its
    /// parent chain.
    #[must_use]
    pub fn is_derived_from_class(&self, other: *mut Self) -> bool {
        if !is_valid(other.cast_const()) {
            return false;
        }

        let mut current = ptr::from_ref(self);
        loop {
            if ptr::eq(current, other.cast_const()) {
                return true;
            }
            // SAFETY: class records are root-pinned and never reclaimed.
            let parent = unsafe { (*current).parent };
            if !is_valid(parent.cast_const()) {
                return false;
            }
            current = parent.cast_const();
        }
    }

    /// Typed convenience over [`is_derived_from_class`].
    ///
    /// [`is_derived_from_class`]: Self::is_derived_from_class
    #[must_use]
    pub fn is_derived_from<T: ObjectType>(&self) -> bool {
        self.is_derived_from_class(static_class::<T>())
    }

    /// Every registered class whose parent chain contains this class,
    /// excluding the class itself. Linear scan of the universal registry.
    #[must_use]
    pub fn derived_classes(&self) -> Vec<*mut Self> {
        let self_ptr = ptr::from_ref(self).cast_mut();
        registered_classes()
            .into_iter()
            .filter(|&class| {
                !ptr::eq(class, self_ptr)
                    // SAFETY: registry entries are live, root-pinned records.
                    && unsafe { (*class).is_derived_from_class(self_ptr) }
            })
            .collect()
    }

    /// Run the default-construct callback into `payload`.
    ///
    /// # Safety
    ///
    /// `payload` must be writable, 16-aligned, and at least `size` bytes.
    /// The caller assigns the class back-pointer afterwards.
    pub unsafe fn construct(&self, payload: *mut u8) {
        // SAFETY: forwarded to the caller.
        unsafe { (self.construct_fn)(payload) };
    }

    /// Drop the payload in place. Called exactly once, at reclamation.
    pub(crate) unsafe fn drop_payload(&self, payload: *mut u8) {
        // SAFETY: forwarded to the caller.
        unsafe { (self.drop_fn)(payload) };
    }

    pub(crate) unsafe fn invoke_begin_destroy(&self, object: *mut Object) {
        // SAFETY: the hook was registered for the object's concrete type.
        unsafe { (self.begin_destroy_fn)(object) };
    }

    pub(crate) unsafe fn invoke_destroy_finished(&self, object: *const Object) -> bool {
        // SAFETY: the hook was registered for the object's concrete type.
        unsafe { (self.destroy_finished_fn)(object) }
    }

    pub(crate) unsafe fn invoke_end_destroy(&self, object: *mut Object) {
        // SAFETY: the hook was registered for the object's concrete type.
        unsafe { (self.end_destroy_fn)(object) };
    }
}

impl Default for Class {
    fn default() -> Self {
        Self {
            base: Object::default(),
            parent: ptr::null_mut(),
            name: "",
            size: 0,
            fields: Vec::new(),
            construct_fn: construct_noop,
            drop_fn: drop_noop,
            begin_destroy_fn: hook_noop,
            destroy_finished_fn: destroy_finished_true,
            end_destroy_fn: hook_noop,
            static_instance: ptr::null_mut(),
        }
    }
}

// SAFETY: `Class` exposes no reflected fields of its own.
unsafe impl Reflect for Class {
    const NAME: &'static str = "Class";

    fn reflect_fields(_fields: &mut Vec<Field>) {}
}

// SAFETY: repr(C) with the `Object` base as first field.
unsafe impl ObjectType for Class {
    type Parent = Object;
}

// ============================================================================
// Type-erased callback shims
// ============================================================================

const unsafe fn construct_noop(_payload: *mut u8) {}
const unsafe fn drop_noop(_payload: *mut u8) {}
const unsafe fn hook_noop(_object: *mut Object) {}
const unsafe fn destroy_finished_true(_object: *const Object) -> bool {
    true
}

unsafe fn construct_value<T: Default>(payload: *mut u8) {
    // SAFETY: caller provides a writable, aligned slot of at least
    // `size_of::<T>()` bytes.
    unsafe { payload.cast::<T>().write(T::default()) };
}

unsafe fn drop_value<T>(payload: *mut u8) {
    // SAFETY: caller guarantees the payload holds a live T.
    unsafe { ptr::drop_in_place(payload.cast::<T>()) };
}

unsafe fn begin_destroy_hook<T: ObjectType>(object: *mut Object) {
    // SAFETY: the object was allocated as a T.
    unsafe { T::on_begin_destroy(&mut *object.cast::<T>()) };
}

unsafe fn destroy_finished_hook<T: ObjectType>(object: *const Object) -> bool {
    // SAFETY: the object was allocated as a T.
    unsafe { T::is_destroy_finished(&*object.cast::<T>()) }
}

unsafe fn end_destroy_hook<T: ObjectType>(object: *mut Object) {
    // SAFETY: the object was allocated as a T.
    unsafe { T::on_end_destroy(&mut *object.cast::<T>()) };
}

// ============================================================================
// Universal registry
// ============================================================================

struct ClassRegistry {
    by_type: HashMap<TypeId, *mut Class>,
    classes: Vec<*mut Class>,
}

thread_local! {
    /// Thread-local universal class registry.
    static REGISTRY: RefCell<ClassRegistry> = RefCell::new(ClassRegistry {
        by_type: HashMap::new(),
        classes: Vec::new(),
    });

    /// Canonical instances, one leaked allocation per type.
    static INSTANCES: RefCell<HashMap<TypeId, *mut u8>> = RefCell::new(HashMap::new());
}

fn lookup_class(type_id: TypeId) -> Option<*mut Class> {
    REGISTRY.with(|registry| registry.borrow().by_type.get(&type_id).copied())
}

fn register_class(type_id: TypeId, class: *mut Class) {
    REGISTRY.with(|registry| {
        let mut registry = registry.borrow_mut();
        registry.by_type.insert(type_id, class);
        registry.classes.push(class);
    });
}

/// Snapshot of every registered class, in registration order.
#[must_use]
pub fn registered_classes() -> Vec<*mut Class> {
    REGISTRY.with(|registry| registry.borrow().classes.clone())
}

pub(crate) fn reset_for_testing() {
    REGISTRY.with(|registry| {
        let mut registry = registry.borrow_mut();
        registry.by_type.clear();
        registry.classes.clear();
    });
    // Canonical instances are leaked by design; forget the stale pointers.
    INSTANCES.with(|instances| instances.borrow_mut().clear());
}

/// Allocate a pooled, default-initialized class record.
fn alloc_class_record() -> *mut Class {
    #[allow(clippy::cast_possible_truncation)]
    let slot = allocate_object(mem::size_of::<Class>() as u32).cast::<Class>();
    assert!(!slot.is_null(), "failed to allocate a class record");
    // SAFETY: the slot is sized and aligned for a Class.
    unsafe { slot.write(Class::default()) };
    slot
}

/// Append `T`'s field descriptors, parents first.
fn collect_fields<T: ObjectType>(fields: &mut Vec<Field>) {
    if TypeId::of::<T>() != TypeId::of::<T::Parent>() {
        collect_fields::<T::Parent>(fields);
    }
    T::reflect_fields(fields);
}

/// Stable pointer to the class record for `T`, registering it on first
/// demand.
///
/// The record is inserted into the registry *before* its fields are
/// configured, so self-referential and mutually-referential object fields
/// resolve to the partially-configured record instead of recursing.
///
/// # Panics
///
/// Panics when the record cannot be allocated or when `T` requires more
/// than 16-byte alignment.
#[must_use]
pub fn static_class<T: ObjectType>() -> *mut Class {
    let type_id = TypeId::of::<T>();
    if let Some(class) = lookup_class(type_id) {
        return class;
    }

    assert!(
        mem::align_of::<T>() <= 16,
        "type alignment ({}) exceeds the pool slot alignment (16)",
        mem::align_of::<T>()
    );

    let class = alloc_class_record();
    register_class(type_id, class);
    add_to_root_set(class);

    // SAFETY: the record was just written and is not aliased; nested
    // static_class calls below only read the registry, never this record.
    unsafe {
        (*class).name = T::NAME;
        #[allow(clippy::cast_possible_truncation)]
        {
            (*class).size = mem::size_of::<T>() as u32;
        }
        (*class).construct_fn = construct_value::<T>;
        (*class).drop_fn = drop_value::<T>;
        (*class).begin_destroy_fn = begin_destroy_hook::<T>;
        (*class).destroy_finished_fn = destroy_finished_hook::<T>;
        (*class).end_destroy_fn = end_destroy_hook::<T>;
    }

    let parent = if TypeId::of::<T>() == TypeId::of::<T::Parent>() {
        ptr::null_mut()
    } else {
        static_class::<T::Parent>()
    };
    // SAFETY: as above.
    unsafe { (*class).parent = parent };

    let mut fields = Vec::new();
    collect_fields::<T>(&mut fields);
    // SAFETY: as above.
    unsafe { (*class).fields = fields };

    let instance = static_instance::<T>();
    // SAFETY: the canonical instance embeds an Object base at offset zero.
    unsafe {
        (*instance.cast::<Object>()).class = class;
        (*class).static_instance = instance.cast::<Object>();
        (*class).base.class = static_class::<Class>();
    }

    class
}

/// Stable pointer to the class record for a value aggregate, registering it
/// on first demand.
///
/// Value-aggregate classes have a null parent and no canonical instance;
/// they exist so nested struct fields and struct sequences can be traced.
///
/// # Panics
///
/// Panics when the record cannot be allocated or when `S` requires more
/// than 16-byte alignment.
#[must_use]
pub fn struct_class<S>() -> *mut Class
where
    S: Reflect + Default + 'static,
{
    let type_id = TypeId::of::<S>();
    if let Some(class) = lookup_class(type_id) {
        return class;
    }

    assert!(
        mem::align_of::<S>() <= 16,
        "type alignment ({}) exceeds the pool slot alignment (16)",
        mem::align_of::<S>()
    );

    let class = alloc_class_record();
    register_class(type_id, class);
    add_to_root_set(class);

    // SAFETY: freshly written record, not aliased.
    unsafe {
        (*class).name = S::NAME;
        #[allow(clippy::cast_possible_truncation)]
        {
            (*class).size = mem::size_of::<S>() as u32;
        }
        (*class).construct_fn = construct_value::<S>;
        (*class).drop_fn = drop_value::<S>;
    }

    let mut fields = Vec::new();
    S::reflect_fields(&mut fields);
    // SAFETY: as above.
    unsafe {
        (*class).fields = fields;
        (*class).base.class = static_class::<Class>();
    }

    class
}

// ============================================================================
// Canonical instances
// ============================================================================

/// Stable pointer to the canonical instance of `T`.
///
/// The instance is allocated once per type outside the pools (it is never
/// collected), behind a real header so header-derived queries on it are
/// well defined. Its class back-pointer is assigned when the type's class
/// record is configured.
#[must_use]
pub fn static_instance<T: ObjectType>() -> *mut T {
    let type_id = TypeId::of::<T>();
    let existing =
        INSTANCES.with(|instances| instances.borrow().get(&type_id).copied());
    if let Some(instance) = existing {
        return instance.cast::<T>();
    }

    let instance = alloc_canonical::<T>();
    INSTANCES
        .with(|instances| {
            *instances
                .borrow_mut()
                .entry(type_id)
                .or_insert_with(|| instance.cast::<u8>())
        })
        .cast::<T>()
}

/// Allocate a header-prefixed, permanently-live canonical instance.
fn alloc_canonical<T: Default>() -> *mut T {
    let layout = Layout::from_size_align(
        mem::size_of::<ObjectHeader>() + mem::size_of::<T>(),
        16,
    )
    .expect("canonical instance layout");

    // SAFETY: layout is non-zero sized (the header alone is 16 bytes).
    let base = unsafe { alloc(layout) };
    if base.is_null() {
        handle_alloc_error(layout);
    }

    // SAFETY: `base` spans header + payload, 16-aligned.
    unsafe {
        base.cast::<ObjectHeader>().write(ObjectHeader {
            next_free: ptr::null_mut(),
            generation: 1,
            magic: MAGIC_OBJECT_HEADER,
            flags: ObjectFlags::ALLOCATED,
        });
        let payload = base.add(mem::size_of::<ObjectHeader>()).cast::<T>();
        payload.write(T::default());
        payload
    }
}

#[cfg(test)]
mod tests {
    use super::{registered_classes, static_class, static_instance, Class};
    use crate::object::{is_valid, Object};

    #[test]
    fn root_class_has_no_parent() {
        let object_class = static_class::<Object>();
        assert!(!object_class.is_null());
        unsafe {
            assert_eq!((*object_class).name(), "Object");
            assert!((*object_class).parent().is_null());
            assert!(!is_valid((*object_class).parent().cast_const()));
        }
    }

    #[test]
    fn class_records_are_self_describing() {
        let class_class = static_class::<Class>();
        unsafe {
            assert_eq!((*class_class).name(), "Class");
            assert_eq!((*class_class).parent(), static_class::<Object>());
            // The record describing `Class` is itself classified as `Class`.
            assert_eq!((*class_class).base.class, class_class);
        }
    }

    #[test]
    fn registration_is_idempotent() {
        let first = static_class::<Object>();
        let second = static_class::<Object>();
        assert_eq!(first, second);

        let registered = registered_classes();
        assert_eq!(
            registered.iter().filter(|&&class| class == first).count(),
            1
        );
    }

    #[test]
    fn canonical_instances_are_stable_and_classified() {
        let _ = static_class::<Object>();
        let first = static_instance::<Object>();
        let second = static_instance::<Object>();
        assert_eq!(first, second);

        unsafe {
            assert_eq!((*first).class(), static_class::<Object>());
            assert_eq!((*static_class::<Object>()).static_instance(), first.cast());
        }
    }
}
