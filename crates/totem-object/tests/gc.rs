//! Garbage collection behavior: reachability, auto-nulling, and staged
//! destruction.

mod common;

use std::ptr;

use common::{SubStruct, TestDelayedDestroyObject, TestObject, TestReferencingArrayObject, TestReferencingObject};
use totem_object::{
    add_to_root_set, collect_garbage, destroy, generation, is_valid, new_object, object_flags,
    remove_from_root_set, Object, ObjectFlags, ObjectType, Reflect,
};

#[test]
fn unreferenced_objects_are_collected() {
    let object = new_object::<TestReferencingObject>();
    let object2 = new_object::<TestReferencingObject>();

    assert!(is_valid(object));
    assert!(is_valid(object2));
    assert_eq!(generation(object), 1);
    assert_eq!(generation(object2), 1);

    collect_garbage();

    assert!(!is_valid(object));
    assert!(!is_valid(object2));
}

#[test]
fn root_set_objects_are_not_collected() {
    let object = new_object::<TestReferencingObject>();
    let object2 = new_object::<TestReferencingObject>();

    add_to_root_set(object);
    collect_garbage();

    assert!(is_valid(object));
    assert!(!is_valid(object2));

    remove_from_root_set(object);
    collect_garbage();

    assert!(!is_valid(object));
}

#[test]
fn rooted_objects_survive_repeated_cycles() {
    let object = new_object::<TestReferencingObject>();
    add_to_root_set(object);

    for _ in 0..3 {
        collect_garbage();
        assert!(is_valid(object));
    }
}

#[test]
fn objects_referenced_from_the_root_set_are_kept() {
    let object = new_object::<TestReferencingObject>();
    let object2 = new_object::<TestReferencingObject>();
    let object3 = new_object::<TestReferencingObject>();

    add_to_root_set(object);
    unsafe {
        (*object).next = object2.cast::<Object>();
        (*object2).next = object3.cast::<Object>();
    }

    collect_garbage();

    assert!(is_valid(object));
    assert!(is_valid(object2));
    assert!(is_valid(object3));

    // Stop referencing object3.
    unsafe { (*object2).next = ptr::null_mut() };

    collect_garbage();

    assert!(is_valid(object));
    assert!(is_valid(object2));
    assert!(!is_valid(object3));
}

#[test]
fn cycles_are_reclaimed_once_unrooted() {
    let a = new_object::<TestReferencingObject>();
    let b = new_object::<TestReferencingObject>();

    add_to_root_set(a);
    unsafe {
        (*a).next = b.cast::<Object>();
        (*b).next = a.cast::<Object>();
    }

    collect_garbage();
    assert!(is_valid(a));
    assert!(is_valid(b));

    remove_from_root_set(a);
    collect_garbage();

    assert!(!is_valid(a));
    assert!(!is_valid(b));
}

#[test]
fn objects_referenced_through_arrays_are_kept() {
    let object = new_object::<TestReferencingArrayObject>();
    let object2 = new_object::<TestReferencingArrayObject>();
    let object3 = new_object::<TestReferencingObject>();
    let object4 = new_object::<TestReferencingObject>();

    add_to_root_set(object);
    unsafe {
        (*object).others.push(object2.cast::<Object>());
        (*object).others.push(object3.cast::<Object>());
        (*object2).others.push(object4.cast::<Object>());
    }

    collect_garbage();

    assert!(is_valid(object));
    assert!(is_valid(object2));
    assert!(is_valid(object3));
    assert!(is_valid(object4));

    unsafe { (*object2).others.clear() };

    collect_garbage();

    assert!(is_valid(object));
    assert!(is_valid(object2));
    assert!(is_valid(object3));
    assert!(!is_valid(object4));

    // Drop the reference to object3 as well.
    unsafe { (*object).others.truncate(1) };

    collect_garbage();

    assert!(is_valid(object));
    assert!(is_valid(object2));
    assert!(!is_valid(object3));
}

#[test]
fn objects_referenced_through_structs_are_kept() {
    let object = new_object::<TestObject>();
    let object2 = new_object::<TestObject>();
    let object3 = new_object::<TestObject>();

    add_to_root_set(object);
    unsafe { (*object).some_struct.objref = object2.cast::<Object>() };

    collect_garbage();

    assert!(is_valid(object));
    assert!(is_valid(object2));
    assert!(!is_valid(object3));

    unsafe {
        (*object).some_struct.objref = ptr::null_mut();
        (*object).some_struct.objlist.push(object2.cast::<Object>());
    }

    collect_garbage();

    assert!(is_valid(object));
    assert!(is_valid(object2));

    unsafe {
        (*object).some_struct.objlist.clear();
        (*object).some_struct.sub_structs.push(SubStruct {
            objref: object2.cast::<Object>(),
        });
    }

    collect_garbage();

    assert!(is_valid(object));
    assert!(is_valid(object2));

    unsafe { (*object).some_struct.sub_structs.clear() };

    collect_garbage();

    assert!(is_valid(object));
    assert!(!is_valid(object2));
}

#[test]
fn references_to_destroyed_objects_are_nulled() {
    let object = new_object::<TestReferencingObject>();
    let object_to_destroy = new_object::<TestReferencingObject>();

    add_to_root_set(object);
    unsafe { (*object).next = object_to_destroy.cast::<Object>() };

    assert!(is_valid(object));
    assert!(unsafe { is_valid((*object).next.cast_const()) });

    destroy(object_to_destroy);

    // The physical pointer is untouched until the next mark phase.
    assert!(is_valid(object));
    unsafe {
        assert!(!is_valid((*object).next.cast_const()));
        assert_eq!((*object).next, object_to_destroy.cast::<Object>());
    }

    collect_garbage();

    assert!(is_valid(object));
    assert!(unsafe { (*object).next.is_null() });
}

#[test]
fn references_are_nulled_while_destruction_is_deferred() {
    let object = new_object::<TestReferencingObject>();
    let object_to_destroy = new_object::<TestDelayedDestroyObject>();

    add_to_root_set(object);
    unsafe { (*object).next = object_to_destroy.cast::<Object>() };

    destroy(object_to_destroy);

    let flags = object_flags(object_to_destroy.cast_const());
    assert!(flags.intersects(ObjectFlags::IS_BEING_DESTROYED));
    assert!(!flags.intersects(ObjectFlags::IS_DESTROYED));
    unsafe {
        assert!(!is_valid((*object).next.cast_const()));
        assert_eq!((*object).next, object_to_destroy.cast::<Object>());
    }

    collect_garbage();

    // Auto-nulled, but the slot is not reclaimed until teardown finishes.
    assert!(unsafe { (*object).next.is_null() });
    let flags = object_flags(object_to_destroy.cast_const());
    assert!(flags.intersects(ObjectFlags::IS_BEING_DESTROYED));
    assert!(!flags.intersects(ObjectFlags::IS_DESTROYED));

    unsafe { (*object_to_destroy).finished_destruction = true };
    collect_garbage();

    let flags = object_flags(object_to_destroy.cast_const());
    assert!(!flags.intersects(ObjectFlags::IS_BEING_DESTROYED));
    assert!(flags.intersects(ObjectFlags::IS_DESTROYED));
}

// ============================================================================
// Collector re-entrancy
// ============================================================================

#[derive(Reflect, Default)]
#[repr(C)]
struct ReentrantDestroyObject {
    base: Object,
}

// SAFETY: repr(C) with the Object base as first field.
unsafe impl ObjectType for ReentrantDestroyObject {
    type Parent = Object;

    fn on_begin_destroy(&mut self) {
        // Reentrant invocation during a sweep must be a no-op.
        collect_garbage();
    }
}

#[test]
fn reentrant_collection_during_destruction_is_a_noop() {
    let object = new_object::<ReentrantDestroyObject>();
    assert!(is_valid(object));

    collect_garbage();

    assert!(!is_valid(object));
}
