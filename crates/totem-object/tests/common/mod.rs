//! Shared fixture types for the integration tests.
#![allow(dead_code)]

use std::ptr;

use totem_object::{Object, ObjectType, Reflect};

// ============================================================================
// Value aggregates
// ============================================================================

#[derive(Reflect)]
#[reflect(value)]
#[repr(C)]
pub struct SubStruct {
    pub objref: *mut Object,
}

impl Default for SubStruct {
    fn default() -> Self {
        Self {
            objref: ptr::null_mut(),
        }
    }
}

#[derive(Reflect)]
#[reflect(value)]
#[repr(C)]
pub struct InnerStruct {
    pub objref: *mut Object,
    pub objlist: Vec<*mut Object>,
    pub sub_structs: Vec<SubStruct>,
}

impl Default for InnerStruct {
    fn default() -> Self {
        Self {
            objref: ptr::null_mut(),
            objlist: Vec::new(),
            sub_structs: Vec::new(),
        }
    }
}

// ============================================================================
// Object types
// ============================================================================

/// Kitchen-sink fixture exercising every field kind.
#[derive(Reflect)]
#[repr(C)]
pub struct TestObject {
    pub base: Object,
    pub some_boolean: bool,
    #[reflect(tags("transient", "min=0", "category=stats"))]
    pub some_int32: i32,
    pub some_int64: i64,
    pub some_real32: f32,
    pub some_real64: f64,
    pub some_name: String,
    pub some_other_object: *mut Object,
    pub some_other_objects: Vec<*mut Object>,
    pub some_struct: InnerStruct,
}

impl Default for TestObject {
    fn default() -> Self {
        Self {
            base: Object::default(),
            some_boolean: false,
            some_int32: 0,
            some_int64: 0,
            some_real32: 0.0,
            some_real64: 0.0,
            some_name: String::new(),
            some_other_object: ptr::null_mut(),
            some_other_objects: Vec::new(),
            some_struct: InnerStruct::default(),
        }
    }
}

// SAFETY: repr(C) with the Object base as first field.
unsafe impl ObjectType for TestObject {
    type Parent = Object;
}

#[derive(Reflect)]
#[repr(C)]
pub struct TestReferencingObject {
    pub base: Object,
    pub next: *mut Object,
}

impl Default for TestReferencingObject {
    fn default() -> Self {
        Self {
            base: Object::default(),
            next: ptr::null_mut(),
        }
    }
}

// SAFETY: repr(C) with the Object base as first field.
unsafe impl ObjectType for TestReferencingObject {
    type Parent = Object;
}

#[derive(Reflect, Default)]
#[repr(C)]
pub struct TestReferencingArrayObject {
    pub base: Object,
    pub others: Vec<*mut Object>,
}

// SAFETY: repr(C) with the Object base as first field.
unsafe impl ObjectType for TestReferencingArrayObject {
    type Parent = Object;
}

/// Defers destruction until `finished_destruction` is flipped.
#[derive(Reflect, Default)]
#[repr(C)]
pub struct TestDelayedDestroyObject {
    pub base: Object,
    #[reflect(skip)]
    pub finished_destruction: bool,
}

// SAFETY: repr(C) with the Object base as first field.
unsafe impl ObjectType for TestDelayedDestroyObject {
    type Parent = Object;

    fn is_destroy_finished(&self) -> bool {
        self.finished_destruction
    }
}

#[derive(Reflect)]
#[repr(C)]
pub struct TestDerivedObject {
    pub base: TestReferencingObject,
    pub depth: i32,
}

impl Default for TestDerivedObject {
    fn default() -> Self {
        Self {
            base: TestReferencingObject::default(),
            depth: 0,
        }
    }
}

// SAFETY: repr(C) with the parent type as first field.
unsafe impl ObjectType for TestDerivedObject {
    type Parent = TestReferencingObject;
}
