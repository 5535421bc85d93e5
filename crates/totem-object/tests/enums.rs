//! Reflected enumeration metadata and enum-typed fields.

use totem_object::{
    add_to_root_set, collect_garbage, is_valid, new_object, static_class, static_enum, FieldKind,
    Object, ObjectType, Reflect, ReflectEnum,
};

#[derive(ReflectEnum, Clone, Copy, Debug, PartialEq)]
#[repr(i32)]
enum TestColor {
    Red = 1,
    Green = 2,
    DarkBlue = 4,
}

#[derive(ReflectEnum, Clone, Copy)]
#[reflect(flags)]
#[repr(i32)]
enum TestPermissions {
    Read = 1,
    Write = 2,
    Execute = 4,
}

#[derive(ReflectEnum, Clone, Copy)]
#[repr(i32)]
enum TestSequence {
    First,
    Second,
    Tenth = 10,
    Eleventh,
}

#[test]
fn enum_metadata_matches_the_declaration() {
    let info = static_enum::<TestColor>();

    assert_eq!(info.name(), "TestColor");
    assert_eq!(info.values(), [1, 2, 4]);
    assert_eq!(info.enumerators(), ["Red", "Green", "DarkBlue"]);
    assert!(!info.is_enum_flags());
}

#[test]
fn flag_enums_carry_the_flags_bit() {
    assert!(static_enum::<TestPermissions>().is_enum_flags());
    assert_eq!(static_enum::<TestPermissions>().values(), [1, 2, 4]);
}

#[test]
fn implicit_discriminants_continue_from_the_last_explicit_value() {
    assert_eq!(static_enum::<TestSequence>().values(), [0, 1, 10, 11]);
}

#[test]
fn value_and_name_translate_both_ways() {
    let info = static_enum::<TestColor>();

    assert_eq!(info.to_name(2), Some("Green"));
    assert_eq!(info.to_name(3), None);
    assert_eq!(info.from_name("DarkBlue"), 4);
}

#[test]
fn name_lookup_is_case_insensitive_and_misses_return_minus_one() {
    let info = static_enum::<TestColor>();

    assert_eq!(info.from_name("red"), 1);
    assert_eq!(info.from_name("GREEN"), 2);
    assert_eq!(info.from_name("darkblue"), 4);
    assert_eq!(info.from_name("ultraviolet"), -1);
}

// ============================================================================
// Enum-typed fields
// ============================================================================

#[derive(Reflect)]
#[repr(C)]
struct PaintedObject {
    base: Object,
    color: TestColor,
}

impl Default for PaintedObject {
    fn default() -> Self {
        Self {
            base: Object::default(),
            color: TestColor::Red,
        }
    }
}

// SAFETY: repr(C) with the Object base as first field.
unsafe impl ObjectType for PaintedObject {
    type Parent = Object;
}

#[test]
fn enum_fields_are_described_and_readable_through_the_backing_value() {
    let class = static_class::<PaintedObject>();
    let fields = unsafe { (*class).fields() };
    assert_eq!(fields.len(), 1);
    assert_eq!(fields[0].name(), "color");

    let FieldKind::Enum(info) = fields[0].kind() else {
        panic!("expected an enum descriptor");
    };
    assert_eq!(info.name(), "TestColor");

    let object = new_object::<PaintedObject>();
    unsafe {
        (*object).color = TestColor::DarkBlue;
        assert_eq!(*fields[0].value_ptr::<i32>(object.cast::<u8>()), 4);
    }
}

#[test]
fn enum_fields_hold_no_references() {
    let object = new_object::<PaintedObject>();
    add_to_root_set(object);

    collect_garbage();

    assert!(is_valid(object));
    assert_eq!(unsafe { (*object).color }, TestColor::Red);
}
