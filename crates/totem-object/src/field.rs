//! Self-describing field descriptors.
//!
//! A [`Field`] records what a reflected field is (kind), where it lives
//! (byte offset from the containing aggregate's base), what it is called,
//! and two optional tag bags supplied at registration. The collector walks
//! descriptor lists to discover outgoing references; descriptors never own
//! the memory they describe — they are owned by the containing `Class`.

use std::collections::HashMap;

use crate::class::{static_class, struct_class, Class};
use crate::enums::EnumInfo;
use crate::object::{Object, ObjectType};

// ============================================================================
// Reflect - Registration contract
// ============================================================================

/// A type whose reflected fields can be listed for the class registry.
///
/// Usually derived with `#[derive(Reflect)]`; implemented by hand only for
/// the handful of built-in types.
///
/// # Safety
///
/// `reflect_fields` must push descriptors whose offsets and kinds match the
/// type's actual layout. The collector dereferences object-typed fields at
/// the recorded offsets; a wrong descriptor is undefined behavior.
pub unsafe trait Reflect {
    /// Display name recorded in the class registry.
    const NAME: &'static str;

    /// Append this type's own field descriptors (parents excluded) in
    /// declaration order.
    fn reflect_fields(fields: &mut Vec<Field>);
}

// ============================================================================
// FieldKind - Tagged descriptor variants
// ============================================================================

/// The kind of value a reflected field holds.
#[derive(Debug)]
pub enum FieldKind {
    /// `bool`.
    Bool,
    /// `i32`.
    Int32,
    /// `i64`.
    Int64,
    /// `f32`.
    Real32,
    /// `f64`.
    Real64,
    /// Owned `String`.
    Str,
    /// A reflected enumeration, stored as its `i32` backing value.
    Enum(&'static EnumInfo),
    /// A nullable pointer to another managed object, with the declared
    /// inner class.
    Object(*mut Class),
    /// A nested value aggregate, described by its own class record.
    Struct(*mut Class),
    /// A dynamic sequence (`Vec<T>`).
    Array {
        /// Descriptor for the element kind (offset and name are unused).
        inner: Box<Field>,
        /// Type-erased view of the sequence's data pointer and element
        /// count, monomorphized over the concrete `Vec<T>` at registration.
        raw_parts: unsafe fn(*const u8) -> (*mut u8, usize),
    },
}

// ============================================================================
// Field - One descriptor
// ============================================================================

/// Metadata describing a single reflected field.
#[derive(Debug)]
pub struct Field {
    kind: FieldKind,
    offset: u32,
    name: String,
    flags: Vec<String>,
    params: HashMap<String, String>,
}

impl Field {
    /// Construct a descriptor from its kind, offset, name, and textual
    /// tags.
    ///
    /// Each tag entry is either `key=value` (a parameter) or a bare `key`
    /// (a flag). The grammar is single-pass with no escaping; the first
    /// `=` splits key from value.
    #[must_use]
    pub fn new(kind: FieldKind, offset: u32, name: &str, tags: &[&str]) -> Self {
        let mut flags = Vec::new();
        let mut params = HashMap::new();
        for tag in tags {
            match tag.split_once('=') {
                Some((key, value)) => {
                    params.insert(key.to_owned(), value.to_owned());
                }
                None => flags.push((*tag).to_owned()),
            }
        }

        Self {
            kind,
            offset,
            name: name.to_owned(),
            flags,
            params,
        }
    }

    /// Descriptor for a reflected enumeration field.
    #[must_use]
    pub fn enumeration(info: &'static EnumInfo, offset: u32, name: &str, tags: &[&str]) -> Self {
        Self::new(FieldKind::Enum(info), offset, name, tags)
    }

    /// Descriptor for a nested value aggregate, registering the aggregate's
    /// class on first use.
    #[must_use]
    pub fn nested_struct<S>(offset: u32, name: &str, tags: &[&str]) -> Self
    where
        S: Reflect + Default + 'static,
    {
        Self::new(FieldKind::Struct(struct_class::<S>()), offset, name, tags)
    }

    /// Descriptor for a `Vec<T>` field.
    ///
    /// # Panics
    ///
    /// Panics when `T` is itself a sequence; arrays of arrays are not
    /// supported by the reflection system.
    #[must_use]
    pub fn array_of<T: Reflected>(offset: u32, name: &str, tags: &[&str]) -> Self {
        let inner = T::field(0, "", &[]);
        assert!(
            !matches!(inner.kind, FieldKind::Array { .. }),
            "arrays of arrays are not supported by the reflection system"
        );

        Self::new(
            FieldKind::Array {
                inner: Box::new(inner),
                raw_parts: vec_raw_parts::<T>,
            },
            offset,
            name,
            tags,
        )
    }

    /// The field's kind tag.
    #[must_use]
    pub const fn kind(&self) -> &FieldKind {
        &self.kind
    }

    /// Byte offset from the containing aggregate's base.
    #[must_use]
    pub const fn offset(&self) -> u32 {
        self.offset
    }

    /// The field's declared name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Address of this field within the aggregate rooted at `base`.
    #[must_use]
    pub fn untyped_ptr(&self, base: *mut u8) -> *mut u8 {
        base.wrapping_add(self.offset as usize)
    }

    /// Typed view of this field within the aggregate rooted at `base`.
    ///
    /// The caller is responsible for matching `V` to the descriptor's kind.
    #[must_use]
    pub fn value_ptr<V>(&self, base: *mut u8) -> *mut V {
        self.untyped_ptr(base).cast::<V>()
    }

    /// View of an object-typed field as a slot holding an object pointer.
    #[must_use]
    pub fn object_slot(&self, base: *mut u8) -> *mut *mut Object {
        self.value_ptr::<*mut Object>(base)
    }

    /// The element descriptor of an array field, if this is one.
    #[must_use]
    pub fn array_inner(&self) -> Option<&Self> {
        match &self.kind {
            FieldKind::Array { inner, .. } => Some(inner),
            _ => None,
        }
    }

    /// Data pointer and element count of the sequence at this field within
    /// `base`, if this is an array field.
    #[must_use]
    pub fn array_raw_parts(&self, base: *mut u8) -> Option<(*mut u8, usize)> {
        match &self.kind {
            FieldKind::Array { raw_parts, .. } => {
                // SAFETY: the descriptor was registered against the concrete
                // Vec type stored at this offset.
                Some(unsafe { raw_parts(self.untyped_ptr(base).cast_const()) })
            }
            _ => None,
        }
    }

    /// Whether the boolean tag `name` was supplied at registration.
    #[must_use]
    pub fn has_flag(&self, name: &str) -> bool {
        self.flags.iter().any(|flag| flag == name)
    }

    /// Whether the parameter tag `name` was supplied at registration.
    #[must_use]
    pub fn has_param(&self, name: &str) -> bool {
        self.params.contains_key(name)
    }

    /// The value of parameter `name`, or the empty string when absent.
    #[must_use]
    pub fn param(&self, name: &str) -> &str {
        self.params.get(name).map_or("", String::as_str)
    }

    /// All boolean tags, in registration order.
    #[must_use]
    pub fn flags(&self) -> &[String] {
        &self.flags
    }

    /// All parameter tags.
    #[must_use]
    pub const fn params(&self) -> &HashMap<String, String> {
        &self.params
    }
}

/// Read a `Vec<T>`'s data pointer and length through an untyped base.
unsafe fn vec_raw_parts<T>(base: *const u8) -> (*mut u8, usize) {
    // SAFETY: caller guarantees `base` addresses a live `Vec<T>`.
    let vec = unsafe { &*base.cast::<Vec<T>>() };
    (vec.as_ptr().cast_mut().cast::<u8>(), vec.len())
}

// ============================================================================
// Reflected - Field type mapping
// ============================================================================

/// Maps a Rust field type to its descriptor.
///
/// Only types the reflection system understands implement this trait;
/// exposing any other type is rejected at compile time.
pub trait Reflected {
    /// Build the descriptor for a field of this type.
    fn field(offset: u32, name: &str, tags: &[&str]) -> Field;
}

macro_rules! impl_reflected_for_primitives {
    ($($ty:ty => $kind:ident),* $(,)?) => {
        $(
            impl Reflected for $ty {
                fn field(offset: u32, name: &str, tags: &[&str]) -> Field {
                    Field::new(FieldKind::$kind, offset, name, tags)
                }
            }
        )*
    };
}

impl_reflected_for_primitives! {
    bool => Bool,
    i32 => Int32,
    i64 => Int64,
    f32 => Real32,
    f64 => Real64,
    String => Str,
}

impl<T: ObjectType> Reflected for *mut T {
    fn field(offset: u32, name: &str, tags: &[&str]) -> Field {
        Field::new(FieldKind::Object(static_class::<T>()), offset, name, tags)
    }
}

impl<T: Reflected> Reflected for Vec<T> {
    fn field(offset: u32, name: &str, tags: &[&str]) -> Field {
        Field::array_of::<T>(offset, name, tags)
    }
}
