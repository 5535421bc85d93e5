//! A runtime-managed object system: pooled allocation, runtime reflection,
//! and tracing mark-sweep garbage collection.
//!
//! `totem-object` gives application code a managed heap of pool-allocated
//! objects that reference each other freely (including through sequences
//! and nested value aggregates) without dangling pointers ever being
//! observed as valid. Three cooperating pieces make that work:
//!
//! - **Object pools** — header-prefixed fixed-stride slots with generation
//!   counters, grown in blocks of 128 and recycled through free lists.
//! - **The reflection registry** — a per-type [`Class`] record listing
//!   every reflected field, so the collector can discover outgoing
//!   references at runtime.
//! - **The collector** — stop-the-world mark-and-sweep over the explicit
//!   root set, with staged (two-phase) destruction and auto-nulling of
//!   references to dying objects.
//!
//! # Quick start
//!
//! ```ignore
//! use totem_object::{
//!     add_to_root_set, collect_garbage, is_valid, new_object, Object, ObjectType, Reflect,
//! };
//!
//! #[derive(Reflect)]
//! #[repr(C)]
//! struct Node {
//!     base: Object,
//!     next: *mut Object,
//! }
//!
//! # impl Default for Node {
//! #     fn default() -> Self { Self { base: Object::default(), next: std::ptr::null_mut() } }
//! # }
//! unsafe impl ObjectType for Node {
//!     type Parent = Object;
//! }
//!
//! let a = new_object::<Node>();
//! let b = new_object::<Node>();
//! add_to_root_set(a);
//! unsafe { (*a).next = b.cast() };
//!
//! collect_garbage(); // both survive: a is rooted, b is reachable from a
//! assert!(is_valid(a) && is_valid(b));
//!
//! unsafe { (*a).next = std::ptr::null_mut() };
//! collect_garbage(); // b is now unreachable and reclaimed
//! assert!(!is_valid(b));
//! ```
//!
//! # Model
//!
//! The system is single-threaded and cooperative: every global (the class
//! registry, the root set, the strong-handle registry, the pools) is
//! thread-local, and a collection cycle runs synchronously to completion.
//! Objects are referenced by raw pointers; a freshly allocated object is
//! flagged unreachable and must be attached to a rooted graph (or retained
//! by a [`StrongHandle`]) before the next collection, or it will be
//! reclaimed.

#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::not_unsafe_ptr_arg_deref)]

pub mod class;
pub mod enums;
pub mod field;
pub mod flags;
pub mod gc;
pub mod handles;
pub mod object;
pub mod pool;
pub mod roots;

pub use class::{registered_classes, static_class, static_instance, struct_class, Class};
pub use enums::{static_enum, EnumInfo, ReflectedEnum};
pub use field::{Field, FieldKind, Reflect, Reflected};
pub use flags::ObjectFlags;
pub use gc::collect_garbage;
pub use handles::{StrongHandle, WeakHandle};
pub use object::{
    destroy, generation, is_valid, new_object, new_object_from_class, object_flags,
    try_complete_destruction, Object, ObjectType,
};
pub use pool::{header_for_object, ObjectHeader, ObjectPool, MAGIC_OBJECT_HEADER};
pub use roots::{add_to_root_set, remove_from_root_set, RootSet};

// Re-export the registration derives when the feature is enabled.
#[cfg(feature = "derive")]
pub use totem_object_derive::{Reflect, ReflectEnum};

/// Helpers for tests that need a pristine object system.
pub mod test_util {
    /// Reset all thread-local object-system state for the calling thread.
    ///
    /// Clears the root set, drops every pool block, and empties the class,
    /// instance, and strong-handle registries. Canonical instances remain
    /// leaked; raw pointers obtained before the reset are dangling.
    pub fn reset() {
        crate::roots::with_roots(|roots| roots.clear());
        crate::pool::with_pools(Vec::clear);
        crate::class::reset_for_testing();
        crate::handles::reset_for_testing();
        crate::gc::reset_for_testing();
    }
}
