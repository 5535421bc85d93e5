//! Object lifecycle flags.
//!
//! Every pooled slot carries an [`ObjectFlags`] byte in its header. The
//! collector drives the `UNREACHABLE` / destruction bits; the root set owns
//! `IN_ROOT_SET`.

use bitflags::bitflags;

bitflags! {
    /// Per-slot lifecycle state stored in the object header.
    ///
    /// The flag operations follow the usual bit-set contract: `intersects`
    /// tests for any overlap, `contains` requires the full mask, and
    /// `insert`/`remove` mutate in place.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ObjectFlags: u8 {
        /// The slot payload holds a live, constructed object.
        const ALLOCATED = 1 << 0;
        /// Not yet reached during the current collection cycle.
        ///
        /// Set at allocation time and re-armed after every sweep, so a
        /// fresh object that is never attached to a live graph is
        /// collectable on the very next cycle.
        const UNREACHABLE = 1 << 1;
        /// The object is a member of the explicit root set.
        const IN_ROOT_SET = 1 << 2;
        /// Teardown has begun but `is_destroy_finished` has not yet
        /// reported true.
        const IS_BEING_DESTROYED = 1 << 3;
        /// The destruction hooks have run to completion; the slot may be
        /// reclaimed.
        const IS_DESTROYED = 1 << 4;
    }
}

impl ObjectFlags {
    /// Mask covering both destruction phases.
    pub const DYING: Self = Self::IS_BEING_DESTROYED.union(Self::IS_DESTROYED);
}

#[cfg(test)]
mod tests {
    use super::ObjectFlags;

    #[test]
    fn flag_set_test_clear() {
        let mut flags = ObjectFlags::empty();
        flags.insert(ObjectFlags::ALLOCATED);
        flags.insert(ObjectFlags::UNREACHABLE);

        assert!(flags.intersects(ObjectFlags::ALLOCATED));
        assert!(flags.contains(ObjectFlags::ALLOCATED | ObjectFlags::UNREACHABLE));
        assert!(!flags.contains(ObjectFlags::ALLOCATED | ObjectFlags::IN_ROOT_SET));

        flags.remove(ObjectFlags::UNREACHABLE);
        assert!(!flags.intersects(ObjectFlags::UNREACHABLE));
        assert!(flags.intersects(ObjectFlags::ALLOCATED));
    }

    #[test]
    fn dying_mask_covers_both_phases() {
        assert!(ObjectFlags::IS_BEING_DESTROYED.intersects(ObjectFlags::DYING));
        assert!(ObjectFlags::IS_DESTROYED.intersects(ObjectFlags::DYING));
        assert!(!ObjectFlags::ALLOCATED.intersects(ObjectFlags::DYING));
    }
}
