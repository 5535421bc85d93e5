//! Mark-and-sweep garbage collection.
//!
//! A collection cycle is one synchronous pass: trace everything reachable
//! from the root set (clearing `UNREACHABLE` along the way, auto-nulling
//! references to dying objects), then stride through every pool block and
//! reclaim what stayed unreachable, driving two-phase destruction as it
//! goes. Survivors are re-armed for the next cycle.

use std::cell::Cell;
use std::mem;
use std::ptr;

use crate::class::Class;
use crate::field::{Field, FieldKind};
use crate::flags::ObjectFlags;
use crate::object::{destroy, try_complete_destruction, Object};
use crate::pool::{header_for_object, with_pools, ObjectHeader, MAGIC_OBJECT_HEADER};
use crate::roots::with_roots;

thread_local! {
    /// Whether a collection cycle is in progress on this thread.
    static IN_COLLECT: Cell<bool> = const { Cell::new(false) };
}

/// Run one full collection cycle.
///
/// Reentrant invocation (a destruction hook calling back into the
/// collector) is a no-op. The cycle runs to completion before returning.
pub fn collect_garbage() {
    if IN_COLLECT.with(Cell::get) {
        return;
    }
    IN_COLLECT.with(|flag| flag.set(true));

    let roots = with_roots(|roots| roots.snapshot());
    tracing::debug!(roots = roots.len(), "collection cycle started");

    for root in roots {
        mark_root(root);
    }
    let reclaimed = sweep();

    tracing::debug!(reclaimed, "collection cycle finished");
    IN_COLLECT.with(|flag| flag.set(false));
}

pub(crate) fn reset_for_testing() {
    IN_COLLECT.with(|flag| flag.set(false));
}

// ============================================================================
// Mark phase
// ============================================================================

fn mark_root(object: *mut Object) {
    let header = header_for_object(object);
    if header.is_null() {
        tracing::warn!(?object, "skipping root without a valid header");
        return;
    }

    // SAFETY: header_for_object validated the magic sentinel.
    unsafe {
        if !(*header).flags.intersects(ObjectFlags::UNREACHABLE) {
            // Already traced through an earlier root.
            return;
        }
        (*header).flags.remove(ObjectFlags::UNREACHABLE);
    }

    mark_reachable_from(object);
}

fn mark_reachable_from(object: *mut Object) {
    // SAFETY: callers only pass magic-validated, allocated objects.
    let class = unsafe { (*object).class };
    if class.is_null() {
        return;
    }
    mark_fields(object.cast::<u8>(), class);
}

/// Trace one aggregate (an object payload or a nested struct) through its
/// class's descriptor list, in declaration order.
fn mark_fields(base: *mut u8, class: *mut Class) {
    // SAFETY: class records are root-pinned and their field lists are not
    // mutated after registration.
    let fields = unsafe { (*class).fields() };
    for field in fields {
        match field.kind() {
            FieldKind::Object(_) => mark_object_slot(field.object_slot(base)),
            FieldKind::Struct(struct_class) => {
                mark_fields(field.untyped_ptr(base), *struct_class);
            }
            FieldKind::Array { inner, .. } => mark_array(field, base, inner),
            _ => {}
        }
    }
}

/// Visit one stored object reference.
///
/// A reference to a dying object is nulled in place and never recursed
/// into; a live, not-yet-seen referent is cleared and traced.
fn mark_object_slot(slot: *mut *mut Object) {
    if slot.is_null() {
        return;
    }

    // SAFETY: the slot address was derived from a registered field offset.
    let object = unsafe { *slot };
    if object.is_null() {
        return;
    }

    let header = header_for_object(object);
    if header.is_null() {
        tracing::warn!(?object, "skipping reference without a valid header");
        return;
    }

    // SAFETY: magic validated above.
    unsafe {
        let flags = (*header).flags;
        if flags.intersects(ObjectFlags::DYING) {
            *slot = ptr::null_mut();
            return;
        }
        if flags.intersects(ObjectFlags::UNREACHABLE) {
            (*header).flags.remove(ObjectFlags::UNREACHABLE);
            mark_reachable_from(object);
        }
    }
}

fn mark_array(field: &Field, base: *mut u8, inner: &Field) {
    let Some((data, len)) = field.array_raw_parts(base) else {
        return;
    };

    match inner.kind() {
        FieldKind::Object(_) => {
            for index in 0..len {
                let slot = data
                    .wrapping_add(index * mem::size_of::<*mut Object>())
                    .cast::<*mut Object>();
                mark_object_slot(slot);
            }
        }
        FieldKind::Struct(struct_class) => {
            // SAFETY: struct classes are root-pinned records.
            let stride = unsafe { (**struct_class).size() } as usize;
            if stride == 0 {
                return;
            }
            for index in 0..len {
                mark_fields(data.wrapping_add(index * stride), *struct_class);
            }
        }
        _ => {}
    }
}

// ============================================================================
// Sweep phase
// ============================================================================

/// Stride through every block of every pool, reclaiming unreachable slots
/// and re-arming survivors. Returns the number of reclaimed slots.
///
/// Pool state is re-borrowed around every step so destruction hooks are
/// free to allocate; blocks created by such allocations are picked up on
/// the next cycle.
fn sweep() -> usize {
    let mut reclaimed = 0;

    let pool_count = with_pools(|pools| pools.len());
    for pool_index in 0..pool_count {
        let (stride, block_count) = with_pools(|pools| {
            let pool = &pools[pool_index];
            (pool.stride(), pool.block_count())
        });

        for block_index in 0..block_count {
            let (base, len) = with_pools(|pools| pools[pool_index].block_span(block_index));
            let mut offset = 0;
            while offset + stride <= len {
                let header = base.wrapping_add(offset).cast::<ObjectHeader>();
                sweep_slot(header, pool_index, &mut reclaimed);
                offset += stride;
            }
        }
    }

    reclaimed
}

fn sweep_slot(header: *mut ObjectHeader, pool_index: usize, reclaimed: &mut usize) {
    // SAFETY: the header address was derived by striding a live block.
    unsafe {
        if (*header).magic != MAGIC_OBJECT_HEADER {
            tracing::warn!(?header, "skipping slot with corrupt header");
            return;
        }
        if !(*header).flags.intersects(ObjectFlags::ALLOCATED) {
            return;
        }

        if (*header).flags.intersects(ObjectFlags::UNREACHABLE) {
            let object = header.add(1).cast::<Object>();
            if !(*header).flags.intersects(ObjectFlags::DYING) {
                destroy(object);
            }
            if !(*header).flags.intersects(ObjectFlags::IS_DESTROYED) {
                try_complete_destruction(object);
            }
            if (*header).flags.intersects(ObjectFlags::IS_DESTROYED) {
                let class = (*object).class;
                if !class.is_null() {
                    (*class).drop_payload(object.cast::<u8>());
                }
                with_pools(|pools| pools[pool_index].free(object));
                *reclaimed += 1;
            }
        } else {
            // Re-arm for the next cycle.
            (*header).flags.insert(ObjectFlags::UNREACHABLE);
        }
    }
}
