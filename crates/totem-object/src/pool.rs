//! Block-backed object pool allocation.
//!
//! Every pooled slot is laid out as `[header | payload]`. A pool services a
//! single payload size; pools grow by blocks of 128 slots and recycle slots
//! through an intrusive free list threaded through the headers.

use std::alloc::{alloc, dealloc, Layout};
use std::cell::RefCell;
use std::mem;
use std::ptr::{self, NonNull};

use crate::flags::ObjectFlags;
use crate::object::Object;

// ============================================================================
// Constants
// ============================================================================

/// Sentinel value identifying a slot header.
///
/// Written once when a block is carved into slots and never mutated again;
/// any candidate header whose magic does not match is ignored.
pub const MAGIC_OBJECT_HEADER: u16 = 0xC0FE;

/// Number of slots carved out of each block.
pub const OBJECTS_PER_BLOCK: usize = 128;

/// Alignment of every block, and therefore of every slot payload.
const BLOCK_ALIGN: usize = 16;

// ============================================================================
// ObjectHeader - Metadata prefixed to every slot
// ============================================================================

/// Metadata stored immediately before every pooled payload.
#[repr(C)]
pub struct ObjectHeader {
    /// Link into the pool's free list; undefined while the slot is
    /// allocated.
    pub next_free: *mut ObjectHeader,
    /// Bumped on every allocation and every free of the slot. Weak handles
    /// compare against the generation they captured.
    pub generation: u16,
    /// Must equal [`MAGIC_OBJECT_HEADER`] for the header to be trusted.
    pub magic: u16,
    /// Lifecycle state of the slot.
    pub flags: ObjectFlags,
}

const _: () = assert!(mem::size_of::<ObjectHeader>() == 16);

/// Derive the header for a pooled payload pointer.
///
/// Returns null when the bytes preceding `object` do not carry the magic
/// sentinel; callers are expected to skip the slot (with a diagnostic)
/// rather than fail.
#[must_use]
pub fn header_for_object(object: *const Object) -> *mut ObjectHeader {
    if object.is_null() {
        return ptr::null_mut();
    }

    let header = object
        .cast::<u8>()
        .wrapping_sub(mem::size_of::<ObjectHeader>())
        .cast_mut()
        .cast::<ObjectHeader>();

    // SAFETY: Pooled payloads are always preceded by an in-bounds header;
    // the public contract restricts `object` to pointers handed out by
    // `new_object` or to canonical instances, both of which carry one.
    if unsafe { (*header).magic } != MAGIC_OBJECT_HEADER {
        return ptr::null_mut();
    }

    header
}

// ============================================================================
// Block - One contiguous run of slots
// ============================================================================

/// A contiguous allocation holding [`OBJECTS_PER_BLOCK`] slots.
///
/// Blocks are never freed individually; slot addresses stay stable for the
/// lifetime of the pool.
struct Block {
    ptr: NonNull<u8>,
    len: usize,
}

impl Block {
    /// Allocate a zero-initialized block, or `None` when the underlying
    /// allocator refuses to grow.
    fn new(len: usize) -> Option<Self> {
        let layout = Layout::from_size_align(len, BLOCK_ALIGN).ok()?;
        // SAFETY: layout is non-zero sized.
        let ptr = unsafe { alloc(layout) };
        NonNull::new(ptr).map(|ptr| Self { ptr, len })
    }

    const fn base(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }
}

impl Drop for Block {
    fn drop(&mut self) {
        let layout = Layout::from_size_align(self.len, BLOCK_ALIGN).expect("block layout");
        // SAFETY: the block was allocated with this exact layout.
        unsafe { dealloc(self.ptr.as_ptr(), layout) };
    }
}

// ============================================================================
// ObjectPool - Fixed-stride slot allocator
// ============================================================================

/// A freelist-driven slot allocator for one payload size class.
pub struct ObjectPool {
    /// Payload bytes per slot (already rounded by the size policy).
    elem_size: u32,
    blocks: Vec<Block>,
    free_list: *mut ObjectHeader,
}

impl ObjectPool {
    /// Create an empty pool for the given payload size.
    #[must_use]
    pub const fn new(elem_size: u32) -> Self {
        Self {
            elem_size,
            blocks: Vec::new(),
            free_list: ptr::null_mut(),
        }
    }

    /// Payload size serviced by this pool.
    #[must_use]
    pub const fn elem_size(&self) -> u32 {
        self.elem_size
    }

    /// Distance between consecutive headers in a block.
    #[must_use]
    pub const fn stride(&self) -> usize {
        mem::size_of::<ObjectHeader>() + self.elem_size as usize
    }

    /// Number of blocks owned by this pool.
    #[must_use]
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Base address and length of a block, for header iteration.
    #[must_use]
    pub fn block_span(&self, index: usize) -> (*mut u8, usize) {
        let block = &self.blocks[index];
        (block.base(), block.len)
    }

    /// Pop a slot off the free list, growing by one block when empty.
    ///
    /// The returned pointer is the payload address (header + 1) of a slot
    /// whose generation has been bumped and whose flags read
    /// `ALLOCATED | UNREACHABLE`. The flags are assigned outright so that
    /// destruction bits left behind by a previous occupant cannot leak into
    /// the fresh object. Returns null when the pool cannot grow.
    pub fn allocate(&mut self) -> *mut u8 {
        if self.free_list.is_null() {
            self.allocate_block();
            if self.free_list.is_null() {
                return ptr::null_mut();
            }
        }

        let header = self.free_list;
        // SAFETY: the free list only ever links headers inside live blocks.
        unsafe {
            self.free_list = (*header).next_free;
            (*header).generation = (*header).generation.wrapping_add(1);
            (*header).flags = ObjectFlags::ALLOCATED | ObjectFlags::UNREACHABLE;
            (*header).next_free = ptr::null_mut();
            header.add(1).cast::<u8>()
        }
    }

    /// Return a slot to the free list.
    ///
    /// Only the collector calls this, after the payload has been dropped.
    /// The generation bump invalidates every weak handle that captured the
    /// previous occupancy. Destruction flags are deliberately left in place
    /// so a destroyed object can still be observed as destroyed afterwards.
    pub fn free(&mut self, object: *mut Object) {
        let header = header_for_object(object);
        if header.is_null() {
            tracing::warn!(?object, "refusing to free payload without a valid header");
            return;
        }

        // SAFETY: header_for_object validated the magic sentinel.
        unsafe {
            (*header).generation = (*header).generation.wrapping_add(1);
            (*header)
                .flags
                .remove(ObjectFlags::ALLOCATED | ObjectFlags::UNREACHABLE);
            (*header).next_free = self.free_list;
            self.free_list = header;
        }
    }

    /// Whether `address` falls inside one of this pool's blocks.
    #[must_use]
    pub fn contains_address(&self, address: *const u8) -> bool {
        self.blocks.iter().any(|block| {
            let base = block.base().cast_const();
            base < address && address < base.wrapping_add(block.len)
        })
    }

    /// Carve a new block into slots and thread them onto the free list.
    ///
    /// The last slot of the new block links to the previous free-list head
    /// so partially-consumed blocks chain cleanly.
    fn allocate_block(&mut self) {
        let stride = self.stride();
        let Some(block) = Block::new(OBJECTS_PER_BLOCK * stride) else {
            tracing::warn!(elem_size = self.elem_size, "object pool failed to grow");
            return;
        };

        let base = block.base();
        for index in 0..OBJECTS_PER_BLOCK {
            // SAFETY: `index * stride` stays within the freshly allocated
            // block, and blocks are 16-aligned with a 16-multiple stride, so
            // every header is well aligned.
            unsafe {
                let header = base.add(index * stride).cast::<ObjectHeader>();
                let next_free = if index < OBJECTS_PER_BLOCK - 1 {
                    base.add((index + 1) * stride).cast::<ObjectHeader>()
                } else {
                    self.free_list
                };
                header.write(ObjectHeader {
                    next_free,
                    generation: 0,
                    magic: MAGIC_OBJECT_HEADER,
                    flags: ObjectFlags::empty(),
                });
            }
        }

        self.free_list = base.cast::<ObjectHeader>();
        self.blocks.push(block);
    }
}

// ============================================================================
// Pool registry and size policy
// ============================================================================

thread_local! {
    /// Thread-local list of pools, one per size class.
    static POOLS: RefCell<Vec<ObjectPool>> = const { RefCell::new(Vec::new()) };
}

/// Execute a function with access to the thread-local pool list.
pub fn with_pools<F, R>(f: F) -> R
where
    F: FnOnce(&mut Vec<ObjectPool>) -> R,
{
    POOLS.with(|pools| f(&mut pools.borrow_mut()))
}

/// Map a requested payload size to its pool size class.
///
/// Sizes round up to a multiple of 16 so that headers stay aligned at every
/// stride step. Rounding never merges overlapping allocations; it only
/// widens the slot.
#[must_use]
pub const fn pool_size_for_object_size(object_size: u32) -> u32 {
    let object_size = if object_size == 0 { 1 } else { object_size };
    (object_size + 15) & !15
}

/// Allocate a slot for a payload of `object_size` bytes.
///
/// Finds or creates the pool for the size class and returns the payload
/// address, or null on allocation failure.
pub(crate) fn allocate_object(object_size: u32) -> *mut u8 {
    let pool_size = pool_size_for_object_size(object_size);
    with_pools(|pools| {
        if let Some(pool) = pools.iter_mut().find(|pool| pool.elem_size() == pool_size) {
            return pool.allocate();
        }
        pools.push(ObjectPool::new(pool_size));
        pools.last_mut().expect("pool just pushed").allocate()
    })
}

/// Find the pool whose blocks contain `address`, if any.
pub fn find_pool_index_containing(address: *const u8) -> Option<usize> {
    with_pools(|pools| {
        pools
            .iter()
            .position(|pool| pool.contains_address(address))
    })
}
