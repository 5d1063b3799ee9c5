//! The allocator control: the top-level object a caller creates and then
//! drives through `alloc`/`free`/`realloc`/`memalign`.
use core::{marker::PhantomData, mem, ptr::NonNull};

use crate::{
    block::{align_up, FreeBlockHdr, ALIGNMENT, HEADER_SIZE},
    freelist::FreeListIndex,
    map::FL_MAX,
    pool::{PoolDescriptor, MAX_POOLS, POOL_OVERHEAD as POOL_OVERHEAD_BYTES},
};

/// The allocator's bookkeeping state, as it is physically laid out inside
/// the leading bytes of the first pool.
pub(crate) struct TlsfInner {
    pub freelist: FreeListIndex,
    pub pools: [Option<PoolDescriptor>; MAX_POOLS],
    /// Sum of every pool's interior payload capacity (bytes available to
    /// allocations, excluding prologue/epilogue/header overhead). Updated
    /// only by `add_pool`/`remove_pool`.
    pub total_capacity: usize,
    /// Sum of the payload sizes of every block currently linked in
    /// `freelist`. Kept exactly in step with `freelist` by routing every
    /// insertion/removal through `link_free`/`unlink_free` below, rather
    /// than by re-deriving it from a walk.
    pub free_space: usize,
}

impl TlsfInner {
    const EMPTY: Self = Self {
        freelist: FreeListIndex::INIT,
        pools: [None; MAX_POOLS],
        total_capacity: 0,
        free_space: 0,
    };

    /// File a newly-freed or newly-created free block into the index and
    /// account for it in `free_space`.
    ///
    /// # Safety
    /// Same preconditions as [`FreeListIndex::insert`].
    pub(crate) unsafe fn link_free(&mut self, block: NonNull<FreeBlockHdr>, size: usize) {
        self.freelist.insert(block, size);
        self.free_space += size;
    }

    /// Unlink a free block that is about to be used or absorbed, and
    /// account for it in `free_space`.
    ///
    /// # Safety
    /// Same preconditions as [`FreeListIndex::remove`].
    pub(crate) unsafe fn unlink_free(&mut self, block: NonNull<FreeBlockHdr>, size: usize) {
        self.freelist.remove(block, size);
        self.free_space -= size;
    }
}

/// A TLSF allocator control, borrowing the memory it administers for
/// `'pool`.
///
/// The control's own bookkeeping state (bitmaps, bucket heads, pool table)
/// is written into the leading, `ALIGNMENT`-aligned bytes of the memory
/// passed to [`Tlsf::new`]; the remainder of that same buffer becomes the
/// allocator's first pool. This keeps construction free of any allocation
/// of its own — the only memory a `Tlsf` ever touches is memory the caller
/// already owns.
pub struct Tlsf<'pool> {
    pub(crate) inner: NonNull<TlsfInner>,
    pub(crate) _phantom: PhantomData<&'pool mut ()>,
}

// Safety: every pointer reachable from `inner` is derived from the `'pool`
// buffer the caller handed us; nothing here has interior mutability shared
// with another owner.
unsafe impl Send for Tlsf<'_> {}

impl<'pool> Tlsf<'pool> {
    /// The minimum address alignment of any returned allocation.
    pub const ALIGN_SIZE: usize = ALIGNMENT;
    /// Bytes of header overhead charged against every allocation.
    pub const ALLOC_OVERHEAD: usize = HEADER_SIZE;
    /// Bytes of overhead a pool spends on sentinels, independent of
    /// anything allocated from it.
    pub const POOL_OVERHEAD: usize = POOL_OVERHEAD_BYTES;
    /// The smallest payload any block (used or free) may have.
    pub const BLOCK_SIZE_MIN: usize = crate::block::MIN_BLOCK_SIZE;
    /// Bytes the control's own bookkeeping (bitmaps, bucket heads, pool
    /// table) occupies at the start of the buffer passed to [`Tlsf::new`],
    /// before alignment padding to the first pool.
    pub const CONTROL_SIZE: usize = mem::size_of::<TlsfInner>();
    /// Total bytes across every pool added to this control that are
    /// available to allocations (pool interiors, excluding sentinel and
    /// header overhead).
    pub fn total_capacity(&self) -> usize {
        unsafe { self.ctrl() }.total_capacity
    }

    /// Bytes currently sitting in free blocks across every pool.
    pub fn free_space(&self) -> usize {
        unsafe { self.ctrl() }.free_space
    }

    /// Bytes currently handed out to live allocations across every pool.
    pub fn used_space(&self) -> usize {
        self.total_capacity() - self.free_space()
    }

    /// The largest payload size that can ever map to a valid size class,
    /// regardless of how large a pool the caller supplies.
    pub const BLOCK_SIZE_MAX: usize = {
        if FL_MAX < usize::BITS {
            (1usize << FL_MAX) - ALIGNMENT
        } else {
            0usize.wrapping_sub(ALIGNMENT)
        }
    };

    /// Lay a control out at the start of `mem` and treat the remainder as
    /// the allocator's first pool.
    ///
    /// Fails (returns `None`, touching nothing) if `mem`'s address is not
    /// already `ALIGNMENT`-aligned, or if what's left after the control
    /// struct can't host a minimally-sized pool.
    pub fn new(mem: &'pool mut [u8]) -> Option<Self> {
        let base = mem.as_mut_ptr() as usize;
        if base % ALIGNMENT != 0 {
            return None;
        }
        let ctrl_addr = base;
        let ctrl_end = ctrl_addr.checked_add(mem::size_of::<TlsfInner>())?;
        let pool_addr = align_up(ctrl_end);
        let pool_pad = pool_addr - ctrl_end;

        let total_needed = mem::size_of::<TlsfInner>() + pool_pad;
        if mem.len() < total_needed {
            return None;
        }

        // Safety: `ctrl_addr` falls within `mem` with room for a full
        // `TlsfInner`, and `mem` is exclusively borrowed for `'pool`.
        unsafe {
            (ctrl_addr as *mut TlsfInner).write(TlsfInner::EMPTY);
        }

        let mut this = Self {
            inner: unsafe { NonNull::new_unchecked(ctrl_addr as *mut TlsfInner) },
            _phantom: PhantomData,
        };

        let pool_len = mem.len() - (pool_addr - base);
        let pool_ptr = unsafe { NonNull::new_unchecked(pool_addr as *mut u8) };
        this.add_pool(pool_ptr, pool_len)?;
        Some(this)
    }

    #[inline]
    pub(crate) unsafe fn ctrl(&self) -> &TlsfInner {
        self.inner.as_ref()
    }

    #[inline]
    pub(crate) unsafe fn ctrl_mut(&mut self) -> &mut TlsfInner {
        self.inner.as_mut()
    }

    /// Reset every pool to a single free block, provided no allocation is
    /// currently live anywhere in this control. Added pools are preserved;
    /// only their interiors are rebuilt.
    ///
    /// Returns `false` (no state change) if any block anywhere is in use.
    pub fn reset(&mut self) -> bool {
        let pools: [Option<PoolDescriptor>; MAX_POOLS] = unsafe { self.ctrl() }.pools;

        for pool in pools.into_iter().flatten() {
            if !self.pool_is_empty(pool) {
                return false;
            }
        }

        for pool in pools.into_iter().flatten() {
            self.rebuild_pool_interior(pool);
        }
        true
    }

    fn pool_is_empty(&self, pool: PoolDescriptor) -> bool {
        use crate::block::BlockHdr;
        let interior_payload = (pool.end - pool.start) - POOL_OVERHEAD_BYTES;
        unsafe {
            let interior: NonNull<BlockHdr> =
                NonNull::new_unchecked((pool.start + HEADER_SIZE) as *mut BlockHdr);
            interior.as_ref().is_free() && interior.as_ref().size() == interior_payload
        }
    }

    /// Reinitialize a pool's interior header and epilogue back-pointer.
    /// `pool_is_empty` having already passed for this pool means the
    /// interior is already exactly one free block spanning the whole
    /// interior and already linked in the freelist — so there is nothing to
    /// link or unlink here, only the (no-op, but cheap to restate) header
    /// bytes to rewrite.
    fn rebuild_pool_interior(&mut self, pool: PoolDescriptor) {
        use crate::block::BlockHdr;
        let interior_payload = (pool.end - pool.start) - POOL_OVERHEAD_BYTES;
        unsafe {
            let interior: NonNull<BlockHdr> =
                NonNull::new_unchecked((pool.start + HEADER_SIZE) as *mut BlockHdr);
            BlockHdr::init_at(interior, interior_payload, true, false);

            let epilogue: NonNull<BlockHdr> =
                NonNull::new_unchecked((pool.end - HEADER_SIZE) as *mut BlockHdr);
            BlockHdr::init_at(epilogue, 0, false, true);
            BlockHdr::set_prev_phys_block(epilogue, interior);
        }
    }
}
