//! Pool bookkeeping: aligned spans, prologue/epilogue sentinels, and the
//! fixed-capacity table of pools a control knows about.
use core::ptr::NonNull;

use crate::{
    block::{align_down, align_up, BlockHdr, FreeBlockHdr, ALIGNMENT, HEADER_SIZE, MIN_BLOCK_SIZE},
    control::Tlsf,
};

/// How many independent pools a single control can administer. Fixed rather
/// than growable: the control struct is embedded in caller memory and must
/// have a size known at the point it's placed there.
pub const MAX_POOLS: usize = 8;

/// Header overhead a pool spends on bookkeeping that isn't available to any
/// allocation: the prologue, the epilogue, and the header of the one
/// interior block that starts out covering the whole pool.
pub const POOL_OVERHEAD: usize = ALIGNMENT + 2 * HEADER_SIZE;

#[derive(Clone, Copy)]
pub(crate) struct PoolDescriptor {
    /// Address of the prologue header (the pool's first byte).
    pub start: usize,
    /// Address one past the pool's last byte (the epilogue header's end).
    pub end: usize,
}

impl PoolDescriptor {
    fn overlaps(&self, other_start: usize, other_end: usize) -> bool {
        self.start < other_end && other_start < self.end
    }

    fn contains(&self, addr: usize) -> bool {
        addr >= self.start && addr < self.end
    }
}

/// An opaque, stable reference to a pool previously added to a control.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct PoolHandle(pub(crate) usize);

impl<'pool> Tlsf<'pool> {
    /// Add `bytes` of memory starting at `mem` as a new pool.
    ///
    /// Returns `None` (no state change) if the aligned span is too small to
    /// host even one minimum-sized block, if it overlaps an existing pool,
    /// or if the pool table is already full.
    pub fn add_pool(&mut self, mem: NonNull<u8>, bytes: usize) -> Option<PoolHandle> {
        let raw_start = mem.as_ptr() as usize;
        let start = align_up(raw_start);
        let end = align_down(raw_start.checked_add(bytes)?);
        if end <= start || end - start < POOL_OVERHEAD + MIN_BLOCK_SIZE {
            return None;
        }

        let ctrl = unsafe { self.ctrl_mut() };
        if ctrl.pools.iter().any(|p| {
            p.map_or(false, |p: PoolDescriptor| p.overlaps(start, end))
        }) {
            return None;
        }
        let slot_idx = ctrl.pools.iter().position(|p| p.is_none())?;

        let interior_payload = (end - start) - POOL_OVERHEAD;

        unsafe {
            let prologue: NonNull<BlockHdr> = NonNull::new_unchecked(start as *mut BlockHdr);
            BlockHdr::init_at(prologue, 0, false, false);

            let interior: NonNull<BlockHdr> =
                NonNull::new_unchecked((start + HEADER_SIZE) as *mut BlockHdr);
            BlockHdr::init_at(interior, interior_payload, true, false);

            let epilogue_addr = end - HEADER_SIZE;
            let epilogue: NonNull<BlockHdr> = NonNull::new_unchecked(epilogue_addr as *mut BlockHdr);
            BlockHdr::init_at(epilogue, 0, false, true);
            BlockHdr::set_prev_phys_block(epilogue, interior);

            ctrl.link_free(FreeBlockHdr::from_header(interior), interior_payload);
        }

        ctrl.total_capacity += interior_payload;
        ctrl.pools[slot_idx] = Some(PoolDescriptor { start, end });
        Some(PoolHandle(start))
    }

    /// Remove a pool previously returned by [`Tlsf::add_pool`]. A no-op,
    /// returning `false`, unless the pool is empty (its interior is still
    /// one single free block spanning the whole span).
    pub fn remove_pool(&mut self, pool: PoolHandle) -> bool {
        let ctrl = unsafe { self.ctrl_mut() };
        let slot_idx = match ctrl.pools.iter().position(|p| matches!(p, Some(d) if d.start == pool.0)) {
            Some(idx) => idx,
            None => return false,
        };
        let desc = ctrl.pools[slot_idx].unwrap();
        let interior_payload = (desc.end - desc.start) - POOL_OVERHEAD;

        unsafe {
            let interior: NonNull<BlockHdr> =
                NonNull::new_unchecked((desc.start + HEADER_SIZE) as *mut BlockHdr);
            if !interior.as_ref().is_free() || interior.as_ref().size() != interior_payload {
                return false;
            }
            ctrl.unlink_free(FreeBlockHdr::from_header(interior), interior_payload);
        }

        ctrl.total_capacity -= interior_payload;
        ctrl.pools[slot_idx] = None;
        true
    }

    /// The first pool added to this control (the one supplied to
    /// [`Tlsf::new`], if any pool exists at all).
    pub fn get_pool(&self) -> Option<PoolHandle> {
        let ctrl = unsafe { self.ctrl() };
        ctrl.pools.iter().flatten().next().map(|d| PoolHandle(d.start))
    }

    /// The pool whose span contains `ptr`, if any.
    pub fn get_pool_for_ptr(&self, ptr: NonNull<u8>) -> Option<PoolHandle> {
        let addr = ptr.as_ptr() as usize;
        let ctrl = unsafe { self.ctrl() };
        ctrl.pools
            .iter()
            .flatten()
            .find(|d| d.contains(addr))
            .map(|d| PoolHandle(d.start))
    }

    pub(crate) fn pool_descriptor(&self, pool: PoolHandle) -> Option<PoolDescriptor> {
        let ctrl = unsafe { self.ctrl() };
        ctrl.pools.iter().flatten().find(|d| d.start == pool.0).copied()
    }
}
