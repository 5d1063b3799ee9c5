//! Structural validation: walking the physical block chain and the
//! free-list buckets and checking every invariant they're supposed to hold.
//! Read-only and O(total blocks); never called from the hot allocation path.
use core::ptr::NonNull;

use crate::{
    block::{BlockHdr, HEADER_SIZE},
    control::Tlsf,
    map,
    pool::{PoolDescriptor, PoolHandle},
};

impl<'pool> Tlsf<'pool> {
    /// Validate every pool's physical chain and the free-list index as a
    /// whole. `false` means structural corruption was detected; callers
    /// decide what to do about it (this allocator never aborts on its own).
    pub fn validate(&self) -> bool {
        let ctrl = unsafe { self.ctrl() };
        for pool in ctrl.pools.iter().flatten() {
            if !self.validate_pool_descriptor(*pool) {
                return false;
            }
        }
        self.validate_index()
    }

    /// Validate a single pool's physical chain (invariants 1 through 5).
    pub fn validate_pool(&self, pool: PoolHandle) -> bool {
        match self.pool_descriptor(pool) {
            Some(desc) => self.validate_pool_descriptor(desc),
            None => false,
        }
    }

    fn validate_pool_descriptor(&self, pool: PoolDescriptor) -> bool {
        let mut ok = true;
        let mut prev_was_free = false;
        self.walk_pool_descriptor(pool, |_ptr, size, used| {
            if size == 0 {
                return;
            }
            if !used && prev_was_free {
                ok = false; // invariant 3: no two adjacent free blocks
            }
            prev_was_free = !used;
        });
        ok && self.walk_terminates_at_epilogue(pool)
    }

    /// Walk the physical chain, checking that every ghost-footer back-pointer
    /// that claims validity (`PREV_FREE` set) actually resolves to the block
    /// immediately preceding it, and that the chain lands exactly on the
    /// epilogue rather than overrunning or falling short of it.
    fn walk_terminates_at_epilogue(&self, pool: PoolDescriptor) -> bool {
        unsafe {
            let mut prev_addr = pool.start;
            let mut cur: NonNull<BlockHdr> =
                NonNull::new_unchecked((pool.start + HEADER_SIZE) as *mut BlockHdr);
            let epilogue_addr = pool.end - HEADER_SIZE;
            loop {
                let addr = cur.as_ptr() as usize;
                if addr > epilogue_addr {
                    return false;
                }
                if cur.as_ref().prev_is_free() {
                    if BlockHdr::prev_phys_block(cur).as_ptr() as usize != prev_addr {
                        return false;
                    }
                }
                if addr == epilogue_addr {
                    return true;
                }
                prev_addr = addr;
                cur = BlockHdr::next_phys_block(cur);
            }
        }
    }

    /// Call `visitor(payload_ptr, payload_size, used)` for every block in
    /// `pool`, in physical order, excluding the zero-size prologue and
    /// epilogue sentinels.
    pub fn walk_pool(&self, pool: PoolHandle, mut visitor: impl FnMut(NonNull<u8>, usize, bool)) {
        if let Some(desc) = self.pool_descriptor(pool) {
            self.walk_pool_descriptor(desc, |ptr, size, used| {
                if size != 0 {
                    visitor(ptr, size, used);
                }
            });
        }
    }

    fn walk_pool_descriptor(&self, pool: PoolDescriptor, mut visitor: impl FnMut(NonNull<u8>, usize, bool)) {
        unsafe {
            let mut cur: NonNull<BlockHdr> = NonNull::new_unchecked(pool.start as *mut BlockHdr);
            let epilogue_addr = pool.end - HEADER_SIZE;
            loop {
                let size = cur.as_ref().size();
                let used = !cur.as_ref().is_free();
                visitor(BlockHdr::payload_ptr(cur), size, used);
                if cur.as_ptr() as usize == epilogue_addr {
                    break;
                }
                cur = BlockHdr::next_phys_block(cur);
            }
        }
    }

    /// Validate invariant 6: every bucket's bitmap bits agree with its head
    /// pointer, and every linked block is free and maps to the bucket it's
    /// filed under.
    fn validate_index(&self) -> bool {
        let ctrl = unsafe { self.ctrl() };
        if !ctrl.freelist.bitmaps_consistent_with_heads() {
            return false;
        }
        for fl in 0..map::FLLEN {
            for sl in 0..map::SLLEN {
                for block in ctrl.freelist.bucket_blocks(fl, sl) {
                    unsafe {
                        let hdr = crate::block::FreeBlockHdr::header(block);
                        if !hdr.as_ref().is_free() {
                            return false;
                        }
                        let size = hdr.as_ref().size();
                        if map::map_insert(size) != Some((fl, sl)) {
                            return false;
                        }
                    }
                }
            }
        }
        true
    }
}
