//! The segregated free-list index: two-level bitmaps plus the bucket-head
//! table they summarize.
use core::ptr::NonNull;

use crate::{
    block::FreeBlockHdr,
    int::BinInteger,
    map::{self, FLLEN, SLLEN},
};

/// Two-level bitmap and bucket-head table. `fl_bitmap`'s bit `i` is set iff
/// `sl_bitmap[i]` is nonzero, which holds iff `heads[i]` has a non-`None`
/// entry.
pub(crate) struct FreeListIndex {
    fl_bitmap: u32,
    sl_bitmap: [u32; FLLEN],
    heads: [[Option<NonNull<FreeBlockHdr>>; SLLEN]; FLLEN],
}

impl FreeListIndex {
    pub const INIT: Self = Self {
        fl_bitmap: 0,
        sl_bitmap: [0; FLLEN],
        heads: [[None; SLLEN]; FLLEN],
    };

    /// Insert `block`, sized `size` (payload bytes), at the head of its
    /// bucket. `block` must not already be linked anywhere.
    ///
    /// # Safety
    /// `block` must be a valid, exclusively-owned free block of `size` bytes
    /// not already present in any bucket.
    pub unsafe fn insert(&mut self, mut block: NonNull<FreeBlockHdr>, size: usize) {
        let (fl, sl) = map::map_insert(size).expect("block size exceeds the largest size class");
        let head = &mut self.heads[fl][sl];
        block.as_mut().prev_free = None;
        block.as_mut().next_free = *head;
        if let Some(mut old_head) = *head {
            old_head.as_mut().prev_free = Some(block);
        }
        *head = Some(block);

        self.fl_bitmap.set_bit(fl as u32);
        self.sl_bitmap[fl].set_bit(sl as u32);
    }

    /// Remove `block`, sized `size`, from its bucket.
    ///
    /// # Safety
    /// `block` must currently be linked in the bucket that `size` maps to.
    pub unsafe fn remove(&mut self, block: NonNull<FreeBlockHdr>, size: usize) {
        let (fl, sl) = map::map_insert(size).expect("block size exceeds the largest size class");
        let next = block.as_ref().next_free;
        let prev = block.as_ref().prev_free;

        match prev {
            Some(mut prev) => prev.as_mut().next_free = next,
            None => self.heads[fl][sl] = next,
        }
        if let Some(mut next) = next {
            next.as_mut().prev_free = prev;
        }

        if self.heads[fl][sl].is_none() {
            self.sl_bitmap[fl].clear_bit(sl as u32);
            if self.sl_bitmap[fl] == 0 {
                self.fl_bitmap.clear_bit(fl as u32);
            }
        }
    }

    /// Find a free block whose size is at least `size`, without unlinking
    /// it. Returns the bucket it was found in so the caller can remove it
    /// (the caller already knows `(fl, sl)` and should not recompute it from
    /// the block's actual size, since the search may have widened the
    /// bucket).
    pub fn locate(&self, size: usize) -> Option<(usize, usize, NonNull<FreeBlockHdr>)> {
        let (fl, sl) = map::map_search(size)?;

        // Is there a suitable block in the exact (fl, sl) class, or a larger
        // `sl` within the same `fl`?
        let sl_map = self.sl_bitmap[fl].mask_below(sl as u32);
        if let Some(sl) = sl_map.bit_scan_forward() {
            let sl = sl as usize;
            return self.heads[fl][sl].map(|b| (fl, sl, b));
        }

        // Nothing in this `fl`; climb to the next nonempty first-level class.
        let fl_map = self.fl_bitmap.mask_above(fl as u32);
        let fl = fl_map.bit_scan_forward()? as usize;
        let sl = self.sl_bitmap[fl]
            .bit_scan_forward()
            .expect("fl_bitmap bit set with empty sl_bitmap") as usize;
        self.heads[fl][sl].map(|b| (fl, sl, b))
    }

    /// Used by [`crate::Tlsf::validate`] to check invariant 6.
    pub fn bitmaps_consistent_with_heads(&self) -> bool {
        for fl in 0..FLLEN {
            let fl_bit = self.fl_bitmap.get_bit(fl as u32);
            let sl_nonzero = self.sl_bitmap[fl] != 0;
            if fl_bit != sl_nonzero {
                return false;
            }
            for sl in 0..SLLEN {
                let sl_bit = self.sl_bitmap[fl].get_bit(sl as u32);
                let head_present = self.heads[fl][sl].is_some();
                if sl_bit != head_present {
                    return false;
                }
            }
        }
        true
    }

    /// Used by [`crate::Tlsf::validate`] to check invariant 6.
    pub fn bucket_blocks(&self, fl: usize, sl: usize) -> impl Iterator<Item = NonNull<FreeBlockHdr>> + '_ {
        let mut cur = self.heads[fl][sl];
        core::iter::from_fn(move || {
            let block = cur?;
            cur = unsafe { block.as_ref().next_free };
            Some(block)
        })
    }
}
