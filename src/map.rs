//! Size-class mapping: translate a byte count into the `(fl, sl)` coordinates
//! of the free-list bucket that holds it.
use crate::block::{ALIGNMENT, ALIGN_SHIFT};

/// `log2` of the number of second-level subclasses per first-level class.
pub const SL_LOG2: u32 = 5;
/// Number of second-level subclasses per first-level class.
pub const SLLEN: usize = 1 << SL_LOG2;
/// Upper bound on the first-level index space (bit width of the size word
/// minus the low bits consumed by the second level).
pub const FL_MAX: u32 = 32;
/// Number of low bits of a size that the second level consumes before the
/// first level starts distinguishing anything.
pub const FL_INDEX_SHIFT: u32 = SL_LOG2 + ALIGN_SHIFT;
/// Number of first-level classes.
pub const FLLEN: usize = (FL_MAX - FL_INDEX_SHIFT + 1) as usize;

const USIZE_BITS: u32 = usize::BITS;

/// Sizes below this are all folded into first-level class 0, where `sl` is
/// simply the size in units of `ALIGNMENT`. Below this threshold the
/// exponential spacing of ordinary TLSF classes would waste most of the
/// class space on sizes that never occur (every block is at least
/// `ALIGNMENT`-sized).
const SMALL_BLOCK: usize = 1 << FL_INDEX_SHIFT;

/// Insertion mapping: the bucket that holds a free block of exactly `size`
/// bytes.
///
/// `size` must already be a multiple of `ALIGNMENT`. Returns `None` if `size`
/// is too large for any class (callers are expected to have already rejected
/// such sizes via `Tlsf::BLOCK_SIZE_MAX`).
#[inline]
pub fn map_insert(size: usize) -> Option<(usize, usize)> {
    debug_assert_eq!(size % ALIGNMENT, 0);
    if size < SMALL_BLOCK {
        return Some((0, size / ALIGNMENT));
    }
    let fl = USIZE_BITS - 1 - size.leading_zeros();
    let sl = (size >> (fl - SL_LOG2)) & (SLLEN as usize - 1);
    let fl = fl - FL_INDEX_SHIFT + 1;
    if fl as usize >= FLLEN {
        return None;
    }
    Some((fl as usize, sl))
}

/// Search mapping: the smallest bucket such that *every* free block in it is
/// at least `size` bytes, rounding `size` up to the next class boundary when
/// it does not already sit on one.
///
/// `size` must already be a multiple of `ALIGNMENT`.
#[inline]
pub fn map_search(size: usize) -> Option<(usize, usize)> {
    debug_assert_eq!(size % ALIGNMENT, 0);
    if size < SMALL_BLOCK {
        return map_insert(size);
    }
    let fl = USIZE_BITS - 1 - size.leading_zeros();
    // Round up to the next second-level boundary so that any block found in
    // the resulting bucket is guaranteed to satisfy `size`.
    let round = (1usize << (fl - SL_LOG2)) - 1;
    let rounded = size.checked_add(round)?;
    map_insert(rounded & !round)
}
