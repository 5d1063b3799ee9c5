extern crate std;

use std::{collections::BTreeMap, ops::Range, ptr::NonNull, vec::Vec};

use quickcheck_macros::quickcheck;

use crate::Tlsf;

/// An independent model of which byte ranges are currently live allocations,
/// checked against a fixed, small set of pool spans known up front (this
/// crate never has more than `Tlsf::MAX_POOLS` pools, unlike a general-purpose
/// allocator that might grow its backing store indefinitely). Rather than
/// maintaining a run-length encoding of `Free`/`Used`/`Invalid` regions over
/// the whole address space, this only ever records the `Used` ranges as a
/// disjoint interval set; "free" is whatever a range is not, computed against
/// the pool spans and the used set on demand.
pub struct ShadowAllocator {
    pools: Vec<Range<usize>>,
    used: BTreeMap<usize, usize>,
}

impl ShadowAllocator {
    pub fn new() -> Self {
        Self {
            pools: Vec::new(),
            used: BTreeMap::new(),
        }
    }

    /// Register a pool span. Panics if it overlaps one already registered.
    pub fn mark_pool(&mut self, start: usize, end: usize) {
        assert!(start < end, "empty or inverted pool span {}..{}", start, end);
        assert!(
            !self.pools.iter().any(|p| p.start < end && start < p.end),
            "pool {}..{} overlaps an already-marked pool",
            start,
            end
        );
        log::trace!("sa: marking pool {}..{}", start, end);
        self.pools.push(start..end);
    }

    fn within_a_pool(&self, range: &Range<usize>) -> bool {
        self.pools
            .iter()
            .any(|p| p.start <= range.start && range.end <= p.end)
    }

    /// Whether any currently-live allocation intersects `range`.
    fn overlaps_live(&self, range: &Range<usize>) -> bool {
        self.used
            .range(..range.end)
            .next_back()
            .map_or(false, |(&s, &e)| e > range.start && s < range.end)
    }

    pub fn allocate(&mut self, start: usize, len: usize) {
        if len == 0 {
            return;
        }
        let range = start..start + len;
        log::trace!("sa: allocating {:?}", range);
        assert!(
            self.within_a_pool(&range),
            "allocation {:?} falls outside every marked pool",
            range
        );
        assert!(
            !self.overlaps_live(&range),
            "allocation {:?} overlaps a still-live allocation",
            range
        );
        self.used.insert(start, start + len);
    }

    pub fn deallocate(&mut self, start: usize, len: usize) {
        if len == 0 {
            return;
        }
        log::trace!("sa: deallocating {}..{}", start, start + len);
        match self.used.remove(&start) {
            Some(end) if end == start + len => {}
            Some(end) => panic!(
                "freed {}..{} doesn't match the live allocation {}..{}",
                start,
                start + len,
                start,
                end
            ),
            None => panic!("freed {}..{} was never allocated", start, start + len),
        }
    }
}

fn new_harness(pool_bytes: usize) -> (std::boxed::Box<[u8]>, usize) {
    let mem = std::vec![0u8; pool_bytes].into_boxed_slice();
    let addr = mem.as_ptr() as usize;
    (mem, addr)
}

#[test]
fn lifecycle_scenario_create_and_split() {
    let _ = env_logger::builder().is_test(true).try_init();
    let (mut mem, base) = new_harness(128 * 1024);
    let mut sa = ShadowAllocator::new();
    sa.mark_pool(base, base + mem.len());

    let mut tlsf = Tlsf::new(&mut mem).unwrap();
    let p1 = tlsf.alloc(24).unwrap();
    sa.allocate(p1.as_ptr() as usize, tlsf.block_size(p1));
    let p2 = tlsf.alloc(256).unwrap();
    sa.allocate(p2.as_ptr() as usize, tlsf.block_size(p2));
    let p3 = tlsf.memalign(4096, 128).unwrap();
    sa.allocate(p3.as_ptr() as usize, tlsf.block_size(p3));

    assert_eq!(p3.as_ptr() as usize % 4096, 0);
    assert!(tlsf.validate());
}

#[test]
fn lifecycle_scenario_free_middle_realloc() {
    let _ = env_logger::builder().is_test(true).try_init();
    let (mut mem, base) = new_harness(128 * 1024);
    let mut sa = ShadowAllocator::new();
    sa.mark_pool(base, base + mem.len());

    let mut tlsf = Tlsf::new(&mut mem).unwrap();
    let p1 = tlsf.alloc(24).unwrap();
    sa.allocate(p1.as_ptr() as usize, tlsf.block_size(p1));
    let p2 = tlsf.alloc(256).unwrap();
    let p2_size = tlsf.block_size(p2);
    sa.allocate(p2.as_ptr() as usize, p2_size);

    tlsf.free(p2);
    sa.deallocate(p2.as_ptr() as usize, p2_size);

    let p1_len = tlsf.block_size(p1);
    let p1_prime = tlsf.realloc(Some(p1), 1024).unwrap();
    sa.deallocate(p1.as_ptr() as usize, p1_len);
    sa.allocate(p1_prime.as_ptr() as usize, tlsf.block_size(p1_prime));

    assert!(tlsf.block_size(p1_prime) >= 1024);
    assert!(tlsf.validate());
}

#[test]
fn lifecycle_scenario_two_pool() {
    let _ = env_logger::builder().is_test(true).try_init();
    let (mut mem, base) = new_harness(128 * 1024);
    let mut sa = ShadowAllocator::new();
    sa.mark_pool(base, base + mem.len());

    let mut tlsf = Tlsf::new(&mut mem).unwrap();
    let p1 = tlsf.alloc(24).unwrap();
    sa.allocate(p1.as_ptr() as usize, tlsf.block_size(p1));
    let p2 = tlsf.alloc(256).unwrap();
    sa.allocate(p2.as_ptr() as usize, tlsf.block_size(p2));
    let p3 = tlsf.memalign(4096, 128).unwrap();
    sa.allocate(p3.as_ptr() as usize, tlsf.block_size(p3));

    tlsf.free(p2);
    sa.deallocate(p2.as_ptr() as usize, tlsf.block_size(p2));
    let p1 = tlsf.realloc(Some(p1), 1024).unwrap();

    let (mut second, second_base) = new_harness(128 * 1024);
    sa.mark_pool(second_base, second_base + second.len());
    let second_ptr = NonNull::new(second.as_mut_ptr()).unwrap();
    tlsf.add_pool(second_ptr, second.len()).unwrap();

    let p4 = tlsf.alloc(64 * 1024).unwrap();
    sa.allocate(p4.as_ptr() as usize, tlsf.block_size(p4));
    assert!(p4.as_ptr() as usize >= second_base && (p4.as_ptr() as usize) < second_base + second.len());
    assert!(tlsf.validate());

    tlsf.free(p1);
    tlsf.free(p3);
    tlsf.free(p4);
    assert!(tlsf.validate());
}

#[test]
fn lifecycle_scenario_checkerboard_coalescing() {
    let _ = env_logger::builder().is_test(true).try_init();
    let (mut mem, _base) = new_harness(128 * 1024);
    let mut tlsf = Tlsf::new(&mut mem).unwrap();

    let blocks: Vec<NonNull<u8>> = (0..100).map(|_| tlsf.alloc(64).unwrap()).collect();
    for (i, &p) in blocks.iter().enumerate() {
        if i % 2 == 1 {
            tlsf.free(p);
        }
    }
    for (i, &p) in blocks.iter().enumerate() {
        if i % 2 == 0 {
            tlsf.free(p);
        }
    }
    assert!(tlsf.validate());

    let pool = tlsf.get_pool().unwrap();
    let mut free_block_count = 0;
    tlsf.walk_pool(pool, |_ptr, _size, used| {
        if !used {
            free_block_count += 1;
        }
    });
    assert_eq!(free_block_count, 1);
    assert!(tlsf.alloc(100 * 1024).is_some());
}

#[test]
fn lifecycle_scenario_reset_gating() {
    let _ = env_logger::builder().is_test(true).try_init();
    let (mut mem, _base) = new_harness(64 * 1024);
    let mut tlsf = Tlsf::new(&mut mem).unwrap();

    let p = tlsf.alloc(256).unwrap();
    assert!(!tlsf.reset());

    tlsf.free(p);
    assert!(tlsf.reset());

    assert!(tlsf.alloc(32 * 1024).is_some());
}

#[test]
fn misaligned_base_is_rejected() {
    // `Box<[u8]>` allocations are at least word-aligned, so `mem[1..]`
    // always starts one byte past an `ALIGNMENT` boundary.
    let mut mem = std::vec![0u8; 4096].into_boxed_slice();
    assert!(Tlsf::new(&mut mem[1..]).is_none());
}

#[derive(Clone, Debug)]
enum Op {
    Alloc(usize),
    Free(usize),
    Realloc(usize, usize),
}

impl quickcheck::Arbitrary for Op {
    fn arbitrary(g: &mut quickcheck::Gen) -> Self {
        const SIZES: [usize; 8] = [1, 8, 16, 24, 63, 64, 500, 4000];
        let size = SIZES[usize::arbitrary(g) % SIZES.len()];
        match u32::arbitrary(g) % 3 {
            0 => Op::Alloc(size),
            1 => Op::Free(usize::arbitrary(g) % 64),
            _ => Op::Realloc(usize::arbitrary(g) % 64, size),
        }
    }
}

#[quickcheck]
fn random_alloc_free_sequence_stays_valid(ops: std::vec::Vec<Op>) -> bool {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut mem = std::vec![0u8; 1 << 20].into_boxed_slice();
    let base = mem.as_ptr() as usize;
    let mut tlsf = Tlsf::new(&mut mem).unwrap();
    let mut sa = ShadowAllocator::new();
    sa.mark_pool(base, base + (1 << 20));
    // Each live entry is the pointer together with the size the shadow
    // allocator was told about for it, so a later free/realloc can retire
    // exactly that range regardless of how `block_size` rounds internally.
    let mut live: Vec<(NonNull<u8>, usize)> = Vec::new();

    for op in ops {
        match op {
            Op::Alloc(size) => {
                if let Some(p) = tlsf.alloc(size) {
                    let actual = tlsf.block_size(p);
                    if actual < size {
                        return false;
                    }
                    sa.allocate(p.as_ptr() as usize, actual);
                    live.push((p, actual));
                }
            }
            Op::Free(idx) => {
                if !live.is_empty() {
                    let (p, size) = live.remove(idx % live.len());
                    tlsf.free(p);
                    sa.deallocate(p.as_ptr() as usize, size);
                }
            }
            Op::Realloc(idx, size) => {
                if !live.is_empty() {
                    let i = idx % live.len();
                    let (p, old_size) = live[i];
                    // `size` is always nonzero (see the `sizes` table), so a
                    // `None` result here means out-of-memory, not a free:
                    // the original pointer is left untouched by `realloc`.
                    if let Some(p2) = tlsf.realloc(Some(p), size) {
                        let actual = tlsf.block_size(p2);
                        if actual < size {
                            return false;
                        }
                        sa.deallocate(p.as_ptr() as usize, old_size);
                        sa.allocate(p2.as_ptr() as usize, actual);
                        live[i] = (p2, actual);
                    }
                }
            }
        }
        if !tlsf.validate() {
            return false;
        }
    }
    true
}
