//! The free-list heap engine.
//!
//! Owns the raw arena bytes and the singly-linked, address-sorted free list
//! threaded through them. Knows nothing about reclamation callbacks or
//! severities, that is [`crate::pressure`]'s job. The engine only ever
//! fails an allocation by returning `None`; it never calls out to anything.

mod header;

use crate::offset::OffsetWord;
use header::{header_size, FreeHeader};

#[cfg(feature = "stats")]
use crate::stats::HeapStats;

/// The arena's backing storage. A bare `[u8; N]` only has alignment 1, which
/// is not enough: the engine hands out pointers computed as `base_ptr() +
/// k * ALIGNMENT`, so the base address itself must already be aligned to
/// `ALIGNMENT`. `repr(align(8))` gives every arena (for the alignments this
/// engine supports, see the assertion in `Engine::new`) a base address that
/// is already a multiple of `ALIGNMENT`.
#[repr(align(8))]
struct Arena<const N: usize>([u8; N]);

impl<const N: usize> Arena<N> {
    const fn new() -> Self {
        Self([0u8; N])
    }
}

/// The free-list heap engine for a `HEAP_SIZE`-byte arena aligned to
/// `ALIGNMENT`, with a soft-limit ratchet stepping by `DESIRED_LIMIT`.
///
/// The anchor sentinel is stored in the first `ALIGNMENT` bytes of `bytes`;
/// the usable area is the remaining `AREA_SIZE = HEAP_SIZE - ALIGNMENT`
/// bytes. Every method here takes `&mut self`: the engine carries no
/// internal synchronization of its own, exactly like the raw allocator it is
/// descended from ([`crate::Heap`] is the one that wraps it in a
/// `spin::Mutex` for `Sync`).
pub(crate) struct Engine<
    const HEAP_SIZE: usize,
    const ALIGNMENT: usize,
    const DESIRED_LIMIT: usize,
    Offset,
> {
    bytes: Arena<HEAP_SIZE>,
    initialized: bool,
    /// `Offset::NULL` means "the anchor"; otherwise a real list node.
    skip_hint: Offset,
    allocated_bytes: usize,
    limit: usize,
    #[cfg(feature = "stats")]
    stats: HeapStats,
}

impl<const HEAP_SIZE: usize, const ALIGNMENT: usize, const DESIRED_LIMIT: usize, Offset>
    Engine<HEAP_SIZE, ALIGNMENT, DESIRED_LIMIT, Offset>
where
    Offset: OffsetWord,
{
    const ALIGNMENT_LOG: u32 = ALIGNMENT.trailing_zeros();
    const AREA_SIZE: usize = HEAP_SIZE - ALIGNMENT;
    const HEADER_SIZE: usize = header_size::<Offset>();
    /// Total `ALIGNMENT`-sized units across the whole buffer, anchor slot
    /// included.
    const UNITS: usize = HEAP_SIZE / ALIGNMENT;

    pub(crate) const fn new() -> Self {
        assert!(ALIGNMENT.is_power_of_two(), "ALIGNMENT must be a power of two");
        assert!(
            ALIGNMENT >= Self::HEADER_SIZE,
            "ALIGNMENT must be large enough to hold one free-region header"
        );
        assert!(
            ALIGNMENT <= 8,
            "ALIGNMENT must be at most 8: the arena is backed by an align(8) buffer"
        );
        assert!(HEAP_SIZE % ALIGNMENT == 0, "HEAP_SIZE must be a multiple of ALIGNMENT");
        assert!(HEAP_SIZE > ALIGNMENT, "HEAP_SIZE must leave a non-empty usable area");
        assert!(DESIRED_LIMIT > 0, "DESIRED_LIMIT must be positive");
        assert!(
            Self::UNITS - 1 <= Offset::MAX_VALUE,
            "HEAP_SIZE does not fit in the configured narrow Offset width"
        );

        Self {
            bytes: Arena::new(),
            initialized: false,
            skip_hint: Offset::NULL,
            allocated_bytes: 0,
            limit: DESIRED_LIMIT,
            #[cfg(feature = "stats")]
            stats: HeapStats::new(),
        }
    }

    #[inline]
    const fn units_for(size: usize) -> usize {
        (size + ALIGNMENT - 1) / ALIGNMENT
    }

    /// The `ALIGNMENT`-rounded size of an allocation request, in bytes.
    pub(crate) const fn aligned_size(size: usize) -> usize {
        Self::units_for(size) * ALIGNMENT
    }

    pub(crate) fn allocated_bytes(&self) -> usize {
        self.allocated_bytes
    }

    pub(crate) fn limit(&self) -> usize {
        self.limit
    }

    #[cfg(feature = "stats")]
    pub(crate) fn stats(&self) -> HeapStats {
        self.stats
    }

    #[cfg(feature = "stats")]
    pub(crate) fn reset_peak_stats(&mut self) {
        self.stats.reset_peaks(self.allocated_bytes);
    }

    fn base_ptr(&self) -> *const u8 {
        self.bytes.0.as_ptr()
    }

    /// Compress a raw address into its narrow offset, with no validation.
    ///
    /// `Offset::NULL` (`0`) is the anchor's own address, so this doubles as
    /// the "end of list" encoding for real list traversal.
    fn compress_raw(&self, addr: usize) -> Offset {
        let base = self.base_ptr() as usize;
        debug_assert!(addr >= base, "address precedes the arena base");
        let delta = addr - base;
        debug_assert_eq!(delta % ALIGNMENT, 0, "address is not ALIGNMENT-aligned");
        Offset::from_usize(delta >> Self::ALIGNMENT_LOG)
    }

    fn decompress(&self, offset: Offset) -> *mut u8 {
        let base = self.base_ptr() as usize;
        (base + (offset.to_usize() << Self::ALIGNMENT_LOG)) as *mut u8
    }

    /// The user-facing pointer codec: validates that `ptr` is a real,
    /// in-arena, aligned, non-null pointer before compressing it.
    pub(crate) fn compress_checked(&self, ptr: *const u8) -> Offset {
        assert!(!ptr.is_null(), "cannot compress a null pointer");
        assert!(
            self.is_arena_pointer(ptr),
            "pointer is not a resident, aligned arena pointer"
        );
        let offset = self.compress_raw(ptr as usize);
        assert!(offset != Offset::NULL, "compressed offset collides with NULL_CP");
        offset
    }

    pub(crate) fn decompress_checked(&self, offset: Offset) -> *mut u8 {
        assert!(offset != Offset::NULL, "cannot decompress NULL_CP");
        self.decompress(offset)
    }

    pub(crate) fn is_arena_pointer(&self, ptr: *const u8) -> bool {
        let base = self.base_ptr() as usize;
        let area_base = base + ALIGNMENT;
        let addr = ptr as usize;
        addr >= area_base && addr < area_base + Self::AREA_SIZE && (addr - base) % ALIGNMENT == 0
    }

    /// Read the header at `offset` (`Offset::NULL` reads the anchor).
    ///
    /// # Safety
    /// The region at `offset` must currently hold a header written by
    /// [`Self::write_header_at`] (true for the anchor and for every free
    /// region by construction).
    unsafe fn header_at(&self, offset: Offset) -> FreeHeader<Offset> {
        let addr = self.decompress(offset);
        #[cfg(feature = "mem_analysis")]
        crate::mem_analysis::mark_defined(addr, Self::HEADER_SIZE);
        // SAFETY: forwarded to the caller.
        let header = unsafe { FreeHeader::read_at(addr) };
        #[cfg(feature = "mem_analysis")]
        crate::mem_analysis::mark_inaccessible(addr, Self::HEADER_SIZE);
        header
    }

    /// # Safety
    /// `offset` must address `Self::HEADER_SIZE` writable bytes inside
    /// `self.bytes` (true for the anchor slot and for every free region).
    unsafe fn write_header_at(&mut self, offset: Offset, header: FreeHeader<Offset>) {
        let addr = self.decompress(offset);
        #[cfg(feature = "mem_analysis")]
        crate::mem_analysis::mark_defined(addr, Self::HEADER_SIZE);
        // SAFETY: forwarded to the caller.
        unsafe { header.write_at(addr) }
        #[cfg(feature = "mem_analysis")]
        crate::mem_analysis::mark_inaccessible(addr, Self::HEADER_SIZE);
    }

    fn ensure_initialization(&mut self) {
        if self.initialized {
            return;
        }
        let first_free_offset = Offset::from_usize(1);
        let first_free_units = Offset::from_usize(Self::AREA_SIZE / ALIGNMENT);
        // SAFETY: offset 0 is the anchor slot, offset 1 is the first byte of
        // the usable area; both lie inside `self.bytes`.
        unsafe {
            self.write_header_at(Offset::NULL, FreeHeader::anchor(first_free_offset));
            self.write_header_at(first_free_offset, FreeHeader::new(first_free_units, Offset::NULL));
        }
        self.skip_hint = Offset::NULL;
        self.allocated_bytes = 0;
        self.limit = DESIRED_LIMIT;
        self.initialized = true;
    }

    /// Explicit lifecycle entry point; idempotent (every other method also
    /// lazily initializes on first use).
    pub(crate) fn init(&mut self) {
        self.ensure_initialization();
    }

    /// Precondition for tearing the heap down: nothing is still allocated.
    pub(crate) fn finalize(&self) {
        assert_eq!(
            self.allocated_bytes, 0,
            "finalize() called with outstanding allocations"
        );
    }

    fn note_allocation(&mut self, bytes: usize) {
        self.allocated_bytes += bytes;
        while self.allocated_bytes >= self.limit {
            self.limit += DESIRED_LIMIT;
        }
    }

    fn note_deallocation(&mut self, bytes: usize) {
        self.allocated_bytes -= bytes;
        while self.allocated_bytes + DESIRED_LIMIT <= self.limit {
            self.limit -= DESIRED_LIMIT;
        }
    }

    /// Allocate `size` bytes, aligned up to a multiple of `ALIGNMENT`.
    ///
    /// `size == 0` returns `None` without touching the list: the
    /// zero-size case is success, not failure, but it is indistinguishable
    /// from an out-of-memory `None` at this layer: callers translate `None`
    /// for a zero-size request into their own "none" representation before
    /// treating it as an error.
    pub(crate) fn alloc(&mut self, size: usize) -> Option<*mut u8> {
        self.ensure_initialization();
        if size == 0 {
            return None;
        }
        let required_units = Self::units_for(size);
        let result = if required_units == 1 {
            self.alloc_single_unit()
        } else {
            self.alloc_general(required_units)
        };
        #[cfg(feature = "stats")]
        if let Some(ptr) = result {
            let _ = ptr;
            self.stats
                .note_alloc(Self::aligned_size(size) - size, self.allocated_bytes);
        }
        result
    }

    /// The single-`ALIGNMENT`-unit fast path.
    fn alloc_single_unit(&mut self) -> Option<*mut u8> {
        let anchor = unsafe { self.header_at(Offset::NULL) };
        let first_offset = anchor.next_offset;
        if first_offset == Offset::NULL {
            return None;
        }
        let first = unsafe { self.header_at(first_offset) };
        let first_units = first.size_units.to_usize();

        let new_first_offset = if first_units == 1 {
            let new_first_offset = first.next_offset;
            unsafe {
                self.write_header_at(Offset::NULL, FreeHeader::anchor(new_first_offset));
            }
            new_first_offset
        } else {
            let new_first_offset = Offset::from_usize(first_offset.to_usize() + 1);
            let shrunk = FreeHeader::new(Offset::from_usize(first_units - 1), first.next_offset);
            unsafe {
                self.write_header_at(new_first_offset, shrunk);
                self.write_header_at(Offset::NULL, FreeHeader::anchor(new_first_offset));
            }
            new_first_offset
        };

        if self.skip_hint == first_offset {
            self.skip_hint = new_first_offset;
        }

        self.note_allocation(ALIGNMENT);
        Some(self.decompress(first_offset))
    }

    /// The general first-fit path: walk from the anchor, split or splice out
    /// the first region large enough.
    fn alloc_general(&mut self, required_units: usize) -> Option<*mut u8> {
        let mut prev_offset = Offset::NULL;
        let mut prev = unsafe { self.header_at(prev_offset) };
        #[cfg(feature = "stats")]
        let mut steps: u32 = 0;

        loop {
            let node_offset = prev.next_offset;
            if node_offset == Offset::NULL {
                #[cfg(feature = "stats")]
                self.stats.note_walk(steps);
                return None;
            }
            let node = unsafe { self.header_at(node_offset) };
            let node_units = node.size_units.to_usize();
            #[cfg(feature = "stats")]
            {
                steps += 1;
            }

            if node_units >= required_units {
                if node_units == required_units {
                    unsafe {
                        self.write_header_at(
                            prev_offset,
                            FreeHeader::new(prev.size_units, node.next_offset),
                        );
                    }
                } else {
                    let remainder_offset =
                        Offset::from_usize(node_offset.to_usize() + required_units);
                    let remainder = FreeHeader::new(
                        Offset::from_usize(node_units - required_units),
                        node.next_offset,
                    );
                    unsafe {
                        self.write_header_at(remainder_offset, remainder);
                        self.write_header_at(
                            prev_offset,
                            FreeHeader::new(prev.size_units, remainder_offset),
                        );
                    }
                }
                self.skip_hint = prev_offset;
                self.note_allocation(required_units * ALIGNMENT);
                #[cfg(feature = "stats")]
                self.stats.note_walk(steps);
                return Some(self.decompress(node_offset));
            }

            prev_offset = node_offset;
            prev = node;
        }
    }

    /// Return a previously allocated `(ptr, size)` pair to the free list,
    /// coalescing with neighbors.
    ///
    /// Undefined (best-effort, debug-asserted) if `ptr`/`size` do not match a
    /// live allocation from this engine.
    pub(crate) fn free(&mut self, ptr: *mut u8, size: usize) {
        self.ensure_initialization();
        debug_assert!(size > 0, "free() requires size > 0");
        debug_assert!(
            self.is_arena_pointer(ptr),
            "free() called with a pointer outside this arena"
        );

        let units = Self::units_for(size);
        let freed_offset = self.compress_raw(ptr as usize);

        let hint_addr = self.decompress(self.skip_hint) as usize;
        let start_from_hint = (ptr as usize) > hint_addr;
        #[cfg(feature = "stats")]
        if start_from_hint {
            self.stats.note_skip_hit();
        }

        let mut prev_offset = if start_from_hint { self.skip_hint } else { Offset::NULL };
        let mut prev = unsafe { self.header_at(prev_offset) };
        loop {
            let next_offset = prev.next_offset;
            if next_offset == Offset::NULL {
                break;
            }
            let next_addr = self.decompress(next_offset) as usize;
            if next_addr < ptr as usize {
                prev_offset = next_offset;
                prev = unsafe { self.header_at(next_offset) };
            } else {
                break;
            }
        }

        let pre_merge_prev_offset = prev_offset;
        let pre_merge_prev_size_units = prev.size_units;
        let successor_offset = prev.next_offset;

        let prev_addr = self.decompress(prev_offset) as usize;
        let prev_end = prev_addr + pre_merge_prev_size_units.to_usize() * ALIGNMENT;
        let merges_with_prev = pre_merge_prev_offset != Offset::NULL && prev_end == ptr as usize;

        let (block_offset, mut block_units) = if merges_with_prev {
            (pre_merge_prev_offset, pre_merge_prev_size_units.to_usize() + units)
        } else {
            (freed_offset, units)
        };
        let mut block_next = successor_offset;

        if block_next != Offset::NULL {
            let next_addr = self.decompress(block_next) as usize;
            let block_addr = self.decompress(block_offset) as usize;
            let block_end = block_addr + block_units * ALIGNMENT;
            if block_end == next_addr {
                let next_hdr = unsafe { self.header_at(block_next) };
                block_units += next_hdr.size_units.to_usize();
                block_next = next_hdr.next_offset;
            }
        }

        if merges_with_prev {
            unsafe {
                self.write_header_at(
                    block_offset,
                    FreeHeader::new(Offset::from_usize(block_units), block_next),
                );
            }
        } else {
            unsafe {
                self.write_header_at(
                    block_offset,
                    FreeHeader::new(Offset::from_usize(block_units), block_next),
                );
                self.write_header_at(
                    pre_merge_prev_offset,
                    FreeHeader::new(pre_merge_prev_size_units, block_offset),
                );
            }
        }

        self.skip_hint = pre_merge_prev_offset;
        self.note_deallocation(units * ALIGNMENT);

        #[cfg(feature = "stats")]
        self.stats.note_free(self.allocated_bytes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestEngine = Engine<512, 8, 128, u16>;

    fn fresh() -> TestEngine {
        let mut e = TestEngine::new();
        e.init();
        e
    }

    #[test]
    fn scenario_1_single_alloc() {
        let mut e = fresh();
        let base = e.base_ptr() as usize;
        let area_base = base + 8;
        let p0 = e.alloc(8).unwrap();
        assert_eq!(p0 as usize, area_base);
        assert_eq!(e.allocated_bytes(), 8);

        // free list head now starts at area_base + 8, size AREA_SIZE - 8
        let anchor = unsafe { e.header_at(Offset::NULL) };
        let head = unsafe { e.header_at(anchor.next_offset) };
        assert_eq!(e.decompress(anchor.next_offset) as usize, area_base + 8);
        assert_eq!(head.size_units.to_usize() * 8, (512 - 8) - 8);
    }

    #[test]
    fn scenario_2_full_merge_back_to_one_region() {
        let mut e = fresh();
        let p0 = e.alloc(24).unwrap();
        let p1 = e.alloc(8).unwrap();
        assert_eq!(p1 as usize, p0 as usize + 24);
        e.free(p0, 24);
        e.free(p1, 8);
        assert_eq!(e.allocated_bytes(), 0);

        let anchor = unsafe { e.header_at(Offset::NULL) };
        let head = unsafe { e.header_at(anchor.next_offset) };
        assert_eq!(head.next_offset, Offset::NULL);
        assert_eq!(head.size_units.to_usize() * 8, 512 - 8);
    }

    #[test]
    fn scenario_3_middle_then_neighbor_merges() {
        let mut e = fresh();
        let p0 = e.alloc(16).unwrap();
        let p1 = e.alloc(16).unwrap();
        let p2 = e.alloc(16).unwrap();

        e.free(p1, 16);
        let anchor = unsafe { e.header_at(Offset::NULL) };
        let hole = unsafe { e.header_at(anchor.next_offset) };
        assert_ne!(hole.next_offset, Offset::NULL); // hole + tail = two nodes

        e.free(p0, 16);
        let anchor = unsafe { e.header_at(Offset::NULL) };
        let merged = unsafe { e.header_at(anchor.next_offset) };
        assert_eq!(merged.size_units.to_usize() * 8, 32);

        e.free(p2, 16);
        assert_eq!(e.allocated_bytes(), 0);
        let anchor = unsafe { e.header_at(Offset::NULL) };
        let whole = unsafe { e.header_at(anchor.next_offset) };
        assert_eq!(whole.size_units.to_usize() * 8, 512 - 8);
        assert_eq!(whole.next_offset, Offset::NULL);
    }

    #[test]
    fn scenario_4_exhaustion_returns_none() {
        let mut e = fresh();
        let mut count = 0;
        while e.alloc(8).is_some() {
            count += 1;
        }
        assert_eq!(count, (512 - 8) / 8);
        assert!(e.alloc(8).is_none());
    }

    #[test]
    fn scenario_5_codec_round_trip_and_null_cp() {
        let e = fresh();
        let base = e.base_ptr() as usize;
        let area_base = (base + 8) as *const u8;
        assert_eq!(e.compress_raw(area_base as usize), 1u16);
        for k in 0..((512 - 8) / 8) {
            let p = unsafe { area_base.add(k * 8) };
            let c = e.compress_checked(p);
            assert_eq!(e.decompress_checked(c), p as *mut u8);
        }
    }

    #[test]
    fn scenario_6_limit_ratchet() {
        type SmallLimit = Engine<512, 8, 64, u16>;
        let mut e = SmallLimit::new();
        e.init();
        assert_eq!(e.limit(), 64);
        let p = e.alloc(64).unwrap();
        assert_eq!(e.limit(), 128);
        e.free(p, 64);
        assert_eq!(e.limit(), 64);
    }

    #[test]
    fn alloc_pointers_are_aligned_and_in_bounds() {
        let mut e = fresh();
        let base = e.base_ptr() as usize;
        let area_base = base + 8;
        for &sz in &[8usize, 16, 24, 32] {
            if let Some(p) = e.alloc(sz) {
                assert_eq!(p as usize % 8, 0);
                assert!(p as usize >= area_base && (p as usize) < area_base + (512 - 8));
            }
        }
    }

    #[test]
    fn single_unit_fast_path_splices_out_exact_fit() {
        // HEAP_SIZE=512, ALIGNMENT=8: the whole area is exactly 63 units of
        // 8 bytes. Allocate all of it one unit at a time; the last
        // single-unit allocation must exactly splice out the final node
        // rather than shrink it.
        let mut e = fresh();
        let units = (512 - 8) / 8;
        let mut last = core::ptr::null_mut();
        for _ in 0..units {
            last = e.alloc(8).unwrap();
        }
        assert!(!last.is_null());
        let anchor = unsafe { e.header_at(Offset::NULL) };
        assert_eq!(anchor.next_offset, Offset::NULL);
        assert!(e.alloc(8).is_none());
    }
}

/// Invariant checks shared by the scenario tests above and the stress
/// property test below. Not compiled outside `#[cfg(test)]`.
#[cfg(test)]
impl<const HEAP_SIZE: usize, const ALIGNMENT: usize, const DESIRED_LIMIT: usize, Offset>
    Engine<HEAP_SIZE, ALIGNMENT, DESIRED_LIMIT, Offset>
where
    Offset: OffsetWord,
{
    /// Walk the free list from the anchor and assert: sorted ascending
    /// order, no two adjacent free nodes, every size a positive in-bounds
    /// multiple of `ALIGNMENT`, and `allocated_bytes == AREA_SIZE -
    /// sum(free sizes)`.
    fn assert_invariants(&self) {
        let mut offset = Offset::NULL;
        let mut prev_addr = self.decompress(offset) as usize;
        let mut prev_end: Option<usize> = None;
        let mut free_bytes = 0usize;
        let arena_end = self.base_ptr() as usize + HEAP_SIZE;

        loop {
            let header = unsafe { self.header_at(offset) };
            let next = header.next_offset;
            if next == Offset::NULL {
                break;
            }
            let next_addr = self.decompress(next) as usize;
            assert!(next_addr > prev_addr, "free list must be sorted by ascending offset");

            let node = unsafe { self.header_at(next) };
            let size_bytes = node.size_units.to_usize() * ALIGNMENT;
            assert!(
                size_bytes >= ALIGNMENT && size_bytes % ALIGNMENT == 0,
                "free region size must be a positive multiple of ALIGNMENT"
            );
            assert!(next_addr + size_bytes <= arena_end, "free region must not cross the arena end");
            if let Some(end) = prev_end {
                assert_ne!(end, next_addr, "adjacent free regions must be coalesced");
            }

            free_bytes += size_bytes;
            prev_end = Some(next_addr + size_bytes);
            prev_addr = next_addr;
            offset = next;
        }

        assert_eq!(
            Self::AREA_SIZE - free_bytes,
            self.allocated_bytes,
            "allocated_bytes must equal AREA_SIZE minus the sum of free region sizes"
        );
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    /// One step of a random alloc/free sequence. `Free` carries an index
    /// picked modulo however many allocations happen to be live when it
    /// runs.
    #[derive(Debug, Clone, Copy)]
    enum Op {
        Alloc(usize),
        Free(usize),
    }

    fn size_strategy() -> impl Strategy<Value = usize> {
        prop_oneof![Just(8usize), Just(16), Just(24), Just(32), Just(64)]
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            3 => size_strategy().prop_map(Op::Alloc),
            2 => (0usize..256).prop_map(Op::Free),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        /// Alignment, containment, conservation, free-list ordering,
        /// coalescing and the limit/allocated_bytes relationship all hold
        /// after every operation in a random sequence of allocations and
        /// frees, cross-checked against a driver-tracked
        /// `expected_live_bytes` that must always agree with
        /// `allocated_bytes`.
        #[test]
        fn random_alloc_free_sequences_preserve_invariants(
            ops in prop::collection::vec(op_strategy(), 1..150)
        ) {
            type StressEngine = Engine<4096, 8, 512, u16>;
            let mut e = StressEngine::new();
            e.init();
            let area_base = e.base_ptr() as usize + 8;
            let mut live: std::vec::Vec<(*mut u8, usize)> = std::vec::Vec::new();
            let mut expected_live_bytes: usize = 0;

            for op in ops {
                match op {
                    Op::Alloc(size) => {
                        if let Some(p) = e.alloc(size) {
                            prop_assert_eq!(p as usize % 8, 0, "every returned pointer must be ALIGNMENT-aligned");
                            prop_assert!(
                                p as usize >= area_base && (p as usize) < area_base + (4096 - 8),
                                "every returned pointer must lie within the usable area"
                            );
                            live.push((p, size));
                            expected_live_bytes += StressEngine::aligned_size(size);
                        }
                    }
                    Op::Free(idx) => {
                        if !live.is_empty() {
                            let (p, size) = live.remove(idx % live.len());
                            e.free(p, size);
                            expected_live_bytes -= StressEngine::aligned_size(size);
                        }
                    }
                }
                prop_assert_eq!(
                    e.allocated_bytes(),
                    expected_live_bytes,
                    "allocated_bytes must track the driver's live byte count"
                );
                prop_assert!(e.limit() >= e.allocated_bytes(), "limit must never fall below allocated_bytes");
                e.assert_invariants();
            }
        }
    }
}
