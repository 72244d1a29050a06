//! Fixed-capacity, single-arena heap for embedded dynamic-language runtimes.
//!
//! This crate provides a single type called [`Heap`]. It owns one statically
//! sized byte region and serves sub-allocation requests out of it with a
//! first-fit, address-sorted free list, exactly the shape of memory manager
//! a small interpreter (think: a JerryScript-style embedded JS engine) wants
//! underneath its own garbage collector. It is deliberately *not* a
//! [`core::alloc::GlobalAlloc`]: it has no notion of arbitrary per-call
//! alignment, it hands out narrow [`offset::OffsetWord`]-compressed pointers
//! for object fields in addition to real pointers, and it drives external
//! reclamation callbacks (the embedder's GC) when memory pressure rises
//! instead of simply failing.
//!
//! # Usage
//! Declare one `static` per arena and adjust the size parameters to your
//! budget:
//! ```
//! use edgeheap::Heap;
//!
//! static HEAP: Heap<4096, 8, 1024, u16> = Heap::new();
//!
//! HEAP.init();
//! let block = HEAP.alloc_or_none(64).expect("fresh heap has room");
//! HEAP.free(block, 64);
//! ```
//! The const generics are, in order: `HEAP_SIZE` (total arena bytes),
//! `ALIGNMENT` (a power of two, typically `8`), and `DESIRED_LIMIT` (the
//! soft-limit ratchet step, see below). `Offset` defaults to `u16`, which
//! covers arenas up to 512 KiB at 8-byte alignment; pick `u8` for a tiny
//! arena or `u32`/`u64` for a larger one.
//!
//! # Memory pressure
//! `Heap` tracks a soft `limit` distinct from `HEAP_SIZE`. Crossing it does
//! not fail an allocation by itself; instead it invokes every callback
//! registered with [`Heap::register_reclaim_callback`] (typically "run the
//! garbage collector"), at an escalating [`pressure::Severity`], retrying the
//! allocation after each one. Only once every callback has run and the
//! allocation still doesn't fit does [`Heap::alloc`] abort the process (or
//! [`Heap::alloc_or_none`] return [`None`]).
//!
//! # Implementation
//! The free list is threaded *through* the free regions themselves: each one
//! begins with a small header holding its size and the compressed offset of
//! the next free region, sorted by ascending address. Allocating walks the
//! list first-fit and splits the first region large enough; freeing walks
//! from a cached "skip-ahead" hint (exploiting the temporal locality of
//! typical alloc/free patterns) and coalesces with whichever neighbors are
//! physically adjacent. See the crate's internal engine module for the full algorithm.
#![cfg_attr(not(test), no_std)]
#![warn(unsafe_op_in_unsafe_fn)]
#![warn(clippy::undocumented_unsafe_blocks)]

mod engine;
mod mem_analysis;

pub mod error;
pub mod offset;
pub mod pressure;
#[cfg(feature = "stats")]
pub mod stats;

use core::ptr;

use engine::Engine;
use error::FreeError;
use offset::OffsetWord;
use pressure::{CallbackRegistry, ReclaimCallback, Severity};

#[cfg(feature = "stats")]
use stats::HeapStats;

/// The fixed-capacity single-arena heap.
///
/// `HEAP_SIZE` and `ALIGNMENT` are spent entirely on the backing arena (see
/// the internal `Engine` type for how the first `ALIGNMENT` bytes become the free-list
/// anchor and the rest become the usable area). `DESIRED_LIMIT` is the
/// hysteresis step of the pressure controller's soft limit: it rises by this
/// much every time allocation catches up to it, and falls by this much once
/// usage drops `DESIRED_LIMIT` bytes below it again. `Offset` is the narrow
/// integer type used to compress arena pointers (see [`offset::OffsetWord`]);
/// it must be wide enough that `HEAP_SIZE / ALIGNMENT` fits in it, which
/// [`Heap::new`] asserts at construction.
///
/// A `Heap` carries no internal synchronization of its own beyond what is
/// needed to be [`Sync`] for a `static`: the engine and the callback registry
/// are each behind a [`spin::Mutex`], but logically-concurrent callers must
/// still serialize access externally: this is a single-threaded allocator.
#[must_use = "assign the heap to a static variable and call `init()` before use"]
pub struct Heap<
    const HEAP_SIZE: usize,
    const ALIGNMENT: usize,
    const DESIRED_LIMIT: usize,
    Offset: OffsetWord = u16,
> {
    /// The arena and free-list engine. Locked only around the single call
    /// that touches it; never held while a reclaim callback runs, since a
    /// callback that itself allocates or frees must be able to re-enter.
    engine: spin::Mutex<Engine<HEAP_SIZE, ALIGNMENT, DESIRED_LIMIT, Offset>>,
    /// Registered reclamation callbacks (the embedder's GC and friends).
    callbacks: spin::Mutex<CallbackRegistry>,
}

impl<const HEAP_SIZE: usize, const ALIGNMENT: usize, const DESIRED_LIMIT: usize, Offset>
    Heap<HEAP_SIZE, ALIGNMENT, DESIRED_LIMIT, Offset>
where
    Offset: OffsetWord,
{
    /// Byte size of the size-header prepended by
    /// [`Heap::alloc_with_size_header`], rounded up to `ALIGNMENT` like every
    /// other region in this arena.
    const SIZE_HEADER_BYTES: usize =
        Engine::<HEAP_SIZE, ALIGNMENT, DESIRED_LIMIT, Offset>::aligned_size(
            core::mem::size_of::<usize>(),
        );

    /// Create a new, lazily-initialized heap.
    ///
    /// This is a `const fn`; the usual pattern is a top-level `static`. The
    /// arena is not actually carved into a single free region until the
    /// first call to [`Heap::init`] or any allocating method (whichever
    /// comes first).
    ///
    /// # Panics
    /// Panics (at the `new()` call site, so typically at compile time for a
    /// `const` `static`) if `ALIGNMENT` is not a power of two, if `HEAP_SIZE`
    /// is not a multiple of `ALIGNMENT`, if `DESIRED_LIMIT` is zero, or if
    /// `HEAP_SIZE / ALIGNMENT` does not fit in `Offset`.
    pub const fn new() -> Self {
        Self {
            engine: spin::Mutex::new(Engine::new()),
            callbacks: spin::Mutex::new(CallbackRegistry::new()),
        }
    }

    /// Explicitly carve the arena into its initial single free region.
    ///
    /// Idempotent: every allocating/freeing method also lazily initializes
    /// on first use, so calling this is a matter of taste (e.g. doing it
    /// once up front during boot rather than paying for the check on the
    /// first real allocation).
    pub fn init(&self) {
        self.engine.lock().init();
    }

    /// Assert that nothing is currently allocated.
    ///
    /// # Panics
    /// Panics if `allocated_bytes != 0`. There is no other effect: the
    /// arena's storage is reclaimed by Rust's ordinary `Drop` rules once the
    /// `Heap` itself goes out of scope, so this exists purely as the
    /// lifecycle precondition check this method exists to assert.
    pub fn finalize(&self) {
        self.engine.lock().finalize();
    }

    /// Allocate `size` bytes, aligned to `ALIGNMENT`, or abort the process.
    ///
    /// `size == 0` returns a null pointer without touching the heap or
    /// running any reclaim callback. This is success, not failure; any
    /// caller that needs a recoverable failure path instead of process
    /// termination should use [`Heap::alloc_or_none`].
    pub fn alloc(&self, size: usize) -> *mut u8 {
        if size == 0 {
            return ptr::null_mut();
        }
        match self.alloc_with_reclaim(size) {
            Some(p) => p,
            None => self.out_of_memory(),
        }
    }

    /// Allocate `size` bytes, aligned to `ALIGNMENT`, or return [`None`].
    ///
    /// `size == 0` returns `None` as well; callers that need to distinguish
    /// "zero-size success" from "out of memory" must track that themselves,
    /// the two cases are indistinguishable at this layer.
    pub fn alloc_or_none(&self, size: usize) -> Option<*mut u8> {
        if size == 0 {
            return None;
        }
        self.alloc_with_reclaim(size)
    }

    /// Allocate a region large enough for `size` bytes plus an internal
    /// length header, and return a pointer just past that header.
    ///
    /// Pairs with [`Heap::free_with_size_header`], which needs no explicit
    /// size argument because it reads the header back. Uses the fatal
    /// [`Heap::alloc`] path: `size == 0` returns a null pointer.
    pub fn alloc_with_size_header(&self, size: usize) -> *mut u8 {
        if size == 0 {
            return ptr::null_mut();
        }
        let total = Self::SIZE_HEADER_BYTES + Self::aligned_size(size);
        let block = self.alloc(total);
        // SAFETY: `block` is a fresh `total`-byte allocation, which is at
        // least `SIZE_HEADER_BYTES` (a multiple of `size_of::<usize>()`)
        // bytes long and `ALIGNMENT`-aligned, hence suitably aligned for a
        // `usize` write.
        unsafe {
            block.cast::<usize>().write_unaligned(total);
        }
        // SAFETY: `block` points `SIZE_HEADER_BYTES` bytes into the same
        // `total`-byte allocation, which is strictly longer than that.
        unsafe { block.add(Self::SIZE_HEADER_BYTES) }
    }

    /// Return a region obtained from [`Heap::alloc`]/[`Heap::alloc_or_none`].
    ///
    /// `ptr` must have been returned by a prior successful allocation of
    /// `size` bytes from this same `Heap` and not yet freed. Misuse (wrong
    /// size, foreign pointer, double free) is undefined behavior; the checks
    /// below are best-effort and only catch what can be checked cheaply.
    pub fn free(&self, ptr: *mut u8, size: usize) {
        if ptr.is_null() {
            return;
        }
        debug_assert!(size > 0, "{}", FreeError::ZeroSize);
        {
            let engine = self.engine.lock();
            debug_assert!(engine.is_arena_pointer(ptr), "{}", FreeError::NotAnArenaPointer);
        }
        self.engine.lock().free(ptr, size);
        #[cfg(feature = "mem_analysis")]
        mem_analysis::announce_free(ptr, false);
    }

    /// Return a region obtained from [`Heap::alloc_with_size_header`].
    ///
    /// Reads the size header written at allocation time, so no explicit
    /// size argument is needed.
    pub fn free_with_size_header(&self, ptr: *mut u8) {
        if ptr.is_null() {
            return;
        }
        // SAFETY: `ptr` was returned by `alloc_with_size_header`, which
        // placed the header `SIZE_HEADER_BYTES` bytes before it.
        let header = unsafe { ptr.sub(Self::SIZE_HEADER_BYTES) };
        // SAFETY: `header` holds a `usize` written by
        // `alloc_with_size_header` and never otherwise touched.
        let total = unsafe { header.cast::<usize>().read_unaligned() };
        self.free(header, total);
    }

    /// The pressure-controller loop: optionally reclaim before every
    /// allocation, reclaim pre-emptively once the soft limit is in sight,
    /// then escalate through every severity on outright failure. Returns
    /// `None` only once every registered callback has run and the
    /// allocation still doesn't fit (or no callbacks are registered at all).
    fn alloc_with_reclaim(&self, size: usize) -> Option<*mut u8> {
        #[cfg(feature = "reclaim_before_alloc")]
        self.callbacks.lock().invoke(Severity::High);

        let aligned = Self::aligned_size(size);
        let near_limit = {
            let engine = self.engine.lock();
            engine.allocated_bytes() + aligned >= engine.limit()
        };
        if near_limit {
            self.callbacks.lock().invoke(Severity::Low);
        }

        let mut result = self.engine.lock().alloc(size);
        if result.is_none() {
            for severity in [Severity::Low, Severity::High] {
                self.callbacks.lock().invoke(severity);
                result = self.engine.lock().alloc(size);
                if result.is_some() {
                    break;
                }
            }
        }

        #[cfg(feature = "mem_analysis")]
        if let Some(p) = result {
            mem_analysis::announce_alloc(p, aligned, false);
        }
        result
    }

    /// The fatal out-of-memory path: every reclaim callback has already run
    /// and failed to free enough memory.
    #[cold]
    fn out_of_memory(&self) -> ! {
        panic!("edgeheap: out of memory (ERR_OUT_OF_MEMORY)");
    }

    /// The `ALIGNMENT`-rounded size of an allocation request, in bytes.
    pub const fn aligned_size(size: usize) -> usize {
        Engine::<HEAP_SIZE, ALIGNMENT, DESIRED_LIMIT, Offset>::aligned_size(size)
    }

    /// Register an external reclamation callback (e.g. "run the garbage
    /// collector"). Invoked, along with every other registered callback, in
    /// FIFO registration order whenever the pressure controller decides to
    /// reclaim.
    ///
    /// # Errors
    /// Returns [`error::CallbackTableFull`] once
    /// [`pressure::MAX_RECLAIM_CALLBACKS`] callbacks are already registered.
    pub fn register_reclaim_callback(
        &self,
        callback: ReclaimCallback,
    ) -> Result<(), error::CallbackTableFull> {
        self.callbacks.lock().register(callback)
    }

    /// Compress an arena pointer into its narrow [`offset::OffsetWord`] form.
    ///
    /// # Panics
    /// Panics if `ptr` is null, does not lie inside this heap's arena, or is
    /// not aligned to `ALIGNMENT`.
    pub fn compress(&self, ptr: *const u8) -> Offset {
        self.engine.lock().compress_checked(ptr)
    }

    /// Decompress an [`offset::OffsetWord`] back into an arena pointer.
    ///
    /// # Panics
    /// Panics if `offset` is [`offset::OffsetWord::NULL`].
    pub fn decompress(&self, offset: Offset) -> *mut u8 {
        self.engine.lock().decompress_checked(offset)
    }

    /// Whether `ptr` is a valid, `ALIGNMENT`-aligned pointer inside this
    /// heap's usable area. Debug/assertion-only: a conformant caller never
    /// needs this to make an allocation decision, only to sanity-check one.
    pub fn is_arena_pointer(&self, ptr: *const u8) -> bool {
        self.engine.lock().is_arena_pointer(ptr)
    }

    /// Copy out a snapshot of the lifetime allocation counters.
    #[cfg(feature = "stats")]
    pub fn get_stats(&self, out: &mut HeapStats) {
        *out = self.engine.lock().stats();
    }

    /// Reset the peak counters (`bytes_allocated_peak`, `walk_steps_peak`) to
    /// their current values, without touching the monotonic lifetime totals.
    #[cfg(feature = "stats")]
    pub fn reset_peak_stats(&self) {
        self.engine.lock().reset_peak_stats();
    }

    /// Format a human-readable stats report to `out`.
    #[cfg(feature = "stats")]
    pub fn print_stats(&self, out: &mut dyn core::fmt::Write) -> core::fmt::Result {
        self.engine.lock().stats().print(out)
    }
}

#[cfg(test)]
mod tests {
    use super::Heap;
    use crate::pressure::Severity;
    use core::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn zero_size_alloc_returns_null_without_touching_the_heap() {
        static HEAP: Heap<512, 8, 128, u16> = Heap::new();
        assert!(HEAP.alloc(0).is_null());
        assert!(HEAP.alloc_or_none(0).is_none());
    }

    #[test]
    fn alloc_then_free_round_trip() {
        static HEAP: Heap<512, 8, 128, u16> = Heap::new();
        let p0 = HEAP.alloc_or_none(24).unwrap();
        let p1 = HEAP.alloc_or_none(8).unwrap();
        assert_ne!(p0, p1);
        HEAP.free(p0, 24);
        HEAP.free(p1, 8);
        HEAP.finalize();
    }

    #[test]
    fn size_header_round_trip() {
        static HEAP: Heap<512, 8, 128, u16> = Heap::new();
        let p = HEAP.alloc_with_size_header(20);
        assert!(!p.is_null());
        assert_eq!((p as usize) % 8, 0);
        HEAP.free_with_size_header(p);
        HEAP.finalize();
    }

    #[test]
    fn pointer_codec_round_trips_through_the_heap() {
        static HEAP: Heap<512, 8, 128, u16> = Heap::new();
        HEAP.init();
        let p = HEAP.alloc_or_none(8).unwrap();
        let c = HEAP.compress(p);
        assert_eq!(HEAP.decompress(c), p);
        HEAP.free(p, 8);
    }

    static RECLAIM_CALLS: AtomicU32 = AtomicU32::new(0);
    static LAST_SEVERITY: spin::Mutex<Option<Severity>> = spin::Mutex::new(None);

    fn reclaim_everything(severity: Severity) {
        RECLAIM_CALLS.fetch_add(1, Ordering::SeqCst);
        *LAST_SEVERITY.lock() = Some(severity);
    }

    #[test]
    fn exhaustion_runs_reclaim_callbacks_before_failing() {
        static HEAP: Heap<64, 8, 32, u16> = Heap::new();
        HEAP.init();
        RECLAIM_CALLS.store(0, Ordering::SeqCst);
        HEAP.register_reclaim_callback(reclaim_everything).unwrap();

        // Exhaust the arena: AREA_SIZE = 56, so 7 allocations of 8 bytes.
        // `std` is available under `#[cfg(test)]` despite the crate being
        // `no_std` otherwise (see the `cfg_attr` on the crate root).
        let mut ptrs = std::vec::Vec::new();
        while let Some(p) = HEAP.alloc_or_none(8) {
            ptrs.push(p);
        }
        assert_eq!(ptrs.len(), (64 - 8) / 8);

        // One more allocation fails outright, but only after the registered
        // callback had a chance to reclaim (it doesn't actually free
        // anything here, so the retry still fails).
        assert!(HEAP.alloc_or_none(8).is_none());
        assert!(RECLAIM_CALLS.load(Ordering::SeqCst) >= 1);

        for p in ptrs {
            HEAP.free(p, 8);
        }
        HEAP.finalize();
    }
}
