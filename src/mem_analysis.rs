//! Extension points for an external memory-analysis tool (e.g. a
//! Valgrind-style client-request shim), enabled by the `mem_analysis`
//! feature.
//!
//! These are no-ops by default. Wiring up a concrete tool means replacing
//! these bodies with the tool's actual client requests, the same way using
//! Valgrind for real means opting a build into its macros, not something
//! this crate can do unconditionally without fabricating a dependency on a
//! specific tool.

/// Mark `len` bytes at `ptr` as "defined" for the duration of a header read.
#[inline(always)]
pub(crate) fn mark_defined(_ptr: *const u8, _len: usize) {}

/// Mark `len` bytes at `ptr` as "inaccessible" once the engine is done
/// reading/writing a header, so a stray access from user code is caught.
#[inline(always)]
pub(crate) fn mark_inaccessible(_ptr: *const u8, _len: usize) {}

/// Announce a malloc-like event, unless `suppressed` (the embedder's pool
/// manager already announced it further up the call stack).
#[inline(always)]
pub(crate) fn announce_alloc(_ptr: *const u8, _len: usize, _suppressed: bool) {}

/// Announce a free-like event, unless `suppressed`.
#[inline(always)]
pub(crate) fn announce_free(_ptr: *const u8, _suppressed: bool) {}
