//! The compact offset pointer codec.
//!
//! High-level objects living on top of this heap want to store references in
//! a width much narrower than a native pointer (e.g. 16 bits for a 128 KiB
//! arena at 8-byte alignment). [`OffsetWord`] is implemented for the usual
//! unsigned integer widths so an embedder can pick whichever one covers its
//! arena; [`Heap`](crate::Heap) defaults to `u16`.
//!
//! A distinguished value, [`OffsetWord::NULL`], means "no pointer". It is
//! always `0`: the free-list anchor lives at the very start of the backing
//! buffer (offset `0`), one `ALIGNMENT`-sized slot before the first byte of
//! the usable area, so offset `0` can never be returned as a real allocation
//! and doubles as both "end of list" and "this is the anchor, not a real
//! node".

use core::fmt::Debug;

/// A narrow unsigned integer used to store a compressed arena offset.
///
/// Implemented for `u8`, `u16`, `u32` and `u64`. On hosts where a native
/// pointer already fits comfortably in the chosen width there is nothing
/// special about this trait: the arithmetic is the same either way, only the
/// storage is narrower than a pointer.
pub trait OffsetWord: Copy + Eq + Debug + 'static {
    /// Number of bits in this word.
    const BITS: u32;
    /// The reserved "no pointer" value.
    const NULL: Self;
    /// Largest representable value, as a `usize`.
    const MAX_VALUE: usize;

    /// Widen to a `usize` unit count.
    fn to_usize(self) -> usize;
    /// Narrow a `usize` unit count down to `Self`.
    ///
    /// # Panics
    /// Panics (via `debug_assert!`) if `value` does not fit.
    fn from_usize(value: usize) -> Self;
}

macro_rules! impl_offset_word {
    ($ty:ty) => {
        impl OffsetWord for $ty {
            const BITS: u32 = <$ty>::BITS;
            const NULL: Self = 0;
            const MAX_VALUE: usize = <$ty>::MAX as usize;

            #[inline]
            fn to_usize(self) -> usize {
                self as usize
            }

            #[inline]
            fn from_usize(value: usize) -> Self {
                debug_assert!(
                    value <= Self::MAX_VALUE,
                    "offset does not fit in the configured narrow width"
                );
                value as Self
            }
        }
    };
}

impl_offset_word!(u8);
impl_offset_word!(u16);
impl_offset_word!(u32);
impl_offset_word!(u64);

#[cfg(test)]
mod tests {
    use super::OffsetWord;

    #[test]
    fn null_is_zero_for_every_width() {
        assert_eq!(u8::NULL, 0);
        assert_eq!(u16::NULL, 0);
        assert_eq!(u32::NULL, 0);
        assert_eq!(u64::NULL, 0);
    }

    #[test]
    fn round_trip_within_range() {
        let value: u16 = OffsetWord::from_usize(1234);
        assert_eq!(OffsetWord::to_usize(value), 1234);
    }
}
