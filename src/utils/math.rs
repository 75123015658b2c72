//! Mask arithmetic on 64-bit bit-vectors.
//!
//! Values are tracked with one `u64` per value regardless of their logical
//! width. A value wider than 8 bytes is represented by its low 64 bits, with
//! [`SENTINEL_BIT`] standing in for "some bit beyond the representable width".

use crate::Result;

/// The most significant representable bit, used to mark consumption of bits
/// that lie beyond the 64-bit mask of a wide value.
pub const SENTINEL_BIT: u64 = 1 << 63;

/// Converts an arena index to its `u32` handle representation.
///
/// # Errors
///
/// Returns [`crate::Error::GraphConsistency`] if `value` exceeds `u32::MAX`.
pub fn to_u32(value: usize) -> Result<u32> {
    u32::try_from(value).map_err(|_| graph_error!("arena index {value} exceeds u32::MAX"))
}

/// Returns the mask covering every bit of a value that is `size` bytes wide.
///
/// Sizes of 8 bytes or more saturate to all ones.
///
/// # Examples
///
/// ```rust,ignore
/// assert_eq!(calc_mask(1), 0xff);
/// assert_eq!(calc_mask(4), 0xffff_ffff);
/// assert_eq!(calc_mask(16), u64::MAX);
/// ```
#[must_use]
pub const fn calc_mask(size: u32) -> u64 {
    if size >= 8 {
        u64::MAX
    } else {
        (1u64 << (size * 8)) - 1
    }
}

/// Returns the sign bit of a value that is `size` bytes wide (clamped to 8).
#[must_use]
pub const fn sign_bit(size: u32) -> u64 {
    let bits = if size >= 8 { 64 } else { size * 8 };
    if bits == 0 {
        0
    } else {
        1u64 << (bits - 1)
    }
}

/// Returns the contiguous mask from bit 0 up to the highest set bit of `val`.
///
/// Carries only travel upwards, so this is the set of bits an addition can
/// depend on when `val` bits of its result are read.
#[must_use]
pub const fn covering_mask(val: u64) -> u64 {
    let mut res = val;
    res |= res >> 1;
    res |= res >> 2;
    res |= res >> 4;
    res |= res >> 8;
    res |= res >> 16;
    res |= res >> 32;
    res
}

/// Rounds `val` up to the smallest natural integer mask (1, 2, 4 or 8 bytes)
/// that contains it.
#[must_use]
pub const fn minimal_mask(val: u64) -> u64 {
    if val > 0xffff_ffff {
        u64::MAX
    } else if val > 0xffff {
        0xffff_ffff
    } else if val > 0xff {
        0xffff
    } else {
        0xff
    }
}

/// Returns the index of the least significant set bit, or `None` for zero.
#[must_use]
pub const fn least_sig_bit(val: u64) -> Option<u32> {
    if val == 0 {
        None
    } else {
        Some(val.trailing_zeros())
    }
}

/// Returns the index of the most significant set bit, or `None` for zero.
#[must_use]
pub const fn most_sig_bit(val: u64) -> Option<u32> {
    if val == 0 {
        None
    } else {
        Some(63 - val.leading_zeros())
    }
}
