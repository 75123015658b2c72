//! Shared utilities: dense bit sets and 64-bit mask arithmetic.

mod bitset;
mod math;

pub use bitset::{BitSet, BitSetIter};
pub use math::{
    calc_mask, covering_mask, least_sig_bit, minimal_mask, most_sig_bit, sign_bit, to_u32,
    SENTINEL_BIT,
};
