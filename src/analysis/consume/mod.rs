//! Bit-precision liveness.
//!
//! For every value the analysis computes a *consume mask*: the bits some
//! definitely-executed use may read. Masks start at zero, are seeded from
//! operations with observable effects and flow backwards through per-opcode
//! transfer functions until nothing changes. A written value whose mask stays
//! zero (or that propagation never reaches) has no observable effect and may
//! be removed or replaced by a constant.
//!
//! # Key Types
//!
//! - [`ConsumeAnalysis`] - The worklist solver
//! - [`ConsumeMasks`] - The per-value result
//!
//! The mask helpers used by the transfer functions are re-exported from
//! [`crate::utils`] for hosts writing their own rules.

mod mask;
mod solver;
mod transfer;

pub use mask::ConsumeMasks;
pub use solver::ConsumeAnalysis;
pub use crate::utils::{
    calc_mask, covering_mask, least_sig_bit, minimal_mask, most_sig_bit, SENTINEL_BIT,
};
