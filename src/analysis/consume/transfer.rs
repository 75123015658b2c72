//! Per-opcode consume transfer functions.
//!
//! Given the bits consumed at an operation's output (`outc`), each function
//! reports the bits consumed at every input. All functions are monotone in
//! `outc` and only look at the operation itself, its inputs' sizes, constants
//! and known-nonzero masks.
//!
//! `Call` and `CallInd` report nothing: argument consumption is decided from
//! the call specification, not from the call's output.

use crate::{
    analysis::graph::{Function, OpCode, Operation, ValueId},
    utils::{calc_mask, covering_mask, least_sig_bit, SENTINEL_BIT},
};

/// Every bit if `outc` is nonzero, nothing otherwise.
#[inline]
const fn any(outc: u64) -> u64 {
    if outc == 0 {
        0
    } else {
        u64::MAX
    }
}

/// `val << sa`, saturating to zero once every bit is shifted out.
#[inline]
const fn shl(val: u64, sa: u64) -> u64 {
    if sa >= 64 {
        0
    } else {
        val << sa
    }
}

/// `val >> sa`, saturating to zero once every bit is shifted out.
#[inline]
const fn shr(val: u64, sa: u64) -> u64 {
    if sa >= 64 {
        0
    } else {
        val >> sa
    }
}

/// Mask of the `bits` lowest bits.
#[inline]
const fn low_bits(bits: u64) -> u64 {
    if bits >= 64 {
        u64::MAX
    } else {
        (1u64 << bits) - 1
    }
}

/// Reports the consumption of every input of `op` given `outc` consumed at its output.
///
/// `push` receives each input with the mask of its bits consumed through this
/// operation. Inputs may be reported with a zero mask; they are still reached.
pub(crate) fn propagate<F>(func: &Function, op: &Operation, outc: u64, mut push: F)
where
    F: FnMut(ValueId, u64),
{
    let inputs = op.inputs();
    let input = |slot: usize| inputs.get(slot).copied();
    let size = |slot: usize| {
        input(slot)
            .and_then(|v| func.value(v))
            .map_or(8, |v| v.size())
    };
    let constant = |slot: usize| input(slot).and_then(|v| func.constant_of(v));
    let nz = |slot: usize| {
        input(slot)
            .and_then(|v| func.value(v))
            .map_or(u64::MAX, |v| v.nz_mask())
    };
    let out_size = op
        .output()
        .and_then(|v| func.value(v))
        .map_or(8, |v| v.size());

    let mut emit = |slot: usize, mask: u64| {
        if let Some(v) = input(slot) {
            push(v, mask);
        }
    };

    match op.opcode() {
        OpCode::Call | OpCode::CallInd | OpCode::CallOther => {}
        OpCode::IntMult => {
            let b = covering_mask(outc);
            let a = match constant(1) {
                Some(k) => match least_sig_bit(k) {
                    Some(lsb) => (calc_mask(size(0)) >> lsb) & b,
                    None => 0,
                },
                None => b,
            };
            emit(0, a);
            emit(1, b);
        }
        OpCode::IntAdd | OpCode::IntSub => {
            let a = covering_mask(outc);
            emit(0, a);
            emit(1, a);
        }
        OpCode::Subpiece => {
            let skip = constant(1).unwrap_or(0);
            let mut a = if skip >= 8 { 0 } else { outc << (skip * 8) };
            if a == 0 && outc != 0 && size(0) > 8 {
                a = SENTINEL_BIT;
            }
            emit(0, a);
            emit(1, any(outc));
        }
        OpCode::Piece => {
            let low = u64::from(size(1));
            let (a, b) = if out_size > 8 {
                if low >= 8 {
                    (u64::MAX, outc)
                } else {
                    let a = (outc >> (low * 8)) ^ shl(u64::MAX, 8 * (8 - low));
                    (a, outc ^ (a << (low * 8)))
                }
            } else {
                let a = shr(outc, low * 8);
                (a, outc ^ shl(a, low * 8))
            };
            emit(0, a);
            emit(1, b);
        }
        OpCode::Indirect | OpCode::Copy | OpCode::IntNegate | OpCode::IntZext => {
            emit(0, outc);
        }
        OpCode::IntXor | OpCode::IntOr => {
            emit(0, outc);
            emit(1, outc);
        }
        OpCode::IntAnd => match constant(1) {
            Some(k) => {
                emit(0, outc & k);
                emit(1, outc);
            }
            None => {
                emit(0, outc);
                emit(1, outc);
            }
        },
        OpCode::MultiEqual => {
            for slot in 0..inputs.len() {
                emit(slot, outc);
            }
        }
        OpCode::IntSext => {
            let b = calc_mask(size(0));
            let mut a = outc & b;
            if outc > b {
                a |= b ^ (b >> 1);
            }
            emit(0, a);
        }
        OpCode::IntLeft => match constant(1) {
            Some(sa) => {
                let a = if out_size > 8 {
                    let mut a = if sa >= 64 {
                        u64::MAX
                    } else {
                        (outc >> sa) ^ shl(u64::MAX, 64 - sa)
                    };
                    let remaining = u64::from(size(0)) * 8;
                    if sa < remaining && remaining - sa < 64 {
                        a &= low_bits(remaining - sa);
                    }
                    a
                } else {
                    shr(outc, sa)
                };
                emit(0, a);
                emit(1, any(outc));
            }
            None => {
                emit(0, any(outc));
                emit(1, any(outc));
            }
        },
        OpCode::IntRight => match constant(1) {
            Some(sa) => {
                emit(0, shl(outc, sa));
                emit(1, any(outc));
            }
            None => {
                emit(0, any(outc));
                emit(1, any(outc));
            }
        },
        OpCode::IntLess | OpCode::IntLessEqual | OpCode::IntEqual | OpCode::IntNotEqual => {
            let a = if outc == 0 { 0 } else { nz(0) | nz(1) };
            emit(0, a);
            emit(1, a);
        }
        OpCode::Insert => match (constant(2), constant(3)) {
            (Some(pos), Some(width)) => {
                let field = low_bits(width);
                emit(1, field);
                emit(0, outc & !shl(field, pos));
                emit(2, any(outc));
                emit(3, any(outc));
            }
            _ => default(inputs.len(), outc, &mut emit),
        },
        OpCode::Extract => match (constant(1), constant(2)) {
            (Some(pos), Some(width)) => {
                emit(0, shl(low_bits(width) & outc, pos));
                emit(1, any(outc));
                emit(2, any(outc));
            }
            _ => default(inputs.len(), outc, &mut emit),
        },
        OpCode::PopCount | OpCode::LzCount => {
            let possible = (16 * u64::from(size(0))).saturating_sub(1);
            emit(0, any(possible & outc));
        }
        OpCode::FloatInt2Float => {
            let a = if outc == 0 { 0 } else { covering_mask(nz(0)) };
            emit(0, a);
        }
        _ => default(inputs.len(), outc, &mut emit),
    }
}

/// Output consumed at all means every input is consumed entirely.
fn default<F>(num_inputs: usize, outc: u64, emit: &mut F)
where
    F: FnMut(usize, u64),
{
    for slot in 0..num_inputs {
        emit(slot, any(outc));
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::analysis::graph::{FunctionBuilder, OpId};

    fn run(func: &Function, op: OpId, outc: u64) -> HashMap<usize, u64> {
        let op = func.require_op(op).unwrap();
        let mut seen = HashMap::new();
        propagate(func, op, outc, |v, mask| {
            let slot = op.inputs().iter().position(|&i| i == v).unwrap();
            *seen.entry(slot).or_insert(0) |= mask;
        });
        seen
    }

    fn single(opc: OpCode, sizes: &[u32], consts: &[Option<u64>], out: u32) -> (Function, OpId) {
        let mut op = None;
        let func = FunctionBuilder::new("t", 0).build_with(|f| {
            let inputs: Vec<_> = sizes
                .iter()
                .zip(consts)
                .enumerate()
                .map(|(i, (&size, k))| match k {
                    Some(k) => f.constant(size, *k),
                    None => f.register(size, i as u64 * 0x10),
                })
                .collect();
            f.block(0, |b| {
                let v = b.assign(opc, &inputs, out);
                op = Some(b.last_op());
                b.ret(v);
            });
        });
        (func, op.unwrap())
    }

    #[test]
    fn test_and_with_constant_narrows_variable_input() {
        let (func, op) = single(OpCode::IntAnd, &[4, 4], &[None, Some(0xff)], 4);
        let m = run(&func, op, 0xffff_ffff);
        assert_eq!(m[&0], 0xff);
        assert_eq!(m[&1], 0xffff_ffff);
    }

    #[test]
    fn test_add_uses_covering_mask() {
        let (func, op) = single(OpCode::IntAdd, &[4, 4], &[None, None], 4);
        let m = run(&func, op, 0x10);
        assert_eq!(m[&0], 0x1f);
        assert_eq!(m[&1], 0x1f);
    }

    #[test]
    fn test_mult_by_constant_shifts_need() {
        let (func, op) = single(OpCode::IntMult, &[4, 4], &[None, Some(8)], 4);
        let m = run(&func, op, 0xffff_ffff);
        assert_eq!(m[&0], 0x1fff_ffff);
        assert_eq!(m[&1], 0xffff_ffff);

        let (func, op) = single(OpCode::IntMult, &[4, 4], &[None, Some(0)], 4);
        assert_eq!(run(&func, op, 0xff)[&0], 0);
    }

    #[test]
    fn test_subpiece_shifts_into_place() {
        let (func, op) = single(OpCode::Subpiece, &[4, 4], &[None, Some(2)], 2);
        let m = run(&func, op, 0xff);
        assert_eq!(m[&0], 0xff_0000);
        assert_eq!(m[&1], u64::MAX);
    }

    #[test]
    fn test_subpiece_of_wide_value_uses_sentinel() {
        let (func, op) = single(OpCode::Subpiece, &[16, 4], &[None, Some(8)], 8);
        let m = run(&func, op, 0xff);
        assert_eq!(m[&0], SENTINEL_BIT);

        // nothing consumed at the output means nothing consumed at all
        let m = run(&func, op, 0);
        assert_eq!(m[&0], 0);
        assert_eq!(m[&1], 0);
    }

    #[test]
    fn test_piece_splits_at_low_size() {
        let (func, op) = single(OpCode::Piece, &[2, 2], &[None, None], 4);
        let m = run(&func, op, 0x00ff_ff00);
        assert_eq!(m[&0], 0x00ff);
        assert_eq!(m[&1], 0xff00);
    }

    #[test]
    fn test_wide_piece_marks_high_part() {
        let (func, op) = single(OpCode::Piece, &[8, 8], &[None, None], 16);
        let m = run(&func, op, 0xff);
        assert_eq!(m[&0], u64::MAX);
        assert_eq!(m[&1], 0xff);
    }

    #[test]
    fn test_sext_marks_sign_bit() {
        let (func, op) = single(OpCode::IntSext, &[1], &[None], 4);
        assert_eq!(run(&func, op, 0x100)[&0], 0x80);
        assert_eq!(run(&func, op, 0x0f)[&0], 0x0f);
    }

    #[test]
    fn test_shifts_by_constant() {
        let (func, op) = single(OpCode::IntLeft, &[4, 4], &[None, Some(8)], 4);
        let m = run(&func, op, 0xff00);
        assert_eq!(m[&0], 0xff);
        assert_eq!(m[&1], u64::MAX);

        let (func, op) = single(OpCode::IntRight, &[4, 4], &[None, Some(8)], 4);
        assert_eq!(run(&func, op, 0xff)[&0], 0xff00);

        let (func, op) = single(OpCode::IntRight, &[4, 4], &[None, None], 4);
        let m = run(&func, op, 0xff);
        assert_eq!(m[&0], u64::MAX);
        assert_eq!(m[&1], u64::MAX);
    }

    #[test]
    fn test_comparison_uses_nonzero_masks() {
        let (func, op) = single(OpCode::IntEqual, &[1, 1], &[None, Some(3)], 1);
        let m = run(&func, op, 1);
        assert_eq!(m[&0], 0xff);
        assert_eq!(m[&1], 0xff);
        let m = run(&func, op, 0);
        assert_eq!(m[&0], 0);
    }

    #[test]
    fn test_default_is_all_or_nothing() {
        let (func, op) = single(OpCode::IntSRight, &[4, 4], &[None, Some(1)], 4);
        assert_eq!(run(&func, op, 1)[&0], u64::MAX);
        assert_eq!(run(&func, op, 0)[&0], 0);
    }

    #[test]
    fn test_extract_and_insert() {
        let (func, op) = single(
            OpCode::Extract,
            &[4, 4, 4],
            &[None, Some(4), Some(8)],
            4,
        );
        assert_eq!(run(&func, op, 0x0f)[&0], 0xf0);

        let (func, op) = single(
            OpCode::Insert,
            &[4, 4, 4, 4],
            &[None, None, Some(8), Some(4)],
            4,
        );
        let m = run(&func, op, 0xffff);
        assert_eq!(m[&0], 0xf0ff);
        assert_eq!(m[&1], 0x0f);
    }

    #[test]
    fn test_popcount_consumes_whole_input() {
        let (func, op) = single(OpCode::PopCount, &[4], &[None], 1);
        assert_eq!(run(&func, op, 0x1)[&0], u64::MAX);
        assert_eq!(run(&func, op, 0x80)[&0], 0);
    }

    #[test]
    fn test_transfer_is_monotone_on_samples() {
        let samples = [0u64, 1, 0xf0, 0xff, 0xff00, 0xffff_ffff, u64::MAX];
        let cases: Vec<(OpCode, Vec<u32>, Vec<Option<u64>>, u32)> = vec![
            (OpCode::IntAdd, vec![4, 4], vec![None, None], 4),
            (OpCode::IntMult, vec![4, 4], vec![None, Some(12)], 4),
            (OpCode::Subpiece, vec![16, 4], vec![None, Some(3)], 4),
            (OpCode::Piece, vec![4, 8], vec![None, None], 12),
            (OpCode::IntLeft, vec![16, 4], vec![None, Some(12)], 16),
            (OpCode::IntSext, vec![2], vec![None], 8),
        ];
        for (opc, sizes, consts, out) in cases {
            let (func, op) = single(opc, &sizes, &consts, out);
            for &small in &samples {
                for &large in &samples {
                    if small & !large != 0 {
                        continue;
                    }
                    let lo = run(&func, op, small);
                    let hi = run(&func, op, large);
                    for (slot, mask) in lo {
                        assert_eq!(mask & !hi[&slot], 0, "{opc} slot {slot} {small:#x} <= {large:#x}");
                    }
                }
            }
        }
    }
}
