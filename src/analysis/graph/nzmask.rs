//! Known-nonzero bit computation.
//!
//! Every value starts at the widest mask its size allows (constants start at
//! their own value) and each written value is then narrowed by a local rule
//! of its defining operation. The iteration is descending: starting from the
//! top of the lattice with monotone local rules, masks only ever lose bits, so
//! the worklist terminates after at most 64 changes per value.

use std::collections::VecDeque;

use crate::{
    analysis::graph::{Function, OpCode, Operation},
    utils::{calc_mask, covering_mask, most_sig_bit, sign_bit},
};

/// Computes the known-nonzero mask of every value slot of `func`.
///
/// Erased slots get a zero mask.
pub(crate) fn compute(func: &Function) -> Vec<u64> {
    let mut masks = vec![0u64; func.value_slots()];
    for value in func.values() {
        masks[value.id().index()] = match value.constant() {
            Some(val) => val,
            None => value.full_mask(),
        };
    }

    let mut queued = vec![false; func.op_slots()];
    let mut worklist: VecDeque<_> = func
        .ops()
        .filter(|op| op.output().is_some())
        .map(Operation::id)
        .collect();
    for op in &worklist {
        queued[op.index()] = true;
    }

    while let Some(id) = worklist.pop_front() {
        queued[id.index()] = false;
        let Some(op) = func.op(id) else { continue };
        let Some(out) = op.output() else { continue };
        let mask = local_mask(func, op, &masks);
        if mask == masks[out.index()] {
            continue;
        }
        masks[out.index()] = mask;
        let Some(value) = func.value(out) else { continue };
        for &reader in value.reads() {
            let writes = func.op(reader).is_some_and(|r| r.output().is_some());
            if writes && !queued[reader.index()] {
                queued[reader.index()] = true;
                worklist.push_back(reader);
            }
        }
    }
    masks
}

fn local_mask(func: &Function, op: &Operation, masks: &[u64]) -> u64 {
    let out_size = op
        .output()
        .and_then(|v| func.value(v))
        .map_or(8, |v| v.size());
    let full = calc_mask(out_size);

    let nz = |slot: usize| {
        op.input(slot)
            .map_or(u64::MAX, |v| masks.get(v.index()).copied().unwrap_or(u64::MAX))
    };
    let size_of = |slot: usize| {
        op.input(slot)
            .and_then(|v| func.value(v))
            .map_or(8, |v| v.size())
    };
    let const_in = |slot: usize| op.input(slot).and_then(|v| func.constant_of(v));

    if op.opcode().is_boolean_output() {
        return 1 & full;
    }

    let mask = match op.opcode() {
        OpCode::Copy | OpCode::IntZext => nz(0),
        OpCode::IntSext => {
            let inner = size_of(0);
            if nz(0) & sign_bit(inner) != 0 {
                nz(0) | (full & !calc_mask(inner))
            } else {
                nz(0)
            }
        }
        OpCode::IntAnd => nz(0) & nz(1),
        OpCode::IntOr | OpCode::IntXor => nz(0) | nz(1),
        OpCode::MultiEqual => (0..op.num_inputs()).fold(0, |acc, slot| acc | nz(slot)),
        OpCode::IntAdd => {
            let cover = covering_mask(nz(0) | nz(1));
            if cover == u64::MAX {
                cover
            } else {
                (cover << 1) | 1
            }
        }
        OpCode::IntMult => match (most_sig_bit(nz(0)), most_sig_bit(nz(1))) {
            (Some(a), Some(b)) if a + b + 2 < 64 => (1u64 << (a + b + 2)) - 1,
            (None, _) | (_, None) => 0,
            _ => u64::MAX,
        },
        OpCode::IntLeft => match const_in(1) {
            Some(sa) if sa >= 64 => 0,
            Some(sa) => nz(0) << sa,
            None => u64::MAX,
        },
        OpCode::IntRight => match const_in(1) {
            Some(sa) if sa >= 64 => 0,
            Some(sa) => nz(0) >> sa,
            None => u64::MAX,
        },
        OpCode::IntSRight => match const_in(1) {
            Some(sa) if nz(0) & sign_bit(size_of(0)) == 0 => {
                if sa >= 64 {
                    0
                } else {
                    nz(0) >> sa
                }
            }
            _ => u64::MAX,
        },
        OpCode::Subpiece => match const_in(1) {
            Some(bytes) if bytes < 8 => nz(0) >> (bytes * 8),
            _ => u64::MAX,
        },
        OpCode::Piece => {
            let low_bits = u64::from(size_of(1)) * 8;
            if low_bits >= 64 {
                u64::MAX
            } else {
                (nz(0) << low_bits) | nz(1)
            }
        }
        OpCode::PopCount => covering_mask(u64::from(nz(0).count_ones())),
        OpCode::LzCount => covering_mask(u64::from(size_of(0)) * 8),
        _ => u64::MAX,
    };
    mask & full
}
