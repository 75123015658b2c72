//! Standard rules and actions.
//!
//! # Rules
//!
//! | Rule | Group | Rewrites |
//! |------|-------|----------|
//! | [`FoldConstantsRule`] | base | operations whose inputs are all constant |
//! | [`PropagateCopyRule`] | base | reads of `COPY` outputs |
//! | [`CollapseCopyRule`] | analysis | copies into temporaries |
//! | [`IdentityRule`] | analysis | `x + 0`, `x | 0`, `x ^ 0`, `x & -1`, `x * 1` |
//! | [`AbsorbRule`] | analysis | `x & 0`, `x * 0`, `x ^ x`, `x - x` |
//! | [`DoubleNegateRule`] | analysis | `~~x`, `--x`, `!!x` |
//! | [`NegateCompareRule`] | cleanup | `!(a < b)` |
//!
//! # Actions
//!
//! - [`NonzeroMaskAction`] refreshes the known-nonzero masks the liveness
//!   analysis reads.
//! - [`DeadCodeAction`] runs the bit-precision liveness analysis and commits
//!   its result.

mod algebraic;
mod copying;
mod deadcode;
mod nzmask;
mod predicates;

pub use algebraic::{AbsorbRule, DoubleNegateRule, FoldConstantsRule, IdentityRule};
pub use copying::{CollapseCopyRule, PropagateCopyRule};
pub use deadcode::DeadCodeAction;
pub use nzmask::NonzeroMaskAction;
pub use predicates::NegateCompareRule;

use crate::{
    analysis::{Function, OpCode, OpId, ValueId},
    Result,
};

/// Turns `op` into `out = COPY source`, dropping every other input.
fn rewrite_as_copy(func: &mut Function, op: OpId, source: ValueId) -> Result<()> {
    func.set_input(op, 0, source)?;
    loop {
        let inputs = func.require_op(op)?.num_inputs();
        if inputs <= 1 {
            break;
        }
        func.remove_input(op, inputs - 1)?;
    }
    func.set_opcode(op, OpCode::Copy)
}

/// Turns `op` into a copy of a fresh constant `val` sized like its output.
fn rewrite_as_constant(func: &mut Function, op: OpId, val: u64) -> Result<()> {
    let output = func
        .require_op(op)?
        .output()
        .ok_or_else(|| graph_error!("{} has no output to fold", op))?;
    let size = func.require_value(output)?.size();
    let constant = func.new_constant(size, val & crate::utils::calc_mask(size))?;
    rewrite_as_copy(func, op, constant)
}

/// Returns the two inputs of a binary operation.
fn binary_inputs(func: &Function, op: OpId) -> Result<Option<(ValueId, ValueId)>> {
    let operation = func.require_op(op)?;
    if operation.output().is_none() {
        return Ok(None);
    }
    Ok(match operation.inputs() {
        &[a, b] => Some((a, b)),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::FunctionBuilder;

    #[test]
    fn test_rewrite_as_copy_drops_extra_inputs() {
        let mut sum = None;
        let mut func = FunctionBuilder::new("f", 0).build_with(|f| {
            let x = f.register(4, 0);
            f.block(0, |b| {
                let k = b.constant(4, 7);
                let v = b.add(x, k);
                sum = Some(b.last_op());
                b.ret(v);
            });
        });
        let op = sum.unwrap();
        let x = func.require_op(op).unwrap().inputs()[0];
        rewrite_as_copy(&mut func, op, x).unwrap();

        let rewritten = func.require_op(op).unwrap();
        assert_eq!(rewritten.opcode(), OpCode::Copy);
        assert_eq!(rewritten.inputs(), &[x]);
        func.check_consistency().unwrap();
    }
}
