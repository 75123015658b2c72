//! Algebraic rewrites.
//!
//! ## Constant folding
//! - `k1 op k2` → `k`
//!
//! ## Identity elements
//! - `x + 0`, `x | 0`, `x ^ 0`, `x - 0`, `x << 0`, `x >> 0` → `x`
//! - `x & -1` → `x`
//! - `x * 1` → `x`
//!
//! ## Absorbing elements
//! - `x & 0`, `x * 0` → `0`
//! - `x | -1` → `-1`
//! - `x ^ x`, `x - x` → `0`
//!
//! ## Involutions
//! - `~~x`, `--x`, `!!x` → `x`
//!
//! Every rewrite keeps the operation and its output in place and turns it
//! into a `COPY`, so readers of the output are untouched.

use crate::{
    analysis::{Function, OpCode, OpId},
    compiler::{
        context::PassContext,
        pass::Rule,
        passes::{binary_inputs, rewrite_as_constant, rewrite_as_copy},
    },
    utils::calc_mask,
    Result,
};

/// Folds operations whose inputs are all constants.
pub struct FoldConstantsRule;

impl FoldConstantsRule {
    /// Evaluates `opcode` over constant inputs of byte width `size`.
    ///
    /// Returns `None` for opcodes this rule does not fold.
    fn evaluate(opcode: OpCode, size: u32, inputs: &[u64]) -> Option<u64> {
        let mask = calc_mask(size);
        let a = inputs.first().copied()? & mask;
        let b = inputs.get(1).copied();
        let value = match (opcode, b) {
            (OpCode::IntAdd, Some(b)) => a.wrapping_add(b),
            (OpCode::IntSub, Some(b)) => a.wrapping_sub(b),
            (OpCode::IntMult, Some(b)) => a.wrapping_mul(b),
            (OpCode::IntAnd, Some(b)) => a & b,
            (OpCode::IntOr, Some(b)) => a | b,
            (OpCode::IntXor, Some(b)) => a ^ b,
            (OpCode::IntLeft, Some(b)) => {
                if b >= 64 {
                    0
                } else {
                    a << b
                }
            }
            (OpCode::IntRight, Some(b)) => {
                if b >= 64 {
                    0
                } else {
                    a >> b
                }
            }
            (OpCode::IntEqual, Some(b)) => u64::from(a == (b & mask)),
            (OpCode::IntNotEqual, Some(b)) => u64::from(a != (b & mask)),
            (OpCode::IntLess, Some(b)) => u64::from(a < (b & mask)),
            (OpCode::IntLessEqual, Some(b)) => u64::from(a <= (b & mask)),
            (OpCode::IntNegate, None) => !a,
            (OpCode::Int2Comp, None) => a.wrapping_neg(),
            (OpCode::IntZext, None) => a,
            (OpCode::BoolNegate, None) => u64::from(a == 0),
            _ => return None,
        };
        Some(value)
    }
}

impl Rule for FoldConstantsRule {
    fn name(&self) -> &'static str {
        "foldconstants"
    }

    fn group(&self) -> &'static str {
        "base"
    }

    fn description(&self) -> &'static str {
        "Folds operations whose inputs are all constants"
    }

    fn opcodes(&self) -> &'static [OpCode] {
        &[
            OpCode::IntAdd,
            OpCode::IntSub,
            OpCode::IntMult,
            OpCode::IntAnd,
            OpCode::IntOr,
            OpCode::IntXor,
            OpCode::IntLeft,
            OpCode::IntRight,
            OpCode::IntEqual,
            OpCode::IntNotEqual,
            OpCode::IntLess,
            OpCode::IntLessEqual,
            OpCode::IntNegate,
            OpCode::Int2Comp,
            OpCode::IntZext,
            OpCode::BoolNegate,
        ]
    }

    fn apply_op(&self, op: OpId, func: &mut Function, _ctx: &mut PassContext) -> Result<usize> {
        let operation = func.require_op(op)?;
        if operation.output().is_none() || operation.inputs().is_empty() {
            return Ok(0);
        }
        let Some(constants) = operation
            .inputs()
            .iter()
            .map(|&v| func.constant_of(v))
            .collect::<Option<Vec<u64>>>()
        else {
            return Ok(0);
        };
        let size = func.require_value(operation.inputs()[0])?.size();
        let Some(value) = Self::evaluate(operation.opcode(), size, &constants) else {
            return Ok(0);
        };
        rewrite_as_constant(func, op, value)?;
        Ok(1)
    }
}

/// Drops operations with an identity element.
pub struct IdentityRule;

impl Rule for IdentityRule {
    fn name(&self) -> &'static str {
        "identity"
    }

    fn group(&self) -> &'static str {
        "analysis"
    }

    fn description(&self) -> &'static str {
        "Removes additions, shifts and masks that leave their input unchanged"
    }

    fn opcodes(&self) -> &'static [OpCode] {
        &[
            OpCode::IntAdd,
            OpCode::IntSub,
            OpCode::IntOr,
            OpCode::IntXor,
            OpCode::IntAnd,
            OpCode::IntMult,
            OpCode::IntLeft,
            OpCode::IntRight,
            OpCode::IntSRight,
        ]
    }

    fn apply_op(&self, op: OpId, func: &mut Function, _ctx: &mut PassContext) -> Result<usize> {
        let Some((a, b)) = binary_inputs(func, op)? else {
            return Ok(0);
        };
        let opcode = func.require_op(op)?.opcode();
        let full = calc_mask(func.require_value(a)?.size());
        let (ka, kb) = (func.constant_of(a), func.constant_of(b));

        let identity = match opcode {
            OpCode::IntAdd | OpCode::IntOr | OpCode::IntXor => Some(0),
            OpCode::IntAnd => Some(full),
            OpCode::IntMult => Some(1),
            _ => None,
        };
        let keep = match identity {
            // commutative: the identity may sit on either side
            Some(e) if kb == Some(e) => a,
            Some(e) if ka == Some(e) => b,
            Some(_) => return Ok(0),
            None if kb == Some(0) => a,
            None => return Ok(0),
        };
        rewrite_as_copy(func, op, keep)?;
        Ok(1)
    }
}

/// Replaces operations with an absorbing element by a constant.
pub struct AbsorbRule;

impl Rule for AbsorbRule {
    fn name(&self) -> &'static str {
        "absorb"
    }

    fn group(&self) -> &'static str {
        "analysis"
    }

    fn description(&self) -> &'static str {
        "Folds x & 0, x * 0, x | -1 and self-cancelling x ^ x, x - x"
    }

    fn opcodes(&self) -> &'static [OpCode] {
        &[OpCode::IntAnd, OpCode::IntMult, OpCode::IntOr, OpCode::IntXor, OpCode::IntSub]
    }

    fn apply_op(&self, op: OpId, func: &mut Function, _ctx: &mut PassContext) -> Result<usize> {
        let Some((a, b)) = binary_inputs(func, op)? else {
            return Ok(0);
        };
        let opcode = func.require_op(op)?.opcode();
        let full = calc_mask(func.require_value(a)?.size());
        let either = |k: u64| func.constant_of(a) == Some(k) || func.constant_of(b) == Some(k);

        let value = match opcode {
            OpCode::IntAnd | OpCode::IntMult if either(0) => 0,
            OpCode::IntOr if either(full) => full,
            OpCode::IntXor | OpCode::IntSub if a == b => 0,
            _ => return Ok(0),
        };
        rewrite_as_constant(func, op, value)?;
        Ok(1)
    }
}

/// Cancels two consecutive applications of the same involution.
pub struct DoubleNegateRule;

impl Rule for DoubleNegateRule {
    fn name(&self) -> &'static str {
        "doublenegate"
    }

    fn group(&self) -> &'static str {
        "analysis"
    }

    fn description(&self) -> &'static str {
        "Simplifies ~~x, --x and !!x to x"
    }

    fn opcodes(&self) -> &'static [OpCode] {
        &[OpCode::IntNegate, OpCode::Int2Comp, OpCode::BoolNegate]
    }

    fn apply_op(&self, op: OpId, func: &mut Function, _ctx: &mut PassContext) -> Result<usize> {
        let operation = func.require_op(op)?;
        let opcode = operation.opcode();
        let Some(inner) = operation.input(0) else {
            return Ok(0);
        };
        let Some(def) = func.require_value(inner)?.def() else {
            return Ok(0);
        };
        let defining = func.require_op(def)?;
        if defining.opcode() != opcode {
            return Ok(0);
        }
        let Some(source) = defining.input(0) else {
            return Ok(0);
        };
        rewrite_as_copy(func, op, source)?;
        Ok(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{analysis::FunctionBuilder, SchedulerConfig};

    fn ctx() -> PassContext {
        PassContext::new(SchedulerConfig::default())
    }

    #[test]
    fn test_fold_add_of_constants() {
        let mut target = None;
        let mut func = FunctionBuilder::new("f", 0).build_with(|f| {
            f.block(0, |b| {
                let k1 = b.constant(4, 0xffff_fff0);
                let k2 = b.constant(4, 0x20);
                let sum = b.add(k1, k2);
                target = Some(b.last_op());
                b.ret(sum);
            });
        });
        let op = target.unwrap();
        assert_eq!(FoldConstantsRule.apply_op(op, &mut func, &mut ctx()).unwrap(), 1);

        let folded = func.require_op(op).unwrap();
        assert_eq!(folded.opcode(), OpCode::Copy);
        assert_eq!(func.constant_of(folded.inputs()[0]), Some(0x10));
        func.check_consistency().unwrap();
    }

    #[test]
    fn test_fold_ignores_non_constant_inputs() {
        let mut target = None;
        let mut func = FunctionBuilder::new("f", 0).build_with(|f| {
            let x = f.register(4, 0);
            f.block(0, |b| {
                let k = b.constant(4, 1);
                let v = b.add(x, k);
                target = Some(b.last_op());
                b.ret(v);
            });
        });
        assert_eq!(
            FoldConstantsRule
                .apply_op(target.unwrap(), &mut func, &mut ctx())
                .unwrap(),
            0
        );
    }

    #[test]
    fn test_fold_comparison_and_negation() {
        assert_eq!(FoldConstantsRule::evaluate(OpCode::IntLess, 4, &[3, 5]), Some(1));
        assert_eq!(FoldConstantsRule::evaluate(OpCode::IntEqual, 1, &[0x1ff, 0xff]), Some(1));
        assert_eq!(FoldConstantsRule::evaluate(OpCode::IntLeft, 8, &[1, 64]), Some(0));
        assert_eq!(FoldConstantsRule::evaluate(OpCode::BoolNegate, 1, &[0]), Some(1));
        assert_eq!(FoldConstantsRule::evaluate(OpCode::IntSDiv, 4, &[4, 2]), None);
    }

    #[test]
    fn test_identity_either_side() {
        let (mut left, mut right) = (None, None);
        let mut x_in = None;
        let mut func = FunctionBuilder::new("f", 0).build_with(|f| {
            let x = f.register(4, 0);
            x_in = Some(x);
            f.block(0, |b| {
                let zero = b.constant(4, 0);
                let a = b.add(zero, x);
                left = Some(b.last_op());
                let ones = b.constant(4, 0xffff_ffff);
                let m = b.and(a, ones);
                right = Some(b.last_op());
                b.ret(m);
            });
        });
        let mut ctx = ctx();
        assert_eq!(IdentityRule.apply_op(left.unwrap(), &mut func, &mut ctx).unwrap(), 1);
        assert_eq!(IdentityRule.apply_op(right.unwrap(), &mut func, &mut ctx).unwrap(), 1);
        let rewritten = func.require_op(left.unwrap()).unwrap();
        assert_eq!(rewritten.opcode(), OpCode::Copy);
        assert_eq!(rewritten.inputs(), &[x_in.unwrap()]);
        func.check_consistency().unwrap();
    }

    #[test]
    fn test_identity_shift_needs_zero_amount_on_the_right() {
        let mut target = None;
        let mut func = FunctionBuilder::new("f", 0).build_with(|f| {
            let x = f.register(4, 0);
            f.block(0, |b| {
                let zero = b.constant(4, 0);
                let v = b.left(zero, x);
                target = Some(b.last_op());
                b.ret(v);
            });
        });
        assert_eq!(IdentityRule.apply_op(target.unwrap(), &mut func, &mut ctx()).unwrap(), 0);
    }

    #[test]
    fn test_absorb_and_self_cancel() {
        let (mut and_op, mut xor_op) = (None, None);
        let mut func = FunctionBuilder::new("f", 0).build_with(|f| {
            let x = f.register(4, 0);
            f.block(0, |b| {
                let zero = b.constant(4, 0);
                let a = b.and(x, zero);
                and_op = Some(b.last_op());
                let c = b.xor(x, x);
                xor_op = Some(b.last_op());
                let s = b.or(a, c);
                b.ret(s);
            });
        });
        let mut ctx = ctx();
        for op in [and_op.unwrap(), xor_op.unwrap()] {
            assert_eq!(AbsorbRule.apply_op(op, &mut func, &mut ctx).unwrap(), 1);
            let folded = func.require_op(op).unwrap();
            assert_eq!(func.constant_of(folded.inputs()[0]), Some(0));
        }
        func.check_consistency().unwrap();
    }

    #[test]
    fn test_double_negate() {
        let (mut outer, mut x_in) = (None, None);
        let mut func = FunctionBuilder::new("f", 0).build_with(|f| {
            let x = f.register(4, 0);
            x_in = Some(x);
            f.block(0, |b| {
                let n = b.negate(x);
                let nn = b.negate(n);
                outer = Some(b.last_op());
                b.ret(nn);
            });
        });
        assert_eq!(
            DoubleNegateRule
                .apply_op(outer.unwrap(), &mut func, &mut ctx())
                .unwrap(),
            1
        );
        assert_eq!(func.require_op(outer.unwrap()).unwrap().inputs(), &[x_in.unwrap()]);
    }
}
