//! Comparison cleanup.
//!
//! Before:
//! ```text
//! c = INT_LESS a, b
//! n = BOOL_NEGATE c
//! ```
//!
//! After:
//! ```text
//! c = INT_LESS a, b        // unread, removed by dead code
//! n = INT_LESSEQUAL b, a
//! ```

use crate::{
    analysis::{Function, OpCode, OpId},
    compiler::{context::PassContext, pass::Rule},
    Result,
};

/// Folds a boolean negation into the comparison it negates.
pub struct NegateCompareRule;

impl Rule for NegateCompareRule {
    fn name(&self) -> &'static str {
        "negatecompare"
    }

    fn group(&self) -> &'static str {
        "cleanup"
    }

    fn description(&self) -> &'static str {
        "Replaces !(a cmp b) by the opposite comparison"
    }

    fn opcodes(&self) -> &'static [OpCode] {
        &[OpCode::BoolNegate]
    }

    fn apply_op(&self, op: OpId, func: &mut Function, _ctx: &mut PassContext) -> Result<usize> {
        let Some(cond) = func.require_op(op)?.input(0) else {
            return Ok(0);
        };
        let Some(def) = func.require_value(cond)?.def() else {
            return Ok(0);
        };
        let compare = func.require_op(def)?;
        let Some((negated, swap)) = compare.opcode().negated_comparison() else {
            return Ok(0);
        };
        let &[a, b] = compare.inputs() else {
            return Ok(0);
        };
        let (first, second) = if swap { (b, a) } else { (a, b) };

        func.set_input(op, 0, first)?;
        func.add_input(op, second)?;
        func.set_opcode(op, negated)?;
        Ok(1)
    }
}
