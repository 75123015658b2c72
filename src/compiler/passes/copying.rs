//! Copy propagation and copy-like collapses.
//!
//! [`PropagateCopyRule`] rewires reads of `out = COPY src` to read `src`
//! directly. Once every read is gone the copy itself is left for dead-code
//! removal. [`CollapseCopyRule`] recognizes operations that are copies in
//! disguise and makes them explicit so propagation can see through them.
//!
//! # Example
//!
//! Before:
//! ```text
//! t1 = COPY x
//! t2 = INT_ADD t1, 4
//! t3 = MULTIEQUAL t2, t2
//! ```
//!
//! After:
//! ```text
//! t1 = COPY x          // unread
//! t2 = INT_ADD x, 4
//! t3 = COPY t2
//! ```

use crate::{
    analysis::{Function, OpCode, OpId, ValueFlags},
    compiler::{context::PassContext, pass::Rule, passes::rewrite_as_copy},
    Result,
};

/// Replaces reads of `COPY` outputs by the copied value.
///
/// Offered every opcode. Marker operations only take non-constant sources,
/// and never through a copy whose output is address-forced.
pub struct PropagateCopyRule;

impl Rule for PropagateCopyRule {
    fn name(&self) -> &'static str {
        "propagatecopy"
    }

    fn group(&self) -> &'static str {
        "base"
    }

    fn description(&self) -> &'static str {
        "Reads through COPY operations"
    }

    fn opcodes(&self) -> &'static [OpCode] {
        &[]
    }

    fn apply_op(&self, op: OpId, func: &mut Function, _ctx: &mut PassContext) -> Result<usize> {
        let operation = func.require_op(op)?;
        if operation.is_dead() {
            return Ok(0);
        }
        let marker = operation.opcode().is_marker();

        let mut found = None;
        for (slot, &input) in operation.inputs().iter().enumerate() {
            let value = func.require_value(input)?;
            let Some(def) = value.def() else {
                continue;
            };
            let copy = func.require_op(def)?;
            if copy.opcode() != OpCode::Copy {
                continue;
            }
            let Some(source) = copy.input(0) else {
                continue;
            };
            if source == input {
                return Err(graph_error!("{} is defined by a copy of itself", input));
            }
            if marker
                && (func.require_value(source)?.is_constant()
                    || value.flags().contains(ValueFlags::ADDR_FORCE))
            {
                continue;
            }
            found = Some((slot, source));
            break;
        }

        let Some((slot, source)) = found else {
            return Ok(0);
        };
        func.set_input(op, slot, source)?;
        Ok(1)
    }
}

/// Makes disguised copies explicit.
///
/// - `SUBPIECE(x, 0)` of full width
/// - `INT_ZEXT x` and `INT_SEXT x` without widening
/// - `MULTIEQUAL` whose inputs are all `x` or its own output
pub struct CollapseCopyRule;

impl Rule for CollapseCopyRule {
    fn name(&self) -> &'static str {
        "collapsecopy"
    }

    fn group(&self) -> &'static str {
        "analysis"
    }

    fn description(&self) -> &'static str {
        "Rewrites no-op truncations, extensions and trivial merges as COPY"
    }

    fn opcodes(&self) -> &'static [OpCode] {
        &[
            OpCode::Subpiece,
            OpCode::IntZext,
            OpCode::IntSext,
            OpCode::MultiEqual,
        ]
    }

    fn apply_op(&self, op: OpId, func: &mut Function, _ctx: &mut PassContext) -> Result<usize> {
        let operation = func.require_op(op)?;
        let Some(output) = operation.output() else {
            return Ok(0);
        };
        let out_size = func.require_value(output)?.size();

        let source = match operation.opcode() {
            OpCode::Subpiece => match operation.inputs() {
                &[whole, skip] if func.constant_of(skip) == Some(0) => Some(whole),
                _ => None,
            },
            OpCode::MultiEqual => {
                let mut distinct = operation.inputs().iter().copied().filter(|&v| v != output);
                match distinct.next() {
                    Some(first) if distinct.all(|v| v == first) => Some(first),
                    _ => None,
                }
            }
            _ => operation.input(0),
        };
        let Some(source) = source else {
            return Ok(0);
        };
        if func.require_value(source)?.size() != out_size {
            return Ok(0);
        }
        rewrite_as_copy(func, op, source)?;
        Ok(1)
    }
}
