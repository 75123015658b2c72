//! Dead-code removal driven by bit-precision liveness.
//!
//! The action runs [`ConsumeAnalysis`] and commits its result:
//!
//! - A written value that no live operation reaches loses its defining
//!   operation. Calls keep their side effects and only lose the output.
//! - A value that is reached but has no consumed bit is known not to matter.
//!   Every read is redirected to a zero constant and the definition goes away
//!   as above.
//! - Loads anchored by the volatile-load guard are pinned with
//!   [`ValueFlags::AUTO_LIVE_HOLD`] so later rounds keep them.
//!
//! Only values in spaces open to dead-code removal are touched; everything
//! else was seeded fully consumed by the analysis anyway.

use crate::{
    analysis::{
        ConsumeAnalysis, ConsumeMasks, Function, OpCode, OpFlags, OpId, ValueFlags, ValueId,
    },
    compiler::{context::PassContext, events::EventKind, pass::Action},
    Result,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verdict {
    /// Nothing live reads the value.
    Unreached,
    /// Reached, but no bit of it is consumed.
    Vacuous,
}

/// Removes operations whose results are never consumed.
pub struct DeadCodeAction;

impl DeadCodeAction {
    fn candidates(func: &Function, masks: &ConsumeMasks) -> Vec<(ValueId, OpId, Verdict)> {
        func.values()
            .filter(|v| func.is_dead_removal_allowed(v.space()))
            .filter_map(|v| {
                let def = v.def()?;
                if !masks.is_reached(v.id()) {
                    Some((v.id(), def, Verdict::Unreached))
                } else if masks.mask(v.id()) == 0 && v.size() <= 8 && !v.has_no_reads() {
                    Some((v.id(), def, Verdict::Vacuous))
                } else {
                    None
                }
            })
            .collect()
    }

    fn anchor_loads(
        func: &mut Function,
        ctx: &PassContext,
        masks: &ConsumeMasks,
        unit: &str,
    ) -> Result<()> {
        for &load in masks.anchored_loads() {
            let Some(value) = func.value(load) else {
                continue;
            };
            if value.flags().contains(ValueFlags::AUTO_LIVE_HOLD) {
                continue;
            }
            func.set_value_flag(load, ValueFlags::AUTO_LIVE_HOLD, true)?;
            ctx.events
                .record(EventKind::LoadAnchored)
                .at(func.entry(), load.index())
                .unit(unit)
                .message(format!("{load} loaded from a constant address"));
        }
        Ok(())
    }

    fn mark_indirect_sources(func: &mut Function, masks: &ConsumeMasks) -> Result<()> {
        for op in func.op_ids() {
            func.set_op_flag(op, OpFlags::INDIRECT_SOURCE, false)?;
        }
        for &op in masks.indirect_sources() {
            if func.op(op).is_some() {
                func.set_op_flag(op, OpFlags::INDIRECT_SOURCE, true)?;
            }
        }
        Ok(())
    }
}

impl Action for DeadCodeAction {
    fn name(&self) -> &'static str {
        "deadcode"
    }

    fn group(&self) -> &'static str {
        "deadcode"
    }

    fn description(&self) -> &'static str {
        "Removes operations whose output bits are never consumed"
    }

    fn apply(&self, func: &mut Function, ctx: &mut PassContext) -> Result<usize> {
        let masks = ConsumeAnalysis::new(func, ctx.config(), ctx.pass_number()).run()?;
        let unit = ctx.current_unit().unwrap_or(self.name()).to_string();
        let entry = func.entry();

        Self::anchor_loads(func, ctx, &masks, &unit)?;
        Self::mark_indirect_sources(func, &masks)?;

        let mut changes = 0;
        for (value, def, verdict) in Self::candidates(func, &masks) {
            // an earlier removal may already have taken the value or its writer
            let Some(current) = func.value(value) else {
                continue;
            };
            let size = current.size();
            let Some(op) = func.op(def) else {
                continue;
            };
            if op.output() != Some(value) {
                continue;
            }
            let keep_op = op.is_call() || op.opcode() == OpCode::CallOther;

            if verdict == Verdict::Vacuous {
                let zero = func.new_constant(size, 0)?;
                let redirected = func.replace_reads(value, zero)?;
                ctx.events
                    .record(EventKind::ValueZeroed)
                    .at(entry, def.index())
                    .unit(unit.as_str())
                    .message(format!("{redirected} reads of {value} replaced by zero"));
            }

            if keep_op {
                func.unset_output(def)?;
                ctx.events
                    .record(EventKind::OutputRemoved)
                    .at(entry, def.index())
                    .unit(unit.as_str())
                    .message(format!("dead output {value} of {def}"));
            } else {
                func.destroy_op(def)?;
                ctx.events
                    .record(EventKind::OpDestroyed)
                    .at(entry, def.index())
                    .unit(unit.as_str())
                    .message(format!("{def} writes dead {value}"));
            }
            changes += 1;
        }
        Ok(changes)
    }
}
