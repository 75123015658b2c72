use crate::{
    analysis::Function,
    compiler::{context::PassContext, pass::Action},
    Result,
};

/// Recomputes the known-nonzero mask of every value.
///
/// The liveness analysis narrows return values and call arguments by these
/// masks, so they must be fresh before dead-code removal runs.
pub struct NonzeroMaskAction;

impl Action for NonzeroMaskAction {
    fn name(&self) -> &'static str {
        "nzmask"
    }

    fn group(&self) -> &'static str {
        "analysis"
    }

    fn description(&self) -> &'static str {
        "Recomputes known-nonzero bit masks"
    }

    fn apply(&self, func: &mut Function, _ctx: &mut PassContext) -> Result<usize> {
        Ok(func.recompute_nonzero_masks())
    }
}
