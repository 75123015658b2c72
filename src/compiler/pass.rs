//! Rule and action traits.
//!
//! These are the two leaf shapes of a catalog. A [`Rule`] is a local rewrite
//! of one operation, dispatched by opcode from a rule pool. An [`Action`]
//! transforms the whole function at once.

use crate::{
    analysis::{Function, OpCode, OpId},
    compiler::context::PassContext,
    Result,
};

/// A single pattern-matched rewrite.
///
/// Rules are immutable and stateless: everything they learn about the
/// function is read from the graph, and their counters live in the
/// [`PassContext`]. They must be thread-safe so one derived pipeline can run
/// on many functions at once.
///
/// # Dispatch
///
/// A rule pool only offers an operation to the rules registered for its
/// opcode, in registration order, and stops at the first one that fires. A
/// rule returning an empty [`Rule::opcodes`] slice is offered every opcode.
pub trait Rule: Send + Sync {
    /// Unique name for logging and pipeline lookups.
    fn name(&self) -> &'static str;

    /// Group tag deciding which pipelines include the rule.
    fn group(&self) -> &'static str;

    /// Opcodes this rule may fire on. Empty means every opcode.
    fn opcodes(&self) -> &'static [OpCode];

    /// Tries to rewrite `op`.
    ///
    /// Returns the number of changes made; `0` means the rule did not fire.
    /// The rule may create operations (visited later by the same scan) and
    /// may destroy `op` itself.
    ///
    /// # Errors
    ///
    /// Returns an error if the graph is inconsistent. Errors abort processing
    /// of the current function.
    fn apply_op(&self, op: OpId, func: &mut Function, ctx: &mut PassContext) -> Result<usize>;

    /// Get a description of what this rule does.
    fn description(&self) -> &'static str {
        "No description available"
    }
}

/// A transformation over the whole function.
pub trait Action: Send + Sync {
    /// Unique name for logging and pipeline lookups.
    fn name(&self) -> &'static str;

    /// Group tag deciding which pipelines include the action.
    fn group(&self) -> &'static str;

    /// Runs the action, returning the number of changes made.
    ///
    /// # Errors
    ///
    /// Returns an error if the action fails to process the function.
    fn apply(&self, func: &mut Function, ctx: &mut PassContext) -> Result<usize>;

    /// Get a description of what this action does.
    fn description(&self) -> &'static str {
        "No description available"
    }
}
