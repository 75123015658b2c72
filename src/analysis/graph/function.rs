//! The per-function operation graph.
//!
//! A [`Function`] owns two arenas: one of [`Value`]s and one of
//! [`Operation`]s. Handles are dense indices into these arenas and are never
//! reused, so a destroyed node simply leaves an empty slot behind.
//!
//! # Structure
//!
//! ```text
//! Function
//! ├── values: Vec<Option<Value>>        // varnodes, None once erased
//! ├── ops: Vec<Option<Operation>>       // p-code ops in creation order
//! ├── call_specs: HashMap<OpId, CallSpec>
//! ├── prototype: ReturnPrototype
//! └── eligible: SpaceSet                // spaces open to dead-code removal
//! ```
//!
//! # Edges
//!
//! Every input slot of an operation has a matching entry in the input value's
//! read list, and every output has its defining operation recorded on the
//! value. The mutators keep both directions in sync; [`Function::check_consistency`]
//! verifies them.
//!
//! # Thread Safety
//!
//! `Function` is `Send` and `Sync`. It is mutated by exactly one thread while a
//! pipeline runs on it.

use std::{collections::HashMap, fmt};

use strum::{EnumCount, IntoEnumIterator};

use crate::{
    analysis::graph::{
        nzmask, BlockId, CallSpec, OpCode, OpFlags, OpId, Operation, ReturnPrototype, Space,
        SpaceSet, Value, ValueFlags, ValueId,
    },
    utils::{calc_mask, to_u32},
    Result,
};

/// The operation graph of a single function.
///
/// # Examples
///
/// ```rust
/// use pcodeflow::analysis::{Function, OpCode, Space, BlockId};
///
/// let mut func = Function::new("add_four", 0x1000);
/// let x = func.new_input(4, Space::Register, 0)?;
/// let four = func.new_constant(4, 4)?;
/// let add = func.new_op(OpCode::IntAdd, &[x, four], BlockId::default())?;
/// let tmp = func.new_output(add, 4, Space::Unique, 0x100)?;
/// func.new_op(OpCode::Return, &[tmp], BlockId::default())?;
///
/// assert_eq!(func.num_live_ops(), 2);
/// func.check_consistency()?;
/// # Ok::<(), pcodeflow::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct Function {
    name: String,
    entry: u64,
    values: Vec<Option<Value>>,
    ops: Vec<Option<Operation>>,
    live_ops: usize,
    num_blocks: usize,
    call_specs: HashMap<OpId, CallSpec>,
    prototype: ReturnPrototype,
    eligible: SpaceSet,
    space_delay: [u32; Space::COUNT],
    jumptable_recovery: bool,
    switch_consume: HashMap<OpId, u64>,
}

impl Function {
    /// Creates an empty function.
    ///
    /// No space is eligible for dead-code removal until
    /// [`Function::activate_spaces`] or [`Function::mark_dead_removal_allowed`]
    /// opens it.
    #[must_use]
    pub fn new(name: impl Into<String>, entry: u64) -> Self {
        Self {
            name: name.into(),
            entry,
            values: Vec::new(),
            ops: Vec::new(),
            live_ops: 0,
            num_blocks: 0,
            call_specs: HashMap::new(),
            prototype: ReturnPrototype::default(),
            eligible: SpaceSet::empty(),
            space_delay: [0; Space::COUNT],
            jumptable_recovery: false,
            switch_consume: HashMap::new(),
        }
    }

    /// Returns the function's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the function's entry address.
    #[must_use]
    pub const fn entry(&self) -> u64 {
        self.entry
    }

    // ---------------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------------

    /// Returns the value behind `id`, or `None` if it was erased.
    #[must_use]
    pub fn value(&self, id: ValueId) -> Option<&Value> {
        self.values.get(id.index()).and_then(Option::as_ref)
    }

    /// Returns the operation behind `id`, or `None` if it was destroyed.
    #[must_use]
    pub fn op(&self, id: OpId) -> Option<&Operation> {
        self.ops.get(id.index()).and_then(Option::as_ref)
    }

    /// Returns the value behind `id`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::GraphConsistency`] if the value was erased.
    pub fn require_value(&self, id: ValueId) -> Result<&Value> {
        self.value(id)
            .ok_or_else(|| graph_error!("{} references an erased value", id))
    }

    /// Returns the operation behind `id`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::GraphConsistency`] if the operation was destroyed.
    pub fn require_op(&self, id: OpId) -> Result<&Operation> {
        self.op(id)
            .ok_or_else(|| graph_error!("{} references a destroyed operation", id))
    }

    /// Iterates over live operations in creation order.
    pub fn ops(&self) -> impl Iterator<Item = &Operation> {
        self.ops.iter().flatten()
    }

    /// Returns the handles of all live operations in creation order.
    #[must_use]
    pub fn op_ids(&self) -> Vec<OpId> {
        self.ops().map(Operation::id).collect()
    }

    /// Returns the number of operation slots ever allocated.
    ///
    /// Scans that must also visit operations created while they run iterate
    /// `0..op_slots()` and re-read the bound after every step.
    #[must_use]
    pub fn op_slots(&self) -> usize {
        self.ops.len()
    }

    /// Returns the number of value slots ever allocated.
    #[must_use]
    pub fn value_slots(&self) -> usize {
        self.values.len()
    }

    /// Returns the handle of the operation in arena slot `index`, if it is live.
    #[must_use]
    pub fn op_at(&self, index: usize) -> Option<OpId> {
        self.ops.get(index).and_then(Option::as_ref).map(Operation::id)
    }

    /// Iterates over live values.
    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.values.iter().flatten()
    }

    /// Iterates over live values stored in `space`.
    pub fn values_in_space(&self, space: Space) -> impl Iterator<Item = &Value> {
        self.values().filter(move |v| v.space() == space)
    }

    /// Iterates over live values stored at exactly `space:offset`.
    pub fn values_at(&self, space: Space, offset: u64) -> impl Iterator<Item = &Value> {
        self.values()
            .filter(move |v| v.space() == space && v.offset() == offset)
    }

    /// Iterates over live operations with the given opcode.
    pub fn ops_with_opcode(&self, opcode: OpCode) -> impl Iterator<Item = &Operation> {
        self.ops().filter(move |op| op.opcode() == opcode)
    }

    /// Returns the call specification attached to a call operation.
    #[must_use]
    pub fn call_spec(&self, op: OpId) -> Option<&CallSpec> {
        self.call_specs.get(&op)
    }

    /// Returns the function's return prototype.
    #[must_use]
    pub const fn prototype(&self) -> &ReturnPrototype {
        &self.prototype
    }

    /// Returns the number of live operations.
    #[must_use]
    pub const fn num_live_ops(&self) -> usize {
        self.live_ops
    }

    /// Returns the number of blocks referenced by operations.
    #[must_use]
    pub const fn num_blocks(&self) -> usize {
        self.num_blocks
    }

    /// Returns `true` once dead-code removal is allowed for values in `space`.
    #[must_use]
    pub const fn is_dead_removal_allowed(&self, space: Space) -> bool {
        self.eligible.has(space)
    }

    /// Returns the set of spaces open to dead-code removal.
    #[must_use]
    pub const fn eligible_spaces(&self) -> SpaceSet {
        self.eligible
    }

    /// Returns the pass number from which `space` becomes eligible.
    #[must_use]
    pub const fn space_delay(&self, space: Space) -> u32 {
        self.space_delay[space.index()]
    }

    /// Returns `true` while jump-table recovery is running on this function.
    #[must_use]
    pub const fn is_jumptable_recovery(&self) -> bool {
        self.jumptable_recovery
    }

    /// Returns the consume hint attached to an indirect branch, if any.
    #[must_use]
    pub fn switch_consume(&self, op: OpId) -> Option<u64> {
        self.switch_consume.get(&op).copied()
    }

    /// Returns the input slot of `op` holding `value`, if any.
    #[must_use]
    pub fn slot_of(&self, op: OpId, value: ValueId) -> Option<usize> {
        self.op(op)?.inputs().iter().position(|&v| v == value)
    }

    /// Returns the constant held by `id`, if it is a live constant.
    #[must_use]
    pub fn constant_of(&self, id: ValueId) -> Option<u64> {
        self.value(id).and_then(Value::constant)
    }

    // ---------------------------------------------------------------------
    // Node creation
    // ---------------------------------------------------------------------

    fn push_value(&mut self, size: u32, space: Space, offset: u64) -> Result<ValueId> {
        let id = ValueId::new(to_u32(self.values.len())?);
        self.values.push(Some(Value::new(id, size, space, offset)));
        Ok(id)
    }

    /// Creates a free value.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::GraphConsistency`] if the value arena is exhausted.
    pub fn new_value(&mut self, size: u32, space: Space, offset: u64) -> Result<ValueId> {
        self.push_value(size, space, offset)
    }

    /// Creates a function input.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::GraphConsistency`] if the value arena is exhausted.
    pub fn new_input(&mut self, size: u32, space: Space, offset: u64) -> Result<ValueId> {
        let id = self.push_value(size, space, offset)?;
        self.value_mut(id)?.flags |= ValueFlags::INPUT;
        Ok(id)
    }

    /// Creates a constant of `size` bytes. `val` is truncated to the size.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::GraphConsistency`] if the value arena is exhausted.
    pub fn new_constant(&mut self, size: u32, val: u64) -> Result<ValueId> {
        self.push_value(size, Space::Constant, val & calc_mask(size))
    }

    /// Creates an operation without an output.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::GraphConsistency`] if an input was erased, or if a
    /// call is created without its target input.
    pub fn new_op(&mut self, opcode: OpCode, inputs: &[ValueId], block: BlockId) -> Result<OpId> {
        if opcode.is_call() && inputs.is_empty() {
            return Err(graph_error!("{} created without a call target", opcode));
        }
        for &input in inputs {
            self.require_value(input)?;
        }

        let id = OpId::new(to_u32(self.ops.len())?);
        for &input in inputs {
            self.value_mut(input)?.reads.push(id);
        }
        self.ops.push(Some(Operation {
            id,
            opcode,
            inputs: inputs.to_vec(),
            output: None,
            block,
            flags: OpFlags::empty(),
        }));
        self.live_ops += 1;
        self.num_blocks = self.num_blocks.max(block.index() + 1);
        Ok(id)
    }

    /// Makes `value` the output of `op`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::GraphConsistency`] if either node is gone, if
    /// `op` already has an output, or if `value` is not free (values are
    /// written at most once).
    pub fn set_output(&mut self, op: OpId, value: ValueId) -> Result<()> {
        if let Some(existing) = self.require_op(op)?.output {
            return Err(graph_error!("{} already writes {}", op, existing));
        }
        let target = self.require_value(value)?;
        if !target.is_free() {
            return Err(graph_error!("{} cannot be written by {}", target, op));
        }
        self.value_mut(value)?.def = Some(op);
        self.op_mut(op)?.output = Some(value);
        Ok(())
    }

    /// Creates a value and makes it the output of `op`.
    ///
    /// # Errors
    ///
    /// See [`Function::set_output`].
    pub fn new_output(&mut self, op: OpId, size: u32, space: Space, offset: u64) -> Result<ValueId> {
        self.require_op(op)?;
        let value = self.push_value(size, space, offset)?;
        self.set_output(op, value)?;
        Ok(value)
    }

    // ---------------------------------------------------------------------
    // Edge mutation
    // ---------------------------------------------------------------------

    /// Destroys an operation and severs all of its edges.
    ///
    /// The output, if any, becomes free and is erased once nothing reads it.
    /// Inputs left unread and not otherwise anchored are erased too.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::GraphConsistency`] if the operation is already gone.
    pub fn destroy_op(&mut self, op: OpId) -> Result<()> {
        let removed = self
            .ops
            .get_mut(op.index())
            .and_then(Option::take)
            .ok_or_else(|| graph_error!("{} destroyed twice", op))?;
        self.live_ops -= 1;
        self.call_specs.remove(&op);
        self.switch_consume.remove(&op);

        for input in removed.inputs {
            if let Some(value) = self.values.get_mut(input.index()).and_then(Option::as_mut) {
                if let Some(pos) = value.reads.iter().position(|&r| r == op) {
                    value.reads.swap_remove(pos);
                }
            }
            self.erase_if_orphaned(input);
        }
        if let Some(output) = removed.output {
            if let Some(value) = self.values.get_mut(output.index()).and_then(Option::as_mut) {
                value.def = None;
            }
            self.erase_if_orphaned(output);
        }
        Ok(())
    }

    /// Detaches the output of `op`, leaving the operation itself in place.
    ///
    /// Used for calls whose return value is dead but whose side effects are not.
    /// Returns the detached value, which is erased if nothing reads it.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::GraphConsistency`] if the operation is gone.
    pub fn unset_output(&mut self, op: OpId) -> Result<Option<ValueId>> {
        let Some(output) = self.op_mut(op)?.output.take() else {
            return Ok(None);
        };
        self.value_mut(output)?.def = None;
        self.erase_if_orphaned(output);
        Ok(Some(output))
    }

    /// Replaces the input in `slot` of `op` with `value`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::GraphConsistency`] if a node is gone or the slot
    /// does not exist.
    pub fn set_input(&mut self, op: OpId, slot: usize, value: ValueId) -> Result<()> {
        self.require_value(value)?;
        let old = {
            let operation = self.op_mut(op)?;
            let Some(entry) = operation.inputs.get_mut(slot) else {
                return Err(graph_error!("{} has no input slot {}", op, slot));
            };
            std::mem::replace(entry, value)
        };
        if old == value {
            return Ok(());
        }
        self.value_mut(value)?.reads.push(op);
        self.unlink_read(old, op);
        Ok(())
    }

    /// Appends `value` as a new last input of `op`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::GraphConsistency`] if a node is gone.
    pub fn add_input(&mut self, op: OpId, value: ValueId) -> Result<()> {
        self.require_value(value)?;
        self.op_mut(op)?.inputs.push(value);
        self.value_mut(value)?.reads.push(op);
        Ok(())
    }

    /// Removes the input in `slot` of `op`, shifting later inputs down.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::GraphConsistency`] if the slot does not exist, or if
    /// removing it would leave a call without its target.
    pub fn remove_input(&mut self, op: OpId, slot: usize) -> Result<()> {
        let operation = self.op_mut(op)?;
        if slot >= operation.inputs.len() {
            return Err(graph_error!("{} has no input slot {}", op, slot));
        }
        if operation.opcode.is_call() && slot == 0 {
            return Err(graph_error!("{} would lose its call target", op));
        }
        let old = operation.inputs.remove(slot);
        self.unlink_read(old, op);
        Ok(())
    }

    /// Changes the opcode of `op`, keeping its edges.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::GraphConsistency`] if the operation is gone.
    pub fn set_opcode(&mut self, op: OpId, opcode: OpCode) -> Result<()> {
        let operation = self.op_mut(op)?;
        if opcode.is_call() && operation.inputs.is_empty() {
            return Err(graph_error!("{} cannot become a call without a target", op));
        }
        operation.opcode = opcode;
        Ok(())
    }

    /// Redirects every read of `old` to `new`. Returns the number of slots changed.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::GraphConsistency`] if either value is gone.
    pub fn replace_reads(&mut self, old: ValueId, new: ValueId) -> Result<usize> {
        if old == new {
            return Ok(0);
        }
        self.require_value(new)?;
        let mut readers = self.require_value(old)?.reads.clone();
        readers.sort_unstable();
        readers.dedup();

        let mut slots = Vec::new();
        for reader in readers {
            let operation = self.require_op(reader)?;
            for (slot, &input) in operation.inputs.iter().enumerate() {
                if input == old {
                    slots.push((reader, slot));
                }
            }
        }
        for &(reader, slot) in &slots {
            self.set_input(reader, slot, new)?;
        }
        Ok(slots.len())
    }

    // ---------------------------------------------------------------------
    // Attributes
    // ---------------------------------------------------------------------

    /// Sets or clears `flag` on a value.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::GraphConsistency`] if the value is gone.
    pub fn set_value_flag(&mut self, value: ValueId, flag: ValueFlags, on: bool) -> Result<()> {
        self.value_mut(value)?.flags.set(flag, on);
        Ok(())
    }

    /// Sets or clears `flag` on an operation.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::GraphConsistency`] if the operation is gone.
    pub fn set_op_flag(&mut self, op: OpId, flag: OpFlags, on: bool) -> Result<()> {
        self.op_mut(op)?.flags.set(flag, on);
        Ok(())
    }

    /// Opens `space` for dead-code removal.
    pub fn mark_dead_removal_allowed(&mut self, space: Space) {
        self.eligible |= space.flag();
    }

    /// Sets the pass number from which `space` may become eligible.
    pub fn set_space_delay(&mut self, space: Space, delay: u32) {
        self.space_delay[space.index()] = delay;
    }

    /// Opens every space whose delay is at most `pass`. Returns the newly opened spaces.
    pub fn activate_spaces(&mut self, pass: u32) -> SpaceSet {
        let mut opened = SpaceSet::empty();
        for space in Space::iter() {
            if self.space_delay[space.index()] <= pass && !self.eligible.has(space) {
                opened |= space.flag();
            }
        }
        self.eligible |= opened;
        opened
    }

    /// Attaches a call specification to a call operation.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::GraphConsistency`] if `op` is not a live call.
    pub fn set_call_spec(&mut self, op: OpId, spec: CallSpec) -> Result<()> {
        if !self.require_op(op)?.is_call() {
            return Err(graph_error!("{} is not a call", op));
        }
        self.call_specs.insert(op, spec);
        Ok(())
    }

    /// Attaches a consume hint for the switch variable of an indirect branch.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::GraphConsistency`] if `op` is not a live `BranchInd`.
    pub fn set_switch_consume(&mut self, op: OpId, mask: u64) -> Result<()> {
        if self.require_op(op)?.opcode() != OpCode::BranchInd {
            return Err(graph_error!("{} is not an indirect branch", op));
        }
        self.switch_consume.insert(op, mask);
        Ok(())
    }

    /// Replaces the function's return prototype.
    pub fn set_prototype(&mut self, prototype: ReturnPrototype) {
        self.prototype = prototype;
    }

    /// Switches jump-table recovery mode on or off.
    pub fn set_jumptable_recovery(&mut self, on: bool) {
        self.jumptable_recovery = on;
    }

    /// Recomputes the known-nonzero mask of every value.
    ///
    /// Returns the number of values whose mask changed.
    pub fn recompute_nonzero_masks(&mut self) -> usize {
        let masks = nzmask::compute(self);
        let mut changed = 0;
        for (slot, mask) in self.values.iter_mut().zip(masks) {
            if let Some(value) = slot {
                if value.nz_mask != mask {
                    value.nz_mask = mask;
                    changed += 1;
                }
            }
        }
        changed
    }

    /// Validates the structural invariants of the graph.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::GraphConsistency`] describing the first violation:
    /// an edge into an erased or destroyed node, a read list out of sync with
    /// the operation inputs, a value with two writers, or a call without a target.
    pub fn check_consistency(&self) -> Result<()> {
        for op in self.ops() {
            if op.is_call() && op.inputs.is_empty() {
                return Err(graph_error!("{} has no call target", op.id));
            }
            for &input in &op.inputs {
                let value = self.value(input).ok_or_else(|| {
                    graph_error!("{} reads erased value {}", op.id, input)
                })?;
                let slots = op.inputs.iter().filter(|&&v| v == input).count();
                let reads = value.reads.iter().filter(|&&r| r == op.id).count();
                if slots != reads {
                    return Err(graph_error!(
                        "{} reads {} {} times but the value records {}",
                        op.id,
                        input,
                        slots,
                        reads
                    ));
                }
            }
            if let Some(output) = op.output {
                let value = self.value(output).ok_or_else(|| {
                    graph_error!("{} writes erased value {}", op.id, output)
                })?;
                if value.def != Some(op.id) {
                    return Err(graph_error!("{} is written by more than one op", output));
                }
            }
        }

        for value in self.values() {
            if let Some(def) = value.def {
                if value.is_input() || value.is_constant() {
                    return Err(graph_error!("{} is written but not assignable", value));
                }
                let writer = self
                    .op(def)
                    .ok_or_else(|| graph_error!("{} is defined by destroyed {}", value.id, def))?;
                if writer.output != Some(value.id) {
                    return Err(graph_error!("{} is defined by {} which writes elsewhere", value.id, def));
                }
            }
            for &reader in &value.reads {
                let op = self.op(reader).ok_or_else(|| {
                    graph_error!("{} is read by destroyed {}", value.id, reader)
                })?;
                if !op.inputs.contains(&value.id) {
                    return Err(graph_error!("{} lists {} as reader but is not its input", value.id, reader));
                }
            }
        }
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Internals
    // ---------------------------------------------------------------------

    fn value_mut(&mut self, id: ValueId) -> Result<&mut Value> {
        self.values
            .get_mut(id.index())
            .and_then(Option::as_mut)
            .ok_or_else(|| graph_error!("{} references an erased value", id))
    }

    fn op_mut(&mut self, id: OpId) -> Result<&mut Operation> {
        self.ops
            .get_mut(id.index())
            .and_then(Option::as_mut)
            .ok_or_else(|| graph_error!("{} references a destroyed operation", id))
    }

    fn unlink_read(&mut self, value: ValueId, op: OpId) {
        if let Some(v) = self.values.get_mut(value.index()).and_then(Option::as_mut) {
            if let Some(pos) = v.reads.iter().position(|&r| r == op) {
                v.reads.swap_remove(pos);
            }
        }
        self.erase_if_orphaned(value);
    }

    /// Erases a value that nothing writes, reads or anchors.
    fn erase_if_orphaned(&mut self, id: ValueId) {
        let Some(slot) = self.values.get_mut(id.index()) else {
            return;
        };
        let orphaned = slot.as_ref().is_some_and(|v| {
            v.def.is_none() && v.reads.is_empty() && !v.is_input() && !v.is_auto_live()
        });
        if orphaned {
            *slot = None;
        }
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "function {} @ {:#x}", self.name, self.entry)?;
        let mut block = None;
        for op in self.ops() {
            if block != Some(op.block) {
                writeln!(f, "  block {}:", op.block.index())?;
                block = Some(op.block);
            }
            writeln!(f, "    {op}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small() -> (Function, ValueId, ValueId, OpId) {
        let mut func = Function::new("small", 0x400);
        let x = func.new_input(4, Space::Register, 0).unwrap();
        let c = func.new_constant(4, 4).unwrap();
        let add = func.new_op(OpCode::IntAdd, &[x, c], BlockId::default()).unwrap();
        (func, x, c, add)
    }

    #[test]
    fn test_new_op_records_reads() {
        let (func, x, c, add) = small();
        assert_eq!(func.require_value(x).unwrap().reads(), &[add]);
        assert_eq!(func.require_value(c).unwrap().reads(), &[add]);
        assert_eq!(func.slot_of(add, c), Some(1));
        assert_eq!(func.num_live_ops(), 1);
        assert_eq!(func.num_blocks(), 1);
        func.check_consistency().unwrap();
    }

    #[test]
    fn test_write_once() {
        let (mut func, x, _, add) = small();
        let out = func.new_output(add, 4, Space::Unique, 0).unwrap();
        assert_eq!(func.require_value(out).unwrap().def(), Some(add));
        let other = func.new_value(4, Space::Unique, 8).unwrap();
        assert!(func.set_output(add, other).is_err());

        let copy = func.new_op(OpCode::Copy, &[x], BlockId::default()).unwrap();
        assert!(func.set_output(copy, out).is_err());
        assert!(func.set_output(copy, x).is_err());
    }

    #[test]
    fn test_destroy_op_frees_output_and_constants() {
        let (mut func, x, c, add) = small();
        let out = func.new_output(add, 4, Space::Unique, 0).unwrap();
        let ret = func.new_op(OpCode::Return, &[out], BlockId::default()).unwrap();

        func.destroy_op(add).unwrap();
        assert!(func.op(add).is_none());
        // output is still read by the return, so it stays as a free value
        assert!(func.require_value(out).unwrap().is_free());
        // the constant lost its only reader
        assert!(func.value(c).is_none());
        // inputs are never erased
        assert!(func.value(x).is_some());
        func.check_consistency().unwrap();

        func.destroy_op(ret).unwrap();
        assert!(func.value(out).is_none());
        assert!(func.destroy_op(ret).is_err());
        assert_eq!(func.num_live_ops(), 0);
    }

    #[test]
    fn test_set_input_and_replace_reads() {
        let (mut func, x, c, add) = small();
        let zero = func.new_constant(4, 0).unwrap();
        func.set_input(add, 1, zero).unwrap();
        assert!(func.value(c).is_none());
        assert_eq!(func.constant_of(zero), Some(0));

        let y = func.new_input(4, Space::Register, 8).unwrap();
        let both = func.new_op(OpCode::IntXor, &[x, x], BlockId::default()).unwrap();
        assert_eq!(func.replace_reads(x, y).unwrap(), 3);
        assert_eq!(func.require_op(both).unwrap().inputs(), &[y, y]);
        assert!(func.require_value(x).unwrap().has_no_reads());
        assert!(func.set_input(both, 5, x).is_err());
        func.check_consistency().unwrap();
    }

    #[test]
    fn test_unset_output_keeps_call() {
        let mut func = Function::new("caller", 0);
        let target = func.new_constant(8, 0x1000).unwrap();
        let call = func.new_op(OpCode::Call, &[target], BlockId::default()).unwrap();
        let ret = func.new_output(call, 4, Space::Register, 0).unwrap();

        assert_eq!(func.unset_output(call).unwrap(), Some(ret));
        assert!(func.value(ret).is_none());
        assert!(func.op(call).is_some());
        assert_eq!(func.unset_output(call).unwrap(), None);
    }

    #[test]
    fn test_call_requires_target() {
        let mut func = Function::new("f", 0);
        assert!(func.new_op(OpCode::Call, &[], BlockId::default()).is_err());
        let target = func.new_constant(8, 0x1000).unwrap();
        let call = func.new_op(OpCode::CallInd, &[target], BlockId::default()).unwrap();
        assert!(func.remove_input(call, 0).is_err());
        assert!(func.set_call_spec(call, CallSpec::locked()).is_ok());
        let ret = func.new_op(OpCode::Return, &[], BlockId::default()).unwrap();
        assert!(func.set_call_spec(ret, CallSpec::locked()).is_err());
    }

    #[test]
    fn test_activate_spaces_respects_delay() {
        let mut func = Function::new("f", 0);
        func.set_space_delay(Space::Stack, 2);
        let opened = func.activate_spaces(1);
        assert!(opened.has(Space::Register));
        assert!(!opened.has(Space::Stack));
        assert!(!func.is_dead_removal_allowed(Space::Stack));

        let opened = func.activate_spaces(2);
        assert_eq!(opened, SpaceSet::STACK);
        assert!(func.is_dead_removal_allowed(Space::Stack));
    }

    #[test]
    fn test_consistency_detects_stale_read() {
        let (mut func, x, _, add) = small();
        func.value_mut(x).unwrap().reads.clear();
        let err = func.check_consistency().unwrap_err();
        assert!(err.to_string().contains(&add.to_string()));
    }
}
