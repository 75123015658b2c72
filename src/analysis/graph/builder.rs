//! Builder pattern for programmatic graph construction.
//!
//! Writing graphs edge by edge through [`Function`] is verbose. The builder
//! wraps it in a closure-based API where each block is defined in one
//! expression and every value-producing operation returns its output:
//!
//! ```rust
//! use pcodeflow::analysis::FunctionBuilder;
//!
//! let func = FunctionBuilder::new("mask_low", 0x1000).build_with(|f| {
//!     let x = f.register(4, 0);
//!     f.block(0, |b| {
//!         let four = b.constant(4, 4);
//!         let tmp = b.add(x, four);
//!         let ff = b.constant(4, 0xff);
//!         let y = b.and(tmp, ff);
//!         b.ret(y);
//!     });
//! });
//! assert_eq!(func.num_live_ops(), 3);
//! ```
//!
//! Temporaries are allocated in the unique space at increasing offsets. After
//! the closure returns, spaces whose dead-code delay is zero are opened and
//! known-nonzero masks are computed, so the result is ready for analysis.

use crate::{
    analysis::graph::{
        BlockId, CallSpec, Function, OpCode, OpFlags, OpId, ReturnPrototype, Space, ValueId,
    },
    Result,
};

/// Builder for constructing [`Function`]s in tests and hosts.
#[derive(Debug)]
pub struct FunctionBuilder {
    func: Function,
    next_unique: u64,
}

impl FunctionBuilder {
    /// Creates a builder for a function called `name` at `entry`.
    #[must_use]
    pub fn new(name: impl Into<String>, entry: u64) -> Self {
        Self {
            func: Function::new(name, entry),
            next_unique: 0x1_0000,
        }
    }

    /// Delays dead-code eligibility of `space` until pass `delay`.
    #[must_use]
    pub fn with_space_delay(mut self, space: Space, delay: u32) -> Self {
        self.func.set_space_delay(space, delay);
        self
    }

    /// Sets the return prototype.
    #[must_use]
    pub fn with_prototype(mut self, prototype: ReturnPrototype) -> Self {
        self.func.set_prototype(prototype);
        self
    }

    /// Marks the function as undergoing jump-table recovery.
    #[must_use]
    pub fn with_jumptable_recovery(mut self) -> Self {
        self.func.set_jumptable_recovery(true);
        self
    }

    /// Builds the function using a closure that defines all blocks.
    ///
    /// # Panics
    ///
    /// Panics if the closure hands the builder a handle that does not belong to
    /// the function under construction.
    pub fn build_with<F>(mut self, f: F) -> Function
    where
        F: FnOnce(&mut FunctionContext<'_>),
    {
        let mut ctx = FunctionContext { builder: &mut self };
        f(&mut ctx);

        let mut func = self.func;
        func.activate_spaces(0);
        func.recompute_nonzero_masks();
        func
    }

    fn unique(&mut self) -> u64 {
        let offset = self.next_unique;
        self.next_unique += 0x10;
        offset
    }
}

fn checked<T>(result: Result<T>) -> T {
    match result {
        Ok(value) => value,
        Err(e) => panic!("invalid graph construction: {e}"),
    }
}

/// Context passed to the build closure for defining inputs and blocks.
///
/// # Panics
///
/// Methods panic when handed a value or operation of another function, or
/// when the graph rejects the edit. Use [`FunctionContext::function_mut`] for
/// edits that must report errors instead.
pub struct FunctionContext<'a> {
    builder: &'a mut FunctionBuilder,
}

impl FunctionContext<'_> {
    /// Creates a function input.
    #[must_use]
    pub fn input(&mut self, size: u32, space: Space, offset: u64) -> ValueId {
        checked(self.builder.func.new_input(size, space, offset))
    }

    /// Creates a register input.
    #[must_use]
    pub fn register(&mut self, size: u32, offset: u64) -> ValueId {
        self.input(size, Space::Register, offset)
    }

    /// Creates a constant.
    #[must_use]
    pub fn constant(&mut self, size: u32, val: u64) -> ValueId {
        checked(self.builder.func.new_constant(size, val))
    }

    /// Attaches a call specification to a call created earlier.
    pub fn call_spec(&mut self, call: OpId, spec: CallSpec) {
        checked(self.builder.func.set_call_spec(call, spec));
    }

    /// Attaches a switch-variable consume hint to an indirect branch.
    pub fn switch_consume(&mut self, branch: OpId, mask: u64) {
        checked(self.builder.func.set_switch_consume(branch, mask));
    }

    /// Appends `value` as a further input of `op`, typically to close a loop
    /// through a `MultiEqual` defined before its back-edge value.
    pub fn add_input(&mut self, op: OpId, value: ValueId) {
        checked(self.builder.func.add_input(op, value));
    }

    /// Direct access to the function under construction.
    pub fn function_mut(&mut self) -> &mut Function {
        &mut self.builder.func
    }

    /// Defines the operations of block `id`.
    pub fn block<F>(&mut self, id: u32, f: F)
    where
        F: FnOnce(&mut BlockContext<'_>),
    {
        let mut block = BlockContext {
            builder: self.builder,
            block: BlockId::new(id),
            dead: false,
            last: None,
        };
        f(&mut block);
    }

    /// Defines block `id` as unreachable: every operation is flagged dead.
    pub fn unreachable_block<F>(&mut self, id: u32, f: F)
    where
        F: FnOnce(&mut BlockContext<'_>),
    {
        let mut block = BlockContext {
            builder: self.builder,
            block: BlockId::new(id),
            dead: true,
            last: None,
        };
        f(&mut block);
    }
}

/// Builder for the operations of one block.
///
/// Value-producing methods return the new output; the operation itself is
/// available through [`BlockContext::last_op`].
///
/// # Panics
///
/// Methods panic when handed a value of another function.
pub struct BlockContext<'a> {
    builder: &'a mut FunctionBuilder,
    block: BlockId,
    dead: bool,
    last: Option<OpId>,
}

impl BlockContext<'_> {
    /// Returns the most recently created operation of this block.
    ///
    /// # Panics
    ///
    /// Panics if no operation was created yet; see [`BlockContext::try_last_op`].
    #[must_use]
    pub fn last_op(&self) -> OpId {
        match self.last {
            Some(op) => op,
            None => panic!("block {} has no operations yet", self.block.index()),
        }
    }

    /// Returns the most recently created operation of this block, if any.
    #[must_use]
    pub const fn try_last_op(&self) -> Option<OpId> {
        self.last
    }

    /// Creates a constant.
    #[must_use]
    pub fn constant(&mut self, size: u32, val: u64) -> ValueId {
        checked(self.builder.func.new_constant(size, val))
    }

    /// Adds an operation without output.
    pub fn effect(&mut self, opcode: OpCode, inputs: &[ValueId]) -> OpId {
        let op = checked(self.builder.func.new_op(opcode, inputs, self.block));
        if self.dead {
            checked(self.builder.func.set_op_flag(op, OpFlags::DEAD, true));
        }
        self.last = Some(op);
        op
    }

    /// Adds an operation writing a fresh value at `space:offset`.
    pub fn assign_to(
        &mut self,
        opcode: OpCode,
        inputs: &[ValueId],
        size: u32,
        space: Space,
        offset: u64,
    ) -> ValueId {
        let op = self.effect(opcode, inputs);
        checked(self.builder.func.new_output(op, size, space, offset))
    }

    /// Adds an operation writing a fresh temporary.
    pub fn assign(&mut self, opcode: OpCode, inputs: &[ValueId], size: u32) -> ValueId {
        let offset = self.builder.unique();
        self.assign_to(opcode, inputs, size, Space::Unique, offset)
    }

    fn size_of(&self, value: ValueId) -> u32 {
        checked(self.builder.func.require_value(value).map(|v| v.size()))
    }

    fn binary(&mut self, opcode: OpCode, a: ValueId, b: ValueId) -> ValueId {
        let size = self.size_of(a);
        self.assign(opcode, &[a, b], size)
    }

    /// Adds: `out = in`
    pub fn copy(&mut self, value: ValueId) -> ValueId {
        let size = self.size_of(value);
        self.assign(OpCode::Copy, &[value], size)
    }

    /// Adds: `out = a + b`
    pub fn add(&mut self, a: ValueId, b: ValueId) -> ValueId {
        self.binary(OpCode::IntAdd, a, b)
    }

    /// Adds: `out = a - b`
    pub fn sub(&mut self, a: ValueId, b: ValueId) -> ValueId {
        self.binary(OpCode::IntSub, a, b)
    }

    /// Adds: `out = a * b`
    pub fn mult(&mut self, a: ValueId, b: ValueId) -> ValueId {
        self.binary(OpCode::IntMult, a, b)
    }

    /// Adds: `out = a & b`
    pub fn and(&mut self, a: ValueId, b: ValueId) -> ValueId {
        self.binary(OpCode::IntAnd, a, b)
    }

    /// Adds: `out = a | b`
    pub fn or(&mut self, a: ValueId, b: ValueId) -> ValueId {
        self.binary(OpCode::IntOr, a, b)
    }

    /// Adds: `out = a ^ b`
    pub fn xor(&mut self, a: ValueId, b: ValueId) -> ValueId {
        self.binary(OpCode::IntXor, a, b)
    }

    /// Adds: `out = a << b`
    pub fn left(&mut self, a: ValueId, b: ValueId) -> ValueId {
        self.binary(OpCode::IntLeft, a, b)
    }

    /// Adds: `out = a >> b`
    pub fn right(&mut self, a: ValueId, b: ValueId) -> ValueId {
        self.binary(OpCode::IntRight, a, b)
    }

    /// Adds: `out = a s>> b`
    pub fn sright(&mut self, a: ValueId, b: ValueId) -> ValueId {
        self.binary(OpCode::IntSRight, a, b)
    }

    /// Adds: `out = ~a`
    pub fn negate(&mut self, a: ValueId) -> ValueId {
        let size = self.size_of(a);
        self.assign(OpCode::IntNegate, &[a], size)
    }

    /// Adds: `out = !a`
    pub fn bool_negate(&mut self, a: ValueId) -> ValueId {
        self.assign(OpCode::BoolNegate, &[a], 1)
    }

    /// Adds a zero extension of `a` to `size` bytes.
    pub fn zext(&mut self, a: ValueId, size: u32) -> ValueId {
        self.assign(OpCode::IntZext, &[a], size)
    }

    /// Adds a sign extension of `a` to `size` bytes.
    pub fn sext(&mut self, a: ValueId, size: u32) -> ValueId {
        self.assign(OpCode::IntSext, &[a], size)
    }

    /// Adds a truncation of `a` to `size` bytes, dropping the `skip` low bytes.
    pub fn subpiece(&mut self, a: ValueId, skip: u64, size: u32) -> ValueId {
        let offset = self.constant(4, skip);
        self.assign(OpCode::Subpiece, &[a, offset], size)
    }

    /// Adds the concatenation `hi:lo`.
    pub fn piece(&mut self, hi: ValueId, lo: ValueId) -> ValueId {
        let size = self.size_of(hi) + self.size_of(lo);
        self.assign(OpCode::Piece, &[hi, lo], size)
    }

    /// Adds: `out = a == b`
    pub fn equal(&mut self, a: ValueId, b: ValueId) -> ValueId {
        self.assign(OpCode::IntEqual, &[a, b], 1)
    }

    /// Adds: `out = a != b`
    pub fn not_equal(&mut self, a: ValueId, b: ValueId) -> ValueId {
        self.assign(OpCode::IntNotEqual, &[a, b], 1)
    }

    /// Adds: `out = a < b` (unsigned)
    pub fn less(&mut self, a: ValueId, b: ValueId) -> ValueId {
        self.assign(OpCode::IntLess, &[a, b], 1)
    }

    /// Adds a load of `size` bytes from `addr` in the ram space.
    pub fn load(&mut self, addr: ValueId, size: u32) -> ValueId {
        let space = self.constant(8, Space::Ram.index() as u64);
        self.assign(OpCode::Load, &[space, addr], size)
    }

    /// Adds a store of `value` to `addr` in the ram space.
    pub fn store(&mut self, addr: ValueId, value: ValueId) -> OpId {
        let space = self.constant(8, Space::Ram.index() as u64);
        self.effect(OpCode::Store, &[space, addr, value])
    }

    /// Adds a call to the fixed address `target` without an output.
    pub fn call(&mut self, target: u64, args: &[ValueId]) -> OpId {
        let target = self.constant(8, target);
        let mut inputs = vec![target];
        inputs.extend_from_slice(args);
        self.effect(OpCode::Call, &inputs)
    }

    /// Adds a call to `target` whose `size`-byte return lands in register `reg`.
    pub fn call_value(&mut self, target: u64, args: &[ValueId], size: u32, reg: u64) -> ValueId {
        let target = self.constant(8, target);
        let mut inputs = vec![target];
        inputs.extend_from_slice(args);
        self.assign_to(OpCode::Call, &inputs, size, Space::Register, reg)
    }

    /// Adds an indirect call through `target`.
    pub fn call_ind(&mut self, target: ValueId, args: &[ValueId]) -> OpId {
        let mut inputs = vec![target];
        inputs.extend_from_slice(args);
        self.effect(OpCode::CallInd, &inputs)
    }

    /// Adds an unconditional branch to `target`.
    pub fn branch(&mut self, target: u64) -> OpId {
        let target = self.constant(8, target);
        self.effect(OpCode::Branch, &[target])
    }

    /// Adds a conditional branch to `target` taken when `cond` is true.
    pub fn cbranch(&mut self, target: u64, cond: ValueId) -> OpId {
        let target = self.constant(8, target);
        self.effect(OpCode::CBranch, &[target, cond])
    }

    /// Adds an indirect branch through `addr`.
    pub fn branch_ind(&mut self, addr: ValueId) -> OpId {
        self.effect(OpCode::BranchInd, &[addr])
    }

    /// Adds a return of `value`.
    pub fn ret(&mut self, value: ValueId) -> OpId {
        let addr = self.constant(8, 0);
        self.effect(OpCode::Return, &[addr, value])
    }

    /// Adds a return without a value.
    pub fn ret_void(&mut self) -> OpId {
        let addr = self.constant(8, 0);
        self.effect(OpCode::Return, &[addr])
    }

    /// Adds a phi merging `inputs` into storage `space:offset`.
    pub fn multiequal(&mut self, inputs: &[ValueId], space: Space, offset: u64) -> ValueId {
        let size = inputs.first().map_or(4, |&v| self.size_of(v));
        self.assign_to(OpCode::MultiEqual, inputs, size, space, offset)
    }

    /// Adds an indirect effect of `cause` on the storage of `value`.
    pub fn indirect(&mut self, value: ValueId, cause: OpId) -> ValueId {
        let (size, space, offset) = checked(
            self.builder
                .func
                .require_value(value)
                .map(|v| (v.size(), v.space(), v.offset())),
        );
        let iop = checked(
            self.builder
                .func
                .new_value(8, Space::Iop, cause.index() as u64),
        );
        checked(
            self.builder
                .func
                .set_op_flag(cause, OpFlags::INDIRECT_SOURCE, true),
        );
        self.assign_to(OpCode::Indirect, &[value, iop], size, space, offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_scenario_shape() {
        let func = FunctionBuilder::new("f", 0x1000).build_with(|f| {
            let x = f.register(4, 0);
            f.block(0, |b| {
                let four = b.constant(4, 4);
                let tmp = b.add(x, four);
                let ff = b.constant(4, 0xff);
                let y = b.and(tmp, ff);
                b.ret(y);
            });
        });
        assert_eq!(func.num_live_ops(), 3);
        assert_eq!(func.ops_with_opcode(OpCode::IntAdd).count(), 1);
        assert!(func.is_dead_removal_allowed(Space::Unique));
        func.check_consistency().unwrap();
    }

    #[test]
    fn test_try_last_op_before_and_after() {
        let (mut before, mut after) = (Some(OpId::new(0)), None);
        let _ = FunctionBuilder::new("f", 0).build_with(|f| {
            f.block(0, |b| {
                before = b.try_last_op();
                b.ret_void();
                after = b.try_last_op();
            });
        });
        assert!(before.is_none());
        assert!(after.is_some());
    }

    #[test]
    fn test_unreachable_block_marks_dead() {
        let func = FunctionBuilder::new("f", 0).build_with(|f| {
            let x = f.register(4, 0);
            f.block(0, |b| {
                b.ret(x);
            });
            f.unreachable_block(1, |b| {
                b.copy(x);
            });
        });
        let copy = func.ops_with_opcode(OpCode::Copy).next().unwrap();
        assert!(copy.is_dead());
        assert_eq!(copy.block(), BlockId::new(1));
        assert_eq!(func.num_blocks(), 2);
    }

    #[test]
    fn test_space_delay_is_respected() {
        let func = FunctionBuilder::new("f", 0)
            .with_space_delay(Space::Stack, 1)
            .build_with(|_| {});
        assert!(func.is_dead_removal_allowed(Space::Register));
        assert!(!func.is_dead_removal_allowed(Space::Stack));
    }

    #[test]
    fn test_indirect_and_loop_phi() {
        let func = FunctionBuilder::new("f", 0).build_with(|f| {
            let x = f.register(4, 0);
            let mut phi = None;
            let mut next = None;
            f.block(1, |b| {
                let p = b.multiequal(&[x], Space::Register, 0);
                phi = Some(b.last_op());
                let one = b.constant(4, 1);
                next = Some(b.add(p, one));
                let call = b.call(0x2000, &[]);
                let after = b.indirect(p, call);
                b.ret(after);
            });
            if let (Some(phi), Some(next)) = (phi, next) {
                f.add_input(phi, next);
            }
        });
        let phi = func.ops_with_opcode(OpCode::MultiEqual).next().unwrap();
        assert_eq!(phi.num_inputs(), 2);
        let call = func.ops_with_opcode(OpCode::Call).next().unwrap();
        assert!(call.flags().contains(OpFlags::INDIRECT_SOURCE));
        func.check_consistency().unwrap();
    }
}
