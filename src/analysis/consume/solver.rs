//! Worklist solver for bit-precision liveness.
//!
//! # Algorithm
//!
//! 1. Start from fresh scratch arrays: every mask zero, nothing reached.
//! 2. Seed full consumption on values that must stay live regardless of data
//!    flow: storage not yet open to dead-code removal, arguments of calls
//!    without a specification, branch and store operands, return values
//!    (narrowed by the return prototype) and auto-live values.
//! 3. Seed call arguments from their call specifications.
//! 4. Pop values until the worklist is empty, pushing consumption backwards
//!    through each value's defining operation.
//! 5. Anchor loads from possibly constant addresses and rerun step 4 once.
//!
//! A value is pushed onto the worklist only when its mask gains a bit or it is
//! reached for the first time, so every value is enqueued at most 65 times.

use std::collections::VecDeque;

use crate::{
    analysis::{
        consume::{transfer, ConsumeMasks},
        graph::{Function, OpCode, OpId, Space, ValueId},
    },
    compiler::{SchedulerConfig, WorklistOrder},
    utils::{calc_mask, minimal_mask},
    Error, Result,
};

/// Bit-precision liveness analysis of one function.
///
/// The analysis only reads the function; committing its result (destroying
/// dead operations) is the job of the dead-code action.
///
/// # Examples
///
/// ```rust
/// use pcodeflow::analysis::{ConsumeAnalysis, FunctionBuilder};
/// use pcodeflow::SchedulerConfig;
///
/// let mut x = None;
/// let func = FunctionBuilder::new("f", 0).build_with(|f| {
///     let input = f.register(4, 0);
///     x = Some(input);
///     f.block(0, |b| {
///         let ff = b.constant(4, 0xff);
///         let y = b.and(input, ff);
///         b.ret(y);
///     });
/// });
///
/// let masks = ConsumeAnalysis::new(&func, &SchedulerConfig::default(), 1).run()?;
/// assert_eq!(masks.mask(x.unwrap()), 0xff);
/// # Ok::<(), pcodeflow::Error>(())
/// ```
pub struct ConsumeAnalysis<'a> {
    func: &'a Function,
    order: WorklistOrder,
    volatile_load_guard: bool,
    pass: u32,
    consume: Vec<u64>,
    reached: Vec<bool>,
    listed: Vec<bool>,
    worklist: VecDeque<ValueId>,
    last_outc: Vec<Option<u64>>,
    indirect_source: Vec<bool>,
    anchored: Vec<ValueId>,
    pushes: usize,
    trace: Option<Vec<(ValueId, u64)>>,
    scratch: Vec<(ValueId, u64)>,
}

impl<'a> ConsumeAnalysis<'a> {
    /// Prepares an analysis of `func` during fixpoint round `pass`.
    ///
    /// # Arguments
    ///
    /// * `func` - The function to analyse
    /// * `config` - Supplies the worklist order and the volatile-load policy
    /// * `pass` - The current fixpoint round; the volatile-load guard only runs in rounds 0 and 1
    #[must_use]
    pub fn new(func: &'a Function, config: &SchedulerConfig, pass: u32) -> Self {
        let values = func.value_slots();
        Self {
            func,
            order: config.worklist_order,
            volatile_load_guard: config.volatile_load_guard,
            pass,
            consume: vec![0; values],
            reached: vec![false; values],
            listed: vec![false; values],
            worklist: VecDeque::new(),
            last_outc: vec![None; func.op_slots()],
            indirect_source: vec![false; func.op_slots()],
            anchored: Vec::new(),
            pushes: 0,
            trace: None,
            scratch: Vec::new(),
        }
    }

    /// Records every mask update, exposed through [`ConsumeMasks::trace`].
    #[must_use]
    pub fn with_trace(mut self) -> Self {
        self.trace = Some(Vec::new());
        self
    }

    /// Runs the analysis to completion.
    ///
    /// # Errors
    ///
    /// Returns [`Error::GraphConsistency`] if an operation references an erased
    /// value, or [`Error::NonMonotone`] if the consumption of an operation's
    /// output shrank between two visits.
    pub fn run(mut self) -> Result<ConsumeMasks> {
        self.seed()?;
        self.seed_call_parameters()?;
        self.solve()?;

        let mut rounds = 1;
        if self.anchor_volatile_loads()? {
            self.solve()?;
            rounds = 2;
        }

        let indirect_sources = self
            .indirect_source
            .iter()
            .enumerate()
            .filter(|(_, &set)| set)
            .filter_map(|(index, _)| self.func.op_at(index))
            .collect();

        Ok(ConsumeMasks {
            consume: self.consume,
            reached: self.reached,
            anchored: self.anchored,
            indirect_sources,
            pushes: self.pushes,
            rounds,
            trace: self.trace,
        })
    }

    /// ORs `val` into the consume mask of `id`, queueing it if it changed.
    fn push(&mut self, val: u64, id: ValueId) -> Result<()> {
        let value = self.func.require_value(id)?;
        let index = id.index();
        let old = self.consume[index];
        let new = (val | old) & value.full_mask();
        if new == old && self.reached[index] {
            return Ok(());
        }
        self.reached[index] = true;
        if !self.listed[index] {
            self.listed[index] = true;
            if value.is_written() {
                self.worklist.push_back(id);
                self.pushes += 1;
            }
        }
        self.consume[index] = new;
        if let Some(trace) = &mut self.trace {
            trace.push((id, new));
        }
        Ok(())
    }

    fn push_all_inputs(&mut self, op: OpId, val: u64) -> Result<()> {
        let func = self.func;
        for &input in func.require_op(op)?.inputs() {
            self.push(val, input)?;
        }
        Ok(())
    }

    fn seed(&mut self) -> Result<()> {
        let func = self.func;

        for value in func.values() {
            let space = value.space();
            if matches!(space, Space::Constant | Space::Iop) {
                continue;
            }
            if !func.is_dead_removal_allowed(space) {
                self.push(u64::MAX, value.id())?;
            }
        }

        let return_consume = self.gather_return_consume();

        for op in func.ops() {
            if op.is_dead() {
                continue;
            }
            if op.is_call() || op.opcode() == OpCode::CallOther {
                // user-defined operations have no specification to narrow them
                if op.opcode() == OpCode::CallOther || func.call_spec(op.id()).is_none() {
                    self.push_all_inputs(op.id(), u64::MAX)?;
                }
                let Some(out) = op.output() else { continue };
                if op.holds_output() {
                    self.push(u64::MAX, out)?;
                }
            } else if op.is_assignment() {
                for &input in op.inputs() {
                    if func.require_value(input)?.is_auto_live() {
                        self.push(u64::MAX, input)?;
                    }
                }
            } else {
                match op.opcode() {
                    OpCode::Return => {
                        for (slot, &input) in op.inputs().iter().enumerate() {
                            let val = if slot == 0 { u64::MAX } else { return_consume };
                            self.push(val, input)?;
                        }
                    }
                    OpCode::BranchInd => {
                        let mask = func.switch_consume(op.id()).unwrap_or(u64::MAX);
                        if let Some(input) = op.input(0) {
                            self.push(mask, input)?;
                        }
                    }
                    _ => self.push_all_inputs(op.id(), u64::MAX)?,
                }
                continue;
            }

            if let Some(out) = op.output() {
                if func.require_value(out)?.is_auto_live() {
                    self.push(u64::MAX, out)?;
                }
            }
        }
        Ok(())
    }

    /// Bits of returned values the caller can observe.
    fn gather_return_consume(&self) -> u64 {
        let func = self.func;
        let prototype = func.prototype();
        if prototype.consumes_everything() {
            return u64::MAX;
        }
        let mut consume = func
            .ops_with_opcode(OpCode::Return)
            .filter(|op| !op.is_dead())
            .filter_map(|op| op.input(1))
            .filter_map(|v| func.value(v))
            .fold(0, |acc, v| acc | minimal_mask(v.nz_mask()));
        if prototype.return_bytes_consumed != 0 {
            consume &= calc_mask(prototype.return_bytes_consumed);
        }
        consume
    }

    fn seed_call_parameters(&mut self) -> Result<()> {
        let func = self.func;
        for op in func.ops().filter(|op| op.is_call() && !op.is_dead()) {
            let Some(spec) = func.call_spec(op.id()) else {
                continue;
            };
            let Some(target) = op.input(0) else {
                return Err(graph_error!("{} has no call target", op.id()));
            };
            self.push(u64::MAX, target)?;

            if spec.consumes_everything() {
                for &arg in &op.inputs()[1..] {
                    self.push(u64::MAX, arg)?;
                }
                continue;
            }
            for (arg_index, &arg) in op.inputs()[1..].iter().enumerate() {
                let value = func.require_value(arg)?;
                let mut consume = if value.is_auto_live() {
                    u64::MAX
                } else {
                    minimal_mask(value.nz_mask())
                };
                let hint = spec.hint(arg_index);
                if hint != 0 {
                    consume &= calc_mask(hint);
                }
                self.push(consume, arg)?;
            }
        }
        Ok(())
    }

    fn pop(&mut self) -> Option<ValueId> {
        match self.order {
            WorklistOrder::Lifo => self.worklist.pop_back(),
            WorklistOrder::Fifo => self.worklist.pop_front(),
        }
    }

    fn solve(&mut self) -> Result<()> {
        while let Some(id) = self.pop() {
            self.propagate(id)?;
        }
        Ok(())
    }

    fn propagate(&mut self, id: ValueId) -> Result<()> {
        let func = self.func;
        self.listed[id.index()] = false;
        let outc = self.consume[id.index()];
        let value = func.require_value(id)?;
        let Some(def) = value.def() else {
            return Ok(());
        };
        let op = func.require_op(def)?;

        if let Some(previous) = self.last_outc[def.index()] {
            if previous & !outc != 0 {
                return Err(Error::NonMonotone {
                    op: op.to_string(),
                    value: value.to_string(),
                });
            }
        }
        self.last_outc[def.index()] = Some(outc);

        let mut pending = std::mem::take(&mut self.scratch);
        pending.clear();
        transfer::propagate(func, op, outc, |input, mask| pending.push((input, mask)));
        for &(input, mask) in &pending {
            self.push(mask, input)?;
        }
        self.scratch = pending;

        if op.opcode() == OpCode::Indirect {
            self.note_indirect_source(def)?;
        }
        Ok(())
    }

    /// Records the operation an `Indirect` refers to as a live indirect source.
    ///
    /// An indirect effect caused by a `Copy` into overlapping storage keeps the
    /// copy's output fully consumed.
    fn note_indirect_source(&mut self, indirect: OpId) -> Result<()> {
        let func = self.func;
        let op = func.require_op(indirect)?;
        let Some(iop) = op.input(1).and_then(|v| func.value(v)) else {
            return Ok(());
        };
        if iop.space() != Space::Iop {
            return Ok(());
        }
        let Some(cause) = u32::try_from(iop.offset())
            .ok()
            .map(OpId::new)
            .and_then(|id| func.op(id))
        else {
            return Ok(());
        };
        if cause.is_dead() {
            return Ok(());
        }

        if cause.opcode() == OpCode::Copy {
            let overlap = match (
                cause.output().and_then(|v| func.value(v)),
                op.output().and_then(|v| func.value(v)),
            ) {
                (Some(a), Some(b)) => {
                    a.space() == b.space()
                        && a.offset() < b.offset() + u64::from(b.size())
                        && b.offset() < a.offset() + u64::from(a.size())
                }
                _ => false,
            };
            if overlap {
                if let Some(out) = cause.output() {
                    self.push(u64::MAX, out)?;
                }
                self.indirect_source[cause.id().index()] = true;
            }
        } else {
            self.indirect_source[cause.id().index()] = true;
        }
        Ok(())
    }

    /// Keeps loads whose address may resolve to a constant alive.
    ///
    /// Only runs during the first fixpoint rounds and outside jump-table
    /// recovery. Returns `true` if any load was anchored.
    fn anchor_volatile_loads(&mut self) -> Result<bool> {
        let func = self.func;
        if !self.volatile_load_guard || self.pass > 1 || func.is_jumptable_recovery() {
            return Ok(false);
        }
        let mut anchored = false;
        for op in func.ops_with_opcode(OpCode::Load) {
            if op.is_dead() {
                continue;
            }
            let Some(out) = op.output() else { continue };
            if self.reached[out.index()] {
                continue;
            }
            let Some(addr) = op.input(1) else { continue };
            if is_eventual_constant(func, addr, 0, 0) {
                self.push(u64::MAX, out)?;
                self.anchored.push(out);
                anchored = true;
            }
        }
        Ok(anchored)
    }
}

/// Returns `true` if `id` may resolve to a constant through a short chain of
/// copies, at most one addition, at most one nested load, shifts or
/// multiplications by constants, and extensions.
fn is_eventual_constant(func: &Function, id: ValueId, add_count: u32, load_count: u32) -> bool {
    let mut current = id;
    // copy chains are acyclic in SSA form; the bound only protects malformed graphs
    for _ in 0..=func.value_slots() {
        let Some(value) = func.value(current) else {
            return false;
        };
        if value.is_constant() {
            return true;
        }
        let Some(op) = value.def().and_then(|d| func.op(d)) else {
            return false;
        };
        let input = |slot| op.input(slot);
        let constant_input = |slot| input(slot).and_then(|v| func.constant_of(v)).is_some();

        match op.opcode() {
            OpCode::Copy => match input(0) {
                Some(next) => current = next,
                None => return false,
            },
            OpCode::IntAdd => {
                if add_count > 0 {
                    return false;
                }
                return match (input(0), input(1)) {
                    (Some(a), Some(b)) => {
                        is_eventual_constant(func, a, add_count + 1, load_count)
                            && is_eventual_constant(func, b, add_count + 1, load_count)
                    }
                    _ => false,
                };
            }
            OpCode::Load => {
                if load_count > 0 {
                    return false;
                }
                return input(1)
                    .is_some_and(|addr| is_eventual_constant(func, addr, 0, load_count + 1));
            }
            OpCode::IntLeft | OpCode::IntRight | OpCode::IntSRight | OpCode::IntMult => {
                if !constant_input(1) {
                    return false;
                }
                match input(0) {
                    Some(next) => current = next,
                    None => return false,
                }
            }
            OpCode::IntZext | OpCode::IntSext => match input(0) {
                Some(next) => current = next,
                None => return false,
            },
            _ => return false,
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::graph::{CallSpec, FunctionBuilder, ReturnPrototype, ValueFlags};

    fn analyse(func: &Function) -> ConsumeMasks {
        ConsumeAnalysis::new(func, &SchedulerConfig::default(), 1)
            .run()
            .unwrap()
    }

    #[test]
    fn test_add_then_mask_scenario() {
        let (mut x, mut tmp) = (None, None);
        let func = FunctionBuilder::new("f", 0)
            .with_prototype(ReturnPrototype {
                output_locked: true,
                ..ReturnPrototype::default()
            })
            .build_with(|f| {
                let input = f.register(4, 0);
                x = Some(input);
                f.block(0, |b| {
                    let four = b.constant(4, 4);
                    let t = b.add(input, four);
                    tmp = Some(t);
                    let ff = b.constant(4, 0xff);
                    let y = b.and(t, ff);
                    b.ret(y);
                });
            });
        let masks = analyse(&func);
        assert_eq!(masks.mask(tmp.unwrap()), 0xff);
        assert_eq!(masks.mask(x.unwrap()), 0xff);
    }

    #[test]
    fn test_unread_value_is_not_reached() {
        let mut dead = None;
        let func = FunctionBuilder::new("f", 0).build_with(|f| {
            let x = f.register(4, 0);
            f.block(0, |b| {
                dead = Some(b.copy(x));
                b.ret_void();
            });
        });
        let masks = analyse(&func);
        assert!(!masks.is_reached(dead.unwrap()));
        assert_eq!(masks.mask(dead.unwrap()), 0);
    }

    #[test]
    fn test_user_op_arguments_are_fully_consumed() {
        let (mut arg, mut out) = (None, None);
        let func = FunctionBuilder::new("f", 0).build_with(|f| {
            let x = f.register(4, 0);
            f.block(0, |b| {
                let a = b.copy(x);
                arg = Some(a);
                let index = b.constant(4, 7);
                out = Some(b.assign(OpCode::CallOther, &[index, a], 4));
                b.ret_void();
            });
        });
        let masks = analyse(&func);
        assert_eq!(masks.mask(arg.unwrap()), 0xffff_ffff);
        assert!(!masks.is_reached(out.unwrap()));
    }

    #[test]
    fn test_ineligible_space_is_fully_consumed() {
        let mut kept = None;
        let func = FunctionBuilder::new("f", 0)
            .with_space_delay(Space::Stack, 3)
            .build_with(|f| {
                let x = f.register(4, 0);
                f.block(0, |b| {
                    kept = Some(b.assign_to(OpCode::Copy, &[x], 4, Space::Stack, 0x10));
                    b.ret_void();
                });
            });
        let masks = analyse(&func);
        assert_eq!(masks.mask(kept.unwrap()), 0xffff_ffff);
    }

    #[test]
    fn test_call_parameters_follow_spec() {
        let (mut narrow, mut locked_arg, mut unspecified) = (None, None, None);
        let func = FunctionBuilder::new("f", 0).build_with(|f| {
            let a = f.register(4, 0);
            let b_in = f.register(4, 8);
            let c = f.register(4, 0x10);
            let mut calls = Vec::new();
            f.block(0, |b| {
                narrow = Some(b.copy(a));
                calls.push(b.call(0x100, &[narrow.unwrap()]));
                locked_arg = Some(b.copy(b_in));
                calls.push(b.call(0x200, &[locked_arg.unwrap()]));
                unspecified = Some(b.copy(c));
                b.call(0x300, &[unspecified.unwrap()]);
                b.ret_void();
            });
            f.call_spec(calls[0], CallSpec::new().with_hints(vec![1]));
            f.call_spec(calls[1], CallSpec::locked());
        });
        let masks = analyse(&func);
        assert_eq!(masks.mask(narrow.unwrap()), 0xff);
        assert_eq!(masks.mask(locked_arg.unwrap()), 0xffff_ffff);
        assert_eq!(masks.mask(unspecified.unwrap()), 0xffff_ffff);
    }

    #[test]
    fn test_return_consume_uses_nonzero_bits() {
        let mut y = None;
        let func = FunctionBuilder::new("f", 0).build_with(|f| {
            let x = f.register(4, 0);
            f.block(0, |b| {
                let k = b.constant(4, 0x3ff);
                let v = b.and(x, k);
                y = Some(v);
                b.ret(v);
            });
        });
        // nonzero bits 0x3ff round up to a two-byte mask
        assert_eq!(analyse(&func).mask(y.unwrap()), 0xffff);
    }

    #[test]
    fn test_volatile_load_guard_anchors_constant_address() {
        let mut loaded = None;
        let func = FunctionBuilder::new("f", 0).build_with(|f| {
            f.block(0, |b| {
                let base = b.constant(8, 0x4000);
                let addr = b.copy(base);
                loaded = Some(b.load(addr, 4));
                b.ret_void();
            });
        });
        let masks = analyse(&func);
        assert_eq!(masks.anchored_loads(), &[loaded.unwrap()]);
        assert_eq!(masks.rounds(), 2);
        assert_eq!(masks.mask(loaded.unwrap()), 0xffff_ffff);

        let late = ConsumeAnalysis::new(&func, &SchedulerConfig::default(), 2)
            .run()
            .unwrap();
        assert!(late.anchored_loads().is_empty());
        assert!(!late.is_reached(loaded.unwrap()));
    }

    #[test]
    fn test_eventual_constant_bounds() {
        let (mut one_add, mut two_adds, mut nested, mut double_nested) = (None, None, None, None);
        let func = FunctionBuilder::new("f", 0).build_with(|f| {
            let x = f.register(8, 0);
            f.block(0, |b| {
                let k1 = b.constant(8, 0x10);
                let k2 = b.constant(8, 0x20);
                let sum = b.add(k1, k2);
                one_add = Some(sum);
                let shifted = b.left(sum, k1);
                two_adds = Some(b.add(shifted, k2));
                let l1 = b.load(k1, 8);
                nested = Some(l1);
                double_nested = Some(b.load(l1, 8));
                b.ret(x);
            });
        });
        assert!(is_eventual_constant(&func, one_add.unwrap(), 0, 0));
        assert!(!is_eventual_constant(&func, two_adds.unwrap(), 0, 0));
        assert!(is_eventual_constant(&func, nested.unwrap(), 0, 0));
        assert!(!is_eventual_constant(&func, double_nested.unwrap(), 0, 0));
    }

    #[test]
    fn test_auto_live_output_is_seeded() {
        let mut v = None;
        let mut func = FunctionBuilder::new("f", 0).build_with(|f| {
            let x = f.register(2, 0);
            f.block(0, |b| {
                v = Some(b.copy(x));
                b.ret_void();
            });
        });
        func.set_value_flag(v.unwrap(), ValueFlags::AUTO_LIVE, true)
            .unwrap();
        assert_eq!(analyse(&func).mask(v.unwrap()), 0xffff);
    }

    #[test]
    fn test_trace_is_monotone_per_value() {
        let func = FunctionBuilder::new("loop", 0).build_with(|f| {
            let x = f.register(4, 0);
            let mut phi = None;
            let mut next = None;
            f.block(1, |b| {
                let p = b.multiequal(&[x], Space::Register, 0x20);
                phi = Some(b.last_op());
                let one = b.constant(4, 1);
                let n = b.add(p, one);
                next = Some(n);
                let ff = b.constant(4, 0xff);
                let low = b.and(n, ff);
                b.ret(low);
            });
            f.add_input(phi.unwrap(), next.unwrap());
        });
        let masks = ConsumeAnalysis::new(&func, &SchedulerConfig::default(), 1)
            .with_trace()
            .run()
            .unwrap();
        let mut last = vec![0u64; func.value_slots()];
        for &(value, mask) in masks.trace().unwrap() {
            assert_eq!(last[value.index()] & !mask, 0);
            last[value.index()] = mask;
        }
    }
}
