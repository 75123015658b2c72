//! Bit-precision liveness integration tests.
//!
//! These tests exercise the public liveness API end to end:
//! 1. Build a function with `FunctionBuilder`
//! 2. Run `ConsumeAnalysis` (directly or through `DeadCodeAction`)
//! 3. Verify mask values, ordering independence and what dead-code removal keeps

use pcodeflow::{
    analysis::{
        CallSpec, ConsumeAnalysis, ConsumeMasks, Function, FunctionBuilder, OpCode,
        ReturnPrototype, Space, ValueId,
    },
    compiler::{Action, DeadCodeAction, EventKind},
    PassContext, Result, SchedulerConfig, WorklistOrder,
};

fn locked_return() -> ReturnPrototype {
    ReturnPrototype {
        output_locked: true,
        ..ReturnPrototype::default()
    }
}

fn analyse(func: &Function, order: WorklistOrder) -> Result<ConsumeMasks> {
    let config = SchedulerConfig::default().with_worklist_order(order);
    ConsumeAnalysis::new(func, &config, 1).run()
}

/// A function mixing a loop, a store, a call with a specification and
/// narrowing masks.
fn mixed_function() -> Function {
    FunctionBuilder::new("mixed", 0x2000).build_with(|f| {
        let x = f.register(4, 0);
        let y = f.register(4, 8);
        let mut phi = None;
        let mut next = None;
        let mut call = None;
        f.block(0, |b| {
            let p = b.multiequal(&[x], Space::Register, 0x20);
            phi = Some(b.last_op());
            let one = b.constant(4, 1);
            let n = b.add(p, one);
            next = Some(n);
            let mask = b.constant(4, 0xfff);
            let low = b.and(n, mask);
            let eight = b.constant(4, 8);
            let hi = b.right(low, eight);
            let mixed = b.xor(hi, y);
            let slot = b.constant(8, 0x8000);
            b.store(slot, mixed);
            let arg = b.copy(mixed);
            call = Some(b.call(0x500, &[arg]));
            let byte = b.subpiece(low, 0, 1);
            let wide = b.zext(byte, 4);
            b.ret(wide);
        });
        f.add_input(phi.unwrap(), next.unwrap());
        f.call_spec(call.unwrap(), CallSpec::new().with_hints(vec![2]));
    })
}

#[test]
fn test_scenario_add_then_mask() -> Result<()> {
    let (mut x, mut tmp) = (None, None);
    let func = FunctionBuilder::new("scenario_a", 0)
        .with_prototype(locked_return())
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
    let masks = analyse(&func, WorklistOrder::Lifo)?;
    assert_eq!(masks.mask(tmp.unwrap()), 0xff);
    assert_eq!(masks.mask(x.unwrap()), 0xff);
    Ok(())
}

#[test]
fn test_add_covers_lower_bits() -> Result<()> {
    let (mut x, mut tmp) = (None, None);
    let func = FunctionBuilder::new("covering", 0)
        .with_prototype(locked_return())
        .build_with(|f| {
            let input = f.register(4, 0);
            x = Some(input);
            f.block(0, |b| {
                let four = b.constant(4, 4);
                let t = b.add(input, four);
                tmp = Some(t);
                let k = b.constant(4, 0xf0);
                let y = b.and(t, k);
                b.ret(y);
            });
        });
    let masks = analyse(&func, WorklistOrder::Lifo)?;
    assert_eq!(masks.mask(tmp.unwrap()), 0xf0);
    // carries from the low nibble reach bit 4
    assert_eq!(masks.mask(x.unwrap()), 0xff);
    Ok(())
}

#[test]
fn test_scenario_unreachable_copy_is_destroyed() -> Result<()> {
    let mut func = FunctionBuilder::new("scenario_b", 0).build_with(|f| {
        let x = f.register(4, 0);
        f.block(0, |b| {
            b.ret(x);
        });
        f.unreachable_block(1, |b| {
            let _ = b.copy(x);
        });
    });
    let before = func.num_live_ops();
    let mut ctx = PassContext::new(SchedulerConfig::default());
    let changes = DeadCodeAction.apply(&mut func, &mut ctx)?;

    assert_eq!(changes, 1);
    assert_eq!(func.num_live_ops(), before - 1);
    assert_eq!(ctx.events.count_kind(EventKind::OpDestroyed), 1);
    func.check_consistency()
}

#[test]
fn test_and_transfer_law() -> Result<()> {
    for k in [0xffu64, 0xf0f0, 0x8000_0001, 0] {
        let mut a = None;
        let func = FunctionBuilder::new("and_law", 0)
            .with_prototype(locked_return())
            .build_with(|f| {
                let x = f.register(4, 0);
                f.block(0, |b| {
                    let copy = b.copy(x);
                    a = Some(copy);
                    let kv = b.constant(4, k);
                    let out = b.and(copy, kv);
                    b.ret(out);
                });
            });
        let masks = analyse(&func, WorklistOrder::Lifo)?;
        assert_eq!(masks.mask(a.unwrap()), 0xffff_ffff & k, "k = {k:#x}");
    }
    Ok(())
}

#[test]
fn test_confluence_lifo_fifo() -> Result<()> {
    let func = mixed_function();
    let lifo = analyse(&func, WorklistOrder::Lifo)?;
    let fifo = analyse(&func, WorklistOrder::Fifo)?;

    for index in 0..func.value_slots() {
        let id = ValueId::new(u32::try_from(index).unwrap());
        assert_eq!(lifo.mask(id), fifo.mask(id), "mask of {id}");
        assert_eq!(lifo.is_reached(id), fifo.is_reached(id), "reach of {id}");
    }
    Ok(())
}

#[test]
fn test_monotonicity() -> Result<()> {
    let func = mixed_function();
    for order in [WorklistOrder::Lifo, WorklistOrder::Fifo] {
        let config = SchedulerConfig::default().with_worklist_order(order);
        let masks = ConsumeAnalysis::new(&func, &config, 1).with_trace().run()?;
        let mut seen = vec![0u64; func.value_slots()];
        for &(value, mask) in masks.trace().unwrap() {
            let previous = seen[value.index()];
            assert_eq!(previous & !mask, 0, "{value} lost bits");
            seen[value.index()] = mask;
        }
    }
    Ok(())
}

#[test]
fn test_termination_bound() -> Result<()> {
    let func = FunctionBuilder::new("chain", 0).build_with(|f| {
        let x = f.register(8, 0);
        f.block(0, |b| {
            let one = b.constant(8, 1);
            let mut v = x;
            for _ in 0..200 {
                v = b.add(v, one);
            }
            b.ret(v);
        });
    });
    let masks = analyse(&func, WorklistOrder::Fifo)?;
    // every value is enqueued at most once per gained bit plus once when reached
    assert!(masks.pushes() <= 65 * func.value_slots());
    assert!(masks.pushes() >= 200);
    Ok(())
}

#[test]
fn test_safety_fully_consumed_outputs_survive() -> Result<()> {
    let mut func = mixed_function();
    let masks = analyse(&func, WorklistOrder::Lifo)?;

    let protected: Vec<_> = func
        .ops()
        .filter_map(|op| {
            let out = func.value(op.output()?)?;
            (masks.is_reached(out.id()) && masks.mask(out.id()) == out.full_mask())
                .then_some(op.id())
        })
        .collect();
    assert!(!protected.is_empty());

    let mut ctx = PassContext::new(SchedulerConfig::default());
    DeadCodeAction.apply(&mut func, &mut ctx)?;
    for op in protected {
        assert!(func.op(op).is_some(), "{op} was destroyed");
    }
    func.check_consistency()
}

#[test]
fn test_call_hint_narrows_argument() -> Result<()> {
    let func = mixed_function();
    let masks = analyse(&func, WorklistOrder::Lifo)?;
    let call = func
        .ops()
        .find(|op| op.is_call())
        .map(|op| op.inputs()[1])
        .unwrap();
    assert_eq!(masks.mask(call), 0xffff);
    Ok(())
}

#[test]
fn test_user_op_keeps_computed_arguments() -> Result<()> {
    let (mut copy_op, mut user_op, mut arg) = (None, None, None);
    let mut func = FunctionBuilder::new("user_op", 0x3000).build_with(|f| {
        let x = f.register(4, 0);
        f.block(0, |b| {
            let a = b.copy(x);
            copy_op = Some(b.last_op());
            arg = Some(a);
            let index = b.constant(4, 7);
            let _ = b.assign(OpCode::CallOther, &[index, a], 4);
            user_op = Some(b.last_op());
            b.ret_void();
        });
    });

    let masks = analyse(&func, WorklistOrder::Lifo)?;
    assert_eq!(masks.mask(arg.unwrap()), 0xffff_ffff);

    let mut ctx = PassContext::new(SchedulerConfig::default());
    let changes = DeadCodeAction.apply(&mut func, &mut ctx)?;

    // only the unread output goes; the operation and its argument stay
    assert_eq!(changes, 1);
    assert_eq!(ctx.events.count_kind(EventKind::OutputRemoved), 1);
    assert!(!ctx.events.has(EventKind::OpDestroyed));
    assert!(func.op(copy_op.unwrap()).is_some());
    let op = func.require_op(user_op.unwrap())?;
    assert!(op.output().is_none());
    assert_eq!(op.input(1), arg);
    func.check_consistency()
}
