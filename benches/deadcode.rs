extern crate pcodeflow;

use criterion::{criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use pcodeflow::{
    analysis::{ConsumeAnalysis, Function, FunctionBuilder, Space},
    compiler::{Action, DeadCodeAction},
    BatchDriver, PassContext, PassRegistry, SchedulerConfig, WorklistOrder,
};
use std::hint::black_box;

/// A straight-line function of `len` masked additions feeding a loop-carried
/// value, with every fourth result left unread.
fn chain(len: usize) -> Function {
    FunctionBuilder::new(format!("chain_{len}"), 0x1000).build_with(|f| {
        let x = f.register(8, 0);
        let mut phi_op = None;
        let mut last = None;
        f.block(0, |b| {
            let phi = b.multiequal(&[x], Space::Register, 0x10);
            phi_op = Some(b.last_op());
            let one = b.constant(8, 1);
            let mask = b.constant(8, 0xffff);
            let mut v = phi;
            for i in 0..len {
                let sum = b.add(v, one);
                if i % 4 == 3 {
                    let _ = b.copy(sum);
                }
                v = b.and(sum, mask);
            }
            last = Some(v);
            b.ret(v);
        });
        if let (Some(phi), Some(last)) = (phi_op, last) {
            f.add_input(phi, last);
        }
    })
}

/// Benchmark the liveness worklist in both pop orders
fn bench_consume_analysis(c: &mut Criterion) {
    let func = chain(2000);
    let mut group = c.benchmark_group("consume_analysis");
    group.throughput(Throughput::Elements(func.num_live_ops() as u64));
    for order in [WorklistOrder::Lifo, WorklistOrder::Fifo] {
        let config = SchedulerConfig::default().with_worklist_order(order);
        group.bench_function(format!("{order:?}"), |b| {
            b.iter(|| {
                let masks = ConsumeAnalysis::new(black_box(&func), &config, 1)
                    .run()
                    .unwrap();
                black_box(masks)
            });
        });
    }
    group.finish();
}

/// Benchmark analysis plus commit on a fresh copy of the function
fn bench_deadcode_action(c: &mut Criterion) {
    let func = chain(2000);
    c.bench_function("deadcode_action", |b| {
        b.iter_batched(
            || func.clone(),
            |mut f| {
                let mut ctx = PassContext::new(SchedulerConfig::permissive());
                let changes = DeadCodeAction.apply(&mut f, &mut ctx).unwrap();
                black_box(changes)
            },
            BatchSize::SmallInput,
        );
    });
}

/// Benchmark deriving every standard pipeline from a fresh registry
fn bench_registry_derivation(c: &mut Criterion) {
    c.bench_function("derive_standard_lists", |b| {
        b.iter(|| {
            let mut registry = PassRegistry::standard(SchedulerConfig::default()).unwrap();
            let names: Vec<String> = registry
                .group_names()
                .iter()
                .map(|s| s.to_string())
                .collect();
            for name in &names {
                black_box(registry.derive(name).unwrap());
            }
        });
    });
}

/// Benchmark the standard pipeline over a batch of functions
fn bench_batch_decompile(c: &mut Criterion) {
    let mut registry = PassRegistry::standard(SchedulerConfig::permissive()).unwrap();
    let pipeline = registry.derive("decompile").unwrap();
    let functions: Vec<Function> = (0..64).map(|_| chain(200)).collect();

    let mut group = c.benchmark_group("batch_decompile");
    group.sample_size(20);
    group.throughput(Throughput::Elements(functions.len() as u64));
    group.bench_function("64_functions", |b| {
        b.iter_batched(
            || functions.clone(),
            |mut batch| {
                let driver = BatchDriver::new(pipeline.clone(), SchedulerConfig::permissive());
                let report = driver.run(&mut batch);
                black_box(report.total_changes())
            },
            BatchSize::LargeInput,
        );
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_consume_analysis,
    bench_deadcode_action,
    bench_registry_derivation,
    bench_batch_decompile
);
criterion_main!(benches);
