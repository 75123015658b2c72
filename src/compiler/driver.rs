//! Parallel batch driver.
//!
//! Functions are independent, so a batch is processed with rayon: every
//! function gets its own [`PassContext`], and the only state threads share is
//! the read-only pipeline, the thread-safe report collections and the
//! append-only event log.
//!
//! A failing function is recorded in [`BatchReport::failures`] and leaves
//! every other function of the batch unaffected.

use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use dashmap::{DashMap, DashSet};
use rayon::prelude::*;

use crate::{
    analysis::Function,
    compiler::{
        config::SchedulerConfig,
        context::{CancelFlag, PassContext},
        events::{DerivedStats, EventLog},
        pipeline::Pipeline,
    },
    Error,
};

/// Runs one derived pipeline over many functions.
///
/// # Examples
///
/// ```rust
/// use pcodeflow::{analysis::FunctionBuilder, BatchDriver, PassRegistry, SchedulerConfig};
///
/// let mut registry = PassRegistry::standard(SchedulerConfig::default())?;
/// let pipeline = registry.derive("decompile")?;
///
/// let mut functions: Vec<_> = (0..4)
///     .map(|i| {
///         FunctionBuilder::new(format!("f{i}"), i * 0x100).build_with(|f| {
///             let x = f.register(4, 0);
///             f.block(0, |b| {
///                 let t = b.copy(x);
///                 b.ret(t);
///             });
///         })
///     })
///     .collect();
///
/// let report = BatchDriver::new(pipeline, SchedulerConfig::default()).run(&mut functions);
/// assert!(report.is_success());
/// # Ok::<(), pcodeflow::Error>(())
/// ```
pub struct BatchDriver {
    pipeline: Arc<Pipeline>,
    config: SchedulerConfig,
    cancel: Option<CancelFlag>,
}

impl BatchDriver {
    /// Creates a driver running `pipeline` with `config` for every function.
    #[must_use]
    pub fn new(pipeline: Arc<Pipeline>, config: SchedulerConfig) -> Self {
        Self {
            pipeline,
            config,
            cancel: None,
        }
    }

    /// Shares `flag` with every function of the batch.
    #[must_use]
    pub fn with_cancel_flag(mut self, flag: CancelFlag) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Returns the pipeline this driver runs.
    #[must_use]
    pub fn pipeline(&self) -> &Arc<Pipeline> {
        &self.pipeline
    }

    /// Processes every function of `functions` in parallel.
    pub fn run(&self, functions: &mut [Function]) -> BatchReport {
        let started = Instant::now();
        let report = BatchReport::default();
        let changes = AtomicUsize::new(0);

        functions.par_iter_mut().for_each(|func| {
            let mut ctx = PassContext::new(self.config.clone());
            if let Some(flag) = &self.cancel {
                ctx = ctx.with_cancel_flag(flag.clone());
            }

            match self.pipeline.apply(func, &mut ctx) {
                Ok(n) => {
                    changes.fetch_add(n, Ordering::Relaxed);
                    report.succeeded.insert(func.entry());
                }
                Err(e) => {
                    report.failures.insert(func.entry(), e);
                }
            }
            report.events.merge(&ctx.events);
        });

        BatchReport {
            changes: changes.into_inner(),
            elapsed: started.elapsed(),
            ..report
        }
    }
}

/// Outcome of a batch run.
#[derive(Debug, Default)]
pub struct BatchReport {
    /// Failed functions by entry address, with the diagnostic naming the unit.
    pub failures: DashMap<u64, Error>,
    /// Entry addresses of the functions that completed.
    pub succeeded: DashSet<u64>,
    /// Events of every function, in completion order.
    pub events: EventLog,
    changes: usize,
    elapsed: Duration,
}

impl BatchReport {
    /// Returns `true` if no function failed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Returns the diagnostic for the function at `entry`, if it failed.
    #[must_use]
    pub fn failure(&self, entry: u64) -> Option<String> {
        self.failures.get(&entry).map(|e| e.to_string())
    }

    /// Total number of changes across the successful functions.
    #[must_use]
    pub const fn total_changes(&self) -> usize {
        self.changes
    }

    /// Wall-clock duration of the batch.
    #[must_use]
    pub const fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Derives summary statistics from the merged event log.
    #[must_use]
    pub fn stats(&self) -> DerivedStats {
        DerivedStats::from_log(&self.events).with_time(self.elapsed)
    }
}
