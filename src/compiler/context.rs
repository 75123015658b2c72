//! Per-function run state.
//!
//! A [`PassContext`] is created for every function a pipeline runs on and is
//! never shared across functions. It carries the configuration, the event
//! log, the fixpoint pass number, per-unit counters and the cancellation
//! state checked between unit invocations.

use std::{
    collections::BTreeMap,
    fmt::Write as _,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use crate::{
    compiler::{config::SchedulerConfig, events::EventLog},
    Error, Result,
};

/// Shared cancellation switch for one or more pipeline runs.
///
/// Cancellation is observed between child-unit invocations, never in the
/// middle of a rule or transfer function.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// Creates a flag that is not yet raised.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Raises the flag.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Returns `true` once the flag was raised.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Counters kept per unit name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnitStats {
    /// How often the unit was tried (rules: once per matching operation).
    pub tests: usize,
    /// How often the unit reported at least one change.
    pub applications: usize,
    /// Total changes reported.
    pub changes: usize,
}

/// Mutable state for running a pipeline over one function.
#[derive(Debug)]
pub struct PassContext {
    config: SchedulerConfig,
    /// Events recorded while processing the function.
    pub events: EventLog,
    function: u64,
    pass_number: u32,
    restart: bool,
    stats: BTreeMap<String, UnitStats>,
    unit_stack: Vec<String>,
    cancel: Option<CancelFlag>,
    deadline: Option<Instant>,
    started: Instant,
}

impl PassContext {
    /// Creates a context using `config`.
    ///
    /// The wall-clock budget of [`SchedulerConfig::timeout`] starts now.
    #[must_use]
    pub fn new(config: SchedulerConfig) -> Self {
        let started = Instant::now();
        Self {
            deadline: config.timeout.map(|t| started + t),
            config,
            events: EventLog::new(),
            function: 0,
            pass_number: 0,
            restart: false,
            stats: BTreeMap::new(),
            unit_stack: Vec::new(),
            cancel: None,
            started,
        }
    }

    /// Observes `flag` between unit invocations.
    #[must_use]
    pub fn with_cancel_flag(mut self, flag: CancelFlag) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Returns the scheduler configuration.
    #[must_use]
    pub const fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Returns the entry address of the function being processed.
    #[must_use]
    pub const fn function(&self) -> u64 {
        self.function
    }

    pub(crate) fn set_function(&mut self, entry: u64) {
        self.function = entry;
    }

    /// Returns the current fixpoint round (0 before the first round).
    #[must_use]
    pub const fn pass_number(&self) -> u32 {
        self.pass_number
    }

    pub(crate) fn set_pass_number(&mut self, pass: u32) {
        self.pass_number = pass;
    }

    /// Asks the enclosing fixpoint driver for another round even if the
    /// current round reports no change.
    pub fn request_restart(&mut self) {
        self.restart = true;
    }

    /// Returns `true` if a restart was requested and not yet consumed.
    #[must_use]
    pub const fn is_restart_pending(&self) -> bool {
        self.restart
    }

    pub(crate) fn take_restart(&mut self) -> bool {
        std::mem::take(&mut self.restart)
    }

    /// Returns the counters of the unit called `name`.
    #[must_use]
    pub fn stats(&self, name: &str) -> Option<&UnitStats> {
        self.stats.get(name)
    }

    pub(crate) fn record_test(&mut self, name: &str) {
        self.stats.entry(name.to_string()).or_default().tests += 1;
    }

    pub(crate) fn record_changes(&mut self, name: &str, changes: usize) {
        let stats = self.stats.entry(name.to_string()).or_default();
        if changes > 0 {
            stats.applications += 1;
            stats.changes += changes;
        }
    }

    /// Renders the per-unit counters, one line per unit that was tried.
    #[must_use]
    pub fn statistics(&self) -> String {
        let mut out = String::new();
        for (name, stats) in &self.stats {
            let _ = writeln!(
                out,
                "{name:<20} tested {:>6}  applied {:>6}  changes {:>6}",
                stats.tests, stats.applications, stats.changes
            );
        }
        out
    }

    /// Returns the innermost unit currently running.
    #[must_use]
    pub fn current_unit(&self) -> Option<&str> {
        self.unit_stack.last().map(String::as_str)
    }

    pub(crate) fn enter(&mut self, name: &str) {
        self.unit_stack.push(name.to_string());
    }

    pub(crate) fn leave(&mut self) {
        self.unit_stack.pop();
    }

    pub(crate) fn clear_units(&mut self) {
        self.unit_stack.clear();
    }

    /// Returns the time since the context was created.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Fails with [`Error::Cancelled`] if the run was cancelled or its time
    /// budget is spent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] naming `next_unit`.
    pub fn check_cancelled(&self, next_unit: &str) -> Result<()> {
        let flagged = self.cancel.as_ref().is_some_and(CancelFlag::is_cancelled);
        let expired = self.deadline.is_some_and(|d| Instant::now() >= d);
        if flagged || expired {
            return Err(Error::Cancelled {
                unit: next_unit.to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_restart_flag_is_consumed() {
        let mut ctx = PassContext::new(SchedulerConfig::default());
        assert!(!ctx.is_restart_pending());
        ctx.request_restart();
        assert!(ctx.take_restart());
        assert!(!ctx.take_restart());
    }

    #[test]
    fn test_statistics() {
        let mut ctx = PassContext::new(SchedulerConfig::default());
        ctx.record_test("identity");
        ctx.record_test("identity");
        ctx.record_changes("identity", 1);
        ctx.record_changes("identity", 0);

        let stats = ctx.stats("identity").unwrap();
        assert_eq!(stats.tests, 2);
        assert_eq!(stats.applications, 1);
        assert_eq!(stats.changes, 1);
        assert!(ctx.statistics().starts_with("identity"));
        assert!(ctx.stats("deadcode").is_none());
    }

    #[test]
    fn test_cancel_flag() {
        let flag = CancelFlag::new();
        let ctx = PassContext::new(SchedulerConfig::default()).with_cancel_flag(flag.clone());
        assert!(ctx.check_cancelled("mainloop").is_ok());
        flag.cancel();
        assert!(matches!(
            ctx.check_cancelled("mainloop"),
            Err(Error::Cancelled { unit }) if unit == "mainloop"
        ));
    }

    #[test]
    fn test_expired_deadline() {
        let config = SchedulerConfig::default().with_timeout(Duration::ZERO);
        let ctx = PassContext::new(config);
        assert!(ctx.check_cancelled("deadcode").is_err());
    }

    #[test]
    fn test_unit_stack() {
        let mut ctx = PassContext::new(SchedulerConfig::default());
        ctx.enter("universal");
        ctx.enter("mainloop");
        assert_eq!(ctx.current_unit(), Some("mainloop"));
        ctx.leave();
        assert_eq!(ctx.current_unit(), Some("universal"));
        ctx.clear_units();
        assert_eq!(ctx.current_unit(), None);
    }
}
