//! Configuration for the pass scheduler.
//!
//! This module provides the tunables shared by every pipeline run: iteration
//! bounds for repeating units, the worklist order of the liveness analysis,
//! the volatile-load policy and diagnostic switches.

use std::time::Duration;

/// Pop order of the liveness worklist.
///
/// The final consume masks do not depend on the order; it only changes how
/// many times values are revisited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WorklistOrder {
    /// Most recently pushed value first.
    #[default]
    Lifo,
    /// Oldest pushed value first.
    Fifo,
}

/// Configuration for the pass scheduler.
///
/// Controls iteration limits, liveness policy and diagnostics. One
/// configuration is shared by every function a pipeline runs on.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Maximum passes of a repeating sequence or rule pool before giving up (default: 1000).
    pub max_iterations: usize,

    /// Maximum rounds of a fixpoint driver (default: 10).
    pub max_restarts: usize,

    /// Pop order of the liveness worklist (default: LIFO).
    pub worklist_order: WorklistOrder,

    /// Keep loads from possibly constant addresses alive during early passes (default: true).
    pub volatile_load_guard: bool,

    /// Record one event per rule application (default: true).
    pub record_rule_events: bool,

    /// Validate graph invariants after every action (default: false).
    pub check_consistency: bool,

    /// Wall-clock budget per function, checked between unit invocations (default: none).
    pub timeout: Option<Duration>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_iterations: 1000,
            max_restarts: 10,
            worklist_order: WorklistOrder::Lifo,
            volatile_load_guard: true,
            record_rule_events: true,
            check_consistency: false,
            timeout: None,
        }
    }
}

impl SchedulerConfig {
    /// Creates a new configuration with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a configuration for catching rule-authoring defects early.
    ///
    /// This configuration uses:
    /// - Tight iteration bounds (100 passes, 4 fixpoint rounds)
    /// - Graph validation after every action
    #[must_use]
    pub fn strict() -> Self {
        Self {
            max_iterations: 100,
            max_restarts: 4,
            check_consistency: true,
            ..Self::default()
        }
    }

    /// Creates a configuration for large functions.
    ///
    /// This configuration uses:
    /// - Loose iteration bounds (10000 passes, 50 fixpoint rounds)
    /// - No per-rule events
    #[must_use]
    pub fn permissive() -> Self {
        Self {
            max_iterations: 10_000,
            max_restarts: 50,
            record_rule_events: false,
            ..Self::default()
        }
    }

    /// Sets the liveness worklist order.
    #[must_use]
    pub fn with_worklist_order(mut self, order: WorklistOrder) -> Self {
        self.worklist_order = order;
        self
    }

    /// Sets the per-function time budget.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}
