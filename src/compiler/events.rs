//! Structured event logging for pipeline runs.
//!
//! Every unit invocation, rule firing and liveness commit can be recorded as
//! an [`Event`]. Events can be inspected for debugging or safely ignored.
//!
//! # Architecture
//!
//! The system is built around three main types:
//!
//! - [`Event`] - A single recorded event
//! - [`EventLog`] - Append-only collection with query and summary helpers
//! - [`EventBuilder`] - Fluent API for creating events
//!
//! # Example
//!
//! ```rust
//! use pcodeflow::compiler::{EventKind, EventLog};
//!
//! let log = EventLog::new();
//!
//! log.record(EventKind::OpDestroyed)
//!     .at(0x1000, 7)
//!     .unit("deadcode")
//!     .message("op7: v9 = COPY v3");
//!
//! log.info("derived pipeline decompile");
//!
//! assert_eq!(log.count_kind(EventKind::OpDestroyed), 1);
//! println!("{}", log.summary());
//! ```

use std::{
    collections::{HashMap, HashSet},
    fmt,
    time::Duration,
};

/// Categories of events that can be logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A composite unit started running.
    UnitStarted,
    /// A composite unit finished running.
    UnitCompleted,
    /// A rule rewrote an operation.
    RuleApplied,
    /// An operation was destroyed because its output is never consumed.
    OpDestroyed,
    /// A call output was removed because it is never consumed.
    OutputRemoved,
    /// Reads of a vacuously consumed value were replaced by zero.
    ValueZeroed,
    /// A load was kept alive because its address may be constant.
    LoadAnchored,
    /// A fixpoint driver started another round.
    Restart,

    /// Informational message.
    Info,
    /// Warning (something unexpected but recoverable).
    Warning,
    /// Error (something failed).
    Error,
}

impl EventKind {
    /// Returns a human-readable description of this event kind.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::UnitStarted => "unit started",
            Self::UnitCompleted => "unit completed",
            Self::RuleApplied => "rule applied",
            Self::OpDestroyed => "op destroyed",
            Self::OutputRemoved => "output removed",
            Self::ValueZeroed => "value zeroed",
            Self::LoadAnchored => "load anchored",
            Self::Restart => "restart",
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }

    /// Returns true if this event represents a graph mutation.
    #[must_use]
    pub fn is_transformation(&self) -> bool {
        matches!(
            self,
            Self::RuleApplied | Self::OpDestroyed | Self::OutputRemoved | Self::ValueZeroed
        )
    }

    /// Returns true if this is a diagnostic event (info/warning/error).
    #[must_use]
    pub fn is_diagnostic(&self) -> bool {
        matches!(self, Self::Info | Self::Warning | Self::Error)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// A single logged event.
#[derive(Debug, Clone)]
pub struct Event {
    /// The type of event.
    pub kind: EventKind,
    /// Entry address of the function the event occurred in.
    pub function: Option<u64>,
    /// Location within the function (operation index).
    pub location: Option<usize>,
    /// Human-readable description.
    pub message: String,
    /// Name of the unit that produced the event.
    pub unit: Option<String>,
}

impl Event {
    fn new(kind: EventKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            function: None,
            location: None,
            message: message.into(),
            unit: None,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.unit {
            Some(unit) => write!(f, "[{}] {}: {}", self.kind, unit, self.message),
            None => write!(f, "[{}] {}", self.kind, self.message),
        }
    }
}

/// Builder for creating events with a fluent API.
///
/// Created by [`EventLog::record`]. The event is added to the log when the
/// builder is dropped.
pub struct EventBuilder<'a> {
    log: &'a EventLog,
    kind: EventKind,
    function: Option<u64>,
    location: Option<usize>,
    message: Option<String>,
    unit: Option<String>,
}

impl<'a> EventBuilder<'a> {
    fn new(log: &'a EventLog, kind: EventKind) -> Self {
        Self {
            log,
            kind,
            function: None,
            location: None,
            message: None,
            unit: None,
        }
    }

    /// Sets the function and location where the event occurred.
    pub fn at(mut self, function: u64, location: usize) -> Self {
        self.function = Some(function);
        self.location = Some(location);
        self
    }

    /// Sets only the function.
    pub fn function(mut self, function: u64) -> Self {
        self.function = Some(function);
        self
    }

    /// Sets a custom message describing the event.
    pub fn message(mut self, msg: impl Into<String>) -> Self {
        self.message = Some(msg.into());
        self
    }

    /// Associates this event with a unit.
    pub fn unit(mut self, name: impl Into<String>) -> Self {
        self.unit = Some(name.into());
        self
    }
}

impl Drop for EventBuilder<'_> {
    fn drop(&mut self) {
        let message = self
            .message
            .take()
            .unwrap_or_else(|| self.kind.description().to_string());

        self.log.events.push(Event {
            kind: self.kind,
            function: self.function.take(),
            location: self.location.take(),
            message,
            unit: self.unit.take(),
        });
    }
}

/// Append-only collection of events.
///
/// Statistics are derived from the events rather than tracked separately.
/// Events can be appended concurrently through shared references.
#[derive(Debug)]
pub struct EventLog {
    events: boxcar::Vec<Event>,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for EventLog {
    fn clone(&self) -> Self {
        let log = Self::new();
        log.merge(self);
        log
    }
}

impl EventLog {
    /// Creates an empty event log.
    #[must_use]
    pub fn new() -> Self {
        Self {
            events: boxcar::Vec::new(),
        }
    }

    /// Returns true if no events have been logged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.count() == 0
    }

    /// Returns the total number of events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.count()
    }

    /// Starts building a new event of the given kind.
    pub fn record(&self, kind: EventKind) -> EventBuilder<'_> {
        EventBuilder::new(self, kind)
    }

    /// Records an informational message.
    pub fn info(&self, message: impl Into<String>) {
        self.events.push(Event::new(EventKind::Info, message));
    }

    /// Records a warning message.
    pub fn warn(&self, message: impl Into<String>) {
        self.events.push(Event::new(EventKind::Warning, message));
    }

    /// Records an error message.
    pub fn error(&self, message: impl Into<String>) {
        self.events.push(Event::new(EventKind::Error, message));
    }

    /// Appends every event of `other` to this log.
    pub fn merge(&self, other: &EventLog) {
        for (_, event) in &other.events {
            self.events.push(event.clone());
        }
    }

    /// Returns true if any event of the given kind exists.
    #[must_use]
    pub fn has(&self, kind: EventKind) -> bool {
        self.events.iter().any(|(_, e)| e.kind == kind)
    }

    /// Counts events of the given kind.
    #[must_use]
    pub fn count_kind(&self, kind: EventKind) -> usize {
        self.events.iter().filter(|(_, e)| e.kind == kind).count()
    }

    /// Returns an iterator over all events.
    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.events.iter().map(|(_, e)| e)
    }

    /// Returns an iterator over events of a specific kind.
    pub fn filter_kind(&self, kind: EventKind) -> impl Iterator<Item = &Event> + '_ {
        self.iter().filter(move |e| e.kind == kind)
    }

    /// Returns an iterator over events for the function at `entry`.
    pub fn filter_function(&self, entry: u64) -> impl Iterator<Item = &Event> + '_ {
        self.iter().filter(move |e| e.function == Some(entry))
    }

    /// Returns an iterator over events produced by the unit called `name`.
    pub fn filter_unit<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Event> + 'a {
        self.iter().filter(move |e| e.unit.as_deref() == Some(name))
    }

    /// Returns an iterator over warning events.
    pub fn warnings(&self) -> impl Iterator<Item = &Event> + '_ {
        self.filter_kind(EventKind::Warning)
    }

    /// Returns an iterator over error events.
    pub fn errors(&self) -> impl Iterator<Item = &Event> + '_ {
        self.filter_kind(EventKind::Error)
    }

    /// Counts events grouped by kind.
    #[must_use]
    pub fn count_by_kind(&self) -> HashMap<EventKind, usize> {
        let mut counts = HashMap::new();
        for (_, event) in &self.events {
            *counts.entry(event.kind).or_insert(0) += 1;
        }
        counts
    }

    /// Returns the number of distinct functions with transformation events.
    #[must_use]
    pub fn functions_affected(&self) -> usize {
        self.iter()
            .filter(|e| e.kind.is_transformation())
            .filter_map(|e| e.function)
            .collect::<HashSet<_>>()
            .len()
    }

    /// Generates a human-readable summary of all transformation events.
    #[must_use]
    pub fn summary(&self) -> String {
        if self.is_empty() {
            return "no events".to_string();
        }

        let mut parts: Vec<String> = self
            .count_by_kind()
            .iter()
            .filter(|(k, _)| k.is_transformation())
            .map(|(kind, count)| format!("{count} {}", kind.description()))
            .collect();

        if parts.is_empty() {
            return format!("{} events", self.len());
        }

        parts.sort();
        parts.join(", ")
    }
}

impl<'a> IntoIterator for &'a EventLog {
    type Item = &'a Event;
    type IntoIter = EventLogIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        EventLogIter {
            inner: self.events.iter(),
        }
    }
}

/// Iterator over the events of an [`EventLog`].
pub struct EventLogIter<'a> {
    inner: boxcar::Iter<'a, Event>,
}

impl<'a> Iterator for EventLogIter<'a> {
    type Item = &'a Event;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(_, e)| e)
    }
}

/// Statistics derived from an [`EventLog`].
#[derive(Debug, Clone, Default)]
pub struct DerivedStats {
    /// Functions with at least one transformation.
    pub functions_transformed: usize,
    /// Rule firings.
    pub rules_applied: usize,
    /// Operations destroyed by dead-code removal.
    pub ops_destroyed: usize,
    /// Call outputs removed.
    pub outputs_removed: usize,
    /// Values whose reads were replaced by zero.
    pub values_zeroed: usize,
    /// Loads anchored by the volatile-load guard.
    pub loads_anchored: usize,
    /// Fixpoint rounds beyond the first.
    pub restarts: usize,
    /// Number of warnings.
    pub warnings: usize,
    /// Number of errors.
    pub errors: usize,
    /// Processing time.
    pub total_time: Duration,
}

impl DerivedStats {
    /// Computes statistics from an event log.
    #[must_use]
    pub fn from_log(log: &EventLog) -> Self {
        let counts = log.count_by_kind();
        let get = |kind: EventKind| counts.get(&kind).copied().unwrap_or(0);

        Self {
            functions_transformed: log.functions_affected(),
            rules_applied: get(EventKind::RuleApplied),
            ops_destroyed: get(EventKind::OpDestroyed),
            outputs_removed: get(EventKind::OutputRemoved),
            values_zeroed: get(EventKind::ValueZeroed),
            loads_anchored: get(EventKind::LoadAnchored),
            restarts: get(EventKind::Restart),
            warnings: get(EventKind::Warning),
            errors: get(EventKind::Error),
            total_time: Duration::ZERO,
        }
    }

    /// Sets the total processing time.
    #[must_use]
    pub fn with_time(mut self, time: Duration) -> Self {
        self.total_time = time;
        self
    }

    /// Generates a human-readable summary.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut parts = Vec::new();

        if self.functions_transformed > 0 {
            parts.push(format!("{} functions", self.functions_transformed));
        }
        if self.rules_applied > 0 {
            parts.push(format!("{} rewrites", self.rules_applied));
        }
        if self.ops_destroyed > 0 {
            parts.push(format!("{} ops destroyed", self.ops_destroyed));
        }
        if self.outputs_removed > 0 {
            parts.push(format!("{} outputs removed", self.outputs_removed));
        }
        if self.values_zeroed > 0 {
            parts.push(format!("{} values zeroed", self.values_zeroed));
        }
        if self.loads_anchored > 0 {
            parts.push(format!("{} loads anchored", self.loads_anchored));
        }
        if self.errors > 0 {
            parts.push(format!("{} errors", self.errors));
        }
        if self.warnings > 0 {
            parts.push(format!("{} warnings", self.warnings));
        }

        let stats = if parts.is_empty() {
            "no transformations".to_string()
        } else {
            parts.join(", ")
        };

        if self.total_time.as_millis() > 0 {
            format!("{stats} in {:?}", self.total_time)
        } else {
            stats
        }
    }
}

impl fmt::Display for DerivedStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_log() {
        let log = EventLog::new();
        assert!(log.is_empty());
        assert_eq!(log.len(), 0);
        assert_eq!(log.summary(), "no events");
    }

    #[test]
    fn test_record_event() {
        let log = EventLog::new();
        log.record(EventKind::RuleApplied)
            .at(0x4000, 3)
            .unit("foldconstants")
            .message("op3 folded");

        let event = log.iter().next().unwrap();
        assert_eq!(event.function, Some(0x4000));
        assert_eq!(event.location, Some(3));
        assert_eq!(event.unit.as_deref(), Some("foldconstants"));
        assert_eq!(event.to_string(), "[rule applied] foldconstants: op3 folded");
    }

    #[test]
    fn test_default_message() {
        let log = EventLog::new();
        log.record(EventKind::Restart);
        assert_eq!(log.iter().next().unwrap().message, "restart");
    }

    #[test]
    fn test_filters() {
        let log = EventLog::new();
        log.record(EventKind::OpDestroyed).at(1, 0).unit("deadcode");
        log.record(EventKind::OpDestroyed).at(2, 0).unit("deadcode");
        log.record(EventKind::RuleApplied).at(2, 1).unit("identity");
        log.warn("careful");

        assert_eq!(log.filter_function(2).count(), 2);
        assert_eq!(log.filter_unit("deadcode").count(), 2);
        assert_eq!(log.warnings().count(), 1);
        assert_eq!(log.functions_affected(), 2);
        assert_eq!(log.summary(), "1 rule applied, 2 op destroyed");
    }

    #[test]
    fn test_merge_and_stats() {
        let a = EventLog::new();
        a.record(EventKind::ValueZeroed).at(1, 4);
        let b = EventLog::new();
        b.record(EventKind::LoadAnchored).at(1, 5);
        b.error("boom");
        a.merge(&b);

        let stats = DerivedStats::from_log(&a);
        assert_eq!(stats.values_zeroed, 1);
        assert_eq!(stats.loads_anchored, 1);
        assert_eq!(stats.errors, 1);
        assert_eq!(stats.to_string(), "1 functions, 1 values zeroed, 1 loads anchored, 1 errors");
    }
}
