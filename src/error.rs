use thiserror::Error;

macro_rules! graph_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::GraphConsistency {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::GraphConsistency {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// Every error in this crate is fatal for the unit of work it occurs in. Nothing is
/// "expected and retried": configuration errors surface immediately at the registry call
/// site, while scheduling and graph errors abort the current function only.
///
/// # Error Categories
///
/// ## Configuration Errors
/// - [`Error::UnknownGroupList`] - A pipeline was requested for a group list that does not exist
/// - [`Error::UnknownPipeline`] - A derivation referenced an undefined base pipeline
/// - [`Error::DuplicateUnit`] - Two transformation units share a name in one catalog
/// - [`Error::ActivePipelineLocked`] - The active root's group list, or a base's, was edited without re-deriving
/// - [`Error::EmptyPipeline`] - A group list filters away every unit of the catalog
///
/// ## Scheduling Invariant Violations
/// - [`Error::IterationLimit`] - A repeating unit never reached its fixpoint
/// - [`Error::NonMonotone`] - A transfer function shrank a consume mask
/// - [`Error::Cancelled`] - The host driver cancelled the run between two units
///
/// ## Graph Consistency Errors
/// - [`Error::GraphConsistency`] - The operation graph violates one of its structural invariants
///
/// # Examples
///
/// ```rust,no_run
/// use pcodeflow::{Error, PassRegistry, SchedulerConfig};
///
/// let mut registry = PassRegistry::standard(SchedulerConfig::default())?;
/// match registry.derive("no-such-pipeline") {
///     Ok(_) => println!("derived"),
///     Err(Error::UnknownGroupList(name)) => eprintln!("no group list named {name}"),
///     Err(e) => eprintln!("Other error: {e}"),
/// }
/// # Ok::<(), pcodeflow::Error>(())
/// ```
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    /// A named group list was referenced but never registered.
    ///
    /// Deriving a pipeline from an undefined group list would produce an empty
    /// pipeline and silently stop all processing, so it is rejected instead.
    #[error("Group list does not exist - {0}")]
    UnknownGroupList(String),

    /// A derivation referenced a base pipeline which is neither the universal
    /// catalog nor a previously derived pipeline.
    #[error("Pipeline does not exist - {0}")]
    UnknownPipeline(String),

    /// Two transformation units in the same catalog were registered under one name.
    ///
    /// Unit names are how the registry finds, derives and caches units, so they
    /// must be unique.
    #[error("Duplicate transformation unit - {0}")]
    DuplicateUnit(String),

    /// The group list backing the active root pipeline was replaced while the
    /// pipeline was instantiated.
    ///
    /// Use [`crate::PassRegistry::replace_group_list`] or
    /// [`crate::PassRegistry::toggle_group`] to edit and re-derive explicitly.
    #[error("Group list {0} backs the active pipeline and must be re-derived explicitly")]
    ActivePipelineLocked(String),

    /// Filtering the catalog by a group list removed every unit, including the root.
    #[error("Pipeline {0} contains no transformation units")]
    EmptyPipeline(String),

    // Scheduling invariant violations
    /// A repeating unit exceeded its iteration bound.
    ///
    /// This signals a non-terminating rule (two rewrites undoing each other, or a
    /// rule reporting a change it did not make).
    #[error("Unit {unit} did not reach a fixpoint within {limit} iterations")]
    IterationLimit {
        /// The name of the unit whose bound was exceeded
        unit: String,
        /// The bound that was exceeded
        limit: usize,
    },

    /// The consumed-bit mask at an operation's output shrank between two visits.
    ///
    /// Consume masks may only gain bits while the worklist runs; a shrinking
    /// output mask means a transfer function is not monotone.
    #[error("Consume mask of {value} shrank while propagating through {op}")]
    NonMonotone {
        /// Description of the operation whose output was re-propagated
        op: String,
        /// Description of the value whose mask shrank
        value: String,
    },

    /// Processing was cancelled by the host driver between two unit invocations.
    #[error("Cancelled before unit {unit}")]
    Cancelled {
        /// The unit that was about to run
        unit: String,
    },

    // Graph consistency errors
    /// The operation graph is structurally inconsistent.
    ///
    /// Raised when an operation references a destroyed value, a call has no
    /// target input, or a write-once value has two definitions. The error
    /// includes the source location where the violation was detected.
    ///
    /// # Fields
    ///
    /// * `message` - Detailed description of the violated invariant
    /// * `file` - Source file where the error was detected
    /// * `line` - Source line where the error was detected
    #[error("Graph consistency - {file}:{line}: {message}")]
    GraphConsistency {
        /// The message to be printed for the GraphConsistency error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// Processing of one function failed.
    ///
    /// Wraps any fatal error with the function being processed and the
    /// innermost transformation unit that was running, which is the diagnostic
    /// reported to users. Other functions in the same batch are unaffected.
    #[error("Function {function} failed in {unit}: {source}")]
    FunctionFailed {
        /// Name of the function being processed
        function: String,
        /// Name of the innermost unit that was running
        unit: String,
        /// The underlying error
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Returns `true` if this error is a registry configuration error.
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::UnknownGroupList(_)
                | Self::UnknownPipeline(_)
                | Self::DuplicateUnit(_)
                | Self::ActivePipelineLocked(_)
                | Self::EmptyPipeline(_)
        )
    }

    /// Returns the underlying error, looking through [`Error::FunctionFailed`].
    #[must_use]
    pub fn root_cause(&self) -> &Error {
        match self {
            Self::FunctionFailed { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_graph_error_macro_captures_location() {
        let err = graph_error!("op {} reads destroyed value", 3);
        match err {
            Error::GraphConsistency {
                message, file, line,
            } => {
                assert_eq!(message, "op 3 reads destroyed value");
                assert!(file.ends_with("error.rs"));
                assert!(line > 0);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_root_cause_unwraps_function_failure() {
        let err = Error::FunctionFailed {
            function: "main".to_string(),
            unit: "deadcode".to_string(),
            source: Box::new(Error::IterationLimit {
                unit: "mainloop".to_string(),
                limit: 4,
            }),
        };
        assert!(matches!(
            err.root_cause(),
            Error::IterationLimit { limit: 4, .. }
        ));
        assert!(err.to_string().contains("main"));
        assert!(err.to_string().contains("deadcode"));
    }

    #[test]
    fn test_configuration_classification() {
        assert!(Error::UnknownGroupList("x".into()).is_configuration());
        assert!(Error::EmptyPipeline("x".into()).is_configuration());
        assert!(!Error::Cancelled { unit: "x".into() }.is_configuration());
    }
}
