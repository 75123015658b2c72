//! # pcodeflow Prelude
//!
//! This module provides a convenient prelude for the most commonly used types and traits
//! from the pcodeflow library. Import it to build functions, derive pipelines and run them
//! without spelling out every module path.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all pcodeflow operations
pub use crate::Error;

/// The result type used throughout pcodeflow
pub use crate::Result;

// ================================================================================================
// Program Representation
// ================================================================================================

/// The operation/value graph and its handles
pub use crate::analysis::{
    CallSpec, Function, OpCode, OpFlags, OpId, Operation, ReturnPrototype, Space, Value,
    ValueFlags, ValueId,
};

/// Closure-based graph construction
pub use crate::analysis::{BlockContext, FunctionBuilder, FunctionContext};

/// Bit-precision liveness
pub use crate::analysis::{ConsumeAnalysis, ConsumeMasks};

// ================================================================================================
// Scheduling
// ================================================================================================

/// Registry, pipelines and configuration
pub use crate::compiler::{
    GroupList, PassRegistry, Pipeline, SchedulerConfig, WorklistOrder, STANDARD_GROUP_LISTS,
};

/// Building custom catalogs
pub use crate::compiler::{Action, Catalog, CatalogBuilder, Rule, UnitKind};

/// Per-function state, diagnostics and batch processing
pub use crate::compiler::{
    BatchDriver, BatchReport, CancelFlag, DerivedStats, EventKind, EventLog, PassContext,
};
