//! Rewrite scheduling: the pass registry, derived pipelines and their driver.
//!
//! This module sits between the program graph and the host:
//!
//! - [`crate::analysis`] - operation graph and bit-precision liveness
//! - [`compiler`](self) - transformation units, group lists, scheduling
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                      Rewrite Scheduling                          │
//! ├──────────────────────────────────────────────────────────────────┤
//! │                                                                  │
//! │  Catalog                     Universal unit tree (immutable)     │
//! │    ├─ Sequence / Fixpoint     composites                         │
//! │    ├─ Pool                    opcode-dispatched rules            │
//! │    └─ Action / Rule           leaves tagged with a group         │
//! │                                                                  │
//! │  PassRegistry                Named group lists → pipelines       │
//! │    ├─ derive / derive_from    cached, shared by identity         │
//! │    ├─ toggle_group            edit + re-derive + hot-swap        │
//! │    └─ active root             the pipeline hosts run             │
//! │                                                                  │
//! │  Pipeline                    Filtered view of the catalog        │
//! │    └─ apply()                 fixpoint rounds, repeat loops      │
//! │                                                                  │
//! │  PassContext                 Per-function run state              │
//! │    ├─ pass number, restart    fixpoint bookkeeping               │
//! │    ├─ unit statistics         tests / applications / changes     │
//! │    └─ EventLog                change tracking and diagnostics    │
//! │                                                                  │
//! │  BatchDriver                 Parallel run over many functions    │
//! │                                                                  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust
//! use pcodeflow::{analysis::FunctionBuilder, PassContext, PassRegistry, SchedulerConfig};
//!
//! let mut registry = PassRegistry::standard(SchedulerConfig::default())?;
//! let pipeline = registry.set_active("decompile")?;
//!
//! let mut func = FunctionBuilder::new("main", 0x1000).build_with(|f| {
//!     let x = f.register(4, 0);
//!     f.block(0, |b| {
//!         let zero = b.constant(4, 0);
//!         let y = b.add(x, zero);
//!         b.ret(y);
//!     });
//! });
//!
//! let mut ctx = PassContext::new(registry.config().clone());
//! let changes = pipeline.apply(&mut func, &mut ctx)?;
//! assert!(changes > 0);
//! # Ok::<(), pcodeflow::Error>(())
//! ```

mod catalog;
mod config;
mod context;
mod driver;
mod events;
mod pass;
mod passes;
mod pipeline;
mod registry;
mod standard;

pub use catalog::{Catalog, CatalogBuilder, CompositeContext, PoolContext, UnitKind, UnitNode};
pub use config::{SchedulerConfig, WorklistOrder};
pub use context::{CancelFlag, PassContext, UnitStats};
pub use driver::{BatchDriver, BatchReport};
pub use events::{DerivedStats, Event, EventBuilder, EventKind, EventLog, EventLogIter};
pub use pass::{Action, Rule};
pub use passes::{
    AbsorbRule, CollapseCopyRule, DeadCodeAction, DoubleNegateRule, FoldConstantsRule,
    IdentityRule, NegateCompareRule, NonzeroMaskAction, PropagateCopyRule,
};
pub use pipeline::Pipeline;
pub use registry::{GroupList, PassRegistry};
pub use standard::{standard_catalog, STANDARD_GROUP_LISTS};
