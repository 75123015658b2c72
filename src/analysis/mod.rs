//! Program representation and analyses the pass scheduler runs on.
//!
//! # Architecture
//!
//! The analysis module is organized into focused sub-modules:
//!
//! - [`graph`] - The operation/value graph of one function and its builder
//! - [`consume`] - Bit-precision liveness over that graph
//!
//! # Usage
//!
//! ```rust
//! use pcodeflow::analysis::{ConsumeAnalysis, FunctionBuilder};
//! use pcodeflow::SchedulerConfig;
//!
//! let func = FunctionBuilder::new("f", 0x1000).build_with(|f| {
//!     let x = f.register(4, 0);
//!     f.block(0, |b| {
//!         let unused = b.copy(x);
//!         let _ = unused;
//!         b.ret(x);
//!     });
//! });
//!
//! let masks = ConsumeAnalysis::new(&func, &SchedulerConfig::default(), 1).run()?;
//! assert!(masks.pushes() > 0);
//! # Ok::<(), pcodeflow::Error>(())
//! ```

pub mod consume;
pub mod graph;

// Re-export primary types at module level
pub use consume::{ConsumeAnalysis, ConsumeMasks};
pub use graph::{
    BlockContext, BlockId, CallSpec, Function, FunctionBuilder, FunctionContext, OpCode, OpFlags,
    OpId, Operation, ReturnPrototype, Space, SpaceSet, Value, ValueFlags, ValueId,
};
