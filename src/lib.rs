// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![deny(unsafe_code)]

//! # pcodeflow
//!
//! Rewrite scheduling and bit-precision liveness for p-code style
//! intermediate representations.
//!
//! A decompiler simplifies each function by running many small rewrites in a
//! carefully ordered loop. `pcodeflow` provides that loop as a reusable
//! substrate:
//!
//! - **A universal catalog** of transformation units: sequences, fixpoints,
//!   opcode-dispatched rule pools, whole-function actions
//! - **Group lists** naming which tagged units a pipeline keeps, and a
//!   registry deriving, caching and hot-swapping the resulting pipelines
//! - **Deterministic scheduling** with iteration bounds, restarts and
//!   cancellation between units
//! - **Bit-precision liveness**: which bits of every value are ever consumed,
//!   the basis for dead-code removal and value narrowing
//! - **A parallel batch driver** running one pipeline over many functions
//!
//! ## Quick Start
//!
//! ```rust
//! use pcodeflow::prelude::*;
//!
//! let mut registry = PassRegistry::standard(SchedulerConfig::default())?;
//! let pipeline = registry.set_active("decompile")?;
//!
//! let mut func = FunctionBuilder::new("demo", 0x1000).build_with(|f| {
//!     let x = f.register(4, 0);
//!     f.block(0, |b| {
//!         let four = b.constant(4, 4);
//!         let t = b.add(x, four);
//!         let ff = b.constant(4, 0xff);
//!         let y = b.and(t, ff);
//!         b.ret(y);
//!     });
//! });
//!
//! let mut ctx = PassContext::new(SchedulerConfig::default());
//! pipeline.apply(&mut func, &mut ctx)?;
//! println!("{}", ctx.events.summary());
//! # Ok::<(), pcodeflow::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`analysis`] - The operation graph ([`analysis::Function`]) and the
//!   liveness analysis ([`analysis::ConsumeAnalysis`])
//! - [`compiler`] - Catalog, registry, pipelines, standard rules and actions
//! - [`utils`] - Bit sets and 64-bit mask arithmetic
//!
//! ## Error Handling
//!
//! All fallible operations return [`Result<T, Error>`](Result). Registry
//! misconfiguration surfaces at the call site; anything going wrong while a
//! pipeline runs is reported as [`Error::FunctionFailed`] naming the function
//! and the innermost unit:
//!
//! ```rust
//! use pcodeflow::{Error, PassRegistry, SchedulerConfig};
//!
//! let mut registry = PassRegistry::standard(SchedulerConfig::default())?;
//! match registry.derive_from("decompile", "undefined") {
//!     Err(Error::UnknownGroupList(name)) => assert_eq!(name, "undefined"),
//!     other => panic!("unexpected {other:?}"),
//! }
//! # Ok::<(), pcodeflow::Error>(())
//! ```

#[macro_use]
pub(crate) mod error;

/// Convenient re-exports of the most commonly used types and traits.
///
/// # Example
///
/// ```rust
/// use pcodeflow::prelude::*;
///
/// let registry = PassRegistry::standard(SchedulerConfig::default())?;
/// assert!(registry.group_names().contains(&"decompile"));
/// # Ok::<(), pcodeflow::Error>(())
/// ```
pub mod prelude;

/// Program representation and bit-precision liveness.
///
/// # Key Types
///
/// - [`analysis::Function`] - Arena-backed operation/value graph of one function
/// - [`analysis::FunctionBuilder`] - Closure-based construction for hosts and tests
/// - [`analysis::ConsumeAnalysis`] - Worklist solver computing consumed-bit masks
pub mod analysis;

/// Transformation units, the pass registry and pipeline scheduling.
///
/// # Key Types
///
/// - [`compiler::PassRegistry`] - Group lists and the derived pipeline cache
/// - [`compiler::Pipeline`] - A derived view of the universal catalog
/// - [`compiler::PassContext`] - Per-function run state and event log
/// - [`compiler::BatchDriver`] - Parallel host driver
pub mod compiler;

/// Bit sets and mask arithmetic shared by the analyses.
pub mod utils;

/// `pcodeflow` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `pcodeflow` Error type
///
/// The main error type for all operations in this crate, covering registry
/// configuration, scheduling invariants and graph consistency.
pub use error::Error;

/// Entry points for configuring and running pipelines.
pub use compiler::{
    BatchDriver, BatchReport, CancelFlag, PassContext, PassRegistry, Pipeline, SchedulerConfig,
    WorklistOrder,
};
