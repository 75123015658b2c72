//! Operation graph for one function.
//!
//! This is the program representation the scheduler and the liveness analysis
//! operate on: an arena of p-code style [`Operation`]s connected to an arena of
//! [`Value`]s (varnodes). It exposes exactly the queries and mutators the
//! transformation core needs:
//!
//! - enumeration of live operations and values, optionally by space or storage address
//! - per-operation opcode, inputs, output, block and flags
//! - per-value size, space, writer, readers, constant status and known-nonzero bits
//! - destruction of operations, removal of outputs and input replacement
//! - dead-code eligibility of storage spaces
//! - call-site and return prototypes
//!
//! Graphs are usually assembled with [`FunctionBuilder`].

mod builder;
mod callspec;
mod function;
mod nzmask;
mod op;
mod opcode;
mod value;

pub use builder::{BlockContext, FunctionBuilder, FunctionContext};
pub use callspec::{CallSpec, ReturnPrototype};
pub use function::Function;
pub use op::{BlockId, OpFlags, OpId, Operation};
pub use opcode::OpCode;
pub use value::{Space, SpaceSet, Value, ValueFlags, ValueId};
