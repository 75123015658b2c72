//! Operations (p-code ops).

use std::fmt;

use bitflags::bitflags;

use crate::analysis::graph::{OpCode, ValueId};

/// Handle to an [`Operation`] inside its function.
///
/// Handles are assigned in creation order, so comparing two handles compares
/// the order in which the operations were created.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OpId(u32);

impl OpId {
    /// Creates a handle from a raw arena index.
    #[must_use]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Returns the dense arena index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for OpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "op{}", self.0)
    }
}

impl fmt::Display for OpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "op{}", self.0)
    }
}

/// Handle to a basic block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct BlockId(u32);

impl BlockId {
    /// Creates a block handle.
    #[must_use]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Returns the block index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

bitflags! {
    /// Attributes of an operation.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct OpFlags: u8 {
        /// The operation sits in unreachable code and is not definitely executed.
        const DEAD = 0x01;
        /// The output of this call must be kept even if nothing reads it.
        const HOLD_OUTPUT = 0x02;
        /// The operation is the cause of at least one `Indirect` effect.
        const INDIRECT_SOURCE = 0x04;
    }
}

/// An operation node.
#[derive(Debug, Clone)]
pub struct Operation {
    pub(crate) id: OpId,
    pub(crate) opcode: OpCode,
    pub(crate) inputs: Vec<ValueId>,
    pub(crate) output: Option<ValueId>,
    pub(crate) block: BlockId,
    pub(crate) flags: OpFlags,
}

impl Operation {
    /// Returns this operation's handle.
    #[must_use]
    pub const fn id(&self) -> OpId {
        self.id
    }

    /// Returns the opcode.
    #[must_use]
    pub const fn opcode(&self) -> OpCode {
        self.opcode
    }

    /// Returns the ordered inputs.
    #[must_use]
    pub fn inputs(&self) -> &[ValueId] {
        &self.inputs
    }

    /// Returns the input in `slot`, if the operation has that many inputs.
    #[must_use]
    pub fn input(&self, slot: usize) -> Option<ValueId> {
        self.inputs.get(slot).copied()
    }

    /// Returns the number of inputs.
    #[must_use]
    pub fn num_inputs(&self) -> usize {
        self.inputs.len()
    }

    /// Returns the output value, if any.
    #[must_use]
    pub const fn output(&self) -> Option<ValueId> {
        self.output
    }

    /// Returns the containing block.
    #[must_use]
    pub const fn block(&self) -> BlockId {
        self.block
    }

    /// Returns the flags.
    #[must_use]
    pub const fn flags(&self) -> OpFlags {
        self.flags
    }

    /// Returns `true` for `Call` and `CallInd`.
    #[must_use]
    pub const fn is_call(&self) -> bool {
        self.opcode.is_call()
    }

    /// Returns `true` if the operation produces an output value.
    #[must_use]
    pub const fn is_assignment(&self) -> bool {
        self.output.is_some()
    }

    /// Returns `true` if the operation is marked as unreachable.
    #[must_use]
    pub const fn is_dead(&self) -> bool {
        self.flags.contains(OpFlags::DEAD)
    }

    /// Returns `true` if a call's output must be kept.
    #[must_use]
    pub const fn holds_output(&self) -> bool {
        self.flags.contains(OpFlags::HOLD_OUTPUT)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: ", self.id)?;
        if let Some(out) = self.output {
            write!(f, "{out} = ")?;
        }
        write!(f, "{}", self.opcode)?;
        for (i, input) in self.inputs.iter().enumerate() {
            let sep = if i == 0 { " " } else { ", " };
            write!(f, "{sep}{input}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_display() {
        let op = Operation {
            id: OpId::new(2),
            opcode: OpCode::IntAdd,
            inputs: vec![ValueId::new(0), ValueId::new(1)],
            output: Some(ValueId::new(5)),
            block: BlockId::default(),
            flags: OpFlags::empty(),
        };
        assert_eq!(op.to_string(), "op2: v5 = INT_ADD v0, v1");
        assert!(op.is_assignment());
        assert!(!op.is_call());
        assert_eq!(op.input(1), Some(ValueId::new(1)));
        assert_eq!(op.input(2), None);
    }

    #[test]
    fn test_flags() {
        let op = Operation {
            id: OpId::new(0),
            opcode: OpCode::Call,
            inputs: vec![ValueId::new(0)],
            output: None,
            block: BlockId::new(1),
            flags: OpFlags::DEAD | OpFlags::HOLD_OUTPUT,
        };
        assert!(op.is_dead());
        assert!(op.holds_output());
        assert!(op.is_call());
        assert_eq!(op.to_string(), "op0: CALL v0");
    }
}
