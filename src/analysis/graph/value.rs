//! Value nodes (varnodes) and storage spaces.
//!
//! A [`Value`] is a sized piece of storage at an offset inside a [`Space`]. Every
//! live value is exactly one of:
//!
//! - a **function input** (flagged [`ValueFlags::INPUT`], never written),
//! - a **constant** (in [`Space::Constant`], the offset is the value),
//! - a **written** value (defined by exactly one operation),
//! - a **free** value (detached, neither defined nor an input).
//!
//! Values are owned by their [`Function`](super::Function) and addressed through
//! dense [`ValueId`] handles, so per-analysis state can live in plain vectors
//! indexed by [`ValueId::index`].

use std::fmt;

use bitflags::bitflags;
use strum::{EnumCount, EnumIter};

use crate::{
    analysis::graph::OpId,
    utils::{calc_mask, sign_bit},
};

/// Storage class of a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, EnumIter, EnumCount)]
pub enum Space {
    /// Processor registers
    Register,
    /// The function's stack frame
    Stack,
    /// Main memory
    Ram,
    /// Temporaries introduced by instruction lifting
    Unique,
    /// Constants; the offset is the constant's value
    Constant,
    /// References from `Indirect` operations to the operation causing the effect
    Iop,
}

impl Space {
    /// Returns the dense index of this space.
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Returns the single-space [`SpaceSet`] for this space.
    #[must_use]
    pub const fn flag(self) -> SpaceSet {
        match self {
            Self::Register => SpaceSet::REGISTER,
            Self::Stack => SpaceSet::STACK,
            Self::Ram => SpaceSet::RAM,
            Self::Unique => SpaceSet::UNIQUE,
            Self::Constant => SpaceSet::CONSTANT,
            Self::Iop => SpaceSet::IOP,
        }
    }

    /// Returns the short name used when printing values.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Register => "register",
            Self::Stack => "stack",
            Self::Ram => "ram",
            Self::Unique => "unique",
            Self::Constant => "const",
            Self::Iop => "iop",
        }
    }
}

impl fmt::Display for Space {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

bitflags! {
    /// A set of storage spaces.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct SpaceSet: u8 {
        /// [`Space::Register`]
        const REGISTER = 0x01;
        /// [`Space::Stack`]
        const STACK = 0x02;
        /// [`Space::Ram`]
        const RAM = 0x04;
        /// [`Space::Unique`]
        const UNIQUE = 0x08;
        /// [`Space::Constant`]
        const CONSTANT = 0x10;
        /// [`Space::Iop`]
        const IOP = 0x20;
    }
}

impl SpaceSet {
    /// Returns `true` if `space` is a member of this set.
    #[must_use]
    pub const fn has(self, space: Space) -> bool {
        self.contains(space.flag())
    }
}

bitflags! {
    /// Persistent attributes of a value.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ValueFlags: u8 {
        /// The value is an input to the function.
        const INPUT = 0x01;
        /// Every bit of the value must be kept, regardless of its readers.
        const AUTO_LIVE = 0x02;
        /// Anchored live by the volatile-load guard.
        const AUTO_LIVE_HOLD = 0x04;
        /// The address of the storage is taken elsewhere.
        const ADDR_FORCE = 0x08;
        /// Written directly by an instruction rather than through a marker.
        const DIRECT_WRITE = 0x10;
    }
}

/// Handle to a [`Value`] inside its function.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValueId(u32);

impl ValueId {
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

impl fmt::Debug for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

impl fmt::Display for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// A value node.
#[derive(Debug, Clone)]
pub struct Value {
    pub(crate) id: ValueId,
    pub(crate) size: u32,
    pub(crate) space: Space,
    pub(crate) offset: u64,
    pub(crate) def: Option<OpId>,
    pub(crate) reads: Vec<OpId>,
    pub(crate) flags: ValueFlags,
    pub(crate) nz_mask: u64,
}

impl Value {
    pub(crate) fn new(id: ValueId, size: u32, space: Space, offset: u64) -> Self {
        let nz_mask = if space == Space::Constant {
            offset & calc_mask(size)
        } else {
            calc_mask(size)
        };
        Self {
            id,
            size,
            space,
            offset,
            def: None,
            reads: Vec::new(),
            flags: ValueFlags::empty(),
            nz_mask,
        }
    }

    /// Returns this value's handle.
    #[must_use]
    pub const fn id(&self) -> ValueId {
        self.id
    }

    /// Returns the size in bytes.
    #[must_use]
    pub const fn size(&self) -> u32 {
        self.size
    }

    /// Returns the storage space.
    #[must_use]
    pub const fn space(&self) -> Space {
        self.space
    }

    /// Returns the offset within the space. For constants this is the value.
    #[must_use]
    pub const fn offset(&self) -> u64 {
        self.offset
    }

    /// Returns the constant value, masked to the value's size.
    #[must_use]
    pub fn constant(&self) -> Option<u64> {
        self.is_constant().then(|| self.offset & calc_mask(self.size))
    }

    /// Returns the defining operation, if the value is written.
    #[must_use]
    pub const fn def(&self) -> Option<OpId> {
        self.def
    }

    /// Returns the operations reading this value, one entry per read slot.
    #[must_use]
    pub fn reads(&self) -> &[OpId] {
        &self.reads
    }

    /// Returns the value's flags.
    #[must_use]
    pub const fn flags(&self) -> ValueFlags {
        self.flags
    }

    /// Returns the known-nonzero bits: a bit clear here is zero on every execution.
    #[must_use]
    pub const fn nz_mask(&self) -> u64 {
        self.nz_mask
    }

    /// Returns the mask of all bits this value can hold.
    #[must_use]
    pub const fn full_mask(&self) -> u64 {
        calc_mask(self.size)
    }

    /// Returns the sign bit of this value (the top representable bit for wide values).
    #[must_use]
    pub const fn sign_bit(&self) -> u64 {
        sign_bit(self.size)
    }

    /// Returns `true` for constants.
    #[must_use]
    pub fn is_constant(&self) -> bool {
        self.space == Space::Constant
    }

    /// Returns `true` for function inputs.
    #[must_use]
    pub const fn is_input(&self) -> bool {
        self.flags.contains(ValueFlags::INPUT)
    }

    /// Returns `true` if an operation defines this value.
    #[must_use]
    pub const fn is_written(&self) -> bool {
        self.def.is_some()
    }

    /// Returns `true` if the value is neither written, an input nor a constant.
    #[must_use]
    pub fn is_free(&self) -> bool {
        self.def.is_none() && !self.is_input() && !self.is_constant()
    }

    /// Returns `true` if every bit must be kept regardless of readers.
    #[must_use]
    pub const fn is_auto_live(&self) -> bool {
        self.flags
            .intersects(ValueFlags::AUTO_LIVE.union(ValueFlags::AUTO_LIVE_HOLD))
    }

    /// Returns `true` if nothing reads this value.
    #[must_use]
    pub fn has_no_reads(&self) -> bool {
        self.reads.is_empty()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.constant() {
            Some(val) => write!(f, "{}#{val:#x}:{}", self.id, self.size),
            None => write!(
                f,
                "{}({}:{:#x}):{}",
                self.id, self.space, self.offset, self.size
            ),
        }
    }
}
