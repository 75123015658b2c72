//! P-code opcodes.
//!
//! The opcode set is closed, which lets rule pools dispatch through a dense
//! table indexed by [`OpCode::index`] instead of walking an open hierarchy.
//! The discriminants are contiguous and start at zero; [`OpCode::COUNT`]
//! (from [`strum::EnumCount`]) is the table size.
//!
//! # Operation Categories
//!
//! - **Data movement**: `Copy`, `Load`, `Store`
//! - **Control flow**: `Branch`, `CBranch`, `BranchInd`, `Call`, `CallInd`, `CallOther`, `Return`
//! - **Integer comparison**: `IntEqual` .. `IntLessEqual`
//! - **Integer arithmetic and bitwise**: `IntZext` .. `IntSRem`
//! - **Boolean**: `BoolNegate` .. `BoolOr`
//! - **Markers**: `MultiEqual` (phi), `Indirect`
//! - **Bit fields**: `Piece`, `Subpiece`, `PopCount`, `LzCount`, `Insert`, `Extract`

use std::fmt;

use strum::{EnumCount, EnumIter};

/// A p-code opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, EnumIter, EnumCount)]
pub enum OpCode {
    /// `out = in0`
    Copy,
    /// `out = *[space]in1`
    Load,
    /// `*[space]in1 = in2`
    Store,
    /// Unconditional branch to `in0`
    Branch,
    /// Branch to `in0` if `in1` is true
    CBranch,
    /// Indirect branch through `in0`
    BranchInd,
    /// Call to the fixed target `in0`, arguments follow
    Call,
    /// Call through the computed target `in0`, arguments follow
    CallInd,
    /// User-defined operation with side effects
    CallOther,
    /// Return; `in0` is the return address, `in1` (if present) the return value
    Return,
    /// `out = in0 == in1`
    IntEqual,
    /// `out = in0 != in1`
    IntNotEqual,
    /// `out = in0 s< in1`
    IntSLess,
    /// `out = in0 s<= in1`
    IntSLessEqual,
    /// `out = in0 < in1`
    IntLess,
    /// `out = in0 <= in1`
    IntLessEqual,
    /// Zero extension
    IntZext,
    /// Sign extension
    IntSext,
    /// `out = in0 + in1`
    IntAdd,
    /// `out = in0 - in1`
    IntSub,
    /// Unsigned carry of `in0 + in1`
    IntCarry,
    /// Signed carry of `in0 + in1`
    IntSCarry,
    /// Signed borrow of `in0 - in1`
    IntSBorrow,
    /// `out = -in0`
    Int2Comp,
    /// `out = ~in0`
    IntNegate,
    /// `out = in0 ^ in1`
    IntXor,
    /// `out = in0 & in1`
    IntAnd,
    /// `out = in0 | in1`
    IntOr,
    /// `out = in0 << in1`
    IntLeft,
    /// `out = in0 >> in1` (logical)
    IntRight,
    /// `out = in0 s>> in1` (arithmetic)
    IntSRight,
    /// `out = in0 * in1`
    IntMult,
    /// Unsigned division
    IntDiv,
    /// Signed division
    IntSDiv,
    /// Unsigned remainder
    IntRem,
    /// Signed remainder
    IntSRem,
    /// `out = !in0`
    BoolNegate,
    /// `out = in0 ^^ in1`
    BoolXor,
    /// `out = in0 && in1`
    BoolAnd,
    /// `out = in0 || in1`
    BoolOr,
    /// Integer to floating-point conversion
    FloatInt2Float,
    /// Phi node merging the inputs from each predecessor
    MultiEqual,
    /// `out` may be modified indirectly by the op referenced by `in1`
    Indirect,
    /// Concatenation: `in0` forms the most significant bytes
    Piece,
    /// Truncation: drop the `in1` least significant bytes of `in0`
    Subpiece,
    /// Number of one bits in `in0`
    PopCount,
    /// Number of leading zero bits in `in0`
    LzCount,
    /// Insert the low `in3` bits of `in1` into `in0` at bit position `in2`
    Insert,
    /// Extract `in2` bits of `in0` starting at bit position `in1`
    Extract,
}

impl OpCode {
    /// Returns the dense index of this opcode, suitable for table lookups.
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Returns the p-code mnemonic.
    #[must_use]
    pub const fn mnemonic(self) -> &'static str {
        match self {
            Self::Copy => "COPY",
            Self::Load => "LOAD",
            Self::Store => "STORE",
            Self::Branch => "BRANCH",
            Self::CBranch => "CBRANCH",
            Self::BranchInd => "BRANCHIND",
            Self::Call => "CALL",
            Self::CallInd => "CALLIND",
            Self::CallOther => "CALLOTHER",
            Self::Return => "RETURN",
            Self::IntEqual => "INT_EQUAL",
            Self::IntNotEqual => "INT_NOTEQUAL",
            Self::IntSLess => "INT_SLESS",
            Self::IntSLessEqual => "INT_SLESSEQUAL",
            Self::IntLess => "INT_LESS",
            Self::IntLessEqual => "INT_LESSEQUAL",
            Self::IntZext => "INT_ZEXT",
            Self::IntSext => "INT_SEXT",
            Self::IntAdd => "INT_ADD",
            Self::IntSub => "INT_SUB",
            Self::IntCarry => "INT_CARRY",
            Self::IntSCarry => "INT_SCARRY",
            Self::IntSBorrow => "INT_SBORROW",
            Self::Int2Comp => "INT_2COMP",
            Self::IntNegate => "INT_NEGATE",
            Self::IntXor => "INT_XOR",
            Self::IntAnd => "INT_AND",
            Self::IntOr => "INT_OR",
            Self::IntLeft => "INT_LEFT",
            Self::IntRight => "INT_RIGHT",
            Self::IntSRight => "INT_SRIGHT",
            Self::IntMult => "INT_MULT",
            Self::IntDiv => "INT_DIV",
            Self::IntSDiv => "INT_SDIV",
            Self::IntRem => "INT_REM",
            Self::IntSRem => "INT_SREM",
            Self::BoolNegate => "BOOL_NEGATE",
            Self::BoolXor => "BOOL_XOR",
            Self::BoolAnd => "BOOL_AND",
            Self::BoolOr => "BOOL_OR",
            Self::FloatInt2Float => "FLOAT_INT2FLOAT",
            Self::MultiEqual => "MULTIEQUAL",
            Self::Indirect => "INDIRECT",
            Self::Piece => "PIECE",
            Self::Subpiece => "SUBPIECE",
            Self::PopCount => "POPCOUNT",
            Self::LzCount => "LZCOUNT",
            Self::Insert => "INSERT",
            Self::Extract => "EXTRACT",
        }
    }

    /// Returns `true` for `Call` and `CallInd`.
    #[must_use]
    pub const fn is_call(self) -> bool {
        matches!(self, Self::Call | Self::CallInd)
    }

    /// Returns `true` for the branching opcodes.
    #[must_use]
    pub const fn is_branch(self) -> bool {
        matches!(self, Self::Branch | Self::CBranch | Self::BranchInd)
    }

    /// Returns `true` for operations that end a basic block.
    #[must_use]
    pub const fn is_flow_break(self) -> bool {
        matches!(
            self,
            Self::Branch | Self::CBranch | Self::BranchInd | Self::Return
        )
    }

    /// Returns `true` for the data-flow markers `MultiEqual` and `Indirect`.
    #[must_use]
    pub const fn is_marker(self) -> bool {
        matches!(self, Self::MultiEqual | Self::Indirect)
    }

    /// Returns `true` for integer comparisons.
    #[must_use]
    pub const fn is_comparison(self) -> bool {
        matches!(
            self,
            Self::IntEqual
                | Self::IntNotEqual
                | Self::IntSLess
                | Self::IntSLessEqual
                | Self::IntLess
                | Self::IntLessEqual
        )
    }

    /// Returns `true` if the output is always a single-bit boolean.
    #[must_use]
    pub const fn is_boolean_output(self) -> bool {
        matches!(
            self,
            Self::IntEqual
                | Self::IntNotEqual
                | Self::IntSLess
                | Self::IntSLessEqual
                | Self::IntLess
                | Self::IntLessEqual
                | Self::IntCarry
                | Self::IntSCarry
                | Self::IntSBorrow
                | Self::BoolNegate
                | Self::BoolXor
                | Self::BoolAnd
                | Self::BoolOr
        )
    }

    /// Returns `true` if `in0 op in1 == in1 op in0`.
    #[must_use]
    pub const fn is_commutative(self) -> bool {
        matches!(
            self,
            Self::IntAdd
                | Self::IntMult
                | Self::IntAnd
                | Self::IntOr
                | Self::IntXor
                | Self::IntEqual
                | Self::IntNotEqual
                | Self::BoolAnd
                | Self::BoolOr
                | Self::BoolXor
        )
    }

    /// Returns the comparison with the opposite truth value, if one exists.
    ///
    /// `!(a == b)` is `a != b`, `!(a < b)` is `b <= a` (the caller swaps inputs
    /// for the ordered comparisons, see the second tuple field).
    #[must_use]
    pub const fn negated_comparison(self) -> Option<(OpCode, bool)> {
        match self {
            Self::IntEqual => Some((Self::IntNotEqual, false)),
            Self::IntNotEqual => Some((Self::IntEqual, false)),
            Self::IntLess => Some((Self::IntLessEqual, true)),
            Self::IntLessEqual => Some((Self::IntLess, true)),
            Self::IntSLess => Some((Self::IntSLessEqual, true)),
            Self::IntSLessEqual => Some((Self::IntSLess, true)),
            _ => None,
        }
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}
