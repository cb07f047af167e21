//! Typed instructions and block terminators.
//!
//! The instruction vocabulary covers exactly what the analysis needs to
//! observe: constant loads, register moves, integer arithmetic, instance and
//! static field accesses, object allocation, and the three call shapes
//! (static, direct/constructor, virtual). Control flow is expressed only
//! through block terminators, so every [`Instr`] falls through to the next
//! instruction in its block.

use std::fmt;

use crate::ir::{BlockId, ClassId, FieldId, MethodId};

/// A virtual register (local slot) inside one method body.
///
/// Registers are method-local; the declared register count of a
/// [`MethodBody`](crate::ir::MethodBody) bounds the valid indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Reg(u16);

impl Reg {
    /// Creates a register from its slot index.
    #[must_use]
    pub const fn new(index: u16) -> Self {
        Self(index)
    }

    /// Returns the slot index of this register.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Comparison operator of a conditional branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum CmpKind {
    /// Equal
    #[strum(serialize = "eq")]
    Eq,
    /// Not equal
    #[strum(serialize = "ne")]
    Ne,
    /// Signed less-than
    #[strum(serialize = "lt")]
    Lt,
    /// Signed less-or-equal
    #[strum(serialize = "le")]
    Le,
    /// Signed greater-than
    #[strum(serialize = "gt")]
    Gt,
    /// Signed greater-or-equal
    #[strum(serialize = "ge")]
    Ge,
}

/// Binary integer operation kind.
///
/// Arithmetic wraps on overflow, matching the two's-complement semantics of
/// the modeled bytecode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum BinKind {
    /// Wrapping addition
    #[strum(serialize = "add")]
    Add,
    /// Wrapping subtraction
    #[strum(serialize = "sub")]
    Sub,
    /// Wrapping multiplication
    #[strum(serialize = "mul")]
    Mul,
}

/// A non-terminator instruction.
///
/// Instructions are replaced 1:1 by the rewriter, never inserted or removed,
/// which preserves block shape and instruction indices across a rewrite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instr {
    /// Load an integer literal into `dest`.
    Const {
        /// Destination register
        dest: Reg,
        /// The literal value
        value: i64,
    },

    /// Load the canonical cached boxed instance for a small integer.
    ///
    /// This is the identity-preserving constant-materialization form: the
    /// loaded reference is the same canonical instance the boxing factory
    /// would return for `value`, so reference-equality-observing code keeps
    /// its behavior after a rewrite.
    LoadCachedBox {
        /// Destination register
        dest: Reg,
        /// The boxed small-integer value (within the cache range)
        value: i64,
    },

    /// Copy `src` into `dest`.
    Move {
        /// Destination register
        dest: Reg,
        /// Source register
        src: Reg,
    },

    /// Binary integer operation `dest = lhs <op> rhs`.
    BinOp {
        /// Operation kind
        op: BinKind,
        /// Destination register
        dest: Reg,
        /// Left operand
        lhs: Reg,
        /// Right operand
        rhs: Reg,
    },

    /// Read an instance field: `dest = object.field`.
    IGet {
        /// Destination register
        dest: Reg,
        /// Receiver register
        object: Reg,
        /// The field being read
        field: FieldId,
    },

    /// Write an instance field: `object.field = src`.
    IPut {
        /// Source register
        src: Reg,
        /// Receiver register
        object: Reg,
        /// The field being written
        field: FieldId,
    },

    /// Read a static field: `dest = field`.
    SGet {
        /// Destination register
        dest: Reg,
        /// The static field being read
        field: FieldId,
    },

    /// Write a static field: `field = src`.
    SPut {
        /// Source register
        src: Reg,
        /// The static field being written
        field: FieldId,
    },

    /// Allocate a fresh, uninitialized instance of `class`.
    ///
    /// The allocation must be followed (on every path) by an [`Instr::InvokeDirect`]
    /// of one of the class constructors before the object is used.
    NewInstance {
        /// Destination register receiving the reference
        dest: Reg,
        /// The instantiated class
        class: ClassId,
    },

    /// Call a static method.
    InvokeStatic {
        /// Destination register for the return value, if consumed
        dest: Option<Reg>,
        /// The statically resolved callee
        method: MethodId,
        /// Argument registers, in declaration order
        args: Vec<Reg>,
    },

    /// Call a constructor (or other directly dispatched method) on `this`.
    InvokeDirect {
        /// The statically resolved callee
        method: MethodId,
        /// Receiver register
        this: Reg,
        /// Argument registers, in declaration order (excluding the receiver)
        args: Vec<Reg>,
    },

    /// Call a virtually dispatched method on `this`.
    ///
    /// Virtual callee bodies are never resolved by this core; the result is
    /// always unknown to the analysis.
    InvokeVirtual {
        /// Destination register for the return value, if consumed
        dest: Option<Reg>,
        /// The declared callee (dispatch target set is unknown)
        method: MethodId,
        /// Receiver register
        this: Reg,
        /// Argument registers, in declaration order (excluding the receiver)
        args: Vec<Reg>,
    },
}

impl Instr {
    /// Returns the register defined by this instruction, if any.
    #[must_use]
    pub fn dest(&self) -> Option<Reg> {
        match self {
            Self::Const { dest, .. }
            | Self::LoadCachedBox { dest, .. }
            | Self::Move { dest, .. }
            | Self::BinOp { dest, .. }
            | Self::IGet { dest, .. }
            | Self::SGet { dest, .. }
            | Self::NewInstance { dest, .. } => Some(*dest),
            Self::InvokeStatic { dest, .. } | Self::InvokeVirtual { dest, .. } => *dest,
            Self::IPut { .. } | Self::SPut { .. } | Self::InvokeDirect { .. } => None,
        }
    }

    /// Returns `true` if this instruction reads the given field.
    #[must_use]
    pub fn reads_field(&self, field: FieldId) -> bool {
        matches!(self, Self::IGet { field: f, .. } | Self::SGet { field: f, .. } if *f == field)
    }
}

impl fmt::Display for Instr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Const { dest, value } => write!(f, "const {dest}, #{value}"),
            Self::LoadCachedBox { dest, value } => write!(f, "const-cached-box {dest}, #{value}"),
            Self::Move { dest, src } => write!(f, "move {dest}, {src}"),
            Self::BinOp { op, dest, lhs, rhs } => write!(f, "{op} {dest}, {lhs}, {rhs}"),
            Self::IGet {
                dest,
                object,
                field,
            } => write!(f, "iget {dest}, {object}, {field}"),
            Self::IPut { src, object, field } => write!(f, "iput {src}, {object}, {field}"),
            Self::SGet { dest, field } => write!(f, "sget {dest}, {field}"),
            Self::SPut { src, field } => write!(f, "sput {src}, {field}"),
            Self::NewInstance { dest, class } => write!(f, "new-instance {dest}, {class}"),
            Self::InvokeStatic { dest, method, .. } => match dest {
                Some(dest) => write!(f, "invoke-static {dest}, {method}"),
                None => write!(f, "invoke-static {method}"),
            },
            Self::InvokeDirect { method, this, .. } => {
                write!(f, "invoke-direct {this}, {method}")
            }
            Self::InvokeVirtual {
                dest, method, this, ..
            } => match dest {
                Some(dest) => write!(f, "invoke-virtual {dest}, {this}, {method}"),
                None => write!(f, "invoke-virtual {this}, {method}"),
            },
        }
    }
}

/// The terminating instruction of a basic block.
///
/// Every basic block ends in exactly one terminator; fallthrough is expressed
/// as an explicit [`Terminator::Goto`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Terminator {
    /// Unconditional jump.
    Goto {
        /// Jump target
        target: BlockId,
    },

    /// Two-way conditional branch comparing `lhs` against `rhs`.
    Branch {
        /// Comparison operator
        cmp: CmpKind,
        /// Left operand
        lhs: Reg,
        /// Right operand
        rhs: Reg,
        /// Target when the comparison holds
        then_target: BlockId,
        /// Target when the comparison fails
        else_target: BlockId,
    },

    /// Return from the method, optionally yielding a value.
    Return {
        /// Returned register, or `None` for `void`
        value: Option<Reg>,
    },
}

impl Terminator {
    /// Returns all statically possible successor blocks of this terminator.
    #[must_use]
    pub fn successors(&self) -> Vec<BlockId> {
        match self {
            Self::Goto { target } => vec![*target],
            Self::Branch {
                then_target,
                else_target,
                ..
            } => vec![*then_target, *else_target],
            Self::Return { .. } => Vec::new(),
        }
    }
}

impl fmt::Display for Terminator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Goto { target } => write!(f, "goto {target}"),
            Self::Branch {
                cmp,
                lhs,
                rhs,
                then_target,
                else_target,
            } => write!(f, "if-{cmp} {lhs}, {rhs}, {then_target} else {else_target}"),
            Self::Return { value: Some(reg) } => write!(f, "return {reg}"),
            Self::Return { value: None } => write!(f, "return-void"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instr_dest() {
        let field = FieldId::new(0);
        assert_eq!(
            Instr::Const {
                dest: Reg::new(3),
                value: 7
            }
            .dest(),
            Some(Reg::new(3))
        );
        assert_eq!(
            Instr::IPut {
                src: Reg::new(1),
                object: Reg::new(0),
                field
            }
            .dest(),
            None
        );
        assert_eq!(
            Instr::InvokeStatic {
                dest: None,
                method: MethodId::new(0),
                args: vec![]
            }
            .dest(),
            None
        );
    }

    #[test]
    fn test_terminator_successors() {
        let ret = Terminator::Return { value: None };
        assert!(ret.successors().is_empty());

        let branch = Terminator::Branch {
            cmp: CmpKind::Lt,
            lhs: Reg::new(0),
            rhs: Reg::new(1),
            then_target: BlockId::new(1),
            else_target: BlockId::new(2),
        };
        assert_eq!(branch.successors(), vec![BlockId::new(1), BlockId::new(2)]);
    }

    #[test]
    fn test_display_formats() {
        let instr = Instr::Const {
            dest: Reg::new(2),
            value: 5,
        };
        assert_eq!(format!("{instr}"), "const v2, #5");

        let term = Terminator::Branch {
            cmp: CmpKind::Ge,
            lhs: Reg::new(0),
            rhs: Reg::new(1),
            then_target: BlockId::new(1),
            else_target: BlockId::new(2),
        };
        assert_eq!(format!("{term}"), "if-ge v0, v1, B1 else B2");
    }
}
