//! The abstract value lattice underlying all analyses.
//!
//! Values form a three-level join semi-lattice:
//!
//! - **Bottom (⊥)**: unreachable / no execution observed
//! - **Constant**: exactly one value observed on every path
//! - **Top (⊤)**: unknown / multiple values
//!
//! with `Bottom ⊑ Constant(v) ⊑ Top` for every `v`; two distinct constants
//! are incomparable and join to Top. The analyses only ever move values *up*
//! this lattice, which bounds every fixed-point iteration by the lattice
//! height (two steps per slot).
//!
//! # Constant kinds
//!
//! Primitive numeric constants compare by value. Cached-singleton constants
//! ([`ConstValue::CachedBox`]) denote the canonical pre-allocated boxed
//! instance for a small integer and compare by the identity of that cache
//! slot — two static fields both holding the cache entry for the same small
//! integer are the *same* constant and collapse together, even though they
//! are reached through different field reads.

use std::fmt;
use std::fmt::Debug;

use crate::ir::{BinKind, CmpKind};

/// Smallest integer covered by the canonical boxed-integer cache.
pub const INT_CACHE_MIN: i64 = -128;
/// Largest integer covered by the canonical boxed-integer cache.
pub const INT_CACHE_MAX: i64 = 127;

/// A join semi-lattice with a join (least upper bound) operation.
///
/// The join combines information from merging control-flow paths or analysis
/// contexts. It must satisfy:
///
/// - **Idempotent**: `x.join(x) = x`
/// - **Commutative**: `x.join(y) = y.join(x)`
/// - **Associative**: `x.join(y.join(z)) = (x.join(y)).join(z)`
///
/// A meet is not needed: the analysis is forward-only and facts only travel
/// upward.
pub trait JoinSemiLattice: Clone + Debug + PartialEq {
    /// Computes the join (least upper bound) of two lattice elements.
    #[must_use]
    fn join(&self, other: &Self) -> Self;

    /// Returns `true` if this is the top element (no information).
    fn is_top(&self) -> bool;
}

/// A compile-time constant value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConstValue {
    /// A primitive integer, compared by value.
    Int(i64),
    /// The canonical cached boxed instance for a small integer, compared by
    /// the logical identity of the cache slot it denotes. Only values inside
    /// [`INT_CACHE_MIN`]`..=`[`INT_CACHE_MAX`] have a cache slot.
    CachedBox(i64),
}

impl ConstValue {
    /// Returns the integer payload if this is a primitive constant.
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            Self::CachedBox(_) => None,
        }
    }

    /// Returns `true` if this constant carries an identity guarantee.
    #[must_use]
    pub fn is_cached_box(&self) -> bool {
        matches!(self, Self::CachedBox(_))
    }

    /// Evaluates a comparison between two constants, if defined.
    ///
    /// Ordering comparisons are defined on primitive integers only; equality
    /// comparisons additionally apply to cached boxes, where they test slot
    /// identity.
    #[must_use]
    pub fn compare(&self, cmp: CmpKind, other: &Self) -> Option<bool> {
        match (self, other) {
            (Self::Int(l), Self::Int(r)) => Some(match cmp {
                CmpKind::Eq => l == r,
                CmpKind::Ne => l != r,
                CmpKind::Lt => l < r,
                CmpKind::Le => l <= r,
                CmpKind::Gt => l > r,
                CmpKind::Ge => l >= r,
            }),
            (Self::CachedBox(l), Self::CachedBox(r)) => match cmp {
                CmpKind::Eq => Some(l == r),
                CmpKind::Ne => Some(l != r),
                _ => None,
            },
            _ => None,
        }
    }

    /// Evaluates a binary integer operation, if defined.
    ///
    /// Arithmetic wraps, matching the modeled bytecode semantics. Operations
    /// on boxed constants are undefined (the original program would unbox
    /// first, which this core does not model).
    #[must_use]
    pub fn apply(&self, op: BinKind, other: &Self) -> Option<Self> {
        let (Self::Int(l), Self::Int(r)) = (self, other) else {
            return None;
        };
        Some(Self::Int(match op {
            BinKind::Add => l.wrapping_add(*r),
            BinKind::Sub => l.wrapping_sub(*r),
            BinKind::Mul => l.wrapping_mul(*r),
        }))
    }

    /// Returns the cached-box constant for `value`, if it has a cache slot.
    #[must_use]
    pub fn boxed(value: i64) -> Option<Self> {
        (INT_CACHE_MIN..=INT_CACHE_MAX)
            .contains(&value)
            .then_some(Self::CachedBox(value))
    }
}

impl fmt::Display for ConstValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "#int {v}"),
            Self::CachedBox(v) => write!(f, "#boxed {v}"),
        }
    }
}

/// An element of the abstract value lattice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AbstractValue {
    /// Unreachable; no execution observed (bottom of the lattice).
    #[default]
    Bottom,
    /// Exactly one value on every observed path.
    Constant(ConstValue),
    /// Unknown; multiple possible values (top of the lattice).
    Top,
}

impl AbstractValue {
    /// Returns `true` if this is the bottom element.
    #[must_use]
    pub const fn is_bottom(&self) -> bool {
        matches!(self, Self::Bottom)
    }

    /// Returns `true` if this is a known constant.
    #[must_use]
    pub const fn is_constant(&self) -> bool {
        matches!(self, Self::Constant(_))
    }

    /// Returns the constant value if this is a constant.
    #[must_use]
    pub const fn as_constant(&self) -> Option<&ConstValue> {
        match self {
            Self::Constant(c) => Some(c),
            _ => None,
        }
    }

    /// Returns `true` if `self ⊑ other` in the lattice order.
    ///
    /// Used by the monotonicity guard: across solver rounds every stored
    /// value `v` must satisfy `v_old ⊑ v_new`.
    #[must_use]
    pub fn le(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Bottom, _) | (_, Self::Top) => true,
            (Self::Constant(a), Self::Constant(b)) => a == b,
            _ => false,
        }
    }
}

impl JoinSemiLattice for AbstractValue {
    fn join(&self, other: &Self) -> Self {
        match (self, other) {
            // Bottom is the identity for join
            (Self::Bottom, x) | (x, Self::Bottom) => *x,

            // Same constants stay constant
            (Self::Constant(a), Self::Constant(b)) if a == b => Self::Constant(*a),

            // Different constants or anything with Top yields Top
            _ => Self::Top,
        }
    }

    fn is_top(&self) -> bool {
        matches!(self, Self::Top)
    }
}

impl fmt::Display for AbstractValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bottom => write!(f, "⊥"),
            Self::Constant(c) => write!(f, "{c}"),
            Self::Top => write!(f, "⊤"),
        }
    }
}
