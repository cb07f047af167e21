//! Per-field classification of all writes in the program.
//!
//! The field-write aggregator maintains one global fact per declared field:
//! the join of every abstract value ever written to it, across constructors,
//! instance methods, and static initializers. Classification is deliberately
//! path-insensitive — only the *set of distinct values written* matters, not
//! which construction path wrote them. A field written `0` by one constructor
//! and `1` by another is [`FieldFact::Conflicting`] everywhere, even on a
//! path where a sharper value is locally evident. This trades precision for
//! one fact per field and a trivially sound argument.
//!
//! Facts only move toward [`FieldFact::Conflicting`] across solver rounds;
//! the table verifies this on every merge and reports an upward move as an
//! unsoundness defect.

use std::fmt;

use crate::{
    analysis::{AbstractValue, ConstValue},
    ir::{FieldId, Program},
    Result,
};

/// The global classification of one field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FieldFact {
    /// No write observed yet. Reads are treated as unknown until a write
    /// (or a default-value contribution) arrives.
    #[default]
    UnknownValue,
    /// Every observed write assigned this exact constant.
    KnownConstant(ConstValue),
    /// Writes disagree, or a non-constant value was written. Permanently
    /// excluded from rewriting.
    Conflicting,
}

impl FieldFact {
    /// Returns the constant if the field is provably single-valued.
    #[must_use]
    pub const fn constant(&self) -> Option<&ConstValue> {
        match self {
            Self::KnownConstant(c) => Some(c),
            _ => None,
        }
    }

    /// Returns `true` if the field is provably single-valued.
    #[must_use]
    pub const fn is_constant(&self) -> bool {
        matches!(self, Self::KnownConstant(_))
    }

    /// Folds one observed write into this fact.
    ///
    /// Writes of `Bottom` come from unreachable code and contribute nothing.
    #[must_use]
    pub fn with_write(self, value: &AbstractValue) -> Self {
        match (self, value) {
            (fact, AbstractValue::Bottom) => fact,
            (Self::Conflicting, _) | (_, AbstractValue::Top) => Self::Conflicting,
            (Self::UnknownValue, AbstractValue::Constant(v)) => Self::KnownConstant(*v),
            (Self::KnownConstant(old), AbstractValue::Constant(v)) => {
                if old == *v {
                    Self::KnownConstant(old)
                } else {
                    Self::Conflicting
                }
            }
        }
    }

    /// Returns `true` if `self ⊑ other` in the fact order
    /// (`UnknownValue ⊑ KnownConstant(v) ⊑ Conflicting`).
    #[must_use]
    pub fn le(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::UnknownValue, _) | (_, Self::Conflicting) => true,
            (Self::KnownConstant(a), Self::KnownConstant(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for FieldFact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownValue => write!(f, "unknown"),
            Self::KnownConstant(c) => write!(f, "constant {c}"),
            Self::Conflicting => write!(f, "conflicting"),
        }
    }
}

/// The global fact table, one [`FieldFact`] per declared field.
///
/// Mutated only by the solver's sequential merge phase; the parallel
/// per-method interpreter runs read an immutable snapshot.
#[derive(Debug, Clone)]
pub struct FieldTable {
    facts: Vec<FieldFact>,
}

impl FieldTable {
    /// Creates an empty table for a program's field count.
    #[must_use]
    pub fn new(program: &Program) -> Self {
        Self {
            facts: vec![FieldFact::UnknownValue; program.field_count()],
        }
    }

    /// Returns the current fact for a field.
    ///
    /// Out-of-range ids (an unresolvable target) read as `Conflicting`: the
    /// access is conservatively never rewritten.
    #[must_use]
    pub fn fact(&self, field: FieldId) -> FieldFact {
        self.facts
            .get(field.index())
            .copied()
            .unwrap_or(FieldFact::Conflicting)
    }

    /// Folds one observed write into a field's fact.
    ///
    /// Returns `true` if the fact changed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unsound`](crate::Error::Unsound) if the fold would
    /// move the fact against the lattice order — a logic defect, never a
    /// property of the input.
    pub fn record(&mut self, field: FieldId, value: &AbstractValue) -> Result<bool> {
        let Some(slot) = self.facts.get_mut(field.index()) else {
            return Ok(false);
        };
        let old = *slot;
        let new = old.with_write(value);
        if !old.le(&new) {
            return Err(unsound_error!(
                "field fact for {field} moved {old} -> {new}"
            ));
        }
        *slot = new;
        Ok(new != old)
    }

    /// Iterates over all facts with their field ids.
    pub fn iter(&self) -> impl Iterator<Item = (FieldId, FieldFact)> + '_ {
        self.facts
            .iter()
            .enumerate()
            .map(|(i, f)| (FieldId::new(u32::try_from(i).unwrap_or(u32::MAX)), *f))
    }
}
