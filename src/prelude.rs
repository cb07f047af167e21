//! # ipcp Prelude
//!
//! This module provides a convenient prelude for the most commonly used types
//! from the ipcp library. Import this module to get quick access to the
//! essentials for building a program model, running the analysis, and
//! applying rewrites.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all ipcp operations
pub use crate::Error;

/// The result type used throughout ipcp
pub use crate::Result;

// ================================================================================================
// Program Model
// ================================================================================================

/// Builders hosts use to assemble the program model
pub use crate::ir::{BodyBuilder, ProgramBuilder};

/// Symbol tables and declarations
pub use crate::ir::{
    Class, ClassId, Field, FieldFlags, FieldId, Intrinsic, Method, MethodFlags, MethodId, Program,
    ValueType,
};

/// Method bodies, instructions, and control flow
pub use crate::ir::{
    BasicBlock, BinKind, BlockId, CmpKind, Instr, MethodBody, Reg, Terminator,
};

// ================================================================================================
// Analysis
// ================================================================================================

/// The abstract value lattice
pub use crate::analysis::{AbstractValue, ConstValue, JoinSemiLattice};

/// Global classification tables
pub use crate::analysis::{FieldFact, FieldTable, MethodSummary, SummaryTable};

/// The interprocedural solver and its converged output
pub use crate::analysis::{Analysis, Solver, SolverConfig};

// ================================================================================================
// Rewriting
// ================================================================================================

/// One-call analyze-and-rewrite entry points
pub use crate::rewrite::{optimize, optimize_with};

/// Reporting types describing an optimization run
pub use crate::rewrite::{FieldClassification, MethodRewrites, OptimizationReport};

/// Rewrite site metadata
pub use crate::analysis::{RewriteKind, RewriteSite};
