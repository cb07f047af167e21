//! Interprocedural constant analysis.
//!
//! This module houses the analysis half of the crate: the value lattice, the
//! global field-fact and method-summary tables, the reverse dependency
//! indices, the per-method abstract interpreter, and the fixed-point solver
//! that ties them together. The rewriter in [`crate::rewrite`] consumes the
//! converged [`Analysis`] it produces.
//!
//! # Architecture
//!
//! - [`lattice`] - the three-level abstract value lattice and constant kinds
//! - [`fields`] - path-insensitive per-field write classification
//! - [`callgraph`] - reverse call edges and field-reader sets
//! - [`interp`] - per-method abstract interpretation with call-site
//!   specialization
//! - [`solver`] - the round-based interprocedural worklist solver
//!
//! # Usage
//!
//! ```rust,ignore
//! use ipcp::analysis::Solver;
//!
//! let analysis = Solver::new(&program).solve()?;
//! for (field, fact) in analysis.facts.iter() {
//!     println!("{}: {fact}", program.qualified_field_name(field));
//! }
//! ```

pub mod callgraph;
pub mod fields;
pub mod interp;
pub mod lattice;
pub mod solver;

// Re-export primary types at module level
pub use callgraph::CallGraph;
pub use fields::{FieldFact, FieldTable};
pub use interp::{
    Interp, MethodOutcome, MethodSummary, RewriteKind, RewriteSite, Specializer, SummaryTable,
};
pub use lattice::{
    AbstractValue, ConstValue, JoinSemiLattice, INT_CACHE_MAX, INT_CACHE_MIN,
};
pub use solver::{Analysis, Solver, SolverConfig};

pub(crate) use interp::default_field_value;
