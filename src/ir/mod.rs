//! The whole-program model consumed by the analysis.
//!
//! This module is the structural interface between this core and the excluded
//! front end: an ordered control-flow graph of typed instructions per method
//! ([`MethodBody`]), plus a class/field/method symbol index ([`Program`]) with
//! declared static/final flags and class-initializer bodies.
//!
//! Bytecode parsing and writing live outside this crate; hosts construct the
//! model through [`ProgramBuilder`] and receive the rewritten model back with
//! qualifying instructions replaced in place.

mod body;
mod builder;
mod instruction;
mod program;

pub use body::{BasicBlock, BlockId, MethodBody};
pub use builder::{BodyBuilder, ProgramBuilder};
pub use instruction::{BinKind, CmpKind, Instr, Reg, Terminator};
pub use program::{
    Class, ClassId, Field, FieldFlags, FieldId, Intrinsic, Method, MethodFlags, MethodId, Program,
    ValueType,
};
