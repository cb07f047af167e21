// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![allow(dead_code)]
#![allow(clippy::too_many_arguments)]
#![deny(unsafe_code)]

//! # ipcp
//!
//! An interprocedural constant-propagation optimizer for register-based
//! object-oriented bytecode. `ipcp` proves which field reads and call results
//! always evaluate to a single constant across every execution of the
//! program, then rewrites those instructions into direct constant loads.
//!
//! ## Features
//!
//! - **Whole-program field classification** - one path-insensitive fact per
//!   field, folded over every write site in the program
//! - **Call-site specialization** - static callees are re-analyzed per
//!   constant argument tuple, resolving branching helpers like table lookups
//! - **Identity-preserving boxed constants** - reads of cached small-integer
//!   boxes are rewritten to load the canonical cached instance, so reference
//!   equality keeps its outcome
//! - **Shape-preserving rewrites** - every replacement is one instruction for
//!   one instruction; running the optimizer on its own output is a no-op
//! - **Parallel solver** - each round analyzes its worklist batch with rayon
//!   against immutable table snapshots
//!
//! ## Quick Start
//!
//! Add `ipcp` to your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! ipcp = "0.1"
//! ```
//!
//! ### Using the Prelude
//!
//! ```rust
//! use ipcp::prelude::*;
//!
//! let mut builder = ProgramBuilder::new();
//! let class = builder.add_class("Config");
//! let field = builder.add_field(class, "limit", ValueType::Int, FieldFlags::STATIC);
//! let clinit = builder.declare_method(
//!     class,
//!     "<clinit>",
//!     MethodFlags::STATIC | MethodFlags::CLASS_INIT,
//!     0,
//! );
//! let mut body = BodyBuilder::new(1, vec![]);
//! let b0 = body.block();
//! body.push(b0, Instr::Const { dest: Reg::new(0), value: 64 })
//!     .push(b0, Instr::SPut { src: Reg::new(0), field })
//!     .terminate(b0, Terminator::Return { value: None });
//! builder.set_body(clinit, body.finish()?);
//! let mut program = builder.finish()?;
//!
//! let report = ipcp::rewrite::optimize(&mut program)?;
//! assert_eq!(report.constant_field_count(), 1);
//! # Ok::<(), ipcp::Error>(())
//! ```
//!
//! ## Architecture
//!
//! `ipcp` is organized into three layers:
//!
//! - [`ir`] - the program model: symbol tables, method bodies, and the
//!   builders hosts use to assemble them
//! - [`analysis`] - the value lattice, global fact tables, and the
//!   interprocedural fixed-point solver
//! - [`rewrite`] - the final pass applying proven constants to the bodies,
//!   and the [`rewrite::OptimizationReport`] describing what changed
//!
//! ### Soundness
//!
//! All global state moves monotonically up a finite lattice, which bounds the
//! solver by lattice height. Both directions of failure are made loud rather
//! than silent: an entry observed moving down the lattice surfaces as
//! [`Error::Unsound`], and a worklist that outlives its defensive round cap
//! surfaces as [`Error::FixedPointOverrun`]. Unresolvable call and field
//! targets are not errors; the affected values degrade to unknown and the
//! analysis continues.

#[macro_use]
pub(crate) mod error;

pub mod analysis;
pub mod ir;
pub mod prelude;
pub mod rewrite;

/// The general result type used throughout this library.
pub type Result<T> = std::result::Result<T, Error>;
pub use error::Error;
