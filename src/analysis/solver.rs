//! The interprocedural fixed-point solver.
//!
//! The solver drives the per-method interpreter to a whole-program fixed
//! point over two global tables: field facts ([`FieldTable`]) and method
//! summaries ([`SummaryTable`]). Rounds alternate between a parallel analysis
//! phase and a sequential merge phase:
//!
//! 1. Drain the worklist into a batch and snapshot both tables.
//! 2. Analyze every batched method in parallel against the immutable
//!    snapshots, sharing one specialization memo for the round.
//! 3. Merge the outcomes sequentially: fold field writes (plus default-value
//!    contributions for every field a constructor or class initializer does
//!    not definitely assign) into the fact table and replace method
//!    summaries, re-enqueueing dependents of anything that changed.
//!
//! Re-enqueue policy: a changed summary re-enqueues the method's direct
//! callers; a changed field fact re-enqueues the field's readers *and* their
//! transitive callers, because a caller may have folded a specialized callee
//! that read the field.
//!
//! Termination is guaranteed by lattice height (every table slot can rise at
//! most twice), but a defensive round cap converts a latent re-enqueue bug
//! into [`Error::FixedPointOverrun`](crate::Error::FixedPointOverrun) instead
//! of a hang.

use std::collections::VecDeque;

use rayon::prelude::*;

use crate::{
    analysis::{
        default_field_value, AbstractValue, CallGraph, FieldTable, Interp, MethodOutcome,
        Specializer, SummaryTable,
    },
    ir::{FieldId, MethodId, Program},
    Error, Result,
};

/// Tuning knobs for the solver.
#[derive(Debug, Clone, Copy)]
pub struct SolverConfig {
    /// Hard cap on solver rounds; `None` derives a cap from program size.
    pub max_rounds: Option<usize>,
    /// Largest callee (in basic blocks) eligible for call-site
    /// specialization.
    pub specialize_max_blocks: usize,
    /// Deepest chain of nested specializations.
    pub specialize_max_depth: usize,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            max_rounds: None,
            specialize_max_blocks: 32,
            specialize_max_depth: 8,
        }
    }
}

/// The converged analysis state, consumed by the rewriter.
#[derive(Debug, Clone)]
pub struct Analysis {
    /// Final per-field classifications.
    pub facts: FieldTable,
    /// Final per-method summaries.
    pub summaries: SummaryTable,
    /// The configuration the tables were computed under; the rewriter's
    /// final pass must specialize with the same bounds.
    pub config: SolverConfig,
}

/// Runs the interprocedural analysis over one program.
pub struct Solver<'a> {
    program: &'a Program,
    config: SolverConfig,
}

impl<'a> Solver<'a> {
    /// Creates a solver with default configuration.
    #[must_use]
    pub fn new(program: &'a Program) -> Self {
        Self::with_config(program, SolverConfig::default())
    }

    /// Creates a solver with explicit configuration.
    #[must_use]
    pub fn with_config(program: &'a Program, config: SolverConfig) -> Self {
        Self { program, config }
    }

    /// Iterates to the global fixed point.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FixedPointOverrun`] if the worklist does not drain
    /// within the round cap, [`Error::Unsound`](crate::Error::Unsound) if a
    /// table entry moves against the lattice order, or a resolution error for
    /// stale ids in the program model.
    pub fn solve(&self) -> Result<Analysis> {
        let program = self.program;
        let graph = CallGraph::build(program);
        let mut facts = FieldTable::new(program);
        let mut summaries = SummaryTable::default();

        let method_count = program.methods().count();
        let mut worklist: VecDeque<MethodId> = VecDeque::new();
        let mut in_worklist = vec![false; method_count];
        let enqueue = |worklist: &mut VecDeque<MethodId>,
                           in_worklist: &mut Vec<bool>,
                           method: MethodId| {
            if let Some(flag) = in_worklist.get_mut(method.index()) {
                if !*flag {
                    *flag = true;
                    worklist.push_back(method);
                }
            }
        };

        for (id, method) in program.methods() {
            if method.body.is_some() {
                enqueue(&mut worklist, &mut in_worklist, id);
            }
        }

        // Static fields of classes without an initializer keep their default
        // values from the moment the class is prepared.
        for (class_id, class) in program.classes() {
            if program.class_init_of(class_id)?.is_some() {
                continue;
            }
            for field_id in &class.fields {
                let field = program.field(*field_id)?;
                if field.is_static() {
                    facts.record(*field_id, &default_field_value(field.ty))?;
                }
            }
        }

        let max_rounds = self
            .config
            .max_rounds
            .unwrap_or(4 * method_count.max(1) + 16);
        let mut rounds = 0usize;

        while !worklist.is_empty() {
            rounds += 1;
            if rounds > max_rounds {
                return Err(Error::FixedPointOverrun {
                    rounds: max_rounds,
                    pending: worklist
                        .iter()
                        .map(|m| program.qualified_method_name(*m))
                        .collect(),
                });
            }

            let batch: Vec<MethodId> = worklist.drain(..).collect();
            for method in &batch {
                in_worklist[method.index()] = false;
            }

            let facts_snapshot = facts.clone();
            let summaries_snapshot = summaries.clone();
            let specializer = Specializer::new(
                self.config.specialize_max_blocks,
                self.config.specialize_max_depth,
            );
            let interp = Interp::new(
                program,
                &facts_snapshot,
                &summaries_snapshot,
                &specializer,
                false,
            );

            let outcomes: Vec<(MethodId, MethodOutcome)> = batch
                .par_iter()
                .map(|&method| interp.analyze(method).map(|outcome| (method, outcome)))
                .collect::<Result<_>>()?;

            for (method_id, outcome) in outcomes {
                let method = program.method(method_id)?;

                let mut contributions: Vec<(FieldId, AbstractValue)> = outcome
                    .summary
                    .field_writes
                    .iter()
                    .map(|(f, v)| (*f, *v))
                    .collect();

                // A constructor that can leave a field of its own class
                // unwritten on some path still produces an object where that
                // field holds the default value; a class initializer likewise
                // for statics. Only a definite write on every path rules the
                // default out — a may-write does not.
                if method.is_constructor() || method.is_class_init() {
                    let class = program.class(method.class)?;
                    for field_id in &class.fields {
                        let field = program.field(*field_id)?;
                        if field.is_static() != method.is_class_init() {
                            continue;
                        }
                        if !outcome.summary.definite_writes.contains(field_id) {
                            contributions.push((*field_id, default_field_value(field.ty)));
                        }
                    }
                }

                for (field_id, value) in contributions {
                    if facts.record(field_id, &value)? {
                        for reader in graph.readers_of(field_id) {
                            for dependent in graph.with_transitive_callers(reader) {
                                if program.method(dependent)?.body.is_some() {
                                    enqueue(&mut worklist, &mut in_worklist, dependent);
                                }
                            }
                        }
                    }
                }

                if summaries.merge(method_id, outcome.summary)? {
                    for caller in graph.callers_of(method_id) {
                        if program.method(caller)?.body.is_some() {
                            enqueue(&mut worklist, &mut in_worklist, caller);
                        }
                    }
                }
            }
        }

        Ok(Analysis {
            facts,
            summaries,
            config: self.config,
        })
    }
}
