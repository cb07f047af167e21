//! Constant rewriting over a converged analysis.
//!
//! The rewriter runs one final interpreter pass per method against the frozen
//! analysis tables, collecting every program point where a field read or a
//! specialized call provably yields one constant, then replaces each such
//! instruction in place:
//!
//! - a primitive constant becomes a [`Instr::Const`] load,
//! - a cached-singleton constant becomes [`Instr::LoadCachedBox`], loading
//!   the canonical cached instance so identity comparisons keep their
//!   outcome.
//!
//! Replacement is strictly one instruction for one instruction; block
//! boundaries, terminators, and register assignments are untouched, so
//! every pass preserves the control-flow shape. Running the optimizer a
//! second time on its own output finds nothing left to rewrite: constant
//! loads are never rewrite candidates.

use std::fmt;

use rayon::prelude::*;

use crate::{
    analysis::{
        Analysis, ConstValue, FieldFact, Interp, RewriteKind, RewriteSite, Solver, SolverConfig,
        Specializer,
    },
    ir::{FieldId, Instr, MethodId, Program},
    Error, Result,
};

/// Classification of one field in the report.
#[derive(Debug, Clone)]
pub struct FieldClassification {
    /// The classified field.
    pub field: FieldId,
    /// Qualified `Class.field` name.
    pub name: String,
    /// The converged fact.
    pub fact: FieldFact,
}

/// Rewrites applied to one method.
#[derive(Debug, Clone)]
pub struct MethodRewrites {
    /// The rewritten method.
    pub method: MethodId,
    /// Qualified `Class.method` name.
    pub name: String,
    /// The sites replaced, in block order.
    pub sites: Vec<RewriteSite>,
}

/// Summary of one optimization run: what was proven and what was replaced.
#[derive(Debug, Clone, Default)]
pub struct OptimizationReport {
    /// Per-field classifications, in field table order.
    pub fields: Vec<FieldClassification>,
    /// Per-method rewrites; methods with no rewrites are omitted.
    pub methods: Vec<MethodRewrites>,
}

impl OptimizationReport {
    /// Total number of instructions replaced.
    #[must_use]
    pub fn total_rewrites(&self) -> usize {
        self.methods.iter().map(|m| m.sites.len()).sum()
    }

    /// Number of fields proven single-valued.
    #[must_use]
    pub fn constant_field_count(&self) -> usize {
        self.fields.iter().filter(|f| f.fact.is_constant()).count()
    }

    /// Number of replaced sites of the given kind.
    #[must_use]
    pub fn rewrites_of_kind(&self, kind: RewriteKind) -> usize {
        self.methods
            .iter()
            .flat_map(|m| &m.sites)
            .filter(|s| s.kind == kind)
            .count()
    }

    /// The rewrites applied to one method, if any.
    #[must_use]
    pub fn rewrites_for(&self, method: MethodId) -> Option<&MethodRewrites> {
        self.methods.iter().find(|m| m.method == method)
    }
}

impl fmt::Display for OptimizationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} constant fields, {} rewrites",
            self.constant_field_count(),
            self.total_rewrites()
        )?;
        for field in &self.fields {
            writeln!(f, "  {}: {}", field.name, field.fact)?;
        }
        for method in &self.methods {
            writeln!(f, "  {}: {} rewrites", method.name, method.sites.len())?;
            for site in &method.sites {
                writeln!(
                    f,
                    "    {}[{}] {} -> {}",
                    site.block, site.instr, site.kind, site.value
                )?;
            }
        }
        Ok(())
    }
}

/// Analyzes and rewrites a program with default configuration.
///
/// # Errors
///
/// Propagates any analysis error; the program is not modified if the
/// analysis fails.
pub fn optimize(program: &mut Program) -> Result<OptimizationReport> {
    optimize_with(program, SolverConfig::default())
}

/// Analyzes and rewrites a program with explicit configuration.
///
/// # Errors
///
/// Propagates any analysis error; the program is not modified if the
/// analysis fails.
pub fn optimize_with(program: &mut Program, config: SolverConfig) -> Result<OptimizationReport> {
    let analysis = Solver::with_config(program, config).solve()?;
    apply(program, &analysis)
}

/// Applies a converged analysis to a program.
///
/// Collects rewrite sites for all methods in parallel against the frozen
/// tables, then mutates the bodies sequentially.
///
/// # Errors
///
/// Returns a resolution error for stale ids in the program model.
pub fn apply(program: &mut Program, analysis: &Analysis) -> Result<OptimizationReport> {
    let specializer = Specializer::new(
        analysis.config.specialize_max_blocks,
        analysis.config.specialize_max_depth,
    );
    let interp = Interp::new(
        program,
        &analysis.facts,
        &analysis.summaries,
        &specializer,
        true,
    );

    let targets: Vec<MethodId> = program
        .methods()
        .filter_map(|(id, m)| m.body.is_some().then_some(id))
        .collect();
    let collected: Vec<(MethodId, Vec<RewriteSite>)> = targets
        .par_iter()
        .map(|&method| {
            interp
                .analyze(method)
                .map(|outcome| (method, outcome.rewrites))
        })
        .collect::<Result<_>>()?;

    let mut methods = Vec::new();
    for (method_id, sites) in collected {
        if sites.is_empty() {
            continue;
        }
        let name = program.qualified_method_name(method_id);
        let method = program.method_mut(method_id)?;
        let Some(body) = method.body.as_mut() else {
            continue;
        };
        for site in &sites {
            let block = body
                .block_mut(site.block)
                .ok_or_else(|| Error::InvalidCfg(format!("{name}: no block {}", site.block)))?;
            let slot = block.instrs_mut().get_mut(site.instr).ok_or_else(|| {
                Error::InvalidCfg(format!("{name}: no instruction {}[{}]", site.block, site.instr))
            })?;
            *slot = match site.value {
                ConstValue::Int(value) => Instr::Const {
                    dest: site.dest,
                    value,
                },
                ConstValue::CachedBox(value) => Instr::LoadCachedBox {
                    dest: site.dest,
                    value,
                },
            };
        }
        methods.push(MethodRewrites {
            method: method_id,
            name,
            sites,
        });
    }

    let fields = analysis
        .facts
        .iter()
        .map(|(field, fact)| FieldClassification {
            field,
            name: program.qualified_field_name(field),
            fact,
        })
        .collect();

    Ok(OptimizationReport { fields, methods })
}
