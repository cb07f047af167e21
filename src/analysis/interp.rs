//! Per-method abstract interpretation.
//!
//! The interpreter runs a forward dataflow over one method's CFG with a
//! register-state lattice, iterating block states to a local fixed point.
//! It produces a [`MethodSummary`] (joined return value plus per-field write
//! values) and, when requested, the program points where a load or call
//! result can be replaced by a constant. Rewrite sites are only emitted from
//! the converged block states, never from intermediate worklist visits: a
//! value that looks constant early in the iteration may still rise once a
//! back edge feeds the block a second state.
//!
//! # Optimistic evaluation
//!
//! Evaluation starts optimistic and only moves up the lattice:
//!
//! - a field whose fact is still [`FieldFact::UnknownValue`] reads as Bottom
//!   (no evidence of any value yet),
//! - a callee without a merged summary returns Bottom,
//! - a branch whose condition is still Bottom propagates to *no* successor —
//!   the block's outcome is pending, exactly as in SCCP.
//!
//! The interprocedural solver re-runs the interpreter whenever one of these
//! inputs rises, so all intermediate optimism is washed out at the global
//! fixed point. Within a single run the analysis is *not* path-sensitive: a
//! conditional branch never narrows its operands on either arm; only a fully
//! constant condition prunes an edge.
//!
//! # Call-site specialization
//!
//! A static call whose arguments are all constant is re-analyzed per distinct
//! argument tuple (bounded by [`SolverConfig`](crate::analysis::SolverConfig))
//! instead of using the context-insensitive summary. This is what resolves a
//! branching callee like `get_item(2)` to the literal its constant argument
//! selects. Constructor calls are specialized the same way to recover the
//! values a particular construction writes into final instance fields.

use std::collections::{HashMap, HashSet, VecDeque};

use dashmap::DashMap;

use crate::{
    analysis::{AbstractValue, ConstValue, FieldFact, FieldTable, JoinSemiLattice},
    ir::{
        BlockId, ClassId, FieldId, Instr, Intrinsic, MethodBody, MethodId, Program, Reg,
        Terminator, ValueType,
    },
    Result,
};

/// The interprocedural facts one method exposes to its callers.
///
/// Recomputed on every worklist pass; the solver replaces the stored summary
/// after verifying the new one is not below the old one in the lattice order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MethodSummary {
    /// Join of all values returned on reachable paths; Bottom if the method
    /// never returns a value.
    pub return_value: AbstractValue,
    /// For every field this method may write, the join of all written values.
    pub field_writes: HashMap<FieldId, AbstractValue>,
    /// Fields this method assigns on every reachable path from entry to
    /// every return. A `field_writes` entry alone says "may write"; only
    /// membership here says "definitely writes", which is what decides
    /// whether a constructor or class initializer leaves the default value
    /// observable.
    pub definite_writes: HashSet<FieldId>,
}

impl MethodSummary {
    /// Returns `true` if this method provably writes no fields.
    #[must_use]
    pub fn is_pure(&self) -> bool {
        self.field_writes.is_empty()
    }

    /// Returns `true` if `self ⊑ other` pointwise.
    ///
    /// Definite writes order inversely: as reachability grows across solver
    /// rounds the definitely-assigned set can only shrink.
    #[must_use]
    pub fn le(&self, other: &Self) -> bool {
        self.return_value.le(&other.return_value)
            && self.field_writes.iter().all(|(field, value)| {
                value.le(other.field_writes.get(field).unwrap_or(&AbstractValue::Bottom))
            })
            && other.definite_writes.is_subset(&self.definite_writes)
    }

    fn add_field_write(&mut self, field: FieldId, value: AbstractValue) {
        let slot = self.field_writes.entry(field).or_default();
        *slot = slot.join(&value);
    }
}

/// The global method-summary table.
#[derive(Debug, Clone, Default)]
pub struct SummaryTable {
    map: HashMap<MethodId, MethodSummary>,
}

impl SummaryTable {
    /// Returns the current summary for a method, if one has been merged.
    #[must_use]
    pub fn get(&self, method: MethodId) -> Option<&MethodSummary> {
        self.map.get(&method)
    }

    /// Replaces a method's summary after a re-analysis.
    ///
    /// Returns `true` if the stored summary changed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unsound`](crate::Error::Unsound) if the new summary
    /// is below the old one — summaries may only rise across solver rounds.
    pub fn merge(&mut self, method: MethodId, new: MethodSummary) -> Result<bool> {
        match self.map.get_mut(&method) {
            Some(old) => {
                if !old.le(&new) {
                    return Err(unsound_error!("summary for {method} moved down the lattice"));
                }
                let changed = *old != new;
                *old = new;
                Ok(changed)
            }
            None => {
                self.map.insert(method, new);
                Ok(true)
            }
        }
    }

    /// Iterates over all merged summaries.
    pub fn iter(&self) -> impl Iterator<Item = (MethodId, &MethodSummary)> {
        self.map.iter().map(|(m, s)| (*m, s))
    }
}

/// What kind of access a rewrite site replaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum RewriteKind {
    /// An instance-field read (`iget`).
    #[strum(serialize = "instance-read")]
    InstanceRead,
    /// A static-field read (`sget`).
    #[strum(serialize = "static-read")]
    StaticRead,
    /// A specialized static call with a constant result and no side effects.
    #[strum(serialize = "call-result")]
    CallResult,
}

/// One program point where an access can be replaced by a constant load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteSite {
    /// Block containing the instruction.
    pub block: BlockId,
    /// Instruction index within the block.
    pub instr: usize,
    /// Destination register of the replaced instruction.
    pub dest: Reg,
    /// The proven constant value.
    pub value: ConstValue,
    /// The kind of access being replaced.
    pub kind: RewriteKind,
}

/// Result of interpreting one method in one context.
#[derive(Debug, Clone)]
pub struct MethodOutcome {
    /// The method's interprocedural summary in this context.
    pub summary: MethodSummary,
    /// Rewrite candidates; empty unless collection was requested.
    pub rewrites: Vec<RewriteSite>,
}

/// Bounded, memoized call-site specialization.
///
/// The memo table is shared across the parallel per-method runs of one solver
/// round and discarded when the round's snapshot expires — a specialized
/// result depends on the snapshot tables, so it must never outlive them.
#[derive(Debug)]
pub struct Specializer {
    cache: DashMap<(MethodId, Vec<AbstractValue>), MethodSummary>,
    max_blocks: usize,
    max_depth: usize,
}

impl Specializer {
    /// Creates a specializer with the given bounds.
    #[must_use]
    pub fn new(max_blocks: usize, max_depth: usize) -> Self {
        Self {
            cache: DashMap::new(),
            max_blocks,
            max_depth,
        }
    }
}

/// A register holds either a plain abstract value or a reference to an
/// object allocated in this method (tracked by allocation site).
#[derive(Debug, Clone, Copy, PartialEq)]
enum RegValue {
    Value(AbstractValue),
    Object(AllocSite),
}

impl RegValue {
    /// Flattens to the value lattice; object references are not constants.
    fn as_abstract(self) -> AbstractValue {
        match self {
            Self::Value(v) => v,
            Self::Object(_) => AbstractValue::Top,
        }
    }

    fn join(self, other: Self) -> Self {
        match (self, other) {
            (Self::Value(a), Self::Value(b)) => Self::Value(a.join(&b)),
            (Self::Object(a), Self::Object(b)) if a == b => Self::Object(a),
            // An object reference merging with an unreachable value survives.
            (Self::Object(a), Self::Value(AbstractValue::Bottom))
            | (Self::Value(AbstractValue::Bottom), Self::Object(a)) => Self::Object(a),
            _ => Self::Value(AbstractValue::Top),
        }
    }
}

/// Allocation site of a `new-instance` within one method body.
type AllocSite = (BlockId, usize);

/// Final-field values of an object constructed in this method.
///
/// Only final instance fields are tracked: they cannot be reassigned after
/// construction, so the constructor's writes stay valid for the object's
/// whole lifetime, even across virtual calls on it. Non-final fields always
/// go through the global field facts.
#[derive(Debug, Clone)]
struct ObjectState {
    class: ClassId,
    fields: HashMap<FieldId, AbstractValue>,
}

#[derive(Debug, Clone, PartialEq)]
struct Env {
    regs: Vec<RegValue>,
}

impl Env {
    fn join_from(&mut self, other: &Env) -> bool {
        let mut changed = false;
        for (slot, incoming) in self.regs.iter_mut().zip(&other.regs) {
            let joined = slot.join(*incoming);
            if joined != *slot {
                *slot = joined;
                changed = true;
            }
        }
        changed
    }
}

/// The per-method abstract interpreter.
///
/// Holds read-only snapshots of the global tables; safe to share across the
/// parallel per-method runs of one solver round.
pub struct Interp<'a> {
    program: &'a Program,
    facts: &'a FieldTable,
    summaries: &'a SummaryTable,
    specializer: &'a Specializer,
    collect_rewrites: bool,
}

impl<'a> Interp<'a> {
    /// Creates an interpreter over snapshot tables.
    #[must_use]
    pub fn new(
        program: &'a Program,
        facts: &'a FieldTable,
        summaries: &'a SummaryTable,
        specializer: &'a Specializer,
        collect_rewrites: bool,
    ) -> Self {
        Self {
            program,
            facts,
            summaries,
            specializer,
            collect_rewrites,
        }
    }

    /// Analyzes a method in the context-insensitive (all-unknown-arguments)
    /// context.
    ///
    /// # Errors
    ///
    /// Returns an error for unresolvable symbol ids or if the local fixed
    /// point fails to converge within its step bound.
    pub fn analyze(&self, method: MethodId) -> Result<MethodOutcome> {
        let param_count = self.program.method(method)?.param_count as usize;
        let args = vec![AbstractValue::Top; param_count];
        self.analyze_with(method, &args, 0, self.collect_rewrites)
    }

    /// Analyzes a method with the given argument context.
    fn analyze_with(
        &self,
        id: MethodId,
        args: &[AbstractValue],
        depth: usize,
        collect: bool,
    ) -> Result<MethodOutcome> {
        let method = self.program.method(id)?;

        if let Some(intrinsic) = method.intrinsic {
            return Ok(MethodOutcome {
                summary: Self::intrinsic_summary(intrinsic, args),
                rewrites: Vec::new(),
            });
        }
        let Some(body) = &method.body else {
            // External target: recovered as unknown, analysis continues.
            return Ok(MethodOutcome {
                summary: MethodSummary {
                    return_value: AbstractValue::Top,
                    ..MethodSummary::default()
                },
                rewrites: Vec::new(),
            });
        };

        let block_count = body.block_count();
        let mut in_states: Vec<Option<Env>> = vec![None; block_count];
        let mut objects: HashMap<AllocSite, ObjectState> = HashMap::new();
        let mut summary = MethodSummary::default();

        let mut entry_env = Env {
            regs: vec![RegValue::Value(AbstractValue::Top); body.reg_count() as usize],
        };
        for (i, reg) in body.param_regs().iter().enumerate() {
            entry_env.regs[reg.index()] =
                RegValue::Value(args.get(i).copied().unwrap_or(AbstractValue::Top));
        }
        in_states[body.entry().index()] = Some(entry_env);

        let mut worklist: VecDeque<BlockId> = VecDeque::new();
        let mut in_worklist = vec![false; block_count];
        worklist.push_back(body.entry());
        in_worklist[body.entry().index()] = true;

        // Each block can be reprocessed at most once per lattice step of each
        // register it reads; anything past this bound is a convergence bug.
        let max_steps = block_count * (body.reg_count() as usize + 2) * 4 + 64;
        let mut steps = 0usize;

        while let Some(block_id) = worklist.pop_front() {
            in_worklist[block_id.index()] = false;
            steps += 1;
            if steps > max_steps {
                return Err(unsound_error!(
                    "local fixed point did not converge for {}",
                    self.program.qualified_method_name(id)
                ));
            }

            let Some(block) = body.block(block_id) else {
                continue;
            };
            let Some(mut env) = in_states[block_id.index()].clone() else {
                continue;
            };

            for (instr_idx, instr) in block.instrs().iter().enumerate() {
                self.transfer(
                    &mut env,
                    &mut objects,
                    &mut summary,
                    &mut Vec::new(),
                    block_id,
                    instr_idx,
                    instr,
                    depth,
                    false,
                )?;
            }

            for target in Self::reachable_successors(block.terminator(), &env) {
                let changed = match &mut in_states[target.index()] {
                    Some(existing) => existing.join_from(&env),
                    slot @ None => {
                        *slot = Some(env.clone());
                        true
                    }
                };
                if changed && !in_worklist[target.index()] {
                    worklist.push_back(target);
                    in_worklist[target.index()] = true;
                }
            }

            if let Terminator::Return { value: Some(reg) } = block.terminator() {
                let returned = env.regs[reg.index()].as_abstract();
                summary.return_value = summary.return_value.join(&returned);
            }
        }

        summary.definite_writes = Self::definite_field_writes(body, &in_states);

        // Emission pass over the converged states. Each reachable block is
        // replayed exactly once, so every (block, instruction) pair yields at
        // most one site and the recorded values are the fixed-point values.
        // Replaying the transfer only re-joins results already present in
        // `summary` and `objects`; joins are idempotent.
        let mut rewrites = Vec::new();
        if collect {
            for (block_id, block) in body.iter_blocks() {
                let Some(mut env) = in_states[block_id.index()].clone() else {
                    continue;
                };
                for (instr_idx, instr) in block.instrs().iter().enumerate() {
                    self.transfer(
                        &mut env,
                        &mut objects,
                        &mut summary,
                        &mut rewrites,
                        block_id,
                        instr_idx,
                        instr,
                        depth,
                        true,
                    )?;
                }
            }
        }

        Ok(MethodOutcome { summary, rewrites })
    }

    /// Computes the fields assigned on every reachable path from entry to
    /// every reachable return: a forward must-analysis (intersection at
    /// joins) over the blocks the value analysis found reachable.
    ///
    /// Instance stores count only when the stored-to register is the
    /// receiver parameter and that register is never reassigned; a store
    /// through any other reference says nothing about the object under
    /// construction.
    fn definite_field_writes(body: &MethodBody, in_states: &[Option<Env>]) -> HashSet<FieldId> {
        let reachable =
            |id: BlockId| in_states.get(id.index()).is_some_and(Option::is_some);
        let receiver = body.param_regs().first().copied();
        let receiver_stable = receiver.is_some_and(|r| {
            body.iter_blocks()
                .all(|(_, block)| block.instrs().iter().all(|i| i.dest() != Some(r)))
        });

        let must_writes = |id: BlockId| -> HashSet<FieldId> {
            let mut writes = HashSet::new();
            let Some(block) = body.block(id) else {
                return writes;
            };
            for instr in block.instrs() {
                match instr {
                    Instr::SPut { field, .. } => {
                        writes.insert(*field);
                    }
                    Instr::IPut { object, field, .. } => {
                        if receiver_stable && Some(*object) == receiver {
                            writes.insert(*field);
                        }
                    }
                    _ => {}
                }
            }
            writes
        };

        let preds = body.predecessors();
        let order: Vec<BlockId> = body
            .reverse_postorder()
            .into_iter()
            .filter(|id| reachable(*id))
            .collect();

        // `None` is the must-analysis top (every field assigned); sets only
        // shrink from there, so iteration to equality terminates.
        let mut outs: Vec<Option<HashSet<FieldId>>> = vec![None; body.block_count()];
        loop {
            let mut changed = false;
            for &id in &order {
                let assigned_on_entry: Option<HashSet<FieldId>> = if id == body.entry() {
                    Some(HashSet::new())
                } else {
                    let mut acc: Option<HashSet<FieldId>> = None;
                    for pred in preds[id.index()].iter().filter(|p| reachable(**p)) {
                        if let Some(out) = &outs[pred.index()] {
                            acc = Some(match acc {
                                None => out.clone(),
                                Some(prev) => prev.intersection(out).copied().collect(),
                            });
                        }
                    }
                    acc
                };
                let new_out = assigned_on_entry.map(|mut set| {
                    set.extend(must_writes(id));
                    set
                });
                if new_out != outs[id.index()] {
                    outs[id.index()] = new_out;
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }

        let mut definite: Option<HashSet<FieldId>> = None;
        for &id in &order {
            let Some(block) = body.block(id) else {
                continue;
            };
            if !matches!(block.terminator(), Terminator::Return { .. }) {
                continue;
            }
            if let Some(out) = &outs[id.index()] {
                definite = Some(match definite {
                    None => out.clone(),
                    Some(prev) => prev.intersection(out).copied().collect(),
                });
            }
        }
        definite.unwrap_or_default()
    }

    /// Evaluates an intrinsic in the given argument context.
    fn intrinsic_summary(intrinsic: Intrinsic, args: &[AbstractValue]) -> MethodSummary {
        let return_value = match intrinsic {
            Intrinsic::BoxInt => match args.first() {
                Some(AbstractValue::Constant(ConstValue::Int(v))) => ConstValue::boxed(*v)
                    .map(AbstractValue::Constant)
                    .unwrap_or(AbstractValue::Top),
                _ => AbstractValue::Top,
            },
        };
        MethodSummary {
            return_value,
            ..MethodSummary::default()
        }
    }

    /// Successor edges a terminator can actually take under the current
    /// register state. A fully constant condition selects one arm; a
    /// condition still at Bottom selects none (outcome pending); anything
    /// else keeps both.
    fn reachable_successors(terminator: &Terminator, env: &Env) -> Vec<BlockId> {
        match terminator {
            Terminator::Goto { target } => vec![*target],
            Terminator::Branch {
                cmp,
                lhs,
                rhs,
                then_target,
                else_target,
            } => {
                let lhs = env.regs[lhs.index()].as_abstract();
                let rhs = env.regs[rhs.index()].as_abstract();
                if lhs.is_bottom() || rhs.is_bottom() {
                    return Vec::new();
                }
                match (lhs.as_constant(), rhs.as_constant()) {
                    (Some(l), Some(r)) => match l.compare(*cmp, r) {
                        Some(true) => vec![*then_target],
                        Some(false) => vec![*else_target],
                        None => vec![*then_target, *else_target],
                    },
                    _ => vec![*then_target, *else_target],
                }
            }
            Terminator::Return { .. } => Vec::new(),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn transfer(
        &self,
        env: &mut Env,
        objects: &mut HashMap<AllocSite, ObjectState>,
        summary: &mut MethodSummary,
        rewrites: &mut Vec<RewriteSite>,
        block: BlockId,
        instr_idx: usize,
        instr: &Instr,
        depth: usize,
        collect: bool,
    ) -> Result<()> {
        match instr {
            Instr::Const { dest, value } => {
                env.regs[dest.index()] =
                    RegValue::Value(AbstractValue::Constant(ConstValue::Int(*value)));
            }

            Instr::LoadCachedBox { dest, value } => {
                env.regs[dest.index()] =
                    RegValue::Value(AbstractValue::Constant(ConstValue::CachedBox(*value)));
            }

            Instr::Move { dest, src } => {
                env.regs[dest.index()] = env.regs[src.index()];
            }

            Instr::BinOp { op, dest, lhs, rhs } => {
                let lhs = env.regs[lhs.index()].as_abstract();
                let rhs = env.regs[rhs.index()].as_abstract();
                let value = match (lhs, rhs) {
                    (AbstractValue::Bottom, _) | (_, AbstractValue::Bottom) => {
                        AbstractValue::Bottom
                    }
                    (AbstractValue::Constant(l), AbstractValue::Constant(r)) => l
                        .apply(*op, &r)
                        .map(AbstractValue::Constant)
                        .unwrap_or(AbstractValue::Top),
                    _ => AbstractValue::Top,
                };
                env.regs[dest.index()] = RegValue::Value(value);
            }

            Instr::IGet {
                dest,
                object,
                field,
            } => {
                let decl = self.program.field(*field)?;
                let mut value = self.field_value(*field);
                if !value.is_constant() && decl.is_final() && !decl.is_static() {
                    // A freshly constructed receiver with tracked final
                    // fields beats the (possibly conflicting) global fact.
                    if let RegValue::Object(site) = env.regs[object.index()] {
                        if let Some(state) = objects.get(&site) {
                            if let Some(tracked) = state.fields.get(field) {
                                value = *tracked;
                            }
                        }
                    }
                }
                env.regs[dest.index()] = RegValue::Value(value);
                if collect {
                    if let AbstractValue::Constant(c) = value {
                        rewrites.push(RewriteSite {
                            block,
                            instr: instr_idx,
                            dest: *dest,
                            value: c,
                            kind: RewriteKind::InstanceRead,
                        });
                    }
                }
            }

            Instr::SGet { dest, field } => {
                let value = self.field_value(*field);
                env.regs[dest.index()] = RegValue::Value(value);
                if collect {
                    if let AbstractValue::Constant(c) = value {
                        rewrites.push(RewriteSite {
                            block,
                            instr: instr_idx,
                            dest: *dest,
                            value: c,
                            kind: RewriteKind::StaticRead,
                        });
                    }
                }
            }

            Instr::IPut { src, field, .. } | Instr::SPut { src, field } => {
                let value = env.regs[src.index()].as_abstract();
                summary.add_field_write(*field, value);
            }

            Instr::NewInstance { dest, class } => {
                let site = (block, instr_idx);
                objects.entry(site).or_insert_with(|| ObjectState {
                    class: *class,
                    fields: HashMap::new(),
                });
                env.regs[dest.index()] = RegValue::Object(site);
            }

            Instr::InvokeStatic { dest, method, args } => {
                let arg_values: Vec<AbstractValue> = args
                    .iter()
                    .map(|reg| env.regs[reg.index()].as_abstract())
                    .collect();
                let (value, pure) = self.call_static(*method, &arg_values, depth)?;
                if let Some(dest) = dest {
                    env.regs[dest.index()] = RegValue::Value(value);
                    if collect && pure {
                        if let AbstractValue::Constant(c) = value {
                            rewrites.push(RewriteSite {
                                block,
                                instr: instr_idx,
                                dest: *dest,
                                value: c,
                                kind: RewriteKind::CallResult,
                            });
                        }
                    }
                }
            }

            Instr::InvokeDirect { method, this, args } => {
                let callee = self.program.method(*method)?;
                if callee.is_constructor() {
                    if let RegValue::Object(site) = env.regs[this.index()] {
                        let arg_values: Vec<AbstractValue> = args
                            .iter()
                            .map(|reg| env.regs[reg.index()].as_abstract())
                            .collect();
                        self.construct(site, *method, &arg_values, objects, depth)?;
                    }
                }
                // The callee's own field writes are contributed by the
                // callee's own worklist pass, never by the caller.
            }

            Instr::InvokeVirtual { dest, .. } => {
                // Multi-target dispatch: Top unless resolvable to exactly one
                // target, and this core never resolves bodies (by design even
                // for trivial accessors).
                if let Some(dest) = dest {
                    env.regs[dest.index()] = RegValue::Value(AbstractValue::Top);
                }
            }
        }
        Ok(())
    }

    /// Reads a field through the global fact snapshot.
    fn field_value(&self, field: FieldId) -> AbstractValue {
        match self.facts.fact(field) {
            FieldFact::KnownConstant(c) => AbstractValue::Constant(c),
            // No write observed yet: optimistic, will rise via re-enqueue.
            FieldFact::UnknownValue => AbstractValue::Bottom,
            FieldFact::Conflicting => AbstractValue::Top,
        }
    }

    /// Evaluates a static call, returning its abstract result and whether the
    /// result may be folded at the call site (constant from a side-effect-free
    /// specialized callee).
    fn call_static(
        &self,
        method: MethodId,
        args: &[AbstractValue],
        depth: usize,
    ) -> Result<(AbstractValue, bool)> {
        let callee = self.program.method(method)?;

        if let Some(intrinsic) = callee.intrinsic {
            // Intrinsic results flow, but the factory call itself is kept:
            // it is the canonical way to materialize the cached instance.
            let summary = Self::intrinsic_summary(intrinsic, args);
            return Ok((summary.return_value, false));
        }

        if callee.body.is_none() {
            // Unresolvable target: recovered as unknown.
            return Ok((AbstractValue::Top, false));
        }

        if args.iter().all(AbstractValue::is_constant) {
            if let Some(spec) = self.specialize(method, args, depth)? {
                let pure = spec.is_pure();
                return Ok((spec.return_value, pure));
            }
        }

        // Context-insensitive fallback; Bottom until the callee's first
        // summary is merged.
        let value = self
            .summaries
            .get(method)
            .map(|s| s.return_value)
            .unwrap_or(AbstractValue::Bottom);
        Ok((value, false))
    }

    /// Applies a constructor invocation to a locally tracked object.
    fn construct(
        &self,
        site: AllocSite,
        ctor: MethodId,
        args: &[AbstractValue],
        objects: &mut HashMap<AllocSite, ObjectState>,
        depth: usize,
    ) -> Result<()> {
        let Some(state) = objects.get(&site) else {
            return Ok(());
        };
        let class = self.program.class(state.class)?;
        let final_fields: Vec<(FieldId, ValueType)> = class
            .fields
            .iter()
            .filter_map(|f| {
                let field = self.program.field(*f).ok()?;
                (field.is_final() && !field.is_static()).then_some((*f, field.ty))
            })
            .collect();
        if final_fields.is_empty() {
            return Ok(());
        }

        // The receiver slot is never constant; specialize on the explicit
        // argument tuple only.
        let spec = if args.iter().all(AbstractValue::is_constant) {
            let mut full_args = Vec::with_capacity(args.len() + 1);
            full_args.push(AbstractValue::Top);
            full_args.extend_from_slice(args);
            self.specialize(ctor, &full_args, depth)?
        } else {
            None
        };

        let state = objects.get_mut(&site).expect("object state exists");
        for (field, ty) in final_fields {
            let written = match &spec {
                Some(summary) => {
                    let assigned = summary
                        .field_writes
                        .get(&field)
                        .copied()
                        .unwrap_or(AbstractValue::Bottom);
                    if summary.definite_writes.contains(&field) {
                        assigned
                    } else {
                        // A field the constructor may leave untouched still
                        // holds its default on those paths.
                        assigned.join(&default_field_value(ty))
                    }
                }
                None => AbstractValue::Top,
            };
            let slot = state.fields.entry(field).or_default();
            *slot = slot.join(&written);
        }
        Ok(())
    }

    /// Re-analyzes a callee for one constant argument tuple, within bounds.
    ///
    /// Returns `None` when the callee is too large or the specialization
    /// chain too deep; callers fall back to the context-insensitive summary.
    fn specialize(
        &self,
        method: MethodId,
        args: &[AbstractValue],
        depth: usize,
    ) -> Result<Option<MethodSummary>> {
        if depth >= self.specializer.max_depth {
            return Ok(None);
        }
        let callee = self.program.method(method)?;
        let Some(body) = &callee.body else {
            return Ok(None);
        };
        if body.block_count() > self.specializer.max_blocks {
            return Ok(None);
        }

        let key = (method, args.to_vec());
        if let Some(hit) = self.specializer.cache.get(&key) {
            return Ok(Some(hit.clone()));
        }

        let outcome = self.analyze_with(method, args, depth + 1, false)?;
        self.specializer
            .cache
            .insert(key, outcome.summary.clone());
        Ok(Some(outcome.summary))
    }
}

/// The value an unwritten field holds after default initialization.
pub(crate) fn default_field_value(ty: ValueType) -> AbstractValue {
    match ty {
        // Integer fields default to zero.
        ValueType::Int => AbstractValue::Constant(ConstValue::Int(0)),
        // Null is not a materializable constant in this core's vocabulary.
        ValueType::Reference => AbstractValue::Top,
    }
}
