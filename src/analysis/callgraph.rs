//! Reverse call edges and field-reader sets for worklist re-enqueueing.
//!
//! The interprocedural solver needs to know, when a method summary or field
//! fact changes, which methods must be re-analyzed. This module builds those
//! reverse indices in one scan over all method bodies:
//!
//! - `callers_of(m)`: methods containing a statically resolved call to `m`
//!   (static and direct calls). Virtual call sites contribute no edge — their
//!   target set cannot be narrowed to one implementation, the analysis never
//!   consumes a virtual callee's summary, and so no re-enqueue can be needed.
//! - `readers_of(f)`: methods containing a read of field `f`.

use std::collections::{HashMap, HashSet};

use crate::ir::{FieldId, Instr, MethodId, Program};

/// Reverse dependency indices over the whole program.
#[derive(Debug)]
pub struct CallGraph {
    /// callee -> set of callers with statically resolved call sites.
    callers: HashMap<MethodId, HashSet<MethodId>>,
    /// field -> set of methods reading it.
    readers: HashMap<FieldId, HashSet<MethodId>>,
}

impl CallGraph {
    /// Builds the reverse indices by scanning every method body once.
    #[must_use]
    pub fn build(program: &Program) -> Self {
        let mut callers: HashMap<MethodId, HashSet<MethodId>> = HashMap::new();
        let mut readers: HashMap<FieldId, HashSet<MethodId>> = HashMap::new();

        for (caller, method) in program.methods() {
            let Some(body) = &method.body else { continue };
            for (_, block) in body.iter_blocks() {
                for instr in block.instrs() {
                    match instr {
                        Instr::InvokeStatic { method, .. }
                        | Instr::InvokeDirect { method, .. } => {
                            callers.entry(*method).or_default().insert(caller);
                        }
                        Instr::IGet { field, .. } | Instr::SGet { field, .. } => {
                            readers.entry(*field).or_default().insert(caller);
                        }
                        _ => {}
                    }
                }
            }
        }

        Self { callers, readers }
    }

    /// Returns the methods with a statically resolved call to `callee`.
    pub fn callers_of(&self, callee: MethodId) -> impl Iterator<Item = MethodId> + '_ {
        self.callers
            .get(&callee)
            .into_iter()
            .flat_map(|s| s.iter().copied())
    }

    /// Returns the methods reading `field`.
    pub fn readers_of(&self, field: FieldId) -> impl Iterator<Item = MethodId> + '_ {
        self.readers
            .get(&field)
            .into_iter()
            .flat_map(|s| s.iter().copied())
    }

    /// Returns `method` together with every transitive caller of it.
    ///
    /// Used when a field fact degrades: a caller may have folded a
    /// specialized callee that read the field, so the dependency on the fact
    /// reaches through the call chain, not just the direct reader.
    #[must_use]
    pub fn with_transitive_callers(&self, method: MethodId) -> Vec<MethodId> {
        let mut seen: HashSet<MethodId> = HashSet::new();
        let mut stack = vec![method];
        while let Some(m) = stack.pop() {
            if seen.insert(m) {
                stack.extend(self.callers_of(m));
            }
        }
        seen.into_iter().collect()
    }
}
