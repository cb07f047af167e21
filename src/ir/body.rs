//! Basic blocks and the per-method control-flow graph.
//!
//! A [`MethodBody`] is an ordered list of [`BasicBlock`]s with a designated
//! entry block. Edges are implied by block terminators; predecessor sets and
//! reverse postorder are computed on demand rather than cached, since bodies
//! are small and the interpreter takes a single traversal pass per run.

use std::fmt;

use crate::ir::{Instr, Reg, Terminator};

/// Index of a basic block within one method body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(u32);

impl BlockId {
    /// Creates a block id from its index.
    #[must_use]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Returns the index of this block.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "B{}", self.0)
    }
}

/// A straight-line sequence of instructions ending in one terminator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicBlock {
    instrs: Vec<Instr>,
    terminator: Terminator,
}

impl BasicBlock {
    /// Creates a basic block from its instructions and terminator.
    #[must_use]
    pub fn new(instrs: Vec<Instr>, terminator: Terminator) -> Self {
        Self { instrs, terminator }
    }

    /// Returns the instructions of this block, in execution order.
    #[must_use]
    pub fn instrs(&self) -> &[Instr] {
        &self.instrs
    }

    /// Returns mutable access to the instructions, for in-place rewriting.
    pub fn instrs_mut(&mut self) -> &mut [Instr] {
        &mut self.instrs
    }

    /// Returns the terminator of this block.
    #[must_use]
    pub fn terminator(&self) -> &Terminator {
        &self.terminator
    }
}

/// The control-flow graph of one method.
///
/// Blocks are stored densely and addressed by [`BlockId`]. The register file
/// is a flat array of `reg_count` slots; `param_regs` names the slots that
/// receive the method arguments (including the receiver for instance
/// methods), in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodBody {
    blocks: Vec<BasicBlock>,
    entry: BlockId,
    reg_count: u16,
    param_regs: Vec<Reg>,
}

impl MethodBody {
    /// Creates a method body. Structural validation happens in
    /// [`ProgramBuilder::finish`](crate::ir::ProgramBuilder::finish).
    #[must_use]
    pub fn new(blocks: Vec<BasicBlock>, entry: BlockId, reg_count: u16, param_regs: Vec<Reg>) -> Self {
        Self {
            blocks,
            entry,
            reg_count,
            param_regs,
        }
    }

    /// Returns the entry block.
    #[must_use]
    pub fn entry(&self) -> BlockId {
        self.entry
    }

    /// Returns the number of basic blocks.
    #[must_use]
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Returns the declared register count.
    #[must_use]
    pub fn reg_count(&self) -> u16 {
        self.reg_count
    }

    /// Returns the registers receiving the method arguments, in order.
    #[must_use]
    pub fn param_regs(&self) -> &[Reg] {
        &self.param_regs
    }

    /// Returns a block by id.
    #[must_use]
    pub fn block(&self, id: BlockId) -> Option<&BasicBlock> {
        self.blocks.get(id.index())
    }

    /// Returns mutable access to a block, for in-place rewriting.
    pub fn block_mut(&mut self, id: BlockId) -> Option<&mut BasicBlock> {
        self.blocks.get_mut(id.index())
    }

    /// Iterates over all blocks with their ids.
    pub fn iter_blocks(&self) -> impl Iterator<Item = (BlockId, &BasicBlock)> {
        self.blocks
            .iter()
            .enumerate()
            .map(|(i, b)| (BlockId::new(u32::try_from(i).unwrap_or(u32::MAX)), b))
    }

    /// Returns the statically possible successors of a block.
    #[must_use]
    pub fn successors(&self, id: BlockId) -> Vec<BlockId> {
        self.block(id)
            .map(|b| b.terminator().successors())
            .unwrap_or_default()
    }

    /// Computes the predecessor sets for all blocks.
    #[must_use]
    pub fn predecessors(&self) -> Vec<Vec<BlockId>> {
        let mut preds: Vec<Vec<BlockId>> = vec![Vec::new(); self.blocks.len()];
        for (id, block) in self.iter_blocks() {
            for succ in block.terminator().successors() {
                if succ.index() < preds.len() {
                    preds[succ.index()].push(id);
                }
            }
        }
        preds
    }

    /// Computes a reverse postorder over the blocks reachable from entry.
    ///
    /// Forward dataflow over this order converges in few passes on reducible
    /// graphs; blocks not reachable from entry are omitted.
    #[must_use]
    pub fn reverse_postorder(&self) -> Vec<BlockId> {
        let mut visited = vec![false; self.blocks.len()];
        let mut postorder = Vec::with_capacity(self.blocks.len());
        // Iterative DFS; the stack entry tracks the next successor to visit.
        let mut stack: Vec<(BlockId, usize)> = Vec::new();

        if self.entry.index() < self.blocks.len() {
            visited[self.entry.index()] = true;
            stack.push((self.entry, 0));
        }

        while let Some((block, succ_idx)) = stack.pop() {
            let succs = self.successors(block);
            if succ_idx < succs.len() {
                stack.push((block, succ_idx + 1));
                let next = succs[succ_idx];
                if next.index() < visited.len() && !visited[next.index()] {
                    visited[next.index()] = true;
                    stack.push((next, 0));
                }
            } else {
                postorder.push(block);
            }
        }

        postorder.reverse();
        postorder
    }
}
