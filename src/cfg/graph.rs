//! The control-flow graph container.

use std::sync::OnceLock;

use bitflags::bitflags;

use crate::{
    analysis::DominanceTree,
    cfg::{BasicBlock, BlockId},
    ir::Instruction,
};

bitflags! {
    /// Classes of program facts an edit can change.
    ///
    /// Cached analyses declare the classes they depend on and are discarded when
    /// an [`ControlFlowGraph::invalidate`] call names one of them.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct DependencyClass: u32 {
        /// Instructions were added, removed or replaced.
        const INSTRUCTION_IDENTITY = 1 << 0;
        /// Instruction fields changed without touching operands (predicates, modifiers).
        const INSTRUCTION_DETAIL = 1 << 1;
        /// Source or destination operands changed.
        const INSTRUCTION_DATA_FLOW = 1 << 2;
        /// Blocks or edges were added, removed or changed kind.
        const BLOCKS = 1 << 3;
        /// Any instruction change.
        const INSTRUCTIONS = Self::INSTRUCTION_IDENTITY.bits()
            | Self::INSTRUCTION_DETAIL.bits()
            | Self::INSTRUCTION_DATA_FLOW.bits();
    }
}

/// Control-flow graph of one shader function.
///
/// Blocks live in an arena addressed by [`BlockId`]; a separate list holds
/// them in program order, and each block's sequence number is its position in
/// that list. There is always at least one block, and block 0 is the entry.
///
/// The dominance tree is computed lazily and cached until the next edit that
/// invalidates [`DependencyClass::BLOCKS`]. Every structural mutator performs
/// that invalidation itself and bumps [`ControlFlowGraph::generation`].
///
/// # Examples
///
/// ```rust
/// use simdcfg::{cfg::ControlFlowGraph, ir::{Instruction, Opcode, Reg}};
///
/// let cfg = ControlFlowGraph::build(vec![
///     Instruction::new(Opcode::If).predicated(false),
///     Instruction::new(Opcode::Mov).dst(Reg::vgrf(0)).src(Reg::imm(1)),
///     Instruction::new(Opcode::Endif),
/// ]);
///
/// assert_eq!(cfg.num_blocks(), 3);
/// assert_eq!(cfg.dominance().immediate_dominator(2), Some(0));
/// cfg.validate();
/// ```
#[derive(Debug, Clone)]
pub struct ControlFlowGraph {
    pub(crate) blocks: Vec<Option<BasicBlock>>,
    pub(crate) order: Vec<BlockId>,
    generation: u64,
    dominance: OnceLock<DominanceTree>,
}

impl Default for ControlFlowGraph {
    fn default() -> Self {
        let mut cfg = Self::empty();
        let entry = cfg.alloc_block();
        cfg.place_block(entry, 0);
        cfg
    }
}

impl ControlFlowGraph {
    /// A graph with no blocks at all; callers must place at least one.
    pub(crate) fn empty() -> Self {
        Self {
            blocks: Vec::new(),
            order: Vec::new(),
            generation: 0,
            dominance: OnceLock::new(),
        }
    }

    /// Creates an arena slot for a block that is not yet in program order.
    pub(crate) fn alloc_block(&mut self) -> BlockId {
        let id = BlockId(self.blocks.len());
        self.blocks.push(Some(BasicBlock::new(id)));
        id
    }

    /// Appends a previously allocated block to program order.
    pub(crate) fn place_block(&mut self, id: BlockId, start_ip: usize) {
        let num = self.order.len();
        self.order.push(id);
        let block = self.block_mut(id);
        block.num = num;
        block.start_ip = start_ip;
    }

    /// Number of blocks in program order.
    #[must_use]
    pub fn num_blocks(&self) -> usize {
        self.order.len()
    }

    /// Total number of instructions.
    #[must_use]
    pub fn num_instructions(&self) -> usize {
        self.blocks().map(BasicBlock::len).sum()
    }

    /// The entry block.
    #[must_use]
    pub fn entry(&self) -> BlockId {
        self.order[0]
    }

    /// Returns the block, or `None` for a removed block.
    #[must_use]
    pub fn get(&self, id: BlockId) -> Option<&BasicBlock> {
        self.blocks.get(id.0).and_then(Option::as_ref)
    }

    /// Returns the block.
    ///
    /// # Panics
    ///
    /// Panics if `id` refers to a removed block.
    #[must_use]
    pub fn block(&self, id: BlockId) -> &BasicBlock {
        match self.get(id) {
            Some(block) => block,
            None => panic!("{id:?} is not a live block"),
        }
    }

    pub(crate) fn block_mut(&mut self, id: BlockId) -> &mut BasicBlock {
        match self.blocks.get_mut(id.0).and_then(Option::as_mut) {
            Some(block) => block,
            None => panic!("{id:?} is not a live block"),
        }
    }

    /// Handle of the block with sequence number `num`.
    #[must_use]
    pub fn id_at(&self, num: usize) -> Option<BlockId> {
        self.order.get(num).copied()
    }

    /// Block handles in program order.
    pub fn block_ids(&self) -> impl Iterator<Item = BlockId> + '_ {
        self.order.iter().copied()
    }

    /// Blocks in program order.
    pub fn blocks(&self) -> impl Iterator<Item = &BasicBlock> + '_ {
        self.order.iter().map(|id| self.block(*id))
    }

    /// The block preceding `id` in program order.
    #[must_use]
    pub fn prev(&self, id: BlockId) -> Option<BlockId> {
        let num = self.get(id)?.num;
        num.checked_sub(1).and_then(|n| self.id_at(n))
    }

    /// The block following `id` in program order.
    #[must_use]
    pub fn next(&self, id: BlockId) -> Option<BlockId> {
        self.id_at(self.get(id)?.num + 1)
    }

    /// All instructions in program order.
    pub fn instructions(&self) -> impl Iterator<Item = &Instruction> + '_ {
        self.blocks().flat_map(|b| b.instructions.iter())
    }

    /// Consumes the graph, returning its instructions in program order.
    #[must_use]
    pub fn into_instructions(mut self) -> Vec<Instruction> {
        let order = std::mem::take(&mut self.order);
        let mut out = Vec::with_capacity(self.num_instructions());
        for id in order {
            if let Some(block) = self.blocks[id.0].take() {
                out.extend(block.instructions);
            }
        }
        out
    }

    /// Mutable access to a block's instructions.
    ///
    /// The slice can be edited or permuted in place but not resized. Callers
    /// must [`invalidate`](Self::invalidate) whatever they changed.
    ///
    /// # Panics
    ///
    /// Panics if `id` refers to a removed block.
    pub fn instructions_mut(&mut self, id: BlockId) -> &mut [Instruction] {
        &mut self.block_mut(id).instructions
    }

    /// Mutable access to instruction `index` of block `id`.
    ///
    /// Callers must [`invalidate`](Self::invalidate) the classes they change.
    pub fn instruction_mut(&mut self, id: BlockId, index: usize) -> Option<&mut Instruction> {
        self.blocks
            .get_mut(id.0)?
            .as_mut()?
            .instructions
            .get_mut(index)
    }

    /// Counter bumped by every edit that invalidates [`DependencyClass::BLOCKS`].
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Discards cached analyses depending on `classes`.
    pub fn invalidate(&mut self, classes: DependencyClass) {
        if classes.intersects(DependencyClass::BLOCKS) {
            self.generation += 1;
            self.dominance = OnceLock::new();
        }
    }

    /// The dominance tree, computed on first use after the last block-level edit.
    #[must_use]
    pub fn dominance(&self) -> &DominanceTree {
        self.dominance.get_or_init(|| DominanceTree::compute(self))
    }
}
