//! Basic block storage.

use crate::{
    cfg::{BlockId, BlockLink, EdgeKind},
    ir::Instruction,
};

/// A run of instructions executed in order, with its parent and child edges.
///
/// Blocks are owned by a [`crate::cfg::ControlFlowGraph`] and only modified
/// through it, so that edge symmetry and instruction numbering stay intact.
#[derive(Debug, Clone)]
pub struct BasicBlock {
    pub(crate) id: BlockId,
    pub(crate) num: usize,
    pub(crate) start_ip: usize,
    pub(crate) instructions: Vec<Instruction>,
    pub(crate) parents: Vec<BlockLink>,
    pub(crate) children: Vec<BlockLink>,
}

impl BasicBlock {
    pub(crate) fn new(id: BlockId) -> Self {
        Self {
            id,
            num: usize::MAX,
            start_ip: 0,
            instructions: Vec::new(),
            parents: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Stable handle of this block.
    #[must_use]
    pub fn id(&self) -> BlockId {
        self.id
    }

    /// Position of this block in program order.
    #[must_use]
    pub fn num(&self) -> usize {
        self.num
    }

    /// Global index of the first instruction.
    ///
    /// For an empty block this is the index the next instruction would get.
    #[must_use]
    pub fn start_ip(&self) -> usize {
        self.start_ip
    }

    /// Global index of the last instruction, `None` for an empty block.
    #[must_use]
    pub fn end_ip(&self) -> Option<usize> {
        if self.instructions.is_empty() {
            None
        } else {
            Some(self.start_ip + self.instructions.len() - 1)
        }
    }

    /// Number of instructions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    /// Returns `true` if the block holds no instruction.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// The instructions in execution order.
    #[must_use]
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// First instruction.
    #[must_use]
    pub fn start(&self) -> Option<&Instruction> {
        self.instructions.first()
    }

    /// Last instruction.
    #[must_use]
    pub fn end(&self) -> Option<&Instruction> {
        self.instructions.last()
    }

    /// Predecessor links.
    #[must_use]
    pub fn parents(&self) -> &[BlockLink] {
        &self.parents
    }

    /// Successor links.
    #[must_use]
    pub fn children(&self) -> &[BlockLink] {
        &self.children
    }

    /// Kind of the edge to `child`, if there is one.
    #[must_use]
    pub fn child_kind(&self, child: BlockId) -> Option<EdgeKind> {
        self.children
            .iter()
            .find(|l| l.block == child)
            .map(|l| l.kind)
    }

    /// Kind of the edge from `parent`, if there is one.
    #[must_use]
    pub fn parent_kind(&self, parent: BlockId) -> Option<EdgeKind> {
        self.parents
            .iter()
            .find(|l| l.block == parent)
            .map(|l| l.kind)
    }

    /// The last instruction can only end a block.
    #[must_use]
    pub fn ends_with_control_flow(&self) -> bool {
        self.end().is_some_and(|i| i.opcode.ends_block())
    }

    /// The first instruction can only start a block.
    #[must_use]
    pub fn starts_with_control_flow(&self) -> bool {
        self.start().is_some_and(|i| i.opcode.starts_block())
    }
}
