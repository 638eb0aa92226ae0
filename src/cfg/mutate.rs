//! Structural edits: edges, block removal, merge and split, instruction removal.
//!
//! All primitives keep parent and child lists symmetric and sequence numbers
//! and instruction indices contiguous.

use crate::{
    cfg::{BlockId, BlockLink, ControlFlowGraph, DependencyClass, EdgeKind},
    error::invalid_cfg,
    ir::Instruction,
    Error, Result,
};

fn set_link(links: &mut Vec<BlockLink>, block: BlockId, kind: EdgeKind) {
    match links.iter_mut().find(|l| l.block == block) {
        Some(link) => link.kind = kind,
        None => links.push(BlockLink::new(block, kind)),
    }
}

impl ControlFlowGraph {
    /// Adds the edge `from -> to`.
    ///
    /// If the edge exists already its kind becomes the smaller of the two, so a
    /// logical edge is never weakened to physical.
    ///
    /// # Panics
    ///
    /// Panics if either block has been removed.
    pub fn add_edge(&mut self, from: BlockId, to: BlockId, kind: EdgeKind) {
        let kind = self
            .block(from)
            .child_kind(to)
            .map_or(kind, |existing| existing.min(kind));
        set_link(&mut self.block_mut(from).children, to, kind);
        set_link(&mut self.block_mut(to).parents, from, kind);
        self.invalidate(DependencyClass::BLOCKS);
    }

    /// Removes the edge `from -> to`, returning its kind if it existed.
    pub fn remove_edge(&mut self, from: BlockId, to: BlockId) -> Option<EdgeKind> {
        let kind = self.get(from)?.child_kind(to)?;
        self.block_mut(from).children.retain(|l| l.block != to);
        self.block_mut(to).parents.retain(|l| l.block != from);
        self.invalidate(DependencyClass::BLOCKS);
        Some(kind)
    }

    /// Removes every outgoing edge of `id`.
    pub fn unlink_children(&mut self, id: BlockId) {
        let children: Vec<_> = self.block(id).children.iter().map(|l| l.block).collect();
        for child in children {
            self.remove_edge(id, child);
        }
    }

    /// Removes every incoming edge of `id`.
    pub fn unlink_parents(&mut self, id: BlockId) {
        let parents: Vec<_> = self.block(id).parents.iter().map(|l| l.block).collect();
        for parent in parents {
            self.remove_edge(parent, id);
        }
    }

    /// Removes a block, connecting each of its parents to each of its children.
    ///
    /// A spliced edge `p -> c` gets the larger kind of `p -> b` and `b -> c`.
    /// Instructions still in the block are discarded.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownBlock`] for a removed block and
    /// [`Error::InvalidCfg`] when `id` is the only block left.
    pub fn remove_block(&mut self, id: BlockId) -> Result<()> {
        if self.get(id).is_none() {
            return Err(Error::UnknownBlock(id));
        }
        if self.num_blocks() == 1 {
            return Err(invalid_cfg!(id, "cannot remove the only block"));
        }
        self.splice_out(id);
        Ok(())
    }

    /// [`remove_block`](Self::remove_block) for a live block when others exist.
    pub(crate) fn splice_out(&mut self, id: BlockId) {
        let (parents, children) = {
            let block = self.block(id);
            (block.parents.clone(), block.children.clone())
        };
        for parent in parents.iter().filter(|p| p.block != id) {
            for child in children.iter().filter(|c| c.block != id) {
                self.add_edge(parent.block, child.block, parent.kind.max(child.kind));
            }
        }
        self.unlink_parents(id);
        self.unlink_children(id);

        let (num, dropped) = {
            let block = self.block(id);
            (block.num, block.len())
        };
        self.order.remove(num);
        self.blocks[id.0] = None;
        for later in self.order[num..].to_vec() {
            let block = self.block_mut(later);
            block.num -= 1;
            block.start_ip -= dropped;
        }
        log::trace!("removed {id} (B{num})");
        self.invalidate(DependencyClass::BLOCKS | DependencyClass::INSTRUCTION_IDENTITY);
    }

    /// Returns `true` if `b` directly follows `a` and the control flow at the
    /// boundary lets the two be one block.
    #[must_use]
    pub fn can_combine(&self, a: BlockId, b: BlockId) -> bool {
        let (Some(first), Some(second)) = (self.get(a), self.get(b)) else {
            return false;
        };
        second.num == first.num + 1
            && !first.ends_with_control_flow()
            && !second.starts_with_control_flow()
    }

    /// Appends the instructions of `b` to `a` and removes `b`.
    ///
    /// Returns `false` without changes when [`can_combine`](Self::can_combine) refuses.
    pub fn merge(&mut self, a: BlockId, b: BlockId) -> bool {
        if !self.can_combine(a, b) {
            return false;
        }
        let moved = std::mem::take(&mut self.block_mut(b).instructions);
        self.block_mut(a).instructions.extend(moved);
        self.splice_out(b);
        log::trace!("merged {b} into {a}");
        true
    }

    /// Splits `id` before instruction `at`, returning the new second half.
    ///
    /// The new block takes over all outgoing edges and is reached from `id` by
    /// a logical edge. Returns `None` if `at` does not split the block into two
    /// non-empty parts.
    pub fn split_block(&mut self, id: BlockId, at: usize) -> Option<BlockId> {
        let block = self.get(id)?;
        if at == 0 || at >= block.len() {
            return None;
        }
        let (num, start_ip) = (block.num, block.start_ip);

        let tail = self.block_mut(id).instructions.split_off(at);
        let new = self.alloc_block();
        let children = std::mem::take(&mut self.block_mut(id).children);
        for link in &children {
            if let Some(parent) = self
                .block_mut(link.block)
                .parents
                .iter_mut()
                .find(|p| p.block == id)
            {
                parent.block = new;
            }
        }
        {
            let block = self.block_mut(new);
            block.instructions = tail;
            block.children = children;
            block.start_ip = start_ip + at;
            block.num = num + 1;
        }
        self.order.insert(num + 1, new);
        for later in self.order[num + 2..].to_vec() {
            self.block_mut(later).num += 1;
        }
        self.add_edge(id, new, EdgeKind::Logical);
        Some(new)
    }

    /// Removes instruction `index` of block `id`.
    ///
    /// Later blocks' instruction indices shift down by one. When the last
    /// instruction of a block goes away the block itself is removed, unless it
    /// is the only block.
    pub fn remove_instruction(&mut self, id: BlockId, index: usize) -> Option<Instruction> {
        let block = self.blocks.get_mut(id.0)?.as_mut()?;
        if index >= block.instructions.len() {
            return None;
        }
        let inst = block.instructions.remove(index);
        let (num, now_empty) = (block.num, block.instructions.is_empty());
        for later in self.order[num + 1..].to_vec() {
            self.block_mut(later).start_ip -= 1;
        }
        self.invalidate(DependencyClass::INSTRUCTION_IDENTITY);
        if now_empty && self.num_blocks() > 1 {
            self.splice_out(id);
        }
        Some(inst)
    }

    /// Removes the last instruction of block `id`.
    pub fn remove_last_instruction(&mut self, id: BlockId) -> Option<Instruction> {
        let last = self.get(id)?.len().checked_sub(1)?;
        self.remove_instruction(id, last)
    }

    /// Removes the first instruction of block `id`.
    pub fn remove_first_instruction(&mut self, id: BlockId) -> Option<Instruction> {
        self.remove_instruction(id, 0)
    }
}
