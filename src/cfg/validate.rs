//! Structural invariants of a [`ControlFlowGraph`].

use std::collections::HashSet;

use crate::{
    cfg::{BasicBlock, BlockId, BlockLink, ControlFlowGraph},
    error::invalid_cfg,
    Result,
};

impl ControlFlowGraph {
    /// Checks the structural invariants every pass must preserve.
    ///
    /// - at least one block, sequence numbers `0..n` matching program order
    /// - instruction indices contiguous from 0 across blocks
    /// - every edge recorded on both ends with the same kind, once per target
    /// - no link to a removed block
    /// - block-ending control flow only last, block-starting control flow only first
    /// - a current dominance tree rooted at the entry, whose dominator chains
    ///   all end at the entry and where each block's immediate dominator
    ///   dominates every reachable parent
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidCfg`] naming the first offending block.
    pub fn check(&self) -> Result<()> {
        let Some(&entry) = self.order.first() else {
            return Err(invalid_cfg!(BlockId::new(0), "graph has no blocks"));
        };

        let live = self.blocks.iter().flatten().count();
        if live != self.order.len() {
            return Err(invalid_cfg!(
                entry,
                "{} live blocks but {} in program order",
                live,
                self.order.len()
            ));
        }

        let mut next_ip = 0;
        for (num, &id) in self.order.iter().enumerate() {
            let Some(block) = self.get(id) else {
                return Err(invalid_cfg!(id, "removed block in program order"));
            };
            if block.id != id {
                return Err(invalid_cfg!(id, "arena slot holds {}", block.id));
            }
            if block.num != num {
                return Err(invalid_cfg!(id, "sequence number {} at position {}", block.num, num));
            }
            if block.start_ip != next_ip {
                return Err(invalid_cfg!(
                    id,
                    "starts at ip {} but previous block ended before {}",
                    block.start_ip,
                    next_ip
                ));
            }
            next_ip += block.len();

            self.check_links(block, &block.children, true)?;
            self.check_links(block, &block.parents, false)?;
            Self::check_positions(block)?;
        }
        self.check_dominance(entry)
    }

    fn check_dominance(&self, entry: BlockId) -> Result<()> {
        let tree = self.dominance();
        if !tree.is_current(self) {
            return Err(invalid_cfg!(
                entry,
                "dominance tree of generation {} on graph generation {}",
                tree.generation(),
                self.generation()
            ));
        }
        if !tree.is_reachable(0) || tree.immediate_dominator(0).is_some() {
            return Err(invalid_cfg!(entry, "entry is not the dominance root"));
        }

        let n = self.order.len();
        for (num, &id) in self.order.iter().enumerate().skip(1) {
            if !tree.is_reachable(num) {
                continue;
            }
            let chain: Vec<usize> = tree.dominators(num).take(n + 1).collect();
            if chain.len() > n || chain.last() != Some(&0) {
                return Err(invalid_cfg!(id, "dominator chain of B{} does not end at the entry", num));
            }
        }

        for (num, &id) in self.order.iter().enumerate().skip(1) {
            let mut parents = self.block(id).parents.iter().map(|l| self.block(l.block).num);
            match tree.immediate_dominator(num) {
                None => {
                    if let Some(p) = parents.find(|&p| tree.is_reachable(p)) {
                        return Err(invalid_cfg!(id, "unreachable but entered from reachable B{}", p));
                    }
                }
                Some(idom) => {
                    let stray = parents.find(|&p| tree.is_reachable(p) && !tree.dominates(idom, p));
                    if let Some(p) = stray {
                        return Err(invalid_cfg!(
                            id,
                            "immediate dominator B{} does not dominate parent B{}",
                            idom,
                            p
                        ));
                    }
                }
            }
        }
        Ok(())
    }

    fn check_links(&self, block: &BasicBlock, links: &[BlockLink], outgoing: bool) -> Result<()> {
        let id = block.id;
        let mut seen = HashSet::with_capacity(links.len());
        for link in links {
            if !seen.insert(link.block) {
                return Err(invalid_cfg!(id, "duplicate link to {}", link.block));
            }
            let Some(other) = self.get(link.block) else {
                return Err(invalid_cfg!(id, "link to removed block {}", link.block));
            };
            let back = if outgoing {
                other.parent_kind(id)
            } else {
                other.child_kind(id)
            };
            match back {
                None => {
                    return Err(invalid_cfg!(
                        id,
                        "{} has no matching {} link",
                        link.block,
                        if outgoing { "parent" } else { "child" }
                    ))
                }
                Some(kind) if kind != link.kind => {
                    return Err(invalid_cfg!(
                        id,
                        "edge kind {:?} disagrees with {:?} recorded on {}",
                        link.kind,
                        kind,
                        link.block
                    ))
                }
                Some(_) => {}
            }
        }
        Ok(())
    }

    fn check_positions(block: &BasicBlock) -> Result<()> {
        let last = block.len().saturating_sub(1);
        for (i, inst) in block.instructions.iter().enumerate() {
            if inst.opcode.ends_block() && i != last {
                return Err(invalid_cfg!(
                    block.id,
                    "{} at ip {} does not end the block",
                    inst.opcode,
                    block.start_ip + i
                ));
            }
            if inst.opcode.starts_block() && i != 0 {
                return Err(invalid_cfg!(
                    block.id,
                    "{} at ip {} does not start the block",
                    inst.opcode,
                    block.start_ip + i
                ));
            }
        }
        Ok(())
    }

    /// Panicking form of [`check`](Self::check), for use after every pass in
    /// debug pipelines and tests.
    ///
    /// # Panics
    ///
    /// Panics with the violated invariant.
    pub fn validate(&self) {
        if let Err(e) = self.check() {
            panic!("CFG validation failed: {e}");
        }
    }
}
