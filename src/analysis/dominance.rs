//! Immediate-dominator tree using the iterative Cooper/Harvey/Kennedy algorithm.
//!
//! A block `d` **dominates** a block `n` if every path from the entry to `n`
//! passes through `d`. The immediate dominator of `n` is its closest strict
//! dominator; making it the parent of `n` yields the dominator tree.
//!
//! # Algorithm
//!
//! Blocks are visited in reverse postorder of a depth-first walk from the
//! entry, so a block's forward parents come before it whatever the program
//! order is. Each block's candidate dominator is the intersection of the
//! current dominators of its already-processed parents, found by walking both
//! candidates up the tree until they meet. Passes repeat until nothing
//! changes. Both logical and physical edges take part.
//!
//! Nodes are identified by block sequence number, so a tree only describes the
//! graph generation it was computed for.

use crate::cfg::{BlockLink, ControlFlowGraph};

/// Dominator tree of a [`ControlFlowGraph`], indexed by block sequence number.
///
/// Obtained through [`ControlFlowGraph::dominance`], which caches it until the
/// next block-level edit.
///
/// # Examples
///
/// ```rust
/// use simdcfg::{cfg::ControlFlowGraph, ir::{Instruction, Opcode}};
///
/// let cfg = ControlFlowGraph::build(vec![
///     Instruction::new(Opcode::If).predicated(false),
///     Instruction::new(Opcode::Else),
///     Instruction::new(Opcode::Endif),
/// ]);
/// let tree = cfg.dominance();
///
/// assert_eq!(tree.immediate_dominator(0), None);
/// assert_eq!(tree.immediate_dominator(2), Some(0));
/// assert!(tree.dominates(0, 2));
/// assert!(!tree.dominates(1, 2));
/// assert!(tree.is_current(&cfg));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DominanceTree {
    generation: u64,
    /// Immediate dominator per block; the entry maps to itself, unreachable
    /// blocks to `None`.
    idom: Vec<Option<usize>>,
}

impl DominanceTree {
    /// Computes the tree for the current state of `cfg`.
    #[must_use]
    pub fn compute(cfg: &ControlFlowGraph) -> Self {
        let n = cfg.num_blocks();
        let link_nums = |links: &[BlockLink]| -> Vec<usize> {
            links
                .iter()
                .filter_map(|link| cfg.get(link.block).map(|b| b.num()))
                .collect()
        };
        let successors: Vec<Vec<usize>> = cfg.blocks().map(|b| link_nums(b.children())).collect();
        let predecessors: Vec<Vec<usize>> = cfg.blocks().map(|b| link_nums(b.parents())).collect();

        let rpo = reverse_postorder(&successors);
        let mut rank = vec![usize::MAX; n];
        for (i, &num) in rpo.iter().enumerate() {
            rank[num] = i;
        }

        let mut idom = vec![None; n];
        if n > 0 {
            idom[0] = Some(0);
        }

        let mut changed = true;
        while changed {
            changed = false;
            for &num in rpo.iter().skip(1) {
                let mut new_idom: Option<usize> = None;
                for &p in &predecessors[num] {
                    if idom[p].is_none() {
                        continue;
                    }
                    new_idom = match new_idom {
                        None => Some(p),
                        Some(current) => Some(intersect(&idom, &rank, p, current)),
                    };
                }
                if new_idom.is_some() && idom[num] != new_idom {
                    idom[num] = new_idom;
                    changed = true;
                }
            }
        }

        Self {
            generation: cfg.generation(),
            idom,
        }
    }

    /// Graph generation this tree was computed for.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Returns `true` if no block-level edit happened since the tree was computed.
    #[must_use]
    pub fn is_current(&self, cfg: &ControlFlowGraph) -> bool {
        self.generation == cfg.generation() && self.idom.len() == cfg.num_blocks()
    }

    /// Number of blocks covered.
    #[must_use]
    pub fn len(&self) -> usize {
        self.idom.len()
    }

    /// Returns `true` if the tree covers no block.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.idom.is_empty()
    }

    /// Immediate dominator of block `num`.
    ///
    /// `None` for the entry block, for unreachable blocks and for numbers out
    /// of range.
    #[must_use]
    pub fn immediate_dominator(&self, num: usize) -> Option<usize> {
        if num == 0 {
            return None;
        }
        self.idom.get(num).copied().flatten()
    }

    /// Returns `true` if block `num` is reachable from the entry.
    #[must_use]
    pub fn is_reachable(&self, num: usize) -> bool {
        self.idom.get(num).is_some_and(Option::is_some)
    }

    /// Returns `true` if block `a` dominates block `b`. A block dominates
    /// itself; unreachable blocks are dominated by nothing.
    #[must_use]
    pub fn dominates(&self, a: usize, b: usize) -> bool {
        self.dominators(b).any(|d| d == a)
    }

    /// [`dominates`](Self::dominates) excluding `a == b`.
    #[must_use]
    pub fn strictly_dominates(&self, a: usize, b: usize) -> bool {
        a != b && self.dominates(a, b)
    }

    /// Depth of block `num` in the tree; the entry has depth 0.
    #[must_use]
    pub fn depth(&self, num: usize) -> Option<usize> {
        self.is_reachable(num)
            .then(|| self.dominators(num).count() - 1)
    }

    /// Blocks whose immediate dominator is `num`, in program order.
    #[must_use]
    pub fn children(&self, num: usize) -> Vec<usize> {
        (1..self.idom.len())
            .filter(|&b| self.idom[b] == Some(num))
            .collect()
    }

    /// Dominators of `num` from the block itself up to the entry. Empty for
    /// an unreachable block.
    pub fn dominators(&self, num: usize) -> Dominators<'_> {
        Dominators {
            tree: self,
            current: self.is_reachable(num).then_some(num),
        }
    }
}

/// Walks `a` and `b` towards the entry until they meet, comparing positions
/// in reverse postorder.
///
/// Both blocks must already have a dominator. Every processed block's
/// dominator precedes it in `rank`, so the walk ends at the entry at the
/// latest.
fn intersect(idom: &[Option<usize>], rank: &[usize], mut a: usize, mut b: usize) -> usize {
    while a != b {
        while rank[a] > rank[b] {
            match idom[a] {
                Some(next) if next != a => a = next,
                _ => return 0,
            }
        }
        while rank[b] > rank[a] {
            match idom[b] {
                Some(next) if next != b => b = next,
                _ => return 0,
            }
        }
    }
    a
}

/// Reverse postorder of the blocks reachable from block 0.
fn reverse_postorder(successors: &[Vec<usize>]) -> Vec<usize> {
    #[derive(Clone, Copy)]
    enum State {
        Enter,
        Exit,
    }

    if successors.is_empty() {
        return Vec::new();
    }
    let mut visited = vec![false; successors.len()];
    let mut order = Vec::with_capacity(successors.len());
    let mut stack = vec![(0, State::Enter)];

    while let Some((num, state)) = stack.pop() {
        match state {
            State::Enter => {
                if visited[num] {
                    continue;
                }
                visited[num] = true;
                stack.push((num, State::Exit));
                for &succ in successors[num].iter().rev() {
                    if !visited[succ] {
                        stack.push((succ, State::Enter));
                    }
                }
            }
            State::Exit => order.push(num),
        }
    }

    order.reverse();
    order
}

/// Iterator returned by [`DominanceTree::dominators`].
pub struct Dominators<'a> {
    tree: &'a DominanceTree,
    current: Option<usize>,
}

impl Iterator for Dominators<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        let current = self.current?;
        self.current = self.tree.immediate_dominator(current);
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        cfg::{ControlFlowGraph, EdgeKind},
        ir::{Instruction, Opcode, Reg},
    };

    fn op(opcode: Opcode) -> Instruction {
        Instruction::new(opcode)
    }

    fn alu(nr: u32) -> Instruction {
        Instruction::new(Opcode::Mov).dst(Reg::vgrf(nr)).src(Reg::imm(nr))
    }

    #[test]
    fn test_diamond() {
        let cfg = ControlFlowGraph::build(vec![
            op(Opcode::If).predicated(false),
            alu(0),
            op(Opcode::Else),
            alu(1),
            op(Opcode::Endif),
        ]);
        let tree = cfg.dominance();
        assert_eq!(tree.len(), 4);
        assert_eq!(tree.immediate_dominator(1), Some(0));
        assert_eq!(tree.immediate_dominator(2), Some(0));
        assert_eq!(tree.immediate_dominator(3), Some(0));
        assert_eq!(tree.children(0), vec![1, 2, 3]);
        assert_eq!(tree.depth(3), Some(1));
        assert!(tree.strictly_dominates(0, 3));
        assert!(!tree.strictly_dominates(3, 3));
        assert!(tree.dominates(3, 3));
    }

    #[test]
    fn test_loop_with_back_edge() {
        let cfg = ControlFlowGraph::build(vec![
            alu(0),
            op(Opcode::Do),
            alu(1),
            op(Opcode::Break).predicated(false),
            alu(2),
            op(Opcode::While).predicated(false),
            alu(3),
        ]);
        // b0{mov} b1{do} b2{mov,break} b3{mov,while} b4{mov}
        let tree = cfg.dominance();
        assert_eq!(tree.immediate_dominator(1), Some(0));
        assert_eq!(tree.immediate_dominator(2), Some(1));
        assert_eq!(tree.immediate_dominator(3), Some(2));
        assert_eq!(tree.immediate_dominator(4), Some(1));
        assert_eq!(tree.dominators(3).collect::<Vec<_>>(), vec![3, 2, 1, 0]);
    }

    #[test]
    fn test_unreachable_block() {
        let cfg = ControlFlowGraph::from_parts(
            vec![vec![alu(0)], vec![alu(1)], vec![alu(2)]],
            [(0, 2, EdgeKind::Logical)],
        )
        .unwrap();
        let tree = cfg.dominance();
        assert!(!tree.is_reachable(1));
        assert_eq!(tree.immediate_dominator(1), None);
        assert_eq!(tree.immediate_dominator(2), Some(0));
        assert!(!tree.dominates(0, 1));
        assert_eq!(tree.depth(1), None);
        assert_eq!(tree.dominators(1).count(), 0);
    }

    #[test]
    fn test_program_order_need_not_be_reverse_postorder() {
        // B2 is laid out after B1 but branches to it.
        let cfg = ControlFlowGraph::from_parts(
            (0..5).map(|i| vec![alu(i)]).collect(),
            [
                (0, 2, EdgeKind::Logical),
                (2, 1, EdgeKind::Logical),
                (0, 3, EdgeKind::Logical),
                (1, 4, EdgeKind::Logical),
                (3, 4, EdgeKind::Logical),
            ],
        )
        .unwrap();
        let tree = cfg.dominance();
        assert_eq!(tree.immediate_dominator(1), Some(2));
        assert_eq!(tree.immediate_dominator(2), Some(0));
        assert_eq!(tree.immediate_dominator(3), Some(0));
        assert_eq!(tree.immediate_dominator(4), Some(0));
        assert!(tree.dominates(2, 1));
        assert!(!tree.dominates(1, 4));
        assert_eq!(tree.children(0), vec![2, 3, 4]);
    }

    #[test]
    fn test_backward_branch_into_later_loop() {
        // B0 jumps over B1 into a loop B2 <-> B1 entered at B2.
        let cfg = ControlFlowGraph::from_parts(
            (0..4).map(|i| vec![alu(i)]).collect(),
            [
                (0, 2, EdgeKind::Logical),
                (2, 1, EdgeKind::Logical),
                (1, 2, EdgeKind::Logical),
                (1, 3, EdgeKind::Logical),
            ],
        )
        .unwrap();
        let tree = cfg.dominance();
        assert_eq!(tree.immediate_dominator(2), Some(0));
        assert_eq!(tree.immediate_dominator(1), Some(2));
        assert_eq!(tree.immediate_dominator(3), Some(1));
        assert_eq!(tree.dominators(3).collect::<Vec<_>>(), vec![3, 1, 2, 0]);
    }

    #[test]
    fn test_cache_follows_generation() {
        let mut cfg = ControlFlowGraph::build(vec![
            op(Opcode::If).predicated(false),
            alu(0),
            op(Opcode::Endif),
        ]);
        let stale = cfg.dominance().clone();
        assert!(stale.is_current(&cfg));

        let (b0, b2) = (cfg.id_at(0).unwrap(), cfg.id_at(2).unwrap());
        cfg.remove_edge(b0, b2);
        assert!(!stale.is_current(&cfg));
        let fresh = cfg.dominance();
        assert!(fresh.is_current(&cfg));
        assert_eq!(fresh.immediate_dominator(2), Some(1));
    }
}
