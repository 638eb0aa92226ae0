//! Scheduling DAG of one block.

use crate::{
    compiler::DeviceInfo,
    ir::{Instruction, Opcode},
    scheduler::latency,
};

/// Edge to a node that must wait for this one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Dependent {
    pub node: usize,
    /// Cycles the dependent has to wait after this node issued.
    pub latency: u32,
}

#[derive(Debug, Clone)]
pub(crate) struct ScheduleNode {
    pub latency: u32,
    pub issue_time: u32,
    pub children: Vec<Dependent>,
    /// Parents not yet scheduled.
    pub parent_count: usize,
    /// Earliest cycle the node can issue given its scheduled parents.
    pub unblocked_time: u32,
    /// Optimistic lower bound of `unblocked_time`, ignoring resource limits.
    pub initial_unblocked_time: u32,
    /// Length of the critical path from this node to the end of the block.
    pub delay: u32,
    /// The exit node (HALT) this node unblocks soonest.
    pub exit: Option<usize>,
    /// Scheduling step at which the node last had a parent scheduled.
    pub cand_generation: u32,
    pub is_exit: bool,
}

/// Nodes indexed by original position in the block.
///
/// Edges always point from a lower to a higher index, so program order is a
/// topological order.
#[derive(Debug, Clone)]
pub(crate) struct DependencyGraph {
    pub nodes: Vec<ScheduleNode>,
}

impl DependencyGraph {
    pub fn new(insts: &[Instruction], device: &DeviceInfo, post_reg_alloc: bool) -> Self {
        let nodes = insts
            .iter()
            .map(|inst| ScheduleNode {
                latency: latency::latency(inst, device, post_reg_alloc),
                issue_time: latency::issue_time(inst),
                children: Vec::new(),
                parent_count: 0,
                unblocked_time: 0,
                initial_unblocked_time: 0,
                delay: 0,
                exit: None,
                cand_generation: 0,
                is_exit: inst.opcode == Opcode::Halt,
            })
            .collect();
        Self { nodes }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Makes `after` wait for `before`.
    ///
    /// `latency` defaults to the latency of `before`. A repeated edge keeps a
    /// single entry with the larger latency. Missing endpoints are ignored so
    /// callers can pass tracker slots directly.
    pub fn add_dep(&mut self, before: Option<usize>, after: Option<usize>, latency: Option<u32>) {
        let (Some(before), Some(after)) = (before, after) else {
            return;
        };
        if before == after {
            return;
        }
        let latency = latency.unwrap_or(self.nodes[before].latency);
        let children = &mut self.nodes[before].children;
        if let Some(existing) = children.iter_mut().find(|d| d.node == after) {
            existing.latency = existing.latency.max(latency);
            return;
        }
        children.push(Dependent { node: after, latency });
        self.nodes[after].parent_count += 1;
    }

    /// Returns `true` if `after` directly depends on `before`.
    #[cfg(test)]
    pub fn has_dep(&self, before: usize, after: usize) -> bool {
        self.edge_latency(before, after).is_some()
    }

    #[cfg(test)]
    pub fn edge_latency(&self, before: usize, after: usize) -> Option<u32> {
        self.nodes[before]
            .children
            .iter()
            .find(|d| d.node == after)
            .map(|d| d.latency)
    }

    /// Critical path lengths, bottom-up.
    pub fn compute_delays(&mut self) {
        for n in (0..self.len()).rev() {
            let node = &self.nodes[n];
            let delay = if node.children.is_empty() {
                node.issue_time
            } else {
                node.children
                    .iter()
                    .map(|d| node.latency + self.nodes[d.node].delay)
                    .max()
                    .unwrap_or(0)
            };
            self.nodes[n].delay = delay;
        }
    }

    /// Optimistic unblock times top-down, then for every node the exit node
    /// among its descendants that can be unblocked first.
    pub fn compute_exits(&mut self) {
        for n in 0..self.len() {
            let ready = self.nodes[n].initial_unblocked_time + self.nodes[n].issue_time;
            for i in 0..self.nodes[n].children.len() {
                let Dependent { node, latency } = self.nodes[n].children[i];
                let child = &mut self.nodes[node];
                child.initial_unblocked_time = child.initial_unblocked_time.max(ready + latency);
            }
        }

        for n in (0..self.len()).rev() {
            let mut exit = self.nodes[n].is_exit.then_some(n);
            for d in &self.nodes[n].children {
                let child_exit = self.nodes[d.node].exit;
                if self.initial_exit_time(child_exit) < self.initial_exit_time(exit) {
                    exit = child_exit;
                }
            }
            self.nodes[n].exit = exit;
        }
    }

    fn initial_exit_time(&self, exit: Option<usize>) -> u32 {
        exit.map_or(u32::MAX, |e| self.nodes[e].initial_unblocked_time)
    }

    /// Current unblock time of the exit preferred by `n`, `u32::MAX` if `n`
    /// leads to no exit. Moves as the exit's parents are scheduled.
    pub fn exit_unblocked_time(&self, n: usize) -> u32 {
        self.nodes[n]
            .exit
            .map_or(u32::MAX, |e| self.nodes[e].unblocked_time)
    }
}
