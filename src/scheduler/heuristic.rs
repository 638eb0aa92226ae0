//! Candidate selection.
//!
//! Each heuristic is an ordered list of comparison keys chained with
//! [`Ordering::then_with`]. A key returns [`Ordering::Less`] when its first
//! argument is the better candidate. When every key ties, the candidate met
//! first in the available list wins.

use std::cmp::Ordering;

use crate::scheduler::{node::DependencyGraph, ScheduleMode};

/// What the comparison keys see of one candidate.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Candidate {
    pub node: usize,
    /// Register pressure benefit, 0 when pressure is not tracked.
    pub benefit: i64,
}

/// Prefers the candidate leading to the exit that can currently be unblocked
/// first.
fn by_exit(g: &DependencyGraph, a: Candidate, b: Candidate) -> Ordering {
    g.exit_unblocked_time(a.node).cmp(&g.exit_unblocked_time(b.node))
}

/// Prefers the candidate that can issue earlier.
fn by_unblocked_time(g: &DependencyGraph, a: Candidate, b: Candidate) -> Ordering {
    g.nodes[a.node].unblocked_time.cmp(&g.nodes[b.node].unblocked_time)
}

/// Prefers a candidate that definitely reduces pressure by more than the other.
fn by_pressure(a: Candidate, b: Candidate) -> Ordering {
    if a.benefit > 0 && a.benefit > b.benefit {
        Ordering::Less
    } else if b.benefit > 0 && b.benefit > a.benefit {
        Ordering::Greater
    } else {
        Ordering::Equal
    }
}

/// Prefers the candidate that became available most recently.
fn by_generation(g: &DependencyGraph, a: Candidate, b: Candidate) -> Ordering {
    g.nodes[b.node].cand_generation.cmp(&g.nodes[a.node].cand_generation)
}

/// Prefers the longer critical path.
fn by_delay(g: &DependencyGraph, a: Candidate, b: Candidate) -> Ordering {
    g.nodes[b.node].delay.cmp(&g.nodes[a.node].delay)
}

/// Prefers the earlier instruction in program order.
fn by_program_order(a: Candidate, b: Candidate) -> Ordering {
    a.node.cmp(&b.node)
}

/// Compares two candidates under `mode`.
pub(crate) fn compare(mode: ScheduleMode, g: &DependencyGraph, a: Candidate, b: Candidate) -> Ordering {
    match mode {
        ScheduleMode::Pre | ScheduleMode::Post => {
            by_exit(g, a, b).then_with(|| by_unblocked_time(g, a, b))
        }
        ScheduleMode::PreNonLifo => by_pressure(a, b)
            .then_with(|| by_delay(g, a, b))
            .then_with(|| by_exit(g, a, b)),
        ScheduleMode::PreLifo => by_pressure(a, b)
            .then_with(|| by_generation(g, a, b))
            .then_with(|| by_delay(g, a, b))
            .then_with(|| by_exit(g, a, b)),
        ScheduleMode::None => by_program_order(a, b),
    }
}

/// Position in `available` of the candidate to schedule next.
pub(crate) fn choose(
    mode: ScheduleMode,
    g: &DependencyGraph,
    available: impl IntoIterator<Item = Candidate>,
) -> Option<usize> {
    let mut best: Option<(usize, Candidate)> = None;
    for (pos, candidate) in available.into_iter().enumerate() {
        match best {
            Some((_, chosen)) if compare(mode, g, candidate, chosen) != Ordering::Less => {}
            _ => best = Some((pos, candidate)),
        }
    }
    best.map(|(pos, _)| pos)
}
