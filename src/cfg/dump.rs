//! Textual and Graphviz renderings of a [`ControlFlowGraph`].
//!
//! The text form is stable and meant to be diffed in tests:
//!
//! ```text
//! START B0 IDOM(none)
//!    0: (+f0.0) if(8)
//! END B0 ->B1 ->B2
//! START B1 IDOM(B0) <-B0
//!    1: mov(8) vgrf0, 1u
//! END B1 ->B2
//! START B2 IDOM(B0) <-B0 <-B1
//!    2: endif(8)
//! END B2
//! ```
//!
//! Predecessor links are printed on the `START` line as `<-B<n>` (logical) or
//! `<~B<n>` (physical), successors on the `END` line as `->B<n>` or `~>B<n>`,
//! both sorted by block number.

use std::fmt::Write;

use crate::{
    cfg::{BasicBlock, BlockLink, ControlFlowGraph, EdgeKind},
    utils::escape_record_label,
};

impl ControlFlowGraph {
    fn sorted_links(&self, links: &[BlockLink]) -> Vec<(usize, EdgeKind)> {
        let mut out: Vec<_> = links
            .iter()
            .filter_map(|l| self.get(l.block).map(|b| (b.num, l.kind)))
            .collect();
        out.sort_unstable();
        out
    }

    fn idom_label(&self, block: &BasicBlock) -> String {
        match self.dominance().immediate_dominator(block.num) {
            Some(idom) => format!("B{idom}"),
            None => "none".to_string(),
        }
    }

    /// Renders the graph in the diffable text format described in the module docs.
    #[must_use]
    pub fn dump(&self) -> String {
        let mut out = String::new();
        for block in self.blocks() {
            let _ = write!(out, "START B{} IDOM({})", block.num, self.idom_label(block));
            for (num, kind) in self.sorted_links(&block.parents) {
                let _ = write!(out, " <{}B{num}", kind.marker());
            }
            out.push('\n');
            for (i, inst) in block.instructions.iter().enumerate() {
                let _ = writeln!(out, "{:4}: {inst}", block.start_ip + i);
            }
            let _ = write!(out, "END B{}", block.num);
            for (num, kind) in self.sorted_links(&block.children) {
                let _ = write!(out, " {}>B{num}", kind.marker());
            }
            out.push('\n');
        }
        out
    }

    /// Renders the graph in Graphviz DOT format.
    ///
    /// Each block is a record node listing its instructions; physical edges are
    /// drawn dashed.
    #[must_use]
    pub fn to_dot(&self, title: Option<&str>) -> String {
        let mut dot = String::new();

        dot.push_str("digraph CFG {\n");
        if let Some(name) = title {
            let _ = writeln!(dot, "    label=\"{}\";", escape_record_label(name));
        }
        dot.push_str("    labelloc=t;\n");
        dot.push_str("    node [shape=record, fontname=\"Courier\", fontsize=10];\n\n");

        for block in self.blocks() {
            let mut body = String::new();
            for (i, inst) in block.instructions.iter().enumerate() {
                let _ = writeln!(body, "{:4}: {inst}", block.start_ip + i);
            }
            let _ = writeln!(
                dot,
                "    B{num} [label=\"{{B{num} IDOM({idom})|{body}}}\"];",
                num = block.num,
                idom = self.idom_label(block),
                body = escape_record_label(&body),
            );
        }

        dot.push('\n');
        for block in self.blocks() {
            for (num, kind) in self.sorted_links(&block.children) {
                let style = match kind {
                    EdgeKind::Logical => "",
                    EdgeKind::Physical => " [style=dashed]",
                };
                let _ = writeln!(dot, "    B{} -> B{num}{style};", block.num);
            }
        }
        dot.push_str("}\n");
        dot
    }
}
