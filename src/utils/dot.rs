//! Graphviz helpers for [`crate::cfg::ControlFlowGraph::to_dot`].

/// Escapes text for a Graphviz `record` label.
///
/// Record labels give `{ } | < >` structural meaning, so they are escaped along
/// with quotes and backslashes. Line breaks become `\l` so every instruction
/// line is left-justified inside its block.
#[must_use]
pub fn escape_record_label(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 8);
    for c in text.chars() {
        match c {
            '\\' | '"' | '{' | '}' | '|' | '<' | '>' => {
                out.push('\\');
                out.push(c);
            }
            '\n' => out.push_str("\\l"),
            '\r' => {}
            _ => out.push(c),
        }
    }
    out
}
