//! Small shared data structures.

mod bitset;
mod dot;

pub use bitset::{BitSet, BitSetIter};
pub use dot::escape_record_label;
