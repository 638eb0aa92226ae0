//! Block handles and typed CFG edges.
//!
//! Every edge of the graph is recorded twice, once as a child link of its
//! source block and once as a parent link of its destination, always with the
//! same [`EdgeKind`].

use std::fmt;

/// A stable handle to a basic block.
///
/// `BlockId` indexes the block arena of a [`crate::cfg::ControlFlowGraph`]. It
/// never changes for the lifetime of the block, unlike the block's sequence
/// number which shifts whenever an earlier block is removed. Handles of removed
/// blocks are never reused.
///
/// # Examples
///
/// ```rust
/// use simdcfg::cfg::BlockId;
///
/// let id = BlockId::new(3);
/// assert_eq!(id.index(), 3);
/// assert_eq!(format!("{id:?}"), "BlockId(3)");
/// assert_eq!(id.to_string(), "b3");
/// ```
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockId(pub(crate) usize);

impl BlockId {
    /// Creates a handle from a raw arena index.
    ///
    /// Intended for tests and tooling; handles are normally obtained from the graph.
    #[must_use]
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    /// Returns the raw arena index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Debug for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockId({})", self.0)
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "b{}", self.0)
    }
}

impl From<usize> for BlockId {
    fn from(index: usize) -> Self {
        Self(index)
    }
}

impl From<BlockId> for usize {
    fn from(id: BlockId) -> Self {
        id.0
    }
}

/// Divergence class of a CFG edge.
///
/// A `Logical` edge is a path of the scalar per-channel program. A `Physical`
/// edge exists only for the SIMD thread as a whole, taken by channels that
/// diverged away. Every logical edge is also a physical path, which is why the
/// kinds are ordered `Logical < Physical`: the smaller kind of two edges
/// between the same blocks covers the larger one.
///
/// # Examples
///
/// ```rust
/// use simdcfg::cfg::EdgeKind;
///
/// assert!(EdgeKind::Logical < EdgeKind::Physical);
/// assert_eq!(EdgeKind::Logical.max(EdgeKind::Physical), EdgeKind::Physical);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EdgeKind {
    /// Control flow of the per-channel program.
    Logical,
    /// Control flow of the SIMD thread only.
    Physical,
}

impl EdgeKind {
    /// Dump marker for a predecessor link: `-` for logical, `~` for physical.
    #[must_use]
    pub const fn marker(self) -> char {
        match self {
            Self::Logical => '-',
            Self::Physical => '~',
        }
    }
}

/// One end of an edge as stored in a block's parent or child list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockLink {
    /// The block on the other end of the edge.
    pub block: BlockId,
    /// The edge kind.
    pub kind: EdgeKind,
}

impl BlockLink {
    /// Creates a link to `block`.
    #[must_use]
    pub const fn new(block: BlockId, kind: EdgeKind) -> Self {
        Self { block, kind }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_id_conversions() {
        let id: BlockId = 7usize.into();
        assert_eq!(usize::from(id), 7);
        assert_eq!(id, BlockId::new(7));
        assert!(BlockId::new(1) < BlockId::new(2));
    }

    #[test]
    fn test_kind_order_and_markers() {
        assert_eq!(EdgeKind::Physical.min(EdgeKind::Logical), EdgeKind::Logical);
        assert_eq!(EdgeKind::Logical.marker(), '-');
        assert_eq!(EdgeKind::Physical.marker(), '~');
    }
}
