use std::mem;

use crate::arena::ArenaId;

/// Header size of a block. Every block reserves this many bytes of its arena
/// in front of the payload, so the arena layout accounts for the header even
/// though the header record itself lives in the arena's block table.
pub const HEADER_SIZE: usize = mem::size_of::<Block>();

/// Index of a [`Block`] inside its arena's block table. Ids are stable: a
/// block keeps its id until a coalesce absorbs it into its predecessor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub(crate) u32);

impl BlockId {
    #[inline]
    pub(crate) const fn index(self) -> usize {
        self.0 as usize
    }
}

/// This is the structure of a block header. The fields of the block are its
/// metadata, content is placed after the reserved header bytes.
///
/// ```text
/// arena base + offset
/// +---------------------+ <------+
/// |   reserved header   |        | -> HEADER_SIZE bytes
/// +---------------------+ <------+
/// |       Content       |        |
/// |         ...         |        | -> `size` bytes of addressable content
/// |         ...         |        |
/// +---------------------+ <------+
/// ```
///
/// Blocks of an arena form a singly linked chain in memory layout order
/// through [`Block::next`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Block {
    /// Offset of the header from the start of the arena.
    pub offset: usize,
    /// Size of the payload, header excluded.
    pub size: usize,
    /// Next block in the arena, if any.
    pub next: Option<BlockId>,
    /// Flag to tell whether the block is handed out or not.
    pub used: bool,
}

impl Block {
    pub(crate) const fn new(offset: usize, size: usize) -> Self {
        Self {
            offset,
            size,
            next: None,
            used: false,
        }
    }

    /// Offset of the first payload byte from the start of the arena.
    #[inline]
    pub(crate) const fn payload_offset(&self) -> usize {
        self.offset + HEADER_SIZE
    }
}

/// A non-owning reference to an allocated payload.
///
/// Handles are plain `(arena, block)` coordinates. They stay meaningful only
/// for the [`crate::Heap`] that produced them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle {
    pub(crate) arena: ArenaId,
    pub(crate) block: BlockId,
}

impl Handle {
    pub(crate) const fn new(arena: ArenaId, block: BlockId) -> Self {
        Self { arena, block }
    }

    pub const fn arena(&self) -> ArenaId {
        self.arena
    }

    pub const fn block(&self) -> BlockId {
        self.block
    }
}
