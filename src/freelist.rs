use crate::{
    arena::{Arena, ArenaId},
    block::{Block, Handle},
    strategy::Strategy,
};

/// Read-only view of the heap-wide chain of blocks.
///
/// Every [`Block`] ever created is on the chain, free or not. The order is
/// arena acquisition order and, inside an arena, memory layout order:
///
/// ```text
///                       Arena 0                                         Arena 1
/// +---------------------------------------------+      +----------------------------------------------+
/// | +------+    +-------+    +------+           |      | +-------+    +------+    +-------+           |
/// | | Used | -> | Free  | -> | Used |  ---------|----->| | Used  | -> | Free | -> | Free  |           |
/// | +------+    +-------+    +------+           |      | +-------+    +------+    +-------+           |
/// +---------------------------------------------+      +----------------------------------------------+
/// ```
///
/// Free blocks are identified by [`Block::used`] being `false`; placement
/// strategies skip the used ones.
#[derive(Clone, Copy)]
pub(crate) struct FreeList<'a> {
    arenas: &'a [Arena],
}

impl<'a> FreeList<'a> {
    pub const fn new(arenas: &'a [Arena]) -> Self {
        Self { arenas }
    }

    /// Walks the whole chain, head to tail.
    pub fn blocks(self) -> impl Iterator<Item = (Handle, &'a Arena, &'a Block)> + 'a {
        self.arenas
            .iter()
            .enumerate()
            .flat_map(|(index, arena)| {
                let id = ArenaId(index as u32);

                arena
                    .chain()
                    .map(move |(block_id, block)| (Handle::new(id, block_id), arena, block))
            })
    }

    /// Returns the block where `size` bytes should go according to
    /// `strategy`, or `None` if no free block is large enough.
    pub fn find_free_block(self, size: usize, strategy: Strategy) -> Option<Handle> {
        let candidates = self
            .blocks()
            .filter(|(_, _, block)| !block.used)
            .map(|(handle, _, block)| (handle, block.size));

        let chosen = strategy.select(size, candidates);

        log::trace!(target: "smalloc", "{strategy} for {size} bytes -> {chosen:?}");

        chosen
    }
}
