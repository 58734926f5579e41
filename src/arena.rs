use std::{iter, ptr::NonNull, slice};

use crate::{
    block::{Block, BlockId, HEADER_SIZE},
    kernel,
    utils::checked_align,
};

/// Index of an [`Arena`] in acquisition order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArenaId(pub(crate) u32);

impl ArenaId {
    #[inline]
    pub(crate) const fn index(self) -> usize {
        self.0 as usize
    }
}

/// One page aligned memory region obtained from [`kernel::request_memory`].
///
/// The OS gives us memory in whole pages and we cannot assume two regions
/// are adjacent, so each arena carries its own chain of [`Block`]. The
/// headers live in `blocks`; the arena memory only holds the reserved
/// header bytes and the payloads.
///
/// ```text
/// +-----------------------------------------------+      +-----------------------------------------------+
/// |        | +-------+    +-------+    +-------+  |      |        | +-------+    +-------+    +-------+  |
/// | Arena  | | Block | -> | Block | -> | Block |  | ---> | Arena  | | Block | -> | Block | -> | Block |  |
/// |        | +-------+    +-------+    +-------+  |      |        | +-------+    +-------+    +-------+  |
/// +-----------------------------------------------+      +-----------------------------------------------+
/// ```
///
/// The first block always sits at offset 0 and is never absorbed, so it is
/// the head of the chain for the arena's whole life.
pub(crate) struct Arena {
    /// Start of the region returned by the kernel.
    base: NonNull<u8>,
    /// Size of the region in bytes.
    len: usize,
    /// Block table. `None` marks a slot retired by a coalesce. Retired slots
    /// are never handed out again, so a stale [`BlockId`] cannot name a newer
    /// block.
    blocks: Vec<Option<Block>>,
}

impl Arena {
    pub(crate) const HEAD: BlockId = BlockId(0);

    /// Bytes to map so that a block of `min_payload` bytes fits, rounded up
    /// to `page_size`. `None` if the computation overflows.
    pub(crate) fn region_size(min_payload: usize, page_size: usize) -> Option<usize> {
        min_payload
            .checked_add(HEADER_SIZE)
            .and_then(|needed| checked_align(needed, page_size))
    }

    /// Maps a fresh region of `len` bytes and seeds it with one free block
    /// spanning all of it. Returns `None` if the kernel refuses.
    pub(crate) fn acquire(len: usize) -> Option<Self> {
        debug_assert!(len >= HEADER_SIZE);

        let base = unsafe { kernel::request_memory(len)? };

        Some(Self {
            base,
            len,
            blocks: vec![Some(Block::new(0, len - HEADER_SIZE))],
        })
    }

    #[inline]
    pub(crate) fn block(&self, id: BlockId) -> Option<&Block> {
        self.blocks.get(id.index())?.as_ref()
    }

    #[inline]
    pub(crate) fn block_mut(&mut self, id: BlockId) -> Option<&mut Block> {
        self.blocks.get_mut(id.index())?.as_mut()
    }

    /// Walks the blocks in memory layout order.
    pub(crate) fn chain(&self) -> impl Iterator<Item = (BlockId, &Block)> + '_ {
        let mut cursor = Some(Self::HEAD);

        iter::from_fn(move || {
            let id = cursor?;
            let block = self.block(id)?;
            cursor = block.next;
            Some((id, block))
        })
    }

    #[inline]
    pub(crate) fn payload_ptr(&self, block: &Block) -> NonNull<u8> {
        // SAFETY: every block lies inside the mapped region.
        unsafe { self.base.add(block.payload_offset()) }
    }

    pub(crate) fn payload(&self, block: &Block) -> &[u8] {
        // SAFETY: the payload lies inside the mapped region, which lives as
        // long as `self`.
        unsafe { slice::from_raw_parts(self.payload_ptr(block).as_ptr(), block.size) }
    }

    pub(crate) fn payload_mut(&mut self, block: &Block) -> &mut [u8] {
        // SAFETY: same as `payload`; `&mut self` keeps the slice unique.
        unsafe { slice::from_raw_parts_mut(self.payload_ptr(block).as_ptr(), block.size) }
    }

    /// Carves block `id` into a `size` byte prefix and a free remainder
    /// spliced right after it. Nothing happens unless the remainder can hold
    /// at least a header, so the caller may end up with a larger block than
    /// asked for. Returns the id of the remainder.
    pub(crate) fn split(&mut self, id: BlockId, size: usize) -> Option<BlockId> {
        let block = *self.block(id)?;

        if block.size < size.checked_add(HEADER_SIZE)? {
            return None;
        }

        let remainder = Block {
            offset: block.payload_offset() + size,
            size: block.size - size - HEADER_SIZE,
            next: block.next,
            used: false,
        };

        let remainder_id = self.insert(remainder)?;

        let block = self.block_mut(id)?;
        block.size = size;
        block.next = Some(remainder_id);

        Some(remainder_id)
    }

    /// Page of `page_size` bytes holding arena offset `offset`, counted from
    /// address zero. The kernel only guarantees OS page alignment for `base`,
    /// so larger configured pages may straddle the arena start.
    #[inline]
    fn page_index(&self, offset: usize, page_size: usize) -> usize {
        (self.base.as_ptr() as usize + offset) / page_size
    }

    /// Single forward pass merging every pair of free neighbours whose
    /// header addresses fall in the same page. After a merge the same position is
    /// examined again, so a run of free blocks collapses in one pass.
    /// Returns how many blocks were absorbed.
    pub(crate) fn coalesce(&mut self, page_size: usize) -> usize {
        let mut absorbed = 0;
        let mut cursor = Some(Self::HEAD);

        while let Some(id) = cursor {
            let Some(&block) = self.block(id) else { break };
            let Some(next_id) = block.next else { break };
            let Some(&next) = self.block(next_id) else { break };

            let same_page =
                self.page_index(block.offset, page_size) == self.page_index(next.offset, page_size);

            if !block.used && !next.used && same_page {
                self.retire(next_id);

                if let Some(block) = self.block_mut(id) {
                    block.size += HEADER_SIZE + next.size;
                    block.next = next.next;
                }

                absorbed += 1;
            } else {
                cursor = Some(next_id);
            }
        }

        absorbed
    }

    fn insert(&mut self, block: Block) -> Option<BlockId> {
        let id = BlockId(u32::try_from(self.blocks.len()).ok()?);
        self.blocks.push(Some(block));

        Some(id)
    }

    fn retire(&mut self, id: BlockId) {
        if let Some(slot) = self.blocks.get_mut(id.index()) {
            *slot = None;
        }
    }
}

impl Drop for Arena {
    fn drop(&mut self) {
        unsafe { kernel::return_memory(self.base, self.len) }
    }
}
