use std::ptr::{self, NonNull};

use crate::{
    arena::{Arena, ArenaId},
    block::{Block, Handle},
    config::HeapConfig,
    error::AllocError,
    freelist::FreeList,
    strategy::Strategy,
};

/// A single-threaded heap carved out of pages requested to the OS.
///
/// The heap owns a list of [`Arena`], each one holding a chain of blocks. All
/// the chains together form the heap-wide free list the placement strategies
/// scan:
///
/// ```text
///                   Next                        Next
///             +--------------+            +--------------+
///             |              v            |              v
/// +-----------|--------------------+      +-----------|--------------------+
/// |        | Block | Block | Block |  --> |        | Block | Block | Block |
/// +--------------------------------+      +--------------------------------+
///               Arena 0                                 Arena 1
/// ```
///
/// Arenas are never given back while the heap is alive. Dropping the heap
/// returns all of them to the OS at once.
pub struct Heap {
    /// Arenas in acquisition order.
    arenas: Vec<Arena>,
    /// Arena granularity and coalescing boundary.
    page_size: usize,
    /// Limit on `acquired`, if any.
    max_bytes: Option<usize>,
    /// Total bytes mapped so far.
    acquired: usize,
}

impl Heap {
    /// Creates an empty heap using the OS page size. No memory is mapped
    /// until the first allocation.
    pub fn new() -> Result<Self, AllocError> {
        Self::with_config(HeapConfig::default())
    }

    pub fn with_config(config: HeapConfig) -> Result<Self, AllocError> {
        let page_size = config.resolve_page_size()?;

        Ok(Self {
            arenas: Vec::new(),
            page_size,
            max_bytes: config.max_bytes,
            acquired: 0,
        })
    }

    #[inline]
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    #[inline]
    pub(crate) fn acquired(&self) -> usize {
        self.acquired
    }

    #[inline]
    pub(crate) fn free_list(&self) -> FreeList<'_> {
        FreeList::new(&self.arenas)
    }

    /// Allocates at least `size` bytes using first-fit.
    ///
    /// If no free block can hold the request a new arena is mapped and the
    /// search is repeated.
    pub fn allocate(&mut self, size: usize) -> Result<Handle, AllocError> {
        if let Some(handle) = self.free_list().find_free_block(size, Strategy::FirstFit) {
            return Ok(self.claim(handle, size));
        }

        self.acquire_arena(size)?;

        let handle = self
            .free_list()
            .find_free_block(size, Strategy::FirstFit)
            .ok_or(AllocError::ResourceExhaustion { requested: size })?;

        Ok(self.claim(handle, size))
    }

    /// Allocates at least `size` bytes placing them according to `strategy`.
    ///
    /// When nothing fits, the heap grows and the request goes through
    /// [`Heap::allocate`], whatever `strategy` was asked for.
    pub fn allocate_with_strategy(
        &mut self,
        size: usize,
        strategy: Strategy,
    ) -> Result<Handle, AllocError> {
        match self.free_list().find_free_block(size, strategy) {
            Some(handle) => Ok(self.claim(handle, size)),
            None => self.allocate(size),
        }
    }

    /// Marks the block behind `handle` as free.
    ///
    /// A null or unknown handle and freeing an already free block are
    /// reported and leave the heap untouched. Neighbouring free blocks are
    /// not merged, see [`Heap::coalesce`].
    pub fn deallocate(&mut self, handle: impl Into<Option<Handle>>) -> Result<(), AllocError> {
        let Some(handle) = handle.into() else {
            log::error!(target: "smalloc", "attempt to free a null handle");
            return Err(AllocError::InvalidHandle);
        };

        let (addr, block) = match self.lookup(handle) {
            Ok((arena, block)) => (arena.payload_ptr(block), *block),
            Err(err) => {
                log::error!(target: "smalloc", "attempt to free unknown handle {handle:?}");
                return Err(err);
            }
        };

        if !block.used {
            log::error!(target: "smalloc", "double free detected at {addr:p}");
            return Err(AllocError::DoubleFree {
                addr: addr.as_ptr() as usize,
                size: block.size,
            });
        }

        if let Some(block) = self.block_mut(handle) {
            block.used = false;
        }

        log::debug!(target: "smalloc", "freeing memory at {addr:p}, size {}", block.size);

        Ok(())
    }

    /// Resizes the allocation behind `handle` to `new_size` bytes.
    ///
    /// Shrinking happens in place and returns the same handle; the tail is
    /// split off as a free block when it can hold a header. Growing moves
    /// the payload to a fresh first-fit block and frees the old one. Both
    /// paths finish with a [`Heap::coalesce`].
    ///
    /// A null handle is rejected rather than treated as a fresh allocation.
    /// If growing fails the original allocation is left as it was.
    pub fn reallocate(
        &mut self,
        handle: impl Into<Option<Handle>>,
        new_size: usize,
    ) -> Result<Handle, AllocError> {
        let Some(handle) = handle.into() else {
            log::error!(target: "smalloc", "attempt to reallocate a null handle");
            return Err(AllocError::InvalidHandle);
        };

        let current = match self.lookup_used(handle) {
            Ok((_, block)) => block.size,
            Err(err) => {
                log::error!(target: "smalloc", "attempt to reallocate dead handle {handle:?}");
                return Err(err);
            }
        };

        if new_size <= current {
            self.arenas[handle.arena.index()].split(handle.block, new_size);
            self.coalesce();

            return Ok(handle);
        }

        let moved = self.allocate(new_size).inspect_err(|err| {
            log::warn!(target: "smalloc", "failed to reallocate {handle:?} to {new_size} bytes: {err}");
        })?;

        let src = self.as_ptr(handle)?;
        let dst = self.as_ptr(moved)?;

        // SAFETY: both blocks are live and distinct, `moved` holds at least
        // `new_size > current` bytes.
        unsafe { ptr::copy_nonoverlapping(src.as_ptr(), dst.as_ptr(), current) };

        self.deallocate(handle)?;
        self.coalesce();

        Ok(moved)
    }

    /// Merges neighbouring free blocks whose headers share a page.
    ///
    /// Calling it again right away changes nothing.
    pub fn coalesce(&mut self) {
        let page_size = self.page_size;

        let absorbed: usize = self
            .arenas
            .iter_mut()
            .map(|arena| arena.coalesce(page_size))
            .sum();

        if absorbed > 0 {
            log::trace!(target: "smalloc", "coalesce absorbed {absorbed} blocks");
        }
    }

    /// Payload of a live allocation. It may be longer than requested.
    pub fn payload(&self, handle: Handle) -> Result<&[u8], AllocError> {
        let (arena, block) = self.lookup_used(handle)?;
        Ok(arena.payload(block))
    }

    pub fn payload_mut(&mut self, handle: Handle) -> Result<&mut [u8], AllocError> {
        let block = *self.lookup_used(handle)?.1;
        Ok(self.arenas[handle.arena.index()].payload_mut(&block))
    }

    pub fn as_ptr(&self, handle: Handle) -> Result<NonNull<u8>, AllocError> {
        let (arena, block) = self.lookup_used(handle)?;
        Ok(arena.payload_ptr(block))
    }

    /// Usable size of a live allocation.
    pub fn size_of(&self, handle: Handle) -> Result<usize, AllocError> {
        Ok(self.lookup_used(handle)?.1.size)
    }

    /// Maps a new arena able to hold `min_payload` bytes and appends it to
    /// the chain.
    fn acquire_arena(&mut self, min_payload: usize) -> Result<ArenaId, AllocError> {
        let exhausted = |reason: &str| {
            log::warn!(target: "smalloc", "cannot grow heap for {min_payload} bytes: {reason}");
            AllocError::ResourceExhaustion {
                requested: min_payload,
            }
        };

        let len = Arena::region_size(min_payload, self.page_size)
            .ok_or_else(|| exhausted("size overflow"))?;

        let total = self
            .acquired
            .checked_add(len)
            .ok_or_else(|| exhausted("size overflow"))?;

        if self.max_bytes.is_some_and(|max| total > max) {
            return Err(exhausted("heap limit reached"));
        }

        let id = u32::try_from(self.arenas.len())
            .map(ArenaId)
            .map_err(|_| exhausted("too many arenas"))?;

        let arena = Arena::acquire(len).ok_or_else(|| exhausted("mapping refused"))?;

        log::debug!(target: "smalloc", "acquired arena {} of {len} bytes", id.index());

        self.arenas.push(arena);
        self.acquired = total;

        Ok(id)
    }

    /// Splits the chosen free block down to `size` when worth it and hands
    /// it out.
    fn claim(&mut self, handle: Handle, size: usize) -> Handle {
        let arena = &mut self.arenas[handle.arena.index()];

        arena.split(handle.block, size);

        if let Some(block) = arena.block_mut(handle.block) {
            block.used = true;
        }

        handle
    }

    fn lookup(&self, handle: Handle) -> Result<(&Arena, &Block), AllocError> {
        let arena = self
            .arenas
            .get(handle.arena.index())
            .ok_or(AllocError::InvalidHandle)?;

        let block = arena.block(handle.block).ok_or(AllocError::InvalidHandle)?;

        Ok((arena, block))
    }

    fn lookup_used(&self, handle: Handle) -> Result<(&Arena, &Block), AllocError> {
        match self.lookup(handle)? {
            (arena, block) if block.used => Ok((arena, block)),
            _ => Err(AllocError::InvalidHandle),
        }
    }

    fn block_mut(&mut self, handle: Handle) -> Option<&mut Block> {
        self.arenas.get_mut(handle.arena.index())?.block_mut(handle.block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{block::HEADER_SIZE, dump::BlockInfo};

    fn heap() -> Heap {
        Heap::new().expect("heap")
    }

    fn chain(heap: &Heap) -> Vec<BlockInfo> {
        heap.blocks().collect()
    }

    fn info(heap: &Heap, handle: Handle) -> BlockInfo {
        heap.blocks()
            .find(|info| info.handle == handle)
            .expect("block not on the chain")
    }

    /// The block that follows `handle` on the chain.
    fn next(heap: &Heap, handle: Handle) -> BlockInfo {
        let blocks = chain(heap);
        let at = blocks.iter().position(|info| info.handle == handle).unwrap();
        blocks[at + 1]
    }

    fn assert_accounting(heap: &Heap) {
        let total: usize = heap.blocks().map(|info| HEADER_SIZE + info.size).sum();
        assert_eq!(total, heap.acquired());
    }

    /// Takes whatever is left in the tail free block so that the next
    /// request that does not fit an existing block needs a new arena.
    fn fill_tail(heap: &mut Heap) -> Handle {
        let tail = *chain(heap).last().unwrap();
        assert!(!tail.used);
        let handle = heap.allocate(tail.size).unwrap();
        assert_eq!(handle, tail.handle);
        handle
    }

    #[test]
    fn basic_alloc() {
        let mut heap = heap();
        let handle = heap.allocate(4).unwrap();

        heap.payload_mut(handle).unwrap()[..4].copy_from_slice(&23u32.to_ne_bytes());
        assert_eq!(&heap.payload(handle).unwrap()[..4], &23u32.to_ne_bytes());

        assert_eq!(heap.stats().arenas, 1);
        assert_eq!(heap.acquired(), heap.page_size());
        assert_accounting(&heap);
    }

    #[test]
    fn allocation_is_never_smaller_than_requested() {
        let mut heap = heap();

        for size in [0, 1, 7, 8, 100, 1000, 4000, 5000, 20_000] {
            for strategy in Strategy::ALL {
                let handle = heap.allocate_with_strategy(size, strategy).unwrap();
                assert!(heap.size_of(handle).unwrap() >= size);
                assert!(heap.payload(handle).unwrap().len() >= size);
            }
        }

        assert_accounting(&heap);
    }

    #[test]
    fn large_allocation_spans_pages() {
        let mut heap = heap();
        let size = heap.page_size() * 3;

        let handle = heap.allocate(size).unwrap();

        assert_eq!(heap.acquired(), heap.page_size() * 4);
        assert!(heap.payload_mut(handle).unwrap().iter().all(|&b| b == 0));
        assert_accounting(&heap);
    }

    #[test]
    fn freed_block_is_reused_first_fit() {
        let mut heap = heap();
        let handles: Vec<_> = (0..5).map(|_| heap.allocate(64).unwrap()).collect();

        heap.deallocate(handles[2]).unwrap();
        let reused = heap.allocate(40).unwrap();

        assert_eq!(reused, handles[2]);
        assert_eq!(
            info(&heap, reused).addr,
            info(&heap, handles[1]).addr + 64 + HEADER_SIZE
        );
    }

    #[test]
    fn reuse_and_split_remainder() {
        let mut heap = heap();

        let first = heap.allocate(100).unwrap();
        let first_addr = info(&heap, first).addr;
        let _second = heap.allocate(200).unwrap();

        heap.deallocate(first).unwrap();
        let third = heap.allocate(50).unwrap();

        assert_eq!(third, first);
        assert_eq!(info(&heap, third).addr, first_addr);
        assert_eq!(heap.size_of(third).unwrap(), 50);

        let remainder = next(&heap, third);
        assert!(!remainder.used);
        assert_eq!(remainder.size, 100 - 50 - HEADER_SIZE);
        assert_eq!(remainder.addr, first_addr + 50 + HEADER_SIZE);
        assert_accounting(&heap);
    }

    #[test]
    fn small_remainder_is_not_split() {
        let mut heap = heap();

        let first = heap.allocate(100).unwrap();
        let _second = heap.allocate(200).unwrap();
        let blocks = heap.stats().blocks;

        heap.deallocate(first).unwrap();
        let again = heap.allocate(100 - HEADER_SIZE + 1).unwrap();

        assert_eq!(again, first);
        assert_eq!(heap.size_of(again).unwrap(), 100);
        assert_eq!(heap.stats().blocks, blocks);
    }

    #[test]
    fn too_small_free_block_forces_new_arena() {
        let mut heap = heap();

        let small = heap.allocate(10).unwrap();
        fill_tail(&mut heap);
        heap.deallocate(small).unwrap();

        let big = heap.allocate(1000).unwrap();

        assert_eq!(heap.stats().arenas, 2);
        assert_eq!(big.arena(), ArenaId(1));

        let small_info = info(&heap, small);
        assert!(!small_info.used);
        assert_eq!(small_info.size, 10);
        assert_accounting(&heap);
    }

    #[test]
    fn best_and_worst_fit() {
        let mut heap = heap();

        let a = heap.allocate(300).unwrap();
        heap.allocate(16).unwrap();
        let b = heap.allocate(100).unwrap();
        heap.allocate(16).unwrap();
        let c = heap.allocate(200).unwrap();
        heap.allocate(16).unwrap();
        let tail = chain(&heap).last().unwrap().handle;

        for handle in [a, b, c] {
            heap.deallocate(handle).unwrap();
        }

        let best = heap.allocate_with_strategy(90, Strategy::BestFit).unwrap();
        assert_eq!(best, b);

        let worst = heap.allocate_with_strategy(90, Strategy::WorstFit).unwrap();
        assert_eq!(worst, tail);

        let first = heap.allocate_with_strategy(90, Strategy::FirstFit).unwrap();
        assert_eq!(first, a);
        assert_accounting(&heap);
    }

    #[test]
    fn strategies_break_ties_by_chain_order() {
        let mut heap = heap();

        let a = heap.allocate(200).unwrap();
        heap.allocate(16).unwrap();
        let b = heap.allocate(100).unwrap();
        heap.allocate(16).unwrap();
        let c = heap.allocate(200).unwrap();
        heap.allocate(16).unwrap();
        let d = heap.allocate(100).unwrap();
        heap.allocate(16).unwrap();
        fill_tail(&mut heap);

        for handle in [a, b, c, d] {
            heap.deallocate(handle).unwrap();
        }

        // Slack stays below HEADER_SIZE, so whole blocks are handed out.
        assert_eq!(heap.allocate_with_strategy(80, Strategy::BestFit).unwrap(), b);
        assert_eq!(heap.allocate_with_strategy(80, Strategy::BestFit).unwrap(), d);
        assert_eq!(heap.allocate_with_strategy(180, Strategy::WorstFit).unwrap(), a);
        assert_eq!(heap.allocate_with_strategy(180, Strategy::WorstFit).unwrap(), c);

        for handle in [a, b, c, d] {
            heap.deallocate(handle).unwrap();
        }

        // `a` and `c` both leave 120 bytes of slack.
        assert_eq!(heap.allocate_with_strategy(80, Strategy::WorstFit).unwrap(), a);
    }

    #[test]
    fn strategy_miss_grows_heap() {
        for strategy in Strategy::ALL {
            let mut heap = heap();
            heap.allocate(8).unwrap();
            fill_tail(&mut heap);

            let handle = heap.allocate_with_strategy(64, strategy).unwrap();

            assert_eq!(handle.arena(), ArenaId(1));
            assert_eq!(heap.stats().arenas, 2);
            assert_accounting(&heap);
        }
    }

    #[test]
    fn double_free_is_rejected() {
        let mut heap = heap();

        let a = heap.allocate(32).unwrap();
        let b = heap.allocate(32).unwrap();

        heap.deallocate(a).unwrap();
        let before = chain(&heap);

        assert!(matches!(
            heap.deallocate(a),
            Err(AllocError::DoubleFree { size: 32, .. })
        ));
        assert_eq!(chain(&heap), before);
        assert!(info(&heap, b).used);
    }

    #[test]
    fn null_and_unknown_handles_are_rejected() {
        let mut heap = heap();
        let a = heap.allocate(32).unwrap();
        let before = chain(&heap);

        assert_eq!(heap.deallocate(None), Err(AllocError::InvalidHandle));
        assert_eq!(heap.reallocate(None, 64), Err(AllocError::InvalidHandle));

        let stranger = Handle::new(ArenaId(7), a.block());
        assert_eq!(heap.deallocate(stranger), Err(AllocError::InvalidHandle));
        assert_eq!(heap.payload(stranger), Err(AllocError::InvalidHandle));

        assert_eq!(chain(&heap), before);
    }

    #[test]
    fn freed_handles_have_no_payload() {
        let mut heap = heap();
        let a = heap.allocate(32).unwrap();
        heap.allocate(32).unwrap();

        heap.deallocate(a).unwrap();

        assert_eq!(heap.payload(a), Err(AllocError::InvalidHandle));
        assert_eq!(heap.size_of(a), Err(AllocError::InvalidHandle));
        assert_eq!(heap.reallocate(a, 8), Err(AllocError::InvalidHandle));
    }

    #[test]
    fn deallocate_does_not_coalesce() {
        let mut heap = heap();
        let a = heap.allocate(32).unwrap();
        let b = heap.allocate(32).unwrap();
        let blocks = heap.stats().blocks;

        heap.deallocate(a).unwrap();
        heap.deallocate(b).unwrap();

        assert_eq!(heap.stats().blocks, blocks);
    }

    #[test]
    fn coalesce_merges_run_and_is_idempotent() {
        let mut heap = heap();

        let a = heap.allocate(100).unwrap();
        let b = heap.allocate(200).unwrap();
        let c = heap.allocate(300).unwrap();
        let d = heap.allocate(50).unwrap();

        for handle in [a, b, c] {
            heap.deallocate(handle).unwrap();
        }

        heap.coalesce();
        let once = chain(&heap);

        assert_eq!(info(&heap, a).size, 100 + 200 + 300 + 2 * HEADER_SIZE);
        assert_eq!(next(&heap, a).handle, d);

        heap.coalesce();
        assert_eq!(chain(&heap), once);
        assert_accounting(&heap);
    }

    #[test]
    fn coalesce_respects_page_boundaries() {
        let mut heap = heap();
        let page = heap.page_size();

        // One two-page arena: `a` fills the first page, the remainder header
        // starts in the second one.
        let a = heap.allocate(page).unwrap();
        let rest = next(&heap, a);
        heap.deallocate(a).unwrap();

        heap.coalesce();

        assert_eq!(chain(&heap).len(), 2);
        assert_eq!(info(&heap, rest.handle).size, rest.size);
    }

    #[test]
    fn coalesce_never_crosses_arenas() {
        let mut heap = heap();

        let a = heap.allocate(8).unwrap();
        let tail = fill_tail(&mut heap);
        let b = heap.allocate(heap.page_size()).unwrap();

        heap.deallocate(tail).unwrap();
        heap.deallocate(b).unwrap();
        heap.coalesce();

        assert_eq!(info(&heap, tail).handle.arena(), ArenaId(0));
        assert_eq!(info(&heap, b).handle.arena(), ArenaId(1));
        assert!(info(&heap, a).used);
        assert_accounting(&heap);
    }

    #[test]
    fn shrink_splits_reusable_remainder() {
        let mut heap = heap();

        let a = heap.allocate(200).unwrap();
        let b = heap.allocate(50).unwrap();

        let shrunk = heap.reallocate(a, 100).unwrap();
        assert_eq!(shrunk, a);
        assert_eq!(heap.size_of(a).unwrap(), 100);

        let remainder = next(&heap, a);
        assert!(!remainder.used);
        assert_eq!(remainder.size, 200 - 100 - HEADER_SIZE);
        assert_eq!(next(&heap, remainder.handle).handle, b);

        let reused = heap.allocate(remainder.size).unwrap();
        assert_eq!(reused, remainder.handle);
        assert_accounting(&heap);
    }

    #[test]
    fn shrink_remainder_merges_with_free_neighbour() {
        let mut heap = heap();

        let a = heap.allocate(200).unwrap();
        let tail = next(&heap, a);

        heap.reallocate(a, 100).unwrap();

        let merged = next(&heap, a);
        assert_eq!(merged.size, tail.size + 100);
        assert_eq!(chain(&heap).len(), 2);
    }

    #[test]
    fn shrink_by_less_than_a_header_keeps_size() {
        let mut heap = heap();

        let a = heap.allocate(200).unwrap();
        heap.allocate(50).unwrap();
        let blocks = heap.stats().blocks;

        assert_eq!(heap.reallocate(a, 200 - HEADER_SIZE + 1).unwrap(), a);
        assert_eq!(heap.size_of(a).unwrap(), 200);
        assert_eq!(heap.stats().blocks, blocks);
    }

    #[test]
    fn grow_moves_payload() {
        let mut heap = heap();

        let a = heap.allocate(16).unwrap();
        let b = heap.allocate(16).unwrap();
        let data: Vec<u8> = (1..=16).collect();
        heap.payload_mut(a).unwrap().copy_from_slice(&data);

        let grown = heap.reallocate(a, 64).unwrap();

        assert_ne!(grown, a);
        assert!(heap.size_of(grown).unwrap() >= 64);
        assert_eq!(&heap.payload(grown).unwrap()[..16], &data[..]);
        assert_eq!(heap.payload(a), Err(AllocError::InvalidHandle));
        assert!(info(&heap, b).used);
        assert_accounting(&heap);
    }

    #[test]
    fn grow_failure_keeps_original() {
        let page = crate::kernel::page_size();
        let mut heap = Heap::with_config(HeapConfig::new().max_bytes(page)).unwrap();

        let a = heap.allocate(100).unwrap();
        heap.payload_mut(a).unwrap().fill(0xAB);
        let before = chain(&heap);

        assert_eq!(
            heap.reallocate(a, page),
            Err(AllocError::ResourceExhaustion { requested: page })
        );

        assert_eq!(chain(&heap), before);
        assert!(heap.payload(a).unwrap().iter().all(|&b| b == 0xAB));
    }

    #[test]
    fn exhaustion_is_reported_not_fatal() {
        let mut heap = heap();

        assert_eq!(
            heap.allocate(usize::MAX - 1),
            Err(AllocError::ResourceExhaustion {
                requested: usize::MAX - 1
            })
        );
        assert_eq!(heap.stats().arenas, 0);

        // The heap is still usable afterwards.
        heap.allocate(8).unwrap();
    }

    #[test]
    fn sizes_near_usize_max_fail_cleanly() {
        let mut heap = heap();
        let top = usize::MAX & !(heap.page_size() - 1);

        // Rounds to exactly `top`, which no kernel will map.
        let unmappable = top - HEADER_SIZE;
        assert_eq!(
            heap.allocate(unmappable),
            Err(AllocError::ResourceExhaustion {
                requested: unmappable
            })
        );

        // One byte more no longer rounds inside a `usize`.
        let unroundable = top - HEADER_SIZE + 1;
        assert_eq!(
            heap.allocate_with_strategy(unroundable, Strategy::WorstFit),
            Err(AllocError::ResourceExhaustion {
                requested: unroundable
            })
        );

        assert_eq!(heap.stats().arenas, 0);
        assert_eq!(heap.acquired(), 0);
    }

    #[test]
    fn absorbed_handles_stay_invalid_after_reuse() {
        let mut heap = heap();

        let x = heap.allocate(10).unwrap();
        let a = heap.allocate(10).unwrap();
        heap.deallocate(x).unwrap();
        heap.deallocate(a).unwrap();
        heap.coalesce();

        let fresh: Vec<Handle> = (0..3).map(|_| heap.allocate(5).unwrap()).collect();

        assert!(fresh.iter().all(|&handle| handle != a));
        assert_eq!(heap.deallocate(a), Err(AllocError::InvalidHandle));
        assert_eq!(heap.payload(a), Err(AllocError::InvalidHandle));
        assert_eq!(heap.reallocate(a, 1), Err(AllocError::InvalidHandle));

        for handle in fresh {
            assert_eq!(heap.size_of(handle), Ok(5));
            assert!(info(&heap, handle).used);
        }

        assert_accounting(&heap);
    }

    #[test]
    fn limit_caps_total_mapping() {
        let page = crate::kernel::page_size();
        let mut heap = Heap::with_config(HeapConfig::new().max_bytes(2 * page)).unwrap();

        heap.allocate(page - HEADER_SIZE).unwrap();
        heap.allocate(page - HEADER_SIZE).unwrap();

        assert!(matches!(
            heap.allocate(1),
            Err(AllocError::ResourceExhaustion { requested: 1 })
        ));
        assert_eq!(heap.acquired(), 2 * page);
    }

    #[test]
    fn accounting_survives_mixed_workload() {
        let mut heap = heap();
        let mut live = Vec::new();

        for round in 0..200usize {
            let size = (round * 37) % 700 + 1;
            let strategy = Strategy::ALL[round % 3];
            live.push(heap.allocate_with_strategy(size, strategy).unwrap());

            if round % 3 == 0 {
                let victim = live.remove(round % live.len());
                heap.deallocate(victim).unwrap();
            }
            if round % 7 == 0 && !live.is_empty() {
                let at = round % live.len();
                live[at] = heap.reallocate(live[at], size / 2 + round).unwrap();
            }
            if round % 11 == 0 {
                heap.coalesce();
            }

            assert_accounting(&heap);
        }
    }

    #[test]
    fn independent_heaps() {
        let mut one = heap();
        let mut two = heap();

        let a = one.allocate(8).unwrap();
        let b = two.allocate(8).unwrap();

        assert_eq!(a, b);
        assert_ne!(one.as_ptr(a).unwrap(), two.as_ptr(b).unwrap());

        one.deallocate(a).unwrap();
        assert!(two.payload(b).is_ok());
    }
}
