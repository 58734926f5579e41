//! Read-only views of a [`Heap`]: per block records, aggregated statistics
//! and a human readable inventory.

use std::{
    fmt,
    io::{self, Write},
};

use crate::{
    block::{HEADER_SIZE, Handle},
    heap::Heap,
};

/// How many payload bytes [`Heap::dump`] shows per block.
const PREVIEW_BYTES: usize = 8;

/// Snapshot of one block on the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
    pub handle: Handle,
    /// Address of the first payload byte.
    pub addr: usize,
    /// Payload size, header excluded.
    pub size: usize,
    pub used: bool,
}

/// Aggregated view of a [`Heap`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeapStats {
    pub arenas: usize,
    pub blocks: usize,
    pub used_blocks: usize,
    pub free_blocks: usize,
    pub used_bytes: usize,
    pub free_bytes: usize,
    /// Bytes mapped from the OS over the heap's life.
    pub acquired_bytes: usize,
    pub largest_free: usize,
}

impl HeapStats {
    /// Bytes taken by block headers.
    pub fn overhead(&self) -> usize {
        self.blocks * HEADER_SIZE
    }
}

impl fmt::Display for HeapStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} arenas, {} bytes mapped: {} used blocks ({} bytes), {} free blocks ({} bytes, largest {}), {} bytes of headers",
            self.arenas,
            self.acquired_bytes,
            self.used_blocks,
            self.used_bytes,
            self.free_blocks,
            self.free_bytes,
            self.largest_free,
            self.overhead(),
        )
    }
}

impl Heap {
    /// Every block on the chain, head to tail.
    pub fn blocks(&self) -> impl Iterator<Item = BlockInfo> + '_ {
        self.free_list()
            .blocks()
            .map(|(handle, arena, block)| BlockInfo {
                handle,
                addr: arena.payload_ptr(block).as_ptr() as usize,
                size: block.size,
                used: block.used,
            })
    }

    pub fn stats(&self) -> HeapStats {
        let mut stats = HeapStats {
            acquired_bytes: self.acquired(),
            ..HeapStats::default()
        };

        let mut last_arena = None;

        for info in self.blocks() {
            if last_arena != Some(info.handle.arena()) {
                stats.arenas += 1;
                last_arena = Some(info.handle.arena());
            }

            stats.blocks += 1;

            if info.used {
                stats.used_blocks += 1;
                stats.used_bytes += info.size;
            } else {
                stats.free_blocks += 1;
                stats.free_bytes += info.size;
                stats.largest_free = stats.largest_free.max(info.size);
            }
        }

        stats
    }

    /// Writes the inventory to stderr. See [`Heap::dump_to`].
    pub fn dump(&self) {
        let stderr = io::stderr();
        let mut out = stderr.lock();

        if let Err(err) = self.dump_to(&mut out) {
            log::warn!(target: "smalloc", "heap dump failed: {err}");
        }
    }

    /// Writes the used blocks, then the free ones, in chain order. Each line
    /// holds the index within its section, the payload address and size and
    /// the first payload bytes in hex.
    pub fn dump_to<W: Write>(&self, out: &mut W) -> io::Result<()> {
        writeln!(out, "==================== used memory slots ====================")?;
        self.dump_section(out, true)?;
        writeln!(out)?;

        writeln!(out, "==================== unused memory slots ====================")?;
        self.dump_section(out, false)?;
        writeln!(out)
    }

    fn dump_section<W: Write>(&self, out: &mut W, used: bool) -> io::Result<()> {
        let free_list = self.free_list();
        let section = free_list.blocks().filter(|(_, _, block)| block.used == used);

        for (index, (_, arena, block)) in section.enumerate() {
            let payload = arena.payload(block);

            write!(
                out,
                "{index:3}:{:p}:{:8}:",
                arena.payload_ptr(block),
                block.size
            )?;

            for byte in payload.iter().take(PREVIEW_BYTES) {
                write!(out, "{byte:02x} ")?;
            }

            writeln!(out)?;
        }

        Ok(())
    }
}
