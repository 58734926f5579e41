//! A single-threaded heap allocator that carves blocks out of pages
//! requested directly to the OS.
//!
//! Every block is preceded by [`HEADER_SIZE`] bytes of bookkeeping and all
//! blocks, free or not, are linked in one chain in arena acquisition order
//! and, inside an arena, memory layout order:
//!
//! ```text
//! +--------------------------------------------------------------+
//! | Header | Payload | Header | Payload | Header |   Payload ... |   Arena 0
//! +--------------------------------------------------------------+
//!      |                 ^  |               ^
//!      +---- next -------+  +---- next -----+
//! ```
//!
//! Requests are served by scanning that chain with a [`Strategy`]. When no
//! free block is large enough a new arena is mapped. Oversized blocks are
//! split, and [`Heap::coalesce`] merges free neighbours that share a page.
//!
//! ```
//! use smalloc::{Heap, Strategy};
//!
//! let mut heap = Heap::new()?;
//!
//! let a = heap.allocate(100)?;
//! let b = heap.allocate_with_strategy(200, Strategy::BestFit)?;
//! heap.payload_mut(a)?[..5].copy_from_slice(b"hello");
//!
//! let a = heap.reallocate(a, 400)?;
//! assert_eq!(&heap.payload(a)?[..5], b"hello");
//!
//! heap.deallocate(a)?;
//! heap.deallocate(b)?;
//! heap.coalesce();
//! # Ok::<(), smalloc::AllocError>(())
//! ```

mod arena;
mod block;
mod config;
mod dump;
mod error;
mod freelist;
mod heap;
mod kernel;
mod strategy;
mod utils;

pub use arena::ArenaId;
pub use block::{BlockId, HEADER_SIZE, Handle};
pub use config::HeapConfig;
pub use dump::{BlockInfo, HeapStats};
pub use error::AllocError;
pub use heap::Heap;
pub use strategy::{Strategy, UnknownStrategy};
