/// Everything that can go wrong while talking to a [`crate::Heap`].
///
/// Caller mistakes ([`AllocError::InvalidHandle`], [`AllocError::DoubleFree`])
/// never modify the heap. [`AllocError::ResourceExhaustion`] is handed back to
/// the caller, which decides whether the process should abort.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AllocError {
    /// A null handle, or one that does not name a live block of this heap.
    #[error("invalid handle")]
    InvalidHandle,

    /// The block behind the handle is already free.
    #[error("double free of block at {addr:#x} ({size} bytes)")]
    DoubleFree { addr: usize, size: usize },

    /// The OS refused to map a new arena, the arena size overflowed while
    /// rounding to the page size, or the configured heap limit was reached.
    #[error("resource exhaustion: no memory for a {requested} byte request")]
    ResourceExhaustion { requested: usize },

    #[error("invalid heap configuration: {0}")]
    InvalidConfig(&'static str),
}
