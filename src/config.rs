use crate::{error::AllocError, kernel};

/// Tunables for a [`crate::Heap`].
///
/// ```
/// use smalloc::HeapConfig;
///
/// let config = HeapConfig::new().max_bytes(1 << 20);
/// assert_eq!(config.max_bytes, Some(1 << 20));
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeapConfig {
    /// Granularity of arenas and of the coalescing boundary. Defaults to the
    /// OS page size. Must be a power of two and a multiple of the OS page size.
    /// Boundaries are counted on addresses, and arenas are only aligned to the
    /// OS page, so an arena may start in the middle of a larger page.
    pub page_size: Option<usize>,
    /// Upper bound on the total number of bytes the heap may map.
    pub max_bytes: Option<usize>,
}

impl HeapConfig {
    pub const fn new() -> Self {
        Self {
            page_size: None,
            max_bytes: None,
        }
    }

    pub const fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = Some(page_size);
        self
    }

    pub const fn max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = Some(max_bytes);
        self
    }

    /// Page size the heap will actually use.
    pub(crate) fn resolve_page_size(&self) -> Result<usize, AllocError> {
        let os_page_size = kernel::page_size();

        let Some(page_size) = self.page_size else {
            return Ok(os_page_size);
        };

        if !page_size.is_power_of_two() {
            return Err(AllocError::InvalidConfig("page size must be a power of two"));
        }

        if page_size < os_page_size || page_size % os_page_size != 0 {
            return Err(AllocError::InvalidConfig(
                "page size must be a multiple of the OS page size",
            ));
        }

        Ok(page_size)
    }
}
