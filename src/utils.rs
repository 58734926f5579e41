//! This file contains all the helper functions for the allocator.
//! This are functions that don't particularly belong to any concrete module of the program.

/// It aligns `to_be_aligned` using `aligment`, or returns `None` when the
/// rounded value does not fit in a `usize`.
///
/// This is used to round arena sizes up to a multiple of the heap's page size.
/// `aligment` must be a power of two.
pub fn checked_align(to_be_aligned: usize, aligment: usize) -> Option<usize> {
    to_be_aligned
        .checked_add(aligment - 1)
        .map(|bumped| bumped & !(aligment - 1))
}
