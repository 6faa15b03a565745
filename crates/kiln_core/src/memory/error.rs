use thiserror::Error;

/// Errors raised while constructing an allocator.
///
/// Running out of slots is not an error (the non-growing allocate form
/// returns `None`), and a failing system allocator aborts through
/// [`std::alloc::handle_alloc_error`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AllocError {
    #[error("object size {object_size} is smaller than a free-list link ({min} bytes)")]
    ObjectTooSmall { object_size: usize, min: usize },

    #[error("a pool needs at least one object per block")]
    ZeroObjectCount,

    #[error("alignment {align} is not a power of two")]
    InvalidAlignment { align: usize },

    #[error("object size {object_size} is not a multiple of the slot alignment {align}")]
    MisalignedObjectSize { object_size: usize, align: usize },

    #[error("a block of {object_count} objects of {object_size} bytes does not fit in memory")]
    BlockTooLarge {
        object_size: usize,
        object_count: usize,
    },
}
