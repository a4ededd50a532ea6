use std::alloc::LayoutError;

use thiserror::Error;

/// Errors that can occur when allocating from a pool.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// A single-element allocation was requested, every block of the arena is in use and the
    /// pool is not allowed to fall back to the system allocator.
    #[error("pool of {capacity} x {element} is exhausted and expansion is disabled")]
    PoolExhausted {
        /// Name of the element type the pool is specialized for.
        element: &'static str,

        /// Number of blocks in the arena.
        capacity: usize,
    },

    /// The system allocator could not satisfy a request, either when reserving the arena or
    /// when serving a request that bypasses the arena.
    #[error("system allocator failed to provide {size} bytes aligned to {align}")]
    SystemOutOfMemory {
        /// Requested size in bytes.
        size: usize,

        /// Requested alignment in bytes.
        align: usize,
    },

    /// The arena for the requested capacity would not fit in the address space.
    #[error("arena of {capacity} x {element} exceeds the maximum allocation size")]
    CapacityOverflow {
        /// Name of the element type the pool is specialized for.
        element: &'static str,

        /// Number of blocks requested.
        capacity: usize,
    },

    /// A multi-element request described an array that cannot be laid out in memory.
    #[error("invalid allocation layout: {0}")]
    InvalidLayout(#[from] LayoutError),
}

impl Error {
    /// Whether the error means that memory ran out, as opposed to an impossible request.
    #[must_use]
    pub fn is_out_of_memory(&self) -> bool {
        matches!(
            self,
            Self::PoolExhausted { .. } | Self::SystemOutOfMemory { .. }
        )
    }
}

/// A specialized `Result` type for pool operations, returning the crate's
/// [`Error`] type as the error value.
pub type Result<T> = std::result::Result<T, Error>;
