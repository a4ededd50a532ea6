/// Policies that govern a pool arena once it can no longer serve a request from its free list,
/// and what happens to blocks that are released back to it.
///
/// A configuration belongs to the arena, not to a handle: every [`PoolAllocator`][1] with the
/// same element type and capacity observes the same configuration, and changing it through any
/// of them (or through the handle-independent setters) affects all of them.
///
/// Both policies are disabled by default.
///
/// # Examples
///
/// ```
/// use fixed_pool::{PoolAllocator, PoolConfig};
///
/// PoolAllocator::<u64, 16>::configure(
///     PoolConfig::new()
///         .with_allow_expand(true)
///         .with_element_dealloc(true),
/// );
///
/// assert!(PoolAllocator::<u64, 16>::config().allow_expand());
/// ```
///
/// [1]: crate::PoolAllocator
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct PoolConfig {
    allow_expand: bool,
    element_dealloc: bool,
}

impl PoolConfig {
    /// Creates a configuration with both policies disabled.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            allow_expand: false,
            element_dealloc: false,
        }
    }

    /// Whether a single-element request is served by the system allocator when the arena has no
    /// free blocks left. If disabled, such a request fails with
    /// [`Error::PoolExhausted`][crate::Error::PoolExhausted].
    #[must_use]
    pub const fn allow_expand(&self) -> bool {
        self.allow_expand
    }

    /// Whether an arena block released by the caller is pushed back onto the free list. If
    /// disabled, releasing an arena block is a no-op and the block is only reclaimed when the
    /// whole arena is torn down.
    #[must_use]
    pub const fn element_dealloc(&self) -> bool {
        self.element_dealloc
    }

    /// Returns a copy of the configuration with expansion-on-exhaustion set as specified.
    #[must_use]
    pub const fn with_allow_expand(self, allow_expand: bool) -> Self {
        Self {
            allow_expand,
            ..self
        }
    }

    /// Returns a copy of the configuration with element reclamation set as specified.
    #[must_use]
    pub const fn with_element_dealloc(self, element_dealloc: bool) -> Self {
        Self {
            element_dealloc,
            ..self
        }
    }
}
