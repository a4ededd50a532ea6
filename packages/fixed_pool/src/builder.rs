use std::any::type_name;
use std::fmt;
use std::marker::PhantomData;

use crate::{PoolAllocator, PoolConfig};

/// Builder for creating a [`PoolAllocator`] handle and configuring its shared arena.
///
/// The builder starts from the configuration the shared arena currently has, so settings you do
/// not touch are left as they are. Building applies the configuration to the arena, which affects
/// every existing handle with the same element type and capacity, too.
///
/// # Examples
///
/// ```
/// use fixed_pool::PoolAllocator;
///
/// let pool = PoolAllocator::<u64, 32>::builder()
///     .allow_expand(true)
///     .element_dealloc(true)
///     .build();
///
/// let block = pool.allocate(1).unwrap();
///
/// // SAFETY: The block came from this pool and is not used after this.
/// unsafe { pool.deallocate(block, 1) };
///
/// assert_eq!(PoolAllocator::<u64, 32>::free_blocks(), 32);
/// ```
#[must_use]
pub struct PoolAllocatorBuilder<T, const CAPACITY: usize> {
    config: PoolConfig,

    _element: PhantomData<*const T>,
}

impl<T, const CAPACITY: usize> fmt::Debug for PoolAllocatorBuilder<T, CAPACITY> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolAllocatorBuilder")
            .field("element", &format_args!("{}", type_name::<T>()))
            .field("capacity", &CAPACITY)
            .field("config", &self.config)
            .finish()
    }
}

impl<T: 'static, const CAPACITY: usize> PoolAllocatorBuilder<T, CAPACITY> {
    pub(crate) fn new() -> Self {
        Self {
            config: PoolAllocator::<T, CAPACITY>::config(),
            _element: PhantomData,
        }
    }

    /// Sets whether single-element requests fall back to the global allocator when the arena is
    /// exhausted.
    pub fn allow_expand(mut self, allow_expand: bool) -> Self {
        self.config = self.config.with_allow_expand(allow_expand);
        self
    }

    /// Sets whether released arena blocks go back onto the free list.
    pub fn element_dealloc(mut self, element_dealloc: bool) -> Self {
        self.config = self.config.with_element_dealloc(element_dealloc);
        self
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: PoolConfig) -> Self {
        self.config = config;
        self
    }

    /// Applies the configuration to the shared arena and returns a handle to the pool.
    #[must_use]
    pub fn build(self) -> PoolAllocator<T, CAPACITY> {
        PoolAllocator::<T, CAPACITY>::configure(self.config);
        PoolAllocator::new()
    }
}
