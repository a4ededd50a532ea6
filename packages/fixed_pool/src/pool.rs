use std::alloc::Layout;
use std::any::type_name;
use std::fmt;
use std::marker::PhantomData;
use std::ptr::NonNull;

use tracing::{debug, trace};

use crate::registry::{self, ArenaKey};
use crate::{
    Arena, ElementAllocator, Error, PoolAllocatorBuilder, PoolConfig, Result, block_layout, system,
};

/// A handle to a fixed-capacity pool of single-element blocks of `T`.
///
/// The pool serves single-element requests in O(1) from an arena of `CAPACITY` blocks that is
/// reserved on the first request. Requests for any other number of elements bypass the arena and
/// go straight to the global allocator.
///
/// # Shared arena
///
/// A handle does not own an arena. All handles with the same `T` and `CAPACITY` on the same thread
/// share one arena, one free list and one [`PoolConfig`]. Creating a "new" pool of an existing
/// combination gives you another view of the same arena, so memory taken through one handle is
/// unavailable through all the others. Handles with a different capacity or element type use
/// different arenas.
///
/// The arena is released only when [`teardown()`][Self::teardown] is called, never when a handle
/// or a container that uses it is dropped and not when the thread exits. An arena that is never
/// torn down stays reserved until the process exits.
///
/// # Exhaustion and release policies
///
/// Once all blocks are in use, a single-element request either fails with
/// [`Error::PoolExhausted`] or, if [`allow_expand`][PoolConfig::allow_expand] is set, is served
/// from the global allocator. Releasing an arena block returns it to the free list only if
/// [`element_dealloc`][PoolConfig::element_dealloc] is set; otherwise the block stays in use until
/// teardown. Both policies are disabled by default.
///
/// # Thread safety
///
/// The pool is single-threaded. Shared state lives in thread-local storage and handles are neither
/// `Send` nor `Sync`, so a handle always refers to an arena of the thread it was created on. Each
/// thread that uses a given element type and capacity gets its own arena and configuration.
///
/// # Examples
///
/// ```
/// use fixed_pool::{Error, PoolAllocator};
///
/// type Pool = PoolAllocator<u64, 2>;
///
/// let pool = Pool::new();
///
/// let first = pool.allocate(1).unwrap();
/// let second = pool.allocate(1).unwrap();
/// assert!(Pool::owns(first) && Pool::owns(second));
///
/// // Both blocks are in use and expansion is disabled by default.
/// assert!(matches!(pool.allocate(1), Err(Error::PoolExhausted { .. })));
///
/// Pool::teardown();
/// ```
pub struct PoolAllocator<T, const CAPACITY: usize> {
    // Raw pointer to opt out of `Send` and `Sync`: the arena is thread-local.
    _element: PhantomData<*const T>,
}

impl<T: 'static, const CAPACITY: usize> PoolAllocator<T, CAPACITY> {
    /// Creates a handle to the shared pool of `CAPACITY` blocks of `T`.
    ///
    /// This does not reserve any memory; the arena is created by the first allocation request.
    /// A `CAPACITY` of zero is rejected at compile time.
    #[must_use]
    pub const fn new() -> Self {
        const {
            assert!(CAPACITY > 0, "PoolAllocator must have non-zero capacity");
        }

        Self {
            _element: PhantomData,
        }
    }

    /// Starts building a handle that also applies a configuration to the shared arena.
    ///
    /// # Examples
    ///
    /// ```
    /// use fixed_pool::PoolAllocator;
    ///
    /// let pool = PoolAllocator::<u32, 8>::builder()
    ///     .allow_expand(true)
    ///     .build();
    ///
    /// assert!(PoolAllocator::<u32, 8>::config().allow_expand());
    /// # drop(pool);
    /// ```
    pub fn builder() -> PoolAllocatorBuilder<T, CAPACITY> {
        PoolAllocatorBuilder::new()
    }

    /// Returns the handle of the pool for element type `U` with the same capacity.
    ///
    /// Containers use this to obtain an allocator for their internal node type from an allocator
    /// for their element type. The resulting handle uses the arena of `U`, not that of `T`, but
    /// the configuration of this pool is applied to it, so policies set on the element pool also
    /// govern the node pool.
    ///
    /// # Examples
    ///
    /// ```
    /// use fixed_pool::PoolAllocator;
    ///
    /// PoolAllocator::<u32, 4>::set_allow_expand(true);
    ///
    /// let nodes: PoolAllocator<[u32; 3], 4> = PoolAllocator::<u32, 4>::new().rebind();
    /// assert!(PoolAllocator::<[u32; 3], 4>::config().allow_expand());
    /// # drop(nodes);
    /// ```
    #[must_use]
    #[allow(
        clippy::unused_self,
        reason = "rebinding is an operation on a handle even though handles carry no state"
    )]
    pub fn rebind<U: 'static>(&self) -> PoolAllocator<U, CAPACITY> {
        PoolAllocator::<U, CAPACITY>::configure(Self::config());
        PoolAllocator::new()
    }

    /// The number of blocks in the arena.
    #[must_use]
    pub const fn capacity() -> usize {
        CAPACITY
    }

    /// The size in bytes of one arena block. This is the size of `T`, raised to at least the size
    /// of a pointer and padded to the block alignment.
    #[must_use]
    pub fn block_size() -> usize {
        block_layout(Layout::new::<T>())
            .expect("raising a type layout to pointer size and alignment cannot overflow")
            .size()
    }

    /// Allocates memory for `count` elements of `T`.
    ///
    /// A request for exactly one element is served from the arena, which is reserved first if
    /// this is the first request since creation or teardown. If all blocks are in use, the request
    /// is served by the global allocator if the pool is configured to
    /// [allow expansion][PoolConfig::allow_expand].
    ///
    /// Any other `count` is served by the global allocator.
    ///
    /// The memory is uninitialized.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PoolExhausted`] if a single element is requested, all blocks are in use
    /// and expansion is not allowed. Returns other errors if the global allocator fails or the
    /// request cannot be laid out in memory.
    ///
    /// # Examples
    ///
    /// ```
    /// use fixed_pool::PoolAllocator;
    ///
    /// type Pool = PoolAllocator<u16, 4>;
    ///
    /// let pool = Pool::new();
    /// let block = pool.allocate(1).unwrap();
    /// let array = pool.allocate(3).unwrap();
    ///
    /// assert!(Pool::owns(block));
    /// assert!(!Pool::owns(array));
    /// assert_eq!(Pool::free_blocks(), 3);
    ///
    /// // SAFETY: Both pointers came from this pool with the same counts.
    /// unsafe {
    ///     pool.deallocate(array, 3);
    ///     pool.deallocate(block, 1);
    /// }
    /// ```
    pub fn allocate(&self, count: usize) -> Result<NonNull<T>> {
        registry::with_slot(Self::key(), |slot| {
            let config = slot.config;
            let arena = Self::ensure_arena(&mut slot.arena)?;

            if count != 1 {
                debug!(
                    element = type_name::<T>(),
                    capacity = CAPACITY,
                    count,
                    "multi-element request bypasses the pool"
                );
                return system::allocate_array(count);
            }

            if let Some(block) = arena.pop() {
                trace!(
                    element = type_name::<T>(),
                    capacity = CAPACITY,
                    "allocated block from pool"
                );
                return Ok(block.cast());
            }

            if config.allow_expand() {
                debug!(
                    element = type_name::<T>(),
                    capacity = CAPACITY,
                    "pool exhausted, falling back to system allocator"
                );
                return system::allocate_array(1);
            }

            Err(Error::PoolExhausted {
                element: type_name::<T>(),
                capacity: CAPACITY,
            })
        })
    }

    /// Releases memory obtained from [`allocate()`][Self::allocate] with the same `count`.
    ///
    /// Memory that did not come from the arena is released to the global allocator. An arena
    /// block is pushed back onto the free list, becoming the next block handed out, if the pool
    /// is configured for [element deallocation][PoolConfig::element_dealloc]. Otherwise releasing
    /// an arena block does nothing and the block stays in use until teardown.
    ///
    /// Any value in the memory must have been destroyed or moved out before this is called.
    ///
    /// # Safety
    ///
    /// The pointer must have been returned by `allocate(count)` of a handle with the same `T` and
    /// `CAPACITY` on this thread, with the same `count`. It must not have been released already
    /// and the arena must not have been torn down since it was allocated.
    pub unsafe fn deallocate(&self, ptr: NonNull<T>, count: usize) {
        registry::with_slot(Self::key(), |slot| {
            let block = ptr.cast::<u8>();

            match slot.arena.as_mut() {
                Some(arena) if count == 1 && arena.contains(block) => {
                    if slot.config.element_dealloc() {
                        // SAFETY: The block is inside the arena and the caller guarantees it was
                        // allocated from it and is no longer in use.
                        unsafe {
                            arena.push(block);
                        }

                        trace!(
                            element = type_name::<T>(),
                            capacity = CAPACITY,
                            "returned block to pool"
                        );
                    } else {
                        trace!(
                            element = type_name::<T>(),
                            capacity = CAPACITY,
                            "element deallocation disabled, block stays in use until teardown"
                        );
                    }
                }
                _ => {
                    debug!(
                        element = type_name::<T>(),
                        capacity = CAPACITY,
                        count,
                        "releasing memory that is not part of the pool"
                    );

                    // SAFETY: Anything that is not an arena block or not a single element came
                    // from the global allocator with the same count (guaranteed by the caller).
                    unsafe {
                        system::deallocate_array(ptr, count);
                    }
                }
            }
        });
    }

    /// Releases the arena of this pool in one operation, regardless of how many blocks are still
    /// in use. Does nothing if the arena has not been reserved.
    ///
    /// The configuration of the pool is kept. The next allocation request reserves a fresh arena.
    ///
    /// Any memory handed out from the arena must not be used after this, so any containers that
    /// still hold blocks must be dropped (or forgotten) first. Memory handed out by the global
    /// allocator on behalf of the pool is unaffected and must still be released normally.
    pub fn teardown() {
        // Dropped outside the registry borrow.
        drop(registry::take_arena(Self::key()));
    }

    /// The number of blocks on the free list. Zero if the arena has not been reserved.
    ///
    /// This walks the free list, so it takes time proportional to the capacity. It is meant for
    /// diagnostics.
    #[must_use]
    #[cfg_attr(test, mutants::skip)] // Only used for diagnostics and assertions.
    pub fn free_blocks() -> usize {
        registry::with_slot(Self::key(), |slot| {
            slot.arena.as_ref().map_or(0, Arena::free_blocks)
        })
    }

    /// Whether the arena is currently reserved.
    #[must_use]
    pub fn is_initialized() -> bool {
        registry::with_slot(Self::key(), |slot| slot.arena.is_some())
    }

    /// Whether the pointer lies inside the arena of this pool, as opposed to memory served by the
    /// global allocator. False if the arena has not been reserved.
    #[must_use]
    pub fn owns(ptr: NonNull<T>) -> bool {
        registry::with_slot(Self::key(), |slot| {
            slot.arena
                .as_ref()
                .is_some_and(|arena| arena.contains(ptr.cast()))
        })
    }

    /// The current configuration of the shared arena.
    #[must_use]
    pub fn config() -> PoolConfig {
        registry::with_slot(Self::key(), |slot| slot.config)
    }

    /// Replaces the configuration of the shared arena. This affects every handle with the same
    /// `T` and `CAPACITY` on this thread, including existing ones.
    pub fn configure(config: PoolConfig) {
        registry::with_slot(Self::key(), |slot| slot.config = config);
    }

    /// Sets whether single-element requests fall back to the global allocator when the arena is
    /// exhausted. Affects every handle with the same `T` and `CAPACITY` on this thread.
    pub fn set_allow_expand(allow_expand: bool) {
        registry::with_slot(Self::key(), |slot| {
            slot.config = slot.config.with_allow_expand(allow_expand);
        });
    }

    /// Sets whether released arena blocks go back onto the free list. Affects every handle with
    /// the same `T` and `CAPACITY` on this thread.
    pub fn set_element_dealloc(element_dealloc: bool) {
        registry::with_slot(Self::key(), |slot| {
            slot.config = slot.config.with_element_dealloc(element_dealloc);
        });
    }

    fn key() -> ArenaKey {
        ArenaKey::of::<T>(CAPACITY)
    }

    fn ensure_arena(arena: &mut Option<Arena>) -> Result<&mut Arena> {
        if arena.is_none() {
            *arena = Some(Arena::new(
                Layout::new::<T>(),
                CAPACITY,
                type_name::<T>(),
            )?);
        }

        Ok(arena.as_mut().expect("initialized above if it was missing"))
    }
}

impl<T: 'static, const CAPACITY: usize> ElementAllocator<T> for PoolAllocator<T, CAPACITY> {
    fn allocate(&self, count: usize) -> Result<NonNull<T>> {
        Self::allocate(self, count)
    }

    unsafe fn deallocate(&self, ptr: NonNull<T>, count: usize) {
        // SAFETY: Forwarding the caller's guarantees.
        unsafe { Self::deallocate(self, ptr, count) }
    }
}

impl<T: 'static, const CAPACITY: usize> Default for PoolAllocator<T, CAPACITY> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, const CAPACITY: usize> Clone for PoolAllocator<T, CAPACITY> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T, const CAPACITY: usize> Copy for PoolAllocator<T, CAPACITY> {}

impl<T, const CAPACITY: usize> fmt::Debug for PoolAllocator<T, CAPACITY> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolAllocator")
            .field("element", &format_args!("{}", type_name::<T>()))
            .field("capacity", &CAPACITY)
            .finish()
    }
}

/// All pool handles are interchangeable as far as containers are concerned, whatever their element
/// type or capacity. Equality says nothing about whether two handles share an arena.
impl<T, U, const CAPACITY: usize, const OTHER_CAPACITY: usize>
    PartialEq<PoolAllocator<U, OTHER_CAPACITY>> for PoolAllocator<T, CAPACITY>
{
    fn eq(&self, _other: &PoolAllocator<U, OTHER_CAPACITY>) -> bool {
        true
    }
}

impl<T, const CAPACITY: usize> Eq for PoolAllocator<T, CAPACITY> {}
