#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! A fixed-capacity pool of single-element blocks, usable as the memory source of containers that
//! allocate one element at a time (linked lists, node-based maps and similar).
//!
//! A [`PoolAllocator<T, CAPACITY>`][PoolAllocator] reserves an arena of `CAPACITY` blocks on the
//! first request and then serves single-element requests in O(1) from an intrusive free list,
//! without calling into the global allocator. Requests for more (or fewer) than one element
//! always bypass the arena.
//!
//! # Shared arenas
//!
//! Pool handles are stateless. The arena, its free list and its [`PoolConfig`] are shared by all
//! handles with the same element type and capacity on the current thread, so two containers
//! created with "separate" pools of the same type and capacity draw from the same blocks. The
//! arena lives until [`PoolAllocator::teardown()`] is called, regardless of how many blocks are
//! still in use, whether any handles remain and whether the thread has exited.
//!
//! Sharing is scoped to a thread, not to the process. Handles are neither `Send` nor `Sync`, and a
//! second thread that creates a pool of the same type and capacity gets an arena and
//! configuration of its own. This keeps the pool free of synchronization.
//!
//! [`PoolAllocator::rebind()`] turns a handle for an element type into a handle for another type
//! (typically a container's node type) and carries the configuration over to it.
//!
//! # Policies
//!
//! Two policies, both disabled by default, control the edge cases:
//!
//! * [`allow_expand`][PoolConfig::allow_expand] - when the arena is exhausted, serve
//!   single-element requests from the global allocator instead of failing with
//!   [`Error::PoolExhausted`].
//! * [`element_dealloc`][PoolConfig::element_dealloc] - return released blocks to the free list.
//!   When disabled, releasing a block does nothing and the block is only reclaimed in bulk by
//!   teardown.
//!
//! # Allocator contract
//!
//! Containers use the pool through the [`ElementAllocator`] trait, which is also implemented by
//! [`SystemAllocator`] for containers that do not use a pool.
//!
//! # Example
//!
//! ```rust
//! use fixed_pool::PoolAllocator;
//!
//! type Pool = PoolAllocator<u64, 5>;
//!
//! let pool = Pool::builder().element_dealloc(true).build();
//!
//! let blocks: Vec<_> = (0..5).map(|_| pool.allocate(1).unwrap()).collect();
//! assert!(pool.allocate(1).is_err());
//!
//! // Released blocks are handed out again, most recently released first.
//! // SAFETY: The block came from this pool and is not used after this.
//! unsafe { pool.deallocate(blocks[2], 1) };
//! assert_eq!(pool.allocate(1).unwrap(), blocks[2]);
//!
//! Pool::teardown();
//! ```

mod arena;
mod builder;
mod config;
mod element_allocator;
mod error;
mod pool;
mod registry;
mod system;

pub(crate) use arena::*;
pub use builder::*;
pub use config::*;
pub use element_allocator::*;
pub use error::*;
pub use pool::PoolAllocator;
pub use system::SystemAllocator;
