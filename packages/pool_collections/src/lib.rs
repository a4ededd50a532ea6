#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Node-based containers that allocate one element at a time through an
//! [`ElementAllocator`][fixed_pool::ElementAllocator].
//!
//! The containers work with any element allocator. Paired with a
//! [`PoolAllocator`][fixed_pool::PoolAllocator], every node comes out of a fixed-capacity arena and
//! a container can hold at most as many values as the pool has blocks (unless the pool is allowed
//! to expand).
//!
//! * [`PoolList`] - a singly-linked list with appends at the back and removals at the front.
//! * [`PoolMap`] - an ordered map kept as a sorted chain of entries.
//!
//! Give `with_pool()` the pool of your element type. The container rebinds it to its node type,
//! carrying the pool's policies along. To use any other allocator, pass an allocator for the
//! node type to `new_in()`:
//!
//! ```rust
//! use fixed_pool::PoolAllocator;
//! use pool_collections::{ListNode, MapEntry, PoolList, PoolMap};
//!
//! PoolAllocator::<String, 8>::set_element_dealloc(true);
//!
//! let mut list = PoolList::with_pool(PoolAllocator::<String, 8>::new());
//! list.push_back("hello".to_string()).unwrap();
//! assert_eq!(list.pop_front().as_deref(), Some("hello"));
//!
//! // The node pool inherited element deallocation, so the node went back to it.
//! assert_eq!(PoolAllocator::<ListNode<String>, 8>::free_blocks(), 8);
//!
//! let mut map = PoolMap::new_in(PoolAllocator::<MapEntry<u32, u64>, 8>::new());
//! map.insert(5, 120).unwrap();
//! assert_eq!(map.get(&5), Some(&120));
//! ```

mod list;
mod map;

pub use list::{ListIter, ListNode, PoolList};
pub use map::{MapEntry, MapIter, PoolMap};
