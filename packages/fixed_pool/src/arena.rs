use std::alloc::{self, Layout};
use std::ptr::NonNull;

use tracing::debug;

use crate::{Error, Result};

/// The backing storage of a pool: one contiguous buffer of `capacity` equally sized blocks.
///
/// Vacant blocks form an intrusive free list. Each vacant block stores a [`FreeBlock`] link in
/// its first bytes, pointing at the next vacant block. Think of it as a stack of the most
/// recently released blocks, with the stack entries stored in the blocks themselves.
///
/// The arena does not know or care what is stored in occupied blocks. It never reads or drops
/// them; dropping the arena simply releases the buffer.
///
/// The arena is not thread-safe and is not `Send`. It is owned by a thread-local registry.
#[derive(Debug)]
pub(crate) struct Arena {
    start: NonNull<u8>,

    /// Layout of the whole buffer, needed again when releasing it.
    layout: Layout,

    block_size: usize,
    capacity: usize,

    /// Head of the free list. `None` if every block is in use.
    free_head: Option<NonNull<FreeBlock>>,

    element: &'static str,
}

/// Link stored in the first bytes of every vacant block.
#[repr(C)]
struct FreeBlock {
    next: Option<NonNull<FreeBlock>>,
}

/// Calculates the layout of a single arena block for elements of the given layout.
///
/// The block must be able to hold either an element or a free list link, so it is as large and
/// as aligned as the larger of the two requirements. The size is padded to the alignment so that
/// consecutive blocks stay aligned.
pub(crate) fn block_layout(element: Layout) -> Result<Layout> {
    let link = Layout::new::<FreeBlock>();

    Ok(Layout::from_size_align(
        element.size().max(link.size()),
        element.align().max(link.align()),
    )?
    .pad_to_align())
}

impl Arena {
    /// Reserves an arena of `capacity` blocks suitable for elements of the given layout and
    /// threads every block onto the free list, lowest address first.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub(crate) fn new(
        element_layout: Layout,
        capacity: usize,
        element: &'static str,
    ) -> Result<Self> {
        assert!(capacity > 0, "pool arena must have non-zero capacity");

        let block = block_layout(element_layout)?;

        let size = block
            .size()
            .checked_mul(capacity)
            .ok_or(Error::CapacityOverflow { element, capacity })?;

        let layout = Layout::from_size_align(size, block.align())
            .ok()
            .ok_or(Error::CapacityOverflow { element, capacity })?;

        // SAFETY: The layout is not zero-sized because the capacity is non-zero (asserted above)
        // and every block is at least as large as a pointer.
        let start = NonNull::new(unsafe { alloc::alloc(layout) }).ok_or(
            Error::SystemOutOfMemory {
                size: layout.size(),
                align: layout.align(),
            },
        )?;

        // We link the blocks from the last to the first, so the first block ends up at the head
        // of the free list and blocks are handed out in ascending address order.
        let mut free_head = None;

        for index in (0..capacity).rev() {
            let offset = index
                .checked_mul(block.size())
                .expect("guarded by the size calculation of the whole buffer above");

            // SAFETY: The offset is within the buffer because index < capacity.
            let link = unsafe { start.add(offset) }.cast::<FreeBlock>();

            // SAFETY: The block is inside our buffer, nobody else has access to it yet and it is
            // aligned for `FreeBlock` because the block alignment is at least pointer alignment.
            unsafe {
                link.write(FreeBlock { next: free_head });
            }

            free_head = Some(link);
        }

        debug!(
            element,
            capacity,
            block_size = block.size(),
            arena_bytes = layout.size(),
            "pool arena initialized"
        );

        Ok(Self {
            start,
            layout,
            block_size: block.size(),
            capacity,
            free_head,
            element,
        })
    }

    #[must_use]
    pub(crate) fn block_size(&self) -> usize {
        self.block_size
    }

    /// Whether the pointer falls inside the byte range of the arena.
    ///
    /// This is the only mechanism that distinguishes arena blocks from memory that came from the
    /// system allocator, so it must be exact: `start <= ptr < start + size`.
    #[must_use]
    pub(crate) fn contains(&self, ptr: NonNull<u8>) -> bool {
        let start = self.start.as_ptr().addr();
        let address = ptr.as_ptr().addr();

        address >= start && address.wrapping_sub(start) < self.layout.size()
    }

    /// Whether the pointer is inside the arena and sits exactly on a block boundary.
    #[must_use]
    fn is_block_start(&self, ptr: NonNull<u8>) -> bool {
        self.contains(ptr)
            && ptr
                .as_ptr()
                .addr()
                .wrapping_sub(self.start.as_ptr().addr())
                .checked_rem(self.block_size)
                == Some(0)
    }

    /// Pops a vacant block off the free list, if there is one.
    #[must_use]
    pub(crate) fn pop(&mut self) -> Option<NonNull<u8>> {
        let head = self.free_head?;

        // SAFETY: Every entry on the free list is a vacant block of this arena, which holds an
        // initialized link that nobody else is accessing.
        self.free_head = unsafe { head.as_ref() }.next;

        Some(head.cast())
    }

    /// Pushes a block back onto the free list, making it the next block to be handed out.
    ///
    /// # Safety
    ///
    /// The block must have been handed out by [`pop()`][Self::pop] of this arena and must not be
    /// in use anymore. Pushing a block that is already on the free list or that is foreign to this
    /// arena corrupts the free list.
    pub(crate) unsafe fn push(&mut self, block: NonNull<u8>) {
        debug_assert!(
            self.is_block_start(block),
            "pushed a pointer that is not a block of the arena of {}",
            self.element
        );

        let link = block.cast::<FreeBlock>();

        // SAFETY: The caller guarantees the block belongs to this arena and is no longer in use,
        // so we may overwrite its first bytes. Blocks are aligned for `FreeBlock`.
        unsafe {
            link.write(FreeBlock {
                next: self.free_head,
            });
        }

        self.free_head = Some(link);
    }

    /// Counts the vacant blocks by walking the free list.
    #[must_use]
    pub(crate) fn free_blocks(&self) -> usize {
        let mut count: usize = 0;
        let mut current = self.free_head;

        while let Some(link) = current {
            count = count
                .checked_add(1)
                .expect("the free list can never be longer than the arena capacity");

            // SAFETY: Every entry on the free list is a vacant block holding an initialized link.
            current = unsafe { link.as_ref() }.next;
        }

        count
    }
}

impl Drop for Arena {
    fn drop(&mut self) {
        debug!(
            element = self.element,
            capacity = self.capacity,
            outstanding = self.capacity.saturating_sub(self.free_blocks()),
            "pool arena released"
        );

        // SAFETY: The layout matches the one used to allocate the buffer.
        unsafe {
            alloc::dealloc(self.start.as_ptr(), self.layout);
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::collections::HashSet;

    use static_assertions::assert_not_impl_any;

    use super::*;

    assert_not_impl_any!(Arena: Send, Sync);

    fn arena_of<T>(capacity: usize) -> Arena {
        Arena::new(Layout::new::<T>(), capacity, std::any::type_name::<T>()).unwrap()
    }

    #[test]
    fn block_is_at_least_pointer_sized() {
        let block = block_layout(Layout::new::<u8>()).unwrap();

        assert_eq!(block.size(), size_of::<usize>());
        assert_eq!(block.align(), align_of::<usize>());
    }

    #[test]
    fn block_of_large_element_is_element_sized() {
        let block = block_layout(Layout::new::<[u64; 5]>()).unwrap();

        assert_eq!(block.size(), 40);
    }

    #[test]
    fn block_respects_overaligned_element() {
        #[repr(align(64))]
        #[allow(dead_code, reason = "only the layout matters")]
        struct Overaligned(u8);

        let block = block_layout(Layout::new::<Overaligned>()).unwrap();

        assert_eq!(block.size(), 64);
        assert_eq!(block.align(), 64);
    }

    #[test]
    fn hands_out_blocks_in_ascending_address_order() {
        let mut arena = arena_of::<u64>(4);

        let blocks: Vec<_> = std::iter::from_fn(|| arena.pop()).collect();
        assert_eq!(blocks.len(), 4);

        for pair in blocks.windows(2) {
            let [first, second] = pair else {
                unreachable!("windows(2) yields pairs")
            };

            assert_eq!(
                second.as_ptr().addr() - first.as_ptr().addr(),
                arena.block_size()
            );
        }
    }

    #[test]
    fn pop_until_empty_then_none() {
        let mut arena = arena_of::<u32>(3);

        let mut seen = HashSet::new();
        for _ in 0..3 {
            let block = arena.pop().unwrap();
            assert!(arena.contains(block));
            assert!(seen.insert(block));
        }

        assert!(arena.pop().is_none());
        assert_eq!(arena.free_blocks(), 0);
    }

    #[test]
    fn push_is_lifo() {
        let mut arena = arena_of::<u32>(3);

        let a = arena.pop().unwrap();
        let b = arena.pop().unwrap();

        // SAFETY: Both blocks came from this arena and are not in use.
        unsafe {
            arena.push(a);
            arena.push(b);
        }

        assert_eq!(arena.free_blocks(), 3);
        assert_eq!(arena.pop(), Some(b));
        assert_eq!(arena.pop(), Some(a));
    }

    #[test]
    fn contains_is_exact_at_the_edges() {
        let arena = arena_of::<u64>(2);
        let start = arena.start;
        let size = 2 * arena.block_size();

        assert!(arena.contains(start));

        // SAFETY: One byte before the last byte of the buffer, still in bounds.
        let last_byte = unsafe { start.add(size - 1) };
        assert!(arena.contains(last_byte));

        // One-past-the-end is a valid pointer to form but is not inside the arena.
        // SAFETY: Offsetting to one past the end of an allocation is allowed.
        let one_past_end = unsafe { start.add(size) };
        assert!(!arena.contains(one_past_end));

        let foreign = Box::new(0_u64);
        assert!(!arena.contains(NonNull::from(&*foreign).cast()));
    }

    #[test]
    fn free_blocks_counts_the_list() {
        let mut arena = arena_of::<u16>(5);
        assert_eq!(arena.free_blocks(), 5);

        _ = arena.pop();
        _ = arena.pop();
        assert_eq!(arena.free_blocks(), 3);
    }

    #[test]
    fn zero_sized_elements_still_get_link_sized_blocks() {
        let mut arena = arena_of::<()>(2);

        assert_eq!(arena.block_size(), size_of::<usize>());
        assert!(arena.pop().is_some());
        assert!(arena.pop().is_some());
        assert!(arena.pop().is_none());
    }

    #[test]
    fn capacity_overflow_is_error() {
        let result = Arena::new(Layout::new::<u64>(), usize::MAX, "u64");

        assert!(matches!(result, Err(Error::CapacityOverflow { .. })));
    }

    #[test]
    #[should_panic]
    fn zero_capacity_is_panic() {
        drop(arena_of::<u64>(0));
    }
}
