use std::alloc::{self, Layout};
use std::ptr::NonNull;

use crate::{ElementAllocator, Error, Result};

/// An [`ElementAllocator`] that serves every request directly from the global allocator.
///
/// This is the default memory source of the containers in this project and the allocator that
/// pools fall back to for requests they do not serve from their arena.
///
/// # Examples
///
/// ```
/// use fixed_pool::{ElementAllocator, SystemAllocator};
///
/// let allocator = SystemAllocator::default();
///
/// let ptr = ElementAllocator::<u32>::allocate(&allocator, 4).unwrap();
///
/// // SAFETY: The pointer came from this allocator with the same count.
/// unsafe { ElementAllocator::<u32>::deallocate(&allocator, ptr, 4) };
/// ```
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[non_exhaustive]
pub struct SystemAllocator;

impl<T> ElementAllocator<T> for SystemAllocator {
    fn allocate(&self, count: usize) -> Result<NonNull<T>> {
        allocate_array(count)
    }

    unsafe fn deallocate(&self, ptr: NonNull<T>, count: usize) {
        // SAFETY: Forwarding the caller's guarantees.
        unsafe { deallocate_array(ptr, count) }
    }
}

/// Allocates room for `count` contiguous elements of `T` from the global allocator.
///
/// Zero-sized requests do not touch the global allocator and return a dangling pointer.
pub(crate) fn allocate_array<T>(count: usize) -> Result<NonNull<T>> {
    let layout = Layout::array::<T>(count)?;

    if layout.size() == 0 {
        return Ok(NonNull::dangling());
    }

    // SAFETY: The layout is not zero-sized (checked above).
    let ptr = unsafe { alloc::alloc(layout) };

    NonNull::new(ptr.cast::<T>()).ok_or(Error::SystemOutOfMemory {
        size: layout.size(),
        align: layout.align(),
    })
}

/// Releases memory obtained from [`allocate_array()`].
///
/// # Safety
///
/// The pointer must have been returned by `allocate_array::<T>(count)` with the same `count` and
/// must not have been released already.
pub(crate) unsafe fn deallocate_array<T>(ptr: NonNull<T>, count: usize) {
    let layout = Layout::array::<T>(count)
        .expect("the caller guarantees the same count was successfully allocated before");

    if layout.size() == 0 {
        return;
    }

    // SAFETY: The caller guarantees that the pointer came from the global allocator with this
    // exact layout and has not been released yet.
    unsafe {
        alloc::dealloc(ptr.as_ptr().cast(), layout);
    }
}
