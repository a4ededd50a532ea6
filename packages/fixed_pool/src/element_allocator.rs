use std::ptr::NonNull;

use crate::Result;

/// The allocator contract expected by element-at-a-time containers.
///
/// Containers request memory for `count` contiguous elements, place values into it with
/// [`construct()`][Self::construct], drop them in place with [`destroy()`][Self::destroy] and hand
/// the memory back with [`deallocate()`][Self::deallocate] using the same `count`.
///
/// Allocator handles are cheap to copy and interchangeable: any handle of an allocator may release
/// memory obtained through any other handle of the same allocator.
pub trait ElementAllocator<T> {
    /// Allocates uninitialized memory for `count` contiguous elements of `T`.
    ///
    /// # Errors
    ///
    /// Returns an error if the memory cannot be provided. Whether
    /// [`is_out_of_memory()`][crate::Error::is_out_of_memory] holds for the error tells the
    /// caller whether releasing memory elsewhere might help.
    fn allocate(&self, count: usize) -> Result<NonNull<T>>;

    /// Releases memory obtained from [`allocate()`][Self::allocate].
    ///
    /// Any value in the memory must have been destroyed or moved out before this is called.
    ///
    /// # Safety
    ///
    /// The pointer must have been returned by `allocate(count)` of this allocator (or of an
    /// interchangeable handle) with the same `count`, and must not have been released already.
    unsafe fn deallocate(&self, ptr: NonNull<T>, count: usize);

    /// Moves `value` into the memory at `ptr` without reading or dropping what was there before.
    ///
    /// # Safety
    ///
    /// The pointer must be valid for writes and properly aligned for `T`.
    unsafe fn construct(&self, ptr: NonNull<T>, value: T) {
        // SAFETY: Forwarding the caller's guarantees.
        unsafe {
            ptr.write(value);
        }
    }

    /// Drops the value at `ptr` in place without releasing its memory.
    ///
    /// # Safety
    ///
    /// The pointer must point to an initialized `T` that is not used afterwards, other than to
    /// construct a new value or release the memory.
    unsafe fn destroy(&self, ptr: NonNull<T>) {
        // SAFETY: Forwarding the caller's guarantees.
        unsafe {
            ptr.drop_in_place();
        }
    }
}
