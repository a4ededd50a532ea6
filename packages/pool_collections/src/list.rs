use std::fmt;
use std::iter::FusedIterator;
use std::marker::PhantomData;
use std::ptr::NonNull;

use fixed_pool::{ElementAllocator, PoolAllocator, Result, SystemAllocator};

/// A node of a [`PoolList`]. Name this type when creating a pool for a list:
/// `PoolAllocator<ListNode<T>, CAPACITY>`.
#[derive(Debug)]
pub struct ListNode<T> {
    value: T,
    next: Option<NonNull<ListNode<T>>>,
}

/// A singly-linked list that allocates each node individually through an [`ElementAllocator`].
///
/// Values are appended at the back and removed from the front.
///
/// # Examples
///
/// ```
/// use fixed_pool::PoolAllocator;
/// use pool_collections::{ListNode, PoolList};
///
/// type Nodes = PoolAllocator<ListNode<i32>, 10>;
///
/// let mut list = PoolList::with_pool(PoolAllocator::<i32, 10>::new());
///
/// for i in 0..10 {
///     list.push_back(i).unwrap();
/// }
///
/// // The pool has room for exactly 10 nodes.
/// assert!(list.push_back(10).is_err());
/// assert_eq!(list.iter().sum::<i32>(), 45);
///
/// drop(list);
/// Nodes::teardown();
/// ```
pub struct PoolList<T, A = SystemAllocator>
where
    A: ElementAllocator<ListNode<T>>,
{
    head: Option<NonNull<ListNode<T>>>,
    tail: Option<NonNull<ListNode<T>>>,
    len: usize,

    allocator: A,

    // The list owns its values.
    _values: PhantomData<T>,
}

impl<T> PoolList<T> {
    /// Creates an empty list that allocates its nodes from the global allocator.
    #[must_use]
    pub fn new() -> Self {
        Self::new_in(SystemAllocator::default())
    }
}

impl<T> Default for PoolList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: 'static, const CAPACITY: usize> PoolList<T, PoolAllocator<ListNode<T>, CAPACITY>> {
    /// Creates an empty list that takes its nodes from a pool of `CAPACITY` blocks.
    ///
    /// The element pool is [rebound][PoolAllocator::rebind] to the node type, so the policies
    /// configured on `PoolAllocator<T, CAPACITY>` also apply to the nodes.
    #[must_use]
    pub fn with_pool(pool: PoolAllocator<T, CAPACITY>) -> Self {
        Self::new_in(pool.rebind())
    }
}

impl<T, A> PoolList<T, A>
where
    A: ElementAllocator<ListNode<T>>,
{
    /// Creates an empty list that allocates its nodes from the given allocator.
    #[must_use]
    pub fn new_in(allocator: A) -> Self {
        Self {
            head: None,
            tail: None,
            len: 0,
            allocator,
            _values: PhantomData,
        }
    }

    /// The allocator that provides the memory of the nodes.
    #[must_use]
    pub fn allocator(&self) -> &A {
        &self.allocator
    }

    /// The number of values in the list.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the list contains no values.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Appends a value at the back of the list.
    ///
    /// # Errors
    ///
    /// Returns the allocator's error if no memory could be obtained for the node. The list is
    /// unchanged in that case.
    pub fn push_back(&mut self, value: T) -> Result<()> {
        let node = self.allocator.allocate(1)?;

        // SAFETY: The memory is fresh and sized for one node.
        unsafe {
            self.allocator.construct(node, ListNode { value, next: None });
        }

        match self.tail {
            // SAFETY: The tail is a live node owned by this list and nothing else references it.
            Some(mut tail) => unsafe {
                tail.as_mut().next = Some(node);
            },
            None => self.head = Some(node),
        }

        self.tail = Some(node);
        self.len = self
            .len
            .checked_add(1)
            .expect("a list cannot hold more nodes than fit in memory");

        Ok(())
    }

    /// A reference to the value at the front of the list.
    #[must_use]
    pub fn front(&self) -> Option<&T> {
        // SAFETY: The head is a live node owned by this list; the reference is bound to `&self`.
        self.head.map(|node| unsafe { &node.as_ref().value })
    }

    /// Removes the value at the front of the list and returns it.
    pub fn pop_front(&mut self) -> Option<T> {
        let node = self.head?;

        // SAFETY: The head is a live node owned by this list. We move the node out and never
        // touch the memory again other than to release it.
        let ListNode { value, next } = unsafe { node.read() };

        self.head = next;
        if self.head.is_none() {
            self.tail = None;
        }

        self.len = self
            .len
            .checked_sub(1)
            .expect("the list had a head so the length was non-zero");

        // SAFETY: The node came from our allocator with count 1 and its value was moved out.
        unsafe {
            self.allocator.deallocate(node, 1);
        }

        Some(value)
    }

    /// Drops every value and releases every node.
    pub fn clear(&mut self) {
        let mut current = self.head.take();
        self.tail = None;
        self.len = 0;

        while let Some(node) = current {
            // SAFETY: The node is live and owned by this list. We read the link before the node
            // is destroyed and released.
            current = unsafe { node.as_ref().next };

            // SAFETY: The node is live and unlinked from the list.
            unsafe {
                self.allocator.destroy(node);
            }

            // SAFETY: The node came from our allocator with count 1 and its value was dropped.
            unsafe {
                self.allocator.deallocate(node, 1);
            }
        }
    }

    /// Iterates over the values from front to back.
    pub fn iter(&self) -> ListIter<'_, T> {
        ListIter {
            next: self.head,
            remaining: self.len,
            _list: PhantomData,
        }
    }
}

impl<T, A> Drop for PoolList<T, A>
where
    A: ElementAllocator<ListNode<T>>,
{
    fn drop(&mut self) {
        self.clear();
    }
}

impl<T, A> fmt::Debug for PoolList<T, A>
where
    T: fmt::Debug,
    A: ElementAllocator<ListNode<T>> + fmt::Debug,
{
    #[cfg_attr(test, mutants::skip)] // No API contract.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolList")
            .field("values", &DebugValues(self))
            .field("allocator", &self.allocator)
            .finish()
    }
}

struct DebugValues<'a, T, A>(&'a PoolList<T, A>)
where
    A: ElementAllocator<ListNode<T>>;

impl<T, A> fmt::Debug for DebugValues<'_, T, A>
where
    T: fmt::Debug,
    A: ElementAllocator<ListNode<T>>,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.0.iter()).finish()
    }
}

impl<'a, T, A> IntoIterator for &'a PoolList<T, A>
where
    A: ElementAllocator<ListNode<T>>,
{
    type Item = &'a T;
    type IntoIter = ListIter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over the values of a [`PoolList`], from front to back.
#[derive(Debug)]
pub struct ListIter<'a, T> {
    next: Option<NonNull<ListNode<T>>>,
    remaining: usize,

    _list: PhantomData<&'a T>,
}

impl<'a, T> Iterator for ListIter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.next?;

        // SAFETY: The iterator borrows the list, so every node reachable from it stays alive and
        // unmodified for `'a`.
        let node = unsafe { node.as_ref() };

        self.next = node.next;
        self.remaining = self.remaining.saturating_sub(1);

        Some(&node.value)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<T> ExactSizeIterator for ListIter<'_, T> {}

impl<T> FusedIterator for ListIter<'_, T> {}
