use std::cmp::Ordering;
use std::fmt;
use std::iter::FusedIterator;
use std::marker::PhantomData;
use std::mem;
use std::ptr::NonNull;

use fixed_pool::{ElementAllocator, PoolAllocator, Result, SystemAllocator};

/// An entry of a [`PoolMap`]. Name this type when creating a pool for a map:
/// `PoolAllocator<MapEntry<K, V>, CAPACITY>`.
#[derive(Debug)]
pub struct MapEntry<K, V> {
    key: K,
    value: V,
    next: Link<K, V>,
}

type Link<K, V> = Option<NonNull<MapEntry<K, V>>>;

/// An ordered map stored as a sorted chain of entries, each allocated individually through an
/// [`ElementAllocator`].
///
/// Lookups are linear in the number of entries. The map is meant for the small, node-at-a-time
/// workloads that a fixed-capacity pool serves, not as a general purpose replacement for
/// `BTreeMap`.
///
/// # Examples
///
/// ```
/// use fixed_pool::PoolAllocator;
/// use pool_collections::{MapEntry, PoolMap};
///
/// type Entries = PoolAllocator<MapEntry<u32, &'static str>, 4>;
///
/// let mut map = PoolMap::with_pool(PoolAllocator::<(u32, &'static str), 4>::new());
/// map.insert(2, "two").unwrap();
/// map.insert(1, "one").unwrap();
///
/// assert_eq!(map.get(&1), Some(&"one"));
/// assert_eq!(map.iter().map(|(k, _)| *k).collect::<Vec<_>>(), [1, 2]);
///
/// drop(map);
/// Entries::teardown();
/// ```
pub struct PoolMap<K, V, A = SystemAllocator>
where
    A: ElementAllocator<MapEntry<K, V>>,
{
    head: Link<K, V>,
    len: usize,

    allocator: A,

    _entries: PhantomData<(K, V)>,
}

impl<K, V> PoolMap<K, V> {
    /// Creates an empty map that allocates its entries from the global allocator.
    #[must_use]
    pub fn new() -> Self {
        Self::new_in(SystemAllocator::default())
    }
}

impl<K, V> Default for PoolMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: 'static, V: 'static, const CAPACITY: usize>
    PoolMap<K, V, PoolAllocator<MapEntry<K, V>, CAPACITY>>
{
    /// Creates an empty map that takes its entries from a pool of `CAPACITY` blocks.
    ///
    /// The pool of key-value pairs is [rebound][PoolAllocator::rebind] to the entry type, so the
    /// policies configured on `PoolAllocator<(K, V), CAPACITY>` also apply to the entries.
    #[must_use]
    pub fn with_pool(pool: PoolAllocator<(K, V), CAPACITY>) -> Self {
        Self::new_in(pool.rebind())
    }
}

impl<K, V, A> PoolMap<K, V, A>
where
    A: ElementAllocator<MapEntry<K, V>>,
{
    /// Creates an empty map that allocates its entries from the given allocator.
    #[must_use]
    pub fn new_in(allocator: A) -> Self {
        Self {
            head: None,
            len: 0,
            allocator,
            _entries: PhantomData,
        }
    }

    /// The allocator that provides the memory of the entries.
    #[must_use]
    pub fn allocator(&self) -> &A {
        &self.allocator
    }

    /// The number of entries in the map.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the map contains no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Iterates over the entries in ascending key order.
    pub fn iter(&self) -> MapIter<'_, K, V> {
        MapIter {
            next: self.head,
            remaining: self.len,
            _map: PhantomData,
        }
    }

    /// Drops every entry and releases its memory.
    pub fn clear(&mut self) {
        let mut current = self.head.take();
        self.len = 0;

        while let Some(entry) = current {
            // SAFETY: The entry is live and owned by this map. The link is read before the entry
            // is destroyed.
            current = unsafe { entry.as_ref().next };

            // SAFETY: The entry is live and unlinked from the chain.
            unsafe {
                self.allocator.destroy(entry);
            }

            // SAFETY: The entry came from our allocator with count 1 and was destroyed above.
            unsafe {
                self.allocator.deallocate(entry, 1);
            }
        }
    }
}

impl<K, V, A> PoolMap<K, V, A>
where
    K: Ord,
    A: ElementAllocator<MapEntry<K, V>>,
{
    /// Inserts a value under a key, keeping the entries sorted by key.
    ///
    /// If the key was already present, its value is replaced and the previous value is returned.
    /// Replacing a value does not allocate.
    ///
    /// # Errors
    ///
    /// Returns the allocator's error if no memory could be obtained for a new entry. The map is
    /// unchanged in that case.
    pub fn insert(&mut self, key: K, value: V) -> Result<Option<V>> {
        let link = self.seek(&key);

        // SAFETY: `seek()` returns a pointer to the head or to the `next` field of a live entry,
        // both of which we exclusively own through `&mut self`.
        let found = unsafe { *link.as_ptr() };

        if let Some(mut entry) = found {
            // SAFETY: The entry is live and owned by this map.
            let entry = unsafe { entry.as_mut() };

            if entry.key == key {
                return Ok(Some(mem::replace(&mut entry.value, value)));
            }
        }

        let entry = self.allocator.allocate(1)?;

        // SAFETY: The memory is fresh and sized for one entry.
        unsafe {
            self.allocator.construct(
                entry,
                MapEntry {
                    key,
                    value,
                    next: found,
                },
            );
        }

        // SAFETY: The link still points into the chain because allocation does not touch the
        // map's entries.
        unsafe {
            link.as_ptr().write(Some(entry));
        }

        self.len = self
            .len
            .checked_add(1)
            .expect("a map cannot hold more entries than fit in memory");

        Ok(None)
    }

    /// A reference to the value stored under a key.
    #[must_use]
    pub fn get(&self, key: &K) -> Option<&V> {
        self.iter()
            .take_while(|(candidate, _)| *candidate <= key)
            .find(|(candidate, _)| *candidate == key)
            .map(|(_, value)| value)
    }

    /// A mutable reference to the value stored under a key.
    #[must_use]
    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        // SAFETY: See `insert()`.
        let found = unsafe { *self.seek(key).as_ptr() };

        found.and_then(|mut entry| {
            // SAFETY: The entry is live and owned by this map; the reference is bound to
            // `&mut self`.
            let entry = unsafe { entry.as_mut() };
            (entry.key == *key).then_some(&mut entry.value)
        })
    }

    /// Whether an entry with the key exists.
    #[must_use]
    pub fn contains_key(&self, key: &K) -> bool {
        self.get(key).is_some()
    }

    /// Removes the entry stored under a key and returns its value.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        let link = self.seek(key);

        // SAFETY: See `insert()`.
        let entry = unsafe { *link.as_ptr() }?;

        // SAFETY: The entry is live and owned by this map.
        if unsafe { entry.as_ref() }.key != *key {
            return None;
        }

        // SAFETY: The entry is live. We move it out and only release the memory afterwards.
        let MapEntry { value, next, .. } = unsafe { entry.read() };

        // SAFETY: See `insert()`.
        unsafe {
            link.as_ptr().write(next);
        }

        self.len = self
            .len
            .checked_sub(1)
            .expect("the map had a matching entry so the length was non-zero");

        // SAFETY: The entry came from our allocator with count 1 and its contents were moved out.
        unsafe {
            self.allocator.deallocate(entry, 1);
        }

        Some(value)
    }

    /// Finds the link that points at the first entry whose key is not less than `key`.
    fn seek(&mut self, key: &K) -> NonNull<Link<K, V>> {
        let mut link = NonNull::from(&mut self.head);

        // SAFETY: `link` always points to the head or to the `next` field of a live entry owned
        // by this map, and we hold `&mut self` for the duration.
        while let Some(mut entry) = unsafe { *link.as_ptr() } {
            // SAFETY: As above.
            let entry = unsafe { entry.as_mut() };

            if entry.key.cmp(key) != Ordering::Less {
                break;
            }

            link = NonNull::from(&mut entry.next);
        }

        link
    }
}

impl<K, V, A> Drop for PoolMap<K, V, A>
where
    A: ElementAllocator<MapEntry<K, V>>,
{
    fn drop(&mut self) {
        self.clear();
    }
}

impl<K, V, A> fmt::Debug for PoolMap<K, V, A>
where
    K: fmt::Debug,
    V: fmt::Debug,
    A: ElementAllocator<MapEntry<K, V>> + fmt::Debug,
{
    #[cfg_attr(test, mutants::skip)] // No API contract.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolMap")
            .field("entries", &DebugEntries(self))
            .field("allocator", &self.allocator)
            .finish()
    }
}

struct DebugEntries<'a, K, V, A>(&'a PoolMap<K, V, A>)
where
    A: ElementAllocator<MapEntry<K, V>>;

impl<K, V, A> fmt::Debug for DebugEntries<'_, K, V, A>
where
    K: fmt::Debug,
    V: fmt::Debug,
    A: ElementAllocator<MapEntry<K, V>>,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.0.iter()).finish()
    }
}

impl<'a, K, V, A> IntoIterator for &'a PoolMap<K, V, A>
where
    A: ElementAllocator<MapEntry<K, V>>,
{
    type Item = (&'a K, &'a V);
    type IntoIter = MapIter<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over the entries of a [`PoolMap`] in ascending key order.
#[derive(Debug)]
pub struct MapIter<'a, K, V> {
    next: Link<K, V>,
    remaining: usize,

    _map: PhantomData<(&'a K, &'a V)>,
}

impl<'a, K, V> Iterator for MapIter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let entry = self.next?;

        // SAFETY: The iterator borrows the map, so every entry reachable from it stays alive and
        // unmodified for `'a`.
        let entry = unsafe { entry.as_ref() };

        self.next = entry.next;
        self.remaining = self.remaining.saturating_sub(1);

        Some((&entry.key, &entry.value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, V> ExactSizeIterator for MapIter<'_, K, V> {}

impl<K, V> FusedIterator for MapIter<'_, K, V> {}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use fixed_pool::Error;
    use static_assertions::assert_not_impl_any;

    use super::*;

    // Nodes are reached through raw pointers and pool handles are tied to the thread.
    assert_not_impl_any!(PoolMap<u32, u32>: Send, Sync);

    #[test]
    fn smoke_test() {
        let mut map = PoolMap::new();
        assert!(map.is_empty());

        assert_eq!(map.insert(3, "three").unwrap(), None);
        assert_eq!(map.insert(1, "one").unwrap(), None);
        assert_eq!(map.insert(2, "two").unwrap(), None);

        assert_eq!(map.len(), 3);
        assert_eq!(map.get(&2), Some(&"two"));
        assert_eq!(map.get(&4), None);
        assert!(map.contains_key(&1));

        assert_eq!(
            map.iter().map(|(k, v)| (*k, *v)).collect::<Vec<_>>(),
            [(1, "one"), (2, "two"), (3, "three")]
        );
    }

    #[test]
    fn insert_existing_key_replaces_without_allocating() {
        type Pool = PoolAllocator<MapEntry<u8, u64>, 2>;

        let mut map = PoolMap::new_in(Pool::new());
        map.insert(1, 10).unwrap();
        map.insert(2, 20).unwrap();
        assert_eq!(Pool::free_blocks(), 0);

        assert_eq!(map.insert(1, 11).unwrap(), Some(10));
        assert_eq!(map.get(&1), Some(&11));
        assert_eq!(map.len(), 2);

        assert!(matches!(
            map.insert(3, 30),
            Err(Error::PoolExhausted { capacity: 2, .. })
        ));
        assert_eq!(map.len(), 2);

        drop(map);
        Pool::teardown();
    }

    #[test]
    fn with_pool_carries_expansion_to_entries() {
        type Pairs = PoolAllocator<(u8, u64), 1>;
        type Entries = PoolAllocator<MapEntry<u8, u64>, 1>;

        Pairs::set_allow_expand(true);

        let mut map = PoolMap::with_pool(Pairs::new());
        map.insert(1, 10).unwrap();
        map.insert(2, 20).unwrap();

        assert_eq!(map.len(), 2);
        assert_eq!(Entries::free_blocks(), 0);
        assert!(Entries::config().allow_expand());

        drop(map);
        Entries::teardown();
    }

    #[test]
    fn remove_unlinks_from_any_position() {
        let mut map = PoolMap::new();
        for key in 0..5 {
            map.insert(key, key * 10).unwrap();
        }

        assert_eq!(map.remove(&0), Some(0));
        assert_eq!(map.remove(&2), Some(20));
        assert_eq!(map.remove(&4), Some(40));
        assert_eq!(map.remove(&4), None);
        assert_eq!(map.remove(&7), None);

        assert_eq!(map.len(), 2);
        assert_eq!(map.iter().map(|(k, _)| *k).collect::<Vec<_>>(), [1, 3]);

        // Insertion still finds the right spot after removals.
        map.insert(2, 21).unwrap();
        map.insert(5, 50).unwrap();
        assert_eq!(map.iter().map(|(k, _)| *k).collect::<Vec<_>>(), [1, 2, 3, 5]);
    }

    #[test]
    fn remove_returns_block_to_pool_when_element_dealloc_enabled() {
        type Pool = PoolAllocator<MapEntry<u8, u64>, 2>;
        Pool::set_element_dealloc(true);

        let mut map = PoolMap::new_in(Pool::new());
        map.insert(1, 10).unwrap();
        map.insert(2, 20).unwrap();

        assert_eq!(map.remove(&1), Some(10));
        assert_eq!(Pool::free_blocks(), 1);

        map.insert(3, 30).unwrap();
        assert_eq!(map.iter().map(|(k, _)| *k).collect::<Vec<_>>(), [2, 3]);

        drop(map);
        assert_eq!(Pool::free_blocks(), 2);
        Pool::teardown();
    }

    #[test]
    fn get_mut_updates_in_place() {
        let mut map = PoolMap::new();
        map.insert("a", 1).unwrap();

        *map.get_mut(&"a").unwrap() += 1;
        assert_eq!(map.get(&"a"), Some(&2));
        assert!(map.get_mut(&"b").is_none());
    }

    #[test]
    fn clear_and_drop_drop_values() {
        struct Counted(Rc<Cell<usize>>);

        impl Drop for Counted {
            fn drop(&mut self) {
                self.0.set(self.0.get() + 1);
            }
        }

        let drops = Rc::new(Cell::new(0));

        let mut map = PoolMap::new();
        for key in 0..3 {
            map.insert(key, Counted(Rc::clone(&drops))).unwrap();
        }

        // Replacing hands back the old value; dropping it counts once.
        drop(map.insert(1, Counted(Rc::clone(&drops))).unwrap());
        assert_eq!(drops.get(), 1);

        map.clear();
        assert_eq!(drops.get(), 4);
        assert!(map.is_empty());

        map.insert(9, Counted(Rc::clone(&drops))).unwrap();
        drop(map);
        assert_eq!(drops.get(), 5);
    }

    #[test]
    fn debug_lists_entries() {
        let mut map = PoolMap::new();
        map.insert(1, 'x').unwrap();

        assert!(format!("{map:?}").contains("{1: 'x'}"));
    }
}
