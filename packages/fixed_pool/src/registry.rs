use std::any::TypeId;
use std::cell::RefCell;
use std::mem::ManuallyDrop;

use foldhash::{HashMap, HashMapExt};

use crate::{Arena, PoolConfig};

/// Identifies one shared arena. All pool handles with the same element type and capacity map to
/// the same key and therefore to the same arena and configuration.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub(crate) struct ArenaKey {
    element: TypeId,
    capacity: usize,
}

impl ArenaKey {
    pub(crate) fn of<T: 'static>(capacity: usize) -> Self {
        Self {
            element: TypeId::of::<T>(),
            capacity,
        }
    }
}

/// State shared by every pool handle of one (element type, capacity) pair.
#[derive(Debug, Default)]
pub(crate) struct Slot {
    /// Survives teardown of the arena.
    pub(crate) config: PoolConfig,

    /// `None` until the first allocation request and again after teardown.
    pub(crate) arena: Option<Arena>,
}

/// The shared state of every pool on one thread.
///
/// The map is never dropped. An arena is released only by an explicit teardown, not when its
/// thread exits: containers stored in other thread-local variables may still hold arena blocks
/// and release them from their own destructors, which can run after ours would have. Without a
/// destructor the registry stays accessible for the whole life of the thread, including during
/// thread-local destruction. Arenas that are never torn down live until the process exits.
type Registry = RefCell<ManuallyDrop<HashMap<ArenaKey, Slot>>>;

thread_local! {
    // Pools are single-threaded, so the shared state lives per thread and pool handles are
    // neither `Send` nor `Sync`. Nothing here is ever accessed from another thread.
    static SLOTS: Registry = RefCell::new(ManuallyDrop::new(HashMap::new()));
}

/// Runs the closure with exclusive access to the slot for `key`, creating an empty slot with the
/// default configuration if this is the first time the key is seen on the current thread.
///
/// # Panics
///
/// Panics if called from within the closure of another `with_slot()` call on the same thread.
pub(crate) fn with_slot<R>(key: ArenaKey, f: impl FnOnce(&mut Slot) -> R) -> R {
    SLOTS.with_borrow_mut(|slots| f(slots.entry(key).or_default()))
}

/// Removes the arena of `key` from the registry, keeping the configuration.
///
/// The arena is returned rather than dropped so the caller can release it after the registry
/// borrow has ended.
#[must_use]
pub(crate) fn take_arena(key: ArenaKey) -> Option<Arena> {
    SLOTS.with_borrow_mut(|slots| slots.get_mut(&key).and_then(|slot| slot.arena.take()))
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::alloc::Layout;
    use std::cell::Cell;
    use std::mem;
    use std::sync::mpsc;
    use std::thread;

    use super::*;

    #[test]
    fn registry_has_no_destructor() {
        // Otherwise the thread-local would become inaccessible (and release every arena) while
        // other thread-local destructors may still use it.
        assert!(!mem::needs_drop::<Registry>());
    }

    #[test]
    fn arena_survives_thread_exit_and_registry_stays_usable() {
        struct ReleaseOnExit {
            key: Cell<Option<ArenaKey>>,
            report: Cell<Option<mpsc::Sender<bool>>>,
        }

        impl Drop for ReleaseOnExit {
            fn drop(&mut self) {
                if let (Some(key), Some(report)) = (self.key.take(), self.report.take()) {
                    let still_reserved = with_slot(key, |slot| slot.arena.is_some());
                    _ = report.send(still_reserved);
                }
            }
        }

        thread_local! {
            static RELEASE_ON_EXIT: ReleaseOnExit = const {
                ReleaseOnExit {
                    key: Cell::new(None),
                    report: Cell::new(None),
                }
            };
        }

        let (tx, rx) = mpsc::channel();

        thread::spawn(move || {
            let key = ArenaKey::of::<u32>(4);

            with_slot(key, |slot| {
                slot.arena = Some(Arena::new(Layout::new::<u32>(), 4, "u32").unwrap());
            });

            RELEASE_ON_EXIT.with(|release| {
                release.key.set(Some(key));
                release.report.set(Some(tx));
            });
        })
        .join()
        .unwrap();

        assert!(rx.recv().unwrap());
    }

    #[test]
    fn keys_differ_by_type_and_capacity() {
        assert_eq!(ArenaKey::of::<u32>(4), ArenaKey::of::<u32>(4));
        assert_ne!(ArenaKey::of::<u32>(4), ArenaKey::of::<u32>(5));
        assert_ne!(ArenaKey::of::<u32>(4), ArenaKey::of::<i32>(4));
    }

    #[test]
    fn slot_is_created_with_default_config() {
        let config = with_slot(ArenaKey::of::<u8>(3), |slot| {
            assert!(slot.arena.is_none());
            slot.config
        });

        assert_eq!(config, PoolConfig::default());
    }

    #[test]
    fn slot_changes_are_visible_to_later_calls() {
        let key = ArenaKey::of::<u16>(3);

        with_slot(key, |slot| slot.config = slot.config.with_allow_expand(true));

        assert!(with_slot(key, |slot| slot.config.allow_expand()));
    }

    #[test]
    fn take_arena_keeps_config() {
        let key = ArenaKey::of::<u64>(2);

        with_slot(key, |slot| {
            slot.config = slot.config.with_element_dealloc(true);
            slot.arena = Some(Arena::new(Layout::new::<u64>(), 2, "u64").unwrap());
        });

        assert!(take_arena(key).is_some());
        assert!(take_arena(key).is_none());
        assert!(with_slot(key, |slot| slot.config.element_dealloc()));
    }

    #[test]
    fn take_arena_of_unknown_key_is_none() {
        assert!(take_arena(ArenaKey::of::<i128>(7)).is_none());
    }

    #[test]
    fn slots_are_per_thread() {
        let key = ArenaKey::of::<i8>(9);

        with_slot(key, |slot| slot.config = slot.config.with_allow_expand(true));

        thread::spawn(move || {
            assert!(!with_slot(key, |slot| slot.config.allow_expand()));
        })
        .join()
        .unwrap();
    }
}
