//! The multi-word atomic cell.

use std::fmt;
use std::ptr::NonNull;

use crate::pool::SlotPool;
use crate::sync::atomic::{fence, AtomicPtr, Ordering};
use crate::sync::{thread, Arc};

/// A value of type `T`, readable and updatable atomically from any number
/// of threads, even when `T` is far larger than a machine word.
///
/// The cell holds a pointer to the currently published value. Readers
/// snapshot that pointer and run a closure against it; the recycle pool's
/// lap barrier guarantees the snapshot stays valid for the whole closure.
/// Writers build the replacement value in a free slot from the pool and
/// publish it with a single compare-and-swap, so an update is all-or-nothing
/// no matter how large `T` is.
///
/// `N` is the capacity of the backing [`SlotPool`]; it bounds how many
/// writers can be mid-update at once before `update_weak` starts failing.
/// A good heuristic is twice the number of threads that will write.
///
/// ```
/// use atomic_slot::AtomicCell;
///
/// let cell = AtomicCell::<[u64; 4], 8>::new([0; 4]);
/// cell.update(|v| {
///     v[0] += 1;
///     v[3] += 1;
///     true
/// });
/// assert_eq!(cell.read(|v| v[0] + v[3]), 2);
/// ```
pub struct AtomicCell<T, const N: usize = 8> {
    /// Points at the presently published slot; never null.
    current: AtomicPtr<T>,
    pool: Arc<SlotPool<T, N>>,
}

// SAFETY: readers on any thread receive `&T` at once, and values migrate
// between threads through the pool, so both `Sync` and `Send` on `T` are
// required; with them, all shared state is behind atomics.
unsafe impl<T: Send + Sync, const N: usize> Send for AtomicCell<T, N> {}
unsafe impl<T: Send + Sync, const N: usize> Sync for AtomicCell<T, N> {}

#[cfg(not(loom))]
impl<T: Default + Send + 'static, const N: usize> AtomicCell<T, N> {
    /// Create a cell over the process-wide pool for this `T`/`N`
    /// combination.
    pub fn new(value: T) -> AtomicCell<T, N> {
        AtomicCell::with_pool(value, SlotPool::global())
    }
}

#[cfg(not(loom))]
impl<T: Default + Send + 'static, const N: usize> Default for AtomicCell<T, N> {
    fn default() -> AtomicCell<T, N> {
        AtomicCell::new(T::default())
    }
}

impl<T, const N: usize> AtomicCell<T, N> {
    /// Create a cell over an explicitly shared pool.
    ///
    /// Cells sharing a pool share its `N` free slots; the pool (and the
    /// values parked in its slots) is freed once the last cell and handle
    /// drop.
    pub fn with_pool(value: T, pool: Arc<SlotPool<T, N>>) -> AtomicCell<T, N> {
        AtomicCell {
            current: AtomicPtr::new(Box::into_raw(Box::new(value))),
            pool,
        }
    }

    /// Run `f` against a snapshot of the current value.
    ///
    /// Wait-free: a bounded handful of atomic operations, never a retry
    /// loop. The reference `f` receives is the value that was published at
    /// the moment of the load; concurrent updates displace it but cannot
    /// touch it until `f` returns and the registration drops.
    pub fn read<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let _usage = self.pool.register();
        let p = self.current.load(Ordering::Acquire);
        // SAFETY: `current` is never null, and the usage registration keeps
        // the lap barrier from recycling this slot into a writer while we
        // hold the reference, even if it is displaced mid-read.
        f(unsafe { &*p })
    }

    /// Clone the current value out.
    pub fn get(&self) -> T
    where
        T: Clone,
    {
        self.read(T::clone)
    }

    /// Attempt one atomic read-modify-write.
    ///
    /// The current value is copied into a private slot, `f` mutates the
    /// copy, and a compare-and-swap publishes it iff the cell still holds
    /// the value that was copied. Returns `false`, with no visible
    /// mutation, when the pool is drained or at its lap barrier, when the
    /// CAS loses to a concurrent writer, or when `f` vetoes by returning
    /// `false`. The caller cannot tell these apart; all of them are
    /// handled by retrying.
    ///
    /// Lock-free and reentrant: it is safe (if rarely useful) for `f` to
    /// operate on the same cell again. If `f` panics the slot and the
    /// usage registration are reclaimed while the panic unwinds.
    pub fn update_weak(&self, f: impl FnOnce(&mut T) -> bool) -> bool
    where
        T: Clone,
    {
        let Some(slot) = self.pool.try_allocate() else {
            return false;
        };
        // Registered so the displaced pointer cannot lap the ring and be
        // republished while we still compare against it below.
        let _usage = self.pool.register();

        let old = self.current.load(Ordering::Acquire);
        let new = slot.as_ptr();
        // SAFETY: the slot is exclusively ours until the CAS publishes it;
        // `old` is the live value, distinct from any free slot, and the
        // usage registration keeps it alive for the duration.
        unsafe { (*new).clone_from(&*old) };

        if !f(unsafe { &mut *new }) {
            return false; // vetoed; the guard hands the slot back
        }

        // Publish: the fence orders the slot's contents before the store
        // half of the CAS, pairing with the `Acquire` load in `read`.
        fence(Ordering::Release);
        if self
            .current
            .compare_exchange_weak(old, new, Ordering::Relaxed, Ordering::Relaxed)
            .is_err()
        {
            return false;
        }

        slot.commit();
        // SAFETY: `current` pointers are never null.
        self.pool.release(unsafe { NonNull::new_unchecked(old) });
        true
    }

    /// Atomic read-modify-write; retries [`AtomicCell::update_weak`] until
    /// it succeeds.
    ///
    /// Lock-free but not wait-free: a writer can be starved by contention.
    /// Not reentrant: calling `update` on the same cell from inside `f`
    /// can spin forever, because the outer attempt's slot is never returned
    /// while the inner loop runs. `update_weak` is safe to nest.
    ///
    /// If `f` vetoes unconditionally this never returns.
    pub fn update(&self, mut f: impl FnMut(&mut T) -> bool)
    where
        T: Clone,
    {
        while !self.update_weak(&mut f) {
            thread::yield_now();
        }
    }
}

impl<T, const N: usize> Drop for AtomicCell<T, N> {
    fn drop(&mut self) {
        // SAFETY: `&mut self` means no reader or writer is in flight; the
        // current slot was made by `Box::into_raw` and is not in the ring,
        // so the pool's own drop will not free it again.
        drop(unsafe { Box::from_raw(self.current.load(Ordering::Acquire)) });
    }
}

/// Snapshot copy; the clone shares the original's pool.
impl<T: Clone, const N: usize> Clone for AtomicCell<T, N> {
    fn clone(&self) -> AtomicCell<T, N> {
        AtomicCell::with_pool(self.get(), self.pool.clone())
    }
}

impl<T: fmt::Debug, const N: usize> fmt::Debug for AtomicCell<T, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.read(|v| f.debug_tuple("AtomicCell").field(v).finish())
    }
}

// Forwarded comparisons, so cells can live in ordered containers and be
// sorted in place. Each comparison reads both cells' snapshots; two
// concurrent mutations can of course reorder the cells right back.

impl<T: PartialEq, const N: usize> PartialEq for AtomicCell<T, N> {
    fn eq(&self, other: &AtomicCell<T, N>) -> bool {
        self.read(|a| other.read(|b| a == b))
    }
}

impl<T: Eq, const N: usize> Eq for AtomicCell<T, N> {}

impl<T: PartialOrd, const N: usize> PartialOrd for AtomicCell<T, N> {
    fn partial_cmp(&self, other: &AtomicCell<T, N>) -> Option<std::cmp::Ordering> {
        self.read(|a| other.read(|b| a.partial_cmp(b)))
    }
}

impl<T: Ord, const N: usize> Ord for AtomicCell<T, N> {
    fn cmp(&self, other: &AtomicCell<T, N>) -> std::cmp::Ordering {
        self.read(|a| other.read(|b| a.cmp(b)))
    }
}

#[cfg(all(test, not(loom)))]
mod tests {
    use super::*;

    #[test]
    fn update_weak_veto_leaves_no_trace() {
        let pool = Arc::new(SlotPool::<u32, 2>::new());
        let cell = AtomicCell::with_pool(7, pool);

        assert!(!cell.update_weak(|v| {
            *v = 99;
            false
        }));
        assert_eq!(cell.get(), 7);

        // the vetoed attempt's slot went back: further updates turn over
        cell.update(|v| {
            *v += 1;
            true
        });
        cell.update(|v| {
            *v += 1;
            true
        });
        assert_eq!(cell.get(), 9);
    }

    #[test]
    fn panic_in_mutator_returns_the_slot() {
        let pool = Arc::new(SlotPool::<u32, 2>::new());
        let cell = AtomicCell::with_pool(1, pool);

        let boom = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            cell.update_weak(|v| {
                *v = 2;
                panic!("mutator failure");
            })
        }));
        assert!(boom.is_err());
        assert_eq!(cell.get(), 1);

        // both slots still circulate
        for _ in 0..8 {
            cell.update(|v| {
                *v += 1;
                true
            });
        }
        assert_eq!(cell.get(), 9);
    }

    #[test]
    fn panic_in_reader_unregisters() {
        let pool = Arc::new(SlotPool::<u32, 2>::new());
        let cell = AtomicCell::with_pool(5, pool);

        let boom = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            cell.read(|_| panic!("reader failure"))
        }));
        assert!(boom.is_err());

        // a stuck registration would wedge the barrier within one lap
        for _ in 0..8 {
            cell.update(|v| {
                *v += 1;
                true
            });
        }
        assert_eq!(cell.get(), 13);
    }

    #[test]
    fn comparisons_forward_to_the_value() {
        let pool = Arc::new(SlotPool::<u32, 2>::new());
        let a = AtomicCell::with_pool(1, pool.clone());
        let b = AtomicCell::with_pool(2, pool.clone());
        assert!(a < b);
        assert_ne!(a, b);

        let c = a.clone();
        assert_eq!(a, c);
        assert_eq!(format!("{a:?}"), "AtomicCell(1)");
    }
}
