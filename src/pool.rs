//! The node-recycling queue backing [`AtomicCell`](crate::AtomicCell).
//!
//! A pool owns a ring of `2 * N` positions preloaded with `N` boxed,
//! default-constructed `T` slots. Writers take a free slot from the `left`
//! end, build the replacement value in it, and hand the displaced slot back
//! at the `right` end. Both indices grow monotonically and are reduced
//! modulo the ring size, so `N` allocations sweep one half of the ring while
//! `N` releases fill the other.
//!
//! Once per lap, on the allocation that begins a fresh half, the
//! synchronization barrier runs: it refuses to hand out a position until
//! every slot of the previous lap is home (`right - left >= N`) and until no
//! reader that registered during the previous lap is still inside an access
//! (the dual-phase [`UsageCounter`] drained). The barrier is not a lock;
//! callers get a failure and re-drive the operation.
//!
//! Slot values are deliberately *not* dropped while they sit in the ring: a
//! recycled slot keeps its last contents until the next writer copies over
//! them. Values die when the pool (or the cell whose `current` they are)
//! is dropped.

use std::marker::PhantomData;
use std::mem;
use std::ptr::{self, NonNull};

use crate::counter::Counter;
use crate::sync::atomic::{fence, AtomicPtr, Ordering};
use crate::sync::thread;
use crate::usage::{Ticket, UsageCounter};

/// Fixed-capacity recycle queue for `T`-sized slots.
///
/// All cells constructed over the same pool share its `N` free slots; the
/// capacity heuristic is two slots per expected concurrent writer. `N` must
/// be a power of two, and at least 2 for use under
/// [`AtomicList`](crate::AtomicList) (whose delete protocol holds two slots
/// at once).
pub struct SlotPool<T, const N: usize> {
    ring: Box<[AtomicPtr<T>]>,
    /// Next position to allocate from.
    left: Counter,
    /// Next position to release into.
    right: Counter,
    users: UsageCounter<N>,
    // The raw slot pointers own `T`s; without this marker the auto traits
    // would let a pool of non-Send values cross threads.
    _marker: PhantomData<*const T>,
}

// SAFETY: the pool hands out exclusive slot pointers and never shares a
// `&T`, so moving values between threads through it only needs `T: Send`.
unsafe impl<T: Send, const N: usize> Send for SlotPool<T, N> {}
unsafe impl<T: Send, const N: usize> Sync for SlotPool<T, N> {}

impl<T, const N: usize> SlotPool<T, N> {
    const RING: usize = 2 * N;
    const MASK: usize = 2 * N - 1;
}

impl<T: Default, const N: usize> SlotPool<T, N> {
    pub fn new() -> SlotPool<T, N> {
        assert!(
            N.is_power_of_two(),
            "slot pool capacity must be a nonzero power of two"
        );
        let ring = (0..Self::RING)
            .map(|i| {
                if i < N {
                    AtomicPtr::new(Box::into_raw(Box::new(T::default())))
                } else {
                    AtomicPtr::new(ptr::null_mut())
                }
            })
            .collect::<Vec<_>>()
            .into_boxed_slice();

        SlotPool {
            ring,
            left: Counter::new(0),
            right: Counter::new(N),
            users: UsageCounter::new(),
            _marker: PhantomData,
        }
    }
}

impl<T: Default, const N: usize> Default for SlotPool<T, N> {
    fn default() -> SlotPool<T, N> {
        SlotPool::new()
    }
}

impl<T, const N: usize> SlotPool<T, N> {
    /// Try to take a free slot.
    ///
    /// Fails, without blocking, when the queue is drained, when the lap
    /// barrier is not yet clear, or when another writer races us to the
    /// position. The caller retries; all three reasons look the same by
    /// design.
    pub(crate) fn try_allocate(&self) -> Option<SlotGuard<'_, T, N>> {
        let l = self.left.load();
        let r = self.right.load();
        if l == r {
            // every slot is a live `current` or held by an in-flight writer
            return None;
        }
        if l % N == 0 && !self.lap_barrier_clear(l, r) {
            return None;
        }
        if !self
            .left
            .compare_exchange_weak_with(l, l + 1, Ordering::AcqRel, Ordering::Relaxed)
        {
            return None;
        }
        // Position l is ours. A releasing writer increments `right` before
        // storing the pointer, so the entry can lag by a few instructions.
        let entry = &self.ring[l & Self::MASK];
        loop {
            if let Some(slot) = NonNull::new(entry.swap(ptr::null_mut(), Ordering::Acquire)) {
                return Some(SlotGuard { pool: self, slot });
            }
            thread::yield_now();
        }
    }

    /// Hand a displaced slot back to the queue.
    pub(crate) fn release(&self, slot: NonNull<T>) {
        let pos = self.right.fetch_add(1);
        // `Release` pairs with the `Acquire` swap in `try_allocate`: the
        // next owner of this slot sees its contents settled.
        self.ring[pos & Self::MASK].store(slot.as_ptr(), Ordering::Release);
        if pos % N == 0 {
            // lap boundary: publish this lap's releases as a unit
            fence(Ordering::Release);
        }
    }

    /// Register the calling thread as a user of the pool's current lap.
    ///
    /// Readers hold this across their access so the barrier can tell when a
    /// pointer retired during the previous lap can no longer be observed;
    /// writers hold it so the value they displaced cannot come back around
    /// the ring while they still compare against it.
    pub(crate) fn register(&self) -> UsageGuard<'_, T, N> {
        UsageGuard {
            pool: self,
            ticket: self.users.enter(self.right.load()),
        }
    }

    fn lap_barrier_clear(&self, l: usize, r: usize) -> bool {
        // Every slot of the previous lap must be home again; a stalled
        // writer could otherwise release into a half we are re-allocating.
        if r.wrapping_sub(l) < N {
            return false;
        }
        // No reader registered during the previous lap may still be inside
        // an access.
        self.users.other_phase_empty(r)
    }
}

impl<T, const N: usize> Drop for SlotPool<T, N> {
    fn drop(&mut self) {
        let mut pos = self.left.load();
        let end = self.right.load();
        while pos != end {
            let p = self.ring[pos & Self::MASK].load(Ordering::Acquire);
            if !p.is_null() {
                // SAFETY: we have `&mut self`, so no writer holds this slot
                // and no reader can still be inside an access; every pointer
                // in `[left, right)` originated in `Box::into_raw`.
                drop(unsafe { Box::from_raw(p) });
            }
            pos = pos.wrapping_add(1);
        }
    }
}

/// A free slot checked out of the pool.
///
/// Dropping the guard returns the slot; publishing the slot as a cell's
/// `current` consumes the guard via [`SlotGuard::commit`] instead.
pub(crate) struct SlotGuard<'a, T, const N: usize> {
    pool: &'a SlotPool<T, N>,
    slot: NonNull<T>,
}

impl<T, const N: usize> SlotGuard<'_, T, N> {
    pub(crate) fn as_ptr(&self) -> *mut T {
        self.slot.as_ptr()
    }

    /// Keep the slot out of the queue: it has become a cell's `current`.
    pub(crate) fn commit(self) -> NonNull<T> {
        let slot = self.slot;
        mem::forget(self);
        slot
    }
}

impl<T, const N: usize> Drop for SlotGuard<'_, T, N> {
    fn drop(&mut self) {
        self.pool.release(self.slot);
    }
}

/// Scoped usage registration; leaving happens on drop, on every exit path.
pub(crate) struct UsageGuard<'a, T, const N: usize> {
    pool: &'a SlotPool<T, N>,
    ticket: Ticket,
}

impl<T, const N: usize> Drop for UsageGuard<'_, T, N> {
    fn drop(&mut self) {
        self.pool.users.leave(self.ticket);
    }
}

#[cfg(not(loom))]
mod registry {
    use std::any::{Any, TypeId};
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex, OnceLock};

    use super::SlotPool;

    type PoolMap = HashMap<(TypeId, usize), Box<dyn Any + Send + Sync>>;

    impl<T: Default + Send + 'static, const N: usize> SlotPool<T, N> {
        /// The process-wide pool shared by every cell of this `T`/`N`
        /// combination, built on first use.
        ///
        /// Registry pools are never torn down; their slots (and whatever
        /// values were last parked in them) live until process exit. Use
        /// [`SlotPool::new`] and the `with_pool` constructors when teardown
        /// matters.
        pub fn global() -> Arc<SlotPool<T, N>> {
            static POOLS: OnceLock<Mutex<PoolMap>> = OnceLock::new();

            let mut pools = POOLS.get_or_init(Default::default).lock().unwrap();
            pools
                .entry((TypeId::of::<T>(), N))
                .or_insert_with(|| Box::new(Arc::new(SlotPool::<T, N>::new())))
                .downcast_ref::<Arc<SlotPool<T, N>>>()
                .unwrap()
                .clone()
        }
    }
}

#[cfg(all(test, not(loom)))]
mod tests {
    use super::*;
    use std::sync::Arc;

    /// `try_allocate` uses a weak CAS and may fail spuriously even
    /// uncontended; retry where the test expects success.
    fn must_allocate<T, const N: usize>(pool: &SlotPool<T, N>) -> SlotGuard<'_, T, N> {
        loop {
            if let Some(slot) = pool.try_allocate() {
                return slot;
            }
        }
    }

    #[test]
    fn preloaded_slots_are_distinct_and_default() {
        let pool = SlotPool::<u32, 4>::new();
        let guards: Vec<_> = (0..4).map(|_| must_allocate(&pool)).collect();

        let mut ptrs: Vec<_> = guards.iter().map(|g| g.as_ptr()).collect();
        ptrs.sort();
        ptrs.dedup();
        assert_eq!(ptrs.len(), 4);
        for g in &guards {
            assert_eq!(unsafe { *g.as_ptr() }, 0);
        }

        // drained: nothing left to hand out
        assert!(pool.try_allocate().is_none());
    }

    #[test]
    fn released_slots_come_back_around() {
        let pool = SlotPool::<u32, 2>::new();
        for _ in 0..10 {
            let a = must_allocate(&pool);
            let b = must_allocate(&pool);
            assert_ne!(a.as_ptr(), b.as_ptr());
            // guards drop here and release both slots
        }
    }

    #[test]
    fn barrier_waits_for_previous_lap_readers() {
        let pool = SlotPool::<u32, 2>::new();
        let reader = pool.register();

        // first lap passes: the reader registered against the current half
        let a = must_allocate(&pool);
        let b = must_allocate(&pool);
        drop(a);
        drop(b);

        // next lap boundary: the reader's half is now "previous" and has
        // not drained, so allocation must fail without blocking
        assert!(pool.try_allocate().is_none());
        assert!(pool.try_allocate().is_none());

        drop(reader);
        let _slot = must_allocate(&pool);
    }

    #[test]
    fn global_registry_returns_one_pool_per_type() {
        let a = SlotPool::<u64, 8>::global();
        let b = SlotPool::<u64, 8>::global();
        assert!(Arc::ptr_eq(&a, &b));

        let c = SlotPool::<u64, 16>::global();
        assert_eq!(Arc::strong_count(&c), 2); // registry + us
    }
}
