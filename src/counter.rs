//! Relaxed-by-default atomic counters.
//!
//! Almost every counter in this crate (queue positions, usage counters) is
//! synchronized by the explicit fences at the publish point and at the lap
//! barrier, not by per-operation ordering. Paying acquire/release on every
//! increment would buy nothing, so the default for every operation here is
//! `Relaxed`; the `_with` variants exist for the handful of places where a
//! contract needs something stronger.

use crate::sync::atomic::{AtomicUsize, Ordering};

/// An `AtomicUsize` whose operations default to [`Ordering::Relaxed`].
pub struct Counter(AtomicUsize);

impl Counter {
    pub fn new(value: usize) -> Counter {
        Counter(AtomicUsize::new(value))
    }

    pub fn load(&self) -> usize {
        self.0.load(Ordering::Relaxed)
    }

    pub fn load_with(&self, order: Ordering) -> usize {
        self.0.load(order)
    }

    pub fn store(&self, value: usize) {
        self.0.store(value, Ordering::Relaxed)
    }

    pub fn store_with(&self, value: usize, order: Ordering) {
        self.0.store(value, order)
    }

    /// Returns the previous value.
    pub fn fetch_add(&self, n: usize) -> usize {
        self.0.fetch_add(n, Ordering::Relaxed)
    }

    pub fn fetch_add_with(&self, n: usize, order: Ordering) -> usize {
        self.0.fetch_add(n, order)
    }

    /// Returns the previous value.
    pub fn fetch_sub(&self, n: usize) -> usize {
        self.0.fetch_sub(n, Ordering::Relaxed)
    }

    pub fn fetch_sub_with(&self, n: usize, order: Ordering) -> usize {
        self.0.fetch_sub(n, order)
    }

    pub fn exchange(&self, value: usize) -> usize {
        self.0.swap(value, Ordering::Relaxed)
    }

    pub fn exchange_with(&self, value: usize, order: Ordering) -> usize {
        self.0.swap(value, order)
    }

    /// Single-shot weak compare-exchange; may fail spuriously. Returns
    /// whether the exchange took place.
    pub fn compare_exchange_weak(&self, current: usize, new: usize) -> bool {
        self.0
            .compare_exchange_weak(current, new, Ordering::Relaxed, Ordering::Relaxed)
            .is_ok()
    }

    pub fn compare_exchange_weak_with(
        &self,
        current: usize,
        new: usize,
        success: Ordering,
        failure: Ordering,
    ) -> bool {
        self.0
            .compare_exchange_weak(current, new, success, failure)
            .is_ok()
    }
}

#[cfg(all(test, not(loom)))]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_usable_single_threaded() {
        let c = Counter::new(3);
        assert_eq!(c.load(), 3);
        assert_eq!(c.fetch_add(2), 3);
        assert_eq!(c.fetch_sub(1), 5);
        assert_eq!(c.exchange(10), 4);
        assert!(c.compare_exchange_weak(10, 11) || c.load() == 10);
        c.store(0);
        assert_eq!(c.load(), 0);
    }
}
