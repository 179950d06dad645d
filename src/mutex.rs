//! Mutex-based reference cell, for baselining only.

use std::fmt;

use crate::sync::Mutex;

/// The same call surface as [`AtomicCell`](crate::AtomicCell), implemented
/// with a plain mutex.
///
/// Exists so tests and benches have a known-correct, known-blocking
/// baseline to compare the lock-free cell against. The veto contract is
/// preserved: `f` mutates a private copy, and a `false` return publishes
/// nothing.
pub struct MutexCell<T> {
    value: Mutex<T>,
}

impl<T> MutexCell<T> {
    pub fn new(value: T) -> MutexCell<T> {
        MutexCell {
            value: Mutex::new(value),
        }
    }

    pub fn read<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.value.lock().unwrap())
    }

    pub fn get(&self) -> T
    where
        T: Clone,
    {
        self.read(T::clone)
    }

    pub fn update_weak(&self, f: impl FnOnce(&mut T) -> bool) -> bool
    where
        T: Clone,
    {
        let mut current = self.value.lock().unwrap();
        let mut next = current.clone();
        if f(&mut next) {
            *current = next;
            true
        } else {
            false
        }
    }

    pub fn update(&self, mut f: impl FnMut(&mut T) -> bool)
    where
        T: Clone,
    {
        while !self.update_weak(&mut f) {}
    }
}

impl<T: fmt::Debug> fmt::Debug for MutexCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.read(|v| f.debug_tuple("MutexCell").field(v).finish())
    }
}

#[cfg(all(test, not(loom)))]
mod tests {
    use super::*;

    #[test]
    fn veto_publishes_nothing() {
        let cell = MutexCell::new(vec![1, 2, 3]);
        assert!(!cell.update_weak(|v| {
            v.push(4);
            false
        }));
        assert_eq!(cell.get(), [1, 2, 3]);

        cell.update(|v| {
            v.push(4);
            true
        });
        assert_eq!(cell.read(|v| v.len()), 4);
    }
}
