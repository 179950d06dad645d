#![cfg(loom)]

use loom::sync::Arc;
use loom::thread;

use atomic_slot::{AtomicCell, SlotPool};

#[test]
fn loom_publish_is_visible_to_a_concurrent_reader() {
    loom::model(|| {
        let pool = Arc::new(SlotPool::<usize, 2>::new());
        let cell = Arc::new(AtomicCell::with_pool(0usize, pool));

        let w = {
            let cell = cell.clone();
            thread::spawn(move || {
                cell.update(|v| {
                    *v += 1;
                    true
                });
            })
        };

        let r = {
            let cell = cell.clone();
            thread::spawn(move || {
                let v = cell.read(|v| *v);
                assert!(v == 0 || v == 1, "read a value that was never published");
            })
        };

        w.join().unwrap();
        r.join().unwrap();
        assert_eq!(cell.read(|v| *v), 1);
    });
}

#[test]
fn loom_two_writers_conserve_increments() {
    loom::model(|| {
        let pool = Arc::new(SlotPool::<usize, 2>::new());
        let cell = Arc::new(AtomicCell::with_pool(0usize, pool));

        let mut writers = Vec::new();
        for _ in 0..2 {
            let cell = cell.clone();
            writers.push(thread::spawn(move || {
                cell.update(|v| {
                    *v += 1;
                    true
                });
            }));
        }
        for w in writers {
            w.join().unwrap();
        }

        assert_eq!(cell.read(|v| *v), 2);
    });
}

#[test]
fn loom_snapshots_stay_whole_across_the_lap_barrier() {
    loom::model(|| {
        let pool = Arc::new(SlotPool::<(usize, usize), 2>::new());
        let cell = Arc::new(AtomicCell::with_pool((0, 0), pool));

        let w = {
            let cell = cell.clone();
            thread::spawn(move || {
                // three updates march the queue across a lap boundary, so
                // the third reuses a slot the reader may have been handed
                for i in 1..=3 {
                    cell.update(|v| {
                        *v = (i, i);
                        true
                    });
                    thread::yield_now();
                }
            })
        };

        let r = {
            let cell = cell.clone();
            thread::spawn(move || {
                let (a, b) = cell.read(|v| *v);
                assert_eq!(a, b, "torn or recycled snapshot");
            })
        };

        w.join().unwrap();
        r.join().unwrap();
        assert_eq!(cell.read(|v| *v), (3, 3));
    });
}
