// Check that cells over non-Sync types can't be shared between threads
// edition:2021

use std::cell::RefCell;
use std::thread;

// NOTE: we include this so the error points to local source which gives reliable trybuild output
fn spawn<F>(f: F)
where
    F: FnOnce() + Send + 'static,
{
    thread::spawn(f).join().unwrap();
}

fn main() {
    let cell = atomic_slot::AtomicCell::<RefCell<u32>, 8>::new(RefCell::new(0));

    spawn(move || {
        cell.read(|v| *v.borrow_mut() = 1);
    });
    //~^ ERROR: `RefCell<u32>` cannot be shared between threads safely
}
