//! Multi-word atomic values: many concurrent readers and writers over a `T`
//! of any size, with wait-free reads and lock-free publication.
//!
//! Hardware CAS tops out at a word or two; [`AtomicCell`] lifts the same
//! contract to arbitrary `T` by swapping a *pointer* to the value instead
//! of the value itself. Writers copy the current value into a free slot,
//! mutate the copy, and publish it with one compare-and-swap; readers run a
//! closure against a snapshot pointer that is guaranteed to stay valid for
//! the closure's whole execution.
//!
//! The guarantee comes from how displaced slots are reclaimed. A fixed
//! [`SlotPool`] of `N` pre-allocated slots recycles them through a ring of
//! `2 * N` positions, and once per lap of `N` allocations a synchronization
//! barrier refuses to reuse the previous lap's half of the ring until the
//! dual-phase usage counter shows every reader that registered during that
//! lap has left. No hazard pointers, no epoch records per thread, no
//! garbage lists. The window in which a reader may be looking at a retired
//! slot is bounded by one lap, and the barrier simply waits it out. The
//! same recycling gives ABA protection for the publish CAS: a displaced
//! pointer cannot come back around the ring while the writer that displaced
//! it is still registered.
//!
//! - `read` is wait-free: register, load, run the closure, unregister.
//! - `update_weak` is lock-free: one attempt, `false` on any contention
//!   (free-slot exhaustion, the lap barrier, a lost CAS, or the caller's
//!   own veto; indistinguishable by design, all answered by retrying).
//! - `update` retries `update_weak` and is therefore lock-free but not
//!   wait-free; writers are not fair.
//!
//! [`AtomicList`] builds a concurrent singly linked list from one cell per
//! node, adding the two-step delete (reserve the victim under its own
//! cell, then unlink under the predecessor's) that a lock-free singly
//! linked list needs to avoid resurrecting deleted nodes. [`MutexCell`]
//! is the mutex-based baseline with the same call surface.
//!
//! Run the loom models with `RUSTFLAGS="--cfg loom" cargo test --test loom
//! --release`.

mod cell;
mod counter;
mod list;
mod mutex;
mod pool;
mod sync;
mod usage;

pub use cell::AtomicCell;
pub use counter::Counter;
pub use list::{AtomicList, Iter, Node, Values};
pub use mutex::MutexCell;
pub use pool::SlotPool;
