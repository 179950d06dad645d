//! Switch between `std` and `loom` synchronization primitives.
//!
//! Everything that participates in the concurrency model goes through this
//! module so the whole crate can be explored under the loom scheduler with
//! `RUSTFLAGS="--cfg loom"`.

#[cfg(loom)]
pub(crate) use loom::{
    sync::{atomic, Arc, Mutex},
    thread,
};

#[cfg(not(loom))]
pub(crate) use std::{
    sync::{atomic, Arc, Mutex},
    thread,
};
