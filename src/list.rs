//! A concurrent singly linked list built from one [`AtomicCell`] per node.
//!
//! Every structural mutation is an atomic update of a single node (the
//! predecessor for inserts, the predecessor plus the victim for deletes),
//! so the list needs no lock of its own. The delete is the interesting
//! part: a naive unlink loses races with writers updating the victim, whose
//! refreshed `next` linkage would resurrect a node the deleter thought it
//! had removed. Deletion therefore happens in two steps: reserve the victim
//! by setting its `locked` flag under its *own* cell, then unlink it under
//! the predecessor's. `locked` vetoes every insert-after and delete-of the
//! node in between, and stays set forever once the `deleted` tombstone goes
//! up.
//!
//! Nodes are shared through `Arc`: an iterator keeps its node alive after
//! deletion and observes the tombstone instead of a dangling pointer.

use std::fmt;

use crate::cell::AtomicCell;
use crate::pool::SlotPool;
use crate::sync::{thread, Arc};

type NodeCell<T, const N: usize> = AtomicCell<Node<T, N>, N>;
type Link<T, const N: usize> = Option<Arc<NodeCell<T, N>>>;

/// One list node; the value type the list's [`SlotPool`] recycles.
///
/// Only ever handled through [`AtomicList`] and [`Iter`]; it is public so
/// dedicated pools can be named (`SlotPool<Node<T, N>, N>`).
#[derive(Clone, Default)]
pub struct Node<T, const N: usize> {
    data: T,
    /// Reserved by a deleter; vetoes structural changes around this node.
    locked: bool,
    /// Tombstone: unlinked from the list. Implies `locked`, sticky.
    deleted: bool,
    next: Link<T, N>,
}

/// Lock-free singly linked list with a sentinel head.
///
/// The sentinel holds no user data and is never removed; iteration and all
/// positional operations are expressed relative to it. `len` and `iter`
/// are best-effort snapshots under concurrent mutation.
///
/// `N` must be at least 2: a delete holds two pool slots at once.
pub struct AtomicList<T: Clone, const N: usize = 8> {
    head: Arc<NodeCell<T, N>>,
    pool: Arc<SlotPool<Node<T, N>, N>>,
}

enum Erase<T, const N: usize> {
    Removed(Arc<NodeCell<T, N>>),
    Empty,
    Retry,
}

#[cfg(not(loom))]
impl<T, const N: usize> AtomicList<T, N>
where
    T: Clone + Default + Send + Sync + 'static,
{
    /// Create a list over the process-wide node pool for this `T`/`N`.
    pub fn new() -> AtomicList<T, N> {
        AtomicList::with_pool(SlotPool::global())
    }
}

#[cfg(not(loom))]
impl<T, const N: usize> Default for AtomicList<T, N>
where
    T: Clone + Default + Send + Sync + 'static,
{
    fn default() -> AtomicList<T, N> {
        AtomicList::new()
    }
}

impl<T: Clone, const N: usize> AtomicList<T, N> {
    /// Create a list over an explicitly shared node pool.
    pub fn with_pool(pool: Arc<SlotPool<Node<T, N>, N>>) -> AtomicList<T, N>
    where
        T: Default,
    {
        assert!(
            N >= 2,
            "list pools need at least two slots: a delete holds two at once"
        );
        AtomicList {
            head: Arc::new(AtomicCell::with_pool(Node::default(), pool.clone())),
            pool,
        }
    }

    /// Cursor at the sentinel; the anchor for front insertion and removal.
    pub fn head(&self) -> Iter<T, N> {
        Iter {
            node: Some(self.head.clone()),
        }
    }

    /// Cursor at the first element, or a null cursor if the list is empty.
    pub fn begin(&self) -> Iter<T, N> {
        Iter {
            node: self.head.read(|n| n.next.clone()),
        }
    }

    pub fn end(&self) -> Iter<T, N> {
        Iter { node: None }
    }

    /// Insert at the front; retries until it commits.
    ///
    /// The sentinel is never locked, so only writer contention can delay
    /// this.
    pub fn push_front(&self, value: T) -> Iter<T, N> {
        loop {
            if let Some(it) = self.insert_after_node(&self.head, value.clone()) {
                return it;
            }
            thread::yield_now();
        }
    }

    /// Remove the first element and return its value; `None` when the list
    /// is observed empty.
    pub fn pop_front(&self) -> Option<T> {
        loop {
            match self.erase_after_node(&self.head) {
                Erase::Removed(node) => return Some(node.read(|n| n.data.clone())),
                Erase::Empty => return None,
                Erase::Retry => thread::yield_now(),
            }
        }
    }

    /// One attempt to insert `value` directly after `at`'s node.
    ///
    /// Returns a cursor at the new node, or `None` when the attempt must be
    /// retried: the predecessor is locked (or already deleted, since a deleted
    /// node stays locked), or a concurrent writer won the predecessor's
    /// update. Callers retry with a fresh cursor.
    pub fn insert_after_weak(&self, at: &Iter<T, N>, value: T) -> Option<Iter<T, N>> {
        let pred = at.node.as_ref()?;
        self.insert_after_node(pred, value)
    }

    /// One attempt to remove the node directly after `at`'s node. `false`
    /// when there is nothing to remove or the attempt lost a race.
    pub fn erase_after_weak(&self, at: &Iter<T, N>) -> bool {
        match at.node.as_ref() {
            Some(pred) => matches!(self.erase_after_node(pred), Erase::Removed(_)),
            None => false,
        }
    }

    /// Number of reachable elements. Best-effort: concurrent mutation can
    /// make the count stale before it returns.
    pub fn len(&self) -> usize {
        let mut cursor = self.head();
        let mut n = 0;
        while cursor.advance() {
            n += 1;
        }
        n
    }

    pub fn is_empty(&self) -> bool {
        self.head.read(|n| n.next.is_none())
    }

    /// Snapshot iterator over the element values.
    pub fn iter(&self) -> Values<T, N> {
        Values {
            cursor: self.head(),
        }
    }

    /// Pop until empty.
    pub fn clear(&self) {
        while self.pop_front().is_some() {}
    }

    fn insert_after_node(&self, pred: &Arc<NodeCell<T, N>>, value: T) -> Option<Iter<T, N>> {
        let mut inserted: Link<T, N> = None;
        let committed = pred.update_weak(|p| {
            if p.locked {
                return false;
            }
            let node = Arc::new(AtomicCell::with_pool(
                Node {
                    data: value.clone(),
                    locked: false,
                    deleted: false,
                    next: p.next.clone(),
                },
                self.pool.clone(),
            ));
            inserted = Some(node.clone());
            p.next = Some(node);
            true
        });
        if committed {
            Some(Iter { node: inserted })
        } else {
            None
        }
    }

    fn erase_after_node(&self, pred: &Arc<NodeCell<T, N>>) -> Erase<T, N> {
        let mut victim: Link<T, N> = None;
        let mut at_end = false;
        let committed = pred.update_weak(|p| {
            if p.locked {
                return false;
            }
            let Some(v) = p.next.clone() else {
                at_end = true;
                return false;
            };
            // Step one: reserve the victim under its own cell. From here
            // until it is unlocked or tombstoned, nothing can be inserted
            // after it and no other deleter can claim it.
            let mut victim_next: Link<T, N> = None;
            let reserved = v.update_weak(|n| {
                if n.locked {
                    return false;
                }
                n.locked = true;
                victim_next = n.next.clone();
                true
            });
            if !reserved {
                return false;
            }
            victim = Some(v);
            // Step two: unlink. The victim keeps its own `next` so cursors
            // parked on it can still walk back into the list.
            p.next = victim_next;
            true
        });

        match (committed, victim) {
            (true, Some(node)) => {
                // unreachable now; raise the tombstone for parked cursors
                node.update(|n| {
                    n.deleted = true;
                    true
                });
                Erase::Removed(node)
            }
            (false, Some(node)) => {
                // reserved it, then lost the predecessor's update: put the
                // node back in play before anyone retries against it
                node.update(|n| {
                    n.locked = false;
                    true
                });
                Erase::Retry
            }
            (false, None) => {
                if at_end {
                    Erase::Empty
                } else {
                    Erase::Retry
                }
            }
            (true, None) => unreachable!("committed a delete without a victim"),
        }
    }
}

impl<T: Clone, const N: usize> Drop for AtomicList<T, N> {
    fn drop(&mut self) {
        // unlink node by node; dropping the head's Arc chain directly would
        // recurse once per element
        self.clear();
    }
}

impl<T: Clone + fmt::Debug, const N: usize> fmt::Debug for AtomicList<T, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

/// Cursor over an [`AtomicList`].
///
/// Holds a shared reference to its node, so it stays usable after the node
/// is removed from the list: [`Iter::is_deleted`] reports the tombstone,
/// value updates through the cursor fail, and [`Iter::advance`] walks back
/// into the live list.
pub struct Iter<T, const N: usize = 8> {
    node: Link<T, N>,
}

impl<T, const N: usize> Clone for Iter<T, N> {
    fn clone(&self) -> Iter<T, N> {
        Iter {
            node: self.node.clone(),
        }
    }
}

impl<T, const N: usize> Iter<T, N> {
    /// A null cursor marks the end of the list or a failed operation.
    pub fn is_null(&self) -> bool {
        self.node.is_none()
    }

    /// Step to the next node. Returns `false` (and goes null) at the end.
    pub fn advance(&mut self) -> bool {
        self.node = match &self.node {
            Some(cell) => cell.read(|n| n.next.clone()),
            None => None,
        };
        self.node.is_some()
    }

    pub fn is_locked(&self) -> bool {
        match &self.node {
            Some(cell) => cell.read(|n| n.locked),
            None => false,
        }
    }

    pub fn is_deleted(&self) -> bool {
        match &self.node {
            Some(cell) => cell.read(|n| n.deleted),
            None => false,
        }
    }
}

impl<T: Clone, const N: usize> Iter<T, N> {
    /// Clone out the node's value; `None` on a null cursor.
    pub fn value(&self) -> Option<T> {
        self.node.as_ref().map(|cell| cell.read(|n| n.data.clone()))
    }

    /// Reserve the node: while locked, deleting it and inserting after it
    /// both fail. Returns `false` if the node was already deleted.
    ///
    /// There is no unlock; this pins the node for the list's remaining
    /// life. (Deleters lock and unlock internally, but never through a
    /// cursor.)
    pub fn lock(&self) -> bool {
        let Some(cell) = &self.node else {
            return false;
        };
        loop {
            let mut deleted = false;
            let committed = cell.update_weak(|n| {
                if n.deleted {
                    deleted = true;
                    return false;
                }
                n.locked = true;
                true
            });
            if committed {
                return true;
            }
            if deleted {
                return false;
            }
            thread::yield_now();
        }
    }

    /// One attempt to update the node's value. `false` if the node is
    /// deleted, the attempt lost a race, or `f` vetoed.
    pub fn update_weak(&self, f: impl FnOnce(&mut T) -> bool) -> bool {
        let Some(cell) = &self.node else {
            return false;
        };
        cell.update_weak(|n| {
            if n.deleted {
                return false;
            }
            f(&mut n.data)
        })
    }

    /// Update the node's value, retrying past contention. Returns `false`
    /// only once the node is observed deleted; like
    /// [`AtomicCell::update`], it never returns while `f` keeps vetoing.
    pub fn update(&self, mut f: impl FnMut(&mut T) -> bool) -> bool {
        let Some(cell) = &self.node else {
            return false;
        };
        loop {
            let mut deleted = false;
            let committed = cell.update_weak(|n| {
                if n.deleted {
                    deleted = true;
                    return false;
                }
                f(&mut n.data)
            });
            if committed {
                return true;
            }
            if deleted {
                return false;
            }
            thread::yield_now();
        }
    }
}

/// Value-snapshot iterator returned by [`AtomicList::iter`].
pub struct Values<T, const N: usize = 8> {
    cursor: Iter<T, N>,
}

impl<T: Clone, const N: usize> Iterator for Values<T, N> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        if self.cursor.advance() {
            self.cursor.value()
        } else {
            None
        }
    }
}
