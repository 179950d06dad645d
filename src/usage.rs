//! Dual-phase usage counting for readers of recycled slots.
//!
//! The recycle queue is a ring of `2 * N` positions, so consecutive laps of
//! `N` allocations land in alternating halves. A reader registers against
//! the half that the queue's `right` position is in when it enters; the lap
//! barrier then only has to wait for the *other* half's count to drain to
//! know that nobody can still be holding a pointer that was retired during
//! the previous lap. Readers entering while the barrier waits keep
//! accumulating in the current half and never delay it.

use crate::counter::Counter;
use crate::sync::atomic::{fence, Ordering};

/// Ticket handed out by [`UsageCounter::enter`]; records which phase was
/// entered so [`UsageCounter::leave`] decrements the matching side.
#[derive(Clone, Copy)]
pub(crate) struct Ticket(usize);

pub(crate) struct UsageCounter<const N: usize> {
    counts: [Counter; 2],
}

impl<const N: usize> UsageCounter<N> {
    pub(crate) fn new() -> UsageCounter<N> {
        UsageCounter {
            counts: [Counter::new(0), Counter::new(0)],
        }
    }

    /// Which half of the doubled ring `pos` falls in.
    fn phase(pos: usize) -> usize {
        (pos / N) & 1
    }

    /// Register a reader that observed the queue's `right` at `pos`.
    ///
    /// The fence makes the registration visible to a concurrent barrier
    /// check before the caller goes on to load the shared pointer; it pairs
    /// with the fence in [`UsageCounter::other_phase_empty`].
    pub(crate) fn enter(&self, pos: usize) -> Ticket {
        self.counts[Self::phase(pos)].fetch_add(1);
        fence(Ordering::SeqCst);
        Ticket(pos)
    }

    /// `Release` so everything the reader did with the shared value is
    /// ordered before the count the barrier will observe as drained.
    pub(crate) fn leave(&self, ticket: Ticket) {
        self.counts[Self::phase(ticket.0)].fetch_sub_with(1, Ordering::Release);
    }

    /// True when no reader registered against the half *opposite* `pos` is
    /// still inside its access.
    pub(crate) fn other_phase_empty(&self, pos: usize) -> bool {
        fence(Ordering::SeqCst);
        self.counts[1 - Self::phase(pos)].load_with(Ordering::Acquire) == 0
    }
}

#[cfg(all(test, not(loom)))]
mod tests {
    use super::*;

    #[test]
    fn phase_alternates_per_lap() {
        assert_eq!(UsageCounter::<4>::phase(0), 0);
        assert_eq!(UsageCounter::<4>::phase(3), 0);
        assert_eq!(UsageCounter::<4>::phase(4), 1);
        assert_eq!(UsageCounter::<4>::phase(7), 1);
        assert_eq!(UsageCounter::<4>::phase(8), 0);
        // the mapping keeps alternating as positions grow without bound
        assert_eq!(UsageCounter::<4>::phase(4 * 1001), 1);
    }

    #[test]
    fn drain_tracks_the_entered_phase() {
        let users = UsageCounter::<4>::new();
        assert!(users.other_phase_empty(0));

        let t = users.enter(0);
        // a barrier for the next lap (positions 4..8) waits on phase 0
        assert!(!users.other_phase_empty(4));
        // one for the lap after that does not
        assert!(users.other_phase_empty(8));

        users.leave(t);
        assert!(users.other_phase_empty(4));
    }
}
