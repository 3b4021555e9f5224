//! Deferred resolution queue and its drain schedule.
//!
//! Handlers registered before the application has loaded their data cannot
//! be resolved by a single probe. They wait in a [`DeferredQueue`] and are
//! re-probed on a fixed cadence driven by [`DrainSchedule`].
//!
//! # Termination
//!
//! The schedule counts rounds, not entries: after `max_rounds` scheduled
//! drains it finishes whatever the queue still holds, and the caller moves
//! the survivors to the exhausted list via [`DeferredQueue::exhaust`].
//! Entries are never dropped silently.
//!
//! # Determinism
//!
//! The schedule never reads a clock. Hosts pass `now` from their own
//! monotonic source, so replaying the same timestamps replays the same
//! rounds.

#![forbid(unsafe_code)]

use normlink_core::{Handler, HandlerId, NodeId};
use web_time::Duration;

// ---------------------------------------------------------------------------
// Entries
// ---------------------------------------------------------------------------

/// An element whose handler could not be resolved yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingEntry {
    pub element: NodeId,
    pub handler: Handler,
    /// Drain passes that have looked at this entry.
    pub attempts: u32,
}

/// A harvested URL waiting for the next lifecycle trigger to be installed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedEntry {
    pub element: NodeId,
    pub url: String,
}

/// What a drain pass did with one entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempt {
    /// URL found and installed (or staged); drop the entry.
    Resolved,
    /// Already converted by someone else; drop the entry.
    Satisfied,
    /// Keep the entry for the next pass.
    Retry,
}

/// Counts for one drain pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub resolved: usize,
    pub satisfied: usize,
    pub retried: usize,
}

impl DrainReport {
    #[must_use]
    pub const fn examined(&self) -> usize {
        self.resolved + self.satisfied + self.retried
    }
}

// ---------------------------------------------------------------------------
// Queue
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct DeferredQueue {
    entries: Vec<PendingEntry>,
    exhausted: Vec<PendingEntry>,
}

impl DeferredQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry. Returns `false` if the same handler is already
    /// pending for the same element.
    pub fn push(&mut self, element: NodeId, handler: Handler) -> bool {
        if self.contains(element, handler.id()) {
            return false;
        }
        self.entries.push(PendingEntry {
            element,
            handler,
            attempts: 0,
        });
        true
    }

    #[must_use]
    pub fn contains(&self, element: NodeId, handler: HandlerId) -> bool {
        self.entries
            .iter()
            .any(|e| e.element == element && e.handler.id() == handler)
    }

    /// Drop a pending entry, e.g. because its listener was removed.
    pub fn remove(&mut self, element: NodeId, handler: HandlerId) -> bool {
        let before = self.entries.len();
        self.entries
            .retain(|e| !(e.element == element && e.handler.id() == handler));
        self.entries.len() != before
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PendingEntry> {
        self.entries.iter()
    }

    /// Entries given up on after the attempt budget ran out.
    #[must_use]
    pub fn exhausted(&self) -> &[PendingEntry] {
        &self.exhausted
    }

    /// One drain pass: snapshot and clear, run `attempt` on every entry,
    /// re-enqueue the ones that ask for a retry.
    ///
    /// Entries pushed by `attempt` itself land behind the re-enqueued ones
    /// and are not visited in this pass.
    pub fn drain_with<F>(&mut self, mut attempt: F) -> DrainReport
    where
        F: FnMut(&PendingEntry) -> Attempt,
    {
        let snapshot = std::mem::take(&mut self.entries);
        let mut report = DrainReport::default();
        let mut retry = Vec::with_capacity(snapshot.len());
        for mut entry in snapshot {
            entry.attempts = entry.attempts.saturating_add(1);
            match attempt(&entry) {
                Attempt::Resolved => report.resolved += 1,
                Attempt::Satisfied => report.satisfied += 1,
                Attempt::Retry => {
                    report.retried += 1;
                    retry.push(entry);
                }
            }
        }
        retry.append(&mut self.entries);
        self.entries = retry;
        report
    }

    /// Move every pending entry to the exhausted list. Returns how many moved.
    pub fn exhaust(&mut self) -> usize {
        let moved = self.entries.len();
        self.exhausted.append(&mut self.entries);
        moved
    }

    /// Remove and return an exhausted entry.
    pub fn take_exhausted(&mut self, index: usize) -> Option<PendingEntry> {
        (index < self.exhausted.len()).then(|| self.exhausted.remove(index))
    }

    /// Put an entry back on the exhausted list at `index`.
    pub fn restore_exhausted(&mut self, index: usize, entry: PendingEntry) {
        let index = index.min(self.exhausted.len());
        self.exhausted.insert(index, entry);
    }
}

// ---------------------------------------------------------------------------
// Schedule
// ---------------------------------------------------------------------------

/// Why a schedule stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainEnd {
    /// The queue emptied.
    Drained,
    /// The round budget ran out with entries left.
    Exhausted,
    /// Stopped by the host.
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainState {
    /// Waiting for the page to settle.
    Idle,
    /// Rounds are due every interval.
    Armed,
    Finished(DrainEnd),
}

/// Bounded, cancellable drain timer driven by host timestamps.
#[derive(Debug, Clone)]
pub struct DrainSchedule {
    interval: Duration,
    max_rounds: u32,
    state: DrainState,
    rounds: u32,
    next_due: Duration,
}

impl DrainSchedule {
    #[must_use]
    pub fn new(interval: Duration, max_rounds: u32) -> Self {
        Self {
            interval,
            max_rounds,
            state: DrainState::Idle,
            rounds: 0,
            next_due: Duration::ZERO,
        }
    }

    #[must_use]
    pub const fn state(&self) -> DrainState {
        self.state
    }

    #[must_use]
    pub const fn is_armed(&self) -> bool {
        matches!(self.state, DrainState::Armed)
    }

    #[must_use]
    pub const fn is_finished(&self) -> bool {
        matches!(self.state, DrainState::Finished(_))
    }

    /// Rounds run since the schedule was last armed.
    #[must_use]
    pub const fn rounds(&self) -> u32 {
        self.rounds
    }

    #[must_use]
    pub const fn max_rounds(&self) -> u32 {
        self.max_rounds
    }

    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Start (or restart with a fresh budget) unless already armed.
    /// The first round is due one interval after `now`.
    pub fn arm(&mut self, now: Duration) -> bool {
        if self.is_armed() {
            return false;
        }
        self.state = DrainState::Armed;
        self.rounds = 0;
        self.next_due = now.saturating_add(self.interval);
        true
    }

    /// Returns `true` when a round is due at `now` and counts it.
    ///
    /// Call repeatedly to catch up after a long gap; each call consumes one
    /// interval. A zero budget finishes the schedule on the first poll.
    pub fn poll(&mut self, now: Duration) -> bool {
        if !self.is_armed() || now < self.next_due {
            return false;
        }
        if self.rounds >= self.max_rounds {
            self.state = DrainState::Finished(DrainEnd::Exhausted);
            return false;
        }
        self.rounds += 1;
        self.next_due = self.next_due.saturating_add(self.interval);
        true
    }

    /// Report the outcome of the round just run.
    ///
    /// Returns the end state if this round finished the schedule.
    pub fn complete_round(&mut self, queue_empty: bool) -> Option<DrainEnd> {
        if !self.is_armed() {
            return None;
        }
        let end = if queue_empty {
            DrainEnd::Drained
        } else if self.rounds >= self.max_rounds {
            DrainEnd::Exhausted
        } else {
            return None;
        };
        self.state = DrainState::Finished(end);
        Some(end)
    }

    /// Stop an armed schedule.
    pub fn cancel(&mut self) -> bool {
        if !self.is_armed() {
            return false;
        }
        self.state = DrainState::Finished(DrainEnd::Cancelled);
        true
    }
}

impl Default for DrainSchedule {
    fn default() -> Self {
        Self::new(Duration::from_millis(100), 100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn nodes(n: usize) -> (normlink_core::Document, Vec<NodeId>) {
        let mut doc = normlink_core::Document::new();
        let ids = (0..n).map(|_| doc.create_element("div")).collect();
        (doc, ids)
    }

    fn noop() -> Handler {
        Handler::native("noop", |_, _| Ok(()))
    }

    #[test]
    fn push_dedupes_same_pair() {
        let (_doc, ids) = nodes(2);
        let h = noop();
        let mut q = DeferredQueue::new();
        assert!(q.push(ids[0], h.clone()));
        assert!(!q.push(ids[0], h.clone()));
        assert!(q.push(ids[1], h.clone()));
        assert!(q.push(ids[0], noop()));
        assert_eq!(q.len(), 3);
        assert!(q.remove(ids[1], h.id()));
        assert_eq!(q.len(), 2);
    }

    #[test]
    fn drain_keeps_only_retries_in_order() {
        let (_doc, ids) = nodes(4);
        let mut q = DeferredQueue::new();
        for id in &ids {
            q.push(*id, noop());
        }
        let report = q.drain_with(|entry| match entry.element.index() % 3 {
            0 => Attempt::Resolved,
            1 => Attempt::Retry,
            _ => Attempt::Satisfied,
        });
        assert_eq!(report.examined(), 4);
        let left: Vec<_> = q.iter().map(|e| (e.element, e.attempts)).collect();
        let expected: Vec<_> = ids
            .iter()
            .filter(|id| id.index() % 3 == 1)
            .map(|id| (*id, 1))
            .collect();
        assert_eq!(left, expected);
        assert_eq!(report.retried, expected.len());
    }

    #[test]
    fn exhaust_moves_everything_once() {
        let (_doc, ids) = nodes(3);
        let mut q = DeferredQueue::new();
        for id in &ids {
            q.push(*id, noop());
        }
        assert_eq!(q.exhaust(), 3);
        assert!(q.is_empty());
        assert_eq!(q.exhausted().len(), 3);
        assert_eq!(q.exhaust(), 0);

        let entry = q.take_exhausted(1).unwrap();
        assert_eq!(entry.element, ids[1]);
        assert_eq!(q.exhausted().len(), 2);
        assert!(q.take_exhausted(7).is_none());
        q.restore_exhausted(1, entry);
        assert_eq!(q.exhausted()[1].element, ids[1]);
    }

    #[test]
    fn schedule_rounds_follow_the_interval() {
        let mut s = DrainSchedule::new(Duration::from_millis(100), 3);
        assert_eq!(s.state(), DrainState::Idle);
        assert!(!s.poll(Duration::from_secs(10)));

        assert!(s.arm(Duration::from_millis(1000)));
        assert!(!s.arm(Duration::from_millis(1000)));
        assert!(!s.poll(Duration::from_millis(1099)));
        assert!(s.poll(Duration::from_millis(1100)));
        assert!(!s.poll(Duration::from_millis(1100)));
        assert_eq!(s.complete_round(false), None);

        // Catch-up after a long gap, bounded by the budget.
        let mut due = 0;
        while s.poll(Duration::from_secs(60)) {
            due += 1;
            if s.complete_round(false).is_some() {
                break;
            }
        }
        assert_eq!(due, 2);
        assert_eq!(s.rounds(), 3);
        assert_eq!(s.state(), DrainState::Finished(DrainEnd::Exhausted));
    }

    #[test]
    fn empty_queue_finishes_early_and_rearm_resets_budget() {
        let mut s = DrainSchedule::new(Duration::from_millis(50), 10);
        s.arm(Duration::ZERO);
        assert!(s.poll(Duration::from_millis(50)));
        assert_eq!(s.complete_round(true), Some(DrainEnd::Drained));
        assert!(s.is_finished());
        assert!(!s.poll(Duration::from_secs(1)));

        assert!(s.arm(Duration::from_secs(1)));
        assert_eq!(s.rounds(), 0);
        assert!(s.poll(Duration::from_millis(1050)));
    }

    #[test]
    fn cancel_only_applies_when_armed() {
        let mut s = DrainSchedule::default();
        assert!(!s.cancel());
        s.arm(Duration::ZERO);
        assert!(s.cancel());
        assert_eq!(s.state(), DrainState::Finished(DrainEnd::Cancelled));
        assert!(!s.poll(Duration::from_secs(100)));
    }

    #[test]
    fn zero_budget_exhausts_on_first_poll() {
        let mut s = DrainSchedule::new(Duration::from_millis(10), 0);
        s.arm(Duration::ZERO);
        assert!(!s.poll(Duration::from_millis(10)));
        assert_eq!(s.state(), DrainState::Finished(DrainEnd::Exhausted));
    }

    proptest! {
        #[test]
        fn schedule_never_exceeds_budget(
            budget in 0u32..20,
            steps in proptest::collection::vec(0u64..500, 1..60),
        ) {
            let mut s = DrainSchedule::new(Duration::from_millis(100), budget);
            s.arm(Duration::ZERO);
            let mut now = Duration::ZERO;
            let mut rounds = 0u32;
            for step in steps {
                now += Duration::from_millis(step);
                while s.poll(now) {
                    rounds += 1;
                    s.complete_round(false);
                }
            }
            prop_assert!(rounds <= budget);
            prop_assert_eq!(rounds, s.rounds());
        }
    }
}
