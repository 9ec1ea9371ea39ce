//! Ordered index of pending timer candidates.

use std::fmt;

use cadenza_core::{SequenceId, Task};

/// A timer that may or may not have been persisted yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerCandidate {
    /// Ordering key. For user timers loaded from a snapshot the tie-break is
    /// process-local, not the persisted one.
    pub sequence_id: SequenceId,
    /// Task template to materialize.
    pub task: Task,
    /// Whether a persisted task already exists for this timer.
    pub task_created: bool,
}

impl fmt::Display for TimerCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} created={}",
            self.sequence_id,
            self.task.kind(),
            self.task_created
        )
    }
}

/// Candidates sorted ascending by [`SequenceId`].
///
/// Equal keys keep insertion order.
#[derive(Debug, Clone, Default)]
pub struct PendingTimerIndex {
    timers: Vec<TimerCandidate>,
}

impl PendingTimerIndex {
    /// Empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert keeping order. Returns `true` if the candidate is now the earliest.
    pub fn insert(&mut self, candidate: TimerCandidate) -> bool {
        let at = self
            .timers
            .partition_point(|t| t.sequence_id <= candidate.sequence_id);
        self.timers.insert(at, candidate);
        at == 0
    }

    /// Earliest candidate.
    #[must_use]
    pub fn peek_earliest(&self) -> Option<&TimerCandidate> {
        self.timers.first()
    }

    /// Earliest candidate, mutably.
    pub fn earliest_mut(&mut self) -> Option<&mut TimerCandidate> {
        self.timers.first_mut()
    }

    /// All candidates in ascending order.
    #[must_use]
    pub fn all(&self) -> &[TimerCandidate] {
        &self.timers
    }

    /// Number of candidates.
    #[must_use]
    pub fn len(&self) -> usize {
        self.timers.len()
    }

    /// Returns `true` if there are no candidates.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }

    /// Drop every candidate.
    pub fn clear(&mut self) {
        self.timers.clear();
    }
}
