//! Progress trackers for historical sync.
//!
//! Two trackers cooperate to turn unordered task completion into monotone
//! checkpoints:
//!
//! - [`ProgressTracker`] tracks one source's target range against its
//!   completed intervals and exposes the source watermark: the largest
//!   block `h` with `[target.min, h]` fully covered.
//! - [`BlockProgressTracker`] orders per-block durability and emits the
//!   global chain checkpoint, guaranteed monotone even when blocks finish
//!   out of order.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::SyncError;
use crate::types::interval::{Interval, IntervalSet};

// ═══════════════════════════════════════════════════════════════════════════════
// PROGRESS TRACKER
// ═══════════════════════════════════════════════════════════════════════════════

/// Outcome of recording a completed interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckpointAdvance {
    /// Whether the watermark moved.
    pub updated: bool,
    /// Watermark before the update.
    pub prev: Option<u64>,
    /// Watermark after the update.
    pub new: Option<u64>,
}

/// Tracks one source's completion against its target range.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    target: IntervalSet,
    completed: IntervalSet,
}

impl ProgressTracker {
    /// Create a tracker.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::CompletedOutsideTarget`] unless
    /// `completed ⊆ target`.
    pub fn new(target: IntervalSet, completed: IntervalSet) -> Result<Self, SyncError> {
        if !completed.difference(&target).is_empty() {
            return Err(SyncError::CompletedOutsideTarget);
        }
        Ok(Self { target, completed })
    }

    /// The target range.
    #[must_use]
    pub const fn target(&self) -> &IntervalSet {
        &self.target
    }

    /// The completed intervals, canonical form.
    #[must_use]
    pub const fn completed(&self) -> &IntervalSet {
        &self.completed
    }

    /// Work remaining: `target − completed`.
    #[must_use]
    pub fn required(&self) -> IntervalSet {
        self.target.difference(&self.completed)
    }

    /// Whether the whole target is covered.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.required().is_empty()
    }

    /// Total blocks in the target.
    #[must_use]
    pub fn total_blocks(&self) -> u64 {
        self.target.sum()
    }

    /// Blocks already covered.
    #[must_use]
    pub fn cached_blocks(&self) -> u64 {
        self.completed.sum()
    }

    /// The watermark: the largest `h` such that `[target.min, h]` is fully
    /// covered by `completed`. `None` until the first target block is
    /// covered. Monotone non-decreasing across `add_completed` calls.
    #[must_use]
    pub fn checkpoint(&self) -> Option<u64> {
        let start = self.target.min()?;
        let first = self.completed.intervals().first()?;
        if first.contains(start) {
            Some(first.hi)
        } else {
            None
        }
    }

    /// Record a completed interval, clamped to the target.
    pub fn add_completed(&mut self, interval: Interval) -> CheckpointAdvance {
        let prev = self.checkpoint();
        let addition = IntervalSet::of(interval.lo, interval.hi).intersection(&self.target);
        self.completed = self.completed.union(&addition);
        let new = self.checkpoint();
        CheckpointAdvance {
            updated: new > prev,
            prev,
            new,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// BLOCK PROGRESS TRACKER
// ═══════════════════════════════════════════════════════════════════════════════

/// Orders per-block completion and emits monotone `(number, timestamp)`
/// checkpoints.
///
/// Blocks become pending when their task is enqueued and complete when
/// their callbacks have persisted. A checkpoint `(n, ts)` is emitted only
/// once every pending block below `n` has completed, so emissions are
/// strictly increasing in block number.
#[derive(Debug, Clone, Default)]
pub struct BlockProgressTracker {
    pending: BTreeSet<u64>,
    completed: BTreeMap<u64, u64>,
    last_emitted: Option<(u64, u64)>,
}

impl BlockProgressTracker {
    /// Create an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register blocks whose tasks have been enqueued.
    pub fn add_pending(&mut self, blocks: impl IntoIterator<Item = u64>) {
        self.pending.extend(blocks);
    }

    /// Blocks still awaiting completion.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// The last emitted checkpoint, if any.
    #[must_use]
    pub const fn last_emitted(&self) -> Option<(u64, u64)> {
        self.last_emitted
    }

    /// Record a completed block and return the newest checkpoint this
    /// completion unlocked, if any.
    ///
    /// Completed blocks are drained in ascending order while no smaller
    /// block remains pending, so returned checkpoints are strictly
    /// increasing in block number.
    pub fn add_completed(&mut self, number: u64, timestamp: u64) -> Option<(u64, u64)> {
        self.pending.remove(&number);
        self.completed.insert(number, timestamp);

        let mut advanced = None;
        while let Some((&n, &ts)) = self.completed.first_key_value() {
            let blocked = self.pending.first().is_some_and(|&min_pending| min_pending < n);
            if blocked {
                break;
            }
            self.completed.pop_first();
            advanced = Some((n, ts));
        }

        match (advanced, self.last_emitted) {
            (Some(cp), Some(last)) if cp.0 <= last.0 => None,
            (Some(cp), _) => {
                self.last_emitted = Some(cp);
                Some(cp)
            }
            (None, _) => None,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
