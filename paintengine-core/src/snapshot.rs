//! A bounded window of recent canvas states, keyed by the sequence number of the message after which they
//! were taken.

use std::{collections::VecDeque, sync::Arc};

use crate::state::CanvasState;

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotError {
    #[error("snapshot queue must hold at least one state")]
    ZeroCapacity,
}

#[derive(Clone, Debug)]
pub struct Snapshot {
    pub seq: u64,
    pub state: Arc<CanvasState>,
}

#[derive(Clone, Debug)]
pub struct SnapshotQueue {
    max_states: usize,
    max_messages: u64,
    // Sorted by seq, ascending.
    entries: VecDeque<Snapshot>,
}
impl SnapshotQueue {
    pub fn new(max_states: usize, max_messages: u64) -> Result<Self, SnapshotError> {
        if max_states == 0 {
            return Err(SnapshotError::ZeroCapacity);
        }
        Ok(Self {
            max_states,
            max_messages,
            entries: VecDeque::with_capacity(max_states),
        })
    }
    /// Remember `state` as of `seq`. A snapshot at an already present or earlier seq replaces everything
    /// from that point on.
    pub fn push(&mut self, seq: u64, state: Arc<CanvasState>) {
        self.truncate_after(seq.saturating_sub(1));
        if self.entries.back().is_some_and(|s| s.seq >= seq) {
            self.entries.pop_back();
        }
        self.entries.push_back(Snapshot { seq, state });
        while self.entries.len() > self.max_states {
            self.entries.pop_front();
        }
        while self
            .entries
            .front()
            .is_some_and(|oldest| seq - oldest.seq > self.max_messages)
        {
            self.entries.pop_front();
        }
    }
    /// The newest snapshot taken at or before `seq`.
    #[must_use]
    pub fn at_or_before(&self, seq: u64) -> Option<&Snapshot> {
        self.entries.iter().rev().find(|s| s.seq <= seq)
    }
    #[must_use]
    pub fn oldest(&self) -> Option<&Snapshot> {
        self.entries.front()
    }
    #[must_use]
    pub fn newest(&self) -> Option<&Snapshot> {
        self.entries.back()
    }
    /// Forget every snapshot taken after `seq`.
    pub fn truncate_after(&mut self, seq: u64) {
        while self.entries.back().is_some_and(|s| s.seq > seq) {
            self.entries.pop_back();
        }
    }
    pub fn clear(&mut self) {
        self.entries.clear();
    }
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
    pub fn iter(&self) -> impl Iterator<Item = &Snapshot> + '_ {
        self.entries.iter()
    }
}
