//! # Undo history
//!
//! Each user's messages are grouped by the undo points they send. Undoing a group doesn't invert anything:
//! the canvas is rebuilt from a snapshot taken before the group, replaying the retained history minus every
//! undone group.

use std::collections::VecDeque;

use crate::{
    id::UserId,
    message::{Apply, ApplyError, Body, Message, UndoMessage},
    snapshot::SnapshotQueue,
    state::CanvasState,
};

#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum UndoState {
    Done,
    Undone,
    /// Undone, and then cut off by a new undo point. Can never be redone.
    Gone,
}

#[derive(Clone, Debug)]
pub struct HistoryEntry {
    pub seq: u64,
    pub message: Message,
    pub state: UndoState,
    /// Sequence number of the sender's undo point this message follows, if any.
    pub group: Option<u64>,
}

#[derive(Clone, Debug, Default)]
pub struct History {
    entries: VecDeque<HistoryEntry>,
    /// Each user's most recent undo point.
    last_point: hashbrown::HashMap<UserId, u64>,
}
impl History {
    /// Record an applied message. Only undo points and undoable messages are kept.
    pub fn record(&mut self, seq: u64, message: &Message) {
        let user = message.user;
        let group = if matches!(message.body, Body::Undo(UndoMessage::UndoPoint)) {
            for entry in &mut self.entries {
                if entry.message.user == user && entry.state == UndoState::Undone {
                    entry.state = UndoState::Gone;
                }
            }
            self.last_point.insert(user, seq);
            Some(seq)
        } else if message.is_undoable() {
            self.last_point.get(&user).copied()
        } else {
            return;
        };
        self.entries.push_back(HistoryEntry {
            seq,
            message: message.clone(),
            state: UndoState::Done,
            group,
        });
    }
    /// Drop entries older than `seq`, which no snapshot can replay from anymore.
    pub fn trim_before(&mut self, seq: u64) {
        while self.entries.front().is_some_and(|e| e.seq < seq) {
            self.entries.pop_front();
        }
        self.last_point.retain(|_, point| *point >= seq);
    }
    pub fn clear(&mut self) {
        self.entries.clear();
        self.last_point.clear();
    }
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
    pub fn iter(&self) -> impl Iterator<Item = &HistoryEntry> + '_ {
        self.entries.iter()
    }
    fn points(&self, user: UserId, state: UndoState) -> impl Iterator<Item = u64> + '_ {
        self.entries
            .iter()
            .filter(move |e| {
                e.message.user == user
                    && e.state == state
                    && matches!(e.message.body, Body::Undo(UndoMessage::UndoPoint))
            })
            .map(|e| e.seq)
    }
    /// Start of the user's newest group that is still in effect.
    #[must_use]
    pub fn find_undo(&self, user: UserId) -> Option<u64> {
        self.points(user, UndoState::Done).last()
    }
    /// Start of the user's oldest group that can be redone.
    #[must_use]
    pub fn find_redo(&self, user: UserId) -> Option<u64> {
        self.points(user, UndoState::Undone).next()
    }
    fn set_group(&mut self, user: UserId, start: u64, state: UndoState) {
        for entry in &mut self.entries {
            if entry.message.user == user && entry.group == Some(start) {
                entry.state = state;
            }
        }
    }
    /// Undo or redo `user`'s latest group, returning the rebuilt canvas.
    ///
    /// Snapshots taken inside the affected span are discarded, as they no longer describe the canvas.
    pub fn undo(
        &mut self,
        user: UserId,
        redo: bool,
        snapshots: &mut SnapshotQueue,
    ) -> Result<CanvasState, ApplyError> {
        let start = if redo {
            self.find_redo(user).ok_or(ApplyError::NothingToRedo)?
        } else {
            self.find_undo(user).ok_or(ApplyError::NothingToUndo)?
        };
        let base = snapshots
            .at_or_before(start)
            .ok_or(ApplyError::HistoryUnavailable)?;
        let base_seq = base.seq;
        let mut state = CanvasState::clone(&base.state);
        self.set_group(
            user,
            start,
            if redo {
                UndoState::Done
            } else {
                UndoState::Undone
            },
        );
        for entry in self.entries.iter().filter(|e| e.seq > base_seq && e.state == UndoState::Done) {
            if let Err(e) = state.apply(&entry.message) {
                log::debug!("replayed message #{} no longer applies: {e}", entry.seq);
            }
        }
        snapshots.truncate_after(start);
        Ok(state)
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use super::History;
    use crate::{
        blend::BlendMode,
        color::Pixel,
        id::LayerId,
        message::{Apply, ApplyError, DrawMessage, Message, UndoMessage},
        snapshot::SnapshotQueue,
        state::CanvasState,
        util::{Rect, Size},
    };

    /// Applies messages the way the engine does: record, and snapshot at undo points.
    struct Session {
        state: CanvasState,
        history: History,
        snapshots: SnapshotQueue,
        seq: u64,
    }
    impl Session {
        fn new() -> Self {
            let state = CanvasState::blank(Size::new(64, 64), Pixel::WHITE).unwrap();
            let mut snapshots = SnapshotQueue::new(8, 1000).unwrap();
            snapshots.push(0, Arc::new(state.clone()));
            Self {
                state,
                history: History::default(),
                snapshots,
                seq: 0,
            }
        }
        fn send(&mut self, message: Message) {
            self.seq += 1;
            self.state.apply(&message).unwrap();
            self.history.record(self.seq, &message);
            if message.undo() == Some(&UndoMessage::UndoPoint) {
                self.snapshots.push(self.seq, Arc::new(self.state.clone()));
            }
        }
        fn stroke(&mut self, user: u8, x: i32) {
            self.send(Message::new(user, UndoMessage::UndoPoint));
            self.send(Message::new(
                user,
                DrawMessage::FillRect {
                    layer: LayerId(0x0101),
                    blend: BlendMode::Normal,
                    color: 0xFF00_0000,
                    rect: Rect::new(x, 0, 1, 1),
                },
            ));
        }
        fn undo(&mut self, user: u8, redo: bool) -> Result<(), ApplyError> {
            self.state = self.history.undo(user, redo, &mut self.snapshots)?;
            Ok(())
        }
        fn black(&self, x: i32) -> bool {
            self.state.flattened_pixel(x, 0) == Pixel::BLACK
        }
    }

    #[test]
    fn undo_keeps_other_users_work() {
        let mut session = Session::new();
        session.stroke(1, 0);
        session.stroke(2, 1);
        session.stroke(1, 2);
        session.undo(1, false).unwrap();
        assert!(session.black(0) && session.black(1) && !session.black(2));
        session.undo(1, false).unwrap();
        assert!(!session.black(0) && session.black(1));
        // Redo comes back oldest first.
        session.undo(1, true).unwrap();
        assert!(session.black(0) && !session.black(2));
        session.undo(1, true).unwrap();
        assert!(session.black(2));
        assert_eq!(session.undo(1, true), Err(ApplyError::NothingToRedo));
    }
    #[test]
    fn new_undo_point_drops_redo() {
        let mut session = Session::new();
        session.stroke(1, 0);
        session.undo(1, false).unwrap();
        session.stroke(1, 5);
        assert_eq!(session.undo(1, true), Err(ApplyError::NothingToRedo));
        session.undo(1, false).unwrap();
        assert!(!session.black(0) && !session.black(5));
        assert_eq!(session.undo(1, false), Err(ApplyError::NothingToUndo));
    }
    #[test]
    fn undo_past_window() {
        let mut session = Session::new();
        session.stroke(1, 0);
        session.snapshots = SnapshotQueue::new(1, 1000).unwrap();
        session.stroke(1, 1);
        session.undo(1, false).unwrap();
        assert_eq!(session.undo(1, false), Err(ApplyError::HistoryUnavailable));
        // Nothing was marked undone by the failed attempt.
        assert!(session.black(0));
        assert_eq!(session.history.find_undo(1), Some(1));
    }
}
