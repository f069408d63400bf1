//! # Local fork
//!
//! Messages the local user sends are shown immediately, before the server has put them in order. They live
//! here, apart from the committed canvas, until the authoritative stream echoes them back.

use std::collections::VecDeque;

use crate::{
    id::UserId,
    message::{Apply, Body, Message},
    state::{CanvasState, Changes},
};

/// What an authoritative message meant for the fork.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum ForkOutcome {
    /// No local messages were pending.
    Empty,
    /// The message was the oldest pending local message.
    Acknowledged,
    /// Another user's message arrived in between. Local messages must be reapplied on top of it.
    Concurrent,
    /// The server's order disagrees with ours. Pending messages were dropped.
    Diverged,
}

#[derive(Clone, Debug)]
pub struct LocalFork {
    user: UserId,
    pending: VecDeque<Message>,
}
impl LocalFork {
    #[must_use]
    pub fn new(user: UserId) -> Self {
        Self {
            user,
            pending: VecDeque::new(),
        }
    }
    #[must_use]
    pub fn user(&self) -> UserId {
        self.user
    }
    pub fn push(&mut self, message: Message) {
        self.pending.push_back(message);
    }
    /// Reconcile with a message from the authoritative stream.
    pub fn receive(&mut self, message: &Message) -> ForkOutcome {
        let Some(head) = self.pending.front() else {
            return ForkOutcome::Empty;
        };
        if message.user != self.user {
            ForkOutcome::Concurrent
        } else if head == message {
            self.pending.pop_front();
            ForkOutcome::Acknowledged
        } else {
            log::debug!(
                "local fork diverged at {} message, dropping {} pending",
                message.kind(),
                self.pending.len()
            );
            self.pending.clear();
            ForkOutcome::Diverged
        }
    }
    /// Apply every pending message on top of `state`. Messages that don't apply are skipped.
    pub fn apply_to(&self, state: &mut CanvasState) -> Changes {
        let mut changes = Changes::default();
        for message in self.iter() {
            // Undo needs the authoritative history, it only takes effect once echoed.
            if matches!(message.body, Body::Undo(_) | Body::Internal(_)) {
                continue;
            }
            match state.apply(message) {
                Ok(applied) => changes.merge(applied),
                Err(e) => log::trace!("pending local {} message skipped: {e}", message.kind()),
            }
        }
        changes
    }
    pub fn iter(&self) -> impl Iterator<Item = &Message> + '_ {
        self.pending.iter()
    }
    pub fn clear(&mut self) {
        self.pending.clear();
    }
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }
}
