//! The mutable half of the engine. Owned by whichever thread is ticking.

use std::sync::Arc;

use paintengine_core::{
    acl::{AclChanges, AclFilter, AclState},
    fork::{ForkOutcome, LocalFork},
    history::History,
    message::{InternalMessage, TelemetryMessage, UndoMessage},
    snapshot::{SnapshotError, SnapshotQueue},
    state::Resize,
    Apply, Body, CanvasState, Changes, LayerId, Message, UserId,
};

use crate::{
    events::EngineEvent,
    preview::Preview,
    recorder::{JsonRecorder, Recorder, RecorderError},
};

pub(super) enum Queued {
    /// From the authoritative stream.
    Remote(Message),
    /// Sent by the local user, not yet ordered by the server.
    Local(Message),
    Preview(Option<Preview>),
}

/// What a tick produced, to be published after the core is unlocked.
#[derive(Default)]
pub(super) struct TickOutput {
    /// The new visible state and how it differs from the previous one.
    pub visible: Option<(Arc<CanvasState>, Changes)>,
    pub acl: Option<(AclState, AclChanges)>,
    /// The canvas was replaced wholesale.
    pub invalidate: bool,
    pub rejected: Vec<EngineEvent>,
    pub telemetry: Vec<EngineEvent>,
    pub recorder: Option<bool>,
    pub caught_up: Option<u32>,
}

pub(super) struct EngineCore {
    committed: CanvasState,
    /// Committed state with the local fork on top.
    speculative: Arc<CanvasState>,
    /// Speculative state with the preview on top. This is what readers see.
    published: Arc<CanvasState>,
    preview: Option<Preview>,
    acl: AclFilter,
    fork: LocalFork,
    history: History,
    snapshots: SnapshotQueue,
    /// Sequence number of the last accepted authoritative message.
    seq: u64,
    recorder: Option<Box<dyn Recorder>>,
    last_layer: hashbrown::HashMap<UserId, LayerId>,

    committed_dirty: bool,
    fork_dirty: bool,
    preview_dirty: bool,
    resize: Option<Resize>,
    recorder_changed: Option<bool>,
    out: TickOutput,
}
impl EngineCore {
    pub fn new(
        local_user: UserId,
        max_states: usize,
        max_messages: u64,
    ) -> Result<Self, SnapshotError> {
        let committed = CanvasState::default();
        let mut snapshots = SnapshotQueue::new(max_states, max_messages)?;
        snapshots.push(0, Arc::new(committed.clone()));
        let published = Arc::new(committed.clone());
        Ok(Self {
            committed,
            speculative: Arc::clone(&published),
            published,
            preview: None,
            acl: AclFilter::default(),
            fork: LocalFork::new(local_user),
            history: History::default(),
            snapshots,
            seq: 0,
            recorder: None,
            last_layer: hashbrown::HashMap::new(),
            committed_dirty: false,
            fork_dirty: false,
            preview_dirty: false,
            resize: None,
            recorder_changed: None,
            out: TickOutput::default(),
        })
    }
    pub fn published(&self) -> &Arc<CanvasState> {
        &self.published
    }
    pub fn acl(&self) -> &AclState {
        self.acl.state()
    }
    pub fn seq(&self) -> u64 {
        self.seq
    }
    pub fn pending_local(&self) -> usize {
        self.fork.len()
    }
    pub fn snapshot_at(&self, seq: u64) -> Option<Arc<CanvasState>> {
        self.snapshots
            .at_or_before(seq)
            .map(|snapshot| Arc::clone(&snapshot.state))
    }

    pub fn process(&mut self, item: Queued) {
        match item {
            Queued::Remote(message) => self.receive_remote(&message),
            Queued::Local(message) => self.receive_local(message),
            Queued::Preview(preview) => {
                if self.preview != preview {
                    self.preview = preview;
                    self.preview_dirty = true;
                }
            }
        }
    }
    fn reject(&mut self, message: &Message, reason: String) {
        self.out.rejected.push(EngineEvent::MessageRejected {
            user: message.user,
            message: message.kind(),
            reason,
        });
    }
    fn receive_local(&mut self, message: Message) {
        if message.user != self.fork.user() {
            // Its echo could never acknowledge it, it would linger until cleanup.
            log::warn!(
                "local {} message claims user {}, but this is user {}",
                message.kind(),
                message.user,
                self.fork.user()
            );
            self.reject(&message, format!("not sent by local user {}", self.fork.user()));
            return;
        }
        if let Err(reason) = self.acl.check(&message, &self.committed) {
            log::warn!(
                target: "paintengine::acl",
                "denied local {} message: {reason}",
                message.kind()
            );
            self.reject(&message, reason.to_string());
            return;
        }
        if message.is_undoable() || message.undo().is_some() {
            self.fork.push(message);
            self.fork_dirty = true;
        } else {
            log::debug!(
                "local {} message can't be shown ahead of the server, ignored",
                message.kind()
            );
        }
    }
    fn receive_remote(&mut self, message: &Message) {
        // Only these can be waiting in the fork. An echo settles its fork entry even if the filter below
        // rejects it here: the server has ordered it either way.
        if (message.is_undoable() || message.undo().is_some())
            && self.fork.receive(message) != ForkOutcome::Empty
        {
            self.fork_dirty = true;
        }
        if let Err(reason) = self.acl.filter(message, &self.committed) {
            self.reject(message, reason.to_string());
            return;
        }
        self.seq += 1;
        match &message.body {
            Body::Internal(internal) => self.internal(message, internal),
            Body::Undo(UndoMessage::Undo {
                override_user,
                redo,
            }) => self.undo(message, override_user.unwrap_or(message.user), *redo),
            Body::Telemetry(telemetry) => {
                self.telemetry(message.user, telemetry);
                self.record(message);
            }
            // Already absorbed by the filter.
            Body::Acl(_) => self.record(message),
            _ => self.apply_committed(message),
        }
    }
    fn apply_committed(&mut self, message: &Message) {
        match self.committed.apply(message) {
            Ok(changes) => {
                log::trace!("#{} {} from user {}", self.seq, message.kind(), message.user);
                self.note_resize(changes.resize);
                self.committed_dirty |= !changes.is_empty();
                self.history.record(self.seq, message);
                if message.undo() == Some(&UndoMessage::UndoPoint) {
                    self.take_snapshot();
                }
                if let Body::Draw(draw) = &message.body {
                    self.last_layer.insert(message.user, draw.layer());
                }
                self.record(message);
            }
            Err(e) => {
                log::warn!(
                    "{} message from user {} failed: {e}",
                    message.kind(),
                    message.user
                );
                self.reject(message, e.to_string());
            }
        }
    }
    fn internal(&mut self, message: &Message, internal: &InternalMessage) {
        match internal {
            InternalMessage::Reset | InternalMessage::LoadBlank { .. } => {
                match self.committed.apply(message) {
                    Ok(changes) => {
                        log::info!("canvas replaced, now {:?}", self.committed.size());
                        self.note_resize(changes.resize);
                        self.history.clear();
                        self.snapshots.clear();
                        self.snapshots
                            .push(self.seq, Arc::new(self.committed.clone()));
                        self.fork.clear();
                        self.preview = None;
                        self.last_layer.clear();
                        self.committed_dirty = true;
                        self.fork_dirty = true;
                        self.preview_dirty = true;
                        self.out.invalidate = true;
                        self.record(message);
                    }
                    Err(e) => {
                        log::warn!("couldn't replace canvas: {e}");
                        self.reject(message, e.to_string());
                    }
                }
            }
            InternalMessage::Snapshot => self.take_snapshot(),
            InternalMessage::Catchup(progress) => self.out.caught_up = Some(*progress),
            InternalMessage::Cleanup => {
                if !self.fork.is_empty() {
                    log::debug!("dropping {} unacknowledged local messages", self.fork.len());
                    self.fork.clear();
                    self.fork_dirty = true;
                }
            }
        }
    }
    fn undo(&mut self, message: &Message, user: UserId, redo: bool) {
        match self.history.undo(user, redo, &mut self.snapshots) {
            Ok(state) => {
                log::trace!(
                    "#{} {} for user {user}",
                    self.seq,
                    if redo { "redo" } else { "undo" }
                );
                self.committed = state;
                self.committed_dirty = true;
                self.record(message);
            }
            Err(e) => {
                log::warn!("undo for user {user} failed: {e}");
                self.reject(message, e.to_string());
            }
        }
    }
    fn telemetry(&mut self, user: UserId, telemetry: &TelemetryMessage) {
        let event = match *telemetry {
            TelemetryMessage::MovePointer { x, y } => EngineEvent::CursorMoved {
                user,
                layer: self
                    .last_layer
                    .get(&user)
                    .copied()
                    .unwrap_or(LayerId::FLATTENED),
                x,
                y,
            },
            TelemetryMessage::LaserTrail { persistence, color } => EngineEvent::LaserTrail {
                user,
                persistence,
                color,
            },
        };
        self.out.telemetry.push(event);
    }
    fn take_snapshot(&mut self) {
        self.snapshots
            .push(self.seq, Arc::new(self.committed.clone()));
        if let Some(oldest) = self.snapshots.oldest() {
            self.history.trim_before(oldest.seq);
        }
    }
    fn note_resize(&mut self, resize: Option<Resize>) {
        let Some(resize) = resize else { return };
        self.resize = Some(match self.resize {
            // Several resizes in one tick, report them as one.
            Some(first) => Resize {
                offset_x: first.offset_x.saturating_add(resize.offset_x),
                offset_y: first.offset_y.saturating_add(resize.offset_y),
                old_size: first.old_size,
            },
            None => resize,
        });
    }

    pub fn is_recording(&self) -> bool {
        self.recorder.is_some()
    }
    pub fn start_recording(&mut self, path: &std::path::Path) -> Result<(), RecorderError> {
        let recorder = JsonRecorder::create(path, &self.committed.to_reset_messages())?;
        if self.recorder.is_some() {
            self.stop_recording();
        }
        log::info!("recording to {}", path.display());
        self.recorder = Some(Box::new(recorder));
        self.recorder_changed = Some(true);
        Ok(())
    }
    pub fn stop_recording(&mut self) -> bool {
        let Some(recorder) = self.recorder.take() else {
            return false;
        };
        if let Err(e) = recorder.finish() {
            log::error!("recording didn't finish cleanly: {e}");
        }
        self.recorder_changed = Some(false);
        true
    }
    fn record(&mut self, message: &Message) {
        let Some(recorder) = self.recorder.as_mut() else {
            return;
        };
        if let Err(e) = recorder.record(message) {
            log::error!("recording failed, stopping: {e}");
            self.stop_recording();
        }
    }

    /// Rebuild the visible state if anything under it changed, and hand over everything this tick produced.
    pub fn finish_tick(&mut self) -> TickOutput {
        let mut out = std::mem::take(&mut self.out);
        let acl_changes = self.acl.take_changes();
        if !acl_changes.is_empty() {
            out.acl = Some((self.acl.state().clone(), acl_changes));
        }
        out.recorder = self.recorder_changed.take();

        if self.committed_dirty || self.fork_dirty {
            let mut speculative = self.committed.clone();
            if !self.fork.is_empty() {
                self.fork.apply_to(&mut speculative);
            }
            self.speculative = Arc::new(speculative);
        }
        if self.committed_dirty || self.fork_dirty || self.preview_dirty {
            let published = match &self.preview {
                Some(preview) => {
                    let mut state = CanvasState::clone(&self.speculative);
                    preview.apply_to(&mut state);
                    Arc::new(state)
                }
                None => Arc::clone(&self.speculative),
            };
            let mut changes = self.published.diff(&published);
            if changes.resize.is_some() {
                // The diff can't see how content moved.
                if let Some(resize) = self.resize {
                    changes.resize = Some(resize);
                }
            }
            self.published = Arc::clone(&published);
            out.visible = Some((published, changes));
        }
        self.committed_dirty = false;
        self.fork_dirty = false;
        self.preview_dirty = false;
        self.resize = None;
        out
    }
}
