//! # Engine
//!
//! [`PaintEngine`] owns a canvas and everything around it. Messages are queued from any thread and applied
//! in batches by [`PaintEngine::tick`], either called directly or by a background [`Ticker`]. After
//! each tick, the new visible state is published and registered [`EventSink`]s are told what changed.
//!
//! Readers never wait on a tick: queries clone the published state, an `Arc`, and work from that.

mod session;

use std::sync::{
    atomic::{AtomicU8, Ordering},
    Arc,
};

use paintengine_core::{
    acl::AclState,
    annotation::{Annotation, Annotations},
    color::Color,
    document::DocumentMetadata,
    image::Image,
    layer::LayerInfo,
    message::{DrawMessage, InternalMessage},
    snapshot::SnapshotError,
    state::Resize,
    timeline::Timeline,
    util::{Rect, Size},
    AnnotationId, CanvasState, ChangeFlags, LayerId, Message, UserId,
};

use crate::{
    config::{ConfigError, EngineConfig},
    events::{EngineEvent, EventSink},
    preview::Preview,
    recorder::RecorderError,
    render::{Pixmap, RenderCache, RenderStats},
    ticker::Ticker,
};
use session::{EngineCore, Queued, TickOutput};

#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
    #[error("couldn't start render pool: {0}")]
    RenderPool(#[from] rayon::ThreadPoolBuildError),
    #[error("couldn't start ticker: {0}")]
    Ticker(#[from] std::io::Error),
}

/// Where the tick loop is at.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
#[repr(u8)]
pub enum TickPhase {
    Idle,
    /// Taking queued messages.
    Draining,
    /// Applying them and working out what changed.
    Computing,
    /// Notifying observers.
    Dispatching,
}
impl TickPhase {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Draining,
            2 => Self::Computing,
            3 => Self::Dispatching,
            _ => Self::Idle,
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Default)]
pub struct FrameOptions {
    /// Blend neighbouring frames in faintly. Not supported.
    pub onion_skins: bool,
}

struct Shared {
    config: EngineConfig,
    queue_send: crossbeam::channel::Sender<Queued>,
    queue_recv: crossbeam::channel::Receiver<Queued>,
    /// Serializes whole ticks, so events are dispatched in order.
    ticking: parking_lot::Mutex<()>,
    core: parking_lot::Mutex<EngineCore>,
    visible: parking_lot::RwLock<Arc<CanvasState>>,
    acl: parking_lot::RwLock<Arc<AclState>>,
    render: RenderCache,
    sinks: parking_lot::RwLock<Vec<Box<dyn EventSink>>>,
    phase: AtomicU8,
}
impl Shared {
    fn set_phase(&self, phase: TickPhase) {
        self.phase.store(phase as u8, Ordering::Release);
    }
    fn enqueue(&self, item: Queued) -> bool {
        // Can't disconnect, we hold both ends.
        self.queue_send.send(item).is_ok()
    }
    fn tick(&self) -> usize {
        let _ticking = self.ticking.lock();
        self.set_phase(TickPhase::Draining);
        let batch: Vec<Queued> = self.queue_recv.try_iter().collect();
        let count = batch.len();

        self.set_phase(TickPhase::Computing);
        let output = {
            let mut core = self.core.lock();
            for item in batch {
                core.process(item);
            }
            core.finish_tick()
        };
        let events = self.publish(output);

        self.set_phase(TickPhase::Dispatching);
        if !events.is_empty() {
            let sinks = self.sinks.read();
            for event in &events {
                for sink in sinks.iter() {
                    sink.handle(event);
                }
            }
        }
        self.set_phase(TickPhase::Idle);
        if count != 0 || !events.is_empty() {
            log::debug!("tick: {count} queued, {} events", events.len());
        }
        count
    }
    /// Make the tick's results visible, returning the events to send in dispatch order.
    fn publish(&self, output: TickOutput) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        if output.invalidate {
            self.render.invalidate();
        }
        if let Some((state, changes)) = output.visible {
            *self.visible.write() = Arc::clone(&state);
            self.render.publish(Arc::clone(&state), &changes.tiles);

            if changes.flags.contains(ChangeFlags::RESIZED) {
                let Resize {
                    offset_x,
                    offset_y,
                    old_size,
                } = changes.resize.unwrap_or(Resize {
                    offset_x: 0,
                    offset_y: 0,
                    old_size: state.size(),
                });
                events.push(EngineEvent::Resized {
                    offset_x,
                    offset_y,
                    old_size,
                });
            }
            if let Some(area) = changes.tiles.pixel_bounds(state.size()) {
                events.push(EngineEvent::AreaChanged(area));
            }
            if changes.flags.contains(ChangeFlags::LAYERS) {
                events.push(EngineEvent::LayersChanged(state.layer_infos()));
            }
            if changes.flags.contains(ChangeFlags::ANNOTATIONS) {
                events.push(EngineEvent::AnnotationsChanged(state.annotations().clone()));
            }
            if changes.flags.contains(ChangeFlags::METADATA) {
                events.push(EngineEvent::DocumentMetadataChanged(
                    state.metadata().clone(),
                ));
            }
            if changes.flags.contains(ChangeFlags::TIMELINE) {
                events.push(EngineEvent::TimelineChanged(state.timeline().clone()));
            }
        }
        if let Some((acl, changes)) = output.acl {
            *self.acl.write() = Arc::new(acl.clone());
            events.push(EngineEvent::AclsChanged {
                state: acl,
                changes,
            });
        }
        events.extend(output.rejected);
        events.extend(output.telemetry);
        if let Some(recording) = output.recorder {
            events.push(EngineEvent::RecorderStateChanged(recording));
        }
        if let Some(progress) = output.caught_up {
            events.push(EngineEvent::CaughtUpTo(progress));
        }
        events
    }
}

pub struct PaintEngine {
    ticker: parking_lot::Mutex<Option<Ticker>>,
    shared: Arc<Shared>,
}
impl PaintEngine {
    /// An engine with an empty canvas. Nothing happens until [`Self::tick`] or [`Self::start`].
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        let core = EngineCore::new(
            config.local_user,
            config.snapshot_max_states,
            config.snapshot_max_messages,
        )?;
        let render = RenderCache::new(config.render_threads, Arc::clone(core.published()))?;
        let (queue_send, queue_recv) = crossbeam::channel::unbounded();
        let visible = Arc::clone(core.published());
        let acl = Arc::new(core.acl().clone());
        log::info!("paint engine created for local user {}", config.local_user);
        Ok(Self {
            ticker: parking_lot::Mutex::new(None),
            shared: Arc::new(Shared {
                config,
                queue_send,
                queue_recv,
                ticking: parking_lot::Mutex::new(()),
                core: parking_lot::Mutex::new(core),
                visible: parking_lot::RwLock::new(visible),
                acl: parking_lot::RwLock::new(acl),
                render,
                sinks: parking_lot::RwLock::new(Vec::new()),
                phase: AtomicU8::new(TickPhase::Idle as u8),
            }),
        })
    }
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.shared.config
    }
    /// Start ticking in the background at the configured rate. Does nothing if already running.
    pub fn start(&self) -> Result<(), EngineError> {
        let mut ticker = self.ticker.lock();
        if ticker.is_none() {
            let shared = Arc::clone(&self.shared);
            *ticker = Some(Ticker::spawn(
                "Paint engine ticker".to_owned(),
                self.shared.config.tick_interval(),
                move || {
                    shared.tick();
                },
            )?);
            log::info!("ticking at {}Hz", self.shared.config.tick_rate_hz);
        }
        Ok(())
    }
    /// Stop the background ticker, waiting for the tick in progress.
    pub fn stop(&self) {
        drop(self.ticker.lock().take());
    }
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.ticker.lock().is_some()
    }
    pub fn add_sink(&self, sink: impl EventSink + 'static) {
        self.shared.sinks.write().push(Box::new(sink));
    }
    /// Register a sink which forwards every event into a channel.
    #[must_use]
    pub fn subscribe(&self) -> crossbeam::channel::Receiver<EngineEvent> {
        let (send, recv) = crossbeam::channel::unbounded();
        self.add_sink(send);
        recv
    }

    /// Queue messages for the next tick, returning how many were accepted.
    ///
    /// `local` messages come from this client and are shown right away, before the server has ordered them.
    /// Everything else is taken as authoritative.
    pub fn receive_messages(&self, local: bool, messages: impl IntoIterator<Item = Message>) -> usize {
        let mut accepted = 0;
        for message in messages {
            let item = if local {
                Queued::Local(message)
            } else {
                Queued::Remote(message)
            };
            if self.shared.enqueue(item) {
                accepted += 1;
            }
        }
        accepted
    }
    fn enqueue_internal(&self, message: InternalMessage) {
        self.shared
            .enqueue(Queued::Remote(Message::server(message)));
    }
    pub fn enqueue_reset(&self) {
        self.enqueue_internal(InternalMessage::Reset);
    }
    pub fn enqueue_load_blank(&self, size: Size, background: Color) {
        self.enqueue_internal(InternalMessage::LoadBlank {
            size,
            background: background.to_straight_argb(),
        });
    }
    pub fn enqueue_catchup_progress(&self, progress: u32) {
        self.enqueue_internal(InternalMessage::Catchup(progress));
    }
    pub fn enqueue_snapshot(&self) {
        self.enqueue_internal(InternalMessage::Snapshot);
    }
    pub fn enqueue_cleanup(&self) {
        self.enqueue_internal(InternalMessage::Cleanup);
    }

    /// Show `messages` drawn onto `layer` until the preview is cleared or replaced.
    pub fn preview_dabs(&self, layer: LayerId, messages: Vec<DrawMessage>) {
        self.shared
            .enqueue(Queued::Preview(Some(Preview::Dabs { layer, messages })));
    }
    /// Show `rect` of `layer` cut away, through an optional mask of `rect.w * rect.h` bytes.
    pub fn preview_cut(&self, layer: LayerId, rect: Rect, mask: Option<Vec<u8>>) {
        self.shared
            .enqueue(Queued::Preview(Some(Preview::Cut { layer, rect, mask })));
    }
    pub fn clear_preview(&self) {
        self.shared.enqueue(Queued::Preview(None));
    }

    /// Apply everything queued and notify observers. Returns how many queued items were handled.
    ///
    /// Must not be called from within an [`EventSink`].
    pub fn tick(&self) -> usize {
        self.shared.tick()
    }
    #[must_use]
    pub fn phase(&self) -> TickPhase {
        TickPhase::from_u8(self.shared.phase.load(Ordering::Acquire))
    }

    /// The visible canvas: committed, plus unacknowledged local messages and the preview.
    #[must_use]
    pub fn state(&self) -> Arc<CanvasState> {
        Arc::clone(&self.shared.visible.read())
    }
    #[must_use]
    pub fn canvas_size(&self) -> Size {
        self.state().size()
    }
    #[must_use]
    pub fn background_color(&self) -> Color {
        Color::from_pixel(self.state().background())
    }
    #[must_use]
    pub fn layers(&self) -> Vec<LayerInfo> {
        self.state().layer_infos()
    }
    #[must_use]
    pub fn annotations(&self) -> Annotations {
        self.state().annotations().clone()
    }
    #[must_use]
    pub fn metadata(&self) -> DocumentMetadata {
        self.state().metadata().clone()
    }
    #[must_use]
    pub fn timeline(&self) -> Timeline {
        self.state().timeline().clone()
    }
    #[must_use]
    pub fn frame_count(&self) -> usize {
        self.state().frame_count()
    }
    /// An unused annotation id in `user`'s namespace, or [`AnnotationId::NONE`] if all are taken.
    #[must_use]
    pub fn find_available_annotation_id(&self, user: UserId) -> AnnotationId {
        self.state()
            .annotations()
            .find_available_id(user)
            .unwrap_or_else(|| {
                log::warn!("user {user} has no annotation ids left");
                AnnotationId::NONE
            })
    }
    #[must_use]
    pub fn get_annotation_at(&self, x: i32, y: i32, expand: i32) -> Option<Annotation> {
        self.state().annotations().at(x, y, expand).cloned()
    }
    #[must_use]
    pub fn sample_color(&self, x: i32, y: i32, layer: LayerId, diameter: u32) -> Option<Color> {
        self.state().sample_color(x, y, layer, diameter)
    }
    /// Pixels of a layer, or the flattened canvas for [`LayerId::FLATTENED`], clipped to the canvas.
    #[must_use]
    pub fn get_layer_image(&self, layer: LayerId, rect: Rect) -> Option<Image> {
        self.state().layer_image(layer, rect)
    }
    #[must_use]
    pub fn get_frame_image(&self, frame: usize, rect: Rect, options: FrameOptions) -> Option<Image> {
        if options.onion_skins {
            log::error!("onion skins aren't supported in frame images");
            return None;
        }
        self.state().frame_image(frame, rect)
    }
    #[must_use]
    pub fn acl(&self) -> Arc<AclState> {
        Arc::clone(&self.shared.acl.read())
    }
    /// The newest retained committed state as of sequence number `seq`.
    #[must_use]
    pub fn snapshot_at(&self, seq: u64) -> Option<Arc<CanvasState>> {
        self.shared.core.lock().snapshot_at(seq)
    }
    /// Sequence number of the last accepted authoritative message.
    #[must_use]
    pub fn sequence(&self) -> u64 {
        self.shared.core.lock().seq()
    }
    /// Number of local messages not yet echoed by the server.
    #[must_use]
    pub fn pending_local(&self) -> usize {
        self.shared.core.lock().pending_local()
    }

    /// The flattened canvas with at least the tiles covering `area` up to date.
    pub fn pixmap_view(&self, area: Rect) -> parking_lot::MutexGuard<'_, Pixmap> {
        self.shared.render.view(area)
    }
    /// The flattened canvas, fully re-rendered.
    pub fn pixmap(&self) -> parking_lot::MutexGuard<'_, Pixmap> {
        self.shared.render.full()
    }
    pub fn with_pixmap<R>(&self, area: Rect, f: impl FnOnce(&Pixmap) -> R) -> R {
        f(&*self.pixmap_view(area))
    }
    #[must_use]
    pub fn render_stats(&self) -> RenderStats {
        self.shared.render.stats()
    }

    /// Write every message applied from now on to `path`. Replaces any recording in progress.
    pub fn start_recording(&self, path: &std::path::Path) -> Result<(), RecorderError> {
        self.shared.core.lock().start_recording(path)
    }
    /// Returns false if nothing was being recorded.
    pub fn stop_recording(&self) -> bool {
        self.shared.core.lock().stop_recording()
    }
    #[must_use]
    pub fn is_recording(&self) -> bool {
        self.shared.core.lock().is_recording()
    }
}
impl Drop for PaintEngine {
    fn drop(&mut self) {
        self.stop();
        self.stop_recording();
    }
}
