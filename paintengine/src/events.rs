//! Notifications the engine sends to its observers, once per tick.

use paintengine_core::{
    acl::{AclChanges, AclState},
    annotation::Annotations,
    document::DocumentMetadata,
    layer::LayerInfo,
    timeline::Timeline,
    util::{Rect, Size},
    LayerId, UserId,
};

#[derive(Clone, Debug, PartialEq, strum::IntoStaticStr)]
pub enum EngineEvent {
    /// The canvas changed size. Content moved by the offset.
    Resized {
        offset_x: i32,
        offset_y: i32,
        old_size: Size,
    },
    /// Pixels within this area changed since the last tick.
    AreaChanged(Rect),
    LayersChanged(Vec<LayerInfo>),
    AnnotationsChanged(Annotations),
    DocumentMetadataChanged(DocumentMetadata),
    TimelineChanged(Timeline),
    AclsChanged {
        state: AclState,
        changes: AclChanges,
    },
    MessageRejected {
        user: UserId,
        message: &'static str,
        reason: String,
    },
    /// A remote user moved their pointer. `layer` is the last layer they drew on.
    CursorMoved {
        user: UserId,
        layer: LayerId,
        x: i32,
        y: i32,
    },
    LaserTrail {
        user: UserId,
        persistence: u8,
        color: u32,
    },
    RecorderStateChanged(bool),
    CaughtUpTo(u32),
}
impl EngineEvent {
    #[must_use]
    pub fn kind(&self) -> &'static str {
        self.into()
    }
}

/// Receives engine events. Called from the tick thread, outside of any engine lock, so it may
/// query the engine. Should return promptly.
pub trait EventSink: Send + Sync {
    fn handle(&self, event: &EngineEvent);
}
impl<F> EventSink for F
where
    F: Fn(&EngineEvent) + Send + Sync,
{
    fn handle(&self, event: &EngineEvent) {
        self(event);
    }
}
impl EventSink for crossbeam::channel::Sender<EngineEvent> {
    fn handle(&self, event: &EngineEvent) {
        // Receiver gone, nobody's listening.
        let _ = self.send(event.clone());
    }
}
