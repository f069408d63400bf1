//! # Messages
//!
//! Every change to a shared canvas is a message. Replicas that apply the same messages in the same order end
//! up with bit-identical canvases, so everything a message needs is carried in it by value.
//!
//! Messages arrive pre-decoded; turning bytes on the wire into these is the session layer's business.

use crate::{
    acl::Tier,
    annotation::VAlign,
    blend::BlendMode,
    document::MetadataField,
    id::{AnnotationId, LayerId, UserId, SERVER_USER},
    layer::Dab,
    tile::{TileCoord, TileData, TileError},
    util::{Rect, Size},
};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ApplyError {
    #[error("{0} does not exist")]
    UnknownLayer(LayerId),
    #[error("{0} already exists")]
    DuplicateLayer(LayerId),
    #[error("{0} is not a valid layer id")]
    InvalidLayerId(LayerId),
    #[error("{0} does not exist")]
    UnknownAnnotation(AnnotationId),
    #[error("{0} already exists")]
    DuplicateAnnotation(AnnotationId),
    #[error("{0} is not a valid annotation id")]
    InvalidAnnotationId(AnnotationId),
    #[error("invalid canvas size {0}x{1}")]
    InvalidSize(i64, i64),
    #[error("no layer below {0} to merge into")]
    NothingToMergeInto(LayerId),
    #[error("frame {0} does not exist")]
    InvalidFrame(usize),
    #[error("invalid value: {0}")]
    InvalidValue(&'static str),
    #[error("bad tile: {0}")]
    Tile(#[from] TileError),
    #[error("{0} messages do not modify the canvas")]
    NotCanvasMessage(&'static str),
    #[error("nothing to undo")]
    NothingToUndo,
    #[error("nothing to redo")]
    NothingToRedo,
    #[error("history needed for undo is no longer available")]
    HistoryUnavailable,
}

pub trait Apply<M> {
    type Output;
    /// Apply a single message. If this generates an error,
    /// the state of `self` should *not* be observably changed.
    fn apply(&mut self, message: &M) -> Result<Self::Output, ApplyError>;
}

/// Control messages, generated by the engine or the session rather than by users.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum InternalMessage {
    /// Replace the canvas with an empty one.
    Reset,
    /// Replace the canvas with a blank one of the given size. Background is straight `0xAARRGGBB`.
    LoadBlank { size: Size, background: u32 },
    /// Remember the current state.
    Snapshot,
    /// Progress of the initial download, in percent.
    Catchup(u32),
    /// Drop any unacknowledged local messages.
    Cleanup,
}

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum UndoMessage {
    /// Start of a new undoable group of the sender's messages.
    UndoPoint,
    Undo {
        /// Operators may undo on behalf of another user.
        override_user: Option<UserId>,
        redo: bool,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum CanvasMessage {
    /// Grow (positive) or shrink (negative) each edge.
    Resize {
        top: i32,
        right: i32,
        bottom: i32,
        left: i32,
    },
    Background { color: u32 },
}

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum LayerMessage {
    /// Add a layer on top. A `source` layer is duplicated, otherwise the layer is filled with `fill`.
    Create {
        id: LayerId,
        source: Option<LayerId>,
        fill: u32,
        title: String,
    },
    Attributes {
        id: LayerId,
        opacity: u8,
        blend: BlendMode,
        censored: bool,
        fixed: bool,
    },
    Retitle {
        id: LayerId,
        title: String,
    },
    Visibility {
        id: LayerId,
        hidden: bool,
    },
    /// New bottom-to-top order.
    Order {
        order: Vec<LayerId>,
    },
    Delete {
        id: LayerId,
        merge: bool,
    },
}
impl LayerMessage {
    #[must_use]
    pub fn id(&self) -> Option<LayerId> {
        match self {
            Self::Create { id, .. }
            | Self::Attributes { id, .. }
            | Self::Retitle { id, .. }
            | Self::Visibility { id, .. }
            | Self::Delete { id, .. } => Some(*id),
            Self::Order { .. } => None,
        }
    }
}

/// Pixel operations on a single layer. Colors are straight `0xAARRGGBB`.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum DrawMessage {
    /// Write a tile at `coord` and `repeat` more positions after it.
    PutTile {
        layer: LayerId,
        coord: TileCoord,
        repeat: u16,
        data: TileData,
    },
    FillRect {
        layer: LayerId,
        blend: BlendMode,
        color: u32,
        rect: Rect,
    },
    Dabs {
        layer: LayerId,
        color: u32,
        blend: BlendMode,
        dabs: Vec<Dab>,
    },
}
impl DrawMessage {
    #[must_use]
    pub fn layer(&self) -> LayerId {
        match self {
            Self::PutTile { layer, .. } | Self::FillRect { layer, .. } | Self::Dabs { layer, .. } => {
                *layer
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum AnnotationMessage {
    Create {
        id: AnnotationId,
        rect: Rect,
    },
    Reshape {
        id: AnnotationId,
        rect: Rect,
    },
    Edit {
        id: AnnotationId,
        background: u32,
        protect: bool,
        valign: VAlign,
        text: String,
    },
    Delete {
        id: AnnotationId,
    },
}
impl AnnotationMessage {
    #[must_use]
    pub fn id(&self) -> AnnotationId {
        match self {
            Self::Create { id, .. }
            | Self::Reshape { id, .. }
            | Self::Edit { id, .. }
            | Self::Delete { id } => *id,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum DocumentMessage {
    SetMetadata(MetadataField),
    SetTimelineFrame {
        frame: u16,
        insert: bool,
        layers: Vec<LayerId>,
    },
    RemoveTimelineFrame {
        frame: u16,
    },
}

/// Changes to the access control state.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum AclMessage {
    /// The full set of operators.
    SessionOwner { users: Vec<UserId> },
    TrustedUsers { users: Vec<UserId> },
    /// The full set of locked users.
    UserAcl { users: Vec<UserId> },
    /// Tier required for each feature, in feature order. Missing trailing entries are left as is.
    FeatureAccessLevels { tiers: Vec<Tier> },
    LayerAcl {
        id: LayerId,
        locked: bool,
        tier: Tier,
        /// If non-empty, only these users may draw on the layer.
        exclusive: Vec<UserId>,
    },
}

/// Ephemeral messages which never touch the canvas.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum TelemetryMessage {
    MovePointer { x: i32, y: i32 },
    LaserTrail { persistence: u8, color: u32 },
}

#[derive(Clone, Debug, PartialEq, Eq, strum::IntoStaticStr, serde::Serialize, serde::Deserialize)]
pub enum Body {
    Internal(InternalMessage),
    Undo(UndoMessage),
    Canvas(CanvasMessage),
    Layer(LayerMessage),
    Draw(DrawMessage),
    Annotation(AnnotationMessage),
    Document(DocumentMessage),
    Acl(AclMessage),
    Telemetry(TelemetryMessage),
}
impl From<InternalMessage> for Body {
    fn from(value: InternalMessage) -> Self {
        Self::Internal(value)
    }
}
impl From<UndoMessage> for Body {
    fn from(value: UndoMessage) -> Self {
        Self::Undo(value)
    }
}
impl From<CanvasMessage> for Body {
    fn from(value: CanvasMessage) -> Self {
        Self::Canvas(value)
    }
}
impl From<LayerMessage> for Body {
    fn from(value: LayerMessage) -> Self {
        Self::Layer(value)
    }
}
impl From<DrawMessage> for Body {
    fn from(value: DrawMessage) -> Self {
        Self::Draw(value)
    }
}
impl From<AnnotationMessage> for Body {
    fn from(value: AnnotationMessage) -> Self {
        Self::Annotation(value)
    }
}
impl From<DocumentMessage> for Body {
    fn from(value: DocumentMessage) -> Self {
        Self::Document(value)
    }
}
impl From<AclMessage> for Body {
    fn from(value: AclMessage) -> Self {
        Self::Acl(value)
    }
}
impl From<TelemetryMessage> for Body {
    fn from(value: TelemetryMessage) -> Self {
        Self::Telemetry(value)
    }
}

/// A message and the user who sent it.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Message {
    pub user: UserId,
    pub body: Body,
}
impl Message {
    #[must_use]
    pub fn new(user: UserId, body: impl Into<Body>) -> Self {
        Self {
            user,
            body: body.into(),
        }
    }
    /// A message from the server user.
    #[must_use]
    pub fn server(body: impl Into<Body>) -> Self {
        Self::new(SERVER_USER, body)
    }
    #[must_use]
    pub fn user(&self) -> UserId {
        self.user
    }
    /// Name of the message category, for logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        (&self.body).into()
    }
    /// The layer this message targets, if any.
    #[must_use]
    pub fn layer(&self) -> Option<LayerId> {
        match &self.body {
            Body::Draw(draw) => Some(draw.layer()),
            Body::Layer(layer) => layer.id(),
            _ => None,
        }
    }
    /// Messages which are grouped by undo points and can be undone.
    #[must_use]
    pub fn is_undoable(&self) -> bool {
        matches!(
            self.body,
            Body::Canvas(_) | Body::Layer(_) | Body::Draw(_) | Body::Annotation(_) | Body::Document(_)
        )
    }
    #[must_use]
    pub fn internal(&self) -> Option<&InternalMessage> {
        match &self.body {
            Body::Internal(m) => Some(m),
            _ => None,
        }
    }
    #[must_use]
    pub fn undo(&self) -> Option<&UndoMessage> {
        match &self.body {
            Body::Undo(m) => Some(m),
            _ => None,
        }
    }
    #[must_use]
    pub fn acl(&self) -> Option<&AclMessage> {
        match &self.body {
            Body::Acl(m) => Some(m),
            _ => None,
        }
    }
    #[must_use]
    pub fn telemetry(&self) -> Option<&TelemetryMessage> {
        match &self.body {
            Body::Telemetry(m) => Some(m),
            _ => None,
        }
    }
}
