//! # Paint engine core
//!
//! Canvas state and everything needed to mutate it deterministically: pixels and blending, copy-on-write tiles,
//! layers, annotations, the timeline, access control, the snapshot queue, undo history and the local fork.
//!
//! Nothing in here spawns threads or does I/O. The [`paintengine`](../paintengine/index.html) crate drives it.

pub mod acl;
pub mod annotation;
pub mod blend;
pub mod color;
pub mod dirty;
pub mod document;
pub mod fork;
pub mod history;
pub mod id;
pub mod image;
pub mod layer;
pub mod message;
pub mod snapshot;
pub mod state;
pub mod tile;
pub mod timeline;
pub mod util;

pub use id::{AnnotationId, LayerId, UserId};
pub use message::{Apply, ApplyError, Body, Message};
pub use state::{CanvasState, ChangeFlags, Changes};
