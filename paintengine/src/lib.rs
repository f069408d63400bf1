//! # Paint engine
//!
//! Drives a [`paintengine_core::CanvasState`] from a stream of messages: a tick loop applying them in order,
//! observers notified of what changed, a lazily rendered pixel cache, tool previews and session recording.
#![warn(clippy::pedantic)]

pub mod config;
pub mod engine;
pub mod events;
pub mod preview;
pub mod recorder;
pub mod render;
pub mod ticker;

pub use config::EngineConfig;
pub use engine::{EngineError, FrameOptions, PaintEngine, TickPhase};
pub use events::{EngineEvent, EventSink};
