//! Interactive glTF model viewer core.
//!
//! `app::Viewer` is the entry point for a host: it owns the render context,
//! runs the per-frame tick, turns gestures into model rotation and zoom, and
//! reports taps on meshes and hotspots as events.

pub mod app;
pub mod assets;
pub mod config;
pub mod render;
pub mod scene;
pub mod ui;

pub use app::{FrameOutcome, FrameTicket, ModelSource, Viewer, ViewerEvent, ViewerStatus};
pub use config::ViewerConfig;
