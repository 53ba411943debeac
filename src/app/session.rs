use super::gesture::GestureEvent;
use crate::scene::Hotspot;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SessionError>;

fn default_background() -> [f32; 3] {
    [0.1, 0.1, 0.2]
}

fn default_speed() -> f32 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurfaceSpec {
    pub width: u32,
    pub height: u32,
    #[serde(default = "default_background")]
    pub background: [f32; 3],
}

/// Something the host does at a point in the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionAction {
    Gesture { gesture: GestureEvent },
    LoadModel { uri: String },
    SetZoom { zoom: f32 },
    SetCameraDistance { distance: f32 },
    SetAutoRotate {
        enabled: bool,
        #[serde(default = "default_speed")]
        speed: f32,
    },
    Highlight { mesh: Option<String> },
    SetHotspots { hotspots: Vec<Hotspot> },
    SelectHotspot { id: Option<String> },
    Resize { width: u32, height: u32 },
    Snapshot { path: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionStep {
    /// Milliseconds since the session started.
    pub at_ms: u64,
    pub action: SessionAction,
}

/// A scripted host: initial viewer props followed by timed actions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionScript {
    pub surface: SurfaceSpec,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub hotspots: Vec<Hotspot>,
    #[serde(default)]
    pub auto_rotate: bool,
    #[serde(default)]
    pub zoom: f32,
    /// Frames keep ticking until this time even after the last step.
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default)]
    pub steps: Vec<SessionStep>,
}

impl SessionScript {
    pub fn end_ms(&self) -> u64 {
        self.steps
            .iter()
            .map(|step| step.at_ms)
            .max()
            .unwrap_or(0)
            .max(self.duration_ms)
    }
}

pub fn save_session_to_file(script: &SessionScript, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(script)?;
    std::fs::write(path, json)?;
    Ok(())
}

/// Loads a script; steps come back ordered by time.
pub fn load_session_from_file(path: &Path) -> Result<SessionScript> {
    let json = std::fs::read_to_string(path)?;
    let mut script: SessionScript = serde_json::from_str(&json)?;
    script.steps.sort_by_key(|step| step.at_ms);
    Ok(script)
}
