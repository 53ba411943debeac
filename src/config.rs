use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read viewer config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid viewer config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Camera defaults. Only the distance is mutated at runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub fov_y_deg: f32,
    pub near: f32,
    pub far: f32,
    pub base_distance: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            fov_y_deg: 75.0,
            near: 0.1,
            far: 1000.0,
            base_distance: 2.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GestureConfig {
    /// Radians of rotation per screen unit of pan.
    pub sensitivity: f32,
    pub tap_max_millis: u64,
    pub tap_max_distance: f32,
    pub min_pinch_scale: f32,
    pub max_pinch_scale: f32,
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self {
            sensitivity: 0.01,
            tap_max_millis: 500,
            tap_max_distance: 20.0,
            min_pinch_scale: 0.5,
            max_pinch_scale: 3.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Largest bounding-box dimension after normalization, in world units.
    pub target_size: f32,
    /// Yaw added per frame when auto-rotate is on, multiplied by the host speed.
    pub auto_rotate_step: f32,
    pub load_in_background: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            target_size: 2.0,
            auto_rotate_step: 0.005,
            load_in_background: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HighlightConfig {
    pub color: [f32; 3],
    pub emissive: [f32; 3],
    pub opacity: f32,
}

impl Default for HighlightConfig {
    fn default() -> Self {
        Self {
            color: [1.0, 0.42, 0.21],
            emissive: [0.55, 0.18, 0.05],
            opacity: 0.92,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HotspotConfig {
    pub shell_radius: f32,
    pub core_radius: f32,
    pub shell_opacity: f32,
    pub default_color: [f32; 3],
    pub selected_color: [f32; 3],
    pub selected_scale: f32,
}

impl Default for HotspotConfig {
    fn default() -> Self {
        Self {
            shell_radius: 0.08,
            core_radius: 0.03,
            shell_opacity: 0.35,
            default_color: [0.2, 0.75, 1.0],
            selected_color: [1.0, 0.85, 0.2],
            selected_scale: 1.35,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    pub camera: CameraConfig,
    pub gesture: GestureConfig,
    pub model: ModelConfig,
    pub highlight: HighlightConfig,
    pub hotspot: HotspotConfig,
}

impl ViewerConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&json).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_keeps_defaults() {
        let json = r#"{ "camera": { "base_distance": 3.5 }, "gesture": { "sensitivity": 0.02 } }"#;
        let config: ViewerConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.camera.base_distance, 3.5);
        assert_eq!(config.camera.fov_y_deg, 75.0);
        assert_eq!(config.gesture.sensitivity, 0.02);
        assert_eq!(config.gesture.tap_max_millis, 500);
        assert_eq!(config.hotspot, HotspotConfig::default());
    }

    #[test]
    fn load_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = ViewerConfig::load(&dir.path().join("missing.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("viewer.json");
        std::fs::write(&path, r#"{ "model": { "load_in_background": false } }"#).unwrap();
        let config = ViewerConfig::load(&path).unwrap();
        assert!(!config.model.load_in_background);
        assert_eq!(config.model.target_size, 2.0);
    }
}
