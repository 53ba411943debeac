pub mod camera;
pub mod pick;
pub mod raster;
pub mod resources;

pub use camera::{camera_distance, Camera, Ray};
pub use pick::HitResult;
pub use raster::{FrameStats, LightRig, SoftwareRenderer};

use crate::assets::{AssetError, LoadedAsset, ModelAsset};
use crate::config::ViewerConfig;
use crate::scene::{model_rotation, HighlightController, Hotspot, HotspotRegistry, SceneGraph};
use glam::Vec2;
use resources::{Material, ResourceRegistry};
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("render surface is not ready ({width}x{height})")]
    SurfaceNotReady { width: u32, height: u32 },
    #[error("failed to write snapshot {path}: {source}")]
    Snapshot {
        path: String,
        #[source]
        source: image::ImageError,
    },
}

/// Per-frame faults. The frame loop logs these and keeps going.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("camera distance {0} is not a positive finite value")]
    NonFiniteCamera(f32),
    #[error("model rotation is not finite (yaw {yaw}, pitch {pitch})")]
    NonFiniteTransform { yaw: f32, pitch: f32 },
}

/// Everything one render surface owns: scene graph, resources, camera,
/// lights, rasterizer and the model currently attached to it.
pub struct RenderContext {
    generation: u64,
    background: [f32; 3],
    scene: SceneGraph,
    resources: ResourceRegistry,
    camera: Camera,
    lights: LightRig,
    renderer: SoftwareRenderer,
    model: Option<LoadedAsset>,
    highlight: HighlightController,
    hotspots: HotspotRegistry,
    model_yaw: f32,
    model_pitch: f32,
    target_size: f32,
    disposed: bool,
}

impl RenderContext {
    pub fn new(
        config: &ViewerConfig,
        generation: u64,
        width: u32,
        height: u32,
        background: [f32; 3],
    ) -> Result<Self, RenderError> {
        let renderer = SoftwareRenderer::new(width, height)?;
        let mut resources = ResourceRegistry::new();
        let highlight = &config.highlight;
        let highlight_material = resources.create_material(Material {
            name: "highlight".to_string(),
            base_color: [highlight.color[0], highlight.color[1], highlight.color[2], highlight.opacity],
            emissive: highlight.emissive,
            transparent: highlight.opacity < 1.0,
        });
        log::info!("Render context {} created ({}x{})", generation, width, height);
        Ok(Self {
            generation,
            background,
            scene: SceneGraph::new(),
            resources,
            camera: Camera::new(&config.camera, width as f32 / height as f32),
            lights: LightRig::default(),
            renderer,
            model: None,
            highlight: HighlightController::new(highlight_material),
            hotspots: HotspotRegistry::new(config.hotspot.clone()),
            model_yaw: 0.0,
            model_pitch: 0.0,
            target_size: config.model.target_size,
            disposed: false,
        })
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn width(&self) -> u32 {
        self.renderer.width()
    }

    pub fn height(&self) -> u32 {
        self.renderer.height()
    }

    pub fn scene(&self) -> &SceneGraph {
        &self.scene
    }

    pub fn resources(&self) -> &ResourceRegistry {
        &self.resources
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn renderer(&self) -> &SoftwareRenderer {
        &self.renderer
    }

    pub fn model(&self) -> Option<&LoadedAsset> {
        self.model.as_ref()
    }

    pub fn highlight(&self) -> &HighlightController {
        &self.highlight
    }

    pub fn hotspots(&self) -> &HotspotRegistry {
        &self.hotspots
    }

    pub fn model_yaw(&self) -> f32 {
        self.model_yaw
    }

    pub fn model_pitch(&self) -> f32 {
        self.model_pitch
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), RenderError> {
        self.renderer.resize(width, height)?;
        self.camera.set_aspect(width as f32 / height as f32);
        Ok(())
    }

    /// Replaces the attached model. The previous one is released before the
    /// new one is instantiated, so two model subtrees never coexist.
    pub fn attach_model(&mut self, asset: &ModelAsset) -> Result<&LoadedAsset, AssetError> {
        self.dispose_model();
        let root = self.scene.root();
        let loaded = LoadedAsset::instantiate(&mut self.scene, &mut self.resources, root, asset, self.target_size)?;
        self.model_yaw = 0.0;
        Ok(self.model.insert(loaded))
    }

    /// Single release path for the attached model, used for replacement and
    /// teardown alike. Returns false when nothing was attached.
    pub fn dispose_model(&mut self) -> bool {
        let Some(model) = self.model.take() else {
            return false;
        };
        self.highlight.release(&mut self.scene);
        self.hotspots.forget();
        let name = model.name.clone();
        let (geometries, materials) = model.release(&mut self.scene, &mut self.resources);
        log::info!(
            "Released model '{}' ({} geometries, {} materials)",
            name,
            geometries,
            materials
        );
        true
    }

    /// Releases the model and the shared highlight material. Idempotent.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.dispose_model();
        self.resources.dispose_material(self.highlight.material());
        self.disposed = true;
        log::info!("Render context {} disposed", self.generation);
    }

    /// Returns the number of meshes lit; zero without a model.
    pub fn set_highlight(&mut self, target: Option<&str>) -> usize {
        match &self.model {
            Some(model) => self.highlight.set_highlight(&mut self.scene, &model.index, target),
            None => 0,
        }
    }

    pub fn set_hotspots(&mut self, hotspots: &[Hotspot]) {
        if let Some(model) = &self.model {
            self.hotspots
                .rebuild(&mut self.scene, &mut self.resources, model.root, hotspots);
        }
    }

    pub fn set_selected_hotspot(&mut self, id: Option<&str>) {
        self.hotspots.set_selected(&mut self.scene, &mut self.resources, id);
    }

    pub fn advance_animation(&mut self, dt: f32) {
        if let Some(mixer) = self.model.as_mut().and_then(|model| model.mixer.as_mut()) {
            mixer.advance(dt, &mut self.scene);
        }
    }

    pub fn add_yaw(&mut self, delta: f32) {
        self.model_yaw += delta;
    }

    pub fn set_pitch(&mut self, pitch: f32) {
        self.model_pitch = pitch;
    }

    pub fn set_camera_distance(&mut self, distance: f32) {
        self.camera.set_distance(distance);
    }

    /// Pushes yaw/pitch onto the model root and refreshes world matrices.
    pub fn sync_transforms(&mut self) -> Result<(), FrameError> {
        let distance = self.camera.distance();
        if !distance.is_finite() || distance <= 0.0 {
            return Err(FrameError::NonFiniteCamera(distance));
        }
        if let Some(model) = &self.model {
            let rotation = model_rotation(self.model_yaw, self.model_pitch);
            if !rotation.is_finite() {
                return Err(FrameError::NonFiniteTransform {
                    yaw: self.model_yaw,
                    pitch: self.model_pitch,
                });
            }
            if let Some(root) = self.scene.node_mut(model.root) {
                root.transform.rotation = rotation;
            }
        }
        self.scene.update_world_transforms();
        Ok(())
    }

    pub fn render(&mut self) -> Result<FrameStats, FrameError> {
        self.sync_transforms()?;
        Ok(self.renderer.render(
            &self.scene,
            &self.resources,
            &self.camera,
            &self.lights,
            self.background,
        ))
    }

    /// Hit test at a screen point (top-left origin).
    pub fn raycast(&mut self, screen: Vec2) -> Option<HitResult> {
        if let Err(err) = self.sync_transforms() {
            log::warn!("Skipping hit test: {}", err);
            return None;
        }
        pick::raycast(
            &self.scene,
            &self.resources,
            &self.camera,
            self.renderer.width(),
            self.renderer.height(),
            screen,
        )
    }

    pub fn snapshot_png(&self, path: &Path) -> Result<(), RenderError> {
        self.renderer.snapshot_png(path)
    }
}

impl Drop for RenderContext {
    fn drop(&mut self) {
        self.dispose();
    }
}
