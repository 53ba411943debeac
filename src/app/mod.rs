pub mod gesture;
pub mod input;
pub mod session;
pub mod timing;

use crate::assets::{AssetLoadQueue, LoadOutcome};
use crate::config::ViewerConfig;
use crate::render::{camera_distance, FrameStats, HitResult, RenderContext, RenderError};
use crate::scene::Hotspot;
use crate::ui::{Placeholder, StatusOverlay};
use gesture::{GestureEvent, GestureOutcome, GestureTransformEngine};
use glam::Vec2;
use input::TouchInput;
use serde::Serialize;
use std::path::Path;
use std::time::{Duration, Instant};
use timing::FrameTiming;
use winit::event::WindowEvent;

/// What the asset resolver has produced so far.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelSource {
    /// Nothing resolved yet.
    Pending,
    Failed(String),
    Uri(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "message", rename_all = "snake_case")]
pub enum ViewerStatus {
    Idle,
    Loading,
    Ready,
    Error(String),
}

/// Outbound notifications for the host.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ViewerEvent {
    ClipsLoaded {
        clips: Vec<String>,
    },
    MeshTapped {
        mesh_name: String,
        parent_name: String,
        world_position: [f32; 3],
    },
    HotspotTapped {
        hotspot_id: String,
    },
    StatusChanged {
        status: ViewerStatus,
    },
}

/// Proof that a frame loop belongs to the live context. Tickets from a
/// disposed context are refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameTicket {
    generation: u64,
}

impl FrameTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FrameOutcome {
    Rendered(FrameStats),
    /// Stale ticket or no context.
    Skipped,
    /// The frame failed; the loop continues with the next tick.
    Faulted,
}

pub struct Viewer {
    config: ViewerConfig,
    source: ModelSource,
    status: ViewerStatus,
    overlay: StatusOverlay,
    context: Option<RenderContext>,
    context_generation: u64,
    loads: AssetLoadQueue,
    gestures: GestureTransformEngine,
    touch_input: TouchInput,
    timing: FrameTiming,
    auto_rotate: bool,
    auto_rotate_speed: f32,
    base_distance: f32,
    zoom: f32,
    highlighted_mesh: Option<String>,
    hotspots: Vec<Hotspot>,
    selected_hotspot: Option<String>,
    events: Vec<ViewerEvent>,
    fault_streak: u32,
}

impl Viewer {
    pub fn new(config: ViewerConfig) -> Self {
        Self {
            source: ModelSource::Pending,
            status: ViewerStatus::Idle,
            overlay: StatusOverlay::new(),
            context: None,
            context_generation: 0,
            loads: AssetLoadQueue::new(config.model.load_in_background),
            gestures: GestureTransformEngine::new(config.gesture.clone()),
            touch_input: TouchInput::new(),
            timing: FrameTiming::new(),
            auto_rotate: false,
            auto_rotate_speed: 1.0,
            base_distance: config.camera.base_distance,
            zoom: 0.0,
            highlighted_mesh: None,
            hotspots: Vec::new(),
            selected_hotspot: None,
            events: Vec::new(),
            fault_streak: 0,
            config,
        }
    }

    pub fn config(&self) -> &ViewerConfig {
        &self.config
    }

    pub fn status(&self) -> &ViewerStatus {
        &self.status
    }

    pub fn context(&self) -> Option<&RenderContext> {
        self.context.as_ref()
    }

    pub fn gestures(&self) -> &GestureTransformEngine {
        &self.gestures
    }

    pub fn zoom(&self) -> f32 {
        self.zoom
    }

    pub fn camera_distance(&self) -> f32 {
        camera_distance(self.base_distance, self.zoom, self.gestures.pinch_scale())
    }

    /// Drains pending host notifications.
    pub fn take_events(&mut self) -> Vec<ViewerEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn placeholder(&self) -> Placeholder {
        self.overlay.placeholder()
    }

    /// Creates the render surface, disposing any previous one first. The
    /// returned ticket must accompany every `tick`.
    pub fn create_context(
        &mut self,
        width: u32,
        height: u32,
        background: [f32; 3],
    ) -> Result<FrameTicket, RenderError> {
        if let Some(mut previous) = self.context.take() {
            previous.dispose();
        }
        self.context_generation += 1;
        self.gestures.reset();
        self.timing.reset();
        self.fault_streak = 0;

        let mut context =
            match RenderContext::new(&self.config, self.context_generation, width, height, background) {
                Ok(context) => context,
                Err(err) => {
                    log::error!("Failed to create render context: {}", err);
                    self.set_status(ViewerStatus::Error(err.to_string()));
                    return Err(err);
                }
            };
        context.set_camera_distance(self.camera_distance());
        self.context = Some(context);

        match self.source.clone() {
            ModelSource::Uri(uri) => self.request_load(&uri),
            ModelSource::Pending => self.set_status(ViewerStatus::Loading),
            ModelSource::Failed(message) => self.set_status(ViewerStatus::Error(message)),
        }
        Ok(FrameTicket {
            generation: self.context_generation,
        })
    }

    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), RenderError> {
        match &mut self.context {
            Some(context) => context.resize(width, height),
            None => Err(RenderError::SurfaceNotReady { width, height }),
        }
    }

    /// Releases the render context and abandons any in-flight load.
    pub fn dispose(&mut self) {
        self.loads.cancel();
        if let Some(mut context) = self.context.take() {
            context.dispose();
        }
    }

    pub fn set_model_source(&mut self, source: ModelSource) {
        if source == self.source {
            return;
        }
        self.source = source.clone();
        match source {
            ModelSource::Uri(uri) => {
                if self.context.is_some() {
                    self.request_load(&uri);
                } else {
                    self.set_status(ViewerStatus::Loading);
                }
            }
            ModelSource::Pending => {
                self.loads.cancel();
                self.overlay.set_loading_label("Loading model");
                self.set_status(ViewerStatus::Loading);
            }
            ModelSource::Failed(message) => {
                self.loads.cancel();
                self.set_status(ViewerStatus::Error(message));
            }
        }
    }

    pub fn set_auto_rotate(&mut self, enabled: bool, speed: f32) {
        self.auto_rotate = enabled;
        self.auto_rotate_speed = speed;
    }

    pub fn set_camera_distance(&mut self, base_distance: f32) {
        self.base_distance = base_distance;
    }

    /// Zoom in [0, 1]; out-of-range values are clamped.
    pub fn set_zoom(&mut self, zoom: f32) {
        if zoom.is_nan() {
            log::warn!("Ignoring NaN zoom level");
            return;
        }
        self.zoom = zoom.clamp(0.0, 1.0);
    }

    pub fn set_highlighted_mesh(&mut self, mesh: Option<&str>) {
        self.highlighted_mesh = mesh.map(str::to_string);
        if let Some(context) = &mut self.context {
            context.set_highlight(mesh);
        }
    }

    pub fn set_hotspots(&mut self, hotspots: Vec<Hotspot>) {
        self.hotspots = hotspots;
        if let Some(context) = &mut self.context {
            context.set_hotspots(&self.hotspots);
            context.set_selected_hotspot(self.selected_hotspot.as_deref());
        }
    }

    pub fn set_selected_hotspot(&mut self, id: Option<&str>) {
        self.selected_hotspot = id.map(str::to_string);
        if let Some(context) = &mut self.context {
            context.set_selected_hotspot(id);
        }
    }

    /// Feeds one recognizer event. A tap runs the hit test and queues the
    /// matching host event.
    pub fn handle_gesture(&mut self, event: GestureEvent, at: Instant) -> GestureOutcome {
        let outcome = self.gestures.handle(event, at);
        if let GestureOutcome::Tap(point) = outcome {
            if let Some(hit) = self.raycast(point) {
                self.events.push(match hit {
                    HitResult::Hotspot { id } => ViewerEvent::HotspotTapped { hotspot_id: id },
                    HitResult::Mesh {
                        mesh_name,
                        parent_name,
                        world_position,
                        ..
                    } => ViewerEvent::MeshTapped {
                        mesh_name,
                        parent_name,
                        world_position: world_position.to_array(),
                    },
                });
            }
        }
        outcome
    }

    pub fn handle_window_event(&mut self, event: &WindowEvent, at: Instant) {
        for gesture in self.touch_input.handle_window_event(event) {
            self.handle_gesture(gesture, at);
        }
    }

    pub fn raycast(&mut self, point: Vec2) -> Option<HitResult> {
        self.context.as_mut()?.raycast(point)
    }

    /// Attaches any finished load. Returns true if a load completed.
    pub fn poll_loads(&mut self) -> bool {
        let mut completed = false;
        while let Some(outcome) = self.loads.poll() {
            self.apply_load(outcome);
            completed = true;
        }
        completed
    }

    /// Blocks until the current load finishes or `timeout` passes.
    pub fn wait_for_load(&mut self, timeout: Duration) -> bool {
        match self.loads.wait(timeout) {
            Some(outcome) => {
                self.apply_load(outcome);
                true
            }
            None => false,
        }
    }

    /// One frame: animation, auto-rotate, gesture rotation, camera distance,
    /// render. Faults are logged once per streak and never propagate.
    pub fn tick(&mut self, ticket: FrameTicket, now: Instant) -> FrameOutcome {
        if ticket.generation != self.context_generation || self.context.is_none() {
            log::debug!("Ignoring tick for stale context {}", ticket.generation);
            return FrameOutcome::Skipped;
        }
        self.poll_loads();
        let dt = self.timing.update(now);
        self.overlay.update(&self.status, dt);

        let Some(context) = self.context.as_mut() else {
            return FrameOutcome::Skipped;
        };
        context.advance_animation(dt);
        if self.auto_rotate {
            context.add_yaw(self.config.model.auto_rotate_step * self.auto_rotate_speed);
        }
        context.add_yaw(self.gestures.take_yaw_delta());
        context.set_pitch(self.gestures.pitch());
        context.set_camera_distance(camera_distance(
            self.base_distance,
            self.zoom,
            self.gestures.pinch_scale(),
        ));

        match context.render() {
            Ok(stats) => {
                if self.fault_streak > 0 {
                    log::info!("Frame loop recovered after {} failed frames", self.fault_streak);
                }
                self.fault_streak = 0;
                FrameOutcome::Rendered(stats)
            }
            Err(err) => {
                if self.fault_streak == 0 {
                    log::error!("Frame failed: {}", err);
                }
                self.fault_streak += 1;
                FrameOutcome::Faulted
            }
        }
    }

    pub fn snapshot_png(&self, path: &Path) -> Result<(), RenderError> {
        match &self.context {
            Some(context) => context.snapshot_png(path),
            None => Err(RenderError::SurfaceNotReady { width: 0, height: 0 }),
        }
    }

    fn request_load(&mut self, uri: &str) {
        let file_name = Path::new(uri).file_name().and_then(|name| name.to_str()).unwrap_or(uri);
        self.overlay.set_loading_label(format!("Loading {file_name}"));
        self.loads.request(uri);
        self.set_status(ViewerStatus::Loading);
    }

    fn apply_load(&mut self, outcome: LoadOutcome) {
        let asset = match outcome.result {
            Ok(asset) => asset,
            Err(err) => {
                log::warn!("Failed to load {}: {}", outcome.uri, err);
                self.set_status(ViewerStatus::Error(err.to_string()));
                return;
            }
        };
        let Some(context) = self.context.as_mut() else {
            log::warn!("Load of {} finished without a render context; dropped", outcome.uri);
            return;
        };
        let clips = match context.attach_model(&asset) {
            Ok(loaded) => loaded.clip_names.clone(),
            Err(err) => {
                log::warn!("Failed to attach {}: {}", outcome.uri, err);
                self.set_status(ViewerStatus::Error(err.to_string()));
                return;
            }
        };
        context.set_hotspots(&self.hotspots);
        context.set_selected_hotspot(self.selected_hotspot.as_deref());
        context.set_highlight(self.highlighted_mesh.as_deref());
        log::info!("Model {} ready ({} clips)", outcome.uri, clips.len());

        if !clips.is_empty() {
            self.events.push(ViewerEvent::ClipsLoaded { clips });
        }
        self.set_status(ViewerStatus::Ready);
    }

    fn set_status(&mut self, status: ViewerStatus) {
        if status == self.status {
            return;
        }
        self.status = status.clone();
        self.overlay.update(&self.status, 0.0);
        self.events.push(ViewerEvent::StatusChanged { status });
    }
}

impl Drop for Viewer {
    fn drop(&mut self) {
        self.dispose();
    }
}
