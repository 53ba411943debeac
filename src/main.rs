//! Headless viewer host.
//!
//! Replays a JSON session script against the viewer on a fixed 60 Hz clock,
//! printing every outbound viewer event as a JSON line on stdout.
//!
//! Usage: previz-viewer <session.json> [--config <viewer.json>]

use previz_viewer::app::session::{load_session_from_file, SessionAction, SessionError, SessionScript};
use previz_viewer::config::{ConfigError, ViewerConfig};
use previz_viewer::render::RenderError;
use previz_viewer::{FrameOutcome, ModelSource, Viewer};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

const FRAME: Duration = Duration::from_micros(16_667);
const LOAD_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("usage: previz-viewer <session.json> [--config <viewer.json>]")]
    Usage,
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to load session: {0}")]
    Session(#[from] SessionError),
    #[error(transparent)]
    Render(#[from] RenderError),
}

struct Args {
    session: PathBuf,
    config: Option<PathBuf>,
}

fn parse_args() -> Result<Args, CliError> {
    let mut session = None;
    let mut config = None;
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => config = Some(PathBuf::from(args.next().ok_or(CliError::Usage)?)),
            _ if session.is_none() => session = Some(PathBuf::from(arg)),
            _ => return Err(CliError::Usage),
        }
    }
    Ok(Args {
        session: session.ok_or(CliError::Usage)?,
        config,
    })
}

#[derive(Default)]
struct ReplayStats {
    rendered: u64,
    faulted: u64,
    skipped: u64,
}

fn emit_events(viewer: &mut Viewer) {
    for event in viewer.take_events() {
        match serde_json::to_string(&event) {
            Ok(line) => println!("{line}"),
            Err(err) => log::warn!("Failed to encode event {:?}: {}", event, err),
        }
    }
}

fn apply_action(viewer: &mut Viewer, action: &SessionAction, at: Instant) {
    match action {
        SessionAction::Gesture { gesture } => {
            viewer.handle_gesture(*gesture, at);
        }
        SessionAction::LoadModel { uri } => {
            viewer.set_model_source(ModelSource::Uri(uri.clone()));
            if !viewer.wait_for_load(LOAD_TIMEOUT) {
                log::warn!("Timed out waiting for {}", uri);
            }
        }
        SessionAction::SetZoom { zoom } => viewer.set_zoom(*zoom),
        SessionAction::SetCameraDistance { distance } => viewer.set_camera_distance(*distance),
        SessionAction::SetAutoRotate { enabled, speed } => viewer.set_auto_rotate(*enabled, *speed),
        SessionAction::Highlight { mesh } => viewer.set_highlighted_mesh(mesh.as_deref()),
        SessionAction::SetHotspots { hotspots } => viewer.set_hotspots(hotspots.clone()),
        SessionAction::SelectHotspot { id } => viewer.set_selected_hotspot(id.as_deref()),
        SessionAction::Resize { width, height } => {
            if let Err(err) = viewer.resize(*width, *height) {
                log::warn!("Resize to {}x{} failed: {}", width, height, err);
            }
        }
        SessionAction::Snapshot { path } => match viewer.snapshot_png(Path::new(path)) {
            Ok(()) => log::info!("Snapshot written to {}", path),
            Err(err) => log::warn!("{}", err),
        },
    }
}

fn replay(viewer: &mut Viewer, script: &SessionScript) -> Result<ReplayStats, CliError> {
    viewer.set_hotspots(script.hotspots.clone());
    viewer.set_zoom(script.zoom);
    viewer.set_auto_rotate(script.auto_rotate, 1.0);
    if let Some(model) = &script.model {
        viewer.set_model_source(ModelSource::Uri(model.clone()));
    }
    let surface = &script.surface;
    let ticket = viewer.create_context(surface.width, surface.height, surface.background)?;
    if script.model.is_some() && !viewer.wait_for_load(LOAD_TIMEOUT) {
        log::warn!("Initial model did not finish loading");
    }
    emit_events(viewer);

    let base = Instant::now();
    let end = Duration::from_millis(script.end_ms());
    let mut stats = ReplayStats::default();
    let mut steps = script.steps.iter().peekable();
    let mut elapsed = Duration::ZERO;
    loop {
        let now = base + elapsed;
        while let Some(step) = steps.next_if(|step| Duration::from_millis(step.at_ms) <= elapsed) {
            apply_action(viewer, &step.action, base + Duration::from_millis(step.at_ms));
        }
        match viewer.tick(ticket, now) {
            FrameOutcome::Rendered(_) => stats.rendered += 1,
            FrameOutcome::Faulted => stats.faulted += 1,
            FrameOutcome::Skipped => stats.skipped += 1,
        }
        emit_events(viewer);
        if elapsed >= end && steps.peek().is_none() {
            break;
        }
        elapsed += FRAME;
    }
    Ok(stats)
}

fn run() -> Result<(), CliError> {
    let args = parse_args()?;
    let config = match &args.config {
        Some(path) => ViewerConfig::load(path)?,
        None => ViewerConfig::default(),
    };
    let script = load_session_from_file(&args.session)?;
    log::info!(
        "Replaying {} ({} steps, {} ms)",
        args.session.display(),
        script.steps.len(),
        script.end_ms()
    );

    let mut viewer = Viewer::new(config);
    let stats = replay(&mut viewer, &script)?;
    viewer.dispose();
    log::info!(
        "Session finished: {} frames rendered, {} faulted, {} skipped",
        stats.rendered,
        stats.faulted,
        stats.skipped
    );
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    if let Err(err) = run() {
        log::error!("{}", err);
        std::process::exit(1);
    }
}
