use crate::app::ViewerStatus;

const SPINNER: [char; 4] = ['|', '/', '-', '\\'];
const SPINNER_FRAME_SECONDS: f32 = 0.1;

/// What the host draws instead of (or over) the scene.
#[derive(Debug, Clone, PartialEq)]
pub enum Placeholder {
    None,
    Loading { label: String, spinner: char },
    Error { message: String },
}

/// Tracks the viewer status and animates the loading spinner.
pub struct StatusOverlay {
    status: ViewerStatus,
    spinner_time: f32,
    loading_label: String,
}

impl StatusOverlay {
    pub fn new() -> Self {
        Self {
            status: ViewerStatus::Idle,
            spinner_time: 0.0,
            loading_label: "Loading model".to_string(),
        }
    }

    pub fn set_loading_label(&mut self, label: impl Into<String>) {
        self.loading_label = label.into();
    }

    pub fn update(&mut self, status: &ViewerStatus, dt: f32) {
        if *status != self.status {
            self.status = status.clone();
            self.spinner_time = 0.0;
        } else if self.status == ViewerStatus::Loading {
            self.spinner_time += dt.max(0.0);
        }
    }

    pub fn placeholder(&self) -> Placeholder {
        match &self.status {
            ViewerStatus::Loading => {
                let frame = (self.spinner_time / SPINNER_FRAME_SECONDS) as usize % SPINNER.len();
                Placeholder::Loading {
                    label: self.loading_label.clone(),
                    spinner: SPINNER[frame],
                }
            }
            ViewerStatus::Error(message) => Placeholder::Error {
                message: message.clone(),
            },
            ViewerStatus::Idle | ViewerStatus::Ready => Placeholder::None,
        }
    }

    /// One-line text form, for logs and terminal hosts.
    pub fn summary(&self) -> String {
        match self.placeholder() {
            Placeholder::None => String::new(),
            Placeholder::Loading { label, spinner } => format!("{spinner} {label}"),
            Placeholder::Error { message } => format!("Error: {message}"),
        }
    }
}

impl Default for StatusOverlay {
    fn default() -> Self {
        Self::new()
    }
}
