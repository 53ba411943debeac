//! Pan and pinch handling for the model viewer.
//!
//! A pan rotates the model (horizontal movement to yaw, vertical to pitch)
//! and, if it ends quickly and close to where it started, counts as a tap.
//! A pinch scales a zoom multiplier that persists between pinches.

use crate::config::GestureConfig;
use glam::Vec2;
use serde::{Deserialize, Serialize};
use std::f32::consts::FRAC_PI_2;
use std::time::{Duration, Instant};

/// Recognizer-level input, in screen units. Pan translations are cumulative
/// since the pan began.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GestureEvent {
    PanBegin { x: f32, y: f32 },
    PanUpdate { translation_x: f32, translation_y: f32 },
    PanEnd { x: f32, y: f32 },
    PanCancel,
    PinchUpdate { scale: f32 },
    PinchEnd,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GestureOutcome {
    None,
    /// Short, short-distance touch; hit-test at this point.
    Tap(Vec2),
    Drag,
}

#[derive(Debug, Clone, Copy)]
struct TapCandidate {
    origin: Vec2,
    started: Instant,
}

pub struct GestureTransformEngine {
    config: GestureConfig,
    yaw_delta: f32,
    pitch: f32,
    pinch_scale: f32,
    previous_pinch: f32,
    candidate: Option<TapCandidate>,
    previous_translation: Vec2,
    translation: Vec2,
}

impl GestureTransformEngine {
    pub fn new(config: GestureConfig) -> Self {
        Self {
            config,
            yaw_delta: 0.0,
            pitch: 0.0,
            pinch_scale: 1.0,
            previous_pinch: 1.0,
            candidate: None,
            previous_translation: Vec2::ZERO,
            translation: Vec2::ZERO,
        }
    }

    pub fn handle(&mut self, event: GestureEvent, at: Instant) -> GestureOutcome {
        match event {
            GestureEvent::PanBegin { x, y } => {
                self.pan_begin(Vec2::new(x, y), at);
                GestureOutcome::None
            }
            GestureEvent::PanUpdate {
                translation_x,
                translation_y,
            } => {
                self.pan_update(Vec2::new(translation_x, translation_y));
                GestureOutcome::None
            }
            GestureEvent::PanEnd { x, y } => self.pan_end(Vec2::new(x, y), at),
            GestureEvent::PanCancel => {
                self.pan_cancel();
                GestureOutcome::None
            }
            GestureEvent::PinchUpdate { scale } => {
                self.pinch_update(scale);
                GestureOutcome::None
            }
            GestureEvent::PinchEnd => {
                self.pinch_end();
                GestureOutcome::None
            }
        }
    }

    pub fn pan_begin(&mut self, point: Vec2, at: Instant) {
        self.candidate = Some(TapCandidate {
            origin: point,
            started: at,
        });
        self.previous_translation = Vec2::ZERO;
        self.translation = Vec2::ZERO;
    }

    pub fn pan_update(&mut self, translation: Vec2) {
        if self.candidate.is_none() || !translation.is_finite() {
            return;
        }
        let delta = translation - self.previous_translation;
        self.previous_translation = translation;
        self.translation = translation;
        self.yaw_delta += delta.x * self.config.sensitivity;
        self.pitch = (self.pitch + delta.y * self.config.sensitivity).clamp(-FRAC_PI_2, FRAC_PI_2);
    }

    pub fn pan_end(&mut self, point: Vec2, at: Instant) -> GestureOutcome {
        let Some(candidate) = self.candidate.take() else {
            return GestureOutcome::None;
        };
        let elapsed = at.saturating_duration_since(candidate.started);
        // Covers recognizers that end a pan without reporting its movement.
        let travel = self.translation.length().max(point.distance(candidate.origin));
        let is_tap = elapsed < Duration::from_millis(self.config.tap_max_millis)
            && travel < self.config.tap_max_distance;
        self.reset_touch();
        if is_tap {
            GestureOutcome::Tap(point)
        } else {
            GestureOutcome::Drag
        }
    }

    pub fn pan_cancel(&mut self) {
        self.candidate = None;
        self.reset_touch();
    }

    pub fn pinch_update(&mut self, scale: f32) {
        if !scale.is_finite() || scale <= 0.0 {
            return;
        }
        let next = self.pinch_scale * (scale / self.previous_pinch);
        self.pinch_scale = next.clamp(self.config.min_pinch_scale, self.config.max_pinch_scale);
        self.previous_pinch = scale;
    }

    /// Ends or cancels a pinch. The accumulated scale is kept.
    pub fn pinch_end(&mut self) {
        self.previous_pinch = 1.0;
    }

    /// Pending yaw since the last call; the frame tick consumes it.
    pub fn take_yaw_delta(&mut self) -> f32 {
        std::mem::take(&mut self.yaw_delta)
    }

    pub fn yaw_delta(&self) -> f32 {
        self.yaw_delta
    }

    pub fn pitch(&self) -> f32 {
        self.pitch
    }

    pub fn pinch_scale(&self) -> f32 {
        self.pinch_scale
    }

    pub fn is_touch_active(&self) -> bool {
        self.candidate.is_some()
    }

    /// Screen point where the current touch began.
    pub fn touch_origin(&self) -> Option<Vec2> {
        self.candidate.map(|candidate| candidate.origin)
    }

    /// Back to the initial state, pinch scale included.
    pub fn reset(&mut self) {
        *self = Self::new(self.config.clone());
    }

    fn reset_touch(&mut self) {
        self.previous_translation = Vec2::ZERO;
        self.translation = Vec2::ZERO;
    }
}
