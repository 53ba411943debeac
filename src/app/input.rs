use super::gesture::GestureEvent;
use glam::Vec2;
use winit::event::{ElementState, MouseButton, Touch, TouchPhase, WindowEvent};

/// Turns raw winit window events into recognizer-level gesture events.
///
/// One finger (or a held left mouse button) pans; a second finger turns the
/// touch into a pinch. Trackpad pinch gestures are accumulated into the same
/// scale events.
#[derive(Debug, Default)]
pub struct TouchInput {
    touches: Vec<(u64, Vec2)>,
    pan_touch: Option<u64>,
    pan_origin: Vec2,
    pinch_start_distance: Option<f32>,
    trackpad_scale: f32,
    cursor: Vec2,
    mouse_down: bool,
}

impl TouchInput {
    pub fn new() -> Self {
        Self {
            trackpad_scale: 1.0,
            ..Self::default()
        }
    }

    pub fn handle_window_event(&mut self, event: &WindowEvent) -> Vec<GestureEvent> {
        match event {
            WindowEvent::Touch(touch) => self.handle_touch(touch),
            WindowEvent::PinchGesture { delta, phase, .. } => self.handle_trackpad_pinch(*delta as f32, *phase),
            WindowEvent::CursorMoved { position, .. } => {
                self.cursor = Vec2::new(position.x as f32, position.y as f32);
                if self.mouse_down {
                    let translation = self.cursor - self.pan_origin;
                    vec![GestureEvent::PanUpdate {
                        translation_x: translation.x,
                        translation_y: translation.y,
                    }]
                } else {
                    Vec::new()
                }
            }
            WindowEvent::MouseInput {
                state,
                button: MouseButton::Left,
                ..
            } => match (state, self.mouse_down) {
                (ElementState::Pressed, false) if self.pan_touch.is_none() => {
                    self.mouse_down = true;
                    self.pan_origin = self.cursor;
                    vec![GestureEvent::PanBegin {
                        x: self.cursor.x,
                        y: self.cursor.y,
                    }]
                }
                (ElementState::Released, true) => {
                    self.mouse_down = false;
                    vec![GestureEvent::PanEnd {
                        x: self.cursor.x,
                        y: self.cursor.y,
                    }]
                }
                _ => Vec::new(),
            },
            _ => Vec::new(),
        }
    }

    fn handle_touch(&mut self, touch: &Touch) -> Vec<GestureEvent> {
        let point = Vec2::new(touch.location.x as f32, touch.location.y as f32);
        let mut events = Vec::new();
        match touch.phase {
            TouchPhase::Started => {
                self.touches.retain(|(id, _)| *id != touch.id);
                self.touches.push((touch.id, point));
                match self.touches.len() {
                    1 if !self.mouse_down => {
                        self.pan_touch = Some(touch.id);
                        self.pan_origin = point;
                        events.push(GestureEvent::PanBegin { x: point.x, y: point.y });
                    }
                    2 => {
                        if self.pan_touch.take().is_some() {
                            events.push(GestureEvent::PanCancel);
                        }
                        self.pinch_start_distance = Some(self.finger_distance()).filter(|d| *d > f32::EPSILON);
                    }
                    _ => {}
                }
            }
            TouchPhase::Moved => {
                if let Some(entry) = self.touches.iter_mut().find(|(id, _)| *id == touch.id) {
                    entry.1 = point;
                }
                if let Some(start) = self.pinch_start_distance {
                    events.push(GestureEvent::PinchUpdate {
                        scale: self.finger_distance() / start,
                    });
                } else if self.pan_touch == Some(touch.id) {
                    let translation = point - self.pan_origin;
                    events.push(GestureEvent::PanUpdate {
                        translation_x: translation.x,
                        translation_y: translation.y,
                    });
                }
            }
            TouchPhase::Ended | TouchPhase::Cancelled => {
                self.touches.retain(|(id, _)| *id != touch.id);
                if self.pinch_start_distance.is_some() && self.touches.len() < 2 {
                    self.pinch_start_distance = None;
                    events.push(GestureEvent::PinchEnd);
                }
                if self.pan_touch == Some(touch.id) {
                    self.pan_touch = None;
                    events.push(if touch.phase == TouchPhase::Ended {
                        GestureEvent::PanEnd { x: point.x, y: point.y }
                    } else {
                        GestureEvent::PanCancel
                    });
                }
            }
        }
        events
    }

    fn handle_trackpad_pinch(&mut self, delta: f32, phase: TouchPhase) -> Vec<GestureEvent> {
        match phase {
            TouchPhase::Started => {
                self.trackpad_scale = 1.0;
                Vec::new()
            }
            TouchPhase::Moved => {
                self.trackpad_scale = (self.trackpad_scale * (1.0 + delta)).max(f32::EPSILON);
                vec![GestureEvent::PinchUpdate {
                    scale: self.trackpad_scale,
                }]
            }
            TouchPhase::Ended | TouchPhase::Cancelled => {
                self.trackpad_scale = 1.0;
                vec![GestureEvent::PinchEnd]
            }
        }
    }

    fn finger_distance(&self) -> f32 {
        match self.touches.as_slice() {
            [(_, a), (_, b), ..] => a.distance(*b),
            _ => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use winit::dpi::PhysicalPosition;
    use winit::event::DeviceId;

    fn touch(id: u64, phase: TouchPhase, x: f64, y: f64) -> WindowEvent {
        WindowEvent::Touch(Touch {
            device_id: unsafe { DeviceId::dummy() },
            phase,
            location: PhysicalPosition::new(x, y),
            force: None,
            id,
        })
    }

    #[test]
    fn single_finger_pans_with_cumulative_translation() {
        let mut input = TouchInput::new();
        assert_eq!(
            input.handle_window_event(&touch(1, TouchPhase::Started, 100.0, 100.0)),
            vec![GestureEvent::PanBegin { x: 100.0, y: 100.0 }]
        );
        input.handle_window_event(&touch(1, TouchPhase::Moved, 110.0, 100.0));
        assert_eq!(
            input.handle_window_event(&touch(1, TouchPhase::Moved, 130.0, 90.0)),
            vec![GestureEvent::PanUpdate {
                translation_x: 30.0,
                translation_y: -10.0
            }]
        );
        assert_eq!(
            input.handle_window_event(&touch(1, TouchPhase::Ended, 130.0, 90.0)),
            vec![GestureEvent::PanEnd { x: 130.0, y: 90.0 }]
        );
    }

    #[test]
    fn second_finger_turns_pan_into_pinch() {
        let mut input = TouchInput::new();
        input.handle_window_event(&touch(1, TouchPhase::Started, 100.0, 100.0));
        assert_eq!(
            input.handle_window_event(&touch(2, TouchPhase::Started, 200.0, 100.0)),
            vec![GestureEvent::PanCancel]
        );
        assert_eq!(
            input.handle_window_event(&touch(2, TouchPhase::Moved, 300.0, 100.0)),
            vec![GestureEvent::PinchUpdate { scale: 2.0 }]
        );
        assert_eq!(
            input.handle_window_event(&touch(2, TouchPhase::Ended, 300.0, 100.0)),
            vec![GestureEvent::PinchEnd]
        );
        assert!(input.handle_window_event(&touch(1, TouchPhase::Ended, 100.0, 100.0)).is_empty());
    }

    #[test]
    fn mouse_drag_pans() {
        let mut input = TouchInput::new();
        let device_id = unsafe { DeviceId::dummy() };
        input.handle_window_event(&WindowEvent::CursorMoved {
            device_id,
            position: PhysicalPosition::new(5.0, 5.0),
        });
        let pressed = WindowEvent::MouseInput {
            device_id,
            state: ElementState::Pressed,
            button: MouseButton::Left,
        };
        assert_eq!(
            input.handle_window_event(&pressed),
            vec![GestureEvent::PanBegin { x: 5.0, y: 5.0 }]
        );
        let moved = input.handle_window_event(&WindowEvent::CursorMoved {
            device_id,
            position: PhysicalPosition::new(8.0, 1.0),
        });
        assert_eq!(
            moved,
            vec![GestureEvent::PanUpdate {
                translation_x: 3.0,
                translation_y: -4.0
            }]
        );
    }

    #[test]
    fn trackpad_pinch_accumulates() {
        let mut input = TouchInput::new();
        let device_id = unsafe { DeviceId::dummy() };
        let pinch = |delta, phase| WindowEvent::PinchGesture { device_id, delta, phase };
        input.handle_window_event(&pinch(0.0, TouchPhase::Started));
        input.handle_window_event(&pinch(0.5, TouchPhase::Moved));
        assert_eq!(
            input.handle_window_event(&pinch(1.0, TouchPhase::Moved)),
            vec![GestureEvent::PinchUpdate { scale: 3.0 }]
        );
        assert_eq!(
            input.handle_window_event(&pinch(0.0, TouchPhase::Ended)),
            vec![GestureEvent::PinchEnd]
        );
    }
}
