use std::time::{Duration, Instant};

/// Wall-clock delta between ticks, with a periodic fps log line.
pub struct FrameTiming {
    last_frame_time: Option<Instant>,
    last_fps_time: Option<Instant>,
    frame_count: u32,
    pub frame_dt: f32,
}

impl FrameTiming {
    pub fn new() -> Self {
        Self {
            last_frame_time: None,
            last_fps_time: None,
            frame_count: 0,
            frame_dt: 1.0 / 60.0,
        }
    }

    /// Returns the delta since the previous call; 16 ms on the first frame.
    pub fn update(&mut self, now: Instant) -> f32 {
        let dt_duration = if let Some(last) = self.last_frame_time {
            now.saturating_duration_since(last)
        } else {
            Duration::from_millis(16)
        };
        self.last_frame_time = Some(now);
        self.frame_dt = dt_duration.as_secs_f32().max(0.0);

        self.frame_count = self.frame_count.saturating_add(1);
        let since = *self.last_fps_time.get_or_insert(now);
        let elapsed = now.saturating_duration_since(since);
        if elapsed.as_secs_f32() >= 5.0 {
            let fps = self.frame_count as f32 / elapsed.as_secs_f32();
            log::debug!("{:.1} fps (cadence {:.2} ms)", fps, self.frame_dt * 1000.0);
            self.frame_count = 0;
            self.last_fps_time = Some(now);
        }
        self.frame_dt
    }

    /// Forget the previous frame so the next delta does not span a gap.
    pub fn reset(&mut self) {
        self.last_frame_time = None;
        self.last_fps_time = None;
        self.frame_count = 0;
    }
}

impl Default for FrameTiming {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_frame_uses_default_delta() {
        let mut timing = FrameTiming::new();
        let start = Instant::now();
        assert!((timing.update(start) - 0.016).abs() < 1e-6);
        assert!((timing.update(start + Duration::from_millis(40)) - 0.040).abs() < 1e-6);
        // Clock going backwards clamps to zero.
        assert_eq!(timing.update(start), 0.0);
    }
}
