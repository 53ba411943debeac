use crate::config::CameraConfig;
use glam::{Mat4, Vec2, Vec3, Vec4};

/// Zoom-derived factor and pinch multiplier compose multiplicatively:
/// `zoom = 0` doubles the base distance, `zoom = 1` halves it, and a larger
/// pinch scale brings the camera closer.
pub fn camera_distance(base_distance: f32, zoom_level: f32, pinch_scale: f32) -> f32 {
    base_distance * (2.0 - zoom_level * 1.5) / pinch_scale
}

/// Screen point (top-left origin, Y down) to normalized device coordinates.
pub fn screen_to_ndc(screen: Vec2, width: f32, height: f32) -> Vec2 {
    Vec2::new(
        (screen.x / width) * 2.0 - 1.0,
        -(screen.y / height) * 2.0 + 1.0,
    )
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
}

impl Ray {
    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }
}

/// Perspective camera on the +Z axis looking at the origin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    fov_y_radians: f32,
    near: f32,
    far: f32,
    aspect: f32,
    distance: f32,
}

impl Camera {
    pub fn new(config: &CameraConfig, aspect: f32) -> Self {
        Self {
            fov_y_radians: config.fov_y_deg.to_radians(),
            near: config.near,
            far: config.far,
            aspect: aspect.max(1e-4),
            distance: config.base_distance,
        }
    }

    pub fn fov_y_radians(&self) -> f32 {
        self.fov_y_radians
    }

    pub fn near(&self) -> f32 {
        self.near
    }

    pub fn far(&self) -> f32 {
        self.far
    }

    pub fn aspect(&self) -> f32 {
        self.aspect
    }

    pub fn set_aspect(&mut self, aspect: f32) {
        self.aspect = aspect.max(1e-4);
    }

    pub fn distance(&self) -> f32 {
        self.distance
    }

    pub fn set_distance(&mut self, distance: f32) {
        self.distance = distance;
    }

    pub fn position(&self) -> Vec3 {
        Vec3::new(0.0, 0.0, self.distance)
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position(), Vec3::ZERO, Vec3::Y)
    }

    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_rh_gl(self.fov_y_radians, self.aspect, self.near, self.far)
    }

    pub fn view_projection(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }

    /// World-space ray from the camera through an NDC point.
    pub fn ray_through_ndc(&self, ndc: Vec2) -> Option<Ray> {
        let inverse = self.view_projection().inverse();
        let far_point = inverse * Vec4::new(ndc.x, ndc.y, 1.0, 1.0);
        if far_point.w.abs() < f32::EPSILON {
            return None;
        }
        let origin = self.position();
        let direction = (far_point.truncate() / far_point.w - origin).try_normalize()?;
        Some(Ray { origin, direction })
    }

    /// Projects a world point to NDC plus view depth; `None` behind the near plane.
    pub fn project(&self, point: Vec3) -> Option<Vec3> {
        let clip = self.view_projection() * point.extend(1.0);
        if clip.w < self.near {
            return None;
        }
        Some(clip.truncate() / clip.w)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn camera(distance: f32) -> Camera {
        let mut camera = Camera::new(&CameraConfig::default(), 400.0 / 800.0);
        camera.set_distance(distance);
        camera
    }

    #[test]
    fn zoom_formula_matches_reference_points() {
        assert_eq!(camera_distance(2.0, 0.0, 1.0), 4.0);
        assert_eq!(camera_distance(2.0, 1.0, 1.0), 1.0);
        assert_eq!(camera_distance(2.0, 0.0, 2.0), 2.0);
    }

    #[test]
    fn ndc_flips_y() {
        assert_eq!(screen_to_ndc(Vec2::new(200.0, 400.0), 400.0, 800.0), Vec2::ZERO);
        assert_eq!(screen_to_ndc(Vec2::ZERO, 400.0, 800.0), Vec2::new(-1.0, 1.0));
        assert_eq!(screen_to_ndc(Vec2::new(400.0, 800.0), 400.0, 800.0), Vec2::new(1.0, -1.0));
    }

    #[test]
    fn center_ray_points_at_origin() {
        let ray = camera(4.0).ray_through_ndc(Vec2::ZERO).unwrap();
        assert_eq!(ray.origin, Vec3::new(0.0, 0.0, 4.0));
        assert!((ray.direction - Vec3::NEG_Z).length() < 1e-5);
    }

    #[test]
    fn corner_ray_leans_up_and_left() {
        let ray = camera(4.0).ray_through_ndc(Vec2::new(-1.0, 1.0)).unwrap();
        assert!(ray.direction.x < 0.0);
        assert!(ray.direction.y > 0.0);
        // Vertical half-angle is half the 75 degree field of view.
        let vertical = ray.direction.y.atan2(-ray.direction.z);
        assert!((vertical - 37.5_f32.to_radians()).abs() < 1e-3);
    }

    #[test]
    fn projection_round_trips_center() {
        let camera = camera(3.0);
        let ndc = camera.project(Vec3::ZERO).unwrap();
        assert!(ndc.x.abs() < 1e-6 && ndc.y.abs() < 1e-6);
        assert!(camera.project(Vec3::new(0.0, 0.0, 10.0)).is_none());
    }
}
