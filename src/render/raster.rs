//! CPU rasterizer for the viewer's scene.
//!
//! Opaque meshes are drawn first with depth writes, then transparent meshes
//! back to front with alpha blending and depth testing only. Shading is
//! Gouraud Lambert from an ambient term plus two directional lights.

use super::camera::Camera;
use super::resources::{Geometry, Material, ResourceRegistry};
use super::RenderError;
use crate::scene::SceneGraph;
use glam::{Mat3, Mat4, Vec2, Vec3, Vec4};
use image::{ImageFormat, Rgba, RgbaImage};
use std::path::Path;

/// Ambient term plus a key light and a weaker fill from the opposite side.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightRig {
    pub ambient: f32,
    /// Direction the key light travels, world space.
    pub key_direction: Vec3,
    pub key_intensity: f32,
    pub fill_direction: Vec3,
    pub fill_intensity: f32,
}

impl Default for LightRig {
    fn default() -> Self {
        let key_direction = Vec3::new(-0.5, -1.0, -0.8).normalize();
        Self {
            ambient: 0.35,
            key_direction,
            key_intensity: 0.8,
            fill_direction: -key_direction,
            fill_intensity: 0.3,
        }
    }
}

impl LightRig {
    fn shade(&self, normal: Vec3) -> f32 {
        let key = normal.dot(-self.key_direction).max(0.0) * self.key_intensity;
        let fill = normal.dot(-self.fill_direction).max(0.0) * self.fill_intensity;
        self.ambient + key + fill
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub meshes: usize,
    pub triangles: usize,
    /// Triangles dropped for lying behind the near plane or being degenerate.
    pub culled: usize,
}

#[derive(Debug, Clone, Copy, Default)]
struct ClipVertex {
    clip: Vec4,
    color: Vec3,
}

struct ScreenVertex {
    position: Vec2,
    depth: f32,
    color: Vec3,
}

pub struct SoftwareRenderer {
    color: RgbaImage,
    depth: Vec<f32>,
}

impl SoftwareRenderer {
    pub fn new(width: u32, height: u32) -> Result<Self, RenderError> {
        if width == 0 || height == 0 {
            return Err(RenderError::SurfaceNotReady { width, height });
        }
        Ok(Self {
            color: RgbaImage::new(width, height),
            depth: vec![f32::INFINITY; (width * height) as usize],
        })
    }

    pub fn width(&self) -> u32 {
        self.color.width()
    }

    pub fn height(&self) -> u32 {
        self.color.height()
    }

    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), RenderError> {
        if width == 0 || height == 0 {
            return Err(RenderError::SurfaceNotReady { width, height });
        }
        if width != self.width() || height != self.height() {
            self.color = RgbaImage::new(width, height);
            self.depth = vec![f32::INFINITY; (width * height) as usize];
        }
        Ok(())
    }

    /// Last rendered frame.
    pub fn frame(&self) -> &RgbaImage {
        &self.color
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        self.color.get_pixel_checked(x, y).map(|pixel| pixel.0)
    }

    pub fn render(
        &mut self,
        scene: &SceneGraph,
        resources: &ResourceRegistry,
        camera: &Camera,
        lights: &LightRig,
        background: [f32; 3],
    ) -> FrameStats {
        let clear = Rgba([to_u8(background[0]), to_u8(background[1]), to_u8(background[2]), 255]);
        for pixel in self.color.pixels_mut() {
            *pixel = clear;
        }
        self.depth.fill(f32::INFINITY);

        let eye = camera.position();
        let mut opaque = Vec::new();
        let mut transparent = Vec::new();
        for (node, mesh) in scene.visible_meshes(scene.root()) {
            let (Some(geometry), Some(material), Some(world)) = (
                resources.geometry(mesh.geometry),
                resources.material(mesh.material),
                scene.world_matrix(node),
            ) else {
                continue;
            };
            if material.transparent || material.opacity() < 1.0 {
                let center = world.transform_point3(geometry.bounds.center());
                transparent.push((eye.distance_squared(center), geometry, material, world));
            } else {
                opaque.push((geometry, material, world));
            }
        }
        transparent.sort_by(|a, b| b.0.total_cmp(&a.0));

        let mut stats = FrameStats::default();
        let view_projection = camera.view_projection();
        for (geometry, material, world) in opaque {
            self.draw_mesh(geometry, material, &world, &view_projection, camera, lights, false, &mut stats);
        }
        for (_, geometry, material, world) in transparent {
            self.draw_mesh(geometry, material, &world, &view_projection, camera, lights, true, &mut stats);
        }
        stats
    }

    pub fn snapshot_png(&self, path: &Path) -> Result<(), RenderError> {
        self.color
            .save_with_format(path, ImageFormat::Png)
            .map_err(|source| RenderError::Snapshot {
                path: path.display().to_string(),
                source,
            })
    }

    #[allow(clippy::too_many_arguments)]
    fn draw_mesh(
        &mut self,
        geometry: &Geometry,
        material: &Material,
        world: &Mat4,
        view_projection: &Mat4,
        camera: &Camera,
        lights: &LightRig,
        blend: bool,
        stats: &mut FrameStats,
    ) {
        stats.meshes += 1;
        let normal_matrix = Mat3::from_mat4(*world).inverse().transpose();
        let eye = camera.position();
        let base = Vec3::new(material.base_color[0], material.base_color[1], material.base_color[2]);
        let emissive = Vec3::from_array(material.emissive);
        let alpha = material.opacity().clamp(0.0, 1.0);

        for tri in geometry.indices.chunks_exact(3) {
            let corners = [tri[0] as usize, tri[1] as usize, tri[2] as usize];
            if corners.iter().any(|&i| i >= geometry.positions.len()) {
                continue;
            }
            stats.triangles += 1;
            let positions = corners.map(|i| world.transform_point3(geometry.positions[i]));
            let Some(face) = (positions[1] - positions[0])
                .cross(positions[2] - positions[0])
                .try_normalize()
            else {
                stats.culled += 1;
                continue;
            };
            // Two-sided: light the side facing the camera.
            let face = if face.dot(eye - positions[0]) < 0.0 { -face } else { face };

            let mut corner_vertices = [ClipVertex::default(); 3];
            for (slot, &index) in corners.iter().enumerate() {
                let normal = geometry
                    .normals
                    .get(index)
                    .map(|n| (normal_matrix * *n).normalize_or_zero())
                    .filter(|n| *n != Vec3::ZERO)
                    .map(|n| if n.dot(face) < 0.0 { -n } else { n })
                    .unwrap_or(face);
                corner_vertices[slot] = ClipVertex {
                    clip: *view_projection * positions[slot].extend(1.0),
                    color: (base * lights.shade(normal) + emissive).min(Vec3::ONE),
                };
            }

            let polygon = clip_to_near_plane(&corner_vertices, camera.near());
            if polygon.len() < 3 {
                stats.culled += 1;
                continue;
            }
            let mut drawn = false;
            for i in 1..polygon.len() - 1 {
                let piece = [polygon[0], polygon[i], polygon[i + 1]].map(|v| self.to_screen(v.clip, v.color));
                drawn |= self.fill_triangle(&piece, alpha, blend);
            }
            if !drawn {
                stats.culled += 1;
            }
        }
    }

    fn to_screen(&self, clip: Vec4, color: Vec3) -> ScreenVertex {
        let ndc = clip.truncate() / clip.w;
        ScreenVertex {
            position: Vec2::new(
                (ndc.x + 1.0) * 0.5 * self.width() as f32,
                (1.0 - ndc.y) * 0.5 * self.height() as f32,
            ),
            depth: ndc.z,
            color,
        }
    }

    /// Returns false for a degenerate triangle.
    fn fill_triangle(&mut self, v: &[ScreenVertex], alpha: f32, blend: bool) -> bool {
        let area = edge(v[0].position, v[1].position, v[2].position);
        if area.abs() < 1e-8 {
            return false;
        }
        let width = self.width();
        let height = self.height();
        let min = v[0].position.min(v[1].position).min(v[2].position).floor().max(Vec2::ZERO);
        let max = v[0]
            .position
            .max(v[1].position)
            .max(v[2].position)
            .ceil()
            .min(Vec2::new(width as f32 - 1.0, height as f32 - 1.0));
        if min.x > max.x || min.y > max.y {
            return true;
        }

        for y in min.y as u32..=max.y as u32 {
            for x in min.x as u32..=max.x as u32 {
                let p = Vec2::new(x as f32 + 0.5, y as f32 + 0.5);
                let w0 = edge(v[1].position, v[2].position, p) / area;
                let w1 = edge(v[2].position, v[0].position, p) / area;
                let w2 = edge(v[0].position, v[1].position, p) / area;
                if w0 < 0.0 || w1 < 0.0 || w2 < 0.0 {
                    continue;
                }
                let depth = w0 * v[0].depth + w1 * v[1].depth + w2 * v[2].depth;
                if !(-1.0..=1.0).contains(&depth) {
                    continue;
                }
                let index = (y * width + x) as usize;
                if depth >= self.depth[index] {
                    continue;
                }
                let color = v[0].color * w0 + v[1].color * w1 + v[2].color * w2;
                let pixel = self.color.get_pixel_mut(x, y);
                if blend {
                    let dst = Vec3::new(pixel[0] as f32, pixel[1] as f32, pixel[2] as f32) / 255.0;
                    let out = color * alpha + dst * (1.0 - alpha);
                    *pixel = Rgba([to_u8(out.x), to_u8(out.y), to_u8(out.z), 255]);
                } else {
                    self.depth[index] = depth;
                    *pixel = Rgba([to_u8(color.x), to_u8(color.y), to_u8(color.z), 255]);
                }
            }
        }
        true
    }
}

/// Sutherland-Hodgman against `w = near`. Returns zero, three or four
/// vertices in winding order.
fn clip_to_near_plane(triangle: &[ClipVertex; 3], near: f32) -> Vec<ClipVertex> {
    let mut polygon = Vec::with_capacity(4);
    for (i, a) in triangle.iter().enumerate() {
        let b = &triangle[(i + 1) % 3];
        let da = a.clip.w - near;
        let db = b.clip.w - near;
        if da >= 0.0 {
            polygon.push(*a);
        }
        if (da >= 0.0) != (db >= 0.0) {
            let t = da / (da - db);
            polygon.push(ClipVertex {
                clip: a.clip.lerp(b.clip, t),
                color: a.color.lerp(b.color, t),
            });
        }
    }
    polygon
}

fn edge(a: Vec2, b: Vec2, p: Vec2) -> f32 {
    (b.x - a.x) * (p.y - a.y) - (b.y - a.y) * (p.x - a.x)
}

fn to_u8(value: f32) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0).round() as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CameraConfig;
    use crate::scene::{MeshBinding, Transform};

    const BACKGROUND: [f32; 3] = [0.0, 0.0, 0.0];

    fn sphere_scene(material: Material) -> (SceneGraph, ResourceRegistry) {
        let mut scene = SceneGraph::new();
        let mut resources = ResourceRegistry::new();
        let geometry = resources.create_geometry(Geometry::sphere(0.5, 12, 16));
        let material = resources.create_material(material);
        let root = scene.root();
        let node = scene.add_child(root, "ball", Transform::IDENTITY).unwrap();
        scene.set_mesh(node, MeshBinding { geometry, material });
        scene.update_world_transforms();
        (scene, resources)
    }

    fn camera() -> Camera {
        let mut camera = Camera::new(&CameraConfig::default(), 1.0);
        camera.set_distance(3.0);
        camera
    }

    #[test]
    fn zero_sized_surface_is_rejected() {
        assert!(matches!(
            SoftwareRenderer::new(0, 10),
            Err(RenderError::SurfaceNotReady { width: 0, height: 10 })
        ));
        let mut renderer = SoftwareRenderer::new(4, 4).unwrap();
        assert!(renderer.resize(4, 0).is_err());
        assert_eq!(renderer.width(), 4);
    }

    #[test]
    fn sphere_covers_center_and_not_corner() {
        let (scene, resources) = sphere_scene(Material::opaque("red", [1.0, 0.0, 0.0]));
        let mut renderer = SoftwareRenderer::new(64, 64).unwrap();
        let stats = renderer.render(&scene, &resources, &camera(), &LightRig::default(), BACKGROUND);
        assert_eq!(stats.meshes, 1);
        assert!(stats.triangles > 0);

        let center = renderer.pixel(32, 32).unwrap();
        assert!(center[0] > 0);
        assert_eq!(center[1], 0);
        assert_eq!(renderer.pixel(0, 0), Some([0, 0, 0, 255]));
    }

    #[test]
    fn transparent_mesh_blends_with_background() {
        let mut material = Material::opaque("glass", [1.0, 1.0, 1.0]);
        material.base_color[3] = 0.5;
        material.emissive = [1.0, 1.0, 1.0];
        material.transparent = true;
        let (scene, resources) = sphere_scene(material);
        let mut renderer = SoftwareRenderer::new(32, 32).unwrap();
        renderer.render(&scene, &resources, &camera(), &LightRig::default(), BACKGROUND);
        // At least the back and front faces blend over black.
        let center = renderer.pixel(16, 16).unwrap();
        assert!(center[0] >= 190 && center[0] < 255, "got {center:?}");
    }

    #[test]
    fn triangle_crossing_near_plane_is_clipped_not_dropped() {
        let mut scene = SceneGraph::new();
        let mut resources = ResourceRegistry::new();
        // The apex sits behind the camera; the center ray meets the face at z = 0.75.
        let geometry = resources.create_geometry(Geometry::new(
            vec![Vec3::new(-1.0, -1.0, 0.0), Vec3::new(1.0, -1.0, 0.0), Vec3::new(0.0, 1.0, 1.5)],
            Vec::new(),
            vec![0, 1, 2],
        ));
        let material = resources.create_material(Material::opaque("red", [1.0, 0.0, 0.0]));
        let root = scene.root();
        let node = scene.add_child(root, "wedge", Transform::IDENTITY).unwrap();
        scene.set_mesh(node, MeshBinding { geometry, material });
        scene.update_world_transforms();

        let mut camera = camera();
        camera.set_distance(1.0);
        let mut renderer = SoftwareRenderer::new(64, 64).unwrap();
        let stats = renderer.render(&scene, &resources, &camera, &LightRig::default(), BACKGROUND);
        assert_eq!(stats, FrameStats { meshes: 1, triangles: 1, culled: 0 });
        assert!(renderer.pixel(32, 32).unwrap()[0] > 0);
    }

    #[test]
    fn near_plane_clip_splits_into_quad() {
        let vertex = |z: f32, w: f32| ClipVertex {
            clip: Vec4::new(0.0, 0.0, z, w),
            color: Vec3::ONE,
        };
        let one_behind = [vertex(0.0, 1.0), vertex(0.0, 2.0), vertex(0.0, -1.0)];
        let polygon = clip_to_near_plane(&one_behind, 0.1);
        assert_eq!(polygon.len(), 4);
        assert!(polygon.iter().all(|v| v.clip.w >= 0.1 - 1e-6));

        let two_behind = [vertex(0.0, 1.0), vertex(0.0, -2.0), vertex(0.0, -1.0)];
        assert_eq!(clip_to_near_plane(&two_behind, 0.1).len(), 3);
        let all_behind = [vertex(0.0, -1.0), vertex(0.0, -2.0), vertex(0.0, 0.05)];
        assert!(clip_to_near_plane(&all_behind, 0.1).is_empty());
    }

    #[test]
    fn snapshot_writes_png() {
        let (scene, resources) = sphere_scene(Material::default());
        let mut renderer = SoftwareRenderer::new(16, 8).unwrap();
        renderer.render(&scene, &resources, &camera(), &LightRig::default(), [0.1, 0.1, 0.2]);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.png");
        renderer.snapshot_png(&path).unwrap();
        let decoded = image::open(&path).unwrap().to_rgba8();
        assert_eq!(decoded.dimensions(), (16, 8));
        assert_eq!(decoded.get_pixel(0, 0).0, [26, 26, 51, 255]);
    }
}
