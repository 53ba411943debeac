//! Ray picking against scene geometry.
//!
//! A screen point becomes a world ray through the camera; every visible mesh
//! is tested in its local space (AABB reject, then exact triangles) and the
//! hits are sorted nearest first. Hotspot markers win over model meshes even
//! when a mesh is closer: markers sit on or just under the model surface and
//! would otherwise be unreachable.

use super::camera::{screen_to_ndc, Camera, Ray};
use super::resources::ResourceRegistry;
use crate::scene::{hotspot_id_from_name, NodeId, SceneGraph};
use glam::{Vec2, Vec3};

#[derive(Debug, Clone, PartialEq)]
pub enum HitResult {
    Hotspot {
        id: String,
    },
    Mesh {
        mesh_name: String,
        parent_name: String,
        world_position: Vec3,
        distance: f32,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Intersection {
    pub node: NodeId,
    pub distance: f32,
    pub point: Vec3,
}

/// Nearest hit per visible mesh node, sorted by distance.
pub fn intersect_scene(scene: &SceneGraph, resources: &ResourceRegistry, ray: &Ray) -> Vec<Intersection> {
    let mut hits = Vec::new();
    for (node, mesh) in scene.visible_meshes(scene.root()) {
        let Some(geometry) = resources.geometry(mesh.geometry) else {
            continue;
        };
        let Some(world) = scene.world_matrix(node) else {
            continue;
        };
        let inverse = world.inverse();
        if !inverse.is_finite() {
            continue;
        }
        let local = Ray {
            origin: inverse.transform_point3(ray.origin),
            direction: inverse.transform_vector3(ray.direction),
        };
        if local.direction.length_squared() <= f32::EPSILON {
            continue;
        }
        if ray_aabb_intersection(local.origin, local.direction, geometry.bounds.min, geometry.bounds.max).is_none() {
            continue;
        }
        let nearest = geometry
            .triangles()
            .filter_map(|[a, b, c]| ray_triangle_intersection(local.origin, local.direction, a, b, c))
            .fold(None, |best: Option<f32>, t| Some(best.map_or(t, |b| b.min(t))));
        if let Some(t) = nearest {
            let point = world.transform_point3(local.at(t));
            hits.push(Intersection {
                node,
                distance: (point - ray.origin).length(),
                point,
            });
        }
    }
    hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
    hits
}

/// Resolves a tap at `screen` on a `width`×`height` surface.
pub fn raycast(
    scene: &SceneGraph,
    resources: &ResourceRegistry,
    camera: &Camera,
    width: u32,
    height: u32,
    screen: Vec2,
) -> Option<HitResult> {
    if width == 0 || height == 0 {
        return None;
    }
    let ndc = screen_to_ndc(screen, width as f32, height as f32);
    let ray = camera.ray_through_ndc(ndc)?;
    resolve_hit(scene, &intersect_scene(scene, resources, &ray))
}

/// Hotspot anywhere in the list first, otherwise the nearest mesh.
pub fn resolve_hit(scene: &SceneGraph, hits: &[Intersection]) -> Option<HitResult> {
    let hotspot = hits.iter().find_map(|hit| {
        let name = scene.name(hit.node)?;
        hotspot_id_from_name(name).map(|id| HitResult::Hotspot { id: id.to_string() })
    });
    if hotspot.is_some() {
        return hotspot;
    }
    let nearest = hits.first()?;
    let node = scene.node(nearest.node)?;
    // Nearest named ancestor; the model's normalization node has no name.
    let parent_name = std::iter::successors(node.parent(), |&id| scene.node(id)?.parent())
        .filter_map(|id| scene.name(id))
        .find(|name| !name.is_empty())
        .unwrap_or_default()
        .to_string();
    Some(HitResult::Mesh {
        mesh_name: node.name.clone(),
        parent_name,
        world_position: nearest.point,
        distance: nearest.distance,
    })
}

/// Two-sided Möller–Trumbore; returns the ray parameter of the hit.
pub fn ray_triangle_intersection(origin: Vec3, dir: Vec3, a: Vec3, b: Vec3, c: Vec3) -> Option<f32> {
    const EPSILON: f32 = 1e-7;
    // Edges and shared vertices count as inside.
    const EDGE_TOLERANCE: f32 = 1e-5;
    let edge1 = b - a;
    let edge2 = c - a;
    let p = dir.cross(edge2);
    let det = edge1.dot(p);
    if det.abs() < EPSILON {
        return None;
    }
    let inv_det = 1.0 / det;
    let s = origin - a;
    let u = s.dot(p) * inv_det;
    if u < -EDGE_TOLERANCE || u > 1.0 + EDGE_TOLERANCE {
        return None;
    }
    let q = s.cross(edge1);
    let v = dir.dot(q) * inv_det;
    if v < -EDGE_TOLERANCE || u + v > 1.0 + EDGE_TOLERANCE {
        return None;
    }
    let t = edge2.dot(q) * inv_det;
    (t > EPSILON).then_some(t)
}

pub fn ray_aabb_intersection(origin: Vec3, dir: Vec3, min: Vec3, max: Vec3) -> Option<(f32, Vec3)> {
    let mut t_min: f32 = 0.0;
    let mut t_max: f32 = f32::INFINITY;
    for axis in 0..3 {
        let o = origin[axis];
        let d = dir[axis];
        if d.abs() < 1e-9 {
            if o < min[axis] || o > max[axis] {
                return None;
            }
            continue;
        }
        let inv_d = 1.0 / d;
        let mut t1 = (min[axis] - o) * inv_d;
        let mut t2 = (max[axis] - o) * inv_d;
        if t1 > t2 {
            std::mem::swap(&mut t1, &mut t2);
        }
        t_min = t_min.max(t1);
        t_max = t_max.min(t2);
        if t_min > t_max {
            return None;
        }
    }
    Some((t_min, origin + dir * t_min))
}
