//! Geometry and material storage standing in for GPU-side buffers.
//!
//! Every mesh node refers to its data through a handle. Handles stay valid
//! forever; disposing a handle releases the data and marks the slot, so a
//! leak or a double release is observable instead of silent.

use glam::{Mat4, Vec3};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GeometryHandle(u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MaterialHandle(u32);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub const EMPTY: Self = Self {
        min: Vec3::splat(f32::INFINITY),
        max: Vec3::splat(f32::NEG_INFINITY),
    };

    pub fn from_points(points: impl IntoIterator<Item = Vec3>) -> Self {
        let mut bounds = Self::EMPTY;
        for point in points {
            bounds.include(point);
        }
        bounds
    }

    pub fn include(&mut self, point: Vec3) {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
    }

    pub fn union(&mut self, other: &Aabb) {
        if other.is_empty() {
            return;
        }
        self.include(other.min);
        self.include(other.max);
    }

    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn size(&self) -> Vec3 {
        if self.is_empty() {
            Vec3::ZERO
        } else {
            self.max - self.min
        }
    }

    /// Bounds of this box after `matrix`, computed from its eight corners.
    pub fn transformed(&self, matrix: &Mat4) -> Self {
        if self.is_empty() {
            return *self;
        }
        let corners = (0..8).map(|i| {
            Vec3::new(
                if i & 1 == 0 { self.min.x } else { self.max.x },
                if i & 2 == 0 { self.min.y } else { self.max.y },
                if i & 4 == 0 { self.min.z } else { self.max.z },
            )
        });
        Self::from_points(corners.map(|corner| matrix.transform_point3(corner)))
    }
}

/// Indexed triangle list.
#[derive(Debug, Clone, PartialEq)]
pub struct Geometry {
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub indices: Vec<u32>,
    pub bounds: Aabb,
}

impl Geometry {
    pub fn new(positions: Vec<Vec3>, normals: Vec<Vec3>, indices: Vec<u32>) -> Self {
        let bounds = Aabb::from_points(positions.iter().copied());
        let normals = if normals.len() == positions.len() {
            normals
        } else {
            compute_normals(&positions, &indices)
        };
        Self {
            positions,
            normals,
            indices,
            bounds,
        }
    }

    pub fn triangles(&self) -> impl Iterator<Item = [Vec3; 3]> + '_ {
        self.indices.chunks_exact(3).filter_map(|tri| {
            Some([
                *self.positions.get(tri[0] as usize)?,
                *self.positions.get(tri[1] as usize)?,
                *self.positions.get(tri[2] as usize)?,
            ])
        })
    }

    /// UV sphere centred on the origin.
    pub fn sphere(radius: f32, rings: u32, segments: u32) -> Self {
        let rings = rings.max(2);
        let segments = segments.max(3);
        let mut positions = Vec::with_capacity(((rings + 1) * (segments + 1)) as usize);
        let mut normals = Vec::with_capacity(positions.capacity());
        for ring in 0..=rings {
            let theta = std::f32::consts::PI * ring as f32 / rings as f32;
            let (sin_t, cos_t) = theta.sin_cos();
            for segment in 0..=segments {
                let phi = std::f32::consts::TAU * segment as f32 / segments as f32;
                let (sin_p, cos_p) = phi.sin_cos();
                let normal = Vec3::new(sin_t * cos_p, cos_t, sin_t * sin_p);
                normals.push(normal);
                positions.push(normal * radius);
            }
        }
        let stride = segments + 1;
        let mut indices = Vec::with_capacity((rings * segments * 6) as usize);
        for ring in 0..rings {
            for segment in 0..segments {
                let a = ring * stride + segment;
                let b = a + stride;
                indices.extend_from_slice(&[a, b, a + 1, a + 1, b, b + 1]);
            }
        }
        Self::new(positions, normals, indices)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    pub name: String,
    pub base_color: [f32; 4],
    pub emissive: [f32; 3],
    pub transparent: bool,
}

impl Material {
    pub fn opaque(name: impl Into<String>, color: [f32; 3]) -> Self {
        Self {
            name: name.into(),
            base_color: [color[0], color[1], color[2], 1.0],
            emissive: [0.0; 3],
            transparent: false,
        }
    }

    pub fn opacity(&self) -> f32 {
        self.base_color[3]
    }
}

impl Default for Material {
    fn default() -> Self {
        Self::opaque("default", [0.8, 0.8, 0.8])
    }
}

enum Slot<T> {
    Live(T),
    Disposed,
}

impl<T> Slot<T> {
    fn get(&self) -> Option<&T> {
        match self {
            Slot::Live(value) => Some(value),
            Slot::Disposed => None,
        }
    }
}

#[derive(Default)]
pub struct ResourceRegistry {
    geometries: Vec<Slot<Geometry>>,
    materials: Vec<Slot<Material>>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_geometry(&mut self, geometry: Geometry) -> GeometryHandle {
        self.geometries.push(Slot::Live(geometry));
        GeometryHandle((self.geometries.len() - 1) as u32)
    }

    pub fn create_material(&mut self, material: Material) -> MaterialHandle {
        self.materials.push(Slot::Live(material));
        MaterialHandle((self.materials.len() - 1) as u32)
    }

    pub fn geometry(&self, handle: GeometryHandle) -> Option<&Geometry> {
        self.geometries.get(handle.0 as usize).and_then(Slot::get)
    }

    pub fn material(&self, handle: MaterialHandle) -> Option<&Material> {
        self.materials.get(handle.0 as usize).and_then(Slot::get)
    }

    pub fn material_mut(&mut self, handle: MaterialHandle) -> Option<&mut Material> {
        match self.materials.get_mut(handle.0 as usize) {
            Some(Slot::Live(material)) => Some(material),
            _ => None,
        }
    }

    /// Returns false if the handle was already released.
    pub fn dispose_geometry(&mut self, handle: GeometryHandle) -> bool {
        match self.geometries.get_mut(handle.0 as usize) {
            Some(slot) if slot.get().is_some() => {
                *slot = Slot::Disposed;
                true
            }
            _ => false,
        }
    }

    pub fn dispose_material(&mut self, handle: MaterialHandle) -> bool {
        match self.materials.get_mut(handle.0 as usize) {
            Some(slot) if slot.get().is_some() => {
                *slot = Slot::Disposed;
                true
            }
            _ => false,
        }
    }

    pub fn is_geometry_disposed(&self, handle: GeometryHandle) -> bool {
        self.geometry(handle).is_none()
    }

    pub fn is_material_disposed(&self, handle: MaterialHandle) -> bool {
        self.material(handle).is_none()
    }

    pub fn live_geometry_count(&self) -> usize {
        self.geometries.iter().filter(|slot| slot.get().is_some()).count()
    }

    pub fn live_material_count(&self) -> usize {
        self.materials.iter().filter(|slot| slot.get().is_some()).count()
    }
}

fn compute_normals(positions: &[Vec3], indices: &[u32]) -> Vec<Vec3> {
    let mut normals = vec![Vec3::ZERO; positions.len()];
    for tri in indices.chunks_exact(3) {
        let (a, b, c) = (tri[0] as usize, tri[1] as usize, tri[2] as usize);
        if a >= positions.len() || b >= positions.len() || c >= positions.len() {
            continue;
        }
        let face = (positions[b] - positions[a]).cross(positions[c] - positions[a]);
        normals[a] += face;
        normals[b] += face;
        normals[c] += face;
    }
    normals
        .into_iter()
        .map(|normal| normal.try_normalize().unwrap_or(Vec3::Y))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispose_is_observable_and_single_shot() {
        let mut registry = ResourceRegistry::new();
        let geometry = registry.create_geometry(Geometry::sphere(1.0, 4, 6));
        let material = registry.create_material(Material::default());
        assert_eq!(registry.live_geometry_count(), 1);

        assert!(registry.dispose_geometry(geometry));
        assert!(!registry.dispose_geometry(geometry));
        assert!(registry.is_geometry_disposed(geometry));
        assert!(!registry.is_material_disposed(material));
        assert!(registry.dispose_material(material));
        assert_eq!(registry.live_material_count(), 0);
    }

    #[test]
    fn sphere_bounds_match_radius() {
        let sphere = Geometry::sphere(0.5, 8, 12);
        assert!((sphere.bounds.max - Vec3::splat(0.5)).abs().max_element() < 1e-5);
        assert!((sphere.bounds.min + Vec3::splat(0.5)).abs().max_element() < 1e-5);
        assert_eq!(sphere.indices.len(), 8 * 12 * 6);
    }

    #[test]
    fn transformed_bounds_follow_matrix() {
        let bounds = Aabb::from_points([Vec3::splat(-1.0), Vec3::splat(1.0)]);
        let moved = bounds.transformed(&Mat4::from_scale_rotation_translation(
            Vec3::splat(2.0),
            glam::Quat::IDENTITY,
            Vec3::new(1.0, 0.0, 0.0),
        ));
        assert_eq!(moved.min, Vec3::new(-1.0, -2.0, -2.0));
        assert_eq!(moved.max, Vec3::new(3.0, 2.0, 2.0));
        assert_eq!(moved.center(), Vec3::new(1.0, 0.0, 0.0));
    }

    #[test]
    fn missing_normals_are_computed() {
        let geometry = Geometry::new(
            vec![Vec3::ZERO, Vec3::X, Vec3::Y],
            Vec::new(),
            vec![0, 1, 2],
        );
        assert_eq!(geometry.normals, vec![Vec3::Z; 3]);
    }
}
