pub mod highlight;
pub mod hotspots;

use crate::render::resources::{GeometryHandle, MaterialHandle, ResourceRegistry};
use glam::{EulerRot, Mat4, Quat, Vec3};
use std::collections::BTreeSet;

pub use highlight::{HighlightController, MeshIndex};
pub use hotspots::{hotspot_id_from_name, Hotspot, HotspotRegistry, HOTSPOT_PREFIX};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Transform {
    pub const IDENTITY: Self = Self {
        translation: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: Vec3::ONE,
    };

    pub fn from_translation(translation: Vec3) -> Self {
        Self {
            translation,
            ..Self::IDENTITY
        }
    }

    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }

    pub fn is_finite(&self) -> bool {
        self.translation.is_finite() && self.rotation.is_finite() && self.scale.is_finite()
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Rotation applied to the model root: pitch about X, then yaw about Y.
pub fn model_rotation(yaw: f32, pitch: f32) -> Quat {
    Quat::from_euler(EulerRot::XYZ, pitch, yaw, 0.0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeshBinding {
    pub geometry: GeometryHandle,
    pub material: MaterialHandle,
}

#[derive(Debug, Clone)]
pub struct SceneNode {
    pub name: String,
    pub transform: Transform,
    pub mesh: Option<MeshBinding>,
    pub visible: bool,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    world: Mat4,
}

impl SceneNode {
    fn new(name: String, transform: Transform, parent: Option<NodeId>) -> Self {
        Self {
            name,
            transform,
            mesh: None,
            visible: true,
            parent,
            children: Vec::new(),
            world: Mat4::IDENTITY,
        }
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// World matrix as of the last `update_world_transforms`.
    pub fn world(&self) -> Mat4 {
        self.world
    }
}

/// Arena-backed scene tree. Slots are never reused, so a stale `NodeId`
/// resolves to `None` instead of to an unrelated node.
pub struct SceneGraph {
    nodes: Vec<Option<SceneNode>>,
    root: NodeId,
}

impl SceneGraph {
    pub fn new() -> Self {
        Self {
            nodes: vec![Some(SceneNode::new(
                "Scene".to_string(),
                Transform::IDENTITY,
                None,
            ))],
            root: NodeId(0),
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> Option<&SceneNode> {
        self.nodes.get(id.0).and_then(Option::as_ref)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut SceneNode> {
        self.nodes.get_mut(id.0).and_then(Option::as_mut)
    }

    pub fn name(&self, id: NodeId) -> Option<&str> {
        self.node(id).map(|node| node.name.as_str())
    }

    /// Number of live nodes, the scene root included.
    pub fn len(&self) -> usize {
        self.nodes.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() <= 1
    }

    /// Returns `None` if `parent` is not a live node.
    pub fn add_child(
        &mut self,
        parent: NodeId,
        name: impl Into<String>,
        transform: Transform,
    ) -> Option<NodeId> {
        self.node(parent)?;
        let id = NodeId(self.nodes.len());
        self.nodes
            .push(Some(SceneNode::new(name.into(), transform, Some(parent))));
        if let Some(parent_node) = self.node_mut(parent) {
            parent_node.children.push(id);
        }
        Some(id)
    }

    pub fn set_mesh(&mut self, id: NodeId, mesh: MeshBinding) -> bool {
        match self.node_mut(id) {
            Some(node) => {
                node.mesh = Some(mesh);
                true
            }
            None => false,
        }
    }

    pub fn set_material(&mut self, id: NodeId, material: MaterialHandle) -> bool {
        match self.node_mut(id).and_then(|node| node.mesh.as_mut()) {
            Some(mesh) => {
                mesh.material = material;
                true
            }
            None => false,
        }
    }

    pub fn material_of(&self, id: NodeId) -> Option<MaterialHandle> {
        self.node(id).and_then(|node| node.mesh).map(|mesh| mesh.material)
    }

    /// `id` followed by all of its descendants, depth first.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let Some(node) = self.node(current) else {
                continue;
            };
            out.push(current);
            stack.extend(node.children.iter().rev().copied());
        }
        out
    }

    pub fn find_by_name(&self, name: &str) -> Option<NodeId> {
        self.descendants(self.root)
            .into_iter()
            .find(|&id| self.name(id) == Some(name))
    }

    /// Unlinks `id` from its parent and removes it with its descendants.
    /// The scene root cannot be detached.
    pub fn detach_subtree(&mut self, id: NodeId) -> Vec<SceneNode> {
        if id == self.root {
            return Vec::new();
        }
        let ids = self.descendants(id);
        if let Some(parent) = self.node(id).and_then(|node| node.parent) {
            if let Some(parent_node) = self.node_mut(parent) {
                parent_node.children.retain(|&child| child != id);
            }
        }
        ids.into_iter()
            .filter_map(|node_id| self.nodes.get_mut(node_id.0).and_then(Option::take))
            .collect()
    }

    /// Recomputes every world matrix from the root down.
    pub fn update_world_transforms(&mut self) {
        let mut stack = vec![(self.root, Mat4::IDENTITY)];
        while let Some((id, parent_world)) = stack.pop() {
            let Some(node) = self.node_mut(id) else {
                continue;
            };
            let world = parent_world * node.transform.matrix();
            node.world = world;
            for &child in &node.children {
                stack.push((child, world));
            }
        }
    }

    pub fn world_matrix(&self, id: NodeId) -> Option<Mat4> {
        self.node(id).map(|node| node.world)
    }

    /// Mesh-bearing nodes under `id` whose whole ancestor chain is visible.
    pub fn visible_meshes(&self, id: NodeId) -> Vec<(NodeId, MeshBinding)> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let Some(node) = self.node(current) else {
                continue;
            };
            if !node.visible {
                continue;
            }
            if let Some(mesh) = node.mesh {
                out.push((current, mesh));
            }
            stack.extend(node.children.iter().rev().copied());
        }
        out
    }
}

impl Default for SceneGraph {
    fn default() -> Self {
        Self::new()
    }
}

/// Detaches `id` and releases every geometry and material its nodes reference.
/// Handles shared between nodes are released once. Returns the number of
/// geometries and materials released.
pub fn release_subtree(
    scene: &mut SceneGraph,
    resources: &mut ResourceRegistry,
    id: NodeId,
) -> (usize, usize) {
    let removed = scene.detach_subtree(id);
    let mut geometries = BTreeSet::new();
    let mut materials = BTreeSet::new();
    for mesh in removed.iter().filter_map(|node| node.mesh) {
        geometries.insert(mesh.geometry);
        materials.insert(mesh.material);
    }
    let released_geometries = geometries
        .into_iter()
        .filter(|&handle| resources.dispose_geometry(handle))
        .count();
    let released_materials = materials
        .into_iter()
        .filter(|&handle| resources.dispose_material(handle))
        .count();
    (released_geometries, released_materials)
}
