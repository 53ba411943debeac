pub mod animation;
pub mod queue;

pub use animation::{AnimationClip, AnimationMixer};
pub use queue::{AssetLoadQueue, LoadOutcome};

use crate::render::resources::{Aabb, Geometry, GeometryHandle, Material, MaterialHandle, ResourceRegistry};
use crate::scene::{release_subtree, MeshBinding, MeshIndex, NodeId, SceneGraph, Transform, HOTSPOT_PREFIX};
use glam::{Mat4, Quat, Vec3};
use gltf::mesh::Mode;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    #[error("failed to read glTF at {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to import glTF {path}: {source}")]
    Import {
        path: String,
        #[source]
        source: gltf::Error,
    },
    #[error("unsupported model URI: {0}")]
    UnsupportedUri(String),
    #[error("glTF {0} contains no triangle geometry")]
    NoGeometry(String),
    #[error("node {node} references missing mesh {mesh}")]
    MissingMesh { node: usize, mesh: usize },
    #[error("scene node {0:?} is gone; model not attached")]
    Detached(NodeId),
    #[error("asset loader worker stopped")]
    WorkerGone,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssetPrimitive {
    pub geometry: Geometry,
    pub material: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssetMesh {
    pub name: String,
    pub primitives: Vec<AssetPrimitive>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssetNode {
    pub name: String,
    pub transform: Transform,
    pub mesh: Option<usize>,
    pub children: Vec<usize>,
}

/// Parsed glTF content as plain data. Holds no scene or resource handles, so
/// it can be produced off the viewer thread.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelAsset {
    pub name: String,
    pub nodes: Vec<AssetNode>,
    pub roots: Vec<usize>,
    pub meshes: Vec<AssetMesh>,
    pub materials: Vec<Material>,
    pub clips: Vec<AnimationClip>,
}

impl ModelAsset {
    /// Loads a `.gltf` or `.glb` file. A `file://` prefix is accepted; remote
    /// URIs are not.
    pub fn from_uri(uri: &str) -> Result<Self, AssetError> {
        let path = uri_to_path(uri)?;
        let (document, buffers, _images) = gltf::import(&path).map_err(|source| match source {
            gltf::Error::Io(source) => AssetError::Read {
                path: path.display().to_string(),
                source,
            },
            source => AssetError::Import {
                path: path.display().to_string(),
                source,
            },
        })?;
        let name = path
            .file_stem()
            .and_then(|value| value.to_str())
            .unwrap_or("gltf")
            .to_string();
        Self::from_document(name, &document, &buffers)
    }

    /// Parses a self-contained glTF (embedded buffers or GLB) from memory.
    pub fn from_slice(name: &str, bytes: &[u8]) -> Result<Self, AssetError> {
        let (document, buffers, _images) = gltf::import_slice(bytes).map_err(|source| AssetError::Import {
            path: name.to_string(),
            source,
        })?;
        Self::from_document(name.to_string(), &document, &buffers)
    }

    fn from_document(
        name: String,
        document: &gltf::Document,
        buffers: &[gltf::buffer::Data],
    ) -> Result<Self, AssetError> {
        let materials = document
            .materials()
            .enumerate()
            .map(|(index, material)| {
                let pbr = material.pbr_metallic_roughness();
                Material {
                    name: material
                        .name()
                        .map(str::to_string)
                        .unwrap_or_else(|| format!("material_{index}")),
                    base_color: pbr.base_color_factor(),
                    emissive: material.emissive_factor(),
                    transparent: matches!(material.alpha_mode(), gltf::material::AlphaMode::Blend),
                }
            })
            .collect();

        let mut meshes = Vec::new();
        for mesh in document.meshes() {
            let mut primitives = Vec::new();
            for primitive in mesh.primitives() {
                if primitive.mode() != Mode::Triangles {
                    log::warn!(
                        "Mesh {} has a {:?} primitive; only triangles are drawn",
                        mesh.index(),
                        primitive.mode()
                    );
                    continue;
                }
                let reader = primitive.reader(|buffer| Some(&buffers[buffer.index()]));
                let Some(positions) = reader.read_positions() else {
                    continue;
                };
                let positions: Vec<Vec3> = positions.map(Vec3::from_array).collect();
                if positions.is_empty() {
                    continue;
                }
                let normals: Vec<Vec3> = reader
                    .read_normals()
                    .map(|it| it.map(Vec3::from_array).collect())
                    .unwrap_or_default();
                let indices: Vec<u32> = reader
                    .read_indices()
                    .map(|read| read.into_u32().collect())
                    .unwrap_or_else(|| (0..positions.len() as u32).collect());
                primitives.push(AssetPrimitive {
                    geometry: Geometry::new(positions, normals, indices),
                    material: primitive.material().index(),
                });
            }
            meshes.push(AssetMesh {
                name: mesh
                    .name()
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("mesh_{}", mesh.index())),
                primitives,
            });
        }
        if meshes.iter().all(|mesh| mesh.primitives.is_empty()) {
            return Err(AssetError::NoGeometry(name));
        }

        let nodes: Vec<AssetNode> = document
            .nodes()
            .map(|node| {
                let (translation, rotation, scale) = node.transform().decomposed();
                AssetNode {
                    name: node.name().unwrap_or_default().to_string(),
                    transform: Transform {
                        translation: Vec3::from_array(translation),
                        rotation: Quat::from_array(rotation),
                        scale: Vec3::from_array(scale),
                    },
                    mesh: node.mesh().map(|mesh| mesh.index()),
                    children: node.children().map(|child| child.index()).collect(),
                }
            })
            .collect();

        let roots = match document.default_scene().or_else(|| document.scenes().next()) {
            Some(scene) => scene.nodes().map(|node| node.index()).collect(),
            None => {
                let children: HashSet<usize> = nodes.iter().flat_map(|node| node.children.iter().copied()).collect();
                (0..nodes.len()).filter(|index| !children.contains(index)).collect()
            }
        };

        Ok(Self {
            name,
            nodes,
            roots,
            meshes,
            materials,
            clips: animation::parse_clips(document, buffers),
        })
    }

    pub fn clip_names(&self) -> Vec<String> {
        self.clips.iter().map(|clip| clip.name.clone()).collect()
    }

    /// Bounds of all geometry in the rest pose.
    pub fn bounds(&self) -> Aabb {
        let mut bounds = Aabb::EMPTY;
        self.walk(|index, world| {
            if let Some(mesh) = self.nodes[index].mesh.and_then(|mesh| self.meshes.get(mesh)) {
                for primitive in &mesh.primitives {
                    bounds.union(&primitive.geometry.bounds.transformed(&world));
                }
            }
        });
        bounds
    }

    /// Visits every reachable node once, parents first, with its rest-pose
    /// matrix relative to the asset root.
    fn walk(&self, mut visit: impl FnMut(usize, Mat4)) {
        let mut seen = HashSet::new();
        let mut stack: Vec<(usize, Mat4)> = self.roots.iter().rev().map(|&root| (root, Mat4::IDENTITY)).collect();
        while let Some((index, parent)) = stack.pop() {
            let Some(node) = self.nodes.get(index) else {
                continue;
            };
            if !seen.insert(index) {
                continue;
            }
            let world = parent * node.transform.matrix();
            visit(index, world);
            stack.extend(node.children.iter().rev().map(|&child| (child, world)));
        }
    }
}

fn uri_to_path(uri: &str) -> Result<PathBuf, AssetError> {
    let trimmed = uri.trim();
    if trimmed.is_empty() {
        return Err(AssetError::UnsupportedUri(uri.to_string()));
    }
    if let Some(path) = trimmed.strip_prefix("file://") {
        return Ok(PathBuf::from(path));
    }
    if trimmed.contains("://") {
        return Err(AssetError::UnsupportedUri(uri.to_string()));
    }
    Ok(Path::new(trimmed).to_path_buf())
}

/// Source names must never look like hotspot markers.
fn sanitize_name(name: &str) -> String {
    if name.starts_with(HOTSPOT_PREFIX) {
        log::warn!("Source node '{}' uses the reserved hotspot prefix; renamed", name);
        format!("mesh:{name}")
    } else {
        name.to_string()
    }
}

/// A model instantiated into the scene graph.
pub struct LoadedAsset {
    pub name: String,
    /// Rotation pivot; hotspot markers hang off it.
    pub root: NodeId,
    /// Carries the normalization scale and centering offset.
    pub content: NodeId,
    pub scale: f32,
    pub index: MeshIndex,
    pub mixer: Option<AnimationMixer>,
    pub clip_names: Vec<String>,
    geometries: Vec<GeometryHandle>,
    materials: Vec<MaterialHandle>,
}

impl LoadedAsset {
    /// Builds `root → content → asset nodes` under `parent`. The content node
    /// is unnamed so hit results never report it. It scales the model so its
    /// largest dimension equals `target_size` and moves its bounds center to
    /// the origin.
    pub fn instantiate(
        scene: &mut SceneGraph,
        resources: &mut ResourceRegistry,
        parent: NodeId,
        asset: &ModelAsset,
        target_size: f32,
    ) -> Result<Self, AssetError> {
        let root = scene
            .add_child(parent, asset.name.clone(), Transform::IDENTITY)
            .ok_or(AssetError::Detached(parent))?;
        let mut loaded = Self {
            name: asset.name.clone(),
            root,
            content: root,
            scale: 1.0,
            index: MeshIndex::default(),
            mixer: None,
            clip_names: asset.clip_names(),
            geometries: Vec::new(),
            materials: Vec::new(),
        };
        match loaded.build(scene, resources, asset, target_size) {
            Ok(()) => Ok(loaded),
            Err(err) => {
                // Nothing half-built stays in the scene or the registry.
                loaded.release(scene, resources);
                Err(err)
            }
        }
    }

    fn build(
        &mut self,
        scene: &mut SceneGraph,
        resources: &mut ResourceRegistry,
        asset: &ModelAsset,
        target_size: f32,
    ) -> Result<(), AssetError> {
        let bounds = asset.bounds();
        let largest = bounds.size().max_element();
        let scale = if largest > f32::EPSILON { target_size / largest } else { 1.0 };
        let center = if bounds.is_empty() { Vec3::ZERO } else { bounds.center() };
        self.scale = scale;

        let root = self.root;
        self.content = scene
            .add_child(
                root,
                "",
                Transform {
                    translation: -center * scale,
                    rotation: Quat::IDENTITY,
                    scale: Vec3::splat(scale),
                },
            )
            .ok_or(AssetError::Detached(root))?;

        let material_handles: Vec<MaterialHandle> = asset
            .materials
            .iter()
            .map(|material| resources.create_material(material.clone()))
            .collect();
        self.materials.extend_from_slice(&material_handles);
        let mut default_material = None;
        let mut mesh_bindings: Vec<Vec<MeshBinding>> = Vec::with_capacity(asset.meshes.len());
        for mesh in &asset.meshes {
            let mut bindings = Vec::with_capacity(mesh.primitives.len());
            for primitive in &mesh.primitives {
                let geometry = resources.create_geometry(primitive.geometry.clone());
                self.geometries.push(geometry);
                let material = match primitive.material.and_then(|index| material_handles.get(index)) {
                    Some(&handle) => handle,
                    None => *default_material.get_or_insert_with(|| {
                        let handle = resources.create_material(Material::default());
                        self.materials.push(handle);
                        handle
                    }),
                };
                bindings.push(MeshBinding { geometry, material });
            }
            mesh_bindings.push(bindings);
        }

        let mut node_map: Vec<Option<NodeId>> = vec![None; asset.nodes.len()];
        let mut stack: Vec<(usize, NodeId)> = asset.roots.iter().rev().map(|&index| (index, self.content)).collect();
        while let Some((index, parent_id)) = stack.pop() {
            let Some(node) = asset.nodes.get(index) else {
                continue;
            };
            if node_map[index].is_some() {
                continue;
            }
            let mesh = match node.mesh {
                Some(mesh) => Some(
                    asset
                        .meshes
                        .get(mesh)
                        .zip(mesh_bindings.get(mesh))
                        .ok_or(AssetError::MissingMesh { node: index, mesh })?,
                ),
                None => None,
            };
            let name = match (&mesh, node.name.is_empty()) {
                (Some((source, _)), true) => sanitize_name(&source.name),
                _ => sanitize_name(&node.name),
            };
            let id = scene
                .add_child(parent_id, name, node.transform)
                .ok_or(AssetError::Detached(parent_id))?;
            node_map[index] = Some(id);

            if let Some((source, bindings)) = mesh {
                if let [binding] = bindings.as_slice() {
                    scene.set_mesh(id, *binding);
                } else {
                    for (i, binding) in bindings.iter().enumerate() {
                        let child_name = sanitize_name(&format!("{}_{}", source.name, i));
                        let child = scene
                            .add_child(id, child_name, Transform::IDENTITY)
                            .ok_or(AssetError::Detached(id))?;
                        scene.set_mesh(child, *binding);
                    }
                }
            }
            stack.extend(node.children.iter().rev().map(|&child| (child, id)));
        }

        self.index = MeshIndex::build(scene, root);
        self.mixer = asset
            .clips
            .first()
            .map(|clip| AnimationMixer::new(clip.clone(), &node_map));
        log::info!(
            "Instantiated '{}': {} meshes, {} clips, scale {:.3}",
            asset.name,
            self.index.len(),
            asset.clips.len(),
            scale
        );
        Ok(())
    }

    /// Detaches the whole model subtree (hotspot markers included) and
    /// disposes every geometry and material it created.
    pub fn release(self, scene: &mut SceneGraph, resources: &mut ResourceRegistry) -> (usize, usize) {
        let (mut geometries, mut materials) = release_subtree(scene, resources, self.root);
        geometries += self
            .geometries
            .into_iter()
            .filter(|&handle| resources.dispose_geometry(handle))
            .count();
        materials += self
            .materials
            .into_iter()
            .filter(|&handle| resources.dispose_material(handle))
            .count();
        (geometries, materials)
    }

    pub fn geometry_handles(&self) -> &[GeometryHandle] {
        &self.geometries
    }

    pub fn material_handles(&self) -> &[MaterialHandle] {
        &self.materials
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use std::path::{Path, PathBuf};

    /// Writes a unit cube glTF with a "Body" parent and two child meshes,
    /// plus a one-clip animation, to `dir`. Returns the .gltf path.
    pub fn write_body_gltf(dir: &Path, extra_node_name: Option<&str>) -> PathBuf {
        let positions: [[f32; 3]; 8] = [
            [-0.5, -0.5, -0.5],
            [0.5, -0.5, -0.5],
            [0.5, 0.5, -0.5],
            [-0.5, 0.5, -0.5],
            [-0.5, -0.5, 0.5],
            [0.5, -0.5, 0.5],
            [0.5, 0.5, 0.5],
            [-0.5, 0.5, 0.5],
        ];
        let indices: [u16; 36] = [
            0, 2, 1, 0, 3, 2, 4, 5, 6, 4, 6, 7, 0, 1, 5, 0, 5, 4, 3, 7, 6, 3, 6, 2, 0, 4, 7, 0, 7, 3, 1, 2, 6, 1,
            6, 5,
        ];
        let times: [f32; 2] = [0.0, 1.0];
        let rotations: [[f32; 4]; 2] = [[0.0, 0.0, 0.0, 1.0], [0.0, 0.7071068, 0.0, 0.7071068]];

        let mut bin = Vec::new();
        for p in positions.iter().flatten() {
            bin.extend_from_slice(&p.to_le_bytes());
        }
        for i in indices {
            bin.extend_from_slice(&i.to_le_bytes());
        }
        for t in times {
            bin.extend_from_slice(&t.to_le_bytes());
        }
        for r in rotations.iter().flatten() {
            bin.extend_from_slice(&r.to_le_bytes());
        }
        std::fs::write(dir.join("body.bin"), &bin).unwrap();

        let extra = extra_node_name.unwrap_or("Knee_R_Mesh");
        let json = serde_json::json!({
            "asset": { "version": "2.0" },
            "scene": 0,
            "scenes": [{ "nodes": [0] }],
            "nodes": [
                { "name": "Body", "children": [1, 2] },
                { "name": "Shoulder_L_Mesh", "mesh": 0, "translation": [-1.0, 1.0, 0.0] },
                { "name": extra, "mesh": 0, "translation": [1.0, -1.0, 0.0] }
            ],
            "meshes": [{
                "name": "Cube",
                "primitives": [{ "attributes": { "POSITION": 0 }, "indices": 1, "material": 0 }]
            }],
            "materials": [{
                "name": "Skin",
                "pbrMetallicRoughness": { "baseColorFactor": [0.9, 0.7, 0.6, 1.0] }
            }],
            "animations": [{
                "name": "Idle",
                "channels": [{ "sampler": 0, "target": { "node": 0, "path": "rotation" } }],
                "samplers": [{ "input": 2, "output": 3, "interpolation": "LINEAR" }]
            }],
            "buffers": [{ "uri": "body.bin", "byteLength": bin.len() }],
            "bufferViews": [
                { "buffer": 0, "byteOffset": 0, "byteLength": 96 },
                { "buffer": 0, "byteOffset": 96, "byteLength": 72 },
                { "buffer": 0, "byteOffset": 168, "byteLength": 8 },
                { "buffer": 0, "byteOffset": 176, "byteLength": 32 }
            ],
            "accessors": [
                { "bufferView": 0, "componentType": 5126, "count": 8, "type": "VEC3",
                  "min": [-0.5, -0.5, -0.5], "max": [0.5, 0.5, 0.5] },
                { "bufferView": 1, "componentType": 5123, "count": 36, "type": "SCALAR" },
                { "bufferView": 2, "componentType": 5126, "count": 2, "type": "SCALAR",
                  "min": [0.0], "max": [1.0] },
                { "bufferView": 3, "componentType": 5126, "count": 2, "type": "VEC4" }
            ]
        });
        let path = dir.join("body.gltf");
        std::fs::write(&path, serde_json::to_vec_pretty(&json).unwrap()).unwrap();
        path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load_body(extra: Option<&str>) -> (tempfile::TempDir, ModelAsset) {
        let dir = tempfile::tempdir().unwrap();
        let path = fixtures::write_body_gltf(dir.path(), extra);
        let asset = ModelAsset::from_uri(path.to_str().unwrap()).unwrap();
        (dir, asset)
    }

    #[test]
    fn parses_nodes_meshes_materials_and_clips() {
        let (_dir, asset) = load_body(None);
        assert_eq!(asset.name, "body");
        assert_eq!(asset.nodes.len(), 3);
        assert_eq!(asset.roots, vec![0]);
        assert_eq!(asset.meshes[0].primitives[0].geometry.indices.len(), 36);
        assert_eq!(asset.materials[0].name, "Skin");
        assert_eq!(asset.clip_names(), vec!["Idle".to_string()]);
        assert_eq!(asset.clips[0].duration, 1.0);
    }

    #[test]
    fn bounds_include_child_offsets() {
        let (_dir, asset) = load_body(None);
        let bounds = asset.bounds();
        assert_eq!(bounds.min, Vec3::new(-1.5, -1.5, -0.5));
        assert_eq!(bounds.max, Vec3::new(1.5, 1.5, 0.5));
    }

    #[test]
    fn instantiate_normalizes_and_indexes() {
        let (_dir, asset) = load_body(None);
        let mut scene = SceneGraph::new();
        let mut resources = ResourceRegistry::new();
        let parent = scene.root();
        let loaded = LoadedAsset::instantiate(&mut scene, &mut resources, parent, &asset, 2.0).unwrap();

        assert!((loaded.scale - 2.0 / 3.0).abs() < 1e-6);
        assert_eq!(loaded.index.len(), 2);
        assert!(loaded.mixer.is_some());
        // One geometry shared by both mesh nodes.
        assert_eq!(resources.live_geometry_count(), 1);

        scene.update_world_transforms();
        let shoulder = scene.find_by_name("Shoulder_L_Mesh").unwrap();
        let at = scene.world_matrix(shoulder).unwrap().transform_point3(Vec3::ZERO);
        assert!((at - Vec3::new(-2.0 / 3.0, 2.0 / 3.0, 0.0)).length() < 1e-5);
        let body = scene.node(shoulder).unwrap().parent().unwrap();
        assert_eq!(scene.name(body), Some("Body"));
    }

    #[test]
    fn failed_instantiate_leaves_nothing_behind() {
        let (_dir, mut asset) = load_body(None);
        let knee = asset.nodes.iter_mut().find(|node| node.name == "Knee_R_Mesh").unwrap();
        knee.mesh = Some(99);
        let mut scene = SceneGraph::new();
        let mut resources = ResourceRegistry::new();
        let parent = scene.root();

        let result = LoadedAsset::instantiate(&mut scene, &mut resources, parent, &asset, 2.0);
        assert!(matches!(result, Err(AssetError::MissingMesh { mesh: 99, .. })));
        assert!(scene.is_empty());
        assert_eq!(resources.live_geometry_count(), 0);
        assert_eq!(resources.live_material_count(), 0);
    }

    #[test]
    fn reserved_prefix_is_renamed() {
        let (_dir, asset) = load_body(Some("__hotspot__fake"));
        let mut scene = SceneGraph::new();
        let mut resources = ResourceRegistry::new();
        let parent = scene.root();
        LoadedAsset::instantiate(&mut scene, &mut resources, parent, &asset, 2.0).unwrap();
        assert!(scene.find_by_name("mesh:__hotspot__fake").is_some());
        assert!(scene.find_by_name("__hotspot__fake").is_none());
    }

    #[test]
    fn release_disposes_everything_created() {
        let (_dir, asset) = load_body(None);
        let mut scene = SceneGraph::new();
        let mut resources = ResourceRegistry::new();
        let parent = scene.root();
        let loaded = LoadedAsset::instantiate(&mut scene, &mut resources, parent, &asset, 2.0).unwrap();
        let geometry = loaded.geometry_handles()[0];
        assert_eq!(loaded.release(&mut scene, &mut resources), (1, 1));
        assert!(resources.is_geometry_disposed(geometry));
        assert!(scene.is_empty());
    }

    #[test]
    fn remote_and_missing_uris_fail() {
        assert!(matches!(
            ModelAsset::from_uri("https://example.com/body.glb"),
            Err(AssetError::UnsupportedUri(_))
        ));
        assert!(matches!(ModelAsset::from_uri(""), Err(AssetError::UnsupportedUri(_))));
        assert!(ModelAsset::from_uri("/definitely/not/here.gltf").is_err());
    }

    #[test]
    fn malformed_json_is_an_import_error() {
        assert!(matches!(
            ModelAsset::from_slice("broken", b"{ not gltf"),
            Err(AssetError::Import { .. })
        ));
    }
}
