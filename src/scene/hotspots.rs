use super::{release_subtree, NodeId, SceneGraph, Transform};
use crate::config::HotspotConfig;
use crate::render::resources::{Geometry, Material, MaterialHandle, ResourceRegistry};
use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Reserved name prefix of every marker node. Source meshes carrying it are
/// renamed at load.
pub const HOTSPOT_PREFIX: &str = "__hotspot__";

const SPHERE_RINGS: u32 = 12;
const SPHERE_SEGMENTS: u32 = 16;

/// Tap target placed relative to the normalized model origin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hotspot {
    pub id: String,
    pub position: [f32; 3],
    #[serde(default)]
    pub color: Option<[f32; 3]>,
}

impl Hotspot {
    pub fn new(id: impl Into<String>, position: [f32; 3]) -> Self {
        Self {
            id: id.into(),
            position,
            color: None,
        }
    }
}

pub fn hotspot_node_name(id: &str) -> String {
    format!("{HOTSPOT_PREFIX}{id}")
}

pub fn hotspot_id_from_name(name: &str) -> Option<&str> {
    name.strip_prefix(HOTSPOT_PREFIX)
}

struct Marker {
    id: String,
    group: NodeId,
    shell_material: MaterialHandle,
    color: [f32; 3],
}

/// Marker geometry hung off the model root. Markers own their own geometry
/// and materials and never touch the model's.
pub struct HotspotRegistry {
    config: HotspotConfig,
    markers: Vec<Marker>,
    selected: Option<String>,
}

impl HotspotRegistry {
    pub fn new(config: HotspotConfig) -> Self {
        Self {
            config,
            markers: Vec::new(),
            selected: None,
        }
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    pub fn marker_node(&self, id: &str) -> Option<NodeId> {
        self.markers
            .iter()
            .find(|marker| marker.id == id)
            .map(|marker| marker.group)
    }

    /// Replaces all markers under `model_root` with one per hotspot.
    pub fn rebuild(
        &mut self,
        scene: &mut SceneGraph,
        resources: &mut ResourceRegistry,
        model_root: NodeId,
        hotspots: &[Hotspot],
    ) {
        self.clear(scene, resources);
        for hotspot in hotspots {
            if self.markers.iter().any(|marker| marker.id == hotspot.id) {
                log::warn!("Duplicate hotspot id '{}' ignored", hotspot.id);
                continue;
            }
            if let Some(marker) = self.create_marker(scene, resources, model_root, hotspot) {
                self.markers.push(marker);
            }
        }
        let selected = self.selected.take();
        self.set_selected(scene, resources, selected.as_deref());
    }

    /// Releases every marker's nodes and resources.
    pub fn clear(&mut self, scene: &mut SceneGraph, resources: &mut ResourceRegistry) {
        for marker in self.markers.drain(..) {
            release_subtree(scene, resources, marker.group);
        }
    }

    /// Drops bookkeeping for markers whose nodes were released with the model.
    pub fn forget(&mut self) {
        self.markers.clear();
    }

    pub fn set_selected(
        &mut self,
        scene: &mut SceneGraph,
        resources: &mut ResourceRegistry,
        id: Option<&str>,
    ) {
        self.selected = id.map(str::to_string);
        for marker in &self.markers {
            let selected = self.selected.as_deref() == Some(marker.id.as_str());
            let color = if selected {
                self.config.selected_color
            } else {
                marker.color
            };
            if let Some(material) = resources.material_mut(marker.shell_material) {
                material.base_color = [color[0], color[1], color[2], self.config.shell_opacity];
                material.emissive = color;
            }
            if let Some(node) = scene.node_mut(marker.group) {
                let scale = if selected { self.config.selected_scale } else { 1.0 };
                node.transform.scale = Vec3::splat(scale);
            }
        }
    }

    fn create_marker(
        &self,
        scene: &mut SceneGraph,
        resources: &mut ResourceRegistry,
        model_root: NodeId,
        hotspot: &Hotspot,
    ) -> Option<Marker> {
        let name = hotspot_node_name(&hotspot.id);
        let position = Vec3::from_array(hotspot.position);
        if !position.is_finite() {
            log::warn!("Hotspot '{}' has a non-finite position; skipped", hotspot.id);
            return None;
        }
        let color = hotspot.color.unwrap_or(self.config.default_color);
        let group = scene.add_child(model_root, name.clone(), Transform::from_translation(position))?;

        let shell_material = resources.create_material(Material {
            name: format!("{name}/shell"),
            base_color: [color[0], color[1], color[2], self.config.shell_opacity],
            emissive: color,
            transparent: true,
        });
        let shell_geometry = resources.create_geometry(Geometry::sphere(
            self.config.shell_radius,
            SPHERE_RINGS,
            SPHERE_SEGMENTS,
        ));
        let core_material = resources.create_material(Material::opaque(format!("{name}/core"), color));
        let core_geometry = resources.create_geometry(Geometry::sphere(
            self.config.core_radius,
            SPHERE_RINGS / 2,
            SPHERE_SEGMENTS / 2,
        ));

        for (geometry, material) in [(shell_geometry, shell_material), (core_geometry, core_material)] {
            let node = scene.add_child(group, name.clone(), Transform::IDENTITY)?;
            scene.set_mesh(node, super::MeshBinding { geometry, material });
        }

        Some(Marker {
            id: hotspot.id.clone(),
            group,
            shell_material,
            color,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (SceneGraph, ResourceRegistry, NodeId, HotspotRegistry) {
        let mut scene = SceneGraph::new();
        let root = scene.add_child(scene.root(), "model", Transform::IDENTITY).unwrap();
        (scene, ResourceRegistry::new(), root, HotspotRegistry::new(HotspotConfig::default()))
    }

    #[test]
    fn markers_are_prefixed_and_positioned() {
        let (mut scene, mut resources, root, mut registry) = setup();
        registry.rebuild(
            &mut scene,
            &mut resources,
            root,
            &[Hotspot::new("elbow", [0.5, 0.0, 0.0])],
        );
        let group = registry.marker_node("elbow").unwrap();
        let node = scene.node(group).unwrap();
        assert_eq!(hotspot_id_from_name(&node.name), Some("elbow"));
        assert_eq!(node.transform.translation, Vec3::new(0.5, 0.0, 0.0));
        assert_eq!(node.children().len(), 2);
        for &child in node.children() {
            assert_eq!(scene.name(child), Some("__hotspot__elbow"));
        }
        assert_eq!(resources.live_geometry_count(), 2);
        assert_eq!(resources.live_material_count(), 2);
    }

    #[test]
    fn rebuild_releases_previous_markers() {
        let (mut scene, mut resources, root, mut registry) = setup();
        registry.rebuild(&mut scene, &mut resources, root, &[Hotspot::new("a", [0.0; 3])]);
        registry.rebuild(
            &mut scene,
            &mut resources,
            root,
            &[Hotspot::new("b", [0.0; 3]), Hotspot::new("b", [1.0; 3])],
        );
        assert_eq!(registry.len(), 1);
        assert!(registry.marker_node("a").is_none());
        assert_eq!(resources.live_geometry_count(), 2);
        assert_eq!(scene.node(root).unwrap().children().len(), 1);
    }

    #[test]
    fn selection_recolors_and_scales_marker() {
        let (mut scene, mut resources, root, mut registry) = setup();
        let mut hotspot = Hotspot::new("hip", [0.0; 3]);
        hotspot.color = Some([0.0, 1.0, 0.0]);
        registry.rebuild(&mut scene, &mut resources, root, &[hotspot]);
        registry.set_selected(&mut scene, &mut resources, Some("hip"));

        let group = registry.marker_node("hip").unwrap();
        assert_eq!(scene.node(group).unwrap().transform.scale, Vec3::splat(1.35));
        let shell = scene.node(group).unwrap().children()[0];
        let material = resources.material(scene.material_of(shell).unwrap()).unwrap();
        assert_eq!(material.emissive, HotspotConfig::default().selected_color);
        assert!(material.transparent);

        registry.set_selected(&mut scene, &mut resources, None);
        let material = resources.material(scene.material_of(shell).unwrap()).unwrap();
        assert_eq!(material.emissive, [0.0, 1.0, 0.0]);
        assert_eq!(scene.node(group).unwrap().transform.scale, Vec3::ONE);
    }

    #[test]
    fn hotspot_json_color_is_optional() {
        let hotspot: Hotspot = serde_json::from_str(r#"{ "id": "knee", "position": [0, 1, 0] }"#).unwrap();
        assert_eq!(hotspot, Hotspot::new("knee", [0.0, 1.0, 0.0]));
    }
}
