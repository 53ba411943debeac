//! Selection highlighting by material swap.
//!
//! Logical body-region names ("Shoulder") are matched case-insensitively as a
//! substring of live mesh names ("Shoulder_L_Mesh"). Every match gets the shared
//! highlight material; the material it had before the first swap is recorded
//! and put back when the highlight moves or is cleared.

use super::{NodeId, SceneGraph};
use crate::render::resources::MaterialHandle;
use std::collections::HashMap;

#[derive(Debug, Clone)]
struct MeshEntry {
    node: NodeId,
    name: String,
    lowercase: String,
}

/// Mesh names of one loaded model, indexed once at load time.
#[derive(Debug, Clone, Default)]
pub struct MeshIndex {
    entries: Vec<MeshEntry>,
}

impl MeshIndex {
    pub fn build(scene: &SceneGraph, root: NodeId) -> Self {
        let entries = scene
            .descendants(root)
            .into_iter()
            .filter_map(|id| {
                let node = scene.node(id)?;
                node.mesh?;
                Some(MeshEntry {
                    node: id,
                    name: node.name.clone(),
                    lowercase: node.name.to_lowercase(),
                })
            })
            .collect();
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.name.as_str())
    }

    /// Nodes whose name contains `query`, ignoring case.
    pub fn matching(&self, query: &str) -> Vec<NodeId> {
        let needle = query.to_lowercase();
        self.entries
            .iter()
            .filter(|entry| entry.lowercase.contains(&needle))
            .map(|entry| entry.node)
            .collect()
    }
}

pub struct HighlightController {
    material: MaterialHandle,
    target: Option<String>,
    highlighted: Vec<NodeId>,
    originals: HashMap<NodeId, MaterialHandle>,
}

impl HighlightController {
    pub fn new(material: MaterialHandle) -> Self {
        Self {
            material,
            target: None,
            highlighted: Vec::new(),
            originals: HashMap::new(),
        }
    }

    pub fn material(&self) -> MaterialHandle {
        self.material
    }

    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    pub fn highlighted(&self) -> &[NodeId] {
        &self.highlighted
    }

    pub fn original_material(&self, node: NodeId) -> Option<MaterialHandle> {
        self.originals.get(&node).copied()
    }

    /// Moves the highlight to every mesh matching `target`, or clears it.
    /// An empty or blank target clears. Returns the number of meshes lit.
    pub fn set_highlight(
        &mut self,
        scene: &mut SceneGraph,
        index: &MeshIndex,
        target: Option<&str>,
    ) -> usize {
        self.clear(scene);
        let Some(target) = target.map(str::trim).filter(|name| !name.is_empty()) else {
            return 0;
        };
        let matches = index.matching(target);
        for &node in &matches {
            let Some(current) = scene.material_of(node) else {
                continue;
            };
            // Never record the highlight material itself as an original.
            if current != self.material {
                self.originals.entry(node).or_insert(current);
            }
            scene.set_material(node, self.material);
            self.highlighted.push(node);
        }
        if matches.is_empty() {
            log::debug!("No mesh matches highlight target '{}'", target);
        }
        self.target = Some(target.to_string());
        self.highlighted.len()
    }

    /// Restores the recorded material of every highlighted mesh.
    pub fn clear(&mut self, scene: &mut SceneGraph) {
        for node in self.highlighted.drain(..) {
            if let Some(&original) = self.originals.get(&node) {
                scene.set_material(node, original);
            }
        }
        self.target = None;
    }

    /// Restores materials and forgets every record. Called before the model
    /// these records belong to is released.
    pub fn release(&mut self, scene: &mut SceneGraph) {
        self.clear(scene);
        self.originals.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::resources::{Geometry, Material, ResourceRegistry};
    use crate::scene::{MeshBinding, Transform};

    struct Fixture {
        scene: SceneGraph,
        resources: ResourceRegistry,
        index: MeshIndex,
        highlight: HighlightController,
        shoulder_l: NodeId,
        shoulder_r: NodeId,
        knee: NodeId,
    }

    fn fixture() -> Fixture {
        let mut scene = SceneGraph::new();
        let mut resources = ResourceRegistry::new();
        let geometry = resources.create_geometry(Geometry::sphere(0.5, 4, 4));
        let skin = resources.create_material(Material::opaque("skin", [0.9, 0.7, 0.6]));
        let muscle = resources.create_material(Material::opaque("muscle", [0.8, 0.2, 0.2]));
        let highlight_material = resources.create_material(Material::opaque("highlight", [1.0, 0.4, 0.2]));
        let body = scene.add_child(scene.root(), "Body", Transform::IDENTITY).unwrap();
        let mut mesh = |name: &str, material| {
            let id = scene.add_child(body, name, Transform::IDENTITY).unwrap();
            scene.set_mesh(id, MeshBinding { geometry, material });
            id
        };
        let shoulder_l = mesh("Shoulder_L_Mesh", skin);
        let shoulder_r = mesh("shoulder_R_mesh", muscle);
        let knee = mesh("Knee_Mesh10", skin);
        let index = MeshIndex::build(&scene, body);
        Fixture {
            scene,
            resources,
            index,
            highlight: HighlightController::new(highlight_material),
            shoulder_l,
            shoulder_r,
            knee,
        }
    }

    #[test]
    fn index_skips_nodes_without_meshes() {
        let f = fixture();
        assert_eq!(f.index.len(), 3);
        assert!(!f.index.names().any(|name| name == "Body"));
    }

    #[test]
    fn substring_match_is_case_insensitive_and_fans_out() {
        let mut f = fixture();
        let lit = f.highlight.set_highlight(&mut f.scene, &f.index, Some("SHOULDER"));
        assert_eq!(lit, 2);
        let material = f.highlight.material();
        assert_eq!(f.scene.material_of(f.shoulder_l), Some(material));
        assert_eq!(f.scene.material_of(f.shoulder_r), Some(material));
        assert_ne!(f.scene.material_of(f.knee), Some(material));
        assert_eq!(f.highlight.target(), Some("SHOULDER"));
        assert!(f.resources.material(material).is_some());
    }

    #[test]
    fn highlight_then_clear_restores_original() {
        let mut f = fixture();
        let before = f.scene.material_of(f.knee);
        f.highlight.set_highlight(&mut f.scene, &f.index, Some("knee"));
        assert_ne!(f.scene.material_of(f.knee), before);
        f.highlight.set_highlight(&mut f.scene, &f.index, None);
        assert_eq!(f.scene.material_of(f.knee), before);
        assert!(f.highlight.highlighted().is_empty());
    }

    #[test]
    fn repeated_highlight_does_not_capture_highlight_material() {
        let mut f = fixture();
        let before = f.scene.material_of(f.shoulder_l).unwrap();
        f.highlight.set_highlight(&mut f.scene, &f.index, Some("Shoulder_L"));
        let once = f.scene.material_of(f.shoulder_l);
        f.highlight.set_highlight(&mut f.scene, &f.index, Some("Shoulder_L"));
        assert_eq!(f.scene.material_of(f.shoulder_l), once);
        assert_eq!(f.highlight.original_material(f.shoulder_l), Some(before));
        f.highlight.clear(&mut f.scene);
        assert_eq!(f.scene.material_of(f.shoulder_l), Some(before));
    }

    #[test]
    fn moving_target_restores_previous_meshes() {
        let mut f = fixture();
        let shoulder_before = f.scene.material_of(f.shoulder_r);
        f.highlight.set_highlight(&mut f.scene, &f.index, Some("shoulder_r"));
        f.highlight.set_highlight(&mut f.scene, &f.index, Some("knee"));
        assert_eq!(f.scene.material_of(f.shoulder_r), shoulder_before);
        assert_eq!(f.highlight.highlighted(), &[f.knee]);
    }

    #[test]
    fn blank_target_clears() {
        let mut f = fixture();
        f.highlight.set_highlight(&mut f.scene, &f.index, Some("knee"));
        assert_eq!(f.highlight.set_highlight(&mut f.scene, &f.index, Some("  ")), 0);
        assert!(f.highlight.target().is_none());
    }

    #[test]
    fn release_forgets_records() {
        let mut f = fixture();
        f.highlight.set_highlight(&mut f.scene, &f.index, Some("knee"));
        f.highlight.release(&mut f.scene);
        assert!(f.highlight.original_material(f.knee).is_none());
        assert!(f.highlight.highlighted().is_empty());
    }
}
