//! Scene registry and prefab composition
//!
//! [`UrhoScene`] remembers the engine path of every file written during the
//! pass, keyed by resource type and name, and the node description of every
//! exported object. The [`composer`] turns it into prefab and scene XML.

pub mod composer;
mod tree;

pub use composer::{ComposedScene, IdAllocator, FIRST_ID};
pub use tree::HierarchyTree;

use glam::{Quat, Vec3};
use hashbrown::HashMap;

use crate::assemble::UrhoModel;
use crate::config::{ExportConfig, Origin, ShapeType};
use crate::decompose::DecomposedObject;
use crate::diagnostics::Report;
use crate::paths::PathType;
use crate::source::{
    world_transform, CameraData, ComponentTree, LightData, ObjectKind, SceneSource, UserProperty,
};

/// SDBM hash of a variable name, as the engine hashes `StringHash` keys
pub fn sdbm_hash(key: &str) -> u32 {
    key.chars().fold(0u32, |hash, c| {
        (c as u32)
            .wrapping_add(hash << 6)
            .wrapping_add(hash << 16)
            .wrapping_sub(hash)
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelType {
    Static,
    Animated,
}

impl ModelType {
    pub fn component_name(self) -> &'static str {
        match self {
            ModelType::Static => "StaticModel",
            ModelType::Animated => "AnimatedModel",
        }
    }
}

/// Scene node of one decomposed object
#[derive(Debug, Clone)]
pub struct UrhoSceneModel {
    pub name: String,
    pub kind: ObjectKind,
    /// Node this one is nested in, when it is exported too
    pub parent: Option<String>,
    /// Key of the model file in the registry; `None` for nodes without geometry
    pub model: Option<String>,
    pub model_type: Option<ModelType>,
    /// Material of every geometry, in geometry order
    pub materials: Vec<Option<String>>,
    pub bounding_box: Option<(Vec3, Vec3)>,
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
    pub user_data: Vec<UserProperty>,
    pub collections: Vec<String>,
    pub light: Option<LightData>,
    pub camera: Option<CameraData>,
    pub components: Option<ComponentTree>,
    pub collision_bounds: Option<ShapeType>,
}

impl UrhoSceneModel {
    pub fn new(
        object: &DecomposedObject,
        model: Option<&UrhoModel>,
        source: &dyn SceneSource,
        config: &ExportConfig,
    ) -> Self {
        let mut node = Self {
            name: object.name.clone(),
            kind: object.kind,
            parent: None,
            model: model.map(|m| m.name.clone()),
            model_type: model.map(|m| {
                if m.is_skinned() || !m.morphs.is_empty() {
                    ModelType::Animated
                } else {
                    ModelType::Static
                }
            }),
            materials: model
                .map(|m| m.materials().map(|n| n.map(str::to_string)).collect())
                .unwrap_or_default(),
            bounding_box: model.map(|m| m.bounding_box),
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
            user_data: Vec::new(),
            collections: Vec::new(),
            light: None,
            camera: None,
            components: None,
            collision_bounds: object.physics.collision_bounds,
        };

        let Some(scene_object) = object.object_name.as_deref().and_then(|n| source.object(n)) else {
            return node;
        };

        // Armatures never become nodes; their children keep their world placement
        let parent = scene_object
            .parent
            .as_deref()
            .filter(|p| source.object(p).is_none_or(|o| o.kind != ObjectKind::Armature));
        let transform = if parent.is_none() && scene_object.parent.is_some() {
            world_transform(source, scene_object)
        } else {
            scene_object.transform
        };
        if config.transform.origin == Origin::Local {
            let converted = config.space().node_transform(&transform);
            node.position = converted.translation;
            node.rotation = converted.rotation;
            node.scale = converted.scale;
        }

        node.parent = parent.map(str::to_string);
        node.user_data = scene_object.user_data.clone();
        node.collections = scene_object.collections.clone();
        node.light = scene_object.light.clone();
        node.camera = scene_object.camera.clone();
        node.components = scene_object.components.clone();
        node
    }
}

/// Files and nodes of one export pass
#[derive(Debug, Default)]
pub struct UrhoScene {
    pub name: String,
    pub models: Vec<UrhoSceneModel>,
    files: HashMap<(PathType, String), String>,
    /// Engine path -> resource owning it
    paths: HashMap<String, (PathType, String)>,
}

impl UrhoScene {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    /// Whether `name` may still be written to the engine path `path`
    ///
    /// Names are unique per type and every engine path has one owner. Names
    /// that differ only in sanitized characters resolve to the same path, so
    /// both are checked. A clash is logged critical.
    pub fn can_register(&self, path_type: PathType, name: &str, path: &str, report: &mut Report) -> bool {
        if name.is_empty() {
            report.critical(format!("Empty name for {:?} file {}", path_type, path));
            return false;
        }
        if self.files.contains_key(&(path_type, name.to_string())) {
            report.critical(format!("{:?} {} already registered", path_type, name));
            return false;
        }
        if let Some((owner_type, owner)) = self.paths.get(path) {
            report.critical(format!(
                "{:?} {} resolves to {}, already written for {:?} {}",
                path_type, name, path, owner_type, owner
            ));
            return false;
        }
        true
    }

    /// Register the engine path of a written file
    ///
    /// A rejected registration keeps the first entry.
    pub fn add_file(&mut self, path_type: PathType, name: &str, path: &str, report: &mut Report) -> bool {
        if !self.can_register(path_type, name, path, report) {
            return false;
        }
        self.files.insert((path_type, name.to_string()), path.to_string());
        self.paths.insert(path.to_string(), (path_type, name.to_string()));
        true
    }

    pub fn find_file(&self, path_type: PathType, name: &str) -> Option<&str> {
        self.files
            .get(&(path_type, name.to_string()))
            .map(String::as_str)
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    pub fn add_model(&mut self, model: UrhoSceneModel) {
        self.models.push(model);
    }

    pub fn model(&self, name: &str) -> Option<&UrhoSceneModel> {
        self.models.iter().find(|m| m.name == name)
    }

    /// Nodes ordered parent first
    pub fn sorted_models(&self) -> Vec<&UrhoSceneModel> {
        let mut tree = HierarchyTree::new();
        for model in &self.models {
            tree.push(&model.name, model.parent.as_deref());
        }
        tree.order()
            .into_iter()
            .filter_map(|name| self.model(name))
            .collect()
    }

    /// Registered material path of every geometry of `model`
    pub fn material_paths(&self, model: &UrhoSceneModel) -> Vec<Option<String>> {
        model
            .materials
            .iter()
            .map(|m| {
                m.as_deref()
                    .and_then(|name| self.find_file(PathType::Materials, name))
                    .map(str::to_string)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::Severity;

    fn node(name: &str, parent: Option<&str>) -> UrhoSceneModel {
        UrhoSceneModel {
            name: name.to_string(),
            kind: ObjectKind::Empty,
            parent: parent.map(str::to_string),
            model: None,
            model_type: None,
            materials: Vec::new(),
            bounding_box: None,
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
            user_data: Vec::new(),
            collections: Vec::new(),
            light: None,
            camera: None,
            components: None,
            collision_bounds: None,
        }
    }

    #[test]
    fn test_sdbm_hash() {
        assert_eq!(sdbm_hash(""), 0);
        assert_eq!(sdbm_hash("a"), 97);
        assert_eq!(sdbm_hash("ab"), 98u32.wrapping_add(97 << 6).wrapping_add(97 << 16).wrapping_sub(97));
        assert_ne!(sdbm_hash("Speed"), sdbm_hash("speed"));
    }

    #[test]
    fn test_duplicate_registration_keeps_first() {
        let mut scene = UrhoScene::new("Scene");
        let mut report = Report::new();
        assert!(scene.add_file(PathType::Models, "Box", "Models/Box.mdl", &mut report));
        assert!(!scene.add_file(PathType::Models, "Box", "Models/Other.mdl", &mut report));
        assert_eq!(scene.find_file(PathType::Models, "Box"), Some("Models/Box.mdl"));
        assert_eq!(report.count(Severity::Critical), 1);

        // Same name, different type
        assert!(scene.add_file(PathType::Materials, "Box", "Materials/Box.xml", &mut report));
        assert!(!scene.add_file(PathType::Objects, "", "Objects/.xml", &mut report));
        assert_eq!(scene.file_count(), 2);
    }

    #[test]
    fn test_sanitized_names_share_one_path() {
        let mut scene = UrhoScene::new("Scene");
        let mut report = Report::new();
        assert!(scene.add_file(PathType::Models, "Rock:1", "Models/Rock_1.mdl", &mut report));
        assert!(!scene.can_register(PathType::Models, "Rock*1", "Models/Rock_1.mdl", &mut report));
        assert!(!scene.add_file(PathType::Models, "Rock*1", "Models/Rock_1.mdl", &mut report));
        assert_eq!(scene.find_file(PathType::Models, "Rock*1"), None);
        assert_eq!(scene.file_count(), 1);
        assert_eq!(report.count(Severity::Critical), 2);
    }

    #[test]
    fn test_sorted_models_parent_first() {
        let mut scene = UrhoScene::new("Scene");
        scene.add_model(node("Box", Some("Ball")));
        scene.add_model(node("Ball", None));
        let names: Vec<&str> = scene.sorted_models().iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["Ball", "Box"]);
    }

    #[test]
    fn test_material_paths() {
        let mut scene = UrhoScene::new("Scene");
        let mut report = Report::new();
        scene.add_file(PathType::Materials, "Stone", "Materials/Stone.xml", &mut report);
        let mut model = node("Box", None);
        model.materials = vec![Some("Stone".to_string()), Some("Lost".to_string()), None];
        assert_eq!(
            scene.material_paths(&model),
            vec![Some("Materials/Stone.xml".to_string()), None, None]
        );
    }
}
