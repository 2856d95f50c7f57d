//! Prefab and scene XML
//!
//! ```text
//! <scene id>                        scene prefab only
//!     <component type="Octree" />
//!     <component type="DebugRenderer" />
//!     <component type="Light" />    directional
//!     <component type="PhysicsWorld" />
//!     <node id>                     collective root, named after the scene
//!         <attribute name="Name" />
//!         <node id>                 one per exported object, nested by parent
//!             <attribute name="Position|Rotation|Scale|Variables|Tags" />
//!             <component type="StaticModel|AnimatedModel|RigidBody|..." />
//!         </node>
//!     </node>
//! </scene>
//! ```
//!
//! Every `id` comes from one [`IdAllocator`], so they are unique within each
//! document written from the tree.

use std::path::PathBuf;

use hashbrown::HashMap;

use crate::config::{ExportConfig, PhysicsMode, ShapeType};
use crate::diagnostics::Report;
use crate::paths::{check_writable, FileOptions, PathType};
use crate::source::{AttributeValue, LightKind};
use crate::xml::{fmt_f32, fmt_quat, fmt_vec3, NodeId, XmlDocument};

use super::{sdbm_hash, UrhoScene, UrhoSceneModel};

/// First node/component ID; the per-pass offset is added to it
pub const FIRST_ID: u32 = 0x100_0000;

const ZONE_BOUNDS: &str = "-2000 -2000 -2000 2000 2000 2000";

/// Monotonic node and component IDs
#[derive(Debug, Clone)]
pub struct IdAllocator {
    next: u32,
}

impl IdAllocator {
    /// Counter starting at [`FIRST_ID`] plus an offset taken from `seed`,
    /// or a random one
    pub fn new(seed: Option<u32>) -> Self {
        let seed = seed.unwrap_or_else(rand::random);
        Self {
            next: FIRST_ID + (seed & 0xFF_FFFF),
        }
    }

    pub fn next_id(&mut self) -> u32 {
        let id = self.next;
        self.next = self.next.wrapping_add(1);
        id
    }
}

/// Node tree of one pass, ready to be written
pub struct ComposedScene {
    pub doc: XmlDocument,
    /// `<scene>` element when a scene prefab is built
    pub scene_root: Option<NodeId>,
    /// Collective root `<node>`
    pub root: NodeId,
    /// Element of every exported object, in emission order
    pub nodes: Vec<(String, NodeId)>,
}

struct Composer<'a> {
    scene: &'a UrhoScene,
    config: &'a ExportConfig,
    files: &'a FileOptions,
    ids: &'a mut IdAllocator,
    doc: XmlDocument,
}

impl Composer<'_> {
    fn component(&mut self, parent: NodeId, type_name: &str) -> NodeId {
        let id = self.ids.next_id();
        let component = self.doc.add_child(parent, "component");
        self.doc.set_attribute(component, "type", type_name);
        self.doc.set_attribute(component, "id", id.to_string());
        component
    }

    fn node(&mut self, parent: NodeId, name: &str) -> NodeId {
        let id = self.ids.next_id();
        let node = self.doc.add_child(parent, "node");
        self.doc.set_attribute(node, "id", id.to_string());
        self.attribute(node, "Name", name);
        node
    }

    fn attribute(&mut self, parent: NodeId, name: &str, value: impl Into<String>) -> NodeId {
        let attribute = self.doc.add_child(parent, "attribute");
        self.doc.set_attribute(attribute, "name", name);
        self.doc.set_attribute(attribute, "value", value);
        attribute
    }

    fn model_path(&self, model: &UrhoSceneModel) -> String {
        model
            .model
            .as_deref()
            .and_then(|m| self.scene.find_file(PathType::Models, m))
            .unwrap_or_default()
            .to_string()
    }

    fn material_value(&self, model: &UrhoSceneModel) -> String {
        let mut value = String::from("Material");
        for path in self.scene.material_paths(model) {
            value.push(';');
            value.push_str(path.as_deref().unwrap_or_default());
        }
        value
    }

    fn scaffolding(&mut self, scene_root: NodeId) {
        self.component(scene_root, "Octree");
        self.component(scene_root, "DebugRenderer");
        let light = self.component(scene_root, "Light");
        self.attribute(light, "Light Type", "Directional");
        if self.config.scene.physics != PhysicsMode::Disabled {
            self.component(scene_root, "PhysicsWorld");
        }
        if let Some(render_path) = &self.config.scene.render_path {
            let variables = self.doc.add_child(scene_root, "attribute");
            self.doc.set_attribute(variables, "name", "Variables");
            let variant = self.doc.add_child(variables, "variant");
            self.doc.set_attribute(variant, "hash", sdbm_hash("RenderPath").to_string());
            self.doc.set_attribute(variant, "type", "String");
            self.doc.set_attribute(variant, "value", render_path.as_str());
        }
        if self.config.scene.create_zone {
            let zone_node = self.node(scene_root, "DefaultZone");
            let zone = self.component(zone_node, "Zone");
            self.attribute(zone, "Bounding Box", ZONE_BOUNDS);
        }
    }

    fn rigid_body(&mut self, node: NodeId) {
        let body = self.component(node, "RigidBody");
        self.attribute(body, "Collision Layer", "2");
        self.attribute(body, "Use Gravity", "false");
    }

    fn global_physics(&mut self, root: NodeId) {
        self.rigid_body(root);
        let shape = self.component(root, "CollisionShape");
        self.attribute(shape, "Shape Type", ShapeType::TriangleMesh.engine_name());
        let physics_model = self.files.resolve(PathType::Models, "Physics").relative;
        self.attribute(shape, "Model", format!("Model;{}", physics_model));
    }

    fn individual_physics(&mut self, node: NodeId, model: &UrhoSceneModel) {
        let mut shape_type = self.config.scene.shape;
        if !self.config.geometry.merge_objects {
            if let Some(bounds) = model.collision_bounds {
                shape_type = bounds;
            }
        }
        self.rigid_body(node);
        let shape = self.component(node, "CollisionShape");
        self.attribute(shape, "Shape Type", shape_type.engine_name());
        if shape_type == ShapeType::TriangleMesh {
            let path = self.model_path(model);
            self.attribute(shape, "Model", format!("Model;{}", path));
        } else {
            let (min, max) = model.bounding_box.unwrap_or_default();
            let size = max - min;
            self.attribute(shape, "Size", fmt_vec3(size));
            self.attribute(shape, "Offset Position", fmt_vec3(max - size / 2.0));
        }
    }

    fn user_data(&mut self, node: NodeId, model: &UrhoSceneModel) {
        let mut tags: Vec<String> = Vec::new();
        let mut variables = None;
        for property in &model.user_data {
            if property.key.eq_ignore_ascii_case("tag") {
                tags.extend(
                    property
                        .value
                        .split(',')
                        .map(str::trim)
                        .filter(|t| !t.is_empty())
                        .map(str::to_string),
                );
                continue;
            }
            let parent = *variables.get_or_insert_with(|| {
                let element = self.doc.add_child(node, "attribute");
                self.doc.set_attribute(element, "name", "Variables");
                element
            });
            let variant = self.doc.add_child(parent, "variant");
            self.doc.set_attribute(variant, "hash", sdbm_hash(&property.key).to_string());
            self.doc.set_attribute(variant, "type", "String");
            self.doc.set_attribute(variant, "value", property.value.as_str());
        }
        if self.config.scene.collections_as_tags {
            tags.extend(model.collections.iter().cloned());
        }
        if tags.is_empty() {
            return;
        }
        let element = self.doc.add_child(node, "attribute");
        self.doc.set_attribute(element, "name", "Tags");
        for tag in tags {
            let string = self.doc.add_child(element, "string");
            self.doc.set_attribute(string, "value", tag);
        }
    }

    fn custom_components(&mut self, node: NodeId, model: &UrhoSceneModel) {
        let Some(tree) = &model.components else {
            return;
        };
        for desc in &tree.components {
            let component = self.component(node, &desc.type_name);
            for attribute in &desc.attributes {
                let value = match &attribute.value {
                    AttributeValue::Text(text) => text.clone(),
                    AttributeValue::Number(n) => fmt_f32(*n),
                    AttributeValue::Bool(b) => b.to_string(),
                    AttributeValue::Vector(v) => v
                        .split(|c: char| matches!(c, '(' | ')' | ',') || c.is_whitespace())
                        .filter(|s| !s.is_empty())
                        .collect::<Vec<_>>()
                        .join(" "),
                    AttributeValue::ModelRef => format!("Model;{}", self.model_path(model)),
                    AttributeValue::MaterialRef => self.material_value(model),
                };
                self.attribute(component, &attribute.name, value);
            }
        }
    }

    fn light(&mut self, node: NodeId, model: &UrhoSceneModel) {
        let Some(light) = &model.light else {
            return;
        };
        let component = self.component(node, "Light");
        let kind = match light.kind {
            LightKind::Point => "Point",
            LightKind::Spot => "Spot",
            LightKind::Directional => "Directional",
        };
        self.attribute(component, "Light Type", kind);
        let [r, g, b] = light.color;
        self.attribute(
            component,
            "Color",
            format!("{} {} {} 1", fmt_f32(r), fmt_f32(g), fmt_f32(b)),
        );
        self.attribute(component, "Brightness Multiplier", fmt_f32(light.energy));
        if light.kind != LightKind::Directional {
            self.attribute(component, "Range", fmt_f32(light.range * self.config.transform.scale));
        }
        if light.kind == LightKind::Spot {
            self.attribute(component, "Spot FOV", fmt_f32(light.spot_angle));
        }
    }

    fn camera(&mut self, node: NodeId, model: &UrhoSceneModel) {
        let Some(camera) = &model.camera else {
            return;
        };
        let component = self.component(node, "Camera");
        self.attribute(component, "Near Clip", fmt_f32(camera.near));
        self.attribute(component, "Far Clip", fmt_f32(camera.far));
        self.attribute(component, "FOV", fmt_f32(camera.fov));
        if camera.orthographic {
            self.attribute(component, "Orthographic", "true");
            self.attribute(component, "Orthographic Size", fmt_f32(camera.ortho_size));
        }
    }

    fn object_node(&mut self, parent: NodeId, model: &UrhoSceneModel) -> NodeId {
        let node = self.node(parent, &model.name);
        if self.config.scene.transforms {
            self.attribute(node, "Position", fmt_vec3(model.position));
            self.attribute(node, "Rotation", fmt_quat(model.rotation));
            self.attribute(node, "Scale", fmt_vec3(model.scale));
        }
        if self.config.scene.user_data {
            self.user_data(node, model);
        }

        if model.components.is_some() {
            self.custom_components(node, model);
            return node;
        }
        if let Some(model_type) = model.model_type {
            let component = self.component(node, model_type.component_name());
            let model_path = self.model_path(model);
            self.attribute(component, "Model", format!("Model;{}", model_path));
            let materials = self.material_value(model);
            self.attribute(component, "Material", materials);
            if self.config.scene.physics == PhysicsMode::Individual {
                self.individual_physics(node, model);
            }
        }
        self.light(node, model);
        self.camera(node, model);
        node
    }
}

/// Build the node tree of every exported object
///
/// Objects whose parent has no element yet (missing from the export set,
/// or part of a parent cycle) are logged and placed under the root.
pub fn compose(
    scene: &UrhoScene,
    config: &ExportConfig,
    files: &FileOptions,
    ids: &mut IdAllocator,
    report: &mut Report,
) -> ComposedScene {
    let mut composer = Composer {
        scene,
        config,
        files,
        ids,
        doc: XmlDocument::new(),
    };

    let scene_root = if config.scene.scene_prefab {
        let id = composer.ids.next_id();
        let element = composer.doc.create_element("scene");
        composer.doc.set_attribute(element, "id", id.to_string());
        composer.scaffolding(element);
        Some(element)
    } else {
        None
    };

    let root = match scene_root {
        Some(scene_root) => composer.node(scene_root, &scene.name),
        None => {
            let id = composer.ids.next_id();
            let element = composer.doc.create_element("node");
            composer.doc.set_attribute(element, "id", id.to_string());
            composer.attribute(element, "Name", &scene.name);
            element
        }
    };
    if config.scene.physics == PhysicsMode::Global {
        composer.global_physics(root);
    }

    let mut elements: HashMap<&str, NodeId> = HashMap::new();
    let mut nodes = Vec::new();
    for model in scene.sorted_models() {
        let parent = match model.parent.as_deref() {
            Some(parent) => match elements.get(parent) {
                Some(&element) => element,
                None => {
                    report.critical(format!(
                        "Parent {} of {} is not exported, placing it under the root",
                        parent, model.name
                    ));
                    root
                }
            },
            None => root,
        };
        let node = composer.object_node(parent, model);
        elements.insert(model.name.as_str(), node);
        nodes.push((model.name.clone(), node));
    }

    ComposedScene {
        doc: composer.doc,
        scene_root,
        root,
        nodes,
    }
}

impl ComposedScene {
    /// Write the subtree at `node` unless the registry already owns its name or path
    fn write(
        &self,
        node: NodeId,
        path_type: PathType,
        name: &str,
        scene: &UrhoScene,
        files: &FileOptions,
        report: &mut Report,
    ) -> Option<(String, PathBuf)> {
        let resolved = files.resolve(path_type, name);
        if !scene.can_register(path_type, name, &resolved.relative, report) {
            return None;
        }
        if !check_writable(&resolved.full, files.overwrite, report) {
            return None;
        }
        match self.doc.write_file(node, &resolved.full) {
            Ok(()) => Some((resolved.relative, resolved.full)),
            Err(e) => {
                report.error(format!("{:#}", e));
                None
            }
        }
    }

    /// Write the requested prefab variants and register them
    ///
    /// Returns the files written. Individual prefabs are written from the
    /// complete tree so they include nested children. When objects are
    /// merged only the scene prefab is written.
    pub fn write_prefabs(
        &self,
        scene: &mut UrhoScene,
        config: &ExportConfig,
        files: &FileOptions,
        report: &mut Report,
    ) -> Vec<PathBuf> {
        let settings = &config.scene;
        let merged = config.geometry.merge_objects;
        let mut written = Vec::new();

        if settings.individual_prefab && !merged {
            for (name, node) in &self.nodes {
                if settings.only_root_objects && self.doc.parent(*node) != Some(self.root) {
                    continue;
                }
                if let Some((relative, full)) = self.write(*node, PathType::Objects, name, scene, files, report) {
                    tracing::info!("Created prefab {}", relative);
                    scene.add_file(PathType::Objects, name, &relative, report);
                    written.push(full);
                }
            }
        }

        if settings.collective_prefab && !merged {
            let name = scene.name.clone();
            if let Some((relative, full)) = self.write(self.root, PathType::Objects, &name, scene, files, report) {
                tracing::info!("Created collective prefab {}", relative);
                scene.add_file(PathType::Objects, &name, &relative, report);
                written.push(full);
            }
        }

        if let Some(scene_root) = self.scene_root {
            let name = scene.name.clone();
            if let Some((relative, full)) = self.write(scene_root, PathType::Scenes, &name, scene, files, report) {
                tracing::info!("Created scene prefab {}", relative);
                scene.add_file(PathType::Scenes, &name, &relative, report);
                written.push(full);
            }
        }
        written
    }
}
