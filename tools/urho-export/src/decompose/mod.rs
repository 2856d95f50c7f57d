//! Scene decomposition
//!
//! Walks the filtered scene and produces [`DecomposedObject`]s: flattened
//! vertex/triangle data per material, bones, morphs and animations, all in
//! engine space. Objects are grouped into one record when they are LOD
//! levels of the same model or when merging is enabled.

mod animation;
mod lod;
mod mesh;
mod morph;
mod skeleton;
mod tangent;

pub use lod::{lod_proxy_name, parse_lod_name, LodProxies};
pub use skeleton::{extract_skeleton, SkeletonData};
pub use tangent::generate_tangents;

use glam::{Quat, Vec2, Vec3, Vec4};
use hashbrown::HashSet;
use smallvec::SmallVec;
use std::borrow::Cow;

use crate::config::{ExportConfig, MeshNameSource, Origin, Selection, ShapeType};
use crate::export::ExportContext;
use crate::source::{modifiers::apply_modifiers, world_transform, ObjectKind, SceneObject, SceneSource};

/// Bone influences of a vertex, `(bone index, weight)`
pub type Influences = SmallVec<[(u32, f32); 4]>;

/// One export vertex; fields outside the object's element mask are zero
#[derive(Debug, Clone, PartialEq)]
pub struct TVertex {
    /// Vertex index in the source mesh
    pub source_index: u32,
    pub position: Vec3,
    pub normal: Vec3,
    pub color: Vec4,
    pub uv: Vec2,
    pub uv2: Vec2,
    pub tangent: Vec4,
    pub weights: Influences,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TLod {
    pub distance: f32,
    /// Indices into the object's vertex list
    pub triangles: Vec<[u32; 3]>,
}

/// Triangles of one material, per LOD level
#[derive(Debug, Clone, PartialEq)]
pub struct TGeometry {
    pub material: Option<String>,
    pub lods: Vec<TLod>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TBone {
    pub name: String,
    pub parent: Option<usize>,
    /// Rest transform relative to the parent bone (model space for roots)
    pub local: crate::math::Transform,
    /// Rest transform in model space
    pub bind: crate::math::Transform,
    pub length: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MorphDelta {
    pub position: Vec3,
    pub normal: Vec3,
    pub tangent: Vec3,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TMorph {
    pub name: String,
    /// Deltas keyed by vertex index, ascending
    pub deltas: Vec<(u32, MorphDelta)>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TKeyframe {
    pub time: f32,
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TTrack {
    pub name: String,
    pub keyframes: Vec<TKeyframe>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TTrigger {
    pub name: String,
    /// Seconds from the start
    pub time: f32,
    /// Position in the clip, 0..1
    pub normalized: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TAnimation {
    pub name: String,
    pub length: f32,
    pub tracks: Vec<TTrack>,
    pub triggers: Vec<TTrigger>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhysicsSettings {
    pub shape: ShapeType,
    /// Per-object shape override
    pub collision_bounds: Option<ShapeType>,
}

/// Flattened export unit built from one or more scene objects
#[derive(Debug, Clone)]
pub struct DecomposedObject {
    /// Model and scene node name
    pub name: String,
    /// Scene object supplying transform, parent and extras
    pub object_name: Option<String>,
    /// Name of the model file; objects sharing mesh data share it
    pub mesh_name: String,
    pub kind: ObjectKind,
    /// Element mask every vertex carries
    pub elements: u32,
    pub vertices: Vec<TVertex>,
    pub geometries: Vec<TGeometry>,
    pub bones: Vec<TBone>,
    pub morphs: Vec<TMorph>,
    pub animations: Vec<TAnimation>,
    pub physics: PhysicsSettings,
}

impl DecomposedObject {
    fn empty(object: &SceneObject, kind: ObjectKind, config: &ExportConfig) -> Self {
        Self {
            name: object.name.clone(),
            object_name: Some(object.name.clone()),
            mesh_name: object.name.clone(),
            kind,
            elements: 0,
            vertices: Vec::new(),
            geometries: Vec::new(),
            bones: Vec::new(),
            morphs: Vec::new(),
            animations: Vec::new(),
            physics: PhysicsSettings {
                shape: config.scene.shape,
                collision_bounds: object.collision_bounds,
            },
        }
    }

    /// No geometry: becomes a plain scene node
    pub fn is_empty(&self) -> bool {
        self.geometries.is_empty()
    }

    pub fn has_lods(&self) -> bool {
        self.geometries.iter().any(|g| g.lods.len() > 1)
    }
}

/// Objects passing the selection and visibility filters, in scene order
pub fn filter_objects<'a>(source: &'a dyn SceneSource, config: &ExportConfig) -> Vec<&'a SceneObject> {
    source
        .objects()
        .iter()
        .filter(|o| config.source.selection == Selection::All || o.selected)
        .filter(|o| !(config.source.ignore_hidden && o.hidden))
        .collect()
}

enum Slot {
    Single(DecomposedObject),
    Group(usize),
}

/// Decompose every exported object of the scene
pub fn decompose(ctx: &mut ExportContext<'_>, source: &dyn SceneSource) -> Vec<DecomposedObject> {
    let config = ctx.config;
    let objects = filter_objects(source, config);
    let proxies = if config.geometry.lods {
        LodProxies::build(source, ctx)
    } else {
        LodProxies::default()
    };

    let mut slots: Vec<Slot> = Vec::new();
    let mut groups: Vec<mesh::GroupBuilder> = Vec::new();
    let mut animated_armatures: HashSet<String> = HashSet::new();

    for object in objects.iter().copied().chain(proxies.objects()) {
        let is_proxy = proxies.contains(&object.name);
        let kind = export_kind(object, config);
        let Some(kind) = kind else {
            tracing::debug!("Skipping {} ({:?})", object.name, object.kind);
            continue;
        };

        if kind != ObjectKind::Mesh {
            let mut record = DecomposedObject::empty(object, kind, config);
            if config.animation.objects {
                record.animations = animation::extract_object_animations(ctx, source, object);
            }
            slots.push(Slot::Single(record));
            continue;
        }

        let Some(mesh_name) = object.mesh.as_deref() else {
            ctx.report.warning(format!("Mesh object {} has no mesh data", object.name));
            continue;
        };
        let Some(mesh) = source.mesh(mesh_name) else {
            ctx.report.error(format!("Mesh {} of {} not found", mesh_name, object.name));
            continue;
        };
        let mesh = if config.transform.apply_modifiers || is_proxy {
            apply_modifiers(mesh, &object.modifiers, config.transform.modifier_resolution)
        } else {
            Cow::Borrowed(mesh)
        };

        let armature_name = if config.skeleton.enabled {
            object.skin_armature(config.skeleton.parent_bone_skinning)
        } else {
            None
        };
        let skeleton = armature_name.and_then(|name| {
            let armature = source.armature(name);
            if armature.is_none() {
                ctx.report.warning(format!("Armature {} of {} not found", name, object.name));
            }
            let armature_object = source.object(name);
            armature.map(|a| extract_skeleton(a, armature_object, source, config, &mut ctx.report))
        });

        let world = match config.transform.origin {
            Origin::Global => Some(world_transform(source, object)),
            Origin::Local => None,
        };
        let Some(part) = mesh::extract_mesh(ctx, object, &mesh, skeleton.as_ref(), world.as_ref())
        else {
            ctx.report.warning(format!("Object {} has no polygons", object.name));
            continue;
        };

        let mut animations = Vec::new();
        if config.animation.enabled {
            if let (Some(name), Some(skeleton)) = (armature_name, skeleton.as_ref()) {
                if animated_armatures.insert(name.to_string()) {
                    if let Some(armature_object) = source.object(name) {
                        animations = animation::extract_bone_animations(
                            ctx,
                            source,
                            armature_object,
                            skeleton,
                        );
                    }
                }
            }
        } else if config.animation.objects && !is_proxy {
            animations = animation::extract_object_animations(ctx, source, object);
        }

        let (key, distance) = group_key(object, source, config);
        let index = match groups.iter().position(|g| g.key == key) {
            Some(index) => index,
            None => {
                let mesh_name = match config.geometry.mesh_name_from {
                    MeshNameSource::Mesh
                        if !config.geometry.merge_objects
                            && config.transform.origin == Origin::Local
                            && key == object.name =>
                    {
                        mesh_name.to_string()
                    }
                    _ => key.clone(),
                };
                groups.push(mesh::GroupBuilder::new(key.clone(), mesh_name, config));
                slots.push(Slot::Group(groups.len() - 1));
                groups.len() - 1
            }
        };
        let group = &mut groups[index];
        if group.object_name.is_none() && !is_proxy && !config.geometry.merge_objects {
            group.object_name = Some(object.name.clone());
            group.collision_bounds = object.collision_bounds;
        }
        if is_proxy && group.object_name.is_none() {
            group.object_name = proxies.anchor(&object.name).map(str::to_string);
        }
        group.add_part(part, distance, &mut ctx.report);
        group.animations.extend(animations);
    }

    let mut groups: Vec<Option<mesh::GroupBuilder>> = groups.into_iter().map(Some).collect();
    slots
        .into_iter()
        .filter_map(|slot| match slot {
            Slot::Single(record) => Some(record),
            Slot::Group(index) => groups[index].take().map(|g| g.finish()),
        })
        .collect()
}

/// How an object is exported, `None` when it is not
fn export_kind(object: &SceneObject, config: &ExportConfig) -> Option<ObjectKind> {
    match object.kind {
        ObjectKind::Mesh if config.source.wired_as_empty && object.display_wire => {
            Some(ObjectKind::Empty)
        }
        ObjectKind::Mesh if !config.geometry.enabled => Some(ObjectKind::Empty),
        ObjectKind::Mesh | ObjectKind::Empty | ObjectKind::Light | ObjectKind::Camera => {
            Some(object.kind)
        }
        ObjectKind::Armature | ObjectKind::Other => None,
    }
}

/// Group name and LOD distance of a mesh object
fn group_key(object: &SceneObject, source: &dyn SceneSource, config: &ExportConfig) -> (String, f32) {
    let parsed = if config.geometry.lods {
        parse_lod_name(&object.name)
    } else {
        None
    };
    if config.geometry.merge_objects {
        let distance = parsed.map_or(0.0, |(_, d)| d);
        return (source.scene_name().to_string(), distance);
    }
    match parsed {
        Some((base, distance)) => (base.to_string(), distance),
        None => (object.name.clone(), 0.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExportSettings;
    use crate::source::MemoryScene;

    const QUAD: &str = r#"{ "name": "Quad",
        "positions": [[0,0,0],[1,0,0],[1,1,0],[0,1,0]],
        "polygons": [ { "vertices": [0, 1, 2, 3] } ],
        "uv_layers": [ { "name": "UVMap", "data": [[0,0],[1,0],[1,1],[0,1]] } ],
        "materials": ["Stone"] }"#;

    fn config(edit: impl FnOnce(&mut ExportSettings)) -> ExportConfig {
        let mut settings = ExportSettings::default();
        settings.output.path = "out".into();
        edit(&mut settings);
        settings.validate().expect("valid settings")
    }

    fn scene(objects: &str) -> MemoryScene {
        let json = format!(r#"{{ "name": "Level", "objects": [{}], "meshes": [{}] }}"#, objects, QUAD);
        MemoryScene::from_json(&json).expect("scene json")
    }

    fn run(scene: &MemoryScene, config: &ExportConfig) -> Vec<DecomposedObject> {
        let mut ctx = ExportContext::new(config, "Level");
        decompose(&mut ctx, scene)
    }

    #[test]
    fn test_filter_selection_and_hidden() {
        let scene = scene(
            r#"{ "name": "A", "kind": "empty", "selected": true },
               { "name": "B", "kind": "empty", "selected": true, "hidden": true },
               { "name": "C", "kind": "empty" }"#,
        );
        let names = |config: &ExportConfig| -> Vec<String> {
            filter_objects(&scene, config).iter().map(|o| o.name.clone()).collect()
        };
        assert_eq!(names(&config(|_| {})), ["A", "B", "C"]);
        assert_eq!(
            names(&config(|s| s.source.selection = Selection::Selected)),
            ["A", "B"]
        );
        assert_eq!(
            names(&config(|s| {
                s.source.selection = Selection::Selected;
                s.source.ignore_hidden = true;
            })),
            ["A"]
        );
    }

    #[test]
    fn test_object_kinds() {
        let scene = scene(
            r#"{ "name": "Rig", "kind": "armature" },
               { "name": "Pivot", "kind": "empty" },
               { "name": "Floor", "kind": "mesh", "mesh": "Quad" },
               { "name": "Bounds", "kind": "mesh", "mesh": "Quad", "display_wire": true }"#,
        );
        let records = run(&scene, &config(|s| s.source.wired_as_empty = true));
        let kinds: Vec<(&str, ObjectKind)> = records.iter().map(|r| (r.name.as_str(), r.kind)).collect();
        assert_eq!(
            kinds,
            [
                ("Pivot", ObjectKind::Empty),
                ("Floor", ObjectKind::Mesh),
                ("Bounds", ObjectKind::Empty),
            ]
        );
        assert!(records[0].is_empty());
        assert_eq!(records[1].geometries.len(), 1);
        assert_eq!(records[1].geometries[0].material.as_deref(), Some("Stone"));
        assert_eq!(records[1].geometries[0].lods[0].triangles.len(), 2);
    }

    #[test]
    fn test_lod_suffixes_group_into_one_model() {
        let scene = scene(
            r#"{ "name": "Rock_LOD10", "kind": "mesh", "mesh": "Quad" },
               { "name": "Rock_LOD0", "kind": "mesh", "mesh": "Quad" }"#,
        );
        let records = run(&scene, &config(|_| {}));
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "Rock");
        assert!(records[0].has_lods());
        let distances: Vec<f32> = records[0].geometries[0].lods.iter().map(|l| l.distance).collect();
        assert_eq!(distances, [0.0, 10.0]);
    }

    #[test]
    fn test_merge_groups_by_material() {
        let scene = scene(
            r#"{ "name": "Left", "kind": "mesh", "mesh": "Quad" },
               { "name": "Right", "kind": "mesh", "mesh": "Quad", "materials": ["Wood"],
                 "transform": { "position": [4, 0, 0] } },
               { "name": "Again", "kind": "mesh", "mesh": "Quad" }"#,
        );
        let records = run(
            &scene,
            &config(|s| {
                s.geometry.merge_objects = true;
                s.transform.origin = Origin::Global;
            }),
        );
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "Level");
        assert!(records[0].object_name.is_none());
        let materials: Vec<Option<&str>> =
            records[0].geometries.iter().map(|g| g.material.as_deref()).collect();
        assert_eq!(materials, [Some("Stone"), Some("Wood")]);
    }
}
