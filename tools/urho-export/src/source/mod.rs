//! Host scene interface
//!
//! The pipeline reads the authored scene only through [`SceneSource`]. An
//! adapter around the authoring tool implements it in production;
//! [`MemoryScene`] implements it over a JSON description for the CLI and
//! tests.
//!
//! Conventions of the data handed over:
//! - transforms and bone rests are in authoring space (Z up), rotations
//!   w-first;
//! - bone rests are armature-space head position plus rotation, the bone
//!   pointing along its local +Y;
//! - action channel values are local transforms relative to the parent bone
//!   (or the parent object for object animations).

mod memory;
pub mod modifiers;

pub use memory::MemoryScene;

use glam::{Vec2, Vec3, Vec4};
use serde::Deserialize;
use std::fmt;
use std::path::PathBuf;

use crate::config::ShapeType;
use crate::math::{quat_wxyz, Transform};

/// Oldest host version whose scene data the exporter understands
pub const MIN_HOST_VERSION: HostVersion = HostVersion(2, 80, 0);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Deserialize)]
pub struct HostVersion(pub u32, pub u32, pub u32);

impl fmt::Display for HostVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.0, self.1, self.2)
    }
}

/// Read-only view of the authored scene
pub trait SceneSource {
    fn host_version(&self) -> HostVersion;
    fn scene_name(&self) -> &str;
    fn frame_rate(&self) -> f32;
    /// First and last frame of the scene timeline
    fn frame_range(&self) -> (f32, f32);
    fn objects(&self) -> &[SceneObject];
    fn meshes(&self) -> &[MeshData];
    fn armatures(&self) -> &[Armature];
    fn actions(&self) -> &[Action];
    /// Timeline markers
    fn markers(&self) -> &[Marker];
    fn lod_sets(&self) -> &[LodSet];
    fn materials(&self) -> &[MaterialSource];

    fn object(&self, name: &str) -> Option<&SceneObject> {
        self.objects().iter().find(|o| o.name == name)
    }

    fn mesh(&self, name: &str) -> Option<&MeshData> {
        self.meshes().iter().find(|m| m.name == name)
    }

    /// Armature data of the armature object `name`
    fn armature(&self, name: &str) -> Option<&Armature> {
        self.armatures().iter().find(|a| a.name == name)
    }

    fn action(&self, name: &str) -> Option<&Action> {
        self.actions().iter().find(|a| a.name == name)
    }

    fn material(&self, name: &str) -> Option<&MaterialSource> {
        self.materials().iter().find(|m| m.name == name)
    }
}

/// Object transform in world space, following parent links
pub fn world_transform(source: &dyn SceneSource, object: &SceneObject) -> Transform {
    let mut world = object.transform;
    let mut parent = object.parent.as_deref();
    let mut depth = 0;
    while let Some(name) = parent {
        let Some(p) = source.object(name) else { break };
        world = p.transform.mul(&world);
        parent = p.parent.as_deref();
        depth += 1;
        if depth > source.objects().len() {
            break;
        }
    }
    world
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    Mesh,
    Armature,
    Empty,
    Light,
    Camera,
    Other,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SceneObject {
    pub name: String,
    pub kind: ObjectKind,
    #[serde(default)]
    pub transform: Transform,
    #[serde(default)]
    pub parent: Option<String>,
    /// Bone of the parent armature this object is attached to
    #[serde(default)]
    pub parent_bone: Option<String>,
    /// Mesh data name for mesh objects
    #[serde(default)]
    pub mesh: Option<String>,
    /// Material per slot, overriding the mesh's own slots when not empty
    #[serde(default)]
    pub materials: Vec<Option<String>>,
    #[serde(default)]
    pub modifiers: Vec<Modifier>,
    #[serde(default)]
    pub selected: bool,
    #[serde(default)]
    pub hidden: bool,
    /// Drawn as wireframe in the viewport
    #[serde(default)]
    pub display_wire: bool,
    #[serde(default)]
    pub user_data: Vec<UserProperty>,
    #[serde(default)]
    pub collections: Vec<String>,
    #[serde(default)]
    pub animation: Option<AnimationData>,
    #[serde(default)]
    pub light: Option<LightData>,
    #[serde(default)]
    pub camera: Option<CameraData>,
    /// Collision shape override for individual physics
    #[serde(default)]
    pub collision_bounds: Option<ShapeType>,
    /// Logic node tree replacing the default components
    #[serde(default)]
    pub components: Option<ComponentTree>,
}

impl SceneObject {
    /// Armature object driving this object's skin, if any
    pub fn skin_armature(&self, parent_bone_skinning: bool) -> Option<&str> {
        let from_modifier = self.modifiers.iter().find_map(|m| match m {
            Modifier::Armature { object, .. } => Some(object.as_str()),
            _ => None,
        });
        from_modifier.or_else(|| {
            if parent_bone_skinning && self.parent_bone.is_some() {
                self.parent.as_deref()
            } else {
                None
            }
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UserProperty {
    pub key: String,
    pub value: String,
}

/// Declarative modifier stack entry
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Modifier {
    Decimate {
        ratio: f32,
        #[serde(default = "enabled")]
        render: bool,
        #[serde(default = "enabled")]
        viewport: bool,
    },
    Armature {
        object: String,
    },
}

fn enabled() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct Polygon {
    pub vertices: Vec<u32>,
    #[serde(default)]
    pub material: u32,
    #[serde(default = "enabled")]
    pub smooth: bool,
}

/// Per-loop (polygon corner) UV layer
#[derive(Debug, Clone, Deserialize)]
pub struct UvLayer {
    pub name: String,
    pub data: Vec<[f32; 2]>,
}

/// Per-loop RGBA color layer
#[derive(Debug, Clone, Deserialize)]
pub struct ColorLayer {
    pub name: String,
    pub data: Vec<[f32; 4]>,
}

/// Absolute vertex positions of one shape key
#[derive(Debug, Clone, Deserialize)]
pub struct ShapeKey {
    pub name: String,
    pub positions: Vec<[f32; 3]>,
    #[serde(default)]
    pub muted: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MeshData {
    pub name: String,
    pub positions: Vec<[f32; 3]>,
    /// Per-vertex normals; computed from faces when empty
    #[serde(default)]
    pub normals: Vec<[f32; 3]>,
    pub polygons: Vec<Polygon>,
    #[serde(default)]
    pub uv_layers: Vec<UvLayer>,
    #[serde(default)]
    pub color_layers: Vec<ColorLayer>,
    #[serde(default)]
    pub vertex_groups: Vec<String>,
    /// Per-vertex `(group index, weight)` pairs
    #[serde(default)]
    pub weights: Vec<Vec<(u32, f32)>>,
    #[serde(default)]
    pub shape_keys: Vec<ShapeKey>,
    #[serde(default)]
    pub materials: Vec<Option<String>>,
}

impl MeshData {
    pub fn position(&self, index: u32) -> Option<Vec3> {
        self.positions.get(index as usize).map(|p| Vec3::from_array(*p))
    }

    pub fn loop_count(&self) -> usize {
        self.polygons.iter().map(|p| p.vertices.len()).sum()
    }

    pub fn uv(&self, layer: usize, loop_index: usize) -> Option<Vec2> {
        self.uv_layers
            .get(layer)
            .and_then(|l| l.data.get(loop_index))
            .map(|uv| Vec2::from_array(*uv))
    }

    pub fn color(&self, loop_index: usize) -> Option<Vec4> {
        self.color_layers
            .first()
            .and_then(|l| l.data.get(loop_index))
            .map(|c| Vec4::from_array(*c))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BoneData {
    pub name: String,
    #[serde(default)]
    pub parent: Option<String>,
    /// Head position in armature space
    pub head: [f32; 3],
    /// Rest rotation in armature space, w-first
    #[serde(default = "identity_wxyz")]
    pub rotation: [f32; 4],
    #[serde(default = "unit_length")]
    pub length: f32,
    #[serde(default = "enabled")]
    pub deform: bool,
    #[serde(default)]
    pub hidden: bool,
}

fn identity_wxyz() -> [f32; 4] {
    [1.0, 0.0, 0.0, 0.0]
}

fn unit_length() -> f32 {
    1.0
}

impl BoneData {
    /// Rest transform in armature space
    pub fn rest(&self) -> Transform {
        Transform::from_translation_rotation(Vec3::from_array(self.head), quat_wxyz(self.rotation))
    }
}

/// Bones of one armature object, parents listed before children
#[derive(Debug, Clone, Deserialize)]
pub struct Armature {
    pub name: String,
    pub bones: Vec<BoneData>,
}

/// One keyframe of a channel; absent components are not keyed
#[derive(Debug, Clone, Deserialize)]
pub struct Keyframe {
    pub frame: f32,
    #[serde(default)]
    pub position: Option<[f32; 3]>,
    #[serde(default)]
    pub rotation: Option<[f32; 4]>,
    #[serde(default)]
    pub scale: Option<[f32; 3]>,
}

/// Keys of one bone, or of the object itself when `target` is the object name
#[derive(Debug, Clone, Deserialize)]
pub struct ActionChannel {
    pub target: String,
    pub keys: Vec<Keyframe>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Marker {
    pub name: String,
    pub frame: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Action {
    pub name: String,
    #[serde(default)]
    pub frame_range: Option<(f32, f32)>,
    pub channels: Vec<ActionChannel>,
    /// Pose markers
    #[serde(default)]
    pub markers: Vec<Marker>,
    #[serde(default)]
    pub selected: bool,
}

impl Action {
    /// Explicit range, or the span of all keyframes
    pub fn range(&self) -> (f32, f32) {
        if let Some(range) = self.frame_range {
            return range;
        }
        let mut frames = self
            .channels
            .iter()
            .flat_map(|c| c.keys.iter().map(|k| k.frame));
        let Some(first) = frames.next() else {
            return (0.0, 0.0);
        };
        frames.fold((first, first), |(lo, hi), f| (lo.min(f), hi.max(f)))
    }

    pub fn channel(&self, target: &str) -> Option<&ActionChannel> {
        self.channels.iter().find(|c| c.target == target)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NlaStrip {
    pub name: String,
    pub action: String,
    pub frame_start: f32,
    pub frame_end: f32,
    #[serde(default)]
    pub selected: bool,
    #[serde(default)]
    pub muted: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NlaTrack {
    pub name: String,
    #[serde(default)]
    pub strips: Vec<NlaStrip>,
    #[serde(default)]
    pub selected: bool,
    #[serde(default)]
    pub muted: bool,
}

/// Animation assignment of an object
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnimationData {
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub tracks: Vec<NlaTrack>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LodLevel {
    /// Mesh data used at this level
    pub mesh: String,
    pub distance: f32,
    /// Decimate ratio applied when no armature drives the set
    #[serde(default = "full_ratio")]
    pub decimate: f32,
}

fn full_ratio() -> f32 {
    1.0
}

/// Configured LOD chain producing one model
#[derive(Debug, Clone, Deserialize)]
pub struct LodSet {
    pub name: String,
    #[serde(default)]
    pub armature: Option<String>,
    pub levels: Vec<LodLevel>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LightKind {
    Point,
    Spot,
    Directional,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LightData {
    pub kind: LightKind,
    #[serde(default = "white")]
    pub color: [f32; 3],
    #[serde(default = "unit_length")]
    pub energy: f32,
    #[serde(default = "default_range")]
    pub range: f32,
    /// Spot cone angle in degrees
    #[serde(default = "default_spot_angle")]
    pub spot_angle: f32,
}

fn white() -> [f32; 3] {
    [1.0; 3]
}

fn default_range() -> f32 {
    10.0
}

fn default_spot_angle() -> f32 {
    30.0
}

#[derive(Debug, Clone, Deserialize)]
pub struct CameraData {
    /// Vertical field of view in degrees
    #[serde(default = "default_fov")]
    pub fov: f32,
    #[serde(default = "default_near")]
    pub near: f32,
    #[serde(default = "default_far")]
    pub far: f32,
    #[serde(default)]
    pub orthographic: bool,
    #[serde(default = "default_ortho_size")]
    pub ortho_size: f32,
}

fn default_fov() -> f32 {
    45.0
}

fn default_near() -> f32 {
    0.1
}

fn default_far() -> f32 {
    1000.0
}

fn default_ortho_size() -> f32 {
    20.0
}

/// Custom component list of a logic node tree
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ComponentTree {
    pub components: Vec<ComponentDesc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ComponentDesc {
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub attributes: Vec<ComponentAttribute>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ComponentAttribute {
    pub name: String,
    pub value: AttributeValue,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum AttributeValue {
    Text(String),
    Number(f32),
    Bool(bool),
    /// Vector written as "(x, y, z)" by the node editor
    Vector(String),
    /// This node's model file
    ModelRef,
    /// This node's material list
    MaterialRef,
}

/// Texture reference of a material
#[derive(Debug, Clone, Deserialize)]
pub struct TextureRef {
    pub name: String,
    /// Image file to copy into the texture folder
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MaterialTextures {
    pub diffuse: Option<TextureRef>,
    pub normal: Option<TextureRef>,
    pub specular: Option<TextureRef>,
    pub emissive: Option<TextureRef>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MaterialSource {
    pub name: String,
    pub diffuse_color: [f32; 4],
    pub specular_color: [f32; 3],
    pub specular_intensity: f32,
    pub specular_hardness: f32,
    pub emissive_color: [f32; 3],
    pub textures: MaterialTextures,
    pub two_sided: bool,
    pub alpha_blend: bool,
    pub shadeless: bool,
    pub vs_defines: Option<String>,
    pub ps_defines: Option<String>,
    pub node_graph: Option<MaterialGraph>,
}

impl Default for MaterialSource {
    fn default() -> Self {
        Self {
            name: String::new(),
            diffuse_color: [0.8, 0.8, 0.8, 1.0],
            specular_color: [1.0; 3],
            specular_intensity: 0.5,
            specular_hardness: 50.0,
            emissive_color: [0.0; 3],
            textures: MaterialTextures::default(),
            two_sided: false,
            alpha_blend: false,
            shadeless: false,
            vs_defines: None,
            ps_defines: None,
            node_graph: None,
        }
    }
}

/// Node-graph description of a material
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MaterialGraph {
    pub nodes: Vec<GraphNode>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum GraphNode {
    Technique {
        name: String,
        #[serde(default)]
        quality: Option<u32>,
        #[serde(default)]
        lod_distance: Option<f32>,
    },
    Texture {
        unit: String,
        texture: TextureRef,
    },
    Standard {
        diffuse_color: [f32; 4],
        specular_color: [f32; 4],
        #[serde(default)]
        emissive_color: Option<[f32; 3]>,
    },
    Pbr {
        base_color: [f32; 4],
        metallic: f32,
        roughness: f32,
        #[serde(default)]
        emissive_color: Option<[f32; 3]>,
    },
    Parameter {
        name: String,
        value: String,
    },
    Cull {
        mode: String,
    },
    ShadowCull {
        mode: String,
    },
    ShaderDefines {
        #[serde(default)]
        vs: Option<String>,
        #[serde(default)]
        ps: Option<String>,
    },
    #[serde(other)]
    Unsupported,
}
