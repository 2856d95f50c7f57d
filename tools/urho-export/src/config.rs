//! Export settings
//!
//! Settings are read from TOML into [`ExportSettings`] (every field has the
//! exporter's default) and turned into an immutable [`ExportConfig`] by
//! [`ExportSettings::validate`], the only place where cross-field rules are
//! applied.

use anyhow::{Context, Result};
use glam::Quat;
use serde::Deserialize;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::math::{orientation_quat, SpaceTransform};

/// Settings as authored, before validation
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExportSettings {
    pub output: OutputSettings,
    pub source: SourceSettings,
    pub transform: TransformSettings,
    pub geometry: GeometrySettings,
    pub skeleton: SkeletonSettings,
    pub animation: AnimationSettings,
    pub morph: MorphSettings,
    pub material: MaterialSettings,
    pub scene: SceneSettings,
    pub diagnostics: DiagnosticsSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputSettings {
    /// Root folder of the exported resources
    pub path: PathBuf,
    /// Place each resource type in its own sub-folder
    pub use_sub_dirs: bool,
    pub overwrite: bool,
    pub dirs: SubDirs,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::new(),
            use_sub_dirs: true,
            overwrite: true,
            dirs: SubDirs::default(),
        }
    }
}

/// Sub-folder per resource type
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SubDirs {
    pub models: String,
    pub animations: String,
    pub triggers: String,
    pub materials: String,
    pub techniques: String,
    pub textures: String,
    pub material_lists: String,
    pub objects: String,
    pub scenes: String,
}

impl Default for SubDirs {
    fn default() -> Self {
        Self {
            models: "Models".into(),
            animations: "Models".into(),
            triggers: "Models".into(),
            materials: "Materials".into(),
            techniques: "Techniques".into(),
            textures: "Textures".into(),
            material_lists: "Models".into(),
            objects: "Objects".into(),
            scenes: "Scenes".into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Selection {
    #[default]
    All,
    Selected,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SourceSettings {
    pub selection: Selection,
    pub ignore_hidden: bool,
    /// Export meshes drawn as wireframe as empty nodes
    pub wired_as_empty: bool,
}

/// Which authoring axis becomes the engine's forward axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    #[default]
    XPlus,
    XMinus,
    YPlus,
    YMinus,
    ZPlus,
    ZMinus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    #[default]
    Local,
    Global,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModifierResolution {
    #[default]
    Preview,
    Render,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TransformSettings {
    pub orientation: Orientation,
    pub scale: f32,
    pub origin: Origin,
    pub apply_modifiers: bool,
    pub modifier_resolution: ModifierResolution,
}

impl Default for TransformSettings {
    fn default() -> Self {
        Self {
            orientation: Orientation::XPlus,
            scale: 1.0,
            origin: Origin::Local,
            apply_modifiers: false,
            modifier_resolution: ModifierResolution::Preview,
        }
    }
}

/// Where model file names come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeshNameSource {
    #[default]
    Object,
    Mesh,
}

/// Vertex elements and model layout; positions are always exported
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GeometrySettings {
    pub enabled: bool,
    pub normal: bool,
    pub color: bool,
    pub color_alpha: bool,
    pub uv: bool,
    pub uv2: bool,
    pub tangent: bool,
    pub weights: bool,
    /// Zero-fill requested elements the mesh does not have
    pub force_elements: bool,
    pub merge_objects: bool,
    /// When merging, keep one geometry per object and material
    pub merge_not_materials: bool,
    /// One vertex/index buffer pair per geometry
    pub split_sub_meshes: bool,
    pub lods: bool,
    pub strict_lods: bool,
    pub optimize_indices: bool,
    pub bones_per_geometry: usize,
    pub bones_per_vertex: usize,
    pub mesh_name_from: MeshNameSource,
    /// Prefix model names with `<fileid>-<scene>-`
    pub model_name_prefix: bool,
}

impl Default for GeometrySettings {
    fn default() -> Self {
        Self {
            enabled: true,
            normal: true,
            color: false,
            color_alpha: false,
            uv: true,
            uv2: false,
            tangent: false,
            weights: false,
            force_elements: false,
            merge_objects: false,
            merge_not_materials: false,
            split_sub_meshes: false,
            lods: true,
            strict_lods: true,
            optimize_indices: false,
            bones_per_geometry: 64,
            bones_per_vertex: 4,
            mesh_name_from: MeshNameSource::Object,
            model_name_prefix: false,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SkeletonSettings {
    pub enabled: bool,
    pub only_deform: bool,
    pub only_visible: bool,
    /// Keep only the deform bones of a Rigify rig
    pub derigify: bool,
    /// Limit bone bounding boxes to the head-tail segment
    pub clamp_bounding_box: bool,
    /// Meshes parented to a bone are skinned fully to it
    pub parent_bone_skinning: bool,
}

/// What an exported animation is built from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnimationSource {
    AllActions,
    CurrentAction,
    #[default]
    UsedActions,
    SelectedActions,
    SelectedStrips,
    SelectedTracks,
    AllStrips,
    AllTracks,
    Timeline,
}

impl AnimationSource {
    pub fn is_action_based(self) -> bool {
        matches!(
            self,
            AnimationSource::AllActions
                | AnimationSource::CurrentAction
                | AnimationSource::UsedActions
                | AnimationSource::SelectedActions
        )
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnimationSettings {
    /// Bone animations of skinned models
    pub enabled: bool,
    /// Node animations of objects without a skeleton
    pub objects: bool,
    pub source: AnimationSource,
    /// Export keyframes as authored instead of sampling every frame
    pub by_keyframes: bool,
    /// Repeat the first pose one frame after the end of track and timeline clips
    pub extra_frame: bool,
    pub triggers: bool,
    /// Trigger times in 0..1 instead of seconds
    pub normalized_triggers: bool,
    pub position: bool,
    pub rotation: bool,
    pub scale: bool,
    pub only_keyed_bones: bool,
    pub filter_single_keyframes: bool,
}

impl Default for AnimationSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            objects: false,
            source: AnimationSource::UsedActions,
            by_keyframes: false,
            extra_frame: true,
            triggers: false,
            normalized_triggers: false,
            position: true,
            rotation: true,
            scale: false,
            only_keyed_bones: false,
            filter_single_keyframes: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MorphSettings {
    pub enabled: bool,
    pub normal: bool,
    pub tangent: bool,
}

impl Default for MorphSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            normal: true,
            tangent: false,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MaterialSettings {
    pub export: bool,
    pub copy_textures: bool,
    /// Write a `.txt` list of material paths next to each model
    pub material_list: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhysicsMode {
    #[default]
    Disabled,
    /// One triangle-mesh body on the root node
    Global,
    /// A body and shape per node
    Individual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShapeType {
    Box,
    Capsule,
    Cone,
    ConvexHull,
    Cylinder,
    Sphere,
    StaticPlane,
    #[default]
    TriangleMesh,
}

impl ShapeType {
    /// Engine enum name used in the `Shape Type` attribute
    pub fn engine_name(self) -> &'static str {
        match self {
            ShapeType::Box => "Box",
            ShapeType::Capsule => "Capsule",
            ShapeType::Cone => "Cone",
            ShapeType::ConvexHull => "ConvexHull",
            ShapeType::Cylinder => "Cylinder",
            ShapeType::Sphere => "Sphere",
            ShapeType::StaticPlane => "StaticPlane",
            ShapeType::TriangleMesh => "TriangleMesh",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SceneSettings {
    pub individual_prefab: bool,
    /// Individual prefabs only for root objects, children nested inside
    pub only_root_objects: bool,
    pub collective_prefab: bool,
    pub scene_prefab: bool,
    pub create_zone: bool,
    pub render_path: Option<String>,
    pub transforms: bool,
    pub user_data: bool,
    pub collections_as_tags: bool,
    pub physics: PhysicsMode,
    pub shape: ShapeType,
    /// Fixed seed for node/component IDs (random when unset)
    pub id_seed: Option<u32>,
}

impl Default for SceneSettings {
    fn default() -> Self {
        Self {
            individual_prefab: false,
            only_root_objects: true,
            collective_prefab: false,
            scene_prefab: true,
            create_zone: false,
            render_path: None,
            transforms: true,
            user_data: true,
            collections_as_tags: false,
            physics: PhysicsMode::Disabled,
            shape: ShapeType::TriangleMesh,
            id_seed: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DiagnosticsSettings {
    /// Fail the pass when the error ledger is not empty
    pub errors_are_blocking: bool,
}

/// Settings that cannot be normalized into something usable
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("output path is empty")]
    MissingOutputPath,

    #[error("scale must be a positive finite number, got {0}")]
    InvalidScale(f32),

    #[error("bones per geometry must be in 64..=2048, got {0}")]
    BonesPerGeometry(usize),

    #[error("bones per vertex must be in 1..=4, got {0}")]
    BonesPerVertex(usize),

    #[error("sub-folder for {0} must be a relative path")]
    AbsoluteSubDir(&'static str),
}

/// Validated, immutable export configuration
#[derive(Debug, Clone)]
pub struct ExportConfig {
    settings: ExportSettings,
    orientation: Quat,
    notes: Vec<String>,
}

impl Deref for ExportConfig {
    type Target = ExportSettings;

    fn deref(&self) -> &ExportSettings {
        &self.settings
    }
}

impl ExportConfig {
    /// Orientation rotation applied before the axis remap
    pub fn orientation(&self) -> Quat {
        self.orientation
    }

    pub fn space(&self) -> SpaceTransform {
        SpaceTransform::new(self.orientation, self.settings.transform.scale)
    }

    /// Adjustments made during validation, in the order they were applied
    pub fn notes(&self) -> &[String] {
        &self.notes
    }

    /// Animations of any kind are requested
    pub fn exports_animations(&self) -> bool {
        self.settings.animation.enabled || self.settings.animation.objects
    }
}

impl ExportSettings {
    /// Apply cross-field rules and freeze the settings
    pub fn validate(mut self) -> Result<ExportConfig, ConfigError> {
        if self.output.path.as_os_str().is_empty() {
            return Err(ConfigError::MissingOutputPath);
        }
        let scale = self.transform.scale;
        if !scale.is_finite() || scale <= 0.0 {
            return Err(ConfigError::InvalidScale(scale));
        }
        if !(64..=2048).contains(&self.geometry.bones_per_geometry) {
            return Err(ConfigError::BonesPerGeometry(self.geometry.bones_per_geometry));
        }
        if !(1..=4).contains(&self.geometry.bones_per_vertex) {
            return Err(ConfigError::BonesPerVertex(self.geometry.bones_per_vertex));
        }
        let dirs = &self.output.dirs;
        for (label, dir) in [
            ("models", &dirs.models),
            ("animations", &dirs.animations),
            ("triggers", &dirs.triggers),
            ("materials", &dirs.materials),
            ("techniques", &dirs.techniques),
            ("textures", &dirs.textures),
            ("material lists", &dirs.material_lists),
            ("objects", &dirs.objects),
            ("scenes", &dirs.scenes),
        ] {
            if Path::new(dir).is_absolute() {
                return Err(ConfigError::AbsoluteSubDir(label));
            }
        }

        let mut notes = Vec::new();
        let mut note = |flag: &mut bool, value: bool, message: &str| {
            if *flag != value {
                *flag = value;
                notes.push(message.to_string());
            }
        };

        let geometry = &mut self.geometry;
        let animation = &mut self.animation;
        let morph = &mut self.morph;

        if self.skeleton.enabled {
            note(&mut geometry.weights, true, "skeleton export enables vertex weights");
            note(
                &mut animation.objects,
                false,
                "object animations are disabled while exporting skeletons",
            );
        } else {
            note(&mut geometry.weights, false, "vertex weights need skeleton export");
            note(&mut animation.enabled, false, "bone animations need skeleton export");
        }

        if !animation.source.is_action_based() {
            note(
                &mut animation.by_keyframes,
                false,
                "keyframe export only applies to action sources",
            );
        }

        if !geometry.enabled {
            note(&mut morph.enabled, false, "morphs need geometry export");
        }

        if geometry.tangent && !(geometry.normal && geometry.uv) {
            note(&mut geometry.tangent, false, "tangents need normal and UV");
        }

        if morph.normal && !geometry.normal {
            note(&mut morph.normal, false, "morph normals need vertex normals");
        }
        if morph.tangent && !(geometry.tangent && morph.normal) {
            note(
                &mut morph.tangent,
                false,
                "morph tangents need tangents and morph normals",
            );
        }

        if geometry.merge_objects && self.transform.origin == Origin::Local {
            notes.push("merging objects with local origin stacks them at the origin".to_string());
        }

        for message in &notes {
            tracing::warn!("{}", message);
        }

        let orientation = orientation_quat(self.transform.orientation);
        Ok(ExportConfig {
            settings: self,
            orientation,
            notes,
        })
    }
}

/// Load settings from a TOML file
pub fn load_settings(path: &Path) -> Result<ExportSettings> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read settings: {:?}", path))?;
    parse_settings(&content).with_context(|| format!("Failed to parse settings: {:?}", path))
}

/// Parse settings from TOML text
pub fn parse_settings(content: &str) -> Result<ExportSettings> {
    Ok(toml::from_str(content)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(toml: &str) -> ExportSettings {
        parse_settings(toml).expect("settings should parse")
    }

    #[test]
    fn test_defaults() {
        let s = settings("[output]\npath = \"out\"\n");
        assert!(s.output.use_sub_dirs);
        assert!(s.geometry.uv);
        assert_eq!(s.geometry.bones_per_geometry, 64);
        assert_eq!(s.animation.source, AnimationSource::UsedActions);
        assert_eq!(s.scene.shape, ShapeType::TriangleMesh);
        assert_eq!(s.output.dirs.models, "Models");
    }

    #[test]
    fn test_unknown_field_rejected() {
        assert!(parse_settings("[geometry]\nuvs = true\n").is_err());
        // Positions have no switch
        assert!(parse_settings("[geometry]\nposition = false\n").is_err());
    }

    #[test]
    fn test_missing_output_path() {
        let err = settings("").validate().unwrap_err();
        assert_eq!(err, ConfigError::MissingOutputPath);
    }

    #[test]
    fn test_skeleton_forces_weights() {
        let config = settings(
            "[output]\npath = \"out\"\n[skeleton]\nenabled = true\n[animation]\nobjects = true\n",
        )
        .validate()
        .unwrap();
        assert!(config.geometry.weights);
        assert!(!config.animation.objects);
        assert_eq!(config.notes().len(), 2);
    }

    #[test]
    fn test_no_skeleton_disables_weights_and_bone_animations() {
        let config = settings(
            "[output]\npath = \"out\"\n[geometry]\nweights = true\n[animation]\nenabled = true\n",
        )
        .validate()
        .unwrap();
        assert!(!config.geometry.weights);
        assert!(!config.animation.enabled);
    }

    #[test]
    fn test_tangent_requires_uv() {
        let config = settings("[output]\npath = \"out\"\n[geometry]\ntangent = true\nuv = false\n")
            .validate()
            .unwrap();
        assert!(!config.geometry.tangent);
    }

    #[test]
    fn test_morph_tangent_requires_tangent() {
        let config = settings(
            "[output]\npath = \"out\"\n[morph]\nenabled = true\ntangent = true\n",
        )
        .validate()
        .unwrap();
        assert!(config.morph.enabled);
        assert!(!config.morph.tangent);
    }

    #[test]
    fn test_keyframes_only_for_actions() {
        let config = settings(
            "[output]\npath = \"out\"\n[animation]\nsource = \"timeline\"\nby_keyframes = true\n",
        )
        .validate()
        .unwrap();
        assert!(!config.animation.by_keyframes);
    }

    #[test]
    fn test_rejects_bad_numbers() {
        let err = settings("[output]\npath = \"o\"\n[transform]\nscale = 0.0\n")
            .validate()
            .unwrap_err();
        assert_eq!(err, ConfigError::InvalidScale(0.0));

        let err = settings("[output]\npath = \"o\"\n[geometry]\nbones_per_vertex = 8\n")
            .validate()
            .unwrap_err();
        assert_eq!(err, ConfigError::BonesPerVertex(8));
    }
}
