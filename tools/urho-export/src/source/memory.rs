//! In-memory scene loaded from JSON.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

use super::{
    Action, Armature, HostVersion, LodSet, Marker, MaterialSource, MeshData, SceneObject,
    SceneSource,
};

/// A complete scene description, as written by the authoring tool's dump
#[derive(Debug, Clone, Deserialize)]
pub struct MemoryScene {
    pub name: String,
    #[serde(default = "default_host_version")]
    pub host_version: HostVersion,
    #[serde(default = "default_frame_rate")]
    pub frame_rate: f32,
    #[serde(default = "default_frame_range")]
    pub frame_range: (f32, f32),
    #[serde(default)]
    pub objects: Vec<SceneObject>,
    #[serde(default)]
    pub meshes: Vec<MeshData>,
    #[serde(default)]
    pub armatures: Vec<Armature>,
    #[serde(default)]
    pub actions: Vec<Action>,
    #[serde(default)]
    pub markers: Vec<Marker>,
    #[serde(default)]
    pub lod_sets: Vec<LodSet>,
    #[serde(default)]
    pub materials: Vec<MaterialSource>,
}

fn default_host_version() -> HostVersion {
    HostVersion(2, 93, 0)
}

fn default_frame_rate() -> f32 {
    24.0
}

fn default_frame_range() -> (f32, f32) {
    (1.0, 250.0)
}

impl MemoryScene {
    /// An empty scene with default timing
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            host_version: default_host_version(),
            frame_rate: default_frame_rate(),
            frame_range: default_frame_range(),
            objects: Vec::new(),
            meshes: Vec::new(),
            armatures: Vec::new(),
            actions: Vec::new(),
            markers: Vec::new(),
            lod_sets: Vec::new(),
            materials: Vec::new(),
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read scene: {:?}", path))?;
        Self::from_json(&content).with_context(|| format!("Failed to parse scene: {:?}", path))
    }
}

impl SceneSource for MemoryScene {
    fn host_version(&self) -> HostVersion {
        self.host_version
    }

    fn scene_name(&self) -> &str {
        &self.name
    }

    fn frame_rate(&self) -> f32 {
        self.frame_rate
    }

    fn frame_range(&self) -> (f32, f32) {
        self.frame_range
    }

    fn objects(&self) -> &[SceneObject] {
        &self.objects
    }

    fn meshes(&self) -> &[MeshData] {
        &self.meshes
    }

    fn armatures(&self) -> &[Armature] {
        &self.armatures
    }

    fn actions(&self) -> &[Action] {
        &self.actions
    }

    fn markers(&self) -> &[Marker] {
        &self.markers
    }

    fn lod_sets(&self) -> &[LodSet] {
        &self.lod_sets
    }

    fn materials(&self) -> &[MaterialSource] {
        &self.materials
    }
}
