//! urho-export library
//!
//! Converts an authored scene (meshes, armatures, actions, materials,
//! hierarchy) into Urho3D resources: binary models and animations, material
//! and trigger XML, and prefab/scene XML documents that cross-reference the
//! written files.
//!
//! The pipeline is a single pass:
//! [`decompose`] → [`assemble`] → [`formats`] / [`material`] → [`scene`].
//! [`export::export_scene`] drives it over any [`source::SceneSource`].

pub mod assemble;
pub mod config;
pub mod decompose;
pub mod diagnostics;
pub mod error;
pub mod export;
pub mod formats;
pub mod material;
pub mod math;
pub mod paths;
pub mod scene;
pub mod source;
pub mod xml;

// Re-export element constants from urho-common
pub use urho_common::{
    ELEMENT_BLENDINDICES, ELEMENT_BLENDWEIGHTS, ELEMENT_COLOR, ELEMENT_NORMAL, ELEMENT_POSITION,
    ELEMENT_TANGENT, ELEMENT_TEXCOORD1, ELEMENT_TEXCOORD2,
};

pub use config::{load_settings, ExportConfig, ExportSettings};
pub use diagnostics::{ErrorLedger, Report, Severity};
pub use error::ExportError;
pub use export::{export_materials, export_scene, ExportContext, ExportOutcome};
pub use source::{MemoryScene, SceneSource};
