//! Shared types for Urho3D binary resources
//!
//! This crate provides the format definitions used by `urho-export`
//! (writing) and by tools that read exported files back (inspection, tests).
//!
//! # Modules
//!
//! - [`packing`] - Vertex element mask constants and stride calculation
//! - [`formats`] - Model (.mdl) and animation (.ani) binary layouts

pub mod formats;
pub mod packing;

// Re-export commonly used packing items
pub use packing::{
    ELEMENT_BLENDINDICES, ELEMENT_BLENDWEIGHTS, ELEMENT_COLOR, ELEMENT_CUBETEXCOORD1,
    ELEMENT_CUBETEXCOORD2, ELEMENT_NORMAL, ELEMENT_POSITION, ELEMENT_TANGENT, ELEMENT_TEXCOORD1,
    ELEMENT_TEXCOORD2, MAX_VERTEX_INFLUENCES, element_names, pack_color_unorm8, vertex_stride,
};

// Re-export commonly used format items
pub use formats::{
    ANIMATION_EXT, ANIMATION_MAGIC, AnimationSummary, BONE_COLLISION_BOX, BONE_COLLISION_SPHERE,
    BinaryReader, BinarySerializable, BinaryWriter, FormatError, IndexBufferHeader,
    LodLevelRecord, MODEL_EXT, MODEL_MAGIC, ModelSummary, PRIMITIVE_TRIANGLE_LIST,
    TRACK_POSITION, TRACK_ROTATION, TRACK_SCALE, VertexBufferHeader, index_size_for,
};
