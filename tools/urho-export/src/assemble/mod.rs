//! Engine model and animation assembly
//!
//! Turns [`DecomposedObject`](crate::decompose::DecomposedObject)s into the
//! buffer/geometry/LOD structures of the binary formats:
//!
//! - [`model`] - vertex and index buffers, bone partition, LOD reuse, morph
//!   ranges, bone collision volumes
//! - [`animation`] - track masks
//! - [`optimize`] - triangle order for vertex cache locality

pub mod animation;
pub mod model;
pub mod optimize;

pub use animation::{assemble_animation, UrhoAnimation, UrhoTrack};
pub use model::{
    assemble_model, UrhoBone, UrhoGeometry, UrhoIndexBuffer, UrhoLodLevel, UrhoModel, UrhoMorph,
    UrhoMorphBuffer, UrhoVertex, UrhoVertexBuffer,
};
pub use optimize::optimize_triangles;
