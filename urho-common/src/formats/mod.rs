//! Binary format definitions for Urho3D resource files
//!
//! All multi-byte values are little-endian. Strings are stored UTF-8 and
//! null-terminated. Quaternions are stored w-first.

mod animation;
mod model;
mod serialization;
mod stream;

pub use animation::*;
pub use model::*;
pub use serialization::BinarySerializable;
pub use stream::{BinaryReader, BinaryWriter};

use thiserror::Error;

/// File extension for binary models
pub const MODEL_EXT: &str = "mdl";

/// File extension for binary animations
pub const ANIMATION_EXT: &str = "ani";

/// Errors produced while reading binary resources back
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FormatError {
    #[error("unexpected end of data at offset {offset} (needed {needed} bytes)")]
    Truncated { offset: usize, needed: usize },

    #[error("bad magic {found:?}, expected {expected:?}")]
    BadMagic { found: [u8; 4], expected: [u8; 4] },

    #[error("string at offset {0} is not valid UTF-8")]
    InvalidString(usize),

    #[error("invalid {field} value {value}")]
    InvalidValue { field: &'static str, value: u32 },
}
