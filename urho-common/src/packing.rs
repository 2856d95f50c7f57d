//! Vertex element utilities
//!
//! Urho3D vertex buffers declare their layout with an element mask. The
//! elements present are stored interleaved per vertex, always in bit order:
//!
//! ```text
//! POSITION      Float32x3
//! NORMAL        Float32x3
//! COLOR         Unorm8x4
//! TEXCOORD1     Float32x2
//! TEXCOORD2     Float32x2
//! CUBETEXCOORD1 Float32x3
//! CUBETEXCOORD2 Float32x3
//! TANGENT       Float32x4 (w = bitangent sign)
//! BLENDWEIGHTS  Float32x4
//! BLENDINDICES  Uint8x4
//! ```

// ============================================================================
// Vertex Element Constants
// ============================================================================

/// Vertex element: position (3 floats)
pub const ELEMENT_POSITION: u32 = 0x0001;
/// Vertex element: normal (3 floats)
pub const ELEMENT_NORMAL: u32 = 0x0002;
/// Vertex element: color (RGBA, 4 unorm8)
pub const ELEMENT_COLOR: u32 = 0x0004;
/// Vertex element: first UV set (2 floats)
pub const ELEMENT_TEXCOORD1: u32 = 0x0008;
/// Vertex element: second UV set (2 floats)
pub const ELEMENT_TEXCOORD2: u32 = 0x0010;
/// Vertex element: first cube texture coordinate (3 floats)
pub const ELEMENT_CUBETEXCOORD1: u32 = 0x0020;
/// Vertex element: second cube texture coordinate (3 floats)
pub const ELEMENT_CUBETEXCOORD2: u32 = 0x0040;
/// Vertex element: tangent with bitangent sign (4 floats)
pub const ELEMENT_TANGENT: u32 = 0x0080;
/// Vertex element: skinning weights (4 floats)
pub const ELEMENT_BLENDWEIGHTS: u32 = 0x0100;
/// Vertex element: skinning bone indices (4 u8)
pub const ELEMENT_BLENDINDICES: u32 = 0x0200;

/// Influences stored per skinned vertex
pub const MAX_VERTEX_INFLUENCES: usize = 4;

const ELEMENT_SIZES: [(u32, u32, &str); 10] = [
    (ELEMENT_POSITION, 12, "position"),
    (ELEMENT_NORMAL, 12, "normal"),
    (ELEMENT_COLOR, 4, "color"),
    (ELEMENT_TEXCOORD1, 8, "uv1"),
    (ELEMENT_TEXCOORD2, 8, "uv2"),
    (ELEMENT_CUBETEXCOORD1, 12, "cube1"),
    (ELEMENT_CUBETEXCOORD2, 12, "cube2"),
    (ELEMENT_TANGENT, 16, "tangent"),
    (ELEMENT_BLENDWEIGHTS, 16, "weights"),
    (ELEMENT_BLENDINDICES, 4, "indices"),
];

/// Calculate vertex stride in bytes for an element mask
#[inline]
pub const fn vertex_stride(mask: u32) -> u32 {
    let mut stride = 0;
    let mut i = 0;
    while i < ELEMENT_SIZES.len() {
        if mask & ELEMENT_SIZES[i].0 != 0 {
            stride += ELEMENT_SIZES[i].1;
        }
        i += 1;
    }
    stride
}

/// Human readable element names for a mask, in storage order
pub fn element_names(mask: u32) -> Vec<&'static str> {
    ELEMENT_SIZES
        .iter()
        .filter(|(bit, _, _)| mask & bit != 0)
        .map(|(_, _, name)| *name)
        .collect()
}

/// Convert an RGBA f32 color to unorm8
///
/// Components are clamped to [0.0, 1.0] and rounded.
#[inline]
pub fn pack_color_unorm8(color: [f32; 4]) -> [u8; 4] {
    color.map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_stride() {
        assert_eq!(vertex_stride(ELEMENT_POSITION), 12);
        assert_eq!(vertex_stride(ELEMENT_POSITION | ELEMENT_NORMAL), 24);
        assert_eq!(
            vertex_stride(ELEMENT_POSITION | ELEMENT_NORMAL | ELEMENT_TEXCOORD1),
            32
        );
        // Skinned vertex with tangent
        let mask = ELEMENT_POSITION
            | ELEMENT_NORMAL
            | ELEMENT_COLOR
            | ELEMENT_TEXCOORD1
            | ELEMENT_TANGENT
            | ELEMENT_BLENDWEIGHTS
            | ELEMENT_BLENDINDICES;
        assert_eq!(vertex_stride(mask), 12 + 12 + 4 + 8 + 16 + 16 + 4);
    }

    #[test]
    fn test_element_names_follow_storage_order() {
        let names = element_names(ELEMENT_TANGENT | ELEMENT_POSITION | ELEMENT_TEXCOORD1);
        assert_eq!(names, vec!["position", "uv1", "tangent"]);
    }

    #[test]
    fn test_pack_color_unorm8() {
        assert_eq!(pack_color_unorm8([0.0, 1.0, 0.5, 2.0]), [0, 255, 128, 255]);
        assert_eq!(pack_color_unorm8([-1.0, 0.0, 0.0, 1.0]), [0, 0, 0, 255]);
    }
}
