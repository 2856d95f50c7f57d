//! Urho3D binary model format (.mdl)
//!
//! # Layout
//! ```text
//! 0x00: magic "UMDL"
//!       vertex_buffer_count u32
//!       per buffer: VertexBufferHeader (16 bytes), vertex data (count * stride)
//!       index_buffer_count u32
//!       per buffer: IndexBufferHeader (8 bytes), index data (count * index_size)
//!       geometry_count u32
//!       per geometry:
//!         bone_mapping_count u32, bone_mapping u32[]
//!         lod_level_count u32, LodLevelRecord[] (24 bytes each)
//!       morph_count u32
//!       per morph:
//!         name cstr, buffer_count u32
//!         per buffer: buffer_index u32, element_mask u32, vertex_count u32
//!           per vertex: index u32, [position vec3], [normal vec3], [tangent vec3]
//!       bone_count u32
//!       per bone:
//!         name cstr, parent_index u32 (root = own index)
//!         position vec3, rotation quat (wxyz), scale vec3
//!         offset matrix 3x4 (12 f32, row-major)
//!         collision_mask u8, [radius f32], [bbox min vec3, max vec3]
//!       bounding box min vec3, max vec3
//!       per geometry: center vec3
//! ```

use glam::Vec3;

use super::{BinaryReader, FormatError};
use crate::packing::{ELEMENT_NORMAL, ELEMENT_POSITION, ELEMENT_TANGENT, vertex_stride};

/// Magic bytes for binary models
pub const MODEL_MAGIC: &[u8; 4] = b"UMDL";

/// Primitive type: triangle list (the only one the exporter emits)
pub const PRIMITIVE_TRIANGLE_LIST: u32 = 0;

/// Bone collision flag: bounding sphere radius follows
pub const BONE_COLLISION_SPHERE: u8 = 1;
/// Bone collision flag: bounding box follows
pub const BONE_COLLISION_BOX: u8 = 2;

/// Index size in bytes for a buffer indexing `vertex_count` vertices
#[inline]
pub const fn index_size_for(vertex_count: usize) -> u32 {
    if vertex_count > u16::MAX as usize { 4 } else { 2 }
}

/// Vertex buffer chunk header (16 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexBufferHeader {
    pub vertex_count: u32,
    pub element_mask: u32,
    pub morph_range_start: u32,
    pub morph_range_count: u32,
}

impl VertexBufferHeader {
    pub const SIZE: usize = 16;

    pub fn new(vertex_count: u32, element_mask: u32) -> Self {
        Self {
            vertex_count,
            element_mask,
            morph_range_start: 0,
            morph_range_count: 0,
        }
    }

    pub fn with_morph_range(mut self, start: u32, count: u32) -> Self {
        self.morph_range_start = start;
        self.morph_range_count = count;
        self
    }

    /// Size of the vertex data following this header
    pub fn data_size(&self) -> usize {
        self.vertex_count as usize * vertex_stride(self.element_mask) as usize
    }

    /// Write header to bytes
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        bytes[0..4].copy_from_slice(&self.vertex_count.to_le_bytes());
        bytes[4..8].copy_from_slice(&self.element_mask.to_le_bytes());
        bytes[8..12].copy_from_slice(&self.morph_range_start.to_le_bytes());
        bytes[12..16].copy_from_slice(&self.morph_range_count.to_le_bytes());
        bytes
    }

    /// Read header from bytes
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < Self::SIZE {
            return None;
        }
        Some(Self {
            vertex_count: u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            element_mask: u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
            morph_range_start: u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]),
            morph_range_count: u32::from_le_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]),
        })
    }
}

/// Index buffer chunk header (8 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexBufferHeader {
    pub index_count: u32,
    pub index_size: u32,
}

impl IndexBufferHeader {
    pub const SIZE: usize = 8;

    pub fn new(index_count: u32, index_size: u32) -> Self {
        Self {
            index_count,
            index_size,
        }
    }

    /// Write header to bytes
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        bytes[0..4].copy_from_slice(&self.index_count.to_le_bytes());
        bytes[4..8].copy_from_slice(&self.index_size.to_le_bytes());
        bytes
    }

    /// Read header from bytes
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < Self::SIZE {
            return None;
        }
        Some(Self {
            index_count: u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            index_size: u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
        })
    }
}

/// One LOD level of a geometry (24 bytes)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LodLevelRecord {
    pub distance: f32,
    pub primitive_type: u32,
    pub vertex_buffer: u32,
    pub index_buffer: u32,
    pub index_start: u32,
    pub index_count: u32,
}

impl LodLevelRecord {
    pub const SIZE: usize = 24;

    pub fn triangles(
        distance: f32,
        vertex_buffer: u32,
        index_buffer: u32,
        index_start: u32,
        index_count: u32,
    ) -> Self {
        Self {
            distance,
            primitive_type: PRIMITIVE_TRIANGLE_LIST,
            vertex_buffer,
            index_buffer,
            index_start,
            index_count,
        }
    }

    /// Write record to bytes
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        bytes[0..4].copy_from_slice(&self.distance.to_le_bytes());
        bytes[4..8].copy_from_slice(&self.primitive_type.to_le_bytes());
        bytes[8..12].copy_from_slice(&self.vertex_buffer.to_le_bytes());
        bytes[12..16].copy_from_slice(&self.index_buffer.to_le_bytes());
        bytes[16..20].copy_from_slice(&self.index_start.to_le_bytes());
        bytes[20..24].copy_from_slice(&self.index_count.to_le_bytes());
        bytes
    }

    /// Read record from bytes
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < Self::SIZE {
            return None;
        }
        let word = |i: usize| u32::from_le_bytes([bytes[i], bytes[i + 1], bytes[i + 2], bytes[i + 3]]);
        Some(Self {
            distance: f32::from_bits(word(0)),
            primitive_type: word(4),
            vertex_buffer: word(8),
            index_buffer: word(12),
            index_start: word(16),
            index_count: word(20),
        })
    }
}

/// Summary of a geometry read back from a model file
#[derive(Debug, Clone, PartialEq)]
pub struct GeometrySummary {
    pub bone_mapping: Vec<u32>,
    pub lod_levels: Vec<LodLevelRecord>,
    pub center: Vec3,
}

/// Summary of a morph read back from a model file
#[derive(Debug, Clone, PartialEq)]
pub struct MorphSummary {
    pub name: String,
    /// (vertex buffer index, element mask, vertex count)
    pub buffers: Vec<(u32, u32, u32)>,
}

/// Summary of a bone read back from a model file
#[derive(Debug, Clone, PartialEq)]
pub struct BoneSummary {
    pub name: String,
    pub parent_index: u32,
    pub position: Vec3,
    pub collision_mask: u8,
}

/// Structure of a binary model, without the bulk vertex data
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSummary {
    pub vertex_buffers: Vec<VertexBufferHeader>,
    pub index_buffers: Vec<IndexBufferHeader>,
    /// Decoded index data per index buffer
    pub indices: Vec<Vec<u32>>,
    pub geometries: Vec<GeometrySummary>,
    pub morphs: Vec<MorphSummary>,
    pub bones: Vec<BoneSummary>,
    pub bounding_box: (Vec3, Vec3),
}

impl ModelSummary {
    /// Parse a complete model file
    pub fn parse(data: &[u8]) -> Result<Self, FormatError> {
        let mut r = BinaryReader::new(data);
        r.expect_magic(MODEL_MAGIC)?;

        let vb_count = r.read_u32()?;
        let mut vertex_buffers = Vec::with_capacity(vb_count as usize);
        for _ in 0..vb_count {
            let header = read_header(&mut r, VertexBufferHeader::SIZE, VertexBufferHeader::from_bytes)?;
            r.skip(header.data_size())?;
            vertex_buffers.push(header);
        }

        let ib_count = r.read_u32()?;
        let mut index_buffers = Vec::with_capacity(ib_count as usize);
        let mut indices = Vec::with_capacity(ib_count as usize);
        for _ in 0..ib_count {
            let header = read_header(&mut r, IndexBufferHeader::SIZE, IndexBufferHeader::from_bytes)?;
            let mut data = Vec::with_capacity(header.index_count as usize);
            for _ in 0..header.index_count {
                let index = match header.index_size {
                    2 => r.read_u16()? as u32,
                    4 => r.read_u32()?,
                    other => {
                        return Err(FormatError::InvalidValue {
                            field: "index_size",
                            value: other,
                        });
                    }
                };
                data.push(index);
            }
            index_buffers.push(header);
            indices.push(data);
        }

        let geometry_count = r.read_u32()?;
        let mut geometries = Vec::with_capacity(geometry_count as usize);
        for _ in 0..geometry_count {
            let mapping_count = r.read_u32()?;
            let mut bone_mapping = Vec::with_capacity(mapping_count as usize);
            for _ in 0..mapping_count {
                bone_mapping.push(r.read_u32()?);
            }
            let lod_count = r.read_u32()?;
            let mut lod_levels = Vec::with_capacity(lod_count as usize);
            for _ in 0..lod_count {
                lod_levels.push(read_header(&mut r, LodLevelRecord::SIZE, LodLevelRecord::from_bytes)?);
            }
            geometries.push(GeometrySummary {
                bone_mapping,
                lod_levels,
                center: Vec3::ZERO,
            });
        }

        let morph_count = r.read_u32()?;
        let mut morphs = Vec::with_capacity(morph_count as usize);
        for _ in 0..morph_count {
            let name = r.read_cstr()?;
            let buffer_count = r.read_u32()?;
            let mut buffers = Vec::with_capacity(buffer_count as usize);
            for _ in 0..buffer_count {
                let buffer_index = r.read_u32()?;
                let mask = r.read_u32()?;
                let vertex_count = r.read_u32()?;
                let mut vertex_size = 4;
                for element in [ELEMENT_POSITION, ELEMENT_NORMAL, ELEMENT_TANGENT] {
                    if mask & element != 0 {
                        vertex_size += 12;
                    }
                }
                r.skip(vertex_count as usize * vertex_size)?;
                buffers.push((buffer_index, mask, vertex_count));
            }
            morphs.push(MorphSummary { name, buffers });
        }

        let bone_count = r.read_u32()?;
        let mut bones = Vec::with_capacity(bone_count as usize);
        for _ in 0..bone_count {
            let name = r.read_cstr()?;
            let parent_index = r.read_u32()?;
            let position = r.read_vec3()?;
            r.skip(16 + 12 + 48)?; // rotation, scale, offset matrix
            let collision_mask = r.read_u8()?;
            if collision_mask & BONE_COLLISION_SPHERE != 0 {
                r.skip(4)?;
            }
            if collision_mask & BONE_COLLISION_BOX != 0 {
                r.skip(24)?;
            }
            bones.push(BoneSummary {
                name,
                parent_index,
                position,
                collision_mask,
            });
        }

        let bounding_box = (r.read_vec3()?, r.read_vec3()?);
        for geometry in &mut geometries {
            geometry.center = r.read_vec3()?;
        }

        Ok(Self {
            vertex_buffers,
            index_buffers,
            indices,
            geometries,
            morphs,
            bones,
            bounding_box,
        })
    }
}

fn read_header<T>(
    r: &mut BinaryReader<'_>,
    size: usize,
    parse: fn(&[u8]) -> Option<T>,
) -> Result<T, FormatError> {
    let offset = r.position();
    let bytes = r.read_bytes(size)?;
    parse(bytes).ok_or(FormatError::Truncated {
        offset,
        needed: size,
    })
}
