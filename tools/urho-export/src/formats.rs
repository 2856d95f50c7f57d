//! Binary model and animation writers
//!
//! Layouts are defined in `urho_common::formats`; these functions only
//! serialize the assembled structures, in a fixed order, so identical input
//! produces identical bytes.

use anyhow::{Context, Result};
use std::path::Path;

use crate::assemble::{UrhoAnimation, UrhoModel, UrhoVertex};
use urho_common::{
    pack_color_unorm8, BinarySerializable, BinaryWriter, IndexBufferHeader, LodLevelRecord,
    VertexBufferHeader, ANIMATION_MAGIC, BONE_COLLISION_BOX, BONE_COLLISION_SPHERE,
    ELEMENT_BLENDINDICES, ELEMENT_BLENDWEIGHTS, ELEMENT_COLOR, ELEMENT_NORMAL, ELEMENT_POSITION,
    ELEMENT_TANGENT, ELEMENT_TEXCOORD1, ELEMENT_TEXCOORD2, MODEL_MAGIC, TRACK_POSITION,
    TRACK_ROTATION, TRACK_SCALE,
};

fn write_vertex(w: &mut BinaryWriter, v: &UrhoVertex, elements: u32) {
    if elements & ELEMENT_POSITION != 0 {
        w.write_vec3(v.position);
    }
    if elements & ELEMENT_NORMAL != 0 {
        w.write_vec3(v.normal);
    }
    if elements & ELEMENT_COLOR != 0 {
        w.write_bytes(&pack_color_unorm8(v.color.to_array()));
    }
    if elements & ELEMENT_TEXCOORD1 != 0 {
        w.write_f32(v.uv.x);
        w.write_f32(v.uv.y);
    }
    if elements & ELEMENT_TEXCOORD2 != 0 {
        w.write_f32(v.uv2.x);
        w.write_f32(v.uv2.y);
    }
    if elements & ELEMENT_TANGENT != 0 {
        for c in v.tangent.to_array() {
            w.write_f32(c);
        }
    }
    if elements & ELEMENT_BLENDWEIGHTS != 0 {
        for weight in v.weights {
            w.write_f32(weight);
        }
    }
    if elements & ELEMENT_BLENDINDICES != 0 {
        w.write_bytes(&v.indices);
    }
}

/// Serialize a model to the binary model layout
pub fn model_to_bytes(model: &UrhoModel) -> Vec<u8> {
    let mut w = BinaryWriter::new();
    w.write_bytes(MODEL_MAGIC);

    w.write_u32(model.vertex_buffers.len() as u32);
    for buffer in &model.vertex_buffers {
        let header = VertexBufferHeader::new(buffer.vertices.len() as u32, buffer.elements)
            .with_morph_range(buffer.morph_start, buffer.morph_count);
        w.write_bytes(&header.serialize());
        for vertex in &buffer.vertices {
            write_vertex(&mut w, vertex, buffer.elements);
        }
    }

    w.write_u32(model.index_buffers.len() as u32);
    for buffer in &model.index_buffers {
        let header = IndexBufferHeader::new(buffer.indices.len() as u32, buffer.index_size);
        w.write_bytes(&header.serialize());
        for &index in &buffer.indices {
            if buffer.index_size == 2 {
                w.write_u16(index as u16);
            } else {
                w.write_u32(index);
            }
        }
    }

    w.write_u32(model.geometries.len() as u32);
    for geometry in &model.geometries {
        w.write_u32(geometry.bone_mapping.len() as u32);
        for &bone in &geometry.bone_mapping {
            w.write_u32(bone);
        }
        w.write_u32(geometry.lod_levels.len() as u32);
        for lod in &geometry.lod_levels {
            let record = LodLevelRecord::triangles(
                lod.distance,
                lod.vertex_buffer,
                lod.index_buffer,
                lod.index_start,
                lod.index_count,
            );
            w.write_bytes(&record.serialize());
        }
    }

    w.write_u32(model.morphs.len() as u32);
    for morph in &model.morphs {
        w.write_cstr(&morph.name);
        w.write_u32(morph.buffers.len() as u32);
        for buffer in &morph.buffers {
            w.write_u32(buffer.vertex_buffer);
            w.write_u32(buffer.elements);
            w.write_u32(buffer.vertices.len() as u32);
            for (index, delta) in &buffer.vertices {
                w.write_u32(*index);
                if buffer.elements & ELEMENT_POSITION != 0 {
                    w.write_vec3(delta.position);
                }
                if buffer.elements & ELEMENT_NORMAL != 0 {
                    w.write_vec3(delta.normal);
                }
                if buffer.elements & ELEMENT_TANGENT != 0 {
                    w.write_vec3(delta.tangent);
                }
            }
        }
    }

    w.write_u32(model.bones.len() as u32);
    for bone in &model.bones {
        w.write_cstr(&bone.name);
        w.write_u32(bone.parent);
        w.write_vec3(bone.position);
        w.write_quat(bone.rotation);
        w.write_vec3(bone.scale);
        for value in bone.offset {
            w.write_f32(value);
        }
        w.write_u8(bone.collision_mask);
        if bone.collision_mask & BONE_COLLISION_SPHERE != 0 {
            w.write_f32(bone.radius);
        }
        if bone.collision_mask & BONE_COLLISION_BOX != 0 {
            w.write_vec3(bone.bounds.0);
            w.write_vec3(bone.bounds.1);
        }
    }

    w.write_vec3(model.bounding_box.0);
    w.write_vec3(model.bounding_box.1);
    for geometry in &model.geometries {
        w.write_vec3(geometry.center);
    }
    w.into_inner()
}

/// Serialize an animation to the binary animation layout
pub fn animation_to_bytes(animation: &UrhoAnimation) -> Vec<u8> {
    let mut w = BinaryWriter::new();
    w.write_bytes(ANIMATION_MAGIC);
    w.write_cstr(&animation.name);
    w.write_f32(animation.length);
    w.write_u32(animation.tracks.len() as u32);
    for track in &animation.tracks {
        w.write_cstr(&track.name);
        w.write_u8(track.mask);
        w.write_u32(track.keyframes.len() as u32);
        for keyframe in &track.keyframes {
            w.write_f32(keyframe.time);
            if track.mask & TRACK_POSITION != 0 {
                w.write_vec3(keyframe.position);
            }
            if track.mask & TRACK_ROTATION != 0 {
                w.write_quat(keyframe.rotation);
            }
            if track.mask & TRACK_SCALE != 0 {
                w.write_vec3(keyframe.scale);
            }
        }
    }
    w.into_inner()
}

/// Write a model file
pub fn write_urho_model(model: &UrhoModel, path: &Path) -> Result<()> {
    std::fs::write(path, model_to_bytes(model))
        .with_context(|| format!("Failed to write model: {}", path.display()))
}

/// Write an animation file
pub fn write_urho_animation(animation: &UrhoAnimation, path: &Path) -> Result<()> {
    std::fs::write(path, animation_to_bytes(animation))
        .with_context(|| format!("Failed to write animation: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assemble::{UrhoBone, UrhoGeometry, UrhoIndexBuffer, UrhoLodLevel, UrhoTrack, UrhoVertexBuffer};
    use crate::decompose::TKeyframe;
    use glam::{Quat, Vec2, Vec3, Vec4};
    use urho_common::{AnimationSummary, ModelSummary};

    fn triangle_model() -> UrhoModel {
        let vertex = |position: Vec3| UrhoVertex {
            position,
            normal: Vec3::Y,
            color: Vec4::ONE,
            uv: Vec2::ZERO,
            uv2: Vec2::ZERO,
            tangent: Vec4::ZERO,
            weights: [1.0, 0.0, 0.0, 0.0],
            indices: [0; 4],
        };
        UrhoModel {
            name: "Tri".to_string(),
            vertex_buffers: vec![UrhoVertexBuffer {
                elements: ELEMENT_POSITION | ELEMENT_NORMAL | ELEMENT_COLOR | ELEMENT_BLENDWEIGHTS | ELEMENT_BLENDINDICES,
                vertices: vec![vertex(Vec3::ZERO), vertex(Vec3::X), vertex(Vec3::Z)],
                morph_start: 0,
                morph_count: 0,
            }],
            index_buffers: vec![UrhoIndexBuffer {
                index_size: 2,
                indices: vec![0, 2, 1],
            }],
            geometries: vec![UrhoGeometry {
                material: None,
                bone_mapping: Vec::new(),
                lod_levels: vec![UrhoLodLevel {
                    distance: 0.0,
                    vertex_buffer: 0,
                    index_buffer: 0,
                    index_start: 0,
                    index_count: 3,
                }],
                center: Vec3::new(0.5, 0.0, 0.5),
            }],
            morphs: Vec::new(),
            bones: vec![UrhoBone {
                name: "Root".to_string(),
                parent: 0,
                position: Vec3::ZERO,
                rotation: Quat::IDENTITY,
                scale: Vec3::ONE,
                offset: [1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0],
                collision_mask: BONE_COLLISION_SPHERE | BONE_COLLISION_BOX,
                radius: 1.0,
                bounds: (Vec3::ZERO, Vec3::ONE),
            }],
            bounding_box: (Vec3::ZERO, Vec3::new(1.0, 0.0, 1.0)),
        }
    }

    #[test]
    fn test_model_reads_back() {
        let bytes = model_to_bytes(&triangle_model());
        let summary = ModelSummary::parse(&bytes).expect("parse model");
        assert_eq!(summary.vertex_buffers[0].vertex_count, 3);
        assert_eq!(summary.indices[0], vec![0, 2, 1]);
        assert_eq!(summary.geometries[0].lod_levels[0].index_count, 3);
        assert_eq!(summary.geometries[0].center, Vec3::new(0.5, 0.0, 0.5));
        assert_eq!(summary.bones[0].name, "Root");
        assert_eq!(summary.bounding_box.1, Vec3::new(1.0, 0.0, 1.0));
    }

    #[test]
    fn test_model_bytes_are_deterministic() {
        assert_eq!(model_to_bytes(&triangle_model()), model_to_bytes(&triangle_model()));
    }

    #[test]
    fn test_animation_reads_back() {
        let keyframe = |time: f32| TKeyframe {
            time,
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        };
        let animation = UrhoAnimation {
            name: "Idle".to_string(),
            length: 1.0,
            tracks: vec![UrhoTrack {
                name: "Root".to_string(),
                mask: TRACK_POSITION | TRACK_ROTATION,
                keyframes: vec![keyframe(0.0), keyframe(1.0)],
            }],
            triggers: Vec::new(),
        };
        let summary = AnimationSummary::parse(&animation_to_bytes(&animation)).expect("parse animation");
        assert_eq!(summary.name, "Idle");
        let track = summary.track("Root").expect("track");
        assert_eq!(track.mask, TRACK_POSITION | TRACK_ROTATION);
        assert_eq!(track.keyframe_times, vec![0.0, 1.0]);
    }
}
