//! Decomposed object to engine model.

use glam::{Mat4, Quat, Vec2, Vec3, Vec4};
use hashbrown::HashMap;
use std::collections::BTreeSet;

use super::optimize::optimize_triangles;
use crate::config::ExportConfig;
use crate::decompose::{DecomposedObject, MorphDelta, TGeometry, TVertex};
use crate::diagnostics::Report;
use urho_common::{
    index_size_for, BONE_COLLISION_BOX, BONE_COLLISION_SPHERE, ELEMENT_NORMAL, ELEMENT_POSITION,
    ELEMENT_TANGENT, MAX_VERTEX_INFLUENCES,
};

/// Blend indices are stored as bytes
const MAX_BLEND_INDEX: usize = 256;

/// Minimum weight for a vertex to count towards a bone's collision volume
const COLLISION_WEIGHT: f32 = 0.33;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UrhoVertex {
    pub position: Vec3,
    pub normal: Vec3,
    pub color: Vec4,
    pub uv: Vec2,
    pub uv2: Vec2,
    pub tangent: Vec4,
    pub weights: [f32; MAX_VERTEX_INFLUENCES],
    pub indices: [u8; MAX_VERTEX_INFLUENCES],
}

#[derive(Debug, Clone, PartialEq)]
pub struct UrhoVertexBuffer {
    pub elements: u32,
    pub vertices: Vec<UrhoVertex>,
    /// Contiguous vertex range touched by morphs
    pub morph_start: u32,
    pub morph_count: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UrhoIndexBuffer {
    pub index_size: u32,
    pub indices: Vec<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UrhoLodLevel {
    pub distance: f32,
    pub vertex_buffer: u32,
    pub index_buffer: u32,
    pub index_start: u32,
    pub index_count: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UrhoGeometry {
    pub material: Option<String>,
    /// Model bone index of every blend index; empty when blend indices are
    /// model bone indices
    pub bone_mapping: Vec<u32>,
    pub lod_levels: Vec<UrhoLodLevel>,
    pub center: Vec3,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UrhoBone {
    pub name: String,
    /// Own index for the root
    pub parent: u32,
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
    /// Inverse bind matrix, 3x4 row-major
    pub offset: [f32; 12],
    pub collision_mask: u8,
    pub radius: f32,
    pub bounds: (Vec3, Vec3),
}

#[derive(Debug, Clone, PartialEq)]
pub struct UrhoMorphBuffer {
    pub vertex_buffer: u32,
    pub elements: u32,
    pub vertices: Vec<(u32, MorphDelta)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UrhoMorph {
    pub name: String,
    pub buffers: Vec<UrhoMorphBuffer>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UrhoModel {
    pub name: String,
    pub vertex_buffers: Vec<UrhoVertexBuffer>,
    pub index_buffers: Vec<UrhoIndexBuffer>,
    pub geometries: Vec<UrhoGeometry>,
    pub morphs: Vec<UrhoMorph>,
    pub bones: Vec<UrhoBone>,
    pub bounding_box: (Vec3, Vec3),
}

impl UrhoModel {
    /// Material of every geometry, in geometry order
    pub fn materials(&self) -> impl Iterator<Item = Option<&str>> {
        self.geometries.iter().map(|g| g.material.as_deref())
    }

    pub fn vertex_count(&self) -> usize {
        self.vertex_buffers.iter().map(|b| b.vertices.len()).sum()
    }

    pub fn is_skinned(&self) -> bool {
        !self.bones.is_empty()
    }
}

/// Geometry after the bone partition: one bone mapping, triangles per LOD
struct GeometryUnit<'a> {
    material: Option<&'a str>,
    mapping: Vec<u32>,
    /// `(distance, triangles)` per LOD, ascending distance
    lods: Vec<(f32, Vec<[u32; 3]>)>,
}

fn triangle_bones(object: &DecomposedObject, triangle: &[u32; 3]) -> BTreeSet<u32> {
    triangle
        .iter()
        .flat_map(|&v| object.vertices[v as usize].weights.iter())
        .filter(|(_, w)| *w > 0.0)
        .map(|(b, _)| *b)
        .collect()
}

/// Split a geometry into units using at most `limit` bones each
///
/// Triangles go to the first unit that can take their bones; every unit
/// keeps all LOD distances, possibly with no triangles.
fn split_by_bones<'a>(
    object: &DecomposedObject,
    geometry: &'a TGeometry,
    limit: usize,
) -> Vec<GeometryUnit<'a>> {
    let mut units: Vec<(BTreeSet<u32>, Vec<Vec<[u32; 3]>>)> = Vec::new();
    for (level, lod) in geometry.lods.iter().enumerate() {
        for triangle in &lod.triangles {
            let bones = triangle_bones(object, triangle);
            let fit = units
                .iter()
                .position(|(set, _)| set.union(&bones).count() <= limit);
            let index = match fit {
                Some(index) => index,
                None => {
                    units.push((BTreeSet::new(), vec![Vec::new(); geometry.lods.len()]));
                    units.len() - 1
                }
            };
            let (set, lods) = &mut units[index];
            set.extend(bones);
            lods[level].push(*triangle);
        }
    }
    units
        .into_iter()
        .map(|(set, lods)| GeometryUnit {
            material: geometry.material.as_deref(),
            mapping: set.into_iter().collect(),
            lods: geometry
                .lods
                .iter()
                .map(|l| l.distance)
                .zip(lods)
                .collect(),
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct StrictKey {
    position: [u32; 3],
    normal: [u32; 3],
    uv: [u32; 2],
}

impl StrictKey {
    fn of(v: &TVertex) -> Self {
        Self {
            position: v.position.to_array().map(f32::to_bits),
            normal: v.normal.to_array().map(f32::to_bits),
            uv: v.uv.to_array().map(f32::to_bits),
        }
    }
}

#[derive(Default)]
struct BufferBuilder {
    vertices: Vec<UrhoVertex>,
    /// Decomposed vertex index of every buffer vertex
    sources: Vec<u32>,
    indices: Vec<u32>,
}

/// Vertex reuse inside one buffer and bone mapping
#[derive(Default)]
struct Scope {
    lod0: HashMap<u32, u32>,
    strict: HashMap<StrictKey, u32>,
}

fn urho_vertex(v: &TVertex, mapping: &[u32]) -> UrhoVertex {
    let mut weights = [0.0; MAX_VERTEX_INFLUENCES];
    let mut indices = [0u8; MAX_VERTEX_INFLUENCES];
    for (slot, (bone, weight)) in v.weights.iter().take(MAX_VERTEX_INFLUENCES).enumerate() {
        let index = if mapping.is_empty() {
            *bone as usize
        } else {
            mapping.binary_search(bone).unwrap_or(0)
        };
        weights[slot] = *weight;
        indices[slot] = index.min(MAX_BLEND_INDEX - 1) as u8;
    }
    UrhoVertex {
        position: v.position,
        normal: v.normal,
        color: v.color,
        uv: v.uv,
        uv2: v.uv2,
        tangent: v.tangent,
        weights,
        indices,
    }
}

fn bounds<'v>(positions: impl Iterator<Item = &'v Vec3>) -> Option<(Vec3, Vec3)> {
    positions.fold(None, |acc, &p| match acc {
        None => Some((p, p)),
        Some((min, max)) => Some((min.min(p), max.max(p))),
    })
}

/// Build the engine model of a decomposed object
pub fn assemble_model(object: &DecomposedObject, config: &ExportConfig, report: &mut Report) -> UrhoModel {
    let settings = &config.geometry;
    let limit = settings.bones_per_geometry.min(MAX_BLEND_INDEX);
    let split_bones = object.bones.len() > limit;

    let mut units: Vec<GeometryUnit<'_>> = Vec::new();
    for geometry in &object.geometries {
        if split_bones {
            let split = split_by_bones(object, geometry, limit);
            if split.len() > 1 {
                report.info(format!(
                    "{}: geometry {} split in {} for {} bones per geometry",
                    object.name,
                    geometry.material.as_deref().unwrap_or("(none)"),
                    split.len(),
                    limit
                ));
            }
            units.extend(split);
        } else {
            units.push(GeometryUnit {
                material: geometry.material.as_deref(),
                mapping: Vec::new(),
                lods: geometry
                    .lods
                    .iter()
                    .map(|l| (l.distance, l.triangles.clone()))
                    .collect(),
            });
        }
    }

    let mut buffers: Vec<BufferBuilder> = Vec::new();
    let mut scopes: HashMap<(usize, Option<usize>), Scope> = HashMap::new();
    let mut geometries = Vec::with_capacity(units.len());

    for (unit_index, unit) in units.iter().enumerate() {
        let buffer_index = if settings.split_sub_meshes || buffers.is_empty() {
            buffers.push(BufferBuilder::default());
            buffers.len() - 1
        } else {
            0
        };
        let scope_key = (buffer_index, (!unit.mapping.is_empty()).then_some(unit_index));
        let scope = scopes.entry(scope_key).or_default();
        let buffer = &mut buffers[buffer_index];

        let mut lod_levels = Vec::with_capacity(unit.lods.len());
        for (level, (distance, triangles)) in unit.lods.iter().enumerate() {
            let mut level_map: HashMap<u32, u32> = HashMap::new();
            let mut remapped = Vec::with_capacity(triangles.len());
            for triangle in triangles {
                let mapped = triangle.map(|source| {
                    let vertex = &object.vertices[source as usize];
                    let mut append = |buffer: &mut BufferBuilder| {
                        buffer.vertices.push(urho_vertex(vertex, &unit.mapping));
                        buffer.sources.push(source);
                        (buffer.vertices.len() - 1) as u32
                    };
                    if level == 0 {
                        return *scope.lod0.entry(source).or_insert_with(|| {
                            let index = append(buffer);
                            scope.strict.entry(StrictKey::of(vertex)).or_insert(index);
                            index
                        });
                    }
                    if let Some(&index) = level_map.get(&source) {
                        return index;
                    }
                    let reused = if settings.strict_lods {
                        scope.strict.get(&StrictKey::of(vertex)).copied()
                    } else {
                        None
                    };
                    let index = reused.unwrap_or_else(|| append(buffer));
                    level_map.insert(source, index);
                    index
                });
                remapped.push(mapped);
            }
            if settings.optimize_indices {
                remapped = optimize_triangles(&remapped);
            }
            let index_start = buffer.indices.len() as u32;
            buffer.indices.extend(remapped.iter().flatten());
            lod_levels.push(UrhoLodLevel {
                distance: *distance,
                vertex_buffer: buffer_index as u32,
                index_buffer: buffer_index as u32,
                index_start,
                index_count: buffer.indices.len() as u32 - index_start,
            });
        }

        let lod0 = unit.lods.first().map(|(_, t)| t.as_slice()).unwrap_or(&[]);
        let center = bounds(lod0.iter().flatten().map(|&i| &object.vertices[i as usize].position))
            .map_or(Vec3::ZERO, |(min, max)| (min + max) * 0.5);
        geometries.push(UrhoGeometry {
            material: unit.material.map(str::to_string),
            bone_mapping: unit.mapping.clone(),
            lod_levels,
            center,
        });
    }

    let mut vertex_buffers: Vec<UrhoVertexBuffer> = buffers
        .iter()
        .map(|b| UrhoVertexBuffer {
            elements: object.elements,
            vertices: b.vertices.clone(),
            morph_start: 0,
            morph_count: 0,
        })
        .collect();
    let index_buffers = buffers
        .iter()
        .map(|b| UrhoIndexBuffer {
            index_size: index_size_for(b.vertices.len()),
            indices: b.indices.clone(),
        })
        .collect();

    let morphs = assemble_morphs(object, config, &buffers, &mut vertex_buffers);
    let bones = assemble_bones(object, config);
    let bounding_box = bounds(vertex_buffers.iter().flat_map(|b| b.vertices.iter().map(|v| &v.position)))
        .unwrap_or((Vec3::ZERO, Vec3::ZERO));

    tracing::debug!(
        "Model {}: {} vertices, {} geometries, {} bones, {} morphs",
        object.name,
        vertex_buffers.iter().map(|b| b.vertices.len()).sum::<usize>(),
        geometries.len(),
        bones.len(),
        morphs.len()
    );
    UrhoModel {
        name: object.mesh_name.clone(),
        vertex_buffers,
        index_buffers,
        geometries,
        morphs,
        bones,
        bounding_box,
    }
}

fn assemble_morphs(
    object: &DecomposedObject,
    config: &ExportConfig,
    buffers: &[BufferBuilder],
    vertex_buffers: &mut [UrhoVertexBuffer],
) -> Vec<UrhoMorph> {
    let mut ranges: Vec<Option<(u32, u32)>> = vec![None; buffers.len()];
    let mut morphs = Vec::with_capacity(object.morphs.len());
    for morph in &object.morphs {
        let deltas: HashMap<u32, MorphDelta> = morph.deltas.iter().copied().collect();
        let mut morph_buffers = Vec::new();
        for (index, buffer) in buffers.iter().enumerate() {
            let available = vertex_buffers[index].elements;
            let mut elements = ELEMENT_POSITION;
            if config.morph.normal && available & ELEMENT_NORMAL != 0 {
                elements |= ELEMENT_NORMAL;
            }
            if config.morph.tangent && available & ELEMENT_TANGENT != 0 {
                elements |= ELEMENT_TANGENT;
            }
            let vertices: Vec<(u32, MorphDelta)> = buffer
                .sources
                .iter()
                .enumerate()
                .filter_map(|(i, source)| deltas.get(source).map(|d| (i as u32, *d)))
                .collect();
            let (Some(first), Some(last)) = (vertices.first(), vertices.last()) else {
                continue;
            };
            ranges[index] = Some(match ranges[index] {
                Some((lo, hi)) => (lo.min(first.0), hi.max(last.0)),
                None => (first.0, last.0),
            });
            morph_buffers.push(UrhoMorphBuffer {
                vertex_buffer: index as u32,
                elements,
                vertices,
            });
        }
        if !morph_buffers.is_empty() {
            morphs.push(UrhoMorph {
                name: morph.name.clone(),
                buffers: morph_buffers,
            });
        }
    }
    for (buffer, range) in vertex_buffers.iter_mut().zip(ranges) {
        if let Some((lo, hi)) = range {
            buffer.morph_start = lo;
            buffer.morph_count = hi - lo + 1;
        }
    }
    morphs
}

fn offset_matrix(inverse_bind: &Mat4) -> [f32; 12] {
    let mut offset = [0.0; 12];
    for row in 0..3 {
        offset[row * 4..row * 4 + 4].copy_from_slice(&inverse_bind.row(row).to_array());
    }
    offset
}

fn assemble_bones(object: &DecomposedObject, config: &ExportConfig) -> Vec<UrhoBone> {
    let inverse_binds: Vec<Mat4> = object.bones.iter().map(|b| b.bind.to_mat4().inverse()).collect();

    // Bone space positions of the vertices each bone drives
    let mut influenced: Vec<Vec<Vec3>> = vec![Vec::new(); object.bones.len()];
    for vertex in &object.vertices {
        for &(bone, weight) in &vertex.weights {
            if weight >= COLLISION_WEIGHT {
                if let Some(points) = influenced.get_mut(bone as usize) {
                    points.push(inverse_binds[bone as usize].transform_point3(vertex.position));
                }
            }
        }
    }

    object
        .bones
        .iter()
        .enumerate()
        .map(|(index, bone)| {
            let points = &influenced[index];
            let (collision_mask, radius, bounds) = match bounds(points.iter()) {
                Some((mut min, mut max)) => {
                    let radius = points.iter().map(|p| p.length()).fold(0.0, f32::max);
                    if config.skeleton.clamp_bounding_box {
                        // Bones extend along their local Z after the axis remap
                        min.z = min.z.clamp(0.0, bone.length);
                        max.z = max.z.clamp(0.0, bone.length);
                    }
                    (BONE_COLLISION_SPHERE | BONE_COLLISION_BOX, radius, (min, max))
                }
                None => (0, 0.0, (Vec3::ZERO, Vec3::ZERO)),
            };
            UrhoBone {
                name: bone.name.clone(),
                parent: bone.parent.unwrap_or(index) as u32,
                position: bone.local.translation,
                rotation: bone.local.rotation,
                scale: bone.local.scale,
                offset: offset_matrix(&inverse_binds[index]),
                collision_mask,
                radius,
                bounds,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ExportSettings, ShapeType};
    use crate::decompose::{Influences, PhysicsSettings, TBone, TLod, TMorph};
    use crate::math::Transform;
    use crate::source::ObjectKind;
    use urho_common::{ELEMENT_BLENDINDICES, ELEMENT_BLENDWEIGHTS, ELEMENT_TEXCOORD1};

    fn config(edit: impl FnOnce(&mut ExportSettings)) -> ExportConfig {
        let mut settings = ExportSettings::default();
        settings.output.path = "out".into();
        edit(&mut settings);
        settings.validate().expect("valid settings")
    }

    fn vertex(position: Vec3) -> TVertex {
        TVertex {
            source_index: 0,
            position,
            normal: Vec3::Y,
            color: Vec4::ZERO,
            uv: Vec2::new(position.x, position.z),
            uv2: Vec2::ZERO,
            tangent: Vec4::ZERO,
            weights: Influences::new(),
        }
    }

    fn quad() -> Vec<TVertex> {
        [Vec3::ZERO, Vec3::X, Vec3::new(1.0, 0.0, 1.0), Vec3::Z]
            .into_iter()
            .map(vertex)
            .collect()
    }

    fn object(vertices: Vec<TVertex>, geometries: Vec<TGeometry>) -> DecomposedObject {
        DecomposedObject {
            name: "Quad".to_string(),
            object_name: Some("Quad".to_string()),
            mesh_name: "Quad".to_string(),
            kind: ObjectKind::Mesh,
            elements: ELEMENT_POSITION | ELEMENT_NORMAL | ELEMENT_TEXCOORD1,
            vertices,
            geometries,
            bones: Vec::new(),
            morphs: Vec::new(),
            animations: Vec::new(),
            physics: PhysicsSettings {
                shape: ShapeType::Box,
                collision_bounds: None,
            },
        }
    }

    /// LOD1 is a copy of LOD0 built from different decomposed vertices
    fn two_level_quad() -> DecomposedObject {
        let mut vertices = quad();
        vertices.extend(quad());
        object(
            vertices,
            vec![TGeometry {
                material: Some("Mat".to_string()),
                lods: vec![
                    TLod {
                        distance: 0.0,
                        triangles: vec![[0, 2, 1], [0, 3, 2]],
                    },
                    TLod {
                        distance: 10.0,
                        triangles: vec![[4, 6, 5], [4, 7, 6]],
                    },
                ],
            }],
        )
    }

    #[test]
    fn test_strict_lods_reuse_vertices() {
        let mut report = Report::new();
        let model = assemble_model(&two_level_quad(), &config(|s| s.geometry.strict_lods = true), &mut report);
        assert_eq!(model.vertex_buffers[0].vertices.len(), 4);
        let lods = &model.geometries[0].lod_levels;
        assert_eq!(lods.len(), 2);
        assert_eq!(lods[1].index_start, 6);
        assert_eq!(lods[1].index_count, 6);
        assert_eq!(lods[1].distance, 10.0);
    }

    #[test]
    fn test_loose_lods_insert_vertices() {
        let mut report = Report::new();
        let model = assemble_model(&two_level_quad(), &config(|s| s.geometry.strict_lods = false), &mut report);
        assert_eq!(model.vertex_buffers[0].vertices.len(), 8);
    }

    #[test]
    fn test_bounding_box_and_center() {
        let mut report = Report::new();
        let model = assemble_model(&two_level_quad(), &config(|_| {}), &mut report);
        assert_eq!(model.bounding_box, (Vec3::ZERO, Vec3::new(1.0, 0.0, 1.0)));
        assert_eq!(model.geometries[0].center, Vec3::new(0.5, 0.0, 0.5));
        assert_eq!(model.index_buffers[0].index_size, 2);
    }

    #[test]
    fn test_split_sub_meshes_gives_own_buffers() {
        let mut quad_object = object(
            quad(),
            vec![
                TGeometry {
                    material: Some("A".to_string()),
                    lods: vec![TLod {
                        distance: 0.0,
                        triangles: vec![[0, 2, 1]],
                    }],
                },
                TGeometry {
                    material: Some("B".to_string()),
                    lods: vec![TLod {
                        distance: 0.0,
                        triangles: vec![[0, 3, 2]],
                    }],
                },
            ],
        );
        let mut report = Report::new();
        let shared = assemble_model(&quad_object, &config(|s| s.geometry.split_sub_meshes = false), &mut report);
        assert_eq!(shared.vertex_buffers.len(), 1);
        assert_eq!(shared.vertex_buffers[0].vertices.len(), 4);

        quad_object.name = "Split".to_string();
        let split = assemble_model(&quad_object, &config(|s| s.geometry.split_sub_meshes = true), &mut report);
        assert_eq!(split.vertex_buffers.len(), 2);
        assert_eq!(split.geometries[1].lod_levels[0].vertex_buffer, 1);
        assert_eq!(split.vertex_buffers[1].vertices.len(), 3);
    }

    /// A strip of triangles each driven by its own bones
    #[test]
    fn test_bone_partition() {
        let bone_count = 80u32;
        let mut vertices = Vec::new();
        let mut triangles = Vec::new();
        let mut bones = Vec::new();
        for b in 0..bone_count {
            bones.push(TBone {
                name: format!("b{b}"),
                parent: None,
                local: Transform::IDENTITY,
                bind: Transform::IDENTITY,
                length: 1.0,
            });
            let base = vertices.len() as u32;
            for corner in 0..3 {
                let mut v = vertex(Vec3::new(b as f32, 0.0, corner as f32));
                v.weights.push((b, 1.0));
                vertices.push(v);
            }
            triangles.push([base, base + 1, base + 2]);
        }
        let mut skinned = object(
            vertices,
            vec![TGeometry {
                material: None,
                lods: vec![TLod {
                    distance: 0.0,
                    triangles,
                }],
            }],
        );
        skinned.bones = bones;
        skinned.elements |= ELEMENT_BLENDWEIGHTS | ELEMENT_BLENDINDICES;

        let mut report = Report::new();
        let config = config(|s| {
            s.skeleton.enabled = true;
            s.geometry.bones_per_geometry = 64;
        });
        let model = assemble_model(&skinned, &config, &mut report);
        assert_eq!(model.geometries.len(), 2);
        assert_eq!(model.geometries[0].bone_mapping.len(), 64);
        assert_eq!(model.geometries[1].bone_mapping, (64..80).collect::<Vec<u32>>());
        // Blend indices are local to the mapping
        let last = model
            .vertex_buffers
            .last()
            .and_then(|b| b.vertices.last())
            .expect("vertex");
        assert_eq!(last.indices[0], 15);
        assert_eq!(model.bones.len(), 80);
        assert_eq!(model.bones[3].parent, 3);
    }

    #[test]
    fn test_morph_range() {
        let mut quad_object = two_level_quad();
        quad_object.geometries[0].lods.truncate(1);
        quad_object.morphs.push(TMorph {
            name: "Bulge".to_string(),
            deltas: vec![
                (
                    1,
                    MorphDelta {
                        position: Vec3::Y,
                        ..Default::default()
                    },
                ),
                (
                    3,
                    MorphDelta {
                        position: Vec3::Y,
                        ..Default::default()
                    },
                ),
            ],
        });
        let mut report = Report::new();
        let config = config(|s| s.morph.enabled = true);
        let model = assemble_model(&quad_object, &config, &mut report);
        assert_eq!(model.morphs.len(), 1);
        let buffer = &model.morphs[0].buffers[0];
        assert_eq!(buffer.vertices.len(), 2);
        let vb = &model.vertex_buffers[0];
        let first = buffer.vertices[0].0;
        assert_eq!(vb.morph_start, first);
        assert_eq!(vb.morph_start + vb.morph_count - 1, buffer.vertices[1].0);
    }
}
