//! Mesh extraction and grouping.

use glam::{Mat4, Vec2, Vec3, Vec4};
use hashbrown::HashMap;
use std::collections::BTreeSet;

use super::{
    morph, tangent, DecomposedObject, Influences, PhysicsSettings, SkeletonData, TAnimation,
    TBone, TGeometry, TLod, TMorph, TVertex,
};
use crate::config::{ExportConfig, ShapeType};
use crate::diagnostics::{
    Report, INVALID_POLYGON, INVALID_WEIGHTS, MISSING_COLOR, MISSING_UV, MISSING_UV2,
    MISSING_WEIGHTS, TOO_MANY_WEIGHTS,
};
use crate::export::ExportContext;
use crate::math::{SpaceTransform, Transform};
use crate::source::{MeshData, ObjectKind, SceneObject};
use urho_common::{
    ELEMENT_BLENDINDICES, ELEMENT_BLENDWEIGHTS, ELEMENT_COLOR, ELEMENT_NORMAL, ELEMENT_POSITION,
    ELEMENT_TANGENT, ELEMENT_TEXCOORD1, ELEMENT_TEXCOORD2,
};

/// Elements requested by the configuration
pub(crate) fn requested_elements(config: &ExportConfig, skinned: bool) -> u32 {
    let g = &config.geometry;
    let mut mask = ELEMENT_POSITION;
    if g.normal {
        mask |= ELEMENT_NORMAL;
    }
    if g.color {
        mask |= ELEMENT_COLOR;
    }
    if g.uv {
        mask |= ELEMENT_TEXCOORD1;
    }
    if g.uv2 {
        mask |= ELEMENT_TEXCOORD2;
    }
    if g.tangent {
        mask |= ELEMENT_TANGENT;
    }
    if g.weights && skinned {
        mask |= ELEMENT_BLENDWEIGHTS | ELEMENT_BLENDINDICES;
    }
    mask
}

/// Valid polygons of a mesh and the conversion into engine space
pub(crate) struct MeshBuild<'m> {
    pub mesh: &'m MeshData,
    /// `(polygon index, first loop index)` of every usable polygon
    pub polygons: Vec<(usize, usize)>,
    world: Option<Mat4>,
    /// Inverse transpose of `world`
    normal_matrix: Option<Mat4>,
    space: SpaceTransform,
}

impl<'m> MeshBuild<'m> {
    fn new(
        mesh: &'m MeshData,
        world: Option<&Transform>,
        space: SpaceTransform,
        object: &str,
        ctx: &mut ExportContext<'_>,
    ) -> Self {
        let vertex_count = mesh.positions.len() as u32;
        let mut polygons = Vec::with_capacity(mesh.polygons.len());
        let mut loop_start = 0;
        for (index, polygon) in mesh.polygons.iter().enumerate() {
            let start = loop_start;
            loop_start += polygon.vertices.len();
            let bad: Vec<u32> = polygon
                .vertices
                .iter()
                .copied()
                .filter(|&v| v >= vertex_count)
                .collect();
            if !bad.is_empty() {
                for v in bad {
                    ctx.ledger.record(INVALID_POLYGON, object, v);
                }
                continue;
            }
            if polygon.vertices.len() < 3 {
                continue;
            }
            polygons.push((index, start));
        }
        let world = world.map(Transform::to_mat4);
        Self {
            mesh,
            polygons,
            normal_matrix: world.map(|m| m.inverse().transpose()),
            world,
            space,
        }
    }

    pub fn point(&self, p: Vec3) -> Vec3 {
        let p = match &self.world {
            Some(m) => m.transform_point3(p),
            None => p,
        };
        self.space.point(p)
    }

    pub fn direction(&self, n: Vec3) -> Vec3 {
        let n = match &self.normal_matrix {
            Some(m) => m.transform_vector3(n),
            None => n,
        };
        self.space.direction(n)
    }

    /// Vertices referenced by usable polygons, ascending
    fn used_vertices(&self) -> BTreeSet<u32> {
        self.polygons
            .iter()
            .flat_map(|&(p, _)| self.mesh.polygons[p].vertices.iter().copied())
            .collect()
    }

    /// Authoring-space normal of every loop
    ///
    /// Smooth polygons use vertex normals (the mesh's own when `provided`
    /// allows it, area-weighted face normals otherwise); flat polygons use
    /// their face normal.
    pub fn corner_normals(&self, positions: &[Vec3], provided: bool) -> Vec<Vec3> {
        let mut face_normals = Vec::with_capacity(self.polygons.len());
        let mut vertex_normals = vec![Vec3::ZERO; positions.len()];
        for &(p, _) in &self.polygons {
            let vertices = &self.mesh.polygons[p].vertices;
            // Newell's method, length proportional to area
            let mut n = Vec3::ZERO;
            for i in 0..vertices.len() {
                let a = positions[vertices[i] as usize];
                let b = positions[vertices[(i + 1) % vertices.len()] as usize];
                n += Vec3::new(
                    (a.y - b.y) * (a.z + b.z),
                    (a.z - b.z) * (a.x + b.x),
                    (a.x - b.x) * (a.y + b.y),
                );
            }
            for &v in vertices {
                vertex_normals[v as usize] += n;
            }
            face_normals.push(n.normalize_or_zero());
        }
        if provided && self.mesh.normals.len() == positions.len() {
            vertex_normals = self.mesh.normals.iter().map(|n| Vec3::from_array(*n)).collect();
        }

        let mut corners = vec![Vec3::ZERO; self.mesh.loop_count()];
        for (face, &(p, start)) in self.polygons.iter().enumerate() {
            let polygon = &self.mesh.polygons[p];
            for (corner, &v) in polygon.vertices.iter().enumerate() {
                corners[start + corner] = if polygon.smooth {
                    vertex_normals[v as usize].normalize_or_zero()
                } else {
                    face_normals[face]
                };
            }
        }
        corners
    }

    /// Material slot names of the object, falling back to the mesh's
    fn material_name<'a>(&'a self, object: &'a SceneObject, slot: u32) -> Option<&'a str> {
        let slots = if object.materials.is_empty() {
            &self.mesh.materials
        } else {
            &object.materials
        };
        slots.get(slot as usize).and_then(|m| m.as_deref())
    }
}

/// Vertex identity after attribute conversion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct VertexKey {
    source: u32,
    normal: [u32; 3],
    uv: [u32; 2],
    uv2: [u32; 2],
    color: [u32; 4],
}

fn bits2(v: Vec2) -> [u32; 2] {
    [v.x.to_bits(), v.y.to_bits()]
}

fn bits3(v: Vec3) -> [u32; 3] {
    [v.x.to_bits(), v.y.to_bits(), v.z.to_bits()]
}

fn bits4(v: Vec4) -> [u32; 4] {
    [v.x.to_bits(), v.y.to_bits(), v.z.to_bits(), v.w.to_bits()]
}

/// Geometry of one source object before grouping
pub(crate) struct MeshPart {
    pub object: String,
    pub elements: u32,
    pub vertices: Vec<TVertex>,
    /// Triangles per material, in order of first use
    pub geometries: Vec<(Option<String>, Vec<[u32; 3]>)>,
    pub bones: Vec<TBone>,
    pub morphs: Vec<TMorph>,
}

/// Extract one mesh object; `None` when it has no usable polygons
pub(crate) fn extract_mesh(
    ctx: &mut ExportContext<'_>,
    object: &SceneObject,
    mesh: &MeshData,
    skeleton: Option<&SkeletonData>,
    world: Option<&Transform>,
) -> Option<MeshPart> {
    let config = ctx.config;
    let name = object.name.as_str();
    let build = MeshBuild::new(mesh, world, config.space(), name, ctx);
    if build.polygons.is_empty() {
        return None;
    }

    let mut elements = requested_elements(config, skeleton.is_some());
    let used = build.used_vertices();
    let force = config.geometry.force_elements;

    // Requested layers the mesh does not have
    let checks = [
        (ELEMENT_TEXCOORD1, MISSING_UV, mesh.uv_layers.is_empty()),
        (ELEMENT_TEXCOORD2, MISSING_UV2, mesh.uv_layers.len() < 2),
        (ELEMENT_COLOR, MISSING_COLOR, mesh.color_layers.is_empty()),
    ];
    for (element, category, missing) in checks {
        if elements & element == 0 {
            continue;
        }
        ctx.ledger.touch(category);
        if !missing {
            continue;
        }
        for &v in &used {
            ctx.ledger.record(category, name, v);
        }
        if force {
            ctx.report.warning(format!("Object {}: {}, filled with zeros", name, category));
        } else {
            elements &= !element;
            ctx.report.warning(format!("Object {}: {}, element not exported", name, category));
        }
    }
    if elements & ELEMENT_TANGENT != 0 && elements & ELEMENT_TEXCOORD1 == 0 {
        elements &= !ELEMENT_TANGENT;
        ctx.report.warning(format!("Object {}: tangents need UVs, not exported", name));
    }

    let influences = if elements & ELEMENT_BLENDWEIGHTS != 0 {
        skeleton.map(|s| vertex_influences(ctx, object, mesh, s, &used))
    } else {
        None
    };

    let positions: Vec<Vec3> = mesh.positions.iter().map(|p| Vec3::from_array(*p)).collect();
    let corner_normals = build.corner_normals(&positions, true);

    let mut vertices: Vec<TVertex> = Vec::new();
    let mut corners: Vec<usize> = Vec::new();
    let mut lookup: HashMap<VertexKey, u32> = HashMap::new();
    let mut geometries: Vec<(Option<String>, Vec<[u32; 3]>)> = Vec::new();
    let mut partial_layers = BTreeSet::new();

    for &(p, start) in &build.polygons {
        let polygon = &mesh.polygons[p];
        let mut corner_vertices = Vec::with_capacity(polygon.vertices.len());
        for (corner, &v) in polygon.vertices.iter().enumerate() {
            let loop_index = start + corner;
            let mut vertex = TVertex {
                source_index: v,
                position: build.point(positions[v as usize]),
                normal: Vec3::ZERO,
                color: Vec4::ZERO,
                uv: Vec2::ZERO,
                uv2: Vec2::ZERO,
                tangent: Vec4::ZERO,
                weights: Influences::new(),
            };
            if elements & ELEMENT_NORMAL != 0 {
                vertex.normal = build.direction(corner_normals[loop_index]);
            }
            if elements & ELEMENT_COLOR != 0 {
                match mesh.color(loop_index) {
                    Some(c) if config.geometry.color_alpha => vertex.color = c,
                    Some(c) => vertex.color = c.truncate().extend(1.0),
                    None if !mesh.color_layers.is_empty() => {
                        partial_layers.insert((MISSING_COLOR, v));
                    }
                    None => {}
                }
            }
            for (element, layer, category) in [
                (ELEMENT_TEXCOORD1, 0, MISSING_UV),
                (ELEMENT_TEXCOORD2, 1, MISSING_UV2),
            ] {
                if elements & element == 0 {
                    continue;
                }
                // Engine texture space has V pointing down
                let uv = match mesh.uv(layer, loop_index) {
                    Some(uv) => Vec2::new(uv.x, 1.0 - uv.y),
                    None => {
                        if mesh.uv_layers.len() > layer {
                            partial_layers.insert((category, v));
                        }
                        Vec2::ZERO
                    }
                };
                if layer == 0 {
                    vertex.uv = uv;
                } else {
                    vertex.uv2 = uv;
                }
            }
            if let Some(influences) = &influences {
                vertex.weights = influences[v as usize].clone();
            }

            let key = VertexKey {
                source: v,
                normal: bits3(vertex.normal),
                uv: bits2(vertex.uv),
                uv2: bits2(vertex.uv2),
                color: bits4(vertex.color),
            };
            let index = *lookup.entry(key).or_insert_with(|| {
                vertices.push(vertex);
                corners.push(loop_index);
                (vertices.len() - 1) as u32
            });
            corner_vertices.push(index);
        }

        let material = build.material_name(object, polygon.material).map(str::to_string);
        let slot = match geometries.iter().position(|(m, _)| *m == material) {
            Some(slot) => slot,
            None => {
                geometries.push((material, Vec::new()));
                geometries.len() - 1
            }
        };
        // Fan triangulation
        for i in 1..corner_vertices.len() - 1 {
            geometries[slot]
                .1
                .push([corner_vertices[0], corner_vertices[i], corner_vertices[i + 1]]);
        }
    }

    for (category, v) in partial_layers {
        ctx.ledger.record(category, name, v);
    }

    if elements & ELEMENT_TANGENT != 0 {
        let triangles: Vec<[u32; 3]> = geometries.iter().flat_map(|(_, t)| t.iter().copied()).collect();
        let tangents = tangent::generate_tangents(
            &vertices.iter().map(|v| v.position).collect::<Vec<_>>(),
            &vertices.iter().map(|v| v.normal).collect::<Vec<_>>(),
            &vertices.iter().map(|v| v.uv).collect::<Vec<_>>(),
            &triangles,
        );
        for (vertex, tangent) in vertices.iter_mut().zip(tangents) {
            vertex.tangent = tangent;
        }
    }

    let morphs = if config.morph.enabled && !mesh.shape_keys.is_empty() {
        let triangles: Vec<[u32; 3]> = geometries.iter().flat_map(|(_, t)| t.iter().copied()).collect();
        morph::extract_morphs(
            &build,
            &vertices,
            &corners,
            &triangles,
            elements,
            config,
            &mut ctx.report,
        )
    } else {
        Vec::new()
    };

    Some(MeshPart {
        object: name.to_string(),
        elements,
        vertices,
        geometries,
        bones: skeleton.map(|s| s.bones.clone()).unwrap_or_default(),
        morphs,
    })
}

/// Normalized bone influences per source vertex
fn vertex_influences(
    ctx: &mut ExportContext<'_>,
    object: &SceneObject,
    mesh: &MeshData,
    skeleton: &SkeletonData,
    used: &BTreeSet<u32>,
) -> Vec<Influences> {
    let config = ctx.config;
    let name = object.name.as_str();
    let limit = config.geometry.bones_per_vertex;
    for category in [MISSING_WEIGHTS, INVALID_WEIGHTS, TOO_MANY_WEIGHTS] {
        ctx.ledger.touch(category);
    }

    let parent_bone = if config.skeleton.parent_bone_skinning {
        object
            .parent_bone
            .as_deref()
            .and_then(|bone| skeleton.index_of(bone))
    } else {
        None
    };

    let mut out = vec![Influences::new(); mesh.positions.len()];
    for &v in used {
        if let Some(bone) = parent_bone {
            out[v as usize].push((bone as u32, 1.0));
            continue;
        }

        let raw = mesh.weights.get(v as usize).map(Vec::as_slice).unwrap_or(&[]);
        let mut influences: Influences = raw
            .iter()
            .filter_map(|&(group, weight)| {
                let group_name = mesh.vertex_groups.get(group as usize)?;
                let bone = skeleton.index_of(group_name)?;
                Some((bone as u32, weight))
            })
            .collect();
        if influences.is_empty() {
            ctx.ledger.record(MISSING_WEIGHTS, name, v);
            continue;
        }
        influences.retain(|(_, w)| w.is_finite() && *w > 0.0);
        if influences.is_empty() {
            ctx.ledger.record(INVALID_WEIGHTS, name, v);
            continue;
        }
        if influences.len() > limit {
            influences.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
            influences.truncate(limit);
            ctx.ledger.record(TOO_MANY_WEIGHTS, name, v);
        }
        let total: f32 = influences.iter().map(|(_, w)| w).sum();
        for (_, w) in influences.iter_mut() {
            *w /= total;
        }
        out[v as usize] = influences;
    }
    out
}

#[derive(Debug, Clone, PartialEq)]
enum GeometryKey {
    Material(Option<String>),
    ObjectMaterial(String, Option<String>),
}

/// Accumulates the parts of one decomposed object
pub(crate) struct GroupBuilder {
    pub key: String,
    pub object_name: Option<String>,
    pub collision_bounds: Option<ShapeType>,
    pub animations: Vec<TAnimation>,
    mesh_name: String,
    shape: ShapeType,
    separate_objects: bool,
    elements: Option<u32>,
    vertices: Vec<TVertex>,
    geometry_keys: Vec<GeometryKey>,
    geometries: Vec<TGeometry>,
    bones: Vec<TBone>,
    morphs: Vec<TMorph>,
}

impl GroupBuilder {
    pub fn new(key: String, mesh_name: String, config: &ExportConfig) -> Self {
        Self {
            key,
            object_name: None,
            collision_bounds: None,
            animations: Vec::new(),
            mesh_name,
            shape: config.scene.shape,
            separate_objects: config.geometry.merge_objects && config.geometry.merge_not_materials,
            elements: None,
            vertices: Vec::new(),
            geometry_keys: Vec::new(),
            geometries: Vec::new(),
            bones: Vec::new(),
            morphs: Vec::new(),
        }
    }

    /// Append a part as LOD level `distance`
    pub fn add_part(&mut self, part: MeshPart, distance: f32, report: &mut Report) {
        let elements = match self.elements {
            Some(current) if current != part.elements => {
                report.warning(format!(
                    "{}: {} has different vertex elements, keeping the common ones",
                    self.key, part.object
                ));
                current & part.elements
            }
            Some(current) => current,
            None => part.elements,
        };
        self.elements = Some(elements);

        // Bones are unified by name
        let mut bone_map = Vec::with_capacity(part.bones.len());
        for bone in &part.bones {
            let index = match self.bones.iter().position(|b| b.name == bone.name) {
                Some(index) => index,
                None => {
                    let mut bone = bone.clone();
                    bone.parent = bone.parent.map(|p| bone_map[p]);
                    self.bones.push(bone);
                    self.bones.len() - 1
                }
            };
            bone_map.push(index);
        }

        let base = self.vertices.len() as u32;
        self.vertices.extend(part.vertices.into_iter().map(|mut v| {
            for (bone, _) in v.weights.iter_mut() {
                *bone = bone_map[*bone as usize] as u32;
            }
            v
        }));

        for (material, triangles) in part.geometries {
            let key = if self.separate_objects {
                GeometryKey::ObjectMaterial(part.object.clone(), material.clone())
            } else {
                GeometryKey::Material(material.clone())
            };
            let slot = match self.geometry_keys.iter().position(|k| *k == key) {
                Some(slot) => slot,
                None => {
                    self.geometry_keys.push(key);
                    self.geometries.push(TGeometry {
                        material,
                        lods: Vec::new(),
                    });
                    self.geometries.len() - 1
                }
            };
            let geometry = &mut self.geometries[slot];
            let lod = match geometry.lods.iter().position(|l| l.distance == distance) {
                Some(lod) => lod,
                None => {
                    geometry.lods.push(TLod {
                        distance,
                        triangles: Vec::new(),
                    });
                    geometry.lods.len() - 1
                }
            };
            geometry.lods[lod]
                .triangles
                .extend(triangles.iter().map(|t| t.map(|i| i + base)));
        }

        for morph in part.morphs {
            let deltas = morph.deltas.into_iter().map(|(i, d)| (i + base, d));
            match self.morphs.iter_mut().find(|m| m.name == morph.name) {
                Some(existing) => existing.deltas.extend(deltas),
                None => self.morphs.push(TMorph {
                    name: morph.name,
                    deltas: deltas.collect(),
                }),
            }
        }
    }

    pub fn finish(mut self) -> DecomposedObject {
        for geometry in &mut self.geometries {
            geometry.lods.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        }
        for morph in &mut self.morphs {
            morph.deltas.sort_by_key(|(i, _)| *i);
        }
        let elements = self.elements.unwrap_or(ELEMENT_POSITION);
        let elements = if self.bones.is_empty() {
            elements & !(ELEMENT_BLENDWEIGHTS | ELEMENT_BLENDINDICES)
        } else {
            elements
        };
        DecomposedObject {
            name: self.key,
            object_name: self.object_name,
            mesh_name: self.mesh_name,
            kind: ObjectKind::Mesh,
            elements,
            vertices: self.vertices,
            geometries: self.geometries,
            bones: self.bones,
            morphs: self.morphs,
            animations: self.animations,
            physics: PhysicsSettings {
                shape: self.shape,
                collision_bounds: self.collision_bounds,
            },
        }
    }
}
