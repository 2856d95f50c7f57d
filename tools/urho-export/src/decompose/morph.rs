//! Shape key deltas.

use glam::Vec3;

use super::mesh::MeshBuild;
use super::{tangent, MorphDelta, TMorph, TVertex};
use crate::config::ExportConfig;
use crate::diagnostics::Report;
use urho_common::{ELEMENT_NORMAL, ELEMENT_TANGENT};

const EPSILON: f32 = 1e-6;

/// Morphs of a mesh part
///
/// `corners` maps each export vertex to the loop it was first built from.
/// Deltas are relative to the base vertex data in engine space; vertices
/// whose deltas are all zero are left out.
pub(crate) fn extract_morphs(
    build: &MeshBuild<'_>,
    vertices: &[TVertex],
    corners: &[usize],
    triangles: &[[u32; 3]],
    elements: u32,
    config: &ExportConfig,
    report: &mut Report,
) -> Vec<TMorph> {
    let mesh = build.mesh;
    let with_normal = config.morph.normal && elements & ELEMENT_NORMAL != 0;
    let with_tangent = config.morph.tangent && with_normal && elements & ELEMENT_TANGENT != 0;

    let base_positions: Vec<Vec3> = mesh.positions.iter().map(|p| Vec3::from_array(*p)).collect();
    let base_corner_normals = with_normal.then(|| build.corner_normals(&base_positions, false));
    let uvs: Vec<_> = vertices.iter().map(|v| v.uv).collect();
    let base_tangents = with_tangent.then(|| {
        let positions: Vec<Vec3> = vertices.iter().map(|v| v.position).collect();
        let normals = engine_normals(build, corners, base_corner_normals.as_deref().unwrap_or(&[]));
        tangent::generate_tangents(&positions, &normals, &uvs, triangles)
    });

    let mut morphs = Vec::new();
    for key in &mesh.shape_keys {
        if key.muted {
            continue;
        }
        if key.positions.len() != mesh.positions.len() {
            report.warning(format!(
                "Shape key {} of {} has {} positions for {} vertices, skipped",
                key.name,
                mesh.name,
                key.positions.len(),
                mesh.positions.len()
            ));
            continue;
        }
        let shape_positions: Vec<Vec3> = key.positions.iter().map(|p| Vec3::from_array(*p)).collect();
        let morphed: Vec<Vec3> = vertices
            .iter()
            .map(|v| build.point(shape_positions[v.source_index as usize]))
            .collect();

        let mut normal_deltas = vec![Vec3::ZERO; vertices.len()];
        let mut shape_normals = Vec::new();
        if let Some(base) = &base_corner_normals {
            let corner_normals = build.corner_normals(&shape_positions, false);
            shape_normals = engine_normals(build, corners, &corner_normals);
            let base_normals = engine_normals(build, corners, base);
            for (i, delta) in normal_deltas.iter_mut().enumerate() {
                *delta = shape_normals[i] - base_normals[i];
            }
        }

        let mut tangent_deltas = vec![Vec3::ZERO; vertices.len()];
        if let Some(base) = &base_tangents {
            let tangents = tangent::generate_tangents(&morphed, &shape_normals, &uvs, triangles);
            for (i, delta) in tangent_deltas.iter_mut().enumerate() {
                *delta = (tangents[i] - base[i]).truncate();
            }
        }

        let deltas: Vec<(u32, MorphDelta)> = vertices
            .iter()
            .enumerate()
            .filter_map(|(i, v)| {
                let delta = MorphDelta {
                    position: morphed[i] - v.position,
                    normal: normal_deltas[i],
                    tangent: tangent_deltas[i],
                };
                let moved = delta.position.abs().max_element() > EPSILON
                    || delta.normal.abs().max_element() > EPSILON
                    || delta.tangent.abs().max_element() > EPSILON;
                moved.then_some((i as u32, delta))
            })
            .collect();
        if deltas.is_empty() {
            tracing::debug!("Shape key {} of {} moves nothing", key.name, mesh.name);
            continue;
        }
        morphs.push(TMorph {
            name: key.name.clone(),
            deltas,
        });
    }
    morphs
}

fn engine_normals(build: &MeshBuild<'_>, corners: &[usize], corner_normals: &[Vec3]) -> Vec<Vec3> {
    corners
        .iter()
        .map(|&c| build.direction(corner_normals.get(c).copied().unwrap_or(Vec3::ZERO)))
        .collect()
}

#[cfg(test)]
mod tests {
    use crate::config::{ExportSettings, Orientation};
    use crate::decompose::decompose;
    use crate::export::ExportContext;
    use crate::source::MemoryScene;
    use glam::Vec3;

    const SCENE: &str = r#"{ "name": "Level",
        "objects": [ { "name": "Face", "kind": "mesh", "mesh": "Face" } ],
        "meshes": [ { "name": "Face",
            "positions": [[0,0,0],[1,0,0],[1,1,0],[0,1,0]],
            "polygons": [ { "vertices": [0, 1, 2, 3] } ],
            "shape_keys": [
                { "name": "Lift", "positions": [[0,0,0],[1,0,0],[1,1,1],[0,1,0]] },
                { "name": "Rest", "positions": [[0,0,0],[1,0,0],[1,1,0],[0,1,0]] },
                { "name": "Off", "positions": [[0,0,5],[1,0,0],[1,1,0],[0,1,0]], "muted": true },
                { "name": "Broken", "positions": [[0,0,0]] }
            ] } ] }"#;

    fn morphs(normal: bool) -> Vec<crate::decompose::TMorph> {
        let mut settings = ExportSettings::default();
        settings.output.path = "out".into();
        settings.transform.orientation = Orientation::YPlus;
        settings.geometry.uv = false;
        settings.morph.enabled = true;
        settings.morph.normal = normal;
        let config = settings.validate().expect("valid settings");
        let scene = MemoryScene::from_json(SCENE).expect("scene json");
        let mut ctx = ExportContext::new(&config, "Level");
        let mut records = decompose(&mut ctx, &scene);
        assert_eq!(ctx.report.count(crate::diagnostics::Severity::Warning), 1);
        records.remove(0).morphs
    }

    #[test]
    fn test_only_moving_keys_kept() {
        let morphs = morphs(false);
        assert_eq!(morphs.len(), 1);
        assert_eq!(morphs[0].name, "Lift");
        assert_eq!(morphs[0].deltas.len(), 1);
        let (index, delta) = morphs[0].deltas[0];
        assert_eq!(index, 2);
        assert!((delta.position.length() - 1.0).abs() < 1e-6);
        assert_eq!(delta.normal, Vec3::ZERO);
    }

    #[test]
    fn test_normal_deltas_cover_bent_face() {
        let morphs = morphs(true);
        assert_eq!(morphs.len(), 1);
        assert_eq!(morphs[0].deltas.len(), 4);
        assert!(morphs[0].deltas.iter().all(|(_, d)| d.normal.length() > 1e-3));
    }
}
