//! Per-vertex tangent frames from positions, normals and UVs.

use glam::{Vec2, Vec3, Vec4};

/// Tangents for an indexed triangle list
///
/// Triangle tangents and bitangents are accumulated per vertex, then the
/// tangent is orthogonalized against the normal. `w` is the handedness
/// the engine expects: `cross(tangent.xyz, normal) * w` points along the
/// accumulated bitangent. Degenerate frames fall back to any unit vector
/// perpendicular to the normal.
pub fn generate_tangents(
    positions: &[Vec3],
    normals: &[Vec3],
    uvs: &[Vec2],
    triangles: &[[u32; 3]],
) -> Vec<Vec4> {
    let mut tan = vec![Vec3::ZERO; positions.len()];
    let mut bitan = vec![Vec3::ZERO; positions.len()];

    for triangle in triangles {
        let [a, b, c] = triangle.map(|i| i as usize);
        let e1 = positions[b] - positions[a];
        let e2 = positions[c] - positions[a];
        let d1 = uvs[b] - uvs[a];
        let d2 = uvs[c] - uvs[a];
        let det = d1.x * d2.y - d2.x * d1.y;
        if det.abs() <= f32::EPSILON {
            continue;
        }
        let r = 1.0 / det;
        let sdir = (e1 * d2.y - e2 * d1.y) * r;
        let tdir = (e2 * d1.x - e1 * d2.x) * r;
        for i in [a, b, c] {
            tan[i] += sdir;
            bitan[i] += tdir;
        }
    }

    positions
        .iter()
        .enumerate()
        .map(|(i, _)| {
            let n = normals.get(i).copied().unwrap_or(Vec3::ZERO);
            let t = tan[i] - n * n.dot(tan[i]);
            let t = if t.length_squared() > 1e-12 {
                t.normalize()
            } else {
                n.any_orthonormal_vector()
            };
            let w = if t.cross(n).dot(bitan[i]) < 0.0 { -1.0 } else { 1.0 };
            t.extend(w)
        })
        .collect()
}
