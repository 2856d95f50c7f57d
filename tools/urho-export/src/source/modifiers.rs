//! Modifier application on host mesh data.

use std::borrow::Cow;

use super::{MeshData, Modifier};
use crate::config::ModifierResolution;

/// Evaluate the mesh-changing modifiers of a stack
///
/// Armature modifiers only bind a skin and leave the mesh untouched.
pub fn apply_modifiers<'a>(
    mesh: &'a MeshData,
    modifiers: &[Modifier],
    resolution: ModifierResolution,
) -> Cow<'a, MeshData> {
    let mut result = Cow::Borrowed(mesh);
    for modifier in modifiers {
        if let Modifier::Decimate {
            ratio,
            render,
            viewport,
        } = modifier
        {
            let active = match resolution {
                ModifierResolution::Render => *render,
                ModifierResolution::Preview => *viewport,
            };
            if active && *ratio < 1.0 {
                result = Cow::Owned(decimate(&result, *ratio));
            }
        }
    }
    result
}

/// Keep an evenly spread `ratio` share of the polygons
///
/// Per-loop layers are filtered along with their polygons; vertices stay so
/// weights and shape keys keep their indices.
pub fn decimate(mesh: &MeshData, ratio: f32) -> MeshData {
    let ratio = ratio.clamp(0.0, 1.0);
    let mut out = mesh.clone();
    out.polygons.clear();
    for layer in &mut out.uv_layers {
        layer.data.clear();
    }
    for layer in &mut out.color_layers {
        layer.data.clear();
    }

    let mut loop_start = 0;
    for (i, polygon) in mesh.polygons.iter().enumerate() {
        let loops = loop_start..loop_start + polygon.vertices.len();
        loop_start += polygon.vertices.len();

        let keep = ((i + 1) as f32 * ratio).floor() > (i as f32 * ratio).floor();
        if !keep {
            continue;
        }
        out.polygons.push(polygon.clone());
        for (layer, source) in out.uv_layers.iter_mut().zip(&mesh.uv_layers) {
            if let Some(data) = source.data.get(loops.clone()) {
                layer.data.extend_from_slice(data);
            }
        }
        for (layer, source) in out.color_layers.iter_mut().zip(&mesh.color_layers) {
            if let Some(data) = source.data.get(loops.clone()) {
                layer.data.extend_from_slice(data);
            }
        }
    }
    out
}
