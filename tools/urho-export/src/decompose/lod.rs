//! Level-of-detail proxies and name parsing.
//!
//! Configured LOD sets are expanded into temporary mesh objects owned by the
//! pass, named so that [`parse_lod_name`] groups them back into one model.
//! The host scene is never modified.

use hashbrown::HashMap;

use crate::export::ExportContext;
use crate::math::Transform;
use crate::source::{Modifier, ObjectKind, SceneObject, SceneSource};

const LOD_MARKER: &str = "_LOD";

/// Proxy object name of one LOD level
pub fn lod_proxy_name(set: &str, distance: f32) -> String {
    format!("{}{}{:03}", set, LOD_MARKER, distance)
}

/// Split `<base>_LOD<distance>` into base name and distance
pub fn parse_lod_name(name: &str) -> Option<(&str, f32)> {
    let at = name.rfind(LOD_MARKER)?;
    let (base, suffix) = name.split_at(at);
    let digits = &suffix[LOD_MARKER.len()..];
    if base.is_empty() || digits.is_empty() {
        return None;
    }
    let distance: f32 = digits.parse().ok()?;
    (distance.is_finite() && distance >= 0.0).then_some((base, distance))
}

/// Temporary objects synthesized for the LOD sets of a scene
#[derive(Debug, Default)]
pub struct LodProxies {
    objects: Vec<SceneObject>,
    /// Proxy name -> scene object providing its placement
    anchors: HashMap<String, String>,
}

impl LodProxies {
    pub fn build(source: &dyn SceneSource, ctx: &mut ExportContext<'_>) -> Self {
        let mut proxies = Self::default();
        for set in source.lod_sets() {
            let armature = set.armature.as_deref().filter(|name| {
                let found = source.object(name).is_some_and(|o| o.kind == ObjectKind::Armature);
                if !found {
                    ctx.report.warning(format!(
                        "LOD set {}: armature {} not found, levels are not skinned",
                        set.name, name
                    ));
                }
                found
            });

            for level in &set.levels {
                if source.mesh(&level.mesh).is_none() {
                    ctx.report.error(format!(
                        "LOD set {}: mesh {} not found",
                        set.name, level.mesh
                    ));
                    continue;
                }
                let name = lod_proxy_name(&set.name, level.distance);
                if proxies.contains(&name) || source.object(&name).is_some() {
                    ctx.report.warning(format!("LOD set {}: duplicate level {}", set.name, name));
                    continue;
                }

                let modifiers = match armature {
                    Some(object) => vec![Modifier::Armature {
                        object: object.to_string(),
                    }],
                    None if level.decimate < 1.0 => vec![Modifier::Decimate {
                        ratio: level.decimate,
                        render: true,
                        viewport: true,
                    }],
                    None => Vec::new(),
                };
                let (transform, parent) = match armature.and_then(|a| source.object(a)) {
                    Some(object) => (object.transform, object.parent.clone()),
                    None => (Transform::IDENTITY, None),
                };

                if let Some(object) = armature {
                    proxies.anchors.insert(name.clone(), object.to_string());
                }
                tracing::debug!("LOD proxy {} from mesh {}", name, level.mesh);
                proxies.objects.push(SceneObject {
                    name,
                    kind: ObjectKind::Mesh,
                    transform,
                    parent,
                    parent_bone: None,
                    mesh: Some(level.mesh.clone()),
                    materials: Vec::new(),
                    modifiers,
                    selected: true,
                    hidden: false,
                    display_wire: false,
                    user_data: Vec::new(),
                    collections: Vec::new(),
                    animation: None,
                    light: None,
                    camera: None,
                    collision_bounds: None,
                    components: None,
                });
            }
        }
        proxies
    }

    pub fn objects(&self) -> impl Iterator<Item = &SceneObject> {
        self.objects.iter()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.objects.iter().any(|o| o.name == name)
    }

    /// Scene object whose node the proxy's model is placed on
    pub fn anchor(&self, name: &str) -> Option<&str> {
        self.anchors.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_lod_name() {
        assert_eq!(parse_lod_name("Tree_LOD000"), Some(("Tree", 0.0)));
        assert_eq!(parse_lod_name("Tree_LOD25"), Some(("Tree", 25.0)));
        assert_eq!(parse_lod_name("Tree_LOD12.5"), Some(("Tree", 12.5)));
        assert_eq!(parse_lod_name("Tree"), None);
        assert_eq!(parse_lod_name("Tree_LOD"), None);
        assert_eq!(parse_lod_name("_LOD3"), None);
        assert_eq!(parse_lod_name("Tree_LODx"), None);
    }

    #[test]
    fn test_proxy_name_parses_back() {
        let name = lod_proxy_name("Rock", 7.0);
        assert_eq!(name, "Rock_LOD007");
        assert_eq!(parse_lod_name(&name), Some(("Rock", 7.0)));
    }
}
