//! Materials, animation triggers and material lists
//!
//! ```text
//! <material>
//!     <technique name="Techniques/DiffNormal.xml" />
//!     <texture unit="diffuse" name="Textures/Stone.png" />
//!     <shader vsdefines="..." psdefines="..." />
//!     <parameter name="MatDiffColor" value="1 1 1 1" />
//!     <cull value="none" />
//!     <shadowcull value="none" />
//! </material>
//! ```

use glam::{Vec3, Vec4};

use crate::decompose::TTrigger;
use crate::diagnostics::{ErrorLedger, Report, UNSUPPORTED_NODE};
use crate::source::{GraphNode, MaterialGraph, MaterialSource, TextureRef};
use crate::xml::{fmt_f32, fmt_vec3, fmt_vec4, NodeId, XmlDocument};

/// Engine texture units, in the order they are written
pub const TEXTURE_UNITS: [&str; 4] = ["diffuse", "normal", "specular", "emissive"];

#[derive(Debug, Clone, PartialEq)]
pub struct TechniqueRef {
    /// Engine path, `Techniques/<name>.xml`
    pub name: String,
    pub quality: Option<u32>,
    pub lod_distance: Option<f32>,
}

#[derive(Debug, Clone)]
pub struct UrhoMaterial {
    pub name: String,
    pub technique: TechniqueRef,
    /// `(unit, texture)`
    pub textures: Vec<(String, TextureRef)>,
    /// `(name, value)` in output order
    pub parameters: Vec<(String, String)>,
    pub vs_defines: Option<String>,
    pub ps_defines: Option<String>,
    pub cull: Option<String>,
    pub shadow_cull: Option<String>,
}

/// Technique name for a texture and shading combination
pub fn technique_name(
    diffuse: bool,
    normal: bool,
    specular: bool,
    emissive: bool,
    unlit: bool,
    alpha: bool,
) -> String {
    let mut name = String::from(if diffuse { "Diff" } else { "NoTexture" });
    if diffuse {
        if normal {
            name.push_str("Normal");
        }
        if specular {
            name.push_str("Spec");
        }
        if emissive {
            name.push_str("Emissive");
        }
    }
    if unlit {
        name.push_str("Unlit");
    }
    if alpha {
        name.push_str("Alpha");
    }
    name
}

fn technique_path(name: &str) -> String {
    if name.ends_with(".xml") {
        name.to_string()
    } else {
        format!("Techniques/{}.xml", name)
    }
}

fn two_sided(material: &mut UrhoMaterial) {
    material.cull = Some("none".to_string());
    material.shadow_cull = Some("none".to_string());
}

impl UrhoMaterial {
    /// Default material for a slot without source data
    pub fn named(name: &str) -> Self {
        Self::from_source(
            &MaterialSource {
                name: name.to_string(),
                ..Default::default()
            },
            &mut ErrorLedger::new(),
            &mut Report::new(),
        )
    }

    /// Build from host material data, using its node graph when present
    pub fn from_source(source: &MaterialSource, ledger: &mut ErrorLedger, report: &mut Report) -> Self {
        if let Some(graph) = &source.node_graph {
            return Self::from_graph(&source.name, graph, ledger, report);
        }

        let textures = &source.textures;
        let slots = [
            &textures.diffuse,
            &textures.normal,
            &textures.specular,
            &textures.emissive,
        ];
        let technique = technique_name(
            textures.diffuse.is_some(),
            textures.normal.is_some(),
            textures.specular.is_some(),
            textures.emissive.is_some(),
            source.shadeless,
            source.alpha_blend,
        );

        let mut parameters = vec![(
            "MatDiffColor".to_string(),
            fmt_vec4(Vec4::from_array(source.diffuse_color)),
        )];
        let specular = Vec3::from_array(source.specular_color) * source.specular_intensity;
        parameters.push((
            "MatSpecColor".to_string(),
            fmt_vec4(specular.extend(source.specular_hardness)),
        ));
        let emissive = Vec3::from_array(source.emissive_color);
        if emissive != Vec3::ZERO || textures.emissive.is_some() {
            parameters.push(("MatEmissiveColor".to_string(), fmt_vec3(emissive)));
        }

        let mut material = Self {
            name: source.name.clone(),
            technique: TechniqueRef {
                name: technique_path(&technique),
                quality: None,
                lod_distance: None,
            },
            textures: TEXTURE_UNITS
                .iter()
                .zip(slots)
                .filter_map(|(unit, texture)| texture.clone().map(|t| (unit.to_string(), t)))
                .collect(),
            parameters,
            vs_defines: source.vs_defines.clone(),
            ps_defines: source.ps_defines.clone(),
            cull: None,
            shadow_cull: None,
        };
        if source.two_sided {
            two_sided(&mut material);
        }
        material
    }

    /// Build from a node graph
    ///
    /// Later nodes override earlier ones of the same kind. Nodes the
    /// exporter cannot translate are skipped and recorded in the ledger.
    pub fn from_graph(name: &str, graph: &MaterialGraph, ledger: &mut ErrorLedger, report: &mut Report) -> Self {
        let mut material = Self {
            name: name.to_string(),
            technique: TechniqueRef {
                name: technique_path("NoTexture"),
                quality: None,
                lod_distance: None,
            },
            textures: Vec::new(),
            parameters: Vec::new(),
            vs_defines: None,
            ps_defines: None,
            cull: None,
            shadow_cull: None,
        };
        let mut has_technique = false;
        let mut unsupported = 0u32;

        for node in &graph.nodes {
            match node {
                GraphNode::Technique {
                    name,
                    quality,
                    lod_distance,
                } => {
                    material.technique = TechniqueRef {
                        name: technique_path(name),
                        quality: *quality,
                        lod_distance: *lod_distance,
                    };
                    has_technique = true;
                }
                GraphNode::Texture { unit, texture } => {
                    material.textures.retain(|(u, _)| u != unit);
                    material.textures.push((unit.clone(), texture.clone()));
                }
                GraphNode::Standard {
                    diffuse_color,
                    specular_color,
                    emissive_color,
                } => {
                    material.set_parameter("MatDiffColor", fmt_vec4(Vec4::from_array(*diffuse_color)));
                    material.set_parameter("MatSpecColor", fmt_vec4(Vec4::from_array(*specular_color)));
                    if let Some(emissive) = emissive_color {
                        material.set_parameter("MatEmissiveColor", fmt_vec3(Vec3::from_array(*emissive)));
                    }
                }
                GraphNode::Pbr {
                    base_color,
                    metallic,
                    roughness,
                    emissive_color,
                } => {
                    material.set_parameter("MatDiffColor", fmt_vec4(Vec4::from_array(*base_color)));
                    material.set_parameter("Metallic", fmt_f32(*metallic));
                    material.set_parameter("Roughness", fmt_f32(*roughness));
                    if let Some(emissive) = emissive_color {
                        material.set_parameter("MatEmissiveColor", fmt_vec3(Vec3::from_array(*emissive)));
                    }
                }
                GraphNode::Parameter { name, value } => material.set_parameter(name, value.clone()),
                GraphNode::Cull { mode } => material.cull = Some(mode.clone()),
                GraphNode::ShadowCull { mode } => material.shadow_cull = Some(mode.clone()),
                GraphNode::ShaderDefines { vs, ps } => {
                    material.vs_defines = vs.clone();
                    material.ps_defines = ps.clone();
                }
                GraphNode::Unsupported => {
                    ledger.record(UNSUPPORTED_NODE, name, unsupported);
                    unsupported += 1;
                }
            }
        }

        if unsupported > 0 {
            report.warning(format!("Material {}: {} unsupported nodes skipped", name, unsupported));
        }
        if !has_technique {
            let has = |unit: &str| material.textures.iter().any(|(u, _)| u == unit);
            let technique = technique_name(has("diffuse"), has("normal"), has("specular"), has("emissive"), false, false);
            material.technique.name = technique_path(&technique);
        }
        material
    }

    pub fn set_parameter(&mut self, name: &str, value: String) {
        match self.parameters.iter_mut().find(|(n, _)| n == name) {
            Some((_, v)) => *v = value,
            None => self.parameters.push((name.to_string(), value)),
        }
    }

    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Material document; `texture_path` gives the engine path of a texture
pub fn material_document(
    material: &UrhoMaterial,
    texture_path: &mut dyn FnMut(&TextureRef) -> String,
) -> (XmlDocument, NodeId) {
    let mut doc = XmlDocument::new();
    let root = doc.create_element("material");

    let technique = doc.add_child(root, "technique");
    doc.set_attribute(technique, "name", material.technique.name.as_str());
    if let Some(quality) = material.technique.quality {
        doc.set_attribute(technique, "quality", quality.to_string());
    }
    if let Some(distance) = material.technique.lod_distance {
        doc.set_attribute(technique, "loddistance", fmt_f32(distance));
    }

    for (unit, texture) in &material.textures {
        let element = doc.add_child(root, "texture");
        doc.set_attribute(element, "unit", unit.as_str());
        doc.set_attribute(element, "name", texture_path(texture));
    }

    if material.vs_defines.is_some() || material.ps_defines.is_some() {
        let shader = doc.add_child(root, "shader");
        if let Some(vs) = &material.vs_defines {
            doc.set_attribute(shader, "vsdefines", vs.as_str());
        }
        if let Some(ps) = &material.ps_defines {
            doc.set_attribute(shader, "psdefines", ps.as_str());
        }
    }

    for (name, value) in &material.parameters {
        let parameter = doc.add_child(root, "parameter");
        doc.set_attribute(parameter, "name", name.as_str());
        doc.set_attribute(parameter, "value", value.as_str());
    }

    if let Some(cull) = &material.cull {
        let element = doc.add_child(root, "cull");
        doc.set_attribute(element, "value", cull.as_str());
    }
    if let Some(cull) = &material.shadow_cull {
        let element = doc.add_child(root, "shadowcull");
        doc.set_attribute(element, "value", cull.as_str());
    }
    (doc, root)
}

/// Trigger document of an animation
pub fn triggers_document(triggers: &[TTrigger], normalized: bool) -> (XmlDocument, NodeId) {
    let mut doc = XmlDocument::new();
    let root = doc.create_element("animation");
    for trigger in triggers {
        let element = doc.add_child(root, "trigger");
        if normalized {
            doc.set_attribute(element, "normalizedtime", fmt_f32(trigger.normalized));
        } else {
            doc.set_attribute(element, "time", fmt_f32(trigger.time));
        }
        let variant = doc.add_child(element, "variant");
        doc.set_attribute(variant, "type", "String");
        doc.set_attribute(variant, "value", trigger.name.as_str());
    }
    (doc, root)
}

/// Material list text: one engine path per geometry, `null` when missing
pub fn material_list(entries: &[Option<String>]) -> String {
    let mut text = String::new();
    for entry in entries {
        text.push_str(entry.as_deref().unwrap_or("null"));
        text.push('\n');
    }
    text
}
