//! XML document builder
//!
//! Documents are built in an arena: elements are created detached, get
//! attributes and children through handles, and are emitted through
//! `xmltree` with tab indentation. Attribute order is insertion order, so
//! identical input gives identical files.

use anyhow::{Context, Result};
use glam::{Quat, Vec3, Vec4};
use std::path::Path;
use xmltree::{Element, EmitterConfig, XMLNode};

/// Handle of an element inside an [`XmlDocument`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

#[derive(Debug, Clone)]
struct XmlElement {
    name: String,
    attributes: Vec<(String, String)>,
    children: Vec<NodeId>,
    parent: Option<NodeId>,
}

/// Arena of XML elements
#[derive(Debug, Clone, Default)]
pub struct XmlDocument {
    elements: Vec<XmlElement>,
}

impl XmlDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a detached element
    pub fn create_element(&mut self, name: &str) -> NodeId {
        self.elements.push(XmlElement {
            name: name.to_string(),
            attributes: Vec::new(),
            children: Vec::new(),
            parent: None,
        });
        NodeId(self.elements.len() - 1)
    }

    /// Attach a detached element as the last child of `parent`
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        debug_assert!(self.elements[child.0].parent.is_none());
        self.elements[child.0].parent = Some(parent);
        self.elements[parent.0].children.push(child);
    }

    /// Create an element and append it to `parent`
    pub fn add_child(&mut self, parent: NodeId, name: &str) -> NodeId {
        let child = self.create_element(name);
        self.append_child(parent, child);
        child
    }

    /// Set an attribute, replacing an existing value in place
    pub fn set_attribute(&mut self, node: NodeId, name: &str, value: impl Into<String>) {
        let value = value.into();
        let attributes = &mut self.elements[node.0].attributes;
        match attributes.iter_mut().find(|(k, _)| k == name) {
            Some((_, v)) => *v = value,
            None => attributes.push((name.to_string(), value)),
        }
    }

    pub fn attribute(&self, node: NodeId, name: &str) -> Option<&str> {
        self.elements[node.0]
            .attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn name(&self, node: NodeId) -> &str {
        &self.elements[node.0].name
    }

    pub fn children(&self, node: NodeId) -> &[NodeId] {
        &self.elements[node.0].children
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.elements[node.0].parent
    }

    /// Convert the subtree rooted at `node`
    pub fn to_element(&self, node: NodeId) -> Element {
        let source = &self.elements[node.0];
        let mut element = Element::new(&source.name);
        for (key, value) in &source.attributes {
            element.attributes.insert(key.clone(), value.clone());
        }
        for &child in &source.children {
            element.children.push(XMLNode::Element(self.to_element(child)));
        }
        element
    }

    /// Serialize the subtree rooted at `node`
    pub fn to_bytes(&self, node: NodeId) -> Result<Vec<u8>> {
        let config = EmitterConfig::new()
            .perform_indent(true)
            .indent_string("\t")
            .write_document_declaration(true);
        let mut out = Vec::new();
        self.to_element(node)
            .write_with_config(&mut out, config)
            .context("Failed to serialize XML")?;
        out.push(b'\n');
        Ok(out)
    }

    pub fn to_string(&self, node: NodeId) -> Result<String> {
        Ok(String::from_utf8(self.to_bytes(node)?)?)
    }

    /// Write the subtree rooted at `node` to a file
    pub fn write_file(&self, node: NodeId, path: &Path) -> Result<()> {
        let bytes = self.to_bytes(node)?;
        std::fs::write(path, bytes).with_context(|| format!("Failed to write {:?}", path))
    }
}

/// Format a float for an attribute value
///
/// Shortest representation that reads back to the same value; negative
/// zero is written as `0`.
pub fn fmt_f32(v: f32) -> String {
    if v == 0.0 {
        return "0".to_string();
    }
    format!("{}", v)
}

pub fn fmt_vec3(v: Vec3) -> String {
    format!("{} {} {}", fmt_f32(v.x), fmt_f32(v.y), fmt_f32(v.z))
}

pub fn fmt_vec4(v: Vec4) -> String {
    format!(
        "{} {} {} {}",
        fmt_f32(v.x),
        fmt_f32(v.y),
        fmt_f32(v.z),
        fmt_f32(v.w)
    )
}

/// Quaternion as `w x y z`
pub fn fmt_quat(q: Quat) -> String {
    format!(
        "{} {} {} {}",
        fmt_f32(q.w),
        fmt_f32(q.x),
        fmt_f32(q.y),
        fmt_f32(q.z)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_and_serialize() {
        let mut doc = XmlDocument::new();
        let root = doc.create_element("material");
        let technique = doc.add_child(root, "technique");
        doc.set_attribute(technique, "name", "Techniques/Diff.xml");
        doc.set_attribute(technique, "quality", "0");
        doc.set_attribute(technique, "name", "Techniques/NoTexture.xml");

        assert_eq!(doc.attribute(technique, "name"), Some("Techniques/NoTexture.xml"));
        assert_eq!(doc.parent(technique), Some(root));

        let text = doc.to_string(root).unwrap();
        assert!(text.contains("<material>"));
        assert!(text.contains("\t<technique name=\"Techniques/NoTexture.xml\" quality=\"0\" />"));
    }

    #[test]
    fn test_serialization_is_deterministic() {
        let build = || {
            let mut doc = XmlDocument::new();
            let root = doc.create_element("node");
            for i in 0..5 {
                let attr = doc.add_child(root, "attribute");
                doc.set_attribute(attr, "name", format!("A{}", i));
                doc.set_attribute(attr, "value", fmt_f32(i as f32 * 0.5));
            }
            doc.to_bytes(root).unwrap()
        };
        assert_eq!(build(), build());
    }

    #[test]
    fn test_float_formatting() {
        assert_eq!(fmt_f32(1.0), "1");
        assert_eq!(fmt_f32(-0.0), "0");
        assert_eq!(fmt_f32(0.25), "0.25");
        assert_eq!(fmt_quat(Quat::IDENTITY), "1 0 0 0");
        assert_eq!(fmt_vec3(Vec3::new(1.5, -2.0, 0.0)), "1.5 -2 0");
    }
}
