//! End-to-end export tests against in-memory scenes

use std::fs::File;
use std::path::Path;

use hashbrown::HashSet;
use tempfile::tempdir;
use urho_common::{AnimationSummary, ModelSummary, ELEMENT_TEXCOORD1};
use urho_export::config::{parse_settings, Orientation};
use urho_export::diagnostics::MISSING_UV;
use urho_export::{export_scene, ExportConfig, ExportOutcome, MemoryScene};
use xmltree::Element;

const QUAD: &str = r#"{ "name": "Quad",
    "positions": [[0,0,0],[1,0,0],[1,1,0],[0,1,0]],
    "polygons": [ { "vertices": [0, 1, 2, 3] } ],
    "uv_layers": [ { "name": "UVMap", "data": [[0,0],[1,0],[1,1],[0,1]] } ],
    "materials": ["Stone"] }"#;

const TRI: &str = r#"{ "name": "Tri",
    "positions": [[0,0,0],[1,0,0],[1,1,0]],
    "polygons": [ { "vertices": [0, 1, 2] } ],
    "uv_layers": [ { "name": "UVMap", "data": [[0,0],[1,0],[1,1]] } ],
    "materials": ["Stone"] }"#;

/// Settings from `extra`, writing to `root` with an identity orientation
fn config(root: &Path, extra: &str) -> ExportConfig {
    let mut settings = parse_settings(extra).expect("settings should parse");
    settings.output.path = root.to_path_buf();
    settings.transform.orientation = Orientation::YPlus;
    settings.scene.id_seed.get_or_insert(7);
    settings.validate().expect("settings should validate")
}

fn scene(objects: &str, meshes: &[&str]) -> MemoryScene {
    let json = format!(
        r#"{{ "name": "Level", "objects": [{}], "meshes": [{}],
              "materials": [ {{ "name": "Stone", "diffuse_color": [0.5, 0.5, 0.5, 1.0] }} ] }}"#,
        objects,
        meshes.join(",")
    );
    MemoryScene::from_json(&json).expect("scene should parse")
}

fn export(scene: &MemoryScene, config: &ExportConfig) -> ExportOutcome {
    export_scene(scene, config).expect("pre-flight should pass")
}

fn read_model(path: &Path) -> ModelSummary {
    let data = std::fs::read(path).expect("model should exist");
    ModelSummary::parse(&data).expect("model should parse")
}

fn read_xml(path: &Path) -> Element {
    Element::parse(File::open(path).expect("xml should exist")).expect("xml should parse")
}

fn attribute<'a>(node: &'a Element, name: &str) -> Option<&'a str> {
    node.children
        .iter()
        .filter_map(|c| c.as_element())
        .filter(|e| e.name == "attribute")
        .find(|e| e.attributes.get("name").map(String::as_str) == Some(name))
        .and_then(|e| e.attributes.get("value"))
        .map(String::as_str)
}

fn child_nodes(node: &Element) -> Vec<&Element> {
    node.children
        .iter()
        .filter_map(|c| c.as_element())
        .filter(|e| e.name == "node")
        .collect()
}

fn collect_ids(element: &Element, ids: &mut Vec<String>) {
    if let Some(id) = element.attributes.get("id") {
        ids.push(id.clone());
    }
    for child in element.children.iter().filter_map(|c| c.as_element()) {
        collect_ids(child, ids);
    }
}

#[test]
fn test_box_parented_to_ball() {
    let dir = tempdir().expect("tempdir");
    let scene = scene(
        r#"{ "name": "Ball", "kind": "mesh", "mesh": "Quad", "transform": { "position": [0, 0, 2] } },
           { "name": "Box", "kind": "mesh", "mesh": "Quad", "parent": "Ball",
             "transform": { "position": [1, 2, 0] } }"#,
        &[QUAD],
    );
    let config = config(dir.path(), "[material]\nexport = true\n");
    let outcome = export(&scene, &config);
    assert!(outcome.success, "{}", outcome.report.summary());

    assert!(dir.path().join("Models/Ball.mdl").exists());
    assert!(dir.path().join("Models/Box.mdl").exists());
    assert!(dir.path().join("Materials/Stone.xml").exists());

    let xml = read_xml(&dir.path().join("Scenes/Level.xml"));
    assert_eq!(xml.name, "scene");
    let root = child_nodes(&xml).into_iter().last().expect("root node");
    assert_eq!(attribute(root, "Name"), Some("Level"));

    let roots = child_nodes(root);
    assert_eq!(roots.len(), 1);
    let ball = roots[0];
    assert_eq!(attribute(ball, "Name"), Some("Ball"));
    let children = child_nodes(ball);
    assert_eq!(children.len(), 1);
    let boxed = children[0];
    assert_eq!(attribute(boxed, "Name"), Some("Box"));
    assert_eq!(attribute(boxed, "Position"), Some("1 0 2"));
    assert_eq!(attribute(boxed, "Rotation"), Some("1 0 0 0"));

    let component = boxed
        .get_child("component")
        .expect("model component");
    assert_eq!(component.attributes.get("type").map(String::as_str), Some("StaticModel"));
    assert_eq!(attribute(component, "Model"), Some("Model;Models/Box.mdl"));
    assert_eq!(attribute(component, "Material"), Some("Material;Materials/Stone.xml"));
}

#[test]
fn test_missing_uv_is_recorded_per_vertex() {
    let dir = tempdir().expect("tempdir");
    let bare = r#"{ "name": "Bare", "positions": [[0,0,0],[1,0,0],[1,1,0],[0,1,0]],
        "polygons": [ { "vertices": [0, 1, 2, 3] } ] }"#;
    let scene = scene(r#"{ "name": "Plane", "kind": "mesh", "mesh": "Bare" }"#, &[bare]);

    let forced = config(dir.path(), "[geometry]\nforce_elements = true\n");
    let outcome = export(&scene, &forced);
    assert_eq!(outcome.ledger.count(MISSING_UV), 4);
    let model = read_model(&dir.path().join("Models/Plane.mdl"));
    assert_ne!(model.vertex_buffers[0].element_mask & ELEMENT_TEXCOORD1, 0);

    let dropped_dir = tempdir().expect("tempdir");
    let outcome = export(&scene, &config(dropped_dir.path(), ""));
    assert_eq!(outcome.ledger.count(MISSING_UV), 4);
    let model = read_model(&dropped_dir.path().join("Models/Plane.mdl"));
    assert_eq!(model.vertex_buffers[0].element_mask & ELEMENT_TEXCOORD1, 0);
}

#[test]
fn test_errors_are_blocking() {
    let dir = tempdir().expect("tempdir");
    let bare = r#"{ "name": "Bare", "positions": [[0,0,0],[1,0,0],[0,1,0]],
        "polygons": [ { "vertices": [0, 1, 2] } ] }"#;
    let scene = scene(r#"{ "name": "Plane", "kind": "mesh", "mesh": "Bare" }"#, &[bare]);
    let outcome = export(
        &scene,
        &config(dir.path(), "[diagnostics]\nerrors_are_blocking = true\n"),
    );
    assert!(!outcome.success);
    assert!(outcome.written.is_empty());
    assert_eq!(outcome.ledger.count(MISSING_UV), 3);
}

#[test]
fn test_merge_yields_one_geometry_per_material() {
    let dir = tempdir().expect("tempdir");
    let metal = QUAD.replace("\"Quad\"", "\"MetalQuad\"").replace("\"Stone\"", "\"Metal\"");
    let scene = scene(
        r#"{ "name": "A", "kind": "mesh", "mesh": "Quad" },
           { "name": "B", "kind": "mesh", "mesh": "MetalQuad", "transform": { "position": [2, 0, 0] } },
           { "name": "C", "kind": "mesh", "mesh": "Quad", "transform": { "position": [4, 0, 0] } }"#,
        &[QUAD, &metal],
    );
    let config = config(
        dir.path(),
        "[geometry]\nmerge_objects = true\n[transform]\norigin = \"global\"\n",
    );

    let outcome = export(&scene, &config);
    assert!(outcome.success, "{}", outcome.report.summary());
    let model = read_model(&dir.path().join("Models/Level.mdl"));
    assert_eq!(model.geometries.len(), 2);
    // Merged pieces keep their world placement
    assert!((model.bounding_box.1.x - 5.0).abs() < 1e-5);
}

#[test]
fn test_strict_lods_share_vertices() {
    let objects = r#"{ "name": "Rock_LOD000", "kind": "mesh", "mesh": "Quad" },
                     { "name": "Rock_LOD010", "kind": "mesh", "mesh": "Quad" }"#;
    let scene = scene(objects, &[QUAD]);

    let strict_dir = tempdir().expect("tempdir");
    export(&scene, &config(strict_dir.path(), ""));
    let strict = read_model(&strict_dir.path().join("Models/Rock.mdl"));
    assert_eq!(strict.vertex_buffers[0].vertex_count, 4);
    assert_eq!(strict.geometries[0].lod_levels.len(), 2);
    assert_eq!(strict.geometries[0].lod_levels[1].distance, 10.0);

    let loose_dir = tempdir().expect("tempdir");
    export(&scene, &config(loose_dir.path(), "[geometry]\nstrict_lods = false\n"));
    let loose = read_model(&loose_dir.path().join("Models/Rock.mdl"));
    assert_eq!(loose.vertex_buffers[0].vertex_count, 8);
}

#[test]
fn test_export_is_deterministic() {
    let objects = r#"{ "name": "Ball", "kind": "mesh", "mesh": "Quad" },
                     { "name": "Box", "kind": "mesh", "mesh": "Quad", "parent": "Ball" }"#;
    let scene = scene(objects, &[QUAD]);

    let first = tempdir().expect("tempdir");
    let second = tempdir().expect("tempdir");
    export(&scene, &config(first.path(), "[geometry]\ntangent = true\n"));
    export(&scene, &config(second.path(), "[geometry]\ntangent = true\n"));

    for file in ["Models/Ball.mdl", "Models/Box.mdl", "Scenes/Level.xml"] {
        let a = std::fs::read(first.path().join(file)).expect("first");
        let b = std::fs::read(second.path().join(file)).expect("second");
        assert_eq!(a, b, "{} differs", file);
    }
}

#[test]
fn test_ids_unique_in_each_document() {
    let dir = tempdir().expect("tempdir");
    let objects = r#"{ "name": "Ball", "kind": "mesh", "mesh": "Quad" },
                     { "name": "Box", "kind": "mesh", "mesh": "Quad", "parent": "Ball" },
                     { "name": "Lamp", "kind": "light", "light": { "kind": "point" } },
                     { "name": "Eye", "kind": "camera", "camera": {} }"#;
    let scene = scene(objects, &[QUAD]);
    let config = config(
        dir.path(),
        "[scene]\nindividual_prefab = true\ncollective_prefab = true\nphysics = \"individual\"\n",
    );
    let outcome = export(&scene, &config);
    assert!(outcome.success, "{}", outcome.report.summary());

    for file in ["Scenes/Level.xml", "Objects/Level.xml", "Objects/Ball.xml", "Objects/Lamp.xml"] {
        let xml = read_xml(&dir.path().join(file));
        let mut ids = Vec::new();
        collect_ids(&xml, &mut ids);
        let unique: HashSet<&String> = ids.iter().collect();
        assert!(!ids.is_empty());
        assert_eq!(unique.len(), ids.len(), "duplicate id in {}", file);
    }
}

#[test]
fn test_shared_mesh_writes_one_model() {
    let dir = tempdir().expect("tempdir");
    let objects = r#"{ "name": "A", "kind": "mesh", "mesh": "Quad" },
                     { "name": "B", "kind": "mesh", "mesh": "Quad" }"#;
    let scene = scene(objects, &[QUAD]);
    let outcome = export(&scene, &config(dir.path(), "[geometry]\nmesh_name_from = \"mesh\"\n"));
    assert!(outcome.success, "{}", outcome.report.summary());
    assert!(dir.path().join("Models/Quad.mdl").exists());
    assert!(!dir.path().join("Models/A.mdl").exists());

    let xml = read_xml(&dir.path().join("Scenes/Level.xml"));
    let root = child_nodes(&xml).into_iter().last().expect("root node");
    for node in child_nodes(root) {
        let component = node.get_child("component").expect("component");
        assert_eq!(attribute(component, "Model"), Some("Model;Models/Quad.mdl"));
    }
}

#[test]
fn test_skinned_mesh_and_bone_animation() {
    let dir = tempdir().expect("tempdir");
    let json = r#"{
        "name": "Level",
        "objects": [
            { "name": "Rig", "kind": "armature", "animation": { "action": "Walk" } },
            { "name": "Body", "kind": "mesh", "mesh": "Quad", "parent": "Rig",
              "modifiers": [ { "type": "armature", "object": "Rig" } ] }
        ],
        "meshes": [ { "name": "Quad",
            "positions": [[0,0,0],[1,0,0],[1,0,1],[0,0,1]],
            "polygons": [ { "vertices": [0, 1, 2, 3] } ],
            "uv_layers": [ { "name": "UVMap", "data": [[0,0],[1,0],[1,1],[0,1]] } ],
            "vertex_groups": ["Hips", "Spine"],
            "weights": [[[0, 1.0]], [[0, 1.0]], [[1, 0.5], [0, 0.5]], [[1, 1.0]]] } ],
        "armatures": [ { "name": "Rig", "bones": [
            { "name": "Hips", "head": [0, 0, 0] },
            { "name": "Spine", "parent": "Hips", "head": [0, 0, 1] } ] } ],
        "actions": [ { "name": "Walk", "channels": [
            { "target": "Spine", "keys": [
                { "frame": 1, "rotation": [1, 0, 0, 0] },
                { "frame": 11, "rotation": [0.7071, 0.7071, 0, 0] } ] } ] } ]
    }"#;
    let scene = MemoryScene::from_json(json).expect("scene");
    let config = config(
        dir.path(),
        "[skeleton]\nenabled = true\n[animation]\nenabled = true\n",
    );
    let outcome = export(&scene, &config);
    assert!(outcome.success, "{}", outcome.report.summary());

    let model = read_model(&dir.path().join("Models/Body.mdl"));
    assert_eq!(model.bones.len(), 2);
    assert_eq!(model.bones[0].name, "Hips");
    assert_eq!(model.bones[0].parent_index, 0);
    assert_eq!(model.bones[1].parent_index, 0);

    let data = std::fs::read(dir.path().join("Models/Walk.ani")).expect("animation");
    let animation = AnimationSummary::parse(&data).expect("parse");
    assert_eq!(animation.name, "Walk");
    assert!(animation.tracks.iter().any(|t| t.name == "Spine"));
    assert!(animation.length > 0.0);

    let xml = read_xml(&dir.path().join("Scenes/Level.xml"));
    let root = child_nodes(&xml).into_iter().last().expect("root node");
    let body = child_nodes(root)
        .into_iter()
        .find(|n| attribute(n, "Name") == Some("Body"))
        .expect("body node");
    let component = body.get_child("component").expect("component");
    assert_eq!(component.attributes.get("type").map(String::as_str), Some("AnimatedModel"));
}

#[test]
fn test_object_animation_file_name() {
    let dir = tempdir().expect("tempdir");
    let json = r#"{
        "name": "Level",
        "objects": [ { "name": "Door", "kind": "empty", "animation": { "action": "Open" } } ],
        "actions": [ { "name": "Open", "channels": [
            { "target": "Door", "keys": [
                { "frame": 1, "position": [0, 0, 0] },
                { "frame": 5, "position": [0, 0, 2] } ] } ] } ]
    }"#;
    let scene = MemoryScene::from_json(json).expect("scene");
    let outcome = export(&scene, &config(dir.path(), "[animation]\nobjects = true\n"));
    assert!(outcome.success, "{}", outcome.report.summary());

    let data = std::fs::read(dir.path().join("Models/Door-Open.ani")).expect("animation");
    let animation = AnimationSummary::parse(&data).expect("parse");
    assert_eq!(animation.tracks.len(), 1);
    assert_eq!(animation.tracks[0].name, "Door");
}

#[test]
fn test_names_sanitized_to_one_file_are_not_overwritten() {
    let dir = tempdir().expect("tempdir");
    let objects = r#"{ "name": "Rock:1", "kind": "mesh", "mesh": "Quad" },
                     { "name": "Rock*1", "kind": "mesh", "mesh": "Tri" }"#;
    let scene = scene(objects, &[QUAD, TRI]);
    let outcome = export(&scene, &config(dir.path(), ""));

    assert!(!outcome.success);
    assert!(outcome.report.summary().contains("Rock_1.mdl"));
    let model = dir.path().join("Models/Rock_1.mdl");
    let models = outcome.written.iter().filter(|p| **p == model).count();
    assert_eq!(models, 1);
    assert_eq!(read_model(&model).vertex_buffers[0].vertex_count, 4);
}
