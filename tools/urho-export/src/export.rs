//! Export pass driver
//!
//! One call to [`export_scene`] runs the whole pipeline against a fresh
//! [`ExportContext`]:
//!
//! 1. pre-flight checks (host version, output root), the only failures that
//!    return `Err`;
//! 2. decomposition of every exported object;
//! 3. models, animations and trigger files;
//! 4. materials, copied textures and material lists;
//! 5. scene nodes and prefab documents.
//!
//! Problems after pre-flight are logged to the pass [`Report`] and the
//! offending file is skipped. The caller gets the report, the error ledger
//! and the list of files written.

use std::path::PathBuf;

use hashbrown::{HashMap, HashSet};

use crate::assemble::{assemble_animation, assemble_model, UrhoModel};
use crate::config::{ExportConfig, Origin};
use crate::decompose::{decompose, DecomposedObject};
use crate::diagnostics::{ErrorLedger, Report};
use crate::error::ExportError;
use crate::formats::{write_urho_animation, write_urho_model};
use crate::material::{material_document, material_list, triggers_document, UrhoMaterial};
use crate::paths::{check_writable, FileOptions, PathType, ResolvedPath};
use crate::scene::composer::compose;
use crate::scene::{IdAllocator, UrhoScene, UrhoSceneModel};
use crate::source::{MaterialSource, SceneSource, TextureRef, MIN_HOST_VERSION};

/// Mutable state of one export pass
pub struct ExportContext<'a> {
    pub config: &'a ExportConfig,
    pub files: FileOptions,
    pub ledger: ErrorLedger,
    pub report: Report,
    pub scene: UrhoScene,
    pub ids: IdAllocator,
    /// Pass-stable id used in prefixed model names
    pub file_id: u32,
    pub written: Vec<PathBuf>,
}

impl<'a> ExportContext<'a> {
    pub fn new(config: &'a ExportConfig, scene_name: &str) -> Self {
        let file_id = config.scene.id_seed.unwrap_or_else(rand::random) & 0xFFFF;
        Self {
            config,
            files: FileOptions::from_settings(&config.output),
            ledger: ErrorLedger::new(),
            report: Report::new(),
            scene: UrhoScene::new(scene_name),
            ids: IdAllocator::new(config.scene.id_seed),
            file_id,
            written: Vec::new(),
        }
    }

    /// Resolve an output file for `name`, or `None` when it must be skipped
    ///
    /// A name already registered for the type, or a path already written for
    /// another resource, is a critical error.
    pub fn reserve(&mut self, path_type: PathType, name: &str) -> Option<ResolvedPath> {
        self.reserve_with(path_type, name, false)
    }

    fn reserve_with(&mut self, path_type: PathType, name: &str, preserve_ext: bool) -> Option<ResolvedPath> {
        let resolved = if preserve_ext {
            self.files.resolve_preserving_ext(path_type, name)
        } else {
            self.files.resolve(path_type, name)
        };
        if !self.scene.can_register(path_type, name, &resolved.relative, &mut self.report) {
            return None;
        }
        check_writable(&resolved.full, self.files.overwrite, &mut self.report).then_some(resolved)
    }

    /// Register a file written to a reserved path
    pub fn commit(&mut self, path_type: PathType, name: &str, resolved: ResolvedPath) {
        tracing::debug!("Wrote {}", resolved.relative);
        if self.scene.add_file(path_type, name, &resolved.relative, &mut self.report) {
            self.written.push(resolved.full);
        }
    }

    /// Log a failed write; the pass goes on
    fn write_failed(&mut self, error: anyhow::Error) {
        self.report.error(format!("{:#}", error));
    }

    fn finish(mut self) -> ExportOutcome {
        self.ledger.compact();
        let blocked = self.config.diagnostics.errors_are_blocking && !self.ledger.is_empty();
        let outcome = ExportOutcome {
            success: !blocked && !self.report.has_failures(),
            ledger: self.ledger,
            report: self.report,
            written: self.written,
        };
        tracing::info!(
            "Export finished: {} files, {} ledger entries, success: {}",
            outcome.written.len(),
            outcome.ledger.total(),
            outcome.success
        );
        outcome
    }
}

/// Result of a pass that got past pre-flight
#[derive(Debug)]
pub struct ExportOutcome {
    pub success: bool,
    pub ledger: ErrorLedger,
    pub report: Report,
    pub written: Vec<PathBuf>,
}

/// Checks that stop the pass before anything is written
pub fn preflight(source: &dyn SceneSource, config: &ExportConfig) -> Result<(), ExportError> {
    let found = source.host_version();
    if found < MIN_HOST_VERSION {
        return Err(ExportError::UnsupportedHost {
            found,
            required: MIN_HOST_VERSION,
        });
    }
    let root = &config.output.path;
    if root.as_os_str().is_empty() {
        return Err(ExportError::MissingOutputPath);
    }
    std::fs::create_dir_all(root).map_err(|source| ExportError::OutputRoot {
        path: root.clone(),
        source,
    })?;
    Ok(())
}

/// Export the whole scene
pub fn export_scene(source: &dyn SceneSource, config: &ExportConfig) -> Result<ExportOutcome, ExportError> {
    preflight(source, config)?;
    let mut ctx = ExportContext::new(config, source.scene_name());
    tracing::info!("Exporting scene {} to {:?}", source.scene_name(), config.output.path);

    let mut objects = decompose(&mut ctx, source);
    tracing::info!("Decomposed {} objects", objects.len());

    if config.diagnostics.errors_are_blocking && !ctx.ledger.is_empty() {
        ctx.report.error(format!(
            "{} validation errors, nothing written",
            ctx.ledger.total()
        ));
        return Ok(ctx.finish());
    }

    if config.geometry.model_name_prefix {
        for object in objects.iter_mut().filter(|o| !o.is_empty()) {
            object.mesh_name = format!("{}-{}-{}", ctx.file_id, source.scene_name(), object.mesh_name);
        }
    }

    let models = export_models(&mut ctx, &objects);
    export_animations(&mut ctx, &objects);

    if config.material.export {
        let mut names = Vec::new();
        let mut seen = HashSet::new();
        let used = objects
            .iter()
            .filter_map(|o| models.get(&o.mesh_name))
            .flat_map(|m| m.materials())
            .flatten();
        for material in used {
            if seen.insert(material) {
                names.push(material);
            }
        }
        for name in names {
            match source.material(name) {
                Some(material) => write_material(&mut ctx, material),
                None => {
                    ctx.report.warning(format!("Material {} not found, writing a default", name));
                    let material = UrhoMaterial::named(name);
                    write_urho_material(&mut ctx, &material);
                }
            }
        }
    }

    if config.material.material_list {
        let mut listed = HashSet::new();
        for object in objects.iter().filter(|o| !o.is_empty()) {
            if let Some(model) = models.get(&object.mesh_name) {
                if listed.insert(model.name.as_str()) {
                    write_material_list(&mut ctx, model);
                }
            }
        }
    }

    for object in &objects {
        let model = models.get(&object.mesh_name).filter(|_| !object.is_empty());
        let node = UrhoSceneModel::new(object, model, source, config);
        ctx.scene.add_model(node);
    }

    let scene = &config.scene;
    if scene.individual_prefab || scene.collective_prefab || scene.scene_prefab {
        if scene.transforms && config.transform.origin == Origin::Global {
            ctx.report.warning("Node transforms are only exported with local origin");
        }
        let composed = compose(&ctx.scene, config, &ctx.files, &mut ctx.ids, &mut ctx.report);
        let written = composed.write_prefabs(&mut ctx.scene, config, &ctx.files, &mut ctx.report);
        ctx.written.extend(written);
    }

    Ok(ctx.finish())
}

/// Export every material of the scene, without geometry
pub fn export_materials(source: &dyn SceneSource, config: &ExportConfig) -> Result<ExportOutcome, ExportError> {
    preflight(source, config)?;
    let mut ctx = ExportContext::new(config, source.scene_name());
    for material in source.materials() {
        write_material(&mut ctx, material);
    }
    Ok(ctx.finish())
}

/// Assemble and write one model per mesh name
///
/// Objects sharing a mesh name reuse the first model written for it.
fn export_models(ctx: &mut ExportContext<'_>, objects: &[DecomposedObject]) -> HashMap<String, UrhoModel> {
    let mut models: HashMap<String, UrhoModel> = HashMap::new();
    for object in objects.iter().filter(|o| !o.is_empty()) {
        if models.contains_key(&object.mesh_name) && !object.has_lods() {
            tracing::debug!("{} shares model {}", object.name, object.mesh_name);
            continue;
        }
        let model = assemble_model(object, ctx.config, &mut ctx.report);
        if let Some(resolved) = ctx.reserve(PathType::Models, &model.name) {
            match write_urho_model(&model, &resolved.full) {
                Ok(()) => {
                    tracing::info!(
                        "Model {}: {} vertices, {} geometries, {} bones",
                        model.name,
                        model.vertex_count(),
                        model.geometries.len(),
                        model.bones.len()
                    );
                    ctx.commit(PathType::Models, &model.name, resolved);
                }
                Err(e) => ctx.write_failed(e),
            }
        }
        models.insert(object.mesh_name.clone(), model);
    }
    models
}

fn export_animations(ctx: &mut ExportContext<'_>, objects: &[DecomposedObject]) {
    let config = ctx.config;
    for animation in objects.iter().flat_map(|o| &o.animations) {
        let Some(urho) = assemble_animation(animation, config) else {
            ctx.report.warning(format!("Animation {} has no tracks", animation.name));
            continue;
        };
        if let Some(resolved) = ctx.reserve(PathType::Animations, &urho.name) {
            match write_urho_animation(&urho, &resolved.full) {
                Ok(()) => ctx.commit(PathType::Animations, &urho.name, resolved),
                Err(e) => ctx.write_failed(e),
            }
        }

        if config.animation.triggers && !urho.triggers.is_empty() {
            let (doc, root) = triggers_document(&urho.triggers, config.animation.normalized_triggers);
            if let Some(resolved) = ctx.reserve(PathType::Triggers, &urho.name) {
                match doc.write_file(root, &resolved.full) {
                    Ok(()) => ctx.commit(PathType::Triggers, &urho.name, resolved),
                    Err(e) => ctx.write_failed(e),
                }
            }
        }
    }
}

fn write_material(ctx: &mut ExportContext<'_>, source: &MaterialSource) {
    let material = UrhoMaterial::from_source(source, &mut ctx.ledger, &mut ctx.report);
    write_urho_material(ctx, &material);
}

fn write_urho_material(ctx: &mut ExportContext<'_>, material: &UrhoMaterial) {
    for (_, texture) in &material.textures {
        if ctx.config.material.copy_textures {
            copy_texture(ctx, texture);
        }
    }
    let files = &ctx.files;
    let scene = &ctx.scene;
    let (doc, root) = material_document(material, &mut |texture: &TextureRef| {
        scene
            .find_file(PathType::Textures, &texture.name)
            .map(str::to_string)
            .unwrap_or_else(|| files.resolve_preserving_ext(PathType::Textures, &texture.name).relative)
    });
    if let Some(resolved) = ctx.reserve(PathType::Materials, &material.name) {
        match doc.write_file(root, &resolved.full) {
            Ok(()) => ctx.commit(PathType::Materials, &material.name, resolved),
            Err(e) => ctx.write_failed(e),
        }
    }
}

/// Copy a texture image into the textures folder, once per pass
fn copy_texture(ctx: &mut ExportContext<'_>, texture: &TextureRef) {
    if ctx.scene.find_file(PathType::Textures, &texture.name).is_some() {
        return;
    }
    let Some(from) = texture.path.as_deref() else {
        return;
    };
    if !from.is_file() {
        ctx.report.error(format!("Texture image {:?} not found", from));
        return;
    }
    if let Some(resolved) = ctx.reserve_with(PathType::Textures, &texture.name, true) {
        match std::fs::copy(from, &resolved.full) {
            Ok(_) => ctx.commit(PathType::Textures, &texture.name, resolved),
            Err(e) => ctx
                .report
                .error(format!("Cannot copy {:?} to {:?}: {}", from, resolved.full, e)),
        }
    }
}

fn write_material_list(ctx: &mut ExportContext<'_>, model: &UrhoModel) {
    let entries: Vec<Option<String>> = model
        .materials()
        .map(|m| {
            m.and_then(|name| ctx.scene.find_file(PathType::Materials, name))
                .map(str::to_string)
        })
        .collect();
    if let Some(resolved) = ctx.reserve(PathType::MaterialLists, &model.name) {
        match std::fs::write(&resolved.full, material_list(&entries)) {
            Ok(()) => ctx.commit(PathType::MaterialLists, &model.name, resolved),
            Err(e) => ctx
                .report
                .error(format!("Cannot write {:?}: {}", resolved.full, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_settings;
    use crate::source::{HostVersion, MemoryScene};

    fn config(root: &std::path::Path, extra: &str) -> ExportConfig {
        parse_settings(&format!("[output]\npath = {:?}\n{}", root, extra))
            .expect("settings")
            .validate()
            .expect("valid")
    }

    #[test]
    fn test_preflight_rejects_old_host() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut scene = MemoryScene::new("Old");
        scene.host_version = HostVersion(2, 79, 0);
        let result = export_scene(&scene, &config(dir.path(), ""));
        assert!(matches!(result, Err(ExportError::UnsupportedHost { .. })));
    }

    #[test]
    fn test_reserve_rejects_duplicates() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = config(dir.path(), "");
        let mut ctx = ExportContext::new(&config, "Scene");
        let resolved = ctx.reserve(PathType::Models, "Box").expect("first");
        std::fs::create_dir_all(resolved.full.parent().expect("parent")).expect("mkdir");
        std::fs::write(&resolved.full, b"x").expect("write");
        ctx.commit(PathType::Models, "Box", resolved);

        assert!(ctx.reserve(PathType::Models, "Box").is_none());
        assert!(ctx.report.has_failures());
        assert_eq!(ctx.written.len(), 1);

        // Sanitizes to the same file
        let resolved = ctx.reserve(PathType::Models, "Rock:1").expect("rock");
        assert_eq!(resolved.relative, "Models/Rock_1.mdl");
        ctx.commit(PathType::Models, "Rock:1", resolved);
        assert!(ctx.reserve(PathType::Models, "Rock*1").is_none());
        assert!(ctx.reserve(PathType::Materials, "Box").is_some());
    }

    #[test]
    fn test_empty_scene_writes_scene_prefab() {
        let dir = tempfile::tempdir().expect("tempdir");
        let scene = MemoryScene::new("Empty");
        let outcome = export_scene(&scene, &config(dir.path(), "")).expect("export");
        assert!(outcome.success);
        assert_eq!(outcome.written, vec![dir.path().join("Scenes").join("Empty.xml")]);
    }

    #[test]
    fn test_export_materials_only() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut scene = MemoryScene::new("Mats");
        scene.materials.push(MaterialSource {
            name: "Red".to_string(),
            diffuse_color: [1.0, 0.0, 0.0, 1.0],
            ..Default::default()
        });
        let outcome = export_materials(&scene, &config(dir.path(), "")).expect("export");
        assert!(outcome.success);
        let text = std::fs::read_to_string(dir.path().join("Materials/Red.xml")).expect("read");
        assert!(text.contains("value=\"1 0 0 1\""));
    }
}
