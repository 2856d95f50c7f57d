//! Output path resolution
//!
//! Maps a resource type and name to the file written on disk and to the
//! engine-relative path other documents use to reference it.

use std::path::{Path, PathBuf};

use crate::config::{OutputSettings, SubDirs};
use crate::diagnostics::Report;

/// Class of an exported resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PathType {
    Models,
    Animations,
    Triggers,
    Materials,
    Techniques,
    Textures,
    MaterialLists,
    Objects,
    Scenes,
}

impl PathType {
    /// Canonical file extension
    pub fn extension(self) -> &'static str {
        match self {
            PathType::Models => urho_common::MODEL_EXT,
            PathType::Animations => urho_common::ANIMATION_EXT,
            PathType::Textures => "png",
            PathType::MaterialLists => "txt",
            PathType::Triggers
            | PathType::Materials
            | PathType::Techniques
            | PathType::Objects
            | PathType::Scenes => "xml",
        }
    }

    fn sub_dir(self, dirs: &SubDirs) -> &str {
        match self {
            PathType::Models => &dirs.models,
            PathType::Animations => &dirs.animations,
            PathType::Triggers => &dirs.triggers,
            PathType::Materials => &dirs.materials,
            PathType::Techniques => &dirs.techniques,
            PathType::Textures => &dirs.textures,
            PathType::MaterialLists => &dirs.material_lists,
            PathType::Objects => &dirs.objects,
            PathType::Scenes => &dirs.scenes,
        }
    }
}

/// A resolved output location
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    /// File on disk
    pub full: PathBuf,
    /// Engine resource path, always `/`-separated
    pub relative: String,
}

/// Output folder layout of one export pass
#[derive(Debug, Clone)]
pub struct FileOptions {
    pub root: PathBuf,
    pub use_sub_dirs: bool,
    pub overwrite: bool,
    pub dirs: SubDirs,
}

impl FileOptions {
    pub fn from_settings(output: &OutputSettings) -> Self {
        Self {
            root: output.path.clone(),
            use_sub_dirs: output.use_sub_dirs,
            overwrite: output.overwrite,
            dirs: output.dirs.clone(),
        }
    }

    /// Resolve a single resource name
    pub fn resolve(&self, path_type: PathType, name: &str) -> ResolvedPath {
        self.resolve_components(path_type, &[name], false)
    }

    /// Resolve a name whose own extension is kept when present
    pub fn resolve_preserving_ext(&self, path_type: PathType, name: &str) -> ResolvedPath {
        self.resolve_components(path_type, &[name], true)
    }

    /// Resolve a name given as path components; separators between them are kept
    pub fn resolve_components(
        &self,
        path_type: PathType,
        components: &[&str],
        preserve_ext: bool,
    ) -> ResolvedPath {
        let mut parts: Vec<String> = components.iter().map(|c| sanitize(c)).collect();
        if let Some(file) = parts.last_mut() {
            let has_ext = Path::new(file.as_str()).extension().is_some();
            if !(preserve_ext && has_ext) {
                file.push('.');
                file.push_str(path_type.extension());
            }
        }

        let mut relative_parts = Vec::new();
        if self.use_sub_dirs {
            let sub_dir = path_type.sub_dir(&self.dirs);
            relative_parts.extend(
                sub_dir
                    .split(['/', '\\'])
                    .filter(|s| !s.is_empty())
                    .map(str::to_string),
            );
        }
        relative_parts.extend(parts);

        let mut full = self.root.clone();
        for part in &relative_parts {
            full.push(part);
        }
        ResolvedPath {
            full,
            relative: relative_parts.join("/"),
        }
    }
}

/// Replace characters outside the safe set with `_`
pub fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '_' | '.' | ')' | '(' | '-' | ' ') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Prepare `path` for writing
///
/// Creates missing parent folders. Returns false when the folder cannot be
/// created or the file exists and overwriting is off; callers skip the file.
pub fn check_writable(path: &Path, overwrite: bool, report: &mut Report) -> bool {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.is_dir() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                report.error(format!("Cannot create folder {:?}: {}", parent, e));
                return false;
            }
        }
    }
    if path.exists() && !overwrite {
        report.error(format!("File already exists {:?}", path));
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn options(root: &Path, use_sub_dirs: bool) -> FileOptions {
        FileOptions {
            root: root.to_path_buf(),
            use_sub_dirs,
            overwrite: false,
            dirs: SubDirs::default(),
        }
    }

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize("Box (1).001"), "Box (1).001");
        assert_eq!(sanitize("a/b:c*d"), "a_b_c_d");
        assert_eq!(sanitize("Ünïcode-ok"), "Ünïcode-ok");
    }

    #[test]
    fn test_resolve_with_sub_dirs() {
        let opts = options(Path::new("/out"), true);
        let model = opts.resolve(PathType::Models, "Box");
        assert_eq!(model.relative, "Models/Box.mdl");
        assert_eq!(model.full, Path::new("/out/Models/Box.mdl"));

        let scene = opts.resolve(PathType::Scenes, "Level 1");
        assert_eq!(scene.relative, "Scenes/Level 1.xml");
    }

    #[test]
    fn test_resolve_flat() {
        let opts = options(Path::new("/out"), false);
        assert_eq!(opts.resolve(PathType::Animations, "Walk").relative, "Walk.ani");
    }

    #[test]
    fn test_preserve_extension() {
        let opts = options(Path::new("/out"), true);
        let tex = opts.resolve_preserving_ext(PathType::Textures, "wood.jpg");
        assert_eq!(tex.relative, "Textures/wood.jpg");
        let tex = opts.resolve_preserving_ext(PathType::Textures, "wood");
        assert_eq!(tex.relative, "Textures/wood.png");
        let mat = opts.resolve(PathType::Materials, "wood.jpg");
        assert_eq!(mat.relative, "Materials/wood.jpg.xml");
    }

    #[test]
    fn test_resolve_components_keeps_separators() {
        let opts = options(Path::new("/out"), true);
        let path = opts.resolve_components(PathType::Objects, &["Level", "Door:1"], false);
        assert_eq!(path.relative, "Objects/Level/Door_1.xml");
    }

    #[test]
    fn test_check_writable_respects_overwrite() {
        let dir = tempdir().expect("Failed to create temp dir");
        let file = dir.path().join("Models").join("Box.mdl");
        let mut report = Report::new();

        assert!(check_writable(&file, false, &mut report));
        assert!(file.parent().unwrap().is_dir());

        std::fs::write(&file, b"x").expect("Failed to write file");
        assert!(!check_writable(&file, false, &mut report));
        assert!(check_writable(&file, true, &mut report));
        assert_eq!(report.records().len(), 1);
    }
}
