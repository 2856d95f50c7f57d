//! Armature to engine skeleton.

use hashbrown::HashMap;

use super::TBone;
use crate::config::{ExportConfig, Origin};
use crate::diagnostics::Report;
use crate::math::Transform;
use crate::source::{world_transform, Armature, BoneData, SceneObject, SceneSource};

/// Prefix of deforming bones in generated rigs
const DEFORM_PREFIX: &str = "DEF-";

/// Exported bones of one armature
#[derive(Debug, Clone, Default)]
pub struct SkeletonData {
    pub bones: Vec<TBone>,
    /// Host bone name of every exported bone
    pub source_names: Vec<String>,
    /// Rest transform of every exported bone in authoring model space
    pub rest: Vec<Transform>,
    lookup: HashMap<String, usize>,
}

impl SkeletonData {
    /// Bone index by exported or host name
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.lookup.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.bones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bones.is_empty()
    }
}

struct Kept<'a> {
    bone: &'a BoneData,
    name: String,
    parent: Option<usize>,
}

/// Build the engine skeleton of `armature`
///
/// The rig cleanup runs first: only `DEF-` bones (and `root`) survive, with
/// the prefix stripped and reparented to their closest surviving ancestor.
/// The deform and visibility filters then drop bones together with their
/// descendants.
pub fn extract_skeleton(
    armature: &Armature,
    armature_object: Option<&SceneObject>,
    source: &dyn SceneSource,
    config: &ExportConfig,
    report: &mut Report,
) -> SkeletonData {
    let settings = &config.skeleton;
    let by_name: HashMap<&str, usize> = armature
        .bones
        .iter()
        .enumerate()
        .map(|(i, b)| (b.name.as_str(), i))
        .collect();

    // Host index -> closest candidate at or above it
    let mut anchor: Vec<Option<usize>> = vec![None; armature.bones.len()];
    let mut candidates: Vec<Kept<'_>> = Vec::new();
    for (i, bone) in armature.bones.iter().enumerate() {
        let parent = match bone.parent.as_deref() {
            Some(name) => match by_name.get(name) {
                Some(&p) if p < i => Some(p),
                Some(_) => {
                    report.warning(format!(
                        "Bone {} listed before its parent {}, treated as root",
                        bone.name, name
                    ));
                    None
                }
                None => {
                    report.warning(format!("Parent {} of bone {} not found", name, bone.name));
                    None
                }
            },
            None => None,
        };
        let parent_anchor = parent.and_then(|p| anchor[p]);
        let rig_kept =
            !settings.derigify || bone.name.starts_with(DEFORM_PREFIX) || bone.name == "root";
        if !rig_kept {
            anchor[i] = parent_anchor;
            continue;
        }
        let name = if settings.derigify {
            bone.name.strip_prefix(DEFORM_PREFIX).unwrap_or(&bone.name).to_string()
        } else {
            bone.name.clone()
        };
        candidates.push(Kept {
            bone,
            name,
            parent: parent_anchor,
        });
        anchor[i] = Some(candidates.len() - 1);
    }

    // Candidate index -> kept index
    let mut kept_index: Vec<Option<usize>> = vec![None; candidates.len()];
    let mut kept: Vec<Kept<'_>> = Vec::new();
    for (i, candidate) in candidates.into_iter().enumerate() {
        let bone = candidate.bone;
        let dropped = (settings.only_deform && !bone.deform)
            || (settings.only_visible && bone.hidden)
            || candidate.parent.is_some_and(|p| kept_index[p].is_none());
        if dropped {
            continue;
        }
        kept.push(Kept {
            parent: candidate.parent.and_then(|p| kept_index[p]),
            ..candidate
        });
        kept_index[i] = Some(kept.len() - 1);
    }

    let space = config.space();
    let model = match (config.transform.origin, armature_object) {
        (Origin::Global, Some(object)) => Some(world_transform(source, object)),
        _ => None,
    };

    let mut data = SkeletonData::default();
    for entry in &kept {
        let rest = match &model {
            Some(world) => world.mul(&entry.bone.rest()),
            None => entry.bone.rest(),
        };
        let (local, bind) = match entry.parent {
            Some(p) => {
                let local = space.local_transform(&rest.relative_to(&data.rest[p]));
                (local, data.bones[p].bind.mul(&local))
            }
            None => {
                let root = space.root_transform(&rest);
                (root, root)
            }
        };
        let index = data.bones.len();
        data.lookup.insert(entry.name.clone(), index);
        data.lookup.insert(entry.bone.name.clone(), index);
        data.source_names.push(entry.bone.name.clone());
        data.rest.push(rest);
        data.bones.push(TBone {
            name: entry.name.clone(),
            parent: entry.parent,
            local,
            bind,
            length: entry.bone.length * space.scale(),
        });
    }

    if data.bones.is_empty() {
        report.warning(format!("Armature {} has no exported bones", armature.name));
    } else {
        tracing::debug!("Armature {}: {} of {} bones", armature.name, data.len(), armature.bones.len());
    }
    data
}
