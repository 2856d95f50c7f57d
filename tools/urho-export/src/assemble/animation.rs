//! Decomposed animation to engine animation.

use crate::config::ExportConfig;
use crate::decompose::{TAnimation, TKeyframe, TTrigger};
use urho_common::{TRACK_POSITION, TRACK_ROTATION, TRACK_SCALE};

#[derive(Debug, Clone, PartialEq)]
pub struct UrhoTrack {
    pub name: String,
    pub mask: u8,
    pub keyframes: Vec<TKeyframe>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UrhoAnimation {
    pub name: String,
    pub length: f32,
    pub tracks: Vec<UrhoTrack>,
    pub triggers: Vec<TTrigger>,
}

/// Track channels enabled by the animation settings
pub fn track_mask(config: &ExportConfig) -> u8 {
    let settings = &config.animation;
    let mut mask = 0;
    if settings.position {
        mask |= TRACK_POSITION;
    }
    if settings.rotation {
        mask |= TRACK_ROTATION;
    }
    if settings.scale {
        mask |= TRACK_SCALE;
    }
    mask
}

/// `None` when no channel is enabled or no track has keyframes
pub fn assemble_animation(animation: &TAnimation, config: &ExportConfig) -> Option<UrhoAnimation> {
    let mask = track_mask(config);
    if mask == 0 {
        return None;
    }
    let tracks: Vec<UrhoTrack> = animation
        .tracks
        .iter()
        .filter(|t| !t.keyframes.is_empty())
        .map(|t| UrhoTrack {
            name: t.name.clone(),
            mask,
            keyframes: t.keyframes.clone(),
        })
        .collect();
    if tracks.is_empty() {
        return None;
    }
    Some(UrhoAnimation {
        name: animation.name.clone(),
        length: animation.length,
        tracks,
        triggers: animation.triggers.clone(),
    })
}
