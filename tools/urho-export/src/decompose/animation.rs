//! Bone and object animation extraction.
//!
//! A clip is a frame range plus a stack of layers, each layer playing one
//! action over part of the range. Clips come from actions, NLA strips, NLA
//! tracks or the scene timeline; every track is sampled from the topmost
//! layer keying it.

use glam::{Quat, Vec3};

use super::{SkeletonData, TAnimation, TKeyframe, TTrack, TTrigger};
use crate::config::{AnimationSettings, AnimationSource};
use crate::export::ExportContext;
use crate::math::{quat_wxyz, SpaceTransform, Transform};
use crate::source::{Action, ActionChannel, Marker, NlaStrip, SceneObject, SceneSource};

/// Frames closer than this are the same sample
const FRAME_EPSILON: f32 = 1e-4;

/// One action placed on the clip's timeline
#[derive(Debug, Clone, Copy)]
struct Layer<'a> {
    action: &'a Action,
    start: f32,
    end: f32,
}

impl<'a> Layer<'a> {
    fn whole(action: &'a Action) -> Self {
        let (start, end) = action.range();
        Self { action, start, end }
    }

    fn strip(action: &'a Action, strip: &NlaStrip) -> Self {
        Self {
            action,
            start: strip.frame_start,
            end: strip.frame_end,
        }
    }

    fn covers(&self, frame: f32) -> bool {
        frame >= self.start - FRAME_EPSILON && frame <= self.end + FRAME_EPSILON
    }

    /// Clip frame to action frame
    fn map(&self, frame: f32) -> f32 {
        let (a0, a1) = self.action.range();
        let span = self.end - self.start;
        if span.abs() < FRAME_EPSILON {
            return a0;
        }
        a0 + (frame.clamp(self.start, self.end) - self.start) * (a1 - a0) / span
    }

    /// Action frame to clip frame
    fn unmap(&self, frame: f32) -> f32 {
        let (a0, a1) = self.action.range();
        let span = a1 - a0;
        if span.abs() < FRAME_EPSILON {
            return self.start;
        }
        self.start + (frame - a0) * (self.end - self.start) / span
    }
}

#[derive(Debug, Clone)]
struct Clip<'a> {
    name: String,
    start: f32,
    end: f32,
    layers: Vec<Layer<'a>>,
    /// Pose markers travel with actions; other clips use scene markers
    action_markers: bool,
    /// Built from NLA tracks or the timeline, which drop the closing frame
    track_sum: bool,
}

impl<'a> Clip<'a> {
    fn from_action(action: &'a Action) -> Self {
        let (start, end) = action.range();
        Self {
            name: action.name.clone(),
            start,
            end,
            layers: vec![Layer::whole(action)],
            action_markers: true,
            track_sum: false,
        }
    }

    fn keys(&self, target: &str) -> bool {
        self.layers.iter().any(|l| l.action.channel(target).is_some())
    }

    /// Channel keying `target` at `frame`, with the action frame to read
    fn channel_at(&self, target: &str, frame: f32) -> Option<(&'a ActionChannel, f32)> {
        let keyed = || {
            self.layers
                .iter()
                .rev()
                .filter_map(move |l| l.action.channel(target).map(|c| (l, c)))
        };
        keyed()
            .find(|(l, _)| l.covers(frame))
            .or_else(|| keyed().next())
            .map(|(l, c)| (c, l.map(frame)))
    }

    fn markers(&self, scene: &'a [Marker]) -> Vec<&'a Marker> {
        let markers: Vec<&Marker> = if self.action_markers {
            self.layers.iter().flat_map(|l| l.action.markers.iter()).collect()
        } else {
            scene.iter().collect()
        };
        let mut markers: Vec<&Marker> = markers
            .into_iter()
            .filter(|m| m.frame >= self.start - FRAME_EPSILON && m.frame <= self.end + FRAME_EPSILON)
            .collect();
        markers.sort_by(|a, b| a.frame.total_cmp(&b.frame));
        markers
    }
}

/// Clips of an object for the configured source
fn select_clips<'a>(
    source: &'a dyn SceneSource,
    object: &'a SceneObject,
    settings: &AnimationSettings,
    warn: &mut dyn FnMut(String),
) -> Vec<Clip<'a>> {
    let data = object.animation.as_ref();
    let current = data
        .and_then(|d| d.action.as_deref())
        .and_then(|name| source.action(name));
    let tracks = data.map(|d| d.tracks.as_slice()).unwrap_or(&[]);
    let mut strip_layer = |strip: &NlaStrip| match source.action(&strip.action) {
        Some(action) => Some(Layer::strip(action, strip)),
        None => {
            warn(format!("Strip {} uses missing action {}", strip.name, strip.action));
            None
        }
    };

    let mut clips = Vec::new();
    match settings.source {
        AnimationSource::AllActions => {
            clips.extend(source.actions().iter().map(Clip::from_action));
        }
        AnimationSource::CurrentAction => {
            clips.extend(current.map(Clip::from_action));
        }
        AnimationSource::UsedActions => {
            let mut used: Vec<&Action> = current.into_iter().collect();
            for strip in tracks.iter().flat_map(|t| t.strips.iter()) {
                if let Some(action) = source.action(&strip.action) {
                    if !used.iter().any(|a| a.name == action.name) {
                        used.push(action);
                    }
                }
            }
            clips.extend(used.into_iter().map(Clip::from_action));
        }
        AnimationSource::SelectedActions => {
            clips.extend(source.actions().iter().filter(|a| a.selected).map(Clip::from_action));
        }
        AnimationSource::SelectedStrips | AnimationSource::AllStrips => {
            let selected_only = settings.source == AnimationSource::SelectedStrips;
            for track in tracks.iter().filter(|t| !t.muted) {
                for strip in &track.strips {
                    if strip.muted || (selected_only && !strip.selected) {
                        continue;
                    }
                    if let Some(layer) = strip_layer(strip) {
                        clips.push(Clip {
                            name: strip.name.clone(),
                            start: strip.frame_start,
                            end: strip.frame_end,
                            layers: vec![layer],
                            action_markers: false,
                            track_sum: false,
                        });
                    }
                }
            }
        }
        AnimationSource::SelectedTracks | AnimationSource::AllTracks => {
            let selected_only = settings.source == AnimationSource::SelectedTracks;
            for track in tracks {
                if track.muted || (selected_only && !track.selected) {
                    continue;
                }
                let layers: Vec<Layer<'_>> = track
                    .strips
                    .iter()
                    .filter(|s| !s.muted)
                    .filter_map(&mut strip_layer)
                    .collect();
                let Some(start) = layers.iter().map(|l| l.start).reduce(f32::min) else {
                    continue;
                };
                let end = layers.iter().map(|l| l.end).fold(start, f32::max);
                clips.push(Clip {
                    name: track.name.clone(),
                    start,
                    end,
                    layers,
                    action_markers: false,
                    track_sum: true,
                });
            }
        }
        AnimationSource::Timeline => {
            let (start, end) = source.frame_range();
            let mut layers: Vec<Layer<'_>> = tracks
                .iter()
                .filter(|t| !t.muted)
                .flat_map(|t| t.strips.iter().filter(|s| !s.muted))
                .filter_map(&mut strip_layer)
                .collect();
            if let Some(action) = current {
                layers.push(Layer {
                    action,
                    start,
                    end,
                });
            }
            if !layers.is_empty() {
                clips.push(Clip {
                    name: source.scene_name().to_string(),
                    start,
                    end,
                    layers,
                    action_markers: false,
                    track_sum: true,
                });
            }
        }
    }
    clips
}

/// Clip frames to sample, ascending
fn sample_frames(clip: &Clip<'_>, targets: &[&str], settings: &AnimationSettings) -> Vec<f32> {
    let mut frames = Vec::new();
    if settings.by_keyframes && settings.source.is_action_based() {
        frames.push(clip.start);
        frames.push(clip.end);
        for layer in &clip.layers {
            for channel in layer.action.channels.iter().filter(|c| targets.contains(&c.target.as_str())) {
                frames.extend(
                    channel
                        .keys
                        .iter()
                        .map(|k| layer.unmap(k.frame))
                        .filter(|f| *f >= clip.start && *f <= clip.end),
                );
            }
        }
        frames.sort_by(f32::total_cmp);
        frames.dedup_by(|a, b| (*a - *b).abs() < FRAME_EPSILON);
    } else {
        let steps = ((clip.end - clip.start).max(0.0) + FRAME_EPSILON).floor() as u64;
        frames.extend((0..=steps).map(|i| clip.start + i as f32));
    }
    frames
}

/// Authored channel value at `frame`; unkeyed components keep `base`
fn evaluate(channel: &ActionChannel, frame: f32, base: &Transform) -> Transform {
    fn interpolate<T: Copy>(
        channel: &ActionChannel,
        frame: f32,
        get: impl Fn(&crate::source::Keyframe) -> Option<T>,
        mix: impl Fn(T, T, f32) -> T,
    ) -> Option<T> {
        let mut before: Option<(f32, T)> = None;
        let mut after: Option<(f32, T)> = None;
        for key in &channel.keys {
            let Some(value) = get(key) else { continue };
            if key.frame <= frame && before.is_none_or(|(f, _)| key.frame >= f) {
                before = Some((key.frame, value));
            }
            if key.frame >= frame && after.is_none_or(|(f, _)| key.frame < f) {
                after = Some((key.frame, value));
            }
        }
        match (before, after) {
            (Some((f0, a)), Some((f1, b))) if f1 - f0 > FRAME_EPSILON => {
                Some(mix(a, b, (frame - f0) / (f1 - f0)))
            }
            (Some((_, a)), _) => Some(a),
            (None, Some((_, b))) => Some(b),
            (None, None) => None,
        }
    }

    let translation = interpolate(channel, frame, |k| k.position.map(Vec3::from_array), Vec3::lerp);
    let rotation = interpolate(channel, frame, |k| k.rotation.map(quat_wxyz), Quat::slerp);
    let scale = interpolate(channel, frame, |k| k.scale.map(Vec3::from_array), Vec3::lerp);
    Transform::new(
        translation.unwrap_or(base.translation),
        rotation.unwrap_or(base.rotation),
        scale.unwrap_or(base.scale),
    )
}

fn triggers(clip: &Clip<'_>, scene_markers: &[Marker], fps: f32) -> Vec<TTrigger> {
    let span = clip.end - clip.start;
    clip.markers(scene_markers)
        .into_iter()
        .map(|m| TTrigger {
            name: m.name.clone(),
            time: (m.frame - clip.start) / fps,
            normalized: if span > FRAME_EPSILON {
                ((m.frame - clip.start) / span).clamp(0.0, 1.0)
            } else {
                0.0
            },
        })
        .collect()
}

/// Build a track from sampled keyframes, applying the extra frame
fn finish_track(
    name: &str,
    mut keyframes: Vec<TKeyframe>,
    settings: &AnimationSettings,
    extra_time: Option<f32>,
) -> Option<TTrack> {
    if keyframes.is_empty() {
        return None;
    }
    // A track holding one pose for the whole clip
    let constant = keyframes
        .windows(2)
        .all(|w| w[0] == TKeyframe { time: w[0].time, ..w[1] });
    if settings.filter_single_keyframes && constant {
        return None;
    }
    if let Some(time) = extra_time {
        let first = keyframes[0];
        keyframes.push(TKeyframe { time, ..first });
    }
    Some(TTrack {
        name: name.to_string(),
        keyframes,
    })
}

/// Clip length in seconds and the time of the extra frame, if any
///
/// Only track and timeline clips get the extra frame.
fn clip_length(clip: &Clip<'_>, fps: f32, extra: bool) -> (f32, Option<f32>) {
    let length = (clip.end - clip.start).max(0.0) / fps;
    if extra && clip.track_sum {
        let time = length + 1.0 / fps;
        (time, Some(time))
    } else {
        (length, None)
    }
}

/// Skeletal animations of an armature object
pub(crate) fn extract_bone_animations(
    ctx: &mut ExportContext<'_>,
    source: &dyn SceneSource,
    armature_object: &SceneObject,
    skeleton: &SkeletonData,
) -> Vec<TAnimation> {
    let config = ctx.config;
    let settings = &config.animation;
    let space = config.space();
    let fps = source.frame_rate().max(1.0);
    let report = &mut ctx.report;
    let clips = select_clips(source, armature_object, settings, &mut |m: String| report.warning(m));

    let targets: Vec<&str> = skeleton.source_names.iter().map(String::as_str).collect();
    let mut animations = Vec::new();
    for clip in clips {
        if !targets.iter().any(|t| clip.keys(t)) {
            tracing::debug!("Clip {} keys no bone of {}", clip.name, armature_object.name);
            continue;
        }
        let frames = sample_frames(&clip, &targets, settings);
        let (length, extra_time) = clip_length(&clip, fps, settings.extra_frame);

        let mut tracks = Vec::new();
        for (index, bone) in skeleton.bones.iter().enumerate() {
            let target = targets[index];
            if settings.only_keyed_bones && !clip.keys(target) {
                continue;
            }
            let rest = match bone.parent {
                Some(parent) => skeleton.rest[index].relative_to(&skeleton.rest[parent]),
                None => skeleton.rest[index],
            };
            let keyframes: Vec<TKeyframe> = frames
                .iter()
                .map(|&frame| {
                    let pose = clip
                        .channel_at(target, frame)
                        .map(|(channel, f)| evaluate(channel, f, &Transform::IDENTITY))
                        .unwrap_or(Transform::IDENTITY);
                    let local = rest.mul(&pose);
                    let engine = bone_space(&space, &local, bone.parent.is_some());
                    TKeyframe {
                        time: (frame - clip.start) / fps,
                        position: engine.translation,
                        rotation: engine.rotation,
                        scale: engine.scale,
                    }
                })
                .collect();
            tracks.extend(finish_track(&bone.name, keyframes, settings, extra_time));
        }

        let triggers = if settings.triggers {
            triggers(&clip, source.markers(), fps)
        } else {
            Vec::new()
        };
        tracing::debug!("Animation {}: {} tracks, {} frames", clip.name, tracks.len(), frames.len());
        animations.push(TAnimation {
            name: clip.name,
            length,
            tracks,
            triggers,
        });
    }
    animations
}

fn bone_space(space: &SpaceTransform, local: &Transform, has_parent: bool) -> Transform {
    if has_parent {
        space.local_transform(local)
    } else {
        space.root_transform(local)
    }
}

/// Node animations of an object, one track named after the object
pub(crate) fn extract_object_animations(
    ctx: &mut ExportContext<'_>,
    source: &dyn SceneSource,
    object: &SceneObject,
) -> Vec<TAnimation> {
    if object.animation.is_none() {
        return Vec::new();
    }
    let config = ctx.config;
    let settings = &config.animation;
    let space = config.space();
    let fps = source.frame_rate().max(1.0);
    let report = &mut ctx.report;
    let clips = select_clips(source, object, settings, &mut |m: String| report.warning(m));
    let target = object.name.as_str();

    let mut animations = Vec::new();
    for clip in clips {
        if !clip.keys(target) {
            continue;
        }
        let frames = sample_frames(&clip, &[target], settings);
        let (length, extra_time) = clip_length(&clip, fps, settings.extra_frame);
        let keyframes: Vec<TKeyframe> = frames
            .iter()
            .map(|&frame| {
                let local = clip
                    .channel_at(target, frame)
                    .map(|(channel, f)| evaluate(channel, f, &object.transform))
                    .unwrap_or(object.transform);
                let engine = space.node_transform(&local);
                TKeyframe {
                    time: (frame - clip.start) / fps,
                    position: engine.translation,
                    rotation: engine.rotation,
                    scale: engine.scale,
                }
            })
            .collect();
        let tracks: Vec<TTrack> = finish_track(target, keyframes, settings, extra_time)
            .into_iter()
            .collect();
        if tracks.is_empty() {
            continue;
        }
        let triggers = if settings.triggers {
            triggers(&clip, source.markers(), fps)
        } else {
            Vec::new()
        };
        animations.push(TAnimation {
            name: format!("{}-{}", object.name, clip.name),
            length,
            tracks,
            triggers,
        });
    }
    animations
}
