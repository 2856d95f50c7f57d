//! Urho3D binary animation format (.ani)
//!
//! # Layout
//! ```text
//! 0x00: magic "UANI"
//!       name cstr
//!       length f32 (seconds)
//!       track_count u32
//!       per track:
//!         name cstr
//!         mask u8 (TRACK_POSITION | TRACK_ROTATION | TRACK_SCALE)
//!         keyframe_count u32
//!         per keyframe: time f32, [position vec3], [rotation quat wxyz], [scale vec3]
//! ```

use super::{BinaryReader, FormatError};

/// Magic bytes for binary animations
pub const ANIMATION_MAGIC: &[u8; 4] = b"UANI";

/// Track channel flag: keyframes carry a position
pub const TRACK_POSITION: u8 = 0x01;
/// Track channel flag: keyframes carry a rotation
pub const TRACK_ROTATION: u8 = 0x02;
/// Track channel flag: keyframes carry a scale
pub const TRACK_SCALE: u8 = 0x04;

/// Size in bytes of one keyframe for a track mask
#[inline]
pub const fn keyframe_size(mask: u8) -> usize {
    let mut size = 4; // time
    if mask & TRACK_POSITION != 0 {
        size += 12;
    }
    if mask & TRACK_ROTATION != 0 {
        size += 16;
    }
    if mask & TRACK_SCALE != 0 {
        size += 12;
    }
    size
}

/// Summary of one track read back from an animation file
#[derive(Debug, Clone, PartialEq)]
pub struct TrackSummary {
    pub name: String,
    pub mask: u8,
    pub keyframe_times: Vec<f32>,
}

/// Structure of a binary animation
#[derive(Debug, Clone, PartialEq)]
pub struct AnimationSummary {
    pub name: String,
    pub length: f32,
    pub tracks: Vec<TrackSummary>,
}

impl AnimationSummary {
    /// Parse a complete animation file
    pub fn parse(data: &[u8]) -> Result<Self, FormatError> {
        let mut r = BinaryReader::new(data);
        r.expect_magic(ANIMATION_MAGIC)?;
        let name = r.read_cstr()?;
        let length = r.read_f32()?;
        let track_count = r.read_u32()?;

        let mut tracks = Vec::with_capacity(track_count as usize);
        for _ in 0..track_count {
            let name = r.read_cstr()?;
            let mask = r.read_u8()?;
            let keyframe_count = r.read_u32()?;
            let mut keyframe_times = Vec::with_capacity(keyframe_count as usize);
            for _ in 0..keyframe_count {
                keyframe_times.push(r.read_f32()?);
                r.skip(keyframe_size(mask) - 4)?;
            }
            tracks.push(TrackSummary {
                name,
                mask,
                keyframe_times,
            });
        }

        Ok(Self {
            name,
            length,
            tracks,
        })
    }

    pub fn track(&self, name: &str) -> Option<&TrackSummary> {
        self.tracks.iter().find(|t| t.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::BinaryWriter;

    #[test]
    fn test_keyframe_size() {
        assert_eq!(keyframe_size(0), 4);
        assert_eq!(keyframe_size(TRACK_POSITION | TRACK_ROTATION), 32);
        assert_eq!(keyframe_size(TRACK_POSITION | TRACK_ROTATION | TRACK_SCALE), 44);
    }

    #[test]
    fn test_parse_single_track() {
        let mut w = BinaryWriter::new();
        w.write_bytes(ANIMATION_MAGIC);
        w.write_cstr("Walk");
        w.write_f32(1.0);
        w.write_u32(1);
        w.write_cstr("Hips");
        w.write_u8(TRACK_POSITION);
        w.write_u32(2);
        for t in [0.0f32, 1.0] {
            w.write_f32(t);
            w.write_f32(0.0);
            w.write_f32(t);
            w.write_f32(0.0);
        }
        let summary = AnimationSummary::parse(&w.into_inner()).unwrap();
        assert_eq!(summary.name, "Walk");
        assert_eq!(summary.tracks.len(), 1);
        assert_eq!(summary.track("Hips").unwrap().keyframe_times, vec![0.0, 1.0]);
    }
}
