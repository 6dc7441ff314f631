//! Media sample types shared across the broadcast pipeline
//!
//! This module provides:
//! - Sample buffers with rational presentation timestamps
//! - Media kind tagging (video/audio)
//! - Broadcast quality presets

use bytes::Bytes;
use serde::{Deserialize, Serialize};

// ============================================================================
// PRESENTATION TIMESTAMPS
// ============================================================================

/// Rational presentation timestamp (value / timescale seconds).
///
/// Matches the form capture subsystems hand out (CMTime-style): an integer
/// tick count against a per-stream timescale. Timestamps are assigned by the
/// capture side; this crate only compares them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pts {
    pub value: i64,
    pub timescale: u32,
}

impl Pts {
    pub const ZERO: Pts = Pts { value: 0, timescale: 1 };

    pub fn new(value: i64, timescale: u32) -> Self {
        Self { value, timescale }
    }

    /// Build a timestamp from fractional seconds at a microsecond timescale.
    pub fn from_seconds(seconds: f64) -> Self {
        Self {
            value: (seconds * 1_000_000.0).round() as i64,
            timescale: 1_000_000,
        }
    }

    /// Timestamp as fractional seconds.
    pub fn seconds(&self) -> f64 {
        if self.timescale == 0 {
            return f64::NAN;
        }
        self.value as f64 / self.timescale as f64
    }

    /// Well-formed: positive timescale, non-negative tick count.
    pub fn is_valid(&self) -> bool {
        self.timescale > 0 && self.value >= 0
    }
}

// ============================================================================
// SAMPLE BUFFERS
// ============================================================================

/// Which capture stream a sample belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaKind {
    Video,
    Audio,
}

/// A timestamped unit of raw media from the platform capture callbacks.
///
/// The payload is opaque to the pipeline and forwarded unmodified to the
/// broadcast engine once the sample clears synchronization.
#[derive(Debug, Clone)]
pub struct SampleBuffer {
    pub kind: MediaKind,
    pub pts: Pts,
    pub payload: Bytes,
}

impl SampleBuffer {
    pub fn video(pts: Pts, payload: impl Into<Bytes>) -> Self {
        Self {
            kind: MediaKind::Video,
            pts,
            payload: payload.into(),
        }
    }

    pub fn audio(pts: Pts, payload: impl Into<Bytes>) -> Self {
        Self {
            kind: MediaKind::Audio,
            pts,
            payload: payload.into(),
        }
    }

    /// Basic validity: non-empty payload and a well-formed timestamp.
    /// Invalid samples are dropped at submission, never queued.
    pub fn is_valid(&self) -> bool {
        !self.payload.is_empty() && self.pts.is_valid()
    }
}

// ============================================================================
// BROADCAST QUALITY PRESETS
// ============================================================================

/// Broadcast quality preset selected by the application layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QualityPreset {
    P360,
    P720,
    P1080,
    /// No fixed output size; the engine picks, with a wide bitrate window.
    Auto,
}

impl QualityPreset {
    /// Parse the quality string the method channel sends.
    /// Anything unrecognized falls back to `Auto`.
    pub fn from_channel_arg(arg: &str) -> Self {
        match arg {
            "360" => Self::P360,
            "720" => Self::P720,
            "1080" => Self::P1080,
            _ => Self::Auto,
        }
    }

    /// Output dimensions, when the preset pins one.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        match self {
            Self::P360 => Some((640, 360)),
            Self::P720 => Some((1280, 720)),
            Self::P1080 => Some((1920, 1080)),
            Self::Auto => None,
        }
    }

    /// Video bitrate window in bps: (min, initial, max).
    pub fn bitrate_bps(&self) -> (u32, u32, u32) {
        match self {
            Self::P360 => (500_000, 800_000, 1_000_000),
            Self::P720 => (1_500_000, 2_500_000, 3_500_000),
            Self::P1080 => (4_000_000, 5_000_000, 6_000_000),
            Self::Auto => (1_500_000, 2_500_000, 8_500_000),
        }
    }

    pub fn target_framerate(&self) -> u32 {
        30
    }

    /// Keyframe interval in seconds.
    pub fn keyframe_interval(&self) -> u32 {
        2
    }

    /// Audio bitrate in bps, same for every preset.
    pub fn audio_bitrate_bps(&self) -> u32 {
        128_000
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::P360 => "360",
            Self::P720 => "720",
            Self::P1080 => "1080",
            Self::Auto => "auto",
        }
    }
}

impl std::fmt::Display for QualityPreset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pts_seconds() {
        assert_eq!(Pts::new(1, 2).seconds(), 0.5);
        assert_eq!(Pts::new(90_000, 90_000).seconds(), 1.0);
        assert!((Pts::from_seconds(1.25).seconds() - 1.25).abs() < 1e-9);
    }

    #[test]
    fn pts_validity() {
        assert!(Pts::new(0, 1).is_valid());
        assert!(!Pts::new(-1, 1).is_valid());
        assert!(!Pts::new(1, 0).is_valid());
    }

    #[test]
    fn sample_validity() {
        let ok = SampleBuffer::video(Pts::from_seconds(1.0), vec![0u8; 16]);
        assert!(ok.is_valid());

        let empty = SampleBuffer::audio(Pts::from_seconds(1.0), Vec::new());
        assert!(!empty.is_valid());

        let bad_ts = SampleBuffer::video(Pts::new(-5, 1), vec![0u8; 16]);
        assert!(!bad_ts.is_valid());
    }

    #[test]
    fn preset_parsing() {
        assert_eq!(QualityPreset::from_channel_arg("360"), QualityPreset::P360);
        assert_eq!(QualityPreset::from_channel_arg("720"), QualityPreset::P720);
        assert_eq!(QualityPreset::from_channel_arg("1080"), QualityPreset::P1080);
        assert_eq!(QualityPreset::from_channel_arg("4k"), QualityPreset::Auto);
    }

    #[test]
    fn preset_bitrates() {
        assert_eq!(QualityPreset::P720.bitrate_bps(), (1_500_000, 2_500_000, 3_500_000));
        assert_eq!(QualityPreset::Auto.dimensions(), None);
        assert_eq!(QualityPreset::P1080.dimensions(), Some((1920, 1080)));
        assert_eq!(QualityPreset::P360.audio_bitrate_bps(), 128_000);
    }
}
