//! Capture session state
//!
//! The actual camera/microphone capture runs on the platform side; this
//! module keeps the canonical state the method channel manipulates:
//! - Camera position, lens and focus mode selection with validation
//! - Zoom factor clamping against the device's reported range
//! - The set of lenses the device actually has

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

// ============================================================================
// DEVICE VOCABULARY
// ============================================================================

/// Which physical camera faces the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CameraPosition {
    Front,
    Back,
}

impl CameraPosition {
    /// Parse the method-channel argument ("0" front, "1" back).
    pub fn from_channel_arg(arg: &str) -> Option<Self> {
        match arg {
            "0" => Some(Self::Front),
            "1" => Some(Self::Back),
            _ => None,
        }
    }
}

/// Discrete lens codes the application layer selects between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CameraLens {
    Dual,
    WideAngle,
    Triple,
    Telephoto,
    DualWide,
    TrueDepth,
    UltraWide,
    LidarDepth,
    /// The platform's default video device.
    Default,
}

impl CameraLens {
    /// Parse the method-channel lens code ("0".."8").
    pub fn from_channel_arg(arg: &str) -> Option<Self> {
        match arg {
            "0" => Some(Self::Dual),
            "1" => Some(Self::WideAngle),
            "2" => Some(Self::Triple),
            "3" => Some(Self::Telephoto),
            "4" => Some(Self::DualWide),
            "5" => Some(Self::TrueDepth),
            "6" => Some(Self::UltraWide),
            "7" => Some(Self::LidarDepth),
            "8" => Some(Self::Default),
            _ => None,
        }
    }

    pub fn code(&self) -> u32 {
        match self {
            Self::Dual => 0,
            Self::WideAngle => 1,
            Self::Triple => 2,
            Self::Telephoto => 3,
            Self::DualWide => 4,
            Self::TrueDepth => 5,
            Self::UltraWide => 6,
            Self::LidarDepth => 7,
            Self::Default => 8,
        }
    }
}

/// Video orientation applied to the capture connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VideoOrientation {
    Portrait,
    PortraitUpsideDown,
    LandscapeRight,
    LandscapeLeft,
}

/// Focus behavior of the active camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FocusMode {
    Locked,
    Auto,
    ContinuousAuto,
}

impl FocusMode {
    /// Parse the method-channel argument ("0" locked, "1" auto, "2" continuous).
    pub fn from_channel_arg(arg: &str) -> Option<Self> {
        match arg {
            "0" => Some(Self::Locked),
            "1" => Some(Self::Auto),
            "2" => Some(Self::ContinuousAuto),
            _ => None,
        }
    }
}

/// Zoom range reported by the active video device.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZoomRange {
    pub min: f64,
    pub max: f64,
}

impl Default for ZoomRange {
    fn default() -> Self {
        Self { min: 1.0, max: 1.0 }
    }
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("invalid camera position argument: {0}")]
    InvalidPosition(String),
    #[error("invalid lens argument: {0}")]
    InvalidLens(String),
    #[error("device has no such lens: {0:?}")]
    UnsupportedLens(CameraLens),
    #[error("invalid focus mode argument: {0}")]
    InvalidFocusMode(String),
    #[error("focus point selection requires auto focus, current mode is {0:?}")]
    FocusPointUnavailable(FocusMode),
}

// ============================================================================
// CAPTURE STATE
// ============================================================================

/// Per-session capture state.
///
/// Owned by the broadcast session's controller; the platform layer performs
/// the real device switches and reports device capabilities (zoom range,
/// available lenses) back into this state.
#[derive(Debug)]
pub struct CaptureState {
    position: CameraPosition,
    lens: CameraLens,
    focus_mode: FocusMode,
    zoom_factor: f64,
    zoom_range: ZoomRange,
    available_lenses: Vec<CameraLens>,
    /// Last tap-to-focus point, normalized to the preview bounds.
    focus_point: Option<(f64, f64)>,
    orientation: VideoOrientation,
}

impl CaptureState {
    pub fn new() -> Self {
        Self {
            position: CameraPosition::Back,
            lens: CameraLens::Default,
            focus_mode: FocusMode::ContinuousAuto,
            zoom_factor: 1.0,
            zoom_range: ZoomRange::default(),
            // Every device at least has its default video device.
            available_lenses: vec![CameraLens::Default],
            focus_point: None,
            orientation: VideoOrientation::LandscapeRight,
        }
    }

    /// Record the capabilities the platform discovered for the active device.
    pub fn set_device_capabilities(&mut self, zoom_range: ZoomRange, lenses: Vec<CameraLens>) {
        self.zoom_range = zoom_range;
        self.available_lenses = lenses;
        if !self.available_lenses.contains(&CameraLens::Default) {
            self.available_lenses.push(CameraLens::Default);
        }
        debug!(zoom = ?self.zoom_range, lenses = self.available_lenses.len(), "capture capabilities updated");
    }

    pub fn position(&self) -> CameraPosition {
        self.position
    }

    pub fn set_position(&mut self, arg: &str) -> Result<CameraPosition, CaptureError> {
        let position = CameraPosition::from_channel_arg(arg)
            .ok_or_else(|| CaptureError::InvalidPosition(arg.to_string()))?;
        self.position = position;
        // Switching cameras resets lens-specific state.
        self.lens = CameraLens::Default;
        self.zoom_factor = 1.0;
        self.focus_point = None;
        Ok(position)
    }

    pub fn lens(&self) -> CameraLens {
        self.lens
    }

    /// Lenses the device reports, as channel codes.
    pub fn available_lens_codes(&self) -> Vec<u32> {
        self.available_lenses.iter().map(|l| l.code()).collect()
    }

    pub fn set_lens(&mut self, arg: &str) -> Result<CameraLens, CaptureError> {
        let lens = CameraLens::from_channel_arg(arg)
            .ok_or_else(|| CaptureError::InvalidLens(arg.to_string()))?;
        if !self.available_lenses.contains(&lens) {
            warn!(?lens, "requested lens not present on device");
            return Err(CaptureError::UnsupportedLens(lens));
        }
        self.lens = lens;
        Ok(lens)
    }

    pub fn focus_mode(&self) -> FocusMode {
        self.focus_mode
    }

    pub fn set_focus_mode(&mut self, arg: &str) -> Result<FocusMode, CaptureError> {
        let mode = FocusMode::from_channel_arg(arg)
            .ok_or_else(|| CaptureError::InvalidFocusMode(arg.to_string()))?;
        self.focus_mode = mode;
        Ok(mode)
    }

    /// Tap-to-focus at a point normalized to the preview bounds.
    ///
    /// Refused under continuous auto focus, where the device ignores focus
    /// points; the mode switches to one-shot auto focus on success.
    pub fn set_focus_point(&mut self, x: f64, y: f64) -> Result<(f64, f64), CaptureError> {
        if self.focus_mode == FocusMode::ContinuousAuto {
            return Err(CaptureError::FocusPointUnavailable(self.focus_mode));
        }
        let point = (x.clamp(0.0, 1.0), y.clamp(0.0, 1.0));
        self.focus_point = Some(point);
        self.focus_mode = FocusMode::Auto;
        Ok(point)
    }

    pub fn focus_point(&self) -> Option<(f64, f64)> {
        self.focus_point
    }

    pub fn zoom_range(&self) -> ZoomRange {
        self.zoom_range
    }

    pub fn zoom_factor(&self) -> f64 {
        self.zoom_factor
    }

    /// Apply a zoom request, clamped to the device range (never below 1.0).
    pub fn set_zoom_factor(&mut self, requested: f64) -> f64 {
        let zoom = requested.min(self.zoom_range.max).max(1.0);
        self.zoom_factor = zoom;
        zoom
    }

    /// Orientation survives camera switches; it belongs to the session, not
    /// the device.
    pub fn orientation(&self) -> VideoOrientation {
        self.orientation
    }

    pub fn set_orientation(&mut self, orientation: VideoOrientation) {
        self.orientation = orientation;
    }
}

impl Default for CaptureState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn position_parsing() {
        assert_eq!(CameraPosition::from_channel_arg("0"), Some(CameraPosition::Front));
        assert_eq!(CameraPosition::from_channel_arg("1"), Some(CameraPosition::Back));
        assert_eq!(CameraPosition::from_channel_arg("left"), None);
    }

    #[test]
    fn lens_codes_round_trip() {
        for code in 0..=8u32 {
            let lens = CameraLens::from_channel_arg(&code.to_string()).unwrap();
            assert_eq!(lens.code(), code);
        }
        assert!(CameraLens::from_channel_arg("9").is_none());
    }

    #[test]
    fn lens_selection_respects_device_capabilities() {
        let mut state = CaptureState::new();
        state.set_device_capabilities(
            ZoomRange { min: 1.0, max: 8.0 },
            vec![CameraLens::Default, CameraLens::Telephoto],
        );

        assert_eq!(state.available_lens_codes(), vec![8, 3]);
        assert!(state.set_lens("3").is_ok());
        assert!(matches!(
            state.set_lens("6"),
            Err(CaptureError::UnsupportedLens(CameraLens::UltraWide))
        ));
        assert!(matches!(state.set_lens("x"), Err(CaptureError::InvalidLens(_))));
    }

    #[test]
    fn default_lens_is_always_available() {
        let mut state = CaptureState::new();
        state.set_device_capabilities(ZoomRange::default(), vec![CameraLens::Telephoto]);
        assert!(state.available_lens_codes().contains(&8));
    }

    #[test]
    fn zoom_clamps_to_device_range() {
        let mut state = CaptureState::new();
        state.set_device_capabilities(ZoomRange { min: 1.0, max: 4.0 }, vec![CameraLens::Default]);

        assert_eq!(state.set_zoom_factor(2.5), 2.5);
        assert_eq!(state.set_zoom_factor(10.0), 4.0);
        assert_eq!(state.set_zoom_factor(0.2), 1.0);
        assert_eq!(state.zoom_factor(), 1.0);
    }

    #[test]
    fn orientation_survives_camera_switches() {
        let mut state = CaptureState::new();
        assert_eq!(state.orientation(), VideoOrientation::LandscapeRight);

        state.set_orientation(VideoOrientation::Portrait);
        state.set_position("0").unwrap();
        assert_eq!(state.orientation(), VideoOrientation::Portrait);
    }

    #[test]
    fn switching_position_resets_lens_and_zoom() {
        let mut state = CaptureState::new();
        state.set_device_capabilities(
            ZoomRange { min: 1.0, max: 4.0 },
            vec![CameraLens::Default, CameraLens::UltraWide],
        );
        state.set_lens("6").unwrap();
        state.set_zoom_factor(3.0);

        assert_eq!(state.set_position("0").unwrap(), CameraPosition::Front);
        assert_eq!(state.lens(), CameraLens::Default);
        assert_eq!(state.zoom_factor(), 1.0);
    }

    #[test]
    fn focus_point_requires_single_shot_focus() {
        let mut state = CaptureState::new();
        // Continuous auto focus (the default) ignores tap-to-focus.
        assert!(matches!(
            state.set_focus_point(0.4, 0.6),
            Err(CaptureError::FocusPointUnavailable(_))
        ));

        state.set_focus_mode("1").unwrap();
        let point = state.set_focus_point(0.4, 1.8).unwrap();
        assert_eq!(point, (0.4, 1.0));
        assert_eq!(state.focus_mode(), FocusMode::Auto);
    }
}
