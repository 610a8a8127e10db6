//! Camera configuration.
//!
//! Deserialized from the `[camera]` table of the application config.
//! Durations use humantime strings (`"10ms"`, `"1s 500ms"`).
//!
//! ```toml
//! [camera]
//! camera_index = 0
//! exposure = "20ms"
//! binning = { horizontal = 2, vertical = 2 }
//! roi = { width = 512, height = 512 }
//! frame_rate = { rate_hz = 25.0, mode = "exposure_priority" }
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::components::acquisition::{CaptureSettings, LiveSettings, DEFAULT_EXPOSURE};
use crate::components::geometry::{Binning, Roi};
use crate::components::timing::{FrameRateMode, TriggerMode};
use crate::error::{PcoError, Result};
use crate::sdk::{CameraDescription, Sizes};

/// Region of interest, either explicit or centered on the sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RoiConfig {
    /// 0-based half-open coordinates.
    Explicit {
        /// First column.
        x0: u16,
        /// First row.
        y0: u16,
        /// One past the last column.
        x1: u16,
        /// One past the last row.
        y1: u16,
    },
    /// A window of this size centered on the sensor, snapped to the ROI
    /// steps.
    Centered {
        /// Window width in binned pixels.
        width: u16,
        /// Window height in binned pixels.
        height: u16,
    },
}

impl RoiConfig {
    /// Concrete ROI for a sensor whose current (binned) maximum is in
    /// `sizes`.
    pub fn resolve(&self, desc: &CameraDescription, sizes: &Sizes) -> Roi {
        match *self {
            Self::Explicit { x0, y0, x1, y1 } => Roi::new(x0, y0, x1, y1),
            Self::Centered { width, height } => Roi::centered(
                width,
                height,
                sizes.max_width,
                sizes.max_height,
                desc.roi_hstep,
                desc.roi_vstep,
            ),
        }
    }
}

/// Requested live frame rate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrameRateConfig {
    /// Requested rate in Hz.
    pub rate_hz: f64,
    /// Which of rate and exposure the camera may trim.
    #[serde(default)]
    pub mode: FrameRateMode,
}

/// Settings for one camera. Every field has a default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PcoCameraConfig {
    /// SDK camera number.
    pub camera_index: u16,
    /// Use the in-process fake camera instead of the SDK.
    pub mock: bool,
    /// Full sensor when unset.
    pub roi: Option<RoiConfig>,
    /// Applied before the ROI is resolved.
    pub binning: Binning,
    /// Delay between trigger and exposure.
    #[serde(with = "humantime_serde")]
    pub delay: Duration,
    /// Exposure per frame.
    #[serde(with = "humantime_serde")]
    pub exposure: Duration,
    /// Applied once at open.
    pub trigger_mode: TriggerMode,
    /// Live frame rate; 10 Hz when unset.
    pub frame_rate: Option<FrameRateConfig>,
    /// Live buffer count; at least 2 are used.
    pub buffer_count: Option<usize>,
    /// Budget for draining a capture and for each live wait.
    #[serde(with = "humantime_serde")]
    pub wait_timeout: Duration,
}

impl Default for PcoCameraConfig {
    fn default() -> Self {
        Self {
            camera_index: 0,
            mock: !cfg!(feature = "pco_sdk"),
            roi: None,
            binning: Binning::default(),
            delay: Duration::ZERO,
            exposure: DEFAULT_EXPOSURE,
            trigger_mode: TriggerMode::Auto,
            frame_rate: None,
            buffer_count: None,
            wait_timeout: Duration::from_secs(5),
        }
    }
}

/// Live frame rate when none is configured.
const DEFAULT_FRAME_RATE_HZ: f64 = 10.0;

impl PcoCameraConfig {
    /// Check values that do not depend on the camera.
    pub fn validate(&self) -> Result<()> {
        if self.binning.horizontal == 0 || self.binning.vertical == 0 {
            return Err(invalid(format!(
                "binning must be at least 1, got {}x{}",
                self.binning.horizontal, self.binning.vertical
            )));
        }

        match self.roi {
            Some(RoiConfig::Explicit { x0, y0, x1, y1 }) if x1 <= x0 || y1 <= y0 => {
                return Err(invalid(format!(
                    "ROI ({x0},{y0})-({x1},{y1}) is empty"
                )));
            }
            Some(RoiConfig::Centered { width, height }) if width == 0 || height == 0 => {
                return Err(invalid(format!("ROI {width}x{height} is empty")));
            }
            _ => {}
        }

        if self.buffer_count == Some(0) {
            return Err(invalid("buffer_count must be at least 1".into()));
        }

        if let Some(rate) = self.frame_rate {
            if !rate.rate_hz.is_finite() || rate.rate_hz <= 0.0 {
                return Err(invalid(format!(
                    "frame rate must be positive, got {} Hz",
                    rate.rate_hz
                )));
            }
        }

        if self.wait_timeout.is_zero() {
            return Err(invalid("wait_timeout must be non-zero".into()));
        }

        Ok(())
    }

    /// One-shot settings for `n_frames` frames.
    pub fn capture_settings(
        &self,
        desc: &CameraDescription,
        sizes: &Sizes,
        n_frames: usize,
    ) -> CaptureSettings {
        CaptureSettings {
            roi: self.roi.map(|r| r.resolve(desc, sizes)),
            binning: self.binning,
            delay: self.delay,
            exposure: self.exposure,
            n_frames,
        }
    }

    /// Live settings, with the default frame rate filled in.
    pub fn live_settings(&self, desc: &CameraDescription, sizes: &Sizes) -> LiveSettings {
        let rate = self.frame_rate.unwrap_or(FrameRateConfig {
            rate_hz: DEFAULT_FRAME_RATE_HZ,
            mode: FrameRateMode::Auto,
        });
        LiveSettings {
            roi: self.roi.map(|r| r.resolve(desc, sizes)),
            binning: self.binning,
            exposure: self.exposure,
            frame_rate_hz: rate.rate_hz,
            frame_rate_mode: rate.mode,
            buffer_count: self.buffer_count.unwrap_or(2),
        }
    }
}

fn invalid(message: String) -> PcoError {
    PcoError::InvalidConfig { message }
}
