//! Delay/exposure, frame-rate and trigger settings.
//!
//! The camera stores delay and exposure as 32-bit tick counts with a
//! per-field timebase (ns, µs or ms). Frame rate travels as millihertz.

use std::time::Duration;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::error::{PcoError, Result};

/// Unit of a delay or exposure tick count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum Timebase {
    /// 1 ns ticks.
    Nanoseconds = 0,
    /// 1 µs ticks.
    Microseconds = 1,
    /// 1 ms ticks.
    Milliseconds = 2,
}

impl Timebase {
    /// Decode an SDK timebase code.
    pub fn from_raw(raw: u16) -> Result<Self> {
        match raw {
            0 => Ok(Self::Nanoseconds),
            1 => Ok(Self::Microseconds),
            2 => Ok(Self::Milliseconds),
            other => Err(PcoError::UnexpectedValue {
                what: "timebase",
                value: u32::from(other),
            }),
        }
    }

    /// Length of `ticks` in this unit.
    pub fn to_duration(self, ticks: u32) -> Duration {
        let ticks = u64::from(ticks);
        match self {
            Self::Nanoseconds => Duration::from_nanos(ticks),
            Self::Microseconds => Duration::from_micros(ticks),
            Self::Milliseconds => Duration::from_millis(ticks),
        }
    }

    /// Finest timebase whose tick count for `d` fits in a `u32`.
    ///
    /// Durations beyond `u32::MAX` milliseconds saturate.
    pub fn encode(d: Duration) -> (u32, Self) {
        if let Ok(ns) = u32::try_from(d.as_nanos()) {
            (ns, Self::Nanoseconds)
        } else if let Ok(us) = u32::try_from(d.as_micros()) {
            (us, Self::Microseconds)
        } else {
            let ms = u32::try_from(d.as_millis()).unwrap_or(u32::MAX);
            (ms, Self::Milliseconds)
        }
    }
}

/// Delay before and duration of each exposure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DelayExposure {
    /// Wait between trigger and exposure start.
    pub delay: Duration,
    /// Exposure length.
    pub exposure: Duration,
}

/// How the camera resolves a frame-rate / exposure conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u16)]
pub enum FrameRateMode {
    /// Camera picks whichever setting it can honour.
    #[default]
    Auto = 0,
    /// Frame rate wins, exposure is trimmed.
    FrameRatePriority = 1,
    /// Exposure wins, frame rate is trimmed.
    ExposurePriority = 2,
    /// Reject inconsistent pairs.
    Strict = 3,
}

bitflags! {
    /// Status word returned alongside frame-rate values.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct FrameRateStatus: u16 {
        /// Frame rate limited by sensor readout time.
        const LIMITED_BY_READOUT = 0x0001;
        /// Frame rate limited by exposure time.
        const LIMITED_BY_EXPOSURE = 0x0002;
        /// Exposure trimmed to fit the frame period.
        const EXPOSURE_TRIMMED = 0x0004;
        /// Returned values are not yet validated by the camera.
        const NOT_VALIDATED = 0x8000;
    }
}

impl FrameRateStatus {
    /// Whether the camera applied exactly what was requested.
    pub fn is_exact(self) -> bool {
        self.is_empty()
    }
}

/// Frame rate and exposure as applied by the camera.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameRate {
    /// Applied frame rate.
    pub rate_hz: f64,
    /// Applied exposure.
    pub exposure: Duration,
    /// What the camera trimmed, if anything.
    pub status: FrameRateStatus,
}

/// Convert a frame rate in Hz to the camera's millihertz.
pub fn hz_to_millihertz(rate_hz: f64) -> Result<u32> {
    let mhz = (rate_hz * 1000.0).round();
    if !mhz.is_finite() || mhz <= 0.0 || mhz > f64::from(u32::MAX) {
        return Err(PcoError::InvalidConfig {
            message: format!("frame rate {rate_hz} Hz is out of range"),
        });
    }
    Ok(mhz as u32)
}

/// Convert the camera's millihertz to Hz.
pub fn millihertz_to_hz(mhz: u32) -> f64 {
    f64::from(mhz) / 1000.0
}

/// Exposure for `SetFrameRate`, which only accepts nanoseconds.
pub fn exposure_to_ns(exposure: Duration) -> Result<u32> {
    u32::try_from(exposure.as_nanos()).map_err(|_| PcoError::InvalidConfig {
        message: format!(
            "exposure {exposure:?} exceeds the {}s frame-rate exposure limit",
            u32::MAX / 1_000_000_000
        ),
    })
}

/// Trigger source for exposures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u16)]
pub enum TriggerMode {
    /// Exposures occur as fast as possible.
    #[default]
    Auto = 0,
    /// Software trigger only.
    Software = 1,
    /// Software trigger or external hardware trigger on a signal edge.
    ExternalEdge = 2,
    /// Hardware trigger; delay and exposure follow the pulse length.
    ExternalPulse = 3,
}

impl TriggerMode {
    /// Decode an SDK trigger mode.
    pub fn from_raw(raw: u16) -> Result<Self> {
        match raw {
            0 => Ok(Self::Auto),
            1 => Ok(Self::Software),
            2 => Ok(Self::ExternalEdge),
            3 => Ok(Self::ExternalPulse),
            other => Err(PcoError::UnexpectedValue {
                what: "trigger mode",
                value: u32::from(other),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timebase_decoding() {
        assert_eq!(
            Timebase::from_raw(1).unwrap().to_duration(250),
            Duration::from_micros(250)
        );
        assert_eq!(
            Timebase::from_raw(2).unwrap().to_duration(10),
            Duration::from_millis(10)
        );
        assert!(Timebase::from_raw(3).is_err());
    }

    #[test]
    fn test_encode_picks_finest_fitting_timebase() {
        assert_eq!(
            Timebase::encode(Duration::from_millis(10)),
            (10_000_000, Timebase::Nanoseconds)
        );
        assert_eq!(
            Timebase::encode(Duration::from_secs(10)),
            (10_000_000, Timebase::Microseconds)
        );
        assert_eq!(
            Timebase::encode(Duration::from_secs(10_000)),
            (10_000_000, Timebase::Milliseconds)
        );
    }

    #[test]
    fn test_frame_rate_conversion() {
        assert_eq!(hz_to_millihertz(10.0).unwrap(), 10_000);
        assert_eq!(hz_to_millihertz(0.5).unwrap(), 500);
        assert!(hz_to_millihertz(0.0).is_err());
        assert!(hz_to_millihertz(f64::NAN).is_err());
        assert!((millihertz_to_hz(12_500) - 12.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_frame_rate_status_bits() {
        let status = FrameRateStatus::from_bits_retain(0x0004);
        assert!(status.contains(FrameRateStatus::EXPOSURE_TRIMMED));
        assert!(!status.is_exact());
        assert!(FrameRateStatus::from_bits_retain(0).is_exact());
    }

    #[test]
    fn test_trigger_mode_raw_values() {
        for mode in [
            TriggerMode::Auto,
            TriggerMode::Software,
            TriggerMode::ExternalEdge,
            TriggerMode::ExternalPulse,
        ] {
            assert_eq!(TriggerMode::from_raw(mode as u16).unwrap(), mode);
        }
        assert!(TriggerMode::from_raw(9).is_err());
    }
}
