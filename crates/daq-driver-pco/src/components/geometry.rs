//! Sensor geometry: region of interest, binning and the lazily cached sizes.
//!
//! The public [`Roi`] is 0-based and half-open (`x0..x1`). The SDK expects a
//! 1-based inclusive start and an inclusive end, so `SetROI` receives
//! `(x0 + 1, y0 + 1, x1, y1)` and `GetROI` results are shifted back. That
//! adjustment lives only in [`Roi::to_driver`] and [`Roi::from_driver`].

use serde::{Deserialize, Serialize};

use crate::error::{PcoError, Result};
use crate::sdk::CameraDescription;

/// Region of interest in sensor pixels, 0-based and half-open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Roi {
    /// First column.
    pub x0: u16,
    /// First row.
    pub y0: u16,
    /// One past the last column.
    pub x1: u16,
    /// One past the last row.
    pub y1: u16,
}

impl Roi {
    /// ROI covering `x0..x1` by `y0..y1`.
    pub const fn new(x0: u16, y0: u16, x1: u16, y1: u16) -> Self {
        Self { x0, y0, x1, y1 }
    }

    /// The whole sensor.
    pub const fn full(max_width: u16, max_height: u16) -> Self {
        Self::new(0, 0, max_width, max_height)
    }

    /// A `width` x `height` window centered on the sensor.
    ///
    /// The start is snapped down and the end up to the given step sizes, so
    /// the result may be slightly larger than requested.
    pub fn centered(
        width: u16,
        height: u16,
        max_width: u16,
        max_height: u16,
        hstep: u16,
        vstep: u16,
    ) -> Self {
        let (x0, x1) = centered_span(width, max_width, hstep);
        let (y0, y1) = centered_span(height, max_height, vstep);
        Self::new(x0, y0, x1, y1)
    }

    /// Columns covered.
    pub fn width(&self) -> u16 {
        self.x1.saturating_sub(self.x0)
    }

    /// Rows covered.
    pub fn height(&self) -> u16 {
        self.y1.saturating_sub(self.y0)
    }

    /// Coordinates in the SDK's `SetROI` convention.
    pub fn to_driver(&self) -> (u16, u16, u16, u16) {
        (
            self.x0.saturating_add(1),
            self.y0.saturating_add(1),
            self.x1,
            self.y1,
        )
    }

    /// Inverse of [`Roi::to_driver`] for `GetROI` results.
    pub fn from_driver(x0: u16, y0: u16, x1: u16, y1: u16) -> Self {
        Self::new(x0.saturating_sub(1), y0.saturating_sub(1), x1, y1)
    }
}

impl std::fmt::Display for Roi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({},{})..({},{})", self.x0, self.y0, self.x1, self.y1)
    }
}

fn centered_span(len: u16, max: u16, step: u16) -> (u16, u16) {
    let step = step.max(1);
    let len = len.min(max);
    let start = (max - len) / 2 / step * step;
    let end = (start + len).div_ceil(step).saturating_mul(step).min(max);
    (start, end)
}

/// Horizontal and vertical binning factors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Binning {
    /// Columns combined per output pixel.
    pub horizontal: u16,
    /// Rows combined per output pixel.
    pub vertical: u16,
}

impl Binning {
    /// Binning of `horizontal` x `vertical` pixels.
    pub const fn new(horizontal: u16, vertical: u16) -> Self {
        Self {
            horizontal,
            vertical,
        }
    }
}

impl Default for Binning {
    fn default() -> Self {
        Self::new(1, 1)
    }
}

/// Step and symmetry rules an ROI must satisfy, taken from the camera
/// description.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoiConstraints {
    /// Horizontal step; coordinates must be multiples of it.
    pub hstep: u16,
    /// Vertical step.
    pub vstep: u16,
    /// Sensor width at the current binning.
    pub max_width: u16,
    /// Sensor height at the current binning.
    pub max_height: u16,
    /// `x0 + x1` must equal `max_width`.
    pub horizontal_symmetry: bool,
    /// `y0 + y1` must equal `max_height`.
    pub vertical_symmetry: bool,
}

impl RoiConstraints {
    /// Constraints for a sensor currently `max_width` x `max_height`.
    pub fn from_description(desc: &CameraDescription, max_width: u16, max_height: u16) -> Self {
        Self {
            hstep: desc.roi_hstep.max(1),
            vstep: desc.roi_vstep.max(1),
            max_width,
            max_height,
            horizontal_symmetry: desc.requires_horizontal_symmetry(),
            vertical_symmetry: desc.requires_vertical_symmetry(),
        }
    }

    /// Check step and symmetry. Range checks are left to the camera.
    pub fn validate(&self, roi: &Roi) -> Result<()> {
        if roi.x0 % self.hstep != 0 || roi.x1 % self.hstep != 0 {
            return Err(invalid(format!(
                "ROI x-coordinates must be a multiple of {}",
                self.hstep
            )));
        }
        if roi.y0 % self.vstep != 0 || roi.y1 % self.vstep != 0 {
            return Err(invalid(format!(
                "ROI y-coordinates must be a multiple of {}",
                self.vstep
            )));
        }
        // Symmetric about the center: (c - x0) == (x1 - c) with c = max / 2
        if self.horizontal_symmetry && u32::from(roi.x0) + u32::from(roi.x1) != u32::from(self.max_width)
        {
            return Err(invalid(
                "ROI x-coordinates must be symmetric when in dual-ADC mode".to_string(),
            ));
        }
        if self.vertical_symmetry && u32::from(roi.y0) + u32::from(roi.y1) != u32::from(self.max_height)
        {
            return Err(invalid("ROI y-coordinates must be symmetric".to_string()));
        }
        Ok(())
    }
}

fn invalid(message: String) -> PcoError {
    PcoError::InvalidGeometry { message }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn constraints(hstep: u16, vstep: u16) -> RoiConstraints {
        RoiConstraints {
            hstep,
            vstep,
            max_width: 2560,
            max_height: 2160,
            horizontal_symmetry: false,
            vertical_symmetry: false,
        }
    }

    #[test]
    fn test_driver_convention_round_trip() {
        let roi = Roi::new(0, 0, 100, 100);
        assert_eq!(roi.to_driver(), (1, 1, 100, 100));
        let (x0, y0, x1, y1) = roi.to_driver();
        assert_eq!(Roi::from_driver(x0, y0, x1, y1), roi);
    }

    #[test]
    fn test_step_violation_names_step() {
        let err = constraints(2, 1)
            .validate(&Roi::new(1, 0, 100, 100))
            .unwrap_err();
        match err {
            PcoError::InvalidGeometry { message } => assert!(message.contains('2')),
            other => panic!("unexpected error: {other:?}"),
        }

        assert!(constraints(1, 4).validate(&Roi::new(0, 2, 100, 100)).is_err());
        assert!(constraints(4, 4).validate(&Roi::new(8, 16, 100, 120)).is_ok());
    }

    #[test]
    fn test_symmetry_required_only_when_flagged() {
        let mut c = constraints(1, 1);
        let off_center = Roi::new(0, 0, 100, 100);
        assert!(c.validate(&off_center).is_ok());

        c.horizontal_symmetry = true;
        assert!(c.validate(&off_center).is_err());
        assert!(c.validate(&Roi::new(1000, 0, 1560, 100)).is_ok());

        c.vertical_symmetry = true;
        assert!(c.validate(&Roi::new(1000, 0, 1560, 100)).is_err());
        assert!(c.validate(&Roi::new(1000, 80, 1560, 2080)).is_ok());
    }

    #[test]
    fn test_centered_roi_snaps_to_steps() {
        let roi = Roi::centered(512, 512, 2560, 2160, 1, 1);
        assert_eq!(roi, Roi::new(1024, 824, 1536, 1336));
        assert_eq!(roi.width(), 512);

        let snapped = Roi::centered(101, 101, 2560, 2160, 4, 4);
        assert_eq!(snapped.x0 % 4, 0);
        assert_eq!(snapped.x1 % 4, 0);
        assert!(snapped.width() >= 101);
    }

    #[test]
    fn test_centered_roi_clamps_to_sensor() {
        let roi = Roi::centered(4000, 4000, 2560, 2160, 1, 1);
        assert_eq!(roi, Roi::full(2560, 2160));
    }
}
