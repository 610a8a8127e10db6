//! Error types for PCO camera operations.
//!
//! Every failure mode of the acquisition pipeline maps to one variant of
//! [`PcoError`]. Geometry and configuration problems are detected before any
//! device call; everything the SDK rejects arrives as [`PcoError::Driver`]
//! with the raw status code and the SDK's decoded text.

use std::time::Duration;

use thiserror::Error;

use crate::components::acquisition::SessionState;
use crate::components::geometry::Roi;

/// Result type alias for PCO operations.
pub type Result<T> = std::result::Result<T, PcoError>;

/// Errors that can occur when working with a PCO camera.
#[derive(Error, Debug)]
pub enum PcoError {
    /// ROI or binning violates the camera's step or symmetry constraints.
    #[error("Invalid geometry: {message}")]
    InvalidGeometry { message: String },

    /// The camera rejected the ROI as outside the sensor.
    #[error(
        "ROI coordinates out of range; given x0,y0 = {},{} and x1,y1 = {},{}. \
         x0 must be in the range [0, width-1], and x1 must be in the range [x0+1, width]; \
         similarly for y0/y1",
        roi.x0, roi.y0, roi.x1, roi.y1
    )]
    OutOfRange { roi: Roi },

    /// Non-zero status returned by an SDK call or reported for a buffer.
    #[error("PCO driver error 0x{code:08X}: {message}")]
    Driver { code: u32, message: String },

    /// Not every queued frame arrived within the drain budget.
    #[error("Timed out after {0:?} waiting for frames")]
    Timeout(Duration),

    /// `wait_for_frame` was called with nothing submitted to the driver.
    #[error("No buffers queued")]
    NoBuffersQueued,

    /// The OS-level event wait failed (not a timeout).
    #[error("Failed to grab image")]
    WaitFailed,

    /// The buffer is already submitted and has not been retrieved.
    #[error("Buffer {index} is already queued")]
    AlreadyQueued { index: i16 },

    /// Geometry or bit depth changed since the pool was allocated.
    #[error("Buffer pool is stale: a frame needs {required} bytes but buffers hold {capacity}")]
    StalePool { required: usize, capacity: usize },

    /// No frame has been retrieved since the pool was allocated.
    #[error("No frame has been retrieved yet")]
    NoFrame,

    /// The transfer interface reports a data format with no known bit depth.
    #[error("Unrecognized transfer data format 0x{0:X}")]
    UnsupportedDataFormat(u32),

    /// Borrowed frame views need unpacked 16-bit samples.
    #[error("Zero-copy frame view requires 16-bit samples, transfer depth is {depth}")]
    PackedFrame { depth: u16 },

    /// The camera reported a value outside the documented enumeration.
    #[error("Unexpected {what} value {value} reported by camera")]
    UnexpectedValue { what: &'static str, value: u32 },

    /// The operation conflicts with the session in progress.
    #[error("Camera is busy: session state is {0}")]
    SessionActive(SessionState),

    /// The camera handle was already closed.
    #[error("Camera is not open")]
    NotOpen,

    /// Invalid configuration or parameter
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },
}

impl PcoError {
    /// Raw SDK status code, if this error came from the driver.
    pub fn code(&self) -> Option<u32> {
        match self {
            Self::Driver { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Check if this is a poll timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// Whether the caller can correct the input and try again without
    /// reopening the camera.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::InvalidGeometry { .. }
                | Self::OutOfRange { .. }
                | Self::Timeout(_)
                | Self::InvalidConfig { .. }
                | Self::SessionActive(_)
        )
    }
}
