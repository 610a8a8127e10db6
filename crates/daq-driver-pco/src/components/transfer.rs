//! Camera Link transfer format: data depth and color mode.

use crate::error::{PcoError, Result};
use crate::sdk::{CameraDescription, TransferParameters};

/// Mask selecting the data format field of `TransferParameters::data_format`.
pub const DATAFORMAT_MASK: u32 = 0x0F;
/// Five taps of 16-bit samples.
pub const DATAFORMAT_5X16: u32 = 0x05;
/// Five taps of 12-bit samples, packed.
pub const DATAFORMAT_5X12: u32 = 0x07;
/// Ten taps of 8-bit samples.
pub const DATAFORMAT_10X8: u32 = 0x08;
/// Alternative 12-bit packing, delivered as 12-bit samples.
pub const DATAFORMAT_5X12R: u32 = 0x09;
/// 12-bit transfer delivered as 16-bit samples.
pub const DATAFORMAT_5X12L: u32 = 0x0A;

/// Pixel rate above which wide images switch to 12-bit transfer.
const FAST_PIXEL_RATE_HZ: u32 = 96_000_000;
/// Widest image that still fits 16-bit transfer at fast pixel rates.
const MAX_WIDTH_5X16_FAST: u16 = 1920;

/// Bits per sample the camera writes into host buffers for a data format.
pub fn data_depth(data_format: u32) -> Result<u16> {
    match data_format & DATAFORMAT_MASK {
        DATAFORMAT_5X16 | DATAFORMAT_5X12L => Ok(16),
        DATAFORMAT_5X12 | DATAFORMAT_5X12R => Ok(12),
        DATAFORMAT_10X8 => Ok(8),
        other => Err(PcoError::UnsupportedDataFormat(other)),
    }
}

impl TransferParameters {
    /// Bits per sample for these parameters.
    pub fn data_depth(&self) -> Result<u16> {
        data_depth(self.data_format)
    }
}

/// Data format the SDK's automatic transfer setup settles on for a given
/// pixel rate and image width.
pub fn preferred_data_format(pixel_rate_hz: u32, image_width: u16) -> u32 {
    if pixel_rate_hz < FAST_PIXEL_RATE_HZ || image_width <= MAX_WIDTH_5X16_FAST {
        DATAFORMAT_5X16
    } else {
        DATAFORMAT_5X12
    }
}

/// Pixel layout of host frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorMode {
    /// Monochrome with the given bits per sample.
    Mono(u16),
    /// Color sensor delivering 32-bit RGB.
    Rgb32,
}

impl ColorMode {
    /// Color mode of a camera delivering `depth`-bit samples.
    pub fn new(desc: &CameraDescription, depth: u16) -> Self {
        if desc.is_color() {
            Self::Rgb32
        } else {
            Self::Mono(depth)
        }
    }
}

impl std::fmt::Display for ColorMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Mono(depth) => write!(f, "mono{depth}"),
            Self::Rgb32 => write!(f, "RGB32"),
        }
    }
}
