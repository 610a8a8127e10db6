//! Reshaping raw buffer memory into 2-D sample arrays.

use std::time::SystemTime;

use ndarray::{Array2, ArrayView2};

use crate::components::buffer_pool::FrameFormat;
use crate::error::{PcoError, Result};

/// One retrieved frame, copied out of driver memory.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Monotonic counter assigned by the driver facade.
    pub frame_number: u64,
    /// Columns.
    pub width: u32,
    /// Rows.
    pub height: u32,
    /// Bits per sample as transferred.
    pub bit_depth: u16,
    /// Host time the frame was copied.
    pub timestamp: SystemTime,
    /// Samples in row-major `(height, width)` order.
    pub data: Array2<u16>,
}

impl Frame {
    /// Wrap `data`, taking width and height from its shape.
    pub fn new(frame_number: u64, bit_depth: u16, data: Array2<u16>) -> Self {
        let (height, width) = data.dim();
        Self {
            frame_number,
            width: width as u32,
            height: height as u32,
            bit_depth,
            timestamp: SystemTime::now(),
            data,
        }
    }

    /// Mean sample value, 0 for an empty frame.
    pub fn mean(&self) -> f64 {
        if self.data.is_empty() {
            return 0.0;
        }
        self.data.iter().map(|&v| f64::from(v)).sum::<f64>() / self.data.len() as f64
    }
}

/// Copy `bytes` into a `(height, width)` array according to `format.depth`.
///
/// 16-bit samples are little-endian words, 12-bit samples are packed two per
/// three bytes (high bits first), 8-bit samples are widened.
pub fn unpack(bytes: &[u8], format: FrameFormat) -> Result<Array2<u16>> {
    let pixels = format.pixel_count();
    let required = format.byte_size();
    if bytes.len() < required {
        return Err(PcoError::StalePool {
            required,
            capacity: bytes.len(),
        });
    }

    let samples: Vec<u16> = match format.depth {
        16 => bytes[..pixels * 2]
            .chunks_exact(2)
            .map(|w| u16::from_le_bytes([w[0], w[1]]))
            .collect(),
        12 => unpack_12(bytes, pixels),
        8 => bytes[..pixels].iter().map(|&b| u16::from(b)).collect(),
        other => {
            return Err(PcoError::UnexpectedValue {
                what: "bit depth",
                value: u32::from(other),
            })
        }
    };

    shape(samples, format)
}

/// Borrow 16-bit samples without copying.
pub fn view(words: &[u16], format: FrameFormat) -> Result<ArrayView2<'_, u16>> {
    if format.depth != 16 {
        return Err(PcoError::PackedFrame {
            depth: format.depth,
        });
    }
    let pixels = format.pixel_count();
    if words.len() < pixels {
        return Err(PcoError::StalePool {
            required: format.byte_size(),
            capacity: words.len() * 2,
        });
    }
    ArrayView2::from_shape(
        (usize::from(format.height), usize::from(format.width)),
        &words[..pixels],
    )
    .map_err(|e| PcoError::InvalidConfig {
        message: format!("frame shape: {e}"),
    })
}

fn unpack_12(bytes: &[u8], pixels: usize) -> Vec<u16> {
    let mut samples = Vec::with_capacity(pixels + 1);
    for triple in bytes.chunks(3) {
        if samples.len() >= pixels {
            break;
        }
        let b0 = u16::from(triple[0]);
        let b1 = u16::from(triple.get(1).copied().unwrap_or(0));
        let b2 = u16::from(triple.get(2).copied().unwrap_or(0));
        samples.push((b0 << 4) | (b1 >> 4));
        samples.push(((b1 & 0x0F) << 8) | b2);
    }
    samples.truncate(pixels);
    samples
}

/// Pack samples the way [`unpack`] expects them for `depth`.
pub fn pack(samples: &[u16], depth: u16) -> Vec<u8> {
    match depth {
        8 => samples.iter().map(|&s| s as u8).collect(),
        12 => {
            let mut out = Vec::with_capacity(samples.len().div_ceil(2) * 3);
            for pair in samples.chunks(2) {
                let a = pair[0] & 0x0FFF;
                let b = pair.get(1).copied().unwrap_or(0) & 0x0FFF;
                out.push((a >> 4) as u8);
                out.push((((a & 0x0F) << 4) | (b >> 8)) as u8);
                out.push((b & 0xFF) as u8);
            }
            out
        }
        _ => samples.iter().flat_map(|s| s.to_le_bytes()).collect(),
    }
}

fn shape(samples: Vec<u16>, format: FrameFormat) -> Result<Array2<u16>> {
    Array2::from_shape_vec(
        (usize::from(format.height), usize::from(format.width)),
        samples,
    )
    .map_err(|e| PcoError::InvalidConfig {
        message: format!("frame shape: {e}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn format(width: u16, height: u16, depth: u16) -> FrameFormat {
        FrameFormat {
            width,
            height,
            depth,
        }
    }

    #[test]
    fn test_unpack_16_bit() {
        let samples: Vec<u16> = (0..6).map(|v| v * 1000).collect();
        let frame = unpack(&pack(&samples, 16), format(3, 2, 16)).unwrap();
        assert_eq!(frame.dim(), (2, 3));
        assert_eq!(frame[[1, 2]], 5000);
        assert_eq!(frame[[0, 1]], 1000);
    }

    #[test]
    fn test_unpack_12_bit_packed() {
        // 0xABC, 0x123 -> AB C1 23
        let frame = unpack(&[0xAB, 0xC1, 0x23, 0, 0, 0], format(2, 1, 12)).unwrap();
        assert_eq!(frame[[0, 0]], 0xABC);
        assert_eq!(frame[[0, 1]], 0x123);

        let samples = [0x0FFF, 0x0001, 0x0800];
        let bytes = pack(&samples, 12);
        let frame = unpack(&bytes, format(3, 1, 12)).unwrap();
        assert_eq!(frame.as_slice().unwrap(), &samples);
    }

    #[test]
    fn test_unpack_8_bit_widens() {
        let frame = unpack(&[1, 2, 255, 4], format(2, 2, 8)).unwrap();
        assert_eq!(frame[[1, 0]], 255);
    }

    #[test]
    fn test_short_buffer_rejected() {
        assert!(matches!(
            unpack(&[0; 10], format(4, 4, 16)),
            Err(PcoError::StalePool { required: 32, capacity: 10 })
        ));
    }

    #[test]
    fn test_view_requires_16_bit() {
        let words = [0u16; 16];
        assert!(view(&words, format(4, 4, 16)).is_ok());
        assert!(matches!(
            view(&words, format(4, 4, 12)),
            Err(PcoError::PackedFrame { depth: 12 })
        ));
    }

    #[test]
    fn test_frame_mean() {
        let data = Array2::from_shape_vec((1, 4), vec![0, 2, 4, 6]).unwrap();
        let frame = Frame::new(0, 16, data);
        assert_eq!(frame.width, 4);
        assert!((frame.mean() - 3.0).abs() < f64::EPSILON);
    }
}
