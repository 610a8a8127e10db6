//! Driver-allocated frame buffers.
//!
//! Every buffer in a pool has the same byte capacity, computed from the
//! geometry and bit depth at allocation time. A later geometry or depth
//! change makes the pool stale; the acquisition queue refuses to submit a
//! buffer that is too small for the current frame.

use tracing::{debug, info, warn};

use crate::components::connection::PcoConnection;
use crate::error::{PcoError, Result};
use crate::sdk::{BufferAddress, EventHandle, PcoSdk};

/// Geometry and depth of one frame as the camera will transfer it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameFormat {
    /// Image width in pixels.
    pub width: u16,
    /// Image height in pixels.
    pub height: u16,
    /// Bits per sample.
    pub depth: u16,
}

impl FrameFormat {
    /// Bytes needed to hold one frame.
    pub fn byte_size(&self) -> usize {
        frame_size(u32::from(self.width), u32::from(self.height), u32::from(self.depth))
    }

    /// Samples per frame.
    pub fn pixel_count(&self) -> usize {
        usize::from(self.width) * usize::from(self.height)
    }
}

/// `ceil(width * height * depth / 16) * 2`: samples packed into whole 16-bit
/// words.
pub fn frame_size(width: u32, height: u32, depth: u32) -> usize {
    let bits = width as usize * height as usize * depth as usize;
    bits.div_ceil(16) * 2
}

/// One buffer handed out by `AllocateBuffer`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Buffer {
    /// Driver-assigned buffer number, unique within the pool.
    pub index: i16,
    /// Start of the buffer memory.
    pub address: BufferAddress,
    /// Signaled by the driver when the buffer is filled.
    pub event: EventHandle,
    /// Usable bytes at `address`.
    pub capacity: usize,
}

/// The set of buffers currently allocated in the driver.
#[derive(Debug, Default)]
pub struct BufferPool {
    buffers: Vec<Buffer>,
    buffer_size: usize,
}

impl BufferPool {
    /// An empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of allocated buffers.
    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    /// Whether no buffers are allocated.
    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    /// Per-buffer capacity of the current allocation, 0 when empty.
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Buffers in allocation order.
    pub fn buffers(&self) -> &[Buffer] {
        &self.buffers
    }

    /// Buffer `index`, if it belongs to this pool.
    pub fn get(&self, index: i16) -> Option<&Buffer> {
        self.buffers.iter().find(|b| b.index == index)
    }

    /// Request `n` buffers of `size` bytes from the driver.
    ///
    /// The pool must be empty; callers free the old allocation (after
    /// cancelling the queue) first. On failure the buffers obtained so far
    /// stay in the pool so that [`BufferPool::free`] can release them.
    pub fn allocate<S: PcoSdk>(
        &mut self,
        conn: &mut PcoConnection<S>,
        n: usize,
        size: usize,
    ) -> Result<()> {
        if !self.buffers.is_empty() {
            return Err(PcoError::InvalidConfig {
                message: format!("pool still holds {} buffers", self.buffers.len()),
            });
        }
        let size_u32 = u32::try_from(size).map_err(|_| PcoError::InvalidConfig {
            message: format!("frame of {size} bytes exceeds the driver buffer limit"),
        })?;

        self.buffer_size = size;
        for _ in 0..n {
            let allocated = conn.call("AllocateBuffer", |sdk, h| sdk.allocate_buffer(h, size_u32))?;
            debug!(index = allocated.index, size, "Allocated buffer");
            self.buffers.push(Buffer {
                index: allocated.index,
                address: allocated.address,
                event: allocated.event,
                capacity: size,
            });
        }

        info!(count = n, size, "Buffer pool allocated");
        Ok(())
    }

    /// Release every buffer back to the driver. Freeing an empty pool is a
    /// no-op.
    ///
    /// All buffers are attempted; the first failure is returned and the pool
    /// is left empty either way.
    pub fn free<S: PcoSdk>(&mut self, conn: &mut PcoConnection<S>) -> Result<()> {
        let mut first_err = None;
        for buffer in self.buffers.drain(..) {
            if let Err(e) = conn.call("FreeBuffer", |sdk, h| sdk.free_buffer(h, buffer.index)) {
                warn!(index = buffer.index, error = %e, "Failed to free buffer");
                first_err.get_or_insert(e);
            }
        }
        self.buffer_size = 0;
        first_err.map_or(Ok(()), Err)
    }
}
