//! FIFO of buffers submitted to the driver.
//!
//! The camera fills buffers in submission order, so the head of the queue is
//! always the next buffer due. A buffer is in the queue iff it has been
//! submitted and not yet retrieved or cancelled.

use std::collections::VecDeque;

use tracing::debug;

use crate::components::buffer_pool::{Buffer, FrameFormat};
use crate::components::connection::PcoConnection;
use crate::error::{PcoError, Result};
use crate::sdk::PcoSdk;

/// Buffers submitted to the driver, oldest first.
#[derive(Debug, Default)]
pub struct AcquisitionQueue {
    pending: VecDeque<Buffer>,
}

impl AcquisitionQueue {
    /// Empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of submitted buffers.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether nothing is submitted.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Next buffer due, without removing it.
    pub fn peek(&self) -> Option<&Buffer> {
        self.pending.front()
    }

    /// Whether buffer `index` is submitted.
    pub fn contains(&self, index: i16) -> bool {
        self.pending.iter().any(|b| b.index == index)
    }

    /// Buffer indices in fill order.
    pub fn indices(&self) -> Vec<i16> {
        self.pending.iter().map(|b| b.index).collect()
    }

    /// Hand `buffer` to the driver for one frame of `format` and append it.
    pub fn submit<S: PcoSdk>(
        &mut self,
        conn: &mut PcoConnection<S>,
        buffer: Buffer,
        format: FrameFormat,
    ) -> Result<()> {
        if self.contains(buffer.index) {
            return Err(PcoError::AlreadyQueued {
                index: buffer.index,
            });
        }
        let required = format.byte_size();
        if buffer.capacity < required {
            return Err(PcoError::StalePool {
                required,
                capacity: buffer.capacity,
            });
        }

        conn.call("AddBufferEx", |sdk, h| {
            sdk.add_buffer(h, buffer.index, format.width, format.height, format.depth)
        })?;
        self.pending.push_back(buffer);
        debug!(index = buffer.index, queued = self.pending.len(), "Buffer submitted");
        Ok(())
    }

    /// Remove the head after its frame was retrieved.
    pub(crate) fn pop_front(&mut self) -> Option<Buffer> {
        self.pending.pop_front()
    }

    /// Forget every pending buffer and cancel outstanding transfers.
    ///
    /// Local state is cleared even if the driver call fails.
    pub fn cancel_all<S: PcoSdk>(&mut self, conn: &mut PcoConnection<S>) -> Result<()> {
        let dropped = self.pending.len();
        self.pending.clear();
        debug!(dropped, "Cancelling queued transfers");
        conn.call("CancelImages", |sdk, h| sdk.cancel_images(h))
    }
}
