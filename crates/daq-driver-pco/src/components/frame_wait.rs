//! Frame-wait state machine.
//!
//! ```text
//!             peek head
//!   Waiting ─────────────► wait on head.event (bounded)
//!      │                      │ Signaled      │ TimedOut        │ Failed
//!      │                      ▼               ▼                 ▼
//!      │              GetBufferStatus      Ok(false)        WaitFailed
//!      │               │ drv == 0   │ drv != 0
//!      │               ▼            ▼
//!      │   reset, pop → last     reset, pop (discard) → Driver error
//!      │   resubmit if continuous
//!      ▼
//!   FrameReady: Ok(true)
//! ```
//!
//! The head is only popped once the driver confirmed the buffer, so a
//! caller retrying after a timeout observes the same head again.

use std::time::Duration;

use tracing::{trace, warn};

use crate::components::buffer_pool::{Buffer, FrameFormat};
use crate::components::connection::PcoConnection;
use crate::components::queue::AcquisitionQueue;
use crate::error::{PcoError, Result};
use crate::sdk::{PcoSdk, WaitOutcome};

/// `WaitForSingleObject` treats `u32::MAX` as "forever"; stay one below.
const MAX_WAIT_MS: u32 = u32::MAX - 1;

/// Tracks the most recently completed buffer across waits.
#[derive(Debug, Default)]
pub struct FrameWaiter {
    last_completed: Option<Buffer>,
}

impl FrameWaiter {
    /// A waiter with no completed frame.
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffer holding the latest retrieved frame.
    pub fn last_completed(&self) -> Option<&Buffer> {
        self.last_completed.as_ref()
    }

    /// Drop the reference to the last frame; called before its buffer is
    /// freed.
    pub fn clear(&mut self) {
        self.last_completed = None;
    }

    /// Wait up to `timeout` for the head of `queue` to be filled.
    ///
    /// Returns `Ok(true)` when a frame was retrieved, `Ok(false)` on timeout
    /// with queue and last frame untouched. With `resubmit` set (continuous
    /// mode) the retrieved buffer goes straight back to the tail of the
    /// queue in that format. If that resubmit fails the frame is still
    /// returned and the queue stays one buffer shorter.
    pub fn wait_for_frame<S: PcoSdk>(
        &mut self,
        conn: &mut PcoConnection<S>,
        queue: &mut AcquisitionQueue,
        resubmit: Option<FrameFormat>,
        timeout: Duration,
    ) -> Result<bool> {
        let head = *queue.peek().ok_or(PcoError::NoBuffersQueued)?;
        let timeout_ms = u32::try_from(timeout.as_millis())
            .unwrap_or(MAX_WAIT_MS)
            .min(MAX_WAIT_MS);

        trace!(index = head.index, timeout_ms, "Waiting for frame");
        match conn.sdk_mut().wait_event(head.event, timeout_ms) {
            WaitOutcome::Signaled => {}
            WaitOutcome::TimedOut => return Ok(false),
            WaitOutcome::Failed => return Err(PcoError::WaitFailed),
        }

        let status = conn.call("GetBufferStatus", |sdk, h| sdk.buffer_status(h, head.index))?;
        if status.driver != 0 {
            // Buffer leaves the queue but is neither kept nor resubmitted
            if let Err(e) = conn.sdk_mut().reset_event(head.event) {
                warn!(index = head.index, code = e, "Failed to reset event of failed buffer");
            }
            queue.pop_front();
            let err = conn.error("GetBufferStatus", status.driver);
            warn!(index = head.index, error = %err, "Driver reported buffer error");
            return Err(err);
        }

        conn.sdk_mut()
            .reset_event(head.event)
            .map_err(|code| conn.error("ResetEvent", code))?;
        let buffer = queue.pop_front().unwrap_or(head);
        self.last_completed = Some(buffer);
        trace!(index = buffer.index, dll_status = status.dll, "Frame ready");

        if let Some(format) = resubmit {
            if let Err(e) = queue.submit(conn, buffer, format) {
                warn!(
                    index = buffer.index,
                    queued = queue.len(),
                    error = %e,
                    "Failed to resubmit buffer, live queue shrank"
                );
            }
        }
        Ok(true)
    }
}
