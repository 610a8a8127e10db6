//! PCO Connection Management
//!
//! Owns the SDK instance and the open camera handle, translates SDK status
//! codes into [`PcoError`], and closes the camera when dropped.

use tracing::{debug, info, warn};

use crate::error::{PcoError, Result};
use crate::sdk::{CameraHandle, ErrorCode, PcoSdk, SdkResult};

/// An open camera plus the SDK it was opened through.
///
/// The handle is released exactly once: by [`PcoConnection::close`] or, if
/// that was never called, by `Drop`.
pub struct PcoConnection<S: PcoSdk> {
    sdk: S,
    handle: Option<CameraHandle>,
    camera_number: u16,
}

impl<S: PcoSdk> PcoConnection<S> {
    /// Open `camera_number` through `sdk`.
    pub fn open(mut sdk: S, camera_number: u16) -> Result<Self> {
        let handle = sdk
            .open_camera(camera_number)
            .map_err(|code| driver_error(&sdk, "OpenCameraEx", code))?;

        info!(camera = camera_number, handle = handle.0, "Opened PCO camera");

        Ok(Self {
            sdk,
            handle: Some(handle),
            camera_number,
        })
    }

    /// Camera number this connection was opened with.
    pub fn camera_number(&self) -> u16 {
        self.camera_number
    }

    /// Whether the handle is still open.
    pub fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    /// Run one handle-based SDK call, translating a non-zero status.
    pub fn call<T>(
        &mut self,
        op: &'static str,
        f: impl FnOnce(&mut S, CameraHandle) -> SdkResult<T>,
    ) -> Result<T> {
        let handle = self.handle.ok_or(PcoError::NotOpen)?;
        f(&mut self.sdk, handle).map_err(|code| driver_error(&self.sdk, op, code))
    }

    /// Direct SDK access for calls that do not take the camera handle
    /// (event waits).
    pub fn sdk_mut(&mut self) -> &mut S {
        &mut self.sdk
    }

    /// Build a driver error for `code` using the SDK's error text.
    pub fn error(&self, op: &'static str, code: ErrorCode) -> PcoError {
        driver_error(&self.sdk, op, code)
    }

    /// Close the camera. Calling this twice is a no-op.
    pub fn close(&mut self) -> Result<()> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };
        debug!(camera = self.camera_number, "Closing PCO camera");
        self.sdk
            .close_camera(handle)
            .map_err(|code| driver_error(&self.sdk, "CloseCamera", code))
    }
}

impl<S: PcoSdk> Drop for PcoConnection<S> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(camera = self.camera_number, error = %e, "Error closing PCO camera");
        }
    }
}

fn driver_error<S: PcoSdk>(sdk: &S, op: &'static str, code: ErrorCode) -> PcoError {
    let message = sdk.error_text(code);
    debug!(op, code = format_args!("{code:#010x}"), %message, "PCO call failed");
    PcoError::Driver { code, message }
}
