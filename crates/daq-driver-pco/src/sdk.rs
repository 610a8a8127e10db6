//! Driver-service boundary to the PCO SC2 SDK.
//!
//! [`PcoSdk`] is the narrow, synchronous, status-coded interface the
//! acquisition pipeline consumes. The hardware binding (`pco_sdk` feature)
//! and [`crate::mock::MockSdk`] both implement it, so every component above
//! this layer runs unchanged against a fake driver in tests.
//!
//! Coordinates passed through this trait are in the SDK's own convention
//! (1-based inclusive ROI start). Conversion happens in
//! [`crate::components::geometry`], never here.

use std::ptr::NonNull;

/// Raw 32-bit SDK status code. Zero means success and is never stored here.
pub type ErrorCode = u32;

/// Result of a single SDK call.
pub type SdkResult<T> = std::result::Result<T, ErrorCode>;

/// Status code `SetROI` returns when coordinates lie outside the sensor.
pub const ROI_OUT_OF_RANGE: ErrorCode = 0xA00A_3001;

/// Opaque camera handle returned by `OpenCameraEx`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CameraHandle(pub usize);

/// Completion event of one buffer. Owned by the driver, only referenced here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventHandle(pub usize);

/// Base address of a driver-allocated buffer, fixed for the buffer's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferAddress(NonNull<u16>);

// SAFETY: the address is an opaque token into SDK-owned memory. It is only
// dereferenced by the camera that owns the pool, under `&self`/`&mut self`.
#[allow(unsafe_code)]
unsafe impl Send for BufferAddress {}

impl BufferAddress {
    /// Wrap a pointer returned by `AllocateBuffer`.
    pub fn new(ptr: NonNull<u16>) -> Self {
        Self(ptr)
    }

    /// Raw word pointer.
    pub fn as_ptr(self) -> *mut u16 {
        self.0.as_ptr()
    }
}

/// Result of waiting on a buffer's completion event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The event fired; the buffer status must still be checked.
    Signaled,
    /// The timeout elapsed before the event fired.
    TimedOut,
    /// The OS wait itself failed.
    Failed,
}

/// Static capabilities reported by `GetCameraDescription`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CameraDescription {
    /// Sensor model code.
    pub sensor_type: u16,
    /// Full sensor width in pixels, unbinned.
    pub max_width: u16,
    /// Full sensor height in pixels, unbinned.
    pub max_height: u16,
    /// Dynamic resolution of the ADC in bits.
    pub dynamic_resolution: u16,
    /// Largest horizontal binning factor.
    pub max_bin_horizontal: u16,
    /// Largest vertical binning factor.
    pub max_bin_vertical: u16,
    /// ROI granularity in pixels.
    pub roi_hstep: u16,
    /// Vertical ROI granularity in pixels.
    pub roi_vstep: u16,
    /// Number of ADCs; dual-ADC readout may need a symmetric ROI.
    pub num_adcs: u16,
    /// Odd pattern types are color sensors.
    pub pattern_type: u16,
    /// Capability bits, see the `CAPS_*` constants.
    pub general_caps1: u32,
    /// Supported pixel rates in Hz; unused slots are zero.
    pub pixel_rates: [u32; 4],
}

impl CameraDescription {
    /// `general_caps1` bit: x-coordinates must mirror about the vertical axis.
    pub const CAPS_ROI_HORZ_SYMM: u32 = 0x0100_0000;
    /// `general_caps1` bit: y-coordinates must mirror about the horizontal axis.
    pub const CAPS_ROI_VERT_SYMM: u32 = 0x0080_0000;

    /// Whether dual-readout requires a horizontally symmetric ROI.
    pub fn requires_horizontal_symmetry(&self) -> bool {
        self.general_caps1 & Self::CAPS_ROI_HORZ_SYMM != 0
    }

    /// Whether the sensor requires a vertically symmetric ROI.
    pub fn requires_vertical_symmetry(&self) -> bool {
        self.general_caps1 & Self::CAPS_ROI_VERT_SYMM != 0
    }

    /// Odd-numbered pattern types denote color sensors.
    pub fn is_color(&self) -> bool {
        self.pattern_type & 0x01 != 0
    }
}

impl Default for CameraDescription {
    fn default() -> Self {
        Self {
            sensor_type: 0,
            max_width: 2560,
            max_height: 2160,
            dynamic_resolution: 16,
            max_bin_horizontal: 4,
            max_bin_vertical: 4,
            roi_hstep: 1,
            roi_vstep: 1,
            num_adcs: 1,
            pattern_type: 0,
            general_caps1: 0,
            pixel_rates: [95_333_333, 286_000_000, 0, 0],
        }
    }
}

/// Active and maximum image size from `GetSizes`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sizes {
    /// Active image width.
    pub width: u16,
    /// Active image height.
    pub height: u16,
    /// Sensor width at the current binning.
    pub max_width: u16,
    /// Sensor height at the current binning.
    pub max_height: u16,
}

/// Delay and exposure as raw ticks plus their timebase codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RawDelayExposure {
    /// Delay in ticks of `delay_timebase`.
    pub delay: u32,
    /// Exposure in ticks of `exposure_timebase`.
    pub exposure: u32,
    /// 0 = ns, 1 = µs, 2 = ms.
    pub delay_timebase: u16,
    /// 0 = ns, 1 = µs, 2 = ms.
    pub exposure_timebase: u16,
}

/// Frame-rate triple exchanged with `SetFrameRate`/`GetFrameRate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RawFrameRate {
    /// Trim flags, see `FrameRateStatus`.
    pub status: u16,
    /// Frame rate in millihertz.
    pub rate_mhz: u32,
    /// Exposure in nanoseconds.
    pub exposure_ns: u32,
}

/// Camera Link transfer parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransferParameters {
    /// Serial control baud rate.
    pub baudrate: u32,
    /// Camera Link pixel clock in Hz.
    pub clock_frequency: u32,
    /// CC line assignment.
    pub cc_line: u32,
    /// Data format code; the low nibble selects the packing.
    pub data_format: u32,
    /// Transmit mode flags.
    pub transmit: u32,
}

/// A freshly allocated driver buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocatedBuffer {
    /// SDK buffer number.
    pub index: i16,
    /// Start of the buffer memory.
    pub address: BufferAddress,
    /// Event signaled when the buffer is filled.
    pub event: EventHandle,
}

/// Status pair from `GetBufferStatus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BufferStatus {
    /// DLL-side status flags (informational).
    pub dll: u32,
    /// Driver-side status; non-zero is an error code.
    pub driver: u32,
}

/// The operations of the PCO SDK consumed by the acquisition pipeline.
///
/// Every call is synchronous. Any non-zero status is returned as `Err(code)`;
/// translating codes into [`crate::PcoError`] is the connection's job.
pub trait PcoSdk: Send {
    /// Open camera number `camera_number` on any interface.
    fn open_camera(&mut self, camera_number: u16) -> SdkResult<CameraHandle>;
    /// Close the handle; it is invalid afterwards.
    fn close_camera(&mut self, handle: CameraHandle) -> SdkResult<()>;
    /// Static capabilities of the camera.
    fn camera_description(&mut self, handle: CameraHandle) -> SdkResult<CameraDescription>;

    /// Active and maximum image size.
    fn sizes(&mut self, handle: CameraHandle) -> SdkResult<Sizes>;
    /// Program the ROI in 1-based inclusive coordinates.
    fn set_roi(&mut self, handle: CameraHandle, x0: u16, y0: u16, x1: u16, y1: u16)
        -> SdkResult<()>;
    /// Current ROI in 1-based inclusive coordinates.
    fn roi(&mut self, handle: CameraHandle) -> SdkResult<(u16, u16, u16, u16)>;
    /// Set horizontal and vertical binning factors.
    fn set_binning(&mut self, handle: CameraHandle, horizontal: u16, vertical: u16)
        -> SdkResult<()>;
    /// Current binning factors.
    fn binning(&mut self, handle: CameraHandle) -> SdkResult<(u16, u16)>;

    /// Program delay and exposure.
    fn set_delay_exposure(&mut self, handle: CameraHandle, value: RawDelayExposure)
        -> SdkResult<()>;
    /// Delay and exposure with their timebases.
    fn delay_exposure(&mut self, handle: CameraHandle) -> SdkResult<RawDelayExposure>;
    /// Returns the status and the values the camera actually applied.
    fn set_frame_rate(
        &mut self,
        handle: CameraHandle,
        mode: u16,
        rate_mhz: u32,
        exposure_ns: u32,
    ) -> SdkResult<RawFrameRate>;
    /// Frame rate and exposure last applied.
    fn frame_rate(&mut self, handle: CameraHandle) -> SdkResult<RawFrameRate>;

    /// Validate and apply pending settings.
    fn arm(&mut self, handle: CameraHandle) -> SdkResult<()>;
    /// Start or stop recording. Starting requires an armed camera.
    fn set_recording_state(&mut self, handle: CameraHandle, recording: bool) -> SdkResult<()>;
    /// Whether the camera is recording.
    fn recording_state(&mut self, handle: CameraHandle) -> SdkResult<bool>;
    /// Set the raw trigger mode.
    fn set_trigger_mode(&mut self, handle: CameraHandle, mode: u16) -> SdkResult<()>;
    /// Raw trigger mode.
    fn trigger_mode(&mut self, handle: CameraHandle) -> SdkResult<u16>;
    /// Returns whether the trigger was accepted.
    fn force_trigger(&mut self, handle: CameraHandle) -> SdkResult<bool>;
    /// Current pixel rate in Hz.
    fn pixel_rate(&mut self, handle: CameraHandle) -> SdkResult<u32>;

    /// Current Camera Link transfer parameters.
    fn transfer_parameters(&mut self, handle: CameraHandle) -> SdkResult<TransferParameters>;
    /// Let the SDK choose the transfer parameters for the current settings.
    fn set_transfer_parameters_auto(&mut self, handle: CameraHandle) -> SdkResult<()>;
    /// Tell the grabber the image size before buffers are submitted.
    fn set_image_parameters(&mut self, handle: CameraHandle, width: u16, height: u16)
        -> SdkResult<()>;

    /// Allocate a buffer of `size` bytes with its completion event.
    fn allocate_buffer(&mut self, handle: CameraHandle, size: u32) -> SdkResult<AllocatedBuffer>;
    /// Release buffer `index`. Fails while it is queued.
    fn free_buffer(&mut self, handle: CameraHandle, index: i16) -> SdkResult<()>;
    /// Submit buffer `index` for one image of the given geometry.
    fn add_buffer(
        &mut self,
        handle: CameraHandle,
        index: i16,
        width: u16,
        height: u16,
        depth: u16,
    ) -> SdkResult<()>;
    /// Cancel every outstanding transfer.
    fn cancel_images(&mut self, handle: CameraHandle) -> SdkResult<()>;
    /// DLL and driver status of buffer `index`.
    fn buffer_status(&mut self, handle: CameraHandle, index: i16) -> SdkResult<BufferStatus>;

    /// Block for at most `timeout_ms` on `event`.
    fn wait_event(&mut self, event: EventHandle, timeout_ms: u32) -> WaitOutcome;
    /// Rearm `event` for the next frame.
    fn reset_event(&mut self, event: EventHandle) -> SdkResult<()>;

    /// Human-readable text for a status code.
    fn error_text(&self, code: ErrorCode) -> String;
}
