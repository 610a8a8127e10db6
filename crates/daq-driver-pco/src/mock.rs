//! In-process fake of the PCO SDK.
//!
//! [`MockSdk`] implements [`PcoSdk`] over state shared with a
//! [`MockController`], which tests use to script the camera: inject status
//! codes, decide when buffers are filled, and read back the call log.
//!
//! The fake behaves like the real driver where the pipeline depends on it:
//! buffers are filled strictly in submission order, queued buffers cannot be
//! freed, recording requires an armed camera, and out-of-range ROIs return
//! [`ROI_OUT_OF_RANGE`].

use std::collections::{HashMap, VecDeque};
use std::ptr::NonNull;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::trace;

use crate::components::buffer_pool::frame_size;
use crate::components::frame;
use crate::components::transfer::{preferred_data_format, DATAFORMAT_5X16};
use crate::sdk::{
    AllocatedBuffer, BufferAddress, BufferStatus, CameraDescription, CameraHandle, ErrorCode,
    EventHandle, PcoSdk, RawDelayExposure, RawFrameRate, SdkResult, Sizes, TransferParameters,
    WaitOutcome, ROI_OUT_OF_RANGE,
};

/// Call on a closed or unknown handle.
pub const ERR_INVALID_HANDLE: ErrorCode = 0x8000_1001;
/// Argument outside what the fake camera accepts.
pub const ERR_INVALID_PARAMETER: ErrorCode = 0x8000_1002;
/// Buffer is queued.
pub const ERR_BUFFER_IN_USE: ErrorCode = 0x8000_2010;
/// All buffer slots are allocated.
pub const ERR_NO_BUFFER: ErrorCode = 0x8000_2011;
/// Recording started before arming.
pub const ERR_NOT_ARMED: ErrorCode = 0x8000_3001;
/// Setting changed while recording.
pub const ERR_CAMERA_BUSY: ErrorCode = 0x8000_3002;

const MAX_BUFFERS: usize = 16;
/// Readout limit of the fake sensor: 100 Hz.
const MAX_RATE_MHZ: u32 = 100_000;
const DLL_EVENT_SET: u32 = 0x0000_8000;
const HANDLE_BASE: usize = 0x1000;
const EVENT_BASE: usize = 0x100;

/// When the fake camera fills submitted buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FillMode {
    /// The head buffer is filled as soon as it is waited on while recording.
    #[default]
    Auto,
    /// Buffers are filled only by [`MockController::fill_next`].
    Manual,
}

/// Sample written at `(x, y)` of frame `frame_number`.
pub fn test_pattern(frame_number: u64, x: usize, y: usize, depth: u16) -> u16 {
    let max = (1u32 << depth.min(16)) - 1;
    let value = ((x + y) as u64 + frame_number) % 4096 + 100;
    (value as u32 & max) as u16
}

struct MockBuffer {
    index: i16,
    ptr: NonNull<u16>,
    words: usize,
    size: usize,
    event: EventHandle,
    signaled: bool,
    driver_status: u32,
    /// Geometry from the last `AddBufferEx`.
    format: Option<(u16, u16, u16)>,
}

// SAFETY: the buffer memory is exclusively owned by this struct and only
// touched while the shared state mutex is held.
#[allow(unsafe_code)]
unsafe impl Send for MockBuffer {}

impl MockBuffer {
    fn new(index: i16, size: usize) -> Self {
        let words = size.div_ceil(2).max(1);
        let memory: &'static mut [u16] = Box::leak(vec![0u16; words].into_boxed_slice());
        Self {
            index,
            ptr: NonNull::from(memory).cast::<u16>(),
            words,
            size,
            event: EventHandle(EVENT_BASE + index as usize),
            signaled: false,
            driver_status: 0,
            format: None,
        }
    }

    fn write(&mut self, bytes: &[u8]) {
        let n = bytes.len().min(self.words * 2);
        // SAFETY: `ptr` points to `words` live u16s owned by this buffer and
        // `n` never exceeds their byte length.
        #[allow(unsafe_code)]
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), self.ptr.as_ptr().cast::<u8>(), n);
        }
    }
}

impl Drop for MockBuffer {
    fn drop(&mut self) {
        // SAFETY: `ptr`/`words` came from `Box::leak` in `new` and are
        // released exactly once here.
        #[allow(unsafe_code)]
        unsafe {
            drop(Box::from_raw(std::ptr::slice_from_raw_parts_mut(
                self.ptr.as_ptr(),
                self.words,
            )));
        }
    }
}

struct MockState {
    description: CameraDescription,
    handle: Option<CameraHandle>,
    /// Driver convention: 1-based inclusive, in binned pixels.
    roi: (u16, u16, u16, u16),
    binning: (u16, u16),
    delay_exposure: RawDelayExposure,
    frame_rate: RawFrameRate,
    armed: bool,
    recording: bool,
    trigger_mode: u16,
    pixel_rate: u32,
    transfer: TransferParameters,
    data_format_override: Option<u32>,
    image_parameters: Option<(u16, u16)>,

    buffers: Vec<MockBuffer>,
    submitted: VecDeque<i16>,
    fill_mode: FillMode,
    /// Simulated readout time per frame in `FillMode::Auto`.
    frame_period: Option<Duration>,
    frames_filled: u64,
    pending_driver_status: Option<u32>,
    fail_next_wait: bool,
    failures: HashMap<&'static str, ErrorCode>,
    calls: Vec<&'static str>,
    last_wait_timeout_ms: Option<u32>,
}

impl MockState {
    fn new(description: CameraDescription) -> Self {
        Self {
            description,
            handle: None,
            roi: (1, 1, description.max_width, description.max_height),
            binning: (1, 1),
            delay_exposure: RawDelayExposure {
                exposure: 10,
                exposure_timebase: 2,
                ..Default::default()
            },
            frame_rate: RawFrameRate::default(),
            armed: false,
            recording: false,
            trigger_mode: 0,
            pixel_rate: description.pixel_rates[0],
            transfer: TransferParameters {
                baudrate: 115_200,
                clock_frequency: 80_000_000,
                data_format: DATAFORMAT_5X16,
                ..Default::default()
            },
            data_format_override: None,
            image_parameters: None,
            buffers: Vec::new(),
            submitted: VecDeque::new(),
            fill_mode: FillMode::Auto,
            frame_period: None,
            frames_filled: 0,
            pending_driver_status: None,
            fail_next_wait: false,
            failures: HashMap::new(),
            calls: Vec::new(),
            last_wait_timeout_ms: None,
        }
    }

    /// Log `op` and return an injected failure, if any.
    fn enter(&mut self, op: &'static str) -> SdkResult<()> {
        self.calls.push(op);
        match self.failures.remove(op) {
            Some(code) => Err(code),
            None => Ok(()),
        }
    }

    fn enter_with(&mut self, op: &'static str, handle: CameraHandle) -> SdkResult<()> {
        self.enter(op)?;
        if self.handle == Some(handle) {
            Ok(())
        } else {
            Err(ERR_INVALID_HANDLE)
        }
    }

    fn not_recording(&self) -> SdkResult<()> {
        if self.recording {
            Err(ERR_CAMERA_BUSY)
        } else {
            Ok(())
        }
    }

    fn image_size(&self) -> (u16, u16) {
        let (x0, y0, x1, y1) = self.roi;
        (x1 - x0 + 1, y1 - y0 + 1)
    }

    /// Sensor size in binned pixels.
    fn max_size(&self) -> (u16, u16) {
        (
            self.description.max_width / self.binning.0.max(1),
            self.description.max_height / self.binning.1.max(1),
        )
    }

    fn buffer(&mut self, index: i16) -> SdkResult<&mut MockBuffer> {
        self.buffers
            .iter_mut()
            .find(|b| b.index == index)
            .ok_or(ERR_INVALID_PARAMETER)
    }

    /// Fill the oldest submitted buffer with the next test frame.
    fn fill_head(&mut self) -> bool {
        let Some(index) = self.submitted.pop_front() else {
            return false;
        };
        let frame_number = self.frames_filled;
        self.frames_filled += 1;
        let status = self.pending_driver_status.take().unwrap_or(0);

        let Ok(buffer) = self.buffer(index) else {
            return false;
        };
        if let Some((width, height, depth)) = buffer.format {
            let (w, h) = (usize::from(width), usize::from(height));
            let samples: Vec<u16> = (0..w * h)
                .map(|i| test_pattern(frame_number, i % w, i / w, depth))
                .collect();
            buffer.write(&frame::pack(&samples, depth));
        }
        buffer.signaled = true;
        buffer.driver_status = status;
        trace!(index, frame_number, status, "Mock buffer filled");
        true
    }
}

/// Fake SDK instance. Each instance drives one fake camera.
pub struct MockSdk {
    state: Arc<Mutex<MockState>>,
}

impl MockSdk {
    /// A 2560 x 2160 monochrome camera.
    pub fn new() -> Self {
        Self::with_description(CameraDescription::default())
    }

    /// A fake camera with the given capabilities.
    pub fn with_description(description: CameraDescription) -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState::new(description))),
        }
    }

    /// Make automatically filled frames take `period` to arrive.
    pub fn with_frame_period(self, period: Duration) -> Self {
        self.state.lock().frame_period = Some(period);
        self
    }

    /// Handle for scripting and inspecting this camera.
    pub fn controller(&self) -> MockController {
        MockController {
            state: Arc::clone(&self.state),
        }
    }
}

impl Default for MockSdk {
    fn default() -> Self {
        Self::new()
    }
}

impl PcoSdk for MockSdk {
    fn open_camera(&mut self, camera_number: u16) -> SdkResult<CameraHandle> {
        let mut s = self.state.lock();
        s.enter("OpenCameraEx")?;
        let handle = CameraHandle(HANDLE_BASE + usize::from(camera_number));
        s.handle = Some(handle);
        Ok(handle)
    }

    fn close_camera(&mut self, handle: CameraHandle) -> SdkResult<()> {
        let mut s = self.state.lock();
        s.enter_with("CloseCamera", handle)?;
        s.handle = None;
        s.recording = false;
        s.armed = false;
        Ok(())
    }

    fn camera_description(&mut self, handle: CameraHandle) -> SdkResult<CameraDescription> {
        let mut s = self.state.lock();
        s.enter_with("GetCameraDescription", handle)?;
        Ok(s.description)
    }

    fn sizes(&mut self, handle: CameraHandle) -> SdkResult<Sizes> {
        let mut s = self.state.lock();
        s.enter_with("GetSizes", handle)?;
        let (width, height) = s.image_size();
        let (max_width, max_height) = s.max_size();
        Ok(Sizes {
            width,
            height,
            max_width,
            max_height,
        })
    }

    fn set_roi(
        &mut self,
        handle: CameraHandle,
        x0: u16,
        y0: u16,
        x1: u16,
        y1: u16,
    ) -> SdkResult<()> {
        let mut s = self.state.lock();
        s.enter_with("SetROI", handle)?;
        s.not_recording()?;
        let (max_width, max_height) = s.max_size();
        let in_range = x0 >= 1
            && y0 >= 1
            && x1 >= x0
            && y1 >= y0
            && x1 <= max_width
            && y1 <= max_height;
        if !in_range {
            return Err(ROI_OUT_OF_RANGE);
        }
        s.roi = (x0, y0, x1, y1);
        s.armed = false;
        Ok(())
    }

    fn roi(&mut self, handle: CameraHandle) -> SdkResult<(u16, u16, u16, u16)> {
        let mut s = self.state.lock();
        s.enter_with("GetROI", handle)?;
        Ok(s.roi)
    }

    fn set_binning(&mut self, handle: CameraHandle, horizontal: u16, vertical: u16) -> SdkResult<()> {
        let mut s = self.state.lock();
        s.enter_with("SetBinning", handle)?;
        s.not_recording()?;
        let valid = (1..=s.description.max_bin_horizontal).contains(&horizontal)
            && (1..=s.description.max_bin_vertical).contains(&vertical);
        if !valid {
            return Err(ERR_INVALID_PARAMETER);
        }
        s.binning = (horizontal, vertical);
        // A ROI that no longer fits the binned sensor falls back to all of it
        let (max_width, max_height) = s.max_size();
        if s.roi.2 > max_width || s.roi.3 > max_height {
            s.roi = (1, 1, max_width, max_height);
        }
        s.armed = false;
        Ok(())
    }

    fn binning(&mut self, handle: CameraHandle) -> SdkResult<(u16, u16)> {
        let mut s = self.state.lock();
        s.enter_with("GetBinning", handle)?;
        Ok(s.binning)
    }

    fn set_delay_exposure(&mut self, handle: CameraHandle, value: RawDelayExposure) -> SdkResult<()> {
        let mut s = self.state.lock();
        s.enter_with("SetDelayExposureTime", handle)?;
        if value.delay_timebase > 2 || value.exposure_timebase > 2 {
            return Err(ERR_INVALID_PARAMETER);
        }
        s.delay_exposure = value;
        s.armed = false;
        Ok(())
    }

    fn delay_exposure(&mut self, handle: CameraHandle) -> SdkResult<RawDelayExposure> {
        let mut s = self.state.lock();
        s.enter_with("GetDelayExposureTime", handle)?;
        Ok(s.delay_exposure)
    }

    fn set_frame_rate(
        &mut self,
        handle: CameraHandle,
        mode: u16,
        rate_mhz: u32,
        exposure_ns: u32,
    ) -> SdkResult<RawFrameRate> {
        let mut s = self.state.lock();
        s.enter_with("SetFrameRate", handle)?;
        if mode > 3 || rate_mhz == 0 {
            return Err(ERR_INVALID_PARAMETER);
        }

        let mut status = 0u16;
        let mut rate = rate_mhz;
        if rate > MAX_RATE_MHZ {
            rate = MAX_RATE_MHZ;
            status |= 0x0001;
        }
        if exposure_ns > 0 {
            let limit = u32::try_from(1_000_000_000_000u64 / u64::from(exposure_ns))
                .unwrap_or(u32::MAX);
            if rate > limit {
                rate = limit.max(1);
                status |= 0x0002;
            }
        }

        let applied = RawFrameRate {
            status,
            rate_mhz: rate,
            exposure_ns,
        };
        s.frame_rate = applied;
        s.delay_exposure.exposure = exposure_ns;
        s.delay_exposure.exposure_timebase = 0;
        s.armed = false;
        Ok(applied)
    }

    fn frame_rate(&mut self, handle: CameraHandle) -> SdkResult<RawFrameRate> {
        let mut s = self.state.lock();
        s.enter_with("GetFrameRate", handle)?;
        Ok(s.frame_rate)
    }

    fn arm(&mut self, handle: CameraHandle) -> SdkResult<()> {
        let mut s = self.state.lock();
        s.enter_with("ArmCamera", handle)?;
        s.not_recording()?;
        s.armed = true;
        Ok(())
    }

    fn set_recording_state(&mut self, handle: CameraHandle, recording: bool) -> SdkResult<()> {
        let mut s = self.state.lock();
        s.enter_with("SetRecordingState", handle)?;
        if recording && !s.armed {
            return Err(ERR_NOT_ARMED);
        }
        s.recording = recording;
        Ok(())
    }

    fn recording_state(&mut self, handle: CameraHandle) -> SdkResult<bool> {
        let mut s = self.state.lock();
        s.enter_with("GetRecordingState", handle)?;
        Ok(s.recording)
    }

    fn set_trigger_mode(&mut self, handle: CameraHandle, mode: u16) -> SdkResult<()> {
        let mut s = self.state.lock();
        s.enter_with("SetTriggerMode", handle)?;
        if mode > 3 {
            return Err(ERR_INVALID_PARAMETER);
        }
        s.trigger_mode = mode;
        s.armed = false;
        Ok(())
    }

    fn trigger_mode(&mut self, handle: CameraHandle) -> SdkResult<u16> {
        let mut s = self.state.lock();
        s.enter_with("GetTriggerMode", handle)?;
        Ok(s.trigger_mode)
    }

    fn force_trigger(&mut self, handle: CameraHandle) -> SdkResult<bool> {
        let mut s = self.state.lock();
        s.enter_with("ForceTrigger", handle)?;
        Ok(s.recording && s.trigger_mode != 0)
    }

    fn pixel_rate(&mut self, handle: CameraHandle) -> SdkResult<u32> {
        let mut s = self.state.lock();
        s.enter_with("GetPixelRate", handle)?;
        Ok(s.pixel_rate)
    }

    fn transfer_parameters(&mut self, handle: CameraHandle) -> SdkResult<TransferParameters> {
        let mut s = self.state.lock();
        s.enter_with("GetTransferParameter", handle)?;
        Ok(s.transfer)
    }

    fn set_transfer_parameters_auto(&mut self, handle: CameraHandle) -> SdkResult<()> {
        let mut s = self.state.lock();
        s.enter_with("SetTransferParametersAuto", handle)?;
        s.not_recording()?;
        let (width, _) = s.image_size();
        let data_format = s
            .data_format_override
            .unwrap_or_else(|| preferred_data_format(s.pixel_rate, width));
        s.transfer.data_format = data_format;
        s.armed = false;
        Ok(())
    }

    fn set_image_parameters(&mut self, handle: CameraHandle, width: u16, height: u16) -> SdkResult<()> {
        let mut s = self.state.lock();
        s.enter_with("CamLinkSetImageParameters", handle)?;
        s.image_parameters = Some((width, height));
        Ok(())
    }

    fn allocate_buffer(&mut self, handle: CameraHandle, size: u32) -> SdkResult<AllocatedBuffer> {
        let mut s = self.state.lock();
        s.enter_with("AllocateBuffer", handle)?;
        if s.buffers.len() >= MAX_BUFFERS {
            return Err(ERR_NO_BUFFER);
        }
        let index = (0..MAX_BUFFERS as i16)
            .find(|i| s.buffers.iter().all(|b| b.index != *i))
            .ok_or(ERR_NO_BUFFER)?;
        let buffer = MockBuffer::new(index, size as usize);
        let allocated = AllocatedBuffer {
            index,
            address: BufferAddress::new(buffer.ptr),
            event: buffer.event,
        };
        s.buffers.push(buffer);
        Ok(allocated)
    }

    fn free_buffer(&mut self, handle: CameraHandle, index: i16) -> SdkResult<()> {
        let mut s = self.state.lock();
        s.enter_with("FreeBuffer", handle)?;
        if s.submitted.contains(&index) {
            return Err(ERR_BUFFER_IN_USE);
        }
        let pos = s
            .buffers
            .iter()
            .position(|b| b.index == index)
            .ok_or(ERR_INVALID_PARAMETER)?;
        s.buffers.remove(pos);
        Ok(())
    }

    fn add_buffer(
        &mut self,
        handle: CameraHandle,
        index: i16,
        width: u16,
        height: u16,
        depth: u16,
    ) -> SdkResult<()> {
        let mut s = self.state.lock();
        s.enter_with("AddBufferEx", handle)?;
        if s.submitted.contains(&index) {
            return Err(ERR_BUFFER_IN_USE);
        }
        let buffer = s.buffer(index)?;
        if frame_size(u32::from(width), u32::from(height), u32::from(depth)) > buffer.size {
            return Err(ERR_INVALID_PARAMETER);
        }
        buffer.format = Some((width, height, depth));
        buffer.signaled = false;
        buffer.driver_status = 0;
        s.submitted.push_back(index);
        Ok(())
    }

    fn cancel_images(&mut self, handle: CameraHandle) -> SdkResult<()> {
        let mut s = self.state.lock();
        s.enter_with("CancelImages", handle)?;
        s.submitted.clear();
        Ok(())
    }

    fn buffer_status(&mut self, handle: CameraHandle, index: i16) -> SdkResult<BufferStatus> {
        let mut s = self.state.lock();
        s.enter_with("GetBufferStatus", handle)?;
        let buffer = s.buffer(index)?;
        Ok(BufferStatus {
            dll: if buffer.signaled { DLL_EVENT_SET } else { 0 },
            driver: buffer.driver_status,
        })
    }

    fn wait_event(&mut self, event: EventHandle, timeout_ms: u32) -> WaitOutcome {
        let mut s = self.state.lock();
        s.calls.push("WaitForSingleObject");
        s.last_wait_timeout_ms = Some(timeout_ms);
        if std::mem::take(&mut s.fail_next_wait) {
            return WaitOutcome::Failed;
        }

        let Some((index, signaled)) = s
            .buffers
            .iter()
            .find(|b| b.event == event)
            .map(|b| (b.index, b.signaled))
        else {
            return WaitOutcome::Failed;
        };
        if signaled {
            return WaitOutcome::Signaled;
        }
        let due = s.submitted.front() == Some(&index);
        if s.fill_mode != FillMode::Auto || !s.recording || !due {
            return WaitOutcome::TimedOut;
        }

        if let Some(period) = s.frame_period {
            let timeout = Duration::from_millis(u64::from(timeout_ms));
            drop(s);
            std::thread::sleep(period.min(timeout));
            if period > timeout {
                return WaitOutcome::TimedOut;
            }
            s = self.state.lock();
            if !s.recording || s.submitted.front() != Some(&index) {
                return WaitOutcome::TimedOut;
            }
        }

        if s.fill_head() {
            WaitOutcome::Signaled
        } else {
            WaitOutcome::TimedOut
        }
    }

    fn reset_event(&mut self, event: EventHandle) -> SdkResult<()> {
        let mut s = self.state.lock();
        s.enter("ResetEvent")?;
        let buffer = s
            .buffers
            .iter_mut()
            .find(|b| b.event == event)
            .ok_or(ERR_INVALID_PARAMETER)?;
        buffer.signaled = false;
        Ok(())
    }

    fn error_text(&self, code: ErrorCode) -> String {
        match code {
            ROI_OUT_OF_RANGE => "ROI coordinates out of range".into(),
            ERR_INVALID_HANDLE => "invalid camera handle".into(),
            ERR_INVALID_PARAMETER => "invalid parameter".into(),
            ERR_BUFFER_IN_USE => "buffer is queued".into(),
            ERR_NO_BUFFER => "no free buffer".into(),
            ERR_NOT_ARMED => "camera is not armed".into(),
            ERR_CAMERA_BUSY => "camera is recording".into(),
            other => format!("mock error 0x{other:08X}"),
        }
    }
}

/// Scripting and inspection handle for a [`MockSdk`].
#[derive(Clone)]
pub struct MockController {
    state: Arc<Mutex<MockState>>,
}

impl MockController {
    /// Make the next call named `op` fail with `code`.
    pub fn fail_call(&self, op: &'static str, code: ErrorCode) {
        self.state.lock().failures.insert(op, code);
    }

    /// Make the next event wait fail at the OS level.
    pub fn fail_next_wait(&self) {
        self.state.lock().fail_next_wait = true;
    }

    /// Report `code` as driver status of the next filled buffer.
    pub fn inject_driver_status(&self, code: u32) {
        self.state.lock().pending_driver_status = Some(code);
    }

    /// Choose whether waits fill buffers automatically.
    pub fn set_fill_mode(&self, mode: FillMode) {
        self.state.lock().fill_mode = mode;
    }

    /// Fill the oldest submitted buffer. Returns `false` if none is queued.
    pub fn fill_next(&self) -> bool {
        self.state.lock().fill_head()
    }

    /// Force the transfer data format, now and after every automatic setup.
    pub fn set_data_format(&self, data_format: u32) {
        let mut s = self.state.lock();
        s.data_format_override = Some(data_format);
        s.transfer.data_format = data_format;
    }

    /// Pixel rate the camera reports, in Hz.
    pub fn set_pixel_rate(&self, hz: u32) {
        self.state.lock().pixel_rate = hz;
    }

    /// SDK calls made so far, in order.
    pub fn calls(&self) -> Vec<&'static str> {
        self.state.lock().calls.clone()
    }

    /// How often `op` was called.
    pub fn count_calls(&self, op: &str) -> usize {
        self.state.lock().calls.iter().filter(|c| **c == op).count()
    }

    /// Forget the call log.
    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    /// Whether the camera handle is open.
    pub fn is_open(&self) -> bool {
        self.state.lock().handle.is_some()
    }

    /// Whether the fake camera is recording.
    pub fn recording(&self) -> bool {
        self.state.lock().recording
    }

    /// Buffers currently allocated in the driver.
    pub fn allocated_buffers(&self) -> usize {
        self.state.lock().buffers.len()
    }

    /// Buffer indices queued in the driver, oldest first.
    pub fn submitted(&self) -> Vec<i16> {
        self.state.lock().submitted.iter().copied().collect()
    }

    /// Frames written since the camera was created.
    pub fn frames_filled(&self) -> u64 {
        self.state.lock().frames_filled
    }

    /// Timeout passed to the most recent event wait.
    pub fn last_wait_timeout_ms(&self) -> Option<u32> {
        self.state.lock().last_wait_timeout_ms
    }

    /// Width and height last passed to `CamLinkSetImageParameters`.
    pub fn image_parameters(&self) -> Option<(u16, u16)> {
        self.state.lock().image_parameters
    }
}
