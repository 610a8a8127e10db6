//! Capture session controller.
//!
//! [`PcoCamera`] owns the connection, the buffer pool, the acquisition queue
//! and the frame waiter, and sequences them into one-shot captures and
//! continuous (live) acquisition. It is single-threaded: every operation
//! takes `&mut self`, and the only blocking point is the event wait inside
//! [`PcoCamera::wait_for_frame`].
//!
//! Every reconfiguration path stops recording and cancels the queue before
//! buffers are freed, so the driver never owns memory this side released.

use std::fmt;
use std::time::{Duration, Instant};

use ndarray::{Array2, ArrayView2};
use tracing::{debug, info, warn};

use crate::components::buffer_pool::{Buffer, BufferPool, FrameFormat};
use crate::components::cache::Cached;
use crate::components::connection::PcoConnection;
use crate::components::frame;
use crate::components::frame_wait::FrameWaiter;
use crate::components::geometry::{Binning, Roi, RoiConstraints};
use crate::components::queue::AcquisitionQueue;
use crate::components::timing::{
    exposure_to_ns, hz_to_millihertz, millihertz_to_hz, DelayExposure, FrameRate, FrameRateMode,
    FrameRateStatus, Timebase, TriggerMode,
};
use crate::components::transfer::ColorMode;
use crate::error::{PcoError, Result};
use crate::sdk::{
    CameraDescription, PcoSdk, RawDelayExposure, RawFrameRate, Sizes, TransferParameters,
    ROI_OUT_OF_RANGE,
};

/// Exposure used when none is configured.
pub const DEFAULT_EXPOSURE: Duration = Duration::from_millis(10);

/// Kind of recording session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureMode {
    /// A fixed number of frames, drained by `get_captured_image`.
    OneShot,
    /// Buffers are resubmitted as soon as they are retrieved.
    Continuous,
}

/// Where the camera is in its session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// No session; settings may change.
    #[default]
    Idle,
    /// Settings applied, not recording.
    Armed,
    /// Recording in the given mode.
    Recording(CaptureMode),
}

impl SessionState {
    /// Whether a session is recording.
    pub fn is_recording(self) -> bool {
        matches!(self, Self::Recording(_))
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Armed => write!(f, "armed"),
            Self::Recording(CaptureMode::OneShot) => write!(f, "recording (one-shot)"),
            Self::Recording(CaptureMode::Continuous) => write!(f, "recording (continuous)"),
        }
    }
}

/// Parameters of a one-shot capture.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureSettings {
    /// `None` captures the full sensor.
    pub roi: Option<Roi>,
    /// Applied before the ROI.
    pub binning: Binning,
    /// Delay between trigger and exposure.
    pub delay: Duration,
    /// Exposure per frame.
    pub exposure: Duration,
    /// Frames to capture, at least 1.
    pub n_frames: usize,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            roi: None,
            binning: Binning::default(),
            delay: Duration::ZERO,
            exposure: DEFAULT_EXPOSURE,
            n_frames: 1,
        }
    }
}

/// Parameters of continuous acquisition.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveSettings {
    /// `None` streams the full sensor.
    pub roi: Option<Roi>,
    /// Applied before the ROI.
    pub binning: Binning,
    /// Requested exposure; the camera may trim it.
    pub exposure: Duration,
    /// Requested frame rate.
    pub frame_rate_hz: f64,
    /// Which of rate and exposure may be trimmed.
    pub frame_rate_mode: FrameRateMode,
    /// Raised to 2 if lower.
    pub buffer_count: usize,
}

impl Default for LiveSettings {
    fn default() -> Self {
        Self {
            roi: None,
            binning: Binning::default(),
            exposure: DEFAULT_EXPOSURE,
            frame_rate_hz: 10.0,
            frame_rate_mode: FrameRateMode::Auto,
            buffer_count: 2,
        }
    }
}

/// Frames returned by a drained one-shot capture.
#[derive(Debug, Clone, PartialEq)]
pub enum Capture {
    /// Exactly one frame.
    Single(Array2<u16>),
    /// Frames in capture order.
    Sequence(Vec<Array2<u16>>),
}

impl Capture {
    /// Number of frames.
    pub fn len(&self) -> usize {
        match self {
            Self::Single(_) => 1,
            Self::Sequence(frames) => frames.len(),
        }
    }

    /// Whether no frame was captured.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Frames in capture order.
    pub fn into_frames(self) -> Vec<Array2<u16>> {
        match self {
            Self::Single(frame) => vec![frame],
            Self::Sequence(frames) => frames,
        }
    }
}

/// One open PCO camera and its acquisition state.
pub struct PcoCamera<S: PcoSdk> {
    conn: PcoConnection<S>,
    description: CameraDescription,
    sizes: Cached<Sizes>,
    transfer: Cached<TransferParameters>,
    pool: BufferPool,
    queue: AcquisitionQueue,
    waiter: FrameWaiter,
    state: SessionState,
    continuous: bool,
}

impl<S: PcoSdk> PcoCamera<S> {
    /// Open camera `camera_number` and reset the ROI to the full sensor.
    pub fn open(sdk: S, camera_number: u16) -> Result<Self> {
        let mut conn = PcoConnection::open(sdk, camera_number)?;
        let description = conn.call("GetCameraDescription", |sdk, h| sdk.camera_description(h))?;

        let mut camera = Self {
            conn,
            description,
            sizes: Cached::new(),
            transfer: Cached::new(),
            pool: BufferPool::new(),
            queue: AcquisitionQueue::new(),
            waiter: FrameWaiter::new(),
            state: SessionState::Idle,
            continuous: false,
        };
        let full = camera.full_roi()?;
        camera.set_roi(full)?;

        info!(
            camera = camera_number,
            max_width = full.width(),
            max_height = full.height(),
            roi_hstep = description.roi_hstep,
            roi_vstep = description.roi_vstep,
            "PCO camera ready"
        );
        Ok(camera)
    }

    // =========================================================================
    // State accessors
    // =========================================================================

    /// Cached for the lifetime of the handle.
    pub fn description(&self) -> &CameraDescription {
        &self.description
    }

    /// SDK camera number.
    pub fn camera_number(&self) -> u16 {
        self.conn.camera_number()
    }

    /// Session state as tracked on this side.
    pub fn session_state(&self) -> SessionState {
        self.state
    }

    /// Whether buffers are resubmitted after each frame.
    pub fn is_continuous(&self) -> bool {
        self.continuous
    }

    /// Number of buffers currently submitted to the driver.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Indices of submitted buffers, oldest first.
    pub fn queued_indices(&self) -> Vec<i16> {
        self.queue.indices()
    }

    /// Currently allocated buffers.
    pub fn pool(&self) -> &BufferPool {
        &self.pool
    }

    /// Index of the buffer holding the latest frame.
    pub fn last_completed_index(&self) -> Option<i16> {
        self.waiter.last_completed().map(|b| b.index)
    }

    // =========================================================================
    // Geometry
    // =========================================================================

    /// Active and maximum size, fetched lazily after geometry changes.
    ///
    /// The maximum is in binned pixels, so it changes with the binning.
    pub fn sizes(&mut self) -> Result<Sizes> {
        let conn = &mut self.conn;
        self.sizes
            .get_or_refresh(|| conn.call("GetSizes", |sdk, h| sdk.sizes(h)))
    }

    /// Whether the next [`PcoCamera::sizes`] call will query the camera.
    pub fn sizes_dirty(&self) -> bool {
        self.sizes.is_dirty()
    }

    /// Validate and program the region of interest.
    ///
    /// Step and symmetry violations fail with `InvalidGeometry` before any
    /// device call; coordinates the camera rejects fail with `OutOfRange`.
    pub fn set_roi(&mut self, roi: Roi) -> Result<()> {
        self.ensure_not_recording()?;
        let sizes = self.sizes()?;
        RoiConstraints::from_description(&self.description, sizes.max_width, sizes.max_height)
            .validate(&roi)?;

        let (x0, y0, x1, y1) = roi.to_driver();
        match self
            .conn
            .call("SetROI", |sdk, h| sdk.set_roi(h, x0, y0, x1, y1))
        {
            Ok(()) => {}
            Err(PcoError::Driver {
                code: ROI_OUT_OF_RANGE,
                ..
            }) => return Err(PcoError::OutOfRange { roi }),
            Err(e) => return Err(e),
        }

        self.invalidate_geometry();
        debug!(%roi, "ROI set");
        Ok(())
    }

    /// Current ROI, 0-based and half-open.
    pub fn roi(&mut self) -> Result<Roi> {
        let (x0, y0, x1, y1) = self.conn.call("GetROI", |sdk, h| sdk.roi(h))?;
        Ok(Roi::from_driver(x0, y0, x1, y1))
    }

    /// Center a `width` x `height` ROI on the sensor, snapped to the ROI
    /// steps.
    pub fn set_centered_roi(&mut self, width: u16, height: u16) -> Result<Roi> {
        let sizes = self.sizes()?;
        let roi = Roi::centered(
            width,
            height,
            sizes.max_width,
            sizes.max_height,
            self.description.roi_hstep,
            self.description.roi_vstep,
        );
        self.set_roi(roi)?;
        Ok(roi)
    }

    /// Set binning. Sizes and transfer parameters are refetched afterwards.
    pub fn set_binning(&mut self, binning: Binning) -> Result<()> {
        self.ensure_not_recording()?;
        self.conn.call("SetBinning", |sdk, h| {
            sdk.set_binning(h, binning.horizontal, binning.vertical)
        })?;
        self.invalidate_geometry();
        debug!(h = binning.horizontal, v = binning.vertical, "Binning set");
        Ok(())
    }

    /// Binning read back from the camera.
    pub fn binning(&mut self) -> Result<Binning> {
        let (horizontal, vertical) = self.conn.call("GetBinning", |sdk, h| sdk.binning(h))?;
        Ok(Binning::new(horizontal, vertical))
    }

    fn invalidate_geometry(&mut self) {
        self.sizes.invalidate();
        self.transfer.invalidate();
    }

    // =========================================================================
    // Timing
    // =========================================================================

    /// Program delay and exposure, each in the finest timebase that fits.
    pub fn set_delay_exposure(&mut self, delay: Duration, exposure: Duration) -> Result<()> {
        let (delay_ticks, delay_tb) = Timebase::encode(delay);
        let (exposure_ticks, exposure_tb) = Timebase::encode(exposure);
        let raw = RawDelayExposure {
            delay: delay_ticks,
            exposure: exposure_ticks,
            delay_timebase: delay_tb as u16,
            exposure_timebase: exposure_tb as u16,
        };
        self.conn
            .call("SetDelayExposureTime", |sdk, h| sdk.set_delay_exposure(h, raw))?;
        self.sizes.invalidate();
        debug!(?delay, ?exposure, "Delay/exposure set");
        Ok(())
    }

    /// Delay and exposure converted from the camera's reported timebases.
    pub fn delay_exposure(&mut self) -> Result<DelayExposure> {
        let raw = self
            .conn
            .call("GetDelayExposureTime", |sdk, h| sdk.delay_exposure(h))?;
        Ok(DelayExposure {
            delay: Timebase::from_raw(raw.delay_timebase)?.to_duration(raw.delay),
            exposure: Timebase::from_raw(raw.exposure_timebase)?.to_duration(raw.exposure),
        })
    }

    /// Arm the camera, then request a frame rate and exposure.
    ///
    /// Returns what the camera actually applied; check
    /// [`FrameRate::status`] for trimming.
    pub fn set_frame_rate(
        &mut self,
        rate_hz: f64,
        mode: FrameRateMode,
        exposure: Duration,
    ) -> Result<FrameRate> {
        let rate_mhz = hz_to_millihertz(rate_hz)?;
        let exposure_ns = exposure_to_ns(exposure)?;

        self.arm()?;
        let raw = self.conn.call("SetFrameRate", |sdk, h| {
            sdk.set_frame_rate(h, mode as u16, rate_mhz, exposure_ns)
        })?;
        let applied = frame_rate_from_raw(raw);
        if !applied.status.is_exact() {
            debug!(
                requested_hz = rate_hz,
                applied_hz = applied.rate_hz,
                status = ?applied.status,
                "Camera adjusted frame rate"
            );
        }
        Ok(applied)
    }

    /// Frame rate and exposure currently applied.
    pub fn frame_rate(&mut self) -> Result<FrameRate> {
        let raw = self.conn.call("GetFrameRate", |sdk, h| sdk.frame_rate(h))?;
        Ok(frame_rate_from_raw(raw))
    }

    /// Select the trigger source.
    pub fn set_trigger_mode(&mut self, mode: TriggerMode) -> Result<()> {
        self.conn
            .call("SetTriggerMode", |sdk, h| sdk.set_trigger_mode(h, mode as u16))
    }

    /// Trigger source read back from the camera.
    pub fn trigger_mode(&mut self) -> Result<TriggerMode> {
        let raw = self.conn.call("GetTriggerMode", |sdk, h| sdk.trigger_mode(h))?;
        TriggerMode::from_raw(raw)
    }

    /// Sensor pixel rate in Hz.
    pub fn pixel_rate(&mut self) -> Result<u32> {
        self.conn.call("GetPixelRate", |sdk, h| sdk.pixel_rate(h))
    }

    // =========================================================================
    // Transfer format
    // =========================================================================

    /// Transfer parameters, fetched lazily after geometry changes.
    pub fn transfer_parameters(&mut self) -> Result<TransferParameters> {
        let conn = &mut self.conn;
        self.transfer.get_or_refresh(|| {
            conn.call("GetTransferParameter", |sdk, h| sdk.transfer_parameters(h))
        })
    }

    /// Bits per sample in host buffers.
    pub fn bit_depth(&mut self) -> Result<u16> {
        self.transfer_parameters()?.data_depth()
    }

    /// Pixel layout of host frames.
    pub fn color_mode(&mut self) -> Result<ColorMode> {
        let depth = self.bit_depth()?;
        Ok(ColorMode::new(&self.description, depth))
    }

    /// Geometry and depth of the next frame.
    pub fn frame_format(&mut self) -> Result<FrameFormat> {
        let sizes = self.sizes()?;
        Ok(FrameFormat {
            width: sizes.width,
            height: sizes.height,
            depth: self.bit_depth()?,
        })
    }

    /// Bytes a buffer needs for the current settings.
    pub fn frame_size(&mut self) -> Result<usize> {
        Ok(self.frame_format()?.byte_size())
    }

    /// Let the SDK pick transfer parameters, re-arm, and tell the grabber
    /// the image size.
    fn configure_transfer(&mut self) -> Result<()> {
        self.conn.call("SetTransferParametersAuto", |sdk, h| {
            sdk.set_transfer_parameters_auto(h)
        })?;
        self.transfer.invalidate();
        self.arm()?;
        let sizes = self.sizes()?;
        self.conn.call("CamLinkSetImageParameters", |sdk, h| {
            sdk.set_image_parameters(h, sizes.width, sizes.height)
        })
    }

    // =========================================================================
    // Buffers
    // =========================================================================

    /// Stop the camera, cancel the queue, free the pool and allocate `n`
    /// buffers sized for the current settings.
    ///
    /// Without `n` the current pool size is reused if above 1, else 2 for a
    /// continuous session, else 1.
    pub fn allocate_buffers(&mut self, n: Option<usize>) -> Result<()> {
        let n = n.unwrap_or_else(|| self.default_buffer_count());
        if n == 0 {
            return Err(PcoError::InvalidConfig {
                message: "buffer count must be at least 1".into(),
            });
        }

        self.set_recording(false)?;
        self.queue.cancel_all(&mut self.conn)?;
        self.free_buffers()?;

        let size = self.frame_size()?;
        self.pool.allocate(&mut self.conn, n, size)
    }

    fn default_buffer_count(&self) -> usize {
        if self.pool.len() > 1 {
            self.pool.len()
        } else if self.continuous {
            2
        } else {
            1
        }
    }

    /// Release every buffer. Queued buffers are cancelled first.
    pub fn free_buffers(&mut self) -> Result<()> {
        if !self.queue.is_empty() {
            self.queue.cancel_all(&mut self.conn)?;
        }
        self.waiter.clear();
        self.pool.free(&mut self.conn)
    }

    fn submit_pool(&mut self, format: FrameFormat) -> Result<()> {
        for buffer in self.pool.buffers() {
            self.queue.submit(&mut self.conn, *buffer, format)?;
        }
        Ok(())
    }

    // =========================================================================
    // Sessions
    // =========================================================================

    /// Program the camera and start a one-shot capture of
    /// `settings.n_frames` frames.
    ///
    /// Drain the frames with [`PcoCamera::get_captured_image`].
    pub fn start_capture(&mut self, settings: &CaptureSettings) -> Result<()> {
        self.ensure_not_recording()?;
        if settings.n_frames == 0 {
            return Err(PcoError::InvalidConfig {
                message: "n_frames must be at least 1".into(),
            });
        }

        let result = self.program_capture(settings);
        if let Err(e) = &result {
            self.abort_after(e);
        }
        result
    }

    fn program_capture(&mut self, settings: &CaptureSettings) -> Result<()> {
        let n = settings.n_frames;
        self.set_binning(settings.binning)?;
        let roi = match settings.roi {
            Some(roi) => roi,
            None => self.full_roi()?,
        };
        self.set_roi(roi)?;
        self.set_delay_exposure(settings.delay, settings.exposure)?;
        self.arm()?;
        self.continuous = false;
        self.allocate_buffers(Some(n))?;
        self.arm()?;
        self.configure_transfer()?;

        // Auto transfer setup may raise the depth past what the pool holds
        if self.frame_size()? > self.pool.buffer_size() {
            self.allocate_buffers(Some(n))?;
            self.arm()?;
        }

        let format = self.frame_format()?;
        self.submit_pool(format)?;
        self.start_recording(CaptureMode::OneShot)?;
        self.force_trigger()?;

        info!(
            frames = n,
            width = format.width,
            height = format.height,
            depth = format.depth,
            "One-shot capture started"
        );
        Ok(())
    }

    /// Wait for every queued frame of a one-shot capture.
    ///
    /// The whole drain shares `timeout`. Recording is stopped and the queue
    /// cancelled on every exit path; a cleanup failure is reported only if
    /// the drain itself succeeded.
    pub fn get_captured_image(&mut self, timeout: Duration) -> Result<Capture> {
        if self.state == SessionState::Recording(CaptureMode::Continuous) {
            return Err(PcoError::SessionActive(self.state));
        }

        let start = Instant::now();
        let drained = self.drain(start, timeout);
        let cleanup = self.stop_and_cancel();

        match (drained, cleanup) {
            (Ok(capture), Ok(())) => {
                debug!(frames = capture.len(), elapsed = ?start.elapsed(), "Capture drained");
                Ok(capture)
            }
            (Ok(_), Err(e)) => Err(e),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(cleanup_err)) => {
                warn!(error = %cleanup_err, "Cleanup failed after capture error");
                Err(e)
            }
        }
    }

    fn drain(&mut self, start: Instant, timeout: Duration) -> Result<Capture> {
        if self.queue.is_empty() {
            return Err(PcoError::NoBuffersQueued);
        }
        let format = self.frame_format()?;
        let mut frames = Vec::with_capacity(self.queue.len());

        while !self.queue.is_empty() {
            let remaining = timeout.saturating_sub(start.elapsed());
            let ready =
                self.waiter
                    .wait_for_frame(&mut self.conn, &mut self.queue, None, remaining)?;
            if !ready {
                return Err(PcoError::Timeout(timeout));
            }
            frames.push(frame::unpack(self.completed_bytes(format)?, format)?);
        }

        Ok(if frames.len() == 1 {
            Capture::Single(frames.remove(0))
        } else {
            Capture::Sequence(frames)
        })
    }

    /// Capture and return a single frame. `settings.n_frames` is ignored.
    pub fn grab_image(
        &mut self,
        settings: &CaptureSettings,
        timeout: Duration,
    ) -> Result<Array2<u16>> {
        let single = CaptureSettings {
            n_frames: 1,
            ..settings.clone()
        };
        self.start_capture(&single)?;
        let mut frames = self.get_captured_image(timeout)?.into_frames();
        frames.pop().ok_or(PcoError::NoFrame)
    }

    /// Start continuous acquisition and return immediately.
    ///
    /// Poll with [`PcoCamera::wait_for_frame`] and read with
    /// [`PcoCamera::latest_frame`]. Returns the frame rate the camera
    /// applied.
    pub fn start_live_video(&mut self, settings: &LiveSettings) -> Result<FrameRate> {
        self.ensure_not_recording()?;
        let result = self.program_live(settings);
        if let Err(e) = &result {
            self.abort_after(e);
        }
        result
    }

    fn program_live(&mut self, settings: &LiveSettings) -> Result<FrameRate> {
        self.set_binning(settings.binning)?;
        let roi = match settings.roi {
            Some(roi) => roi,
            None => self.full_roi()?,
        };
        self.set_roi(roi)?;
        self.arm()?;
        self.configure_transfer()?;
        let applied = self.set_frame_rate(
            settings.frame_rate_hz,
            settings.frame_rate_mode,
            settings.exposure,
        )?;
        self.arm()?;

        self.continuous = true;
        let n = settings.buffer_count.max(2);
        if self.frame_size()? != self.pool.buffer_size() || self.pool.len() < n {
            self.allocate_buffers(Some(n))?;
        }
        self.arm()?;

        let format = self.frame_format()?;
        self.submit_pool(format)?;
        self.start_recording(CaptureMode::Continuous)?;
        self.force_trigger()?;

        info!(
            buffers = self.pool.len(),
            width = format.width,
            height = format.height,
            rate_hz = applied.rate_hz,
            "Live video started"
        );
        Ok(applied)
    }

    /// Stop recording, cancel the queue and free the pool.
    ///
    /// Every step runs; the first failure is returned.
    pub fn stop_live_video(&mut self) -> Result<()> {
        let stopped = self.stop_and_cancel();
        let freed = self.free_buffers();
        self.continuous = false;
        info!("Live video stopped");
        stopped.and(freed)
    }

    /// Stop any session without draining. Buffers stay allocated.
    pub fn abort(&mut self) -> Result<()> {
        self.stop_and_cancel()
    }

    /// Wait up to `timeout` for the next frame. A zero timeout polls.
    ///
    /// `Ok(false)` is a normal timeout; the queue is left unchanged. In
    /// continuous mode the retrieved buffer is resubmitted immediately.
    pub fn wait_for_frame(&mut self, timeout: Duration) -> Result<bool> {
        if self.queue.is_empty() {
            return Err(PcoError::NoBuffersQueued);
        }
        let resubmit = if self.continuous {
            Some(self.frame_format()?)
        } else {
            None
        };
        self.waiter
            .wait_for_frame(&mut self.conn, &mut self.queue, resubmit, timeout)
    }

    /// Copy of the most recently retrieved frame.
    ///
    /// Repeated calls between waits return the same frame.
    pub fn latest_frame(&mut self) -> Result<Array2<u16>> {
        let format = self.frame_format()?;
        frame::unpack(self.completed_bytes(format)?, format)
    }

    /// Borrowed view of the most recently retrieved 16-bit frame.
    ///
    /// In continuous mode the buffer is already back in the queue, so the
    /// camera may overwrite it once the other buffers have been filled.
    pub fn latest_frame_view(&mut self) -> Result<ArrayView2<'_, u16>> {
        let format = self.frame_format()?;
        if format.depth != 16 {
            return Err(PcoError::PackedFrame {
                depth: format.depth,
            });
        }
        let buffer = self.completed_buffer(format)?;
        // SAFETY: see `completed_bytes`; depth 16 means `pixel_count` words
        // fit in `byte_size` bytes, and driver buffers are word-aligned.
        #[allow(unsafe_code)]
        let words = unsafe {
            std::slice::from_raw_parts(buffer.address.as_ptr().cast_const(), format.pixel_count())
        };
        frame::view(words, format)
    }

    fn completed_buffer(&self, format: FrameFormat) -> Result<Buffer> {
        let buffer = *self.waiter.last_completed().ok_or(PcoError::NoFrame)?;
        let required = format.byte_size();
        if buffer.capacity < required {
            return Err(PcoError::StalePool {
                required,
                capacity: buffer.capacity,
            });
        }
        Ok(buffer)
    }

    fn completed_bytes(&self, format: FrameFormat) -> Result<&[u8]> {
        let buffer = self.completed_buffer(format)?;
        // SAFETY: `buffer` belongs to `self.pool`. Its memory stays allocated
        // until `free_buffers`, which needs `&mut self` and clears the waiter
        // first. The capacity check bounds the read.
        #[allow(unsafe_code)]
        let bytes = unsafe {
            std::slice::from_raw_parts(
                buffer.address.as_ptr().cast::<u8>().cast_const(),
                format.byte_size(),
            )
        };
        Ok(bytes)
    }

    // =========================================================================
    // Device control
    // =========================================================================

    /// Apply pending settings on the camera.
    pub fn arm(&mut self) -> Result<()> {
        self.conn.call("ArmCamera", |sdk, h| sdk.arm(h))?;
        if self.state == SessionState::Idle {
            self.state = SessionState::Armed;
        }
        Ok(())
    }

    /// Recording state as reported by the camera.
    pub fn is_recording(&mut self) -> Result<bool> {
        self.conn
            .call("GetRecordingState", |sdk, h| sdk.recording_state(h))
    }

    fn set_recording(&mut self, on: bool) -> Result<()> {
        self.conn
            .call("SetRecordingState", |sdk, h| sdk.set_recording_state(h, on))?;
        if !on {
            self.state = SessionState::Idle;
        }
        Ok(())
    }

    fn start_recording(&mut self, mode: CaptureMode) -> Result<()> {
        self.set_recording(true)?;
        self.state = SessionState::Recording(mode);
        Ok(())
    }

    fn force_trigger(&mut self) -> Result<()> {
        let triggered = self.conn.call("ForceTrigger", |sdk, h| sdk.force_trigger(h))?;
        if !triggered {
            debug!("Software trigger not accepted (camera not in a software-triggerable mode)");
        }
        Ok(())
    }

    /// Stop recording and cancel the queue; both always run.
    fn stop_and_cancel(&mut self) -> Result<()> {
        let stopped = self.set_recording(false);
        let cancelled = self.queue.cancel_all(&mut self.conn);
        self.state = SessionState::Idle;
        stopped.and(cancelled)
    }

    fn abort_after(&mut self, cause: &PcoError) {
        if let Err(e) = self.stop_and_cancel() {
            warn!(cause = %cause, error = %e, "Cleanup failed after session start error");
        }
    }

    fn ensure_not_recording(&self) -> Result<()> {
        if self.state.is_recording() {
            return Err(PcoError::SessionActive(self.state));
        }
        Ok(())
    }

    /// The whole sensor at the current binning.
    pub fn full_roi(&mut self) -> Result<Roi> {
        let sizes = self.sizes()?;
        Ok(Roi::full(sizes.max_width, sizes.max_height))
    }

    /// Stop, cancel, free and close the camera.
    ///
    /// Every step runs; the first failure is returned. Closing twice is a
    /// no-op.
    pub fn close(&mut self) -> Result<()> {
        if !self.conn.is_open() {
            return Ok(());
        }
        let stopped = self.stop_and_cancel();
        let freed = self.free_buffers();
        self.continuous = false;
        let closed = self.conn.close();
        stopped.and(freed).and(closed)
    }
}

impl<S: PcoSdk> Drop for PcoCamera<S> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(camera = self.conn.camera_number(), error = %e, "Error closing PCO camera");
        }
    }
}

fn frame_rate_from_raw(raw: RawFrameRate) -> FrameRate {
    FrameRate {
        rate_hz: millihertz_to_hz(raw.rate_mhz),
        exposure: Duration::from_nanos(u64::from(raw.exposure_ns)),
        status: FrameRateStatus::from_bits_retain(raw.status),
    }
}
