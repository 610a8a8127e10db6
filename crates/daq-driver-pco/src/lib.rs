//! PCO Camera Driver
//!
//! Acquisition pipeline for PCO cameras on the SC2 SDK (pco.edge, pco.panda
//! and relatives), built from components:
//! - Connection: open handle, status translation, RAII close
//! - Geometry/Timing: ROI, binning, delay/exposure, frame rate
//! - Buffer pool, acquisition queue and the frame-wait state machine
//! - Acquisition: one-shot and continuous sessions
//!
//! The synchronous [`PcoCamera`] is the core. [`PcoDriver`] wraps it for
//! async callers and streams frames over a broadcast channel.
//!
//! # Features
//! - `mock` (default): in-process fake camera ([`mock::MockSdk`])
//! - `pco_sdk`: link the real SDK (Windows only)

pub mod components;
pub mod config;
pub mod error;
#[cfg(all(feature = "pco_sdk", windows))]
pub mod hardware;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod sdk;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use serde::Serialize;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;

pub use crate::components::acquisition::{
    Capture, CaptureMode, CaptureSettings, LiveSettings, PcoCamera, SessionState,
};
pub use crate::components::frame::Frame;
pub use crate::components::geometry::{Binning, Roi};
pub use crate::components::timing::{FrameRate, FrameRateMode, FrameRateStatus, TriggerMode};
pub use crate::components::transfer::ColorMode;
pub use crate::config::{FrameRateConfig, PcoCameraConfig, RoiConfig};
pub use crate::error::PcoError;
pub use crate::sdk::{CameraDescription, PcoSdk};

/// Capacity of the frame broadcast channel.
const FRAME_CHANNEL_CAPACITY: usize = 16;
/// Longest single wait inside the streaming loop, so `stop_stream` is
/// observed promptly.
const STREAM_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Static facts about an open camera.
#[derive(Debug, Clone, Serialize)]
pub struct CameraInfo {
    /// SDK camera number.
    pub camera_index: u16,
    /// Unbinned sensor width.
    pub max_width: u16,
    /// Unbinned sensor height.
    pub max_height: u16,
    /// ADC resolution in bits.
    pub dynamic_resolution: u16,
    /// Horizontal ROI step.
    pub roi_hstep: u16,
    /// Vertical ROI step.
    pub roi_vstep: u16,
    /// Largest (horizontal, vertical) binning.
    pub max_binning: (u16, u16),
    /// Pixel rate at open.
    pub pixel_rate_hz: u32,
    /// Bits per sample in host buffers at open.
    pub bit_depth: u16,
    /// `mono<depth>` or `RGB32`.
    pub color_mode: String,
    /// Whether (horizontal, vertical) ROI symmetry is required.
    pub roi_symmetry: (bool, bool),
}

/// Async driver for one PCO camera.
///
/// Blocking SDK work runs on `spawn_blocking` tasks; streaming runs a
/// dedicated blocking poll loop that publishes [`Frame`]s to subscribers.
pub struct PcoDriver<S: PcoSdk + 'static> {
    camera: Arc<Mutex<PcoCamera<S>>>,
    config: PcoCameraConfig,
    info: CameraInfo,
    streaming: Arc<AtomicBool>,
    frame_count: Arc<AtomicU64>,
    frame_tx: broadcast::Sender<Arc<Frame>>,
    poll_handle: Mutex<Option<JoinHandle<std::result::Result<(), PcoError>>>>,
}

#[cfg(feature = "mock")]
impl PcoDriver<mock::MockSdk> {
    /// Open the in-process fake camera, pacing frames at the configured
    /// exposure.
    pub async fn open_mock(config: PcoCameraConfig) -> Result<Self> {
        tracing::warn!("Using mock PCO camera - no hardware will be accessed");
        let period = config.exposure.max(Duration::from_millis(1));
        Self::open(mock::MockSdk::new().with_frame_period(period), config).await
    }
}

impl<S: PcoSdk + 'static> PcoDriver<S> {
    /// Open the camera described by `config` through `sdk`.
    pub async fn open(sdk: S, config: PcoCameraConfig) -> Result<Self> {
        config.validate().context("invalid camera configuration")?;
        let index = config.camera_index;
        let trigger_mode = config.trigger_mode;
        tracing::info!(camera = index, "Opening PCO camera");

        let (camera, info) = tokio::task::spawn_blocking(move || -> Result<_> {
            let mut camera = PcoCamera::open(sdk, index)?;
            camera.set_trigger_mode(trigger_mode)?;
            let info = read_info(&mut camera)?;
            Ok((camera, info))
        })
        .await
        .context("camera open task failed")??;

        let (frame_tx, _) = broadcast::channel(FRAME_CHANNEL_CAPACITY);
        Ok(Self {
            camera: Arc::new(Mutex::new(camera)),
            config,
            info,
            streaming: Arc::new(AtomicBool::new(false)),
            frame_count: Arc::new(AtomicU64::new(0)),
            frame_tx,
            poll_handle: Mutex::new(None),
        })
    }

    /// Capabilities read at open.
    pub fn camera_info(&self) -> &CameraInfo {
        &self.info
    }

    /// Configuration the driver was opened with.
    pub fn config(&self) -> &PcoCameraConfig {
        &self.config
    }

    /// Frames produced since open, by grabs and streaming.
    pub fn frame_count(&self) -> u64 {
        self.frame_count.load(Ordering::SeqCst)
    }

    /// Whether the live poll loop is running.
    pub fn is_streaming(&self) -> bool {
        self.streaming.load(Ordering::SeqCst)
    }

    /// Receive every frame produced from now on.
    pub fn subscribe_frames(&self) -> broadcast::Receiver<Arc<Frame>> {
        self.frame_tx.subscribe()
    }

    /// Run `f` on the camera in a blocking task.
    async fn with_camera<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut PcoCamera<S>) -> std::result::Result<T, PcoError> + Send + 'static,
    {
        let camera = Arc::clone(&self.camera);
        let result = tokio::task::spawn_blocking(move || {
            let mut camera = camera.blocking_lock();
            f(&mut camera)
        })
        .await
        .context("camera task failed")?;
        Ok(result?)
    }

    /// Capture a single frame with the configured settings.
    pub async fn grab(&self) -> Result<Frame> {
        let mut frames = self.capture(1).await?;
        frames.pop().ok_or_else(|| anyhow!("capture returned no frame"))
    }

    /// Capture `n_frames` frames in one one-shot session.
    pub async fn capture(&self, n_frames: usize) -> Result<Vec<Frame>> {
        if self.is_streaming() {
            bail!("cannot capture while streaming");
        }
        let config = self.config.clone();
        let frame_count = Arc::clone(&self.frame_count);

        let frames = self
            .with_camera(move |camera| {
                camera.set_binning(config.binning)?;
                let sizes = camera.sizes()?;
                let settings = config.capture_settings(camera.description(), &sizes, n_frames);
                camera.start_capture(&settings)?;
                let capture = camera.get_captured_image(config.wait_timeout)?;
                let depth = camera.bit_depth()?;
                Ok(capture
                    .into_frames()
                    .into_iter()
                    .map(|data| Frame::new(frame_count.fetch_add(1, Ordering::SeqCst), depth, data))
                    .collect::<Vec<_>>())
            })
            .await
            .with_context(|| format!("capture of {n_frames} frame(s) failed"))?;

        for frame in &frames {
            let _ = self.frame_tx.send(Arc::new(frame.clone()));
        }
        Ok(frames)
    }

    /// Start live acquisition and the polling loop.
    ///
    /// Returns the frame rate the camera applied.
    pub async fn start_stream(&self) -> Result<FrameRate> {
        if self.streaming.swap(true, Ordering::SeqCst) {
            bail!("already streaming");
        }

        let config = self.config.clone();
        let started = self
            .with_camera(move |camera| {
                camera.set_binning(config.binning)?;
                let sizes = camera.sizes()?;
                let settings = config.live_settings(camera.description(), &sizes);
                camera.start_live_video(&settings)
            })
            .await;
        let applied = match started {
            Ok(applied) => applied,
            Err(e) => {
                self.streaming.store(false, Ordering::SeqCst);
                return Err(e.context("failed to start live video"));
            }
        };

        let camera = Arc::clone(&self.camera);
        let streaming = Arc::clone(&self.streaming);
        let frame_tx = self.frame_tx.clone();
        let frame_count = Arc::clone(&self.frame_count);
        let wait = self.config.wait_timeout.min(STREAM_POLL_INTERVAL);
        let handle = tokio::task::spawn_blocking(move || {
            poll_loop(&camera, &streaming, &frame_tx, &frame_count, wait)
        });
        *self.poll_handle.lock().await = Some(handle);

        tracing::info!(rate_hz = applied.rate_hz, status = ?applied.status, "PCO stream started");
        Ok(applied)
    }

    /// Stop the polling loop and live acquisition, freeing the buffers.
    pub async fn stop_stream(&self) -> Result<()> {
        self.streaming.store(false, Ordering::SeqCst);
        let Some(handle) = self.poll_handle.lock().await.take() else {
            return Ok(());
        };

        match handle.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(error = %e, "Stream loop ended with error"),
            Err(e) => tracing::warn!(error = %e, "Stream loop task failed"),
        }

        self.with_camera(|camera| camera.stop_live_video())
            .await
            .context("failed to stop live video")?;
        tracing::info!(frames = self.frame_count(), "PCO stream stopped");
        Ok(())
    }

    /// Stop streaming and close the camera.
    pub async fn shutdown(self) -> Result<()> {
        self.stop_stream().await?;
        self.with_camera(|camera| camera.close())
            .await
            .context("failed to close camera")
    }
}

impl<S: PcoSdk + 'static> Drop for PcoDriver<S> {
    fn drop(&mut self) {
        // The poll loop holds its own reference and exits on this flag; the
        // camera closes when the last reference goes.
        self.streaming.store(false, Ordering::SeqCst);
    }
}

fn read_info<S: PcoSdk>(camera: &mut PcoCamera<S>) -> std::result::Result<CameraInfo, PcoError> {
    let desc = *camera.description();
    Ok(CameraInfo {
        camera_index: camera.camera_number(),
        max_width: desc.max_width,
        max_height: desc.max_height,
        dynamic_resolution: desc.dynamic_resolution,
        roi_hstep: desc.roi_hstep,
        roi_vstep: desc.roi_vstep,
        max_binning: (desc.max_bin_horizontal, desc.max_bin_vertical),
        pixel_rate_hz: camera.pixel_rate()?,
        bit_depth: camera.bit_depth()?,
        color_mode: camera.color_mode()?.to_string(),
        roi_symmetry: (
            desc.requires_horizontal_symmetry(),
            desc.requires_vertical_symmetry(),
        ),
    })
}

fn poll_loop<S: PcoSdk>(
    camera: &Mutex<PcoCamera<S>>,
    streaming: &AtomicBool,
    frame_tx: &broadcast::Sender<Arc<Frame>>,
    frame_count: &AtomicU64,
    wait: Duration,
) -> std::result::Result<(), PcoError> {
    while streaming.load(Ordering::SeqCst) {
        let mut cam = camera.blocking_lock();
        let next = cam.wait_for_frame(wait).and_then(|ready| {
            if ready {
                Ok(Some((cam.latest_frame()?, cam.bit_depth()?)))
            } else {
                Ok(None)
            }
        });
        drop(cam);

        let (data, depth) = match next {
            Ok(Some(frame)) => frame,
            Ok(None) => continue,
            Err(e) => {
                tracing::error!(error = %e, "PCO frame wait failed, stopping stream");
                streaming.store(false, Ordering::SeqCst);
                return Err(e);
            }
        };

        let frame_number = frame_count.fetch_add(1, Ordering::SeqCst);
        tracing::trace!(frame_number, "Frame published");
        // No subscribers is fine
        let _ = frame_tx.send(Arc::new(Frame::new(frame_number, depth, data)));
    }
    Ok(())
}
