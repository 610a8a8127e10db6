//! Integration tests for the PCO acquisition pipeline against the mock SDK.
//!
//! Covers geometry validation, the frame-wait state machine as seen through
//! `PcoCamera`, one-shot and continuous sessions, and cleanup on failure.
//!
//! ```bash
//! cargo test -p daq-driver-pco --test acquisition_test
//! ```

#![cfg(feature = "mock")]

use std::time::{Duration, Instant};

use daq_driver_pco::components::transfer::DATAFORMAT_5X12;
use daq_driver_pco::mock::{test_pattern, FillMode, MockController, MockSdk};
use daq_driver_pco::{
    Binning, CameraDescription, Capture, CaptureMode, CaptureSettings, ColorMode,
    FrameRateMode, FrameRateStatus, LiveSettings, PcoCamera, PcoError, Roi, SessionState,
    TriggerMode,
};

const SMALL: Roi = Roi::new(0, 0, 64, 32);

fn open_with(desc: CameraDescription) -> (PcoCamera<MockSdk>, MockController) {
    let sdk = MockSdk::with_description(desc);
    let ctl = sdk.controller();
    let camera = PcoCamera::open(sdk, 0).expect("open mock camera");
    (camera, ctl)
}

fn open() -> (PcoCamera<MockSdk>, MockController) {
    open_with(CameraDescription::default())
}

fn capture_settings(n_frames: usize) -> CaptureSettings {
    CaptureSettings {
        roi: Some(SMALL),
        n_frames,
        ..Default::default()
    }
}

fn live_settings() -> LiveSettings {
    LiveSettings {
        roi: Some(SMALL),
        ..Default::default()
    }
}

// =============================================================================
// Geometry
// =============================================================================

#[test]
fn valid_rois_round_trip() {
    let (mut cam, _ctl) = open();
    for roi in [
        Roi::new(0, 0, 100, 100),
        Roi::new(0, 0, 2560, 2160),
        Roi::new(17, 3, 18, 4),
        Roi::new(1000, 500, 2000, 1500),
    ] {
        cam.set_roi(roi).unwrap();
        assert_eq!(cam.roi().unwrap(), roi);
        let sizes = cam.sizes().unwrap();
        assert_eq!((sizes.width, sizes.height), (roi.width(), roi.height()));
    }
}

#[test]
fn step_violation_leaves_state_unchanged() {
    let desc = CameraDescription {
        roi_hstep: 2,
        roi_vstep: 2,
        ..Default::default()
    };
    let (mut cam, ctl) = open_with(desc);
    let before = cam.sizes().unwrap();
    let set_roi_calls = ctl.count_calls("SetROI");

    let err = cam.set_roi(Roi::new(1, 0, 100, 100)).unwrap_err();
    assert!(matches!(err, PcoError::InvalidGeometry { .. }));
    assert!(err.to_string().contains('2'), "message should name the step: {err}");

    assert!(matches!(
        cam.set_roi(Roi::new(0, 3, 100, 100)),
        Err(PcoError::InvalidGeometry { .. })
    ));
    assert_eq!(ctl.count_calls("SetROI"), set_roi_calls);
    assert!(!cam.sizes_dirty());
    assert_eq!(cam.sizes().unwrap(), before);
}

#[test]
fn symmetric_roi_required_by_caps() {
    let desc = CameraDescription {
        general_caps1: CameraDescription::CAPS_ROI_HORZ_SYMM,
        ..Default::default()
    };
    let (mut cam, _ctl) = open_with(desc);

    cam.set_roi(Roi::new(100, 0, 2460, 100)).unwrap();
    assert!(matches!(
        cam.set_roi(Roi::new(100, 0, 2400, 100)),
        Err(PcoError::InvalidGeometry { .. })
    ));
    // Vertical symmetry is not required by these caps
    cam.set_roi(Roi::new(100, 7, 2460, 100)).unwrap();
}

#[test]
fn out_of_range_roi_reports_bounds() {
    let (mut cam, _ctl) = open();
    let err = cam.set_roi(Roi::new(0, 0, 3000, 100)).unwrap_err();
    assert!(matches!(err, PcoError::OutOfRange { .. }));
    let message = err.to_string();
    assert!(message.contains("[0, width-1]"), "{message}");
    assert!(message.contains("[x0+1, width]"), "{message}");
}

#[test]
fn centered_roi_and_binning() {
    let (mut cam, _ctl) = open();
    let roi = cam.set_centered_roi(512, 256).unwrap();
    assert_eq!(roi, Roi::new(1024, 952, 1536, 1208));

    cam.set_roi(Roi::full(2560, 2160)).unwrap();
    cam.set_binning(Binning::new(2, 2)).unwrap();
    assert_eq!(cam.binning().unwrap(), Binning::new(2, 2));
    let sizes = cam.sizes().unwrap();
    assert_eq!((sizes.width, sizes.height), (1280, 1080));
}

#[test]
fn sensor_maximum_follows_binning() {
    let desc = CameraDescription {
        general_caps1: CameraDescription::CAPS_ROI_HORZ_SYMM,
        ..Default::default()
    };
    let (mut cam, _ctl) = open_with(desc);
    cam.set_binning(Binning::new(2, 2)).unwrap();

    let sizes = cam.sizes().unwrap();
    assert_eq!((sizes.max_width, sizes.max_height), (1280, 1080));
    assert_eq!(cam.full_roi().unwrap(), Roi::full(1280, 1080));

    // Symmetric about the binned centre, not the physical one
    cam.set_roi(Roi::new(100, 0, 1180, 100)).unwrap();
    assert!(matches!(
        cam.set_roi(Roi::new(100, 0, 2460, 100)),
        Err(PcoError::InvalidGeometry { .. })
    ));

    cam.set_binning(Binning::new(1, 1)).unwrap();
    cam.set_roi(Roi::new(100, 0, 2460, 100)).unwrap();
}

#[test]
fn binned_full_sensor_capture() {
    let desc = CameraDescription {
        max_width: 128,
        max_height: 64,
        ..Default::default()
    };
    let (mut cam, _ctl) = open_with(desc);
    let settings = CaptureSettings {
        roi: None,
        binning: Binning::new(2, 2),
        n_frames: 1,
        ..Default::default()
    };

    let frame = cam.grab_image(&settings, Duration::from_secs(1)).unwrap();
    assert_eq!(frame.dim(), (32, 64));
    assert_eq!(cam.roi().unwrap(), Roi::full(64, 32));

    let roi = cam.set_centered_roi(16, 8).unwrap();
    assert_eq!(roi, Roi::new(24, 12, 40, 20));
}

// =============================================================================
// Frame wait
// =============================================================================

#[test]
fn wait_on_empty_queue_is_logic_error() {
    let (mut cam, ctl) = open();
    for timeout in [Duration::ZERO, Duration::from_millis(1), Duration::from_secs(60)] {
        assert!(matches!(
            cam.wait_for_frame(timeout),
            Err(PcoError::NoBuffersQueued)
        ));
    }
    assert_eq!(ctl.count_calls("WaitForSingleObject"), 0);
}

#[test]
fn zero_timeout_polls_without_blocking() {
    let (mut cam, ctl) = open();
    ctl.set_fill_mode(FillMode::Manual);
    cam.start_capture(&capture_settings(1)).unwrap();

    let start = Instant::now();
    assert!(!cam.wait_for_frame(Duration::ZERO).unwrap());
    assert!(start.elapsed() < Duration::from_millis(500));
    assert_eq!(cam.queued(), 1);
    assert!(matches!(cam.latest_frame(), Err(PcoError::NoFrame)));
    assert_eq!(ctl.last_wait_timeout_ms(), Some(0));
}

#[test]
fn driver_status_error_pops_buffer() {
    let (mut cam, ctl) = open();
    ctl.set_fill_mode(FillMode::Manual);
    cam.start_capture(&capture_settings(2)).unwrap();
    let head = cam.queued_indices()[0];

    ctl.inject_driver_status(0x8033_2028);
    ctl.fill_next();
    let err = cam.wait_for_frame(Duration::ZERO).unwrap_err();
    assert_eq!(err.code(), Some(0x8033_2028));

    assert_eq!(cam.queued(), 1);
    assert!(!cam.queued_indices().contains(&head));
    assert_eq!(cam.pool().len(), 2);
    assert_eq!(cam.last_completed_index(), None);
}

#[test]
fn os_wait_failure() {
    let (mut cam, ctl) = open();
    cam.start_capture(&capture_settings(1)).unwrap();
    ctl.fail_next_wait();
    let err = cam.wait_for_frame(Duration::from_millis(10)).unwrap_err();
    assert!(matches!(err, PcoError::WaitFailed));
    assert_eq!(err.to_string(), "Failed to grab image");
    assert_eq!(cam.queued(), 1);
}

// =============================================================================
// One-shot capture
// =============================================================================

#[test]
fn one_shot_returns_frames_in_capture_order() {
    let (mut cam, ctl) = open();
    let k = 3;
    cam.start_capture(&capture_settings(k)).unwrap();
    assert_eq!(cam.pool().len(), k);
    assert_eq!(cam.queued(), k);
    assert!(ctl.recording());

    let capture = cam.get_captured_image(Duration::from_secs(1)).unwrap();
    let frames = match capture {
        Capture::Sequence(frames) => frames,
        Capture::Single(_) => panic!("expected a sequence"),
    };
    assert_eq!(frames.len(), k);
    for (i, frame) in frames.iter().enumerate() {
        assert_eq!(frame.dim(), (32, 64));
        assert_eq!(frame[[0, 0]], test_pattern(i as u64, 0, 0, 16));
        assert_eq!(frame[[31, 63]], test_pattern(i as u64, 63, 31, 16));
    }

    assert_eq!(cam.pool().len(), k);
    assert_eq!(cam.queued(), 0);
    assert!(!ctl.recording());
    assert_eq!(cam.session_state(), SessionState::Idle);
}

#[test]
fn single_frame_capture_is_not_a_sequence() {
    let (mut cam, _ctl) = open();
    cam.start_capture(&capture_settings(1)).unwrap();
    let capture = cam.get_captured_image(Duration::from_secs(1)).unwrap();
    assert!(matches!(capture, Capture::Single(ref f) if f.dim() == (32, 64)));

    let frame = cam.grab_image(&capture_settings(5), Duration::from_secs(1)).unwrap();
    assert_eq!(frame.dim(), (32, 64));
    assert_eq!(cam.pool().len(), 1);
}

#[test]
fn capture_programs_camera_in_order() {
    let (mut cam, ctl) = open();
    ctl.clear_calls();
    cam.start_capture(&capture_settings(2)).unwrap();

    let calls = ctl.calls();
    let pos = |op: &str| calls.iter().position(|c| *c == op).unwrap();
    assert!(pos("SetBinning") < pos("SetROI"));
    assert!(pos("SetROI") < pos("SetDelayExposureTime"));
    assert!(pos("AllocateBuffer") < pos("SetTransferParametersAuto"));
    assert!(pos("CamLinkSetImageParameters") < pos("AddBufferEx"));
    assert_eq!(calls.last().copied(), Some("ForceTrigger"));
    assert_eq!(ctl.image_parameters(), Some((64, 32)));
    assert_eq!(ctl.count_calls("AddBufferEx"), 2);
}

#[test]
fn drain_timeout_still_cleans_up() {
    let (mut cam, ctl) = open();
    ctl.set_fill_mode(FillMode::Manual);
    cam.start_capture(&capture_settings(2)).unwrap();
    ctl.fill_next();

    let err = cam.get_captured_image(Duration::from_millis(20)).unwrap_err();
    assert!(err.is_timeout());
    assert!(!ctl.recording());
    assert_eq!(cam.queued(), 0);
    assert!(ctl.submitted().is_empty());
    assert_eq!(cam.session_state(), SessionState::Idle);
}

#[test]
fn drain_shares_one_timeout_budget() {
    // Each frame arrives well within the timeout, the three together do not
    let sdk = MockSdk::new().with_frame_period(Duration::from_millis(30));
    let ctl = sdk.controller();
    let mut cam = PcoCamera::open(sdk, 0).unwrap();
    cam.start_capture(&capture_settings(3)).unwrap();

    let start = Instant::now();
    let err = cam.get_captured_image(Duration::from_millis(80)).unwrap_err();
    assert!(err.is_timeout(), "{err}");
    assert!(start.elapsed() < Duration::from_millis(500));
    assert!(ctl.frames_filled() < 3);
    assert!(!ctl.recording());
    assert_eq!(cam.queued(), 0);
    assert_eq!(cam.session_state(), SessionState::Idle);
}

#[test]
fn driver_error_mid_drain_still_cleans_up() {
    let (mut cam, ctl) = open();
    ctl.set_fill_mode(FillMode::Manual);
    cam.start_capture(&capture_settings(3)).unwrap();
    ctl.fill_next();
    ctl.inject_driver_status(0x8000_1111);
    ctl.fill_next();

    let err = cam.get_captured_image(Duration::from_secs(1)).unwrap_err();
    assert!(matches!(err, PcoError::Driver { .. }));
    assert_eq!(err.code(), Some(0x8000_1111));
    assert!(!ctl.recording());
    assert_eq!(cam.queued(), 0);
    assert!(ctl.submitted().is_empty());
    assert_eq!(cam.session_state(), SessionState::Idle);
}

#[test]
fn drain_error_wins_over_cleanup_error() {
    let (mut cam, ctl) = open();
    ctl.set_fill_mode(FillMode::Manual);
    cam.start_capture(&capture_settings(1)).unwrap();
    ctl.fail_call("CancelImages", 0x8000_0001);

    let err = cam.get_captured_image(Duration::from_millis(5)).unwrap_err();
    assert!(err.is_timeout());
    assert_eq!(cam.queued(), 0);
    assert!(!ctl.recording());
}

#[test]
fn cleanup_error_reported_after_successful_drain() {
    let (mut cam, ctl) = open();
    cam.start_capture(&capture_settings(1)).unwrap();
    ctl.fail_call("CancelImages", 0x8000_0002);

    let err = cam.get_captured_image(Duration::from_secs(1)).unwrap_err();
    assert_eq!(err.code(), Some(0x8000_0002));
    assert_eq!(cam.session_state(), SessionState::Idle);
}

#[test]
fn failed_start_leaves_camera_stopped() {
    let (mut cam, ctl) = open();
    ctl.fail_call("ForceTrigger", 0x8000_0003);

    let err = cam.start_capture(&capture_settings(2)).unwrap_err();
    assert_eq!(err.code(), Some(0x8000_0003));
    assert_eq!(cam.session_state(), SessionState::Idle);
    assert!(!ctl.recording());
    assert_eq!(cam.queued(), 0);
    assert!(ctl.submitted().is_empty());

    // Camera is usable afterwards
    cam.grab_image(&capture_settings(1), Duration::from_secs(1))
        .unwrap();
}

#[test]
fn zero_frames_rejected() {
    let (mut cam, ctl) = open();
    assert!(matches!(
        cam.start_capture(&capture_settings(0)),
        Err(PcoError::InvalidConfig { .. })
    ));
    assert_eq!(ctl.count_calls("AllocateBuffer"), 0);
}

// =============================================================================
// Continuous acquisition
// =============================================================================

#[test]
fn continuous_queue_length_is_invariant() {
    let (mut cam, _ctl) = open();
    cam.start_live_video(&live_settings()).unwrap();
    assert!(cam.is_continuous());
    assert_eq!(
        cam.session_state(),
        SessionState::Recording(CaptureMode::Continuous)
    );

    let depth = cam.queued();
    assert_eq!(depth, 2);
    let pool: Vec<i16> = cam.pool().buffers().iter().map(|b| b.index).collect();

    for n in 0..7u64 {
        assert!(cam.wait_for_frame(Duration::from_millis(100)).unwrap());
        assert_eq!(cam.queued(), depth);

        let expected = pool[(n as usize) % pool.len()];
        assert_eq!(cam.last_completed_index(), Some(expected));

        let frame = cam.latest_frame().unwrap();
        assert_eq!(frame[[2, 5]], test_pattern(n, 5, 2, 16));
    }
}

#[test]
fn live_forces_two_buffers() {
    let (mut cam, _ctl) = open();
    let settings = LiveSettings {
        buffer_count: 1,
        ..live_settings()
    };
    cam.start_live_video(&settings).unwrap();
    assert_eq!(cam.pool().len(), 2);
}

#[test]
fn latest_frame_is_stable_between_waits() {
    let (mut cam, _ctl) = open();
    cam.start_live_video(&live_settings()).unwrap();
    assert!(cam.wait_for_frame(Duration::from_millis(100)).unwrap());

    let a = cam.latest_frame().unwrap();
    let b = cam.latest_frame().unwrap();
    assert_eq!(a, b);
    assert_eq!(cam.latest_frame_view().unwrap(), a.view());

    assert!(cam.wait_for_frame(Duration::from_millis(100)).unwrap());
    assert_ne!(cam.latest_frame().unwrap(), a);
}

#[test]
fn stop_live_frees_everything() {
    let (mut cam, ctl) = open();
    cam.start_live_video(&live_settings()).unwrap();
    cam.wait_for_frame(Duration::from_millis(100)).unwrap();

    cam.stop_live_video().unwrap();
    assert!(!cam.is_continuous());
    assert!(cam.pool().is_empty());
    assert_eq!(ctl.allocated_buffers(), 0);
    assert!(!ctl.recording());
    assert!(matches!(cam.latest_frame(), Err(PcoError::NoFrame)));
}

#[test]
fn reconfiguration_blocked_while_recording() {
    let (mut cam, ctl) = open();
    cam.start_live_video(&live_settings()).unwrap();
    let set_roi_calls = ctl.count_calls("SetROI");

    assert!(matches!(
        cam.set_roi(Roi::new(0, 0, 32, 32)),
        Err(PcoError::SessionActive(_))
    ));
    assert!(matches!(
        cam.start_capture(&capture_settings(1)),
        Err(PcoError::SessionActive(_))
    ));
    assert!(matches!(
        cam.start_live_video(&live_settings()),
        Err(PcoError::SessionActive(_))
    ));
    assert!(matches!(
        cam.get_captured_image(Duration::from_millis(1)),
        Err(PcoError::SessionActive(_))
    ));
    assert_eq!(ctl.count_calls("SetROI"), set_roi_calls);
    assert_eq!(cam.queued(), 2);
}

#[test]
fn frame_rate_trimmed_by_exposure() {
    let (mut cam, _ctl) = open();
    let settings = LiveSettings {
        exposure: Duration::from_millis(100),
        frame_rate_hz: 50.0,
        frame_rate_mode: FrameRateMode::ExposurePriority,
        ..live_settings()
    };
    let applied = cam.start_live_video(&settings).unwrap();
    assert!((applied.rate_hz - 10.0).abs() < 1e-9);
    assert!(applied.status.contains(FrameRateStatus::LIMITED_BY_EXPOSURE));
    assert!(!applied.status.is_exact());
    assert_eq!(applied.exposure, Duration::from_millis(100));

    let current = cam.frame_rate().unwrap();
    assert!((current.rate_hz - 10.0).abs() < 1e-9);
}

// =============================================================================
// Transfer format and settings
// =============================================================================

#[test]
fn twelve_bit_frames_unpack() {
    let (mut cam, ctl) = open();
    ctl.set_data_format(DATAFORMAT_5X12);
    assert_eq!(cam.bit_depth().unwrap(), 12);
    assert_eq!(cam.color_mode().unwrap(), ColorMode::Mono(12));

    cam.start_capture(&capture_settings(2)).unwrap();
    assert_eq!(cam.pool().buffer_size(), 64 * 32 * 12 / 8);
    let frames = cam
        .get_captured_image(Duration::from_secs(1))
        .unwrap()
        .into_frames();
    for (i, frame) in frames.iter().enumerate() {
        assert_eq!(frame[[0, 1]], test_pattern(i as u64, 1, 0, 12));
        assert_eq!(frame[[10, 33]], test_pattern(i as u64, 33, 10, 12));
    }
    assert!(matches!(
        cam.latest_frame_view(),
        Err(PcoError::PackedFrame { depth: 12 })
    ));
}

#[test]
fn fast_wide_sensor_selects_twelve_bit_transfer() {
    let (mut cam, ctl) = open();
    ctl.set_pixel_rate(286_000_000);
    let settings = CaptureSettings {
        roi: Some(Roi::new(0, 0, 2560, 8)),
        ..Default::default()
    };
    cam.start_capture(&settings).unwrap();
    assert_eq!(cam.bit_depth().unwrap(), 12);
    let frame = cam
        .get_captured_image(Duration::from_secs(1))
        .unwrap()
        .into_frames()
        .remove(0);
    assert_eq!(frame.dim(), (8, 2560));
}

#[test]
fn geometry_change_makes_last_frame_stale() {
    let (mut cam, ctl) = open();
    ctl.set_fill_mode(FillMode::Manual);
    cam.start_capture(&capture_settings(1)).unwrap();
    ctl.fill_next();
    assert!(cam.wait_for_frame(Duration::ZERO).unwrap());
    cam.abort().unwrap();

    cam.set_roi(Roi::new(0, 0, 128, 64)).unwrap();
    assert!(matches!(
        cam.latest_frame(),
        Err(PcoError::StalePool {
            required: 16_384,
            capacity: 4096
        })
    ));
}

#[test]
fn allocation_defaults_follow_previous_session() {
    let (mut cam, ctl) = open();
    cam.set_roi(SMALL).unwrap();
    cam.allocate_buffers(None).unwrap();
    assert_eq!(cam.pool().len(), 1);

    cam.start_live_video(&live_settings()).unwrap();
    cam.stop_live_video().unwrap();
    // Stopping live video clears the continuous flag
    cam.allocate_buffers(None).unwrap();
    assert_eq!(cam.pool().len(), 1);

    cam.allocate_buffers(Some(3)).unwrap();
    cam.allocate_buffers(None).unwrap();
    assert_eq!(cam.pool().len(), 3);
    assert_eq!(ctl.allocated_buffers(), 3);

    assert!(matches!(
        cam.allocate_buffers(Some(0)),
        Err(PcoError::InvalidConfig { .. })
    ));
}

#[test]
fn timing_and_trigger_settings() {
    let (mut cam, _ctl) = open();
    cam.set_delay_exposure(Duration::from_micros(5), Duration::from_millis(250))
        .unwrap();
    let de = cam.delay_exposure().unwrap();
    assert_eq!(de.delay, Duration::from_micros(5));
    assert_eq!(de.exposure, Duration::from_millis(250));

    cam.set_trigger_mode(TriggerMode::Software).unwrap();
    assert_eq!(cam.trigger_mode().unwrap(), TriggerMode::Software);
    assert_eq!(cam.pixel_rate().unwrap(), 95_333_333);
}

#[test]
fn color_sensor_reports_rgb() {
    let desc = CameraDescription {
        pattern_type: 1,
        ..Default::default()
    };
    let (mut cam, _ctl) = open_with(desc);
    assert_eq!(cam.color_mode().unwrap(), ColorMode::Rgb32);
    assert_eq!(cam.color_mode().unwrap().to_string(), "RGB32");
}

// =============================================================================
// Lifecycle
// =============================================================================

#[test]
fn drop_releases_camera() {
    let (mut cam, ctl) = open();
    cam.start_live_video(&live_settings()).unwrap();
    drop(cam);

    assert!(!ctl.is_open());
    assert!(!ctl.recording());
    assert_eq!(ctl.allocated_buffers(), 0);
}

#[test]
fn open_failure_is_driver_error() {
    let sdk = MockSdk::new();
    let ctl = sdk.controller();
    ctl.fail_call("OpenCameraEx", 0x8000_2001);
    let err = PcoCamera::open(sdk, 0).err().unwrap();
    assert_eq!(err.code(), Some(0x8000_2001));
    assert!(!ctl.is_open());
}
