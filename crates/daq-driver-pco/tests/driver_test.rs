//! Integration tests for PcoDriver
//!
//! Tests the async driver interface including:
//! - Driver creation and camera info
//! - One-shot grabs and multi-frame captures
//! - Streaming through the frame broadcast channel
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p daq-driver-pco --test driver_test
//! ```

use std::time::Duration;

use daq_driver_pco::{Binning, FrameRateConfig, FrameRateMode, PcoCameraConfig, PcoDriver, RoiConfig};
use tracing_subscriber::EnvFilter;

/// Log to the test harness; set `RUST_LOG=debug` to see driver output.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn small_config() -> PcoCameraConfig {
    PcoCameraConfig {
        roi: Some(RoiConfig::Explicit {
            x0: 0,
            y0: 0,
            x1: 64,
            y1: 32,
        }),
        exposure: Duration::from_millis(2),
        wait_timeout: Duration::from_secs(2),
        ..Default::default()
    }
}

// =============================================================================
// Mock Mode Driver Tests
// =============================================================================

#[cfg(feature = "mock")]
mod mock_driver {
    use super::*;

    #[tokio::test]
    async fn open_reports_camera_info() {
        let driver = PcoDriver::open_mock(small_config()).await.unwrap();
        let info = driver.camera_info();

        assert_eq!((info.max_width, info.max_height), (2560, 2160));
        assert_eq!(info.bit_depth, 16);
        assert_eq!(info.color_mode, "mono16");
        assert_eq!(info.pixel_rate_hz, 95_333_333);
        assert_eq!(info.roi_symmetry, (false, false));

        let json = serde_json::to_value(info).unwrap();
        assert_eq!(json["max_width"], 2560);
    }

    #[tokio::test]
    async fn open_rejects_invalid_config() {
        let config = PcoCameraConfig {
            binning: Binning::new(0, 1),
            ..small_config()
        };
        assert!(PcoDriver::open_mock(config).await.is_err());
    }

    #[tokio::test]
    async fn grab_single_frame() {
        let driver = PcoDriver::open_mock(small_config()).await.unwrap();
        let frame = driver.grab().await.unwrap();

        assert_eq!((frame.width, frame.height), (64, 32));
        assert_eq!(frame.bit_depth, 16);
        assert_eq!(frame.frame_number, 0);
        assert_eq!(driver.frame_count(), 1);
    }

    #[tokio::test]
    async fn centered_roi_uses_binned_sensor() {
        // Centered on the unbinned sensor this window would start at x=1248,
        // past the 1280-pixel binned width
        let config = PcoCameraConfig {
            binning: Binning::new(2, 2),
            roi: Some(RoiConfig::Centered {
                width: 64,
                height: 32,
            }),
            ..small_config()
        };
        let driver = PcoDriver::open_mock(config).await.unwrap();
        let frame = driver.grab().await.unwrap();
        assert_eq!((frame.width, frame.height), (64, 32));
    }

    #[tokio::test]
    async fn capture_publishes_frames() {
        let driver = PcoDriver::open_mock(small_config()).await.unwrap();
        let mut rx = driver.subscribe_frames();

        let frames = driver.capture(3).await.unwrap();
        let numbers: Vec<u64> = frames.iter().map(|f| f.frame_number).collect();
        assert_eq!(numbers, vec![0, 1, 2]);

        for expected in 0..3 {
            let frame = rx.recv().await.unwrap();
            assert_eq!(frame.frame_number, expected);
        }
        assert_eq!(driver.frame_count(), 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn stream_delivers_frames() {
        init_tracing();
        let config = PcoCameraConfig {
            frame_rate: Some(FrameRateConfig {
                rate_hz: 50.0,
                mode: FrameRateMode::Auto,
            }),
            ..small_config()
        };
        let driver = PcoDriver::open_mock(config).await.unwrap();
        let mut rx = driver.subscribe_frames();

        let applied = driver.start_stream().await.unwrap();
        assert!((applied.rate_hz - 50.0).abs() < 1e-9);
        assert!(applied.status.is_exact());
        assert!(driver.is_streaming());

        let mut last = None;
        for _ in 0..5 {
            let frame = tokio::time::timeout(Duration::from_secs(2), rx.recv())
                .await
                .expect("frame within timeout")
                .unwrap();
            assert_eq!(frame.data.dim(), (32, 64));
            if let Some(prev) = last {
                assert!(frame.frame_number > prev);
            }
            last = Some(frame.frame_number);
        }

        driver.stop_stream().await.unwrap();
        assert!(!driver.is_streaming());
        assert!(driver.frame_count() >= 5);

        // Camera is idle again
        driver.grab().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn stream_conflicts_rejected() {
        let driver = PcoDriver::open_mock(small_config()).await.unwrap();
        driver.start_stream().await.unwrap();

        assert!(driver.start_stream().await.is_err());
        assert!(driver.capture(1).await.is_err());
        assert!(driver.is_streaming());

        driver.stop_stream().await.unwrap();
    }

    #[tokio::test]
    async fn stop_without_stream_is_noop() {
        let driver = PcoDriver::open_mock(small_config()).await.unwrap();
        driver.stop_stream().await.unwrap();
        assert!(!driver.is_streaming());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn shutdown_while_streaming() {
        init_tracing();
        let driver = PcoDriver::open_mock(small_config()).await.unwrap();
        driver.start_stream().await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        driver.shutdown().await.unwrap();
    }
}
