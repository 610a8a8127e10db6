//! Command-line acquisition tool for PCO cameras.
//!
//! ```bash
//! # Camera capabilities as JSON
//! pco-capture info
//!
//! # Capture 10 frames and print per-frame statistics
//! pco-capture --config config/pco.toml grab --frames 10
//!
//! # Stream for 5 seconds and report the achieved frame rate
//! pco-capture live --duration 5s
//! ```
//!
//! Without the `pco_sdk` feature every command runs against the built-in
//! mock camera.

// Global allocator (Microsoft Rust Guidelines: M-MIMALLOC-APPS)
#[cfg(not(test))]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

mod config;
mod tracing_init;

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use daq_driver_pco::{Frame, PcoDriver, PcoSdk};
use humantime_serde::re::humantime;
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::tracing_init::{parse_log_level, OutputFormat, TracingConfig};

#[derive(Parser)]
#[command(name = "pco-capture")]
#[command(about = "Acquire frames from a PCO camera", long_about = None)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the configured log level
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Override the configured log format
    #[arg(long, global = true, value_enum)]
    log_format: Option<OutputFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print camera capabilities as JSON
    Info,

    /// Capture frames in one session and print statistics as JSON lines
    Grab {
        /// Number of frames
        #[arg(long, default_value_t = 1)]
        frames: usize,
    },

    /// Stream live video for a while and report the frame rate
    Live {
        /// How long to stream, e.g. "5s" or "1s 500ms"
        #[arg(long, default_value = "5s", value_parser = humantime::parse_duration)]
        duration: Duration,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load(cli.config.as_deref())?;
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    if let Some(format) = cli.log_format {
        config.logging.format = format;
    }

    let level = parse_log_level(&config.logging.level)?;
    tracing_init::init(&TracingConfig::new(level).with_format(config.logging.format))?;

    if config.camera.mock {
        return run(PcoDriver::open_mock(config.camera).await?, cli.command).await;
    }

    #[cfg(all(feature = "pco_sdk", windows))]
    {
        let sdk = daq_driver_pco::hardware::Sc2Sdk::new();
        run(PcoDriver::open(sdk, config.camera).await?, cli.command).await
    }

    #[cfg(not(all(feature = "pco_sdk", windows)))]
    {
        warn!("Built without PCO SDK support, falling back to the mock camera");
        run(PcoDriver::open_mock(config.camera).await?, cli.command).await
    }
}

async fn run<S: PcoSdk + 'static>(driver: PcoDriver<S>, command: Commands) -> Result<()> {
    let result = match command {
        Commands::Info => print_json(driver.camera_info()),
        Commands::Grab { frames } => grab(&driver, frames).await,
        Commands::Live { duration } => live(&driver, duration).await,
    };
    let closed = driver.shutdown().await;
    result.and(closed)
}

#[derive(Serialize)]
struct FrameSummary {
    frame_number: u64,
    width: u32,
    height: u32,
    bit_depth: u16,
    min: u16,
    max: u16,
    mean: f64,
}

impl From<&Frame> for FrameSummary {
    fn from(frame: &Frame) -> Self {
        Self {
            frame_number: frame.frame_number,
            width: frame.width,
            height: frame.height,
            bit_depth: frame.bit_depth,
            min: frame.data.iter().copied().min().unwrap_or(0),
            max: frame.data.iter().copied().max().unwrap_or(0),
            mean: frame.mean(),
        }
    }
}

async fn grab<S: PcoSdk + 'static>(driver: &PcoDriver<S>, frames: usize) -> Result<()> {
    let start = Instant::now();
    let captured = driver.capture(frames).await?;
    info!(frames = captured.len(), elapsed = ?start.elapsed(), "Capture complete");
    for frame in &captured {
        print_json(&FrameSummary::from(frame))?;
    }
    Ok(())
}

#[derive(Serialize)]
struct LiveReport {
    requested_rate_hz: f64,
    applied_rate_hz: f64,
    frames: u64,
    dropped: u64,
    elapsed_s: f64,
    measured_rate_hz: f64,
}

async fn live<S: PcoSdk + 'static>(driver: &PcoDriver<S>, duration: Duration) -> Result<()> {
    let mut rx = driver.subscribe_frames();
    let applied = driver.start_stream().await?;
    let requested = driver
        .config()
        .frame_rate
        .map_or(applied.rate_hz, |r| r.rate_hz);

    let start = Instant::now();
    let deadline = tokio::time::sleep(duration);
    tokio::pin!(deadline);
    let mut frames = 0u64;
    let mut dropped = 0u64;

    loop {
        tokio::select! {
            _ = &mut deadline => break,
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
            received = rx.recv() => match received {
                Ok(_) => frames += 1,
                Err(RecvError::Lagged(n)) => {
                    warn!(skipped = n, "Frame receiver lagged");
                    dropped += n;
                }
                Err(RecvError::Closed) => break,
            },
        }
        if !driver.is_streaming() {
            warn!("Stream stopped unexpectedly");
            break;
        }
    }

    let elapsed = start.elapsed();
    driver.stop_stream().await?;

    let elapsed_s = elapsed.as_secs_f64();
    print_json(&LiveReport {
        requested_rate_hz: requested,
        applied_rate_hz: applied.rate_hz,
        frames,
        dropped,
        elapsed_s,
        measured_rate_hz: if elapsed_s > 0.0 {
            (frames + dropped) as f64 / elapsed_s
        } else {
            0.0
        },
    })
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let line = serde_json::to_string(value).context("failed to serialize output")?;
    println!("{line}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn live_duration(arg: &str) -> Duration {
        let cli = Cli::try_parse_from(["pco-capture", "live", "--duration", arg]).unwrap();
        match cli.command {
            Commands::Live { duration } => duration,
            _ => panic!("expected live command"),
        }
    }

    #[test]
    fn test_live_duration_uses_config_syntax() {
        assert_eq!(live_duration("5s"), Duration::from_secs(5));
        assert_eq!(live_duration("250ms"), Duration::from_millis(250));
        assert_eq!(live_duration("1s 500ms"), Duration::from_millis(1500));
        assert_eq!(live_duration("100us"), Duration::from_micros(100));
        assert_eq!(live_duration("1min"), Duration::from_secs(60));
        assert!(Cli::try_parse_from(["pco-capture", "live", "--duration", "fast"]).is_err());
        assert!(Cli::try_parse_from(["pco-capture", "live", "--duration", "2"]).is_err());
    }

    #[test]
    fn test_live_duration_default() {
        let cli = Cli::try_parse_from(["pco-capture", "live"]).unwrap();
        assert!(matches!(cli.command, Commands::Live { duration } if duration == Duration::from_secs(5)));
    }

    #[test]
    fn test_cli_parses() {
        let cli = Cli::try_parse_from(["pco-capture", "grab", "--frames", "4"]).unwrap();
        assert!(matches!(cli.command, Commands::Grab { frames: 4 }));

        let cli = Cli::try_parse_from([
            "pco-capture",
            "live",
            "--duration",
            "500ms",
            "--log-format",
            "json",
        ])
        .unwrap();
        assert_eq!(cli.log_format, Some(OutputFormat::Json));
        assert!(matches!(
            cli.command,
            Commands::Live { duration } if duration == Duration::from_millis(500)
        ));
    }
}
