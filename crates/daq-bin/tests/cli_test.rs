//! End-to-end tests of the `pco-capture` binary against the mock camera.
//!
//! Run with: cargo test -p daq-bin --test cli_test

use std::io::Write;
use std::process::{Command, Output};

const SMALL_CAMERA: &str = r#"
[camera]
mock = true
exposure = "2ms"
roi = { x0 = 0, y0 = 0, x1 = 64, y1 = 32 }

[logging]
level = "warn"
"#;

fn write_config(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

fn pco_capture(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_pco-capture"))
        .args(args)
        .output()
        .expect("Failed to execute pco-capture")
}

fn json_lines(output: &Output) -> Vec<serde_json::Value> {
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(|line| serde_json::from_str(line).expect("stdout line is JSON"))
        .collect()
}

// =============================================================================
// CLI Tests
// =============================================================================

#[test]
fn test_help_lists_commands() {
    let output = pco_capture(&["--help"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for command in ["info", "grab", "live"] {
        assert!(stdout.contains(command), "help should mention {command}");
    }
}

#[test]
fn test_missing_config_fails() {
    let output = pco_capture(&["--config", "/nonexistent/pco.toml", "info"]);
    assert!(!output.status.success());
}

// =============================================================================
// Acquisition Tests
// =============================================================================

#[test]
fn test_info_prints_capabilities() {
    let config = write_config(SMALL_CAMERA);
    let output = pco_capture(&["--config", config.path().to_str().unwrap(), "info"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let lines = json_lines(&output);
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0]["max_width"], 2560);
    assert_eq!(lines[0]["bit_depth"], 16);
}

#[test]
fn test_grab_prints_one_line_per_frame() {
    let config = write_config(SMALL_CAMERA);
    let output = pco_capture(&[
        "--config",
        config.path().to_str().unwrap(),
        "grab",
        "--frames",
        "3",
    ]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let lines = json_lines(&output);
    assert_eq!(lines.len(), 3);
    for (i, line) in lines.iter().enumerate() {
        assert_eq!(line["frame_number"], i as u64);
        assert_eq!(line["width"], 64);
        assert_eq!(line["height"], 32);
    }
}

#[test]
fn test_live_reports_frames() {
    let config = write_config(SMALL_CAMERA);
    let output = pco_capture(&[
        "--config",
        config.path().to_str().unwrap(),
        "live",
        "--duration",
        "300ms",
    ]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let lines = json_lines(&output);
    assert_eq!(lines.len(), 1);
    assert!(lines[0]["frames"].as_u64().unwrap() > 0);
    assert_eq!(lines[0]["applied_rate_hz"], 10.0);
}
