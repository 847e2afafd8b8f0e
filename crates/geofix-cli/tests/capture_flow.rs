//! End-to-end tests for the capture pipeline binary.
//!
//! Tests the full flow: read capture files → merge into datasets →
//! correlate → print or export. Each test spawns the real binary with an
//! isolated HOME so no host configuration leaks in.

use std::path::{Path, PathBuf};
use std::process::Command;

use serde_json::json;
use tempfile::TempDir;

fn geofix_binary() -> String {
    env!("CARGO_BIN_EXE_geofix").to_string()
}

/// A command with configuration lookup pinned to the given home directory.
fn geofix(home: &Path) -> Command {
    let mut command = Command::new(geofix_binary());
    command.env("HOME", home).env_remove("XDG_CONFIG_HOME");
    command
}

fn write_capture(dir: &Path, name: &str, value: serde_json::Value) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, value.to_string()).unwrap();
    path
}

/// Two GPS fixes bracketing one call, with full identity metadata.
fn device_a(dir: &Path) -> PathBuf {
    write_capture(
        dir,
        "a.json",
        json!({
            "capture": {
                "subscriber": {
                    "imei": "352093052662768",
                    "imsi": "240080000000001",
                    "Platform": "Android",
                    "model": "GT-I9100",
                    "OS": "4.0.3",
                    "start": "2013-01-13 13:13:00 UTC"
                },
                "events-metadata": [
                    {"gps": ["timeoffset", "latitude", "longitude"]},
                    {"call": ["timeoffset", "status", "number"]}
                ],
                "events": [
                    {"gps": 2, "values": [0, 56.1, 13.2, 30000, 56.2, 13.3]},
                    {"call": 1, "values": [15000, "MT call", "5551234"]}
                ]
            }
        }),
    )
}

/// A second device with a single fix the next morning.
fn device_b(dir: &Path) -> PathBuf {
    write_capture(
        dir,
        "b.json",
        json!({
            "capture": {
                "subscriber": {
                    "imei": "353000000000002",
                    "imsi": "240080000000002",
                    "start": "2013-01-14 09:00:00 UTC"
                },
                "events-metadata": [
                    {"gps": ["timeoffset", "latitude", "longitude"]}
                ],
                "events": [
                    {"gps": 1, "values": [0, 57.0, 12.0]}
                ]
            }
        }),
    )
}

#[test]
fn test_info_lists_each_device_with_no_errors() {
    let temp = TempDir::new().unwrap();
    let first = device_a(temp.path());
    let second = device_b(temp.path());

    let output = geofix(temp.path())
        .arg("info")
        .arg(&first)
        .arg(&second)
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "info should succeed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Dataset 352093052662768"));
    assert!(stdout.contains("Dataset 353000000000002"));
    assert!(stdout.contains("  Events: 3"));
    assert!(stdout.contains("  Types: call (1), gps (2)"));
    assert!(stdout.contains("No data errors."));
}

#[test]
fn test_combine_all_merges_every_device() {
    let temp = TempDir::new().unwrap();
    let first = device_a(temp.path());
    let second = device_b(temp.path());

    let output = geofix(temp.path())
        .arg("info")
        .arg("--combine-all")
        .arg(&first)
        .arg(&second)
        .output()
        .unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Dataset all"));
    assert!(stdout.contains("  Files: 2"));
    assert!(stdout.contains("  Events: 4"));
    assert!(!stdout.contains("Dataset 352093052662768"));
}

/// Defaults layer in order: home config file, then `--config`, then
/// environment variables.
#[test]
fn test_config_layers_stack_in_precedence_order() {
    let temp = TempDir::new().unwrap();
    let first = device_a(temp.path());
    let second = device_b(temp.path());

    let config_dir = temp.path().join(".config/geofix");
    std::fs::create_dir_all(&config_dir).unwrap();
    std::fs::write(config_dir.join("config.toml"), "combine_all = true\n").unwrap();

    let output = geofix(temp.path())
        .arg("info")
        .arg(&first)
        .arg(&second)
        .output()
        .unwrap();
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("Dataset all"));

    // An explicit config file overrides the home one.
    let explicit = temp.path().join("explicit.toml");
    std::fs::write(&explicit, "combine_all = false\n").unwrap();
    let output = geofix(temp.path())
        .arg("--config")
        .arg(&explicit)
        .arg("info")
        .arg(&first)
        .arg(&second)
        .output()
        .unwrap();
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("Dataset 352093052662768"));

    // Environment variables override every file.
    let output = geofix(temp.path())
        .env("GEOFIX_COMBINE_ALL", "false")
        .arg("info")
        .arg(&first)
        .arg(&second)
        .output()
        .unwrap();
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("Dataset 352093052662768"));
}

/// Two files of the same device merge into one dataset, sorted by time
/// across file boundaries.
#[test]
fn test_events_merge_files_of_one_device_in_time_order() {
    let temp = TempDir::new().unwrap();
    let late = device_a(temp.path());
    let early = write_capture(
        temp.path(),
        "a_earlier.json",
        json!({
            "capture": {
                "subscriber": {
                    "imei": "352093052662768",
                    "start": "2013-01-13 13:12:00 UTC"
                },
                "events-metadata": [
                    {"sms": ["timeoffset", "status", "number"]}
                ],
                "events": [
                    {"sms": 1, "values": [0, "SMS received", "5550000"]}
                ]
            }
        }),
    );

    let output = geofix(temp.path())
        .arg("events")
        .arg(&late)
        .arg(&early)
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "events should succeed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let stdout = String::from_utf8_lossy(&output.stdout);
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 4);
    // The second file's sms predates everything in the first.
    assert!(lines[0].starts_with("2013-01-13 13:12:00.000 352093052662768 sms"));
    assert!(lines[1].contains(" gps "));
    assert!(lines[2].contains(" call "));

    let output = geofix(temp.path())
        .arg("events")
        .arg("--kind")
        .arg("call")
        .arg(&late)
        .arg(&early)
        .output()
        .unwrap();
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.lines().count(), 1);
    assert!(stdout.contains(" call "));

    let output = geofix(temp.path())
        .arg("events")
        .arg("-n")
        .arg("2")
        .arg(&late)
        .arg(&early)
        .output()
        .unwrap();
    assert_eq!(String::from_utf8_lossy(&output.stdout).lines().count(), 2);
}

#[test]
fn test_events_json_emits_one_object_per_line() {
    let temp = TempDir::new().unwrap();
    let capture = device_a(temp.path());

    let output = geofix(temp.path())
        .arg("events")
        .arg("--json")
        .arg(&capture)
        .output()
        .unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 3);
    for line in &lines {
        let event: serde_json::Value = serde_json::from_str(line).unwrap();
        assert_eq!(event["device"].as_str(), Some("352093052662768"));
        assert!(event["kind"].is_string());
    }
    let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
    assert_eq!(first["kind"].as_str(), Some("gps"));
}

#[test]
fn test_export_writes_tab_separated_rows_to_stdout() {
    let temp = TempDir::new().unwrap();
    let capture = device_a(temp.path());

    let output = geofix(temp.path())
        .arg("export")
        .arg(&capture)
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "export should succeed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let stdout = String::from_utf8_lossy(&output.stdout);
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 4);
    assert_eq!(
        lines[0],
        "Time\tEvent\tLatitude\tLongitude\tcall.number\tcall.status\tgps.latitude\tgps.longitude"
    );
    assert_eq!(
        lines[1],
        "2013-01-13 13:13:00.000\tgps\t56.1\t13.2\t\t\t56.1\t13.2"
    );
    // The call sits 15s from both fixes; the tie resolves to the earlier one.
    assert!(lines[2].contains("\tcall\t56.1\t13.2\t5551234\tMT call"));
}

#[test]
fn test_export_out_directory_names_files_by_dataset_and_type() {
    let temp = TempDir::new().unwrap();
    let capture = device_a(temp.path());

    let shared = temp.path().join("out");
    let output = geofix(temp.path())
        .arg("export")
        .arg("--out")
        .arg(&shared)
        .arg(&capture)
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "export should succeed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let rows = std::fs::read_to_string(shared.join("352093052662768.csv")).unwrap();
    assert_eq!(rows.lines().count(), 4);

    let split = temp.path().join("out_separate");
    let output = geofix(temp.path())
        .arg("export")
        .arg("--separate")
        .arg("--out")
        .arg(&split)
        .arg(&capture)
        .output()
        .unwrap();
    assert!(output.status.success());
    let gps = std::fs::read_to_string(split.join("352093052662768_gps.csv")).unwrap();
    let call = std::fs::read_to_string(split.join("352093052662768_call.csv")).unwrap();
    assert_eq!(gps.lines().count(), 3);
    assert_eq!(call.lines().count(), 2);
    assert!(call.lines().next().unwrap().ends_with("status\tnumber"));
}

#[test]
fn test_extended_export_adds_identity_columns() {
    let temp = TempDir::new().unwrap();
    let capture = device_a(temp.path());

    let output = geofix(temp.path())
        .arg("export")
        .arg("--extended")
        .arg(&capture)
        .output()
        .unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    let header = stdout.lines().next().unwrap();
    assert!(header.contains(
        "Latitude\tLongitude\tDevice\tSubscriber\tMCC\tMNC\tLAC\tCI\tLAC-CI\tRSSI\tPlatform\tModel\tOS\tOperator"
    ));
    // Every row carries the device and subscriber identity.
    for row in stdout.lines().skip(1) {
        assert!(row.contains("\t352093052662768\t240080000000001\t"));
    }
}

#[test]
fn test_time_range_flag_filters_the_merge() {
    let temp = TempDir::new().unwrap();
    let capture = device_a(temp.path());

    let output = geofix(temp.path())
        .arg("info")
        .arg("-t")
        .arg("2014-06-01..2014-06-02")
        .arg(&capture)
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("  Events: 0"));
    assert!(!stdout.contains("Span:"));

    let output = geofix(temp.path())
        .arg("info")
        .arg("-t")
        .arg("2013-01-13")
        .arg(&capture)
        .output()
        .unwrap();
    assert!(String::from_utf8_lossy(&output.stdout).contains("  Events: 3"));
}

#[test]
fn test_malformed_location_filter_fails_with_context() {
    let temp = TempDir::new().unwrap();
    let capture = device_a(temp.path());

    let output = geofix(temp.path())
        .arg("info")
        .arg("-l")
        .arg("not-a-place")
        .arg(&capture)
        .output()
        .unwrap();
    assert!(!output.status.success(), "bad location filter should fail");
    assert!(
        String::from_utf8_lossy(&output.stderr).contains("invalid location filter"),
        "stderr should name the bad filter: {}",
        String::from_utf8_lossy(&output.stderr)
    );
}

#[test]
fn test_unreadable_captures_fail_the_run() {
    let temp = TempDir::new().unwrap();

    let output = geofix(temp.path())
        .arg("info")
        .arg(temp.path().join("missing.json"))
        .output()
        .unwrap();
    assert!(!output.status.success(), "missing file should fail");
    assert!(String::from_utf8_lossy(&output.stderr).contains("failed to read captures"));

    let garbled = temp.path().join("garbled.json");
    std::fs::write(&garbled, "{\"capture\": ").unwrap();
    let output = geofix(temp.path()).arg("info").arg(&garbled).output().unwrap();
    assert!(!output.status.success(), "truncated JSON should fail");
    assert!(String::from_utf8_lossy(&output.stderr).contains("failed to read captures"));
}

#[test]
fn test_traces_split_on_distance_unless_widened() {
    let temp = TempDir::new().unwrap();
    // Two clusters half a degree apart.
    let walk = write_capture(
        temp.path(),
        "walk.json",
        json!({
            "capture": {
                "subscriber": {"imei": "352093052662768", "start": "2013-01-13 13:13:00 UTC"},
                "events-metadata": [
                    {"gps": ["timeoffset", "latitude", "longitude"]}
                ],
                "events": [
                    {"gps": 4, "values": [
                        0, 56.1, 13.2,
                        10000, 56.1005, 13.2,
                        20000, 56.6, 13.2,
                        30000, 56.6005, 13.2
                    ]}
                ]
            }
        }),
    );

    let output = geofix(temp.path()).arg("traces").arg(&walk).output().unwrap();
    assert!(
        output.status.success(),
        "traces should succeed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Trace 0: 2 points (2 pushed)"));
    assert!(stdout.contains("Trace 1: 2 points (2 pushed)"));
    assert!(stdout.contains("Canvas 800x800:"));

    let output = geofix(temp.path())
        .arg("traces")
        .arg("--max-gap-degrees")
        .arg("1.0")
        .arg(&walk)
        .output()
        .unwrap();
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Trace 0: 4 points"));
    assert!(!stdout.contains("Trace 1:"));
}

#[test]
fn test_stats_chart_fields_under_the_diversity_gate() {
    let temp = TempDir::new().unwrap();
    let signals = write_capture(
        temp.path(),
        "signals.json",
        json!({
            "capture": {
                "subscriber": {"imei": "352093052662768", "start": "2013-01-13 13:13:00 UTC"},
                "events-metadata": [
                    {"signal": ["timeoffset", "strength"]}
                ],
                "events": [
                    {"signal": 4, "values": [0, -71, 1000, -71, 2000, -110, 3000, -9]}
                ]
            }
        }),
    );

    // Small samples are inherently diverse; open the gate fully.
    let output = geofix(temp.path())
        .arg("stats")
        .arg("--max-diversity")
        .arg("100")
        .arg(&signals)
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "stats should succeed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("signal.strength (4 samples, numeric):"));
    assert!(stdout.contains("    -71: 2"));

    // Default gates flag the same field as too diverse instead.
    let output = geofix(temp.path()).arg("stats").arg(&signals).output().unwrap();
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("too diverse"));
    assert!(!stdout.contains("    -71: 2"));
}
