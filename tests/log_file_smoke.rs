#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::fs;
use std::path::{Path, PathBuf};

use citrus_farms_lib::logging::{self, LOG_FILE_PREFIX};
use serde_json::Value;

fn log_files(dir: &Path) -> Vec<PathBuf> {
    fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(Result::ok)
                .map(|entry| entry.path())
                .filter(|path| {
                    path.file_name()
                        .and_then(|name| name.to_str())
                        .is_some_and(|name| name.starts_with(LOG_FILE_PREFIX))
                })
                .collect()
        })
        .unwrap_or_default()
}

#[test]
fn file_sink_writes_json_lines() {
    let tmp = tempfile::tempdir().unwrap();
    let logs_dir = tmp.path().join("logs");

    let guard = logging::init("citrus_farms=debug", Some(&logs_dir)).expect("init logging");
    assert!(logs_dir.is_dir(), "logs dir missing: {logs_dir:?}");

    tracing::info!(target: "citrus_farms", event = "smoke_test", marker = "first");
    tracing::debug!(target: "other_crate", event = "filtered_out");
    drop(guard);

    let files = log_files(&logs_dir);
    assert_eq!(files.len(), 1, "expected one daily log file, got {files:?}");
    let contents = fs::read_to_string(&files[0]).expect("read log file");
    let records: Vec<Value> = contents
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).expect("json log line"))
        .collect();

    let smoke = records
        .iter()
        .find(|record| record["fields"]["event"] == "smoke_test")
        .expect("smoke record present");
    assert_eq!(smoke["level"], "INFO");
    assert_eq!(smoke["target"], "citrus_farms");
    assert_eq!(smoke["fields"]["marker"], "first");
    assert!(smoke["timestamp"].as_str().is_some_and(|ts| ts.ends_with('Z')));

    assert!(!records
        .iter()
        .any(|record| record["fields"]["event"] == "filtered_out"));
}
