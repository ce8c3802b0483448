//! telemetry.rs
//!
//! Lightweight JSONL event sink.
//!
//! One JSON object per line from the trainer: episodes, evaluations,
//! checkpoint saves, early stops and the end-of-run summary. The inference
//! service reports through its own counters instead. Controlled through
//! environment variables so runs can turn it on without code changes.
//!
//! # Environment variables
//!
//! - `SATPOWER_TELEMETRY_MODE`: `"off"` (default) or `"jsonl"`.
//! - `SATPOWER_TELEMETRY_PATH`: JSONL file, required when mode is `"jsonl"`.
//! - `SATPOWER_TELEMETRY_APPEND`: `"1"`/`"true"`/`"yes"` appends instead of
//!   truncating.
//!
//! Every record gets `schema_version` and `event` fields.

use std::env;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use serde::Serialize;
use serde_json::{Map, Value as JsonValue};

pub const SCHEMA_VERSION: i64 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TelemetryMode {
    Off,
    Jsonl,
}

impl TelemetryMode {
    /// Parse mode from environment. Defaults to Off.
    pub fn from_env() -> Self {
        match env::var("SATPOWER_TELEMETRY_MODE") {
            Ok(s) if s.eq_ignore_ascii_case("jsonl") => TelemetryMode::Jsonl,
            _ => TelemetryMode::Off,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub mode: TelemetryMode,
    pub path: Option<PathBuf>,
    pub append: bool,
}

impl TelemetryConfig {
    pub fn from_env() -> Self {
        let mode = TelemetryMode::from_env();
        let path = if mode == TelemetryMode::Jsonl {
            env::var("SATPOWER_TELEMETRY_PATH").ok().map(PathBuf::from)
        } else {
            None
        };
        let append = env::var("SATPOWER_TELEMETRY_APPEND")
            .ok()
            .map(|value| matches!(value.to_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);
        TelemetryConfig { mode, path, append }
    }

    pub fn jsonl(path: impl Into<PathBuf>) -> Self {
        TelemetryConfig {
            mode: TelemetryMode::Jsonl,
            path: Some(path.into()),
            append: false,
        }
    }
}

/// JSONL sink; every method is a no-op while mode is Off.
///
/// The file is opened lazily on the first record. If it cannot be opened the
/// sink switches itself off with a single warning.
pub struct TelemetrySink {
    mode: TelemetryMode,
    path: Option<PathBuf>,
    append: bool,
    writer: Option<BufWriter<File>>,
    records: u64,
}

impl TelemetrySink {
    pub fn from_env() -> Self {
        Self::from_config(TelemetryConfig::from_env())
    }

    pub fn from_config(cfg: TelemetryConfig) -> Self {
        TelemetrySink {
            mode: cfg.mode,
            path: cfg.path,
            append: cfg.append,
            writer: None,
            records: 0,
        }
    }

    pub fn disabled() -> Self {
        Self::from_config(TelemetryConfig {
            mode: TelemetryMode::Off,
            path: None,
            append: false,
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.mode == TelemetryMode::Jsonl
    }

    pub fn records_written(&self) -> u64 {
        self.records
    }

    fn ensure_writer(&mut self) -> Option<&mut BufWriter<File>> {
        if self.mode != TelemetryMode::Jsonl {
            return None;
        }

        if self.writer.is_none() {
            let path = match &self.path {
                Some(p) => p.clone(),
                None => {
                    eprintln!("[telemetry] WARN: jsonl mode without SATPOWER_TELEMETRY_PATH; disabled");
                    self.mode = TelemetryMode::Off;
                    return None;
                }
            };
            if let Some(parent) = path.parent() {
                let _ = std::fs::create_dir_all(parent);
            }

            let mut options = OpenOptions::new();
            options.create(true);
            if self.append {
                options.append(true);
            } else {
                options.write(true).truncate(true);
            }
            match options.open(&path) {
                Ok(f) => self.writer = Some(BufWriter::new(f)),
                Err(e) => {
                    eprintln!(
                        "[telemetry] WARN: could not open {}: {}; disabled",
                        path.display(),
                        e
                    );
                    self.mode = TelemetryMode::Off;
                    return None;
                }
            }
        }

        self.writer.as_mut()
    }

    /// Write one event. `fields` must serialise to a JSON object.
    pub fn log_event<T: Serialize>(&mut self, event: &str, fields: &T) {
        if self.mode == TelemetryMode::Off {
            return;
        }
        let mut map = match serde_json::to_value(fields) {
            Ok(JsonValue::Object(map)) => map,
            Ok(other) => {
                let mut map = Map::new();
                map.insert("value".to_string(), other);
                map
            }
            Err(e) => {
                eprintln!("[telemetry] WARN: dropping '{event}' record: {e}");
                return;
            }
        };
        map.insert("schema_version".to_string(), JsonValue::from(SCHEMA_VERSION));
        map.insert("event".to_string(), JsonValue::from(event));
        self.log_json(&JsonValue::Object(map));
    }

    pub fn log_json(&mut self, value: &JsonValue) {
        let ok = match self.ensure_writer() {
            Some(writer) => serde_json::to_writer(&mut *writer, value).is_ok() && writer.write_all(b"\n").is_ok(),
            None => return,
        };
        if ok {
            self.records += 1;
        }
    }

    pub fn flush(&mut self) {
        if let Some(w) = self.writer.as_mut() {
            let _ = w.flush();
        }
    }
}

impl Drop for TelemetrySink {
    fn drop(&mut self) {
        self.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_disabled_sink_writes_nothing() {
        let mut sink = TelemetrySink::disabled();
        sink.log_event("episode", &json!({"episode": 1}));
        assert_eq!(sink.records_written(), 0);
        assert!(!sink.is_enabled());
    }

    #[test]
    fn test_jsonl_records_carry_schema_and_event() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("telemetry").join("events.jsonl");
        {
            let mut sink = TelemetrySink::from_config(TelemetryConfig::jsonl(&path));
            sink.log_event("episode", &json!({"episode": 3, "reward": -1.5}));
            sink.log_event("fallback", &json!({"reason": "timeout"}));
            assert_eq!(sink.records_written(), 2);
        }
        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<JsonValue> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["schema_version"], 1);
        assert_eq!(lines[0]["event"], "episode");
        assert_eq!(lines[1]["reason"], "timeout");
    }
}
