// src/rl/history.rs
//
// Append-only training history: one JSON line per finished episode.
//
// The file is opened in append mode and never truncated, so a resumed run
// extends the history of the run it resumes.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// One line of the history log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeRecord {
    pub episode: u64,
    pub reward: f64,
    /// Mean update loss; null when no update ran this episode.
    pub loss: Option<f64>,
    pub epsilon: f64,
    pub power_savings_pct: f64,
    pub violation_rate: f64,
    pub outage_rate: f64,
    pub steps: usize,
    pub mean_tx_power_dbm: f64,
    pub mean_rsrp_dbm: f64,
    pub termination_reason: Option<String>,
    pub train_steps: u64,
}

pub struct HistoryLog {
    path: PathBuf,
    writer: BufWriter<File>,
    written: u64,
}

impl HistoryLog {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
            }
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open history log: {}", path.display()))?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
            written: 0,
        })
    }

    /// Append and flush one record.
    pub fn append(&mut self, record: &EpisodeRecord) -> Result<()> {
        serde_json::to_writer(&mut self.writer, record)
            .with_context(|| format!("Failed to serialise history record {}", record.episode))?;
        self.writer.write_all(b"\n")?;
        self.writer
            .flush()
            .with_context(|| format!("Failed to flush {}", self.path.display()))?;
        self.written += 1;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Records appended through this handle.
    pub fn records_written(&self) -> u64 {
        self.written
    }
}

impl Drop for HistoryLog {
    fn drop(&mut self) {
        let _ = self.writer.flush();
    }
}

/// Read every record of a history file, in file order.
pub fn read_history(path: &Path) -> Result<Vec<EpisodeRecord>> {
    let file =
        File::open(path).with_context(|| format!("Failed to open history log: {}", path.display()))?;
    let mut out = Vec::new();
    for (i, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record: EpisodeRecord = serde_json::from_str(&line)
            .with_context(|| format!("Bad history line {} in {}", i + 1, path.display()))?;
        out.push(record);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(episode: u64) -> EpisodeRecord {
        EpisodeRecord {
            episode,
            reward: -3.5,
            loss: if episode == 0 { None } else { Some(0.25) },
            epsilon: 0.9,
            power_savings_pct: 12.0,
            violation_rate: 0.1,
            outage_rate: 0.0,
            steps: 20,
            mean_tx_power_dbm: 25.0,
            mean_rsrp_dbm: -96.0,
            termination_reason: Some("EpisodeLength".to_string()),
            train_steps: episode * 5,
        }
    }

    #[test]
    fn test_append_only_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("history.jsonl");
        {
            let mut log = HistoryLog::open(&path).unwrap();
            log.append(&record(0)).unwrap();
            log.append(&record(1)).unwrap();
            assert_eq!(log.records_written(), 2);
        }
        {
            let mut log = HistoryLog::open(&path).unwrap();
            log.append(&record(2)).unwrap();
        }
        let records = read_history(&path).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0], record(0));
        assert_eq!(records[2].episode, 2);
        assert!(records[0].loss.is_none());
    }

    #[test]
    fn test_line_has_required_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.jsonl");
        let mut log = HistoryLog::open(&path).unwrap();
        log.append(&record(1)).unwrap();
        drop(log);
        let text = fs::read_to_string(&path).unwrap();
        let v: serde_json::Value = serde_json::from_str(text.lines().next().unwrap()).unwrap();
        for key in ["episode", "reward", "loss", "epsilon", "power_savings_pct", "violation_rate"] {
            assert!(v.get(key).is_some(), "missing {key}");
        }
    }
}
