// src/rl/checkpoint.rs
//
// Versioned training checkpoints.
//
// File layout:
//
//     magic      8 bytes   "SATPWRCK"
//     version    u32 LE    CHECKPOINT_VERSION
//     header_len u64 LE
//     header     JSON      CheckpointHeader
//     sections   bytes     value net | target net | optimizer state
//
// The header records the length and SHA-256 of each section plus the
// network layout, so a truncated, corrupt or mismatched file is rejected
// instead of partially loaded. Unknown versions are rejected before the
// header is parsed.
//
// Writes go to a temp file in the destination directory and are renamed
// into place, so readers never see a partial checkpoint.

use std::fmt;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use burn::module::Module;
use burn::optim::Optimizer;
use burn::record::{BinBytesRecorder, FullPrecisionSettings, Recorder};
use burn::tensor::backend::{AutodiffBackend, Backend};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::agent::{exploration_rng, weight_init_rng, AgentSettings, DqnAgent, QOptimizer};
use super::network::{QNetwork, QNetworkConfig, QNetworkRecord};
use crate::channel::{ObservationBounds, ACTION_VERSION, OBS_VERSION};
use crate::config::{BaselineConfig, ChannelConfig, Config};

pub const CHECKPOINT_MAGIC: &[u8; 8] = b"SATPWRCK";

/// Bump on any backward-incompatible layout change.
pub const CHECKPOINT_VERSION: u32 = 1;

const SECTION_VALUE: &str = "value_net";
const SECTION_TARGET: &str = "target_net";
const SECTION_OPTIMIZER: &str = "optimizer";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionInfo {
    pub name: String,
    pub len: u64,
    pub sha256: String,
}

/// Everything needed to rebuild an agent or a serving network.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointHeader {
    pub obs_version: u32,
    pub action_version: u32,
    pub network: QNetworkConfig,
    pub epsilon: f64,
    pub train_steps: u64,
    pub episodes_completed: u64,
    /// `Config::training_fingerprint` of the writing run.
    pub config_fingerprint: String,
    pub channel: ChannelConfig,
    pub target_rsrp: f64,
    pub rsrp_violation_threshold: f64,
    pub baseline: BaselineConfig,
    pub created_unix_ms: u64,
    pub sections: Vec<SectionInfo>,
}

impl CheckpointHeader {
    pub fn bounds(&self) -> ObservationBounds {
        ObservationBounds::from_channel(&self.channel)
    }

    /// Whether `cfg` trains the same way as the run that wrote this header.
    pub fn same_training_config(&self, cfg: &Config) -> bool {
        self.config_fingerprint == cfg.training_fingerprint()
    }
}

/// In-memory checkpoint: header plus the three binary record sections.
#[derive(Debug, Clone)]
pub struct Checkpoint {
    pub header: CheckpointHeader,
    pub value_weights: Vec<u8>,
    pub target_weights: Vec<u8>,
    pub optimizer_state: Vec<u8>,
}

impl Checkpoint {
    /// Snapshot the agent's networks, optimizer and counters.
    pub fn capture<B: AutodiffBackend>(
        agent: &DqnAgent<B>,
        episodes_completed: u64,
        cfg: &Config,
    ) -> Result<Self, CheckpointError> {
        let recorder = BinBytesRecorder::<FullPrecisionSettings>::default();
        let value_weights = recorder
            .record(agent.value_network().into_record(), ())
            .map_err(record_error)?;
        let target_weights = recorder
            .record(agent.target_network().clone().into_record(), ())
            .map_err(record_error)?;
        let optimizer_state = recorder
            .record(agent.optimizer().to_record(), ())
            .map_err(record_error)?;

        let sections = vec![
            section_info(SECTION_VALUE, &value_weights),
            section_info(SECTION_TARGET, &target_weights),
            section_info(SECTION_OPTIMIZER, &optimizer_state),
        ];
        let created_unix_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);

        Ok(Self {
            header: CheckpointHeader {
                obs_version: OBS_VERSION,
                action_version: ACTION_VERSION,
                network: agent.network_config(),
                epsilon: agent.epsilon(),
                train_steps: agent.train_steps(),
                episodes_completed,
                config_fingerprint: cfg.training_fingerprint(),
                channel: cfg.channel.clone(),
                target_rsrp: cfg.target_rsrp,
                rsrp_violation_threshold: cfg.rsrp_violation_threshold,
                baseline: cfg.baseline.clone(),
                created_unix_ms,
                sections,
            },
            value_weights,
            target_weights,
            optimizer_state,
        })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, CheckpointError> {
        let header = serde_json::to_vec(&self.header).map_err(|e| CheckpointError::Corrupt {
            reason: format!("header serialisation failed: {e}"),
        })?;
        let mut out = Vec::with_capacity(
            20 + header.len()
                + self.value_weights.len()
                + self.target_weights.len()
                + self.optimizer_state.len(),
        );
        out.extend_from_slice(CHECKPOINT_MAGIC);
        out.extend_from_slice(&CHECKPOINT_VERSION.to_le_bytes());
        out.extend_from_slice(&(header.len() as u64).to_le_bytes());
        out.extend_from_slice(&header);
        out.extend_from_slice(&self.value_weights);
        out.extend_from_slice(&self.target_weights);
        out.extend_from_slice(&self.optimizer_state);
        Ok(out)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CheckpointError> {
        let mut cursor = ByteCursor::new(bytes);

        let magic = cursor.take(CHECKPOINT_MAGIC.len(), "magic")?;
        if magic != CHECKPOINT_MAGIC {
            return Err(CheckpointError::Corrupt {
                reason: "not a satpower checkpoint (bad magic)".to_string(),
            });
        }
        let version = cursor.read_u32("version")?;
        if version != CHECKPOINT_VERSION {
            return Err(CheckpointError::UnsupportedVersion {
                found: version,
                supported: CHECKPOINT_VERSION,
            });
        }
        let header_len = cursor.read_u64("header length")?;
        let header_bytes = cursor.take(header_len as usize, "header")?;
        let header: CheckpointHeader =
            serde_json::from_slice(header_bytes).map_err(|e| CheckpointError::Corrupt {
                reason: format!("header parse failed: {e}"),
            })?;

        if header.obs_version != OBS_VERSION || header.action_version != ACTION_VERSION {
            return Err(CheckpointError::Incompatible {
                reason: format!(
                    "obs/action layout v{}/v{} but this build uses v{}/v{}",
                    header.obs_version, header.action_version, OBS_VERSION, ACTION_VERSION
                ),
            });
        }

        let mut sections = Vec::with_capacity(3);
        for expected in [SECTION_VALUE, SECTION_TARGET, SECTION_OPTIMIZER] {
            let info = header
                .sections
                .iter()
                .find(|s| s.name == expected)
                .ok_or_else(|| CheckpointError::Corrupt {
                    reason: format!("missing section '{expected}'"),
                })?;
            let data = cursor.take(info.len as usize, expected)?;
            let digest = hex::encode(Sha256::digest(data));
            if digest != info.sha256 {
                return Err(CheckpointError::Corrupt {
                    reason: format!("checksum mismatch in section '{expected}'"),
                });
            }
            sections.push(data.to_vec());
        }
        if !cursor.is_empty() {
            return Err(CheckpointError::Corrupt {
                reason: format!("{} trailing bytes", cursor.remaining()),
            });
        }

        let optimizer_state = sections.pop().unwrap_or_default();
        let target_weights = sections.pop().unwrap_or_default();
        let value_weights = sections.pop().unwrap_or_default();
        Ok(Self {
            header,
            value_weights,
            target_weights,
            optimizer_state,
        })
    }

    /// Write atomically to `path`, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), CheckpointError> {
        let bytes = self.to_bytes()?;
        atomic_write(path, &bytes).map_err(|e| CheckpointError::Io {
            path: path.display().to_string(),
            source: format!("{e:#}"),
        })
    }

    pub fn load(path: &Path) -> Result<Self, CheckpointError> {
        if !path.exists() {
            return Err(CheckpointError::Missing {
                path: path.display().to_string(),
            });
        }
        let bytes = fs::read(path).map_err(|e| CheckpointError::Io {
            path: path.display().to_string(),
            source: e.to_string(),
        })?;
        Self::from_bytes(&bytes)
    }

    /// Rebuild the value network on any backend.
    pub fn value_network<B: Backend>(&self, device: &B::Device) -> Result<QNetwork<B>, CheckpointError> {
        load_network(&self.header.network, &self.value_weights, device)
    }

    pub fn target_network<B: Backend>(&self, device: &B::Device) -> Result<QNetwork<B>, CheckpointError> {
        load_network(&self.header.network, &self.target_weights, device)
    }

    /// Rebuild a trainable agent for resuming under `cfg`.
    ///
    /// The network layout in `cfg` must match the checkpoint. The exploration
    /// stream is re-derived from the seed and the restored step count.
    pub fn restore_agent<B: AutodiffBackend>(
        &self,
        cfg: &Config,
        device: B::Device,
    ) -> Result<DqnAgent<B>, CheckpointError> {
        let settings = AgentSettings::from_config(cfg);
        let expected = settings.network_config();
        if !expected.same_shape(&self.header.network) {
            return Err(CheckpointError::Incompatible {
                reason: format!(
                    "network layout {:?} does not match configured {:?}",
                    self.header.network.hidden_layers, expected.hidden_layers
                ),
            });
        }

        let value_net: QNetwork<B> = self.value_network(&device)?;
        let target_net: QNetwork<B::InnerBackend> = self.target_network(&device)?;

        let recorder = BinBytesRecorder::<FullPrecisionSettings>::default();
        let optimizer_record: <QOptimizer<B> as Optimizer<QNetwork<B>, B>>::Record = recorder
            .load(self.optimizer_state.clone(), &device)
            .map_err(record_error)?;
        let optimizer = DqnAgent::<B>::fresh_optimizer(&settings).load_record(optimizer_record);

        let epsilon = self.header.epsilon.clamp(cfg.epsilon_end, cfg.epsilon_start.max(cfg.epsilon_end));
        Ok(DqnAgent::from_parts(
            settings,
            ObservationBounds::from_channel(&cfg.channel),
            device,
            value_net,
            target_net,
            optimizer,
            epsilon,
            self.header.train_steps,
            exploration_rng(cfg.seed.wrapping_add(self.header.train_steps)),
        ))
    }
}

fn load_network<B: Backend>(
    network: &QNetworkConfig,
    bytes: &[u8],
    device: &B::Device,
) -> Result<QNetwork<B>, CheckpointError> {
    let recorder = BinBytesRecorder::<FullPrecisionSettings>::default();
    let record: QNetworkRecord<B> = recorder
        .load(bytes.to_vec(), device)
        .map_err(record_error)?;
    // Init values are overwritten by the record.
    let net: QNetwork<B> = network.init(&mut weight_init_rng(0), device);
    Ok(net.load_record(record))
}

fn section_info(name: &str, data: &[u8]) -> SectionInfo {
    SectionInfo {
        name: name.to_string(),
        len: data.len() as u64,
        sha256: hex::encode(Sha256::digest(data)),
    }
}

fn record_error<E: fmt::Debug>(e: E) -> CheckpointError {
    CheckpointError::Record {
        reason: format!("{e:?}"),
    }
}

struct ByteCursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ByteCursor<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take(&mut self, n: usize, what: &str) -> Result<&'a [u8], CheckpointError> {
        let end = self.pos.checked_add(n).filter(|end| *end <= self.bytes.len());
        match end {
            Some(end) => {
                let out = &self.bytes[self.pos..end];
                self.pos = end;
                Ok(out)
            }
            None => Err(CheckpointError::Corrupt {
                reason: format!("truncated while reading {what}"),
            }),
        }
    }

    fn read_u32(&mut self, what: &str) -> Result<u32, CheckpointError> {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(self.take(4, what)?);
        Ok(u32::from_le_bytes(buf))
    }

    fn read_u64(&mut self, what: &str) -> Result<u64, CheckpointError> {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(self.take(8, what)?);
        Ok(u64::from_le_bytes(buf))
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn is_empty(&self) -> bool {
        self.remaining() == 0
    }
}

/// Atomically write bytes to a file.
///
/// The temp file is created in the same directory so the rename stays on
/// one filesystem.
pub fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent)
        .with_context(|| format!("Failed to create directory: {}", parent.display()))?;

    let temp_name = format!(
        ".tmp_{}_{}",
        std::process::id(),
        path.file_name()
            .map(|s| s.to_string_lossy())
            .unwrap_or_default()
    );
    let temp_path = parent.join(&temp_name);

    let mut file = File::create(&temp_path)
        .with_context(|| format!("Failed to create temp file: {}", temp_path.display()))?;
    file.write_all(data)
        .with_context(|| format!("Failed to write temp file: {}", temp_path.display()))?;
    file.sync_all()
        .with_context(|| format!("Failed to sync temp file: {}", temp_path.display()))?;
    drop(file);

    fs::rename(&temp_path, path).with_context(|| {
        format!(
            "Failed to rename {} to {}",
            temp_path.display(),
            path.display()
        )
    })?;
    Ok(())
}

/// Checkpoint load/save failures.
#[derive(Debug, Clone, PartialEq)]
pub enum CheckpointError {
    Missing { path: String },
    Io { path: String, source: String },
    Corrupt { reason: String },
    UnsupportedVersion { found: u32, supported: u32 },
    Incompatible { reason: String },
    Record { reason: String },
}

impl fmt::Display for CheckpointError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckpointError::Missing { path } => write!(f, "checkpoint not found: {}", path),
            CheckpointError::Io { path, source } => {
                write!(f, "checkpoint I/O error on '{}': {}", path, source)
            }
            CheckpointError::Corrupt { reason } => write!(f, "corrupt checkpoint: {}", reason),
            CheckpointError::UnsupportedVersion { found, supported } => write!(
                f,
                "unsupported checkpoint version {} (this build reads version {})",
                found, supported
            ),
            CheckpointError::Incompatible { reason } => {
                write!(f, "incompatible checkpoint: {}", reason)
            }
            CheckpointError::Record { reason } => {
                write!(f, "checkpoint weight record error: {}", reason)
            }
        }
    }
}

impl std::error::Error for CheckpointError {}
