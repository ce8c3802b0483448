// src/config.rs
//
// Run configuration for training, evaluation and inference.
//
// A Config is built once (defaults, YAML file, SATPOWER_* env overrides),
// validated once, and then handed by value to the components that need it.
// Nothing mutates it afterwards and validation never clamps: an out-of-range
// value is a ConfigError.

use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Physical parameters of the simulated satellite link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChannelConfig {
    /// Carrier frequency (GHz).
    pub carrier_freq_ghz: f64,
    /// Orbit altitude above the ground station (km).
    pub altitude_km: f64,
    /// Orbital speed used for Doppler (km/s).
    pub orbital_speed_km_s: f64,
    /// Simulated time covered by one environment step (s). Scales the rain
    /// random walk and the elapsed time reported per step.
    pub step_interval_s: f64,
    /// Elevation at the start and end of every pass (deg).
    pub min_elevation_deg: f64,
    /// Lower bound for the per-episode culmination elevation (deg).
    pub min_peak_elevation_deg: f64,
    /// Satellite antenna gain (dBi).
    pub tx_antenna_gain_dbi: f64,
    /// Ground terminal gain at zenith (dBi).
    pub rx_peak_gain_dbi: f64,
    /// Ground terminal gain lost between zenith and the horizon (dB).
    pub rx_gain_rolloff_db: f64,
    /// Fixed implementation and pointing losses (dB).
    pub misc_losses_db: f64,
    /// Effective rain layer height (km).
    pub rain_height_km: f64,
    /// Upper bound of the per-episode rain rate (mm/h).
    pub max_rain_rate_mm_h: f64,
    /// Rain rate random-walk intensity (mm/h per sqrt(s)). The per-step
    /// std-dev is this times sqrt(step_interval_s).
    pub rain_walk_std_mm_h: f64,
    /// Lowest commandable transmit power (dBm).
    pub min_tx_power_dbm: f64,
    /// Highest commandable transmit power (dBm).
    pub max_tx_power_dbm: f64,
    /// Transmit power at reset (dBm).
    pub initial_tx_power_dbm: f64,
    /// Fixed-power link design used for the power savings estimate (dBm).
    pub reference_tx_power_dbm: f64,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            carrier_freq_ghz: 12.0,
            altitude_km: 550.0,
            orbital_speed_km_s: 7.6,
            step_interval_s: 1.0,
            min_elevation_deg: 10.0,
            min_peak_elevation_deg: 30.0,
            tx_antenna_gain_dbi: 30.0,
            rx_peak_gain_dbi: 35.0,
            rx_gain_rolloff_db: 6.0,
            misc_losses_db: 3.0,
            rain_height_km: 3.0,
            max_rain_rate_mm_h: 50.0,
            rain_walk_std_mm_h: 1.0,
            min_tx_power_dbm: 0.0,
            max_tx_power_dbm: 46.0,
            initial_tx_power_dbm: 30.0,
            reference_tx_power_dbm: 40.0,
        }
    }
}

/// Reward shaping weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RewardConfig {
    /// Scale K of the violation penalty -K * (1 + margin).
    pub violation_penalty: f64,
    /// Weight of the normalized transmit power term.
    pub power_penalty_weight: f64,
    /// Penalty per dB of RSRP above the target setpoint.
    pub efficiency_weight: f64,
    /// Excess margin (dB) beyond which the efficiency penalty stops growing.
    pub efficiency_cap_db: f64,
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            violation_penalty: 10.0,
            power_penalty_weight: 1.0,
            efficiency_weight: 0.1,
            efficiency_cap_db: 10.0,
        }
    }
}

impl RewardConfig {
    /// Worst reward a compliant step can receive.
    pub fn compliant_floor(&self) -> f64 {
        -(self.power_penalty_weight + self.efficiency_weight * self.efficiency_cap_db)
    }
}

/// Threshold ladder of the rule-based controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BaselineConfig {
    /// Half-width of the hold band around the target (dB).
    pub tolerance_db: f64,
    /// Error magnitude beyond which the large step is used (dB).
    pub large_step_band_db: f64,
}

impl Default for BaselineConfig {
    fn default() -> Self {
        Self {
            tolerance_db: 1.0,
            large_step_band_db: 4.0,
        }
    }
}

/// Production inference settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InferenceConfig {
    /// Deadline applied when a request does not carry its own (ms).
    pub default_deadline_ms: u64,
    /// Share of the deadline kept for the fallback path (ms).
    pub fallback_reserve_ms: u64,
    /// Concurrent network evaluations allowed; extra requests wait within their deadline.
    pub max_concurrency: usize,
    /// Softmax temperature used for the confidence estimate.
    pub confidence_temperature: f64,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            default_deadline_ms: 10,
            fallback_reserve_ms: 1,
            max_concurrency: 64,
            confidence_temperature: 1.0,
        }
    }
}

/// Early stopping on the rolling mean of evaluation reward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EarlyStoppingConfig {
    /// Evaluations without improvement before stopping.
    pub patience: usize,
    /// Number of evaluations in the rolling mean.
    pub rolling_window: usize,
    /// Minimum increase of the rolling mean that counts as improvement.
    pub min_delta: f64,
}

impl Default for EarlyStoppingConfig {
    fn default() -> Self {
        Self {
            patience: 5,
            rolling_window: 3,
            min_delta: 0.0,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub episodes: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    /// Discount factor gamma.
    pub discount_factor: f64,
    pub epsilon_start: f64,
    pub epsilon_end: f64,
    /// Multiplicative per-episode decay, in (0, 1].
    pub epsilon_decay: f64,
    /// Step cap per episode.
    pub episode_length: usize,
    /// RSRP setpoint (dBm).
    pub target_rsrp: f64,
    /// Soft safety threshold (dBm).
    pub rsrp_violation_threshold: f64,
    /// Hard failure cutoff that ends the episode (dBm).
    pub rsrp_outage_threshold: f64,
    /// Episodes between evaluation rollouts.
    pub eval_frequency: usize,
    pub eval_episodes: usize,
    /// Episodes between checkpoints.
    pub checkpoint_frequency: usize,
    /// Episodes between hard target-network syncs.
    pub sync_frequency: usize,
    pub replay_capacity: usize,
    /// Updates start once replay holds this many transitions (defaults to batch_size).
    pub min_replay_size: Option<usize>,
    pub output_dir: PathBuf,

    /// Seed for environment episodes, exploration and weight init.
    pub seed: u64,
    /// Hidden layer widths of the Q-network.
    pub hidden_layers: Vec<usize>,
    /// Gradient norm clip.
    pub max_grad_norm: f64,
    /// Transition point of the Huber loss.
    pub huber_delta: f64,
    /// Significance level for the improvement claim.
    pub significance_level: f64,
    /// First seed of the held-out evaluation episodes.
    pub eval_seed_base: u64,
    pub early_stopping: Option<EarlyStoppingConfig>,
    /// 0 = quiet, 1 = per-evaluation lines, 2 = per-episode lines.
    pub verbosity: u8,

    pub channel: ChannelConfig,
    pub reward: RewardConfig,
    pub baseline: BaselineConfig,
    pub inference: InferenceConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            episodes: 500,
            batch_size: 64,
            learning_rate: 1e-3,
            discount_factor: 0.99,
            epsilon_start: 1.0,
            epsilon_end: 0.01,
            epsilon_decay: 0.995,
            episode_length: 200,
            target_rsrp: -95.0,
            rsrp_violation_threshold: -100.0,
            rsrp_outage_threshold: -110.0,
            eval_frequency: 25,
            eval_episodes: 10,
            checkpoint_frequency: 50,
            sync_frequency: 10,
            replay_capacity: 100_000,
            min_replay_size: None,
            output_dir: PathBuf::from("runs/satpower"),
            seed: 42,
            hidden_layers: vec![128, 64, 32],
            max_grad_norm: 10.0,
            huber_delta: 1.0,
            significance_level: 0.05,
            eval_seed_base: 1_000_000,
            early_stopping: None,
            verbosity: 1,
            channel: ChannelConfig::default(),
            reward: RewardConfig::default(),
            baseline: BaselineConfig::default(),
            inference: InferenceConfig::default(),
        }
    }
}

impl Config {
    /// Small, fast preset for smoke tests and CI.
    pub fn smoke() -> Self {
        Self {
            episodes: 30,
            batch_size: 16,
            episode_length: 20,
            eval_frequency: 10,
            eval_episodes: 2,
            checkpoint_frequency: 10,
            sync_frequency: 5,
            replay_capacity: 50,
            hidden_layers: vec![32, 16, 8],
            verbosity: 0,
            ..Self::default()
        }
    }

    /// Validate and return the configuration.
    pub fn validated(self) -> Result<Self, ConfigError> {
        self.validate()?;
        Ok(self)
    }

    /// Load a configuration from a YAML file, apply env overrides and validate.
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io {
            path: path.as_ref().display().to_string(),
            source: e.to_string(),
        })?;
        let mut cfg = Self::parse_yaml(&contents)?;
        cfg.apply_env_overrides();
        cfg.validated()
    }

    /// Parse and validate a configuration from a YAML string (no env overrides).
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        Self::parse_yaml(yaml)?.validated()
    }

    fn parse_yaml(yaml: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(yaml).map_err(|e| ConfigError::Parse {
            source: e.to_string(),
        })
    }

    /// Defaults with SATPOWER_* environment overrides, validated.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut cfg = Self::default();
        cfg.apply_env_overrides();
        cfg.validated()
    }

    /// Apply SATPOWER_* environment overrides in place.
    ///
    /// Unparseable values are reported and ignored; range checks are left to
    /// `validate`.
    pub fn apply_env_overrides(&mut self) {
        env_override("SATPOWER_EPISODES", &mut self.episodes);
        env_override("SATPOWER_BATCH_SIZE", &mut self.batch_size);
        env_override("SATPOWER_LEARNING_RATE", &mut self.learning_rate);
        env_override("SATPOWER_DISCOUNT_FACTOR", &mut self.discount_factor);
        env_override("SATPOWER_EPISODE_LENGTH", &mut self.episode_length);
        env_override("SATPOWER_REPLAY_CAPACITY", &mut self.replay_capacity);
        env_override("SATPOWER_SEED", &mut self.seed);
        env_override("SATPOWER_TARGET_RSRP", &mut self.target_rsrp);
        env_override("SATPOWER_CARRIER_FREQ_GHZ", &mut self.channel.carrier_freq_ghz);

        if let Ok(raw) = env::var("SATPOWER_OUTPUT_DIR") {
            if raw.trim().is_empty() {
                eprintln!("[config] WARN: SATPOWER_OUTPUT_DIR is empty; using default {}", self.output_dir.display());
            } else {
                self.output_dir = PathBuf::from(&raw);
                eprintln!("[config] SATPOWER_OUTPUT_DIR = {raw} (overrode default)");
            }
        }
    }

    /// Resolved warm-up size for the replay memory.
    pub fn min_replay_size(&self) -> usize {
        self.min_replay_size.unwrap_or(self.batch_size)
    }

    /// Short hex fingerprint of the serialized configuration.
    pub fn fingerprint(&self) -> String {
        let json = serde_json::to_string(self).unwrap_or_default();
        let digest = Sha256::digest(json.as_bytes());
        hex::encode(&digest[..8])
    }

    /// Fingerprint of the settings that shape learning. Run length, output
    /// location and verbosity are left out so extending a run keeps it.
    pub fn training_fingerprint(&self) -> String {
        Config {
            episodes: 0,
            output_dir: PathBuf::new(),
            verbosity: 0,
            ..self.clone()
        }
        .fingerprint()
    }

    /// Check every range constraint; the first violation is returned.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check(self.episodes > 0, "episodes", "must be >= 1")?;
        check(self.batch_size > 0, "batch_size", "must be >= 1")?;
        check(self.replay_capacity > 0, "replay_capacity", "must be >= 1")?;
        check(
            self.replay_capacity >= self.batch_size,
            "replay_capacity",
            "must be >= batch_size",
        )?;
        if let Some(min) = self.min_replay_size {
            check(min >= self.batch_size, "min_replay_size", "must be >= batch_size")?;
            check(min <= self.replay_capacity, "min_replay_size", "must be <= replay_capacity")?;
        }
        check(
            self.learning_rate.is_finite() && self.learning_rate > 0.0,
            "learning_rate",
            "must be finite and > 0",
        )?;
        check(
            (0.0..=1.0).contains(&self.discount_factor),
            "discount_factor",
            "must be in [0, 1]",
        )?;
        check(
            (0.0..=1.0).contains(&self.epsilon_start),
            "epsilon_start",
            "must be in [0, 1]",
        )?;
        check(
            (0.0..=1.0).contains(&self.epsilon_end),
            "epsilon_end",
            "must be in [0, 1]",
        )?;
        check(
            self.epsilon_end <= self.epsilon_start,
            "epsilon_end",
            "must be <= epsilon_start",
        )?;
        check(
            self.epsilon_decay > 0.0 && self.epsilon_decay <= 1.0,
            "epsilon_decay",
            "must be in (0, 1]",
        )?;
        check(self.episode_length > 0, "episode_length", "must be >= 1")?;
        check(self.eval_frequency > 0, "eval_frequency", "must be >= 1")?;
        check(self.eval_episodes > 0, "eval_episodes", "must be >= 1")?;
        check(self.checkpoint_frequency > 0, "checkpoint_frequency", "must be >= 1")?;
        check(self.sync_frequency > 0, "sync_frequency", "must be >= 1")?;
        check(
            self.target_rsrp.is_finite() && self.rsrp_violation_threshold.is_finite(),
            "target_rsrp",
            "RSRP levels must be finite",
        )?;
        check(
            self.target_rsrp >= self.rsrp_violation_threshold,
            "target_rsrp",
            "must be >= rsrp_violation_threshold",
        )?;
        check(
            self.rsrp_outage_threshold < self.rsrp_violation_threshold,
            "rsrp_outage_threshold",
            "must be < rsrp_violation_threshold",
        )?;
        check(!self.hidden_layers.is_empty(), "hidden_layers", "must name at least one layer")?;
        check(
            self.hidden_layers.iter().all(|w| *w > 0),
            "hidden_layers",
            "widths must be >= 1",
        )?;
        check(
            self.max_grad_norm.is_finite() && self.max_grad_norm > 0.0,
            "max_grad_norm",
            "must be finite and > 0",
        )?;
        check(
            self.huber_delta.is_finite() && self.huber_delta > 0.0,
            "huber_delta",
            "must be finite and > 0",
        )?;
        check(
            self.significance_level > 0.0 && self.significance_level < 1.0,
            "significance_level",
            "must be in (0, 1)",
        )?;
        if let Some(es) = &self.early_stopping {
            check(es.patience > 0, "early_stopping.patience", "must be >= 1")?;
            check(es.rolling_window > 0, "early_stopping.rolling_window", "must be >= 1")?;
            check(
                es.min_delta.is_finite() && es.min_delta >= 0.0,
                "early_stopping.min_delta",
                "must be finite and >= 0",
            )?;
        }
        self.validate_channel()?;
        self.validate_reward()?;
        self.validate_baseline()?;
        self.validate_inference()
    }

    fn validate_channel(&self) -> Result<(), ConfigError> {
        let c = &self.channel;
        let positive = [
            ("channel.carrier_freq_ghz", c.carrier_freq_ghz),
            ("channel.altitude_km", c.altitude_km),
            ("channel.orbital_speed_km_s", c.orbital_speed_km_s),
            ("channel.step_interval_s", c.step_interval_s),
            ("channel.rain_height_km", c.rain_height_km),
        ];
        for (field, value) in positive {
            check(value.is_finite() && value > 0.0, field, "must be finite and > 0")?;
        }
        let non_negative = [
            ("channel.max_rain_rate_mm_h", c.max_rain_rate_mm_h),
            ("channel.rain_walk_std_mm_h", c.rain_walk_std_mm_h),
            ("channel.rx_gain_rolloff_db", c.rx_gain_rolloff_db),
            ("channel.misc_losses_db", c.misc_losses_db),
        ];
        for (field, value) in non_negative {
            check(value.is_finite() && value >= 0.0, field, "must be finite and >= 0")?;
        }
        check(
            c.max_rain_rate_mm_h <= crate::channel::observation::MAX_RAIN_RATE_MM_H,
            "channel.max_rain_rate_mm_h",
            "exceeds the observable rain rate range",
        )?;
        check(
            c.min_elevation_deg > 0.0 && c.min_elevation_deg < 90.0,
            "channel.min_elevation_deg",
            "must be in (0, 90)",
        )?;
        check(
            c.min_peak_elevation_deg >= c.min_elevation_deg && c.min_peak_elevation_deg <= 90.0,
            "channel.min_peak_elevation_deg",
            "must be in [min_elevation_deg, 90]",
        )?;
        check(
            c.min_tx_power_dbm.is_finite() && c.max_tx_power_dbm.is_finite(),
            "channel.max_tx_power_dbm",
            "power limits must be finite",
        )?;
        check(
            c.min_tx_power_dbm < c.max_tx_power_dbm,
            "channel.max_tx_power_dbm",
            "must be > min_tx_power_dbm",
        )?;
        check(
            (c.min_tx_power_dbm..=c.max_tx_power_dbm).contains(&c.initial_tx_power_dbm),
            "channel.initial_tx_power_dbm",
            "must lie within the transmit power limits",
        )?;
        check(
            c.reference_tx_power_dbm.is_finite(),
            "channel.reference_tx_power_dbm",
            "must be finite",
        )
    }

    fn validate_reward(&self) -> Result<(), ConfigError> {
        let r = &self.reward;
        check(
            r.power_penalty_weight.is_finite() && r.power_penalty_weight > 0.0,
            "reward.power_penalty_weight",
            "must be finite and > 0",
        )?;
        check(
            r.efficiency_weight.is_finite() && r.efficiency_weight >= 0.0,
            "reward.efficiency_weight",
            "must be finite and >= 0",
        )?;
        check(
            r.efficiency_cap_db.is_finite() && r.efficiency_cap_db >= 0.0,
            "reward.efficiency_cap_db",
            "must be finite and >= 0",
        )?;
        check(
            r.violation_penalty.is_finite() && -r.violation_penalty < r.compliant_floor(),
            "reward.violation_penalty",
            "must exceed the largest compliant penalty (power weight + efficiency weight * cap)",
        )
    }

    fn validate_baseline(&self) -> Result<(), ConfigError> {
        let b = &self.baseline;
        check(
            b.tolerance_db.is_finite() && b.tolerance_db > 0.0,
            "baseline.tolerance_db",
            "must be finite and > 0",
        )?;
        check(
            b.large_step_band_db.is_finite() && b.large_step_band_db > b.tolerance_db,
            "baseline.large_step_band_db",
            "must be > tolerance_db",
        )
    }

    fn validate_inference(&self) -> Result<(), ConfigError> {
        let i = &self.inference;
        check(i.default_deadline_ms > 0, "inference.default_deadline_ms", "must be >= 1")?;
        check(
            i.fallback_reserve_ms < i.default_deadline_ms,
            "inference.fallback_reserve_ms",
            "must be < default_deadline_ms",
        )?;
        check(i.max_concurrency > 0, "inference.max_concurrency", "must be >= 1")?;
        check(
            i.confidence_temperature.is_finite() && i.confidence_temperature > 0.0,
            "inference.confidence_temperature",
            "must be finite and > 0",
        )
    }
}

fn check(ok: bool, field: &str, message: &str) -> Result<(), ConfigError> {
    if ok {
        Ok(())
    } else {
        Err(ConfigError::Validation {
            field: field.to_string(),
            message: message.to_string(),
        })
    }
}

fn env_override<T>(key: &str, slot: &mut T)
where
    T: FromStr + fmt::Display,
{
    if let Ok(raw) = env::var(key) {
        match raw.trim().parse::<T>() {
            Ok(v) => {
                eprintln!("[config] {key} = {v} (overrode default)");
                *slot = v;
            }
            Err(_) => {
                eprintln!(
                    "[config] WARN: could not parse {key} = {:?}; using default {}",
                    raw, slot
                );
            }
        }
    }
}

/// Errors produced while loading or validating a configuration.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    Io { path: String, source: String },
    Parse { source: String },
    Validation { field: String, message: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io { path, source } => {
                write!(f, "Failed to read config file '{}': {}", path, source)
            }
            ConfigError::Parse { source } => write!(f, "Failed to parse config YAML: {}", source),
            ConfigError::Validation { field, message } => {
                write!(f, "Invalid configuration '{}': {}", field, message)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn field_of(err: ConfigError) -> String {
        match err {
            ConfigError::Validation { field, .. } => field,
            other => panic!("expected validation error, got {other}"),
        }
    }

    #[test]
    fn test_defaults_and_smoke_are_valid() {
        Config::default().validate().unwrap();
        Config::smoke().validate().unwrap();
    }

    #[test]
    fn test_zero_episodes_rejected() {
        let cfg = Config {
            episodes: 0,
            ..Config::default()
        };
        assert_eq!(field_of(cfg.validated().unwrap_err()), "episodes");
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let cfg = Config {
            replay_capacity: 0,
            ..Config::default()
        };
        assert_eq!(field_of(cfg.validate().unwrap_err()), "replay_capacity");
    }

    #[test]
    fn test_negative_step_interval_rejected_not_clamped() {
        let mut cfg = Config::default();
        cfg.channel.step_interval_s = -1.0;
        assert_eq!(
            field_of(cfg.validate().unwrap_err()),
            "channel.step_interval_s"
        );
        assert_eq!(cfg.channel.step_interval_s, -1.0);
    }

    #[test]
    fn test_violation_penalty_must_dominate_compliant_penalties() {
        let mut cfg = Config::default();
        cfg.reward.violation_penalty = 1.5;
        assert_eq!(
            field_of(cfg.validate().unwrap_err()),
            "reward.violation_penalty"
        );
    }

    #[test]
    fn test_outage_must_be_below_threshold() {
        let cfg = Config {
            rsrp_outage_threshold: -90.0,
            ..Config::default()
        };
        assert_eq!(field_of(cfg.validate().unwrap_err()), "rsrp_outage_threshold");
    }

    #[test]
    fn test_yaml_partial_override() {
        let yaml = r#"
episodes: 12
batch_size: 8
replay_capacity: 40
channel:
  carrier_freq_ghz: 20.0
early_stopping:
  patience: 2
"#;
        let cfg = Config::from_yaml_str(yaml).unwrap();
        assert_eq!(cfg.episodes, 12);
        assert_eq!(cfg.channel.carrier_freq_ghz, 20.0);
        assert_eq!(cfg.channel.altitude_km, 550.0);
        assert_eq!(cfg.early_stopping.unwrap().rolling_window, 3);
    }

    #[test]
    fn test_yaml_unknown_key_rejected() {
        let err = Config::from_yaml_str("episodez: 3\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_fingerprint_tracks_content() {
        let a = Config::default();
        let b = Config {
            seed: 7,
            ..Config::default()
        };
        assert_eq!(a.fingerprint(), Config::default().fingerprint());
        assert_ne!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint().len(), 16);
    }

    #[test]
    fn test_training_fingerprint_ignores_run_length_and_output() {
        let a = Config::smoke();
        let longer = Config {
            episodes: 300,
            output_dir: PathBuf::from("elsewhere"),
            verbosity: 2,
            ..Config::smoke()
        };
        assert_ne!(a.fingerprint(), longer.fingerprint());
        assert_eq!(a.training_fingerprint(), longer.training_fingerprint());

        let other_lr = Config {
            learning_rate: 5e-4,
            ..Config::smoke()
        };
        assert_ne!(a.training_fingerprint(), other_lr.training_fingerprint());
    }

    #[test]
    fn test_min_replay_size_below_batch_rejected() {
        let cfg = Config {
            min_replay_size: Some(4),
            ..Config::smoke()
        };
        assert_eq!(field_of(cfg.validated().unwrap_err()), "min_replay_size");

        let cfg = Config {
            min_replay_size: Some(24),
            ..Config::smoke()
        };
        assert_eq!(cfg.validated().unwrap().min_replay_size(), 24);
        assert_eq!(Config::smoke().min_replay_size(), 16);
    }
}
