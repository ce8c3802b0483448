// src/rl/trainer.rs
//
// DQN training loop.
//
// Per episode:
//   reset -> { select, step, push, update once warm } until done
//   -> decay epsilon -> sync target (every sync_frequency)
//   -> evaluate (every eval_frequency) -> checkpoint (every checkpoint_frequency)
//
// Episodes are numbered from 1 and every cadence is counted in episodes.
// Evaluation and checkpoint persistence are injected as closures through
// run_with(); run() wires in greedy held-out rollouts and checkpoint files
// under output_dir/checkpoints.
//
// A failed checkpoint save is retried once, then skipped for that tick. A
// failed evaluation is logged and training continues.

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use super::agent::{DqnAgent, TrainBackend};
use super::checkpoint::{atomic_write, Checkpoint, CheckpointError};
use super::history::{EpisodeRecord, HistoryLog};
use super::replay::{ReplayMemory, Transition};
use crate::channel::{LinkEnv, ObservationBounds, TerminationReason};
use crate::config::Config;
use crate::sim_eval::{rollout_episodes, EpisodeStats, PolicyAggregate};
use crate::telemetry::TelemetrySink;

pub const HISTORY_FILE: &str = "history.jsonl";
pub const SUMMARY_FILE: &str = "training_summary.json";
pub const CHECKPOINT_DIR: &str = "checkpoints";
pub const LATEST_CHECKPOINT: &str = "latest.ckpt";

/// Per-instance training counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainerCounters {
    pub episodes_run: u64,
    pub env_steps: u64,
    pub updates: u64,
    pub syncs: u64,
    pub evaluations: u64,
    pub evaluation_failures: u64,
    pub checkpoints_written: u64,
    pub checkpoint_failures: u64,
    pub invalid_episodes: u64,
}

/// Evaluation result as seen by the trainer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationPoint {
    pub episode: u64,
    pub mean_reward: f64,
    pub mean_power_dbm: f64,
    pub violation_rate: f64,
    pub outage_rate: f64,
    pub power_savings_pct: f64,
    /// Rolling mean of mean_reward used for early stopping.
    pub rolling_reward: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingSummary {
    pub first_episode: u64,
    pub last_episode: u64,
    pub stopped_early: bool,
    pub final_epsilon: f64,
    pub train_steps: u64,
    pub replay_size: usize,
    pub counters: TrainerCounters,
    pub evaluations: Vec<EvaluationPoint>,
    pub best_rolling_reward: Option<f64>,
    pub last_checkpoint: Option<PathBuf>,
    pub history_path: PathBuf,
    pub config_fingerprint: String,
    pub elapsed_ms: u64,
}

/// Tracks the rolling evaluation reward and decides when to stop.
#[derive(Debug, Clone)]
struct EarlyStopper {
    patience: usize,
    window: usize,
    min_delta: f64,
    rewards: Vec<f64>,
    best: Option<f64>,
    stale: usize,
}

impl EarlyStopper {
    /// Record one evaluation; returns (rolling mean, should stop).
    fn observe(&mut self, reward: f64) -> (f64, bool) {
        self.rewards.push(reward);
        let start = self.rewards.len().saturating_sub(self.window.max(1));
        let recent = &self.rewards[start..];
        let rolling = recent.iter().sum::<f64>() / recent.len() as f64;

        match self.best {
            Some(best) if rolling <= best + self.min_delta => self.stale += 1,
            _ => {
                self.best = Some(rolling);
                self.stale = 0;
            }
        }
        (rolling, self.stale >= self.patience)
    }
}

pub struct Trainer {
    cfg: Config,
    agent: DqnAgent<TrainBackend>,
    memory: ReplayMemory,
    env: LinkEnv,
    history: HistoryLog,
    telemetry: TelemetrySink,
    first_episode: u64,
    counters: TrainerCounters,
    evaluations: Vec<EvaluationPoint>,
    stopper: Option<EarlyStopper>,
    last_checkpoint: Option<PathBuf>,
}

impl Trainer {
    /// Fresh run. Fails if the configuration is invalid or the output
    /// directory cannot be prepared.
    pub fn new(cfg: Config) -> Result<Self> {
        let cfg = cfg.validated().context("Invalid training configuration")?;
        let bounds = ObservationBounds::from_channel(&cfg.channel);
        let agent = DqnAgent::<TrainBackend>::new(&cfg, bounds, Default::default())?;
        Self::assemble(cfg, agent, 0)
    }

    /// Continue from a checkpoint. Any checkpoint error fails startup.
    pub fn resume(cfg: Config, checkpoint: &Path) -> Result<Self> {
        let cfg = cfg.validated().context("Invalid training configuration")?;
        let ckpt = Checkpoint::load(checkpoint)
            .with_context(|| format!("Failed to load checkpoint {}", checkpoint.display()))?;
        if !ckpt.header.same_training_config(&cfg) {
            eprintln!(
                "[trainer] WARN: resuming {} under a different configuration (fingerprint {} vs {})",
                checkpoint.display(),
                ckpt.header.config_fingerprint,
                cfg.training_fingerprint()
            );
        }
        let agent = ckpt
            .restore_agent::<TrainBackend>(&cfg, Default::default())
            .with_context(|| format!("Failed to restore agent from {}", checkpoint.display()))?;
        let first = ckpt.header.episodes_completed;
        if cfg.verbosity > 0 {
            eprintln!(
                "[trainer] Resuming from {} at episode {} (epsilon={:.4}, train_steps={})",
                checkpoint.display(),
                first,
                agent.epsilon(),
                agent.train_steps()
            );
        }
        Self::assemble(cfg, agent, first)
    }

    fn assemble(cfg: Config, agent: DqnAgent<TrainBackend>, first_episode: u64) -> Result<Self> {
        let env = LinkEnv::new(&cfg)?;
        let history = HistoryLog::open(&cfg.output_dir.join(HISTORY_FILE))?;
        let stopper = cfg.early_stopping.as_ref().map(|es| EarlyStopper {
            patience: es.patience,
            window: es.rolling_window,
            min_delta: es.min_delta,
            rewards: Vec::new(),
            best: None,
            stale: 0,
        });
        Ok(Self {
            memory: ReplayMemory::new(cfg.replay_capacity),
            agent,
            env,
            history,
            telemetry: TelemetrySink::from_env(),
            first_episode,
            counters: TrainerCounters::default(),
            evaluations: Vec::new(),
            stopper,
            last_checkpoint: None,
            cfg,
        })
    }

    /// Replace the telemetry sink (defaults to SATPOWER_TELEMETRY_* env).
    pub fn with_telemetry(mut self, telemetry: TelemetrySink) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Train with greedy held-out evaluation and checkpoint files under
    /// `output_dir`.
    pub fn run(&mut self) -> Result<TrainingSummary> {
        let eval_cfg = self.cfg.clone();
        let ckpt_dir = self.cfg.output_dir.join(CHECKPOINT_DIR);
        self.run_with(
            |agent, _episode| greedy_evaluation(&eval_cfg, agent),
            |ckpt, episode| save_checkpoint_files(&ckpt_dir, ckpt, episode),
        )
    }

    /// Train with injected evaluation and checkpoint hooks.
    pub fn run_with<E, C>(&mut self, mut evaluate: E, mut checkpoint: C) -> Result<TrainingSummary>
    where
        E: FnMut(&DqnAgent<TrainBackend>, u64) -> Result<PolicyAggregate>,
        C: FnMut(&Checkpoint, u64) -> Result<PathBuf, CheckpointError>,
    {
        let started = Instant::now();
        let mut stopped_early = false;
        let mut last_episode = self.first_episode;
        let mut last_persisted = None;

        for episode in (self.first_episode + 1)..=(self.cfg.episodes as u64) {
            let record = self.run_episode(episode)?;
            last_episode = episode;

            if self.cfg.verbosity >= 2 {
                eprintln!(
                    "[trainer] ep={} reward={:.3} loss={} eps={:.4} savings={:.1}% viol={:.3} steps={}",
                    episode,
                    record.reward,
                    record
                        .loss
                        .map(|l| format!("{:.5}", l))
                        .unwrap_or_else(|| "-".to_string()),
                    record.epsilon,
                    record.power_savings_pct,
                    record.violation_rate,
                    record.steps
                );
            }

            if episode % self.cfg.sync_frequency as u64 == 0 {
                self.agent.sync_target();
                self.counters.syncs += 1;
            }

            if episode % self.cfg.eval_frequency as u64 == 0
                && self.periodic_evaluation(episode, &mut evaluate)
            {
                stopped_early = true;
            }

            if episode % self.cfg.checkpoint_frequency as u64 == 0 {
                self.persist_checkpoint(episode, &mut checkpoint);
                last_persisted = Some(episode);
            }

            if stopped_early {
                if self.cfg.verbosity > 0 {
                    eprintln!("[trainer] Early stopping at episode {}", episode);
                }
                self.telemetry
                    .log_event("early_stop", &serde_json::json!({ "episode": episode }));
                break;
            }
        }

        // Final checkpoint unless the last episode already wrote one.
        if last_episode > self.first_episode && last_persisted != Some(last_episode) {
            self.persist_checkpoint(last_episode, &mut checkpoint);
        }

        let summary = TrainingSummary {
            first_episode: self.first_episode + 1,
            last_episode,
            stopped_early,
            final_epsilon: self.agent.epsilon(),
            train_steps: self.agent.train_steps(),
            replay_size: self.memory.len(),
            counters: self.counters.clone(),
            evaluations: self.evaluations.clone(),
            best_rolling_reward: self.stopper.as_ref().and_then(|s| s.best),
            last_checkpoint: self.last_checkpoint.clone(),
            history_path: self.history.path().to_path_buf(),
            config_fingerprint: self.cfg.fingerprint(),
            elapsed_ms: started.elapsed().as_millis() as u64,
        };
        self.write_summary(&summary)?;
        self.telemetry.log_event("training_complete", &summary);
        self.telemetry.flush();

        if self.cfg.verbosity > 0 {
            eprintln!(
                "[trainer] Done: episodes {}..={} train_steps={} epsilon={:.4} checkpoints={} (failed {})",
                summary.first_episode,
                summary.last_episode,
                summary.train_steps,
                summary.final_epsilon,
                summary.counters.checkpoints_written,
                summary.counters.checkpoint_failures
            );
        }
        Ok(summary)
    }

    /// Seed of the training episode with the given index.
    pub fn episode_seed(&self, episode: u64) -> u64 {
        self.cfg
            .seed
            .wrapping_mul(0x9E37_79B9_7F4A_7C15)
            .wrapping_add(episode)
    }

    fn run_episode(&mut self, episode: u64) -> Result<EpisodeRecord> {
        let seed = self.episode_seed(episode);
        let mut obs = self.env.reset(Some(seed));
        let mut stats = EpisodeStats::new(seed);
        let mut loss_sum = 0.0;
        let mut loss_count = 0u64;
        let warm = self.cfg.min_replay_size();

        loop {
            let action = self.agent.select_action(&obs);
            let result = self.env.step(action);
            stats.record(&result);
            self.counters.env_steps += 1;

            if result.info.termination_reason == Some(TerminationReason::InvalidState) {
                // No valid next state to learn from.
                self.counters.invalid_episodes += 1;
                break;
            }

            self.memory.push(Transition {
                observation: obs,
                action,
                reward: result.reward,
                next_observation: result.observation,
                // Time-cap truncation bootstraps; only an outage is terminal.
                terminal: result.info.outage,
            });

            if self.memory.len() >= warm {
                if let Some(loss) = self.agent.update(&self.memory) {
                    loss_sum += loss;
                    loss_count += 1;
                    self.counters.updates += 1;
                }
            }

            obs = result.observation;
            if result.done {
                break;
            }
        }

        let epsilon = self.agent.decay_epsilon();
        self.counters.episodes_run += 1;

        let record = EpisodeRecord {
            episode,
            reward: stats.total_reward,
            loss: if loss_count > 0 {
                Some(loss_sum / loss_count as f64)
            } else {
                None
            },
            epsilon,
            power_savings_pct: stats.power_savings_pct(self.cfg.channel.reference_tx_power_dbm),
            violation_rate: stats.violation_rate(),
            outage_rate: stats.outage_rate(),
            steps: stats.steps,
            mean_tx_power_dbm: stats.mean_tx_power_dbm(),
            mean_rsrp_dbm: stats.mean_rsrp_dbm(),
            termination_reason: stats.termination_reason.map(|r| r.as_str().to_string()),
            train_steps: self.agent.train_steps(),
        };
        self.history.append(&record)?;
        self.telemetry.log_event("episode", &record);
        Ok(record)
    }

    /// Returns true when early stopping triggers.
    fn periodic_evaluation<E>(&mut self, episode: u64, evaluate: &mut E) -> bool
    where
        E: FnMut(&DqnAgent<TrainBackend>, u64) -> Result<PolicyAggregate>,
    {
        let aggregate = match evaluate(&self.agent, episode) {
            Ok(a) => a,
            Err(e) => {
                self.counters.evaluation_failures += 1;
                eprintln!("[trainer] WARN: evaluation at episode {} failed: {:#}", episode, e);
                return false;
            }
        };
        self.counters.evaluations += 1;

        let (rolling_reward, stop) = match self.stopper.as_mut() {
            Some(stopper) => stopper.observe(aggregate.mean_episode_reward),
            None => (aggregate.mean_episode_reward, false),
        };
        let point = EvaluationPoint {
            episode,
            mean_reward: aggregate.mean_episode_reward,
            mean_power_dbm: aggregate.mean_power_dbm,
            violation_rate: aggregate.violation_rate,
            outage_rate: aggregate.outage_rate,
            power_savings_pct: aggregate.mean_power_savings_pct,
            rolling_reward,
        };
        if self.cfg.verbosity > 0 {
            eprintln!(
                "[trainer] eval ep={} reward={:.3} (rolling {:.3}) power={:.2} dBm viol={:.3} outage={:.3}",
                episode,
                point.mean_reward,
                point.rolling_reward,
                point.mean_power_dbm,
                point.violation_rate,
                point.outage_rate
            );
        }
        self.telemetry.log_event("evaluation", &point);
        self.evaluations.push(point);
        stop
    }

    fn persist_checkpoint<C>(&mut self, episode: u64, checkpoint: &mut C)
    where
        C: FnMut(&Checkpoint, u64) -> Result<PathBuf, CheckpointError>,
    {
        let ckpt = match Checkpoint::capture(&self.agent, episode, &self.cfg) {
            Ok(c) => c,
            Err(e) => {
                self.counters.checkpoint_failures += 1;
                eprintln!("[checkpoint] WARN: capture at episode {} failed: {}", episode, e);
                return;
            }
        };

        let saved = checkpoint(&ckpt, episode).or_else(|first| {
            eprintln!(
                "[checkpoint] WARN: save at episode {} failed: {}; retrying",
                episode, first
            );
            checkpoint(&ckpt, episode)
        });

        match saved {
            Ok(path) => {
                self.counters.checkpoints_written += 1;
                if self.cfg.verbosity > 0 {
                    eprintln!("[checkpoint] Saved {}", path.display());
                }
                self.telemetry.log_event(
                    "checkpoint",
                    &serde_json::json!({
                        "episode": episode,
                        "path": path.display().to_string(),
                        "train_steps": ckpt.header.train_steps,
                    }),
                );
                self.last_checkpoint = Some(path);
            }
            Err(e) => {
                self.counters.checkpoint_failures += 1;
                eprintln!(
                    "[checkpoint] WARN: skipping checkpoint for episode {}: {}",
                    episode, e
                );
            }
        }
    }

    fn write_summary(&self, summary: &TrainingSummary) -> Result<()> {
        let path = self.cfg.output_dir.join(SUMMARY_FILE);
        let json = serde_json::to_vec_pretty(summary).context("Failed to serialise training summary")?;
        atomic_write(&path, &json)
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    pub fn agent(&self) -> &DqnAgent<TrainBackend> {
        &self.agent
    }

    pub fn memory(&self) -> &ReplayMemory {
        &self.memory
    }

    pub fn counters(&self) -> &TrainerCounters {
        &self.counters
    }

    pub fn evaluations(&self) -> &[EvaluationPoint] {
        &self.evaluations
    }

    pub fn history_path(&self) -> &Path {
        self.history.path()
    }

    pub fn last_checkpoint(&self) -> Option<&Path> {
        self.last_checkpoint.as_deref()
    }

    /// Episodes already completed before this run started.
    pub fn first_episode(&self) -> u64 {
        self.first_episode
    }
}

/// Greedy rollouts of the agent on the held-out evaluation seeds.
pub fn greedy_evaluation(cfg: &Config, agent: &DqnAgent<TrainBackend>) -> Result<PolicyAggregate> {
    let seeds: Vec<u64> = (0..cfg.eval_episodes as u64)
        .map(|k| cfg.eval_seed_base.wrapping_add(k))
        .collect();
    let policy = agent.greedy_policy();
    let episodes = rollout_episodes(cfg, &policy, &seeds)?;
    Ok(PolicyAggregate::from_episodes(
        "dqn",
        &episodes,
        cfg.channel.reference_tx_power_dbm,
    ))
}

/// Write `ep_XXXXX.ckpt` and refresh `latest.ckpt` in `dir`.
pub fn save_checkpoint_files(dir: &Path, ckpt: &Checkpoint, episode: u64) -> Result<PathBuf, CheckpointError> {
    let path = dir.join(format!("ep_{:05}.ckpt", episode));
    ckpt.save(&path)?;
    ckpt.save(&dir.join(LATEST_CHECKPOINT))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EarlyStoppingConfig;
    use crate::rl::history::read_history;
    use crate::telemetry::TelemetryConfig;
    use std::cell::Cell;

    fn quick_cfg(dir: &Path) -> Config {
        Config {
            episodes: 6,
            eval_frequency: 2,
            checkpoint_frequency: 3,
            sync_frequency: 2,
            output_dir: dir.to_path_buf(),
            ..Config::smoke()
        }
    }

    fn aggregate(reward: f64) -> PolicyAggregate {
        let mut agg = PolicyAggregate::from_episodes("stub", &[], 40.0);
        agg.mean_episode_reward = reward;
        agg
    }

    #[test]
    fn test_invalid_config_rejected_at_construction() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config {
            episodes: 0,
            ..quick_cfg(dir.path())
        };
        assert!(Trainer::new(cfg).is_err());
    }

    #[test]
    fn test_cadences_and_history() {
        let dir = tempfile::tempdir().unwrap();
        let mut trainer = Trainer::new(quick_cfg(dir.path())).unwrap();
        let evals = Cell::new(0u32);
        let mut saved = Vec::new();
        let summary = trainer
            .run_with(
                |_, _| {
                    evals.set(evals.get() + 1);
                    Ok(aggregate(-1.0))
                },
                |_, episode| {
                    saved.push(episode);
                    Ok(PathBuf::from(format!("ep{episode}")))
                },
            )
            .unwrap();

        assert_eq!(evals.get(), 3);
        assert_eq!(saved, vec![3, 6]);
        assert_eq!(summary.counters.syncs, 3);
        assert_eq!(summary.counters.episodes_run, 6);
        assert!(!summary.stopped_early);

        let history = read_history(&dir.path().join(HISTORY_FILE)).unwrap();
        assert_eq!(history.len(), 6);
        assert!(history.windows(2).all(|w| w[1].epsilon <= w[0].epsilon));
        assert!(dir.path().join(SUMMARY_FILE).exists());
    }

    #[test]
    fn test_failed_checkpoint_retried_once_then_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let mut trainer = Trainer::new(quick_cfg(dir.path())).unwrap();
        let mut attempts = 0;
        let summary = trainer
            .run_with(
                |_, _| Ok(aggregate(-1.0)),
                |_, _| {
                    attempts += 1;
                    Err(CheckpointError::Io {
                        path: "nowhere".into(),
                        source: "disk full".into(),
                    })
                },
            )
            .unwrap();
        // Two cadence ticks, two attempts each.
        assert_eq!(attempts, 4);
        assert_eq!(summary.counters.checkpoint_failures, 2);
        assert_eq!(summary.counters.episodes_run, 6);
        assert!(summary.last_checkpoint.is_none());
    }

    #[test]
    fn test_early_stopping_on_flat_evaluation() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config {
            episodes: 40,
            eval_frequency: 1,
            checkpoint_frequency: 100,
            early_stopping: Some(EarlyStoppingConfig {
                patience: 2,
                rolling_window: 1,
                min_delta: 0.0,
            }),
            ..quick_cfg(dir.path())
        };
        let mut trainer = Trainer::new(cfg).unwrap();
        let mut saved = Vec::new();
        let summary = trainer
            .run_with(
                |_, _| Ok(aggregate(-5.0)),
                |_, episode| {
                    saved.push(episode);
                    Ok(PathBuf::from("final"))
                },
            )
            .unwrap();
        assert!(summary.stopped_early);
        assert_eq!(summary.last_episode, 3);
        // Final checkpoint on stop.
        assert_eq!(saved, vec![3]);
    }

    #[test]
    fn test_invalid_state_episodes_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config {
            episodes: 4,
            ..quick_cfg(dir.path())
        };
        let mut trainer = Trainer::new(cfg).unwrap();
        // Every slant range now lies beyond the bounds fixed at construction.
        trainer.env.channel_mut().altitude_km = 3000.0;

        let mut saved = Vec::new();
        let summary = trainer
            .run_with(
                |_, _| Ok(aggregate(-1.0)),
                |_, episode| {
                    saved.push(episode);
                    Ok(PathBuf::from(format!("ep{episode}")))
                },
            )
            .unwrap();

        assert_eq!(summary.last_episode, 4);
        assert_eq!(summary.counters.episodes_run, 4);
        assert_eq!(summary.counters.invalid_episodes, 4);
        assert_eq!(summary.counters.env_steps, 4);
        assert_eq!(summary.counters.updates, 0);
        assert_eq!(summary.replay_size, 0);
        assert_eq!(saved, vec![3, 4]);

        let history = read_history(&dir.path().join(HISTORY_FILE)).unwrap();
        assert_eq!(history.len(), 4);
        assert!(history
            .iter()
            .all(|r| r.steps == 0 && r.termination_reason.as_deref() == Some("InvalidState")));
    }

    #[test]
    fn test_early_stop_on_checkpoint_episode_saves_once() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config {
            episodes: 40,
            eval_frequency: 1,
            checkpoint_frequency: 3,
            early_stopping: Some(EarlyStoppingConfig {
                patience: 2,
                rolling_window: 1,
                min_delta: 0.0,
            }),
            ..quick_cfg(dir.path())
        };
        let mut trainer = Trainer::new(cfg).unwrap();
        let mut saved = Vec::new();
        let summary = trainer
            .run_with(
                |_, _| Ok(aggregate(-5.0)),
                |_, episode| {
                    saved.push(episode);
                    Ok(PathBuf::from(format!("ep_{episode}")))
                },
            )
            .unwrap();
        assert!(summary.stopped_early);
        assert_eq!(summary.last_episode, 3);
        assert_eq!(saved, vec![3]);
        assert_eq!(summary.counters.checkpoints_written, 1);
    }

    #[test]
    fn test_telemetry_records_training_events() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("telemetry.jsonl");
        let mut trainer = Trainer::new(quick_cfg(dir.path()))
            .unwrap()
            .with_telemetry(TelemetrySink::from_config(TelemetryConfig::jsonl(&log)));
        trainer
            .run_with(|_, _| Ok(aggregate(-1.0)), |_, ep| Ok(PathBuf::from(format!("ep_{ep}"))))
            .unwrap();
        drop(trainer);

        let events: Vec<String> = std::fs::read_to_string(&log)
            .unwrap()
            .lines()
            .map(|line| {
                let v: serde_json::Value = serde_json::from_str(line).unwrap();
                v["event"].as_str().unwrap().to_string()
            })
            .collect();
        let count = |name: &str| events.iter().filter(|e| e.as_str() == name).count();
        assert_eq!(count("episode"), 6);
        assert_eq!(count("evaluation"), 3);
        assert_eq!(count("checkpoint"), 2);
        assert_eq!(events.last().map(String::as_str), Some("training_complete"));
    }

    #[test]
    fn test_default_run_writes_loadable_checkpoints() {
        let dir = tempfile::tempdir().unwrap();
        let mut trainer = Trainer::new(quick_cfg(dir.path())).unwrap();
        let summary = trainer.run().unwrap();
        let latest = dir.path().join(CHECKPOINT_DIR).join(LATEST_CHECKPOINT);
        let ckpt = Checkpoint::load(&latest).unwrap();
        assert_eq!(ckpt.header.episodes_completed, 6);
        assert_eq!(ckpt.header.train_steps, summary.train_steps);
        assert!(dir.path().join(CHECKPOINT_DIR).join("ep_00003.ckpt").exists());
        assert_eq!(summary.evaluations.len(), 3);
    }

    #[test]
    fn test_resume_continues_episode_count() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = quick_cfg(dir.path());
        Trainer::new(cfg.clone()).unwrap().run().unwrap();

        let latest = dir.path().join(CHECKPOINT_DIR).join(LATEST_CHECKPOINT);
        let more = Config { episodes: 8, ..cfg.clone() };
        let header = Checkpoint::load(&latest).unwrap().header;
        assert!(header.same_training_config(&more));
        assert!(!header.same_training_config(&Config {
            learning_rate: 5e-4,
            ..cfg
        }));
        let mut resumed = Trainer::resume(more, &latest).unwrap();
        assert_eq!(resumed.first_episode(), 6);
        let summary = resumed.run_with(|_, _| Ok(aggregate(0.0)), |_, _| Ok(PathBuf::from("x"))).unwrap();
        assert_eq!(summary.first_episode, 7);
        assert_eq!(summary.last_episode, 8);

        let history = read_history(&dir.path().join(HISTORY_FILE)).unwrap();
        assert_eq!(history.len(), 8);
    }

    #[test]
    fn test_resume_from_missing_checkpoint_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = Trainer::resume(quick_cfg(dir.path()), &dir.path().join("absent.ckpt"));
        assert!(err.is_err());
    }
}
