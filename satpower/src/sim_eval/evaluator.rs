// src/sim_eval/evaluator.rs
//
// Matched-seed comparison of a policy against the baseline controller.
//
// Both policies run the same held-out episodes (seeds eval_seed_base + k).
// Per-episode mean transmit power is compared with Welch's t-test; an
// improvement is only claimed when p < significance_level AND the agent's
// mean power is below the baseline's.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use super::baseline::BaselineController;
use super::rollout::{rollout_episodes, EpisodeStats};
use super::stats::{welch_t_test, Summary, TTestResult};
use crate::config::{Config, ConfigError};
use crate::rl::Policy;

/// Aggregate metrics of one policy over a set of episodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyAggregate {
    pub policy: String,
    pub episodes: usize,
    /// Mean and std over episodes of the per-episode mean transmit power (dBm).
    pub mean_power_dbm: f64,
    pub std_power_dbm: f64,
    pub mean_rsrp_dbm: f64,
    /// Fraction of all steps below the violation threshold.
    pub violation_rate: f64,
    /// Fraction of all steps below the outage cutoff.
    pub outage_rate: f64,
    /// Fraction of episodes that ended in outage.
    pub outage_episode_rate: f64,
    pub mean_episode_reward: f64,
    pub std_episode_reward: f64,
    pub mean_power_savings_pct: f64,
    pub total_steps: usize,
}

impl PolicyAggregate {
    pub fn from_episodes(policy: &str, episodes: &[EpisodeStats], reference_tx_power_dbm: f64) -> Self {
        let power: Vec<f64> = episodes.iter().map(EpisodeStats::mean_tx_power_dbm).collect();
        let rewards: Vec<f64> = episodes.iter().map(|e| e.total_reward).collect();
        let savings: Vec<f64> = episodes
            .iter()
            .map(|e| e.power_savings_pct(reference_tx_power_dbm))
            .collect();
        let power_summary = Summary::of(&power);
        let reward_summary = Summary::of(&rewards);

        let total_steps: usize = episodes.iter().map(|e| e.steps).sum();
        let violations: usize = episodes.iter().map(|e| e.violations).sum();
        let outages: usize = episodes.iter().map(|e| e.outages).sum();
        let outage_episodes = episodes.iter().filter(|e| e.outages > 0).count();
        let rsrp_sum: f64 = episodes
            .iter()
            .map(|e| e.mean_rsrp_dbm() * e.steps as f64)
            .sum();

        let per_step = |x: f64| if total_steps == 0 { 0.0 } else { x / total_steps as f64 };
        let per_episode = |x: f64| {
            if episodes.is_empty() {
                0.0
            } else {
                x / episodes.len() as f64
            }
        };

        Self {
            policy: policy.to_string(),
            episodes: episodes.len(),
            mean_power_dbm: power_summary.mean,
            std_power_dbm: power_summary.std,
            mean_rsrp_dbm: per_step(rsrp_sum),
            violation_rate: per_step(violations as f64),
            outage_rate: per_step(outages as f64),
            outage_episode_rate: per_episode(outage_episodes as f64),
            mean_episode_reward: reward_summary.mean,
            std_episode_reward: reward_summary.std,
            mean_power_savings_pct: Summary::of(&savings).mean,
            total_steps,
        }
    }
}

/// One held-out episode seen by both policies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchedEpisode {
    pub seed: u64,
    pub agent_power_dbm: f64,
    pub baseline_power_dbm: f64,
    pub agent_reward: f64,
    pub baseline_reward: f64,
    pub agent_violations: usize,
    pub baseline_violations: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub agent: PolicyAggregate,
    pub baseline: PolicyAggregate,
    /// Welch t-test on per-episode mean power, agent minus baseline.
    pub power_test: TTestResult,
    pub significance_level: f64,
    pub improvement: bool,
    pub seeds: Vec<u64>,
    pub matched_episodes: Vec<MatchedEpisode>,
    pub config_fingerprint: String,
    pub generated_unix_ms: u64,
}

impl EvaluationReport {
    pub fn p_value(&self) -> f64 {
        self.power_test.p_value
    }

    /// Mean power difference, agent minus baseline (dB).
    pub fn power_delta_db(&self) -> f64 {
        self.power_test.mean_difference
    }
}

/// Runs comparisons and counts them.
pub struct Evaluator {
    cfg: Config,
    baseline: BaselineController,
    comparisons_run: u64,
    episodes_run: u64,
}

impl Evaluator {
    pub fn new(cfg: &Config) -> Result<Self, ConfigError> {
        cfg.validate()?;
        Ok(Self {
            baseline: BaselineController::from_config(cfg),
            cfg: cfg.clone(),
            comparisons_run: 0,
            episodes_run: 0,
        })
    }

    /// `count` held-out seeds starting at `eval_seed_base`.
    pub fn held_out_seeds(&self, count: usize) -> Vec<u64> {
        (0..count as u64)
            .map(|k| self.cfg.eval_seed_base.wrapping_add(k))
            .collect()
    }

    pub fn baseline(&self) -> &BaselineController {
        &self.baseline
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    /// Run `policy` on `seeds` and aggregate.
    pub fn evaluate_policy<P: Policy + ?Sized>(
        &mut self,
        policy: &P,
        seeds: &[u64],
    ) -> Result<(PolicyAggregate, Vec<EpisodeStats>), ConfigError> {
        let episodes = rollout_episodes(&self.cfg, policy, seeds)?;
        self.episodes_run += episodes.len() as u64;
        let aggregate = PolicyAggregate::from_episodes(
            policy.name(),
            &episodes,
            self.cfg.channel.reference_tx_power_dbm,
        );
        Ok((aggregate, episodes))
    }

    /// Compare `agent` with the baseline over `episodes` held-out episodes.
    pub fn compare<P: Policy + ?Sized>(
        &mut self,
        agent: &P,
        episodes: usize,
    ) -> Result<EvaluationReport, ConfigError> {
        let seeds = self.held_out_seeds(episodes);
        self.compare_on_seeds(agent, &seeds)
    }

    pub fn compare_on_seeds<P: Policy + ?Sized>(
        &mut self,
        agent: &P,
        seeds: &[u64],
    ) -> Result<EvaluationReport, ConfigError> {
        if seeds.is_empty() {
            return Err(ConfigError::Validation {
                field: "eval_episodes".to_string(),
                message: "evaluation needs at least one episode".to_string(),
            });
        }

        let (agent_agg, agent_eps) = self.evaluate_policy(agent, seeds)?;
        let baseline = self.baseline.clone();
        let (baseline_agg, baseline_eps) = self.evaluate_policy(&baseline, seeds)?;

        let agent_power: Vec<f64> = agent_eps.iter().map(EpisodeStats::mean_tx_power_dbm).collect();
        let baseline_power: Vec<f64> = baseline_eps
            .iter()
            .map(EpisodeStats::mean_tx_power_dbm)
            .collect();
        let power_test = welch_t_test(&agent_power, &baseline_power);
        let alpha = self.cfg.significance_level;
        let improvement = power_test.is_significant(alpha) && agent_agg.mean_power_dbm < baseline_agg.mean_power_dbm;

        let matched_episodes = agent_eps
            .iter()
            .zip(&baseline_eps)
            .map(|(a, b)| MatchedEpisode {
                seed: a.seed,
                agent_power_dbm: a.mean_tx_power_dbm(),
                baseline_power_dbm: b.mean_tx_power_dbm(),
                agent_reward: a.total_reward,
                baseline_reward: b.total_reward,
                agent_violations: a.violations,
                baseline_violations: b.violations,
            })
            .collect();

        self.comparisons_run += 1;

        Ok(EvaluationReport {
            agent: agent_agg,
            baseline: baseline_agg,
            power_test,
            significance_level: alpha,
            improvement,
            seeds: seeds.to_vec(),
            matched_episodes,
            config_fingerprint: self.cfg.fingerprint(),
            generated_unix_ms: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis() as u64)
                .unwrap_or(0),
        })
    }

    pub fn comparisons_run(&self) -> u64 {
        self.comparisons_run
    }

    /// Episodes rolled out across all policies.
    pub fn episodes_run(&self) -> u64 {
        self.episodes_run
    }
}
