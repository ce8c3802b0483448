// src/sim_eval/rollout.rs
//
// Policy rollouts and per-episode link statistics.
//
// Shared by the trainer (per-episode history, periodic greedy evaluation)
// and the evaluator (matched-seed policy comparison).

use serde::{Deserialize, Serialize};

use crate::channel::physics::{dbm_to_mw, mw_to_dbm};
use crate::channel::{Observation, StepResult, TerminationReason, VecLinkEnv};
use crate::config::{Config, ConfigError};
use crate::rl::Policy;

/// Running statistics of one episode.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EpisodeStats {
    pub seed: u64,
    pub steps: usize,
    pub total_reward: f64,
    pub violations: usize,
    pub outages: usize,
    tx_power_dbm_sum: f64,
    tx_power_mw_sum: f64,
    rsrp_dbm_sum: f64,
    pub termination_reason: Option<TerminationReason>,
}

impl EpisodeStats {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            ..Self::default()
        }
    }

    /// Fold one step in. Steps that ended on an invalid state carry no link
    /// data and only record the termination.
    pub fn record(&mut self, result: &StepResult) {
        if result.done {
            self.termination_reason = result.info.termination_reason;
        }
        if result.info.reward_components.is_none() {
            return;
        }
        let obs = &result.observation;
        self.steps += 1;
        self.total_reward += result.reward;
        self.tx_power_dbm_sum += obs.tx_power_dbm;
        self.tx_power_mw_sum += dbm_to_mw(obs.tx_power_dbm);
        self.rsrp_dbm_sum += obs.rsrp_dbm;
        if result.info.violation {
            self.violations += 1;
        }
        if result.info.outage {
            self.outages += 1;
        }
    }

    fn per_step(&self, sum: f64) -> f64 {
        if self.steps == 0 {
            0.0
        } else {
            sum / self.steps as f64
        }
    }

    pub fn mean_tx_power_dbm(&self) -> f64 {
        self.per_step(self.tx_power_dbm_sum)
    }

    /// Mean linear transmit power expressed in dBm.
    pub fn mean_tx_power_linear_dbm(&self) -> f64 {
        let mw = self.per_step(self.tx_power_mw_sum);
        if mw > 0.0 {
            mw_to_dbm(mw)
        } else {
            f64::NEG_INFINITY
        }
    }

    pub fn mean_rsrp_dbm(&self) -> f64 {
        self.per_step(self.rsrp_dbm_sum)
    }

    pub fn violation_rate(&self) -> f64 {
        self.per_step(self.violations as f64)
    }

    pub fn outage_rate(&self) -> f64 {
        self.per_step(self.outages as f64)
    }

    /// Energy saved against a fixed-power link at `reference_dbm`, in percent.
    pub fn power_savings_pct(&self, reference_dbm: f64) -> f64 {
        let mean_mw = self.per_step(self.tx_power_mw_sum);
        if self.steps == 0 {
            return 0.0;
        }
        100.0 * (1.0 - mean_mw / dbm_to_mw(reference_dbm))
    }
}

/// Run one episode per seed with `policy`, all environments in lockstep.
pub fn rollout_episodes<P: Policy + ?Sized>(
    cfg: &Config,
    policy: &P,
    seeds: &[u64],
) -> Result<Vec<EpisodeStats>, ConfigError> {
    let mut venv = VecLinkEnv::new(seeds.len(), cfg)?;
    let mut observations: Vec<Observation> = venv.reset_all(Some(seeds));
    let mut stats: Vec<EpisodeStats> = seeds.iter().map(|s| EpisodeStats::new(*s)).collect();
    let mut active: Vec<bool> = vec![true; seeds.len()];

    while active.iter().any(|a| *a) {
        let actions = policy.act_batch(&observations);
        let results = venv.step(&actions);
        for (i, result) in results.into_iter().enumerate() {
            if !active[i] {
                continue;
            }
            stats[i].record(&result);
            observations[i] = result.observation;
            if result.done {
                active[i] = false;
            }
        }
    }
    Ok(stats)
}
