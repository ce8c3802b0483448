// src/channel/reward.rs
//
// Reward model for transmit power control.
//
// Violation (RSRP below threshold):
//     r = -K * (1 + (threshold - rsrp))
// Compliant:
//     r = -w_p * p_norm - w_e * min(max(rsrp - target, 0), cap)
//
// p_norm maps the transmit power linearly onto [0, 1] between the power
// limits. Config validation guarantees K > w_p + w_e * cap, so a violating
// step is always worse than any compliant step at the same power.

use serde::{Deserialize, Serialize};

use crate::config::{Config, RewardConfig};

/// Breakdown of one step's reward.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RewardComponents {
    /// Weighted power term (<= 0).
    pub power_term: f64,
    /// Penalty for margin above target (<= 0).
    pub efficiency_term: f64,
    /// Violation penalty (<= 0, zero when compliant).
    pub violation_term: f64,
    /// RSRP minus the safety threshold (dB), negative on violation.
    pub margin_db: f64,
    pub violated: bool,
    pub total: f64,
}

#[derive(Debug, Clone)]
pub struct RewardModel {
    weights: RewardConfig,
    target_rsrp: f64,
    threshold: f64,
    min_power_dbm: f64,
    max_power_dbm: f64,
}

impl RewardModel {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            weights: cfg.reward.clone(),
            target_rsrp: cfg.target_rsrp,
            threshold: cfg.rsrp_violation_threshold,
            min_power_dbm: cfg.channel.min_tx_power_dbm,
            max_power_dbm: cfg.channel.max_tx_power_dbm,
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    fn normalized_power(&self, tx_power_dbm: f64) -> f64 {
        (tx_power_dbm - self.min_power_dbm) / (self.max_power_dbm - self.min_power_dbm)
    }

    pub fn evaluate(&self, tx_power_dbm: f64, rsrp_dbm: f64) -> RewardComponents {
        let margin_db = rsrp_dbm - self.threshold;

        if rsrp_dbm < self.threshold {
            let violation_term = -self.weights.violation_penalty * (1.0 + (self.threshold - rsrp_dbm));
            return RewardComponents {
                power_term: 0.0,
                efficiency_term: 0.0,
                violation_term,
                margin_db,
                violated: true,
                total: violation_term,
            };
        }

        let power_term = -self.weights.power_penalty_weight * self.normalized_power(tx_power_dbm);
        let excess = (rsrp_dbm - self.target_rsrp)
            .max(0.0)
            .min(self.weights.efficiency_cap_db);
        let efficiency_term = -self.weights.efficiency_weight * excess;

        RewardComponents {
            power_term,
            efficiency_term,
            violation_term: 0.0,
            margin_db,
            violated: false,
            total: power_term + efficiency_term,
        }
    }

    pub fn reward(&self, tx_power_dbm: f64, rsrp_dbm: f64) -> f64 {
        self.evaluate(tx_power_dbm, rsrp_dbm).total
    }
}
