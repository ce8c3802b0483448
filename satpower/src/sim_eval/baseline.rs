// src/sim_eval/baseline.rs
//
// Rule-based power controller used as the comparison baseline and as the
// inference fallback.
//
// error = RSRP - target
//
//     error >  large band          -> large decrease
//     error >  tolerance           -> small decrease
//     |error| <= tolerance         -> hold
//     error >= -large band         -> small increase
//     otherwise                    -> large increase
//
// Stateless: the action depends only on the current RSRP.

use serde::{Deserialize, Serialize};

use crate::channel::{Observation, PowerAction};
use crate::config::{BaselineConfig, Config};
use crate::rl::Policy;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineController {
    pub target_rsrp: f64,
    pub tolerance_db: f64,
    pub large_step_band_db: f64,
}

impl BaselineController {
    pub fn new(target_rsrp: f64, cfg: &BaselineConfig) -> Self {
        Self {
            target_rsrp,
            tolerance_db: cfg.tolerance_db,
            large_step_band_db: cfg.large_step_band_db,
        }
    }

    pub fn from_config(cfg: &Config) -> Self {
        Self::new(cfg.target_rsrp, &cfg.baseline)
    }

    /// Ladder step for an RSRP error (dB). Non-finite errors hold power.
    pub fn action_for_error(&self, error_db: f64) -> PowerAction {
        if !error_db.is_finite() {
            return PowerAction::Hold;
        }
        if error_db > self.large_step_band_db {
            PowerAction::LargeDecrease
        } else if error_db > self.tolerance_db {
            PowerAction::SmallDecrease
        } else if error_db >= -self.tolerance_db {
            PowerAction::Hold
        } else if error_db >= -self.large_step_band_db {
            PowerAction::SmallIncrease
        } else {
            PowerAction::LargeIncrease
        }
    }

    pub fn decide(&self, obs: &Observation) -> PowerAction {
        self.action_for_error(obs.rsrp_dbm - self.target_rsrp)
    }
}

impl Policy for BaselineController {
    fn name(&self) -> &str {
        "baseline"
    }

    fn act(&self, obs: &Observation) -> PowerAction {
        self.decide(obs)
    }
}
