// src/rl/policy.rs
//
// Policy interface shared by the learned agent and the rule-based baseline,
// so evaluation can drive either through the same rollout code.

use crate::channel::{Observation, PowerAction};

pub trait Policy {
    /// Short identifier used in reports.
    fn name(&self) -> &str;

    /// Choose an action for an observation.
    fn act(&self, obs: &Observation) -> PowerAction;

    /// Choose actions for several observations at once.
    fn act_batch(&self, observations: &[Observation]) -> Vec<PowerAction> {
        observations.iter().map(|o| self.act(o)).collect()
    }
}
