// src/channel/sim_env.rs
//
// Gym-style environment for one satellite pass.
//
// - LinkEnv: reset(seed) -> Observation, step(action) -> StepResult
// - VecLinkEnv: several independently seeded passes stepped in lockstep
// - Deterministic given the reset seed
//
// Episodes end at the step cap or as soon as RSRP drops below the outage
// cutoff. A physically invalid state ends the episode with InvalidState.

use std::fmt;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use super::action::PowerAction;
use super::observation::{Observation, ObservationBounds, RSRP_CEIL_DBM, RSRP_FLOOR_DBM};
use super::pass::{PassProfile, PassState};
use super::physics::{antenna_gain_dbi, free_space_path_loss_db, rain_attenuation_db, LinkBudget};
use super::reward::{RewardComponents, RewardModel};
use crate::config::{ChannelConfig, Config, ConfigError};

/// Why an episode ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TerminationReason {
    /// Step cap reached.
    EpisodeLength,
    /// RSRP fell below the hard failure cutoff.
    Outage,
    /// The simulated state left physical bounds.
    InvalidState,
    /// `step` called after the episode had already ended.
    AlreadyDone,
}

impl TerminationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            TerminationReason::EpisodeLength => "EpisodeLength",
            TerminationReason::Outage => "Outage",
            TerminationReason::InvalidState => "InvalidState",
            TerminationReason::AlreadyDone => "AlreadyDone",
        }
    }
}

/// Result of a single environment step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    /// The observation after taking the action.
    pub observation: Observation,
    pub reward: f64,
    /// Whether the episode has terminated.
    pub done: bool,
    pub info: StepInfo,
}

/// Additional information returned from a step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepInfo {
    /// Step index after this step (1-based).
    pub step: usize,
    /// Simulated time since reset (s).
    pub elapsed_s: f64,
    pub termination_reason: Option<TerminationReason>,
    /// RSRP below the soft safety threshold.
    pub violation: bool,
    /// RSRP below the hard failure cutoff.
    pub outage: bool,
    pub reward_components: Option<RewardComponents>,
    pub link_budget: Option<LinkBudget>,
}

/// A simulated state that cannot be observed.
#[derive(Debug, Clone, PartialEq)]
pub struct EnvironmentError {
    pub step: usize,
    pub message: String,
}

impl fmt::Display for EnvironmentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid simulated state at step {}: {}", self.step, self.message)
    }
}

impl std::error::Error for EnvironmentError {}

/// Simulated downlink over one LEO pass.
pub struct LinkEnv {
    channel: ChannelConfig,
    reward_model: RewardModel,
    bounds: ObservationBounds,
    episode_length: usize,
    outage_threshold: f64,
    rng: ChaCha8Rng,
    pass: PassProfile,
    tx_power_dbm: f64,
    rain_rate_mm_h: f64,
    step: usize,
    done: bool,
    seed: u64,
    last_observation: Observation,
}

impl LinkEnv {
    /// Build an environment; the configuration is validated here.
    pub fn new(cfg: &Config) -> Result<Self, ConfigError> {
        cfg.validate()?;
        let channel = cfg.channel.clone();
        let bounds = ObservationBounds::from_channel(&channel);
        let pass = PassProfile::new(&channel, 90.0, cfg.episode_length);

        let mut env = Self {
            reward_model: RewardModel::from_config(cfg),
            bounds,
            episode_length: cfg.episode_length,
            outage_threshold: cfg.rsrp_outage_threshold,
            rng: ChaCha8Rng::seed_from_u64(cfg.seed),
            pass,
            tx_power_dbm: channel.initial_tx_power_dbm,
            rain_rate_mm_h: 0.0,
            step: 0,
            done: false,
            seed: cfg.seed,
            last_observation: Observation {
                elevation_deg: 0.0,
                slant_range_km: channel.altitude_km,
                rain_rate_mm_h: 0.0,
                rsrp_dbm: RSRP_FLOOR_DBM,
                doppler_hz: 0.0,
                tx_power_dbm: channel.initial_tx_power_dbm,
            },
            channel,
        };
        env.reset(Some(cfg.seed));
        Ok(env)
    }

    /// Start a fresh pass. Without a seed, one is drawn from the current RNG.
    pub fn reset(&mut self, seed: Option<u64>) -> Observation {
        let seed = seed.unwrap_or_else(|| self.rng.gen());
        self.seed = seed;
        self.rng = ChaCha8Rng::seed_from_u64(seed);

        let peak = self
            .rng
            .gen_range(self.channel.min_peak_elevation_deg..=90.0);
        self.pass = PassProfile::new(&self.channel, peak, self.episode_length);

        // Squared uniform skews towards light rain.
        let u: f64 = self.rng.gen();
        self.rain_rate_mm_h = u * u * self.channel.max_rain_rate_mm_h;

        self.tx_power_dbm = self.channel.initial_tx_power_dbm;
        self.step = 0;
        self.done = false;

        let pass_state = self.pass.state_at(0);
        let budget = self.link_budget(&pass_state);
        self.last_observation = self.observe(&pass_state, &budget);
        self.last_observation
    }

    pub fn step(&mut self, action: PowerAction) -> StepResult {
        if self.done {
            return StepResult {
                observation: self.last_observation,
                reward: 0.0,
                done: true,
                info: StepInfo {
                    step: self.step,
                    elapsed_s: self.elapsed_s(),
                    termination_reason: Some(TerminationReason::AlreadyDone),
                    violation: false,
                    outage: false,
                    reward_components: None,
                    link_budget: None,
                },
            };
        }

        self.step += 1;
        self.tx_power_dbm = (self.tx_power_dbm + action.delta_db())
            .clamp(self.channel.min_tx_power_dbm, self.channel.max_tx_power_dbm);
        self.advance_rain();

        let pass_state = self.pass.state_at(self.step);
        let budget = self.link_budget(&pass_state);

        if let Err(err) = self.check_state(&pass_state, &budget) {
            eprintln!("[env] WARN: seed={} {}; ending episode", self.seed, err);
            self.done = true;
            return StepResult {
                observation: self.last_observation,
                reward: 0.0,
                done: true,
                info: StepInfo {
                    step: self.step,
                    elapsed_s: self.elapsed_s(),
                    termination_reason: Some(TerminationReason::InvalidState),
                    violation: false,
                    outage: false,
                    reward_components: None,
                    link_budget: Some(budget),
                },
            };
        }

        let components = self.reward_model.evaluate(self.tx_power_dbm, budget.rsrp_dbm);
        let outage = budget.rsrp_dbm < self.outage_threshold;
        let termination_reason = if outage {
            Some(TerminationReason::Outage)
        } else if self.step >= self.episode_length {
            Some(TerminationReason::EpisodeLength)
        } else {
            None
        };
        self.done = termination_reason.is_some();
        self.last_observation = self.observe(&pass_state, &budget);

        StepResult {
            observation: self.last_observation,
            reward: components.total,
            done: self.done,
            info: StepInfo {
                step: self.step,
                elapsed_s: self.elapsed_s(),
                termination_reason,
                violation: components.violated,
                outage,
                reward_components: Some(components),
                link_budget: Some(budget),
            },
        }
    }

    fn advance_rain(&mut self) {
        if self.channel.rain_walk_std_mm_h <= 0.0 {
            return;
        }
        // Uniform increment; variance grows linearly with the step duration.
        let std = self.channel.rain_walk_std_mm_h * self.channel.step_interval_s.sqrt();
        let half_width = std * 3f64.sqrt();
        let delta = self.rng.gen_range(-half_width..=half_width);
        self.rain_rate_mm_h =
            (self.rain_rate_mm_h + delta).clamp(0.0, self.channel.max_rain_rate_mm_h);
    }

    fn link_budget(&self, pass: &PassState) -> LinkBudget {
        let c = &self.channel;
        LinkBudget::compute(
            self.tx_power_dbm,
            c.tx_antenna_gain_dbi,
            antenna_gain_dbi(pass.elevation_deg, c.rx_peak_gain_dbi, c.rx_gain_rolloff_db),
            free_space_path_loss_db(pass.slant_range_km, c.carrier_freq_ghz),
            rain_attenuation_db(
                self.rain_rate_mm_h,
                pass.elevation_deg,
                c.carrier_freq_ghz,
                c.rain_height_km,
            ),
            c.misc_losses_db,
        )
    }

    fn check_state(&self, pass: &PassState, budget: &LinkBudget) -> Result<(), EnvironmentError> {
        if !budget.is_finite() {
            return Err(EnvironmentError {
                step: self.step,
                message: format!("non-finite link budget {:?}", budget),
            });
        }
        let (el_lo, el_hi) = self.bounds.elevation_deg;
        let (r_lo, r_hi) = self.bounds.slant_range_km;
        let (d_lo, d_hi) = self.bounds.doppler_hz;
        let slack = 1e-6;
        if !(pass.elevation_deg >= el_lo && pass.elevation_deg <= el_hi)
            || !(pass.slant_range_km >= r_lo - slack && pass.slant_range_km <= r_hi + slack)
            || !(pass.doppler_hz >= d_lo && pass.doppler_hz <= d_hi)
        {
            return Err(EnvironmentError {
                step: self.step,
                message: format!("pass geometry out of bounds {:?}", pass),
            });
        }
        Ok(())
    }

    fn observe(&self, pass: &PassState, budget: &LinkBudget) -> Observation {
        let (r_lo, r_hi) = self.bounds.slant_range_km;
        Observation {
            elevation_deg: pass.elevation_deg,
            slant_range_km: pass.slant_range_km.clamp(r_lo, r_hi),
            rain_rate_mm_h: self.rain_rate_mm_h,
            rsrp_dbm: budget.rsrp_dbm.clamp(RSRP_FLOOR_DBM, RSRP_CEIL_DBM),
            doppler_hz: pass.doppler_hz,
            tx_power_dbm: self.tx_power_dbm,
        }
    }

    pub fn bounds(&self) -> &ObservationBounds {
        &self.bounds
    }

    /// Channel parameters used by later resets; bounds stay as built.
    #[cfg(test)]
    pub(crate) fn channel_mut(&mut self) -> &mut ChannelConfig {
        &mut self.channel
    }

    fn elapsed_s(&self) -> f64 {
        self.step as f64 * self.channel.step_interval_s
    }

    pub fn reward_model(&self) -> &RewardModel {
        &self.reward_model
    }

    pub fn episode_length(&self) -> usize {
        self.episode_length
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Steps taken in the current episode.
    pub fn step_index(&self) -> usize {
        self.step
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn last_observation(&self) -> Observation {
        self.last_observation
    }

    pub fn peak_elevation_deg(&self) -> f64 {
        self.pass.peak_elevation_deg
    }
}

/// Independently seeded environments stepped together.
pub struct VecLinkEnv {
    envs: Vec<LinkEnv>,
}

impl VecLinkEnv {
    pub fn new(n: usize, cfg: &Config) -> Result<Self, ConfigError> {
        let envs = (0..n)
            .map(|_| LinkEnv::new(cfg))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { envs })
    }

    pub fn num_envs(&self) -> usize {
        self.envs.len()
    }

    /// Reset every environment with its own seed.
    ///
    /// Missing seeds are drawn from each environment's RNG.
    pub fn reset_all(&mut self, seeds: Option<&[u64]>) -> Vec<Observation> {
        self.envs
            .iter_mut()
            .enumerate()
            .map(|(i, env)| {
                let seed = seeds.and_then(|s| s.get(i).copied());
                env.reset(seed)
            })
            .collect()
    }

    /// Step all environments; finished ones return AlreadyDone results.
    pub fn step(&mut self, actions: &[PowerAction]) -> Vec<StepResult> {
        assert_eq!(
            actions.len(),
            self.envs.len(),
            "actions length must match number of envs"
        );
        self.envs
            .iter_mut()
            .zip(actions.iter())
            .map(|(env, action)| env.step(*action))
            .collect()
    }

    pub fn all_done(&self) -> bool {
        self.envs.iter().all(|e| e.is_done())
    }

    pub fn env(&self, index: usize) -> Option<&LinkEnv> {
        self.envs.get(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env() -> LinkEnv {
        LinkEnv::new(&Config::smoke()).unwrap()
    }

    #[test]
    fn test_zero_episode_length_fails_at_construction() {
        let cfg = Config {
            episode_length: 0,
            ..Config::smoke()
        };
        assert!(LinkEnv::new(&cfg).is_err());
    }

    #[test]
    fn test_reset_is_deterministic() {
        let mut a = env();
        let mut b = env();
        assert_eq!(a.reset(Some(11)), b.reset(Some(11)));
        assert_ne!(a.reset(Some(11)), b.reset(Some(12)));
    }

    #[test]
    fn test_reset_observations_in_bounds() {
        let mut e = env();
        for seed in 0..200 {
            let obs = e.reset(Some(seed));
            assert!(obs.is_within(e.bounds()), "seed {seed}: {:?}", obs.violations(e.bounds()));
        }
    }

    #[test]
    fn test_episode_respects_step_cap() {
        let mut e = env();
        e.reset(Some(3));
        let mut steps = 0;
        loop {
            let r = e.step(PowerAction::Hold);
            steps += 1;
            assert!(r.observation.is_within(e.bounds()));
            if r.done {
                assert!(matches!(
                    r.info.termination_reason,
                    Some(TerminationReason::EpisodeLength) | Some(TerminationReason::Outage)
                ));
                break;
            }
        }
        assert!(steps <= e.episode_length());
    }

    #[test]
    fn test_outage_terminates_early() {
        let mut e = env();
        e.reset(Some(5));
        let mut last = None;
        for _ in 0..e.episode_length() {
            let r = e.step(PowerAction::LargeDecrease);
            if r.done {
                last = Some(r);
                break;
            }
        }
        let r = last.unwrap();
        assert_eq!(r.info.termination_reason, Some(TerminationReason::Outage));
        assert!(r.info.outage && r.info.violation);
        assert!(r.reward < -10.0);
        assert!(e.step_index() < e.episode_length());
    }

    #[test]
    fn test_step_after_done_is_inert() {
        let mut e = env();
        e.reset(Some(1));
        while !e.step(PowerAction::Hold).done {}
        let r = e.step(PowerAction::LargeIncrease);
        assert!(r.done);
        assert_eq!(r.reward, 0.0);
        assert_eq!(r.info.termination_reason, Some(TerminationReason::AlreadyDone));
    }

    #[test]
    fn test_power_stays_within_limits() {
        let mut e = env();
        e.reset(Some(9));
        for _ in 0..e.episode_length() {
            let r = e.step(PowerAction::LargeIncrease);
            assert!(r.observation.tx_power_dbm <= 46.0);
            if r.done {
                break;
            }
        }
    }

    #[test]
    fn test_non_finite_budget_is_environment_error() {
        let e = env();
        let pass = e.pass.state_at(1);
        let mut budget = e.link_budget(&pass);
        budget.rsrp_dbm = f64::NAN;
        let err = e.check_state(&pass, &budget).unwrap_err();
        assert!(err.to_string().contains("non-finite"));
    }

    #[test]
    fn test_step_interval_scales_rain_walk_and_clock() {
        let base = Config {
            rsrp_violation_threshold: -150.0,
            rsrp_outage_threshold: -199.0,
            ..Config::smoke()
        };
        let slow = Config {
            channel: ChannelConfig {
                step_interval_s: 60.0,
                ..base.channel.clone()
            },
            ..base.clone()
        };
        let mut fast_env = LinkEnv::new(&base).unwrap();
        let mut slow_env = LinkEnv::new(&slow).unwrap();
        let mut prev_fast = fast_env.reset(Some(4)).rain_rate_mm_h;
        let mut prev_slow = slow_env.reset(Some(4)).rain_rate_mm_h;
        assert_eq!(prev_fast, prev_slow);

        let (mut moved_fast, mut moved_slow) = (0.0, 0.0);
        for step in 1..=base.episode_length {
            let f = fast_env.step(PowerAction::Hold);
            let s = slow_env.step(PowerAction::Hold);
            assert_eq!(f.info.elapsed_s, step as f64);
            assert_eq!(s.info.elapsed_s, step as f64 * 60.0);
            moved_fast += (f.observation.rain_rate_mm_h - prev_fast).abs();
            moved_slow += (s.observation.rain_rate_mm_h - prev_slow).abs();
            prev_fast = f.observation.rain_rate_mm_h;
            prev_slow = s.observation.rain_rate_mm_h;
            assert!(!f.info.outage && !s.info.outage);
        }
        assert!(moved_slow > moved_fast, "slow {moved_slow} fast {moved_fast}");
    }

    #[test]
    fn test_vec_env_matches_single_envs() {
        let cfg = Config::smoke();
        let mut venv = VecLinkEnv::new(3, &cfg).unwrap();
        let obs = venv.reset_all(Some(&[1, 2, 3]));
        for (i, o) in obs.iter().enumerate() {
            let mut single = LinkEnv::new(&cfg).unwrap();
            assert_eq!(*o, single.reset(Some(i as u64 + 1)));
        }
        let results = venv.step(&[PowerAction::Hold; 3]);
        assert_eq!(results.len(), 3);
    }
}
