// src/channel/mod.rs
//
// Satellite downlink simulation: physics, pass geometry, observations,
// actions, reward and the Gym-style environment.

pub mod action;
pub mod observation;
pub mod pass;
pub mod physics;
pub mod reward;
pub mod sim_env;

pub use action::{PowerAction, ACTION_VERSION};
pub use observation::{Observation, ObservationBounds, OBS_DIM, OBS_VERSION};
pub use pass::{PassProfile, PassState};
pub use physics::LinkBudget;
pub use reward::{RewardComponents, RewardModel};
pub use sim_env::{EnvironmentError, LinkEnv, StepInfo, StepResult, TerminationReason, VecLinkEnv};
