//! Satpower core library.
//!
//! Learned transmit-power control for a LEO satellite downlink. A DQN agent
//! trains against a simulated pass (free-space loss, rain fade, antenna gain,
//! Doppler) to hold RSRP above a safety threshold with as little power as
//! possible. The binary (`src/main.rs`) is a thin train / evaluate / infer
//! harness around these components.
//!
//! # Layout
//!
//! - **config**: immutable, validated run configuration (YAML + env overrides)
//! - **channel**: link physics, pass geometry and the Gym-style environment
//! - **rl**: replay memory, Q-network, agent, trainer, history and checkpoints
//! - **sim_eval**: baseline controller, matched-seed evaluation, statistics
//!   and reports
//! - **serve**: deadline-bounded inference with baseline fallback
//! - **telemetry**: optional JSONL event sink

pub mod channel;
pub mod config;
pub mod rl;
pub mod serve;
pub mod sim_eval;
pub mod telemetry;

// --- Re-exports for ergonomic external use ---------------------------------

pub use config::{Config, ConfigError};

pub use channel::{
    EnvironmentError, LinkEnv, Observation, ObservationBounds, PowerAction, RewardModel, StepResult,
    TerminationReason, VecLinkEnv,
};

pub use rl::{
    Checkpoint, CheckpointError, DqnAgent, Policy, ReplayMemory, TrainBackend, Trainer, TrainingSummary,
    Transition,
};

pub use sim_eval::{BaselineController, EvaluationReport, Evaluator, PolicyAggregate};

pub use serve::{
    ActionSource, FallbackReason, FrozenQNetwork, InferenceRequest, InferenceResponse, InferenceService,
    QValueModel,
};

pub use telemetry::{TelemetryConfig, TelemetrySink};
