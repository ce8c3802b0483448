// src/rl/mod.rs
//
// Deep Q-learning for downlink power control.
//
// Key components:
// - ReplayMemory: fixed-capacity FIFO experience ring
// - QNetwork: Burn feed-forward value network, seeded initialization
// - DqnAgent: epsilon-greedy selection, Huber update, hard target sync
// - Policy: interface shared with the rule-based baseline
// - Trainer: episode loop with injected evaluation/checkpoint hooks
// - HistoryLog: append-only JSONL per-episode record
// - Checkpoint: versioned, checksummed, atomically written snapshot

pub mod agent;
pub mod checkpoint;
pub mod history;
pub mod network;
pub mod policy;
pub mod replay;
pub mod trainer;

pub use agent::{argmax, exploration_rng, weight_init_rng, AgentSettings, DqnAgent, GreedyPolicy, TrainBackend};
pub use checkpoint::{atomic_write, Checkpoint, CheckpointError, CheckpointHeader, CHECKPOINT_VERSION};
pub use history::{read_history, EpisodeRecord, HistoryLog};
pub use network::{DenseLayer, QNetwork, QNetworkConfig};
pub use policy::Policy;
pub use replay::{ReplayMemory, Transition};
pub use trainer::{
    greedy_evaluation, save_checkpoint_files, EvaluationPoint, Trainer, TrainerCounters, TrainingSummary,
};
