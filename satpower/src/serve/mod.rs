// src/serve/mod.rs
//
// Production inference: frozen network plus deadline-bounded service.

pub mod frozen;
pub mod inference;

pub use frozen::{FrozenQNetwork, QValueModel};
pub use inference::{
    ActionSource, FallbackReason, InferenceError, InferenceRequest, InferenceResponse, InferenceService,
    InferenceStats,
};
