// src/serve/inference.rs
//
// Deadline-bounded power decisions with baseline fallback.
//
// Each request runs the network on the blocking pool under a timeout of
// (deadline - fallback_reserve). The baseline controller answers instead when:
//
// - the network misses the timeout
// - the network output has the wrong shape or non-finite values
// - the network returns an error or panics
// - no model is loaded, or the request observation is non-finite
//
// None of these reach the caller as errors; they show up as
// source = "fallback", a fallback_reason, and the instance counters.
//
// The loaded model is immutable and shared behind an Arc. reload() swaps the
// Arc; requests already running keep the model they started with.

use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;

use super::frozen::{FrozenQNetwork, QValueModel};
use crate::channel::{Observation, PowerAction};
use crate::config::InferenceConfig;
use crate::rl::{argmax, Checkpoint, CheckpointError};
use crate::sim_eval::BaselineController;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionSource {
    Network,
    Fallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
    Timeout,
    NonFiniteOutput,
    ModelError,
    NoModel,
    InvalidObservation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceRequest {
    pub observation: Observation,
    /// Per-request deadline; the service default applies when absent.
    #[serde(default)]
    pub deadline_ms: Option<u64>,
}

impl InferenceRequest {
    pub fn new(observation: Observation) -> Self {
        Self {
            observation,
            deadline_ms: None,
        }
    }

    pub fn with_deadline_ms(mut self, deadline_ms: u64) -> Self {
        self.deadline_ms = Some(deadline_ms);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceResponse {
    pub action: PowerAction,
    pub delta_db: f64,
    pub source: ActionSource,
    /// Wall time from request entry to response (microseconds).
    pub latency_us: u64,
    /// Softmax probability of the chosen action; None on fallback.
    pub confidence: Option<f64>,
    pub fallback_reason: Option<FallbackReason>,
}

/// Failures inside the network path. Never returned from `infer`.
#[derive(Debug, Clone, PartialEq)]
pub enum InferenceError {
    NonFinite { index: usize },
    Shape { reason: String },
    Model { reason: String },
}

impl fmt::Display for InferenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InferenceError::NonFinite { index } => {
                write!(f, "non-finite Q-value at action {}", index)
            }
            InferenceError::Shape { reason } => write!(f, "network shape mismatch: {}", reason),
            InferenceError::Model { reason } => write!(f, "model failure: {}", reason),
        }
    }
}

impl std::error::Error for InferenceError {}

/// Snapshot of the service counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InferenceStats {
    pub requests: u64,
    pub network: u64,
    pub fallbacks: u64,
    pub timeouts: u64,
    pub non_finite: u64,
    pub errors: u64,
    pub invalid_requests: u64,
    pub reloads: u64,
    pub reload_failures: u64,
}

impl InferenceStats {
    pub fn fallback_rate(&self) -> f64 {
        if self.requests == 0 {
            0.0
        } else {
            self.fallbacks as f64 / self.requests as f64
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    requests: AtomicU64,
    network: AtomicU64,
    fallbacks: AtomicU64,
    timeouts: AtomicU64,
    non_finite: AtomicU64,
    errors: AtomicU64,
    invalid_requests: AtomicU64,
    reloads: AtomicU64,
    reload_failures: AtomicU64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

pub struct InferenceService {
    model: RwLock<Option<Arc<dyn QValueModel>>>,
    baseline: BaselineController,
    cfg: InferenceConfig,
    limiter: Option<Arc<Semaphore>>,
    counters: Counters,
}

impl InferenceService {
    /// Load a checkpoint for serving. Any checkpoint problem fails here.
    pub fn load(path: &Path, cfg: &InferenceConfig) -> Result<Self, CheckpointError> {
        let ckpt = Checkpoint::load(path)?;
        let model = FrozenQNetwork::from_checkpoint(&ckpt)?;
        let baseline = BaselineController::new(ckpt.header.target_rsrp, &ckpt.header.baseline);
        Ok(Self::with_model(Arc::new(model), baseline, cfg))
    }

    pub fn with_model(model: Arc<dyn QValueModel>, baseline: BaselineController, cfg: &InferenceConfig) -> Self {
        let mut service = Self::fallback_only(baseline, cfg);
        service.model = RwLock::new(Some(model));
        service
    }

    /// Service with no network; every request is answered by the baseline.
    pub fn fallback_only(baseline: BaselineController, cfg: &InferenceConfig) -> Self {
        Self {
            model: RwLock::new(None),
            baseline,
            limiter: (cfg.max_concurrency > 0).then(|| Arc::new(Semaphore::new(cfg.max_concurrency))),
            cfg: cfg.clone(),
            counters: Counters::default(),
        }
    }

    /// Swap in a new checkpoint. On failure the current model keeps serving.
    pub fn reload(&self, path: &Path) -> Result<(), CheckpointError> {
        let loaded = Checkpoint::load(path).and_then(|ckpt| FrozenQNetwork::from_checkpoint(&ckpt));
        match loaded {
            Ok(model) => {
                self.replace_model(Arc::new(model));
                bump(&self.counters.reloads);
                Ok(())
            }
            Err(e) => {
                bump(&self.counters.reload_failures);
                eprintln!(
                    "[inference] WARN: reload of {} failed, keeping current model: {}",
                    path.display(),
                    e
                );
                Err(e)
            }
        }
    }

    pub fn replace_model(&self, model: Arc<dyn QValueModel>) {
        let mut slot = match self.model.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *slot = Some(model);
    }

    fn current_model(&self) -> Option<Arc<dyn QValueModel>> {
        match self.model.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn has_model(&self) -> bool {
        self.current_model().is_some()
    }

    pub async fn infer(&self, request: InferenceRequest) -> InferenceResponse {
        let started = Instant::now();
        bump(&self.counters.requests);

        let obs = request.observation;
        if !observation_is_finite(&obs) {
            bump(&self.counters.invalid_requests);
            return self.fallback(&obs, FallbackReason::InvalidObservation, started);
        }
        let model = match self.current_model() {
            Some(m) => m,
            None => return self.fallback(&obs, FallbackReason::NoModel, started),
        };

        let deadline = Duration::from_millis(request.deadline_ms.unwrap_or(self.cfg.default_deadline_ms));
        let budget = deadline.saturating_sub(Duration::from_millis(self.cfg.fallback_reserve_ms));
        if budget.is_zero() {
            bump(&self.counters.timeouts);
            return self.fallback(&obs, FallbackReason::Timeout, started);
        }

        let limiter = self.limiter.clone();
        let work = async move {
            let permit = match limiter {
                Some(sem) => Some(sem.acquire_owned().await.map_err(|e| InferenceError::Model {
                    reason: format!("concurrency limiter closed: {e}"),
                })?),
                None => None,
            };
            // The permit lives until the blocking evaluation returns, even if
            // the caller has already been answered.
            tokio::task::spawn_blocking(move || {
                let _permit = permit;
                model.q_values(&obs)
            })
            .await
            .map_err(|e| InferenceError::Model {
                reason: format!("inference task failed: {e}"),
            })?
        };

        match tokio::time::timeout(budget, work).await {
            Err(_) => {
                bump(&self.counters.timeouts);
                self.fallback(&obs, FallbackReason::Timeout, started)
            }
            Ok(Err(e)) => self.network_failure(&obs, e, started),
            Ok(Ok(q)) => match check_q_values(&q) {
                Ok(()) => self.network_response(&q, started),
                Err(e) => self.network_failure(&obs, e, started),
            },
        }
    }

    fn network_response(&self, q: &[f32], started: Instant) -> InferenceResponse {
        bump(&self.counters.network);
        let index = argmax(q);
        let action = PowerAction::from_index(index).unwrap_or(PowerAction::Hold);
        InferenceResponse {
            action,
            delta_db: action.delta_db(),
            source: ActionSource::Network,
            latency_us: elapsed_us(started),
            confidence: Some(softmax_probability(q, index, self.cfg.confidence_temperature)),
            fallback_reason: None,
        }
    }

    fn network_failure(&self, obs: &Observation, err: InferenceError, started: Instant) -> InferenceResponse {
        let reason = match err {
            InferenceError::NonFinite { .. } => {
                bump(&self.counters.non_finite);
                FallbackReason::NonFiniteOutput
            }
            _ => {
                bump(&self.counters.errors);
                eprintln!("[inference] WARN: {}; answering with baseline", err);
                FallbackReason::ModelError
            }
        };
        self.fallback(obs, reason, started)
    }

    fn fallback(&self, obs: &Observation, reason: FallbackReason, started: Instant) -> InferenceResponse {
        bump(&self.counters.fallbacks);
        let action = self.baseline.decide(obs);
        InferenceResponse {
            action,
            delta_db: action.delta_db(),
            source: ActionSource::Fallback,
            latency_us: elapsed_us(started),
            confidence: None,
            fallback_reason: Some(reason),
        }
    }

    pub fn stats(&self) -> InferenceStats {
        let c = &self.counters;
        let load = |a: &AtomicU64| a.load(Ordering::Relaxed);
        InferenceStats {
            requests: load(&c.requests),
            network: load(&c.network),
            fallbacks: load(&c.fallbacks),
            timeouts: load(&c.timeouts),
            non_finite: load(&c.non_finite),
            errors: load(&c.errors),
            invalid_requests: load(&c.invalid_requests),
            reloads: load(&c.reloads),
            reload_failures: load(&c.reload_failures),
        }
    }

    pub fn fallback_rate(&self) -> f64 {
        self.stats().fallback_rate()
    }

    pub fn baseline(&self) -> &BaselineController {
        &self.baseline
    }

    pub fn config(&self) -> &InferenceConfig {
        &self.cfg
    }
}

fn observation_is_finite(obs: &Observation) -> bool {
    [
        obs.elevation_deg,
        obs.slant_range_km,
        obs.rain_rate_mm_h,
        obs.rsrp_dbm,
        obs.doppler_hz,
        obs.tx_power_dbm,
    ]
    .iter()
    .all(|v| v.is_finite())
}

fn check_q_values(q: &[f32]) -> Result<(), InferenceError> {
    if q.len() != PowerAction::COUNT {
        return Err(InferenceError::Shape {
            reason: format!("{} outputs, expected {}", q.len(), PowerAction::COUNT),
        });
    }
    match q.iter().position(|v| !v.is_finite()) {
        Some(index) => Err(InferenceError::NonFinite { index }),
        None => Ok(()),
    }
}

/// exp(q_i / T) / sum_j exp(q_j / T), max-shifted.
fn softmax_probability(q: &[f32], index: usize, temperature: f64) -> f64 {
    let t = if temperature > 0.0 { temperature } else { 1.0 };
    let max = q.iter().copied().fold(f32::NEG_INFINITY, f32::max) as f64;
    let weights: Vec<f64> = q.iter().map(|v| ((*v as f64 - max) / t).exp()).collect();
    let total: f64 = weights.iter().sum();
    if total > 0.0 {
        weights.get(index).copied().unwrap_or(0.0) / total
    } else {
        0.0
    }
}

fn elapsed_us(started: Instant) -> u64 {
    started.elapsed().as_micros() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    struct Constant(Vec<f32>);

    impl QValueModel for Constant {
        fn q_values(&self, _obs: &Observation) -> Result<Vec<f32>, InferenceError> {
            Ok(self.0.clone())
        }
    }

    struct Failing;

    impl QValueModel for Failing {
        fn q_values(&self, _obs: &Observation) -> Result<Vec<f32>, InferenceError> {
            Err(InferenceError::Model {
                reason: "device lost".into(),
            })
        }
    }

    fn obs(rsrp_dbm: f64) -> Observation {
        Observation {
            elevation_deg: 50.0,
            slant_range_km: 700.0,
            rain_rate_mm_h: 2.0,
            rsrp_dbm,
            doppler_hz: -1500.0,
            tx_power_dbm: 25.0,
        }
    }

    fn service(model: impl QValueModel + 'static) -> InferenceService {
        let cfg = Config::default();
        InferenceService::with_model(
            Arc::new(model),
            BaselineController::from_config(&cfg),
            &cfg.inference,
        )
    }

    #[tokio::test]
    async fn test_network_answer_carries_confidence() {
        let svc = service(Constant(vec![0.0, 0.0, 0.0, 5.0, 0.0]));
        let resp = svc.infer(InferenceRequest::new(obs(-95.0)).with_deadline_ms(200)).await;
        assert_eq!(resp.source, ActionSource::Network);
        assert_eq!(resp.action, PowerAction::SmallIncrease);
        let c = resp.confidence.unwrap();
        assert!(c > 0.9 && c <= 1.0);
        assert_eq!(svc.stats().network, 1);
        assert_eq!(svc.fallback_rate(), 0.0);
    }

    #[tokio::test]
    async fn test_non_finite_output_falls_back() {
        let svc = service(Constant(vec![0.0, f32::NAN, 1.0, 0.0, 0.0]));
        let resp = svc.infer(InferenceRequest::new(obs(-95.0)).with_deadline_ms(200)).await;
        assert_eq!(resp.source, ActionSource::Fallback);
        assert_eq!(resp.fallback_reason, Some(FallbackReason::NonFiniteOutput));
        assert_eq!(resp.action, PowerAction::Hold);
        assert!(resp.confidence.is_none());
        assert_eq!(svc.stats().non_finite, 1);
    }

    #[tokio::test]
    async fn test_model_error_and_bad_shape_fall_back() {
        let svc = service(Failing);
        let resp = svc.infer(InferenceRequest::new(obs(-80.0)).with_deadline_ms(200)).await;
        assert_eq!(resp.fallback_reason, Some(FallbackReason::ModelError));
        assert_eq!(resp.action, PowerAction::LargeDecrease);

        let svc = service(Constant(vec![1.0, 2.0]));
        let resp = svc.infer(InferenceRequest::new(obs(-95.0)).with_deadline_ms(200)).await;
        assert_eq!(resp.fallback_reason, Some(FallbackReason::ModelError));
        assert_eq!(svc.stats().errors, 1);
    }

    #[tokio::test]
    async fn test_invalid_observation_and_missing_model() {
        let svc = service(Constant(vec![0.0; 5]));
        let resp = svc.infer(InferenceRequest::new(obs(f64::NAN))).await;
        assert_eq!(resp.fallback_reason, Some(FallbackReason::InvalidObservation));
        assert_eq!(resp.action, PowerAction::Hold);

        let cfg = Config::default();
        let empty = InferenceService::fallback_only(BaselineController::from_config(&cfg), &cfg.inference);
        let resp = empty.infer(InferenceRequest::new(obs(-95.0))).await;
        assert_eq!(resp.fallback_reason, Some(FallbackReason::NoModel));
        assert_eq!(empty.fallback_rate(), 1.0);
    }

    #[tokio::test]
    async fn test_reload_failure_keeps_current_model() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(Constant(vec![0.0, 0.0, 0.0, 0.0, 1.0]));
        let bad = dir.path().join("bad.ckpt");
        std::fs::write(&bad, b"not a checkpoint").unwrap();
        assert!(svc.reload(&bad).is_err());
        assert!(svc.reload(&dir.path().join("missing.ckpt")).is_err());

        let resp = svc.infer(InferenceRequest::new(obs(-95.0)).with_deadline_ms(200)).await;
        assert_eq!(resp.source, ActionSource::Network);
        assert_eq!(resp.action, PowerAction::LargeIncrease);
        assert_eq!(svc.stats().reload_failures, 2);
    }

    #[test]
    fn test_softmax_probability() {
        let p = softmax_probability(&[1.0, 1.0, 1.0, 1.0], 2, 1.0);
        assert!((p - 0.25).abs() < 1e-12);
        let sharp = softmax_probability(&[0.0, 1.0], 1, 0.1);
        assert!(sharp > 0.99);
    }
}
