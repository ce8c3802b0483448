// src/rl/agent.rs
//
// DQN agent: epsilon-greedy action selection and the learning update.
//
// - value network: trained every update with Huber loss on Bellman targets,
//   gradients norm-clipped before the Adam step
// - target network: inference-only copy, replaced wholesale by sync_target()
// - epsilon: multiplicative decay per episode, floored, never increases
//
// The exploration RNG is injected (or derived from the config seed) and also
// drives replay sampling; nothing here touches global RNG state.

use burn::grad_clipping::GradientClippingConfig;
use burn::module::AutodiffModule;
use burn::optim::adaptor::OptimizerAdaptor;
use burn::optim::{Adam, AdamConfig, GradientsParams, Optimizer};
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::{ElementConversion, Int, Tensor, TensorData};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use super::network::{features_tensor, to_f32_vec, QNetwork, QNetworkConfig};
use super::policy::Policy;
use super::replay::{ReplayMemory, Transition};
use crate::channel::{Observation, ObservationBounds, PowerAction, OBS_DIM};
use crate::config::{Config, ConfigError};

/// Backend used for training.
pub type TrainBackend = burn::backend::Autodiff<burn::backend::NdArray>;

pub type QOptimizer<B> = OptimizerAdaptor<Adam, QNetwork<B>, B>;

/// Salts separating the RNG streams derived from one config seed.
const EXPLORATION_SEED_SALT: u64 = 0x5EED_0E8B_10AE_0001;
const WEIGHT_INIT_SEED_SALT: u64 = 0x5EED_0E8B_10AE_0002;

/// Learning hyperparameters pulled out of the run config.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentSettings {
    pub learning_rate: f64,
    pub discount_factor: f64,
    pub epsilon_start: f64,
    pub epsilon_end: f64,
    pub epsilon_decay: f64,
    pub batch_size: usize,
    pub huber_delta: f64,
    pub max_grad_norm: f64,
    pub hidden_layers: Vec<usize>,
}

impl AgentSettings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            learning_rate: cfg.learning_rate,
            discount_factor: cfg.discount_factor,
            epsilon_start: cfg.epsilon_start,
            epsilon_end: cfg.epsilon_end,
            epsilon_decay: cfg.epsilon_decay,
            batch_size: cfg.batch_size,
            huber_delta: cfg.huber_delta,
            max_grad_norm: cfg.max_grad_norm,
            hidden_layers: cfg.hidden_layers.clone(),
        }
    }

    pub fn network_config(&self) -> QNetworkConfig {
        QNetworkConfig::new(OBS_DIM, PowerAction::COUNT, self.hidden_layers.clone())
    }
}

pub fn exploration_rng(seed: u64) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(seed ^ EXPLORATION_SEED_SALT)
}

pub fn weight_init_rng(seed: u64) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(seed ^ WEIGHT_INIT_SEED_SALT)
}

fn build_optimizer<B: AutodiffBackend>(settings: &AgentSettings) -> QOptimizer<B> {
    AdamConfig::new()
        .with_grad_clipping(Some(GradientClippingConfig::Norm(settings.max_grad_norm as f32)))
        .init()
}

pub struct DqnAgent<B: AutodiffBackend> {
    value_net: QNetwork<B>,
    target_net: QNetwork<B::InnerBackend>,
    optimizer: QOptimizer<B>,
    settings: AgentSettings,
    bounds: ObservationBounds,
    device: B::Device,
    rng: ChaCha8Rng,
    epsilon: f64,
    train_steps: u64,
    sync_count: u64,
}

impl<B: AutodiffBackend> DqnAgent<B> {
    /// Build an agent whose exploration and weight init derive from `cfg.seed`.
    pub fn new(cfg: &Config, bounds: ObservationBounds, device: B::Device) -> Result<Self, ConfigError> {
        cfg.validate()?;
        Ok(Self::with_rngs(
            AgentSettings::from_config(cfg),
            bounds,
            device,
            exploration_rng(cfg.seed),
            &mut weight_init_rng(cfg.seed),
        ))
    }

    /// Build an agent from explicit random sources.
    pub fn with_rngs<R: Rng + ?Sized>(
        settings: AgentSettings,
        bounds: ObservationBounds,
        device: B::Device,
        exploration: ChaCha8Rng,
        weight_init: &mut R,
    ) -> Self {
        let value_net: QNetwork<B> = settings.network_config().init(weight_init, &device);
        let target_net = value_net.valid();
        Self {
            value_net,
            target_net,
            optimizer: build_optimizer::<B>(&settings),
            epsilon: settings.epsilon_start,
            settings,
            bounds,
            device,
            rng: exploration,
            train_steps: 0,
            sync_count: 0,
        }
    }

    /// Reassemble an agent from checkpointed parts.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_parts(
        settings: AgentSettings,
        bounds: ObservationBounds,
        device: B::Device,
        value_net: QNetwork<B>,
        target_net: QNetwork<B::InnerBackend>,
        optimizer: QOptimizer<B>,
        epsilon: f64,
        train_steps: u64,
        exploration: ChaCha8Rng,
    ) -> Self {
        Self {
            value_net,
            target_net,
            optimizer,
            settings,
            bounds,
            device,
            rng: exploration,
            epsilon,
            train_steps,
            sync_count: 0,
        }
    }

    pub(crate) fn fresh_optimizer(settings: &AgentSettings) -> QOptimizer<B> {
        build_optimizer::<B>(settings)
    }

    /// Epsilon-greedy action.
    pub fn select_action(&mut self, obs: &Observation) -> PowerAction {
        if self.rng.gen::<f64>() < self.epsilon {
            let idx = self.rng.gen_range(0..PowerAction::COUNT);
            PowerAction::from_index(idx).unwrap_or(PowerAction::Hold)
        } else {
            self.greedy_action(obs)
        }
    }

    pub fn greedy_action(&self, obs: &Observation) -> PowerAction {
        self.greedy_actions(std::slice::from_ref(obs))
            .pop()
            .unwrap_or(PowerAction::Hold)
    }

    /// Greedy actions for a batch of observations in one forward pass.
    pub fn greedy_actions(&self, observations: &[Observation]) -> Vec<PowerAction> {
        self.q_values_batch(observations)
            .iter()
            .map(|q| PowerAction::from_index(argmax(q)).unwrap_or(PowerAction::Hold))
            .collect()
    }

    /// Value-network estimates for one observation.
    pub fn q_values(&self, obs: &Observation) -> Vec<f32> {
        self.q_values_batch(std::slice::from_ref(obs))
            .pop()
            .unwrap_or_default()
    }

    fn q_values_batch(&self, observations: &[Observation]) -> Vec<Vec<f32>> {
        let rows = self.feature_rows(observations.iter());
        self.value_net.valid().q_values(&rows, &self.device)
    }

    /// Target-network estimates for one observation.
    pub fn target_q_values(&self, obs: &Observation) -> Vec<f32> {
        let rows = self.feature_rows(std::iter::once(obs));
        self.target_net.q_values(&rows, &self.device).pop().unwrap_or_default()
    }

    fn feature_rows<'a>(&self, observations: impl Iterator<Item = &'a Observation>) -> Vec<Vec<f32>> {
        observations
            .map(|o| o.to_features(&self.bounds).to_vec())
            .collect()
    }

    /// One gradient step on a sampled batch.
    ///
    /// Returns the batch loss, or None when the memory cannot yet supply a
    /// full batch.
    pub fn update(&mut self, memory: &ReplayMemory) -> Option<f64> {
        let batch: Vec<Transition> = memory
            .sample(self.settings.batch_size, &mut self.rng)?
            .into_iter()
            .cloned()
            .collect();
        Some(self.train_on_batch(&batch))
    }

    /// Huber regression of Q(s, a) onto r + gamma * max_a' Q_target(s', a') * (1 - done).
    pub fn train_on_batch(&mut self, batch: &[Transition]) -> f64 {
        let n = batch.len();
        let states = self.feature_rows(batch.iter().map(|t| &t.observation));
        let next_states = self.feature_rows(batch.iter().map(|t| &t.next_observation));

        let next_q = self
            .target_net
            .forward(features_tensor::<B::InnerBackend>(&next_states, OBS_DIM, &self.device))
            .max_dim(1);
        let next_max = to_f32_vec(next_q);

        let gamma = self.settings.discount_factor as f32;
        let targets: Vec<f32> = batch
            .iter()
            .zip(next_max.iter())
            .map(|(t, q_next)| {
                let cont = if t.terminal { 0.0 } else { 1.0 };
                t.reward as f32 + gamma * q_next * cont
            })
            .collect();
        let actions: Vec<i64> = batch.iter().map(|t| t.action.index() as i64).collect();

        let action_idx = Tensor::<B, 2, Int>::from_data(
            TensorData::new(actions, [n, 1]).convert::<B::IntElem>(),
            &self.device,
        );
        let target = Tensor::<B, 2>::from_data(
            TensorData::new(targets, [n, 1]).convert::<B::FloatElem>(),
            &self.device,
        );

        let predicted = self
            .value_net
            .forward(features_tensor::<B>(&states, OBS_DIM, &self.device))
            .gather(1, action_idx);
        let loss = huber_loss(predicted - target, self.settings.huber_delta);
        let loss_value = loss.clone().into_scalar().elem::<f64>();

        let grads = loss.backward();
        let grads = GradientsParams::from_grads(grads, &self.value_net);
        self.value_net = self
            .optimizer
            .step(self.settings.learning_rate, self.value_net.clone(), grads);
        self.train_steps += 1;

        loss_value
    }

    /// Hard copy of the value network into the target network.
    pub fn sync_target(&mut self) {
        self.target_net = self.value_net.valid();
        self.sync_count += 1;
    }

    /// Multiplicative decay towards the floor; returns the new epsilon.
    pub fn decay_epsilon(&mut self) -> f64 {
        let next = (self.epsilon * self.settings.epsilon_decay).max(self.settings.epsilon_end);
        self.epsilon = next.min(self.epsilon);
        self.epsilon
    }

    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    pub fn train_steps(&self) -> u64 {
        self.train_steps
    }

    pub fn sync_count(&self) -> u64 {
        self.sync_count
    }

    pub fn settings(&self) -> &AgentSettings {
        &self.settings
    }

    pub fn bounds(&self) -> &ObservationBounds {
        &self.bounds
    }

    pub fn device(&self) -> &B::Device {
        &self.device
    }

    pub fn network_config(&self) -> QNetworkConfig {
        self.settings.network_config()
    }

    /// Inference copy of the value network.
    pub fn value_network(&self) -> QNetwork<B::InnerBackend> {
        self.value_net.valid()
    }

    pub fn target_network(&self) -> &QNetwork<B::InnerBackend> {
        &self.target_net
    }

    pub fn optimizer(&self) -> &QOptimizer<B> {
        &self.optimizer
    }

    /// Greedy view of this agent for evaluation.
    pub fn greedy_policy(&self) -> GreedyPolicy<'_, B> {
        GreedyPolicy { agent: self }
    }
}

/// Huber loss, mean over the batch.
fn huber_loss<B: AutodiffBackend>(diff: Tensor<B, 2>, delta: f64) -> Tensor<B, 1> {
    let abs = diff.abs();
    let quadratic = abs.clone().clamp_max(delta);
    let linear = abs - quadratic.clone();
    (quadratic.powf_scalar(2.0).mul_scalar(0.5) + linear.mul_scalar(delta)).mean()
}

/// Index of the largest finite value; ties resolve to the lowest index.
pub fn argmax(values: &[f32]) -> usize {
    let mut best = 0;
    let mut best_value = f32::NEG_INFINITY;
    for (i, v) in values.iter().enumerate() {
        if v.is_finite() && *v > best_value {
            best = i;
            best_value = *v;
        }
    }
    best
}

/// Exploration-free view of a trained agent.
pub struct GreedyPolicy<'a, B: AutodiffBackend> {
    agent: &'a DqnAgent<B>,
}

impl<B: AutodiffBackend> Policy for GreedyPolicy<'_, B> {
    fn name(&self) -> &str {
        "dqn"
    }

    fn act(&self, obs: &Observation) -> PowerAction {
        self.agent.greedy_action(obs)
    }

    fn act_batch(&self, observations: &[Observation]) -> Vec<PowerAction> {
        self.agent.greedy_actions(observations)
    }
}
