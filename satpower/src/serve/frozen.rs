// src/serve/frozen.rs
//
// Read-only Q-network for serving.
//
// The trained Burn network is flattened into plain dense layers at load
// time. After that the weights are never written, so one instance is shared
// by any number of concurrent requests without locking.

use burn::backend::NdArray;

use super::inference::InferenceError;
use crate::channel::{Observation, ObservationBounds, PowerAction, OBS_DIM};
use crate::rl::{argmax, Checkpoint, CheckpointError, DenseLayer, Policy};

/// Anything that maps an observation to one value per action.
pub trait QValueModel: Send + Sync {
    fn name(&self) -> &str {
        "model"
    }

    fn q_values(&self, obs: &Observation) -> Result<Vec<f32>, InferenceError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct FrozenQNetwork {
    layers: Vec<DenseLayer>,
    bounds: ObservationBounds,
}

impl FrozenQNetwork {
    /// Check that the layers chain from OBS_DIM inputs to one output per action.
    pub fn from_layers(layers: Vec<DenseLayer>, bounds: ObservationBounds) -> Result<Self, InferenceError> {
        let mut width = OBS_DIM;
        for (i, layer) in layers.iter().enumerate() {
            if layer.d_in != width
                || layer.weights.len() != layer.d_in * layer.d_out
                || layer.bias.len() != layer.d_out
            {
                return Err(InferenceError::Shape {
                    reason: format!(
                        "layer {} is {}x{} with {} weights / {} biases, expected {} inputs",
                        i,
                        layer.d_in,
                        layer.d_out,
                        layer.weights.len(),
                        layer.bias.len(),
                        width
                    ),
                });
            }
            width = layer.d_out;
        }
        if layers.is_empty() || width != PowerAction::COUNT {
            return Err(InferenceError::Shape {
                reason: format!("network ends in {} outputs, expected {}", width, PowerAction::COUNT),
            });
        }
        Ok(Self { layers, bounds })
    }

    /// Value network of a checkpoint, with the checkpoint's observation bounds.
    pub fn from_checkpoint(ckpt: &Checkpoint) -> Result<Self, CheckpointError> {
        let net = ckpt.value_network::<NdArray>(&Default::default())?;
        Self::from_layers(net.export_dense(), ckpt.header.bounds()).map_err(|e| CheckpointError::Incompatible {
            reason: e.to_string(),
        })
    }

    pub fn bounds(&self) -> &ObservationBounds {
        &self.bounds
    }

    pub fn layers(&self) -> &[DenseLayer] {
        &self.layers
    }

    /// Dense forward pass with ReLU between layers.
    pub fn forward(&self, input: &[f32]) -> Vec<f32> {
        let last = self.layers.len().saturating_sub(1);
        let mut x = input.to_vec();
        for (i, layer) in self.layers.iter().enumerate() {
            let mut out = layer.bias.clone();
            for (row, xi) in x.iter().enumerate() {
                let w = &layer.weights[row * layer.d_out..(row + 1) * layer.d_out];
                for (o, wij) in out.iter_mut().zip(w) {
                    *o += xi * wij;
                }
            }
            if i < last {
                for v in out.iter_mut() {
                    *v = v.max(0.0);
                }
            }
            x = out;
        }
        x
    }
}

impl QValueModel for FrozenQNetwork {
    fn name(&self) -> &str {
        "frozen_dqn"
    }

    fn q_values(&self, obs: &Observation) -> Result<Vec<f32>, InferenceError> {
        Ok(self.forward(&obs.to_features(&self.bounds)))
    }
}

/// Greedy policy over the frozen network, for offline evaluation.
impl Policy for FrozenQNetwork {
    fn name(&self) -> &str {
        "dqn"
    }

    fn act(&self, obs: &Observation) -> PowerAction {
        let q = self.forward(&obs.to_features(&self.bounds));
        PowerAction::from_index(argmax(&q)).unwrap_or(PowerAction::Hold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::rl::{DqnAgent, TrainBackend};

    fn obs() -> Observation {
        Observation {
            elevation_deg: 40.0,
            slant_range_km: 820.0,
            rain_rate_mm_h: 8.0,
            rsrp_dbm: -97.0,
            doppler_hz: 3000.0,
            tx_power_dbm: 28.0,
        }
    }

    #[test]
    fn test_matches_burn_forward_pass() {
        let cfg = Config::smoke();
        let bounds = ObservationBounds::from_channel(&cfg.channel);
        let agent = DqnAgent::<TrainBackend>::new(&cfg, bounds, Default::default()).unwrap();
        let frozen = FrozenQNetwork::from_layers(agent.value_network().export_dense(), bounds).unwrap();

        let expected = agent.q_values(&obs());
        let got = frozen.q_values(&obs()).unwrap();
        assert_eq!(got.len(), PowerAction::COUNT);
        for (a, b) in got.iter().zip(&expected) {
            assert!((a - b).abs() < 1e-4, "{a} vs {b}");
        }
        assert_eq!(frozen.act(&obs()), agent.greedy_action(&obs()));
    }

    #[test]
    fn test_rejects_broken_layer_chain() {
        let bounds = ObservationBounds::from_channel(&Config::default().channel);
        let layer = DenseLayer {
            d_in: OBS_DIM,
            d_out: 3,
            weights: vec![0.0; OBS_DIM * 3],
            bias: vec![0.0; 3],
        };
        assert!(matches!(
            FrozenQNetwork::from_layers(vec![layer], bounds),
            Err(InferenceError::Shape { .. })
        ));
        assert!(FrozenQNetwork::from_layers(Vec::new(), bounds).is_err());
    }

    #[test]
    fn test_relu_skipped_on_output_layer() {
        let bounds = ObservationBounds::from_channel(&Config::default().channel);
        let layer = DenseLayer {
            d_in: OBS_DIM,
            d_out: PowerAction::COUNT,
            weights: vec![0.0; OBS_DIM * PowerAction::COUNT],
            bias: vec![-1.0, -2.0, 0.0, 1.0, 2.0],
        };
        let net = FrozenQNetwork::from_layers(vec![layer], bounds).unwrap();
        assert_eq!(net.forward(&[0.5; OBS_DIM]), vec![-1.0, -2.0, 0.0, 1.0, 2.0]);
    }
}
