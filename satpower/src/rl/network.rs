// src/rl/network.rs
//
// Feed-forward Q-network: observation features -> one value per action.
//
// Weights are initialised from an injected RNG (uniform +/- 1/sqrt(fan_in))
// rather than the backend's global seed, so two agents built from the same
// seed start bit-identical.

use burn::config::Config;
use burn::module::{Module, Param};
use burn::nn::{Linear, Relu};
use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};
use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Config, Debug)]
pub struct QNetworkConfig {
    pub input_dim: usize,
    pub num_actions: usize,
    pub hidden_layers: Vec<usize>,
}

impl QNetworkConfig {
    pub fn init<B: Backend, R: Rng + ?Sized>(&self, rng: &mut R, device: &B::Device) -> QNetwork<B> {
        let mut hidden = Vec::with_capacity(self.hidden_layers.len());
        let mut d_in = self.input_dim;
        for &d_out in &self.hidden_layers {
            hidden.push(seeded_linear(d_in, d_out, rng, device));
            d_in = d_out;
        }
        QNetwork {
            hidden,
            output: seeded_linear(d_in, self.num_actions, rng, device),
            activation: Relu::new(),
        }
    }

    /// Same layer layout as `other`.
    pub fn same_shape(&self, other: &QNetworkConfig) -> bool {
        self.input_dim == other.input_dim
            && self.num_actions == other.num_actions
            && self.hidden_layers == other.hidden_layers
    }
}

fn seeded_linear<B: Backend, R: Rng + ?Sized>(
    d_in: usize,
    d_out: usize,
    rng: &mut R,
    device: &B::Device,
) -> Linear<B> {
    let bound = 1.0 / (d_in.max(1) as f64).sqrt();
    let mut draw = |n: usize| -> Vec<f32> {
        (0..n).map(|_| rng.gen_range(-bound..bound) as f32).collect()
    };
    let weight = draw(d_in * d_out);
    let bias = draw(d_out);

    Linear {
        weight: Param::from_tensor(Tensor::from_data(
            TensorData::new(weight, [d_in, d_out]).convert::<B::FloatElem>(),
            device,
        )),
        bias: Some(Param::from_tensor(Tensor::from_data(
            TensorData::new(bias, [d_out]).convert::<B::FloatElem>(),
            device,
        ))),
    }
}

#[derive(Module, Debug)]
pub struct QNetwork<B: Backend> {
    hidden: Vec<Linear<B>>,
    output: Linear<B>,
    activation: Relu,
}

impl<B: Backend> QNetwork<B> {
    /// [batch, input_dim] -> [batch, num_actions]
    pub fn forward(&self, input: Tensor<B, 2>) -> Tensor<B, 2> {
        let mut x = input;
        for layer in &self.hidden {
            x = self.activation.forward(layer.forward(x));
        }
        self.output.forward(x)
    }

    /// Q-values for each row of `rows`.
    pub fn q_values(&self, rows: &[Vec<f32>], device: &B::Device) -> Vec<Vec<f32>> {
        if rows.is_empty() {
            return Vec::new();
        }
        let width = rows[0].len();
        let input = features_tensor::<B>(rows, width, device);
        let out = self.forward(input);
        let num_actions = out.dims()[1];
        to_f32_vec(out)
            .chunks(num_actions.max(1))
            .map(|c| c.to_vec())
            .collect()
    }

    /// Plain copies of every dense layer, input side first.
    pub fn export_dense(&self) -> Vec<DenseLayer> {
        self.hidden
            .iter()
            .chain(std::iter::once(&self.output))
            .map(|layer| {
                let weight = layer.weight.val();
                let [d_in, d_out] = weight.dims();
                let bias = layer
                    .bias
                    .as_ref()
                    .map(|b| to_f32_vec(b.val()))
                    .unwrap_or_else(|| vec![0.0; d_out]);
                DenseLayer {
                    d_in,
                    d_out,
                    weights: to_f32_vec(weight),
                    bias,
                }
            })
            .collect()
    }
}

/// Row-major weights ([d_in, d_out]) and bias of one layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DenseLayer {
    pub d_in: usize,
    pub d_out: usize,
    pub weights: Vec<f32>,
    pub bias: Vec<f32>,
}

/// Stack equal-width feature rows into a [rows, width] tensor.
pub fn features_tensor<B: Backend>(rows: &[Vec<f32>], width: usize, device: &B::Device) -> Tensor<B, 2> {
    let flat: Vec<f32> = rows.iter().flat_map(|r| r.iter().copied()).collect();
    Tensor::from_data(
        TensorData::new(flat, [rows.len(), width]).convert::<B::FloatElem>(),
        device,
    )
}

/// Read a float tensor back as f32 values.
pub fn to_f32_vec<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Vec<f32> {
    tensor
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    type B = NdArray;

    fn config() -> QNetworkConfig {
        QNetworkConfig::new(6, 5, vec![16, 8, 4])
    }

    #[test]
    fn test_output_shape() {
        let device = Default::default();
        let net: QNetwork<B> = config().init(&mut ChaCha8Rng::seed_from_u64(1), &device);
        let rows = vec![vec![0.1f32; 6], vec![0.5f32; 6], vec![-0.2f32; 6]];
        let q = net.q_values(&rows, &device);
        assert_eq!(q.len(), 3);
        assert!(q.iter().all(|r| r.len() == 5 && r.iter().all(|v| v.is_finite())));
    }

    #[test]
    fn test_seeded_init_is_reproducible() {
        let device = Default::default();
        let a: QNetwork<B> = config().init(&mut ChaCha8Rng::seed_from_u64(9), &device);
        let b: QNetwork<B> = config().init(&mut ChaCha8Rng::seed_from_u64(9), &device);
        let c: QNetwork<B> = config().init(&mut ChaCha8Rng::seed_from_u64(10), &device);
        assert_eq!(a.export_dense(), b.export_dense());
        assert_ne!(a.export_dense(), c.export_dense());
    }

    #[test]
    fn test_export_dense_layout() {
        let device = Default::default();
        let net: QNetwork<B> = config().init(&mut ChaCha8Rng::seed_from_u64(2), &device);
        let layers = net.export_dense();
        let dims: Vec<(usize, usize)> = layers.iter().map(|l| (l.d_in, l.d_out)).collect();
        assert_eq!(dims, vec![(6, 16), (16, 8), (8, 4), (4, 5)]);
        assert!(layers.iter().all(|l| l.weights.len() == l.d_in * l.d_out && l.bias.len() == l.d_out));
    }
}
