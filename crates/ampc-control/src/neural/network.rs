use ampc_core::{settings::Activation, ControlError};
use nalgebra::{DMatrix, DVector};
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

pub(crate) fn activate(activation: Activation, value: f64) -> f64 {
    match activation {
        Activation::Tanh => value.tanh(),
        Activation::Relu => value.max(0.0),
        Activation::Linear => value,
    }
}

/// Derivative of the activation, expressed through its output.
pub(crate) fn slope(activation: Activation, output: f64) -> f64 {
    match activation {
        Activation::Tanh => 1.0 - output * output,
        Activation::Relu => {
            if output > 0.0 {
                1.0
            } else {
                0.0
            }
        }
        Activation::Linear => 1.0,
    }
}

/// Fully connected layer `activation(W x + b)`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DenseLayer {
    pub weights: DMatrix<f64>,
    pub bias: DVector<f64>,
    pub activation: Activation,
}

impl DenseLayer {
    /// Glorot-uniform weights, zero bias.
    pub fn random(n_in: usize, n_out: usize, activation: Activation, rng: &mut StdRng) -> Self {
        let limit = (6.0 / (n_in + n_out) as f64).sqrt();
        Self {
            weights: DMatrix::from_fn(n_out, n_in, |_, _| rng.gen_range(-limit..limit)),
            bias: DVector::zeros(n_out),
            activation,
        }
    }

    pub fn n_inputs(&self) -> usize {
        self.weights.ncols()
    }

    pub fn n_outputs(&self) -> usize {
        self.weights.nrows()
    }

    pub fn forward(&self, input: &DVector<f64>) -> DVector<f64> {
        (&self.weights * input + &self.bias).map(|v| activate(self.activation, v))
    }

    /// Forward pass over a batch stored column-wise.
    pub(crate) fn forward_batch(&self, input: &DMatrix<f64>) -> DMatrix<f64> {
        let mut z = &self.weights * input;
        for mut column in z.column_iter_mut() {
            column += &self.bias;
        }
        z.map(|v| activate(self.activation, v))
    }
}

/// Feed-forward network of [`DenseLayer`]s.
///
/// Deserialized networks go through [`Network::new`], so a loaded network always has
/// consistent layer shapes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "NetworkLayers")]
pub struct Network {
    layers: Vec<DenseLayer>,
}

#[derive(Deserialize)]
struct NetworkLayers {
    layers: Vec<DenseLayer>,
}

impl TryFrom<NetworkLayers> for Network {
    type Error = ControlError;

    fn try_from(value: NetworkLayers) -> Result<Self, Self::Error> {
        Network::new(value.layers)
    }
}

impl Network {
    pub fn new(layers: Vec<DenseLayer>) -> Result<Self, ControlError> {
        if layers.is_empty() {
            return Err(ControlError::config("a network needs at least one layer"));
        }
        for (i, layer) in layers.iter().enumerate() {
            if layer.bias.len() != layer.n_outputs() {
                return Err(ControlError::config(format!(
                    "layer {} has {} outputs but {} biases",
                    i,
                    layer.n_outputs(),
                    layer.bias.len()
                )));
            }
            if layer.n_inputs() == 0 || layer.n_outputs() == 0 {
                return Err(ControlError::config(format!("layer {} is empty", i)));
            }
            if layer.weights.iter().chain(layer.bias.iter()).any(|v| !v.is_finite()) {
                return Err(ControlError::config(format!(
                    "layer {} has non-finite parameters",
                    i
                )));
            }
        }
        for (i, pair) in layers.windows(2).enumerate() {
            if pair[0].n_outputs() != pair[1].n_inputs() {
                return Err(ControlError::config(format!(
                    "layer {} produces {} values, layer {} expects {}",
                    i,
                    pair[0].n_outputs(),
                    i + 1,
                    pair[1].n_inputs()
                )));
            }
        }
        Ok(Self { layers })
    }

    /// `hidden_layers` layers of `neurons` units with `activation`, followed by a linear
    /// output layer.
    pub fn random(
        n_inputs: usize,
        n_outputs: usize,
        hidden_layers: usize,
        neurons: usize,
        activation: Activation,
        seed: u64,
    ) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut layers = Vec::with_capacity(hidden_layers + 1);
        let mut width = n_inputs;
        for _ in 0..hidden_layers {
            layers.push(DenseLayer::random(width, neurons, activation, &mut rng));
            width = neurons;
        }
        layers.push(DenseLayer::random(width, n_outputs, Activation::Linear, &mut rng));
        Self { layers }
    }

    pub fn n_inputs(&self) -> usize {
        self.layers[0].n_inputs()
    }

    pub fn n_outputs(&self) -> usize {
        self.layers[self.layers.len() - 1].n_outputs()
    }

    pub fn layers(&self) -> &[DenseLayer] {
        &self.layers
    }

    pub(crate) fn layers_mut(&mut self) -> &mut [DenseLayer] {
        &mut self.layers
    }

    pub fn forward(&self, input: &DVector<f64>) -> DVector<f64> {
        self.layers
            .iter()
            .fold(input.clone(), |x, layer| layer.forward(&x))
    }

    /// Activations of every layer for a column-wise batch, input first.
    pub(crate) fn activations(&self, input: &DMatrix<f64>) -> Vec<DMatrix<f64>> {
        let mut out = Vec::with_capacity(self.layers.len() + 1);
        out.push(input.clone());
        for layer in &self.layers {
            let next = layer.forward_batch(&out[out.len() - 1]);
            out.push(next);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_forward_of_handmade_network() {
        let network = Network::new(vec![
            DenseLayer {
                weights: DMatrix::from_row_slice(2, 1, &[1.0, -1.0]),
                bias: DVector::from_vec(vec![0.0, 1.0]),
                activation: Activation::Relu,
            },
            DenseLayer {
                weights: DMatrix::from_row_slice(1, 2, &[2.0, 3.0]),
                bias: DVector::from_vec(vec![0.5]),
                activation: Activation::Linear,
            },
        ])
        .unwrap();
        // relu([2, -1]) = [2, 0]
        let y = network.forward(&DVector::from_vec(vec![2.0]));
        assert_relative_eq!(y[0], 4.5);
    }

    #[test]
    fn test_batch_matches_single_forward() {
        let network = Network::random(3, 2, 2, 8, Activation::Tanh, 7);
        let batch = DMatrix::from_column_slice(3, 2, &[0.1, 0.2, 0.3, -0.4, 0.5, 0.9]);
        let activations = network.activations(&batch);
        let output = &activations[activations.len() - 1];
        for j in 0..2 {
            let single = network.forward(&batch.column(j).into_owned());
            assert_relative_eq!(output.column(j).into_owned(), single, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_random_is_seeded() {
        let a = Network::random(4, 2, 1, 10, Activation::Tanh, 3);
        let b = Network::random(4, 2, 1, 10, Activation::Tanh, 3);
        assert_eq!(a, b);
        assert_eq!(a.n_inputs(), 4);
        assert_eq!(a.n_outputs(), 2);
        assert_eq!(a.layers()[1].activation, Activation::Linear);
    }

    #[test]
    fn test_mismatched_layers_rejected() {
        let mut rng = StdRng::seed_from_u64(0);
        let result = Network::new(vec![
            DenseLayer::random(2, 3, Activation::Tanh, &mut rng),
            DenseLayer::random(4, 1, Activation::Linear, &mut rng),
        ]);
        assert!(matches!(result, Err(ControlError::InvalidConfig(_))));
    }
}
