//! The online-trained multilayer perceptron: a small, all-linear,
//! variable-depth network trained one sample at a time with plain SGD.
//!
//! All six input features share one network regardless of whether they
//! came from a full telemetry record or the legacy two-input path.

use rand::Rng;

use crate::datapoint::{INPUT_SIZE, OUTPUT_SIZE};

/// Per-weight gradient clip, applied before the update is subtracted.
const GRAD_CLIP: f64 = 0.1;
/// Per-neuron delta clip, applied to backpropagated deltas.
const DELTA_CLIP: f64 = 100.0;

#[derive(Debug, Clone)]
pub struct Neuron {
    pub weights: Vec<f64>,
    pub bias: f64,
}

impl Neuron {
    fn random(input_len: usize, rng: &mut impl Rng) -> Self {
        Self {
            weights: (0..input_len).map(|_| rng.gen_range(-0.1..0.1)).collect(),
            bias: rng.gen_range(-0.1..0.1),
        }
    }

    fn forward(&self, input: &[f64]) -> f64 {
        self.weights
            .iter()
            .zip(input.iter())
            .map(|(w, x)| w * x)
            .sum::<f64>()
            + self.bias
    }
}

#[derive(Debug, Clone)]
pub struct Layer {
    pub neurons: Vec<Neuron>,
}

impl Layer {
    fn random(n_neurons: usize, input_len: usize, rng: &mut impl Rng) -> Self {
        Self {
            neurons: (0..n_neurons).map(|_| Neuron::random(input_len, rng)).collect(),
        }
    }

    fn input_len(&self) -> usize {
        self.neurons.first().map(|n| n.weights.len()).unwrap_or(0)
    }

    fn forward(&self, input: &[f64]) -> Vec<f64> {
        self.neurons.iter().map(|n| n.forward(input)).collect()
    }
}

/// `INPUT_SIZE -> h1 -> ... -> hK -> OUTPUT_SIZE`, all linear activations.
#[derive(Debug, Clone)]
pub struct Mlp {
    pub layers: Vec<Layer>,
    pub learning_rate: f64,
}

impl Mlp {
    /// Build a freshly randomly-initialized network for the given hidden
    /// layer sizes (may be empty for a direct input->output map).
    pub fn new(hidden_sizes: &[usize], learning_rate: f64, rng: &mut impl Rng) -> Self {
        let mut layers = Vec::with_capacity(hidden_sizes.len() + 1);
        let mut fan_in = INPUT_SIZE;
        for &n in hidden_sizes {
            layers.push(Layer::random(n, fan_in, rng));
            fan_in = n;
        }
        layers.push(Layer::random(OUTPUT_SIZE, fan_in, rng));
        Self { layers, learning_rate }
    }

    /// Layer sizes, hidden layers only (excludes the output layer).
    pub fn hidden_sizes(&self) -> Vec<usize> {
        self.layers[..self.layers.len() - 1]
            .iter()
            .map(|l| l.neurons.len())
            .collect()
    }

    /// Full forward pass, returning every layer's activation vector
    /// including the input itself at index 0 (needed for backprop).
    fn forward_activations(&self, input: &[f64]) -> Vec<Vec<f64>> {
        let mut activations = Vec::with_capacity(self.layers.len() + 1);
        activations.push(input.to_vec());
        for layer in &self.layers {
            let prev = activations.last().expect("activations always non-empty");
            activations.push(layer.forward(prev));
        }
        activations
    }

    /// Forward pass returning only the final output.
    pub fn predict(&self, input: &[f64]) -> Vec<f64> {
        self.forward_activations(input).pop().expect("at least one layer")
    }

    /// One online SGD step: forward on `input`, compute the pre-update
    /// Euclidean cost against `target`, backpropagate, and update every
    /// weight in place. Returns the pre-update cost.
    pub fn train_step(&mut self, input: &[f64], target: &[f64]) -> f64 {
        let activations = self.forward_activations(input);
        let output = activations.last().expect("at least one layer");

        let cost = output
            .iter()
            .zip(target.iter())
            .map(|(y, t)| (y - t).powi(2))
            .sum::<f64>()
            .sqrt();

        // delta_out[i] = y_i - t_i (derivative of 0.5*sum((y-t)^2) wrt y_i).
        let mut deltas: Vec<f64> = output.iter().zip(target.iter()).map(|(y, t)| y - t).collect();

        for layer_idx in (0..self.layers.len()).rev() {
            let layer_input = &activations[layer_idx];
            let clipped_deltas: Vec<f64> =
                deltas.iter().map(|d| d.clamp(-DELTA_CLIP, DELTA_CLIP)).collect();

            // Propagate deltas to the previous layer before this layer's
            // weights are mutated (linear activations: hidden delta is the
            // weight-weighted sum of the next layer's deltas).
            let prev_deltas = if layer_idx > 0 {
                let fan_in = self.layers[layer_idx].input_len();
                let mut prev = vec![0.0; fan_in];
                for (neuron, &delta) in self.layers[layer_idx].neurons.iter().zip(clipped_deltas.iter()) {
                    for (p, w) in prev.iter_mut().zip(neuron.weights.iter()) {
                        *p += delta * w;
                    }
                }
                Some(prev)
            } else {
                None
            };

            let lr = self.learning_rate;
            for (neuron, &delta) in self.layers[layer_idx].neurons.iter_mut().zip(clipped_deltas.iter()) {
                for (w, a) in neuron.weights.iter_mut().zip(layer_input.iter()) {
                    let grad = (delta * a).clamp(-GRAD_CLIP, GRAD_CLIP);
                    *w -= lr * grad;
                }
                neuron.bias -= lr * delta;
            }

            if let Some(prev) = prev_deltas {
                deltas = prev;
            }
        }

        cost
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn seeded(seed: u64) -> StdRng {
        StdRng::seed_from_u64(seed)
    }

    #[test]
    fn predict_matches_layer_count_shape() {
        let mut rng = seeded(1);
        let mlp = Mlp::new(&[4, 3], 0.1, &mut rng);
        let out = mlp.predict(&[0.0; INPUT_SIZE]);
        assert_eq!(out.len(), OUTPUT_SIZE);
        assert_eq!(mlp.hidden_sizes(), vec![4, 3]);
    }

    #[test]
    fn training_on_identical_target_drives_cost_down() {
        let mut rng = seeded(2);
        let mut mlp = Mlp::new(&[4], 0.1, &mut rng);
        let input = [0.1, 0.2, 0.3, 0.4, 0.5, 0.6];
        let mut last_cost = f64::MAX;
        for _ in 0..200 {
            let cost = mlp.train_step(&input, &input);
            last_cost = cost;
        }
        assert!(last_cost < 1e-3, "cost did not converge: {last_cost}");
    }

    #[test]
    fn zero_hidden_layers_is_a_direct_linear_map() {
        let mut rng = seeded(3);
        let mlp = Mlp::new(&[], 0.1, &mut rng);
        assert_eq!(mlp.layers.len(), 1);
        assert_eq!(mlp.layers[0].input_len(), INPUT_SIZE);
    }
}
