use ndarray::Array2;

use crate::config::NetworkShape;
use crate::network::{Example, NetworkParameters};
use crate::numeric::{all_finite, padded_get, sigmoid_derivative_from_output};

/// Gradient matrices matching the shapes of a [`NetworkParameters`]
#[derive(Clone, Debug, PartialEq)]
pub struct Gradients {
    pub input_to_hidden: Array2<f32>,
    pub hidden_to_output: Array2<f32>,
}

impl Gradients {
    pub fn zeros(shape: NetworkShape) -> Self {
        Self::filled(shape, 0.0)
    }

    pub fn filled(shape: NetworkShape, value: f32) -> Self {
        Self {
            input_to_hidden: Array2::from_elem((shape.hidden, shape.features), value),
            hidden_to_output: Array2::from_elem((shape.outputs, shape.hidden), value),
        }
    }

    pub fn scale(&mut self, factor: f32) {
        self.input_to_hidden.mapv_inplace(|g| g * factor);
        self.hidden_to_output.mapv_inplace(|g| g * factor);
    }

    /// `self += factor * other`
    pub fn add_scaled(&mut self, other: &Gradients, factor: f32) {
        self.input_to_hidden.scaled_add(factor, &other.input_to_hidden);
        self.hidden_to_output.scaled_add(factor, &other.hidden_to_output);
    }

    pub fn is_finite(&self) -> bool {
        all_finite(&self.input_to_hidden) && all_finite(&self.hidden_to_output)
    }

    /// L2 norm over both matrices, used for logging
    pub fn norm(&self) -> f32 {
        self.input_to_hidden
            .iter()
            .chain(self.hidden_to_output.iter())
            .map(|g| g * g)
            .sum::<f32>()
            .sqrt()
    }
}

/// Closed-form backpropagation for the two-layer sigmoid network.
///
/// The output delta is the raw `prediction - target` without the sigmoid
/// derivative; only the hidden layer applies `h * (1 - h)`.
#[derive(Debug, Default, Clone, Copy)]
pub struct GradientComputer;

impl GradientComputer {
    /// Add the gradients for one example into `grads`.
    ///
    /// The hidden activations are recomputed from `params` and `features`;
    /// `prediction` is taken as given. `grads` is never reset here, so a
    /// caller can sum over a batch before applying an update.
    pub fn compute_gradients(
        params: &NetworkParameters,
        features: &[f32],
        target: &[f32],
        prediction: &[f32],
        grads: &mut Gradients,
    ) {
        let hidden = params.hidden_activations(features);
        let hidden_to_output = params.hidden_to_output();

        let output_error: Vec<f32> = prediction
            .iter()
            .zip(target.iter())
            .map(|(p, t)| p - t)
            .collect();

        for (k, &err_k) in output_error.iter().enumerate() {
            for (i, &h_i) in hidden.iter().enumerate() {
                grads.hidden_to_output[[k, i]] += err_k * h_i;
            }
        }

        for (i, &h_i) in hidden.iter().enumerate() {
            let back: f32 = output_error
                .iter()
                .enumerate()
                .map(|(k, &err_k)| err_k * hidden_to_output[[k, i]])
                .sum();
            let hidden_error = back * sigmoid_derivative_from_output(h_i);
            for j in 0..grads.input_to_hidden.ncols() {
                grads.input_to_hidden[[i, j]] += hidden_error * padded_get(features, j);
            }
        }
    }

    /// Sum of per-example gradients over `examples`, divided by their count.
    ///
    /// Predictions come from a forward pass through `params`.
    pub fn batch_gradients<'a, I>(params: &NetworkParameters, examples: I) -> Gradients
    where
        I: IntoIterator<Item = &'a Example>,
    {
        let mut grads = Gradients::zeros(params.shape());
        let mut count = 0usize;
        for example in examples {
            let features = example.features.as_slice();
            let prediction = params.forward(features);
            Self::compute_gradients(
                params,
                features,
                example.target.as_slice(),
                prediction.as_slice().unwrap_or(&[]),
                &mut grads,
            );
            count += 1;
        }
        if count > 0 {
            grads.scale(1.0 / count as f32);
        }
        grads
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_gradients_accumulate_rather_than_reset() {
        let params =
            NetworkParameters::from_matrices(array![[0.1, 0.2]], array![[0.3]]).unwrap();
        let prediction = params.forward(&[1.0, 1.0]).to_vec();

        let mut once = Gradients::zeros(params.shape());
        GradientComputer::compute_gradients(&params, &[1.0, 1.0], &[1.0], &prediction, &mut once);

        let mut twice = Gradients::zeros(params.shape());
        for _ in 0..2 {
            GradientComputer::compute_gradients(
                &params,
                &[1.0, 1.0],
                &[1.0],
                &prediction,
                &mut twice,
            );
        }
        assert_abs_diff_eq!(
            twice.hidden_to_output[[0, 0]],
            2.0 * once.hidden_to_output[[0, 0]],
            epsilon = 1e-7
        );
        assert_abs_diff_eq!(
            twice.input_to_hidden[[0, 1]],
            2.0 * once.input_to_hidden[[0, 1]],
            epsilon = 1e-7
        );
    }

    #[test]
    fn test_zero_error_gives_zero_gradient() {
        let params =
            NetworkParameters::from_matrices(array![[0.4, -0.3]], array![[0.7]]).unwrap();
        let prediction = params.forward(&[0.2, 0.8]).to_vec();
        let mut grads = Gradients::zeros(params.shape());
        GradientComputer::compute_gradients(&params, &[0.2, 0.8], &prediction, &prediction, &mut grads);
        assert_eq!(grads.norm(), 0.0);
    }

    #[test]
    fn test_batch_gradients_average() {
        let params =
            NetworkParameters::from_matrices(array![[0.4, -0.3]], array![[0.7]]).unwrap();
        let example = Example::new(vec![0.2, 0.8], vec![1.0]);
        let single = GradientComputer::batch_gradients(&params, [&example]);
        let doubled = GradientComputer::batch_gradients(&params, [&example, &example]);
        assert_abs_diff_eq!(single.norm(), doubled.norm(), epsilon = 1e-7);
        assert!(single.norm() > 0.0);
    }
}
