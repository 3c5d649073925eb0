use ndarray::{Array1, Array2};
use rand::Rng;
use rand_distr::{Distribution, Uniform};
use serde::{Deserialize, Serialize};

use crate::config::NetworkShape;
use crate::errors::{ModelError, Result};
use crate::gradients::Gradients;
use crate::numeric::{all_finite, clamp_finite, padded_dot, sigmoid};

/// Network output, one sigmoid activation per output unit
pub type OutputVector = Array1<f32>;

/// Numeric description of one habit at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureVector(Vec<f32>);

impl FeatureVector {
    pub fn new(values: Vec<f32>) -> Self {
        Self(values)
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<f32>> for FeatureVector {
    fn from(values: Vec<f32>) -> Self {
        Self(values)
    }
}

impl AsRef<[f32]> for FeatureVector {
    fn as_ref(&self) -> &[f32] {
        &self.0
    }
}

/// Expected network output for a feature vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetVector(Vec<f32>);

impl TargetVector {
    pub fn new(values: Vec<f32>) -> Self {
        Self(values)
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<f32>> for TargetVector {
    fn from(values: Vec<f32>) -> Self {
        Self(values)
    }
}

impl AsRef<[f32]> for TargetVector {
    fn as_ref(&self) -> &[f32] {
        &self.0
    }
}

/// One (features, target) training pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Example {
    pub features: FeatureVector,
    pub target: TargetVector,
}

impl Example {
    pub fn new(features: impl Into<FeatureVector>, target: impl Into<TargetVector>) -> Self {
        Self {
            features: features.into(),
            target: target.into(),
        }
    }

    /// Check that this example fits a network of the given shape
    pub fn validate(&self, shape: &NetworkShape) -> Result<()> {
        if self.features.len() > shape.features {
            return Err(ModelError::InvalidInput {
                message: format!(
                    "Feature vector has {} entries, network accepts at most {}",
                    self.features.len(),
                    shape.features
                ),
            });
        }
        if self.target.len() != shape.outputs {
            return Err(ModelError::InvalidInput {
                message: format!(
                    "Target vector has {} entries, network produces {}",
                    self.target.len(),
                    shape.outputs
                ),
            });
        }
        Ok(())
    }
}

/// All training examples derived from one habit, in chronological order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub habit_id: String,
    pub examples: Vec<Example>,
}

impl Task {
    pub fn new(habit_id: impl Into<String>, examples: Vec<Example>) -> Self {
        Self {
            habit_id: habit_id.into(),
            examples,
        }
    }

    pub fn len(&self) -> usize {
        self.examples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }

    pub fn validate(&self, shape: &NetworkShape) -> Result<()> {
        for (index, example) in self.examples.iter().enumerate() {
            example.validate(shape).map_err(|e| ModelError::InvalidInput {
                message: format!("habit {} example {}: {}", self.habit_id, index, e),
            })?;
        }
        Ok(())
    }
}

/// Weights of the two-layer sigmoid network.
///
/// `input_to_hidden` is H×F and `hidden_to_output` is O×H. There are no bias
/// terms. `Clone` is a deep copy: ndarray owns its buffers, so a clone never
/// shares storage with the original.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct NetworkParameters {
    input_to_hidden: Array2<f32>,
    hidden_to_output: Array2<f32>,
}

impl NetworkParameters {
    /// Initialise every weight uniformly in `[-range, range]` from `rng`
    pub fn random<R: Rng + ?Sized>(shape: NetworkShape, range: f32, rng: &mut R) -> Result<Self> {
        shape.validate()?;
        let uniform =
            Uniform::new_inclusive(-range, range).map_err(|e| ModelError::InvalidInput {
                message: format!("Invalid initialisation range {}: {}", range, e),
            })?;

        let input_to_hidden =
            Array2::from_shape_fn((shape.hidden, shape.features), |_| uniform.sample(rng));
        let hidden_to_output =
            Array2::from_shape_fn((shape.outputs, shape.hidden), |_| uniform.sample(rng));

        Ok(Self {
            input_to_hidden,
            hidden_to_output,
        })
    }

    pub fn zeros(shape: NetworkShape) -> Self {
        Self {
            input_to_hidden: Array2::zeros((shape.hidden, shape.features)),
            hidden_to_output: Array2::zeros((shape.outputs, shape.hidden)),
        }
    }

    /// Build from explicit matrices; the hidden widths must agree.
    pub fn from_matrices(
        input_to_hidden: Array2<f32>,
        hidden_to_output: Array2<f32>,
    ) -> Result<Self> {
        if input_to_hidden.nrows() != hidden_to_output.ncols() {
            return Err(ModelError::InvalidInput {
                message: format!(
                    "Hidden width mismatch: input_to_hidden has {} rows, hidden_to_output has {} columns",
                    input_to_hidden.nrows(),
                    hidden_to_output.ncols()
                ),
            });
        }
        let params = Self {
            input_to_hidden,
            hidden_to_output,
        };
        params.shape().validate()?;
        Ok(params)
    }

    pub fn shape(&self) -> NetworkShape {
        NetworkShape {
            features: self.input_to_hidden.ncols(),
            hidden: self.input_to_hidden.nrows(),
            outputs: self.hidden_to_output.nrows(),
        }
    }

    pub fn input_to_hidden(&self) -> &Array2<f32> {
        &self.input_to_hidden
    }

    pub fn hidden_to_output(&self) -> &Array2<f32> {
        &self.hidden_to_output
    }

    pub(crate) fn matrices_mut(&mut self) -> [&mut Array2<f32>; 2] {
        [&mut self.input_to_hidden, &mut self.hidden_to_output]
    }

    pub fn parameters(&self) -> usize {
        self.input_to_hidden.len() + self.hidden_to_output.len()
    }

    pub fn is_finite(&self) -> bool {
        all_finite(&self.input_to_hidden) && all_finite(&self.hidden_to_output)
    }

    /// Hidden-layer activations for `features` (zero-padded to F)
    pub fn hidden_activations(&self, features: &[f32]) -> Array1<f32> {
        self.input_to_hidden
            .rows()
            .into_iter()
            .map(|row| sigmoid(padded_dot(row, features)))
            .collect()
    }

    /// Forward inference through both sigmoid layers
    pub fn forward(&self, features: &[f32]) -> OutputVector {
        let hidden = self.hidden_activations(features);
        self.output_from_hidden(&hidden)
    }

    fn output_from_hidden(&self, hidden: &Array1<f32>) -> OutputVector {
        self.hidden_to_output
            .rows()
            .into_iter()
            .map(|row| sigmoid(row.dot(hidden)))
            .collect()
    }

    /// Gradient-descent step: `w -= lr * clamp(grad)` for both matrices.
    pub fn apply_gradients(&mut self, grads: &Gradients, lr: f32, clamp: f32) {
        let mut grad_ih = grads.input_to_hidden.clone();
        let mut grad_ho = grads.hidden_to_output.clone();
        clamp_finite(&mut grad_ih, clamp);
        clamp_finite(&mut grad_ho, clamp);

        self.input_to_hidden.scaled_add(-lr, &grad_ih);
        self.hidden_to_output.scaled_add(-lr, &grad_ho);
    }
}

/// Mean over examples of the per-unit squared error
pub fn mean_squared_error<'a, I>(params: &NetworkParameters, examples: I) -> f32
where
    I: IntoIterator<Item = &'a Example>,
{
    let mut total = 0.0f32;
    let mut count = 0usize;
    for example in examples {
        let prediction = params.forward(example.features.as_slice());
        let squared: f32 = prediction
            .iter()
            .zip(example.target.as_slice().iter())
            .map(|(p, t)| (p - t) * (p - t))
            .sum();
        total += squared / prediction.len().max(1) as f32;
        count += 1;
    }
    if count == 0 {
        return 0.0;
    }
    total / count as f32
}
