use tracing::{info, instrument, warn};

use crate::adaptive_lr::{AdaptiveLearningRateController, ParamKey};
use crate::errors::{ModelError, Result};
use crate::gradients::GradientComputer;
use crate::network::{Example, NetworkParameters, mean_squared_error};
use crate::numeric::clamp_finite;

/// Loss curve and final state of a [`Trainer::train`] run
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingReport {
    /// Mean squared error measured at the start of each epoch
    pub epoch_losses: Vec<f32>,
    /// Error after the final update
    pub final_loss: f32,
    pub final_learning_rate: f32,
}

/// Full-batch training of a single parameter set, one Adam step per weight
/// per epoch, with the learning rate driven by the loss trend.
#[derive(Debug, Clone)]
pub struct Trainer {
    controller: AdaptiveLearningRateController,
    gradient_clamp: f32,
}

impl Trainer {
    pub fn new(controller: AdaptiveLearningRateController, gradient_clamp: f32) -> Self {
        Self {
            controller,
            gradient_clamp,
        }
    }

    pub fn controller(&self) -> &AdaptiveLearningRateController {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut AdaptiveLearningRateController {
        &mut self.controller
    }

    /// Run `epochs` full-batch epochs over `examples`, updating `params` in place.
    ///
    /// # Errors
    /// `ModelError::InvalidInput` for an empty or ill-shaped example set,
    /// `ModelError::Training` when the loss or the weights become non-finite.
    #[instrument(skip(self, params, examples), fields(examples = examples.len()))]
    pub fn train(
        &mut self,
        params: &mut NetworkParameters,
        examples: &[Example],
        epochs: usize,
    ) -> Result<TrainingReport> {
        if examples.is_empty() {
            return Err(ModelError::InvalidInput {
                message: "Training requires at least one example".to_string(),
            });
        }
        let shape = params.shape();
        for example in examples {
            example.validate(&shape)?;
        }

        let mut epoch_losses = Vec::with_capacity(epochs);

        for epoch in 0..epochs {
            let loss = mean_squared_error(params, examples);
            if !loss.is_finite() {
                warn!(epoch = epoch, loss = loss, "Training diverged");
                return Err(ModelError::Training {
                    message: format!("Training diverged at epoch {}: loss is {}", epoch, loss),
                });
            }
            epoch_losses.push(loss);

            let mut grads = GradientComputer::batch_gradients(params, examples);
            clamp_finite(&mut grads.input_to_hidden, self.gradient_clamp);
            clamp_finite(&mut grads.hidden_to_output, self.gradient_clamp);

            let [input_to_hidden, hidden_to_output] = params.matrices_mut();
            for (layer, weights, layer_grads) in [
                (0usize, input_to_hidden, &grads.input_to_hidden),
                (1, hidden_to_output, &grads.hidden_to_output),
            ] {
                for ((row, col), weight) in weights.indexed_iter_mut() {
                    let update = self
                        .controller
                        .optimize_parameter(ParamKey::new(layer, row, col), layer_grads[[row, col]]);
                    *weight -= update;
                }
            }

            if !params.is_finite() {
                return Err(ModelError::Training {
                    message: format!("Training diverged at epoch {}: non-finite weights", epoch),
                });
            }

            self.controller.update_learning_rate(loss);
            self.controller.apply_decay(epoch, epochs);

            info!(
                epoch = epoch,
                loss = loss,
                grad_norm = grads.norm(),
                lr = self.controller.learning_rate(),
                "Training epoch completed"
            );
        }

        Ok(TrainingReport {
            epoch_losses,
            final_loss: mean_squared_error(params, examples),
            final_learning_rate: self.controller.learning_rate(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NetworkShape;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn toy_examples() -> Vec<Example> {
        (0..8)
            .map(|i| {
                let x = i as f32 / 8.0;
                Example::new(vec![x, 1.0 - x], vec![x])
            })
            .collect()
    }

    #[test]
    fn test_training_reduces_loss() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut params = NetworkParameters::random(NetworkShape::new(2, 4, 1), 0.1, &mut rng).unwrap();
        let mut trainer = Trainer::new(AdaptiveLearningRateController::default(), 10.0);

        let report = trainer.train(&mut params, &toy_examples(), 200).unwrap();
        assert_eq!(report.epoch_losses.len(), 200);
        assert!(report.final_loss < report.epoch_losses[0]);
        assert!(params.is_finite());
        assert!(report.final_learning_rate >= trainer.controller().config().min);
    }

    #[test]
    fn test_training_rejects_empty_input() {
        let mut params = NetworkParameters::zeros(NetworkShape::new(2, 2, 1));
        let mut trainer = Trainer::new(AdaptiveLearningRateController::default(), 10.0);
        assert!(matches!(
            trainer.train(&mut params, &[], 5),
            Err(ModelError::InvalidInput { .. })
        ));
    }

    #[test]
    fn test_training_rejects_wrong_target_width() {
        let mut params = NetworkParameters::zeros(NetworkShape::new(2, 2, 1));
        let mut trainer = Trainer::new(AdaptiveLearningRateController::default(), 10.0);
        let examples = vec![Example::new(vec![1.0, 0.0], vec![1.0, 0.0])];
        assert!(trainer.train(&mut params, &examples, 1).is_err());
        assert_eq!(params, NetworkParameters::zeros(NetworkShape::new(2, 2, 1)));
    }
}
