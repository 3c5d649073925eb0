use std::fs;

use serde::{Deserialize, Serialize};

use crate::errors::{ModelError, Result};

/// Layer widths of the two-layer network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkShape {
    /// Length of a feature vector (F)
    pub features: usize,
    /// Hidden layer width (H)
    pub hidden: usize,
    /// Length of an output / target vector (O)
    pub outputs: usize,
}

impl Default for NetworkShape {
    fn default() -> Self {
        Self {
            features: 10,
            hidden: 8,
            outputs: 3,
        }
    }
}

impl NetworkShape {
    pub fn new(features: usize, hidden: usize, outputs: usize) -> Self {
        Self {
            features,
            hidden,
            outputs,
        }
    }

    /// Total number of weights across both matrices
    pub fn num_parameters(&self) -> usize {
        self.hidden * self.features + self.outputs * self.hidden
    }

    pub fn validate(&self) -> Result<()> {
        if self.features == 0 || self.hidden == 0 || self.outputs == 0 {
            return Err(ModelError::InvalidInput {
                message: format!(
                    "Network dimensions must be non-zero, got {}x{}x{}",
                    self.features, self.hidden, self.outputs
                ),
            });
        }
        Ok(())
    }
}

/// Configuration for the adaptive learning-rate controller
///
/// The loss-trend schedule, step/cosine decay and Adam moment estimates all
/// read their constants from here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningRateConfig {
    pub initial: f32,
    pub min: f32,
    pub max: f32,
    /// Number of recent losses kept (oldest evicted first)
    pub history_capacity: usize,
    /// Losses required before the schedule reacts
    pub trend_window: usize,
    pub increase_factor: f32,
    pub plateau_factor: f32,
    pub decrease_factor: f32,
    /// Relative distance from the mean that still counts as a plateau
    pub plateau_tolerance: f32,
    pub step_decay_interval: usize,
    pub step_decay_factor: f32,
    /// Training progress after which cosine annealing takes over
    pub cosine_start: f32,
    pub beta1: f32,
    pub beta2: f32,
    pub epsilon: f32,
}

impl Default for LearningRateConfig {
    fn default() -> Self {
        Self {
            initial: 0.01,
            min: 1e-4,
            max: 0.1,
            history_capacity: 20,
            trend_window: 5,
            increase_factor: 1.05,
            plateau_factor: 0.5,
            decrease_factor: 0.7,
            plateau_tolerance: 0.01,
            step_decay_interval: 10,
            step_decay_factor: 0.8,
            cosine_start: 0.5,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
        }
    }
}

impl LearningRateConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.min > 0.0 && self.min <= self.initial && self.initial <= self.max) {
            return Err(ModelError::InvalidInput {
                message: format!(
                    "Learning rate bounds must satisfy 0 < min <= initial <= max, got {} / {} / {}",
                    self.min, self.initial, self.max
                ),
            });
        }
        // The plateau test looks at the last three losses of the window.
        if self.trend_window < 3 || self.history_capacity < self.trend_window {
            return Err(ModelError::InvalidInput {
                message: format!(
                    "trend_window ({}) must be >= 3 and <= history_capacity ({})",
                    self.trend_window, self.history_capacity
                ),
            });
        }
        if !(0.0..1.0).contains(&self.beta1) || !(0.0..1.0).contains(&self.beta2) {
            return Err(ModelError::InvalidInput {
                message: format!("Betas must lie in [0, 1), got {} / {}", self.beta1, self.beta2),
            });
        }
        Ok(())
    }
}

/// Configuration for meta-learning and single-habit adaptation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaLearningConfig {
    pub shape: NetworkShape,
    /// Fixed learning rate of the per-task inner loop
    pub inner_lr: f32,
    /// Learning rate applied to the shared parameters after each meta-batch
    pub outer_lr: f32,
    pub inner_steps: usize,
    pub meta_batch_size: usize,
    /// Tasks with fewer examples are skipped during meta-learning
    pub min_task_examples: usize,
    pub adaptation_steps: usize,
    /// Tasks with fewer examples are not adapted
    pub min_adaptation_examples: usize,
    /// Fraction of a task's examples used as the support set
    pub support_fraction: f32,
    /// Half-width of the uniform weight initialisation interval
    pub init_range: f32,
    /// Element-wise bound applied to gradients before an update
    pub gradient_clamp: f32,
}

impl Default for MetaLearningConfig {
    fn default() -> Self {
        Self {
            shape: NetworkShape::default(),
            inner_lr: 0.1,
            outer_lr: 0.01,
            inner_steps: 5,
            meta_batch_size: 5,
            min_task_examples: 5,
            adaptation_steps: 10,
            min_adaptation_examples: 3,
            support_fraction: 0.7,
            init_range: 0.1,
            gradient_clamp: 10.0,
        }
    }
}

impl MetaLearningConfig {
    pub fn validate(&self) -> Result<()> {
        self.shape.validate()?;
        if self.meta_batch_size == 0 {
            return Err(ModelError::InvalidInput {
                message: "meta_batch_size must be at least 1".to_string(),
            });
        }
        if self.min_task_examples < 2 {
            return Err(ModelError::InvalidInput {
                message: format!(
                    "min_task_examples must be at least 2 to allow a support/query split, got {}",
                    self.min_task_examples
                ),
            });
        }
        if !(self.support_fraction > 0.0 && self.support_fraction < 1.0) {
            return Err(ModelError::InvalidInput {
                message: format!(
                    "support_fraction must lie in (0, 1), got {}",
                    self.support_fraction
                ),
            });
        }
        if !(self.init_range > 0.0) || !(self.gradient_clamp > 0.0) {
            return Err(ModelError::InvalidInput {
                message: format!(
                    "init_range ({}) and gradient_clamp ({}) must be positive",
                    self.init_range, self.gradient_clamp
                ),
            });
        }
        Ok(())
    }
}

/// Combined configuration file accepted by the binaries
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingConfig {
    #[serde(default)]
    pub meta: MetaLearningConfig,
    #[serde(default)]
    pub learning_rate: LearningRateConfig,
}

impl TrainingConfig {
    /// Load and validate a JSON configuration file
    pub fn from_json_file(path: &str) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(ModelError::from)?;
        let config: TrainingConfig =
            serde_json::from_str(&raw).map_err(|e| ModelError::Serialization {
                source: Box::new(e),
            })?;
        config.meta.validate()?;
        config.learning_rate.validate()?;
        Ok(config)
    }
}
