use std::collections::{HashMap, VecDeque};
use std::f32::consts::PI;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::LearningRateConfig;
use crate::progress::ProgressSignal;

/// Identifies one scalar weight for the per-parameter moment caches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParamKey {
    pub layer: usize,
    pub row: usize,
    pub col: usize,
}

impl ParamKey {
    pub fn new(layer: usize, row: usize, col: usize) -> Self {
        Self { layer, row, col }
    }
}

/// How the recent loss window was classified by `update_learning_rate`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LossTrend {
    /// Not enough losses recorded yet; the rate was left alone
    Warmup,
    /// Last three losses sit within tolerance of their mean
    Plateau,
    /// Every loss is below the one two positions earlier
    Decreasing,
    /// Anything else: rising or mixed
    Unstable,
}

#[derive(Debug, Clone, Copy, Default)]
struct MomentEstimate {
    momentum: f32,
    velocity: f32,
}

/// Scalar learning rate driven by loss trends and decay schedules, plus
/// Adam-style first/second moment estimates per parameter.
///
/// The controller only suggests update magnitudes; callers apply them.
#[derive(Debug, Clone)]
pub struct AdaptiveLearningRateController {
    config: LearningRateConfig,
    learning_rate: f32,
    loss_history: VecDeque<f32>,
    moments: HashMap<ParamKey, MomentEstimate>,
    iteration: u64,
    signal: ProgressSignal,
}

impl Default for AdaptiveLearningRateController {
    fn default() -> Self {
        Self::new(LearningRateConfig::default())
    }
}

impl AdaptiveLearningRateController {
    pub fn new(config: LearningRateConfig) -> Self {
        let learning_rate = config.initial;
        Self {
            loss_history: VecDeque::with_capacity(config.history_capacity),
            config,
            learning_rate,
            moments: HashMap::new(),
            iteration: 0,
            signal: ProgressSignal::new(learning_rate),
        }
    }

    pub fn config(&self) -> &LearningRateConfig {
        &self.config
    }

    #[inline]
    pub fn learning_rate(&self) -> f32 {
        self.learning_rate
    }

    /// Handle that always reflects the current learning rate
    pub fn learning_rate_signal(&self) -> ProgressSignal {
        self.signal.clone()
    }

    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    pub fn loss_history(&self) -> impl Iterator<Item = f32> + '_ {
        self.loss_history.iter().copied()
    }

    fn set_learning_rate(&mut self, value: f32) {
        self.learning_rate = value;
        self.signal.set(value);
    }

    /// Record `loss` and adjust the learning rate from the recent trend.
    ///
    /// Plateau is tested before the decreasing condition and wins when both hold.
    pub fn update_learning_rate(&mut self, loss: f32) -> LossTrend {
        if self.loss_history.len() == self.config.history_capacity {
            self.loss_history.pop_front();
        }
        self.loss_history.push_back(loss);

        if self.loss_history.len() < self.config.trend_window {
            return LossTrend::Warmup;
        }

        let window: Vec<f32> = self
            .loss_history
            .iter()
            .skip(self.loss_history.len() - self.config.trend_window)
            .copied()
            .collect();

        let trend = if Self::is_plateau(&window[window.len() - 3..], self.config.plateau_tolerance)
        {
            LossTrend::Plateau
        } else if Self::is_decreasing(&window) {
            LossTrend::Decreasing
        } else {
            LossTrend::Unstable
        };

        let updated = match trend {
            LossTrend::Plateau => {
                (self.learning_rate * self.config.plateau_factor).max(self.config.min)
            }
            LossTrend::Decreasing => {
                (self.learning_rate * self.config.increase_factor).min(self.config.max)
            }
            LossTrend::Unstable => {
                (self.learning_rate * self.config.decrease_factor).max(self.config.min)
            }
            LossTrend::Warmup => self.learning_rate,
        };
        self.set_learning_rate(updated);

        debug!(loss = loss, trend = ?trend, learning_rate = updated, "Learning rate updated");
        trend
    }

    fn is_plateau(recent: &[f32], tolerance: f32) -> bool {
        let mean = recent.iter().sum::<f32>() / recent.len() as f32;
        // A zero mean would make the relative threshold zero; keep it positive.
        let threshold = (mean.abs() * tolerance).max(f32::MIN_POSITIVE);
        recent.iter().all(|&l| (l - mean).abs() <= threshold)
    }

    fn is_decreasing(window: &[f32]) -> bool {
        (2..window.len()).all(|i| window[i] < window[i - 2])
    }

    /// One Adam step for `key`, returning the update the caller should subtract.
    ///
    /// Every call advances the shared iteration counter, which drives bias
    /// correction for all keys.
    pub fn optimize_parameter(&mut self, key: ParamKey, gradient: f32) -> f32 {
        self.iteration += 1;
        let beta1 = self.config.beta1;
        let beta2 = self.config.beta2;

        let estimate = self.moments.entry(key).or_default();
        estimate.momentum = beta1 * estimate.momentum + (1.0 - beta1) * gradient;
        estimate.velocity = beta2 * estimate.velocity + (1.0 - beta2) * gradient * gradient;

        let t = self.iteration.min(i32::MAX as u64) as i32;
        let m_hat = estimate.momentum / (1.0 - beta1.powi(t));
        let v_hat = estimate.velocity / (1.0 - beta2.powi(t));

        self.learning_rate * m_hat / (v_hat.sqrt() + self.config.epsilon)
    }

    /// Step decay every `step_decay_interval` epochs, then cosine annealing
    /// once progress passes `cosine_start`. The cosine value overrides the
    /// step decay when both apply.
    pub fn apply_decay(&mut self, epoch: usize, total_epochs: usize) {
        let interval = self.config.step_decay_interval;
        if epoch > 0 && interval > 0 && epoch % interval == 0 {
            let decayed = (self.learning_rate * self.config.step_decay_factor).max(self.config.min);
            self.set_learning_rate(decayed);
        }

        if total_epochs == 0 {
            return;
        }
        let progress = epoch as f32 / total_epochs as f32;
        if progress > self.config.cosine_start {
            let min = self.config.min;
            let annealed =
                min + (self.config.initial - min) * 0.5 * (1.0 + (PI * progress).cos());
            self.set_learning_rate(annealed);
        }
    }

    /// Learning rate for `layer_index`, shrinking linearly with depth
    pub fn learning_rate_for_layer(&self, layer_index: usize, total_layers: usize) -> f32 {
        if total_layers == 0 {
            return self.learning_rate;
        }
        self.learning_rate * (1.0 - 0.5 * layer_index as f32 / total_layers as f32)
    }

    /// Restore the initial learning rate and drop all accumulated state
    pub fn reset(&mut self) {
        self.set_learning_rate(self.config.initial);
        self.iteration = 0;
        self.moments.clear();
        self.loss_history.clear();
    }
}
