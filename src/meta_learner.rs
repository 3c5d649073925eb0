use rand::Rng;
use rand::seq::SliceRandom;
use rayon::prelude::*;
use tracing::{debug, info, instrument, warn};

use crate::codec::ParameterCodec;
use crate::collaborators::ModelAssetSource;
use crate::config::MetaLearningConfig;
use crate::errors::{ModelError, Result};
use crate::gradients::{GradientComputer, Gradients};
use crate::network::{Example, FeatureVector, NetworkParameters, OutputVector, Task, mean_squared_error};
use crate::progress::{CancellationToken, ProgressSignal};

/// Result of a [`MetaLearner::meta_learn`] call.
///
/// Only `Completed` counts as success. Meta-batches applied before a
/// `Cancelled` or `Failed` outcome stay applied to the shared parameters.
#[derive(Debug)]
pub enum MetaLearnOutcome {
    Completed {
        batches: usize,
        tasks_used: usize,
        tasks_skipped: usize,
        /// Mean query-set error of the adapted clones
        mean_query_loss: f32,
    },
    InsufficientTasks {
        provided: usize,
        required: usize,
    },
    Cancelled {
        batches_applied: usize,
    },
    Failed {
        batches_applied: usize,
        error: ModelError,
    },
}

impl MetaLearnOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, MetaLearnOutcome::Completed { .. })
    }
}

/// MAML-style meta-learner over habits.
///
/// Holds one shared parameter set. `meta_learn` adapts a clone per task on a
/// support split, takes the gradient of the adapted clone on the query split,
/// and applies the batch-averaged result to the shared parameters.
pub struct MetaLearner {
    config: MetaLearningConfig,
    shared: NetworkParameters,
    meta_learning_progress: ProgressSignal,
    adaptation_progress: ProgressSignal,
    cancellation: CancellationToken,
}

impl MetaLearner {
    /// Create a learner with randomly initialised shared parameters
    ///
    /// # Errors
    /// Returns `ModelError::InvalidInput` if `config` fails validation
    pub fn new<R: Rng + ?Sized>(config: MetaLearningConfig, rng: &mut R) -> Result<Self> {
        config.validate()?;
        let shared = NetworkParameters::random(config.shape, config.init_range, rng)?;
        Ok(Self::from_parts(config, shared))
    }

    /// Create a learner around existing shared parameters
    pub fn with_parameters(config: MetaLearningConfig, shared: NetworkParameters) -> Result<Self> {
        config.validate()?;
        if shared.shape() != config.shape {
            return Err(ModelError::InvalidInput {
                message: format!(
                    "Parameters have shape {:?}, configuration expects {:?}",
                    shared.shape(),
                    config.shape
                ),
            });
        }
        Ok(Self::from_parts(config, shared))
    }

    /// Start from a pre-trained blob, falling back to random weights when the
    /// blob is unavailable, malformed, or of a different shape.
    pub fn from_asset<S, R>(config: MetaLearningConfig, source: &S, rng: &mut R) -> Result<Self>
    where
        S: ModelAssetSource + ?Sized,
        R: Rng + ?Sized,
    {
        match source
            .load_base_model()
            .and_then(|bytes| ParameterCodec::deserialize(&bytes))
        {
            Ok(params) if params.shape() == config.shape => {
                info!(parameters = params.parameters(), "Loaded base model");
                Self::with_parameters(config, params)
            }
            Ok(params) => {
                warn!(
                    found = ?params.shape(),
                    expected = ?config.shape,
                    "Base model shape mismatch, using random initialisation"
                );
                Self::new(config, rng)
            }
            Err(e) => {
                warn!(error = %e, "Base model unavailable, using random initialisation");
                Self::new(config, rng)
            }
        }
    }

    fn from_parts(config: MetaLearningConfig, shared: NetworkParameters) -> Self {
        Self {
            config,
            shared,
            meta_learning_progress: ProgressSignal::new(0.0),
            adaptation_progress: ProgressSignal::new(0.0),
            cancellation: CancellationToken::new(),
        }
    }

    pub fn config(&self) -> &MetaLearningConfig {
        &self.config
    }

    pub fn parameters(&self) -> &NetworkParameters {
        &self.shared
    }

    pub fn into_parameters(self) -> NetworkParameters {
        self.shared
    }

    /// Fraction of meta-batches finished in the current or last `meta_learn` run
    pub fn meta_learning_progress(&self) -> ProgressSignal {
        self.meta_learning_progress.clone()
    }

    /// Fraction of steps finished in the current or last `adapt_to_habit` run
    pub fn adaptation_progress(&self) -> ProgressSignal {
        self.adaptation_progress.clone()
    }

    /// Handle for stopping a running `meta_learn` between meta-batches.
    ///
    /// A cancellation is consumed by the run it stops: the token is cleared
    /// when `meta_learn` returns `Cancelled`, so the next call runs normally.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    /// Run the two-level meta-learning procedure over `tasks`.
    ///
    /// Tasks are consumed in meta-batches of `meta_batch_size`; a trailing
    /// partial batch is dropped. Not transactional: a failure leaves earlier
    /// meta-batch updates in place.
    #[instrument(skip(self, tasks, rng), fields(tasks = tasks.len()))]
    pub fn meta_learn<R: Rng + ?Sized>(&mut self, tasks: &[Task], rng: &mut R) -> MetaLearnOutcome {
        let batch_size = self.config.meta_batch_size;
        if tasks.len() < batch_size {
            info!(
                provided = tasks.len(),
                required = batch_size,
                "Not enough tasks for meta-learning"
            );
            return MetaLearnOutcome::InsufficientTasks {
                provided: tasks.len(),
                required: batch_size,
            };
        }

        let num_batches = tasks.len() / batch_size;
        let mut tasks_used = 0usize;
        let mut tasks_skipped = 0usize;
        let mut query_loss_sum = 0.0f32;
        self.meta_learning_progress.set(0.0);

        for (batch_index, batch) in tasks.chunks_exact(batch_size).enumerate() {
            if self.cancellation.is_cancelled() {
                warn!(batches_applied = batch_index, "Meta-learning cancelled");
                self.cancellation.reset();
                return MetaLearnOutcome::Cancelled {
                    batches_applied: batch_index,
                };
            }

            let mut meta_grads = Gradients::zeros(self.config.shape);
            for task in batch {
                if task.len() < self.config.min_task_examples {
                    debug!(
                        habit_id = %task.habit_id,
                        examples = task.len(),
                        "Skipping task with too few examples"
                    );
                    tasks_skipped += 1;
                    continue;
                }

                match self.task_meta_gradient(task, rng) {
                    Ok((task_grads, query_loss)) => {
                        meta_grads.add_scaled(&task_grads, 1.0 / batch_size as f32);
                        query_loss_sum += query_loss;
                        tasks_used += 1;
                    }
                    Err(error) => {
                        warn!(
                            habit_id = %task.habit_id,
                            batch = batch_index,
                            error = %error,
                            "Meta-learning aborted"
                        );
                        return MetaLearnOutcome::Failed {
                            batches_applied: batch_index,
                            error,
                        };
                    }
                }
            }

            self.shared
                .apply_gradients(&meta_grads, self.config.outer_lr, self.config.gradient_clamp);
            self.meta_learning_progress
                .set((batch_index + 1) as f32 / num_batches as f32);

            info!(
                batch = batch_index,
                batches = num_batches,
                meta_grad_norm = meta_grads.norm(),
                "Meta-batch applied"
            );
        }

        let mean_query_loss = if tasks_used > 0 {
            query_loss_sum / tasks_used as f32
        } else {
            0.0
        };
        info!(
            batches = num_batches,
            tasks_used = tasks_used,
            tasks_skipped = tasks_skipped,
            mean_query_loss = mean_query_loss,
            "Meta-learning completed"
        );
        MetaLearnOutcome::Completed {
            batches: num_batches,
            tasks_used,
            tasks_skipped,
            mean_query_loss,
        }
    }

    /// Inner loop on the support split, then the query-split gradient of the
    /// adapted clone together with its query error.
    fn task_meta_gradient<R: Rng + ?Sized>(
        &self,
        task: &Task,
        rng: &mut R,
    ) -> Result<(Gradients, f32)> {
        task.validate(&self.config.shape)?;

        let n = task.len();
        if n < 2 {
            return Err(ModelError::InvalidInput {
                message: format!(
                    "habit {} has {} examples, a support/query split needs at least 2",
                    task.habit_id, n
                ),
            });
        }
        let mut order: Vec<usize> = (0..n).collect();
        order.shuffle(rng);
        let (support, query) = order.split_at(self.support_len(n));

        let mut adapted = self.shared.clone();
        for _ in 0..self.config.inner_steps {
            let grads = GradientComputer::batch_gradients(
                &adapted,
                support.iter().map(|&i| &task.examples[i]),
            );
            adapted.apply_gradients(&grads, self.config.inner_lr, self.config.gradient_clamp);
        }

        let query_examples = query.iter().map(|&i| &task.examples[i]);
        let meta_grads = GradientComputer::batch_gradients(&adapted, query_examples.clone());
        if !meta_grads.is_finite() || !adapted.is_finite() {
            return Err(ModelError::Training {
                message: format!("Non-finite meta-gradient for habit {}", task.habit_id),
            });
        }

        Ok((meta_grads, mean_squared_error(&adapted, query_examples)))
    }

    /// Size of the support split for `n >= 2` examples: `floor(n * support_fraction)`,
    /// kept within `[1, n - 1]` so neither split is empty.
    fn support_len(&self, n: usize) -> usize {
        // The small offset absorbs f32 representation error in the fraction.
        ((n as f32 * self.config.support_fraction + 1e-3).floor() as usize).clamp(1, n - 1)
    }

    /// Fine-tune a clone of the shared parameters on one habit.
    ///
    /// Tasks with fewer than `min_adaptation_examples` examples get an
    /// unmodified clone. The shared parameters are never changed.
    ///
    /// # Errors
    /// Returns `ModelError::InvalidInput` if an example does not fit the
    /// network shape (too many features or a target of the wrong width).
    #[instrument(skip(self, task), fields(habit_id = %task.habit_id, examples = task.len()))]
    pub fn adapt_to_habit(&self, task: &Task) -> Result<NetworkParameters> {
        if task.len() < self.config.min_adaptation_examples {
            debug!("Too few examples to adapt, returning shared parameters");
            return Ok(self.shared.clone());
        }
        task.validate(&self.config.shape)?;

        let steps = self.config.adaptation_steps;
        let mut adapted = self.shared.clone();
        self.adaptation_progress.set(0.0);
        for step in 0..steps {
            self.adaptation_step(&mut adapted, &task.examples, step, steps);
        }

        debug!(
            loss = mean_squared_error(&adapted, &task.examples),
            "Adapted to habit"
        );
        Ok(adapted)
    }

    /// One full-batch step of `adapt_to_habit`, then progress `(step + 1) / steps`
    fn adaptation_step(
        &self,
        adapted: &mut NetworkParameters,
        examples: &[Example],
        step: usize,
        steps: usize,
    ) {
        let grads = GradientComputer::batch_gradients(adapted, examples);
        adapted.apply_gradients(&grads, self.config.inner_lr, self.config.gradient_clamp);
        self.adaptation_progress.set((step + 1) as f32 / steps as f32);
    }

    /// Forward pass through `params`, typically the result of `adapt_to_habit`
    pub fn predict(&self, features: &FeatureVector, params: &NetworkParameters) -> OutputVector {
        params.forward(features.as_slice())
    }

    /// Predictions for many feature vectors, in input order
    pub fn predict_batch(
        &self,
        features: &[FeatureVector],
        params: &NetworkParameters,
    ) -> Vec<OutputVector> {
        features
            .par_iter()
            .map(|f| params.forward(f.as_slice()))
            .collect()
    }

    /// Query-style error of `params` on `examples`
    pub fn evaluate(&self, examples: &[Example], params: &NetworkParameters) -> f32 {
        mean_squared_error(params, examples)
    }
}
