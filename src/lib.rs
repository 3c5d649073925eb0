pub mod adaptive_lr;
pub mod codec;
pub mod collaborators;
pub mod config;
pub mod dataset_loader;
pub mod errors;
pub mod gradients;
pub mod meta_learner;
pub mod model_persistence;
pub mod network;
pub mod numeric;
pub mod progress;
pub mod trainer;
// Re-export key structs for easier access
pub use adaptive_lr::{AdaptiveLearningRateController, LossTrend, ParamKey};
pub use codec::ParameterCodec;
pub use collaborators::{
    FeatureExtractor, FileAsset, HabitRepository, ModelAssetSource, assemble_task,
};
pub use config::{LearningRateConfig, MetaLearningConfig, NetworkShape, TrainingConfig};
pub use dataset_loader::{Dataset, DatasetType};
pub use errors::{ModelError, Result};
pub use gradients::{GradientComputer, Gradients};
pub use meta_learner::{MetaLearnOutcome, MetaLearner};
pub use model_persistence::{ModelMetadata, VersionedModel};
pub use network::{
    Example, FeatureVector, NetworkParameters, OutputVector, TargetVector, Task,
    mean_squared_error,
};
pub use progress::{CancellationToken, ProgressSignal};
pub use trainer::{Trainer, TrainingReport};

// Constants
pub const MAX_FILE_SIZE: u64 = 64 * 1024 * 1024;
