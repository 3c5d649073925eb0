use std::path::Path;

use clap::{Parser, ValueEnum};
use habitnet::{
    AdaptiveLearningRateController, Dataset, DatasetType, FileAsset, MetaLearnOutcome,
    MetaLearner, ModelError, NetworkParameters, Trainer, TrainingConfig,
};
use rand::SeedableRng;
use rand::rngs::StdRng;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Mode {
    /// Meta-learn shared parameters across all habits
    Meta,
    /// Train one parameter set on the pooled examples of all habits
    Train,
}

#[derive(Parser)]
#[command(name = "habitnet")]
#[command(about = "Train a habit prediction model from a task dataset")]
struct Args {
    /// Task dataset (.json or .csv)
    #[arg(short, long)]
    dataset: String,

    #[arg(short, long, value_enum, default_value_t = Mode::Meta)]
    mode: Mode,

    /// Epochs for --mode train
    #[arg(short, long, default_value_t = 100)]
    epochs: usize,

    /// JSON configuration file; defaults are used when omitted
    #[arg(short, long)]
    config: Option<String>,

    /// Seed for weight initialisation and task shuffling
    #[arg(short, long)]
    seed: Option<u64>,

    /// Pre-trained model blob to start from
    #[arg(short, long)]
    base_model: Option<String>,

    /// Where to write the versioned model (.json or .bin)
    #[arg(short, long, default_value = "models/habitnet.bin")]
    output: String,
}

fn main() -> habitnet::Result<()> {
    let args = Args::parse();

    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = match &args.config {
        Some(path) => TrainingConfig::from_json_file(path)?,
        None => TrainingConfig::default(),
    };
    config.meta.validate()?;
    config.learning_rate.validate()?;

    let seed = args.seed.unwrap_or_else(rand::random);
    let mut rng = StdRng::seed_from_u64(seed);
    tracing::info!(seed = seed, "Random source seeded");

    let dataset = Dataset::new(
        &args.dataset,
        DatasetType::from_path(&args.dataset),
        &config.meta.shape,
    )?;

    let mut learner = match &args.base_model {
        Some(path) => MetaLearner::from_asset(config.meta.clone(), &FileAsset::new(path), &mut rng)?,
        None => MetaLearner::new(config.meta.clone(), &mut rng)?,
    };

    let params: NetworkParameters = match args.mode {
        Mode::Meta => {
            match learner.meta_learn(&dataset.tasks, &mut rng) {
                MetaLearnOutcome::Completed {
                    batches,
                    tasks_used,
                    tasks_skipped,
                    mean_query_loss,
                } => {
                    println!(
                        "Meta-learning finished: {} batches, {} tasks used, {} skipped, query loss {:.4}",
                        batches, tasks_used, tasks_skipped, mean_query_loss
                    );
                }
                MetaLearnOutcome::InsufficientTasks { provided, required } => {
                    return Err(ModelError::InvalidInput {
                        message: format!(
                            "Meta-learning needs at least {} habits, dataset has {}",
                            required, provided
                        ),
                    });
                }
                MetaLearnOutcome::Cancelled { batches_applied } => {
                    return Err(ModelError::Training {
                        message: format!("Cancelled after {} meta-batches", batches_applied),
                    });
                }
                MetaLearnOutcome::Failed { error, .. } => return Err(error),
            }
            learner.into_parameters()
        }
        Mode::Train => {
            let mut params = learner.into_parameters();
            let controller = AdaptiveLearningRateController::new(config.learning_rate.clone());
            let mut trainer = Trainer::new(controller, config.meta.gradient_clamp);
            let report = trainer.train(&mut params, &dataset.all_examples(), args.epochs)?;
            println!(
                "Training finished: loss {:.4} -> {:.4}, learning rate {:.6}",
                report.epoch_losses.first().copied().unwrap_or(report.final_loss),
                report.final_loss,
                report.final_learning_rate
            );
            params
        }
    };

    if let Some(parent) = Path::new(&args.output).parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    params.save_versioned(&args.output, Some(format!("{:?} run, seed {}", args.mode, seed)))?;
    println!("Model saved to {}", args.output);

    Ok(())
}
