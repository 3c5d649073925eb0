use clap::Parser;
use habitnet::{
    Dataset, DatasetType, FeatureVector, MetaLearner, MetaLearningConfig, ModelError,
    NetworkParameters,
};

#[derive(Parser, Debug)]
#[command(name = "predict")]
#[command(about = "Predict habit outcomes with a saved habitnet model")]
struct Args {
    /// Path to the saved model (versioned .json or .bin)
    #[arg(short, long, default_value = "models/habitnet.bin")]
    model: String,

    /// Comma-separated feature values
    #[arg(short, long)]
    features: String,

    /// Dataset containing the habit to adapt to before predicting
    #[arg(short, long, requires = "habit")]
    dataset: Option<String>,

    /// Habit id within --dataset
    #[arg(long, requires = "dataset")]
    habit: Option<String>,
}

fn parse_features(raw: &str) -> habitnet::Result<FeatureVector> {
    raw.split(',')
        .map(|v| {
            v.trim().parse::<f32>().map_err(|e| ModelError::InvalidInput {
                message: format!("Cannot parse feature '{}': {}", v, e),
            })
        })
        .collect::<habitnet::Result<Vec<f32>>>()
        .map(FeatureVector::new)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let params = NetworkParameters::load_versioned(&args.model)?;
    let features = parse_features(&args.features)?;
    let config = MetaLearningConfig {
        shape: params.shape(),
        ..MetaLearningConfig::default()
    };
    let learner = MetaLearner::with_parameters(config, params)?;

    let adapted = match (&args.dataset, &args.habit) {
        (Some(path), Some(habit)) => {
            let dataset = Dataset::new(path, DatasetType::from_path(path), &learner.config().shape)?;
            let task = dataset.task(habit).ok_or_else(|| ModelError::InvalidInput {
                message: format!("Habit '{}' not found in {}", habit, path),
            })?;
            learner.adapt_to_habit(task)?
        }
        _ => learner.parameters().clone(),
    };

    let output = learner.predict(&features, &adapted);
    let formatted: Vec<String> = output.iter().map(|v| format!("{:.4}", v)).collect();
    println!("Prediction: [{}]", formatted.join(", "));

    Ok(())
}
