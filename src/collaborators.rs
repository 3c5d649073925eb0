//! Interfaces to the surrounding application: habit storage, feature
//! extraction and the bundled base-model asset.

use std::fs;
use std::path::PathBuf;

use tracing::debug;

use crate::errors::{ModelError, Result};
use crate::network::{Example, Task};

/// Turns a habit and its completion history into fixed-length examples.
pub trait FeatureExtractor {
    type Habit;
    type Completion;

    fn extract(&self, habit: &Self::Habit, completions: &[Self::Completion]) -> Vec<Example>;
}

/// Read access to stored habits and their completions.
pub trait HabitRepository {
    type Habit;
    type Completion;

    fn habit(&self, id: &str) -> Result<Option<Self::Habit>>;

    fn completions(&self, id: &str) -> Result<Vec<Self::Completion>>;
}

/// Source of a pre-trained model blob in the `ParameterCodec` format.
pub trait ModelAssetSource {
    fn load_base_model(&self) -> Result<Vec<u8>>;
}

/// Base model stored as a file on disk
#[derive(Debug, Clone)]
pub struct FileAsset {
    path: PathBuf,
}

impl FileAsset {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ModelAssetSource for FileAsset {
    fn load_base_model(&self) -> Result<Vec<u8>> {
        fs::read(&self.path).map_err(ModelError::from)
    }
}

impl ModelAssetSource for Vec<u8> {
    fn load_base_model(&self) -> Result<Vec<u8>> {
        Ok(self.clone())
    }
}

/// Build the task for `habit_id`, or `None` if the habit does not exist.
pub fn assemble_task<R, E>(repository: &R, extractor: &E, habit_id: &str) -> Result<Option<Task>>
where
    R: HabitRepository,
    E: FeatureExtractor<Habit = R::Habit, Completion = R::Completion>,
{
    let Some(habit) = repository.habit(habit_id)? else {
        debug!(habit_id = habit_id, "Habit not found");
        return Ok(None);
    };
    let completions = repository.completions(habit_id)?;
    let examples = extractor.extract(&habit, &completions);
    debug!(
        habit_id = habit_id,
        completions = completions.len(),
        examples = examples.len(),
        "Assembled task"
    );
    Ok(Some(Task::new(habit_id, examples)))
}
