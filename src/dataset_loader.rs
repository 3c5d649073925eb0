use std::collections::HashMap;
use std::fs;

use csv::ReaderBuilder;

use crate::config::NetworkShape;
use crate::errors::{ModelError, Result};
use crate::network::{Example, Task};

/// Habit tasks loaded from disk for offline training
pub struct Dataset {
    pub tasks: Vec<Task>,
}

#[allow(clippy::upper_case_acronyms)]
pub enum DatasetType {
    /// A JSON array of `{ "habit_id": ..., "examples": [{ "features": [...], "target": [...] }] }`
    JSON,
    /// Header row, then `habit_id,f0..f{F-1},t0..t{O-1}` per example
    CSV,
}

impl DatasetType {
    /// Pick the type from the file extension, defaulting to JSON
    pub fn from_path(path: &str) -> Self {
        if path.ends_with(".csv") {
            DatasetType::CSV
        } else {
            DatasetType::JSON
        }
    }
}

impl Dataset {
    /// # Errors
    /// `ModelError::DatasetLoad` if the file cannot be read or a CSV row is
    /// malformed, `ModelError::Serialization` for invalid JSON, and
    /// `ModelError::InvalidInput` for oversize files or examples that do not
    /// fit `shape`.
    pub fn new(path: &str, type_of_data: DatasetType, shape: &NetworkShape) -> Result<Self> {
        check_file_size(path)?;
        let tasks = match type_of_data {
            DatasetType::JSON => get_tasks_from_json(path)?,
            DatasetType::CSV => get_tasks_from_csv(path, shape)?,
        };
        for task in &tasks {
            task.validate(shape)?;
        }

        tracing::info!(
            path = path,
            tasks = tasks.len(),
            examples = tasks.iter().map(Task::len).sum::<usize>(),
            "Dataset loaded"
        );
        Ok(Dataset { tasks })
    }

    pub fn task(&self, habit_id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.habit_id == habit_id)
    }

    /// All examples of every task, for ordinary (non-meta) training
    pub fn all_examples(&self) -> Vec<Example> {
        self.tasks
            .iter()
            .flat_map(|t| t.examples.iter().cloned())
            .collect()
    }
}

fn check_file_size(path: &str) -> Result<()> {
    let metadata = fs::metadata(path).map_err(ModelError::from)?;
    if metadata.len() > crate::MAX_FILE_SIZE {
        return Err(ModelError::InvalidInput {
            message: format!(
                "File size {} exceeds maximum allowed size {}",
                metadata.len(),
                crate::MAX_FILE_SIZE
            ),
        });
    }
    Ok(())
}

fn get_tasks_from_json(path: &str) -> Result<Vec<Task>> {
    let raw = fs::read_to_string(path).map_err(ModelError::from)?;
    serde_json::from_str::<Vec<Task>>(&raw).map_err(|e| ModelError::Serialization {
        source: Box::new(e),
    })
}

fn get_tasks_from_csv(path: &str, shape: &NetworkShape) -> Result<Vec<Task>> {
    let file = fs::File::open(path).map_err(ModelError::from)?;
    let mut rdr = ReaderBuilder::new().has_headers(true).from_reader(file);

    let expected_columns = 1 + shape.features + shape.outputs;
    // Tasks keep the order in which their habit first appears.
    let mut order: Vec<String> = Vec::new();
    let mut grouped: HashMap<String, Vec<Example>> = HashMap::new();

    for (line, result) in rdr.records().enumerate() {
        let record = result.map_err(|e| ModelError::DatasetLoad {
            source: std::io::Error::new(std::io::ErrorKind::InvalidData, e),
        })?;
        if record.len() != expected_columns {
            return Err(ModelError::InvalidInput {
                message: format!(
                    "Row {} has {} columns, expected {}",
                    line + 1,
                    record.len(),
                    expected_columns
                ),
            });
        }

        let values = record
            .iter()
            .skip(1)
            .map(|field| {
                field.trim().parse::<f32>().map_err(|e| ModelError::InvalidInput {
                    message: format!("Row {}: cannot parse '{}': {}", line + 1, field, e),
                })
            })
            .collect::<Result<Vec<f32>>>()?;
        let (features, target) = values.split_at(shape.features);

        let habit_id = record[0].trim().to_string();
        if !grouped.contains_key(&habit_id) {
            order.push(habit_id.clone());
        }
        grouped
            .entry(habit_id)
            .or_default()
            .push(Example::new(features.to_vec(), target.to_vec()));
    }

    Ok(order
        .into_iter()
        .map(|id| {
            let examples = grouped.remove(&id).unwrap_or_default();
            Task::new(id, examples)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::Builder;

    #[test]
    fn test_csv_groups_rows_by_habit_in_first_seen_order() {
        let mut file = Builder::new().suffix(".csv").tempfile().unwrap();
        writeln!(file, "habit,f0,f1,t0").unwrap();
        writeln!(file, "walk,0.1,0.2,1.0").unwrap();
        writeln!(file, "read,0.3,0.4,0.0").unwrap();
        writeln!(file, "walk,0.5,0.6,1.0").unwrap();
        let path = file.path().to_str().unwrap();

        let dataset = Dataset::new(path, DatasetType::from_path(path), &NetworkShape::new(2, 3, 1)).unwrap();
        assert_eq!(dataset.tasks.len(), 2);
        assert_eq!(dataset.tasks[0].habit_id, "walk");
        assert_eq!(dataset.tasks[0].len(), 2);
        assert_eq!(dataset.task("read").unwrap().examples[0].target.as_slice(), &[0.0]);
        assert_eq!(dataset.all_examples().len(), 3);
    }

    #[test]
    fn test_csv_rejects_wrong_column_count() {
        let mut file = Builder::new().suffix(".csv").tempfile().unwrap();
        writeln!(file, "habit,f0,f1,t0").unwrap();
        writeln!(file, "walk,0.1,1.0").unwrap();
        let path = file.path().to_str().unwrap();
        assert!(Dataset::new(path, DatasetType::CSV, &NetworkShape::new(2, 3, 1)).is_err());
    }

    #[test]
    fn test_json_dataset() {
        let mut file = Builder::new().suffix(".json").tempfile().unwrap();
        write!(
            file,
            r#"[{{"habit_id": "meditate", "examples": [{{"features": [0.1, 0.2], "target": [1.0]}}]}}]"#
        )
        .unwrap();
        let path = file.path().to_str().unwrap();
        let dataset = Dataset::new(path, DatasetType::JSON, &NetworkShape::new(2, 3, 1)).unwrap();
        assert_eq!(dataset.tasks[0].habit_id, "meditate");
        assert_eq!(dataset.tasks[0].examples[0].features.as_slice(), &[0.1, 0.2]);
    }
}
