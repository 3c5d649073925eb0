use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Serialization error: {source}")]
    Serialization {
        #[from]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Malformed model: {message}")]
    MalformedModel { message: String },

    #[error("Training error: {message}")]
    Training { message: String },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Dataset loading error: {source}")]
    DatasetLoad {
        #[from]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, ModelError>;
