use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;

use crate::codec::ParameterCodec;
use crate::errors::{ModelError, Result};
use crate::network::NetworkParameters;

/// Current container format version
/// Increment this when making breaking changes to the container layout
const MODEL_VERSION: u32 = 1;

/// Versioned model container with integrity checking
///
/// `data` holds the `ParameterCodec` encoding of the weights.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct VersionedModel {
    pub version: u32,
    /// SHA256 checksum of `data` (hex string)
    pub checksum: String,
    pub data: Vec<u8>,
    pub metadata: ModelMetadata,
}

/// Metadata about the stored model
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ModelMetadata {
    /// Timestamp when model was saved (RFC 3339)
    pub saved_at: String,
    pub features: usize,
    pub hidden: usize,
    pub outputs: usize,
    pub num_parameters: usize,
    pub description: Option<String>,
}

fn checksum_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

fn invalid_data(message: String) -> ModelError {
    ModelError::Serialization {
        source: Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, message)),
    }
}

impl VersionedModel {
    pub fn from_parameters(params: &NetworkParameters, description: Option<String>) -> Self {
        let data = ParameterCodec::serialize(params);
        let shape = params.shape();

        VersionedModel {
            version: MODEL_VERSION,
            checksum: checksum_hex(&data),
            data,
            metadata: ModelMetadata {
                saved_at: chrono::Utc::now().to_rfc3339(),
                features: shape.features,
                hidden: shape.hidden,
                outputs: shape.outputs,
                num_parameters: params.parameters(),
                description,
            },
        }
    }

    /// # Errors
    /// Returns `ModelError::Serialization` if checksum validation fails
    pub fn validate_checksum(&self) -> Result<()> {
        let computed = checksum_hex(&self.data);
        if computed != self.checksum {
            return Err(invalid_data(format!(
                "Checksum mismatch: expected {}, got {}",
                self.checksum, computed
            )));
        }
        Ok(())
    }

    /// # Errors
    /// Returns `ModelError::Serialization` if the version is newer than supported
    pub fn validate_version(&self) -> Result<()> {
        if self.version > MODEL_VERSION {
            return Err(invalid_data(format!(
                "Model version {} is newer than supported version {}. Please upgrade the library.",
                self.version, MODEL_VERSION
            )));
        }
        if self.version < MODEL_VERSION {
            tracing::warn!(
                "Loading model with older version {} (current: {}).",
                self.version,
                MODEL_VERSION
            );
        }
        Ok(())
    }

    /// Validate, then decode the stored weights
    ///
    /// # Errors
    /// `ModelError::Serialization` for version/checksum problems,
    /// `ModelError::MalformedModel` if the weights blob is corrupt
    pub fn to_parameters(&self) -> Result<NetworkParameters> {
        self.validate_version()?;
        self.validate_checksum()?;
        ParameterCodec::deserialize(&self.data)
    }

    /// Save as JSON (`.json`) or bincode (any other extension)
    ///
    /// # Errors
    /// Returns `ModelError::Serialization` if encoding fails and
    /// `ModelError::DatasetLoad` if the file cannot be written
    pub fn save_to_file(&self, path: &str) -> Result<()> {
        let bytes = if path.ends_with(".json") {
            serde_json::to_vec_pretty(self).map_err(|e| ModelError::Serialization {
                source: Box::new(e),
            })?
        } else {
            let config = bincode::config::standard();
            bincode::serde::encode_to_vec(self, config).map_err(|e| {
                ModelError::Serialization {
                    source: Box::new(e),
                }
            })?
        };
        fs::write(path, bytes).map_err(ModelError::from)?;
        Ok(())
    }

    /// # Errors
    /// Returns `ModelError::DatasetLoad` if the file cannot be read and
    /// `ModelError::Serialization` if it does not decode
    pub fn load_from_file(path: &str) -> Result<Self> {
        let bytes = fs::read(path).map_err(ModelError::from)?;
        if path.ends_with(".json") {
            serde_json::from_slice(&bytes).map_err(|e| ModelError::Serialization {
                source: Box::new(e),
            })
        } else {
            let config = bincode::config::standard();
            let (model, _): (VersionedModel, usize) =
                bincode::serde::decode_from_slice(&bytes, config).map_err(|e| {
                    ModelError::Serialization {
                        source: Box::new(e),
                    }
                })?;
            Ok(model)
        }
    }
}

/// Extension methods for NetworkParameters to support versioned serialization
impl NetworkParameters {
    /// Save with versioning and integrity checking
    pub fn save_versioned(&self, path: &str, description: Option<String>) -> Result<()> {
        let versioned = VersionedModel::from_parameters(self, description);
        versioned.save_to_file(path)?;

        tracing::info!(
            path = path,
            version = MODEL_VERSION,
            checksum = &versioned.checksum[..16],
            parameters = versioned.metadata.num_parameters,
            "Model saved with versioning and integrity check"
        );
        Ok(())
    }

    /// Load with versioning and integrity checking
    pub fn load_versioned(path: &str) -> Result<Self> {
        let versioned = VersionedModel::load_from_file(path)?;

        tracing::info!(
            path = path,
            version = versioned.version,
            checksum = versioned.checksum.get(..16).unwrap_or(&versioned.checksum),
            "Loading model saved at {}",
            versioned.metadata.saved_at
        );

        versioned.to_parameters()
    }
}
