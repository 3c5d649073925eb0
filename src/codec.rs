//! Fixed binary layout for [`NetworkParameters`].
//!
//! ```text
//! offset  size        field
//! 0       4           F  (u32, little-endian)
//! 4       4           H  (u32, little-endian)
//! 8       4           O  (u32, little-endian)
//! 12      4·H·F       input_to_hidden, row-major f32 LE
//! ..      4·O·H       hidden_to_output, row-major f32 LE
//! ```

use ndarray::Array2;

use crate::errors::{ModelError, Result};
use crate::network::NetworkParameters;

pub const HEADER_LEN: usize = 12;
const VALUE_LEN: usize = 4;

/// Encoder/decoder for the exchanged model artifact
#[derive(Debug, Default, Clone, Copy)]
pub struct ParameterCodec;

impl ParameterCodec {
    /// Byte length of an encoded model with the given dimensions, if it fits in `usize`
    pub fn encoded_len(features: usize, hidden: usize, outputs: usize) -> Option<usize> {
        let weights = hidden
            .checked_mul(features)?
            .checked_add(outputs.checked_mul(hidden)?)?;
        weights.checked_mul(VALUE_LEN)?.checked_add(HEADER_LEN)
    }

    pub fn serialize(params: &NetworkParameters) -> Vec<u8> {
        let shape = params.shape();
        let mut bytes = Vec::with_capacity(HEADER_LEN + VALUE_LEN * params.parameters());

        for dim in [shape.features, shape.hidden, shape.outputs] {
            bytes.extend_from_slice(&(dim as u32).to_le_bytes());
        }
        for &w in params
            .input_to_hidden()
            .iter()
            .chain(params.hidden_to_output().iter())
        {
            bytes.extend_from_slice(&w.to_le_bytes());
        }
        bytes
    }

    /// Decode a blob produced by [`ParameterCodec::serialize`].
    ///
    /// # Errors
    /// Returns `ModelError::MalformedModel` if the blob is shorter than the
    /// header, its length differs from the one implied by the header, a
    /// dimension is zero, or a weight is not finite.
    pub fn deserialize(bytes: &[u8]) -> Result<NetworkParameters> {
        if bytes.len() < HEADER_LEN {
            return Err(ModelError::MalformedModel {
                message: format!(
                    "Model blob is {} bytes, shorter than the {}-byte header",
                    bytes.len(),
                    HEADER_LEN
                ),
            });
        }

        let read_u32 = |offset: usize| {
            let mut word = [0u8; 4];
            word.copy_from_slice(&bytes[offset..offset + 4]);
            u32::from_le_bytes(word) as usize
        };
        let (features, hidden, outputs) = (read_u32(0), read_u32(4), read_u32(8));

        if features == 0 || hidden == 0 || outputs == 0 {
            return Err(ModelError::MalformedModel {
                message: format!(
                    "Header declares an empty network: {}x{}x{}",
                    features, hidden, outputs
                ),
            });
        }

        let expected = Self::encoded_len(features, hidden, outputs);
        if expected != Some(bytes.len()) {
            return Err(ModelError::MalformedModel {
                message: format!(
                    "Model blob is {} bytes, header {}x{}x{} requires {}",
                    bytes.len(),
                    features,
                    hidden,
                    outputs,
                    expected.map_or_else(|| "more than usize::MAX".to_string(), |n| n.to_string())
                ),
            });
        }

        let mut values = bytes[HEADER_LEN..].chunks_exact(VALUE_LEN).map(|chunk| {
            let mut word = [0u8; 4];
            word.copy_from_slice(chunk);
            f32::from_le_bytes(word)
        });

        let input_to_hidden: Vec<f32> = values.by_ref().take(hidden * features).collect();
        let hidden_to_output: Vec<f32> = values.collect();

        if input_to_hidden
            .iter()
            .chain(hidden_to_output.iter())
            .any(|w| !w.is_finite())
        {
            return Err(ModelError::MalformedModel {
                message: "Model blob contains non-finite weights".to_string(),
            });
        }

        let malformed = |e: ndarray::ShapeError| ModelError::MalformedModel {
            message: format!("Weight matrix shape error: {}", e),
        };
        let input_to_hidden =
            Array2::from_shape_vec((hidden, features), input_to_hidden).map_err(malformed)?;
        let hidden_to_output =
            Array2::from_shape_vec((outputs, hidden), hidden_to_output).map_err(malformed)?;

        NetworkParameters::from_matrices(input_to_hidden, hidden_to_output)
    }
}
