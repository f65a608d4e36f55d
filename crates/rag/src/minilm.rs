use std::sync::Mutex;

use anyhow::{anyhow, Result};
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};

use agrosense_core::{normalize, EncodeError, Encoder};

use crate::embedding::{MINILM_DIMENSIONS, MINILM_MODEL_ID};

/// Sentence-transformers all-MiniLM-L6-v2 through fastembed's ONNX runtime.
pub struct MiniLmEncoder {
    model: Mutex<TextEmbedding>,
}

impl MiniLmEncoder {
    /// Loads the model, downloading it into fastembed's cache on first use.
    pub fn load() -> Result<Self> {
        let model = TextEmbedding::try_new(
            InitOptions::new(EmbeddingModel::AllMiniLML6V2).with_show_download_progress(false),
        )
        .map_err(|err| anyhow!("failed to load {MINILM_MODEL_ID}: {err}"))?;
        tracing::info!(
            model = MINILM_MODEL_ID,
            dimensions = MINILM_DIMENSIONS,
            "materialized MiniLM encoder"
        );
        Ok(Self {
            model: Mutex::new(model),
        })
    }

    fn backend_error(message: impl ToString) -> EncodeError {
        EncodeError::Backend {
            model: MINILM_MODEL_ID.to_string(),
            message: message.to_string(),
        }
    }
}

impl Encoder for MiniLmEncoder {
    fn model_id(&self) -> &str {
        MINILM_MODEL_ID
    }

    fn dimensions(&self) -> usize {
        MINILM_DIMENSIONS
    }

    fn encode(&self, text: &str) -> Result<Vec<f32>, EncodeError> {
        let mut vectors = self.encode_many(&[text.to_string()])?;
        vectors
            .pop()
            .ok_or_else(|| Self::backend_error("no vector returned"))
    }

    fn encode_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EncodeError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let model = self
            .model
            .lock()
            .map_err(|_| Self::backend_error("encoder lock poisoned"))?;
        let mut vectors = model
            .embed(texts.to_vec(), None)
            .map_err(Self::backend_error)?;
        if vectors.len() != texts.len() {
            return Err(EncodeError::BatchSize {
                model: MINILM_MODEL_ID.to_string(),
                expected: texts.len(),
                found: vectors.len(),
            });
        }
        for vector in &mut vectors {
            normalize(vector);
        }
        Ok(vectors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[ignore = "downloads the all-MiniLM-L6-v2 model"]
    fn encodes_unit_vectors_deterministically() {
        let encoder = MiniLmEncoder::load().unwrap();
        let texts = vec![
            "Sandy soil suits groundnut".to_string(),
            "Wheat after paddy on clay".to_string(),
        ];
        let batch = encoder.encode_many(&texts).unwrap();
        assert_eq!(batch.len(), 2);
        for (text, vector) in texts.iter().zip(&batch) {
            assert_eq!(vector.len(), MINILM_DIMENSIONS);
            let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
            assert!((norm - 1.0).abs() < 1e-4);
            let again = encoder.encode(text).unwrap();
            let cosine: f32 = again.iter().zip(vector).map(|(a, b)| a * b).sum();
            assert!(cosine > 0.9999);
        }
    }
}
