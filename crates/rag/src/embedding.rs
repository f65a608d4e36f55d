use std::env;
use std::sync::Arc;

use anyhow::{anyhow, bail, Result};

use agrosense_core::{hash_model_id, Encoder, HashEmbedder, HashEmbedderConfig, DEFAULT_DIMENSIONS};

pub const MINILM_MODEL_ID: &str = "all-MiniLM-L6-v2";
pub const MINILM_DIMENSIONS: usize = 384;

/// Which encoder to materialize, resolved from [`EmbeddingSettings`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmbeddingBackend {
    Hash(HashEmbedderConfig),
    MiniLm,
}

/// Unresolved encoder settings: `EMBEDDING_PROVIDER`, `EMBEDDING_MODEL` and
/// `EMBEDDING_DIMENSIONS`, optionally overridden by a config file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmbeddingSettings {
    pub provider: Option<String>,
    pub model: Option<String>,
    pub dimensions: Option<usize>,
}

impl EmbeddingSettings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Blank values and unparsable or zero dimensions count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let text = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        Self {
            provider: text("EMBEDDING_PROVIDER"),
            model: text("EMBEDDING_MODEL"),
            dimensions: text("EMBEDDING_DIMENSIONS")
                .and_then(|v| v.parse::<usize>().ok())
                .filter(|dims| *dims > 0),
        }
    }

    pub fn backend(&self) -> Result<EmbeddingBackend> {
        let provider = self
            .provider
            .as_deref()
            .unwrap_or("hash")
            .to_lowercase();
        match provider.as_str() {
            "hash" => {
                let dimensions = self.dimensions.unwrap_or(DEFAULT_DIMENSIONS);
                let model_id = self
                    .model
                    .clone()
                    .unwrap_or_else(|| hash_model_id(dimensions));
                Ok(EmbeddingBackend::Hash(HashEmbedderConfig {
                    model_id,
                    dimensions,
                }))
            }
            "minilm" | "fastembed" => {
                if let Some(model) = &self.model {
                    if !is_minilm(model) {
                        bail!("embedding provider {provider} only serves {MINILM_MODEL_ID}, not {model}");
                    }
                }
                if let Some(dimensions) = self.dimensions {
                    if dimensions != MINILM_DIMENSIONS {
                        bail!(
                            "{MINILM_MODEL_ID} produces {MINILM_DIMENSIONS} dimensions, not {dimensions}"
                        );
                    }
                }
                Ok(EmbeddingBackend::MiniLm)
            }
            other => bail!("unknown embedding provider {other:?} (expected hash or minilm)"),
        }
    }
}

fn is_minilm(model: &str) -> bool {
    let name = model.trim().to_lowercase();
    let name = name.strip_prefix("sentence-transformers/").unwrap_or(&name);
    name == MINILM_MODEL_ID.to_lowercase()
}

/// Shared handle to the process-wide encoder.
///
/// Construct once at startup and clone freely; clones share the same
/// materialized model.
#[derive(Clone)]
pub struct EmbeddingClient {
    encoder: Arc<dyn Encoder>,
}

impl EmbeddingClient {
    pub fn from_env() -> Result<Self> {
        Self::from_settings(&EmbeddingSettings::from_env())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        Self::from_settings(&EmbeddingSettings::from_lookup(lookup))
    }

    pub fn from_settings(settings: &EmbeddingSettings) -> Result<Self> {
        match settings.backend()? {
            EmbeddingBackend::Hash(config) => Ok(Self::hash(config)),
            EmbeddingBackend::MiniLm => Self::minilm(),
        }
    }

    pub fn hash(config: HashEmbedderConfig) -> Self {
        tracing::info!(
            model = %config.model_id,
            dimensions = config.dimensions,
            "materializing hash embedder"
        );
        Self::with_encoder(Arc::new(HashEmbedder::new(config)))
    }

    #[cfg(feature = "minilm")]
    pub fn minilm() -> Result<Self> {
        Ok(Self::with_encoder(Arc::new(
            crate::minilm::MiniLmEncoder::load()?,
        )))
    }

    #[cfg(not(feature = "minilm"))]
    pub fn minilm() -> Result<Self> {
        bail!("{MINILM_MODEL_ID} needs agrosense built with the `minilm` feature")
    }

    pub fn with_encoder(encoder: Arc<dyn Encoder>) -> Self {
        Self { encoder }
    }

    pub fn model_id(&self) -> &str {
        self.encoder.model_id()
    }

    pub fn dimensions(&self) -> usize {
        self.encoder.dimensions()
    }

    pub fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let vector = self.encoder.encode(text)?;
        self.check_width(&vector)?;
        Ok(vector)
    }

    pub fn embed_batch(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>> {
        let vectors = self.encoder.encode_many(inputs)?;
        if vectors.len() != inputs.len() {
            bail!(
                "encoder {} returned {} vectors for {} inputs",
                self.model_id(),
                vectors.len(),
                inputs.len()
            );
        }
        for vector in &vectors {
            self.check_width(vector)?;
        }
        Ok(vectors)
    }

    fn check_width(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimensions() {
            return Err(anyhow!(
                "encoder {} produced {} values, expected {}",
                self.model_id(),
                vector.len(),
                self.dimensions()
            ));
        }
        Ok(())
    }
}

impl std::fmt::Debug for EmbeddingClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingClient")
            .field("model_id", &self.model_id())
            .field("dimensions", &self.dimensions())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agrosense_core::{EncodeError, DEFAULT_HASH_MODEL_ID};
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_to_the_hash_encoder_with_an_honest_id() {
        let client = EmbeddingClient::from_lookup(lookup(&[])).unwrap();
        assert_eq!(client.model_id(), DEFAULT_HASH_MODEL_ID);
        assert_eq!(client.dimensions(), DEFAULT_DIMENSIONS);
    }

    #[test]
    fn hash_id_follows_dimensions() {
        let client =
            EmbeddingClient::from_lookup(lookup(&[("EMBEDDING_DIMENSIONS", "128")])).unwrap();
        assert_eq!(client.model_id(), "hash-128");
        assert_eq!(client.embed("kandi soil").unwrap().len(), 128);
    }

    #[test]
    fn reads_model_and_dimensions() {
        let client = EmbeddingClient::from_lookup(lookup(&[
            ("EMBEDDING_PROVIDER", "HASH"),
            ("EMBEDDING_MODEL", " agro-hash-v2 "),
            ("EMBEDDING_DIMENSIONS", "128"),
        ]))
        .unwrap();
        assert_eq!(client.model_id(), "agro-hash-v2");
        assert_eq!(client.dimensions(), 128);
    }

    #[test]
    fn unparsable_dimensions_fall_back() {
        let settings = EmbeddingSettings::from_lookup(lookup(&[("EMBEDDING_DIMENSIONS", "wide")]));
        assert_eq!(settings.dimensions, None);
        let settings = EmbeddingSettings::from_lookup(lookup(&[("EMBEDDING_DIMENSIONS", "0")]));
        assert_eq!(settings.dimensions, None);
    }

    #[test]
    fn minilm_provider_pins_model_and_width() {
        let settings = EmbeddingSettings {
            provider: Some("minilm".to_string()),
            model: Some("sentence-transformers/all-MiniLM-L6-v2".to_string()),
            dimensions: Some(384),
        };
        assert_eq!(settings.backend().unwrap(), EmbeddingBackend::MiniLm);

        let wrong_model = EmbeddingSettings {
            model: Some("bge-small-en".to_string()),
            ..settings.clone()
        };
        assert!(wrong_model.backend().is_err());
        let wrong_width = EmbeddingSettings {
            dimensions: Some(128),
            ..settings
        };
        assert!(wrong_width.backend().is_err());
    }

    #[test]
    fn unknown_provider_is_an_error() {
        let err = EmbeddingClient::from_lookup(lookup(&[("EMBEDDING_PROVIDER", "openai")]))
            .unwrap_err();
        assert!(err.to_string().contains("unknown embedding provider"));
    }

    #[cfg(not(feature = "minilm"))]
    #[test]
    fn minilm_without_the_feature_explains_itself() {
        let err = EmbeddingClient::from_lookup(lookup(&[("EMBEDDING_PROVIDER", "minilm")]))
            .unwrap_err();
        assert!(err.to_string().contains("`minilm` feature"));
    }

    #[test]
    fn clones_share_one_encoder() {
        let client = EmbeddingClient::hash(HashEmbedderConfig::default());
        let clone = client.clone();
        assert!(Arc::ptr_eq(&client.encoder, &clone.encoder));
        assert_eq!(client.embed("maize").unwrap(), clone.embed("maize").unwrap());
    }

    struct Narrow;

    impl Encoder for Narrow {
        fn model_id(&self) -> &str {
            "narrow"
        }

        fn dimensions(&self) -> usize {
            4
        }

        fn encode(&self, _text: &str) -> Result<Vec<f32>, EncodeError> {
            Ok(vec![1.0, 0.0])
        }
    }

    #[test]
    fn vectors_of_the_wrong_width_are_rejected() {
        let client = EmbeddingClient::with_encoder(Arc::new(Narrow));
        assert!(client.embed("wheat").is_err());
        assert!(client.embed_batch(&["wheat".to_string()]).is_err());
    }
}
