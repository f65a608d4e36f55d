use once_cell::sync::Lazy;
use rayon::prelude::*;
use regex::Regex;

use crate::error::EncodeError;

pub const DEFAULT_DIMENSIONS: usize = 384;
pub const DEFAULT_HASH_MODEL_ID: &str = "hash-384";

const KEY_CONTEXT: &str = "agrosense 2024 hash embedder feature key";
const BIGRAM_WEIGHT: f32 = 0.5;

static TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\p{L}\p{N}]+(?:-[\p{L}\p{N}]+)*").expect("valid regex"));

/// Text to unit-length vector. Implementations must be deterministic for a
/// given `model_id`.
pub trait Encoder: Send + Sync {
    fn model_id(&self) -> &str;

    fn dimensions(&self) -> usize;

    fn encode(&self, text: &str) -> Result<Vec<f32>, EncodeError>;

    fn encode_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EncodeError> {
        texts.iter().map(|text| self.encode(text)).collect()
    }
}

/// Identifier the hash encoder reports for a dimension count, e.g. `hash-384`.
pub fn hash_model_id(dimensions: usize) -> String {
    format!("hash-{dimensions}")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashEmbedderConfig {
    pub model_id: String,
    pub dimensions: usize,
}

impl Default for HashEmbedderConfig {
    fn default() -> Self {
        Self {
            model_id: DEFAULT_HASH_MODEL_ID.to_string(),
            dimensions: DEFAULT_DIMENSIONS,
        }
    }
}

/// Signed feature-hashing encoder over lowercased unigrams and bigrams.
///
/// Features are bucketed with BLAKE3 keyed by the model identifier, so two
/// identifiers give unrelated vector spaces while the same identifier gives
/// identical vectors on every platform.
#[derive(Clone)]
pub struct HashEmbedder {
    config: HashEmbedderConfig,
    key: [u8; 32],
}

impl HashEmbedder {
    pub fn new(config: HashEmbedderConfig) -> Self {
        let config = HashEmbedderConfig {
            dimensions: config.dimensions.max(1),
            ..config
        };
        let key = blake3::derive_key(KEY_CONTEXT, config.model_id.as_bytes());
        Self { config, key }
    }

    pub fn config(&self) -> &HashEmbedderConfig {
        &self.config
    }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.config.dimensions];
        let lowered = text.to_lowercase();
        let tokens: Vec<&str> = TOKEN_RE.find_iter(&lowered).map(|m| m.as_str()).collect();
        for token in &tokens {
            self.accumulate(&mut vector, token, 1.0);
        }
        for pair in tokens.windows(2) {
            self.accumulate(&mut vector, &format!("{} {}", pair[0], pair[1]), BIGRAM_WEIGHT);
        }
        normalize(&mut vector);
        vector
    }

    fn accumulate(&self, vector: &mut [f32], feature: &str, weight: f32) {
        let hash = blake3::keyed_hash(&self.key, feature.as_bytes());
        let bytes = hash.as_bytes();
        let mut head = [0u8; 8];
        head.copy_from_slice(&bytes[..8]);
        let bucket = (u64::from_le_bytes(head) % vector.len() as u64) as usize;
        if bytes[8] & 1 == 0 {
            vector[bucket] += weight;
        } else {
            vector[bucket] -= weight;
        }
    }
}

impl Encoder for HashEmbedder {
    fn model_id(&self) -> &str {
        &self.config.model_id
    }

    fn dimensions(&self) -> usize {
        self.config.dimensions
    }

    fn encode(&self, text: &str) -> Result<Vec<f32>, EncodeError> {
        Ok(self.embed_text(text))
    }

    fn encode_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EncodeError> {
        Ok(texts.par_iter().map(|text| self.embed_text(text)).collect())
    }
}

/// Scales `vector` to unit length; the zero vector is left untouched.
pub fn normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm == 0.0 {
        return;
    }
    for value in vector.iter_mut() {
        *value /= norm;
    }
}
