pub mod config;
pub mod embedding;
pub mod lock;
#[cfg(feature = "minilm")]
pub mod minilm;
pub mod pipeline;
pub mod store;

pub use config::{KnowledgeConfig, DEFAULT_TOP_K};
pub use embedding::{
    EmbeddingBackend, EmbeddingClient, EmbeddingSettings, MINILM_DIMENSIONS, MINILM_MODEL_ID,
};
pub use lock::{BuildLock, BuildLockTimeout};
pub use pipeline::{advise, Advice};
pub use store::{corpus_fingerprint, IndexSource, KnowledgeIndex, ScoredChunk};
