mod chunk;
mod embedding;
mod error;
mod recommend;
mod soil;

pub use chunk::{load_corpus, ChunkId, KnowledgeChunk};
pub use embedding::{
    hash_model_id, normalize, Encoder, HashEmbedder, HashEmbedderConfig, DEFAULT_DIMENSIONS,
    DEFAULT_HASH_MODEL_ID,
};
pub use error::{CorpusError, EncodeError, Result};
pub use recommend::{
    compose_query, recommend, RecommendationResult, CROP_KEYWORDS, FALLBACK_CROP, GENERIC_TIP,
    K_ACTION, K_THRESHOLD, MAIZE_TIP, MAX_CROPS, MOISTURE_ACTION, N_ACTION, N_THRESHOLD,
    ORGANIC_ACTION, P_ACTION, P_THRESHOLD, WHEAT_TIP,
};
pub use soil::{NutrientLevel, NutrientValue, SoilInfo};
