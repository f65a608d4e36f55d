use anyhow::Result;
use serde::Serialize;

use agrosense_core::{compose_query, recommend, KnowledgeChunk, RecommendationResult, SoilInfo};

use crate::store::KnowledgeIndex;

#[derive(Debug, Clone, Serialize)]
pub struct Advice {
    pub query: String,
    pub chunks: Vec<KnowledgeChunk>,
    pub recommendation: RecommendationResult,
}

/// One advisory turn: retrieve chunks for the reading's soil type, then run
/// the rules over them.
pub fn advise(index: &KnowledgeIndex, soil: &SoilInfo, top_k: usize) -> Result<Advice> {
    let query = compose_query(soil);
    let chunks = index.query(&query, top_k, Some(&soil.soil_type))?;
    let recommendation = recommend(soil, &chunks);
    tracing::debug!(
        soil_type = %soil.soil_type,
        retrieved = chunks.len(),
        crops = ?recommendation.crops,
        "advice prepared"
    );
    Ok(Advice {
        query,
        chunks,
        recommendation,
    })
}
