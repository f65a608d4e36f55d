use std::fmt::Write;

use agrosense_core::RecommendationResult;
use agrosense_rag::ScoredChunk;

/// Plain-text advisory reply, one section per line group.
pub fn recommendation_text(rec: &RecommendationResult) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Suitable Crops: {}", rec.crops.join(", "));
    out.push_str("Fertilizer / Soil Improvement:\n");
    for line in rec.fertilizer.iter().chain(&rec.soil_improvement) {
        let _ = writeln!(out, "- {line}");
    }
    out.push_str("Care Tips:\n");
    for tip in &rec.care_tips {
        let _ = writeln!(out, "- {tip}");
    }
    out
}

pub fn ranked_chunks_text(results: &[ScoredChunk]) -> String {
    if results.is_empty() {
        return "no matching chunks\n".to_string();
    }
    let mut out = String::new();
    for (rank, scored) in results.iter().enumerate() {
        let tags: Vec<&str> = scored.chunk.soil_tags.iter().map(String::as_str).collect();
        let _ = writeln!(
            out,
            "{:>2}. [{:.4}] {} ({})",
            rank + 1,
            scored.score,
            scored.chunk.id,
            tags.join(", ")
        );
        let _ = writeln!(out, "    {}", scored.chunk.text);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use agrosense_core::{ChunkId, KnowledgeChunk, GENERIC_TIP, K_ACTION, MOISTURE_ACTION};

    #[test]
    fn recommendation_lists_every_section() {
        let rec = RecommendationResult {
            crops: vec!["Maize".into(), "Wheat".into()],
            fertilizer: vec![K_ACTION.into()],
            soil_improvement: vec![MOISTURE_ACTION.into()],
            care_tips: vec![GENERIC_TIP.into()],
        };
        let text = recommendation_text(&rec);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Suitable Crops: Maize, Wheat");
        assert_eq!(lines[1], "Fertilizer / Soil Improvement:");
        assert_eq!(lines[2], format!("- {K_ACTION}"));
        assert_eq!(lines[3], format!("- {MOISTURE_ACTION}"));
        assert_eq!(lines[4], "Care Tips:");
        assert_eq!(lines[5], format!("- {GENERIC_TIP}"));
        assert_eq!(lines.len(), 6);
    }

    #[test]
    fn empty_action_lists_keep_headers() {
        let rec = RecommendationResult {
            crops: vec!["Millets / Pulses (fallback)".into()],
            fertilizer: Vec::new(),
            soil_improvement: Vec::new(),
            care_tips: vec![GENERIC_TIP.into()],
        };
        let text = recommendation_text(&rec);
        assert!(text.starts_with("Suitable Crops: Millets / Pulses (fallback)\nFertilizer / Soil Improvement:\nCare Tips:\n"));
    }

    #[test]
    fn ranked_chunks_show_rank_score_and_tags() {
        let results = vec![ScoredChunk {
            chunk: KnowledgeChunk::new(ChunkId::new(4), "Maize on loam.", ["Loamy", "Floodplain"]),
            score: 0.8125,
        }];
        let text = ranked_chunks_text(&results);
        assert_eq!(
            text,
            " 1. [0.8125] #4 (Loamy, Floodplain)\n    Maize on loam.\n"
        );
        assert_eq!(ranked_chunks_text(&[]), "no matching chunks\n");
    }
}
