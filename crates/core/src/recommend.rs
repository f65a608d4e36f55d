use serde::{Deserialize, Serialize};

use crate::chunk::KnowledgeChunk;
use crate::soil::SoilInfo;

/// Crop keywords scanned for in chunk text, in match order.
pub const CROP_KEYWORDS: [&str; 10] = [
    "maize",
    "millet",
    "pearlmillet",
    "bajra",
    "sorghum",
    "groundnut",
    "pigeonpea",
    "wheat",
    "salt-tolerant",
    "pulses",
];
pub const MAX_CROPS: usize = 3;
pub const FALLBACK_CROP: &str = "Millets / Pulses (fallback)";

pub const N_THRESHOLD: f64 = 30.0;
pub const P_THRESHOLD: f64 = 15.0;
pub const K_THRESHOLD: f64 = 40.0;

pub const N_ACTION: &str = "Apply Urea (for N) + FYM/compost if organic is Poor or Average";
pub const P_ACTION: &str = "Apply DAP or SSP (for P)";
pub const K_ACTION: &str = "Apply MOP (for K)";

pub const ORGANIC_ACTION: &str = "Add 4–6 t/acre FYM or green-manure (e.g. Dhaincha)";
pub const MOISTURE_ACTION: &str = "Use mulching or drip/sprinkler to conserve moisture";

pub const MAIZE_TIP: &str = "Sow June–July, 3–4 irrigations, weed control early";
pub const WHEAT_TIP: &str = "Sow Nov–Dec, split N application, 4–5 irrigations if floodplain soil";
pub const GENERIC_TIP: &str = "Ensure timely irrigation, good drainage, organic matter addition";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecommendationResult {
    pub crops: Vec<String>,
    pub fertilizer: Vec<String>,
    pub soil_improvement: Vec<String>,
    pub care_tips: Vec<String>,
}

/// Retrieval text for a soil reading.
pub fn compose_query(soil: &SoilInfo) -> String {
    format!(
        "Soil: {}, moisture {}, organic {}, N={},P={},K={}, season:{}",
        soil.soil_type, soil.moisture, soil.organic, soil.n, soil.p, soil.k, soil.season
    )
}

/// Turns a soil reading and retrieved chunks into advice. Pure: no I/O.
///
/// `soil.season` is accepted but not consulted by any rule.
pub fn recommend(soil: &SoilInfo, chunks: &[KnowledgeChunk]) -> RecommendationResult {
    let candidates = candidate_crops(&soil.soil_type, chunks);

    let mut fertilizer = Vec::new();
    if soil.n.is_deficient(N_THRESHOLD) {
        fertilizer.push(N_ACTION.to_string());
    }
    if soil.p.is_deficient(P_THRESHOLD) {
        fertilizer.push(P_ACTION.to_string());
    }
    if soil.k.is_deficient(K_THRESHOLD) {
        fertilizer.push(K_ACTION.to_string());
    }

    let mut soil_improvement = Vec::new();
    if soil.organic == "Poor" {
        soil_improvement.push(ORGANIC_ACTION.to_string());
    }
    if soil.moisture == "Low" {
        soil_improvement.push(MOISTURE_ACTION.to_string());
    }

    // The tip looks at every candidate, including those past the cap.
    let care_tips = vec![care_tip(&candidates).to_string()];
    let mut crops = candidates;
    crops.truncate(MAX_CROPS);
    if crops.is_empty() {
        crops.push(FALLBACK_CROP.to_string());
    }

    RecommendationResult {
        crops,
        fertilizer,
        soil_improvement,
        care_tips,
    }
}

fn candidate_crops(soil_type: &str, chunks: &[KnowledgeChunk]) -> Vec<String> {
    let mut crops: Vec<String> = Vec::new();
    for chunk in chunks.iter().filter(|chunk| chunk.has_tag(soil_type)) {
        let text = chunk.text.to_lowercase();
        for keyword in CROP_KEYWORDS.iter().filter(|kw| text.contains(*kw)) {
            let crop = capitalize(keyword);
            if !crops.contains(&crop) {
                crops.push(crop);
            }
        }
    }
    crops
}

fn care_tip(crops: &[String]) -> &'static str {
    if crops.iter().any(|crop| crop == "Maize") {
        MAIZE_TIP
    } else if crops.iter().any(|crop| crop == "Wheat") {
        WHEAT_TIP
    } else {
        GENERIC_TIP
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}
