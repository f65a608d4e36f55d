use std::fmt;
use std::fs;
use std::path::Path;

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

use crate::error::{CorpusError, Result};

/// Stable key of a chunk: its 0-based position in the corpus file, fixed at
/// load time and shared with the embedding row and index row it maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChunkId(usize);

impl ChunkId {
    pub fn new(position: usize) -> Self {
        Self(position)
    }

    pub fn position(self) -> usize {
        self.0
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeChunk {
    pub id: ChunkId,
    pub text: String,
    pub soil_tags: IndexSet<String>,
}

impl KnowledgeChunk {
    pub fn new<I, S>(id: ChunkId, text: impl Into<String>, soil_tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id,
            text: text.into(),
            soil_tags: soil_tags.into_iter().map(Into::into).collect(),
        }
    }

    /// Exact, case-sensitive tag membership.
    pub fn has_tag(&self, tag: &str) -> bool {
        self.soil_tags.contains(tag)
    }

    /// Tag membership ignoring case and surrounding whitespace on both sides.
    pub fn matches_soil(&self, soil: &str) -> bool {
        let wanted = soil.trim().to_lowercase();
        self.soil_tags
            .iter()
            .any(|tag| tag.trim().to_lowercase() == wanted)
    }
}

#[derive(Debug, Deserialize)]
struct ChunkRecord {
    #[serde(default)]
    text: String,
    #[serde(default)]
    soil_tags: Vec<String>,
}

/// Loads the corpus from a JSON array file, or from JSON Lines when the file
/// name ends in `.jsonl`.
pub fn load_corpus(path: &Path) -> Result<Vec<KnowledgeChunk>> {
    let raw = fs::read_to_string(path).map_err(|source| CorpusError::Unreadable {
        path: path.to_path_buf(),
        source,
    })?;
    let records = if is_jsonl(path) {
        parse_jsonl(&raw, path)?
    } else {
        serde_json::from_str::<Vec<ChunkRecord>>(&raw).map_err(|err| CorpusError::Malformed {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?
    };
    if records.is_empty() {
        return Err(CorpusError::Empty(path.to_path_buf()));
    }
    let chunks: Vec<KnowledgeChunk> = records
        .into_iter()
        .enumerate()
        .map(|(position, record)| {
            KnowledgeChunk::new(ChunkId::new(position), record.text, record.soil_tags)
        })
        .collect();
    tracing::debug!(path = %path.display(), chunks = chunks.len(), "loaded corpus");
    Ok(chunks)
}

fn is_jsonl(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("jsonl"))
        .unwrap_or(false)
}

fn parse_jsonl(raw: &str, path: &Path) -> Result<Vec<ChunkRecord>> {
    raw.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| {
            serde_json::from_str(line).map_err(|err| CorpusError::Malformed {
                path: path.to_path_buf(),
                message: format!("line {}: {err}", idx + 1),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &tempfile::TempDir, name: &str, contents: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn assigns_ids_in_file_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            "chunks.json",
            r#"[
                {"text": "Sandy soils suit groundnut.", "soil_tags": ["Sandy"]},
                {"text": "Clay holds water.", "soil_tags": ["Clay", "Black", "Clay"]},
                {"soil_tags": ["Loamy"]}
            ]"#,
        );
        let chunks = load_corpus(&path).unwrap();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[1].id, ChunkId::new(1));
        assert_eq!(
            chunks[1].soil_tags.iter().collect::<Vec<_>>(),
            vec!["Clay", "Black"]
        );
        assert_eq!(chunks[2].text, "");
    }

    #[test]
    fn reads_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            "chunks.jsonl",
            "{\"text\": \"a\", \"soil_tags\": [\"Red\"]}\n\n{\"text\": \"b\"}\n",
        );
        let chunks = load_corpus(&path).unwrap();
        assert_eq!(chunks.len(), 2);
        assert!(chunks[1].soil_tags.is_empty());
    }

    #[test]
    fn empty_and_malformed_corpora_fail() {
        let dir = tempfile::tempdir().unwrap();
        let empty = write(&dir, "empty.json", "[]");
        assert!(matches!(load_corpus(&empty), Err(CorpusError::Empty(_))));

        let broken = write(&dir, "broken.json", "{\"text\": \"not a list\"}");
        assert!(matches!(
            load_corpus(&broken),
            Err(CorpusError::Malformed { .. })
        ));

        let bad_line = write(&dir, "bad.jsonl", "{\"text\": \"ok\"}\nnope\n");
        let err = load_corpus(&bad_line).unwrap_err();
        assert!(err.to_string().contains("line 2"));

        let missing = dir.path().join("missing.json");
        assert!(matches!(
            load_corpus(&missing),
            Err(CorpusError::Unreadable { .. })
        ));
    }

    #[test]
    fn soil_matching_modes() {
        let chunk = KnowledgeChunk::new(ChunkId::new(0), "text", [" Kandi ", "Sandy"]);
        assert!(chunk.has_tag("Sandy"));
        assert!(!chunk.has_tag("sandy"));
        assert!(chunk.matches_soil("kandi"));
        assert!(chunk.matches_soil("  SANDY "));
        assert!(!chunk.matches_soil("Clay"));
    }
}
