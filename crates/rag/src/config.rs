use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CORPUS_PATH: &str = "rag/rag_chunks.json";
pub const DEFAULT_INDEX_PATH: &str = "rag/knowledge.index";
pub const DEFAULT_EMBEDDINGS_PATH: &str = "rag/embeddings.npy";
pub const DEFAULT_TOP_K: usize = 5;
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_STALE_LOCK_AFTER: Duration = Duration::from_secs(600);

/// Where the knowledge artifacts live and how they are loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnowledgeConfig {
    pub corpus_path: PathBuf,
    pub index_path: PathBuf,
    pub embeddings_path: PathBuf,
    pub top_k: usize,
    /// Rebuild artifacts whose fingerprint or shape disagrees with the live
    /// corpus and encoder instead of serving them.
    pub verify_artifacts: bool,
    pub lock_timeout: Duration,
    pub stale_lock_after: Duration,
}

impl KnowledgeConfig {
    pub fn new(
        corpus_path: impl Into<PathBuf>,
        index_path: impl Into<PathBuf>,
        embeddings_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            corpus_path: corpus_path.into(),
            index_path: index_path.into(),
            embeddings_path: embeddings_path.into(),
            top_k: DEFAULT_TOP_K,
            verify_artifacts: true,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            stale_lock_after: DEFAULT_STALE_LOCK_AFTER,
        }
    }

    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let path = |key: &str, default: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(default))
        };
        let mut config = Self::new(
            path("AGROSENSE_CORPUS", DEFAULT_CORPUS_PATH),
            path("AGROSENSE_INDEX", DEFAULT_INDEX_PATH),
            path("AGROSENSE_EMBEDDINGS", DEFAULT_EMBEDDINGS_PATH),
        );
        if let Some(top_k) = lookup("AGROSENSE_TOP_K").and_then(|v| v.trim().parse().ok()) {
            config.top_k = top_k;
        }
        if let Some(flag) = lookup("AGROSENSE_VERIFY_ARTIFACTS") {
            config.verify_artifacts = parse_bool(&flag);
        }
        if let Some(ms) = lookup("AGROSENSE_LOCK_TIMEOUT_MS").and_then(|v| v.trim().parse().ok()) {
            config.lock_timeout = Duration::from_millis(ms);
        }
        if let Some(secs) = lookup("AGROSENSE_STALE_LOCK_SECS").and_then(|v| v.trim().parse().ok())
        {
            config.stale_lock_after = Duration::from_secs(secs);
        }
        config
    }

    /// Lock file guarding artifact builds: the index path with `.lock` appended.
    pub fn lock_path(&self) -> PathBuf {
        with_suffix(&self.index_path, ".lock")
    }
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self::new(
            DEFAULT_CORPUS_PATH,
            DEFAULT_INDEX_PATH,
            DEFAULT_EMBEDDINGS_PATH,
        )
    }
}

pub fn parse_bool(raw: &str) -> bool {
    matches!(
        raw.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut raw: OsString = path.as_os_str().to_owned();
    raw.push(suffix);
    PathBuf::from(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_conventional_layout() {
        let config = KnowledgeConfig::from_lookup(|_| None);
        assert_eq!(config, KnowledgeConfig::default());
        assert_eq!(config.corpus_path, PathBuf::from("rag/rag_chunks.json"));
        assert_eq!(config.lock_path(), PathBuf::from("rag/knowledge.index.lock"));
        assert!(config.verify_artifacts);
        assert_eq!(config.top_k, 5);
    }

    #[test]
    fn environment_overrides() {
        let config = KnowledgeConfig::from_lookup(|key| match key {
            "AGROSENSE_CORPUS" => Some("/data/chunks.jsonl".to_string()),
            "AGROSENSE_TOP_K" => Some("8".to_string()),
            "AGROSENSE_VERIFY_ARTIFACTS" => Some("off".to_string()),
            "AGROSENSE_LOCK_TIMEOUT_MS" => Some("250".to_string()),
            "AGROSENSE_STALE_LOCK_SECS" => Some("90".to_string()),
            "AGROSENSE_INDEX" => Some("   ".to_string()),
            _ => None,
        });
        assert_eq!(config.corpus_path, PathBuf::from("/data/chunks.jsonl"));
        assert_eq!(config.index_path, PathBuf::from(DEFAULT_INDEX_PATH));
        assert_eq!(config.top_k, 8);
        assert!(!config.verify_artifacts);
        assert_eq!(config.lock_timeout, Duration::from_millis(250));
        assert_eq!(config.stale_lock_after, Duration::from_secs(90));
    }

    #[test]
    fn bool_parsing_accepts_common_spellings() {
        for raw in ["1", "true", " YES ", "on"] {
            assert!(parse_bool(raw), "{raw}");
        }
        for raw in ["0", "false", "no", "", "maybe"] {
            assert!(!parse_bool(raw), "{raw}");
        }
    }
}
