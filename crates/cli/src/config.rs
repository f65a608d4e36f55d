use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use agrosense_rag::{EmbeddingSettings, KnowledgeConfig};
use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;

pub const DEFAULT_CONFIG: &str = "agrosense.toml";

#[derive(Debug, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub knowledge: Option<KnowledgeSection>,
    #[serde(default)]
    pub embedding: Option<EmbeddingSection>,
}

#[derive(Debug, Default, Deserialize)]
pub struct KnowledgeSection {
    pub corpus: Option<PathBuf>,
    pub index: Option<PathBuf>,
    pub embeddings: Option<PathBuf>,
    pub top_k: Option<usize>,
    pub verify_artifacts: Option<bool>,
    pub lock_timeout_ms: Option<u64>,
    pub stale_lock_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct EmbeddingSection {
    pub provider: Option<String>,
    pub model: Option<String>,
    pub dimensions: Option<usize>,
}

/// Path overrides given on the command line.
#[derive(Debug, Default, Clone)]
pub struct PathOverrides {
    pub corpus: Option<PathBuf>,
    pub index: Option<PathBuf>,
    pub embeddings: Option<PathBuf>,
}

pub fn load_config(path: &Path) -> Result<AppConfig> {
    if !path.exists() {
        return Ok(AppConfig::default());
    }
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    toml::from_str(&contents).map_err(|e| anyhow!("invalid config {}: {e}", path.display()))
}

/// Layers the config file, then command-line flags, over `base`.
pub fn resolve_knowledge(
    base: KnowledgeConfig,
    file: Option<&KnowledgeSection>,
    cli: &PathOverrides,
) -> KnowledgeConfig {
    let mut config = base;
    if let Some(section) = file {
        if let Some(path) = &section.corpus {
            config.corpus_path = path.clone();
        }
        if let Some(path) = &section.index {
            config.index_path = path.clone();
        }
        if let Some(path) = &section.embeddings {
            config.embeddings_path = path.clone();
        }
        if let Some(top_k) = section.top_k {
            config.top_k = top_k;
        }
        if let Some(verify) = section.verify_artifacts {
            config.verify_artifacts = verify;
        }
        if let Some(ms) = section.lock_timeout_ms {
            config.lock_timeout = Duration::from_millis(ms);
        }
        if let Some(secs) = section.stale_lock_secs {
            config.stale_lock_after = Duration::from_secs(secs);
        }
    }
    if let Some(path) = &cli.corpus {
        config.corpus_path = path.clone();
    }
    if let Some(path) = &cli.index {
        config.index_path = path.clone();
    }
    if let Some(path) = &cli.embeddings {
        config.embeddings_path = path.clone();
    }
    config
}

pub fn resolve_embedding(
    base: EmbeddingSettings,
    file: Option<&EmbeddingSection>,
) -> Result<EmbeddingSettings> {
    let mut settings = base;
    if let Some(section) = file {
        if let Some(provider) = section.provider.as_deref().map(str::trim) {
            if provider.is_empty() {
                bail!("[embedding] provider must not be empty");
            }
            settings.provider = Some(provider.to_string());
        }
        if let Some(model) = section.model.as_deref().map(str::trim) {
            if model.is_empty() {
                bail!("[embedding] model must not be empty");
            }
            settings.model = Some(model.to_string());
        }
        if let Some(dimensions) = section.dimensions {
            if dimensions == 0 {
                bail!("[embedding] dimensions must be positive");
            }
            settings.dimensions = Some(dimensions);
        }
    }
    Ok(settings)
}
