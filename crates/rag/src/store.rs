use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Serialize;

use agrosense_core::{load_corpus, KnowledgeChunk};
use agrosense_index::{EmbeddingMatrix, FlatIpIndex, Provenance, FINGERPRINT_LEN};

use crate::config::KnowledgeConfig;
use crate::embedding::EmbeddingClient;
use crate::lock::BuildLock;

const FINGERPRINT_DOMAIN: &[u8] = b"agrosense knowledge corpus v1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexSource {
    Loaded,
    Built,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredChunk {
    pub chunk: KnowledgeChunk,
    pub score: f32,
}

/// Corpus, embedding matrix and similarity index, fixed after
/// [`KnowledgeIndex::initialize`] and safe to share across threads.
#[derive(Debug)]
pub struct KnowledgeIndex {
    chunks: Vec<KnowledgeChunk>,
    embeddings: EmbeddingMatrix,
    index: FlatIpIndex,
    encoder: EmbeddingClient,
    source: IndexSource,
}

struct Artifacts {
    embeddings: EmbeddingMatrix,
    index: FlatIpIndex,
}

impl KnowledgeIndex {
    /// Loads the corpus, then loads the persisted artifacts if both exist or
    /// builds and persists them otherwise.
    pub fn initialize(config: &KnowledgeConfig, encoder: EmbeddingClient) -> Result<Self> {
        let chunks = load_corpus(&config.corpus_path)?;
        let fingerprint = corpus_fingerprint(&chunks, &encoder);

        if let Some(artifacts) = try_load(config, &chunks, &fingerprint, &encoder)? {
            return Ok(Self::assemble(chunks, artifacts, encoder, IndexSource::Loaded));
        }

        let _lock = BuildLock::acquire(
            &config.lock_path(),
            config.lock_timeout,
            config.stale_lock_after,
        )?;
        // Another process may have finished a build while we waited.
        if let Some(artifacts) = try_load(config, &chunks, &fingerprint, &encoder)? {
            return Ok(Self::assemble(chunks, artifacts, encoder, IndexSource::Loaded));
        }
        let artifacts = build(config, &chunks, fingerprint, &encoder)?;
        Ok(Self::assemble(chunks, artifacts, encoder, IndexSource::Built))
    }

    /// Discards any persisted artifacts and builds fresh ones.
    pub fn rebuild(config: &KnowledgeConfig, encoder: EmbeddingClient) -> Result<Self> {
        let chunks = load_corpus(&config.corpus_path)?;
        let fingerprint = corpus_fingerprint(&chunks, &encoder);
        let _lock = BuildLock::acquire(
            &config.lock_path(),
            config.lock_timeout,
            config.stale_lock_after,
        )?;
        remove_if_present(&config.index_path)?;
        remove_if_present(&config.embeddings_path)?;
        let artifacts = build(config, &chunks, fingerprint, &encoder)?;
        Ok(Self::assemble(chunks, artifacts, encoder, IndexSource::Built))
    }

    fn assemble(
        chunks: Vec<KnowledgeChunk>,
        artifacts: Artifacts,
        encoder: EmbeddingClient,
        source: IndexSource,
    ) -> Self {
        tracing::info!(
            chunks = chunks.len(),
            dimensions = artifacts.index.dimensions(),
            model = %encoder.model_id(),
            source = ?source,
            "knowledge index ready"
        );
        Self {
            chunks,
            embeddings: artifacts.embeddings,
            index: artifacts.index,
            encoder,
            source,
        }
    }

    /// Top `top_k` chunks for `query_text`, best first, optionally narrowed
    /// to chunks tagged with `soil_filter`. Filtering happens after ranking,
    /// so fewer than `top_k` chunks may come back.
    pub fn query(
        &self,
        query_text: &str,
        top_k: usize,
        soil_filter: Option<&str>,
    ) -> Result<Vec<KnowledgeChunk>> {
        Ok(self
            .query_scored(query_text, top_k, soil_filter)?
            .into_iter()
            .map(|scored| scored.chunk)
            .collect())
    }

    pub fn query_scored(
        &self,
        query_text: &str,
        top_k: usize,
        soil_filter: Option<&str>,
    ) -> Result<Vec<ScoredChunk>> {
        let vector = self.encoder.embed(query_text)?;
        let hits = self.index.search(&vector, top_k)?;
        let filter = soil_filter.map(str::trim).filter(|soil| !soil.is_empty());
        let total = hits.len();
        let results: Vec<ScoredChunk> = hits
            .into_iter()
            .filter_map(|hit| {
                self.chunks.get(hit.position).map(|chunk| ScoredChunk {
                    chunk: chunk.clone(),
                    score: hit.score,
                })
            })
            .filter(|scored| filter.map_or(true, |soil| scored.chunk.matches_soil(soil)))
            .collect();
        tracing::debug!(
            top_k,
            hits = total,
            returned = results.len(),
            soil_filter = filter.unwrap_or(""),
            "knowledge query"
        );
        Ok(results)
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn chunks(&self) -> &[KnowledgeChunk] {
        &self.chunks
    }

    pub fn embeddings(&self) -> &EmbeddingMatrix {
        &self.embeddings
    }

    pub fn indexed_vectors(&self) -> usize {
        self.index.len()
    }

    pub fn dimensions(&self) -> usize {
        self.index.dimensions()
    }

    pub fn model_id(&self) -> &str {
        self.encoder.model_id()
    }

    pub fn source(&self) -> IndexSource {
        self.source
    }
}

fn try_load(
    config: &KnowledgeConfig,
    chunks: &[KnowledgeChunk],
    fingerprint: &[u8; FINGERPRINT_LEN],
    encoder: &EmbeddingClient,
) -> Result<Option<Artifacts>> {
    if !config.index_path.exists() || !config.embeddings_path.exists() {
        return Ok(None);
    }
    let loaded = FlatIpIndex::load(&config.index_path).and_then(|index| {
        EmbeddingMatrix::load_npy(&config.embeddings_path)
            .map(|embeddings| Artifacts { embeddings, index })
    });
    let artifacts = match loaded {
        Ok(artifacts) => artifacts,
        Err(err) if config.verify_artifacts => {
            tracing::warn!(error = %err, "unreadable knowledge artifacts, rebuilding");
            return Ok(None);
        }
        Err(err) => {
            return Err(err).with_context(|| {
                format!(
                    "failed to load knowledge artifacts {} / {}",
                    config.index_path.display(),
                    config.embeddings_path.display()
                )
            })
        }
    };

    if !config.verify_artifacts {
        if artifacts.index.dimensions() != encoder.dimensions() {
            bail!(
                "index {} has {} dimensions but encoder {} produces {}",
                config.index_path.display(),
                artifacts.index.dimensions(),
                encoder.model_id(),
                encoder.dimensions()
            );
        }
        return Ok(Some(artifacts));
    }

    match staleness(&artifacts, chunks.len(), fingerprint) {
        Some(reason) => {
            tracing::warn!(
                index = %config.index_path.display(),
                reason,
                "stale knowledge artifacts, rebuilding"
            );
            Ok(None)
        }
        None => Ok(Some(artifacts)),
    }
}

fn staleness(
    artifacts: &Artifacts,
    chunk_count: usize,
    fingerprint: &[u8; FINGERPRINT_LEN],
) -> Option<&'static str> {
    if &artifacts.index.provenance().fingerprint != fingerprint {
        return Some("corpus or embedding model changed since the index was built");
    }
    if artifacts.index.len() != chunk_count || artifacts.embeddings.rows() != chunk_count {
        return Some("row count does not match the corpus");
    }
    if artifacts.embeddings != *artifacts.index.vectors() {
        return Some("embedding matrix does not match the index");
    }
    None
}

fn build(
    config: &KnowledgeConfig,
    chunks: &[KnowledgeChunk],
    fingerprint: [u8; FINGERPRINT_LEN],
    encoder: &EmbeddingClient,
) -> Result<Artifacts> {
    let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
    let vectors = encoder.embed_batch(&texts)?;
    let embeddings = EmbeddingMatrix::from_rows(encoder.dimensions(), &vectors)?;
    let index = FlatIpIndex::build(
        &embeddings,
        Provenance {
            model_id: encoder.model_id().to_string(),
            fingerprint,
        },
    );
    embeddings
        .save_npy(&config.embeddings_path)
        .with_context(|| format!("failed to write {}", config.embeddings_path.display()))?;
    index
        .save(&config.index_path)
        .with_context(|| format!("failed to write {}", config.index_path.display()))?;
    tracing::info!(
        chunks = chunks.len(),
        index = %config.index_path.display(),
        embeddings = %config.embeddings_path.display(),
        "built knowledge artifacts"
    );
    Ok(Artifacts { embeddings, index })
}

fn remove_if_present(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err).with_context(|| format!("failed to remove {}", path.display())),
    }
}

/// Digest binding artifacts to the encoder and to every chunk's text and
/// tags, in corpus order.
pub fn corpus_fingerprint(
    chunks: &[KnowledgeChunk],
    encoder: &EmbeddingClient,
) -> [u8; FINGERPRINT_LEN] {
    let mut hasher = blake3::Hasher::new();
    hasher.update(FINGERPRINT_DOMAIN);
    update_str(&mut hasher, encoder.model_id());
    hasher.update(&(encoder.dimensions() as u64).to_le_bytes());
    hasher.update(&(chunks.len() as u64).to_le_bytes());
    for chunk in chunks {
        update_str(&mut hasher, &chunk.text);
        hasher.update(&(chunk.soil_tags.len() as u64).to_le_bytes());
        for tag in &chunk.soil_tags {
            update_str(&mut hasher, tag);
        }
    }
    *hasher.finalize().as_bytes()
}

fn update_str(hasher: &mut blake3::Hasher, value: &str) {
    hasher.update(&(value.len() as u64).to_le_bytes());
    hasher.update(value.as_bytes());
}
