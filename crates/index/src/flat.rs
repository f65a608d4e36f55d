use std::borrow::Cow;
use std::cmp::Ordering;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ArtifactError, Result};
use crate::io::write_atomic;
use crate::matrix::EmbeddingMatrix;

const INDEX_MAGIC: [u8; 8] = *b"AGSIDX02";
const INDEX_VERSION: u32 = 2;
pub const FINGERPRINT_LEN: usize = 32;

/// What an index was built from: the encoder model and a digest of the corpus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    pub model_id: String,
    pub fingerprint: [u8; FINGERPRINT_LEN],
}

/// Leading fields shared by every index file version.
#[derive(Deserialize)]
struct IndexHeader {
    magic: [u8; 8],
    version: u32,
}

/// On-disk layout, bincode encoded. Rows are stored row-major in `data`.
#[derive(Serialize, Deserialize)]
struct IndexFile<'a> {
    magic: [u8; 8],
    version: u32,
    rows: u64,
    dimensions: u64,
    provenance: Cow<'a, Provenance>,
    data: Cow<'a, [f32]>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hit {
    pub position: usize,
    pub score: f32,
}

/// Exact inner-product index over a fixed set of vectors.
///
/// Rows are never added or removed after construction. Search ranks by
/// descending inner product; equal scores rank the lower row position first.
#[derive(Debug, Clone)]
pub struct FlatIpIndex {
    vectors: EmbeddingMatrix,
    provenance: Provenance,
}

impl FlatIpIndex {
    pub fn build(vectors: &EmbeddingMatrix, provenance: Provenance) -> Self {
        Self {
            vectors: vectors.clone(),
            provenance,
        }
    }

    pub fn len(&self) -> usize {
        self.vectors.rows()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn dimensions(&self) -> usize {
        self.vectors.cols()
    }

    pub fn provenance(&self) -> &Provenance {
        &self.provenance
    }

    pub fn vectors(&self) -> &EmbeddingMatrix {
        &self.vectors
    }

    pub fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<Hit>> {
        if query.len() != self.dimensions() {
            return Err(ArtifactError::Dimension {
                expected: self.dimensions(),
                found: query.len(),
            });
        }
        let top_k = top_k.min(self.len());
        if top_k == 0 {
            return Ok(Vec::new());
        }
        let mut hits: Vec<Hit> = self
            .vectors
            .iter_rows()
            .enumerate()
            .map(|(position, row)| Hit {
                position,
                score: dot(query, row),
            })
            .collect();
        if top_k < hits.len() {
            hits.select_nth_unstable_by(top_k - 1, rank);
            hits.truncate(top_k);
        }
        hits.sort_unstable_by(rank);
        Ok(hits)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let file = IndexFile {
            magic: INDEX_MAGIC,
            version: INDEX_VERSION,
            rows: self.len() as u64,
            dimensions: self.dimensions() as u64,
            provenance: Cow::Borrowed(&self.provenance),
            data: Cow::Borrowed(self.vectors.as_slice()),
        };
        Ok(bincode::serialize(&file)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let header: IndexHeader = bincode::deserialize(bytes)?;
        if header.magic != INDEX_MAGIC {
            return Err(ArtifactError::BadMagic("index"));
        }
        if header.version != INDEX_VERSION {
            return Err(ArtifactError::UnsupportedVersion {
                kind: "index",
                version: header.version,
            });
        }
        let file: IndexFile<'static> = bincode::deserialize(bytes)?;
        let overflow =
            || ArtifactError::Shape(format!("{}x{} overflows", file.rows, file.dimensions));
        let rows = usize::try_from(file.rows).map_err(|_| overflow())?;
        let dimensions = usize::try_from(file.dimensions).map_err(|_| overflow())?;
        let vectors = EmbeddingMatrix::new(rows, dimensions, file.data.into_owned())?;
        Ok(Self {
            vectors,
            provenance: file.provenance.into_owned(),
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        write_atomic(path, &self.to_bytes()?)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)?;
        Self::from_bytes(&bytes)
    }
}

fn rank(a: &Hit, b: &Hit) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.position.cmp(&b.position))
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}
