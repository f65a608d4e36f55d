use std::path::PathBuf;

use thiserror::Error;

/// Fatal startup failure: the knowledge corpus cannot be used.
#[derive(Error, Debug)]
pub enum CorpusError {
    #[error("failed to read corpus {path:?}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed corpus {path:?}: {message}")]
    Malformed { path: PathBuf, message: String },
    #[error("corpus {0:?} contains no chunks")]
    Empty(PathBuf),
}

/// Failure inside an embedding backend.
#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("embedding model {model} failed: {message}")]
    Backend { model: String, message: String },
    #[error("embedding model {model} returned {found} vectors for {expected} inputs")]
    BatchSize {
        model: String,
        expected: usize,
        found: usize,
    },
}

pub type Result<T> = std::result::Result<T, CorpusError>;
