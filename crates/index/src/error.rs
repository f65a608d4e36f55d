use thiserror::Error;

#[derive(Error, Debug)]
pub enum ArtifactError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("bad magic: not a {0} artifact")]
    BadMagic(&'static str),
    #[error("unsupported {kind} version {version}")]
    UnsupportedVersion { kind: &'static str, version: u32 },
    #[error("truncated artifact: needed {needed} more bytes at offset {offset}")]
    Truncated { offset: usize, needed: usize },
    #[error("shape mismatch: {0}")]
    Shape(String),
    #[error("malformed npy header: {0}")]
    NpyHeader(String),
    #[error("dimension mismatch: index has {expected}, query has {found}")]
    Dimension { expected: usize, found: usize },
    #[error("index codec error: {0}")]
    Codec(#[from] bincode::Error),
}

pub type Result<T> = std::result::Result<T, ArtifactError>;
