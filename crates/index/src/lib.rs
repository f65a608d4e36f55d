mod error;
mod flat;
mod io;
mod matrix;

pub use error::{ArtifactError, Result};
pub use flat::{FlatIpIndex, Hit, Provenance, FINGERPRINT_LEN};
pub use io::write_atomic;
pub use matrix::EmbeddingMatrix;
