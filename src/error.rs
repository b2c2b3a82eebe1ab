//! # Errors
//!
//! Every fallible operation in the crate returns [`Result`], whose error side is
//! [`EmbeddingError`]. None of these errors are transient, so nothing retries.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::vectors::VectorFormat;

/// Errors raised while training, persisting or querying embeddings.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// A query referenced a token absent from the vocabulary.
    #[error("token '{0}' is not in the vocabulary")]
    UnknownToken(String),

    /// A vector file does not exist.
    #[error("no such file: {}", .0.display())]
    NotFound(PathBuf),

    /// The file content does not decode under the requested format.
    #[error("{} is not a valid {expected} vector file: {reason}", .path.display())]
    FormatMismatch {
        path: PathBuf,
        expected: VectorFormat,
        reason: String,
    },

    /// The training engine could not produce a vocabulary.
    #[error("training failed: {0}")]
    TrainingFailure(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// Tokens must be non-empty and free of whitespace to survive persistence.
    #[error("invalid token {0:?}")]
    InvalidToken(String),

    #[error("vector has {got} dimensions, expected {expected}")]
    DimensionMismatch { expected: usize, got: usize },

    /// A query was issued before any vectors were trained or loaded.
    #[error("no vectors available, train or load first")]
    NoVectors,

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, EmbeddingError>;

/// Open a file, turning a missing path into [`EmbeddingError::NotFound`].
pub(crate) fn open_existing(path: &std::path::Path) -> Result<std::fs::File> {
    std::fs::File::open(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => EmbeddingError::NotFound(path.to_path_buf()),
        _ => EmbeddingError::Io(e),
    })
}
