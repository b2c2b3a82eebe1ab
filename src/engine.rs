//! Capabilities the workflow needs from a training backend.
//!
//! The workflow only talks to these traits, so a different trainer can be
//! dropped in without touching the orchestration.

use std::path::Path;

use crate::config::TrainingConfig;
use crate::corpus::SentenceSource;
use crate::error::Result;
use crate::vectors::{KeyedVectors, VectorFormat};

/// Trains embeddings and moves them to and from disk.
pub trait EmbeddingEngine {
    /// Human readable backend name, used in logs.
    fn name(&self) -> &str;

    /// Train vectors over every sentence of `corpus`.
    ///
    /// Blocks until training finishes. Fails with `TrainingFailure` when the
    /// corpus or the filtered vocabulary is empty.
    fn train(&self, corpus: &dyn SentenceSource, config: &TrainingConfig) -> Result<KeyedVectors>;

    fn save(&self, vectors: &KeyedVectors, path: &Path, format: VectorFormat) -> Result<()> {
        vectors.save(path, format)
    }

    fn load(&self, path: &Path, format: VectorFormat) -> Result<KeyedVectors> {
        KeyedVectors::load(path, format)
    }
}

/// Read-only similarity queries over trained vectors.
pub trait SimilarityQuery {
    /// Cosine similarity of two tokens.
    fn similarity(&self, a: &str, b: &str) -> Result<f32>;

    /// `topn` nearest tokens to the signed sum of seed vectors, seeds excluded.
    fn most_similar(&self, positive: &[&str], negative: &[&str], topn: usize) -> Result<Vec<(String, f32)>>;

    /// The member least similar on average to the others.
    fn doesnt_match(&self, tokens: &[&str]) -> Result<String>;

    /// `positive - negative` analogy completion.
    fn analogy(&self, positive: &[&str], negative: &[&str], topn: usize) -> Result<Vec<(String, f32)>>;
}
