//! # Embedding Workflow
//!
//! Sequential orchestration: train, save, load, query. The workflow owns the
//! current vectors and nothing else; all computation goes through an
//! [`EmbeddingEngine`] and the [`SimilarityQuery`] capability of the vectors.
//!
//! A failed step never leaves partial state behind: a failed train or load
//! keeps whatever vectors were there before, and querying without any vectors
//! is an error rather than an empty answer.

use std::path::Path;

use log::{info, warn};

use crate::config::TrainingConfig;
use crate::corpus::SentenceSource;
use crate::engine::{EmbeddingEngine, SimilarityQuery};
use crate::error::{EmbeddingError, Result};
use crate::vectors::{KeyedVectors, VectorFormat};
use crate::word2vec::Word2Vec;

/// Train/persist/query driver over one engine.
///
/// # Examples
///
/// ```
/// use rust_embeddings::{CorpusStreamer, EmbeddingWorkflow, TrainingConfig};
///
/// let corpus = CorpusStreamer::new(vec!["a good film".to_string(), "a bad film".to_string()]);
/// let config = TrainingConfig { vector_size: 8, min_count: 1, workers: 1, ..Default::default() };
///
/// let mut workflow = EmbeddingWorkflow::default();
/// workflow.train(&corpus, &config).unwrap();
/// let score = workflow.similarity("good", "bad").unwrap();
/// assert!((-1.0..=1.0).contains(&score));
/// ```
#[derive(Debug)]
pub struct EmbeddingWorkflow<E = Word2Vec> {
    engine: E,
    vectors: Option<KeyedVectors>,
}

impl Default for EmbeddingWorkflow<Word2Vec> {
    fn default() -> Self {
        Self::new(Word2Vec)
    }
}

impl<E: EmbeddingEngine> EmbeddingWorkflow<E> {
    pub fn new(engine: E) -> Self {
        Self { engine, vectors: None }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// The current vectors, if any step has produced them.
    pub fn vectors(&self) -> Option<&KeyedVectors> {
        self.vectors.as_ref()
    }

    /// Train over `corpus` and make the result the current vectors.
    pub fn train(&mut self, corpus: &dyn SentenceSource, config: &TrainingConfig) -> Result<&KeyedVectors> {
        info!("Training with engine '{}'", self.engine.name());
        let vectors = self.engine.train(corpus, config).map_err(|e| {
            warn!("Training failed: {e}");
            e
        })?;
        info!("Trained {} vectors of dimension {}", vectors.len(), vectors.vector_size());
        Ok(&*self.vectors.insert(vectors))
    }

    /// Write the current vectors to `path`.
    pub fn save(&self, path: impl AsRef<Path>, format: VectorFormat) -> Result<()> {
        self.engine.save(self.current()?, path.as_ref(), format)
    }

    /// Replace the current vectors with the content of `path`.
    ///
    /// On error the previous vectors are kept untouched.
    pub fn load(&mut self, path: impl AsRef<Path>, format: VectorFormat) -> Result<&KeyedVectors> {
        let vectors = self.engine.load(path.as_ref(), format)?;
        Ok(&*self.vectors.insert(vectors))
    }

    /// Swap in vectors produced elsewhere.
    pub fn set_vectors(&mut self, vectors: KeyedVectors) {
        self.vectors = Some(vectors);
    }

    pub fn most_similar(&self, positive: &[&str], negative: &[&str], topn: usize) -> Result<Vec<(String, f32)>> {
        SimilarityQuery::most_similar(self.current()?, positive, negative, topn)
    }

    pub fn similarity(&self, a: &str, b: &str) -> Result<f32> {
        SimilarityQuery::similarity(self.current()?, a, b)
    }

    pub fn doesnt_match(&self, tokens: &[&str]) -> Result<String> {
        SimilarityQuery::doesnt_match(self.current()?, tokens)
    }

    pub fn analogy(&self, positive: &[&str], negative: &[&str], topn: usize) -> Result<Vec<(String, f32)>> {
        SimilarityQuery::analogy(self.current()?, positive, negative, topn)
    }

    fn current(&self) -> Result<&KeyedVectors> {
        self.vectors.as_ref().ok_or(EmbeddingError::NoVectors)
    }
}
