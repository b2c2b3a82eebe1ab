//! # rust-embeddings
//!
//! Train word vectors over a collection of documents, save and reload them,
//! and ask them questions: nearest neighbours, pairwise similarity, the odd one
//! out, and analogies. A bigram phrase detector works over the same corpora.
//!
//! ## Modules
//!
//! - [`corpus`]: tokenizer and the restartable, lazily tokenized corpus stream.
//! - [`word2vec`]: skip-gram / CBOW negative-sampling trainer.
//! - [`vectors`]: trained vectors, their text/binary files and the queries.
//! - [`engine`]: the traits that decouple the workflow from the trainer.
//! - [`workflow`]: train → save → load → query orchestration.
//! - [`phrases`]: bigram phrase detection and counting.
//! - [`config`], [`error`], [`logging`]: the ambient plumbing.
//!
//! ## Examples
//!
//! ```
//! use rust_embeddings::{CorpusStreamer, EmbeddingWorkflow, TrainingConfig};
//!
//! let reviews = vec![
//!     "The movie was good".to_string(),
//!     "The movie was bad".to_string(),
//!     "A good film".to_string(),
//!     "A bad film".to_string(),
//! ];
//! let corpus = CorpusStreamer::new(reviews);
//! let config = TrainingConfig { vector_size: 16, min_count: 1, workers: 1, ..Default::default() };
//!
//! let mut workflow = EmbeddingWorkflow::default();
//! let vectors = workflow.train(&corpus, &config).unwrap();
//! assert_eq!(vectors.len(), 7);
//! ```

pub mod config;
pub mod corpus;
pub mod engine;
pub mod error;
pub mod logging;
pub mod phrases;
pub mod vectors;
pub mod word2vec;
pub mod workflow;

pub use config::{Architecture, RunEnvironment, TrainingConfig, WorkflowConfig};
pub use corpus::{CorpusStreamer, Preprocessor, SentenceSource, Tokenize};
pub use engine::{EmbeddingEngine, SimilarityQuery};
pub use error::{EmbeddingError, Result};
pub use phrases::{count_phrases, Phrases, PhrasesConfig};
pub use vectors::{KeyedVectors, VectorFormat};
pub use word2vec::{Word2Vec, Word2VecModel};
pub use workflow::EmbeddingWorkflow;
