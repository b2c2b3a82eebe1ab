//! Word2Vec model implementation.
//!
//! Based on the paper "Distributed Representations of Words and Phrases and their Compositionality" by Tomas Mikolov, Kai Chen, Greg Corrado, and Jeffrey Dean.
//!
//! https://arxiv.org/abs/1310.4546
//!
//! # Training
//!
//! Skip-Gram (default) or CBOW, both with Negative Sampling.
//!
//! ### Vocabulary:
//!
//! One pass over the corpus counts tokens. Tokens below `min_count` are dropped
//! and the rest are ordered by descending frequency.
//!
//! ### Sampling:
//!
//! Frequent tokens are randomly down-sampled, and negative samples are drawn
//! from the unigram distribution raised to the 3/4 power.
//!
//! ### Update Mechanism:
//!
//! Gradient descent with a learning rate decaying linearly from `alpha` to
//! `min_alpha` over all epochs.
//!
//! ### Parallelism:
//!
//! Sentences are gathered into batches of roughly `BATCH_WORDS` tokens and each
//! batch is spread over a dedicated rayon pool of `workers` threads. The layers
//! sit behind a `Mutex` and every sentence applies its updates in one critical
//! section, so threads never see half-updated vectors.
//!
//! Every sentence draws its random numbers from a generator seeded by
//! `(seed, epoch, sentence)`, so a single-worker run is fully reproducible.
//!
//! ### Persistence:
//!
//! The trained vectors are exported as [`KeyedVectors`]. The complete model,
//! both layers included, can also be snapshotted to JSON with serde_json.

use std::cmp::Reverse;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use fastrand::Rng;
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info};
use rayon::prelude::*;
use rayon::ThreadPool;
use serde::{Deserialize, Serialize};

use crate::config::{Architecture, TrainingConfig};
use crate::corpus::SentenceSource;
use crate::engine::EmbeddingEngine;
use crate::error::{open_existing, EmbeddingError, Result};
use crate::vectors::{dot, KeyedVectors};

/// Target number of tokens per parallel batch.
const BATCH_WORDS: usize = 10_000;
/// Resolution of the negative-sampling table.
const CUM_TABLE_DOMAIN: u64 = (1 << 31) - 1;
/// Exponent applied to counts in the negative-sampling distribution.
const NS_EXPONENT: f64 = 0.75;

/// The bundled training backend.
///
/// # Examples
///
/// ```
/// use rust_embeddings::{CorpusStreamer, TrainingConfig, Word2Vec};
///
/// let corpus = CorpusStreamer::new(vec!["the movie was good".to_string(), "the film was bad".to_string()]);
/// let config = TrainingConfig { vector_size: 8, min_count: 1, epochs: 2, workers: 1, ..Default::default() };
/// let model = Word2Vec.fit(&corpus, &config).unwrap();
/// assert_eq!(model.vocab_size(), 6);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct Word2Vec;

impl Word2Vec {
    /// Train a complete model over `corpus`.
    ///
    /// # Arguments
    ///
    /// * `corpus` - Restartable sentence stream; read once for the vocabulary and once per epoch.
    /// * `config` - Hyperparameters, validated first.
    ///
    /// # Returns
    ///
    /// * `Result<Word2VecModel>` - `TrainingFailure` when the corpus or the filtered vocabulary is empty.
    pub fn fit(&self, corpus: &dyn SentenceSource, config: &TrainingConfig) -> Result<Word2VecModel> {
        config.validate()?;
        let vocab = Vocab::build(corpus, config)?;
        info!(
            "Training {:?} over {} tokens, vocabulary of {} (dim={}, window={}, epochs={}, workers={})",
            config.architecture,
            vocab.total_words,
            vocab.len(),
            config.vector_size,
            config.window,
            config.epochs,
            config.workers
        );

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.workers)
            .build()
            .map_err(|e| EmbeddingError::TrainingFailure(format!("cannot start worker pool: {e}")))?;

        let layers = Mutex::new(Layers::new(vocab.len(), config.vector_size, config.seed));
        let trainer = Trainer {
            vocab: &vocab,
            config,
            layers: &layers,
            pool: &pool,
        };
        trainer.run(corpus);

        let Layers { syn0, syn1neg } = layers.into_inner().unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(Word2VecModel {
            config: config.clone(),
            vocab: vocab.word_to_index,
            index_to_word: vocab.index_to_word,
            counts: vocab.counts,
            input_vectors: syn0,
            output_vectors: syn1neg,
        })
    }
}

impl EmbeddingEngine for Word2Vec {
    fn name(&self) -> &str {
        "word2vec"
    }

    fn train(&self, corpus: &dyn SentenceSource, config: &TrainingConfig) -> Result<KeyedVectors> {
        self.fit(corpus, config)?.wv()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// A trained Word2Vec model.
///
/// # Fields
///
/// * `config` - Hyperparameters the model was trained with.
/// * `vocab` - Word to index mapping.
/// * `index_to_word` - Index to word mapping, by descending frequency.
/// * `counts` - Corpus frequency per index.
/// * `input_vectors` - Input layer embeddings (the word vectors).
/// * `output_vectors` - Output layer embeddings (negative-sampling weights).
pub struct Word2VecModel {
    config: TrainingConfig,
    vocab: HashMap<String, usize>,
    index_to_word: Vec<String>,
    counts: Vec<u64>,
    input_vectors: Vec<Vec<f32>>,
    output_vectors: Vec<Vec<f32>>,
}

impl Word2VecModel {
    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    pub fn vocab_size(&self) -> usize {
        self.index_to_word.len()
    }

    /// Get the embedding for a word.
    pub fn get_embedding(&self, word: &str) -> Option<&[f32]> {
        let idx = self.vocab.get(word)?;
        Some(&self.input_vectors[*idx])
    }

    /// The word vectors with their counts.
    pub fn wv(&self) -> Result<KeyedVectors> {
        let mut vectors = KeyedVectors::with_capacity(self.config.vector_size, self.vocab_size());
        for ((word, vector), count) in self
            .index_to_word
            .iter()
            .zip(self.input_vectors.iter())
            .zip(self.counts.iter())
        {
            vectors.add(word.clone(), vector.clone(), Some(*count))?;
        }
        Ok(vectors)
    }

    /// Save the model to a JSON file.
    ///
    /// # Arguments
    ///
    /// * `path` - The path to the model file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(&mut writer, self)?;
        writer.flush()?;
        info!("Saved model snapshot to {}", path.display());
        Ok(())
    }

    /// Load the model from a JSON file.
    ///
    /// # Arguments
    ///
    /// * `path` - The path to the model file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let reader = BufReader::new(open_existing(path.as_ref())?);
        Ok(serde_json::from_reader(reader)?)
    }
}

/// Vocabulary plus the sampling tables derived from it.
struct Vocab {
    index_to_word: Vec<String>,
    word_to_index: HashMap<String, usize>,
    counts: Vec<u64>,
    /// Probability of keeping each occurrence of a token.
    keep_probability: Vec<f32>,
    /// Cumulative `count^0.75` distribution scaled to `CUM_TABLE_DOMAIN`.
    cum_table: Vec<u64>,
    /// Occurrences of retained tokens in one pass.
    total_words: u64,
}

impl Vocab {
    fn build(corpus: &dyn SentenceSource, config: &TrainingConfig) -> Result<Self> {
        let mut raw: HashMap<String, u64> = HashMap::new();
        let mut sentences = 0usize;
        for sentence in corpus.sentences() {
            sentences += 1;
            for token in sentence {
                *raw.entry(token).or_insert(0) += 1;
            }
        }
        if sentences == 0 {
            return Err(EmbeddingError::TrainingFailure("corpus is empty".to_string()));
        }

        let distinct = raw.len();
        let mut retained: Vec<(String, u64)> = raw
            .into_iter()
            .filter(|(_, count)| *count >= config.min_count)
            .collect();
        if retained.is_empty() {
            return Err(EmbeddingError::TrainingFailure(format!(
                "no token among {distinct} reaches min_count {}",
                config.min_count
            )));
        }
        retained.sort_by(|a, b| (Reverse(a.1), &a.0).cmp(&(Reverse(b.1), &b.0)));
        debug!(
            "Vocabulary: {} sentences, {} distinct tokens, {} retained",
            sentences,
            distinct,
            retained.len()
        );

        let total_words: u64 = retained.iter().map(|(_, count)| count).sum();
        let keep_probability = retained
            .iter()
            .map(|(_, count)| keep_probability(*count, total_words, config.sample))
            .collect();

        let train_words_pow: f64 = retained.iter().map(|(_, c)| (*c as f64).powf(NS_EXPONENT)).sum();
        let mut cumulative = 0.0f64;
        let mut cum_table: Vec<u64> = retained
            .iter()
            .map(|(_, c)| {
                cumulative += (*c as f64).powf(NS_EXPONENT);
                (cumulative / train_words_pow * CUM_TABLE_DOMAIN as f64).round() as u64
            })
            .collect();
        if let Some(last) = cum_table.last_mut() {
            *last = CUM_TABLE_DOMAIN;
        }

        let (index_to_word, counts): (Vec<String>, Vec<u64>) = retained.into_iter().unzip();
        let word_to_index = index_to_word
            .iter()
            .enumerate()
            .map(|(idx, word)| (word.clone(), idx))
            .collect();

        Ok(Self {
            index_to_word,
            word_to_index,
            counts,
            keep_probability,
            cum_table,
            total_words,
        })
    }

    fn len(&self) -> usize {
        self.index_to_word.len()
    }

    fn sample_negative(&self, rng: &mut Rng) -> usize {
        let r = rng.u64(0..CUM_TABLE_DOMAIN);
        self.cum_table.partition_point(|&c| c <= r)
    }
}

/// word2vec down-sampling: `(sqrt(c / t) + 1) * t / c` with `t = sample * total`.
fn keep_probability(count: u64, total_words: u64, sample: f64) -> f32 {
    if sample <= 0.0 {
        return 1.0;
    }
    let threshold = sample * total_words as f64;
    let count = count as f64;
    (((count / threshold).sqrt() + 1.0) * threshold / count).min(1.0) as f32
}

struct Layers {
    syn0: Vec<Vec<f32>>,
    syn1neg: Vec<Vec<f32>>,
}

impl Layers {
    /// Input vectors uniform in [-0.5/dim, 0.5/dim), output vectors zero.
    fn new(vocab_size: usize, embedding_dim: usize, seed: u64) -> Self {
        let mut rng = Rng::with_seed(seed);
        let scale = embedding_dim as f32;
        Layers {
            syn0: (0..vocab_size)
                .map(|_| (0..embedding_dim).map(|_| (rng.f32() - 0.5) / scale).collect())
                .collect(),
            syn1neg: vec![vec![0.0; embedding_dim]; vocab_size],
        }
    }
}

/// Everything one training run shares across epochs and threads.
struct Trainer<'a> {
    vocab: &'a Vocab,
    config: &'a TrainingConfig,
    layers: &'a Mutex<Layers>,
    pool: &'a ThreadPool,
}

impl Trainer<'_> {
    fn run(&self, corpus: &dyn SentenceSource) {
        let epochs = self.config.epochs;
        let total_progress = (epochs as u64 * self.vocab.total_words).max(1);

        let pb = if self.config.show_progress {
            ProgressBar::new(total_progress)
        } else {
            ProgressBar::hidden()
        };
        if let Ok(style) =
            ProgressStyle::default_bar().template("[{elapsed_precise}] {bar:40.cyan/blue} {pos:>7}/{len:7} {msg}")
        {
            pb.set_style(style);
        }

        for epoch in 0..epochs {
            pb.set_message(format!("Epoch {}/{}", epoch + 1, epochs));
            let mut words_done = epoch as u64 * self.vocab.total_words;
            let mut batch: Vec<(usize, Vec<usize>)> = Vec::new();
            let mut batch_words = 0usize;

            for (sentence_idx, sentence) in corpus.sentences().enumerate() {
                let indices: Vec<usize> = sentence
                    .iter()
                    .filter_map(|token| self.vocab.word_to_index.get(token).copied())
                    .collect();
                batch_words += indices.len();
                batch.push((sentence_idx, indices));

                if batch_words >= BATCH_WORDS {
                    self.train_batch(epoch, &batch, self.alpha_at(words_done, total_progress));
                    words_done += batch_words as u64;
                    pb.inc(batch_words as u64);
                    batch.clear();
                    batch_words = 0;
                }
            }
            if !batch.is_empty() {
                self.train_batch(epoch, &batch, self.alpha_at(words_done, total_progress));
                pb.inc(batch_words as u64);
            }
            info!("Epoch {}/{} complete", epoch + 1, epochs);
        }
        pb.finish_with_message("Training complete");
    }

    /// Linearly decayed learning rate after `words_done` of `total` words.
    fn alpha_at(&self, words_done: u64, total: u64) -> f32 {
        let progress = (words_done as f64 / total as f64).min(1.0) as f32;
        self.config.alpha - (self.config.alpha - self.config.min_alpha) * progress
    }

    fn train_batch(&self, epoch: usize, batch: &[(usize, Vec<usize>)], alpha: f32) {
        self.pool.install(|| {
            batch.par_iter().for_each(|(sentence_idx, indices)| {
                let mut rng = Rng::with_seed(sentence_seed(self.config.seed, epoch, *sentence_idx));
                let kept: Vec<usize> = indices
                    .iter()
                    .copied()
                    .filter(|&w| {
                        let p = self.vocab.keep_probability[w];
                        p >= 1.0 || rng.f32() < p
                    })
                    .collect();
                if kept.len() < 2 {
                    return;
                }

                let mut layers = self.lock_layers();
                match self.config.architecture {
                    Architecture::SkipGram => self.train_sentence_sg(&mut layers, &kept, &mut rng, alpha),
                    Architecture::Cbow => self.train_sentence_cbow(&mut layers, &kept, &mut rng, alpha),
                }
            });
        });
    }

    fn lock_layers(&self) -> MutexGuard<'_, Layers> {
        self.layers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Context positions around `pos` with a randomly shrunk window.
    fn context_span(&self, pos: usize, len: usize, rng: &mut Rng) -> std::ops::Range<usize> {
        let window = self.config.window - rng.usize(0..self.config.window);
        pos.saturating_sub(window)..usize::min(pos + window + 1, len)
    }

    fn train_sentence_sg(&self, layers: &mut Layers, sentence: &[usize], rng: &mut Rng, alpha: f32) {
        let Layers { syn0, syn1neg } = layers;
        let mut neu1e = vec![0.0f32; self.config.vector_size];

        for (pos, &word) in sentence.iter().enumerate() {
            for ctx_pos in self.context_span(pos, sentence.len(), rng) {
                if ctx_pos == pos {
                    continue;
                }
                let context = sentence[ctx_pos];
                neu1e.fill(0.0);
                self.negative_sampling(&syn0[context], syn1neg, word, rng, alpha, &mut neu1e);
                for (v, e) in syn0[context].iter_mut().zip(neu1e.iter()) {
                    *v += e;
                }
            }
        }
    }

    fn train_sentence_cbow(&self, layers: &mut Layers, sentence: &[usize], rng: &mut Rng, alpha: f32) {
        let Layers { syn0, syn1neg } = layers;
        let dim = self.config.vector_size;
        let mut l1 = vec![0.0f32; dim];
        let mut neu1e = vec![0.0f32; dim];

        for (pos, &word) in sentence.iter().enumerate() {
            let contexts: Vec<usize> = self
                .context_span(pos, sentence.len(), rng)
                .filter(|&p| p != pos)
                .map(|p| sentence[p])
                .collect();
            if contexts.is_empty() {
                continue;
            }

            let inv_count = 1.0 / contexts.len() as f32;
            l1.fill(0.0);
            for &c in &contexts {
                for (acc, v) in l1.iter_mut().zip(syn0[c].iter()) {
                    *acc += v;
                }
            }
            l1.iter_mut().for_each(|v| *v *= inv_count);

            neu1e.fill(0.0);
            self.negative_sampling(&l1, syn1neg, word, rng, alpha, &mut neu1e);
            neu1e.iter_mut().for_each(|e| *e *= inv_count);
            for &c in &contexts {
                for (v, e) in syn0[c].iter_mut().zip(neu1e.iter()) {
                    *v += e;
                }
            }
        }
    }

    /// One positive and `negative` negative updates of the output layer.
    ///
    /// Accumulates the input-side gradient into `neu1e`.
    fn negative_sampling(
        &self,
        l1: &[f32],
        syn1neg: &mut [Vec<f32>],
        word: usize,
        rng: &mut Rng,
        alpha: f32,
        neu1e: &mut [f32],
    ) {
        for d in 0..=self.config.negative {
            let (target, label) = if d == 0 {
                (word, 1.0f32)
            } else {
                let sample = self.vocab.sample_negative(rng);
                if sample == word {
                    continue;
                }
                (sample, 0.0f32)
            };

            let output = &mut syn1neg[target];
            let f = dot(l1, output);
            let g = (label - sigmoid(f)) * alpha;
            for ((e, o), i) in neu1e.iter_mut().zip(output.iter_mut()).zip(l1.iter()) {
                *e += g * *o;
                *o += g * i;
            }
        }
    }
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

fn sentence_seed(seed: u64, epoch: usize, sentence_idx: usize) -> u64 {
    seed.wrapping_mul(0x9E37_79B9_7F4A_7C15)
        ^ (epoch as u64).wrapping_mul(0xBF58_476D_1CE4_E5B9)
        ^ (sentence_idx as u64).wrapping_mul(0x94D0_49BB_1331_11EB)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sentences(texts: &[&str]) -> Vec<Vec<String>> {
        texts
            .iter()
            .map(|t| t.split_whitespace().map(String::from).collect())
            .collect()
    }

    fn small_config() -> TrainingConfig {
        TrainingConfig {
            vector_size: 10,
            window: 2,
            min_count: 1,
            epochs: 3,
            workers: 1,
            sample: 0.0,
            ..TrainingConfig::default()
        }
    }

    #[test]
    fn test_vocab_orders_by_frequency_then_token() {
        let corpus = sentences(&["b a c a", "c a d"]);
        let vocab = Vocab::build(&corpus, &small_config()).unwrap();
        assert_eq!(vocab.index_to_word, vec!["a", "c", "b", "d"]);
        assert_eq!(vocab.counts, vec![3, 2, 1, 1]);
        assert_eq!(vocab.total_words, 7);
        assert_eq!(*vocab.cum_table.last().unwrap(), CUM_TABLE_DOMAIN);
    }

    #[test]
    fn test_vocab_applies_min_count() {
        let corpus = sentences(&["b a c a", "c a d"]);
        let config = TrainingConfig { min_count: 2, ..small_config() };
        let vocab = Vocab::build(&corpus, &config).unwrap();
        assert_eq!(vocab.index_to_word, vec!["a", "c"]);
        assert_eq!(vocab.total_words, 5);
    }

    #[test]
    fn test_empty_corpus_fails() {
        let corpus: Vec<Vec<String>> = Vec::new();
        let err = Word2Vec.fit(&corpus, &small_config()).unwrap_err();
        assert!(matches!(err, EmbeddingError::TrainingFailure(_)));
    }

    #[test]
    fn test_everything_filtered_fails() {
        let corpus = sentences(&["rare words only"]);
        let config = TrainingConfig { min_count: 2, ..small_config() };
        assert!(matches!(Word2Vec.fit(&corpus, &config), Err(EmbeddingError::TrainingFailure(_))));
    }

    #[test]
    fn test_invalid_config_fails_before_training() {
        let corpus = sentences(&["a b c"]);
        let config = TrainingConfig { vector_size: 0, ..small_config() };
        assert!(matches!(Word2Vec.fit(&corpus, &config), Err(EmbeddingError::InvalidConfig(_))));
    }

    #[test]
    fn test_keep_probability() {
        assert_eq!(keep_probability(10, 100, 0.0), 1.0);
        assert_eq!(keep_probability(1, 1_000_000, 1e-3), 1.0);
        let frequent = keep_probability(500_000, 1_000_000, 1e-3);
        assert!(frequent > 0.0 && frequent < 0.1);
    }

    #[test]
    fn test_negative_sampling_favours_frequent_tokens() {
        let corpus = sentences(&["a a a a a a a a a a a a a a a a b"]);
        let vocab = Vocab::build(&corpus, &small_config()).unwrap();
        let mut rng = Rng::with_seed(7);
        let draws: Vec<usize> = (0..1000).map(|_| vocab.sample_negative(&mut rng)).collect();
        assert!(draws.iter().all(|&idx| idx < vocab.len()));
        let frequent = draws.iter().filter(|&&idx| idx == 0).count();
        assert!(frequent > 700);
    }

    #[test]
    fn test_single_worker_training_is_reproducible() {
        let corpus = sentences(&["the movie was good", "the movie was bad", "a good film", "a bad film"]);
        let first = Word2Vec.fit(&corpus, &small_config()).unwrap();
        let second = Word2Vec.fit(&corpus, &small_config()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_training_moves_vectors() {
        let corpus = sentences(&["the movie was good", "the movie was bad"]);
        let config = small_config();
        let model = Word2Vec.fit(&corpus, &config).unwrap();
        let initial = Layers::new(model.vocab_size(), config.vector_size, config.seed);
        assert_ne!(model.input_vectors, initial.syn0);
        assert!(model.input_vectors.iter().flatten().all(|v| v.is_finite()));
    }

    #[test]
    fn test_cbow_trains() {
        let corpus = sentences(&["the movie was good", "the movie was bad"]);
        let config = TrainingConfig { architecture: Architecture::Cbow, ..small_config() };
        let wv = Word2Vec.train(&corpus, &config).unwrap();
        assert_eq!(wv.len(), 5);
        assert_eq!(wv.vector_size(), 10);
        assert_eq!(wv.count("the"), Some(2));
    }

    #[test]
    fn test_related_tokens_end_up_closer() {
        let fruit = ["apple", "banana", "cherry"];
        let vehicles = ["car", "truck", "bus"];
        let mut corpus = Vec::new();
        for i in 0..150 {
            for group in [&fruit, &vehicles] {
                let sentence: Vec<String> = (0..6).map(|j| group[(i + j * (i % 2 + 1)) % 3].to_string()).collect();
                corpus.push(sentence);
            }
        }
        let config = TrainingConfig {
            vector_size: 16,
            window: 2,
            min_count: 1,
            epochs: 20,
            workers: 1,
            sample: 0.0,
            ..TrainingConfig::default()
        };
        let wv = Word2Vec.train(&corpus, &config).unwrap();
        let within = wv.similarity("apple", "banana").unwrap();
        let across = wv.similarity("apple", "truck").unwrap();
        assert!(within > across, "within={within} across={across}");
    }

    #[test]
    fn test_parallel_training_produces_full_vocabulary() {
        let corpus = sentences(&["the movie was good", "the movie was bad", "a good film", "a bad film"]);
        let config = TrainingConfig { workers: 4, ..small_config() };
        let wv = Word2Vec.train(&corpus, &config).unwrap();
        assert_eq!(wv.len(), 7);
    }

    #[test]
    fn test_snapshot_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        let corpus = sentences(&["the movie was good", "the movie was bad"]);
        let model = Word2Vec.fit(&corpus, &small_config()).unwrap();
        model.save(&path).unwrap();

        let loaded = Word2VecModel::load(&path).unwrap();
        assert_eq!(loaded.vocab_size(), model.vocab_size());
        assert_eq!(loaded.get_embedding("movie"), model.get_embedding("movie"));
        assert_eq!(loaded.config(), model.config());
    }

    #[test]
    fn test_snapshot_missing_file() {
        assert!(matches!(Word2VecModel::load("missing/model.json"), Err(EmbeddingError::NotFound(_))));
    }
}
