//! # Phrases Module.
//!
//! Detects bigram phrases ("new york", "special effects") from co-occurrence
//! counts and joins them into single tokens.
//!
//! ## Scoring
//!
//! - Default (Mikolov et al.)
//!   * Formula: score(a, b) = (count(ab) - min_count) / (count(a) * count(b)) * |V|
//!   * Where |V| is the number of distinct learnt unigrams and bigrams
//!
//! - Normalized PMI
//!   * Formula: npmi(a, b) = ln(p(ab) / (p(a) * p(b))) / -ln(p(ab))
//!   * Probabilities are relative to the total number of words seen
//!   * Ranges over [-1, 1], so the threshold must too
//!
//! A pair is a phrase when its score is strictly above the threshold.
//! Connector words never start or end a phrase.

use std::collections::{BTreeSet, HashMap};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::corpus::SentenceSource;
use crate::error::{EmbeddingError, Result};

/// Bigram scoring function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scoring {
    Default,
    Npmi,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
/// Settings for [`Phrases`].
///
/// # Fields
///
/// * `min_count` - Bigrams seen fewer times never score above the threshold.
/// * `threshold` - Minimum score, exclusive.
/// * `delimiter` - Glue placed between the two tokens of a phrase.
/// * `scoring` - Scoring function.
/// * `connector_words` - Tokens that may not start or end a phrase.
pub struct PhrasesConfig {
    pub min_count: u64,
    pub threshold: f64,
    pub delimiter: String,
    pub scoring: Scoring,
    pub connector_words: BTreeSet<String>,
}

impl Default for PhrasesConfig {
    fn default() -> Self {
        Self {
            min_count: 5,
            threshold: 10.0,
            delimiter: "_".to_string(),
            scoring: Scoring::Default,
            connector_words: BTreeSet::new(),
        }
    }
}

/// Learnt unigram and bigram counts plus the scoring settings.
#[derive(Debug, Clone)]
pub struct Phrases {
    config: PhrasesConfig,
    unigrams: HashMap<String, u64>,
    bigrams: HashMap<String, HashMap<String, u64>>,
    distinct_bigrams: usize,
    total_words: u64,
}

impl Phrases {
    /// Create an empty detector.
    ///
    /// NPMI scores live in [-1, 1]; a threshold outside that range is rejected.
    pub fn new(config: PhrasesConfig) -> Result<Self> {
        if config.scoring == Scoring::Npmi && !(-1.0..=1.0).contains(&config.threshold) {
            return Err(EmbeddingError::InvalidConfig(
                "npmi threshold must lie in [-1, 1]".to_string(),
            ));
        }
        if config.delimiter.is_empty() || config.delimiter.chars().any(char::is_whitespace) {
            return Err(EmbeddingError::InvalidConfig(
                "phrase delimiter must be non-empty and contain no whitespace".to_string(),
            ));
        }
        Ok(Self {
            config,
            unigrams: HashMap::new(),
            bigrams: HashMap::new(),
            distinct_bigrams: 0,
            total_words: 0,
        })
    }

    pub fn config(&self) -> &PhrasesConfig {
        &self.config
    }

    /// Count unigrams and adjacent bigrams over one pass of `source`.
    ///
    /// Can be called repeatedly; counts accumulate.
    pub fn learn(&mut self, source: &dyn SentenceSource) {
        let mut sentences = 0usize;
        for sentence in source.sentences() {
            sentences += 1;
            for token in &sentence {
                *self.unigrams.entry(token.clone()).or_insert(0) += 1;
                self.total_words += 1;
            }
            for window in sentence.windows(2) {
                let followers = self.bigrams.entry(window[0].clone()).or_default();
                let count = followers.entry(window[1].clone()).or_insert(0);
                if *count == 0 {
                    self.distinct_bigrams += 1;
                }
                *count += 1;
            }
        }
        debug!(
            "Learnt phrases from {} sentences: {} unigrams, {} bigrams",
            sentences,
            self.unigrams.len(),
            self.distinct_bigrams
        );
    }

    /// Number of distinct unigrams plus distinct bigrams learnt.
    pub fn vocab_len(&self) -> usize {
        self.unigrams.len() + self.distinct_bigrams
    }

    pub fn bigram_count(&self, a: &str, b: &str) -> u64 {
        self.bigrams
            .get(a)
            .and_then(|followers| followers.get(b))
            .copied()
            .unwrap_or(0)
    }

    /// Score the pair `a b`.
    ///
    /// `None` when the pair was never seen, involves a connector word, or (for
    /// NPMI) falls below `min_count`.
    pub fn score(&self, a: &str, b: &str) -> Option<f64> {
        if self.config.connector_words.contains(a) || self.config.connector_words.contains(b) {
            return None;
        }
        let pair = self.bigram_count(a, b);
        if pair == 0 {
            return None;
        }
        let count_a = *self.unigrams.get(a)? as f64;
        let count_b = *self.unigrams.get(b)? as f64;
        let pair = pair as f64;
        let min_count = self.config.min_count as f64;

        match self.config.scoring {
            Scoring::Default => Some((pair - min_count) / (count_a * count_b) * self.vocab_len() as f64),
            Scoring::Npmi => {
                if pair < min_count {
                    return None;
                }
                let total = self.total_words as f64;
                let p_ab = pair / total;
                if p_ab >= 1.0 {
                    return None;
                }
                let pmi = (p_ab / ((count_a / total) * (count_b / total))).ln();
                Some(pmi / -p_ab.ln())
            }
        }
    }

    /// Score of `a b` when it is a phrase.
    fn phrase_score(&self, a: &str, b: &str) -> Option<f64> {
        self.score(a, b).filter(|score| *score > self.config.threshold)
    }

    fn join(&self, a: &str, b: &str) -> String {
        format!("{a}{}{b}", self.config.delimiter)
    }

    /// Walk `sentence` left to right, reporting each phrase and whether the
    /// current position starts one.
    fn scan<'s>(&self, sentence: &'s [String]) -> Vec<(&'s str, Option<(&'s str, f64)>)> {
        let mut out = Vec::with_capacity(sentence.len());
        let mut i = 0;
        while i < sentence.len() {
            let phrase = sentence
                .get(i + 1)
                .and_then(|next| self.phrase_score(&sentence[i], next).map(|score| (next.as_str(), score)));
            out.push((sentence[i].as_str(), phrase));
            i += if phrase.is_some() { 2 } else { 1 };
        }
        out
    }

    /// Join detected phrases in `sentence`, greedily from the left.
    ///
    /// # Examples
    ///
    /// ```
    /// use rust_embeddings::phrases::{Phrases, PhrasesConfig};
    ///
    /// let corpus: Vec<Vec<String>> = ["new york is big", "i love new york", "we visited new york"]
    ///     .iter()
    ///     .map(|s| s.split(' ').map(String::from).collect())
    ///     .collect();
    /// let mut phrases = Phrases::new(PhrasesConfig { min_count: 1, threshold: 1.0, ..Default::default() }).unwrap();
    /// phrases.learn(&corpus);
    /// let joined = phrases.apply(&corpus[1]);
    /// assert_eq!(joined.last().unwrap(), "new_york");
    /// ```
    pub fn apply(&self, sentence: &[String]) -> Vec<String> {
        self.scan(sentence)
            .into_iter()
            .map(|(token, phrase)| match phrase {
                Some((next, _)) => self.join(token, next),
                None => token.to_string(),
            })
            .collect()
    }

    /// Every phrase occurrence in `sentence` with its score.
    pub fn find_phrases(&self, sentence: &[String]) -> Vec<(String, f64)> {
        self.scan(sentence)
            .into_iter()
            .filter_map(|(token, phrase)| phrase.map(|(next, score)| (self.join(token, next), score)))
            .collect()
    }

    /// Every learnt bigram that qualifies as a phrase, best score first.
    pub fn export_phrases(&self) -> Vec<(String, f64)> {
        let mut phrases: Vec<(String, f64)> = self
            .bigrams
            .iter()
            .flat_map(|(a, followers)| {
                followers
                    .keys()
                    .filter_map(move |b| self.phrase_score(a, b).map(|score| (self.join(a, b), score)))
            })
            .collect();
        phrases.sort_by(|x, y| y.1.total_cmp(&x.1).then_with(|| x.0.cmp(&y.0)));
        phrases
    }

    /// View `source` with phrases joined, e.g. to train embeddings on phrases.
    pub fn transform<'a>(&'a self, source: &'a dyn SentenceSource) -> PhrasedCorpus<'a> {
        PhrasedCorpus { phrases: self, source }
    }
}

/// A sentence source with detected phrases joined into single tokens.
pub struct PhrasedCorpus<'a> {
    phrases: &'a Phrases,
    source: &'a dyn SentenceSource,
}

impl SentenceSource for PhrasedCorpus<'_> {
    fn sentences(&self) -> Box<dyn Iterator<Item = Vec<String>> + '_> {
        Box::new(self.source.sentences().map(|sentence| self.phrases.apply(&sentence)))
    }
}

/// Count the phrases `phrases` detects across one pass of `source`.
///
/// ## Returns
///
/// `(phrase, occurrences)` sorted by descending count, then alphabetically.
pub fn count_phrases(phrases: &Phrases, source: &dyn SentenceSource) -> Vec<(String, u32)> {
    let mut counts: HashMap<String, u32> = HashMap::new();
    for sentence in source.sentences() {
        for (phrase, _) in phrases.find_phrases(&sentence) {
            *counts.entry(phrase).or_insert(0) += 1;
        }
    }

    let mut counts: Vec<(String, u32)> = counts.into_iter().collect();
    counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    counts
}
