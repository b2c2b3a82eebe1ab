//! # Corpus Module
//!
//! Turns raw documents into the token streams the training engine consumes.
//!
//! ## Key Features
//!
//! - Preprocessor
//!
//! Lower-cases text, strips punctuation and splits on whitespace, optionally
//! dropping stopwords and tokens outside a length range.
//!
//! - Corpus Streamer
//!
//! Wraps an immutable, ordered collection of documents and hands out a fresh
//! lazy stream of token lists on every traversal. Nothing is tokenized up
//! front and nothing is cached, so each epoch sees exactly the same sentences.
//!
//! - Sentence Sources
//!
//! The [`SentenceSource`] trait is what training asks for: anything that can
//! restart a stream of token lists from the beginning.

use std::collections::HashSet;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::{Arc, LazyLock};

use log::debug;
use regex::Regex;

use crate::error::{open_existing, Result};

/// Anything that is neither a word character nor whitespace.
static PUNCTUATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w\s]").expect("punctuation pattern is valid"));

/// Turns one raw document into an ordered list of tokens.
///
/// Implementations must be pure: the same text always yields the same tokens.
/// Any `Fn(&str) -> Vec<String>` closure is a tokenizer.
pub trait Tokenize {
    fn tokenize(&self, text: &str) -> Vec<String>;
}

impl<F> Tokenize for F
where
    F: Fn(&str) -> Vec<String>,
{
    fn tokenize(&self, text: &str) -> Vec<String> {
        self(text)
    }
}

/// A preprocessor for text
///
/// # Fields
/// * `stopwords`: Tokens dropped from the output
/// * `min_len`: Shortest token kept, in characters
/// * `max_len`: Longest token kept, in characters
#[derive(Debug, Clone)]
pub struct Preprocessor {
    stopwords: HashSet<String>,
    min_len: usize,
    max_len: usize,
}

impl Default for Preprocessor {
    fn default() -> Self {
        Self::new()
    }
}

impl Preprocessor {
    /// Create a new preprocessor with no stopwords and no length limits
    pub fn new() -> Self {
        Self {
            stopwords: HashSet::new(),
            min_len: 1,
            max_len: usize::MAX,
        }
    }

    /// Keep only tokens whose character count lies in `min_len..=max_len`
    pub fn with_token_length(mut self, min_len: usize, max_len: usize) -> Self {
        self.min_len = min_len;
        self.max_len = max_len;
        self
    }

    /// Add stopwords to the preprocessor
    pub fn with_stopwords<I, S>(mut self, stopwords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.stopwords.extend(stopwords.into_iter().map(Into::into));
        self
    }

    /// Read the stopwords from a file
    ///
    /// # Arguments
    /// * `path`: The path to the stopwords file, one word per line
    ///
    /// # Returns
    /// The stopwords read from the file
    ///
    /// # Examples
    /// ```no_run
    /// use rust_embeddings::corpus::Preprocessor;
    ///
    /// let mut processor = Preprocessor::new();
    /// processor.read_stopwords("data/stopwords.txt").unwrap();
    /// ```
    pub fn read_stopwords(&mut self, path: impl AsRef<Path>) -> Result<Vec<String>> {
        let file = open_existing(path.as_ref())?;
        let mut stopwords = Vec::new();
        for line in BufReader::new(file).lines() {
            let word = line?.trim().to_lowercase();
            if !word.is_empty() {
                stopwords.push(word);
            }
        }
        self.stopwords.extend(stopwords.iter().cloned());
        debug!("Loaded {} stopwords from {}", stopwords.len(), path.as_ref().display());
        Ok(stopwords)
    }

    /// Preprocesses a given text
    ///
    /// # Arguments
    /// * `text`: The text to preprocess
    ///
    /// # Returns
    /// The lower-cased tokens that survive the filters, in order
    ///
    /// # Examples
    /// ```
    /// use rust_embeddings::corpus::Preprocessor;
    ///
    /// let processor = Preprocessor::new();
    /// assert_eq!(processor.preprocess("Rust is GREAT!"), vec!["rust", "is", "great"]);
    /// ```
    pub fn preprocess(&self, text: &str) -> Vec<String> {
        let lowercased = text.to_lowercase();
        let no_punctuation = PUNCTUATION.replace_all(&lowercased, "");

        no_punctuation
            .split_whitespace()
            .filter(|token| {
                let len = token.chars().count();
                len >= self.min_len && len <= self.max_len
            })
            .filter(|token| !self.stopwords.contains(*token))
            .map(str::to_string)
            .collect()
    }
}

impl Tokenize for Preprocessor {
    fn tokenize(&self, text: &str) -> Vec<String> {
        self.preprocess(text)
    }
}

/// A restartable stream of tokenized sentences.
///
/// Each call to [`SentenceSource::sentences`] starts again from the first
/// sentence. Training makes one vocabulary pass plus one pass per epoch.
pub trait SentenceSource {
    fn sentences(&self) -> Box<dyn Iterator<Item = Vec<String>> + '_>;
}

impl SentenceSource for [Vec<String>] {
    fn sentences(&self) -> Box<dyn Iterator<Item = Vec<String>> + '_> {
        Box::new(self.iter().cloned())
    }
}

impl SentenceSource for Vec<Vec<String>> {
    fn sentences(&self) -> Box<dyn Iterator<Item = Vec<String>> + '_> {
        self.as_slice().sentences()
    }
}

/// Lazily tokenized view over an immutable document collection.
///
/// # Fields
///
/// * `documents` - The raw documents, shared and never mutated.
/// * `tokenizer` - Applied to each document as it is yielded.
///
/// # Examples
///
/// ```
/// use rust_embeddings::corpus::CorpusStreamer;
///
/// let corpus = CorpusStreamer::new(vec!["The movie was good".to_string()]);
/// let first: Vec<_> = corpus.iter().collect();
/// let second: Vec<_> = corpus.iter().collect();
/// assert_eq!(first, second);
/// ```
#[derive(Debug, Clone)]
pub struct CorpusStreamer<T = Preprocessor> {
    documents: Arc<[String]>,
    tokenizer: T,
}

impl CorpusStreamer<Preprocessor> {
    /// Wrap `documents` with the default [`Preprocessor`].
    pub fn new(documents: impl Into<Arc<[String]>>) -> Self {
        Self::with_tokenizer(documents, Preprocessor::new())
    }
}

impl<T: Tokenize> CorpusStreamer<T> {
    /// Wrap `documents` with a custom tokenizer.
    pub fn with_tokenizer(documents: impl Into<Arc<[String]>>, tokenizer: T) -> Self {
        Self {
            documents: documents.into(),
            tokenizer,
        }
    }

    /// Start a new traversal from the first document.
    pub fn iter(&self) -> Stream<'_, T> {
        Stream {
            documents: self.documents.iter(),
            tokenizer: &self.tokenizer,
        }
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

impl<'a, T: Tokenize> IntoIterator for &'a CorpusStreamer<T> {
    type Item = Vec<String>;
    type IntoIter = Stream<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<T: Tokenize> SentenceSource for CorpusStreamer<T> {
    fn sentences(&self) -> Box<dyn Iterator<Item = Vec<String>> + '_> {
        Box::new(self.iter())
    }
}

/// One traversal of a [`CorpusStreamer`]. Tokenizes on `next()`.
pub struct Stream<'a, T> {
    documents: std::slice::Iter<'a, String>,
    tokenizer: &'a T,
}

impl<T: Tokenize> Iterator for Stream<'_, T> {
    type Item = Vec<String>;

    fn next(&mut self) -> Option<Self::Item> {
        self.documents.next().map(|doc| self.tokenizer.tokenize(doc))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.documents.size_hint()
    }
}

impl<T: Tokenize> ExactSizeIterator for Stream<'_, T> {}

/// Read a newline-delimited document file, one document per line.
///
/// Blank lines are skipped. A missing file is reported as `NotFound`.
pub fn read_documents(path: impl AsRef<Path>) -> Result<Vec<String>> {
    let path = path.as_ref();
    let reader = BufReader::new(open_existing(path)?);
    let mut documents = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if !line.trim().is_empty() {
            documents.push(line);
        }
    }
    debug!("Read {} documents from {}", documents.len(), path.display());
    Ok(documents)
}
