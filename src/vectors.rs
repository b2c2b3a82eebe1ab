//! # Keyed Vectors
//!
//! The trained vocabulary: token → embedding vector, with the frequency each
//! token had in the training corpus when that is known.
//!
//! ## Persistence
//!
//! Two word2vec-compatible layouts share an ASCII header `"<count> <dim>\n"`:
//!
//! - `Text`: one line per token, `token f1 f2 ... fd`. Floats are written with
//!   their shortest round-trip representation, so reloading is bit-exact.
//! - `Binary`: per token `"token "`, then `d` little-endian `f32`, then `"\n"`.
//!
//! Loading checks the content against the requested layout and reports a
//! `FormatMismatch` instead of guessing.
//!
//! ## Queries
//!
//! All queries are exhaustive cosine scans over the vocabulary, parallelised
//! with rayon.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;
use std::str::FromStr;

use log::{debug, info};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::engine::SimilarityQuery;
use crate::error::{open_existing, EmbeddingError, Result};

/// Guards the multiplicative analogy score against division by zero.
const COSMUL_EPSILON: f32 = 1e-6;

/// On-disk layout of a vector file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VectorFormat {
    Text,
    Binary,
}

impl fmt::Display for VectorFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VectorFormat::Text => f.write_str("text"),
            VectorFormat::Binary => f.write_str("binary"),
        }
    }
}

impl FromStr for VectorFormat {
    type Err = EmbeddingError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "text" | "txt" => Ok(VectorFormat::Text),
            "binary" | "bin" => Ok(VectorFormat::Binary),
            other => Err(EmbeddingError::InvalidConfig(format!("unknown vector format '{other}'"))),
        }
    }
}

/// Token → vector mapping with optional frequency counts.
///
/// # Fields
///
/// * `vector_size` - Dimensionality shared by every vector.
/// * `index_to_key` - Tokens in vocabulary order.
/// * `key_to_index` - Reverse lookup.
/// * `vectors` - One vector per token, aligned with `index_to_key`.
/// * `counts` - Training frequency per token, `None` when unknown (e.g. after loading a file).
#[derive(Debug, Clone, PartialEq)]
pub struct KeyedVectors {
    vector_size: usize,
    index_to_key: Vec<String>,
    key_to_index: HashMap<String, usize>,
    vectors: Vec<Vec<f32>>,
    counts: Vec<Option<u64>>,
}

impl KeyedVectors {
    /// Create an empty vocabulary of `vector_size`-dimensional vectors.
    pub fn new(vector_size: usize) -> Self {
        Self::with_capacity(vector_size, 0)
    }

    pub fn with_capacity(vector_size: usize, capacity: usize) -> Self {
        Self {
            vector_size,
            index_to_key: Vec::with_capacity(capacity),
            key_to_index: HashMap::with_capacity(capacity),
            vectors: Vec::with_capacity(capacity),
            counts: Vec::with_capacity(capacity),
        }
    }

    /// Insert or replace the vector for `token`.
    ///
    /// # Arguments
    ///
    /// * `token` - Non-empty, whitespace-free token.
    /// * `vector` - Must have exactly `vector_size` components.
    /// * `count` - Training frequency, if known.
    ///
    /// # Returns
    ///
    /// * `Result<()>` - `InvalidToken` or `DimensionMismatch` on bad input.
    pub fn add(&mut self, token: impl Into<String>, vector: Vec<f32>, count: Option<u64>) -> Result<()> {
        let token = token.into();
        if token.is_empty() || token.chars().any(char::is_whitespace) {
            return Err(EmbeddingError::InvalidToken(token));
        }
        if vector.len() != self.vector_size {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.vector_size,
                got: vector.len(),
            });
        }

        match self.key_to_index.get(&token) {
            Some(&idx) => {
                self.vectors[idx] = vector;
                self.counts[idx] = count;
            }
            None => {
                self.key_to_index.insert(token.clone(), self.index_to_key.len());
                self.index_to_key.push(token);
                self.vectors.push(vector);
                self.counts.push(count);
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.index_to_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index_to_key.is_empty()
    }

    pub fn vector_size(&self) -> usize {
        self.vector_size
    }

    pub fn contains(&self, token: &str) -> bool {
        self.key_to_index.contains_key(token)
    }

    /// Tokens in vocabulary order.
    pub fn keys(&self) -> &[String] {
        &self.index_to_key
    }

    pub fn index_of(&self, token: &str) -> Result<usize> {
        self.key_to_index
            .get(token)
            .copied()
            .ok_or_else(|| EmbeddingError::UnknownToken(token.to_string()))
    }

    pub fn get_vector(&self, token: &str) -> Result<&[f32]> {
        Ok(&self.vectors[self.index_of(token)?])
    }

    /// Training frequency of `token`, if the token exists and its count is known.
    pub fn count(&self, token: &str) -> Option<u64> {
        self.key_to_index.get(token).and_then(|&idx| self.counts[idx])
    }

    /// Iterate `(token, vector)` pairs in vocabulary order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[f32])> {
        self.index_to_key
            .iter()
            .zip(self.vectors.iter())
            .map(|(token, vector)| (token.as_str(), vector.as_slice()))
    }

    // ---------------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------------

    /// Cosine similarity between two tokens, in [-1, 1].
    ///
    /// Symmetric by construction; a zero vector has similarity 0 with everything.
    pub fn similarity(&self, a: &str, b: &str) -> Result<f32> {
        let va = self.get_vector(a)?;
        let vb = self.get_vector(b)?;
        Ok(cosine(va, vb))
    }

    /// Tokens nearest to the combination of `positive` minus `negative` seeds.
    ///
    /// Seed vectors are normalised to unit length, weighted +1 (positive) or -1
    /// (negative) and summed. Seeds never appear in the result.
    ///
    /// # Arguments
    ///
    /// * `positive` - Tokens pulling the query towards them.
    /// * `negative` - Tokens pushing the query away.
    /// * `topn` - Maximum number of results.
    ///
    /// # Returns
    ///
    /// * `Result<Vec<(String, f32)>>` - `(token, score)` sorted by descending score.
    ///
    /// # Examples
    ///
    /// ```
    /// use rust_embeddings::KeyedVectors;
    ///
    /// let mut kv = KeyedVectors::new(2);
    /// kv.add("cat", vec![1.0, 0.1], None).unwrap();
    /// kv.add("dog", vec![0.9, 0.2], None).unwrap();
    /// kv.add("car", vec![-0.1, 1.0], None).unwrap();
    /// let nearest = kv.most_similar(&["cat"], &[], 1).unwrap();
    /// assert_eq!(nearest[0].0, "dog");
    /// ```
    pub fn most_similar(&self, positive: &[&str], negative: &[&str], topn: usize) -> Result<Vec<(String, f32)>> {
        if positive.is_empty() && negative.is_empty() {
            return Err(EmbeddingError::InvalidQuery(
                "nearest-neighbour query needs at least one seed token".to_string(),
            ));
        }

        let mut exclude = HashSet::new();
        let mut query = vec![0.0f32; self.vector_size];
        for (tokens, weight) in [(positive, 1.0f32), (negative, -1.0f32)] {
            for token in tokens {
                let idx = self.index_of(token)?;
                exclude.insert(idx);
                let unit = unit_vector(&self.vectors[idx]);
                for (q, v) in query.iter_mut().zip(unit.iter()) {
                    *q += weight * v;
                }
            }
        }

        Ok(self.rank(&unit_vector(&query), &exclude, topn))
    }

    /// Complete an analogy: `positive[0] - negative[0] + positive[1] ...`.
    ///
    /// Same scoring as [`KeyedVectors::most_similar`], but both lists must be non-empty.
    pub fn analogy(&self, positive: &[&str], negative: &[&str], topn: usize) -> Result<Vec<(String, f32)>> {
        if positive.is_empty() || negative.is_empty() {
            return Err(EmbeddingError::InvalidQuery(
                "analogy needs both positive and negative tokens".to_string(),
            ));
        }
        self.most_similar(positive, negative, topn)
    }

    /// Analogy with the multiplicative objective of Levy and Goldberg.
    ///
    /// Each candidate scores `Π (1 + cos(c, p)) / 2` over positives divided by
    /// `Π (1 + cos(c, n)) / 2` over negatives.
    pub fn most_similar_cosmul(&self, positive: &[&str], negative: &[&str], topn: usize) -> Result<Vec<(String, f32)>> {
        if positive.is_empty() {
            return Err(EmbeddingError::InvalidQuery(
                "multiplicative analogy needs at least one positive token".to_string(),
            ));
        }
        let positive = self.resolve_units(positive)?;
        let negative = self.resolve_units(negative)?;
        let exclude: HashSet<usize> = positive.iter().chain(negative.iter()).map(|(idx, _)| *idx).collect();

        let mut scored: Vec<(usize, f32)> = (0..self.len())
            .into_par_iter()
            .filter(|idx| !exclude.contains(idx))
            .map(|idx| {
                let candidate = unit_vector(&self.vectors[idx]);
                let shifted = |seed: &Vec<f32>| (1.0 + dot(&candidate, seed)) / 2.0;
                let pos: f32 = positive.iter().map(|(_, seed)| shifted(seed)).product();
                let neg: f32 = negative.iter().map(|(_, seed)| shifted(seed)).product();
                (idx, pos / (neg + COSMUL_EPSILON))
            })
            .collect();
        scored.sort_by(by_score_desc);

        Ok(self.take_top(scored, topn))
    }

    /// Tokens nearest to an arbitrary vector. Nothing is excluded.
    pub fn similar_by_vector(&self, vector: &[f32], topn: usize) -> Result<Vec<(String, f32)>> {
        if vector.len() != self.vector_size {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.vector_size,
                got: vector.len(),
            });
        }
        Ok(self.rank(&unit_vector(vector), &HashSet::new(), topn))
    }

    /// The token with the lowest average similarity to the rest of `tokens`.
    ///
    /// Ties go to the earliest token in `tokens`; callers should not rely on it.
    pub fn doesnt_match(&self, tokens: &[&str]) -> Result<String> {
        if tokens.len() < 2 {
            return Err(EmbeddingError::InvalidQuery(
                "outlier detection needs at least two tokens".to_string(),
            ));
        }
        let members = self.resolve_units(tokens)?;

        let mut outlier = 0;
        let mut lowest = f32::INFINITY;
        for (i, (_, vi)) in members.iter().enumerate() {
            let total: f32 = members
                .iter()
                .enumerate()
                .filter(|(j, _)| *j != i)
                .map(|(_, (_, vj))| dot(vi, vj))
                .sum();
            let average = total / (members.len() - 1) as f32;
            if average < lowest {
                lowest = average;
                outlier = i;
            }
        }
        debug!("Outlier among {:?} is '{}' ({:.4})", tokens, tokens[outlier], lowest);
        Ok(tokens[outlier].to_string())
    }

    fn resolve_units(&self, tokens: &[&str]) -> Result<Vec<(usize, Vec<f32>)>> {
        tokens
            .iter()
            .map(|token| {
                let idx = self.index_of(token)?;
                Ok((idx, unit_vector(&self.vectors[idx])))
            })
            .collect()
    }

    /// Score every non-excluded token against a unit query vector.
    fn rank(&self, query: &[f32], exclude: &HashSet<usize>, topn: usize) -> Vec<(String, f32)> {
        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .par_iter()
            .enumerate()
            .filter(|(idx, _)| !exclude.contains(idx))
            .map(|(idx, vector)| {
                let norm = l2_norm(vector);
                let score = if norm == 0.0 { 0.0 } else { dot(query, vector) / norm };
                (idx, score)
            })
            .collect();
        scored.sort_by(by_score_desc);
        self.take_top(scored, topn)
    }

    fn take_top(&self, scored: Vec<(usize, f32)>, topn: usize) -> Vec<(String, f32)> {
        scored
            .into_iter()
            .take(topn)
            .map(|(idx, score)| (self.index_to_key[idx].clone(), score))
            .collect()
    }

    // ---------------------------------------------------------------------
    // Persistence
    // ---------------------------------------------------------------------

    /// Write every vector to `path` in the chosen layout, overwriting any file.
    ///
    /// The write is not atomic: an interrupted save can leave a truncated file.
    pub fn save(&self, path: impl AsRef<Path>, format: VectorFormat) -> Result<()> {
        let path = path.as_ref();
        let mut writer = BufWriter::new(File::create(path)?);
        writeln!(writer, "{} {}", self.len(), self.vector_size)?;

        for (token, vector) in self.iter() {
            match format {
                VectorFormat::Text => {
                    write!(writer, "{token}")?;
                    for value in vector {
                        write!(writer, " {value}")?;
                    }
                    writer.write_all(b"\n")?;
                }
                VectorFormat::Binary => {
                    writer.write_all(token.as_bytes())?;
                    writer.write_all(b" ")?;
                    for value in vector {
                        writer.write_all(&value.to_le_bytes())?;
                    }
                    writer.write_all(b"\n")?;
                }
            }
        }
        writer.flush()?;

        info!("Saved {} vectors ({format}) to {}", self.len(), path.display());
        Ok(())
    }

    /// Read vectors written by [`KeyedVectors::save`] (or any word2vec tool).
    ///
    /// # Returns
    ///
    /// * `NotFound` - `path` does not exist.
    /// * `FormatMismatch` - the content is not a valid file of `format`.
    pub fn load(path: impl AsRef<Path>, format: VectorFormat) -> Result<Self> {
        let path = path.as_ref();
        let mut bytes = Vec::new();
        open_existing(path)?.read_to_end(&mut bytes)?;

        let vectors = match format {
            VectorFormat::Text => decode_text(path, &bytes)?,
            VectorFormat::Binary => {
                if let Ok(text) = decode_text(path, &bytes) {
                    if !text.is_empty() {
                        return Err(mismatch(path, format, "content is a text vector file"));
                    }
                }
                decode_binary(path, &bytes)?
            }
        };

        info!("Loaded {} vectors ({format}) from {}", vectors.len(), path.display());
        Ok(vectors)
    }
}

impl SimilarityQuery for KeyedVectors {
    fn similarity(&self, a: &str, b: &str) -> Result<f32> {
        KeyedVectors::similarity(self, a, b)
    }

    fn most_similar(&self, positive: &[&str], negative: &[&str], topn: usize) -> Result<Vec<(String, f32)>> {
        KeyedVectors::most_similar(self, positive, negative, topn)
    }

    fn doesnt_match(&self, tokens: &[&str]) -> Result<String> {
        KeyedVectors::doesnt_match(self, tokens)
    }

    fn analogy(&self, positive: &[&str], negative: &[&str], topn: usize) -> Result<Vec<(String, f32)>> {
        KeyedVectors::analogy(self, positive, negative, topn)
    }
}

fn mismatch(path: &Path, expected: VectorFormat, reason: impl Into<String>) -> EmbeddingError {
    EmbeddingError::FormatMismatch {
        path: path.to_path_buf(),
        expected,
        reason: reason.into(),
    }
}

fn parse_header(path: &Path, format: VectorFormat, line: Option<&str>) -> Result<(usize, usize)> {
    let line = line.ok_or_else(|| mismatch(path, format, "missing header"))?;
    let fields: Vec<&str> = line.split_whitespace().collect();
    match fields.as_slice() {
        [count, dim] => {
            let count = count.parse().map_err(|_| mismatch(path, format, "bad vocabulary size in header"))?;
            let dim = dim.parse().map_err(|_| mismatch(path, format, "bad dimension in header"))?;
            Ok((count, dim))
        }
        _ => Err(mismatch(path, format, "header must be '<count> <dim>'")),
    }
}

fn decode_text(path: &Path, bytes: &[u8]) -> Result<KeyedVectors> {
    let format = VectorFormat::Text;
    let text = std::str::from_utf8(bytes).map_err(|_| mismatch(path, format, "content is not UTF-8"))?;
    let mut lines = text.lines();
    let (count, dim) = parse_header(path, format, lines.next())?;

    // The header is untrusted: never reserve more entries than there are lines.
    let mut vectors = KeyedVectors::with_capacity(dim, count.min(text.lines().count()));
    for (lineno, line) in lines.enumerate().map(|(i, l)| (i + 2, l)) {
        if line.trim().is_empty() {
            continue;
        }
        let mut fields = line.split_whitespace();
        let token = fields.next().unwrap_or_default();
        let values = fields
            .map(f32::from_str)
            .collect::<std::result::Result<Vec<f32>, _>>()
            .map_err(|_| mismatch(path, format, format!("line {lineno}: component is not a number")))?;
        if values.len() != dim {
            return Err(mismatch(
                path,
                format,
                format!("line {lineno}: expected {dim} components, found {}", values.len()),
            ));
        }
        vectors
            .add(token, values, None)
            .map_err(|e| mismatch(path, format, format!("line {lineno}: {e}")))?;
    }

    if vectors.len() != count {
        return Err(mismatch(
            path,
            format,
            format!("header declares {count} tokens, found {}", vectors.len()),
        ));
    }
    Ok(vectors)
}

fn decode_binary(path: &Path, bytes: &[u8]) -> Result<KeyedVectors> {
    let format = VectorFormat::Binary;
    let header_end = bytes
        .iter()
        .position(|&b| b == b'\n')
        .ok_or_else(|| mismatch(path, format, "missing header"))?;
    let header = std::str::from_utf8(&bytes[..header_end]).map_err(|_| mismatch(path, format, "header is not UTF-8"))?;
    let (count, dim) = parse_header(path, format, Some(header))?;
    let vector_bytes = dim
        .checked_mul(4)
        .ok_or_else(|| mismatch(path, format, format!("dimension {dim} is too large")))?;

    let mut pos = header_end + 1;
    // Each record takes at least a one-byte token, a space, the vector and a newline.
    let max_records = (bytes.len() - pos) / vector_bytes.saturating_add(3);
    let mut vectors = KeyedVectors::with_capacity(dim, count.min(max_records));
    for entry in 0..count {
        let rest = &bytes[pos..];
        let space = rest
            .iter()
            .position(|&b| b == b' ')
            .ok_or_else(|| mismatch(path, format, format!("entry {entry}: truncated token")))?;
        let token = std::str::from_utf8(&rest[..space])
            .map_err(|_| mismatch(path, format, format!("entry {entry}: token is not UTF-8")))?;
        pos += space + 1;

        let end = pos
            .checked_add(vector_bytes)
            .filter(|&end| end <= bytes.len())
            .ok_or_else(|| mismatch(path, format, format!("entry {entry}: truncated vector")))?;
        let vector: Vec<f32> = bytes[pos..end]
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        pos = end;

        if bytes.get(pos) != Some(&b'\n') {
            return Err(mismatch(path, format, format!("entry {entry}: missing record terminator")));
        }
        pos += 1;

        vectors
            .add(token, vector, None)
            .map_err(|e| mismatch(path, format, format!("entry {entry}: {e}")))?;
    }

    if pos != bytes.len() {
        return Err(mismatch(path, format, "trailing data after last entry"));
    }
    if vectors.len() != count {
        return Err(mismatch(path, format, "duplicate tokens"));
    }
    Ok(vectors)
}

/// Descending score, then ascending index. NaN scores rank last.
fn by_score_desc(a: &(usize, f32), b: &(usize, f32)) -> Ordering {
    let key = |score: f32| if score.is_nan() { f32::NEG_INFINITY } else { score };
    key(b.1).total_cmp(&key(a.1)).then(a.0.cmp(&b.0))
}

pub(crate) fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

pub(crate) fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Scale `v` to unit length; a zero vector stays zero.
pub(crate) fn unit_vector(v: &[f32]) -> Vec<f32> {
    let norm = l2_norm(v);
    if norm == 0.0 {
        v.to_vec()
    } else {
        v.iter().map(|x| x / norm).collect()
    }
}

/// Cosine similarity clamped to [-1, 1].
pub(crate) fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let denominator = l2_norm(a) * l2_norm(b);
    if denominator == 0.0 {
        return 0.0;
    }
    (dot(a, b) / denominator).clamp(-1.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> KeyedVectors {
        let mut kv = KeyedVectors::new(3);
        kv.add("king", vec![0.9, 0.8, 0.1], Some(10)).unwrap();
        kv.add("queen", vec![0.9, 0.1, 0.8], Some(9)).unwrap();
        kv.add("man", vec![0.5, 0.9, 0.0], Some(8)).unwrap();
        kv.add("woman", vec![0.5, 0.1, 0.9], Some(7)).unwrap();
        kv.add("banana", vec![-0.7, 0.0, -0.2], Some(3)).unwrap();
        kv
    }

    #[test]
    fn test_add_rejects_bad_input() {
        let mut kv = KeyedVectors::new(2);
        assert!(matches!(kv.add("two words", vec![0.0, 1.0], None), Err(EmbeddingError::InvalidToken(_))));
        assert!(matches!(kv.add("", vec![0.0, 1.0], None), Err(EmbeddingError::InvalidToken(_))));
        assert!(matches!(
            kv.add("ok", vec![1.0], None),
            Err(EmbeddingError::DimensionMismatch { expected: 2, got: 1 })
        ));
        assert!(kv.is_empty());
    }

    #[test]
    fn test_add_replaces_existing_token() {
        let mut kv = KeyedVectors::new(1);
        kv.add("a", vec![1.0], Some(1)).unwrap();
        kv.add("a", vec![2.0], Some(5)).unwrap();
        assert_eq!(kv.len(), 1);
        assert_eq!(kv.get_vector("a").unwrap(), &[2.0]);
        assert_eq!(kv.count("a"), Some(5));
    }

    #[test]
    fn test_similarity_is_symmetric_and_reflexive() {
        let kv = sample();
        for a in kv.keys() {
            assert!((kv.similarity(a, a).unwrap() - 1.0).abs() < 1e-6);
            for b in kv.keys() {
                assert_eq!(kv.similarity(a, b).unwrap(), kv.similarity(b, a).unwrap());
            }
        }
    }

    #[test]
    fn test_similarity_of_zero_vector() {
        let mut kv = KeyedVectors::new(2);
        kv.add("zero", vec![0.0, 0.0], None).unwrap();
        kv.add("one", vec![1.0, 0.0], None).unwrap();
        assert_eq!(kv.similarity("zero", "one").unwrap(), 0.0);
    }

    #[test]
    fn test_most_similar_excludes_seeds_and_sorts() {
        let kv = sample();
        let result = kv.most_similar(&["king"], &[], 10).unwrap();
        assert_eq!(result.len(), 4);
        assert!(result.iter().all(|(token, _)| token != "king"));
        assert_eq!(result[0].0, "man");
        assert_eq!(result.last().unwrap().0, "banana");
        assert!(result.windows(2).all(|w| w[0].1 >= w[1].1));
    }

    #[test]
    fn test_most_similar_respects_topn() {
        let kv = sample();
        assert_eq!(kv.most_similar(&["king"], &[], 2).unwrap().len(), 2);
        assert!(kv.most_similar(&["king"], &[], 0).unwrap().is_empty());
    }

    #[test]
    fn test_analogy() {
        let kv = sample();
        let result = kv.analogy(&["king", "woman"], &["man"], 1).unwrap();
        assert_eq!(result[0].0, "queen");

        let cosmul = kv.most_similar_cosmul(&["king", "woman"], &["man"], 1).unwrap();
        assert_eq!(cosmul[0].0, "queen");
    }

    #[test]
    fn test_analogy_requires_both_sides() {
        let kv = sample();
        assert!(matches!(kv.analogy(&["king"], &[], 1), Err(EmbeddingError::InvalidQuery(_))));
        assert!(matches!(kv.most_similar(&[], &[], 1), Err(EmbeddingError::InvalidQuery(_))));
    }

    #[test]
    fn test_doesnt_match() {
        let kv = sample();
        assert_eq!(kv.doesnt_match(&["king", "queen", "man", "banana"]).unwrap(), "banana");
        assert!(matches!(kv.doesnt_match(&["king"]), Err(EmbeddingError::InvalidQuery(_))));
    }

    #[test]
    fn test_unknown_token_everywhere() {
        let kv = sample();
        let before = kv.clone();
        assert!(matches!(kv.similarity("king", "emperor"), Err(EmbeddingError::UnknownToken(t)) if t == "emperor"));
        assert!(matches!(kv.most_similar(&["emperor"], &[], 3), Err(EmbeddingError::UnknownToken(_))));
        assert!(matches!(kv.analogy(&["king"], &["emperor"], 3), Err(EmbeddingError::UnknownToken(_))));
        assert!(matches!(kv.doesnt_match(&["king", "emperor"]), Err(EmbeddingError::UnknownToken(_))));
        assert_eq!(kv, before);
    }

    #[test]
    fn test_similar_by_vector() {
        let kv = sample();
        let result = kv.similar_by_vector(&[0.9, 0.8, 0.1], 1).unwrap();
        assert_eq!(result[0].0, "king");
        assert!(matches!(kv.similar_by_vector(&[1.0], 1), Err(EmbeddingError::DimensionMismatch { .. })));
    }

    #[test]
    fn test_text_round_trip_is_bit_exact() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vectors.txt");
        let mut kv = KeyedVectors::new(3);
        kv.add("pi", vec![std::f32::consts::PI, -0.0, 1e-38], None).unwrap();
        kv.add("third", vec![1.0 / 3.0, f32::MAX, -2.5e7], None).unwrap();

        kv.save(&path, VectorFormat::Text).unwrap();
        let loaded = KeyedVectors::load(&path, VectorFormat::Text).unwrap();
        assert_eq!(loaded.keys(), kv.keys());
        for (token, vector) in kv.iter() {
            let reloaded = loaded.get_vector(token).unwrap();
            let bits: Vec<u32> = vector.iter().map(|v| v.to_bits()).collect();
            let reloaded_bits: Vec<u32> = reloaded.iter().map(|v| v.to_bits()).collect();
            assert_eq!(bits, reloaded_bits);
        }
        assert_eq!(loaded.count("pi"), None);
    }

    #[test]
    fn test_binary_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vectors.bin");
        let kv = sample();
        kv.save(&path, VectorFormat::Binary).unwrap();
        let loaded = KeyedVectors::load(&path, VectorFormat::Binary).unwrap();
        assert_eq!(loaded.keys(), kv.keys());
        for (token, vector) in kv.iter() {
            assert_eq!(loaded.get_vector(token).unwrap(), vector);
        }
    }

    #[test]
    fn test_format_mismatch_both_ways() {
        let dir = tempfile::tempdir().unwrap();
        let text = dir.path().join("vectors.txt");
        let binary = dir.path().join("vectors.bin");
        let kv = sample();
        kv.save(&text, VectorFormat::Text).unwrap();
        kv.save(&binary, VectorFormat::Binary).unwrap();

        assert!(matches!(
            KeyedVectors::load(&text, VectorFormat::Binary),
            Err(EmbeddingError::FormatMismatch { expected: VectorFormat::Binary, .. })
        ));
        assert!(matches!(
            KeyedVectors::load(&binary, VectorFormat::Text),
            Err(EmbeddingError::FormatMismatch { expected: VectorFormat::Text, .. })
        ));
    }

    #[test]
    fn test_load_rejects_truncated_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.txt");
        std::fs::write(&path, "3 2\nfoo 1 2\nbar 3 4\n").unwrap();
        assert!(matches!(
            KeyedVectors::load(&path, VectorFormat::Text),
            Err(EmbeddingError::FormatMismatch { .. })
        ));
    }

    fn mismatch_reason(path: &Path, format: VectorFormat) -> String {
        match KeyedVectors::load(path, format) {
            Err(EmbeddingError::FormatMismatch { reason, .. }) => reason,
            other => panic!("expected FormatMismatch, got {other:?}"),
        }
    }

    /// `2 2` header, `foo` then `bar`, 30 bytes in total.
    fn binary_bytes() -> Vec<u8> {
        let mut bytes = b"2 2\n".to_vec();
        for (token, vector) in [("foo", [1.0f32, -1.0]), ("bar", [0.5, 2.0])] {
            bytes.extend_from_slice(token.as_bytes());
            bytes.push(b' ');
            vector.iter().for_each(|v| bytes.extend_from_slice(&v.to_le_bytes()));
            bytes.push(b'\n');
        }
        bytes
    }

    #[test]
    fn test_binary_decoder_rejects_damaged_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vectors.bin");
        let intact = binary_bytes();
        std::fs::write(&path, &intact).unwrap();
        assert_eq!(KeyedVectors::load(&path, VectorFormat::Binary).unwrap().keys(), ["foo", "bar"]);

        let mut dropped_newline = intact.clone();
        dropped_newline.pop();
        let mut cut_vector = intact.clone();
        cut_vector.truncate(intact.len() - 2);
        let mut stray_byte = intact.clone();
        stray_byte.push(b'x');
        let cut_token = intact[..19].to_vec();
        let mut overwritten_newline = intact.clone();
        overwritten_newline[16] = b'x';
        let mut repeated_token = intact.clone();
        repeated_token[17..20].copy_from_slice(b"foo");

        for (bytes, expected) in [
            (dropped_newline, "missing record terminator"),
            (cut_vector, "truncated vector"),
            (stray_byte, "trailing data"),
            (cut_token, "truncated token"),
            (overwritten_newline, "entry 0: missing record terminator"),
            (repeated_token, "duplicate tokens"),
        ] {
            std::fs::write(&path, &bytes).unwrap();
            let reason = mismatch_reason(&path, VectorFormat::Binary);
            assert!(reason.contains(expected), "{reason:?} should mention {expected:?}");
        }
    }

    #[test]
    fn test_load_rejects_oversized_headers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corrupt");

        std::fs::write(&path, "18446744073709551615 2\n").unwrap();
        assert!(mismatch_reason(&path, VectorFormat::Text).contains("header declares"));
        std::fs::write(&path, "4000000000 100\nfoo 1\n").unwrap();
        mismatch_reason(&path, VectorFormat::Text);

        std::fs::write(&path, "18446744073709551615 2\nfoo ").unwrap();
        assert!(mismatch_reason(&path, VectorFormat::Binary).contains("truncated vector"));
        std::fs::write(&path, format!("1 {}\nfoo x\n", usize::MAX / 2)).unwrap();
        assert!(mismatch_reason(&path, VectorFormat::Binary).contains("too large"));
    }

    #[test]
    fn test_ranking_tolerates_nan_vectors() {
        let mut kv = KeyedVectors::new(2);
        kv.add("seed", vec![1.0, 0.0], None).unwrap();
        for i in 0..200 {
            let vector = if i % 3 == 0 { vec![f32::NAN, 1.0] } else { vec![1.0, i as f32 / 200.0] };
            kv.add(format!("w{i}"), vector, None).unwrap();
        }

        let nearest = kv.most_similar(&["seed"], &[], 10).unwrap();
        assert_eq!(nearest.len(), 10);
        assert!(nearest.iter().all(|(_, score)| score.is_finite()));
        assert!(nearest.windows(2).all(|w| w[0].1 >= w[1].1));

        let everything = kv.similar_by_vector(&[1.0, 0.0], kv.len()).unwrap();
        let first_nan = everything.iter().position(|(_, score)| score.is_nan()).unwrap();
        assert!(everything[first_nan..].iter().all(|(_, score)| score.is_nan()));

        let cosmul = kv.most_similar_cosmul(&["seed"], &[], 5).unwrap();
        assert!(cosmul.iter().all(|(_, score)| score.is_finite()));
        assert!(kv.analogy(&["seed", "w1"], &["w2"], 5).is_ok());
    }

    #[test]
    fn test_load_missing_path() {
        let err = KeyedVectors::load("no/such/vectors.bin", VectorFormat::Binary).unwrap_err();
        assert!(matches!(err, EmbeddingError::NotFound(_)));
    }

    #[test]
    fn test_format_from_str() {
        assert_eq!("TXT".parse::<VectorFormat>().unwrap(), VectorFormat::Text);
        assert_eq!("binary".parse::<VectorFormat>().unwrap(), VectorFormat::Binary);
        assert!("csv".parse::<VectorFormat>().is_err());
    }
}
