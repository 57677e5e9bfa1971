use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// An atomic unit of text produced by a sentence source.
///
/// Sentences are never split. Cloning shares the underlying buffer, so
/// duplicating overlap sentences across chunk boundaries is cheap.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Sentence(Arc<str>);

impl Sentence {
    #[must_use]
    pub fn new(text: impl Into<Arc<str>>) -> Self {
        Self(text.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl AsRef<str> for Sentence {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Sentence {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Sentence {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl fmt::Display for Sentence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Join sentences the way chunk text is measured and rendered.
#[must_use]
pub fn join_sentences(sentences: &[Sentence]) -> String {
    let mut out = String::with_capacity(sentences.iter().map(|s| s.as_str().len() + 1).sum());
    for (idx, sentence) in sentences.iter().enumerate() {
        if idx > 0 {
            out.push(' ');
        }
        out.push_str(sentence.as_str());
    }
    out
}

/// An ordered, non-empty group of sentences whose measured size fits the
/// configured maximum.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Sentences in original order, overlap seeds first
    sentences: Vec<Sentence>,

    /// Number of leading sentences repeated from the previous chunk
    overlap: usize,

    /// Measured size of the joined sentences
    size: usize,
}

impl Chunk {
    pub(crate) fn new(sentences: Vec<Sentence>, overlap: usize, size: usize) -> Self {
        debug_assert!(!sentences.is_empty(), "chunks are never empty");
        debug_assert!(overlap < sentences.len(), "a chunk always adds a new sentence");
        Self {
            sentences,
            overlap,
            size,
        }
    }

    #[must_use]
    pub fn sentences(&self) -> &[Sentence] {
        &self.sentences
    }

    /// Sentences that are not duplicated from the previous chunk
    #[must_use]
    pub fn fresh_sentences(&self) -> &[Sentence] {
        &self.sentences[self.overlap..]
    }

    /// Leading sentences seeded from the previous chunk
    #[must_use]
    pub fn overlap_sentences(&self) -> &[Sentence] {
        &self.sentences[..self.overlap]
    }

    #[must_use]
    pub const fn overlap_len(&self) -> usize {
        self.overlap
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sentences.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sentences.is_empty()
    }

    /// Measured size under the metric the chunk was built with
    #[must_use]
    pub const fn size(&self) -> usize {
        self.size
    }

    #[must_use]
    pub fn text(&self) -> String {
        join_sentences(&self.sentences)
    }
}

/// The ordered chunks covering one input text.
///
/// Built once per input and never edited afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkSet {
    chunks: Vec<Chunk>,
}

impl ChunkSet {
    pub(crate) fn from_chunks(chunks: Vec<Chunk>) -> Self {
        Self { chunks }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    #[must_use]
    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    #[must_use]
    pub fn get(&self, idx: usize) -> Option<&Chunk> {
        self.chunks.get(idx)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Chunk> {
        self.chunks.iter()
    }

    /// The single chunk when the whole input fits in one
    #[must_use]
    pub fn single(&self) -> Option<&Chunk> {
        match self.chunks.as_slice() {
            [only] => Some(only),
            _ => None,
        }
    }

    /// Input sentences in original order, with overlap duplicates skipped
    pub fn fresh_sentences(&self) -> impl Iterator<Item = &Sentence> {
        self.chunks.iter().flat_map(Chunk::fresh_sentences)
    }

    /// Rendered text of each chunk, in order
    #[must_use]
    pub fn texts(&self) -> Vec<String> {
        self.chunks.iter().map(Chunk::text).collect()
    }

    #[must_use]
    pub fn stats(&self) -> ChunkingStats {
        let sizes = || self.chunks.iter().map(Chunk::size);
        let total_size: usize = sizes().sum();
        ChunkingStats {
            total_chunks: self.chunks.len(),
            total_sentences: self.chunks.iter().map(Chunk::len).sum(),
            unique_sentences: self.fresh_sentences().count(),
            total_size,
            avg_size_per_chunk: if self.chunks.is_empty() {
                0
            } else {
                total_size / self.chunks.len()
            },
            min_size: sizes().min().unwrap_or(0),
            max_size: sizes().max().unwrap_or(0),
        }
    }

    #[must_use]
    pub fn into_inner(self) -> Vec<Chunk> {
        self.chunks
    }
}

impl<'a> IntoIterator for &'a ChunkSet {
    type Item = &'a Chunk;
    type IntoIter = std::slice::Iter<'a, Chunk>;

    fn into_iter(self) -> Self::IntoIter {
        self.chunks.iter()
    }
}

impl IntoIterator for ChunkSet {
    type Item = Chunk;
    type IntoIter = std::vec::IntoIter<Chunk>;

    fn into_iter(self) -> Self::IntoIter {
        self.chunks.into_iter()
    }
}

/// Statistics about a chunk set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChunkingStats {
    pub total_chunks: usize,
    pub total_sentences: usize,
    pub unique_sentences: usize,
    pub total_size: usize,
    pub avg_size_per_chunk: usize,
    pub min_size: usize,
    pub max_size: usize,
}

impl fmt::Display for ChunkingStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Chunks: {} | Sentences: {} ({} unique) | Size: {} | Avg: {} | Range: {}-{}",
            self.total_chunks,
            self.total_sentences,
            self.unique_sentences,
            self.total_size,
            self.avg_size_per_chunk,
            self.min_size,
            self.max_size
        )
    }
}
