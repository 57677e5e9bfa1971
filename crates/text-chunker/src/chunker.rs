use crate::config::{ChunkerConfig, MIN_MAX_SIZE};
use crate::error::{ChunkerError, Result};
use crate::measure::{measure_for, SizeMeasure};
use crate::sentence::{SentenceSource, UnicodeSentenceSource};
use crate::types::{join_sentences, Chunk, ChunkSet, Sentence};
use once_cell::sync::OnceCell;
use std::sync::Arc;

/// Packs sentences into size-bounded chunks
pub struct ChunkBuilder {
    config: ChunkerConfig,
    max_size: usize,
    measure: Arc<dyn SizeMeasure>,
}

impl ChunkBuilder {
    /// Create a builder whose measure is derived from the config's metric
    pub fn new(config: ChunkerConfig) -> Result<Self> {
        config.validate()?;
        let measure = measure_for(&config.metric)?;
        Self::with_measure(config, measure)
    }

    /// Create a builder with an explicit measure; `config.metric` is ignored
    pub fn with_measure(config: ChunkerConfig, measure: Arc<dyn SizeMeasure>) -> Result<Self> {
        let capacity = measure.capacity();
        if capacity < MIN_MAX_SIZE {
            return Err(ChunkerError::invalid_config(format!(
                "measure '{}' capacity ({capacity}) must be at least {MIN_MAX_SIZE}",
                measure.name()
            )));
        }

        let max_size = config.max_size.unwrap_or(capacity);
        if max_size < MIN_MAX_SIZE {
            return Err(ChunkerError::invalid_config(format!(
                "max_size ({max_size}) must be at least {MIN_MAX_SIZE}"
            )));
        }
        if max_size > capacity {
            return Err(ChunkerError::invalid_config(format!(
                "max_size ({max_size}) exceeds capacity of '{}' ({capacity})",
                measure.name()
            )));
        }

        Ok(Self {
            config,
            max_size,
            measure,
        })
    }

    /// Split `text` with `source` and pack the sentences
    pub fn chunk_text(&self, text: &str, source: &dyn SentenceSource) -> Result<ChunkSet> {
        let sentences = source.split(text, self.config.language);
        self.build(&sentences)
    }

    /// Greedy forward packing of `sentences` into a [`ChunkSet`].
    ///
    /// Fails with [`ChunkerError::OversizedSentence`] if any single sentence
    /// measures larger than the max size; no partial result is returned.
    pub fn build(&self, sentences: &[Sentence]) -> Result<ChunkSet> {
        let mut chunks = Vec::new();
        let mut open = OpenChunk::default();

        for sentence in sentences {
            let own_size = self.measure.measure(sentence.as_str())?;
            if own_size > self.max_size {
                return Err(ChunkerError::oversized(
                    sentence.as_str(),
                    own_size,
                    self.max_size,
                ));
            }

            if open.sentences.is_empty() {
                open.push(sentence, own_size);
                continue;
            }

            let candidate_size = self
                .measure
                .measure(&format!("{} {}", open.text, sentence.as_str()))?;
            if candidate_size <= self.max_size {
                open.push(sentence, candidate_size);
                continue;
            }

            let closed = open.close();
            open = self.seed_next(&closed, sentence, own_size)?;
            log::debug!(
                "Closed chunk {} ({} sentences, size {}), next starts with {} overlap",
                chunks.len() + 1,
                closed.len(),
                closed.size(),
                open.overlap
            );
            chunks.push(closed);
        }

        if !open.sentences.is_empty() {
            chunks.push(open.close());
        }

        let set = ChunkSet::from_chunks(chunks);
        log::debug!(
            "Packed {} sentences with '{}' (max {}): {}",
            sentences.len(),
            self.measure.name(),
            self.max_size,
            set.stats()
        );
        Ok(set)
    }

    /// Start the chunk that follows `closed`, seeded with its trailing
    /// sentences. Seeds are dropped oldest-first until the candidate fits.
    fn seed_next(&self, closed: &Chunk, candidate: &Sentence, own_size: usize) -> Result<OpenChunk> {
        let take = self.config.overlap.min(closed.len());
        let mut seed = &closed.sentences()[closed.len() - take..];

        while !seed.is_empty() {
            let mut sentences = seed.to_vec();
            sentences.push(candidate.clone());
            let text = join_sentences(&sentences);
            let size = self.measure.measure(&text)?;
            if size <= self.max_size {
                return Ok(OpenChunk {
                    overlap: seed.len(),
                    sentences,
                    text,
                    size,
                });
            }
            seed = &seed[1..];
        }

        let mut open = OpenChunk::default();
        open.push(candidate, own_size);
        Ok(open)
    }

    /// Get configuration
    #[must_use]
    pub const fn config(&self) -> &ChunkerConfig {
        &self.config
    }

    /// Effective maximum chunk size
    #[must_use]
    pub const fn max_size(&self) -> usize {
        self.max_size
    }

    #[must_use]
    pub fn measure(&self) -> &Arc<dyn SizeMeasure> {
        &self.measure
    }
}

impl std::fmt::Debug for ChunkBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkBuilder")
            .field("max_size", &self.max_size)
            .field("overlap", &self.config.overlap)
            .field("measure", &self.measure.name())
            .finish()
    }
}

#[derive(Default)]
struct OpenChunk {
    sentences: Vec<Sentence>,
    overlap: usize,
    text: String,
    size: usize,
}

impl OpenChunk {
    fn push(&mut self, sentence: &Sentence, size: usize) {
        if !self.text.is_empty() {
            self.text.push(' ');
        }
        self.text.push_str(sentence.as_str());
        self.sentences.push(sentence.clone());
        self.size = size;
    }

    fn close(self) -> Chunk {
        Chunk::new(self.sentences, self.overlap, self.size)
    }
}

/// A source text whose chunks are computed once and then reused
pub struct ChunkedText {
    source_text: String,
    builder: Arc<ChunkBuilder>,
    sentences: Arc<dyn SentenceSource>,
    chunks: OnceCell<ChunkSet>,
}

impl ChunkedText {
    pub fn new(
        source_text: impl Into<String>,
        builder: Arc<ChunkBuilder>,
        sentences: Arc<dyn SentenceSource>,
    ) -> Self {
        Self {
            source_text: source_text.into(),
            builder,
            sentences,
            chunks: OnceCell::new(),
        }
    }

    #[must_use]
    pub fn source_text(&self) -> &str {
        &self.source_text
    }

    /// Chunks of the source text; computed on first call, cached afterwards
    pub fn chunks(&self) -> Result<&ChunkSet> {
        self.chunks.get_or_try_init(|| {
            self.builder
                .chunk_text(&self.source_text, self.sentences.as_ref())
        })
    }
}

/// Chunk `text` with the default sentence source and the config's metric
pub fn chunk_text(text: &str, config: &ChunkerConfig) -> Result<ChunkSet> {
    ChunkBuilder::new(config.clone())?.chunk_text(text, &UnicodeSentenceSource)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measure::WordCountMeasure;
    use crate::sentence::Language;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn sentences<S: AsRef<str>>(items: &[S]) -> Vec<Sentence> {
        items.iter().map(|s| Sentence::from(s.as_ref())).collect()
    }

    /// Sentence of exactly `n` words
    fn words(tag: &str, n: usize) -> String {
        let mut parts: Vec<String> = (0..n).map(|i| format!("{tag}{i}")).collect();
        if let Some(last) = parts.last_mut() {
            last.push('!');
        }
        // The trailing "!" is its own token; drop one word to compensate.
        parts.remove(0);
        parts.join(" ")
    }

    fn builder(max: usize, overlap: usize) -> ChunkBuilder {
        ChunkBuilder::new(ChunkerConfig::words(max, overlap)).unwrap()
    }

    fn texts(set: &ChunkSet) -> Vec<Vec<String>> {
        set.iter()
            .map(|c| c.sentences().iter().map(|s| s.as_str().to_string()).collect())
            .collect()
    }

    #[test]
    fn test_words_helper() {
        assert_eq!(crate::measure::count_words(&words("a", 10)), 10);
    }

    #[test]
    fn test_empty_input_yields_empty_set() {
        let set = builder(20, 0).build(&[]).unwrap();
        assert!(set.is_empty());

        let set = chunk_text("", &ChunkerConfig::words(20, 1)).unwrap();
        assert!(set.is_empty());
    }

    #[test]
    fn test_small_input_single_chunk() {
        let input = sentences(&["One two.", "Three four."]);
        let set = builder(20, 1).build(&input).unwrap();
        assert_eq!(set.len(), 1);
        let only = set.single().unwrap();
        assert_eq!(only.overlap_len(), 0);
        assert_eq!(only.size(), 6);
        assert_eq!(only.text(), "One two. Three four.");
    }

    #[test]
    fn test_packs_until_next_sentence_overflows() {
        let a = words("a", 8);
        let b = words("b", 8);
        let c = words("c", 8);
        let input = sentences(&[&a, &b, &c]);

        let set = builder(20, 0).build(&input).unwrap();
        assert_eq!(texts(&set), vec![vec![a.clone(), b.clone()], vec![c.clone()]]);
        assert_eq!(set.chunks()[0].size(), 16);
        assert_eq!(set.chunks()[1].size(), 8);
    }

    #[test]
    fn test_exact_fit_is_allowed() {
        let a = words("a", 10);
        let b = words("b", 10);
        let set = builder(20, 0).build(&sentences(&[&a, &b])).unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(set.chunks()[0].size(), 20);
    }

    #[test]
    fn test_overlap_seeds_next_chunk() {
        let parts: Vec<String> = (0..6).map(|i| words(&format!("s{i}x"), 6)).collect();
        let set = builder(20, 1).build(&sentences(&parts)).unwrap();

        assert_eq!(
            texts(&set),
            vec![
                vec![parts[0].clone(), parts[1].clone(), parts[2].clone()],
                vec![parts[2].clone(), parts[3].clone(), parts[4].clone()],
                vec![parts[4].clone(), parts[5].clone()],
            ]
        );
        assert_eq!(set.chunks()[1].overlap_len(), 1);
        assert_eq!(set.chunks()[2].overlap_sentences(), &sentences(&parts[4..5])[..]);
    }

    #[test]
    fn test_overlap_larger_than_chunk_is_trimmed_to_fit() {
        let parts: Vec<String> = (0..4).map(|i| words(&format!("s{i}x"), 9)).collect();
        let set = builder(20, 10).build(&sentences(&parts)).unwrap();

        for chunk in &set {
            assert!(chunk.size() <= 20, "chunk too large: {}", chunk.size());
            assert!(!chunk.fresh_sentences().is_empty());
        }
        assert_eq!(set.chunks()[1].overlap_sentences(), &sentences(&parts[1..2])[..]);
        let fresh: Vec<&Sentence> = set.fresh_sentences().collect();
        assert_eq!(fresh.len(), 4);
    }

    #[test]
    fn test_overlap_dropped_when_nothing_fits() {
        let a = words("a", 15);
        let b = words("b", 15);
        let set = builder(20, 1).build(&sentences(&[&a, &b])).unwrap();
        assert_eq!(texts(&set), vec![vec![a], vec![b]]);
        assert_eq!(set.chunks()[1].overlap_len(), 0);
    }

    #[test]
    fn test_oversized_sentence_rejected() {
        let small = words("a", 5);
        let huge = words("h", 25);
        let err = builder(20, 0)
            .build(&sentences(&[&small, &huge]))
            .unwrap_err();
        match err {
            ChunkerError::OversizedSentence {
                sentence,
                size,
                max_size,
            } => {
                assert_eq!(sentence, huge);
                assert_eq!(size, 25);
                assert_eq!(max_size, 20);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_config_errors_at_construction() {
        assert!(ChunkBuilder::new(ChunkerConfig::words(10, 0))
            .unwrap_err()
            .is_config());

        let config = ChunkerConfig {
            max_size: Some(500),
            ..ChunkerConfig::words(100, 0)
        };
        assert!(ChunkBuilder::new(config).unwrap_err().is_config());
    }

    #[test]
    fn test_max_size_defaults_to_capacity() {
        let config = ChunkerConfig {
            max_size: None,
            ..ChunkerConfig::words(64, 0)
        };
        assert_eq!(ChunkBuilder::new(config).unwrap().max_size(), 64);
    }

    struct CountingSource {
        calls: AtomicUsize,
    }

    impl SentenceSource for CountingSource {
        fn split(&self, text: &str, language: Language) -> Vec<Sentence> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            UnicodeSentenceSource.split(text, language)
        }
    }

    #[test]
    fn test_chunked_text_is_memoized() {
        let source = Arc::new(CountingSource {
            calls: AtomicUsize::new(0),
        });
        let measure = Arc::new(WordCountMeasure::new(20).unwrap());
        let builder =
            Arc::new(ChunkBuilder::with_measure(ChunkerConfig::words(20, 0), measure).unwrap());
        let text = ChunkedText::new("First sentence here. Second one.", builder, source.clone());

        let first = text.chunks().unwrap().clone();
        let second = text.chunks().unwrap();
        assert_eq!(&first, second);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert_eq!(text.source_text(), "First sentence here. Second one.");
    }
}
