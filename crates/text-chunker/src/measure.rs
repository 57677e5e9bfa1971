use crate::config::{SizeMetric, MIN_MAX_SIZE};
use crate::error::{ChunkerError, Result};
use crate::models;
use std::path::Path;
use std::sync::Arc;
use tokenizers::Tokenizer;
use unicode_segmentation::UnicodeSegmentation;

/// Measures the size of text under one counting strategy.
///
/// Implementations must be monotonic: appending sentences to a text never
/// makes it measure smaller.
pub trait SizeMeasure: Send + Sync {
    /// Size of `text` in the metric's units
    fn measure(&self, text: &str) -> Result<usize>;

    /// Ceiling no chunk may exceed under this metric
    fn capacity(&self) -> usize;

    /// Short label used in logs
    fn name(&self) -> &str;
}

/// Build the measure described by a metric
pub fn measure_for(metric: &SizeMetric) -> Result<Arc<dyn SizeMeasure>> {
    match metric {
        SizeMetric::Words { max_words } => Ok(Arc::new(WordCountMeasure::new(*max_words)?)),
        SizeMetric::Tokens { model, tokenizer } => {
            Ok(Arc::new(TokenizerMeasure::from_file(model, tokenizer)?))
        }
    }
}

fn check_capacity(capacity: usize) -> Result<usize> {
    if capacity < MIN_MAX_SIZE {
        return Err(ChunkerError::invalid_config(format!(
            "measure capacity ({capacity}) must be at least {MIN_MAX_SIZE}"
        )));
    }
    Ok(capacity)
}

/// Count word tokens the way a word tokenizer would: every non-whitespace
/// Unicode word-boundary segment is one token, so punctuation counts too.
#[must_use]
pub fn count_words(text: &str) -> usize {
    text.split_word_bounds()
        .filter(|segment| !segment.trim().is_empty())
        .count()
}

/// Approximate metric: word and punctuation tokens
#[derive(Debug, Clone, Copy)]
pub struct WordCountMeasure {
    capacity: usize,
}

impl WordCountMeasure {
    pub fn new(capacity: usize) -> Result<Self> {
        Ok(Self {
            capacity: check_capacity(capacity)?,
        })
    }
}

impl SizeMeasure for WordCountMeasure {
    fn measure(&self, text: &str) -> Result<usize> {
        Ok(count_words(text))
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn name(&self) -> &str {
        "words"
    }
}

/// Exact metric: tokens produced by a model's tokenizer
pub struct TokenizerMeasure {
    label: String,
    tokenizer: Tokenizer,
    capacity: usize,
}

impl TokenizerMeasure {
    /// Load a `tokenizer.json` for a known model
    pub fn from_file(model: &str, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let capacity = Self::capacity_for(model)?;
        if !path.exists() {
            return Err(ChunkerError::invalid_config(format!(
                "Tokenizer for '{model}' not found at {}",
                path.display()
            )));
        }
        let tokenizer = Tokenizer::from_file(path).map_err(|e| {
            ChunkerError::tokenizer(format!("Failed to load {}: {e}", path.display()))
        })?;
        Self::build(model, tokenizer, capacity)
    }

    /// Build from an in-memory `tokenizer.json`
    pub fn from_bytes(model: &str, bytes: impl AsRef<[u8]>) -> Result<Self> {
        let capacity = Self::capacity_for(model)?;
        let tokenizer = Tokenizer::from_bytes(bytes)
            .map_err(|e| ChunkerError::tokenizer(format!("Tokenizer load failed: {e}")))?;
        Self::build(model, tokenizer, capacity)
    }

    fn capacity_for(model: &str) -> Result<usize> {
        let window = models::context_window(model)
            .ok_or_else(|| ChunkerError::invalid_config(format!("Unknown model '{model}'")))?;
        check_capacity(window)
    }

    fn build(model: &str, tokenizer: Tokenizer, capacity: usize) -> Result<Self> {
        // Chunking measures many short strings; thread fan-out only adds contention.
        if !tokenizers::utils::parallelism::is_parallelism_configured() {
            tokenizers::utils::parallelism::set_parallelism(false);
        }

        log::info!("Loaded tokenizer for '{model}' (context window {capacity})");
        Ok(Self {
            label: format!("tokens:{model}"),
            tokenizer,
            capacity,
        })
    }
}

impl SizeMeasure for TokenizerMeasure {
    fn measure(&self, text: &str) -> Result<usize> {
        self.tokenizer
            .encode(text, false)
            .map(|encoding| encoding.len())
            .map_err(|e| ChunkerError::tokenizer(format!("Tokenization failed: {e}")))
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn name(&self) -> &str {
        &self.label
    }
}

impl std::fmt::Debug for TokenizerMeasure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenizerMeasure")
            .field("label", &self.label)
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Word-level tokenizer that splits on whitespace and punctuation.
    pub(crate) const WORD_LEVEL_TOKENIZER: &str = r#"{
        "version": "1.0",
        "truncation": null,
        "padding": null,
        "added_tokens": [],
        "normalizer": null,
        "pre_tokenizer": { "type": "Whitespace" },
        "post_processor": null,
        "decoder": null,
        "model": {
            "type": "WordLevel",
            "vocab": { "[UNK]": 0, "the": 1, "cat": 2, "sat": 3, "." : 4 },
            "unk_token": "[UNK]"
        }
    }"#;

    #[test]
    fn test_count_words() {
        assert_eq!(count_words(""), 0);
        assert_eq!(count_words("   "), 0);
        assert_eq!(count_words("Hello world"), 2);
        assert_eq!(count_words("Hello, world!"), 4);
        assert_eq!(count_words("It's fine."), 2 + 1);
    }

    #[test]
    fn test_word_count_is_monotonic() {
        let a = "The cat sat on the mat.";
        let b = "It was, apparently, comfortable.";
        let joined = format!("{a} {b}");
        assert!(count_words(&joined) >= count_words(a));
        assert_eq!(count_words(&joined), count_words(a) + count_words(b));
    }

    #[test]
    fn test_word_measure_capacity_floor() {
        assert!(WordCountMeasure::new(MIN_MAX_SIZE - 1).is_err());
        let measure = WordCountMeasure::new(100).unwrap();
        assert_eq!(measure.capacity(), 100);
        assert_eq!(measure.measure("one two three").unwrap(), 3);
        assert_eq!(measure.name(), "words");
    }

    #[test]
    fn test_tokenizer_measure_counts_tokens() {
        let measure = TokenizerMeasure::from_bytes("llama3", WORD_LEVEL_TOKENIZER).unwrap();
        assert_eq!(measure.capacity(), 8_192);
        assert_eq!(measure.measure("the cat sat.").unwrap(), 4);
        assert_eq!(measure.measure("the dog barked").unwrap(), 3);
        assert_eq!(measure.name(), "tokens:llama3");
    }

    #[test]
    fn test_tokenizer_measure_unknown_model() {
        let err = TokenizerMeasure::from_bytes("mystery-model", WORD_LEVEL_TOKENIZER).unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn test_tokenizer_measure_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = TokenizerMeasure::from_file("llama3", dir.path().join("tokenizer.json"))
            .unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn test_tokenizer_measure_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokenizer.json");
        std::fs::write(&path, WORD_LEVEL_TOKENIZER).unwrap();

        let measure = measure_for(&SizeMetric::Tokens {
            model: "gpt-4".to_string(),
            tokenizer: path,
        })
        .unwrap();
        assert_eq!(measure.capacity(), 8_192);
        assert_eq!(measure.measure("the cat").unwrap(), 2);
    }
}
