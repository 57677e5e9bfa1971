use thiserror::Error;

/// Result type for chunker operations
pub type Result<T> = std::result::Result<T, ChunkerError>;

/// Errors that can occur while measuring or chunking text
#[derive(Error, Debug)]
pub enum ChunkerError {
    /// Invalid configuration (bad max size, unknown model, unknown language)
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A single sentence is larger than any chunk may be
    #[error("Sentence of size {size} exceeds max chunk size {max_size}: {sentence}")]
    OversizedSentence {
        sentence: String,
        size: usize,
        max_size: usize,
    },

    /// Tokenizer failed to load or encode
    #[error("Tokenizer error: {0}")]
    Tokenizer(String),
}

impl ChunkerError {
    /// Create an invalid config error
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a tokenizer error
    pub fn tokenizer(msg: impl Into<String>) -> Self {
        Self::Tokenizer(msg.into())
    }

    /// Create an oversized sentence error
    pub fn oversized(sentence: impl Into<String>, size: usize, max_size: usize) -> Self {
        Self::OversizedSentence {
            sentence: sentence.into(),
            size,
            max_size,
        }
    }

    /// Whether this error comes from configuration rather than input
    #[must_use]
    pub const fn is_config(&self) -> bool {
        matches!(self, Self::InvalidConfig(_))
    }
}
