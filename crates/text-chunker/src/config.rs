use crate::error::{ChunkerError, Result};
use crate::models;
use crate::sentence::Language;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Smallest maximum chunk size accepted by any metric
pub const MIN_MAX_SIZE: usize = 20;

/// Word ceiling used when nothing else is configured
pub const DEFAULT_MAX_WORDS: usize = 3000;

/// Configuration for chunking behavior
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkerConfig {
    /// Maximum chunk size under the metric (hard limit). Defaults to the
    /// metric capacity when unset.
    pub max_size: Option<usize>,

    /// Number of trailing sentences repeated at the start of the next chunk
    pub overlap: usize,

    /// How chunk size is measured
    pub metric: SizeMetric,

    /// Language tag handed to the sentence source
    pub language: Language,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            max_size: None,
            overlap: 0,
            metric: SizeMetric::default(),
            language: Language::English,
        }
    }
}

impl ChunkerConfig {
    /// Approximate word metric with the given ceiling and overlap
    #[must_use]
    pub fn words(max_words: usize, overlap: usize) -> Self {
        Self {
            max_size: Some(max_words),
            overlap,
            metric: SizeMetric::Words { max_words },
            ..Default::default()
        }
    }

    /// Exact token metric bound to a known model
    #[must_use]
    pub fn tokens(model: impl Into<String>, tokenizer: impl Into<PathBuf>, overlap: usize) -> Self {
        Self {
            max_size: None,
            overlap,
            metric: SizeMetric::Tokens {
                model: model.into(),
                tokenizer: tokenizer.into(),
            },
            ..Default::default()
        }
    }

    /// Config tuned for spoken transcripts fed to a local model
    #[must_use]
    pub fn for_transcripts() -> Self {
        Self::words(1200, 4)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if let Some(max_size) = self.max_size {
            if max_size < MIN_MAX_SIZE {
                return Err(ChunkerError::invalid_config(format!(
                    "max_size ({max_size}) must be at least {MIN_MAX_SIZE}"
                )));
            }
        }

        self.metric.validate()
    }
}

/// Counting strategy plus the capacity ceiling it implies
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SizeMetric {
    /// Approximate word count with an explicit ceiling
    Words { max_words: usize },

    /// Exact token count using a tokenizer file; the ceiling is the model's
    /// context window
    Tokens { model: String, tokenizer: PathBuf },
}

impl Default for SizeMetric {
    fn default() -> Self {
        Self::Words {
            max_words: DEFAULT_MAX_WORDS,
        }
    }
}

impl SizeMetric {
    /// Capacity ceiling implied by this metric, without loading a tokenizer
    pub fn capacity(&self) -> Result<usize> {
        match self {
            Self::Words { max_words } => Ok(*max_words),
            Self::Tokens { model, .. } => models::context_window(model).ok_or_else(|| {
                ChunkerError::invalid_config(format!("Unknown model '{model}'"))
            }),
        }
    }

    pub fn validate(&self) -> Result<()> {
        let capacity = self.capacity()?;
        if capacity < MIN_MAX_SIZE {
            return Err(ChunkerError::invalid_config(format!(
                "metric capacity ({capacity}) must be at least {MIN_MAX_SIZE}"
            )));
        }
        Ok(())
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Words { .. } => "words",
            Self::Tokens { .. } => "tokens",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_valid() {
        assert!(ChunkerConfig::default().validate().is_ok());
        assert!(ChunkerConfig::for_transcripts().validate().is_ok());
    }

    #[test]
    fn test_max_size_floor() {
        let config = ChunkerConfig::words(MIN_MAX_SIZE - 1, 0);
        let err = config.validate().unwrap_err();
        assert!(err.is_config(), "unexpected error: {err}");

        assert!(ChunkerConfig::words(MIN_MAX_SIZE, 0).validate().is_ok());
    }

    #[test]
    fn test_metric_capacity_floor() {
        let config = ChunkerConfig {
            max_size: Some(100),
            metric: SizeMetric::Words { max_words: 5 },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_model_rejected() {
        let config = ChunkerConfig::tokens("no-such-model", "tokenizer.json", 0);
        assert!(matches!(
            config.validate(),
            Err(ChunkerError::InvalidConfig(msg)) if msg.contains("no-such-model")
        ));
    }

    #[test]
    fn test_known_model_capacity() {
        let metric = SizeMetric::Tokens {
            model: "llama3".to_string(),
            tokenizer: PathBuf::from("tokenizer.json"),
        };
        assert_eq!(metric.capacity().unwrap(), 8_192);
    }

    #[test]
    fn test_config_deserializes_with_defaults() {
        let config: ChunkerConfig = from_json(
            r#"{"overlap": 2, "metric": {"kind": "words", "max_words": 500}, "language": "german"}"#,
        );
        assert_eq!(config.overlap, 2);
        assert_eq!(config.max_size, None);
        assert_eq!(config.metric, SizeMetric::Words { max_words: 500 });
        assert_eq!(config.language, Language::German);
    }

    fn from_json(json: &str) -> ChunkerConfig {
        serde_json::from_str(json).unwrap()
    }
}
