use crate::error::{ChunkerError, Result};
use crate::types::Sentence;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use unicode_segmentation::UnicodeSegmentation;

static WHITESPACE_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("whitespace pattern is valid"));

/// Language of the source text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Language {
    English,
    German,
    French,
    Spanish,
    Italian,
    Portuguese,
    Dutch,
    Russian,
}

impl Language {
    /// Parse a language name or ISO 639-1 code
    pub fn from_tag(tag: &str) -> Result<Self> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "english" | "en" => Ok(Self::English),
            "german" | "de" => Ok(Self::German),
            "french" | "fr" => Ok(Self::French),
            "spanish" | "es" => Ok(Self::Spanish),
            "italian" | "it" => Ok(Self::Italian),
            "portuguese" | "pt" => Ok(Self::Portuguese),
            "dutch" | "nl" => Ok(Self::Dutch),
            "russian" | "ru" => Ok(Self::Russian),
            other => Err(ChunkerError::invalid_config(format!(
                "Unsupported language: {other}"
            ))),
        }
    }

    /// Get language name as string
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::English => "english",
            Self::German => "german",
            Self::French => "french",
            Self::Spanish => "spanish",
            Self::Italian => "italian",
            Self::Portuguese => "portuguese",
            Self::Dutch => "dutch",
            Self::Russian => "russian",
        }
    }
}

impl Default for Language {
    fn default() -> Self {
        Self::English
    }
}

impl FromStr for Language {
    type Err = ChunkerError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_tag(s)
    }
}

impl TryFrom<String> for Language {
    type Error = ChunkerError;

    fn try_from(value: String) -> Result<Self> {
        Self::from_tag(&value)
    }
}

impl From<Language> for String {
    fn from(value: Language) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Produces the ordered sentences of a text.
///
/// Implementations must be deterministic: the same text and language always
/// yield the same sentences.
pub trait SentenceSource: Send + Sync {
    fn split(&self, text: &str, language: Language) -> Vec<Sentence>;
}

/// Sentence source based on Unicode (UAX #29) sentence boundaries.
///
/// The boundary rules are language independent, so every [`Language`] is
/// handled the same way. Whitespace runs are collapsed to a single space
/// before segmenting, so hard line wraps in a transcript never end a sentence.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnicodeSentenceSource;

impl SentenceSource for UnicodeSentenceSource {
    fn split(&self, text: &str, language: Language) -> Vec<Sentence> {
        // Line breaks are paragraph separators under UAX #29; flatten them first.
        let normalized = WHITESPACE_RUN.replace_all(text.trim(), " ");
        let sentences: Vec<Sentence> = normalized
            .unicode_sentences()
            .map(str::trim)
            .filter(|sentence| !sentence.is_empty())
            .map(Sentence::from)
            .collect();

        log::debug!(
            "Split {} bytes of {language} text into {} sentences",
            text.len(),
            sentences.len()
        );
        sentences
    }
}
