use recap_text_chunker::ChunkerError;
use thiserror::Error;

/// Result type for summarization
pub type Result<T> = std::result::Result<T, SummarizeError>;

/// Failures reported by a text-generation backend
#[derive(Error, Debug)]
pub enum GenerationError {
    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Response body was not the expected JSON
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Backend answered with a non-success status
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Backend reported an error inside an otherwise successful response
    #[error("Backend error: {0}")]
    Backend(String),

    /// Blocking call produced no text
    #[error("Backend returned an empty response")]
    EmptyResponse,

    /// Streamed body could not be framed into lines
    #[error("Stream error: {0}")]
    Stream(String),
}

impl GenerationError {
    /// Whether a fresh attempt might succeed (connection, timeout, 429, 5xx)
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e.status().is_some_and(|s| {
                        s == reqwest::StatusCode::TOO_MANY_REQUESTS || s.is_server_error()
                    })
            }
            Self::Api { status, .. } => *status == 429 || (500..600).contains(status),
            Self::Json(_)
            | Self::Backend(_)
            | Self::EmptyResponse
            | Self::Stream(_) => false,
        }
    }
}

/// Errors returned by the reducer
#[derive(Error, Debug)]
pub enum SummarizeError {
    /// Invalid reducer configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Chunking failed (bad chunker config or an oversized sentence)
    #[error(transparent)]
    Chunking(#[from] ChunkerError),

    /// A generation call failed or returned unusable output
    #[error("Generation failed: {0}")]
    Generation(#[from] GenerationError),

    /// Source text contains no sentences
    #[error("Nothing to summarize: source text is empty")]
    EmptyInput,

    /// Summaries at a level were not smaller than their input
    #[error("Reduction level {level} did not shrink (size {before} -> {after})")]
    NotShrinking {
        level: usize,
        before: usize,
        after: usize,
    },

    /// Recursion reached the configured depth without converging
    #[error("Reduction exceeded max depth {max_depth}")]
    DepthExceeded { max_depth: usize },

    #[error("Summarization cancelled")]
    Cancelled,

    /// Another summarization is already streaming on this reducer
    #[error("A summarization is already in progress")]
    Busy,
}

impl SummarizeError {
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Whether the failure came from the generation side of the pipeline
    #[must_use]
    pub const fn is_generation_failure(&self) -> bool {
        matches!(
            self,
            Self::Generation(_) | Self::NotShrinking { .. } | Self::DepthExceeded { .. }
        )
    }
}
