use crate::error::{Result, SummarizeError};
use recap_text_chunker::ChunkerConfig;
use serde::{Deserialize, Serialize};

/// Default recursion cap for the reduce step
pub const DEFAULT_MAX_DEPTH: usize = 8;

/// What to do when the source text already fits in one chunk
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SingleChunkPolicy {
    /// Still run the streamed brief-summary pass over the single chunk
    #[default]
    Summarize,

    /// Return the chunk text unchanged without calling the backend
    Passthrough,
}

/// Configuration for the reducer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReducerConfig {
    /// Chunking used at every reduction level
    pub chunker: ChunkerConfig,

    /// Maximum number of map-reduce levels before giving up
    pub max_depth: usize,

    /// Number of map-step generation calls allowed in flight at once
    pub map_concurrency: usize,

    pub single_chunk_policy: SingleChunkPolicy,
}

impl Default for ReducerConfig {
    fn default() -> Self {
        Self {
            chunker: ChunkerConfig::for_transcripts(),
            max_depth: DEFAULT_MAX_DEPTH,
            map_concurrency: 1,
            single_chunk_policy: SingleChunkPolicy::default(),
        }
    }
}

impl ReducerConfig {
    pub fn validate(&self) -> Result<()> {
        self.chunker.validate()?;

        if self.max_depth == 0 {
            return Err(SummarizeError::invalid_config("max_depth must be at least 1"));
        }
        if self.map_concurrency == 0 {
            return Err(SummarizeError::invalid_config(
                "map_concurrency must be at least 1",
            ));
        }
        Ok(())
    }
}
