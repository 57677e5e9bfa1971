//! # Recap Reducer
//!
//! Recursive map-reduce summarization of long transcripts.
//!
//! ## Architecture
//!
//! ```text
//! Source Text
//!     │
//!     ├──> ChunkBuilder → ChunkSet
//!     │
//!     ├──> more than one chunk?
//!     │    ├─> Map: generate_once per chunk (ordered, bounded concurrency)
//!     │    ├─> Join summaries with "\n"
//!     │    └─> Re-chunk the joined level (must shrink, depth-capped)
//!     │
//!     └──> Final level: generate_stream with the brief-summary prompt
//!          └─> Fragments forwarded to the caller and cached
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use futures::StreamExt;
//! use recap_reducer::{BackendConfig, Reducer, ReducerConfig};
//!
//! # async fn run(transcript: &str) -> Result<(), Box<dyn std::error::Error>> {
//! let port = BackendConfig::default().build()?;
//! let reducer = Reducer::new(ReducerConfig::default(), port)?;
//!
//! let mut summary = reducer.summarize(transcript);
//! while let Some(fragment) = summary.next().await {
//!     print!("{}", fragment?);
//! }
//! # Ok(())
//! # }
//! ```

pub mod backend;
mod config;
mod error;
mod generation;
pub mod prompts;
mod reducer;

pub use backend::{BackendConfig, BackendKind, OllamaConfig, OpenAiConfig, RetryPolicy};
pub use config::{ReducerConfig, SingleChunkPolicy, DEFAULT_MAX_DEPTH};
pub use error::{GenerationError, Result, SummarizeError};
pub use generation::{FragmentStream, GenerationPort};
pub use reducer::{Reducer, ReducerState, SummaryStream};
