//! # Recap Text Chunker
//!
//! Sentence-aware, size-bounded chunking of long transcripts.
//!
//! ## Philosophy
//!
//! Chunks are built for a language model's context window:
//! - Sentences are never split; a chunk is always whole sentences
//! - Every chunk measures at or below the configured maximum
//! - Neighbouring chunks share a few trailing sentences for continuity
//! - Size is measured with the same tokenizer the model uses, or with a
//!   cheaper word count when no tokenizer is available
//!
//! ## Architecture
//!
//! ```text
//! Source Text
//!     │
//!     ├──> SentenceSource (UAX #29 boundaries)
//!     │
//!     ├──> SizeMeasure (word count | model tokenizer)
//!     │
//!     └──> ChunkBuilder
//!          ├─> Greedy forward packing
//!          ├─> Overlap seeding, trimmed to fit
//!          └─> Emit ChunkSet
//! ```
//!
//! ## Example
//!
//! ```rust
//! use recap_text_chunker::{chunk_text, ChunkerConfig};
//!
//! let text = "The meeting opened at nine. Budgets were reviewed in detail. \
//!             Hiring was postponed until spring. The team agreed to meet again.";
//!
//! let chunks = chunk_text(text, &ChunkerConfig::words(20, 1)).unwrap();
//! for chunk in &chunks {
//!     assert!(chunk.size() <= 20);
//!     println!("{} sentences ({} repeated): {}", chunk.len(), chunk.overlap_len(), chunk.text());
//! }
//! ```

mod chunker;
mod config;
mod error;
mod measure;
mod models;
mod sentence;
mod types;

pub use chunker::{chunk_text, ChunkBuilder, ChunkedText};
pub use config::{ChunkerConfig, SizeMetric, DEFAULT_MAX_WORDS, MIN_MAX_SIZE};
pub use error::{ChunkerError, Result};
pub use measure::{count_words, measure_for, SizeMeasure, TokenizerMeasure, WordCountMeasure};
pub use models::{context_window, KNOWN_MODELS};
pub use sentence::{Language, SentenceSource, UnicodeSentenceSource};
pub use types::{join_sentences, Chunk, ChunkSet, ChunkingStats, Sentence};
