use crate::config::{ReducerConfig, SingleChunkPolicy};
use crate::error::{GenerationError, Result, SummarizeError};
use crate::generation::GenerationPort;
use crate::prompts;
use futures::{Stream, StreamExt, TryStreamExt};
use recap_text_chunker::{ChunkBuilder, ChunkSet, SentenceSource, UnicodeSentenceSource};
use sha2::{Digest, Sha256};
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio_util::sync::CancellationToken;

/// Fragments of the final summary, in emission order
pub type SummaryStream<'a> = Pin<Box<dyn Stream<Item = Result<String>> + Send + 'a>>;

/// Lifecycle of the reducer's single in-flight summary
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReducerState {
    Idle,
    Streaming,
    /// Final summary of the source text whose SHA-256 is `digest`
    Cached { digest: String, summary: Arc<str> },
    Failed { reason: String },
}

impl ReducerState {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Streaming => "streaming",
            Self::Cached { .. } => "cached",
            Self::Failed { .. } => "failed",
        }
    }
}

enum Terminal {
    /// Stream the brief summary of this text
    Summarize(String),
    /// Hand this text back without generation
    Passthrough(String),
}

/// Recursive map-reduce summarizer.
///
/// Each level is chunked; while more than one chunk remains every chunk is
/// summarized (map) and the summaries, joined by newlines, become the next
/// level (reduce). The final single-chunk level is streamed through the
/// brief-summary prompt. The first successful summary is cached per source
/// text.
pub struct Reducer {
    config: ReducerConfig,
    builder: Arc<ChunkBuilder>,
    sentences: Arc<dyn SentenceSource>,
    port: Arc<dyn GenerationPort>,
    state: Mutex<ReducerState>,
    cancel: Mutex<CancellationToken>,
}

impl Reducer {
    /// Create a reducer using the config's chunker and Unicode sentence splitting
    pub fn new(config: ReducerConfig, port: Arc<dyn GenerationPort>) -> Result<Self> {
        let builder = ChunkBuilder::new(config.chunker.clone())?;
        Self::with_parts(
            config,
            Arc::new(builder),
            Arc::new(UnicodeSentenceSource),
            port,
        )
    }

    pub fn with_parts(
        config: ReducerConfig,
        builder: Arc<ChunkBuilder>,
        sentences: Arc<dyn SentenceSource>,
        port: Arc<dyn GenerationPort>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            builder,
            sentences,
            port,
            state: Mutex::new(ReducerState::Idle),
            cancel: Mutex::new(CancellationToken::new()),
        })
    }

    /// Summarize `source_text`, streaming the final answer.
    ///
    /// Cancelled by [`Reducer::cancel`].
    pub fn summarize<'a>(&'a self, source_text: &'a str) -> SummaryStream<'a> {
        let cancel = self.lock_cancel().child_token();
        self.summarize_with_cancel(source_text, cancel)
    }

    /// Summarize `source_text`, aborting when `cancel` fires
    pub fn summarize_with_cancel<'a>(
        &'a self,
        source_text: &'a str,
        cancel: CancellationToken,
    ) -> SummaryStream<'a> {
        Box::pin(async_stream::stream! {
            let digest = digest_of(source_text);
            match self.begin(&digest) {
                Err(e) => {
                    yield Err(e);
                    return;
                }
                Ok(Some(summary)) => {
                    log::debug!("Returning cached summary ({} bytes)", summary.len());
                    yield Ok(summary.to_string());
                    return;
                }
                Ok(None) => {}
            }

            let mut guard = StreamingGuard::new(&self.state);

            let level_text = match self.reduce(source_text, &cancel).await {
                Ok(Terminal::Summarize(text)) => text,
                Ok(Terminal::Passthrough(text)) => {
                    log::info!("Input fits in one chunk; passing it through");
                    guard.finish(digest, &text);
                    yield Ok(text);
                    return;
                }
                Err(e) => {
                    guard.fail(&e);
                    yield Err(e);
                    return;
                }
            };

            let prompt = prompts::brief_summary_prompt(&level_text);
            let started = tokio::select! {
                biased;
                () = cancel.cancelled() => Err(SummarizeError::Cancelled),
                result = self.port.generate_stream(prompts::SYSTEM_MESSAGE, &prompt) => {
                    result.map_err(SummarizeError::from)
                }
            };
            let mut fragments = match started {
                Ok(fragments) => fragments,
                Err(e) => {
                    guard.fail(&e);
                    yield Err(e);
                    return;
                }
            };

            log::info!("Streaming final summary via {}", self.port.name());
            let mut summary = String::new();
            loop {
                let next = tokio::select! {
                    biased;
                    () = cancel.cancelled() => Err(SummarizeError::Cancelled),
                    item = fragments.next() => Ok(item),
                };
                match next {
                    Ok(Some(Ok(fragment))) => {
                        summary.push_str(&fragment);
                        yield Ok(fragment);
                    }
                    Ok(None) => break,
                    Ok(Some(Err(e))) => {
                        let e = SummarizeError::from(e);
                        guard.fail(&e);
                        yield Err(e);
                        return;
                    }
                    Err(e) => {
                        guard.fail(&e);
                        yield Err(e);
                        return;
                    }
                }
            }

            if summary.trim().is_empty() {
                let e = SummarizeError::from(GenerationError::EmptyResponse);
                guard.fail(&e);
                yield Err(e);
                return;
            }
            guard.finish(digest, &summary);
        })
    }

    /// Summarize and collect the full final summary
    pub async fn summarize_to_string(&self, source_text: &str) -> Result<String> {
        self.summarize(source_text)
            .try_fold(String::new(), |mut acc, fragment| async move {
                acc.push_str(&fragment);
                Ok(acc)
            })
            .await
    }

    /// Run map-reduce levels until one chunk remains
    async fn reduce(&self, source_text: &str, cancel: &CancellationToken) -> Result<Terminal> {
        let measure = self.builder.measure();
        let mut level_text = source_text.to_owned();
        let mut level = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(SummarizeError::Cancelled);
            }

            let chunks = self
                .builder
                .chunk_text(&level_text, self.sentences.as_ref())?;
            if chunks.is_empty() {
                return Err(if level == 0 {
                    SummarizeError::EmptyInput
                } else {
                    GenerationError::EmptyResponse.into()
                });
            }

            if let Some(only) = chunks.single() {
                log::info!(
                    "Level {level} fits in one chunk ({} sentences, size {})",
                    only.len(),
                    only.size()
                );
                let passthrough = level == 0
                    && self.config.single_chunk_policy == SingleChunkPolicy::Passthrough;
                return Ok(if passthrough {
                    Terminal::Passthrough(only.text())
                } else {
                    Terminal::Summarize(
                        only.sentences()
                            .iter()
                            .map(|s| s.as_str())
                            .collect::<Vec<_>>()
                            .join("\n"),
                    )
                });
            }

            if level >= self.config.max_depth {
                return Err(SummarizeError::DepthExceeded {
                    max_depth: self.config.max_depth,
                });
            }

            let before = measure.measure(&level_text)?;
            log::info!(
                "Level {level}: {} chunks, size {before}, {}",
                chunks.len(),
                chunks.stats()
            );

            let summaries = self.map_chunks(&chunks, level, cancel).await?;
            let next_text = summaries.join("\n");
            let after = measure.measure(&next_text)?;
            level += 1;

            if after >= before {
                return Err(SummarizeError::NotShrinking {
                    level,
                    before,
                    after,
                });
            }
            log::debug!("Level {level} reduced size {before} -> {after}");
            level_text = next_text;
        }
    }

    /// Summarize every chunk; results keep chunk order regardless of
    /// completion order, and the first failure drops the remaining calls.
    async fn map_chunks(
        &self,
        chunks: &ChunkSet,
        level: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>> {
        let chunk_prompts: Vec<String> = chunks
            .iter()
            .map(|chunk| prompts::chunk_prompt(&chunk.text()))
            .collect();
        let total = chunk_prompts.len();
        let port = Arc::clone(&self.port);

        let mut pending = futures::stream::iter(chunk_prompts.into_iter().enumerate())
            .map(move |(idx, prompt)| {
                let port = Arc::clone(&port);
                async move {
                    log::info!("Summarizing chunk {}/{total} (level {level})", idx + 1);
                    let result = port.generate_once(prompts::SYSTEM_MESSAGE, &prompt).await;
                    (idx, result)
                }
            })
            .buffer_unordered(self.config.map_concurrency);

        // Slots are filled by chunk index; returning early drops the calls
        // still in flight.
        let calls = async move {
            let mut summaries: Vec<Option<String>> = vec![None; total];
            while let Some((idx, result)) = pending.next().await {
                summaries[idx] = Some(result?);
            }
            Ok::<_, SummarizeError>(summaries.into_iter().flatten().collect::<Vec<_>>())
        };

        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(SummarizeError::Cancelled),
            result = calls => result,
        }
    }

    /// Move to `Streaming`, or return the cached summary for `digest`
    fn begin(&self, digest: &str) -> Result<Option<Arc<str>>> {
        let mut state = self.lock_state();
        match &*state {
            ReducerState::Streaming => Err(SummarizeError::Busy),
            ReducerState::Cached {
                digest: cached,
                summary,
            } if cached == digest => Ok(Some(Arc::clone(summary))),
            _ => {
                *state = ReducerState::Streaming;
                Ok(None)
            }
        }
    }

    #[must_use]
    pub fn state(&self) -> ReducerState {
        self.lock_state().clone()
    }

    /// Cached final summary, if the last run succeeded
    #[must_use]
    pub fn cached_summary(&self) -> Option<Arc<str>> {
        match &*self.lock_state() {
            ReducerState::Cached { summary, .. } => Some(Arc::clone(summary)),
            _ => None,
        }
    }

    /// Drop any cached summary or failure. Has no effect while streaming.
    pub fn reset(&self) {
        let mut state = self.lock_state();
        if *state == ReducerState::Streaming {
            log::debug!("Ignoring reset while a summary is streaming");
            return;
        }
        *state = ReducerState::Idle;
    }

    /// Cancel every summarization started with [`Reducer::summarize`].
    ///
    /// Later calls get a fresh token and run normally.
    pub fn cancel(&self) {
        let mut token = self.lock_cancel();
        token.cancel();
        *token = CancellationToken::new();
    }

    #[must_use]
    pub const fn config(&self) -> &ReducerConfig {
        &self.config
    }

    #[must_use]
    pub fn builder(&self) -> &ChunkBuilder {
        &self.builder
    }

    fn lock_state(&self) -> MutexGuard<'_, ReducerState> {
        lock(&self.state)
    }

    fn lock_cancel(&self) -> MutexGuard<'_, CancellationToken> {
        lock(&self.cancel)
    }
}

impl std::fmt::Debug for Reducer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reducer")
            .field("config", &self.config)
            .field("port", &self.port.name())
            .field("state", &self.lock_state().as_str())
            .finish_non_exhaustive()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn digest_of(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hasher
        .finalize()
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect()
}

/// Settles the state when a run ends; a stream dropped mid-way goes back to Idle
struct StreamingGuard<'a> {
    state: &'a Mutex<ReducerState>,
    settled: bool,
}

impl<'a> StreamingGuard<'a> {
    const fn new(state: &'a Mutex<ReducerState>) -> Self {
        Self {
            state,
            settled: false,
        }
    }

    fn settle(&mut self, next: ReducerState) {
        *lock(self.state) = next;
        self.settled = true;
    }

    fn fail(&mut self, err: &SummarizeError) {
        log::warn!("Summarization failed: {err}");
        self.settle(ReducerState::Failed {
            reason: err.to_string(),
        });
    }

    fn finish(&mut self, digest: String, summary: &str) {
        self.settle(ReducerState::Cached {
            digest,
            summary: Arc::from(summary),
        });
    }
}

impl Drop for StreamingGuard<'_> {
    fn drop(&mut self) {
        if !self.settled {
            log::debug!("Summary stream dropped before completion");
            *lock(self.state) = ReducerState::Idle;
        }
    }
}
