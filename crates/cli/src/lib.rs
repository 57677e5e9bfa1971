use anyhow::{Context as AnyhowContext, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use futures::StreamExt;
use recap_reducer::{BackendKind, Reducer, SingleChunkPolicy};
use recap_text_chunker::{
    chunk_text, ChunkSet, ChunkerConfig, ChunkingStats, Language, SizeMetric, DEFAULT_MAX_WORDS,
    KNOWN_MODELS,
};
use serde::Serialize;
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

mod config;

pub use config::{RecapConfig, DEFAULT_CONFIG_FILE};

fn print_stdout(text: &str) -> Result<()> {
    let mut stdout = io::stdout().lock();
    if let Err(err) = stdout
        .write_all(text.as_bytes())
        .and_then(|_| stdout.write_all(b"\n"))
        .and_then(|_| stdout.flush())
    {
        if err.kind() == io::ErrorKind::BrokenPipe {
            return Ok(());
        }
        return Err(err.into());
    }
    Ok(())
}

#[derive(Parser)]
#[command(name = "recap")]
#[command(about = "Chunk and summarize long transcripts with a local or hosted LLM", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (defaults to ./recap.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode: log only warnings/errors
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Split a transcript into size-bounded, sentence-aligned chunks
    Chunk(ChunkArgs),

    /// Summarize a transcript, streaming the final summary to stdout
    Summarize(SummarizeArgs),

    /// List known models and their context windows
    Models(ModelsArgs),
}

#[derive(Copy, Clone, ValueEnum)]
enum MetricArg {
    Words,
    Tokens,
}

#[derive(Copy, Clone, ValueEnum)]
enum BackendArg {
    Ollama,
    Openai,
}

impl From<BackendArg> for BackendKind {
    fn from(value: BackendArg) -> Self {
        match value {
            BackendArg::Ollama => Self::Ollama,
            BackendArg::Openai => Self::OpenAi,
        }
    }
}

#[derive(Args)]
struct ChunkingArgs {
    /// Maximum chunk size under the selected metric
    #[arg(long)]
    max_size: Option<usize>,

    /// Sentences repeated at the start of the next chunk
    #[arg(long)]
    overlap: Option<usize>,

    /// How chunk size is measured
    #[arg(long, value_enum)]
    metric: Option<MetricArg>,

    /// tokenizer.json used by the token metric
    #[arg(long)]
    tokenizer: Option<PathBuf>,

    /// Transcript language (name or ISO code)
    #[arg(long)]
    language: Option<String>,
}

impl ChunkingArgs {
    /// Layer flags over `config`. `model` bounds the token metric.
    fn apply(&self, config: &mut ChunkerConfig, model: Option<&str>) -> Result<()> {
        if let Some(overlap) = self.overlap {
            config.overlap = overlap;
        }
        if let Some(language) = &self.language {
            config.language = Language::from_tag(language)?;
        }
        if let Some(max_size) = self.max_size {
            config.max_size = Some(max_size);
        }

        match self.metric {
            Some(MetricArg::Tokens) => {
                let model = model
                    .map(str::to_string)
                    .or_else(|| match &config.metric {
                        SizeMetric::Tokens { model, .. } => Some(model.clone()),
                        SizeMetric::Words { .. } => None,
                    })
                    .context("--metric tokens requires --model")?;
                let tokenizer = self
                    .tokenizer
                    .clone()
                    .or_else(|| match &config.metric {
                        SizeMetric::Tokens { tokenizer, .. } => Some(tokenizer.clone()),
                        SizeMetric::Words { .. } => None,
                    })
                    .context("--metric tokens requires --tokenizer")?;
                if self.max_size.is_none() && matches!(config.metric, SizeMetric::Words { .. }) {
                    config.max_size = None;
                }
                config.metric = SizeMetric::Tokens { model, tokenizer };
            }
            Some(MetricArg::Words) | None => {
                if let SizeMetric::Words { max_words } = &mut config.metric {
                    if let Some(max_size) = self.max_size {
                        *max_words = max_size;
                    }
                } else if self.metric.is_some() {
                    config.metric = SizeMetric::Words {
                        max_words: config.max_size.unwrap_or(DEFAULT_MAX_WORDS),
                    };
                }
            }
        }
        Ok(())
    }
}

#[derive(Args)]
struct ChunkArgs {
    /// Transcript file ("-" or omitted reads stdin)
    input: Option<PathBuf>,

    #[command(flatten)]
    chunking: ChunkingArgs,

    /// Model whose context window bounds the token metric
    #[arg(long)]
    model: Option<String>,

    /// Output JSON format
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct SummarizeArgs {
    /// Transcript file ("-" or omitted reads stdin)
    input: Option<PathBuf>,

    /// Generation backend
    #[arg(long, value_enum)]
    backend: Option<BackendArg>,

    /// Generation model (also bounds the token metric)
    #[arg(long)]
    model: Option<String>,

    /// Backend endpoint (Ollama host or OpenAI base URL)
    #[arg(long)]
    endpoint: Option<String>,

    /// Chunk summaries requested in parallel
    #[arg(long)]
    concurrency: Option<usize>,

    /// Maximum number of map-reduce levels
    #[arg(long)]
    max_depth: Option<usize>,

    /// Return a transcript that fits one chunk unchanged
    #[arg(long)]
    passthrough: bool,

    #[command(flatten)]
    chunking: ChunkingArgs,
}

#[derive(Args)]
struct ModelsArgs {
    /// Output JSON format
    #[arg(long)]
    json: bool,
}

#[derive(Serialize)]
struct ChunkOutput<'a> {
    index: usize,
    size: usize,
    overlap: usize,
    sentences: Vec<&'a str>,
    text: String,
}

#[derive(Serialize)]
struct ChunkReport<'a> {
    metric: &'static str,
    max_size: Option<usize>,
    stats: ChunkingStats,
    chunks: Vec<ChunkOutput<'a>>,
}

#[derive(Serialize)]
struct ModelOutput {
    model: &'static str,
    context_window: usize,
}

pub async fn main_entry() -> Result<()> {
    let mut cli = Cli::parse();

    // stdout carries JSON; keep logs down to warnings
    let json_output = match &cli.command {
        Commands::Chunk(args) => args.json,
        Commands::Models(args) => args.json,
        Commands::Summarize(_) => false,
    };
    if json_output {
        cli.quiet = true;
    }

    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if cli.quiet {
        builder.filter_level(log::LevelFilter::Warn);
    } else if cli.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.target(env_logger::Target::Stderr).init();

    match cli.command {
        Commands::Chunk(args) => run_chunk(args, cli.config.as_deref()),
        Commands::Summarize(args) => run_summarize(args, cli.config.as_deref()).await,
        Commands::Models(args) => run_models(&args),
    }
}

fn load_config(path: Option<&Path>) -> Result<RecapConfig> {
    let mut config = RecapConfig::load(path)?;
    config.apply_env()?;
    Ok(config)
}

/// Read the transcript from `input`, or stdin for `-` / no argument
fn read_input(input: Option<&Path>) -> Result<String> {
    match input {
        Some(path) if path != Path::new("-") => fs::read_to_string(path)
            .with_context(|| format!("Failed to read transcript {}", path.display())),
        _ => {
            let mut buffer = String::new();
            io::stdin()
                .read_to_string(&mut buffer)
                .context("Failed to read transcript from stdin")?;
            Ok(buffer)
        }
    }
}

fn run_chunk(args: ChunkArgs, config_path: Option<&Path>) -> Result<()> {
    let mut config = load_config(config_path)?.reducer.chunker;
    args.chunking.apply(&mut config, args.model.as_deref())?;

    let text = read_input(args.input.as_deref())?;
    let chunks = chunk_text(&text, &config).context("Chunking failed")?;
    let stats = chunks.stats();

    if args.json {
        let report = ChunkReport {
            metric: config.metric.as_str(),
            max_size: config.max_size,
            stats,
            chunks: chunk_outputs(&chunks),
        };
        print_stdout(&serde_json::to_string_pretty(&report)?)?;
    } else {
        print_stdout(&render_chunks(&chunks, config.metric.as_str()))?;
        log::info!("{stats}");
    }
    Ok(())
}

fn chunk_outputs(chunks: &ChunkSet) -> Vec<ChunkOutput<'_>> {
    chunks
        .iter()
        .enumerate()
        .map(|(index, chunk)| ChunkOutput {
            index,
            size: chunk.size(),
            overlap: chunk.overlap_len(),
            sentences: chunk.sentences().iter().map(|s| s.as_str()).collect(),
            text: chunk.text(),
        })
        .collect()
}

fn render_chunks(chunks: &ChunkSet, unit: &str) -> String {
    let mut out = String::new();
    for (idx, chunk) in chunks.iter().enumerate() {
        if idx > 0 {
            out.push_str("\n\n");
        }
        out.push_str(&format!(
            "--- chunk {} ({} {unit}, {} overlap) ---\n{}",
            idx + 1,
            chunk.size(),
            chunk.overlap_len(),
            chunk.text()
        ));
    }
    out
}

async fn run_summarize(args: SummarizeArgs, config_path: Option<&Path>) -> Result<()> {
    let mut config = load_config(config_path)?;

    if let Some(backend) = args.backend {
        config.backend.kind = backend.into();
    }
    if let Some(model) = &args.model {
        config.backend.set_model(model.clone());
    }
    if let Some(endpoint) = &args.endpoint {
        config.backend.set_endpoint(endpoint.clone());
    }
    if let Some(concurrency) = args.concurrency {
        config.reducer.map_concurrency = concurrency;
    }
    if let Some(max_depth) = args.max_depth {
        config.reducer.max_depth = max_depth;
    }
    if args.passthrough {
        config.reducer.single_chunk_policy = SingleChunkPolicy::Passthrough;
    }
    let model = config.backend.model().to_string();
    args.chunking.apply(&mut config.reducer.chunker, Some(&model))?;

    let text = read_input(args.input.as_deref())?;

    let port = config
        .backend
        .build()
        .context("Failed to create generation backend")?;
    log::info!("Summarizing with {}", port.name());
    let reducer = Reducer::new(config.reducer, port)?;

    let mut summary = reducer.summarize(&text);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut interrupted = false;
    let mut stdout = io::stdout();

    loop {
        tokio::select! {
            fragment = summary.next() => match fragment {
                Some(Ok(fragment)) => {
                    if let Err(err) = write_fragment(&mut stdout, &fragment) {
                        if err.kind() == io::ErrorKind::BrokenPipe {
                            reducer.cancel();
                            return Ok(());
                        }
                        return Err(err.into());
                    }
                }
                Some(Err(err)) => return Err(err).context("Summarization failed"),
                None => break,
            },
            _ = &mut ctrl_c, if !interrupted => {
                log::warn!("Interrupted; cancelling summarization");
                interrupted = true;
                reducer.cancel();
            }
        }
    }

    print_stdout("")
}

fn write_fragment(out: &mut impl Write, fragment: &str) -> io::Result<()> {
    out.write_all(fragment.as_bytes())?;
    out.flush()
}

fn run_models(args: &ModelsArgs) -> Result<()> {
    if args.json {
        let models: Vec<ModelOutput> = KNOWN_MODELS
            .iter()
            .map(|&(model, context_window)| ModelOutput {
                model,
                context_window,
            })
            .collect();
        return print_stdout(&serde_json::to_string_pretty(&models)?);
    }

    let width = KNOWN_MODELS
        .iter()
        .map(|(model, _)| model.len())
        .max()
        .unwrap_or(0);
    let table = KNOWN_MODELS
        .iter()
        .map(|(model, window)| format!("{model:<width$}  {window}"))
        .collect::<Vec<_>>()
        .join("\n");
    print_stdout(&table)
}
