//! CLI binary for exam-extract.
//!
//! A thin shim over the library: builds one document from local inputs,
//! runs the parse job against an in-memory store, and prints the merged JSON.

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::Parser;
use exam_extract::store::is_url;
use exam_extract::{
    BlobStore, Category, DocumentRecord, FsBlobStore, MemoryStore, ParseProgressCallback,
    Pipeline, PipelineConfig, ProgressCallback, StoreError, Subject,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::debug;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Live progress bar plus one log line per finished chunk. Chunks finish out
/// of order, so start times are tracked per chunk.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<usize, Instant>>,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);
        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Reading sources…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
        })
    }

    fn elapsed_secs(&self, chunk: usize) -> f64 {
        self.start_times
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&chunk)
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl ParseProgressCallback for CliProgressCallback {
    fn on_parse_start(&self, total_chunks: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} chunks  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);
        self.bar.set_length(total_chunks as u64);
        self.bar.set_style(style);
        self.bar.set_prefix("Extracting");
        self.bar.reset_eta();
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Extracting {total_chunks} chunk(s)…"))
        ));
    }

    fn on_chunk_start(&self, chunk: usize, _total: usize) {
        self.start_times
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(chunk, Instant::now());
        self.bar.set_message(format!("chunk {}", chunk + 1));
    }

    fn on_chunk_complete(&self, chunk: usize, total: usize, items: usize) {
        let secs = self.elapsed_secs(chunk);
        self.bar.println(format!(
            "  {} Chunk {:>3}/{:<3}  {:<10}  {}",
            green("✓"),
            chunk + 1,
            total,
            dim(&format!("{items:>4} item(s)")),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_chunk_error(&self, chunk: usize, total: usize, error: &str) {
        let secs = self.elapsed_secs(chunk);
        let msg: String = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} Chunk {:>3}/{:<3}  {}  {}",
            red("✗"),
            chunk + 1,
            total,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_parse_complete(&self, total_chunks: usize, merged_items: usize) {
        self.bar.finish_and_clear();
        eprintln!(
            "{} {} chunk(s) merged into {} item(s)",
            green("✔"),
            bold(&total_chunks.to_string()),
            bold(&merged_items.to_string())
        );
    }
}

// ── Blob access ──────────────────────────────────────────────────────────────

/// Reads through to the filesystem but leaves the user's files in place
/// unless `--delete-sources` was given.
struct CliBlobs {
    inner: FsBlobStore,
    delete: bool,
}

#[async_trait]
impl BlobStore for CliBlobs {
    async fn read_bytes(&self, reference: &str) -> Result<Vec<u8>, StoreError> {
        self.inner.read_bytes(reference).await
    }

    async fn delete(&self, reference: &str) -> Result<(), StoreError> {
        if self.delete {
            self.inner.delete(reference).await
        } else {
            debug!("Keeping source '{}'", reference);
            Ok(())
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Parse a scanned question paper (stdout)
  examparse --category unsolved-paper --source physics-2023.pdf

  # Solved paper with subject context, written to a file
  examparse --category solved-paper --source paper.pdf \
            --subject-code PHY101 --subject-name "Engineering Physics" -o paper.json

  # Syllabus from a text export plus two photographed pages
  examparse --category syllabus --text-file syllabus.txt --image p1.jpg --image p2.jpg

  # Use a specific model
  examparse --model gpt-4.1 --provider openai --category notes --source notes.pdf

CATEGORIES:
  solved-paper, unsolved-paper, syllabus, notes, short-notes,
  important-questions, formula-sheet, crash-course-links

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  PDFIUM_LIB_PATH         Path to an existing libpdfium; skips auto-download
"#;

/// Extract structured exam documents from PDFs, images and text with a vision LLM.
#[derive(Parser, Debug)]
#[command(
    name = "examparse",
    version,
    about = "Extract structured exam documents from PDFs, images and text with a vision LLM",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Document category (e.g. solved-paper, syllabus, notes).
    #[arg(long, env = "EXAMPARSE_CATEGORY")]
    category: Category,

    /// Plain-text source file.
    #[arg(long, env = "EXAMPARSE_TEXT_FILE")]
    text_file: Option<PathBuf>,

    /// Source PDF or image: local path or HTTP/HTTPS URL.
    #[arg(long, env = "EXAMPARSE_SOURCE")]
    source: Option<String>,

    /// Auxiliary image, appended after the source. Repeatable.
    #[arg(long = "image")]
    images: Vec<String>,

    /// Write JSON to this file instead of stdout.
    #[arg(short, long, env = "EXAMPARSE_OUTPUT")]
    output: Option<PathBuf>,

    /// Document title.
    #[arg(long, env = "EXAMPARSE_TITLE", default_value = "untitled")]
    title: String,

    /// Subject code, e.g. PHY101.
    #[arg(long, env = "EXAMPARSE_SUBJECT_CODE")]
    subject_code: Option<String>,

    /// Subject name.
    #[arg(long, env = "EXAMPARSE_SUBJECT_NAME")]
    subject_name: Option<String>,

    /// Branch the subject belongs to.
    #[arg(long, env = "EXAMPARSE_BRANCH")]
    branch: Option<String>,

    /// Text file with a system-prompt template replacing the built-in one.
    #[arg(long, env = "EXAMPARSE_PROMPT_TEMPLATE")]
    prompt_template: Option<PathBuf>,

    /// LLM model ID.
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_LLM_PROVIDER")]
    provider: Option<String>,

    /// Blocks per chunk.
    #[arg(long, env = "EXAMPARSE_CHUNK_SIZE", default_value_t = 5)]
    chunk_size: usize,

    /// Reference-only blocks carried over from the previous chunk.
    #[arg(long, env = "EXAMPARSE_OVERLAP", default_value_t = 1)]
    overlap: usize,

    /// Number of concurrent model calls.
    #[arg(short, long, env = "EXAMPARSE_CONCURRENCY", default_value_t = 5)]
    concurrency: usize,

    /// Attempts per chunk, including the first.
    #[arg(long, env = "EXAMPARSE_MAX_ATTEMPTS", default_value_t = 10)]
    max_attempts: u32,

    /// Max LLM output tokens per chunk.
    #[arg(long, env = "EXAMPARSE_MAX_TOKENS", default_value_t = 8192)]
    max_tokens: usize,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "EXAMPARSE_TEMPERATURE", default_value_t = 0.2)]
    temperature: f32,

    /// PDF render scale relative to the page's point size.
    #[arg(long, env = "EXAMPARSE_SCALE", default_value_t = 2.0)]
    scale: f32,

    /// Per-call LLM timeout in seconds.
    #[arg(long, env = "EXAMPARSE_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "EXAMPARSE_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Delete local source files after a successful parse.
    #[arg(long)]
    delete_sources: bool,

    /// Disable progress bar.
    #[arg(long, env = "EXAMPARSE_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "EXAMPARSE_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "EXAMPARSE_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let show_progress = !cli.quiet && !cli.no_progress;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    if cli.text_file.is_none() && cli.source.is_none() && cli.images.is_empty() {
        anyhow::bail!("Nothing to parse: give --text-file, --source or --image");
    }

    // ── Ensure PDFium engine is available ────────────────────────────────
    let needs_pdfium = cli
        .source
        .as_deref()
        .is_some_and(|s| s.to_ascii_lowercase().ends_with(".pdf"));
    if needs_pdfium {
        ensure_pdfium(cli.quiet)?;
    }

    // ── Build document ───────────────────────────────────────────────────
    let record = build_record(&cli).await?;
    let store = Arc::new(MemoryStore::new());
    let id = store.insert(record);

    // ── Build pipeline ───────────────────────────────────────────────────
    let progress: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn ParseProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress)?;
    let blobs = Arc::new(CliBlobs {
        inner: FsBlobStore::new(".").with_download_timeout(cli.download_timeout),
        delete: cli.delete_sources,
    });
    let pipeline =
        Pipeline::from_config(store.clone(), blobs, config).context("Failed to set up the LLM")?;

    // ── Run ──────────────────────────────────────────────────────────────
    let start = Instant::now();
    let payload = pipeline.run(id).await.context("Parse failed")?;
    let json = serde_json::to_string_pretty(&payload).context("Failed to serialise output")?;

    match cli.output {
        Some(ref path) => {
            write_atomic(path, &json).await?;
            if !cli.quiet {
                eprintln!(
                    "{}  {} item(s)  {}ms  →  {}",
                    green("✔"),
                    payload.item_count(),
                    start.elapsed().as_millis(),
                    bold(&path.display().to_string()),
                );
            }
        }
        None => {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            handle
                .write_all(json.as_bytes())
                .and_then(|_| handle.write_all(b"\n"))
                .context("Failed to write to stdout")?;
        }
    }

    Ok(())
}

/// Map CLI args to `PipelineConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<PipelineConfig> {
    let mut builder = PipelineConfig::builder()
        .chunk_size(cli.chunk_size)
        .overlap_size(cli.overlap)
        .concurrency(cli.concurrency)
        .max_attempts(cli.max_attempts)
        .max_tokens(cli.max_tokens)
        .temperature(cli.temperature)
        .pdf_render_scale(cli.scale)
        .api_timeout_secs(cli.api_timeout)
        .download_timeout_secs(cli.download_timeout);
    if let Some(ref model) = cli.model {
        builder = builder.model(model);
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }
    builder.build().context("Invalid configuration")
}

/// Assemble the document record from the input flags.
async fn build_record(cli: &Cli) -> Result<DocumentRecord> {
    let mut record = DocumentRecord::new(cli.title.clone(), cli.category);

    if let Some(ref path) = cli.text_file {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read text from {:?}", path))?;
        record = record.with_source_text(text);
    }
    if let Some(ref source) = cli.source {
        record = record.with_source_file(blob_reference(source).await?);
    }
    for image in &cli.images {
        record = record.with_image(blob_reference(image).await?);
    }
    if let Some(ref path) = cli.prompt_template {
        let template = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read prompt template from {:?}", path))?;
        record = record.with_prompt_template(template);
    }
    if cli.subject_code.is_some() || cli.subject_name.is_some() {
        let code = cli.subject_code.clone().unwrap_or_default();
        record = record.with_subject(Subject {
            id: code.clone(),
            code,
            name: cli.subject_name.clone().unwrap_or_default(),
            branch: cli.branch.clone(),
        });
    }
    Ok(record)
}

/// URLs pass through; local paths become absolute.
async fn blob_reference(input: &str) -> Result<String> {
    if is_url(input) {
        return Ok(input.to_string());
    }
    let path = tokio::fs::canonicalize(input)
        .await
        .with_context(|| format!("Input not found: {input}"))?;
    Ok(path.to_string_lossy().into_owned())
}

/// Write to a sibling temp file, then rename over the target.
async fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {:?}", parent))?;
    }
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, contents)
        .await
        .with_context(|| format!("Failed to write {:?}", tmp))?;
    tokio::fs::rename(&tmp, path)
        .await
        .with_context(|| format!("Failed to move output into place at {:?}", path))?;
    Ok(())
}

/// Make sure a pdfium library can be bound before the first PDF is rendered.
fn ensure_pdfium(quiet: bool) -> Result<()> {
    #[cfg(feature = "bundled")]
    {
        let _ = quiet;
        tokio::task::block_in_place(pdfium_auto::ensure_pdfium_bundled)
            .context("Failed to extract bundled PDFium engine")?;
        Ok(())
    }

    #[cfg(not(feature = "bundled"))]
    {
        if pdfium_auto::is_pdfium_cached() {
            return Ok(());
        }
        if quiet {
            tokio::task::block_in_place(|| pdfium_auto::ensure_pdfium_library(None))
                .context("Failed to download PDFium engine")?;
            return Ok(());
        }

        let dl_bar = ProgressBar::new(0);
        dl_bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.cyan} {prefix:.bold}  \
                 [{bar:42.green/238}] {bytes}/{total_bytes}  ETA {eta_precise}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏  ")
            .tick_strings(TICKS),
        );
        dl_bar.set_prefix("PDF engine");
        dl_bar.enable_steady_tick(Duration::from_millis(80));

        let bar = dl_bar.clone();
        tokio::task::block_in_place(|| {
            pdfium_auto::ensure_pdfium_library(Some(&|downloaded, total| {
                if let Some(t) = total {
                    if bar.length().unwrap_or(0) != t {
                        bar.set_length(t);
                    }
                }
                bar.set_position(downloaded);
            }))
        })
        .context("Failed to download PDFium engine")?;
        dl_bar.finish_with_message("ready ✓");
        Ok(())
    }
}
