//! # exam-extract
//!
//! Turn academic source material (exam papers, syllabi, notes, formula
//! sheets) into structured, category-shaped JSON using a multimodal LLM.
//!
//! ## Why chunking?
//!
//! A 40-page scanned paper does not fit in one model call, and a single call
//! that fails late loses everything. The source is cut into small, ordered
//! chunks of content blocks (text slices or page images). Each chunk is
//! extracted on its own with retries, carrying the last block of the previous
//! chunk as read-only context so questions split across a page boundary stay
//! whole. The per-chunk results are then merged with category-specific
//! deduplication.
//!
//! ## Pipeline Overview
//!
//! ```text
//! Document
//!  │
//!  ├─ 1. Prompt    category prompt + subject context + JSON schema
//!  ├─ 2. Segment   text slices, rasterised PDF pages, images → chunks
//!  ├─ 3. Extract   one model call per chunk, bounded concurrency, retries
//!  ├─ 4. Merge     dedup + LaTeX sanitisation, in chunk order
//!  └─ 5. Persist   COMPLETED + payload, sources cleared, units synced
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use exam_extract::{
//!     Category, DocumentRecord, FsBlobStore, MemoryStore, Pipeline, PipelineConfig,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(MemoryStore::new());
//!     let id = store.insert(
//!         DocumentRecord::new("Physics 2023", Category::UnsolvedPaper)
//!             .with_source_file("physics-2023.pdf"),
//!     );
//!
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / GEMINI_API_KEY
//!     let pipeline = Pipeline::from_config(
//!         store.clone(),
//!         Arc::new(FsBlobStore::new(".")),
//!         PipelineConfig::default(),
//!     )?;
//!     let payload = pipeline.run(id).await?;
//!     println!("{}", serde_json::to_string_pretty(&payload)?);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature   | Default | Description |
//! |-----------|---------|-------------|
//! | `cli`     | on      | Enables the `examparse` binary (clap + anyhow + tracing-subscriber + indicatif) |
//! | `bundled` | off     | Embeds the pdfium shared library in the binary |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod category;
pub mod config;
pub mod error;
pub mod gateway;
pub mod job;
pub mod parse;
pub mod payload;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod retry;
pub mod schema;
pub mod store;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use category::Category;
pub use config::{PipelineConfig, PipelineConfigBuilder};
pub use error::{
    ExtractionError, ModelInvocationError, PayloadError, PipelineError, SegmentationError,
    StoreError,
};
pub use gateway::{resolve_gateway, EdgequakeGateway, ModelGateway, ModelReply, ModelRequest};
pub use job::{JobQueue, JobReport};
pub use parse::Pipeline;
pub use payload::Payload;
pub use progress::{NoopProgressCallback, ParseProgressCallback, ProgressCallback};
pub use retry::{RetryPolicy, Sleeper, TokioSleeper};
pub use store::{
    BlobStore, DocumentId, DocumentRecord, DocumentStore, FsBlobStore, MemoryBlobStore,
    MemoryStore, ParseStatus, Subject, UnitRecord,
};
