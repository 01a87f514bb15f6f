//! Whole-document parse: sources in, one merged payload out.
//!
//! [`Pipeline::parse_document`] is the pure part of a job. It reads the
//! document and its sources, runs every chunk through the model and merges
//! the results, but never touches the document's status. The status state
//! machine and the post-success side effects live in [`crate::job`].

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::gateway::{resolve_gateway, ModelGateway};
use crate::payload::Payload;
use crate::pipeline::coordinate::Coordinator;
use crate::pipeline::extract::{ExtractionTarget, ExtractionWorker};
use crate::pipeline::merge::merge;
use crate::pipeline::segment::{chunk, collect_blocks};
use crate::prompts::{self, PromptContext, NO_SUBJECT, NO_SYLLABUS};
use crate::retry::{Sleeper, TokioSleeper};
use crate::schema::schema_for;
use crate::store::{BlobStore, DocumentId, DocumentRecord, DocumentStore};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

/// Everything a parse needs: storage, the model, and the shared model-call gate.
///
/// Cheap to clone; clones share the gate, so the concurrency bound holds
/// across every document parsed through them.
#[derive(Clone)]
pub struct Pipeline {
    pub(crate) store: Arc<dyn DocumentStore>,
    pub(crate) blobs: Arc<dyn BlobStore>,
    gateway: Arc<dyn ModelGateway>,
    pub(crate) config: Arc<PipelineConfig>,
    gate: Arc<Semaphore>,
    pub(crate) sleeper: Arc<dyn Sleeper>,
}

impl Pipeline {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        blobs: Arc<dyn BlobStore>,
        gateway: Arc<dyn ModelGateway>,
        config: PipelineConfig,
    ) -> Self {
        let gate = Arc::new(Semaphore::new(config.concurrency.max(1)));
        Self {
            store,
            blobs,
            gateway,
            config: Arc::new(config),
            gate,
            sleeper: Arc::new(TokioSleeper),
        }
    }

    /// Like [`Pipeline::new`], with the model provider resolved from config
    /// and environment.
    pub fn from_config(
        store: Arc<dyn DocumentStore>,
        blobs: Arc<dyn BlobStore>,
        config: PipelineConfig,
    ) -> Result<Self, PipelineError> {
        let gateway = resolve_gateway(&config)?;
        Ok(Self::new(store, blobs, gateway, config))
    }

    /// Replace the clock used for both retry layers.
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Share a model-call gate with other pipelines.
    pub fn with_gate(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = gate;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Parse one document into its merged payload.
    ///
    /// # Errors
    /// - [`PipelineError::Store`] if the document cannot be fetched
    /// - [`PipelineError::EmptySource`] if the sources yield no content block
    /// - [`PipelineError::Segmentation`] for unreadable or corrupt sources
    /// - [`PipelineError::Extraction`] when a chunk exhausts its attempts
    pub async fn parse_document(&self, id: DocumentId) -> Result<Payload, PipelineError> {
        let start = Instant::now();
        let record = self.store.fetch(id).await?;
        let category = record.category;
        if !record.has_sources() {
            return Err(PipelineError::EmptySource { id });
        }

        // ── Step 1: Prompt ───────────────────────────────────────────────────
        let ctx = self.prompt_context(&record).await?;
        let shape = schema_for(category);
        let system = prompts::system_prompt(
            category,
            record.system_prompt_template.as_deref(),
            &ctx,
            &shape.to_json_schema(),
        );
        let target = Arc::new(ExtractionTarget::new(category, system));

        // ── Step 2: Segment ──────────────────────────────────────────────────
        let blocks = collect_blocks(&record, self.blobs.as_ref(), &self.config).await?;
        if blocks.is_empty() {
            return Err(PipelineError::EmptySource { id });
        }
        let chunks = chunk(&blocks, self.config.chunk_size, self.config.overlap_size);
        let total = chunks.len();
        self.store.set_total_chunks(id, total).await?;
        info!(
            document = %id,
            category = %category,
            "{} block(s) in {} chunk(s)", blocks.len(), total
        );
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_parse_start(total);
        }

        // ── Step 3: Extract ──────────────────────────────────────────────────
        let worker = ExtractionWorker::new(
            Arc::clone(&self.gateway),
            self.config.retry_policy(),
            Arc::clone(&self.sleeper),
            self.config.api_timeout(),
        );
        let coordinator = Coordinator::new(
            worker,
            Arc::clone(&self.store),
            Arc::clone(&self.gate),
            self.config.concurrency,
        )
        .with_progress(self.config.progress_callback.clone());
        let results = coordinator
            .run_all(id, record.run_epoch, chunks, target)
            .await?;

        // ── Step 4: Merge ────────────────────────────────────────────────────
        let merged = merge(category, results);
        info!(
            document = %id,
            "parsed into {} item(s) in {:?}", merged.item_count(), start.elapsed()
        );
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_parse_complete(total, merged.item_count());
        }
        Ok(merged)
    }

    /// Subject context for the prompt, taken from the first attached subject.
    async fn prompt_context(&self, record: &DocumentRecord) -> Result<PromptContext, PipelineError> {
        let Some(subject) = record.subjects.first() else {
            debug!(document = %record.id, "no subject attached");
            return Ok(PromptContext {
                syllabus_reference: Some(NO_SUBJECT.to_string()),
                ..Default::default()
            });
        };

        let mut ctx = PromptContext {
            branch_name: subject.branch.clone(),
            subject_code: Some(subject.code.clone()),
            subject_name: Some(subject.name.clone()),
            syllabus_reference: None,
        };
        if !record.category.wants_syllabus_reference() {
            return Ok(ctx);
        }

        // A missing reference only weakens unit mapping.
        let syllabus = match self.store.find_completed_syllabus(&subject.id).await {
            Ok(found) => found,
            Err(e) => {
                warn!(
                    document = %record.id,
                    subject = %subject.id,
                    "syllabus lookup failed: {}", e
                );
                None
            }
        };
        ctx.syllabus_reference = Some(match syllabus {
            Some(payload) => serde_json::to_string_pretty(&payload)
                .map_err(|e| PipelineError::Internal(format!("syllabus serialisation: {e}")))?,
            None => NO_SYLLABUS.to_string(),
        });
        Ok(ctx)
    }
}
