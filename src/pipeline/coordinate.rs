//! Concurrency coordinator: run every chunk of a document, fail fast.
//!
//! ## Scheduling
//!
//! Chunks are fed in index order into `buffer_unordered(concurrency)`, so at
//! most `concurrency` chunks of one document are in flight. Each chunk runs
//! in its own `tokio::spawn`ed task that additionally holds a permit of a
//! shared [`Semaphore`], which bounds model calls across every document using
//! the same gate.
//!
//! ## Fail-fast without cancellation
//!
//! The first chunk error is returned immediately and no further chunk is
//! dispatched. Tasks already running are *detached*, not aborted: their model
//! calls finish (and are billed) and their results are dropped.
//!
//! ## Progress
//!
//! Every finished chunk, successful or terminally failed, adds exactly one to
//! the document's completed counter through the store's atomic increment.
//! Increments are tagged with the run epoch read when the run started; a
//! detached task finishing after the document was re-triggered carries a
//! stale epoch and the store discards its increment.

use crate::error::{ExtractionError, ModelInvocationError};
use crate::payload::Payload;
use crate::pipeline::extract::{ExtractionTarget, ExtractionWorker};
use crate::pipeline::segment::Chunk;
use crate::progress::ProgressCallback;
use crate::store::{DocumentId, DocumentStore};
use futures::stream::{self, StreamExt, TryStreamExt};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

/// Runs chunk extractions for documents.
#[derive(Clone)]
pub struct Coordinator {
    worker: ExtractionWorker,
    store: Arc<dyn DocumentStore>,
    gate: Arc<Semaphore>,
    concurrency: usize,
    progress: Option<ProgressCallback>,
}

/// State shared by the chunk tasks of one document.
struct ChunkContext {
    document_id: DocumentId,
    epoch: u64,
    total: usize,
    worker: ExtractionWorker,
    target: Arc<ExtractionTarget>,
    store: Arc<dyn DocumentStore>,
    gate: Arc<Semaphore>,
    progress: Option<ProgressCallback>,
}

impl Coordinator {
    pub fn new(
        worker: ExtractionWorker,
        store: Arc<dyn DocumentStore>,
        gate: Arc<Semaphore>,
        concurrency: usize,
    ) -> Self {
        Self {
            worker,
            store,
            gate,
            concurrency: concurrency.max(1),
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: Option<ProgressCallback>) -> Self {
        self.progress = progress;
        self
    }

    /// Extract every chunk and return the payloads in chunk order.
    ///
    /// `epoch` is the document's run epoch at trigger time; progress is only
    /// recorded while it is current.
    pub async fn run_all(
        &self,
        document_id: DocumentId,
        epoch: u64,
        chunks: Vec<Chunk>,
        target: Arc<ExtractionTarget>,
    ) -> Result<Vec<Payload>, ExtractionError> {
        let ctx = Arc::new(ChunkContext {
            document_id,
            epoch,
            total: chunks.len(),
            worker: self.worker.clone(),
            target,
            store: Arc::clone(&self.store),
            gate: Arc::clone(&self.gate),
            progress: self.progress.clone(),
        });

        let mut results: Vec<(usize, Payload)> = stream::iter(chunks.into_iter().map(|chunk| {
            let ctx = Arc::clone(&ctx);
            let index = chunk.index;
            async move {
                match tokio::spawn(run_chunk(ctx, chunk)).await {
                    Ok(result) => result,
                    Err(e) => Err(ExtractionError {
                        chunk: index,
                        attempts: 0,
                        source: ModelInvocationError::TaskAborted(e.to_string()),
                    }),
                }
            }
        }))
        .buffer_unordered(self.concurrency)
        .try_collect()
        .await?;

        results.sort_by_key(|(index, _)| *index);
        Ok(results.into_iter().map(|(_, payload)| payload).collect())
    }
}

async fn run_chunk(
    ctx: Arc<ChunkContext>,
    chunk: Chunk,
) -> Result<(usize, Payload), ExtractionError> {
    let index = chunk.index;
    let permit = Arc::clone(&ctx.gate)
        .acquire_owned()
        .await
        .map_err(|_| ExtractionError {
            chunk: index,
            attempts: 0,
            source: ModelInvocationError::TaskAborted("concurrency gate closed".into()),
        })?;

    if let Some(ref cb) = ctx.progress {
        cb.on_chunk_start(index, ctx.total);
    }
    debug!(
        document = %ctx.document_id,
        chunk = index,
        blocks = chunk.blocks.len(),
        reference = chunk.reference_count(),
        "dispatching chunk"
    );

    let result = ctx.worker.extract(&chunk, &ctx.target).await;
    drop(permit);

    match ctx
        .store
        .increment_completed_chunks(ctx.document_id, ctx.epoch)
        .await
    {
        Ok(Some(counter)) => debug!(
            document = %ctx.document_id,
            "chunks completed: {}/{}", counter.completed, counter.total
        ),
        Ok(None) => debug!(
            document = %ctx.document_id,
            chunk = index,
            epoch = ctx.epoch,
            "run superseded; progress not recorded"
        ),
        Err(e) => warn!(
            document = %ctx.document_id,
            chunk = index,
            "failed to record chunk progress: {}", e
        ),
    }

    if let Some(ref cb) = ctx.progress {
        match &result {
            Ok(payload) => cb.on_chunk_complete(index, ctx.total, payload.item_count()),
            Err(e) => cb.on_chunk_error(index, ctx.total, &e.to_string()),
        }
    }

    result.map(|payload| (index, payload))
}
