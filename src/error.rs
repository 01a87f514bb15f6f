//! Error types for the exam-extract pipeline.
//!
//! The taxonomy follows the layers a failure passes through:
//!
//! * [`ModelInvocationError`]: **Transient**: one model call failed (provider
//!   error, timeout, output that does not fit the schema). Retried locally by
//!   the extraction worker with exponential backoff.
//!
//! * [`ExtractionError`]: **Terminal for a chunk**: every attempt for one chunk
//!   failed. The coordinator treats it as terminal for the whole document.
//!
//! * [`SegmentationError`]: the source material could not be turned into
//!   content blocks (unreadable blob, corrupt PDF). Raised before any chunk is
//!   dispatched.
//!
//! * [`PipelineError`]: **Fatal** for a document job. Everything above
//!   bubbles up into it, together with store and configuration failures.
//!
//! A missing field in a chunk payload is deliberately *not* an error: the
//! merge engine logs it and treats the chunk as contributing nothing.

use crate::store::{DocumentId, ParseStatus};
use thiserror::Error;

/// All fatal errors returned by the pipeline and the job orchestrator.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The document is already being parsed by another job.
    #[error("Document {id} is already being processed; duplicate trigger rejected")]
    AlreadyProcessing { id: DocumentId },

    /// The document has no source text, source file or auxiliary image.
    #[error("Document {id} has no source material to parse")]
    EmptySource { id: DocumentId },

    #[error(transparent)]
    Segmentation(#[from] SegmentationError),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// The configured model provider could not be instantiated.
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    /// Whether the outer job queue should re-enqueue the document after this error.
    ///
    /// Duplicate triggers and configuration mistakes will fail the same way on
    /// every attempt.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            PipelineError::AlreadyProcessing { .. }
                | PipelineError::EmptySource { .. }
                | PipelineError::InvalidConfig(_)
                | PipelineError::ProviderNotConfigured { .. }
        )
    }
}

/// Source material could not be segmented into content blocks.
#[derive(Debug, Error)]
pub enum SegmentationError {
    /// Blob storage could not return the bytes behind a reference.
    #[error("Failed to read '{reference}': {reason}")]
    Unreadable { reference: String, reason: String },

    /// The PDF could not be opened by pdfium.
    #[error("PDF '{reference}' is corrupt: {detail}")]
    CorruptPdf { reference: String, detail: String },

    /// pdfium returned an error while rasterising a page.
    #[error("Rasterisation failed for page {page} of '{reference}': {detail}")]
    RasterisationFailed {
        reference: String,
        page: usize,
        detail: String,
    },

    /// A rendered page could not be re-encoded for submission.
    #[error("Image encoding failed for '{reference}': {detail}")]
    EncodingFailed { reference: String, detail: String },

    /// No pdfium library could be bound.
    #[error("Failed to bind to pdfium library: {0}\nSet PDFIUM_LIB_PATH=/path/to/libpdfium to use an existing copy.")]
    PdfiumUnavailable(String),
}

/// One model call failed. Retried by the extraction worker.
#[derive(Debug, Clone, Error)]
pub enum ModelInvocationError {
    /// Transport or provider-side failure.
    #[error("model provider error: {message}")]
    Provider { message: String },

    /// The call exceeded the per-attempt timeout.
    #[error("model call timed out after {secs}s")]
    Timeout { secs: u64 },

    /// The model answered, but not with a payload matching the schema.
    #[error("model output does not match the schema: {detail}")]
    InvalidOutput { detail: String },

    /// The task running the chunk was cancelled or panicked.
    #[error("extraction task aborted: {0}")]
    TaskAborted(String),
}

/// Every attempt for one chunk failed.
#[derive(Debug, Clone, Error)]
#[error("Chunk {chunk} failed after {attempts} attempt(s): {source}")]
pub struct ExtractionError {
    /// 0-based chunk index.
    pub chunk: usize,
    pub attempts: u32,
    #[source]
    pub source: ModelInvocationError,
}

/// Failure reported by a [`crate::store::DocumentStore`] or [`crate::store::BlobStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Document {0} not found")]
    DocumentNotFound(DocumentId),

    #[error("Blob '{0}' not found")]
    BlobNotFound(String),

    /// The requested status change is not allowed from the current state.
    #[error("Document {id}: illegal status transition {from:?} -> {to:?}")]
    IllegalTransition {
        id: DocumentId,
        from: ParseStatus,
        to: ParseStatus,
    },

    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// A chunk reply could not be decoded into the category payload.
#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("reply is not valid JSON: {0}")]
    NotJson(#[source] serde_json::Error),

    #[error("expected a JSON object at the top level, got {0}")]
    NotAnObject(&'static str),

    #[error("reply does not match the schema: {0}")]
    Malformed(#[source] serde_json::Error),

    /// Solved papers must carry a worked answer for every question.
    #[error("question {index} has no latex_answer")]
    MissingAnswer { index: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extraction_error_display() {
        let e = ExtractionError {
            chunk: 2,
            attempts: 3,
            source: ModelInvocationError::Timeout { secs: 60 },
        };
        let msg = e.to_string();
        assert!(msg.contains("Chunk 2"), "got: {msg}");
        assert!(msg.contains("3 attempt"), "got: {msg}");
        assert!(msg.contains("60s"), "got: {msg}");
    }

    #[test]
    fn extraction_error_converts_into_pipeline_error() {
        let e: PipelineError = ExtractionError {
            chunk: 0,
            attempts: 1,
            source: ModelInvocationError::Provider {
                message: "503".into(),
            },
        }
        .into();
        assert!(matches!(e, PipelineError::Extraction(_)));
        assert!(e.is_retryable());
    }

    #[test]
    fn duplicate_trigger_is_not_retryable() {
        let e = PipelineError::AlreadyProcessing {
            id: DocumentId::new(),
        };
        assert!(!e.is_retryable());
        assert!(e.to_string().contains("already being processed"));
    }

    #[test]
    fn segmentation_error_display() {
        let e = SegmentationError::RasterisationFailed {
            reference: "papers/2023.pdf".into(),
            page: 4,
            detail: "bad xref".into(),
        };
        assert!(e.to_string().contains("page 4"));
        assert!(e.to_string().contains("papers/2023.pdf"));
    }
}
