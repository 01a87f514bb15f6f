//! Job orchestration: the status state machine around a parse, and a queue
//! that re-runs failed documents.
//!
//! ## Lifecycle
//!
//! ```text
//! PENDING ──▶ PROCESSING ──▶ COMPLETED
//!                  │
//!                  └──────▶ FAILED ──▶ (queue retry) ──▶ PROCESSING …
//! ```
//!
//! A trigger for a document already in PROCESSING is rejected. The check is a
//! plain read followed by a write, so two triggers racing through it can both
//! start; the [`JobQueue`] pending set closes that gap for jobs submitted
//! through the same queue.
//!
//! On success the merged payload and COMPLETED status are written together,
//! the sources are detached and their blobs deleted, and a syllabus
//! additionally upserts its units into every attached subject. Those side
//! effects run after the payload is safe; their failures are logged only.
//! On failure the status becomes FAILED and no payload is written.

use crate::category::Category;
use crate::error::PipelineError;
use crate::parse::Pipeline;
use crate::payload::Payload;
use crate::store::{DocumentId, DocumentRecord, ParseStatus, UnitRecord};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

impl Pipeline {
    /// Run one parse job for `id`, driving its status from trigger to
    /// COMPLETED or FAILED.
    pub async fn run(&self, id: DocumentId) -> Result<Payload, PipelineError> {
        let record = self.store.fetch(id).await?;
        if record.status == ParseStatus::Processing {
            warn!(document = %id, "duplicate trigger rejected");
            return Err(PipelineError::AlreadyProcessing { id });
        }
        self.store.update_status(id, ParseStatus::Processing).await?;
        self.store.reset_counters(id).await?;
        info!(document = %id, category = %record.category, "parse job started");

        match self.parse_and_persist(id).await {
            Ok(payload) => {
                info!(document = %id, "parse job completed");
                self.clear_sources(id).await;
                if record.category == Category::Syllabus {
                    self.sync_units(&record, &payload).await;
                }
                Ok(payload)
            }
            Err(e) => {
                error!(document = %id, "parse job failed: {}", e);
                if let Err(status_err) = self.store.update_status(id, ParseStatus::Failed).await {
                    error!(document = %id, "could not mark document failed: {}", status_err);
                }
                Err(e)
            }
        }
    }

    async fn parse_and_persist(&self, id: DocumentId) -> Result<Payload, PipelineError> {
        let payload = self.parse_document(id).await?;
        self.store.persist_result(id, payload.clone()).await?;
        Ok(payload)
    }

    /// Detach the sources and delete their blobs. Irreversible.
    async fn clear_sources(&self, id: DocumentId) {
        let refs = match self.store.clear_sources(id).await {
            Ok(refs) => refs,
            Err(e) => {
                warn!(document = %id, "could not detach sources: {}", e);
                return;
            }
        };
        for reference in refs {
            if let Err(e) = self.blobs.delete(&reference).await {
                warn!(document = %id, "could not delete '{}': {}", reference, e);
            }
        }
    }

    /// Upsert the merged syllabus modules as units of every attached subject.
    async fn sync_units(&self, record: &DocumentRecord, payload: &Payload) {
        let Payload::Syllabus(syllabus) = payload else {
            return;
        };
        let units = unit_records(&syllabus.modules);
        if units.is_empty() {
            return;
        }
        for subject in &record.subjects {
            match self.store.upsert_units(&subject.id, units.clone()).await {
                Ok(()) => info!(
                    document = %record.id,
                    subject = %subject.id,
                    "synced {} unit(s)", units.len()
                ),
                Err(e) => warn!(
                    document = %record.id,
                    subject = %subject.id,
                    "unit sync failed: {}", e
                ),
            }
        }
    }
}

fn unit_records(modules: &[crate::payload::SyllabusModule]) -> Vec<UnitRecord> {
    modules
        .iter()
        .map(|m| UnitRecord {
            number: m.unit,
            name: if m.title.trim().is_empty() {
                format!("Unit {}", m.unit)
            } else {
                m.title.clone()
            },
            topics: m.topics.clone(),
            description: m.topics.join("\n"),
        })
        .collect()
}

// ── Job queue ────────────────────────────────────────────────────────────────

/// Outcome of a queued job after its last attempt.
#[derive(Debug)]
pub struct JobReport {
    pub document_id: DocumentId,
    /// Runs made, including the first.
    pub attempts: u32,
    pub result: Result<Payload, PipelineError>,
}

/// Background queue of parse jobs.
///
/// A document id is accepted once until its job reports; re-submitting it
/// meanwhile is a no-op. A run that fails with a retryable error is re-run up
/// to `job_max_retries` times, waiting `job_retry_base_secs · 2^retry`
/// between runs.
#[derive(Clone)]
pub struct JobQueue {
    tx: mpsc::UnboundedSender<DocumentId>,
    pending: Arc<Mutex<HashSet<DocumentId>>>,
}

impl JobQueue {
    /// Spawn the dispatcher. Reports arrive on the returned receiver, one per
    /// accepted submission. Must be called inside a tokio runtime.
    pub fn start(pipeline: Pipeline) -> (JobQueue, mpsc::UnboundedReceiver<JobReport>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<DocumentId>();
        let (report_tx, report_rx) = mpsc::unbounded_channel();
        let pending: Arc<Mutex<HashSet<DocumentId>>> = Arc::default();

        let dispatch_pending = Arc::clone(&pending);
        tokio::spawn(async move {
            while let Some(id) = rx.recv().await {
                let pipeline = pipeline.clone();
                let report_tx = report_tx.clone();
                let pending = Arc::clone(&dispatch_pending);
                tokio::spawn(async move {
                    let report = drive(&pipeline, id).await;
                    lock(&pending).remove(&id);
                    // The receiver may be gone; the job still ran.
                    let _ = report_tx.send(report);
                });
            }
        });

        (JobQueue { tx, pending }, report_rx)
    }

    /// Enqueue a parse of `id`. Returns `false` if a job for it is already
    /// queued or running, or the dispatcher has stopped.
    pub fn submit(&self, id: DocumentId) -> bool {
        if !lock(&self.pending).insert(id) {
            info!(document = %id, "already queued; submission ignored");
            return false;
        }
        if self.tx.send(id).is_err() {
            lock(&self.pending).remove(&id);
            return false;
        }
        true
    }

    pub fn is_pending(&self, id: DocumentId) -> bool {
        lock(&self.pending).contains(&id)
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn drive(pipeline: &Pipeline, id: DocumentId) -> JobReport {
    let policy = pipeline.config.job_retry_policy();
    let mut attempt = 0;
    loop {
        let result = pipeline.run(id).await;
        match result {
            Err(ref e) if e.is_retryable() && policy.should_retry(attempt) => {
                let delay = policy.delay_for(attempt);
                warn!(
                    document = %id,
                    "job retry {}/{} in {:?}: {}",
                    attempt + 1,
                    policy.max_attempts - 1,
                    delay,
                    e
                );
                pipeline.sleeper.sleep(delay).await;
                attempt += 1;
            }
            result => {
                return JobReport {
                    document_id: id,
                    attempts: attempt + 1,
                    result,
                }
            }
        }
    }
}
