//! Persistence seams: the document repository and blob storage.
//!
//! The pipeline never talks to a database or a bucket directly. It reads and
//! writes documents through [`DocumentStore`] and fetches raw bytes through
//! [`BlobStore`]; the host application supplies real implementations. The
//! in-memory ones here back the CLI and the tests.
//!
//! ## Why an increment primitive?
//!
//! Chunks finish concurrently. A read-modify-write of the whole record from
//! each task would lose updates, so the store exposes
//! [`DocumentStore::increment_completed_chunks`] and implementations must make
//! it atomic (a single `UPDATE … SET completed = completed + 1` in SQL, a
//! locked field update here).
//!
//! Chunk tasks of a failed run are detached, not aborted, so they can finish
//! after the document was re-triggered. Every counter reset therefore starts a
//! new run epoch, and an increment carrying an older epoch is discarded
//! (`… WHERE run_epoch = $2` in SQL).

use crate::category::Category;
use crate::error::StoreError;
use crate::payload::Payload;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

// ── Document model ───────────────────────────────────────────────────────────

/// Identifier of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(pub Uuid);

impl DocumentId {
    /// A fresh random id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for DocumentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Parse status of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ParseStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl ParseStatus {
    /// Allowed edges: any idle state → PROCESSING, PROCESSING → COMPLETED | FAILED.
    ///
    /// Re-parsing a COMPLETED or FAILED document is allowed.
    pub fn can_transition_to(self, to: ParseStatus) -> bool {
        use ParseStatus::*;
        matches!(
            (self, to),
            (Pending | Completed | Failed, Processing) | (Processing, Completed | Failed)
        )
    }
}

/// A subject the document belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    pub id: String,
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub branch: Option<String>,
}

/// A completed/total pair polled by the UI.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counter {
    pub completed: usize,
    pub total: usize,
}

/// Everything the pipeline knows about a document.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentRecord {
    pub id: DocumentId,
    pub title: String,
    pub category: Category,
    pub status: ParseStatus,
    pub source_text: Option<String>,
    /// Blob reference of a PDF or a single image.
    pub source_file: Option<String>,
    /// Blob references, in declared order.
    pub auxiliary_images: Vec<String>,
    /// Overrides the built-in category prompt when set.
    pub system_prompt_template: Option<String>,
    /// The first subject provides the prompt context.
    pub subjects: Vec<Subject>,
    pub chunk_progress: Counter,
    /// Bumped by every counter reset; chunk progress is only recorded for the
    /// current epoch.
    pub run_epoch: u64,
    /// Owned by the image recreation stage; only reset here.
    pub recreation_progress: Counter,
    /// Set only together with [`ParseStatus::Completed`].
    pub structured_data: Option<Payload>,
}

impl DocumentRecord {
    pub fn new(title: impl Into<String>, category: Category) -> Self {
        Self {
            id: DocumentId::new(),
            title: title.into(),
            category,
            status: ParseStatus::Pending,
            source_text: None,
            source_file: None,
            auxiliary_images: Vec::new(),
            system_prompt_template: None,
            subjects: Vec::new(),
            chunk_progress: Counter::default(),
            run_epoch: 0,
            recreation_progress: Counter::default(),
            structured_data: None,
        }
    }

    pub fn with_source_text(mut self, text: impl Into<String>) -> Self {
        self.source_text = Some(text.into());
        self
    }

    pub fn with_source_file(mut self, reference: impl Into<String>) -> Self {
        self.source_file = Some(reference.into());
        self
    }

    pub fn with_image(mut self, reference: impl Into<String>) -> Self {
        self.auxiliary_images.push(reference.into());
        self
    }

    pub fn with_subject(mut self, subject: Subject) -> Self {
        self.subjects.push(subject);
        self
    }

    pub fn with_prompt_template(mut self, template: impl Into<String>) -> Self {
        self.system_prompt_template = Some(template.into());
        self
    }

    /// Whether any source material is attached.
    pub fn has_sources(&self) -> bool {
        self.source_text.as_deref().is_some_and(|t| !t.is_empty())
            || self.source_file.is_some()
            || !self.auxiliary_images.is_empty()
    }
}

/// A syllabus unit attached to a subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitRecord {
    pub number: i64,
    pub name: String,
    pub topics: Vec<String>,
    /// Topics joined by newlines.
    pub description: String,
}

// ── Traits ───────────────────────────────────────────────────────────────────

/// Document repository used by the job orchestrator.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn fetch(&self, id: DocumentId) -> Result<DocumentRecord, StoreError>;

    /// Change the status, enforcing [`ParseStatus::can_transition_to`].
    async fn update_status(&self, id: DocumentId, status: ParseStatus) -> Result<(), StoreError>;

    /// Reset both counter pairs to (0, 0) and start a new run epoch.
    async fn reset_counters(&self, id: DocumentId) -> Result<(), StoreError>;

    async fn set_total_chunks(&self, id: DocumentId, total: usize) -> Result<(), StoreError>;

    /// Atomically add one finished chunk of run `epoch`, never exceeding the
    /// total.
    ///
    /// Returns `None`, changing nothing, when `epoch` is no longer the
    /// document's current run.
    async fn increment_completed_chunks(
        &self,
        id: DocumentId,
        epoch: u64,
    ) -> Result<Option<Counter>, StoreError>;

    /// Store the merged payload and mark the document COMPLETED in one write.
    async fn persist_result(&self, id: DocumentId, payload: Payload) -> Result<(), StoreError>;

    /// Detach the source text, file and auxiliary images.
    ///
    /// Returns the blob references that were detached so the caller can
    /// delete them.
    async fn clear_sources(&self, id: DocumentId) -> Result<Vec<String>, StoreError>;

    /// Create or replace units of a subject, keyed by unit number.
    /// All units are written or none.
    async fn upsert_units(&self, subject_id: &str, units: Vec<UnitRecord>)
        -> Result<(), StoreError>;

    /// Payload of a COMPLETED syllabus document attached to the subject.
    async fn find_completed_syllabus(&self, subject_id: &str)
        -> Result<Option<Payload>, StoreError>;
}

/// Raw bytes behind a blob reference.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn read_bytes(&self, reference: &str) -> Result<Vec<u8>, StoreError>;

    /// Deleting a missing blob is not an error.
    async fn delete(&self, reference: &str) -> Result<(), StoreError>;
}

// ── In-memory document store ─────────────────────────────────────────────────

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// [`DocumentStore`] held in process memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    documents: Mutex<HashMap<DocumentId, DocumentRecord>>,
    units: Mutex<HashMap<String, BTreeMap<i64, UnitRecord>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a document, returning its id.
    pub fn insert(&self, record: DocumentRecord) -> DocumentId {
        let id = record.id;
        lock(&self.documents).insert(id, record);
        id
    }

    /// Snapshot of a document.
    pub fn get(&self, id: DocumentId) -> Option<DocumentRecord> {
        lock(&self.documents).get(&id).cloned()
    }

    /// Units of a subject, ordered by unit number.
    pub fn units(&self, subject_id: &str) -> Vec<UnitRecord> {
        lock(&self.units)
            .get(subject_id)
            .map(|u| u.values().cloned().collect())
            .unwrap_or_default()
    }

    fn with_document<R>(
        &self,
        id: DocumentId,
        f: impl FnOnce(&mut DocumentRecord) -> Result<R, StoreError>,
    ) -> Result<R, StoreError> {
        let mut docs = lock(&self.documents);
        let doc = docs.get_mut(&id).ok_or(StoreError::DocumentNotFound(id))?;
        f(doc)
    }
}

fn transition(doc: &mut DocumentRecord, to: ParseStatus) -> Result<(), StoreError> {
    if !doc.status.can_transition_to(to) {
        return Err(StoreError::IllegalTransition {
            id: doc.id,
            from: doc.status,
            to,
        });
    }
    doc.status = to;
    Ok(())
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn fetch(&self, id: DocumentId) -> Result<DocumentRecord, StoreError> {
        self.get(id).ok_or(StoreError::DocumentNotFound(id))
    }

    async fn update_status(&self, id: DocumentId, status: ParseStatus) -> Result<(), StoreError> {
        self.with_document(id, |doc| transition(doc, status))
    }

    async fn reset_counters(&self, id: DocumentId) -> Result<(), StoreError> {
        self.with_document(id, |doc| {
            doc.chunk_progress = Counter::default();
            doc.recreation_progress = Counter::default();
            doc.run_epoch = doc.run_epoch.wrapping_add(1);
            Ok(())
        })
    }

    async fn set_total_chunks(&self, id: DocumentId, total: usize) -> Result<(), StoreError> {
        self.with_document(id, |doc| {
            doc.chunk_progress.total = total;
            doc.chunk_progress.completed = doc.chunk_progress.completed.min(total);
            Ok(())
        })
    }

    async fn increment_completed_chunks(
        &self,
        id: DocumentId,
        epoch: u64,
    ) -> Result<Option<Counter>, StoreError> {
        self.with_document(id, |doc| {
            if doc.run_epoch != epoch {
                return Ok(None);
            }
            let c = &mut doc.chunk_progress;
            c.completed = (c.completed + 1).min(c.total);
            Ok(Some(*c))
        })
    }

    async fn persist_result(&self, id: DocumentId, payload: Payload) -> Result<(), StoreError> {
        self.with_document(id, |doc| {
            transition(doc, ParseStatus::Completed)?;
            doc.structured_data = Some(payload);
            Ok(())
        })
    }

    async fn clear_sources(&self, id: DocumentId) -> Result<Vec<String>, StoreError> {
        self.with_document(id, |doc| {
            doc.source_text = None;
            let mut refs: Vec<String> = doc.source_file.take().into_iter().collect();
            refs.append(&mut doc.auxiliary_images);
            Ok(refs)
        })
    }

    async fn upsert_units(
        &self,
        subject_id: &str,
        units: Vec<UnitRecord>,
    ) -> Result<(), StoreError> {
        let mut all = lock(&self.units);
        let entry = all.entry(subject_id.to_string()).or_default();
        for unit in units {
            entry.insert(unit.number, unit);
        }
        Ok(())
    }

    async fn find_completed_syllabus(
        &self,
        subject_id: &str,
    ) -> Result<Option<Payload>, StoreError> {
        let docs = lock(&self.documents);
        Ok(docs
            .values()
            .filter(|d| d.category == Category::Syllabus && d.status == ParseStatus::Completed)
            .filter(|d| d.subjects.iter().any(|s| s.id == subject_id))
            .find_map(|d| d.structured_data.clone()))
    }
}

// ── Blob stores ──────────────────────────────────────────────────────────────

/// [`BlobStore`] held in process memory.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, reference: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        lock(&self.blobs).insert(reference.into(), bytes.into());
    }

    pub fn contains(&self, reference: &str) -> bool {
        lock(&self.blobs).contains_key(reference)
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn read_bytes(&self, reference: &str) -> Result<Vec<u8>, StoreError> {
        lock(&self.blobs)
            .get(reference)
            .cloned()
            .ok_or_else(|| StoreError::BlobNotFound(reference.to_string()))
    }

    async fn delete(&self, reference: &str) -> Result<(), StoreError> {
        lock(&self.blobs).remove(reference);
        Ok(())
    }
}

/// Check if a blob reference is a URL.
pub fn is_url(reference: &str) -> bool {
    reference.starts_with("http://") || reference.starts_with("https://")
}

/// [`BlobStore`] over a local directory. `http(s)://` references are
/// downloaded instead and can't be deleted.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
    download_timeout: Duration,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            download_timeout: Duration::from_secs(120),
        }
    }

    pub fn with_download_timeout(mut self, secs: u64) -> Self {
        self.download_timeout = Duration::from_secs(secs);
        self
    }

    /// Resolve a relative reference under the root; absolute paths are used as is.
    fn resolve(&self, reference: &str) -> Result<PathBuf, StoreError> {
        let path = Path::new(reference);
        if path.components().any(|c| matches!(c, Component::ParentDir)) {
            return Err(StoreError::Backend(format!(
                "blob reference '{reference}' escapes the storage root"
            )));
        }
        Ok(if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        })
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, StoreError> {
        info!("Downloading blob from: {}", url);
        let failed = |reason: String| StoreError::Backend(format!("download of {url} failed: {reason}"));

        let client = reqwest::Client::builder()
            .timeout(self.download_timeout)
            .build()
            .map_err(|e| failed(e.to_string()))?;

        let response = client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                failed(format!("timed out after {}s", self.download_timeout.as_secs()))
            } else {
                failed(e.to_string())
            }
        })?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(StoreError::BlobNotFound(url.to_string()));
        }
        if !response.status().is_success() {
            return Err(failed(format!("HTTP {}", response.status())));
        }

        let bytes = response.bytes().await.map_err(|e| failed(e.to_string()))?;
        debug!("Downloaded {} bytes from {}", bytes.len(), url);
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn read_bytes(&self, reference: &str) -> Result<Vec<u8>, StoreError> {
        if is_url(reference) {
            return self.download(reference).await;
        }
        let path = self.resolve(reference)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::BlobNotFound(reference.to_string()))
            }
            Err(e) => Err(StoreError::Backend(format!(
                "failed to read {}: {e}",
                path.display()
            ))),
        }
    }

    async fn delete(&self, reference: &str) -> Result<(), StoreError> {
        if is_url(reference) {
            debug!("Leaving remote blob in place: {}", reference);
            return Ok(());
        }
        let path = self.resolve(reference)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::Backend(format!(
                "failed to delete {}: {e}",
                path.display()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::{Formula, FormulaSheetPayload, SyllabusPayload};
    use std::sync::Arc;

    fn subject(id: &str) -> Subject {
        Subject {
            id: id.into(),
            code: "EC-401".into(),
            name: "Signals".into(),
            branch: Some("Electronics".into()),
        }
    }

    #[test]
    fn status_transitions() {
        use ParseStatus::*;
        assert!(Pending.can_transition_to(Processing));
        assert!(Failed.can_transition_to(Processing));
        assert!(Completed.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Completed));
        assert!(Processing.can_transition_to(Failed));
        assert!(!Pending.can_transition_to(Completed));
        assert!(!Processing.can_transition_to(Processing));
        assert!(!Failed.can_transition_to(Completed));
    }

    #[tokio::test]
    async fn persist_requires_processing() {
        let store = MemoryStore::new();
        let id = store.insert(DocumentRecord::new("f", Category::FormulaSheet));
        let payload = Payload::empty(Category::FormulaSheet);

        let err = store.persist_result(id, payload.clone()).await.unwrap_err();
        assert!(matches!(err, StoreError::IllegalTransition { .. }));
        assert!(store.get(id).unwrap().structured_data.is_none());

        store.update_status(id, ParseStatus::Processing).await.unwrap();
        store.persist_result(id, payload.clone()).await.unwrap();
        let doc = store.get(id).unwrap();
        assert_eq!(doc.status, ParseStatus::Completed);
        assert_eq!(doc.structured_data, Some(payload));
    }

    #[tokio::test]
    async fn increment_never_exceeds_total() {
        let store = MemoryStore::new();
        let id = store.insert(DocumentRecord::new("n", Category::Notes));
        store.set_total_chunks(id, 2).await.unwrap();
        for _ in 0..5 {
            store.increment_completed_chunks(id, 0).await.unwrap();
        }
        assert_eq!(
            store.get(id).unwrap().chunk_progress,
            Counter {
                completed: 2,
                total: 2
            }
        );
    }

    #[tokio::test]
    async fn concurrent_increments_are_not_lost() {
        let store = Arc::new(MemoryStore::new());
        let id = store.insert(DocumentRecord::new("n", Category::Notes));
        store.set_total_chunks(id, 64).await.unwrap();

        let handles: Vec<_> = (0..64)
            .map(|_| {
                let store = Arc::clone(&store);
                tokio::spawn(async move { store.increment_completed_chunks(id, 0).await })
            })
            .collect();
        for h in handles {
            h.await.unwrap().unwrap();
        }
        assert_eq!(store.get(id).unwrap().chunk_progress.completed, 64);
    }

    #[tokio::test]
    async fn reset_clears_both_counter_pairs() {
        let store = MemoryStore::new();
        let mut doc = DocumentRecord::new("n", Category::Notes);
        doc.chunk_progress = Counter {
            completed: 3,
            total: 3,
        };
        doc.recreation_progress = Counter {
            completed: 1,
            total: 4,
        };
        let id = store.insert(doc);
        store.reset_counters(id).await.unwrap();
        let doc = store.get(id).unwrap();
        assert_eq!(doc.chunk_progress, Counter::default());
        assert_eq!(doc.recreation_progress, Counter::default());
        assert_eq!(doc.run_epoch, 1);
    }

    #[tokio::test]
    async fn increment_from_a_previous_run_is_discarded() {
        let store = MemoryStore::new();
        let id = store.insert(DocumentRecord::new("n", Category::Notes));
        store.set_total_chunks(id, 2).await.unwrap();
        let old = store.get(id).unwrap().run_epoch;

        store.reset_counters(id).await.unwrap();
        store.set_total_chunks(id, 2).await.unwrap();
        let current = store.get(id).unwrap().run_epoch;
        assert_ne!(old, current);

        assert_eq!(store.increment_completed_chunks(id, old).await.unwrap(), None);
        assert_eq!(store.get(id).unwrap().chunk_progress.completed, 0);

        let counter = store.increment_completed_chunks(id, current).await.unwrap();
        assert_eq!(
            counter,
            Some(Counter {
                completed: 1,
                total: 2
            })
        );
    }

    #[tokio::test]
    async fn clear_sources_returns_blob_refs() {
        let store = MemoryStore::new();
        let id = store.insert(
            DocumentRecord::new("p", Category::SolvedPaper)
                .with_source_text("text")
                .with_source_file("papers/2022.pdf")
                .with_image("figs/1.png")
                .with_image("figs/2.png"),
        );
        let refs = store.clear_sources(id).await.unwrap();
        assert_eq!(refs, vec!["papers/2022.pdf", "figs/1.png", "figs/2.png"]);
        let doc = store.get(id).unwrap();
        assert!(!doc.has_sources());
    }

    #[tokio::test]
    async fn upsert_replaces_by_unit_number() {
        let store = MemoryStore::new();
        let unit = |n: i64, name: &str| UnitRecord {
            number: n,
            name: name.into(),
            topics: vec![],
            description: String::new(),
        };
        store
            .upsert_units("s1", vec![unit(1, "Old"), unit(2, "Two")])
            .await
            .unwrap();
        store.upsert_units("s1", vec![unit(1, "New")]).await.unwrap();
        let units = store.units("s1");
        assert_eq!(units.len(), 2);
        assert_eq!(units[0].name, "New");
        assert!(store.units("other").is_empty());
    }

    #[tokio::test]
    async fn completed_syllabus_lookup_is_scoped_to_subject() {
        let store = MemoryStore::new();
        let mut syllabus =
            DocumentRecord::new("syl", Category::Syllabus).with_subject(subject("s1"));
        syllabus.status = ParseStatus::Completed;
        syllabus.structured_data = Some(Payload::Syllabus(SyllabusPayload::default()));
        store.insert(syllabus);

        let mut pending = DocumentRecord::new("syl2", Category::Syllabus).with_subject(subject("s2"));
        pending.structured_data = Some(Payload::FormulaSheet(FormulaSheetPayload {
            formulas: vec![Formula {
                name: "x".into(),
                latex: "x".into(),
            }],
        }));
        store.insert(pending);

        assert!(store.find_completed_syllabus("s1").await.unwrap().is_some());
        assert!(store.find_completed_syllabus("s2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn missing_document_is_reported() {
        let store = MemoryStore::new();
        let id = DocumentId::new();
        assert!(matches!(
            store.fetch(id).await,
            Err(StoreError::DocumentNotFound(missing)) if missing == id
        ));
    }

    #[tokio::test]
    async fn memory_blob_store_roundtrip() {
        let blobs = MemoryBlobStore::new();
        blobs.put("a.png", vec![1u8, 2, 3]);
        assert_eq!(blobs.read_bytes("a.png").await.unwrap(), vec![1, 2, 3]);
        blobs.delete("a.png").await.unwrap();
        blobs.delete("a.png").await.unwrap();
        assert!(matches!(
            blobs.read_bytes("a.png").await,
            Err(StoreError::BlobNotFound(_))
        ));
    }

    #[tokio::test]
    async fn fs_blob_store_reads_and_deletes() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("scans")).unwrap();
        std::fs::write(dir.path().join("scans/p1.jpg"), b"jpeg").unwrap();

        let blobs = FsBlobStore::new(dir.path());
        assert_eq!(blobs.read_bytes("scans/p1.jpg").await.unwrap(), b"jpeg");
        blobs.delete("scans/p1.jpg").await.unwrap();
        assert!(!dir.path().join("scans/p1.jpg").exists());
        assert!(matches!(
            blobs.read_bytes("scans/p1.jpg").await,
            Err(StoreError::BlobNotFound(_))
        ));
    }

    #[tokio::test]
    async fn fs_blob_store_rejects_parent_components() {
        let dir = tempfile::tempdir().unwrap();
        let blobs = FsBlobStore::new(dir.path());
        assert!(matches!(
            blobs.read_bytes("../etc/passwd").await,
            Err(StoreError::Backend(_))
        ));
    }

    #[test]
    fn url_detection() {
        assert!(is_url("https://cdn.example.com/p.pdf"));
        assert!(is_url("http://cdn.example.com/p.pdf"));
        assert!(!is_url("/tmp/p.pdf"));
        assert!(!is_url("scans/p.pdf"));
    }
}
