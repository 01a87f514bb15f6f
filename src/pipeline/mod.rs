//! Pipeline stages for chunked document extraction.
//!
//! Each submodule implements one step and is testable on its own.
//!
//! ## Data Flow
//!
//! ```text
//! sources ──▶ segment ──▶ extract ──▶ coordinate ──▶ merge
//! (text/PDF/img) (blocks, chunks) (one model call) (fan-out)  (dedup, sanitize)
//! ```
//!
//! 1. [`segment`]: turn the document's sources into ordered content
//!    blocks and cut them into overlapping chunks. PDFs go through
//!    [`render`] (pdfium, in `spawn_blocking`) and [`encode`] (base64).
//! 2. [`extract`]: one chunk, one model call, retried with backoff;
//!    the reply is cleaned by [`sanitize`] and decoded into a typed payload.
//! 3. [`coordinate`]: run every chunk of a document under a concurrency
//!    bound and fail fast on the first chunk that exhausts its retries.
//! 4. [`merge`]: reconcile the ordered chunk payloads into one
//!    category-shaped document.

pub mod coordinate;
pub mod encode;
pub mod extract;
pub mod merge;
pub mod render;
pub mod sanitize;
pub mod segment;
