//! PDF rasterisation: render every page of an in-memory PDF via pdfium.
//!
//! ## Why spawn_blocking?
//!
//! The `pdfium-render` crate wraps the pdfium C++ library, which uses
//! thread-local state internally and is not safe to call from async contexts.
//! `tokio::task::spawn_blocking` moves the work onto the blocking pool so
//! worker threads keep serving model calls while a scan is rendered.
//!
//! ## Why a fixed scale?
//!
//! Exam scans are mostly A4 with small print and hand-drawn figures. Rendering
//! at twice the page's native point size gives the model enough pixels to
//! read subscripts and marks annotations reliably.

use crate::error::SegmentationError;
use image::DynamicImage;
use pdfium_render::prelude::*;
use tracing::debug;

/// Rasterise all pages of `bytes` at `scale` × the page's point size.
///
/// `reference` only labels errors and logs.
pub async fn render_pdf_pages(
    bytes: Vec<u8>,
    reference: &str,
    scale: f32,
) -> Result<Vec<DynamicImage>, SegmentationError> {
    let reference = reference.to_string();
    tokio::task::spawn_blocking(move || render_pages_blocking(&bytes, &reference, scale))
        .await
        .map_err(|e| SegmentationError::PdfiumUnavailable(format!("render task panicked: {e}")))?
}

fn render_pages_blocking(
    bytes: &[u8],
    reference: &str,
    scale: f32,
) -> Result<Vec<DynamicImage>, SegmentationError> {
    let pdfium = pdfium_auto::bind_pdfium_silent()
        .map_err(|e| SegmentationError::PdfiumUnavailable(e.to_string()))?;

    let document =
        pdfium
            .load_pdf_from_byte_slice(bytes, None)
            .map_err(|e| SegmentationError::CorruptPdf {
                reference: reference.to_string(),
                detail: format!("{:?}", e),
            })?;

    let render_config = PdfRenderConfig::new().scale_page_by_factor(scale);

    let pages = document.pages();
    let mut images = Vec::with_capacity(pages.len() as usize);
    for (idx, page) in pages.iter().enumerate() {
        let bitmap = page.render_with_config(&render_config).map_err(|e| {
            SegmentationError::RasterisationFailed {
                reference: reference.to_string(),
                page: idx + 1,
                detail: format!("{:?}", e),
            }
        })?;
        let image = bitmap.as_image();
        debug!(
            "Rendered page {} of '{}' → {}x{} px",
            idx + 1,
            reference,
            image.width(),
            image.height()
        );
        images.push(image);
    }

    Ok(images)
}
