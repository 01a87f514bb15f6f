//! Content segmentation: raw sources → ordered content blocks → chunks.
//!
//! ## Block order
//!
//! Blocks are produced in a fixed priority order so that segmentation is
//! deterministic for a given document:
//!
//! 1. the pasted source text, sliced into fixed-size text blocks
//! 2. the source file: one image block per PDF page, or a single image
//! 3. auxiliary images, in their declared order
//!
//! ## Chunk layout
//!
//! ```text
//! blocks:  b0 b1 b2 b3 b4 | b5 b6 b7 b8 b9 | b10 b11
//! chunk 0: [b0 .. b4]
//! chunk 1:             b4*[b5 .. b9]          (* = reference only)
//! chunk 2:                            b9*[b10 b11]
//! ```
//!
//! The overlap gives the model the tail of the previous chunk so a question or
//! section that straddles the boundary is read in context, while the
//! reference-only tag tells it not to emit that content a second time.

use crate::config::PipelineConfig;
use crate::error::SegmentationError;
use crate::pipeline::{encode, render};
use crate::store::{BlobStore, DocumentRecord};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// An encoded image ready to attach to a model request.
#[derive(Clone, PartialEq, Eq)]
pub struct ImagePayload {
    /// Standard base64 of the image bytes.
    pub data: String,
    pub mime_type: String,
}

impl fmt::Debug for ImagePayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImagePayload")
            .field("mime_type", &self.mime_type)
            .field("data", &format_args!("<{} bytes base64>", self.data.len()))
            .finish()
    }
}

/// Atomic unit of source material.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentBlock {
    Text(String),
    Image(ImagePayload),
}

/// One block as seen from inside a chunk.
#[derive(Debug, Clone)]
pub struct ChunkBlock {
    /// Position of the block in the document-wide block sequence.
    pub source_index: usize,
    /// Block belongs to the previous chunk; context only.
    pub reference_only: bool,
    pub block: Arc<ContentBlock>,
}

/// A bounded window of blocks submitted to the model in one request.
#[derive(Debug, Clone)]
pub struct Chunk {
    /// 0-based chunk index; also the merge order.
    pub index: usize,
    /// Index of the first block this chunk must extract.
    pub offset: usize,
    pub blocks: Vec<ChunkBlock>,
}

impl Chunk {
    /// Blocks this chunk is responsible for extracting.
    pub fn extract_blocks(&self) -> impl Iterator<Item = &ChunkBlock> {
        self.blocks.iter().filter(|b| !b.reference_only)
    }

    pub fn reference_count(&self) -> usize {
        self.blocks.iter().filter(|b| b.reference_only).count()
    }
}

/// Slice `text` into blocks of at most `max_chars` characters.
///
/// Pure fixed-size slicing: a word or sentence may be cut in two at a block
/// boundary. Counting characters rather than bytes keeps every slice valid
/// UTF-8. Empty text yields no blocks.
pub fn split_text(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut blocks = Vec::with_capacity(text.len() / max_chars + 1);
    let mut current = String::new();
    let mut count = 0;
    for ch in text.chars() {
        current.push(ch);
        count += 1;
        if count == max_chars {
            blocks.push(std::mem::take(&mut current));
            count = 0;
        }
    }
    if !current.is_empty() {
        blocks.push(current);
    }
    blocks
}

/// Group blocks into chunks of `chunk_size` with `overlap_size` trailing
/// reference-only blocks from the previous chunk.
///
/// Yields `ceil(blocks.len() / chunk_size)` chunks; every block is extracted
/// by exactly one chunk.
pub fn chunk(blocks: &[Arc<ContentBlock>], chunk_size: usize, overlap_size: usize) -> Vec<Chunk> {
    let chunk_size = chunk_size.max(1);
    (0..blocks.len())
        .step_by(chunk_size)
        .enumerate()
        .map(|(index, offset)| {
            let start = offset.saturating_sub(overlap_size);
            let end = (offset + chunk_size).min(blocks.len());
            Chunk {
                index,
                offset,
                blocks: (start..end)
                    .map(|i| ChunkBlock {
                        source_index: i,
                        reference_only: i < offset,
                        block: Arc::clone(&blocks[i]),
                    })
                    .collect(),
            }
        })
        .collect()
}

/// Turn a document's sources into the ordered block sequence.
///
/// Every blob read and PDF rasterisation is awaited; any failure aborts
/// segmentation before a single chunk is dispatched.
pub async fn collect_blocks(
    record: &DocumentRecord,
    blobs: &dyn BlobStore,
    config: &PipelineConfig,
) -> Result<Vec<Arc<ContentBlock>>, SegmentationError> {
    let mut blocks: Vec<Arc<ContentBlock>> = Vec::new();

    if let Some(ref text) = record.source_text {
        let texts = split_text(text, config.max_text_block_chars);
        debug!("Source text split into {} blocks", texts.len());
        blocks.extend(texts.into_iter().map(|t| Arc::new(ContentBlock::Text(t))));
    }

    if let Some(ref reference) = record.source_file {
        let bytes = read_blob(blobs, reference).await?;
        if is_pdf(reference) {
            let pages = render::render_pdf_pages(bytes, reference, config.pdf_render_scale).await?;
            info!("Rasterised {} pages from '{}'", pages.len(), reference);
            for page in &pages {
                let img = encode::encode_page(page).map_err(|e| {
                    SegmentationError::EncodingFailed {
                        reference: reference.clone(),
                        detail: e.to_string(),
                    }
                })?;
                blocks.push(Arc::new(ContentBlock::Image(img)));
            }
        } else {
            blocks.push(Arc::new(ContentBlock::Image(encode::encode_bytes(
                &bytes, reference,
            ))));
        }
    }

    for reference in &record.auxiliary_images {
        let bytes = read_blob(blobs, reference).await?;
        blocks.push(Arc::new(ContentBlock::Image(encode::encode_bytes(
            &bytes, reference,
        ))));
    }

    Ok(blocks)
}

async fn read_blob(blobs: &dyn BlobStore, reference: &str) -> Result<Vec<u8>, SegmentationError> {
    blobs
        .read_bytes(reference)
        .await
        .map_err(|e| SegmentationError::Unreadable {
            reference: reference.to_string(),
            reason: e.to_string(),
        })
}

fn is_pdf(reference: &str) -> bool {
    reference.to_ascii_lowercase().ends_with(".pdf")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_blocks(n: usize) -> Vec<Arc<ContentBlock>> {
        (0..n)
            .map(|i| Arc::new(ContentBlock::Text(format!("block {i}"))))
            .collect()
    }

    #[test]
    fn split_text_slices_fixed_size() {
        let text = "a".repeat(12_000);
        let blocks = split_text(&text, 5000);
        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[0].len(), 5000);
        assert_eq!(blocks[1].len(), 5000);
        assert_eq!(blocks[2].len(), 2000);
        assert_eq!(blocks.concat(), text);
    }

    #[test]
    fn split_text_empty_yields_nothing() {
        assert!(split_text("", 5000).is_empty());
    }

    #[test]
    fn split_text_counts_characters_not_bytes() {
        let blocks = split_text("αβγδε", 2);
        assert_eq!(blocks, vec!["αβ", "γδ", "ε"]);
    }

    #[test]
    fn first_chunk_has_no_overlap() {
        let chunks = chunk(&text_blocks(12), 5, 1);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].reference_count(), 0);
        assert_eq!(chunks[0].blocks.len(), 5);
        assert_eq!(chunks[1].blocks[0].source_index, 4);
        assert!(chunks[1].blocks[0].reference_only);
        assert_eq!(chunks[1].blocks.len(), 6);
        assert_eq!(chunks[2].offset, 10);
        assert_eq!(chunks[2].blocks.len(), 3);
    }

    #[test]
    fn overlap_larger_than_chunk_is_clamped_at_zero() {
        let chunks = chunk(&text_blocks(4), 2, 5);
        assert_eq!(chunks[1].blocks.len(), 4);
        assert_eq!(chunks[1].reference_count(), 2);
    }

    #[test]
    fn every_block_extracted_exactly_once() {
        for n in 0..25 {
            for size in 1..7 {
                for overlap in 0..4 {
                    let chunks = chunk(&text_blocks(n), size, overlap);
                    assert_eq!(chunks.len(), n.div_ceil(size), "n={n} size={size}");
                    let extracted: Vec<usize> = chunks
                        .iter()
                        .flat_map(|c| c.extract_blocks().map(|b| b.source_index))
                        .collect();
                    assert_eq!(extracted, (0..n).collect::<Vec<_>>());
                }
            }
        }
    }

    #[test]
    fn chunk_blocks_share_storage() {
        let blocks = text_blocks(6);
        let chunks = chunk(&blocks, 3, 1);
        assert!(Arc::ptr_eq(&chunks[1].blocks[0].block, &blocks[2]));
    }

    #[test]
    fn image_payload_debug_hides_data() {
        let img = ImagePayload {
            data: "A".repeat(64),
            mime_type: "image/png".into(),
        };
        let dbg = format!("{img:?}");
        assert!(dbg.contains("64 bytes"));
        assert!(!dbg.contains("AAAA"));
    }
}
