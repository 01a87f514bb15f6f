//! Merge engine: ordered chunk payloads → one category-shaped document.
//!
//! Chunks overlap by design, and models re-emit items they saw in a
//! reference-only block often enough that every merge policy deduplicates:
//!
//! | Family | Dedup key | First chunk |
//! |--------|-----------|-------------|
//! | papers, important questions | question text, whitespace removed, lower-cased | seeds the result verbatim |
//! | syllabus | unit number; trimmed lower-case experiment / book | deduplicated like the rest |
//! | formula sheet | trimmed lower-case name | deduplicated like the rest |
//! | notes | trimmed lower-case section title; SHA-256 per block | deduplicated like the rest |
//!
//! Free-text fields pass through [`sanitize_latex`] on the way in. The merge
//! is a pure function of the chunk order, so completion order never changes
//! the output, and merging an already merged document yields it unchanged.

use crate::category::{Category, MergeFamily};
use crate::payload::{
    FormulaSheetPayload, ImportantQuestionsPayload, NoteBlock, NoteBlockKind, NoteSection,
    NotesPayload, PaperPayload, PaperQuestion, Payload, SyllabusPayload,
};
use crate::pipeline::sanitize::{
    content_hash, question_key, sanitize_latex, sanitize_opt, title_key,
};
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

/// Merge chunk payloads, given in chunk order.
///
/// A payload of the wrong variant is logged and contributes nothing. An
/// empty list yields the empty document of the category.
pub fn merge(category: Category, chunks: Vec<Payload>) -> Payload {
    let total = chunks.len();
    let merged = match category.merge_family() {
        MergeFamily::Questions if category == Category::ImportantQuestions => {
            Payload::ImportantQuestions(merge_important(typed(category, chunks, |p| match p {
                Payload::ImportantQuestions(q) => Some(q),
                _ => None,
            })))
        }
        MergeFamily::Questions => Payload::Paper(merge_papers(typed(category, chunks, |p| {
            match p {
                Payload::Paper(q) => Some(q),
                _ => None,
            }
        }))),
        MergeFamily::Syllabus => Payload::Syllabus(merge_syllabus(typed(category, chunks, |p| {
            match p {
                Payload::Syllabus(s) => Some(s),
                _ => None,
            }
        }))),
        MergeFamily::Formulas => {
            Payload::FormulaSheet(merge_formulas(typed(category, chunks, |p| match p {
                Payload::FormulaSheet(f) => Some(f),
                _ => None,
            })))
        }
        MergeFamily::Sections => Payload::Notes(merge_notes(typed(category, chunks, |p| {
            match p {
                Payload::Notes(n) => Some(n),
                _ => None,
            }
        }))),
    };
    debug!(
        category = %category,
        "merged {} chunk(s) into {} item(s)", total, merged.item_count()
    );
    merged
}

/// Unwrap each payload into the variant `category` expects.
fn typed<T: Default>(
    category: Category,
    chunks: Vec<Payload>,
    pick: impl Fn(Payload) -> Option<T>,
) -> Vec<T> {
    chunks
        .into_iter()
        .enumerate()
        .map(|(index, payload)| {
            pick(payload).unwrap_or_else(|| {
                warn!(
                    category = %category,
                    chunk = index,
                    "merge anomaly: chunk payload has the wrong shape; contributing nothing"
                );
                T::default()
            })
        })
        .collect()
}

// ── Questions ────────────────────────────────────────────────────────────────

fn sanitize_question(mut q: PaperQuestion) -> PaperQuestion {
    q.question_text = sanitize_latex(&q.question_text);
    q.latex_answer = sanitize_opt(&q.latex_answer);
    q.image_details = sanitize_opt(&q.image_details);
    q
}

fn merge_papers(chunks: Vec<PaperPayload>) -> PaperPayload {
    let mut iter = chunks.into_iter();
    let Some(first) = iter.next() else {
        return PaperPayload::default();
    };

    let mut seen = HashSet::new();
    let mut merged = PaperPayload::default();
    for q in first.questions {
        let q = sanitize_question(q);
        seen.insert(question_key(&q.question_text));
        merged.questions.push(q);
    }

    for chunk in iter {
        for q in chunk.questions {
            let q = sanitize_question(q);
            if seen.insert(question_key(&q.question_text)) {
                merged.questions.push(q);
            }
        }
    }
    merged
}

fn merge_important(chunks: Vec<ImportantQuestionsPayload>) -> ImportantQuestionsPayload {
    let mut iter = chunks.into_iter();
    let Some(first) = iter.next() else {
        return ImportantQuestionsPayload::default();
    };

    let mut seen = HashSet::new();
    let mut merged = ImportantQuestionsPayload::default();
    for mut q in first.questions {
        q.text = sanitize_latex(&q.text);
        seen.insert(question_key(&q.text));
        merged.questions.push(q);
    }

    for chunk in iter {
        for mut q in chunk.questions {
            q.text = sanitize_latex(&q.text);
            if seen.insert(question_key(&q.text)) {
                merged.questions.push(q);
            }
        }
    }
    merged
}

// ── Syllabus ─────────────────────────────────────────────────────────────────

fn merge_syllabus(chunks: Vec<SyllabusPayload>) -> SyllabusPayload {
    let mut merged = SyllabusPayload::default();
    let mut seen_units = HashSet::new();
    let mut seen_experiments = HashSet::new();
    let mut seen_books = HashSet::new();

    for chunk in chunks {
        for mut module in chunk.modules {
            // First occurrence of a unit number wins.
            if !seen_units.insert(module.unit) {
                continue;
            }
            module.title = sanitize_latex(&module.title);
            module.topics = module.topics.iter().map(|t| sanitize_latex(t)).collect();
            merged.modules.push(module);
        }

        for experiment in chunk.experiments {
            let experiment = sanitize_latex(&experiment);
            let key = title_key(&experiment);
            if !key.is_empty() && seen_experiments.insert(key) {
                merged.experiments.push(experiment);
            }
        }

        for book in chunk.reference_books {
            let key = title_key(&book);
            if !key.is_empty() && seen_books.insert(key) {
                merged.reference_books.push(book);
            }
        }
    }
    merged
}

// ── Formula sheet ────────────────────────────────────────────────────────────

fn merge_formulas(chunks: Vec<FormulaSheetPayload>) -> FormulaSheetPayload {
    let mut merged = FormulaSheetPayload::default();
    let mut seen = HashSet::new();
    for chunk in chunks {
        for mut formula in chunk.formulas {
            formula.latex = sanitize_latex(&formula.latex);
            if seen.insert(title_key(&formula.name)) {
                merged.formulas.push(formula);
            }
        }
    }
    merged
}

// ── Notes ────────────────────────────────────────────────────────────────────

fn sanitize_block(mut block: NoteBlock) -> NoteBlock {
    block.content = sanitize_opt(&block.content);
    block.image_details = sanitize_opt(&block.image_details);
    block
}

/// Fingerprint of a note block: its trimmed text, or `IMG:strategy:details`.
fn block_hash(block: &NoteBlock) -> [u8; 32] {
    match block.kind {
        NoteBlockKind::Text => content_hash(block.content.as_deref().unwrap_or_default().trim()),
        NoteBlockKind::Image => content_hash(&format!(
            "IMG:{}:{}",
            block.image_strategy.map(|s| s.as_str()).unwrap_or_default(),
            block.image_details.as_deref().unwrap_or_default()
        )),
    }
}

fn merge_notes(chunks: Vec<NotesPayload>) -> NotesPayload {
    let mut merged = NotesPayload::default();
    let mut by_title: HashMap<String, usize> = HashMap::new();
    let mut block_hashes: Vec<HashSet<[u8; 32]>> = Vec::new();

    for chunk in chunks {
        for section in chunk.sections {
            let key = title_key(&section.section_title);
            let blocks = section.content_blocks.into_iter().map(sanitize_block);
            match by_title.get(&key).copied() {
                Some(idx) => {
                    let hashes = &mut block_hashes[idx];
                    let existing = &mut merged.sections[idx].content_blocks;
                    existing.extend(blocks.filter(|b| hashes.insert(block_hash(b))));
                }
                None => {
                    let content_blocks: Vec<NoteBlock> = blocks.collect();
                    block_hashes.push(content_blocks.iter().map(block_hash).collect());
                    by_title.insert(key, merged.sections.len());
                    merged.sections.push(NoteSection {
                        section_title: section.section_title,
                        content_blocks,
                    });
                }
            }
        }
    }
    merged
}
