//! System prompts and chunk message layout.
//!
//! Centralising every prompt here serves two purposes:
//!
//! 1. **Single source of truth**: changing a formatting rule for every
//!    category means editing exactly one constant.
//!
//! 2. **Testability**: unit tests inspect rendered prompts directly without a
//!    live model, so prompt regressions are caught in CI.
//!
//! A system prompt is assembled from three parts: the category prompt (or a
//! document-supplied template), the universal guidelines, and the schema
//! contract describing the exact JSON shape expected back.

use crate::category::Category;
use serde_json::Value;

/// Rules appended to every category prompt.
pub const UNIVERSAL_GUIDELINES: &str = r#"
--- UNIVERSAL FORMATTING & QUALITY RULES ---
1. PRESERVE THE ORIGINAL CONTENT. Transcribe exactly; never paraphrase or summarise.
2. Keep definitions word for word.
3. Write every formula in textbook LaTeX.
4. LATEX DELIMITERS:
   - Use \left( ... \right), \left[ ... \right] or \left\{ ... \right\}.
   - Never write \left{ or \right}: curly delimiters must be escaped.
5. IMAGES:
   - Emit an image entry only for real visual elements (diagrams, figures, graphs, charts).
   - Never use an image entry for text, titles or formulas.
   - Pick exactly one image_strategy per figure:
     SEARCH for a standard textbook figure (give search keywords in image_details),
     GEN_PROMPT for a unique drawing (give a precise generation prompt),
     CANVAS for a plot or simple diagram (describe every shape and label to redraw it).
6. Convert tabular data into Markdown tables.
7. MATH RENDERING:
   - Use \frac{num}{den} instead of a slash for division.
   - Use $$ ... $$ for display formulas and $ ... $ for inline math.
   - Use \\\\ for line breaks inside matrices, arrays and align blocks.
8. READABILITY:
   - Separate every step of a derivation with a blank line.
   - One equation per line.
9. DEDUPLICATION:
   - Blocks labelled REFERENCE ONLY were parsed with the previous chunk.
     Use them for continuity only and never re-extract their content.
-------------------------------------------
"#;

/// First part of every chunk's user turn.
pub const CHUNK_PREAMBLE: &str = "Parse this context. THE FIRST BLOCK MIGHT BE 'REFERENCE ONLY' - use it for continuity but do not re-extract its data.";

/// Label for an overlap block carried over from the previous chunk.
pub const REFERENCE_LABEL: &str = "[REFERENCE ONLY - ALREADY PARSED]";

/// Label for a block this chunk must extract.
pub const EXTRACT_LABEL: &str = "[EXTRACT THIS]";

/// Shown in place of a syllabus when the subject has none parsed yet.
pub const NO_SYLLABUS: &str = "No existing syllabus found for unit mapping context.";

/// Shown in place of a syllabus when the document has no subject.
pub const NO_SUBJECT: &str = "No subject associated.";

const NOT_AVAILABLE: &str = "N/A";

/// Values substituted into a prompt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PromptContext {
    pub branch_name: Option<String>,
    pub subject_code: Option<String>,
    pub subject_name: Option<String>,
    /// Pretty-printed syllabus of the same subject, or a fallback sentence.
    pub syllabus_reference: Option<String>,
}

impl PromptContext {
    fn branch(&self) -> &str {
        self.branch_name.as_deref().unwrap_or(NOT_AVAILABLE)
    }

    fn code(&self) -> &str {
        self.subject_code.as_deref().unwrap_or(NOT_AVAILABLE)
    }

    fn name(&self) -> &str {
        self.subject_name.as_deref().unwrap_or(NOT_AVAILABLE)
    }

    fn syllabus(&self) -> &str {
        self.syllabus_reference.as_deref().unwrap_or(NO_SYLLABUS)
    }
}

/// Built-in prompt for a category.
pub fn category_prompt(category: Category, ctx: &PromptContext) -> String {
    let header = format!(
        "CONTEXT:\nBranch: {}\nSubject: {} - {}\nDocument Type: {}\n",
        ctx.branch(),
        ctx.code(),
        ctx.name(),
        category.display_name()
    );
    match category {
        Category::SolvedPaper | Category::UnsolvedPaper => {
            let answers = if category == Category::SolvedPaper {
                "4. ANSWERS: Give a complete worked answer for every question in `latex_answer`.\n"
            } else {
                ""
            };
            format!(
                "You are an expert parser of previous-year university question papers.\n\n\
                 {header}\n\
                 --- SYLLABUS REFERENCE (FOR UNIT MAPPING) ---\n{syllabus}\n\n\
                 YOUR TASK:\n\
                 Extract every question with its marks and unit. When a question does not state \
                 its unit, use the SYLLABUS REFERENCE to decide which unit its topic belongs to.\n\n\
                 --- PAPER RULES ---\n\
                 1. MARKS: capture the marks of every question exactly.\n\
                 2. OR CHOICES: set `has_or_choice` when a question offers an alternative.\n\
                 3. PARTS: record sub-part labels (a, b, c) in `part`.\n\
                 {answers}",
                syllabus = ctx.syllabus(),
            )
        }
        Category::Syllabus => format!(
            "You are an expert parser of university syllabi.\n\n\
             {header}\n\
             YOUR TASK:\n\
             Extract the unit structure, the list of experiments and the reference books.\n\n\
             --- SYLLABUS RULES ---\n\
             1. MODULES: unit number, title and the detailed list of topics.\n\
             2. Use LaTeX for mathematical symbols and formulas.\n\
             3. EXPERIMENTS: a flat list of strings.\n\
             4. BOOKS: a flat list of the suggested reference books.\n\
             5. Drop administrative text such as lecture counts or effective dates.\n"
        ),
        Category::Notes | Category::ShortNotes | Category::CrashCourseLinks => format!(
            "You are an expert parser of engineering lecture notes.\n\n\
             {header}\n\
             --- SYLLABUS REFERENCE (FOR UNIT MAPPING) ---\n{syllabus}\n\n\
             YOUR TASK:\n\
             Extract accurate structured content. When the notes have no explicit unit headings, \
             use the SYLLABUS REFERENCE to organise them into sections matching the units.\n\n\
             --- NOTES RULES ---\n\
             1. Give every section a descriptive title.\n\
             2. Use `text` blocks (Markdown) for explanations and `image` blocks for figures.\n\
             3. Never create a section that only holds a heading; fold it into the next section.\n\
             4. Text block content is pure Markdown, never JSON.\n",
            syllabus = ctx.syllabus(),
        ),
        Category::FormulaSheet => format!(
            "You are an expert parser of formula sheets.\n\n\
             {header}\n\
             YOUR TASK:\n\
             Extract every formula name with its LaTeX, including variable definitions when present.\n"
        ),
        Category::ImportantQuestions => format!(
            "You are an expert parser of important-question banks.\n\n\
             {header}\n\
             --- SYLLABUS REFERENCE ---\n{syllabus}\n\n\
             YOUR TASK:\n\
             Extract each question and estimate its frequency (High, Medium or Low) from the \
             source, e.g. how many years it was asked.\n",
            syllabus = ctx.syllabus(),
        ),
    }
}

/// Fill `{branch_name}`, `{subject_code}`, `{subject_name}` and
/// `{document_type}` in a document-supplied template.
///
/// Unknown placeholders and stray braces are left as they are.
pub fn render_template(template: &str, category: Category, ctx: &PromptContext) -> String {
    template
        .replace("{branch_name}", ctx.branch())
        .replace("{subject_code}", ctx.code())
        .replace("{subject_name}", ctx.name())
        .replace("{document_type}", category.display_name())
}

/// Instruction block carrying the JSON schema the reply must satisfy.
pub fn schema_contract(schema: &Value) -> String {
    let rendered = serde_json::to_string_pretty(schema).unwrap_or_else(|_| schema.to_string());
    format!(
        "\n--- OUTPUT FORMAT ---\n\
         Answer with a single JSON object that validates against this JSON Schema. \
         Do not wrap it in code fences and do not add commentary.\n{rendered}\n"
    )
}

/// Full system prompt for one document.
///
/// A non-empty `template` replaces the built-in category prompt.
pub fn system_prompt(
    category: Category,
    template: Option<&str>,
    ctx: &PromptContext,
    schema: &Value,
) -> String {
    let base = match template.map(str::trim).filter(|t| !t.is_empty()) {
        Some(t) => render_template(t, category, ctx),
        None => category_prompt(category, ctx),
    };
    format!("{base}{UNIVERSAL_GUIDELINES}{}", schema_contract(schema))
}

/// Heading placed before an inlined text block.
pub fn text_block_heading(reference_only: bool) -> String {
    format!("\n\n{} TEXT BLOCK:\n", label(reference_only))
}

/// Line placed before an attached image.
pub fn image_block_heading(reference_only: bool, attachment: usize) -> String {
    format!("\n\n{} IMAGE BLOCK: attachment #{attachment}", label(reference_only))
}

fn label(reference_only: bool) -> &'static str {
    if reference_only {
        REFERENCE_LABEL
    } else {
        EXTRACT_LABEL
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> PromptContext {
        PromptContext {
            branch_name: Some("Mechanical".into()),
            subject_code: Some("ME-302".into()),
            subject_name: Some("Fluid Mechanics".into()),
            syllabus_reference: Some("{\"modules\": []}".into()),
        }
    }

    #[test]
    fn missing_context_falls_back_to_na() {
        let p = category_prompt(Category::FormulaSheet, &PromptContext::default());
        assert!(p.contains("Branch: N/A"));
        assert!(p.contains("Subject: N/A - N/A"));
    }

    #[test]
    fn paper_prompt_embeds_syllabus() {
        let p = category_prompt(Category::UnsolvedPaper, &ctx());
        assert!(p.contains("ME-302 - Fluid Mechanics"));
        assert!(p.contains("{\"modules\": []}"));
        assert!(!p.contains("latex_answer"));
        assert!(category_prompt(Category::SolvedPaper, &ctx()).contains("latex_answer"));
    }

    #[test]
    fn syllabus_prompt_has_no_syllabus_reference() {
        let p = category_prompt(Category::Syllabus, &ctx());
        assert!(!p.contains("SYLLABUS REFERENCE"));
    }

    #[test]
    fn missing_syllabus_uses_fallback_sentence() {
        let p = category_prompt(Category::Notes, &PromptContext::default());
        assert!(p.contains(NO_SYLLABUS));
    }

    #[test]
    fn template_placeholders_are_substituted() {
        let t = "Parse {document_type} for {subject_code} ({subject_name}, {branch_name}). Keep {other}.";
        let out = render_template(t, Category::FormulaSheet, &ctx());
        assert_eq!(
            out,
            "Parse Formula Sheet for ME-302 (Fluid Mechanics, Mechanical). Keep {other}."
        );
    }

    #[test]
    fn template_overrides_category_prompt() {
        let schema = json!({"type": "object"});
        let p = system_prompt(Category::Notes, Some("Custom {subject_code}"), &ctx(), &schema);
        assert!(p.starts_with("Custom ME-302"));
        assert!(p.contains("UNIVERSAL FORMATTING"));
        assert!(p.contains("\"type\": \"object\""));
    }

    #[test]
    fn blank_template_is_ignored() {
        let schema = json!({});
        let p = system_prompt(Category::Syllabus, Some("   "), &ctx(), &schema);
        assert!(p.starts_with("You are an expert parser of university syllabi."));
    }

    #[test]
    fn block_headings_carry_labels() {
        assert!(text_block_heading(true).contains(REFERENCE_LABEL));
        assert!(text_block_heading(false).contains(EXTRACT_LABEL));
        assert!(image_block_heading(false, 3).ends_with("attachment #3"));
    }
}
