//! Typed structured payloads: one variant per category shape.
//!
//! A [`Payload`] is both the per-chunk result returned by the extraction worker
//! and the merged document persisted by the job orchestrator. It serialises
//! untagged, so the JSON written to the store is exactly the category shape
//! (`{"questions": [...]}`, `{"modules": [...], ...}`, …).
//!
//! List fields default to empty when absent: a reply that omits `questions`
//! decodes fine and simply contributes nothing to the merge. That omission is
//! logged here, where the raw object is still visible.

use crate::category::Category;
use crate::error::PayloadError;
use crate::schema::schema_for;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

/// How a figure should be recreated downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ImageStrategy {
    /// A standard textbook figure that can be found by search.
    Search,
    /// A unique drawing to be regenerated from a prompt.
    GenPrompt,
    /// A plot or simple diagram to be redrawn with canvas code.
    Canvas,
}

impl ImageStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            ImageStrategy::Search => "SEARCH",
            ImageStrategy::GenPrompt => "GEN_PROMPT",
            ImageStrategy::Canvas => "CANVAS",
        }
    }
}

/// A question of a solved or unsolved paper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaperQuestion {
    #[serde(default)]
    pub unit: Option<i64>,
    pub marks: i64,
    pub question_text: String,
    #[serde(default)]
    pub image_strategy: Option<ImageStrategy>,
    #[serde(default)]
    pub image_details: Option<String>,
    #[serde(default)]
    pub part: Option<String>,
    #[serde(default)]
    pub has_or_choice: bool,
    /// Present for solved papers only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latex_answer: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PaperPayload {
    #[serde(default)]
    pub questions: Vec<PaperQuestion>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyllabusModule {
    pub unit: i64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub topics: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyllabusPayload {
    #[serde(default)]
    pub modules: Vec<SyllabusModule>,
    #[serde(default)]
    pub experiments: Vec<String>,
    #[serde(default)]
    pub reference_books: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoteBlockKind {
    Text,
    Image,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteBlock {
    #[serde(rename = "type")]
    pub kind: NoteBlockKind,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub image_strategy: Option<ImageStrategy>,
    #[serde(default)]
    pub image_details: Option<String>,
}

impl NoteBlock {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            kind: NoteBlockKind::Text,
            content: Some(content.into()),
            image_strategy: None,
            image_details: None,
        }
    }

    pub fn image(strategy: ImageStrategy, details: impl Into<String>) -> Self {
        Self {
            kind: NoteBlockKind::Image,
            content: None,
            image_strategy: Some(strategy),
            image_details: Some(details.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteSection {
    pub section_title: String,
    #[serde(default)]
    pub content_blocks: Vec<NoteBlock>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotesPayload {
    #[serde(default)]
    pub sections: Vec<NoteSection>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Formula {
    pub name: String,
    pub latex: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FormulaSheetPayload {
    #[serde(default)]
    pub formulas: Vec<Formula>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Frequency {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportantQuestion {
    pub text: String,
    pub frequency: Frequency,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImportantQuestionsPayload {
    #[serde(default)]
    pub questions: Vec<ImportantQuestion>,
}

/// A category-shaped structured document.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Payload {
    Paper(PaperPayload),
    Syllabus(SyllabusPayload),
    Notes(NotesPayload),
    FormulaSheet(FormulaSheetPayload),
    ImportantQuestions(ImportantQuestionsPayload),
}

impl Payload {
    /// The empty document of a category.
    pub fn empty(category: Category) -> Payload {
        match category {
            Category::SolvedPaper | Category::UnsolvedPaper => Payload::Paper(Default::default()),
            Category::Syllabus => Payload::Syllabus(Default::default()),
            Category::FormulaSheet => Payload::FormulaSheet(Default::default()),
            Category::ImportantQuestions => Payload::ImportantQuestions(Default::default()),
            Category::Notes | Category::ShortNotes | Category::CrashCourseLinks => {
                Payload::Notes(Default::default())
            }
        }
    }

    /// Decode a model reply into the payload variant of `category`.
    ///
    /// Top-level fields missing from the reply are logged and default to
    /// empty; present-but-malformed records are an error.
    pub fn decode(category: Category, value: Value) -> Result<Payload, PayloadError> {
        let obj = match &value {
            Value::Object(obj) => obj,
            Value::Array(_) => return Err(PayloadError::NotAnObject("an array")),
            Value::String(_) => return Err(PayloadError::NotAnObject("a string")),
            Value::Number(_) => return Err(PayloadError::NotAnObject("a number")),
            Value::Bool(_) => return Err(PayloadError::NotAnObject("a boolean")),
            Value::Null => return Err(PayloadError::NotAnObject("null")),
        };
        for name in schema_for(category).field_names() {
            if !obj.contains_key(name) {
                warn!(
                    category = %category,
                    field = name,
                    "chunk payload has no `{}` field; nothing to merge from it", name
                );
            }
        }

        let payload = match category {
            Category::SolvedPaper | Category::UnsolvedPaper => {
                let paper: PaperPayload =
                    serde_json::from_value(value).map_err(PayloadError::Malformed)?;
                if category == Category::SolvedPaper {
                    if let Some(index) = paper
                        .questions
                        .iter()
                        .position(|q| q.latex_answer.is_none())
                    {
                        return Err(PayloadError::MissingAnswer { index });
                    }
                }
                Payload::Paper(paper)
            }
            Category::Syllabus => {
                Payload::Syllabus(serde_json::from_value(value).map_err(PayloadError::Malformed)?)
            }
            Category::FormulaSheet => Payload::FormulaSheet(
                serde_json::from_value(value).map_err(PayloadError::Malformed)?,
            ),
            Category::ImportantQuestions => Payload::ImportantQuestions(
                serde_json::from_value(value).map_err(PayloadError::Malformed)?,
            ),
            Category::Notes | Category::ShortNotes | Category::CrashCourseLinks => {
                Payload::Notes(serde_json::from_value(value).map_err(PayloadError::Malformed)?)
            }
        };
        Ok(payload)
    }

    /// Decode the raw text of a model reply.
    pub fn decode_str(category: Category, text: &str) -> Result<Payload, PayloadError> {
        let value: Value = serde_json::from_str(text).map_err(PayloadError::NotJson)?;
        Payload::decode(category, value)
    }

    /// Whether this variant is the one `category` produces.
    pub fn matches(&self, category: Category) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(&Payload::empty(category))
    }

    /// Number of top-level items (questions, modules, formulas or sections).
    pub fn item_count(&self) -> usize {
        match self {
            Payload::Paper(p) => p.questions.len(),
            Payload::Syllabus(s) => s.modules.len(),
            Payload::Notes(n) => n.sections.len(),
            Payload::FormulaSheet(f) => f.formulas.len(),
            Payload::ImportantQuestions(q) => q.questions.len(),
        }
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_solved_paper() {
        let value = json!({
            "questions": [{
                "unit": 2,
                "marks": 7,
                "question_text": "State Ohm's law.",
                "image_strategy": null,
                "image_details": null,
                "part": "a",
                "has_or_choice": true,
                "latex_answer": "$V = IR$"
            }]
        });
        let Payload::Paper(paper) = Payload::decode(Category::SolvedPaper, value).unwrap() else {
            panic!("expected a paper");
        };
        assert_eq!(paper.questions.len(), 1);
        assert_eq!(paper.questions[0].unit, Some(2));
        assert!(paper.questions[0].has_or_choice);
    }

    #[test]
    fn solved_paper_without_answer_is_rejected() {
        let value = json!({ "questions": [{ "marks": 7, "question_text": "Q" }] });
        let err = Payload::decode(Category::SolvedPaper, value).unwrap_err();
        assert!(matches!(err, PayloadError::MissingAnswer { index: 0 }));
        // The same record is fine for an unsolved paper.
        let value = json!({ "questions": [{ "marks": 7, "question_text": "Q" }] });
        assert!(Payload::decode(Category::UnsolvedPaper, value).is_ok());
    }

    #[test]
    fn missing_top_level_field_is_an_empty_contribution() {
        let payload = Payload::decode(Category::FormulaSheet, json!({})).unwrap();
        assert_eq!(payload, Payload::FormulaSheet(FormulaSheetPayload::default()));
        assert_eq!(payload.item_count(), 0);
    }

    #[test]
    fn non_object_reply_is_rejected() {
        let err = Payload::decode(Category::Notes, json!([1, 2])).unwrap_err();
        assert!(err.to_string().contains("an array"));
        assert!(matches!(
            Payload::decode_str(Category::Notes, "not json"),
            Err(PayloadError::NotJson(_))
        ));
    }

    #[test]
    fn bad_enum_value_is_malformed() {
        let value = json!({ "questions": [{ "text": "Define entropy", "frequency": "Often" }] });
        assert!(matches!(
            Payload::decode(Category::ImportantQuestions, value),
            Err(PayloadError::Malformed(_))
        ));
    }

    #[test]
    fn serialises_untagged_in_category_shape() {
        let payload = Payload::Notes(NotesPayload {
            sections: vec![NoteSection {
                section_title: "Diodes".into(),
                content_blocks: vec![
                    NoteBlock::text("A PN junction…"),
                    NoteBlock::image(ImageStrategy::Canvas, "IV curve"),
                ],
            }],
        });
        let json = payload.to_json();
        assert_eq!(json["sections"][0]["content_blocks"][0]["type"], "text");
        assert_eq!(
            json["sections"][0]["content_blocks"][1]["image_strategy"],
            "CANVAS"
        );
    }

    #[test]
    fn unsolved_questions_omit_answer_field() {
        let payload = Payload::Paper(PaperPayload {
            questions: vec![PaperQuestion {
                unit: None,
                marks: 3,
                question_text: "Q".into(),
                image_strategy: None,
                image_details: None,
                part: None,
                has_or_choice: false,
                latex_answer: None,
            }],
        });
        assert!(payload.to_json()["questions"][0].get("latex_answer").is_none());
    }

    #[test]
    fn variant_matches_category() {
        assert!(Payload::empty(Category::ShortNotes).matches(Category::Notes));
        assert!(Payload::empty(Category::SolvedPaper).matches(Category::UnsolvedPaper));
        assert!(!Payload::empty(Category::SolvedPaper).matches(Category::ImportantQuestions));
        assert!(!Payload::empty(Category::Syllabus).matches(Category::FormulaSheet));
    }
}
