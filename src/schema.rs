//! Schema registry: the output contract each category must satisfy.
//!
//! A [`Shape`] is a declarative description of the JSON object the model is
//! asked to return. It is rendered into a JSON Schema document and embedded in
//! every extraction request; the typed structs in [`crate::payload`] then
//! enforce the same contract when the reply is decoded. The two are kept side
//! by side so a test can assert they agree.

use crate::category::Category;
use once_cell::sync::Lazy;
use serde_json::{json, Map, Value};

/// Allowed values of `image_strategy`.
pub const IMAGE_STRATEGIES: &[&str] = &["SEARCH", "GEN_PROMPT", "CANVAS"];
/// Allowed values of a note content block's `type`.
pub const NOTE_BLOCK_KINDS: &[&str] = &["text", "image"];
/// Allowed values of an important question's `frequency`.
pub const FREQUENCIES: &[&str] = &["High", "Medium", "Low"];

/// Type of a single [`Field`].
#[derive(Debug, Clone, PartialEq)]
pub enum FieldType {
    Integer,
    OptionalInteger,
    String,
    OptionalString,
    Boolean,
    Enumeration(&'static [&'static str]),
    OptionalEnumeration(&'static [&'static str]),
    StringList,
    List(Shape),
}

impl FieldType {
    pub fn is_optional(&self) -> bool {
        matches!(
            self,
            FieldType::OptionalInteger | FieldType::OptionalString | FieldType::OptionalEnumeration(_)
        )
    }
}

/// A named, typed field of a [`Shape`].
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: &'static str,
    pub ty: FieldType,
    pub description: &'static str,
}

impl Field {
    fn new(name: &'static str, ty: FieldType, description: &'static str) -> Self {
        Self {
            name,
            ty,
            description,
        }
    }
}

/// A fixed structured-output contract: field names, types, nesting.
#[derive(Debug, Clone, PartialEq)]
pub struct Shape {
    pub name: &'static str,
    pub fields: Vec<Field>,
}

impl Shape {
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Names of the top-level fields, in declaration order.
    pub fn field_names(&self) -> Vec<&'static str> {
        self.fields.iter().map(|f| f.name).collect()
    }

    /// Render as a JSON Schema object (draft-07 subset understood by every
    /// structured-output capable provider).
    pub fn to_json_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();
        for field in &self.fields {
            let mut prop = field_type_schema(&field.ty);
            if let Value::Object(ref mut obj) = prop {
                obj.insert("description".into(), Value::String(field.description.into()));
            }
            properties.insert(field.name.to_string(), prop);
            if !field.ty.is_optional() {
                required.push(Value::String(field.name.to_string()));
            }
        }
        json!({
            "title": self.name,
            "type": "object",
            "properties": properties,
            "required": required,
            "additionalProperties": false,
        })
    }
}

fn field_type_schema(ty: &FieldType) -> Value {
    match ty {
        FieldType::Integer => json!({ "type": "integer" }),
        FieldType::OptionalInteger => json!({ "type": ["integer", "null"] }),
        FieldType::String => json!({ "type": "string" }),
        FieldType::OptionalString => json!({ "type": ["string", "null"] }),
        FieldType::Boolean => json!({ "type": "boolean" }),
        FieldType::Enumeration(values) => json!({ "type": "string", "enum": values }),
        FieldType::OptionalEnumeration(values) => {
            let mut all: Vec<Value> = values.iter().map(|v| Value::String((*v).into())).collect();
            all.push(Value::Null);
            json!({ "type": ["string", "null"], "enum": all })
        }
        FieldType::StringList => json!({ "type": "array", "items": { "type": "string" } }),
        FieldType::List(shape) => json!({ "type": "array", "items": shape.to_json_schema() }),
    }
}

// ── Registry ─────────────────────────────────────────────────────────────

/// Look up the top-level shape for a category.
pub fn schema_for(category: Category) -> &'static Shape {
    match category {
        Category::SolvedPaper => &SOLVED_PAPER,
        Category::UnsolvedPaper => &UNSOLVED_PAPER,
        Category::Syllabus => &SYLLABUS,
        Category::FormulaSheet => &FORMULA_SHEET,
        Category::ImportantQuestions => &IMPORTANT_QUESTIONS,
        Category::Notes | Category::ShortNotes | Category::CrashCourseLinks => &NOTES,
    }
}

fn paper_question_fields(with_answer: bool) -> Vec<Field> {
    let mut fields = vec![
        Field::new(
            "unit",
            FieldType::OptionalInteger,
            "Syllabus unit number this question belongs to. Derive from the syllabus reference when not printed.",
        ),
        Field::new("marks", FieldType::Integer, "Marks assigned to the question."),
        Field::new(
            "question_text",
            FieldType::String,
            "Full question text. Markdown with LaTeX for every formula or symbol.",
        ),
        Field::new(
            "image_strategy",
            FieldType::OptionalEnumeration(IMAGE_STRATEGIES),
            "How to recreate the figure attached to this question. Null when there is none.",
        ),
        Field::new(
            "image_details",
            FieldType::OptionalString,
            "Keywords, generation prompt or drawing instructions for the figure.",
        ),
        Field::new("part", FieldType::OptionalString, "Sub-part label such as 'a', 'b' or 'i'."),
        Field::new(
            "has_or_choice",
            FieldType::Boolean,
            "True when the question is one side of an OR / internal choice pair.",
        ),
    ];
    if with_answer {
        fields.push(Field::new(
            "latex_answer",
            FieldType::String,
            "Step-by-step worked solution. LaTeX for all math, blank lines between steps.",
        ));
    }
    fields
}

static SOLVED_PAPER: Lazy<Shape> = Lazy::new(|| Shape {
    name: "SolvedPaper",
    fields: vec![Field::new(
        "questions",
        FieldType::List(Shape {
            name: "SolvedQuestion",
            fields: paper_question_fields(true),
        }),
        "Every question of the paper, in paper order.",
    )],
});

static UNSOLVED_PAPER: Lazy<Shape> = Lazy::new(|| Shape {
    name: "UnsolvedPaper",
    fields: vec![Field::new(
        "questions",
        FieldType::List(Shape {
            name: "UnsolvedQuestion",
            fields: paper_question_fields(false),
        }),
        "Every question of the paper, in paper order.",
    )],
});

static SYLLABUS: Lazy<Shape> = Lazy::new(|| Shape {
    name: "Syllabus",
    fields: vec![
        Field::new(
            "modules",
            FieldType::List(Shape {
                name: "SyllabusModule",
                fields: vec![
                    Field::new("unit", FieldType::Integer, "Unit or module number."),
                    Field::new("title", FieldType::String, "Unit title, LaTeX for symbols."),
                    Field::new("topics", FieldType::StringList, "Atomic list of topics."),
                ],
            }),
            "Units of the syllabus.",
        ),
        Field::new(
            "experiments",
            FieldType::StringList,
            "Laboratory experiments or practicals, one per entry.",
        ),
        Field::new(
            "reference_books",
            FieldType::StringList,
            "Suggested textbooks and reference books.",
        ),
    ],
});

static NOTES: Lazy<Shape> = Lazy::new(|| Shape {
    name: "Notes",
    fields: vec![Field::new(
        "sections",
        FieldType::List(Shape {
            name: "NoteSection",
            fields: vec![
                Field::new(
                    "section_title",
                    FieldType::String,
                    "Descriptive section title, e.g. 'Unit 1: Introduction'.",
                ),
                Field::new(
                    "content_blocks",
                    FieldType::List(Shape {
                        name: "NoteContentBlock",
                        fields: vec![
                            Field::new(
                                "type",
                                FieldType::Enumeration(NOTE_BLOCK_KINDS),
                                "'text' for Markdown content, 'image' for a figure to recreate.",
                            ),
                            Field::new(
                                "content",
                                FieldType::OptionalString,
                                "Pure Markdown for text blocks. Never JSON.",
                            ),
                            Field::new(
                                "image_strategy",
                                FieldType::OptionalEnumeration(IMAGE_STRATEGIES),
                                "Recreation strategy for image blocks.",
                            ),
                            Field::new(
                                "image_details",
                                FieldType::OptionalString,
                                "Prompt, keywords or drawing instructions for image blocks.",
                            ),
                        ],
                    }),
                    "Ordered content of the section.",
                ),
            ],
        }),
        "Logical sections of the notes, in reading order.",
    )],
});

static FORMULA_SHEET: Lazy<Shape> = Lazy::new(|| Shape {
    name: "FormulaSheet",
    fields: vec![Field::new(
        "formulas",
        FieldType::List(Shape {
            name: "Formula",
            fields: vec![
                Field::new("name", FieldType::String, "Name of the formula or theorem."),
                Field::new("latex", FieldType::String, "The formula in LaTeX."),
            ],
        }),
        "Every formula on the sheet.",
    )],
});

static IMPORTANT_QUESTIONS: Lazy<Shape> = Lazy::new(|| Shape {
    name: "ImportantQuestions",
    fields: vec![Field::new(
        "questions",
        FieldType::List(Shape {
            name: "ImportantQuestion",
            fields: vec![
                Field::new("text", FieldType::String, "The question text."),
                Field::new(
                    "frequency",
                    FieldType::Enumeration(FREQUENCIES),
                    "How often the question appears in the source.",
                ),
            ],
        }),
        "Important questions in source order.",
    )],
});

#[cfg(test)]
mod tests {
    use super::*;

    fn record_shape(shape: &Shape, list: &str) -> Shape {
        match &shape.field(list).expect("list field").ty {
            FieldType::List(inner) => inner.clone(),
            other => panic!("expected list, got {other:?}"),
        }
    }

    #[test]
    fn every_category_has_a_shape() {
        for cat in Category::ALL {
            assert!(!schema_for(cat).fields.is_empty(), "{cat} has no fields");
        }
    }

    #[test]
    fn notes_like_categories_share_the_notes_shape() {
        assert_eq!(schema_for(Category::ShortNotes), schema_for(Category::Notes));
        assert_eq!(
            schema_for(Category::CrashCourseLinks),
            schema_for(Category::Notes)
        );
        assert_eq!(
            schema_for(Category::parse_lenient("mind-map")),
            schema_for(Category::Notes)
        );
    }

    #[test]
    fn solved_paper_requires_an_answer_unsolved_does_not() {
        let solved = record_shape(schema_for(Category::SolvedPaper), "questions");
        let unsolved = record_shape(schema_for(Category::UnsolvedPaper), "questions");
        assert!(solved.field("latex_answer").is_some());
        assert!(unsolved.field("latex_answer").is_none());
        assert_eq!(
            solved.field("has_or_choice").map(|f| &f.ty),
            Some(&FieldType::Boolean)
        );
    }

    #[test]
    fn json_schema_marks_optional_fields_as_not_required() {
        let q = record_shape(schema_for(Category::SolvedPaper), "questions");
        let schema = q.to_json_schema();
        let required: Vec<&str> = schema["required"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|v| v.as_str())
            .collect();
        assert!(required.contains(&"marks"));
        assert!(required.contains(&"question_text"));
        assert!(!required.contains(&"unit"));
        assert!(!required.contains(&"part"));
        assert_eq!(schema["additionalProperties"], Value::Bool(false));
    }

    #[test]
    fn json_schema_nests_lists() {
        let schema = schema_for(Category::Notes).to_json_schema();
        let block = &schema["properties"]["sections"]["items"]["properties"]["content_blocks"]
            ["items"];
        assert_eq!(block["properties"]["type"]["enum"], json!(["text", "image"]));
    }
}
