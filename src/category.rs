//! Document categories.
//!
//! A category decides three things at once: the output [`crate::schema::Shape`]
//! the model must fill, the system prompt it receives, and the merge policy
//! applied to its chunk results. Keeping it a closed enum means every one of
//! those dispatches is an exhaustive `match` the compiler checks.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The fixed kinds of academic document the pipeline can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    /// Previous-year paper with worked answers.
    SolvedPaper,
    /// Previous-year paper, questions only.
    UnsolvedPaper,
    Syllabus,
    Notes,
    ShortNotes,
    ImportantQuestions,
    FormulaSheet,
    CrashCourseLinks,
}

/// How chunk results of a category are reconciled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeFamily {
    /// Flat list of question records deduplicated by normalised text.
    Questions,
    Syllabus,
    Formulas,
    /// Titled sections of content blocks.
    Sections,
}

impl Category {
    pub const ALL: [Category; 8] = [
        Category::SolvedPaper,
        Category::UnsolvedPaper,
        Category::Syllabus,
        Category::Notes,
        Category::ShortNotes,
        Category::ImportantQuestions,
        Category::FormulaSheet,
        Category::CrashCourseLinks,
    ];

    /// Stable wire name, e.g. `"solved-paper"`.
    pub fn as_str(self) -> &'static str {
        match self {
            Category::SolvedPaper => "solved-paper",
            Category::UnsolvedPaper => "unsolved-paper",
            Category::Syllabus => "syllabus",
            Category::Notes => "notes",
            Category::ShortNotes => "short-notes",
            Category::ImportantQuestions => "important-questions",
            Category::FormulaSheet => "formula-sheet",
            Category::CrashCourseLinks => "crash-course-links",
        }
    }

    /// Human-readable name used inside prompts.
    pub fn display_name(self) -> &'static str {
        match self {
            Category::SolvedPaper => "Solved Previous Year Question Paper",
            Category::UnsolvedPaper => "Unsolved Previous Year Question Paper",
            Category::Syllabus => "Syllabus",
            Category::Notes => "Chapter Notes",
            Category::ShortNotes => "Short Notes",
            Category::ImportantQuestions => "Important Questions",
            Category::FormulaSheet => "Formula Sheet",
            Category::CrashCourseLinks => "Crash Course",
        }
    }

    pub fn merge_family(self) -> MergeFamily {
        match self {
            Category::SolvedPaper | Category::UnsolvedPaper | Category::ImportantQuestions => {
                MergeFamily::Questions
            }
            Category::Syllabus => MergeFamily::Syllabus,
            Category::FormulaSheet => MergeFamily::Formulas,
            Category::Notes | Category::ShortNotes | Category::CrashCourseLinks => {
                MergeFamily::Sections
            }
        }
    }

    /// Whether the prompt for this category embeds the subject's syllabus
    /// so the model can map content to units.
    pub fn wants_syllabus_reference(self) -> bool {
        matches!(
            self,
            Category::SolvedPaper
                | Category::UnsolvedPaper
                | Category::ImportantQuestions
                | Category::Notes
                | Category::ShortNotes
                | Category::CrashCourseLinks
        )
    }

    /// Parse a category name, falling back to [`Category::Notes`] (the most
    /// general shape) for anything unrecognised.
    pub fn parse_lenient(s: &str) -> Category {
        s.parse().unwrap_or(Category::Notes)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for [`Category::from_str`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown document category '{0}'")]
pub struct UnknownCategory(pub String);

impl FromStr for Category {
    type Err = UnknownCategory;

    /// Accepts the kebab-case wire names as well as the upper-case codes
    /// used by older records (`PYQ`, `UNSOLVED_PYQ`, `IMPORTANT_Q`, …).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let norm = s.trim().to_ascii_lowercase().replace('_', "-");
        let cat = match norm.as_str() {
            "solved-paper" | "pyq" => Category::SolvedPaper,
            "unsolved-paper" | "unsolved-pyq" => Category::UnsolvedPaper,
            "syllabus" => Category::Syllabus,
            "notes" => Category::Notes,
            "short-notes" => Category::ShortNotes,
            "important-questions" | "important-q" => Category::ImportantQuestions,
            "formula-sheet" | "formula" => Category::FormulaSheet,
            "crash-course-links" | "crash-course" => Category::CrashCourseLinks,
            _ => return Err(UnknownCategory(s.to_string())),
        };
        Ok(cat)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_names_round_trip_through_from_str() {
        for cat in Category::ALL {
            assert_eq!(cat.as_str().parse::<Category>().unwrap(), cat);
        }
    }

    #[test]
    fn legacy_codes_are_accepted() {
        assert_eq!("PYQ".parse::<Category>().unwrap(), Category::SolvedPaper);
        assert_eq!(
            "UNSOLVED_PYQ".parse::<Category>().unwrap(),
            Category::UnsolvedPaper
        );
        assert_eq!(
            "IMPORTANT_Q".parse::<Category>().unwrap(),
            Category::ImportantQuestions
        );
        assert_eq!(
            "CRASH_COURSE".parse::<Category>().unwrap(),
            Category::CrashCourseLinks
        );
    }

    #[test]
    fn unknown_category_falls_back_to_notes() {
        assert!("flashcards".parse::<Category>().is_err());
        assert_eq!(Category::parse_lenient("flashcards"), Category::Notes);
    }

    #[test]
    fn serde_uses_kebab_case() {
        let json = serde_json::to_string(&Category::FormulaSheet).unwrap();
        assert_eq!(json, "\"formula-sheet\"");
    }

    #[test]
    fn merge_families() {
        assert_eq!(
            Category::ImportantQuestions.merge_family(),
            MergeFamily::Questions
        );
        assert_eq!(
            Category::CrashCourseLinks.merge_family(),
            MergeFamily::Sections
        );
        assert_eq!(Category::Syllabus.merge_family(), MergeFamily::Syllabus);
    }
}
