//! Deterministic text cleanup for model output.
//!
//! Two families of rules live here:
//!
//! * **Reply cleanup**: applied to the raw reply before JSON decoding. Even
//!   when told to answer with a bare JSON object, models regularly wrap it in
//!   ```` ```json ```` fences, prepend a sentence, or leak zero-width characters.
//! * **Field sanitisation**: applied by the merge engine to every free-text
//!   field. The only defect fixed today is the unescaped curly-brace delimiter
//!   (`\left{` / `\right}`), which MathJax refuses to render.
//!
//! Every rule is idempotent: running it on its own output changes nothing.

use once_cell::sync::Lazy;
use regex::{NoExpand, Regex};
use sha2::{Digest, Sha256};

// ── LaTeX delimiter repair ───────────────────────────────────────────────────

static RE_LEFT_BRACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\\left\s*\{").unwrap());
static RE_RIGHT_BRACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\\right\s*\}").unwrap());

/// Rewrite `\left{` → `\left\{` and `\right}` → `\right\}`.
///
/// Whitespace between the command and the brace (`\left {`) is tolerated and
/// dropped. Already-escaped delimiters do not match, so the rule is idempotent.
pub fn sanitize_latex(input: &str) -> String {
    let s = RE_LEFT_BRACE.replace_all(input, NoExpand(r"\left\{"));
    RE_RIGHT_BRACE
        .replace_all(&s, NoExpand(r"\right\}"))
        .into_owned()
}

/// [`sanitize_latex`] on an optional field.
pub fn sanitize_opt(input: &Option<String>) -> Option<String> {
    input.as_deref().map(sanitize_latex)
}

// ── Dedup keys ───────────────────────────────────────────────────────────────

/// Question dedup key: all whitespace removed, lower-cased.
pub fn question_key(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Title / name dedup key: trimmed, lower-cased.
pub fn title_key(text: &str) -> String {
    text.trim().to_lowercase()
}

/// SHA-256 of a string, used as a byte-exact content fingerprint.
pub fn content_hash(text: &str) -> [u8; 32] {
    Sha256::digest(text.as_bytes()).into()
}

// ── Reply cleanup ────────────────────────────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[A-Za-z]*\s*\n(.*?)\n?```\s*$").unwrap());

/// Prepare a raw model reply for JSON decoding.
///
/// 1. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens)
/// 2. Strip outer code fences (```` ```json … ``` ````)
/// 3. Cut any prose before the first `{` and after the matching last `}`
pub fn clean_reply(input: &str) -> String {
    let s = remove_invisible_chars(input);
    let s = strip_code_fences(s.trim());
    extract_json_object(&s).to_string()
}

fn strip_code_fences(input: &str) -> String {
    match RE_OUTER_FENCES.captures(input) {
        Some(caps) => caps[1].trim().to_string(),
        None => input.to_string(),
    }
}

fn extract_json_object(input: &str) -> &str {
    match (input.find('{'), input.rfind('}')) {
        (Some(start), Some(end)) if start < end => &input[start..=end],
        _ => input.trim(),
    }
}

const INVISIBLE: &[char] = &[
    '\u{200B}', // zero-width space
    '\u{200C}', // zero-width non-joiner
    '\u{200D}', // zero-width joiner
    '\u{2060}', // word joiner
    '\u{FEFF}', // BOM
    '\u{00AD}', // soft hyphen
];

fn remove_invisible_chars(input: &str) -> String {
    input.chars().filter(|c| !INVISIBLE.contains(c)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixes_unescaped_brace_delimiters() {
        let input = r"$\left{ x \right}$";
        assert_eq!(sanitize_latex(input), r"$\left\{ x \right\}$");
    }

    #[test]
    fn tolerates_whitespace_before_brace() {
        assert_eq!(sanitize_latex(r"\left {a\right  }"), r"\left\{a\right\}");
    }

    #[test]
    fn sanitize_is_idempotent() {
        let correct = r"$$\left\{ \frac{a}{b} \right\}$$ and \left( x \right)";
        assert_eq!(sanitize_latex(correct), correct);
        let fixed = sanitize_latex(r"\left{ y \right}");
        assert_eq!(sanitize_latex(&fixed), fixed);
    }

    #[test]
    fn dollar_signs_survive_replacement() {
        assert_eq!(sanitize_latex(r"$\left{$"), r"$\left\{$");
    }

    #[test]
    fn question_key_ignores_whitespace_and_case() {
        assert_eq!(
            question_key("  Define  Entropy.\n"),
            question_key("define entropy.")
        );
        assert_ne!(question_key("Define entropy"), question_key("Define enthalpy"));
    }

    #[test]
    fn title_key_trims_and_lowercases() {
        assert_eq!(title_key("  Unit 1: Waves "), "unit 1: waves");
    }

    #[test]
    fn content_hash_is_byte_exact() {
        assert_eq!(content_hash("abc"), content_hash("abc"));
        assert_ne!(content_hash("abc"), content_hash("abc "));
    }

    #[test]
    fn clean_reply_strips_json_fence() {
        let raw = "```json\n{\"formulas\": []}\n```";
        assert_eq!(clean_reply(raw), "{\"formulas\": []}");
    }

    #[test]
    fn clean_reply_cuts_surrounding_prose() {
        let raw = "Here is the result:\n{\"a\": {\"b\": 1}}\nHope this helps!";
        assert_eq!(clean_reply(raw), "{\"a\": {\"b\": 1}}");
    }

    #[test]
    fn clean_reply_drops_invisible_characters() {
        let raw = "\u{FEFF}{\"x\":\u{200B} 1}";
        assert_eq!(clean_reply(raw), "{\"x\": 1}");
    }

    #[test]
    fn clean_reply_is_idempotent() {
        let once = clean_reply("```\n{\"k\": \"v\"}\n```");
        assert_eq!(clean_reply(&once), once);
    }
}
