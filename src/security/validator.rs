//! Prompt validation and sanitisation
//!
//! Rules are applied in a fixed order and the first failure wins. The
//! injection and SQL pattern sets are data: adding a pattern means adding a
//! string to the table, not changing code.

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

use crate::config::MAX_INPUT_LENGTH;

/// Longest whitespace-delimited token accepted, in code points.
pub const MAX_WORD_LENGTH: usize = 100;

/// Share of characters outside the allowed class before a prompt is refused.
const MAX_SPECIAL_CHAR_RATIO: f64 = 0.3;

/// Why a prompt was refused. The display text is the user-facing message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    #[error("Input cannot be empty")]
    Empty,

    #[error("Input exceeds maximum length of {0} characters")]
    TooLong(usize),

    #[error("Invalid input detected. Please remove any code or scripts.")]
    CodeLike,

    #[error("Invalid input detected. Please remove any code or scripts.")]
    SqlLike,

    #[error("Input contains too many special characters")]
    TooManySpecialCharacters,

    #[error("Invalid input detected")]
    ControlCharacters,

    #[error("Input contains words longer than {0} characters")]
    OverlongWord(usize),
}

/// Patterns that indicate script/code injection attempts.
const INJECTION_PATTERNS: &[&str] = &[
    r"(?is)<script[^>]*>.*?</script>",
    r"(?i)javascript\s*:",
    r"(?i)vbscript\s*:",
    r"(?i)\bon\w+\s*=",
    r"(?i)\b(?:eval|expression|alert|prompt|confirm|exec|system|shell)\s*\(",
    r"(?i)<iframe[^>]*>",
    r"(?i)<object[^>]*>",
    r"(?i)<embed[^>]*>",
    r"(?i)<form[^>]*>",
    r"(?i)\bdocument\s*\.",
    r"(?i)\bwindow\s*\.",
    r"(?i)__import__",
    r"(?i)\bsubprocess\b",
    r"(?i)pickle\.loads",
    r"(?i)marshal\.loads",
    r"(?i)base64\.decode",
    r"(?i)\bimport\s+os\b",
];

/// Patterns that indicate SQL injection attempts.
const SQL_PATTERNS: &[&str] = &[
    r"(?i)\bunion\s+select\b",
    r"(?i)\b(?:drop|delete|alter|create|truncate)\s+(?:table|database|index|view|from)\b",
    r"(?i)\binsert\s+into\b",
    r"(?i)\bupdate\s+\w+\s+set\b",
    r"(?is)/\*.*?\*/",
    r"--\s*$",
    r"(?i);\s*(?:drop|delete|update)\b",
];

static INJECTION: LazyLock<Vec<Regex>> = LazyLock::new(|| compile(INJECTION_PATTERNS));
static SQL: LazyLock<Vec<Regex>> = LazyLock::new(|| compile(SQL_PATTERNS));
static TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]*>").expect("tag pattern compiles"));

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(p).expect("security pattern compiles"))
        .collect()
}

/// Validate a prompt. Rules run in order; the first failure wins.
pub fn validate(prompt: &str) -> Result<(), RejectReason> {
    if prompt.trim().is_empty() {
        return Err(RejectReason::Empty);
    }
    if prompt.chars().count() > MAX_INPUT_LENGTH {
        return Err(RejectReason::TooLong(MAX_INPUT_LENGTH));
    }
    if INJECTION.iter().any(|re| re.is_match(prompt)) {
        return Err(RejectReason::CodeLike);
    }
    if SQL.iter().any(|re| re.is_match(prompt)) {
        return Err(RejectReason::SqlLike);
    }
    if special_char_ratio(prompt) > MAX_SPECIAL_CHAR_RATIO {
        return Err(RejectReason::TooManySpecialCharacters);
    }
    if prompt
        .chars()
        .any(|c| (c as u32) < 32 && !matches!(c, '\t' | '\n' | '\r'))
    {
        return Err(RejectReason::ControlCharacters);
    }
    if prompt
        .split_whitespace()
        .any(|word| word.chars().count() > MAX_WORD_LENGTH)
    {
        return Err(RejectReason::OverlongWord(MAX_WORD_LENGTH));
    }
    Ok(())
}

/// Sanitise an already-validated prompt before forwarding it upstream.
///
/// Strips `<…>` tags, escapes HTML, drops control characters other than
/// tab/newline/CR, collapses whitespace runs, and truncates to
/// [`MAX_INPUT_LENGTH`] code points. Idempotent:
/// `sanitize(sanitize(x)) == sanitize(x)`.
pub fn sanitize(prompt: &str) -> String {
    let stripped = TAG.replace_all(prompt, "");
    let printable: String = stripped
        .chars()
        .filter(|c| (*c as u32) >= 32 || matches!(c, '\t' | '\n' | '\r'))
        .collect();
    let escaped = escape_html(&printable);
    let collapsed = escaped.split_whitespace().collect::<Vec<_>>().join(" ");
    truncate_clean(collapsed, MAX_INPUT_LENGTH)
}

fn special_char_ratio(prompt: &str) -> f64 {
    let total = prompt.chars().count();
    if total == 0 {
        return 0.0;
    }
    let special = prompt
        .chars()
        .filter(|c| {
            !(c.is_ascii_alphanumeric() || c.is_whitespace() || "-.,!?'\"()".contains(*c))
        })
        .count();
    special as f64 / total as f64
}

/// Entity bodies that a leading `&` may already introduce; those ampersands
/// stay as-is so a second escape pass is a no-op.
const ENTITY_BODIES: &[&str] = &["amp;", "lt;", "gt;", "quot;", "#x27;"];

fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for (i, c) in input.char_indices() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            '&' => {
                let tail = &input[i + 1..];
                if ENTITY_BODIES.iter().any(|body| tail.starts_with(body)) {
                    out.push('&');
                } else {
                    out.push_str("&amp;");
                }
            }
            _ => out.push(c),
        }
    }
    out
}

/// Truncate to `max` code points without leaving a split escape sequence at
/// the end.
fn truncate_clean(s: String, max: usize) -> String {
    if s.chars().count() <= max {
        return s;
    }
    let cut: String = s.chars().take(max).collect();
    if let Some(pos) = cut.rfind('&') {
        let tail = &cut[pos..];
        if tail.len() <= 6 && !tail.contains(';') {
            return cut[..pos].to_string();
        }
    }
    cut
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_empty_and_whitespace_rejected() {
        assert_eq!(validate(""), Err(RejectReason::Empty));
        assert_eq!(validate("   \n\t  "), Err(RejectReason::Empty));
    }

    #[test]
    fn test_length_boundary() {
        // "a " pairs keep every token short; only total length is at stake
        let ok: String = "a ".repeat(MAX_INPUT_LENGTH / 2);
        assert_eq!(ok.chars().count(), MAX_INPUT_LENGTH);
        assert_eq!(validate(&ok), Ok(()));
        let too_long = format!("{ok}b");
        assert_eq!(
            validate(&too_long),
            Err(RejectReason::TooLong(MAX_INPUT_LENGTH))
        );
    }

    #[rstest]
    #[case("<script>alert(1)</script>")]
    #[case("<SCRIPT>alert('x')</SCRIPT>")]
    #[case("click javascript:void(0)")]
    #[case("vbscript: MsgBox")]
    #[case("<img onerror=steal()>")]
    #[case("eval (payload)")]
    #[case("<iframe src='x'>")]
    #[case("<form action='x'>")]
    #[case("document.cookie")]
    #[case("window.location")]
    #[case("__import__('os')")]
    #[case("subprocess run")]
    #[case("pickle.loads(data)")]
    #[case("base64.decode(blob)")]
    #[case("import os please")]
    fn test_injection_rejected(#[case] input: &str) {
        assert_eq!(validate(input), Err(RejectReason::CodeLike));
    }

    #[rstest]
    #[case("1 union select password from users")]
    #[case("DROP TABLE students")]
    #[case("insert into accounts values (1)")]
    #[case("update users set admin")]
    #[case("hello /* hidden */ world")]
    #[case("what is the total --")]
    #[case("x'; drop everything")]
    fn test_sql_injection_rejected(#[case] input: &str) {
        assert_eq!(validate(input), Err(RejectReason::SqlLike));
    }

    #[test]
    fn test_injection_reject_message_is_generic() {
        let reason = validate("<script>alert(1)</script>").unwrap_err();
        assert_eq!(
            reason.to_string(),
            "Invalid input detected. Please remove any code or scripts."
        );
    }

    #[test]
    fn test_special_char_ratio_boundary() {
        // 3 of 10 characters special: exactly 0.30, accepted
        assert_eq!(validate("abcdefg###"), Ok(()));
        // 4 of 10: rejected
        assert_eq!(
            validate("abcdef####"),
            Err(RejectReason::TooManySpecialCharacters)
        );
    }

    #[test]
    fn test_control_characters_rejected() {
        assert_eq!(validate("hello\x00world"), Err(RejectReason::ControlCharacters));
        assert_eq!(validate("bell\x07sound"), Err(RejectReason::ControlCharacters));
        // Tab, newline and CR are fine
        assert_eq!(validate("line one\nline\ttwo\r\n"), Ok(()));
    }

    #[test]
    fn test_word_length_boundary() {
        let ok = format!("start {} end", "w".repeat(MAX_WORD_LENGTH));
        assert_eq!(validate(&ok), Ok(()));
        let too_long = format!("start {} end", "w".repeat(MAX_WORD_LENGTH + 1));
        assert_eq!(
            validate(&too_long),
            Err(RejectReason::OverlongWord(MAX_WORD_LENGTH))
        );
    }

    #[test]
    fn test_sanitize_strips_tags_and_escapes() {
        assert_eq!(sanitize("hello <b>world</b>"), "hello world");
        assert_eq!(sanitize("a & b"), "a &amp; b");
        assert_eq!(sanitize("5 > 3 is true"), "5 &gt; 3 is true");
    }

    #[test]
    fn test_sanitize_collapses_whitespace() {
        assert_eq!(sanitize("too   many\t\tspaces\n\nhere"), "too many spaces here");
    }

    #[test]
    fn test_sanitize_is_idempotent() {
        let cases = [
            "plain text",
            "a & b < c",
            "quotes \" and ' mixed",
            "tags <i>inside</i> & entities &amp; already",
            "   leading and trailing   ",
        ];
        for case in cases {
            let once = sanitize(case);
            assert_eq!(sanitize(&once), once, "not idempotent for {case:?}");
        }
    }

    #[test]
    fn test_sanitize_enforces_length_and_control_invariants() {
        let long = format!("{} & {}", "a".repeat(3000), "b".repeat(3000));
        let clean = sanitize(&long);
        assert!(clean.chars().count() <= MAX_INPUT_LENGTH);
        assert!(clean
            .chars()
            .all(|c| (c as u32) >= 32 || matches!(c, '\t' | '\n' | '\r')));
        // Truncation never leaves a split entity behind
        assert_eq!(sanitize(&clean), clean);
    }
}
