//! Deterministic classification of external feedback text.

use std::sync::LazyLock;

use regex::Regex;

use crate::core::state::FeedbackKind;

static COMPILE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?ix)
        syntax \s* error
        | compil\w* \s+ (error|fail\w*)
        | \berror \s* \(? \s* compil
        | \b(undefined|undeclared|unresolved) \s+ (symbol|reference|identifier|variable|name|data-name|paragraph)
        | \bIGY[A-Z]{2}\d{4}-[SEU]\b
        | \b(is|was) \s+ not \s+ defined\b",
    )
    .expect("compile pattern should be valid")
});

static RUNTIME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?ix)
        run-?time \s+ (error|exception|failure)
        | unhandled \s+ exception
        | exception \s+ (in|at|occurred|raised|thrown)\b
        | (?-i:\b[A-Z]\w*Exception\b)
        | \b[1-9]\d* \s+ exceptions?\b
        | \babend\b
        | \bS?0C[0-9A-F]\b
        | segmentation \s+ fault
        | \bpanicked \s+ at\b
        | traceback \s* \( \s* most \s+ recent
        | \bfatal \s* (error\b|:)
        | execution \s+ error
        | \b(exit|return) \s+ (code|status) \s* [:=]? \s* [1-9]\d*",
    )
    .expect("runtime pattern should be valid")
});

/// Zero count directly after a match ("errors: 0").
static ZERO_COUNT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^s?\s*[:=]?\s*0\b").expect("zero count pattern should be valid"));

const NEGATING_WORDS: [&str; 5] = ["no", "0", "zero", "without", "none"];

/// A match reads as a clean report: "no undefined symbols", "compile errors: 0".
fn is_negated(text: &str, start: usize, end: usize) -> bool {
    let line_start = text[..start].rfind('\n').map_or(0, |idx| idx + 1);
    let previous = text[line_start..start]
        .trim_end()
        .rsplit(|c: char| !c.is_ascii_alphanumeric())
        .next()
        .unwrap_or_default();
    NEGATING_WORDS
        .iter()
        .any(|word| previous.eq_ignore_ascii_case(word))
        || ZERO_COUNT_RE.is_match(&text[end..])
}

fn reports(pattern: &Regex, raw: &str) -> bool {
    pattern
        .find_iter(raw)
        .any(|m| !is_negated(raw, m.start(), m.end()))
}

/// Classify raw feedback into exactly one of compile error, runtime error, or
/// benign log. Compile patterns are checked first; unmatched text is benign.
pub fn classify_feedback(raw: &str) -> FeedbackKind {
    if reports(&COMPILE_RE, raw) {
        FeedbackKind::CompileError
    } else if reports(&RUNTIME_RE, raw) {
        FeedbackKind::RuntimeError
    } else {
        FeedbackKind::BenignLog
    }
}

/// Map a model-provided message type onto a [`FeedbackKind`].
///
/// Accepts both the model vocabulary (`compilation_error`, `execution_error`,
/// `logs`) and the internal one. Unknown labels return `None`.
pub fn parse_message_type(label: &str) -> Option<FeedbackKind> {
    match label.trim().to_ascii_lowercase().as_str() {
        "compilation_error" | "compile_error" => Some(FeedbackKind::CompileError),
        "execution_error" | "runtime_error" => Some(FeedbackKind::RuntimeError),
        "logs" | "log" | "benign_log" => Some(FeedbackKind::BenignLog),
        _ => None,
    }
}
