//! Code-fence handling for model output.
//!
//! Models wrap code in a fenced block (```` ```cobol ... ``` ````). Long outputs
//! arrive in several continuation rounds; each round may repeat the opening
//! fence, and only the last one carries the closing fence.

/// Fence delimiter used by the models.
pub const FENCE: &str = "```";

/// Line a model writes at the end of an answer that stops before the file is
/// complete. It never appears in the answer that closes the code block.
pub const CONTINUATION_MARKER: &str = "Continuation";

fn is_marker_line(line: &str) -> bool {
    line.trim()
        .trim_matches(|c: char| matches!(c, '(' | ')' | '[' | ']' | '.' | ':' | '*'))
        .eq_ignore_ascii_case(CONTINUATION_MARKER)
}

/// Split continuation marker lines off a chunk.
///
/// Marker lines at the start are dropped (models sometimes echo the marker
/// when resuming). Returns the remaining text and whether the chunk ended with
/// a marker, meaning more output follows.
pub fn split_continuation_marker(chunk: &str) -> (&str, bool) {
    let mut body = chunk;
    loop {
        let (first, rest) = body.split_once('\n').unwrap_or((body, ""));
        if !is_marker_line(first) {
            break;
        }
        body = rest;
    }

    let mut more = false;
    loop {
        let trimmed = body.trim_end();
        let (head, last) = match trimmed.rfind('\n') {
            Some(idx) => (&trimmed[..idx + 1], &trimmed[idx + 1..]),
            None => ("", trimmed),
        };
        if last.is_empty() || !is_marker_line(last) {
            break;
        }
        body = head;
        more = true;
    }
    (body, more)
}

/// Remove a leading opening fence (```` ``` ```` plus an optional language tag
/// and the rest of that line).
///
/// A fence with nothing after it is a closing fence and is left alone.
pub fn strip_opening_fence(text: &str) -> &str {
    let trimmed = text.trim_start();
    let Some(rest) = trimmed.strip_prefix(FENCE) else {
        return text;
    };
    let tag_len = rest
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '+'))
        .unwrap_or(rest.len());
    let after_tag = &rest[tag_len..];
    let body = match after_tag.find('\n') {
        Some(idx) if after_tag[..idx].trim().is_empty() => &after_tag[idx + 1..],
        Some(_) => after_tag.trim_start_matches([' ', '\t']),
        None => after_tag.trim_start(),
    };
    if body.trim().is_empty() { text } else { body }
}

/// Remove a closing fence that ends `text`, keeping the newline before it.
pub fn strip_trailing_fence(text: &str) -> &str {
    text.trim_end().strip_suffix(FENCE).unwrap_or(text)
}

/// Remove everything from the last closing fence onward.
pub fn strip_closing_fence(text: &str) -> &str {
    match text.rfind(FENCE) {
        Some(idx) => &text[..idx],
        None => text,
    }
}

/// Strip both fences once and trim surrounding whitespace.
pub fn sanitize(text: &str) -> String {
    strip_closing_fence(strip_opening_fence(text)).trim().to_string()
}

/// True when accumulation may stop: the text ends with the closing fence and
/// the latest chunk did not end with a continuation marker.
pub fn is_complete(accumulated: &str, more_follows: bool) -> bool {
    !more_follows && accumulated.trim_end().ends_with(FENCE)
}
