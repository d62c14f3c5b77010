//! Extraction of included-file (copybook) references from source text.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

static COPY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bCOPY\s+(\S+)").expect("copy pattern should be valid"));

/// Names referenced by `COPY <name>` statements anywhere on a line.
///
/// A trailing period is dropped and surrounding quotes are removed. Lines whose
/// indicator column marks a comment (`*` or `/` in column 7) are skipped.
/// Output is sorted and deduplicated.
pub fn referenced_dependencies(source: &str) -> BTreeSet<String> {
    let mut names = BTreeSet::new();
    for line in source.lines() {
        if is_comment_line(line) {
            continue;
        }
        for caps in COPY_RE.captures_iter(line) {
            let name = caps[1]
                .trim_end_matches('.')
                .trim_matches(|c| c == '"' || c == '\'');
            if !name.is_empty() {
                names.insert(name.to_string());
            }
        }
    }
    names
}

fn is_comment_line(line: &str) -> bool {
    matches!(line.chars().nth(6), Some('*' | '/'))
}
