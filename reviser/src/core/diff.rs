//! Line diff between the original source and a generated revision.
//!
//! Classic LCS table; inputs are single source files, so the quadratic table is
//! acceptable. Very large inputs fall back to a whole-file replace.

/// One line of a diff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffLine<'a> {
    Same(&'a str),
    Removed(&'a str),
    Added(&'a str),
}

const MAX_TABLE_CELLS: usize = 25_000_000;

/// Compute a line diff from `old` to `new`.
pub fn line_diff<'a>(old: &'a str, new: &'a str) -> Vec<DiffLine<'a>> {
    let old_lines: Vec<&str> = old.lines().collect();
    let new_lines: Vec<&str> = new.lines().collect();
    let (n, m) = (old_lines.len(), new_lines.len());

    if n.saturating_mul(m) > MAX_TABLE_CELLS {
        let mut out: Vec<DiffLine<'a>> = old_lines.into_iter().map(DiffLine::Removed).collect();
        out.extend(new_lines.into_iter().map(DiffLine::Added));
        return out;
    }

    // lcs[i][j] = LCS length of old[i..] and new[j..]
    let mut lcs = vec![vec![0u32; m + 1]; n + 1];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            lcs[i][j] = if old_lines[i] == new_lines[j] {
                lcs[i + 1][j + 1] + 1
            } else {
                lcs[i + 1][j].max(lcs[i][j + 1])
            };
        }
    }

    let mut out = Vec::with_capacity(n.max(m));
    let (mut i, mut j) = (0, 0);
    while i < n && j < m {
        if old_lines[i] == new_lines[j] {
            out.push(DiffLine::Same(old_lines[i]));
            i += 1;
            j += 1;
        } else if lcs[i + 1][j] >= lcs[i][j + 1] {
            out.push(DiffLine::Removed(old_lines[i]));
            i += 1;
        } else {
            out.push(DiffLine::Added(new_lines[j]));
            j += 1;
        }
    }
    out.extend(old_lines[i..].iter().copied().map(DiffLine::Removed));
    out.extend(new_lines[j..].iter().copied().map(DiffLine::Added));
    out
}

/// Count of (added, removed) lines.
pub fn diff_stats(diff: &[DiffLine<'_>]) -> (usize, usize) {
    diff.iter().fold((0, 0), |(added, removed), line| match line {
        DiffLine::Added(_) => (added + 1, removed),
        DiffLine::Removed(_) => (added, removed + 1),
        DiffLine::Same(_) => (added, removed),
    })
}
