//! Line-level diff between two content snapshots.
//!
//! Classic O(n*m) longest-common-subsequence table with a backtrack that
//! prefers "added" over "removed" on ties, so output is deterministic for
//! a given input pair.

use colored::Colorize;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Context,
    Added,
    Removed,
}

/// One line of diff output.
#[derive(Debug, Clone, Serialize)]
pub struct Change {
    #[serde(rename = "type")]
    pub kind: ChangeKind,
    pub line: String,
    #[serde(rename = "line_num")]
    pub num: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DiffResult {
    pub has_changes: bool,
    pub changes: Vec<Change>,
    pub summary: String,
    #[serde(rename = "lines_added")]
    pub added: usize,
    #[serde(rename = "lines_removed")]
    pub removed: usize,
}

/// Compute a line-based diff between old and new content.
pub fn diff(old_content: &str, new_content: &str) -> DiffResult {
    let mut result = DiffResult::default();

    if old_content == new_content {
        result.summary = "No changes".to_string();
        return result;
    }

    result.has_changes = true;

    let old_lines: Vec<&str> = old_content.split('\n').collect();
    let new_lines: Vec<&str> = new_content.split('\n').collect();

    let table = lcs_table(&old_lines, &new_lines);
    result.changes = backtrack(&table, &old_lines, &new_lines);

    for c in &result.changes {
        match c.kind {
            ChangeKind::Added => result.added += 1,
            ChangeKind::Removed => result.removed += 1,
            ChangeKind::Context => {}
        }
    }

    result.summary = format!("+{} lines, -{} lines", result.added, result.removed);
    result
}

/// Render a diff with colored +/- markers and a file-style header.
pub fn format_unified(d: &DiffResult, old_name: &str, new_name: &str) -> String {
    if !d.has_changes {
        return "No changes detected.\n".to_string();
    }

    let mut out = String::new();
    out.push_str(&format!("--- {}\n+++ {}\n", old_name, new_name));

    for c in &d.changes {
        match c.kind {
            ChangeKind::Removed => out.push_str(&format!("{}\n", format!("- {}", c.line).red())),
            ChangeKind::Added => out.push_str(&format!("{}\n", format!("+ {}", c.line).green())),
            ChangeKind::Context => out.push_str(&format!("  {}\n", c.line)),
        }
    }
    out
}

/// Render a diff without color codes (for --json or piping).
pub fn format_plain(d: &DiffResult) -> String {
    if !d.has_changes {
        return "No changes detected.\n".to_string();
    }

    let mut out = String::new();
    for c in &d.changes {
        match c.kind {
            ChangeKind::Removed => out.push_str(&format!("- {}\n", c.line)),
            ChangeKind::Added => out.push_str(&format!("+ {}\n", c.line)),
            ChangeKind::Context => out.push_str(&format!("  {}\n", c.line)),
        }
    }
    out
}

fn lcs_table(a: &[&str], b: &[&str]) -> Vec<Vec<usize>> {
    let m = a.len();
    let n = b.len();
    let mut table = vec![vec![0usize; n + 1]; m + 1];
    for i in 1..=m {
        for j in 1..=n {
            if a[i - 1] == b[j - 1] {
                table[i][j] = table[i - 1][j - 1] + 1;
            } else if table[i - 1][j] >= table[i][j - 1] {
                table[i][j] = table[i - 1][j];
            } else {
                table[i][j] = table[i][j - 1];
            }
        }
    }
    table
}

fn backtrack(table: &[Vec<usize>], a: &[&str], b: &[&str]) -> Vec<Change> {
    let mut changes = Vec::new();
    let mut i = a.len();
    let mut j = b.len();

    while i > 0 || j > 0 {
        if i > 0 && j > 0 && a[i - 1] == b[j - 1] {
            changes.push(Change {
                kind: ChangeKind::Context,
                line: a[i - 1].to_string(),
                num: i,
            });
            i -= 1;
            j -= 1;
        } else if j > 0 && (i == 0 || table[i][j - 1] >= table[i - 1][j]) {
            // Tie-break: take the "added" branch so output is deterministic
            changes.push(Change {
                kind: ChangeKind::Added,
                line: b[j - 1].to_string(),
                num: j,
            });
            j -= 1;
        } else {
            changes.push(Change {
                kind: ChangeKind::Removed,
                line: a[i - 1].to_string(),
                num: i,
            });
            i -= 1;
        }
    }

    changes.reverse();
    changes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_inputs_short_circuit() {
        let d = diff("a\nb\nc", "a\nb\nc");
        assert!(!d.has_changes);
        assert!(d.changes.is_empty());
        assert_eq!(d.summary, "No changes");
        assert_eq!(d.added, 0);
        assert_eq!(d.removed, 0);
    }

    #[test]
    fn single_line_replacement() {
        let d = diff("a\nb\nc", "a\nx\nc");
        assert!(d.has_changes);
        assert_eq!(d.added, 1);
        assert_eq!(d.removed, 1);

        let kinds: Vec<(ChangeKind, &str)> =
            d.changes.iter().map(|c| (c.kind, c.line.as_str())).collect();
        assert_eq!(
            kinds,
            vec![
                (ChangeKind::Context, "a"),
                (ChangeKind::Removed, "b"),
                (ChangeKind::Added, "x"),
                (ChangeKind::Context, "c"),
            ]
        );
    }

    #[test]
    fn pure_addition_and_removal() {
        let d = diff("a\nb", "a\nb\nc");
        assert_eq!(d.added, 1);
        assert_eq!(d.removed, 0);

        let d = diff("a\nb\nc", "a\nc");
        assert_eq!(d.added, 0);
        assert_eq!(d.removed, 1);
    }

    #[test]
    fn added_and_removed_counts_are_symmetric() {
        let cases = [
            ("a\nb\nc", "a\nx\nc"),
            ("", "one\ntwo"),
            ("x\ny\nz", "z\ny\nx"),
            ("hello world", "hello\nworld"),
        ];
        for (a, b) in cases {
            let fwd = diff(a, b);
            let rev = diff(b, a);
            assert_eq!(fwd.added, rev.removed, "{:?} vs {:?}", a, b);
            assert_eq!(fwd.removed, rev.added, "{:?} vs {:?}", a, b);
        }
    }

    #[test]
    fn plain_format_marks_lines() {
        let d = diff("a\nb", "a\nc");
        let out = format_plain(&d);
        assert_eq!(out, "  a\n- b\n+ c\n");
    }

    #[test]
    fn unified_format_has_header() {
        let d = diff("a", "b");
        let out = format_unified(&d, "old", "new");
        assert!(out.starts_with("--- old\n+++ new\n"));
    }

    #[test]
    fn no_change_format() {
        let d = diff("same", "same");
        assert_eq!(format_plain(&d), "No changes detected.\n");
        assert_eq!(format_unified(&d, "a", "b"), "No changes detected.\n");
    }
}
