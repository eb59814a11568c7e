//! Line-level diff between two snapshot contents.

use serde::Serialize;
use similar::{capture_diff_slices, Algorithm, DiffOp};
use std::borrow::Cow;

/// Kind of a diff line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LineTag {
    Unchanged,
    Added,
    Removed,
}

/// One line of a diff with its 1-based position on each side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiffLine {
    pub tag: LineTag,
    /// Line number in the old content; `None` for added lines.
    pub old_line: Option<usize>,
    /// Line number in the new content; `None` for removed lines.
    pub new_line: Option<usize>,
    pub text: String,
}

/// Ordered edit script from one content to another.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiffResult {
    pub lines: Vec<DiffLine>,
}

impl DiffResult {
    /// Whether both sides were identical.
    pub fn is_unchanged(&self) -> bool {
        self.lines.iter().all(|l| l.tag == LineTag::Unchanged)
    }

    pub fn added_count(&self) -> usize {
        self.count(LineTag::Added)
    }

    pub fn removed_count(&self) -> usize {
        self.count(LineTag::Removed)
    }

    /// Rebuild the old side (line endings normalized to `\n`).
    pub fn old_text(&self) -> String {
        self.side(LineTag::Added)
    }

    /// Rebuild the new side by applying the edit script to the old one.
    pub fn new_text(&self) -> String {
        self.side(LineTag::Removed)
    }

    fn count(&self, tag: LineTag) -> usize {
        self.lines.iter().filter(|l| l.tag == tag).count()
    }

    fn side(&self, excluded: LineTag) -> String {
        self.lines
            .iter()
            .filter(|l| l.tag != excluded)
            .map(|l| l.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Compute a minimal line diff from `old` to `new`.
///
/// `\r\n` and lone `\r` count as `\n`, so contents that only differ in line
/// endings compare equal. Empty content has no lines; a trailing newline
/// yields a trailing empty line.
pub fn diff(old: &str, new: &str) -> DiffResult {
    let old = normalize_newlines(old);
    let new = normalize_newlines(new);
    let old_lines = split_lines(&old);
    let new_lines = split_lines(&new);

    let mut lines = Vec::with_capacity(old_lines.len().max(new_lines.len()));
    let removed = |lines: &mut Vec<DiffLine>, index: usize, len: usize| {
        for i in index..index + len {
            lines.push(DiffLine {
                tag: LineTag::Removed,
                old_line: Some(i + 1),
                new_line: None,
                text: old_lines[i].to_string(),
            });
        }
    };
    let added = |lines: &mut Vec<DiffLine>, index: usize, len: usize| {
        for i in index..index + len {
            lines.push(DiffLine {
                tag: LineTag::Added,
                old_line: None,
                new_line: Some(i + 1),
                text: new_lines[i].to_string(),
            });
        }
    };

    for op in capture_diff_slices(Algorithm::Myers, &old_lines, &new_lines) {
        match op {
            DiffOp::Equal {
                old_index,
                new_index,
                len,
            } => {
                for i in 0..len {
                    lines.push(DiffLine {
                        tag: LineTag::Unchanged,
                        old_line: Some(old_index + i + 1),
                        new_line: Some(new_index + i + 1),
                        text: old_lines[old_index + i].to_string(),
                    });
                }
            }
            DiffOp::Delete {
                old_index, old_len, ..
            } => removed(&mut lines, old_index, old_len),
            DiffOp::Insert {
                new_index, new_len, ..
            } => added(&mut lines, new_index, new_len),
            DiffOp::Replace {
                old_index,
                old_len,
                new_index,
                new_len,
            } => {
                removed(&mut lines, old_index, old_len);
                added(&mut lines, new_index, new_len);
            }
        }
    }

    DiffResult { lines }
}

fn normalize_newlines(content: &str) -> Cow<'_, str> {
    if content.contains('\r') {
        Cow::Owned(content.replace("\r\n", "\n").replace('\r', "\n"))
    } else {
        Cow::Borrowed(content)
    }
}

fn split_lines(content: &str) -> Vec<&str> {
    if content.is_empty() {
        Vec::new()
    } else {
        content.split('\n').collect()
    }
}
