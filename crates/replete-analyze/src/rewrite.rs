// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Range-based source edits that never change the line count

use crate::analyze::SpecifierSite;
use crate::error::{AnalyzeError, Result};
use std::ops::Range;

/// A single replacement of a byte range with new text.
///
/// An empty range is an insertion. Replacement text must not contain more
/// newlines than the text it replaces; missing newlines are padded back in
/// so that every edited source keeps its original line count.
#[derive(Debug, Clone)]
pub struct Edit {
    /// Byte range of the original source to replace
    pub range: Range<usize>,
    /// Replacement text
    pub text: String,
}

impl Edit {
    /// Replace `range` with `text`
    pub fn replace(range: Range<usize>, text: impl Into<String>) -> Self {
        Self {
            range,
            text: text.into(),
        }
    }

    /// Insert `text` at byte offset `at`
    pub fn insert(at: usize, text: impl Into<String>) -> Self {
        Self {
            range: at..at,
            text: text.into(),
        }
    }

    /// Erase `range`, leaving only its newlines behind
    pub fn erase(range: Range<usize>) -> Self {
        Self {
            range,
            text: String::new(),
        }
    }
}

/// Apply a set of non-overlapping edits to `source`.
///
/// Edits may be supplied in any order. Insertions at the same offset are
/// applied in the order given. Each replacement is padded with newlines
/// until it contains as many as the text it removed, so
/// `count_lines(output) == count_lines(input)` always holds.
pub fn apply(source: &str, mut edits: Vec<Edit>) -> Result<String> {
    edits.sort_by(|a, b| {
        a.range
            .start
            .cmp(&b.range.start)
            .then(a.range.end.cmp(&b.range.end))
    });

    let mut output = String::with_capacity(source.len());
    let mut cursor = 0usize;
    for edit in &edits {
        let Range { start, end } = edit.range.clone();
        if start > end || end > source.len() || !source.is_char_boundary(start) || !source.is_char_boundary(end)
        {
            return Err(AnalyzeError::InvalidRange { start, end });
        }
        if start < cursor {
            return Err(AnalyzeError::OverlappingEdits { at: start });
        }
        output.push_str(&source[cursor..start]);
        let removed = &source[start..end];
        output.push_str(&edit.text);
        let removed_newlines = count_newlines(removed);
        let kept_newlines = count_newlines(&edit.text);
        if kept_newlines > removed_newlines {
            return Err(AnalyzeError::InvalidRange { start, end });
        }
        for _ in kept_newlines..removed_newlines {
            output.push('\n');
        }
        cursor = end;
    }
    output.push_str(&source[cursor..]);
    Ok(output)
}

/// Replace every specifier site with its resolved counterpart, quoted as a
/// string literal. `resolved` must be parallel to `sites`.
pub fn replace_specifiers(
    source: &str,
    sites: &[SpecifierSite],
    resolved: &[String],
) -> Result<String> {
    if sites.len() != resolved.len() {
        return Err(AnalyzeError::SpecifierArity {
            expected: sites.len(),
            got: resolved.len(),
        });
    }
    let edits = sites
        .iter()
        .zip(resolved)
        .map(|(site, replacement)| {
            Edit::replace(site.range.clone(), quote(replacement))
        })
        .collect();
    apply(source, edits)
}

/// Quote a string as a JavaScript string literal. JSON escaping is valid
/// JavaScript, including the U+2028/U+2029 cases.
pub fn quote(text: &str) -> String {
    serde_json::to_string(text).unwrap_or_else(|_| String::from("\"\""))
}

fn count_newlines(text: &str) -> usize {
    text.bytes().filter(|&b| b == b'\n').count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(s: &str) -> usize {
        s.split('\n').count()
    }

    #[test]
    fn test_erase_preserves_lines() {
        let source = "import {\n    a\n} from \"m\";\nlet b = a;\n";
        let out = apply(source, vec![Edit::erase(0..26)]).unwrap();
        assert_eq!(lines(out.as_str()), lines(source));
        assert!(out.contains("let b = a;"));
        assert!(!out.contains("import"));
    }

    #[test]
    fn test_insert_and_replace() {
        let source = "const x = 1;";
        let out = apply(
            source,
            vec![Edit::erase(0..5), Edit::insert(12, " x;")],
        )
        .unwrap();
        assert_eq!(out, " x = 1; x;");
    }

    #[test]
    fn test_insertions_keep_given_order_at_same_offset() {
        let out = apply(
            "abc",
            vec![Edit::insert(0, "1"), Edit::insert(0, "2")],
        )
        .unwrap();
        assert_eq!(out, "12abc");
    }

    #[test]
    fn test_overlap_rejected() {
        let err = apply(
            "abcdef",
            vec![Edit::erase(0..4), Edit::erase(2..6)],
        )
        .unwrap_err();
        assert!(matches!(err, AnalyzeError::OverlappingEdits { at: 2 }));
    }

    #[test]
    fn test_out_of_bounds_rejected() {
        let err = apply("ab", vec![Edit::erase(0..9)]).unwrap_err();
        assert!(matches!(err, AnalyzeError::InvalidRange { .. }));
    }

    #[test]
    fn test_multiline_replacement_pads() {
        let source = "export * from \"./a.js\";\nexport {\n    b\n} from \"./b.js\";\n1 + 1;\n";
        let out = apply(source, vec![Edit::erase(0..23), Edit::erase(24..55)]).unwrap();
        assert_eq!(lines(out.as_str()), lines(source));
        assert!(out.ends_with("1 + 1;\n"));
    }
}
