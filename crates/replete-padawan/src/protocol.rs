// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Padawan wire protocol
//!
//! One JSON object per line in both directions: a [`Command`] in, a
//! [`Report`] out, correlated by id.

use serde::{Deserialize, Serialize};

/// The exception text reported for every evaluation in flight when a
/// command-line padawan dies.
pub const DIED: &str = "CMDL died.";

/// An evaluation request sent to a padawan.
///
/// The padawan resolves each of `imports` via dynamic `import()` in
/// parallel, binds the resulting array as `$imports` on its global object,
/// indirect-`eval`s `script`, and — when `wait` is set — awaits the result
/// before inspecting it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Command {
    /// The script to evaluate
    pub script: String,
    /// Module URLs to import and bind as `$imports`
    #[serde(default)]
    pub imports: Vec<String>,
    /// Whether to await the result before inspecting it
    #[serde(default)]
    pub wait: bool,
    /// Correlation id, echoed in the report
    pub id: u64,
}

/// The padawan's answer to a [`Command`].
///
/// Exactly one of `evaluation` and `exception` is present; both are
/// strings produced by the padawan's platform-appropriate inspector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    /// Correlation id from the command
    pub id: u64,
    /// Printed representation of the resulting value
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evaluation: Option<String>,
    /// Printed representation of the thrown exception
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exception: Option<String>,
}

impl Report {
    /// The synthetic report delivered when the padawan dies mid-flight.
    pub fn died(id: u64) -> Self {
        Self {
            id,
            evaluation: None,
            exception: Some(DIED.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_round_trip() {
        let command = Command {
            script: "1 + 1".to_string(),
            imports: vec!["http://127.0.0.1:9000/v0/abcd/a.js".to_string()],
            wait: true,
            id: 7,
        };
        let line = serde_json::to_string(&command).unwrap();
        let back: Command = serde_json::from_str(&line).unwrap();
        assert_eq!(back.id, 7);
        assert!(back.wait);
        assert_eq!(back.imports.len(), 1);
    }

    #[test]
    fn test_report_omits_missing_fields() {
        let report = Report {
            id: 1,
            evaluation: Some("2".to_string()),
            exception: None,
        };
        let line = serde_json::to_string(&report).unwrap();
        assert!(!line.contains("exception"));

        let died = serde_json::to_string(&Report::died(2)).unwrap();
        assert!(died.contains("CMDL died."));
        assert!(!died.contains("evaluation"));
    }

    #[test]
    fn test_report_accepts_sparse_json() {
        let report: Report = serde_json::from_str("{\"id\": 3, \"evaluation\": \"42\"}").unwrap();
        assert_eq!(report.id, 3);
        assert_eq!(report.evaluation.as_deref(), Some("42"));
        assert_eq!(report.exception, None);
    }
}
