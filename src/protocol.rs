// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! The host protocol
//!
//! One JSON object per line in both directions on stdin/stdout. A host
//! command carries a module fragment to evaluate; a result carries
//! exactly one of `evaluation`, `exception`, `out`, or `err`, plus the
//! command's id when one was given.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An evaluation request from the host.
#[derive(Debug, Clone, Deserialize)]
pub struct HostCommand {
    /// The module fragment to evaluate
    pub source: String,
    /// Parent module URL for relative imports
    pub locator: Option<String>,
    /// Target runtime (`node`, `deno`, `bun`, `tjs`, `browser`)
    pub platform: Option<String>,
    /// Scope name; evaluations sharing a name share their identifiers
    #[serde(default)]
    pub scope: String,
    /// Echoed back on results
    pub id: Option<Value>,
}

/// A result delivered to the host.
#[derive(Debug, Clone, Serialize)]
pub struct HostResult {
    /// Printed value of a completed evaluation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evaluation: Option<String>,
    /// Printed exception of a failed evaluation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exception: Option<String>,
    /// A chunk of padawan stdout
    #[serde(skip_serializing_if = "Option::is_none")]
    pub out: Option<String>,
    /// A chunk of padawan stderr
    #[serde(skip_serializing_if = "Option::is_none")]
    pub err: Option<String>,
    /// The id of the command this result answers
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
}

impl HostResult {
    fn empty() -> Self {
        Self {
            evaluation: None,
            exception: None,
            out: None,
            err: None,
            id: None,
        }
    }

    /// A completed evaluation.
    pub fn evaluation(text: String, id: Option<Value>) -> Self {
        Self {
            evaluation: Some(text),
            id,
            ..Self::empty()
        }
    }

    /// A failed evaluation (or a rejected request).
    pub fn exception(text: String, id: Option<Value>) -> Self {
        Self {
            exception: Some(text),
            id,
            ..Self::empty()
        }
    }

    /// Padawan stdout.
    pub fn out(text: &str) -> Self {
        Self {
            out: Some(text.to_string()),
            ..Self::empty()
        }
    }

    /// Padawan stderr.
    pub fn err(text: &str) -> Self {
        Self {
            err: Some(text.to_string()),
            ..Self::empty()
        }
    }
}
