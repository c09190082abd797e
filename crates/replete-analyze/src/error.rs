// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Error types for module analysis and rewriting

use thiserror::Error;

/// Result type for analysis operations
pub type Result<T> = std::result::Result<T, AnalyzeError>;

/// Errors that can occur while analyzing or rewriting a module
#[derive(Debug, Clone, Error)]
pub enum AnalyzeError {
    /// The source did not parse as an ECMAScript module
    #[error("SyntaxError: {message} (line {line})")]
    Parse {
        /// Parser diagnostic message
        message: String,
        /// 1-based line of the first error
        line: usize,
    },

    /// Two rewrite edits covered overlapping ranges
    #[error("Overlapping edits at byte {at}")]
    OverlappingEdits {
        /// Byte offset where the overlap begins
        at: usize,
    },

    /// An edit range fell outside the source or off a char boundary
    #[error("Edit range {start}..{end} is not valid for this source")]
    InvalidRange {
        /// Range start
        start: usize,
        /// Range end
        end: usize,
    },

    /// A rewrite was given fewer resolved specifiers than the module has sites
    #[error("Expected {expected} resolved specifiers, got {got}")]
    SpecifierArity {
        /// Number of dynamic sites found by analysis
        expected: usize,
        /// Number of resolved strings supplied
        got: usize,
    },
}
