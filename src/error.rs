// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Error types for the REPL coordinator and source server

use thiserror::Error;

/// Result type for coordinator operations
pub type Result<T> = std::result::Result<T, ReplError>;

/// Errors that can occur while coordinating evaluations or serving source
#[derive(Debug, Error)]
pub enum ReplError {
    /// Resolution, read, or cache failure
    #[error(transparent)]
    Module(#[from] replete_modules::ModuleError),

    /// Parse or rewrite failure
    #[error(transparent)]
    Analyze(#[from] replete_analyze::AnalyzeError),

    /// Padawan transport failure
    #[error(transparent)]
    Padawan(#[from] replete_padawan::PadawanError),

    /// The requested resource has no known content type
    #[error("Unknown content type: {locator}")]
    UnknownContentType {
        /// The locator that was requested
        locator: String,
    },

    /// The request path is not a valid locator
    #[error("Not found: {path}")]
    NotFound {
        /// The request path
        path: String,
    },

    /// Listener or I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
