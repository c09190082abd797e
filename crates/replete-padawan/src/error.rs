// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Error types for padawan transports

use thiserror::Error;

/// Result type for padawan operations
pub type Result<T> = std::result::Result<T, PadawanError>;

/// Errors that can occur while spawning or talking to a padawan
#[derive(Debug, Error)]
pub enum PadawanError {
    /// Socket or listener failure
    #[error("Transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// The runtime executable could not be spawned
    #[error("Failed to spawn '{program}': {reason}")]
    Spawn {
        /// The runtime program name
        program: String,
        /// Stringified spawn error
        reason: String,
    },

    /// The padawan died or was never connected
    #[error("{0}")]
    Died(&'static str),

    /// A wire message could not be encoded or decoded
    #[error("Protocol error: {0}")]
    Protocol(#[from] serde_json::Error),
}
