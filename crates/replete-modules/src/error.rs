//! Error types for resolution, caching, and versioning.

use thiserror::Error;

/// Result type for module operations.
pub type Result<T> = std::result::Result<T, ModuleError>;

/// Errors that can occur while resolving, reading, or versioning modules.
///
/// The enum is `Clone` because in-flight reads are shared between
/// concurrent callers, each of which receives the same outcome.
#[derive(Debug, Clone, Error)]
pub enum ModuleError {
    /// No ancestor `node_modules` directory contains the package
    #[error("Package not found: '{specifier}' from {parent}")]
    PackageNotFound {
        /// The bare specifier
        specifier: String,
        /// The importing module
        parent: String,
    },

    /// The package exists but its manifest does not export the subpath
    #[error("Not exported: '{specifier}' from {parent}")]
    NotExported {
        /// The bare specifier
        specifier: String,
        /// The importing module
        parent: String,
    },

    /// A specifier or locator could not be interpreted as a URL
    #[error("Invalid locator: {locator}")]
    InvalidLocator {
        /// The offending text
        locator: String,
    },

    /// Reading the resource failed
    #[error("Read failed for {locator}: {reason}")]
    Read {
        /// The locator that was being read
        locator: String,
        /// Stringified I/O error
        reason: String,
    },

    /// A read was attempted outside the root locator
    #[error("Forbidden: {locator}")]
    Forbidden {
        /// The locator that was refused
        locator: String,
    },

    /// The source failed analysis
    #[error(transparent)]
    Analyze(#[from] replete_analyze::AnalyzeError),
}

impl ModuleError {
    /// Build a read error from an I/O error.
    pub fn read(locator: &url::Url, error: &std::io::Error) -> Self {
        Self::Read {
            locator: locator.to_string(),
            reason: error.to_string(),
        }
    }
}
