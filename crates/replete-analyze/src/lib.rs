// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! # replete-analyze
//!
//! Static analysis and REPL-ization of ECMAScript modules.
//!
//! This crate turns a module fragment into an `eval`-safe script while
//! preserving scope continuity, redefinition, top-level `await`, and
//! `import.meta.main` semantics:
//!
//! ```rust,ignore
//! let parsed = replete_analyze::parse(source)?;
//! let analysis = replete_analyze::analyze(&parsed);
//! let top = replete_analyze::analyze_top(&parsed);
//! let script = replete_analyze::scriptify(source, &parsed, &analysis, &top, &resolved, "")?;
//! ```
//!
//! Every rewrite preserves the line count of its input, so line numbers in
//! padawan stack traces keep pointing at the right source lines.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod analyze;
pub mod error;
pub mod parse;
pub mod rewrite;
pub mod scriptify;

pub use analyze::{analyze, analyze_top, ModuleAnalysis, SpecifierSite, TopAnalysis};
pub use error::{AnalyzeError, Result};
pub use parse::{parse, ParsedModule};
pub use rewrite::{apply, replace_specifiers, Edit};
pub use scriptify::scriptify;
