// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! # replete
//!
//! An interactive evaluator for JavaScript modules.
//!
//! A host program (typically a text-editor plugin) feeds Replete fragments
//! of module source over stdin; Replete evaluates each fragment inside a
//! long-lived, isolated execution context (a *padawan*) running in a
//! chosen JavaScript runtime and answers with a printed representation of
//! the resulting value or exception. Unlike a naive `eval`, Replete
//! preserves variable state across evaluations, resolves `import`/`export`
//! statements against the filesystem and package tree, and guarantees that
//! reevaluated modules see the freshest versions of their dependencies
//! despite the runtime's immutable module cache.
//!
//! ## Embedding
//!
//! ```rust,ignore
//! use replete::{Capabilities, Repl};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let root = url::Url::from_file_path(std::env::current_dir()?).unwrap();
//!     let repl = Repl::start(Capabilities::new(root), "127.0.0.1:0".parse()?).await?;
//!     let outcome = repl.evaluate("1 + 1;", None, "node".parse().unwrap(), "").await?;
//!     println!("{:?}", outcome.evaluation);
//!     repl.stop().await;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod capabilities;
pub mod coordinator;
pub mod error;
pub mod protocol;
pub mod server;

pub use capabilities::Capabilities;
pub use coordinator::{Outcome, Repl};
pub use error::{ReplError, Result};
pub use replete_padawan::Platform;

/// Version of the replete binary
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
