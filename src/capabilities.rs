// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Capabilities supplied by the host
//!
//! The host (typically a text-editor plugin driving the binary over
//! pipes) can customize how the REPL behaves: rewrite source before
//! evaluation, override how locators are turned into URLs a padawan can
//! request, and receive side-band output. Everything has a sensible
//! default, so an embedding that supplies nothing still works.

use std::sync::Arc;
use url::Url;

/// Source transform applied to every fragment before evaluation.
pub type SourceHook = Box<dyn Fn(String) -> String + Send + Sync>;

/// Conversion from a (versioned) locator to the URL the padawan requests.
/// Shared between the coordinator and the source server.
pub type SpecifyHook = Arc<dyn Fn(&Url) -> String + Send + Sync>;

/// Receiver of side-band output (a padawan's stdout or stderr).
pub type OutputHook = Arc<dyn Fn(&str) + Send + Sync>;

/// The host-supplied capability set.
pub struct Capabilities {
    /// Root locator; reads outside it are forbidden
    pub root: Url,
    /// Optional source transform
    pub command: Option<SourceHook>,
    /// Optional locator-to-URL override
    pub specify: Option<SpecifyHook>,
    /// Padawan stdout delivery
    pub out: OutputHook,
    /// Padawan stderr delivery
    pub err: OutputHook,
}

impl Capabilities {
    /// Capabilities rooted at `root` that print side-band output to this
    /// process's own stderr.
    pub fn new(root: Url) -> Self {
        Self {
            root,
            command: None,
            specify: None,
            out: Arc::new(|text| eprint!("{text}")),
            err: Arc::new(|text| eprint!("{text}")),
        }
    }
}

/// Content types by file extension. The table covers what a module tree
/// plausibly serves; anything else is refused rather than mislabeled.
pub fn mime(locator: &Url) -> Option<&'static str> {
    let path = locator.path();
    let extension = path.rsplit('.').next()?;
    match extension {
        "js" | "mjs" | "cjs" => Some("text/javascript"),
        "json" => Some("application/json"),
        "wasm" => Some("application/wasm"),
        "html" => Some("text/html"),
        "css" => Some("text/css"),
        "svg" => Some("image/svg+xml"),
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        "txt" | "md" => Some("text/plain"),
        "woff" => Some("font/woff"),
        "woff2" => Some("font/woff2"),
        _ => None,
    }
}
