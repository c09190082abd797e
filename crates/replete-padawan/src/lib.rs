// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! # replete-padawan
//!
//! Isolated JavaScript evaluation contexts (*padawans*) and the
//! transports that drive them.
//!
//! A padawan is a long-lived execution context in a chosen runtime —
//! Node.js, Deno, Bun, Txiki, or a browser tab — that receives
//! `{script, imports, wait, id}` commands and answers with
//! `{id, evaluation|exception}` reports, one JSON object per line.
//! Command-line padawans connect back over loopback TCP ([`Cmdl`]) and
//! are restarted transparently when they die; browser padawans connect
//! over a WebSocket ([`Webl`]).

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cmdl;
pub mod error;
pub mod protocol;
pub mod runtime;
pub mod webl;

pub use cmdl::{Cmdl, OutputSink};
pub use error::{PadawanError, Result};
pub use protocol::{Command, Report};
pub use runtime::Platform;
pub use webl::Webl;
