// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! The REPL coordinator
//!
//! Glues the pieces together. For each evaluation request: apply the
//! host's source transform, analyze the fragment, resolve and versionize
//! every specifier in parallel, REPL-ize the source, and dispatch the
//! resulting command to the platform's padawan. Padawans are started
//! lazily per platform and live until [`Repl::stop`].

use crate::capabilities::Capabilities;
use crate::error::Result;
use crate::server::{self, ServeState};
use futures::future::try_join_all;
use replete_modules::{NodeResolver, SourceStore, VersionRegistry};
use replete_padawan::{Cmdl, Platform, Report, Webl};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use url::Url;

/// The outcome of one evaluation round trip.
///
/// An exception thrown inside the padawan is a successful round trip: it
/// arrives here as `exception`, not as an error.
#[derive(Debug, Clone)]
pub struct Outcome {
    /// Printed representation of the resulting value
    pub evaluation: Option<String>,
    /// Printed representation of the thrown exception
    pub exception: Option<String>,
}

/// A running REPL: source server, version registry, and padawans.
pub struct Repl {
    capabilities: Capabilities,
    state: Arc<ServeState>,
    webl: Webl,
    padawans: tokio::sync::Mutex<HashMap<Platform, Arc<Cmdl>>>,
    server: tokio::sync::Mutex<Option<tokio::task::JoinHandle<()>>>,
    default_parent: Url,
}

impl Repl {
    /// Start the source server (and the WEBL endpoint it carries) and
    /// prepare the caches. Padawans are spawned on first use.
    pub async fn start(capabilities: Capabilities, listen: SocketAddr) -> Result<Self> {
        let store = Arc::new(SourceStore::new(&capabilities.root)?);
        let resolver = Arc::new(NodeResolver::new());
        let registry = Arc::new(VersionRegistry::new(
            Arc::clone(&store),
            Arc::clone(&resolver),
        ));

        let listener = tokio::net::TcpListener::bind(listen).await?;
        let address = listener.local_addr()?;
        let base = format!("http://127.0.0.1:{}", address.port());
        let state = Arc::new(ServeState {
            store,
            resolver,
            registry,
            base,
            specify: capabilities.specify.clone(),
        });
        let webl = Webl::new(state.registry.token());
        let app = server::router(Arc::clone(&state)).merge(webl.router());
        let server = tokio::spawn(async move {
            if let Err(error) = axum::serve(listener, app).await {
                tracing::error!(%error, "source server failed");
            }
        });
        tracing::info!(base = %state.base, "source server listening");

        let root_path = capabilities
            .root
            .to_file_path()
            .unwrap_or_else(|_| std::path::PathBuf::from("/"));
        let default_parent = Url::from_file_path(root_path.join("repl.js"))
            .unwrap_or_else(|_| capabilities.root.clone());

        Ok(Self {
            capabilities,
            state,
            webl,
            padawans: tokio::sync::Mutex::new(HashMap::new()),
            server: tokio::sync::Mutex::new(Some(server)),
            default_parent,
        })
    }

    /// The public base URL of the source server.
    pub fn base(&self) -> &str {
        &self.state.base
    }

    /// Evaluate one module fragment in the named scope of the platform's
    /// padawan.
    pub async fn evaluate(
        &self,
        source: &str,
        locator: Option<&str>,
        platform: Platform,
        scope: &str,
    ) -> Result<Outcome> {
        let source = match &self.capabilities.command {
            Some(hook) => hook(source.to_string()),
            None => source.to_string(),
        };
        let parent = match locator {
            Some(text) => Url::parse(text).map_err(|_| {
                replete_modules::ModuleError::InvalidLocator {
                    locator: text.to_string(),
                }
            })?,
            None => self.default_parent.clone(),
        };

        let parsed = replete_analyze::parse(&source)?;
        let analysis = replete_analyze::analyze(&parsed);
        let top = replete_analyze::analyze_top(&parsed);

        let imports = try_join_all(
            analysis
                .imports
                .iter()
                .map(|import| self.prepare(&import.specifier, &parent)),
        );
        let dynamics = try_join_all(
            analysis
                .dynamics
                .iter()
                .map(|dynamic| self.prepare(&dynamic.specifier, &parent)),
        );
        let (imports, dynamics) = tokio::try_join!(imports, dynamics)?;

        let script =
            replete_analyze::scriptify(&source, &parsed, &analysis, &top, &dynamics, scope)?;
        let report = self.dispatch(platform, script, imports, top.wait).await?;
        Ok(Outcome {
            evaluation: report.evaluation,
            exception: report.exception,
        })
    }

    /// Resolve, versionize, and phrase one specifier for the padawan.
    async fn prepare(&self, specifier: &str, parent: &Url) -> Result<String> {
        let located = self.state.resolver.locate(specifier, parent).await?;
        let versioned = self.state.registry.versionize(&located).await?;
        Ok(self.state.specify(&versioned))
    }

    async fn dispatch(
        &self,
        platform: Platform,
        script: String,
        imports: Vec<String>,
        wait: bool,
    ) -> Result<Report> {
        if platform == Platform::Browser {
            return Ok(self.webl.eval(script, imports, wait).await?);
        }
        let padawan = self.padawan(platform).await?;
        Ok(padawan.eval(script, imports, wait).await?)
    }

    /// The platform's padawan, started on first use.
    async fn padawan(&self, platform: Platform) -> Result<Arc<Cmdl>> {
        let mut padawans = self.padawans.lock().await;
        if let Some(existing) = padawans.get(&platform) {
            return Ok(Arc::clone(existing));
        }
        let cmdl = Arc::new(
            Cmdl::start(
                platform,
                Arc::clone(&self.capabilities.out),
                Arc::clone(&self.capabilities.err),
            )
            .await?,
        );
        padawans.insert(platform, Arc::clone(&cmdl));
        Ok(cmdl)
    }

    /// Stop every padawan and the source server. Safe to call twice.
    pub async fn stop(&self) {
        for (_, padawan) in self.padawans.lock().await.drain() {
            padawan.stop().await;
        }
        if let Some(handle) = self.server.lock().await.take() {
            handle.abort();
            let _ = handle.await;
        }
        tracing::info!("coordinator stopped");
    }
}
