// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! The source server
//!
//! Serves module source to padawans over HTTP. Requests arrive bearing
//! versioned paths (`/v<N>/<token>/<path>`); the version prefix is
//! stripped when the token matches this REPL's, the file is read, and —
//! for JavaScript — every static, dynamic, and re-export specifier is
//! rewritten to a resolved, versioned, padawan-requestable URL before the
//! source goes out. Non-module assets are served verbatim. Padawans
//! commonly run with a null origin, so the CORS header always echoes the
//! request's origin.

use crate::capabilities::{mime, SpecifyHook};
use crate::error::{ReplError, Result};
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;
use replete_modules::{is_javascript, NodeResolver, SourceStore, VersionRegistry};
use std::sync::Arc;
use url::Url;

/// Everything a request needs: the caches, the resolver, the registry,
/// and how to phrase a locator so the padawan can fetch it back.
pub struct ServeState {
    /// Source and analysis caches
    pub store: Arc<SourceStore>,
    /// Specifier resolver
    pub resolver: Arc<NodeResolver>,
    /// Fingerprint and version registry
    pub registry: Arc<VersionRegistry>,
    /// Public base of this server, e.g. `http://127.0.0.1:9310`
    pub base: String,
    /// Host override for locator-to-URL conversion
    pub specify: Option<SpecifyHook>,
}

impl ServeState {
    /// Convert a (versioned) locator into the URL a padawan requests.
    pub fn specify(&self, locator: &Url) -> String {
        if let Some(hook) = &self.specify {
            return hook(locator);
        }
        if locator.scheme() == "file" {
            format!("{}{}", self.base, locator.path())
        } else {
            locator.to_string()
        }
    }
}

/// The routes of the source server.
pub fn router(state: Arc<ServeState>) -> Router {
    Router::new().fallback(handle).with_state(state)
}

async fn handle(
    State(state): State<Arc<ServeState>>,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    let origin = headers
        .get(header::ORIGIN)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("*")
        .to_string();
    match respond(&state, uri.path()).await {
        Ok((body, content_type)) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, content_type.to_string()),
                (header::ACCESS_CONTROL_ALLOW_ORIGIN, origin),
            ],
            body,
        )
            .into_response(),
        Err(error) => {
            tracing::warn!(path = uri.path(), %error, "request failed");
            let status = match &error {
                ReplError::Module(replete_modules::ModuleError::Forbidden { .. }) => {
                    StatusCode::FORBIDDEN
                }
                ReplError::NotFound { .. } | ReplError::UnknownContentType { .. } => {
                    StatusCode::NOT_FOUND
                }
                ReplError::Module(replete_modules::ModuleError::Read { .. }) => {
                    StatusCode::NOT_FOUND
                }
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            (
                status,
                [(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin)],
                error.to_string(),
            )
                .into_response()
        }
    }
}

/// Serve one request path, returning the body and its content type.
pub async fn respond(state: &ServeState, path: &str) -> Result<(Vec<u8>, &'static str)> {
    let stripped = state.registry.strip_versioned(path);
    let locator =
        Url::parse(&format!("file://{stripped}")).map_err(|_| ReplError::NotFound {
            path: path.to_string(),
        })?;
    let content_type = mime(&locator).ok_or_else(|| ReplError::UnknownContentType {
        locator: locator.to_string(),
    })?;
    if is_javascript(&locator) {
        let rewritten = rewrite_module(state, &locator).await?;
        Ok((rewritten.into_bytes(), content_type))
    } else {
        let bytes = state.store.read_raw(&locator).await?;
        Ok((bytes, content_type))
    }
}

/// Rewrite a module's specifiers to resolved, versioned URLs the padawan
/// can request. The rewrite preserves the module's line count.
async fn rewrite_module(state: &ServeState, locator: &Url) -> Result<String> {
    let source = state.store.read(locator).await?;
    let analysis = state.store.analysis(locator).await?;
    let sites = analysis.specifier_sites();
    let resolved = futures::future::try_join_all(sites.iter().map(|site| async {
        let dependency = state.resolver.locate(&site.specifier, locator).await?;
        let versioned = state.registry.versionize(&dependency).await?;
        Ok::<String, ReplError>(state.specify(&versioned))
    }))
    .await?;
    Ok(replete_analyze::replace_specifiers(
        &source, &sites, &resolved,
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;

    fn state_in(dir: &Path) -> ServeState {
        let root = Url::from_file_path(dir).unwrap();
        let store = Arc::new(SourceStore::new(&root).unwrap());
        let resolver = Arc::new(NodeResolver::new());
        let registry = Arc::new(VersionRegistry::new(
            Arc::clone(&store),
            Arc::clone(&resolver),
        ));
        ServeState {
            store,
            resolver,
            registry,
            base: "http://127.0.0.1:9310".to_string(),
            specify: None,
        }
    }

    #[tokio::test]
    async fn test_serves_rewritten_module() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.js"), "export default 1;").unwrap();
        fs::write(
            dir.path().join("a.js"),
            "import b from \"./b.js\";\nexport default b;\n",
        )
        .unwrap();
        let state = state_in(dir.path());
        let path = format!("{}/a.js", dir.path().display());
        let (body, content_type) = respond(&state, &path).await.unwrap();
        let body = String::from_utf8(body).unwrap();
        assert_eq!(content_type, "text/javascript");
        assert!(!body.contains("\"./b.js\""));
        assert!(body.contains(&format!(
            "http://127.0.0.1:9310/v0/{}",
            state.registry.token()
        )));
        assert!(body.ends_with("export default b;\n"));
    }

    #[tokio::test]
    async fn test_rewrite_preserves_line_count() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("dep.js"), "export default 1;").unwrap();
        let source = "import d from \"./dep.js\";\nconst x = import(\"./dep.js\");\nexport { d };\n";
        fs::write(dir.path().join("a.js"), source).unwrap();
        let state = state_in(dir.path());
        let path = format!("{}/a.js", dir.path().display());
        let (body, _) = respond(&state, &path).await.unwrap();
        let body = String::from_utf8(body).unwrap();
        assert_eq!(body.split('\n').count(), source.split('\n').count());
    }

    #[tokio::test]
    async fn test_versioned_prefix_is_stripped() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.js"), "1;").unwrap();
        let state = state_in(dir.path());
        let locator = Url::from_file_path(dir.path().join("a.js")).unwrap();
        let versioned = state.registry.versionize(&locator).await.unwrap();
        let (body, _) = respond(&state, versioned.path()).await.unwrap();
        assert_eq!(body, b"1;");
    }

    #[tokio::test]
    async fn test_assets_served_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("style.css"), "body { color: red }").unwrap();
        let state = state_in(dir.path());
        let path = format!("{}/style.css", dir.path().display());
        let (body, content_type) = respond(&state, &path).await.unwrap();
        assert_eq!(content_type, "text/css");
        assert_eq!(body, b"body { color: red }");
    }

    #[tokio::test]
    async fn test_unknown_content_type_refused() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("tool.exe"), [0u8; 4]).unwrap();
        let state = state_in(dir.path());
        let path = format!("{}/tool.exe", dir.path().display());
        assert!(matches!(
            respond(&state, &path).await.unwrap_err(),
            ReplError::UnknownContentType { .. }
        ));
    }

    #[tokio::test]
    async fn test_builtin_specifiers_survive_rewrite() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("a.js"),
            "import fs from \"node:fs\";\nfs;\n",
        )
        .unwrap();
        let state = state_in(dir.path());
        let path = format!("{}/a.js", dir.path().display());
        let (body, _) = respond(&state, &path).await.unwrap();
        let body = String::from_utf8(body).unwrap();
        assert!(body.contains("\"node:fs\""));
    }
}
