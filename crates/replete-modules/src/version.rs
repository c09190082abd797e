//! Fingerprinting and cache-busting versioning.
//!
//! Every JavaScript file locator gets a fingerprint derived from its own
//! source and, recursively, the fingerprints of everything it imports.
//! A monotonically increasing version number is bumped exactly when the
//! fingerprint changes, and woven into a versioned locator
//! `file:///v<N>/<token>/<path>` that defeats the runtime's immutable
//! module cache. The token is random per REPL so user paths can never
//! collide with versioning metadata, and stale links die on restart.

use crate::error::Result;
use crate::resolver::NodeResolver;
use crate::specifier::is_javascript;
use crate::store::SourceStore;
use dashmap::DashMap;
use futures::future::BoxFuture;
use rand::Rng;
use rustc_hash::{FxHashMap, FxHashSet};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use url::Url;

struct VersionEntry {
    version: u64,
    last_hash: String,
}

/// The per-REPL fingerprint and version registry.
pub struct VersionRegistry {
    store: Arc<SourceStore>,
    resolver: Arc<NodeResolver>,
    versions: DashMap<Url, VersionEntry>,
    token: String,
}

impl VersionRegistry {
    /// Create a registry with a fresh unguessable token.
    pub fn new(store: Arc<SourceStore>, resolver: Arc<NodeResolver>) -> Self {
        let token = format!("{:08x}", rand::thread_rng().gen::<u32>());
        Self {
            store,
            resolver,
            versions: DashMap::new(),
            token,
        }
    }

    /// The unguessable token demarcating version prefixes from user paths.
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Fingerprint a locator. `None` for locators that are not file-backed
    /// JavaScript modules.
    ///
    /// The digest covers the source text and the fingerprints of every
    /// static import, re-export, and dynamic specifier in source order.
    /// Sources and analyses come memoized out of the store, so the graph
    /// walk costs one read per file at most; the walk itself memoizes per
    /// query so shared dependencies are hashed once, and a cycle's back
    /// edge contributes its target's source digest alone.
    pub async fn hash(&self, locator: &Url) -> Result<Option<String>> {
        let mut walk = HashWalk {
            registry: self,
            memo: FxHashMap::default(),
            visiting: FxHashSet::default(),
        };
        walk.hash(locator.clone()).await
    }

    /// The current version of a locator, starting at 0 and increasing by
    /// exactly one whenever the fingerprint changes.
    pub async fn version(&self, locator: &Url) -> Result<u64> {
        let Some(current) = self.hash(locator).await? else {
            return Ok(0);
        };
        let mut entry = self
            .versions
            .entry(locator.clone())
            .or_insert_with(|| VersionEntry {
                version: 0,
                last_hash: current.clone(),
            });
        if entry.last_hash != current {
            entry.version += 1;
            entry.last_hash = current;
        }
        Ok(entry.version)
    }

    /// Rewrite a JavaScript file locator to its versioned form; any other
    /// locator is returned unchanged.
    pub async fn versionize(&self, locator: &Url) -> Result<Url> {
        if locator.scheme() != "file" || !is_javascript(locator) {
            return Ok(locator.clone());
        }
        let version = self.version(locator).await?;
        let mut versioned = locator.clone();
        versioned.set_path(&format!(
            "/v{version}/{token}{path}",
            token = self.token,
            path = locator.path(),
        ));
        Ok(versioned)
    }

    /// Strip a `/v<N>/<token>/` prefix from a request path, if its token is
    /// this REPL's. Returns the original path otherwise.
    pub fn strip_versioned<'a>(&self, path: &'a str) -> &'a str {
        let Some(rest) = path.strip_prefix("/v") else {
            return path;
        };
        let Some(slash) = rest.find('/') else {
            return path;
        };
        if rest[..slash].parse::<u64>().is_err() {
            return path;
        }
        let rest = &rest[slash + 1..];
        match rest.strip_prefix(&self.token) {
            Some(original) if original.starts_with('/') => original,
            _ => path,
        }
    }
}

struct HashWalk<'a> {
    registry: &'a VersionRegistry,
    memo: FxHashMap<Url, Option<String>>,
    visiting: FxHashSet<Url>,
}

impl HashWalk<'_> {
    fn hash(&mut self, locator: Url) -> BoxFuture<'_, Result<Option<String>>> {
        Box::pin(async move {
            if locator.scheme() != "file" || !is_javascript(&locator) {
                return Ok(None);
            }
            if let Some(known) = self.memo.get(&locator) {
                return Ok(known.clone());
            }
            let source = self.registry.store.read(&locator).await?;
            if self.visiting.contains(&locator) {
                // Cycle: the back edge contributes the source digest only.
                return Ok(Some(digest_parts(&[digest(source.as_bytes())])));
            }
            self.visiting.insert(locator.clone());
            let analysis = self.registry.store.analysis(&locator).await?;
            let mut parts = vec![digest(source.as_bytes())];
            for site in analysis.specifier_sites() {
                match self.registry.resolver.locate(&site.specifier, &locator).await {
                    Ok(dependency) => {
                        if let Some(part) = self.hash(dependency).await? {
                            parts.push(part);
                        }
                    }
                    Err(error) => {
                        // An unresolvable dependency contributes nothing;
                        // the evaluation path surfaces its own error.
                        tracing::debug!(specifier = %site.specifier, %error, "unresolvable during hashing");
                    }
                }
            }
            self.visiting.remove(&locator);
            let combined = digest_parts(&parts);
            self.memo.insert(locator, Some(combined.clone()));
            Ok(Some(combined))
        })
    }
}

fn digest(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

fn digest_parts(parts: &[String]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;

    fn registry_in(dir: &Path) -> VersionRegistry {
        let root = Url::from_file_path(dir).unwrap();
        let store = Arc::new(SourceStore::new(&root).unwrap());
        VersionRegistry::new(store, Arc::new(NodeResolver::new()))
    }

    fn locator_for(dir: &Path, name: &str) -> Url {
        Url::from_file_path(dir.join(name)).unwrap()
    }

    /// Writes through the store's own invalidation, so tests do not depend
    /// on filesystem notification latency.
    fn rewrite(registry: &VersionRegistry, dir: &Path, name: &str, content: &str) {
        fs::write(dir.join(name), content).unwrap();
        registry.store.invalidate(&locator_for(dir, name));
    }

    #[tokio::test]
    async fn test_hash_is_stable() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.js"), "1;").unwrap();
        let registry = registry_in(dir.path());
        let locator = locator_for(dir.path(), "a.js");
        let first = registry.hash(&locator).await.unwrap().unwrap();
        let second = registry.hash(&locator).await.unwrap().unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 64);
    }

    #[tokio::test]
    async fn test_non_javascript_hashes_to_nothing() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.svg"), "<svg/>").unwrap();
        let registry = registry_in(dir.path());
        assert_eq!(
            registry.hash(&locator_for(dir.path(), "a.svg")).await.unwrap(),
            None
        );
        assert_eq!(
            registry
                .hash(&Url::parse("node:fs").unwrap())
                .await
                .unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_version_monotonicity() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry_in(dir.path());
        rewrite(&registry, dir.path(), "b.js", "const b = 1;");
        let locator = locator_for(dir.path(), "b.js");

        assert_eq!(registry.version(&locator).await.unwrap(), 0);
        assert_eq!(registry.version(&locator).await.unwrap(), 0);

        rewrite(&registry, dir.path(), "b.js", "const b = 2;");
        assert_eq!(registry.version(&locator).await.unwrap(), 1);

        // Back to the original contents: versions never decrease.
        rewrite(&registry, dir.path(), "b.js", "const b = 1;");
        assert_eq!(registry.version(&locator).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_dependency_propagation() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry_in(dir.path());
        rewrite(&registry, dir.path(), "c.js", "export default 1;");
        rewrite(&registry, dir.path(), "b.js", "export { default } from \"./c.js\";");
        rewrite(&registry, dir.path(), "a.js", "import b from \"./b.js\";\nb;");
        let a = locator_for(dir.path(), "a.js");
        let b = locator_for(dir.path(), "b.js");

        assert_eq!(registry.version(&a).await.unwrap(), 0);
        assert_eq!(registry.version(&b).await.unwrap(), 0);

        rewrite(&registry, dir.path(), "c.js", "export default 2;");
        assert_eq!(registry.version(&a).await.unwrap(), 1);
        assert_eq!(registry.version(&b).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_cycle_terminates() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry_in(dir.path());
        rewrite(&registry, dir.path(), "x.js", "import \"./y.js\";");
        rewrite(&registry, dir.path(), "y.js", "import \"./x.js\";");
        let x = locator_for(dir.path(), "x.js");
        let before = registry.hash(&x).await.unwrap().unwrap();

        rewrite(&registry, dir.path(), "y.js", "import \"./x.js\"; 1;");
        let after = registry.hash(&x).await.unwrap().unwrap();
        assert_ne!(before, after);
    }

    #[tokio::test]
    async fn test_versionize_and_strip() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry_in(dir.path());
        rewrite(&registry, dir.path(), "a.js", "1;");
        let locator = locator_for(dir.path(), "a.js");
        let versioned = registry.versionize(&locator).await.unwrap();
        let expected = format!("/v0/{}{}", registry.token(), locator.path());
        assert_eq!(versioned.path(), expected);
        assert_eq!(registry.strip_versioned(versioned.path()), locator.path());
    }

    #[tokio::test]
    async fn test_strip_rejects_foreign_tokens() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry_in(dir.path());
        assert_eq!(
            registry.strip_versioned("/v3/ffffffff/home/a.js"),
            "/v3/ffffffff/home/a.js"
        );
        assert_eq!(registry.strip_versioned("/plain/a.js"), "/plain/a.js");
        assert_eq!(registry.strip_versioned("/vX/abc/a.js"), "/vX/abc/a.js");
    }

    #[tokio::test]
    async fn test_versionize_leaves_other_locators_alone() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry_in(dir.path());
        let builtin = Url::parse("node:fs").unwrap();
        assert_eq!(registry.versionize(&builtin).await.unwrap(), builtin);
        let asset = locator_for(dir.path(), "style.css");
        assert_eq!(registry.versionize(&asset).await.unwrap(), asset);
    }
}
