//! Source and analysis caches with change-driven invalidation.
//!
//! Reads are single-flight: the in-flight future is stored in the cache
//! before it resolves, so parallel dependency-graph traversal never reads
//! the same file twice. A cache entry is dropped the first time the file
//! changes on disk, together with the analysis derived from it. Failures
//! are never cached.

use crate::error::{ModuleError, Result};
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use replete_analyze::ModuleAnalysis;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use url::Url;

type ReadFuture = Shared<BoxFuture<'static, Result<Arc<str>>>>;

struct StoreInner {
    reads: DashMap<Url, ReadFuture>,
    analyses: DashMap<Url, Arc<ModuleAnalysis>>,
    /// Locators whose directories could not be watched. These are read
    /// fresh on every request so freshness survives at the cost of
    /// throughput.
    uncacheable: DashMap<Url, ()>,
}

impl StoreInner {
    fn invalidate_path(&self, path: &Path) {
        if let Ok(locator) = Url::from_file_path(path) {
            if self.reads.remove(&locator).is_some() {
                tracing::debug!(%locator, "source cache invalidated");
            }
            self.analyses.remove(&locator);
        }
    }
}

/// Cache of module sources and their analyses, keyed by locator.
pub struct SourceStore {
    inner: Arc<StoreInner>,
    root: PathBuf,
    watcher: Mutex<Option<RecommendedWatcher>>,
    watched: DashMap<PathBuf, ()>,
}

impl SourceStore {
    /// Create a store rooted at a `file:` locator. Reads outside the root
    /// are forbidden, except under a `node_modules` directory.
    pub fn new(root: &Url) -> Result<Self> {
        let root_path = root
            .to_file_path()
            .map_err(|_| ModuleError::InvalidLocator {
                locator: root.to_string(),
            })?;
        let inner = Arc::new(StoreInner {
            reads: DashMap::new(),
            analyses: DashMap::new(),
            uncacheable: DashMap::new(),
        });
        let callback_inner = Arc::clone(&inner);
        let watcher = RecommendedWatcher::new(
            move |outcome: notify::Result<notify::Event>| {
                if let Ok(event) = outcome {
                    for path in &event.paths {
                        callback_inner.invalidate_path(path);
                    }
                }
            },
            notify::Config::default(),
        );
        let watcher = match watcher {
            Ok(watcher) => Some(watcher),
            Err(error) => {
                tracing::warn!(%error, "file watcher unavailable; caching disabled");
                None
            }
        };
        Ok(Self {
            inner,
            root: root_path,
            watcher: Mutex::new(watcher),
            watched: DashMap::new(),
        })
    }

    /// Read the source behind a file locator.
    ///
    /// Concurrent reads of the same locator share one in-flight future.
    pub async fn read(&self, locator: &Url) -> Result<Arc<str>> {
        let path = self.checked_path(locator)?;
        self.ensure_watched(locator, &path);
        if self.inner.uncacheable.contains_key(locator) {
            return read_file(locator.clone(), path).await;
        }
        let future = self
            .inner
            .reads
            .entry(locator.clone())
            .or_insert_with(|| read_file(locator.clone(), path).boxed().shared())
            .clone();
        let outcome = future.await;
        if outcome.is_err() {
            self.inner.reads.remove(locator);
        }
        outcome
    }

    /// The memoized module analysis for a file locator.
    pub async fn analysis(&self, locator: &Url) -> Result<Arc<ModuleAnalysis>> {
        if let Some(hit) = self.inner.analyses.get(locator) {
            return Ok(Arc::clone(hit.value()));
        }
        let source = self.read(locator).await?;
        let parsed = replete_analyze::parse(&source)?;
        let analysis = Arc::new(replete_analyze::analyze(&parsed));
        if !self.inner.uncacheable.contains_key(locator) {
            self.inner
                .analyses
                .insert(locator.clone(), Arc::clone(&analysis));
        }
        Ok(analysis)
    }

    /// Read raw bytes behind a file locator, uncached. Non-module assets
    /// are served verbatim and re-read on every request.
    pub async fn read_raw(&self, locator: &Url) -> Result<Vec<u8>> {
        let path = self.checked_path(locator)?;
        tokio::fs::read(&path)
            .await
            .map_err(|error| ModuleError::read(locator, &error))
    }

    /// Drop the cached source and analysis for a locator.
    pub fn invalidate(&self, locator: &Url) {
        self.inner.reads.remove(locator);
        self.inner.analyses.remove(locator);
    }

    fn checked_path(&self, locator: &Url) -> Result<PathBuf> {
        if locator.scheme() != "file" {
            return Err(ModuleError::InvalidLocator {
                locator: locator.to_string(),
            });
        }
        let path = locator
            .to_file_path()
            .map_err(|_| ModuleError::InvalidLocator {
                locator: locator.to_string(),
            })?;
        if self.permitted(&path) {
            Ok(path)
        } else {
            Err(ModuleError::Forbidden {
                locator: locator.to_string(),
            })
        }
    }

    fn permitted(&self, path: &Path) -> bool {
        path.starts_with(&self.root)
            || path
                .components()
                .any(|component| component.as_os_str() == "node_modules")
    }

    /// Watch the locator's directory (directory-level, so editors that
    /// save via atomic rename are still seen). A locator whose directory
    /// cannot be watched becomes uncacheable.
    fn ensure_watched(&self, locator: &Url, path: &Path) {
        let Some(directory) = path.parent() else {
            return;
        };
        if self.watched.contains_key(directory) {
            return;
        }
        let mut watcher = self.watcher.lock();
        match watcher.as_mut() {
            Some(watcher) => match watcher.watch(directory, RecursiveMode::NonRecursive) {
                Ok(()) => {
                    self.watched.insert(directory.to_path_buf(), ());
                }
                Err(error) => {
                    tracing::warn!(%locator, %error, "watch failed; locator is uncacheable");
                    self.inner.uncacheable.insert(locator.clone(), ());
                }
            },
            None => {
                self.inner.uncacheable.insert(locator.clone(), ());
            }
        }
    }
}

async fn read_file(locator: Url, path: PathBuf) -> Result<Arc<str>> {
    match tokio::fs::read_to_string(&path).await {
        Ok(text) => Ok(Arc::from(text)),
        Err(error) => Err(ModuleError::read(&locator, &error)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn store_in(dir: &Path) -> SourceStore {
        SourceStore::new(&Url::from_file_path(dir).unwrap()).unwrap()
    }

    fn locator_for(dir: &Path, name: &str) -> Url {
        Url::from_file_path(dir.join(name)).unwrap()
    }

    #[tokio::test]
    async fn test_read_and_cache() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.js"), "1 + 1;").unwrap();
        let store = store_in(dir.path());
        let locator = locator_for(dir.path(), "a.js");
        let first = store.read(&locator).await.unwrap();
        assert_eq!(&*first, "1 + 1;");
        let second = store.read(&locator).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn test_invalidate_drops_entry() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.js"), "1;").unwrap();
        let store = store_in(dir.path());
        let locator = locator_for(dir.path(), "a.js");
        assert_eq!(&*store.read(&locator).await.unwrap(), "1;");
        fs::write(dir.path().join("a.js"), "2;").unwrap();
        store.invalidate(&locator);
        assert_eq!(&*store.read(&locator).await.unwrap(), "2;");
    }

    #[tokio::test]
    async fn test_concurrent_reads_share_flight() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.js"), "shared;").unwrap();
        let store = store_in(dir.path());
        let locator = locator_for(dir.path(), "a.js");
        let (first, second) =
            tokio::join!(store.read(&locator), store.read(&locator));
        assert!(Arc::ptr_eq(&first.unwrap(), &second.unwrap()));
    }

    #[tokio::test]
    async fn test_failed_read_not_cached() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        let locator = locator_for(dir.path(), "missing.js");
        assert!(store.read(&locator).await.is_err());
        fs::write(dir.path().join("missing.js"), "now;").unwrap();
        assert_eq!(&*store.read(&locator).await.unwrap(), "now;");
    }

    #[tokio::test]
    async fn test_forbidden_outside_root() {
        let dir = tempfile::tempdir().unwrap();
        let project = dir.path().join("project");
        fs::create_dir_all(&project).unwrap();
        fs::write(dir.path().join("secret.js"), "no;").unwrap();
        let store = store_in(&project);
        let outside = Url::from_file_path(dir.path().join("secret.js")).unwrap();
        assert!(matches!(
            store.read(&outside).await.unwrap_err(),
            ModuleError::Forbidden { .. }
        ));
    }

    #[tokio::test]
    async fn test_node_modules_reads_allowed_anywhere() {
        let dir = tempfile::tempdir().unwrap();
        let project = dir.path().join("project");
        fs::create_dir_all(&project).unwrap();
        let modules = dir.path().join("node_modules").join("pkg");
        fs::create_dir_all(&modules).unwrap();
        fs::write(modules.join("index.js"), "pkg;").unwrap();
        let store = store_in(&project);
        let locator = Url::from_file_path(modules.join("index.js")).unwrap();
        assert_eq!(&*store.read(&locator).await.unwrap(), "pkg;");
    }

    #[tokio::test]
    async fn test_analysis_memoized() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.js"), "import b from \"./b.js\";\nb;").unwrap();
        let store = store_in(dir.path());
        let locator = locator_for(dir.path(), "a.js");
        let first = store.analysis(&locator).await.unwrap();
        assert_eq!(first.imports.len(), 1);
        let second = store.analysis(&locator).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }
}
