//! Specifier resolution (Node.js algorithm).
//!
//! Maps a specifier plus the locator of the importing module to the
//! locator of the imported resource: builtins to the `node:` scheme,
//! relative and absolute paths against the parent URL, and bare names by
//! walking ancestor `node_modules` directories and interpreting the
//! package manifest.

use crate::error::{ModuleError, Result};
use crate::manifest::PackageManifest;
use crate::specifier::{classify, split_package, SpecifierKind, BUILTIN_SCHEME};
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use url::Url;

/// Node-style specifier resolver.
///
/// Manifests are memoized and never invalidated: resolution depends only
/// on filesystem topology, which the REPL treats as stable for its
/// lifetime.
pub struct NodeResolver {
    manifests: DashMap<PathBuf, Option<Arc<PackageManifest>>>,
}

impl NodeResolver {
    /// Create a resolver with an empty manifest cache.
    pub fn new() -> Self {
        Self {
            manifests: DashMap::new(),
        }
    }

    /// Resolve `specifier` against the module identified by `parent`.
    pub async fn locate(&self, specifier: &str, parent: &Url) -> Result<Url> {
        match classify(specifier) {
            SpecifierKind::Builtin => {
                let name = specifier.strip_prefix("node:").unwrap_or(specifier);
                Url::parse(&format!("{BUILTIN_SCHEME}:{name}")).map_err(|_| {
                    ModuleError::InvalidLocator {
                        locator: specifier.to_string(),
                    }
                })
            }
            SpecifierKind::FullyQualified => {
                Url::parse(specifier).map_err(|_| ModuleError::InvalidLocator {
                    locator: specifier.to_string(),
                })
            }
            SpecifierKind::Relative | SpecifierKind::Absolute => {
                parent.join(specifier).map_err(|_| ModuleError::InvalidLocator {
                    locator: specifier.to_string(),
                })
            }
            SpecifierKind::Bare => self.locate_package(specifier, parent).await,
        }
    }

    /// Walk ancestor directories for `node_modules/<name>/package.json`,
    /// then resolve the subpath within the manifest.
    async fn locate_package(&self, specifier: &str, parent: &Url) -> Result<Url> {
        let (name, subpath) = split_package(specifier);
        let parent_path = parent
            .to_file_path()
            .map_err(|_| ModuleError::InvalidLocator {
                locator: parent.to_string(),
            })?;

        let mut directory = parent_path.parent();
        while let Some(ancestor) = directory {
            let manifest_path = ancestor
                .join("node_modules")
                .join(name)
                .join("package.json");
            if let Some(manifest) = self.manifest(&manifest_path).await {
                let target = manifest.resolve_subpath(&subpath).ok_or_else(|| {
                    ModuleError::NotExported {
                        specifier: specifier.to_string(),
                        parent: parent.to_string(),
                    }
                })?;
                let manifest_url =
                    Url::from_file_path(&manifest_path).map_err(|_| {
                        ModuleError::InvalidLocator {
                            locator: manifest_path.display().to_string(),
                        }
                    })?;
                let resolved =
                    manifest_url
                        .join(&target)
                        .map_err(|_| ModuleError::InvalidLocator {
                            locator: target.clone(),
                        })?;
                return Ok(canonicalize(resolved).await);
            }
            directory = ancestor.parent();
        }

        Err(ModuleError::PackageNotFound {
            specifier: specifier.to_string(),
            parent: parent.to_string(),
        })
    }

    /// Read and memoize a manifest. `None` means the file does not exist
    /// (or does not parse, which this resolver treats the same way).
    async fn manifest(&self, path: &Path) -> Option<Arc<PackageManifest>> {
        if let Some(cached) = self.manifests.get(path) {
            return cached.value().clone();
        }
        let loaded = match tokio::fs::read_to_string(path).await {
            Ok(text) => match PackageManifest::from_json(&text) {
                Ok(manifest) => Some(Arc::new(manifest)),
                Err(error) => {
                    tracing::warn!(path = %path.display(), %error, "malformed package.json");
                    None
                }
            },
            Err(_) => None,
        };
        self.manifests
            .insert(path.to_path_buf(), loaded.clone());
        loaded
    }
}

impl Default for NodeResolver {
    fn default() -> Self {
        Self::new()
    }
}

/// Follow symlinks to a canonical file URL; fall back to the uncanonical
/// URL when canonicalization fails (the file may not exist yet).
async fn canonicalize(locator: Url) -> Url {
    let Ok(path) = locator.to_file_path() else {
        return locator;
    };
    match tokio::fs::canonicalize(&path).await {
        Ok(canonical) => Url::from_file_path(&canonical).unwrap_or(locator),
        Err(_) => locator,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn file_url(path: &Path) -> Url {
        Url::from_file_path(path).unwrap()
    }

    fn install(root: &Path, package: &str, manifest: &str, files: &[(&str, &str)]) {
        let package_dir = root.join("node_modules").join(package);
        fs::create_dir_all(&package_dir).unwrap();
        fs::write(package_dir.join("package.json"), manifest).unwrap();
        for (name, content) in files {
            let path = package_dir.join(name);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }
    }

    #[tokio::test]
    async fn test_builtin() {
        let resolver = NodeResolver::new();
        let parent = Url::parse("file:///tmp/a.js").unwrap();
        let located = resolver.locate("fs", &parent).await.unwrap();
        assert_eq!(located.as_str(), "node:fs");
        let located = resolver.locate("node:path", &parent).await.unwrap();
        assert_eq!(located.as_str(), "node:path");
    }

    #[tokio::test]
    async fn test_relative_and_absolute() {
        let resolver = NodeResolver::new();
        let parent = Url::parse("file:///home/me/project/a.js").unwrap();
        let relative = resolver.locate("./lib/b.js", &parent).await.unwrap();
        assert_eq!(relative.as_str(), "file:///home/me/project/lib/b.js");
        let upward = resolver.locate("../c.js", &parent).await.unwrap();
        assert_eq!(upward.as_str(), "file:///home/me/c.js");
        let absolute = resolver.locate("/opt/d.js", &parent).await.unwrap();
        assert_eq!(absolute.as_str(), "file:///opt/d.js");
    }

    #[tokio::test]
    async fn test_conditional_export() {
        let dir = tempfile::tempdir().unwrap();
        install(
            dir.path(),
            "exports",
            r#"{"exports": {".": {"import": "./dist/import_default.js", "require": "./dist/require.js"}}}"#,
            &[("dist/import_default.js", "export default 1;")],
        );
        let resolver = NodeResolver::new();
        let parent = file_url(&dir.path().join("b.js"));
        let located = resolver.locate("exports", &parent).await.unwrap();
        assert!(located
            .path()
            .ends_with("node_modules/exports/dist/import_default.js"));
    }

    #[tokio::test]
    async fn test_glob_export() {
        let dir = tempfile::tempdir().unwrap();
        install(
            dir.path(),
            "exports",
            r#"{"exports": {"./wildcard/*": "./dist/wildcard/*", "./wildcard_ext/*.js": "./dist/wildcard_ext/*.js"}}"#,
            &[("dist/wildcard/img.svg", "<svg/>")],
        );
        let resolver = NodeResolver::new();
        let parent = file_url(&dir.path().join("b.js"));
        let located = resolver
            .locate("exports/wildcard/img.svg", &parent)
            .await
            .unwrap();
        assert!(located.path().ends_with("dist/wildcard/img.svg"));
        let error = resolver
            .locate("exports/wildcard_ext/img.wrongext", &parent)
            .await
            .unwrap_err();
        assert!(matches!(error, ModuleError::NotExported { .. }));
    }

    #[tokio::test]
    async fn test_parent_directory_search() {
        let dir = tempfile::tempdir().unwrap();
        let nested_root = dir.path().join("a").join("b").join("c");
        fs::create_dir_all(&nested_root).unwrap();
        install(
            &nested_root,
            "nested",
            r#"{"main": "./index.js"}"#,
            &[("index.js", "export default 1;")],
        );
        let resolver = NodeResolver::new();

        let shallow = file_url(&dir.path().join("a").join("b.js"));
        let error = resolver.locate("nested", &shallow).await.unwrap_err();
        assert!(matches!(error, ModuleError::PackageNotFound { .. }));

        let deep = file_url(&nested_root.join("d.js"));
        let located = resolver.locate("nested", &deep).await.unwrap();
        assert!(located.path().ends_with("node_modules/nested/index.js"));
    }

    #[tokio::test]
    async fn test_scoped_package() {
        let dir = tempfile::tempdir().unwrap();
        install(
            dir.path(),
            "@scope/pkg",
            r#"{"module": "./esm/index.js"}"#,
            &[("esm/index.js", "export default 1;")],
        );
        let resolver = NodeResolver::new();
        let parent = file_url(&dir.path().join("main.js"));
        let located = resolver.locate("@scope/pkg", &parent).await.unwrap();
        assert!(located
            .path()
            .ends_with("node_modules/@scope/pkg/esm/index.js"));
    }

    #[tokio::test]
    async fn test_subpath_without_exports_is_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        install(
            dir.path(),
            "plain",
            r#"{"main": "./index.js"}"#,
            &[("lib/util.js", "export default 1;")],
        );
        let resolver = NodeResolver::new();
        let parent = file_url(&dir.path().join("main.js"));
        let located = resolver.locate("plain/lib/util.js", &parent).await.unwrap();
        assert!(located.path().ends_with("node_modules/plain/lib/util.js"));
    }

    #[tokio::test]
    async fn test_resolution_is_stable() {
        let dir = tempfile::tempdir().unwrap();
        install(dir.path(), "stable", "{}", &[("index.js", "1;")]);
        let resolver = NodeResolver::new();
        let parent = file_url(&dir.path().join("main.js"));
        let first = resolver.locate("stable", &parent).await.unwrap();
        let second = resolver.locate("stable", &parent).await.unwrap();
        assert_eq!(first, second);
    }
}
