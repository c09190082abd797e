//! Specifier taxonomy.
//!
//! A specifier is the textual argument of an `import` statement or
//! equivalent. Everything else in the system deals in locators (URLs);
//! classification is the first step of turning one into the other.

/// The scheme used for builtin-module locators.
pub const BUILTIN_SCHEME: &str = "node";

/// Builtin module names recognized on the command-line runtimes.
pub const BUILTINS: &[&str] = &[
    "assert",
    "buffer",
    "child_process",
    "cluster",
    "console",
    "constants",
    "crypto",
    "dgram",
    "dns",
    "domain",
    "events",
    "fs",
    "http",
    "https",
    "module",
    "net",
    "os",
    "path",
    "perf_hooks",
    "process",
    "punycode",
    "querystring",
    "readline",
    "repl",
    "stream",
    "string_decoder",
    "sys",
    "timers",
    "tls",
    "tty",
    "url",
    "util",
    "v8",
    "vm",
    "worker_threads",
    "zlib",
];

/// The kinds of specifier that can appear in an import position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecifierKind {
    /// A platform builtin (`fs`, `node:fs`)
    Builtin,
    /// Carries a URL scheme (`https://…`, `data:…`)
    FullyQualified,
    /// Starts with `./` or `../`
    Relative,
    /// Starts with `/`
    Absolute,
    /// Anything else; treated as a package name
    Bare,
}

/// Check whether a specifier names a builtin module.
pub fn is_builtin(specifier: &str) -> bool {
    let name = specifier.strip_prefix("node:").unwrap_or(specifier);
    BUILTINS.contains(&name)
}

/// Classify a specifier.
pub fn classify(specifier: &str) -> SpecifierKind {
    if is_builtin(specifier) {
        SpecifierKind::Builtin
    } else if specifier.starts_with("./") || specifier.starts_with("../") {
        SpecifierKind::Relative
    } else if specifier.starts_with('/') {
        SpecifierKind::Absolute
    } else if has_scheme(specifier) {
        SpecifierKind::FullyQualified
    } else {
        SpecifierKind::Bare
    }
}

/// Split a bare specifier into its package name and a `.`-rooted subpath.
///
/// Scoped packages keep their first two segments as the name:
/// `@scope/pkg/sub` becomes `("@scope/pkg", "./sub")`; a bare `pkg`
/// becomes `("pkg", ".")`.
pub fn split_package(specifier: &str) -> (&str, String) {
    let name_end = if let Some(rest) = specifier.strip_prefix('@') {
        match rest.find('/') {
            Some(scope_end) => {
                let after_scope = &rest[scope_end + 1..];
                match after_scope.find('/') {
                    Some(package_end) => 1 + scope_end + 1 + package_end,
                    None => specifier.len(),
                }
            }
            None => specifier.len(),
        }
    } else {
        specifier.find('/').unwrap_or(specifier.len())
    };
    let name = &specifier[..name_end];
    let subpath = if name_end == specifier.len() {
        String::from(".")
    } else {
        format!(".{}", &specifier[name_end..])
    };
    (name, subpath)
}

/// Whether a locator points at a JavaScript module, judged by extension.
pub fn is_javascript(locator: &url::Url) -> bool {
    let path = locator.path();
    path.ends_with(".js") || path.ends_with(".mjs") || path.ends_with(".cjs")
}

fn has_scheme(specifier: &str) -> bool {
    let Some(colon) = specifier.find(':') else {
        return false;
    };
    let scheme = &specifier[..colon];
    let mut chars = scheme.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '-' || c == '.')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_builtin() {
        assert!(is_builtin("fs"));
        assert!(is_builtin("node:fs"));
        assert!(is_builtin("path"));
        assert!(!is_builtin("lodash"));
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify("fs"), SpecifierKind::Builtin);
        assert_eq!(classify("./a.js"), SpecifierKind::Relative);
        assert_eq!(classify("../a.js"), SpecifierKind::Relative);
        assert_eq!(classify("/a.js"), SpecifierKind::Absolute);
        assert_eq!(classify("https://x.y/z.js"), SpecifierKind::FullyQualified);
        assert_eq!(classify("lodash"), SpecifierKind::Bare);
        assert_eq!(classify("@scope/pkg"), SpecifierKind::Bare);
    }

    #[test]
    fn test_split_package() {
        assert_eq!(split_package("lodash"), ("lodash", String::from(".")));
        assert_eq!(split_package("lodash/get"), ("lodash", String::from("./get")));
        assert_eq!(split_package("@types/node"), ("@types/node", String::from(".")));
        assert_eq!(
            split_package("@babel/core/lib/index"),
            ("@babel/core", String::from("./lib/index"))
        );
        assert_eq!(split_package("@scope"), ("@scope", String::from(".")));
    }

    #[test]
    fn test_is_javascript() {
        let js = url::Url::parse("file:///a/b.js").unwrap();
        let mjs = url::Url::parse("file:///a/b.mjs").unwrap();
        let svg = url::Url::parse("file:///a/b.svg").unwrap();
        assert!(is_javascript(&js));
        assert!(is_javascript(&mjs));
        assert!(!is_javascript(&svg));
    }
}
