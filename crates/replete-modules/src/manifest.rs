//! Package manifest parsing and `exports` interpretation.

use serde::Deserialize;
use serde_json::Value;

/// The recognized fields of a `package.json`.
///
/// `exports` stays as raw JSON because its shape is open-ended: a string,
/// an array, a conditional mapping, or a subpath mapping with optional
/// single-`*` globs.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PackageManifest {
    /// CommonJS entry point
    pub main: Option<String>,

    /// ES module entry point
    pub module: Option<String>,

    /// Package exports
    #[serde(default)]
    pub exports: Option<Value>,
}

/// Condition names recognized when unwrapping conditional exports, in
/// priority order. All others (notably `require`) are ignored.
const CONDITIONS: &[&str] = &["import", "module", "default"];

impl PackageManifest {
    /// Parse a manifest from JSON text.
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    /// Resolve a `.`-rooted subpath to a target path relative to the
    /// manifest. `None` means the package does not export the subpath.
    pub fn resolve_subpath(&self, subpath: &str) -> Option<String> {
        match &self.exports {
            Some(exports) => resolve_exports(exports, subpath),
            None if subpath == "." => Some(
                self.module
                    .clone()
                    .or_else(|| self.main.clone())
                    .unwrap_or_else(|| String::from("./index.js")),
            ),
            None => Some(String::from(subpath)),
        }
    }
}

fn resolve_exports(exports: &Value, subpath: &str) -> Option<String> {
    if subpath == "." {
        let target = match exports {
            Value::Object(map) if is_subpath_map(map) => map.get(".")?,
            other => other,
        };
        return unwrap_conditions(target).map(String::from);
    }
    let Value::Object(map) = exports else {
        return None;
    };
    if !is_subpath_map(map) {
        return None;
    }
    if let Some(target) = map.get(subpath) {
        return unwrap_conditions(target).map(String::from);
    }
    // Glob lookup. Each key may contain exactly one `*`; among the keys
    // whose prefix and suffix both match, the longest prefix wins, and the
    // captured middle is substituted into the target's `*`.
    let mut best: Option<(usize, &Value, &str)> = None;
    for (key, value) in map {
        let Some((prefix, suffix)) = split_star(key) else {
            continue;
        };
        if subpath.len() >= prefix.len() + suffix.len()
            && subpath.starts_with(prefix)
            && subpath.ends_with(suffix)
        {
            let middle = &subpath[prefix.len()..subpath.len() - suffix.len()];
            if best.map_or(true, |(longest, _, _)| prefix.len() > longest) {
                best = Some((prefix.len(), value, middle));
            }
        }
    }
    let (_, value, middle) = best?;
    let target = unwrap_conditions(value)?;
    Some(match split_star(target) {
        Some((prefix, suffix)) => format!("{prefix}{middle}{suffix}"),
        None => String::from(target),
    })
}

/// Unwrap conditional objects and arrays down to a target string.
/// `None` at any step means "not exported".
fn unwrap_conditions(value: &Value) -> Option<&str> {
    match value {
        Value::String(target) => Some(target),
        Value::Array(items) => items.first().and_then(unwrap_conditions),
        Value::Object(map) => CONDITIONS
            .iter()
            .find_map(|condition| map.get(*condition))
            .and_then(unwrap_conditions),
        _ => None,
    }
}

fn is_subpath_map(map: &serde_json::Map<String, Value>) -> bool {
    map.keys().next().is_some_and(|key| key.starts_with('.'))
}

/// Split a pattern around its single `*`. `None` when there is no `*` or
/// more than one.
fn split_star(pattern: &str) -> Option<(&str, &str)> {
    let star = pattern.find('*')?;
    let suffix = &pattern[star + 1..];
    if suffix.contains('*') {
        return None;
    }
    Some((&pattern[..star], suffix))
}
