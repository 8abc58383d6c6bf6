//! tsconfig path-mapping support
//!
//! Loads `compilerOptions.paths` from `tsconfig.json` (falling back to
//! `jsconfig.json`) at the project root. The coordinator caches the loaded
//! mappings for the instance lifetime and invalidates when a watcher event
//! touches either file. JSONC niceties beyond trailing commas and `//`
//! comments are not handled.

use serde_json::Value;
use std::path::Path;
use tracing::debug;

/// Resolved `paths` aliases: pattern → targets, both possibly carrying one
/// `*` wildcard, targets relative to `base_url`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TsconfigPaths {
    pub base_url: String,
    pub mappings: Vec<(String, Vec<String>)>,
}

impl TsconfigPaths {
    /// Expand `specifier` through the alias table. Returns base-url-relative
    /// candidate paths, first match wins at the call site.
    pub fn expand(&self, specifier: &str) -> Vec<String> {
        let mut candidates = Vec::new();
        for (pattern, targets) in &self.mappings {
            if let Some(star) = pattern.find('*') {
                let (prefix, suffix) = (&pattern[..star], &pattern[star + 1..]);
                if specifier.len() >= prefix.len() + suffix.len()
                    && specifier.starts_with(prefix)
                    && specifier.ends_with(suffix)
                {
                    let captured = &specifier[prefix.len()..specifier.len() - suffix.len()];
                    for target in targets {
                        candidates.push(join_base(&self.base_url, &target.replacen('*', captured, 1)));
                    }
                }
            } else if pattern == specifier {
                for target in targets {
                    candidates.push(join_base(&self.base_url, target));
                }
            }
        }
        candidates
    }
}

fn join_base(base_url: &str, target: &str) -> String {
    if base_url.is_empty() || base_url == "." {
        target.to_string()
    } else {
        format!("{}/{}", base_url.trim_end_matches('/'), target)
    }
}

/// Load path mappings from the project root, if any config declares them.
pub fn load_tsconfig_paths(project_root: &Path) -> Option<TsconfigPaths> {
    for name in ["tsconfig.json", "jsconfig.json"] {
        let path = project_root.join(name);
        let Ok(raw) = std::fs::read_to_string(&path) else {
            continue;
        };
        match parse_paths(&raw) {
            Some(paths) => {
                debug!(config = name, mappings = paths.mappings.len(), "loaded path aliases");
                return Some(paths);
            }
            None => continue,
        }
    }
    None
}

fn parse_paths(raw: &str) -> Option<TsconfigPaths> {
    let value: Value = serde_json::from_str(&strip_jsonc(raw)).ok()?;
    let options = value.get("compilerOptions")?;
    let base_url = options
        .get("baseUrl")
        .and_then(Value::as_str)
        .unwrap_or(".")
        .trim_start_matches("./")
        .to_string();
    let paths = options.get("paths")?.as_object()?;

    let mut mappings = Vec::new();
    for (pattern, targets) in paths {
        let targets: Vec<String> = targets
            .as_array()?
            .iter()
            .filter_map(Value::as_str)
            .map(|t| t.trim_start_matches("./").to_string())
            .collect();
        if !targets.is_empty() {
            mappings.push((pattern.clone(), targets));
        }
    }
    if mappings.is_empty() {
        return None;
    }
    Some(TsconfigPaths { base_url, mappings })
}

/// Strip `//` line comments and trailing commas so plain tsconfig files parse.
fn strip_jsonc(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut in_string = false;
    let mut chars = raw.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' => {
                in_string = !in_string;
                out.push(c);
            }
            '\\' if in_string => {
                out.push(c);
                if let Some(next) = chars.next() {
                    out.push(next);
                }
            }
            '/' if !in_string && chars.peek() == Some(&'/') => {
                for next in chars.by_ref() {
                    if next == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            ',' if !in_string => {
                // Drop the comma when the next meaningful char closes a scope
                let mut lookahead = chars.clone();
                let mut closes = false;
                for next in lookahead.by_ref() {
                    if next.is_whitespace() {
                        continue;
                    }
                    closes = matches!(next, '}' | ']');
                    break;
                }
                if !closes {
                    out.push(c);
                }
            }
            _ => out.push(c),
        }
    }
    out
}
