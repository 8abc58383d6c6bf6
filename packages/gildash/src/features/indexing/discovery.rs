//! Source file discovery
//!
//! Walks the project root collecting every file with an accepted extension,
//! skipping `node_modules` wherever it appears in the path and anything the
//! ignore globs match. Paths come back project-relative with forward slashes,
//! sorted for deterministic run order.

use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::Path;
use tracing::warn;
use walkdir::WalkDir;

use crate::shared::error::{GildashError, Result};

/// Globs excluded regardless of caller configuration.
pub const IGNORE_FLOOR: &[&str] = &[
    "**/.git/**",
    "**/dist/**",
    "**/node_modules/**",
    "**/.gildash/**",
];

/// Compile the fixed floor unioned with the caller's globs.
pub fn build_ignore_set(user_patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in IGNORE_FLOOR.iter().copied() {
        builder.add(Glob::new(pattern).map_err(|err| {
            GildashError::validation(format!("invalid ignore glob `{pattern}`")).with_source(err)
        })?);
    }
    for pattern in user_patterns {
        builder.add(Glob::new(pattern).map_err(|err| {
            GildashError::validation(format!("invalid ignore glob `{pattern}`")).with_source(err)
        })?);
    }
    builder
        .build()
        .map_err(|err| GildashError::validation("failed to compile ignore globs").with_source(err))
}

/// Convert an absolute path under `root` to the stored representation.
pub fn to_relative(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let text = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

fn has_node_modules_segment(relative: &str) -> bool {
    relative.split('/').any(|segment| segment == "node_modules")
}

fn accepts_extension(file_name: &str, extensions: &[String]) -> bool {
    let lower = file_name.to_ascii_lowercase();
    extensions
        .iter()
        .any(|ext| lower.ends_with(&ext.to_ascii_lowercase()))
}

/// Discover every indexable source file under `root`.
pub fn discover_source_files(
    root: &Path,
    extensions: &[String],
    ignore: &GlobSet,
) -> Result<Vec<String>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                // Unreadable directories should not kill the sweep
                warn!(error = %err, "skipping unreadable directory entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(relative) = to_relative(root, entry.path()) else {
            continue;
        };
        if has_node_modules_segment(&relative) {
            continue;
        }
        if ignore.is_match(&relative) {
            continue;
        }
        if !accepts_extension(&relative, extensions) {
            continue;
        }
        // Declaration files describe types, they do not declare them
        if relative.to_ascii_lowercase().ends_with(".d.ts") {
            continue;
        }
        files.push(relative);
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(root: &Path, relative: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "export const x = 1;\n").unwrap();
    }

    #[test]
    fn discovers_only_accepted_extensions() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "src/a.ts");
        touch(dir.path(), "src/b.mts");
        touch(dir.path(), "src/c.tsx");
        touch(dir.path(), "README.md");

        let extensions: Vec<String> = vec![".ts".into(), ".mts".into(), ".cts".into()];
        let ignore = build_ignore_set(&[]).unwrap();
        let files = discover_source_files(dir.path(), &extensions, &ignore).unwrap();
        assert_eq!(files, vec!["src/a.ts", "src/b.mts"]);
    }

    #[test]
    fn node_modules_is_skipped_anywhere() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "node_modules/lib/index.ts");
        touch(dir.path(), "src/node_modules/lib/index.ts");
        touch(dir.path(), "src/a.ts");

        let extensions: Vec<String> = vec![".ts".into()];
        let ignore = build_ignore_set(&[]).unwrap();
        let files = discover_source_files(dir.path(), &extensions, &ignore).unwrap();
        assert_eq!(files, vec!["src/a.ts"]);
    }

    #[test]
    fn user_globs_union_with_the_floor() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "src/a.ts");
        touch(dir.path(), "generated/out.ts");
        touch(dir.path(), "dist/bundle.ts");

        let extensions: Vec<String> = vec![".ts".into()];
        let ignore = build_ignore_set(&["generated/**".to_string()]).unwrap();
        let files = discover_source_files(dir.path(), &extensions, &ignore).unwrap();
        assert_eq!(files, vec!["src/a.ts"]);
    }

    #[test]
    fn declaration_files_are_excluded() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "src/a.ts");
        touch(dir.path(), "src/types.d.ts");

        let extensions: Vec<String> = vec![".ts".into()];
        let ignore = build_ignore_set(&[]).unwrap();
        let files = discover_source_files(dir.path(), &extensions, &ignore).unwrap();
        assert_eq!(files, vec!["src/a.ts"]);
    }
}
