//! Resolves the `from` glob patterns into the list of files to publish.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

const GLOB_META: &[char] = &['*', '?', '[', '{'];

/// Walk `root` and return every file whose path relative to `root` matches one
/// of `patterns`. Paths are returned joined onto `root`, sorted and deduplicated.
///
/// Absolute patterns and patterns starting with `..` point outside `root`; each
/// is walked from its own literal directory prefix instead.
pub fn discover(patterns: &[String], root: &Path) -> Result<Vec<String>> {
    if patterns.is_empty() {
        return Ok(Vec::new());
    }
    let (outside, inside): (Vec<&String>, Vec<&String>) =
        patterns.iter().partition(|p| escapes_root(p));

    let mut found = BTreeSet::new();
    if !inside.is_empty() {
        let set = compile(inside.into_iter().map(|p| p.trim_start_matches("./")))?;
        walk(root, &mut found, |path| {
            let Ok(relative) = path.strip_prefix(root) else {
                return false;
            };
            set.is_match(slash(relative))
        });
    }
    for pattern in outside {
        let full = if Path::new(pattern).is_absolute() {
            slash(Path::new(pattern))
        } else {
            format!(
                "{}/{}",
                slash(root).trim_end_matches('/'),
                pattern.trim_start_matches("./")
            )
        };
        debug!(pattern = %pattern, resolved = %full, "Pattern reaches outside the discovery root");
        let set = compile(std::iter::once(full.as_str()))?;
        let base = literal_base(&full);
        walk(&base, &mut found, |path| set.is_match(slash(path)));
    }

    info!(patterns = ?patterns, root = %root.display(), files = found.len(), "Discovered files");
    Ok(found.into_iter().collect())
}

fn escapes_root(pattern: &str) -> bool {
    let cleaned = pattern.trim_start_matches("./");
    Path::new(cleaned).is_absolute()
        || cleaned.starts_with('/')
        || cleaned == ".."
        || cleaned.starts_with("../")
}

/// Leading path segments that contain no glob syntax.
fn literal_base(pattern: &str) -> PathBuf {
    let segments: Vec<&str> = pattern
        .split('/')
        .take_while(|s| !s.contains(GLOB_META))
        .collect();
    match segments.as_slice() {
        [] => PathBuf::from("."),
        [""] => PathBuf::from("/"),
        _ => PathBuf::from(segments.join("/")),
    }
}

fn walk(start: &Path, found: &mut BTreeSet<String>, matches: impl Fn(&Path) -> bool) {
    for entry in WalkDir::new(start).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "Skipping unreadable path during discovery");
                continue;
            }
        };
        if entry.file_type().is_file() && matches(entry.path()) {
            found.insert(entry.path().to_string_lossy().into_owned());
        }
    }
}

fn slash(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

fn compile<'a>(patterns: impl IntoIterator<Item = &'a str>) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        debug!(pattern, "Compiling glob");
        let glob = Glob::new(pattern).with_context(|| format!("Invalid glob pattern {pattern:?}"))?;
        builder.add(glob);
    }
    builder.build().context("Failed to compile glob patterns")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"x").unwrap();
    }

    #[test]
    fn matches_recursive_patterns_in_sorted_order() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "dist/js/b.js");
        touch(dir.path(), "dist/a.js");
        touch(dir.path(), "dist/css/app.css");
        touch(dir.path(), "src/main.ts");

        let files = discover(&["./dist/**/*.js".to_string()], dir.path()).unwrap();
        let expected: Vec<String> = ["dist/a.js", "dist/js/b.js"]
            .iter()
            .map(|r| dir.path().join(r).to_string_lossy().into_owned())
            .collect();
        assert_eq!(files, expected);
    }

    #[test]
    fn overlapping_patterns_are_deduplicated() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "dist/a.js");

        let files = discover(
            &["dist/**".to_string(), "dist/*.js".to_string()],
            dir.path(),
        )
        .unwrap();
        assert_eq!(files.len(), 1);
    }

    #[test]
    fn invalid_pattern_is_an_error() {
        let dir = tempdir().unwrap();
        assert!(discover(&["dist/[".to_string()], dir.path()).is_err());
    }

    #[test]
    fn no_patterns_no_files() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "dist/a.js");
        assert!(discover(&[], dir.path()).unwrap().is_empty());
    }

    #[test]
    fn absolute_pattern_is_walked_from_its_own_directory() {
        let dir = tempdir().unwrap();
        let elsewhere = tempdir().unwrap();
        touch(elsewhere.path(), "out/a.js");
        touch(elsewhere.path(), "out/a.css");

        let pattern = format!("{}/out/*.js", slash(elsewhere.path()));
        let files = discover(&[pattern], dir.path()).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(slash(Path::new(&files[0])), format!("{}/out/a.js", slash(elsewhere.path())));
    }

    #[test]
    fn parent_relative_pattern_reaches_sibling_directory() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "shared/lib.js");
        touch(dir.path(), "app/dist/a.js");
        let root = dir.path().join("app");

        let files = discover(
            &["../shared/*.js".to_string(), "dist/*.js".to_string()],
            &root,
        )
        .unwrap();
        assert_eq!(files.len(), 2);
        assert!(files.iter().any(|f| f.ends_with("shared/lib.js")));
        assert!(files.iter().any(|f| Path::new(f) == root.join("dist/a.js")));
    }

    #[test]
    fn literal_base_stops_at_first_glob_segment() {
        assert_eq!(literal_base("/srv/out/**/*.js"), PathBuf::from("/srv/out"));
        assert_eq!(literal_base("./../shared/*.js"), PathBuf::from("./../shared"));
        assert_eq!(literal_base("/*.js"), PathBuf::from("/"));
        assert_eq!(literal_base("*.js"), PathBuf::from("."));
    }
}
