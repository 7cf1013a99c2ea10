//! Derivation of remote keys from local file paths.
//!
//! Precedence when resolving a key: the custom [`PathMapper`], then the part of the
//! absolute path after the base path, then nothing (the bare `dist` prefix).

use std::path::{Component, Path, PathBuf};

use crate::contract::PathMapper;

/// One input file of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileTask {
    /// The path as supplied by the caller.
    pub local_path: String,
    pub absolute_path: PathBuf,
}

impl FileTask {
    pub fn new(local_path: impl Into<String>) -> Self {
        let local_path = local_path.into();
        let absolute_path = absolutize(Path::new(&local_path));
        Self {
            local_path,
            absolute_path,
        }
    }
}

/// Resolve `path` against the current directory and drop `.`/`..` components lexically.
pub fn absolutize(path: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        match std::env::current_dir() {
            Ok(cwd) => cwd.join(path),
            Err(_) => path.to_path_buf(),
        }
    };

    let mut out = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Convert backslashes to forward slashes.
///
/// Extended-length paths (`\\?\...`) and paths with non-ASCII characters are
/// opaque identifiers and come back unchanged.
pub fn slash(path: &str) -> String {
    if path.starts_with(r"\\?\") || !path.is_ascii() {
        return path.to_string();
    }
    path.replace('\\', "/")
}

/// Collapse runs of `/` into one, keeping the `scheme://` separator intact.
pub fn normalize_url(url: &str) -> String {
    let (scheme, rest) = match url.find("://") {
        Some(idx) => (&url[..idx + 3], &url[idx + 3..]),
        None => ("", url),
    };

    let mut out = String::with_capacity(url.len());
    out.push_str(scheme);
    let mut previous_slash = false;
    for ch in rest.chars() {
        if ch == '/' {
            if previous_slash {
                continue;
            }
            previous_slash = true;
        } else {
            previous_slash = false;
        }
        out.push(ch);
    }
    out
}

fn is_separator(c: char) -> bool {
    c == '/' || c == '\\'
}

/// Join `suffix` under `dist` with exactly one separator between them.
pub fn join_key(dist: &str, suffix: &str) -> String {
    if dist.is_empty() {
        return suffix.to_string();
    }
    if suffix.is_empty() {
        return dist.to_string();
    }
    format!(
        "{}/{}",
        dist.trim_end_matches(is_separator),
        suffix.trim_start_matches(is_separator)
    )
}

/// The base path the file paths are made relative to.
///
/// Empty when a custom mapper is configured. Otherwise the output root if one
/// was supplied, else `build_root`, made absolute and slashed.
pub fn base_path(output_root: Option<&Path>, build_root: &Path, has_mapper: bool) -> String {
    if has_mapper {
        return String::new();
    }
    let root = output_root.unwrap_or(build_root);
    slash(&absolutize(root).to_string_lossy())
}

/// Derive the remote key of `task`.
pub fn resolve(
    task: &FileTask,
    base_path: &str,
    dist: &str,
    mapper: Option<&dyn PathMapper>,
) -> String {
    let absolute = slash(&task.absolute_path.to_string_lossy());

    let suffix = mapper
        .and_then(|m| m.map(&task.absolute_path))
        .or_else(|| strip_base(&absolute, base_path).map(str::to_string))
        .unwrap_or_default();

    slash(&join_key(dist, &suffix))
}

fn strip_base<'a>(absolute: &'a str, base_path: &str) -> Option<&'a str> {
    if base_path.is_empty() {
        return None;
    }
    let base = base_path.trim_end_matches(is_separator);
    let rest = absolute.strip_prefix(base)?;
    // Only whole path components count as a prefix. Opaque paths keep their backslashes.
    if rest.is_empty() || rest.starts_with(is_separator) {
        Some(rest)
    } else {
        None
    }
}
