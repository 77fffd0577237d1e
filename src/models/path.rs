//! Canonical workspace paths.
//!
//! A canonical path is slash-joined with no leading or trailing slash; the
//! workspace root is the empty string. Every cascading operation (delete,
//! rename, tab invalidation) is expressed through [`is_ancestor_or_self`].

pub const ROOT: &str = "";
pub const SEPARATOR: char = '/';

/// Normalizes `raw` into its canonical form.
///
/// Empty and `.` segments are dropped and `..` pops the previous segment
/// (never above the root). Backslashes are treated as separators.
pub fn canonicalize(raw: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in raw.split(['/', '\\']) {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}

/// Path with its last segment removed; root children have the root as parent.
pub fn parent_of(path: &str) -> &str {
    match path.rfind(SEPARATOR) {
        Some(idx) => &path[..idx],
        None => ROOT,
    }
}

/// Last segment of `path`, used as a display name.
pub fn file_name(path: &str) -> &str {
    match path.rfind(SEPARATOR) {
        Some(idx) => &path[idx + 1..],
        None => path,
    }
}

pub fn join(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{parent}{SEPARATOR}{name}")
    }
}

/// True when `b` is `a` or lies underneath it.
///
/// `"foo"` is not an ancestor of `"foobar"`. The root is an ancestor of
/// every path.
pub fn is_ancestor_or_self(a: &str, b: &str) -> bool {
    if a.is_empty() {
        return true;
    }
    match b.strip_prefix(a) {
        Some(rest) => rest.is_empty() || rest.starts_with(SEPARATOR),
        None => false,
    }
}

/// Replaces the `from` prefix of `path` with `to`, keeping the relative tail.
///
/// Returns `None` when `path` is not `from` or one of its descendants.
pub fn rebase(path: &str, from: &str, to: &str) -> Option<String> {
    if !is_ancestor_or_self(from, path) {
        return None;
    }
    let tail = path[from.len()..].trim_start_matches(SEPARATOR);
    if tail.is_empty() {
        Some(to.to_string())
    } else {
        Some(join(to, tail))
    }
}

/// A single path segment usable as an entry name.
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\'])
}

#[cfg(test)]
#[path = "../../tests/unit/models/path.rs"]
mod tests;
