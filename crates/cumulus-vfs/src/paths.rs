//! Logical path helpers.
//!
//! Tree paths are absolute, `/`-separated strings independent of the host
//! platform, so these work on `&str` rather than `std::path`.

/// Path separator.
pub const SEPARATOR: char = '/';

/// Path of the root directory.
pub const ROOT: &str = "/";

/// Lexically normalize a path: collapse repeated separators, resolve `.`
/// and `..`, drop any trailing separator. The result is always absolute;
/// `..` at the root stays at the root.
pub fn clean(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for segment in path.split(SEPARATOR) {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            s => parts.push(s),
        }
    }
    if parts.is_empty() {
        return ROOT.to_string();
    }
    let mut out = String::with_capacity(path.len() + 1);
    for part in parts {
        out.push(SEPARATOR);
        out.push_str(part);
    }
    out
}

/// True if the path starts at the root.
pub fn is_absolute(path: &str) -> bool {
    path.starts_with(SEPARATOR)
}

/// Join a directory path and a leaf name.
pub fn join(dir: &str, name: &str) -> String {
    if dir == ROOT || dir.is_empty() {
        format!("{SEPARATOR}{name}")
    } else {
        format!("{dir}{SEPARATOR}{name}")
    }
}

/// Split a cleaned path into its parent directory and leaf name.
///
/// The root splits into `("/", "")`.
pub fn split(path: &str) -> (&str, &str) {
    match path.rfind(SEPARATOR) {
        Some(0) => (ROOT, &path[1..]),
        Some(idx) => (&path[..idx], &path[idx + 1..]),
        None => (ROOT, path),
    }
}

/// Prefix that every strict descendant of `dir` starts with.
pub fn descendant_prefix(dir: &str) -> String {
    if dir == ROOT {
        ROOT.to_string()
    } else {
        format!("{dir}{SEPARATOR}")
    }
}

/// True if `candidate` lies strictly below `ancestor`.
pub fn is_strict_descendant(candidate: &str, ancestor: &str) -> bool {
    if candidate == ancestor {
        return false;
    }
    candidate.starts_with(&descendant_prefix(ancestor))
}

/// Move `path` from under `old_base` to under `new_base`.
///
/// Returns `None` when `path` is not strictly below `old_base`.
pub fn rebase(path: &str, old_base: &str, new_base: &str) -> Option<String> {
    let prefix = descendant_prefix(old_base);
    let suffix = path.strip_prefix(&prefix)?;
    if suffix.is_empty() {
        return None;
    }
    Some(join(new_base, suffix))
}
