use std::path::{Component, Path, PathBuf};

/// Normalize a path lexically: drop `.` components and fold `..` onto the
/// parent where possible. Does not touch the file system.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let popped = matches!(
                    out.components().next_back(),
                    Some(Component::Normal(_))
                );
                if popped {
                    out.pop();
                } else {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    if out.as_os_str().is_empty() {
        out.push(".");
    }
    out
}

/// Resolve `value` against `base_dir` when relative, then normalize.
pub fn resolve_in(base_dir: &Path, value: &str) -> PathBuf {
    let candidate = Path::new(value);
    if candidate.is_absolute() {
        normalize(candidate)
    } else {
        normalize(&base_dir.join(candidate))
    }
}

/// True when the string contains glob metacharacters (`*`, `?`, `[`).
pub fn is_wildcard(value: &str) -> bool {
    value.contains('*') || value.contains('?') || value.contains('[')
}

/// True when `path` equals `ancestor` or sits below it.
pub fn is_same_or_under(path: &Path, ancestor: &Path) -> bool {
    path.starts_with(ancestor)
}
