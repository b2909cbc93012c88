use std::path::{Component, Path, PathBuf};

/// Lexically normalize a path, resolving `.` and `..` without touching the filesystem.
/// Leading `..` components that cannot be resolved are kept.
pub fn normalize_lexically(path: impl AsRef<Path>) -> PathBuf {
    let mut out = Vec::new();
    for component in path.as_ref().components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.last() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir | Component::Prefix(_)) => {}
                _ => out.push(component),
            },
            _ => out.push(component),
        }
    }
    out.iter().collect()
}

/// Join `path` onto `base` and return the result only if it stays inside `base`.
pub fn join_within(base: impl AsRef<Path>, path: impl AsRef<Path>) -> Option<PathBuf> {
    let base = normalize_lexically(base);
    let joined = normalize_lexically(base.join(path));
    (joined != base && joined.starts_with(&base)).then_some(joined)
}

/// Shorten `value` to at most `max_chars` characters, appending an ellipsis when cut.
pub fn truncate_chars(value: &str, max_chars: usize) -> String {
    match value.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &value[..idx]),
        None => value.to_string(),
    }
}
