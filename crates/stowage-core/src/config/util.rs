use std::path::{Path, PathBuf};

use crate::platform::paths;

/// Expand a leading `~` or `~/` to the user's home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    let home = || paths::home_dir();
    match path {
        "~" => home().unwrap_or_else(|| PathBuf::from(path)),
        _ => match path.strip_prefix("~/") {
            Some(rest) => home().map_or_else(|| PathBuf::from(path), |h| h.join(rest)),
            None => PathBuf::from(path),
        },
    }
}

/// Lexically normalize `path` against the current directory so that
/// containment checks do not depend on the directory existing yet.
pub(crate) fn absolutize(path: &Path) -> PathBuf {
    let base = if path.is_absolute() {
        PathBuf::new()
    } else {
        std::env::current_dir().unwrap_or_default()
    };
    let mut out = PathBuf::new();
    for component in base.join(path).components() {
        match component {
            std::path::Component::CurDir => {}
            std::path::Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}
