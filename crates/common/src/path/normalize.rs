// Lexical path handling: `.`/`..` folding and common-prefix computation.
//
// Nothing here touches the filesystem. The daemon's sandbox layers
// canonicalization on top of these helpers.

use std::path::{Component, Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathError {
    #[error("path contains null byte")]
    NullByte,
}

/// Join a client-supplied relative path onto `base` and fold it lexically.
///
/// Rules:
/// - Reject null bytes
/// - An absolute `candidate` replaces `base` entirely (the sandbox rejects it
///   later unless it happens to land inside the root)
/// - `.` components are dropped, `..` pops the previous component
/// - `..` never climbs above the filesystem root
pub fn lexical_join(base: &Path, candidate: &str) -> Result<PathBuf, PathError> {
    if candidate.contains('\0') {
        return Err(PathError::NullByte);
    }

    Ok(lexical_normalize(&base.join(candidate)))
}

/// Fold `.` and `..` components without resolving symlinks.
pub fn lexical_normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                // `pop` is a no-op at the root, which is what we want.
                let after_parent =
                    matches!(out.components().next_back(), Some(Component::ParentDir));
                if after_parent || (!out.pop() && !out.has_root()) {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Longest common leading sequence of components shared by `a` and `b`.
pub fn common_prefix(a: &Path, b: &Path) -> PathBuf {
    a.components()
        .zip(b.components())
        .take_while(|(left, right)| left == right)
        .map(|(left, _)| left.as_os_str())
        .collect()
}
