//! Path containment.
//!
//! All checks are lexical: `.` and `..` segments are collapsed without
//! touching the filesystem, so the answer does not depend on whether the
//! target exists yet.

use std::path::{Component, Path, PathBuf};

use super::BridgeError;

/// Collapse `.` and `..` segments.
///
/// `..` directly under the root of an absolute path is dropped; leading `..`
/// segments of a relative path are kept.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out: Vec<Component<'_>> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.last() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir | Component::Prefix(_)) => {}
                _ => out.push(component),
            },
            other => out.push(other),
        }
    }
    out.iter().map(|c| c.as_os_str()).collect()
}

/// Express `target` relative to `root`.
///
/// Both sides are normalized first. When they share no leading component
/// (for example different drive prefixes) the target is returned as is.
pub fn relative_to(root: &Path, target: &Path) -> PathBuf {
    let root = normalize(root);
    let target = normalize(target);
    let root_parts: Vec<_> = root.components().collect();
    let target_parts: Vec<_> = target.components().collect();

    let common = root_parts.iter().zip(&target_parts).take_while(|(a, b)| a == b).count();
    if common == 0 && target.is_absolute() {
        return target;
    }

    let mut rel = PathBuf::new();
    for _ in &root_parts[common..] {
        rel.push("..");
    }
    for part in &target_parts[common..] {
        rel.push(part.as_os_str());
    }
    rel
}

/// Whether `path` lies inside `root`.
///
/// A relative `path` is joined onto `root` first. The path is inside iff its
/// root-relative form is empty, or does not begin with a `..` segment and is
/// not itself absolute.
pub fn is_in_workspace(root: &Path, path: &Path) -> bool {
    let candidate = if path.is_absolute() { path.to_path_buf() } else { root.join(path) };
    let rel = relative_to(root, &candidate);
    if rel.as_os_str().is_empty() {
        return true;
    }
    !matches!(rel.components().next(), Some(Component::ParentDir)) && !rel.is_absolute()
}

/// Resolve a remote-supplied path against the project root.
///
/// Fails with [`BridgeError::NoWorkspace`] when no project is open and with
/// [`BridgeError::OutsideWorkspace`] when the path escapes the root.
pub fn resolve_in_workspace(root: Option<&Path>, raw: &str) -> Result<PathBuf, BridgeError> {
    let root = root.ok_or_else(|| BridgeError::NoWorkspace(raw.to_string()))?;
    let path = Path::new(raw);
    if !is_in_workspace(root, path) {
        return Err(BridgeError::OutsideWorkspace(raw.to_string()));
    }
    let joined = if path.is_absolute() { path.to_path_buf() } else { root.join(path) };
    Ok(normalize(&joined))
}

/// Root-relative path with `/` separators, as the mirror stores it.
pub fn mirror_path(root: &Path, path: &Path) -> String {
    relative_to(root, path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absolute_inside_root() {
        assert!(is_in_workspace(Path::new("/proj"), Path::new("/proj/src/a.c")));
    }

    #[test]
    fn test_root_itself() {
        assert!(is_in_workspace(Path::new("/proj"), Path::new("/proj")));
        assert!(is_in_workspace(Path::new("/proj"), Path::new("/proj/")));
        assert!(is_in_workspace(Path::new("/proj"), Path::new("")));
    }

    #[test]
    fn test_absolute_outside_root() {
        assert!(!is_in_workspace(Path::new("/proj"), Path::new("/etc/passwd")));
        assert!(!is_in_workspace(Path::new("/proj"), Path::new("/project/a.c")));
    }

    #[test]
    fn test_relative_traversal() {
        assert!(!is_in_workspace(Path::new("/proj"), Path::new("../x")));
        assert!(!is_in_workspace(Path::new("/proj"), Path::new("src/../../x")));
        assert!(is_in_workspace(Path::new("/proj"), Path::new("src/../x")));
    }

    #[test]
    fn test_absolute_with_traversal_back_inside() {
        assert!(is_in_workspace(Path::new("/proj"), Path::new("/proj/src/../lib/b.c")));
        assert!(!is_in_workspace(Path::new("/proj"), Path::new("/proj/../etc")));
    }

    #[test]
    fn test_dotted_names_are_not_traversal() {
        assert!(is_in_workspace(Path::new("/proj"), Path::new("..config/a")));
    }

    #[test]
    fn test_relative_to() {
        assert_eq!(relative_to(Path::new("/a/b"), Path::new("/a/c/d")), PathBuf::from("../c/d"));
        assert_eq!(relative_to(Path::new("/a/b"), Path::new("/a/b")), PathBuf::new());
    }

    #[test]
    fn test_resolve_requires_root() {
        assert!(matches!(
            resolve_in_workspace(None, "a.c"),
            Err(BridgeError::NoWorkspace(_))
        ));
        assert!(matches!(
            resolve_in_workspace(None, "/proj/a.c"),
            Err(BridgeError::NoWorkspace(_))
        ));
    }

    #[test]
    fn test_resolve_joins_and_normalizes() {
        let root = Path::new("/proj");
        assert_eq!(
            resolve_in_workspace(Some(root), "ta/./main.c").unwrap(),
            PathBuf::from("/proj/ta/main.c")
        );
        assert!(matches!(
            resolve_in_workspace(Some(root), "/etc/passwd"),
            Err(BridgeError::OutsideWorkspace(_))
        ));
    }

    #[test]
    fn test_mirror_path_uses_forward_slashes() {
        assert_eq!(mirror_path(Path::new("/proj"), Path::new("/proj/ta/main.c")), "ta/main.c");
    }
}
