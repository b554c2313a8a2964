//! Path checks without filesystem access.

use crate::constants;
use std::path::{Component, Path, PathBuf};

/// Resolve `.` and `..` components lexically.
pub fn normalize(path: &Path) -> PathBuf {
    let mut components = Vec::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                if !matches!(components.last(), Some(Component::RootDir) | None) {
                    components.pop();
                }
            }
            Component::CurDir => {}
            other => components.push(other),
        }
    }
    components.iter().collect()
}

/// Join `path` under `root`, dropping its leading `/`.
pub fn rebase(root: &Path, path: &Path) -> PathBuf {
    let relative: PathBuf = normalize(path)
        .components()
        .filter(|c| !matches!(c, Component::RootDir | Component::Prefix(_)))
        .collect();
    root.join(relative)
}

/// Reason `dir` cannot be used as an install directory, if any.
///
/// The source fetcher deletes the install directory wholesale, so it must be
/// absolute, already normalized, and strictly below a system directory.
pub fn install_dir_violation(dir: &Path) -> Option<String> {
    if !dir.is_absolute() {
        return Some(format!("install_dir must be absolute: {}", dir.display()));
    }
    if dir.to_string_lossy().chars().any(char::is_control) {
        return Some(format!("install_dir contains control characters: {:?}", dir));
    }
    let normalized = normalize(dir);
    if normalized != dir {
        return Some(format!(
            "install_dir must be normalized: {} (did you mean {}?)",
            dir.display(),
            normalized.display()
        ));
    }
    if constants::PROTECTED_DIRS
        .iter()
        .any(|p| normalized == Path::new(p))
    {
        return Some(format!(
            "install_dir {} is a system directory",
            dir.display()
        ));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_dotdot() {
        assert_eq!(normalize(Path::new("/a/b/../c")), PathBuf::from("/a/c"));
    }

    #[test]
    fn test_normalize_cannot_escape_root() {
        assert_eq!(normalize(Path::new("/../../etc")), PathBuf::from("/etc"));
    }

    #[test]
    fn test_rebase_absolute() {
        assert_eq!(
            rebase(Path::new("/stage"), Path::new("/etc/nginx/sites-available/x")),
            PathBuf::from("/stage/etc/nginx/sites-available/x")
        );
    }

    #[test]
    fn test_rebase_traversal_stays_inside() {
        assert_eq!(
            rebase(Path::new("/stage"), Path::new("/etc/../../root/.ssh")),
            PathBuf::from("/stage/root/.ssh")
        );
    }

    #[test]
    fn test_install_dir_ok() {
        assert!(install_dir_violation(Path::new("/opt/filedrop")).is_none());
        assert!(install_dir_violation(Path::new("/srv/apps/filedrop")).is_none());
    }

    #[test]
    fn test_install_dir_rejects_system_dirs() {
        assert!(install_dir_violation(Path::new("/")).is_some());
        assert!(install_dir_violation(Path::new("/etc")).is_some());
        assert!(install_dir_violation(Path::new("/opt")).is_some());
    }

    #[test]
    fn test_install_dir_rejects_relative_and_unnormalized() {
        assert!(install_dir_violation(Path::new("opt/filedrop")).is_some());
        assert!(install_dir_violation(Path::new("/opt/filedrop/..")).is_some());
    }

    #[test]
    fn test_install_dir_rejects_control_characters() {
        let reason = install_dir_violation(Path::new("/opt/filedrop\nExecStartPre=/bin/sh")).unwrap();
        assert!(reason.contains("control characters"), "{}", reason);
    }
}
