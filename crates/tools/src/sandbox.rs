//! Filesystem sandboxing for the file tools.
//!
//! Paths must resolve inside one of the allowed roots. Relative paths are
//! taken relative to the first root. Any `..` component is rejected
//! before touching the filesystem, and existing prefixes are canonicalized
//! so symlinks cannot escape a root.

use std::path::{Component, Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    #[error("Path traversal detected in '{0}'")]
    PathTraversal(String),

    #[error("Path '{0}' is outside allowed directories")]
    OutsideRoots(String),

    #[error("Failed to resolve '{path}': {reason}")]
    Unresolvable { path: String, reason: String },
}

/// Set of directories file tools may touch. No roots means unrestricted.
#[derive(Debug, Clone, Default)]
pub struct Sandbox {
    roots: Vec<PathBuf>,
}

impl Sandbox {
    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self { roots }
    }

    /// Sandbox rooted at the process working directory.
    pub fn current_dir() -> Self {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self::new(vec![cwd])
    }

    pub fn unrestricted() -> Self {
        Self::default()
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Validate `path` and return the absolute path to use.
    pub fn resolve(&self, path: &str) -> Result<PathBuf, SandboxError> {
        let input = Path::new(path);
        if input.components().any(|c| matches!(c, Component::ParentDir)) {
            return Err(SandboxError::PathTraversal(path.into()));
        }

        let joined = match self.roots.first() {
            Some(base) if input.is_relative() => base.join(input),
            _ => input.to_path_buf(),
        };
        let resolved = canonicalize_existing_prefix(&joined).map_err(|reason| SandboxError::Unresolvable {
            path: path.into(),
            reason,
        })?;

        if self.roots.is_empty() {
            return Ok(resolved);
        }

        let inside = self.roots.iter().any(|root| {
            let root = root.canonicalize().unwrap_or_else(|_| root.clone());
            resolved.starts_with(&root)
        });
        if inside {
            Ok(resolved)
        } else {
            Err(SandboxError::OutsideRoots(path.into()))
        }
    }
}

/// Canonicalize the longest existing ancestor of `path` and re-append the
/// rest, so paths that do not exist yet (write targets) still resolve.
fn canonicalize_existing_prefix(path: &Path) -> Result<PathBuf, String> {
    let mut existing = path;
    let mut rest = Vec::new();
    loop {
        if existing.exists() {
            let mut base = existing.canonicalize().map_err(|e| e.to_string())?;
            for part in rest.iter().rev() {
                base.push(part);
            }
            return Ok(base);
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                rest.push(name.to_os_string());
                existing = parent;
            }
            _ => return Ok(path.to_path_buf()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn traversal_rejected() {
        let sandbox = Sandbox::unrestricted();
        assert!(matches!(sandbox.resolve("../../etc/passwd"), Err(SandboxError::PathTraversal(_))));
        assert!(matches!(sandbox.resolve("/home/user/../../etc"), Err(SandboxError::PathTraversal(_))));
    }

    #[test]
    fn relative_paths_join_first_root() {
        let dir = tempfile::tempdir().unwrap();
        let sandbox = Sandbox::new(vec![dir.path().to_path_buf()]);
        let resolved = sandbox.resolve("notes/today.md").unwrap();
        assert!(resolved.ends_with("notes/today.md"));
        assert!(resolved.starts_with(dir.path().canonicalize().unwrap()));
    }

    #[test]
    fn outside_roots_rejected() {
        let allowed = tempfile::tempdir().unwrap();
        let other = tempfile::tempdir().unwrap();
        let target = other.path().join("secret.txt");
        std::fs::write(&target, "x").unwrap();

        let sandbox = Sandbox::new(vec![allowed.path().to_path_buf()]);
        assert!(matches!(
            sandbox.resolve(target.to_str().unwrap()),
            Err(SandboxError::OutsideRoots(_))
        ));
    }

    #[test]
    fn any_root_may_match() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        let target = second.path().join("data.txt");
        let sandbox = Sandbox::new(vec![first.path().to_path_buf(), second.path().to_path_buf()]);
        assert!(sandbox.resolve(target.to_str().unwrap()).is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn symlink_escape_rejected() {
        let allowed = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();
        std::os::unix::fs::symlink(outside.path(), allowed.path().join("link")).unwrap();

        let sandbox = Sandbox::new(vec![allowed.path().to_path_buf()]);
        assert!(matches!(sandbox.resolve("link/file.txt"), Err(SandboxError::OutsideRoots(_))));
    }
}
