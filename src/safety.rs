use std::path::{Path, PathBuf};
use thiserror::Error;

/// Directories that are machine-managed; patching inside them is always a
/// mistake, whatever the rule file says.
const MANAGED_DIRS: &[&str] = &[".git", "node_modules", "target"];

/// Confines patch targets to a project root.
///
/// Paths are canonicalized before checking, so a symlink pointing out of
/// the root is rejected even though its literal path looks safe.
#[derive(Debug, Clone)]
pub struct RootGuard {
    root: PathBuf,
}

#[derive(Error, Debug)]
pub enum SafetyError {
    #[error("path escapes project root: {path} (root: {root})")]
    OutsideRoot { path: PathBuf, root: PathBuf },

    #[error("path is inside a managed directory ({dir}): {path}")]
    ManagedPath { path: PathBuf, dir: &'static str },

    #[error("failed to resolve path: {0}")]
    Resolve(#[from] std::io::Error),
}

impl RootGuard {
    pub fn new(root: impl AsRef<Path>) -> Result<Self, SafetyError> {
        Ok(Self {
            root: root.as_ref().canonicalize()?,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a rule's target file to a canonical path inside the root.
    ///
    /// Relative paths are joined to the root first. The target must exist;
    /// these rules patch files, they do not create them.
    pub fn resolve(&self, target: impl AsRef<Path>) -> Result<PathBuf, SafetyError> {
        let target = target.as_ref();
        let joined = if target.is_absolute() {
            target.to_path_buf()
        } else {
            self.root.join(target)
        };

        let canonical = joined.canonicalize()?;

        if !canonical.starts_with(&self.root) {
            return Err(SafetyError::OutsideRoot {
                path: canonical,
                root: self.root.clone(),
            });
        }

        let relative = canonical.strip_prefix(&self.root).expect("checked prefix");
        for component in relative.components() {
            if let Some(dir) = MANAGED_DIRS
                .iter()
                .copied()
                .find(|d| component.as_os_str() == *d)
            {
                return Err(SafetyError::ManagedPath {
                    path: canonical.clone(),
                    dir,
                });
            }
        }

        Ok(canonical)
    }
}
