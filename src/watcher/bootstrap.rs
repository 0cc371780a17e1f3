//! Directory existence checks run before the loop starts.

use std::fs;
use std::path::{Path, PathBuf};

use super::error::WatchError;

/// A directory the loop reads from or writes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchedDirectory {
    path: PathBuf,
}

impl WatchedDirectory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the directory and missing parents.
    ///
    /// Returns `true` if anything was created. A path occupied by a
    /// non-directory is an error.
    pub fn ensure(&self) -> Result<bool, WatchError> {
        if self.path.is_dir() {
            return Ok(false);
        }
        fs::create_dir_all(&self.path).map_err(|source| WatchError::Bootstrap {
            path: self.path.clone(),
            source,
        })?;
        crate::log_event!("bootstrap", "created", "{}", self.path.display());
        Ok(true)
    }
}

/// Ensure both loop directories exist. Idempotent.
pub fn ensure_directories(input: &Path, output: &Path) -> Result<(), WatchError> {
    WatchedDirectory::new(input).ensure()?;
    WatchedDirectory::new(output).ensure()?;
    crate::log_event!(
        "bootstrap",
        "ready",
        "drop files into {}/, results go to {}/",
        input.display(),
        output.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_bootstrap_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("nested/input");
        let output = temp_dir.path().join("nested/deeper/output");

        ensure_directories(&input, &output).unwrap();
        ensure_directories(&input, &output).unwrap();

        assert!(input.is_dir());
        assert!(output.is_dir());
    }

    #[test]
    fn test_ensure_reports_creation() {
        let temp_dir = TempDir::new().unwrap();
        let dir = WatchedDirectory::new(temp_dir.path().join("fresh"));

        assert!(dir.ensure().unwrap());
        assert!(!dir.ensure().unwrap());
    }

    #[test]
    fn test_file_in_the_way_is_fatal() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = temp_dir.path().join("occupied");
        fs::write(&blocker, b"not a directory").unwrap();

        let err = ensure_directories(&blocker, &temp_dir.path().join("out")).unwrap_err();
        assert!(matches!(err, WatchError::Bootstrap { path, .. } if path == blocker));
    }
}
