use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{StateError, StateResult};

/// Advisory lock held for the lifetime of a run.
///
/// The lock file is created exclusively and removed when the guard is dropped.
/// A stale file left by a killed process must be removed by hand.
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
}

impl RunLock {
    pub fn acquire(path: impl Into<PathBuf>) -> StateResult<Self> {
        let path = path.into();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| StateError::io(parent, e))?;
        }

        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(StateError::Locked(path.display().to_string()));
            }
            Err(e) => return Err(StateError::io(&path, e)),
        };

        writeln!(file, "{}", std::process::id()).map_err(|e| StateError::io(&path, e))?;
        debug!(path = %path.display(), "Acquired run lock");

        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        match fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Released run lock"),
            Err(e) => warn!(path = %self.path.display(), error = %e, "Failed to remove run lock"),
        }
    }
}
