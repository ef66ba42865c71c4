use crate::error::{IoContext, Result, StageError};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Exclusive advisory lock on a stage directory, released on drop.
///
/// The lock file sits next to the stage directory (`<stage_dir>.lock`) so a
/// full clean of the stage cannot remove it.
#[derive(Debug)]
pub struct StageLock {
    path: PathBuf,
    file: File,
}

impl StageLock {
    pub fn lock_path(stage_dir: &Path) -> PathBuf {
        let mut name = stage_dir.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(".lock");
        stage_dir.with_file_name(name)
    }

    /// Take the lock without waiting; a held lock is [`StageError::Busy`].
    pub fn acquire(stage_dir: &Path) -> Result<Self> {
        let path = Self::lock_path(stage_dir);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).at(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .at(&path)?;
        if file.try_lock_exclusive().is_err() {
            return Err(StageError::Busy { dir: stage_dir.to_path_buf() });
        }
        debug!("locked {}", path.display());
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StageLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_lock_is_busy() {
        let td = tempfile::tempdir().unwrap();
        let stage = td.path().join("Staged");
        let first = StageLock::acquire(&stage).unwrap();
        assert_eq!(first.path(), td.path().join("Staged.lock"));
        assert!(matches!(StageLock::acquire(&stage), Err(StageError::Busy { .. })));
        drop(first);
        assert!(StageLock::acquire(&stage).is_ok());
    }
}
