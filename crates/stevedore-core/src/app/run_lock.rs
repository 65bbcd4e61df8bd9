//! RunLock - `task-run` ファイルロック
//!
//! Advisory exclusive lock that allows one task at a time per data
//! directory. Acquisition never waits.
//!
//! A runner hands its locked handle to the `run-task` child as stdin
//! ([`RunLock::hand_off`]); the child takes it over with
//! [`RunLock::adopt_inherited`]. The lock belongs to the open file, so it
//! stays held across the spawn.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Seek, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use thiserror::Error;
use tracing::{debug, warn};

use crate::domain::ErrorKind;

#[derive(Debug, Error)]
#[error("run lock {path} failed: {source}")]
pub struct LockError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

impl LockError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Storage
    }
}

#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
    file: Option<File>,
}

impl RunLock {
    pub const NAME: &'static str = "task-run";

    /// The lock named `task-run` inside `data_dir`.
    pub fn in_dir(data_dir: &Path) -> Self {
        Self::at(data_dir.join(Self::NAME))
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_held(&self) -> bool {
        self.file.is_some()
    }

    /// `Ok(false)` when another holder has it. Acquiring a lock this
    /// instance already holds is a no-op.
    pub fn try_acquire(&mut self) -> Result<bool, LockError> {
        if self.file.is_some() {
            return Ok(true);
        }
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| self.error(e))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&self.path)
            .map_err(|e| self.error(e))?;

        match FileExt::try_lock_exclusive(&file) {
            Ok(()) => {}
            Err(e) if e.raw_os_error() == fs2::lock_contended_error().raw_os_error() => {
                debug!(path = %self.path.display(), "run lock is held elsewhere");
                return Ok(false);
            }
            Err(e) => return Err(self.error(e)),
        }

        // holder pid, for whoever inspects a stuck lock
        write_pid(&file).map_err(|e| self.error(e))?;
        debug!(path = %self.path.display(), "run lock acquired");
        self.file = Some(file);
        Ok(true)
    }

    /// Give up this handle without unlocking. The lock stays held for as
    /// long as the returned file, or a process that inherited it, is open.
    pub fn hand_off(&mut self) -> Option<File> {
        let file = self.file.take()?;
        debug!(path = %self.path.display(), "run lock handed off");
        Some(file)
    }

    /// Take over a handle another process locked and passed on.
    ///
    /// `Ok(false)` when `file` is the lock file but not the locked handle
    /// and someone else holds the lock.
    #[cfg(unix)]
    pub fn adopt(&mut self, file: File) -> Result<bool, LockError> {
        use std::os::unix::fs::MetadataExt;

        if self.file.is_some() {
            return Ok(true);
        }
        let ours = fs::metadata(&self.path).map_err(|e| self.error(e))?;
        let theirs = file.metadata().map_err(|e| self.error(e))?;
        if (ours.dev(), ours.ino()) != (theirs.dev(), theirs.ino()) {
            return Err(self.error(io::Error::new(
                io::ErrorKind::InvalidInput,
                "inherited handle is not the run lock",
            )));
        }

        // a no-op on the handle that already holds it
        match FileExt::try_lock_exclusive(&file) {
            Ok(()) => {}
            Err(e) if e.raw_os_error() == fs2::lock_contended_error().raw_os_error() => {
                return Ok(false);
            }
            Err(e) => return Err(self.error(e)),
        }
        write_pid(&file).map_err(|e| self.error(e))?;
        debug!(path = %self.path.display(), "inherited run lock adopted");
        self.file = Some(file);
        Ok(true)
    }

    /// Adopt the lock a runner passed to this process as stdin.
    #[cfg(unix)]
    pub fn adopt_inherited(&mut self) -> Result<bool, LockError> {
        use std::os::fd::AsFd;

        let fd = io::stdin()
            .as_fd()
            .try_clone_to_owned()
            .map_err(|e| self.error(e))?;
        self.adopt(File::from(fd))
    }

    /// The runner holds the lock and waits for this process, nothing to take over.
    #[cfg(not(unix))]
    pub fn adopt_inherited(&mut self) -> Result<bool, LockError> {
        Ok(true)
    }

    /// Safe to call when not held.
    pub fn release(&mut self) -> Result<(), LockError> {
        let Some(file) = self.file.take() else {
            return Ok(());
        };
        if let Err(e) = file.set_len(0) {
            warn!(path = %self.path.display(), error = %e, "could not clear holder pid");
        }
        FileExt::unlock(&file).map_err(|e| self.error(e))?;
        debug!(path = %self.path.display(), "run lock released");
        Ok(())
    }

    fn error(&self, source: io::Error) -> LockError {
        LockError {
            path: self.path.clone(),
            source,
        }
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        let _ = self.release();
    }
}

fn write_pid(mut file: &File) -> io::Result<()> {
    file.set_len(0)?;
    file.rewind()?;
    writeln!(file, "{}", std::process::id())?;
    file.flush()
}
