//! Lock files guarding one repository location.
//!
//! A lock is an exclusive OS file lock on `.<identifier>.lock` next to the
//! repository directory. The OS drops it when the owning process exits, so a
//! crashed process never leaves the location blocked. The lock file itself
//! persists between operations and carries no state.
//!
//! Record locks are owned per process, so holders inside this process are
//! additionally tracked in a registry; it is claimed before the file is
//! opened and released only after the file is closed.

use super::{HostingError, HostingResult};
use crate::model::repository::RepositoryIdentifier;
use file_guard::{FileGuard, Lock};
use log::debug;
use once_cell::sync::Lazy;
use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

static HELD_IN_PROCESS: Lazy<Mutex<HashSet<PathBuf>>> = Lazy::new(|| Mutex::new(HashSet::new()));

/// Held lock; released on drop.
pub(crate) struct LocationLock {
    path: PathBuf,
    guard: Option<FileGuard<Box<File>>>,
}

impl LocationLock {
    /// Claims the location without waiting.
    ///
    /// # Errors
    /// - `Locked` when another holder in this or another process owns it.
    pub(crate) fn acquire(root: &Path, id: &RepositoryIdentifier) -> HostingResult<Self> {
        let path = lock_path(root, id);
        if !held_in_process().insert(path.clone()) {
            return Err(HostingError::Locked(id.clone()));
        }

        match lock_file(&path) {
            Ok(guard) => Ok(Self {
                path,
                guard: Some(guard),
            }),
            Err(err) => {
                held_in_process().remove(&path);
                if is_contended(&err) {
                    debug!(
                        "event=hosting_lock module=hosting status=contended path={}",
                        path.display()
                    );
                    Err(HostingError::Locked(id.clone()))
                } else {
                    Err(HostingError::io(&path, err))
                }
            }
        }
    }
}

impl std::fmt::Debug for LocationLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocationLock")
            .field("path", &self.path)
            .field("held", &self.guard.is_some())
            .finish()
    }
}

impl Drop for LocationLock {
    fn drop(&mut self) {
        // Unlock and close before another in-process holder may open the file.
        drop(self.guard.take());
        held_in_process().remove(&self.path);
    }
}

pub(crate) fn lock_path(root: &Path, id: &RepositoryIdentifier) -> PathBuf {
    root.join(format!(".{id}.lock"))
}

fn lock_file(path: &Path) -> std::io::Result<FileGuard<Box<File>>> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)?;
    file_guard::try_lock(Box::new(file), Lock::Exclusive, 0, 1)
}

fn is_contended(err: &std::io::Error) -> bool {
    matches!(
        err.kind(),
        ErrorKind::WouldBlock | ErrorKind::PermissionDenied
    )
}

fn held_in_process() -> MutexGuard<'static, HashSet<PathBuf>> {
    HELD_IN_PROCESS
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}
