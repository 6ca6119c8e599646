//! Cross-process sync pass lock.
//!
//! [`SingleFlight`](super::SingleFlight) only sees passes inside one process.
//! Two `caltrack sync` invocations share nothing but the data directory, so
//! they coordinate through an advisory lock on `sync-<user>.lock` there. The
//! OS drops the lock when the holder exits, crashed or not.

use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use fd_lock::{RwLock, RwLockWriteGuard};
use tracing::debug;

use crate::error::Result;

/// Lock file for one user's sync passes.
pub struct PassLock {
    user: String,
    path: PathBuf,
    lock: RwLock<File>,
}

/// Lock file name for `user`. Characters outside `[A-Za-z0-9_-]` become `_`.
fn file_name(user: &str) -> String {
    let safe: String = user
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    format!("sync-{safe}.lock")
}

impl PassLock {
    /// Open (creating if needed) the lock file for `user` under `dir`.
    /// Nothing is locked yet.
    pub fn open(dir: &Path, user: &str) -> Result<Self> {
        let path = dir.join(file_name(user));
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)?;
        Ok(Self {
            user: user.to_string(),
            path,
            lock: RwLock::new(file),
        })
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Take the lock without waiting. `Ok(None)` means another holder has it.
    /// The lock is released when the guard drops.
    pub fn try_acquire(&mut self) -> Result<Option<RwLockWriteGuard<'_, File>>> {
        match self.lock.try_write() {
            Ok(guard) => {
                debug!(path = %self.path.display(), "sync lock acquired");
                Ok(Some(guard))
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
