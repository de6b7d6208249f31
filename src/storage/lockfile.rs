//! Data directory ownership
//!
//! sled refuses a second opener with an opaque I/O error. The lock file lets
//! a second `engagement-engine` process fail early with the owner's PID and
//! start time instead, and lets a crashed owner's lock be reclaimed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

const LOCK_FILE_NAME: &str = ".engagement.lock";

#[derive(Debug, Error)]
pub enum LockError {
    #[error("data directory {dir} is in use by PID {pid} (since {since}); remove {lock} if that process is gone")]
    Held {
        dir: PathBuf,
        pid: u32,
        since: DateTime<Utc>,
        lock: PathBuf,
    },

    #[error("lock file I/O at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Contents of the lock file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockOwner {
    pub pid: u32,
    pub started_at: DateTime<Utc>,
}

impl LockOwner {
    fn current() -> Self {
        Self {
            pid: std::process::id(),
            started_at: Utc::now(),
        }
    }

    /// Owner recorded in an existing lock file, `None` when unreadable.
    fn read(path: &Path) -> Option<Self> {
        let raw = fs::read_to_string(path).ok()?;
        serde_json::from_str(&raw).ok()
    }

    fn is_alive(&self) -> bool {
        self.pid != std::process::id() && pid_running(self.pid)
    }
}

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> LockError {
    let path = path.to_path_buf();
    move |source| LockError::Io { path, source }
}

#[cfg(unix)]
fn pid_running(pid: u32) -> bool {
    fs::read_to_string(format!("/proc/{pid}/cmdline"))
        .map(|cmdline| cmdline.contains("engagement"))
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn pid_running(_pid: u32) -> bool {
    true
}

/// Exclusive claim on a data directory, released on drop.
#[derive(Debug)]
pub struct ProcessLock {
    path: PathBuf,
    owner: LockOwner,
}

impl ProcessLock {
    pub fn acquire<P: AsRef<Path>>(data_dir: P) -> Result<Self, LockError> {
        let dir = data_dir.as_ref();
        fs::create_dir_all(dir).map_err(io_err(dir))?;
        let path = dir.join(LOCK_FILE_NAME);

        if path.exists() {
            match LockOwner::read(&path) {
                Some(owner) if owner.is_alive() => {
                    return Err(LockError::Held {
                        dir: dir.to_path_buf(),
                        pid: owner.pid,
                        since: owner.started_at,
                        lock: path,
                    });
                }
                Some(owner) => {
                    tracing::info!(stale_pid = owner.pid, "Reclaiming lock from a stopped instance");
                }
                None => tracing::warn!(path = %path.display(), "Unreadable lock file, replacing it"),
            }
        }

        let owner = LockOwner::current();
        let body = serde_json::to_string(&owner).map_err(|e| io_err(&path)(e.into()))?;
        fs::write(&path, body).map_err(io_err(&path))?;
        tracing::debug!(pid = owner.pid, path = %path.display(), "Data directory locked");

        Ok(Self { path, owner })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn owner(&self) -> &LockOwner {
        &self.owner
    }
}

impl Drop for ProcessLock {
    fn drop(&mut self) {
        // Another process may have reclaimed a lock we held too long
        if LockOwner::read(&self.path).is_some_and(|o| o.pid != self.owner.pid) {
            return;
        }
        if let Err(e) = fs::remove_file(&self.path) {
            tracing::warn!(error = %e, "Failed to remove lock file");
        }
    }
}
