//! Housekeeping for the on-disk session folder owned by the WhatsApp client.
//!
//! The folder's contents are opaque to the bridge. The only thing it ever does
//! is delete the whole folder after a logout so that the next start requires a
//! fresh QR pairing. Removal can race the client releasing its file locks, so
//! busy errors are retried a bounded number of times on an async timer.

mod fs;

use std::{
    io,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use thiserror::Error;
use tracing::{error, info, warn};

pub use fs::{LocalFs, SessionFs, SharedSessionFs};

/// Default number of retries after the first busy failure.
pub const DEFAULT_RETRIES: u32 = 3;
/// Fixed delay between busy retries.
pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupOutcome {
    /// The folder was removed after `attempts` removal calls.
    Removed { attempts: u32 },
    /// Nothing to delete.
    Missing,
}

#[derive(Debug, Error)]
pub enum CleanupError {
    #[error("session folder {} still busy after {attempts} attempts", path.display())]
    Busy {
        path: PathBuf,
        attempts: u32,
        #[source]
        source: io::Error,
    },
    #[error("failed to remove session folder {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Deletes a session folder, retrying while the filesystem reports it busy.
#[derive(Clone)]
pub struct SessionCleaner {
    path: PathBuf,
    retries: u32,
    backoff: Duration,
    fs: SharedSessionFs,
}

impl SessionCleaner {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            retries: DEFAULT_RETRIES,
            backoff: DEFAULT_BACKOFF,
            fs: Arc::new(LocalFs),
        }
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_fs(mut self, fs: SharedSessionFs) -> Self {
        self.fs = fs;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// Removes the session folder.
    ///
    /// A missing folder is a no-op. A busy folder is retried up to the
    /// configured budget with a fixed delay between attempts; any other
    /// failure is returned immediately. Every outcome is logged here, so
    /// callers that only need best-effort cleanup can ignore the result.
    pub async fn clear(&self) -> Result<CleanupOutcome, CleanupError> {
        let path = self.path.as_path();
        let mut remaining = self.retries;
        let mut attempts = 0u32;

        loop {
            let exists = self.fs.exists(path).await.map_err(|source| {
                error!(path = %path.display(), error = %source, "failed to inspect session folder");
                CleanupError::Io {
                    path: path.to_path_buf(),
                    source,
                }
            })?;
            if !exists {
                info!(path = %path.display(), "session folder does not exist, skipping deletion");
                return Ok(CleanupOutcome::Missing);
            }

            attempts += 1;
            match self.fs.remove_all(path).await {
                Ok(()) => {
                    info!(path = %path.display(), attempts, "session data cleared");
                    return Ok(CleanupOutcome::Removed { attempts });
                }
                // Removed underneath us; forced removal treats that as done.
                Err(err) if err.kind() == io::ErrorKind::NotFound => {
                    info!(path = %path.display(), attempts, "session data cleared");
                    return Ok(CleanupOutcome::Removed { attempts });
                }
                Err(err) if is_busy(&err) && remaining > 0 => {
                    warn!(
                        path = %path.display(),
                        remaining,
                        error = %err,
                        "session folder busy or locked; retrying"
                    );
                    remaining -= 1;
                    tokio::time::sleep(self.backoff).await;
                }
                Err(source) if is_busy(&source) => {
                    error!(
                        path = %path.display(),
                        attempts,
                        error = %source,
                        "giving up on busy session folder"
                    );
                    return Err(CleanupError::Busy {
                        path: path.to_path_buf(),
                        attempts,
                        source,
                    });
                }
                Err(source) => {
                    error!(path = %path.display(), error = %source, "error clearing session data");
                    return Err(CleanupError::Io {
                        path: path.to_path_buf(),
                        source,
                    });
                }
            }
        }
    }
}

/// Whether an I/O error means the resource is transiently held by someone else.
pub fn is_busy(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::ResourceBusy || is_lock_violation(err)
}

// ERROR_SHARING_VIOLATION / ERROR_LOCK_VIOLATION
#[cfg(windows)]
fn is_lock_violation(err: &io::Error) -> bool {
    matches!(err.raw_os_error(), Some(32) | Some(33))
}

#[cfg(not(windows))]
fn is_lock_violation(_err: &io::Error) -> bool {
    false
}
