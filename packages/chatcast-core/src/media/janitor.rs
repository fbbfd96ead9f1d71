//! Reference-counted cleanup of downloaded media files.
//!
//! A [`MediaHandle::File`] is tracked as soon as its resolution returns, before
//! the request is admitted anywhere, and released once by whichever path ends
//! that request. A file is deleted when its last reference is released, so a
//! download shared by several requests (in one channel or many) survives until
//! all of them are done with it. Remote handles are never tracked or deleted.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use super::MediaHandle;

/// Tracks downloaded files and deletes them once no request needs them.
#[derive(Default)]
pub struct MediaJanitor {
    refs: Mutex<HashMap<PathBuf, usize>>,
}

impl MediaJanitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers one more reference to a handle. No-op for remote handles.
    pub fn track(&self, handle: &MediaHandle) {
        let Some(path) = handle.path() else {
            return;
        };
        let mut refs = self.refs.lock();
        let count = refs.entry(path.to_path_buf()).or_insert(0);
        *count += 1;
        log::debug!("[MediaJanitor] Tracking {} (refs={})", path.display(), count);
    }

    /// Drops one reference to a handle, deleting the file when none remain.
    ///
    /// Releasing an untracked handle does nothing, so a handle released twice is
    /// never deleted twice.
    pub async fn release(&self, handle: &MediaHandle) {
        let Some(path) = handle.path() else {
            return;
        };

        let delete = {
            let mut refs = self.refs.lock();
            match refs.get_mut(path) {
                None => {
                    log::debug!("[MediaJanitor] Ignoring release of untracked {}", path.display());
                    false
                }
                Some(count) if *count > 1 => {
                    *count -= 1;
                    false
                }
                Some(_) => {
                    refs.remove(path);
                    true
                }
            }
        };

        if delete {
            remove_file(path).await;
        }
    }

    /// Returns the number of live references to a handle.
    #[must_use]
    pub fn ref_count(&self, handle: &MediaHandle) -> usize {
        handle
            .path()
            .and_then(|p| self.refs.lock().get(p).copied())
            .unwrap_or(0)
    }

    /// Returns the number of distinct files currently tracked.
    #[must_use]
    pub fn tracked_files(&self) -> usize {
        self.refs.lock().len()
    }
}

/// Deletes a file; an already-missing file is not an error.
async fn remove_file(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => log::info!("[MediaJanitor] Deleted {}", path.display()),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            log::debug!("[MediaJanitor] {} already gone", path.display());
        }
        Err(e) => log::warn!("[MediaJanitor] Failed to delete {}: {}", path.display(), e),
    }
}
