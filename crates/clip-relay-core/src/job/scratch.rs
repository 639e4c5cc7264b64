use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

/// Uniquely named directory owned by one job.
///
/// [`ScratchDir::remove`] deletes it asynchronously; dropping an unremoved
/// directory deletes it synchronously as a fallback (panics, aborted tasks).
#[derive(Debug)]
pub struct ScratchDir {
    path: PathBuf,
    removed: bool,
}

impl ScratchDir {
    /// Create `<root>/<job_id>/`, creating `root` if absent.
    ///
    /// # Errors
    ///
    /// Returns the I/O error if a directory cannot be created or the job
    /// directory already exists.
    pub async fn create(root: &Path, job_id: Uuid) -> std::io::Result<Self> {
        tokio::fs::create_dir_all(root).await?;
        let path = root.join(job_id.to_string());
        tokio::fs::create_dir(&path).await?;
        debug!(path = %path.display(), "Scratch directory created");
        Ok(Self {
            path,
            removed: false,
        })
    }

    /// The directory path
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the directory and everything in it
    pub async fn remove(mut self) {
        self.removed = true;
        match tokio::fs::remove_dir_all(&self.path).await {
            Ok(()) => debug!(path = %self.path.display(), "Scratch directory removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "Failed to remove scratch directory"),
        }
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if self.removed {
            return;
        }
        if let Err(e) = std::fs::remove_dir_all(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %self.path.display(), error = %e, "Failed to remove scratch directory on drop");
            }
        }
    }
}
