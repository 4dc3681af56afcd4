use crate::Result;
use fs4::fs_std::FileExt;
use ohno::IntoAppError;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

const LOG_TARGET: &str = "  run_lock";

/// Guard that releases the run lock when dropped
#[derive(Debug)]
pub struct RunLockGuard {
    file: File,
    path: PathBuf,
}

impl RunLockGuard {
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLockGuard {
    fn drop(&mut self) {
        if let Err(e) = self.file.unlock() {
            log::warn!(target: LOG_TARGET, "Could not release run lock '{}': {e:#}", self.path.display());
        }
    }
}

/// The lock file guarding `output`.
#[must_use]
pub fn lock_path_for(output: &Path) -> PathBuf {
    let mut name = output.file_name().map(ToOwned::to_owned).unwrap_or_default();
    name.push(".lock");
    output.with_file_name(name)
}

/// Take the exclusive lock guarding `output`, waiting for any other run to finish.
pub async fn acquire_run_lock(output: &Path) -> Result<RunLockGuard> {
    let lock_path = lock_path_for(output);

    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(&lock_path)
        .into_app_err_with(|| format!("opening run lock file at '{}'", lock_path.display()))?;

    // Blocking acquisition can take as long as another run does.
    let (file, path) = tokio::task::spawn_blocking(move || {
        log::debug!(target: LOG_TARGET, "Waiting for run lock at '{}'", lock_path.display());
        file.lock_exclusive()
            .into_app_err_with(|| format!("acquiring exclusive lock at '{}'", lock_path.display()))?;
        log::debug!(target: LOG_TARGET, "Acquired run lock at '{}'", lock_path.display());
        Ok::<_, ohno::AppError>((file, lock_path))
    })
    .await
    .into_app_err("lock task panicked")??;

    Ok(RunLockGuard { file, path })
}
