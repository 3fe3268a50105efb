//! Scoped working-directory changes.
//!
//! The process working directory is global state: a stage that changes it
//! and forgets to change it back breaks every later stage and the host test
//! process. All directory changes go through [`WorkdirGuard`], which puts the
//! previous directory back when it is dropped, including during a panic or
//! when an async body is cancelled.

use crate::errors::{E2eError, E2eResult};
use std::future::Future;
use std::path::{Path, PathBuf};
use tracing::{debug, error};

/// RAII guard that restores the previous working directory on drop.
#[derive(Debug)]
pub struct WorkdirGuard {
    original: PathBuf,
    entered: PathBuf,
    restored: bool,
}

impl WorkdirGuard {
    /// Records the current directory and changes to `path`.
    ///
    /// Relative paths are resolved against the current directory.
    pub fn enter(path: impl AsRef<Path>) -> E2eResult<Self> {
        let original = std::env::current_dir().map_err(|source| E2eError::Workdir {
            path: PathBuf::from("."),
            source,
        })?;
        let path = path.as_ref();
        let target = if path.is_absolute() {
            path.to_path_buf()
        } else {
            original.join(path)
        };

        std::env::set_current_dir(&target).map_err(|source| E2eError::Workdir {
            path: target.clone(),
            source,
        })?;
        debug!(from = %original.display(), to = %target.display(), "Entered working directory");

        Ok(Self {
            original,
            entered: target,
            restored: false,
        })
    }

    /// The directory that was current before the guard was created.
    #[must_use]
    pub fn original(&self) -> &Path {
        &self.original
    }

    /// The directory the guard changed into.
    #[must_use]
    pub fn entered(&self) -> &Path {
        &self.entered
    }

    /// Restores the original directory, reporting failure to the caller.
    pub fn restore(mut self) -> E2eResult<()> {
        self.restored = true;
        std::env::set_current_dir(&self.original).map_err(|source| E2eError::Workdir {
            path: self.original.clone(),
            source,
        })?;
        debug!(to = %self.original.display(), "Restored working directory");
        Ok(())
    }
}

impl Drop for WorkdirGuard {
    fn drop(&mut self) {
        if self.restored {
            return;
        }
        match std::env::set_current_dir(&self.original) {
            Ok(()) => debug!(to = %self.original.display(), "Restored working directory"),
            Err(e) => error!(
                original = %self.original.display(),
                error = %e,
                "Failed to restore working directory"
            ),
        }
    }
}

/// Runs `body` with the working directory set to `path`.
///
/// The previous directory is restored on every exit path. An error from
/// `body` takes precedence over an error restoring the directory.
pub fn with_directory<T, F>(path: impl AsRef<Path>, body: F) -> E2eResult<T>
where
    F: FnOnce() -> E2eResult<T>,
{
    let guard = WorkdirGuard::enter(path)?;
    let result = body();
    finish(result, guard.restore())
}

/// Async variant of [`with_directory`].
///
/// Nothing else may change the working directory while `body` runs; stages
/// execute sequentially so this holds inside a pipeline.
pub async fn with_directory_async<T, F, Fut>(path: impl AsRef<Path>, body: F) -> E2eResult<T>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = E2eResult<T>>,
{
    let guard = WorkdirGuard::enter(path)?;
    let result = body().await;
    finish(result, guard.restore())
}

fn finish<T>(result: E2eResult<T>, restored: E2eResult<()>) -> E2eResult<T> {
    match (result, restored) {
        (Ok(value), Ok(())) => Ok(value),
        (Err(e), _) | (Ok(_), Err(e)) => Err(e),
    }
}
