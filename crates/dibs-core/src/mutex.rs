use crate::error::ErrorCode;
use std::{
    fs::{self, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
    thread,
    time::{Duration, Instant},
};

/// Tuning knobs for marker-file mutex acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MutexOptions {
    /// Markers older than this are treated as abandoned by a crashed holder.
    pub stale_after: Duration,
    /// Sleep between acquisition attempts while the marker is fresh.
    pub retry_interval: Duration,
    /// Hard deadline for the whole acquisition attempt.
    pub timeout: Duration,
}

impl Default for MutexOptions {
    fn default() -> Self {
        Self {
            stale_after: Duration::from_secs(300),
            retry_interval: Duration::from_millis(25),
            timeout: Duration::from_millis(2000),
        }
    }
}

/// Mutex acquisition errors.
#[derive(Debug)]
pub enum MutexError {
    Timeout { path: PathBuf, waited: Duration },
    IoError(io::Error),
}

impl From<io::Error> for MutexError {
    fn from(err: io::Error) -> Self {
        Self::IoError(err)
    }
}

impl MutexError {
    /// Machine-readable code associated with this mutex error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Timeout { .. } => ErrorCode::LockContention,
            Self::IoError(_) => ErrorCode::WriteFailed,
        }
    }

    /// Optional remediation hint for operators and agents.
    #[must_use]
    pub const fn hint(&self) -> Option<&'static str> {
        self.code().hint()
    }
}

impl std::fmt::Display for MutexError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timeout { path, waited } => {
                write!(
                    f,
                    "{}: mutex timed out after {:?} at {}",
                    self.code().code(),
                    waited,
                    path.display()
                )
            }
            Self::IoError(err) => write!(f, "{}: {}", self.code().code(), err),
        }
    }
}

impl std::error::Error for MutexError {}

/// RAII guard for the short-lived cross-process mutex around one
/// read-modify-write of an assignments file.
///
/// The marker file's existence is the lock; its JSON content
/// (`{"pid", "createdAt"}`) is diagnostic only. The lock is advisory: it
/// serializes cooperating dibs processes, nothing else.
#[derive(Debug)]
pub struct FileMutex {
    path: PathBuf,
    released: bool,
}

impl FileMutex {
    /// Acquire the marker-file mutex at `path`.
    ///
    /// Spins in bounded `retry_interval` steps until `timeout`. A marker
    /// whose mtime is older than `stale_after` is deleted and the slot
    /// retried immediately; the delete may race with another reclaimer, so
    /// `NotFound` counts as success.
    pub fn acquire(path: &Path, options: &MutexOptions) -> Result<Self, MutexError> {
        let parent = path.parent().ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "mutex path has no parent")
        })?;
        fs::create_dir_all(parent)?;

        let start = Instant::now();
        loop {
            match OpenOptions::new().write(true).create_new(true).open(path) {
                Ok(mut file) => {
                    let marker = serde_json::json!({
                        "pid": std::process::id(),
                        "createdAt": chrono::Utc::now().to_rfc3339(),
                    });
                    // Diagnostic payload only; an unwritable marker still locks.
                    let _ = writeln!(file, "{marker}");
                    return Ok(Self {
                        path: path.to_path_buf(),
                        released: false,
                    });
                }
                Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                    if marker_is_stale(path, options.stale_after) {
                        match fs::remove_file(path) {
                            Ok(()) => {
                                tracing::warn!(path = %path.display(), "reclaimed stale mutex marker");
                                continue;
                            }
                            Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                            Err(e) => return Err(e.into()),
                        }
                    }
                }
                Err(err) => return Err(err.into()),
            }

            if start.elapsed() >= options.timeout {
                return Err(MutexError::Timeout {
                    path: path.to_path_buf(),
                    waited: start.elapsed(),
                });
            }

            thread::sleep(options.retry_interval);
        }
    }

    /// Explicitly release the mutex. Release also happens automatically on drop.
    pub fn release(mut self) -> Result<(), MutexError> {
        self.released = true;
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Return the marker file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for FileMutex {
    fn drop(&mut self) {
        if !self.released {
            let _ = fs::remove_file(&self.path);
        }
    }
}

fn marker_is_stale(path: &Path, stale_after: Duration) -> bool {
    let Ok(meta) = fs::metadata(path) else {
        // Marker vanished between attempts; the next create_new decides.
        return false;
    };
    meta.modified()
        .ok()
        .and_then(|mtime| mtime.elapsed().ok())
        .is_some_and(|age| age >= stale_after)
}
