//! Load/validate/persist the versioned assignments document.
//!
//! Writes are linearized by the marker-file mutex and checked against the
//! version the writer last saw. The mutex avoids wasted work under
//! contention; the version check is the actual safety net and holds even if
//! a mutex expires mid-operation.

use crate::document::{AssignmentsDoc, DocumentError};
use crate::error::ErrorCode;
use crate::mutex::{FileMutex, MutexError, MutexOptions};
use crate::paths::{self, CoordPaths, PathError};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Assignment store failures. Parse and identity errors are fatal to the
/// operation; conflict and contention are recoverable by re-reading and
/// reapplying the caller's intent.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("cannot parse assignments at {path}: {message}")]
    Parse { path: PathBuf, message: String },
    #[error("assignments version conflict: expected {expected}, found {actual}")]
    VersionConflict { expected: u64, actual: u64 },
    #[error("refusing to persist version {submitted} over newer version {persisted}")]
    VersionRegression { submitted: u64, persisted: u64 },
    #[error("assignments at {path} belong to repository {found:?}, not {requested:?}")]
    IdentityMismatch {
        path: PathBuf,
        requested: String,
        found: String,
    },
    #[error("assignments mutex at {path} held by another process (waited {waited:?})")]
    Locked { path: PathBuf, waited: Duration },
    #[error("invalid assignments document: {0}")]
    Invalid(#[from] DocumentError),
    #[error(transparent)]
    Path(#[from] PathError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl From<MutexError> for StoreError {
    fn from(err: MutexError) -> Self {
        match err {
            MutexError::Timeout { path, waited } => Self::Locked { path, waited },
            MutexError::IoError(e) => Self::Io(e),
        }
    }
}

impl StoreError {
    /// Machine-readable code for CLI output.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Parse { .. } => ErrorCode::AssignmentsParseError,
            Self::VersionConflict { .. } | Self::VersionRegression { .. } => {
                ErrorCode::VersionConflict
            }
            Self::IdentityMismatch { .. } => ErrorCode::RepoIdentityMismatch,
            Self::Locked { .. } => ErrorCode::LockContention,
            Self::Invalid(_) | Self::Path(_) => ErrorCode::InternalUnexpected,
            Self::Io(_) => ErrorCode::WriteFailed,
        }
    }

    /// True for failures the caller can resolve by re-reading the latest
    /// document and reapplying the intended change.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::VersionConflict { .. } | Self::VersionRegression { .. } | Self::Locked { .. }
        )
    }
}

/// File-backed assignment store for one coordination area.
#[derive(Debug, Clone)]
pub struct Store {
    paths: CoordPaths,
    mutex: MutexOptions,
}

impl Store {
    /// Store rooted at the given coordination paths with default mutex tuning.
    #[must_use]
    pub fn new(paths: CoordPaths) -> Self {
        Self {
            paths,
            mutex: MutexOptions::default(),
        }
    }

    /// Override mutex tuning (tests, slow shared filesystems).
    #[must_use]
    pub fn with_mutex_options(mut self, mutex: MutexOptions) -> Self {
        self.mutex = mutex;
        self
    }

    /// The coordination paths this store reads and writes under.
    #[must_use]
    pub const fn paths(&self) -> &CoordPaths {
        &self.paths
    }

    /// Load the document for a repository.
    ///
    /// An absent file yields a fresh in-memory document at version 0 (not
    /// persisted). A malformed or schema-invalid file is surfaced as
    /// [`StoreError::Parse`], never silently repaired. A file recording a
    /// different repository id is a path collision and fails loudly.
    pub fn read(&self, repository_id: &str) -> Result<AssignmentsDoc, StoreError> {
        let path = self.paths.assignments_path(repository_id)?;
        match read_document(&path)? {
            None => Ok(AssignmentsDoc::new(repository_id, None)),
            Some(doc) if doc.repository_id == repository_id => Ok(doc),
            Some(doc) => Err(StoreError::IdentityMismatch {
                path,
                requested: repository_id.to_string(),
                found: doc.repository_id,
            }),
        }
    }

    /// Persist a document, guarded by the file mutex and the optimistic
    /// version check.
    ///
    /// `expected_version` defaults to `document.version - 1`: "I am
    /// submitting the next version after what I last saw." The write is
    /// rejected without touching the file when the persisted version is not
    /// the expected one, or when the submitted version does not advance past
    /// what is already on disk.
    pub fn write(
        &self,
        document: &AssignmentsDoc,
        expected_version: Option<u64>,
    ) -> Result<(), StoreError> {
        document.validate()?;
        let expected = expected_version.unwrap_or_else(|| document.version.saturating_sub(1));
        let path = self.paths.assignments_path(&document.repository_id)?;

        let mutex = FileMutex::acquire(&paths::lock_path_for(&path), &self.mutex)?;
        let result = self.write_under_mutex(&path, document, expected);
        // Surface the write error over a failed marker cleanup.
        let released = mutex.release();
        result?;
        released?;
        Ok(())
    }

    fn write_under_mutex(
        &self,
        path: &Path,
        document: &AssignmentsDoc,
        expected: u64,
    ) -> Result<(), StoreError> {
        let persisted = read_document(path)?;
        if let Some(ref current) = persisted {
            if current.repository_id != document.repository_id {
                return Err(StoreError::IdentityMismatch {
                    path: path.to_path_buf(),
                    requested: document.repository_id.clone(),
                    found: current.repository_id.clone(),
                });
            }
        }
        let current_version = persisted.as_ref().map_or(0, |doc| doc.version);

        if current_version != expected {
            return Err(StoreError::VersionConflict {
                expected,
                actual: current_version,
            });
        }
        if persisted.is_some() && document.version <= current_version {
            return Err(StoreError::VersionRegression {
                submitted: document.version,
                persisted: current_version,
            });
        }

        write_atomically(path, document)?;
        tracing::debug!(
            repository = %document.repository_id,
            version = document.version,
            "persisted assignments"
        );
        Ok(())
    }
}

fn read_document(path: &Path) -> Result<Option<AssignmentsDoc>, StoreError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let doc: AssignmentsDoc =
        serde_json::from_str(&content).map_err(|e| StoreError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
    doc.validate().map_err(|e| StoreError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    Ok(Some(doc))
}

/// Serialize to a temp file in the same directory, then rename over the
/// target so readers never observe a partial write.
fn write_atomically(path: &Path, document: &AssignmentsDoc) -> Result<(), StoreError> {
    let parent = path
        .parent()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no parent"))?;
    fs::create_dir_all(parent)?;

    let tmp = path.with_extension(format!("json.tmp.{}", std::process::id()));
    let mut payload = serde_json::to_string_pretty(document).map_err(|e| StoreError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    payload.push('\n');

    let written: Result<(), io::Error> = (|| {
        fs::write(&tmp, payload)?;
        fs::rename(&tmp, path)
    })();
    if let Err(e) = written {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }
    Ok(())
}
