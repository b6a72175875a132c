//! Per-workspace execution lock.
//!
//! Independent of plan assignment: a workspace can be claimed without being
//! locked and locked without being claimed. The record names the owning
//! process so crash recovery can tell a running agent from a dead one, and
//! so `unlock` can refuse to pull the lock out from under a live process
//! unless forced.

use crate::error::ErrorCode;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

const LOCK_DIR: &str = ".dibs";
const LOCK_FILE: &str = "agent.lock.json";

/// Whether the lock outlives the acquiring command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockType {
    /// Held across commands until explicitly released.
    Persistent,
    /// Held for the duration of one agent run.
    Transient,
}

impl std::fmt::Display for LockType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Persistent => write!(f, "persistent"),
            Self::Transient => write!(f, "transient"),
        }
    }
}

/// The on-disk lock record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceLock {
    #[serde(rename = "type")]
    pub lock_type: LockType,
    pub pid: u32,
    pub hostname: String,
    pub command: String,
    pub started_at: DateTime<Utc>,
}

/// Workspace lock failures.
#[derive(Debug, thiserror::Error)]
pub enum WsLockError {
    #[error(
        "workspace locked by pid {} on {} (command {:?}, since {})",
        .0.pid, .0.hostname, .0.command, .0.started_at
    )]
    Held(WorkspaceLock),
    #[error(
        "lock owned by pid {} on {}, not this process; use force to override",
        .0.pid, .0.hostname
    )]
    NotOwner(WorkspaceLock),
    #[error("cannot parse workspace lock at {path}: {message}")]
    Parse { path: PathBuf, message: String },
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl WsLockError {
    /// Machine-readable code for CLI output.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Held(_) | Self::NotOwner(_) => ErrorCode::WorkspaceLocked,
            Self::Parse { .. } => ErrorCode::AssignmentsParseError,
            Self::Io(_) => ErrorCode::WriteFailed,
        }
    }
}

fn lock_path(workspace: &Path) -> PathBuf {
    workspace.join(LOCK_DIR).join(LOCK_FILE)
}

/// Hostname of this machine, best-effort.
#[must_use]
pub fn local_hostname() -> String {
    if let Ok(name) = std::env::var("HOSTNAME") {
        if !name.is_empty() {
            return name;
        }
    }
    std::process::Command::new("hostname")
        .output()
        .ok()
        .map(|out| String::from_utf8_lossy(&out.stdout).trim().to_string())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Check whether a process with the given pid is alive on this host.
///
/// Uses `/proc/<pid>` on Linux and a `kill -0` subprocess elsewhere on
/// Unix; other platforms conservatively report alive.
#[must_use]
pub fn pid_alive(pid: u32) -> bool {
    if pid == 0 {
        return false;
    }
    #[cfg(target_os = "linux")]
    {
        Path::new(&format!("/proc/{pid}")).exists()
    }
    #[cfg(all(unix, not(target_os = "linux")))]
    {
        std::process::Command::new("kill")
            .args(["-0", &pid.to_string()])
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status()
            .is_ok_and(|status| status.success())
    }
    #[cfg(not(unix))]
    {
        true
    }
}

/// Read the lock record for a workspace, or `None` when unlocked.
///
/// A malformed record is a parse error, never silently treated as unlocked.
pub fn lock_info(workspace: &Path) -> Result<Option<WorkspaceLock>, WsLockError> {
    let path = lock_path(workspace);
    let content = match fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    serde_json::from_str(&content)
        .map(Some)
        .map_err(|e| WsLockError::Parse {
            path,
            message: e.to_string(),
        })
}

/// True when the lock's owner is gone or the lock has outlived `max_age`.
///
/// Liveness is only checkable for locks taken on this host; locks from
/// other hosts fall back to the age test alone.
#[must_use]
pub fn is_lock_stale(record: &WorkspaceLock, max_age: Duration, now: DateTime<Utc>) -> bool {
    if record.hostname == local_hostname() && !pid_alive(record.pid) {
        return true;
    }
    now - record.started_at >= max_age
}

/// Acquire the execution lock for a workspace.
///
/// A live record fails with [`WsLockError::Held`]; a stale record is
/// replaced.
pub fn acquire_lock(
    workspace: &Path,
    command: &str,
    lock_type: LockType,
    max_age: Duration,
    now: DateTime<Utc>,
) -> Result<WorkspaceLock, WsLockError> {
    if let Some(existing) = lock_info(workspace)? {
        if is_lock_stale(&existing, max_age, now) {
            tracing::warn!(
                workspace = %workspace.display(),
                pid = existing.pid,
                "replacing stale workspace lock"
            );
        } else {
            return Err(WsLockError::Held(existing));
        }
    }

    let record = WorkspaceLock {
        lock_type,
        pid: std::process::id(),
        hostname: local_hostname(),
        command: command.to_string(),
        started_at: now,
    };
    let path = lock_path(workspace);
    let parent = path
        .parent()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "lock path has no parent"))?;
    fs::create_dir_all(parent)?;
    let mut payload = serde_json::to_string_pretty(&record).map_err(|e| WsLockError::Parse {
        path: path.clone(),
        message: e.to_string(),
    })?;
    payload.push('\n');
    fs::write(&path, payload)?;
    tracing::debug!(workspace = %workspace.display(), %lock_type, "acquired workspace lock");
    Ok(record)
}

/// Remove a lock record confirmed stale. Returns whether a record was removed.
pub fn clear_stale_lock(
    workspace: &Path,
    max_age: Duration,
    now: DateTime<Utc>,
) -> Result<bool, WsLockError> {
    match lock_info(workspace)? {
        Some(record) if is_lock_stale(&record, max_age, now) => {
            remove_lock_file(workspace)?;
            tracing::info!(
                workspace = %workspace.display(),
                pid = record.pid,
                "cleared stale workspace lock"
            );
            Ok(true)
        }
        _ => Ok(false),
    }
}

/// Release the execution lock. Without `force`, only the owning process on
/// the owning host may release. Returns whether a record was removed.
pub fn release_lock(workspace: &Path, force: bool) -> Result<bool, WsLockError> {
    let Some(record) = lock_info(workspace)? else {
        return Ok(false);
    };
    if !force && (record.pid != std::process::id() || record.hostname != local_hostname()) {
        return Err(WsLockError::NotOwner(record));
    }
    remove_lock_file(workspace)?;
    Ok(true)
}

fn remove_lock_file(workspace: &Path) -> Result<(), WsLockError> {
    match fs::remove_file(lock_path(workspace)) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
