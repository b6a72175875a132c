//! Crash-recovery gate for resuming agent tasks.
//!
//! The checkpoint store itself lives elsewhere; this module only consumes
//! its save/get/delete surface to decide whether a workspace is safe to
//! reuse. The rule: never resume into a workspace whose execution lock is
//! held by a live process.

use crate::wslock::{self, WorkspaceLock, WsLockError};
use chrono::{DateTime, Duration, Utc};
use std::path::Path;
use uuid::Uuid;

/// Save/get/delete surface of the external checkpoint store, keyed by task
/// id.
pub trait CheckpointStore {
    type Error: std::error::Error + Send + Sync + 'static;

    fn save(&self, task_id: &str, payload: &[u8]) -> Result<(), Self::Error>;
    fn get(&self, task_id: &str) -> Result<Option<Vec<u8>>, Self::Error>;
    fn delete(&self, task_id: &str) -> Result<(), Self::Error>;
}

/// Plan metadata lookup used for human-readable messaging. UUID in, display
/// details out; implementations live with the plan storage layer.
pub trait PlanCatalog {
    fn title_of(&self, plan_uuid: Uuid) -> Option<String>;
    fn plan_id_of(&self, plan_uuid: Uuid) -> Option<i64>;
}

/// Display label for a plan: its title when the catalog knows one, the
/// numeric id as a fallback, the bare UUID otherwise.
#[must_use]
pub fn describe_plan(catalog: &dyn PlanCatalog, plan_uuid: Uuid) -> String {
    if let Some(title) = catalog.title_of(plan_uuid) {
        return title;
    }
    catalog
        .plan_id_of(plan_uuid)
        .map_or_else(|| plan_uuid.to_string(), |id| format!("plan #{id}"))
}

/// Outcome of the pre-resume workspace check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResumeDecision {
    /// Safe to resume; a stale lock may have been cleared on the way.
    Proceed { cleared_stale_lock: bool },
    /// Another live process owns the workspace; resuming would risk
    /// concurrent mutation of the same working tree.
    WorkspaceLocked { holder: WorkspaceLock },
    /// No checkpoint recorded for the task; nothing to resume.
    NoCheckpoint,
}

/// Recovery failures: either the workspace lock layer or the checkpoint
/// store.
#[derive(Debug, thiserror::Error)]
pub enum RecoveryError {
    #[error(transparent)]
    Lock(#[from] WsLockError),
    #[error("checkpoint store: {0}")]
    Checkpoint(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Decide whether a crashed task may resume in its workspace.
pub fn prepare_resume<C: CheckpointStore>(
    workspace: &Path,
    task_id: &str,
    checkpoints: &C,
    max_lock_age: Duration,
    now: DateTime<Utc>,
) -> Result<ResumeDecision, RecoveryError> {
    let checkpoint = checkpoints
        .get(task_id)
        .map_err(|e| RecoveryError::Checkpoint(Box::new(e)))?;
    if checkpoint.is_none() {
        return Ok(ResumeDecision::NoCheckpoint);
    }

    match wslock::lock_info(workspace)? {
        None => Ok(ResumeDecision::Proceed {
            cleared_stale_lock: false,
        }),
        Some(record) if wslock::is_lock_stale(&record, max_lock_age, now) => {
            wslock::clear_stale_lock(workspace, max_lock_age, now)?;
            Ok(ResumeDecision::Proceed {
                cleared_stale_lock: true,
            })
        }
        Some(record) => {
            tracing::warn!(
                workspace = %workspace.display(),
                pid = record.pid,
                "resume blocked: workspace locked by a live process"
            );
            Ok(ResumeDecision::WorkspaceLocked { holder: record })
        }
    }
}

/// Drop the task's checkpoint after a completed resume.
pub fn finish_resume<C: CheckpointStore>(
    task_id: &str,
    checkpoints: &C,
) -> Result<(), RecoveryError> {
    checkpoints
        .delete(task_id)
        .map_err(|e| RecoveryError::Checkpoint(Box::new(e)))
}
