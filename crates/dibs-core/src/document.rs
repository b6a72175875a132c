//! Versioned assignments document shared between processes.
//!
//! One document per repository, keyed by plan UUID. The `version` field is
//! the optimistic-concurrency token: it counts successful persisted writes,
//! and every writer must prove it saw the current value before replacing the
//! file. Ordered collections keep the persisted JSON byte-stable across
//! insertion orders.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

/// Document-shape violations caught by [`AssignmentsDoc::validate`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DocumentError {
    #[error("repository id must be non-empty")]
    EmptyRepositoryId,
    #[error("assignment {uuid} has no workspaces and no users; empty entries must be deleted")]
    EmptyEntry { uuid: Uuid },
    #[error("assignment {uuid} records owner for {workspace:?} which is not a claimed workspace")]
    OrphanOwner { uuid: Uuid, workspace: String },
}

/// The shared record of which workspaces/users have claimed which plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AssignmentsDoc {
    /// Stable identifier of the repository this document belongs to.
    /// Immutable once created.
    pub repository_id: String,
    /// Informational; not used for identity.
    #[serde(default)]
    pub repository_remote_url: Option<String>,
    /// Count of successful persisted writes since creation.
    pub version: u64,
    /// Plan UUID → assignment entry.
    #[serde(default)]
    pub assignments: BTreeMap<Uuid, AssignmentEntry>,
}

/// One plan's claim state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentEntry {
    /// Denormalized numeric plan id, cached for display. May be absent or
    /// stale; the UUID key is the sole identity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_id: Option<i64>,
    /// Absolute workspace paths currently claiming the plan.
    #[serde(default)]
    pub workspace_paths: BTreeSet<String>,
    /// Workspace path → claiming user, best-effort.
    #[serde(default)]
    pub workspace_owners: BTreeMap<String, String>,
    /// Union of users who claimed the plan, with or without a workspace.
    #[serde(default)]
    pub users: BTreeSet<String>,
    /// Last known plan status, informational.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Set once at first claim.
    pub assigned_at: DateTime<Utc>,
    /// Refreshed on every mutation.
    pub updated_at: DateTime<Utc>,
}

impl AssignmentsDoc {
    /// Fresh in-memory document: version 0, no assignments. Not persisted
    /// until the first write.
    #[must_use]
    pub fn new(repository_id: impl Into<String>, repository_remote_url: Option<String>) -> Self {
        Self {
            repository_id: repository_id.into(),
            repository_remote_url,
            version: 0,
            assignments: BTreeMap::new(),
        }
    }

    /// Check the document invariants: non-empty repository id, no empty
    /// entries, and owners only for claimed workspaces.
    pub fn validate(&self) -> Result<(), DocumentError> {
        if self.repository_id.is_empty() {
            return Err(DocumentError::EmptyRepositoryId);
        }
        for (uuid, entry) in &self.assignments {
            if entry.is_empty() {
                return Err(DocumentError::EmptyEntry { uuid: *uuid });
            }
            for workspace in entry.workspace_owners.keys() {
                if !entry.workspace_paths.contains(workspace) {
                    return Err(DocumentError::OrphanOwner {
                        uuid: *uuid,
                        workspace: workspace.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

impl AssignmentEntry {
    /// New entry for a first claim.
    #[must_use]
    pub fn first_claim(
        workspace: &str,
        user: Option<&str>,
        plan_id: Option<i64>,
        status: Option<&str>,
        now: DateTime<Utc>,
    ) -> Self {
        let mut workspace_paths = BTreeSet::new();
        workspace_paths.insert(workspace.to_string());
        let mut workspace_owners = BTreeMap::new();
        let mut users = BTreeSet::new();
        if let Some(user) = user {
            workspace_owners.insert(workspace.to_string(), user.to_string());
            users.insert(user.to_string());
        }
        Self {
            plan_id,
            workspace_paths,
            workspace_owners,
            users,
            status: status.map(ToString::to_string),
            assigned_at: now,
            updated_at: now,
        }
    }

    /// An entry with no workspaces and no users is equivalent to
    /// "not claimed" and must be deleted from the document.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.workspace_paths.is_empty() && self.users.is_empty()
    }

    /// Holders other than the given workspace/user, for warning messages.
    #[must_use]
    pub fn holders_except(&self, workspace: &str, user: Option<&str>) -> (Vec<&str>, Vec<&str>) {
        let other_workspaces = self
            .workspace_paths
            .iter()
            .map(String::as_str)
            .filter(|w| *w != workspace)
            .collect();
        let other_users = self
            .users
            .iter()
            .map(String::as_str)
            .filter(|u| Some(*u) != user)
            .collect();
        (other_workspaces, other_users)
    }
}
