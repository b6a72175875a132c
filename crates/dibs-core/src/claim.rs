//! Claim and release transitions over one assignment entry.
//!
//! Claims are collaborative, not exclusive: another holder never blocks a
//! claim, it only produces a warning naming the other holders. Every
//! persisted mutation bumps the document version by exactly one and submits
//! the version read at the start as the expected version. On a version
//! conflict the caller retries the whole operation: re-read, then reapply
//! the intent, never the previously computed entry.

use crate::document::AssignmentEntry;
use crate::store::{Store, StoreError};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Identity of the repository being coordinated on, supplied by the caller
/// (the CLI resolves it from git).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoIdentity {
    /// Stable repository id; names the shared assignments file.
    pub id: String,
    /// Informational remote URL recorded on first write.
    pub remote_url: Option<String>,
}

/// One claim request.
#[derive(Debug, Clone, Copy)]
pub struct ClaimRequest<'a> {
    /// Plan identity. The UUID is the only identity-bearing key.
    pub plan_uuid: Uuid,
    /// Absolute path of the claiming workspace.
    pub workspace: &'a str,
    /// Claiming user, when known.
    pub user: Option<&'a str>,
    /// Denormalized numeric plan id, cached for display.
    pub plan_id: Option<i64>,
    /// Last known plan status, informational.
    pub status: Option<&'a str>,
}

/// What a claim actually did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimOutcome {
    /// A new entry was created for this plan.
    pub created: bool,
    /// The workspace was newly added (false on an idempotent re-claim).
    pub added_workspace: bool,
    /// The user was newly added.
    pub added_user: bool,
    /// A write occurred. False when nothing changed; no version bump then.
    pub persisted: bool,
    /// Document version after the operation.
    pub version: u64,
    /// Other holders, surfaced as informational warnings.
    pub warnings: Vec<String>,
}

/// What a release actually did. Mirrors [`ClaimOutcome`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseOutcome {
    /// An entry for the plan existed at all.
    pub existed: bool,
    /// The workspace was actually removed.
    pub removed_workspace: bool,
    /// The user was actually removed.
    pub removed_user: bool,
    /// The entry was deleted because the last holder left.
    pub entry_removed: bool,
    /// A write occurred.
    pub persisted: bool,
    /// Document version after the operation.
    pub version: u64,
    /// Remaining holders, named.
    pub warnings: Vec<String>,
    /// The surviving entry, when other holders remain.
    pub remaining: Option<AssignmentEntry>,
}

/// Add a workspace/user to a plan's assignment.
pub fn claim_plan(
    store: &Store,
    repository: &RepoIdentity,
    request: &ClaimRequest<'_>,
    now: DateTime<Utc>,
) -> Result<ClaimOutcome, StoreError> {
    let mut doc = store.read(&repository.id)?;
    let read_version = doc.version;
    if doc.repository_remote_url.is_none() {
        doc.repository_remote_url.clone_from(&repository.remote_url);
    }

    let mut warnings = Vec::new();
    let created;
    let added_workspace;
    let added_user;

    match doc.assignments.get_mut(&request.plan_uuid) {
        None => {
            doc.assignments.insert(
                request.plan_uuid,
                AssignmentEntry::first_claim(
                    request.workspace,
                    request.user,
                    request.plan_id,
                    request.status,
                    now,
                ),
            );
            created = true;
            added_workspace = true;
            added_user = request.user.is_some();
        }
        Some(entry) => {
            created = false;
            let (other_workspaces, other_users) =
                entry.holders_except(request.workspace, request.user);
            if !other_workspaces.is_empty() {
                warnings.push(format!(
                    "plan also claimed by workspace(s): {}",
                    other_workspaces.join(", ")
                ));
            }
            if !other_users.is_empty() {
                warnings.push(format!(
                    "plan also claimed by user(s): {}",
                    other_users.join(", ")
                ));
            }

            added_workspace = entry.workspace_paths.insert(request.workspace.to_string());
            added_user = match request.user {
                Some(user) => {
                    entry
                        .workspace_owners
                        .insert(request.workspace.to_string(), user.to_string());
                    entry.users.insert(user.to_string())
                }
                None => false,
            };
            if request.plan_id.is_some() {
                entry.plan_id = request.plan_id;
            }
            if let Some(status) = request.status {
                entry.status = Some(status.to_string());
            }
            if added_workspace || added_user {
                entry.updated_at = now;
            }
        }
    }

    // Re-claiming an already-fully-claimed plan is a no-op: no write,
    // no version bump.
    if !created && !added_workspace && !added_user {
        tracing::debug!(plan = %request.plan_uuid, workspace = request.workspace, "claim already held");
        return Ok(ClaimOutcome {
            created,
            added_workspace,
            added_user,
            persisted: false,
            version: read_version,
            warnings,
        });
    }

    doc.version = read_version + 1;
    store.write(&doc, Some(read_version))?;
    tracing::info!(
        plan = %request.plan_uuid,
        workspace = request.workspace,
        user = request.user.unwrap_or("-"),
        version = doc.version,
        "claimed plan"
    );

    Ok(ClaimOutcome {
        created,
        added_workspace,
        added_user,
        persisted: true,
        version: doc.version,
        warnings,
    })
}

/// Remove a workspace/user from a plan's assignment. Deletes the entry when
/// the last holder leaves.
pub fn release_plan(
    store: &Store,
    repository_id: &str,
    plan_uuid: Uuid,
    workspace: &str,
    user: Option<&str>,
    now: DateTime<Utc>,
) -> Result<ReleaseOutcome, StoreError> {
    let mut doc = store.read(repository_id)?;
    let read_version = doc.version;

    let Some(entry) = doc.assignments.get_mut(&plan_uuid) else {
        return Ok(ReleaseOutcome {
            existed: false,
            removed_workspace: false,
            removed_user: false,
            entry_removed: false,
            persisted: false,
            version: read_version,
            warnings: Vec::new(),
            remaining: None,
        });
    };

    let removed_workspace = entry.workspace_paths.remove(workspace);
    entry.workspace_owners.remove(workspace);
    let removed_user = user.is_some_and(|u| entry.users.remove(u));

    if !removed_workspace && !removed_user {
        return Ok(ReleaseOutcome {
            existed: true,
            removed_workspace,
            removed_user,
            entry_removed: false,
            persisted: false,
            version: read_version,
            warnings: Vec::new(),
            remaining: None,
        });
    }

    let entry_removed = entry.is_empty();
    let mut warnings = Vec::new();
    let mut remaining = None;

    if entry_removed {
        doc.assignments.remove(&plan_uuid);
    } else {
        entry.updated_at = now;
        if !entry.workspace_paths.is_empty() {
            warnings.push(format!(
                "plan still claimed by workspace(s): {}",
                entry
                    .workspace_paths
                    .iter()
                    .map(String::as_str)
                    .collect::<Vec<_>>()
                    .join(", ")
            ));
        }
        if !entry.users.is_empty() {
            warnings.push(format!(
                "plan still claimed by user(s): {}",
                entry.users.iter().map(String::as_str).collect::<Vec<_>>().join(", ")
            ));
        }
        remaining = Some(entry.clone());
    }

    doc.version = read_version + 1;
    store.write(&doc, Some(read_version))?;
    tracing::info!(
        plan = %plan_uuid,
        workspace,
        entry_removed,
        version = doc.version,
        "released plan"
    );

    Ok(ReleaseOutcome {
        existed: true,
        removed_workspace,
        removed_user,
        entry_removed,
        persisted: true,
        version: doc.version,
        warnings,
        remaining,
    })
}

/// Resolve the effective auto-claim setting: the configured flag, with the
/// environment opt-out taking precedence. Threaded into the CLI claim path
/// as an explicit value.
#[must_use]
pub fn effective_auto_claim(configured: bool, env_opt_out: Option<&str>) -> bool {
    match env_opt_out {
        Some(v) if !v.is_empty() && v != "0" && !v.eq_ignore_ascii_case("false") => false,
        _ => configured,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paths::CoordPaths;
    use chrono::TimeZone;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, 9, 26, 53).unwrap()
    }

    fn plan_uuid() -> Uuid {
        Uuid::parse_str("7f5a1f2e-93c4-4c59-9aa1-0f6a1c2d3e4f").expect("uuid")
    }

    fn repo() -> RepoIdentity {
        RepoIdentity {
            id: "repo-a".to_string(),
            remote_url: Some("git@example.com:acme/api.git".to_string()),
        }
    }

    fn request<'a>(workspace: &'a str, user: Option<&'a str>) -> ClaimRequest<'a> {
        ClaimRequest {
            plan_uuid: plan_uuid(),
            workspace,
            user,
            plan_id: Some(42),
            status: Some("in_progress"),
        }
    }

    fn test_store() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = Store::new(CoordPaths::new(dir.path()));
        (dir, store)
    }

    #[test]
    fn first_claim_creates_entry_at_version_one() {
        let (_dir, store) = test_store();

        let outcome =
            claim_plan(&store, &repo(), &request("/ws/one", Some("alice")), ts()).expect("claim");
        assert!(outcome.created);
        assert!(outcome.added_workspace);
        assert!(outcome.added_user);
        assert!(outcome.persisted);
        assert_eq!(outcome.version, 1);
        assert!(outcome.warnings.is_empty());

        let doc = store.read("repo-a").expect("read");
        assert_eq!(doc.version, 1);
        assert_eq!(
            doc.repository_remote_url.as_deref(),
            Some("git@example.com:acme/api.git")
        );
        let entry = doc.assignments.get(&plan_uuid()).expect("entry");
        assert!(entry.workspace_paths.contains("/ws/one"));
        assert!(entry.users.contains("alice"));
        assert_eq!(entry.workspace_owners.get("/ws/one").map(String::as_str), Some("alice"));
    }

    #[test]
    fn reclaim_by_same_holder_is_a_no_op() {
        let (_dir, store) = test_store();
        claim_plan(&store, &repo(), &request("/ws/one", Some("alice")), ts()).expect("claim");

        let second =
            claim_plan(&store, &repo(), &request("/ws/one", Some("alice")), ts()).expect("reclaim");
        assert!(!second.created);
        assert!(!second.added_workspace);
        assert!(!second.added_user);
        assert!(!second.persisted);
        assert_eq!(second.version, 1, "no version bump on a no-op");
        assert_eq!(store.read("repo-a").expect("read").version, 1);
    }

    #[test]
    fn second_workspace_joins_with_warnings() {
        let (_dir, store) = test_store();
        claim_plan(&store, &repo(), &request("/ws/one", Some("alice")), ts()).expect("claim");

        let outcome =
            claim_plan(&store, &repo(), &request("/ws/two", Some("bob")), ts()).expect("claim");
        assert!(!outcome.created);
        assert!(outcome.added_workspace);
        assert!(outcome.added_user);
        assert!(outcome.persisted);
        assert_eq!(outcome.version, 2);
        assert!(outcome.warnings.iter().any(|w| w.contains("/ws/one")));
        assert!(outcome.warnings.iter().any(|w| w.contains("alice")));

        let doc = store.read("repo-a").expect("read");
        let entry = doc.assignments.get(&plan_uuid()).expect("entry");
        assert_eq!(entry.workspace_paths.len(), 2);
        assert_eq!(entry.users.len(), 2);
    }

    #[test]
    fn sequential_read_write_pairs_preserve_both_claims() {
        // Two processes, serialized: read→write, read→write. Both survive
        // and the version advances by exactly 2.
        let (_dir, store) = test_store();
        claim_plan(&store, &repo(), &request("/ws/one", Some("alice")), ts()).expect("first");
        claim_plan(&store, &repo(), &request("/ws/two", Some("bob")), ts()).expect("second");

        let doc = store.read("repo-a").expect("read");
        assert_eq!(doc.version, 2);
        let entry = doc.assignments.get(&plan_uuid()).expect("entry");
        assert!(entry.workspace_paths.contains("/ws/one"));
        assert!(entry.workspace_paths.contains("/ws/two"));
    }

    #[test]
    fn stale_write_after_concurrent_claim_is_rejected() {
        // Process B reads at version 1, process A writes version 2, then
        // B's write with expected=1 must fail rather than overwrite.
        let (_dir, store) = test_store();
        claim_plan(&store, &repo(), &request("/ws/one", Some("alice")), ts()).expect("seed");

        let mut stale = store.read("repo-a").expect("b reads v1");
        claim_plan(&store, &repo(), &request("/ws/two", Some("bob")), ts()).expect("a writes v2");

        stale.version += 1;
        let err = store
            .write(&stale, Some(1))
            .expect_err("stale write must fail");
        assert!(err.is_recoverable());

        // Correct retry: re-read and reapply the intent.
        let retried =
            claim_plan(&store, &repo(), &request("/ws/three", Some("carol")), ts()).expect("retry");
        assert_eq!(retried.version, 3);
        let entry = store
            .read("repo-a")
            .expect("read")
            .assignments
            .get(&plan_uuid())
            .cloned()
            .expect("entry");
        assert!(entry.workspace_paths.contains("/ws/two"), "no lost update");
        assert!(entry.workspace_paths.contains("/ws/three"));
    }

    #[test]
    fn release_of_unknown_plan_reports_not_existed() {
        let (_dir, store) = test_store();
        let outcome = release_plan(&store, "repo-a", plan_uuid(), "/ws/one", Some("alice"), ts())
            .expect("release");
        assert!(!outcome.existed);
        assert!(!outcome.persisted);
        assert_eq!(outcome.version, 0);
    }

    #[test]
    fn releasing_last_holder_deletes_the_entry() {
        let (_dir, store) = test_store();
        claim_plan(&store, &repo(), &request("/ws/one", Some("alice")), ts()).expect("claim");

        let outcome = release_plan(&store, "repo-a", plan_uuid(), "/ws/one", Some("alice"), ts())
            .expect("release");
        assert!(outcome.existed);
        assert!(outcome.removed_workspace);
        assert!(outcome.removed_user);
        assert!(outcome.entry_removed);
        assert!(outcome.persisted);
        assert_eq!(outcome.version, 2);
        assert!(outcome.remaining.is_none());

        let doc = store.read("repo-a").expect("read");
        assert!(!doc.assignments.contains_key(&plan_uuid()));
    }

    #[test]
    fn partial_release_names_remaining_holders() {
        let (_dir, store) = test_store();
        claim_plan(&store, &repo(), &request("/ws/one", Some("alice")), ts()).expect("claim one");
        claim_plan(&store, &repo(), &request("/ws/two", Some("bob")), ts()).expect("claim two");

        let outcome = release_plan(&store, "repo-a", plan_uuid(), "/ws/one", Some("alice"), ts())
            .expect("release");
        assert!(outcome.existed);
        assert!(!outcome.entry_removed);
        assert!(outcome.persisted);
        assert_eq!(outcome.version, 3);
        assert!(outcome.warnings.iter().any(|w| w.contains("/ws/two")));
        assert!(outcome.warnings.iter().any(|w| w.contains("bob")));

        let remaining = outcome.remaining.expect("remaining entry");
        assert!(remaining.workspace_paths.contains("/ws/two"));
        assert!(remaining.users.contains("bob"));

        let entry = store
            .read("repo-a")
            .expect("read")
            .assignments
            .get(&plan_uuid())
            .cloned()
            .expect("entry survives");
        assert_eq!(entry.workspace_paths.len(), 1);
        assert_eq!(entry.users.len(), 1);
    }

    #[test]
    fn release_of_absent_holder_is_a_no_op() {
        let (_dir, store) = test_store();
        claim_plan(&store, &repo(), &request("/ws/one", Some("alice")), ts()).expect("claim");

        let outcome = release_plan(&store, "repo-a", plan_uuid(), "/ws/ghost", Some("mallory"), ts())
            .expect("release");
        assert!(outcome.existed);
        assert!(!outcome.removed_workspace);
        assert!(!outcome.removed_user);
        assert!(!outcome.persisted);
        assert_eq!(store.read("repo-a").expect("read").version, 1);
    }

    #[test]
    fn claim_without_user_tracks_workspace_only() {
        let (_dir, store) = test_store();
        let outcome = claim_plan(&store, &repo(), &request("/ws/one", None), ts()).expect("claim");
        assert!(outcome.created);
        assert!(!outcome.added_user);

        let doc = store.read("repo-a").expect("read");
        let entry = doc.assignments.get(&plan_uuid()).expect("entry");
        assert!(entry.users.is_empty());
        assert!(entry.workspace_owners.is_empty());
    }

    #[test]
    fn auto_claim_env_opt_out() {
        assert!(effective_auto_claim(true, None));
        assert!(effective_auto_claim(true, Some("")));
        assert!(effective_auto_claim(true, Some("0")));
        assert!(effective_auto_claim(true, Some("false")));
        assert!(!effective_auto_claim(true, Some("1")));
        assert!(!effective_auto_claim(true, Some("yes")));
        assert!(!effective_auto_claim(false, None));
    }
}
