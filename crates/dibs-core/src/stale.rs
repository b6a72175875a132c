//! Staleness classification for assignments and lock markers.
//!
//! Assignments age in days; lock markers age in minutes. Both classifiers
//! are pure: given a reference time they always answer the same way, and the
//! boundary is inclusive (an entry exactly at the threshold is stale).

use crate::document::{AssignmentEntry, AssignmentsDoc};
use crate::store::{Store, StoreError};
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

/// True when the entry has not been touched for at least `threshold_days`.
#[must_use]
pub fn is_stale_assignment(
    entry: &AssignmentEntry,
    threshold_days: i64,
    reference: DateTime<Utc>,
) -> bool {
    reference - entry.updated_at >= Duration::days(threshold_days)
}

/// True when a lock-aged duration meets or exceeds the threshold.
#[must_use]
pub fn is_marker_stale(age: Duration, threshold: Duration) -> bool {
    age >= threshold
}

/// Stale entries of a document, in key order.
#[must_use]
pub fn find_stale(
    doc: &AssignmentsDoc,
    threshold_days: i64,
    reference: DateTime<Utc>,
) -> Vec<(Uuid, &AssignmentEntry)> {
    doc.assignments
        .iter()
        .filter(|(_, entry)| is_stale_assignment(entry, threshold_days, reference))
        .map(|(uuid, entry)| (*uuid, entry))
        .collect()
}

/// Result of a bulk stale-assignment cleanup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanOutcome {
    /// UUIDs removed from the document.
    pub removed: Vec<Uuid>,
    /// Document version after the write.
    pub version: u64,
}

/// Remove the given entries in one version-checked write.
///
/// `doc_as_read` must be the document from the listing read; its version
/// pins the write. If the document changed between listing and writing, the
/// write fails with a version conflict and nothing is removed, so the
/// operator re-runs instead of getting a partial cleanup.
pub fn remove_entries(
    store: &Store,
    doc_as_read: &AssignmentsDoc,
    uuids: &[Uuid],
) -> Result<CleanOutcome, StoreError> {
    let mut doc = doc_as_read.clone();
    let read_version = doc.version;

    let mut removed = Vec::new();
    for uuid in uuids {
        if doc.assignments.remove(uuid).is_some() {
            removed.push(*uuid);
        }
    }
    if removed.is_empty() {
        return Ok(CleanOutcome {
            removed,
            version: read_version,
        });
    }

    doc.version = read_version + 1;
    store.write(&doc, Some(read_version))?;
    tracing::info!(
        repository = %doc.repository_id,
        removed = removed.len(),
        version = doc.version,
        "cleaned stale assignments"
    );
    Ok(CleanOutcome {
        removed,
        version: doc.version,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claim::{ClaimRequest, RepoIdentity, claim_plan};
    use crate::paths::CoordPaths;
    use chrono::TimeZone;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, 9, 26, 53).unwrap()
    }

    fn entry_updated_at(updated_at: DateTime<Utc>) -> AssignmentEntry {
        let mut entry = AssignmentEntry::first_claim("/ws/a", Some("alice"), None, None, updated_at);
        entry.updated_at = updated_at;
        entry
    }

    #[test]
    fn staleness_boundary_is_inclusive() {
        let threshold_days = 30;
        let reference = ts();

        let exactly = entry_updated_at(reference - Duration::days(threshold_days));
        assert!(is_stale_assignment(&exactly, threshold_days, reference));

        let just_under =
            entry_updated_at(reference - Duration::days(threshold_days) + Duration::milliseconds(1));
        assert!(!is_stale_assignment(&just_under, threshold_days, reference));

        let over = entry_updated_at(reference - Duration::days(threshold_days) - Duration::seconds(1));
        assert!(is_stale_assignment(&over, threshold_days, reference));
    }

    #[test]
    fn marker_staleness_boundary_is_inclusive() {
        let threshold = Duration::minutes(5);
        assert!(is_marker_stale(Duration::minutes(5), threshold));
        assert!(is_marker_stale(Duration::minutes(6), threshold));
        assert!(!is_marker_stale(
            Duration::minutes(5) - Duration::milliseconds(1),
            threshold
        ));
    }

    #[test]
    fn find_stale_filters_by_updated_at() {
        let mut doc = AssignmentsDoc::new("repo-a", None);
        let old = Uuid::parse_str("00000000-0000-4000-8000-000000000001").expect("uuid");
        let fresh = Uuid::parse_str("00000000-0000-4000-8000-000000000002").expect("uuid");
        doc.assignments
            .insert(old, entry_updated_at(ts() - Duration::days(45)));
        doc.assignments
            .insert(fresh, entry_updated_at(ts() - Duration::days(2)));

        let stale = find_stale(&doc, 30, ts());
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].0, old);
    }

    #[test]
    fn clean_removes_listed_entries_in_one_write() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = Store::new(CoordPaths::new(dir.path()));
        let repo = RepoIdentity {
            id: "repo-a".to_string(),
            remote_url: None,
        };
        let old = Uuid::parse_str("00000000-0000-4000-8000-000000000001").expect("uuid");
        let fresh = Uuid::parse_str("00000000-0000-4000-8000-000000000002").expect("uuid");
        for (uuid, when) in [(old, ts() - Duration::days(45)), (fresh, ts())] {
            claim_plan(
                &store,
                &repo,
                &ClaimRequest {
                    plan_uuid: uuid,
                    workspace: "/ws/a",
                    user: Some("alice"),
                    plan_id: None,
                    status: None,
                },
                when,
            )
            .expect("claim");
        }

        let doc = store.read("repo-a").expect("read");
        let stale: Vec<Uuid> = find_stale(&doc, 30, ts()).iter().map(|(u, _)| *u).collect();
        assert_eq!(stale, vec![old]);

        let outcome = remove_entries(&store, &doc, &stale).expect("clean");
        assert_eq!(outcome.removed, vec![old]);
        assert_eq!(outcome.version, 3);

        let after = store.read("repo-a").expect("read");
        assert!(!after.assignments.contains_key(&old));
        assert!(after.assignments.contains_key(&fresh));
    }

    #[test]
    fn clean_aborts_on_concurrent_change() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = Store::new(CoordPaths::new(dir.path()));
        let repo = RepoIdentity {
            id: "repo-a".to_string(),
            remote_url: None,
        };
        let old = Uuid::parse_str("00000000-0000-4000-8000-000000000001").expect("uuid");
        claim_plan(
            &store,
            &repo,
            &ClaimRequest {
                plan_uuid: old,
                workspace: "/ws/a",
                user: Some("alice"),
                plan_id: None,
                status: None,
            },
            ts() - Duration::days(45),
        )
        .expect("claim");

        let listed = store.read("repo-a").expect("listing read");

        // Another process writes between listing and cleanup.
        claim_plan(
            &store,
            &repo,
            &ClaimRequest {
                plan_uuid: old,
                workspace: "/ws/b",
                user: Some("bob"),
                plan_id: None,
                status: None,
            },
            ts(),
        )
        .expect("concurrent claim");

        let err = remove_entries(&store, &listed, &[old]).expect_err("must conflict");
        assert!(err.is_recoverable());
        // Nothing was removed.
        assert!(store
            .read("repo-a")
            .expect("read")
            .assignments
            .contains_key(&old));
    }

    #[test]
    fn clean_with_no_matches_does_not_write() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = Store::new(CoordPaths::new(dir.path()));
        let doc = AssignmentsDoc::new("repo-a", None);
        let outcome = remove_entries(&store, &doc, &[]).expect("clean");
        assert!(outcome.removed.is_empty());
        assert_eq!(outcome.version, 0);
        assert!(!store
            .paths()
            .assignments_path("repo-a")
            .expect("path")
            .exists());
    }
}
