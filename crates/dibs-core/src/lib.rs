//! dibs-core: the plan-assignment and workspace-locking subsystem.
//!
//! Multiple CLI processes coordinate through a filesystem-resident config
//! area: a versioned assignments document per repository, guarded by a
//! short-lived marker-file mutex and an optimistic version check, plus a
//! separate per-workspace execution lock with crash detection.
//!
//! # Conventions
//!
//! - **Errors**: typed `thiserror` enums per layer; `anyhow::Result` at the
//!   config/CLI boundary.
//! - **Logging**: `tracing` macros (`info!`, `warn!`, `debug!`).

pub mod claim;
pub mod config;
pub mod document;
pub mod error;
pub mod mutex;
pub mod paths;
pub mod recovery;
pub mod stale;
pub mod store;
pub mod wslock;

pub use claim::{ClaimOutcome, ClaimRequest, ReleaseOutcome, RepoIdentity, claim_plan, release_plan};
pub use document::{AssignmentEntry, AssignmentsDoc};
pub use error::ErrorCode;
pub use paths::CoordPaths;
pub use store::{Store, StoreError};
