//! Repository identity resolution via git.
//!
//! The repository id names the shared assignments file, so it must be the
//! same for every checkout of the same repository: the sanitized `origin`
//! remote URL when one exists, otherwise the sanitized absolute path of the
//! git root (local-only repos coordinate per-path).

use anyhow::{Context, Result, bail};
use dibs_core::claim::RepoIdentity;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Resolved repository identity plus the workspace it was resolved from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRepo {
    pub identity: RepoIdentity,
    /// Absolute path of the git working tree root; doubles as the
    /// workspace path for claims and execution locks.
    pub git_root: PathBuf,
}

/// Resolve repository identity for the working tree containing `start`.
pub fn resolve_repo(start: &Path) -> Result<ResolvedRepo> {
    let git_root = git_stdout(start, &["rev-parse", "--show-toplevel"])?
        .map(PathBuf::from)
        .context("not inside a git repository")?;

    let remote_url = git_stdout(start, &["remote", "get-url", "origin"])?;
    let id = remote_url.as_deref().map_or_else(
        || sanitize_id(&git_root.to_string_lossy()),
        sanitize_id,
    );
    if id.is_empty() {
        bail!("could not derive a repository id from {}", git_root.display());
    }

    tracing::debug!(id = %id, root = %git_root.display(), "resolved repository identity");
    Ok(ResolvedRepo {
        identity: RepoIdentity { id, remote_url },
        git_root,
    })
}

fn git_stdout(cwd: &Path, args: &[&str]) -> Result<Option<String>> {
    let output = Command::new("git")
        .args(args)
        .current_dir(cwd)
        .output()
        .context("failed to run git")?;
    if !output.status.success() {
        return Ok(None);
    }
    let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
    Ok(Some(text).filter(|t| !t.is_empty()))
}

/// Flatten a remote URL or path into a filesystem-safe, stable id.
///
/// `https://github.com/acme/api.git` and `git@github.com:acme/api.git`
/// both become `github-com-acme-api`.
fn sanitize_id(raw: &str) -> String {
    let trimmed = raw
        .trim()
        .trim_end_matches('/')
        .trim_end_matches(".git");
    let without_scheme = trimmed
        .split_once("://")
        .map_or(trimmed, |(_, rest)| rest);
    // `git@host:path` → `host/path`
    let without_user = without_scheme
        .split_once('@')
        .map_or(without_scheme, |(_, rest)| rest)
        .replacen(':', "/", 1);

    let mut id = String::with_capacity(without_user.len());
    let mut last_dash = false;
    for c in without_user.chars() {
        let mapped = if c.is_ascii_alphanumeric() {
            last_dash = false;
            c.to_ascii_lowercase()
        } else if last_dash {
            continue;
        } else {
            last_dash = true;
            '-'
        };
        id.push(mapped);
    }
    id.trim_matches('-').to_string()
}
