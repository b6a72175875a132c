//! `dibs lock` / `dibs unlock` / `dibs lock-status` — the per-workspace
//! execution lock. Independent of plan claims: it guards the working tree
//! itself against two agents running in it at once.

use crate::output::{CliError, OutputMode, render, render_error};
use crate::repo::ResolvedRepo;
use anyhow::Result;
use chrono::Utc;
use clap::Args;
use dibs_core::config::load_config;
use dibs_core::paths::CoordPaths;
use dibs_core::wslock::{self, LockType, WorkspaceLock, WsLockError};
use serde::Serialize;

#[derive(Args, Debug)]
pub struct LockArgs {
    /// Command line to record in the lock for diagnostics.
    #[arg(long)]
    pub command: Option<String>,

    /// Keep the lock across commands until an explicit unlock.
    #[arg(long)]
    pub persistent: bool,
}

#[derive(Args, Debug)]
pub struct UnlockArgs {
    /// Remove the lock even if owned by another process (administrative).
    #[arg(long)]
    pub force: bool,
}

#[derive(Debug, Serialize)]
struct LockOutput {
    ok: bool,
    workspace: String,
    pid: u32,
    #[serde(rename = "type")]
    lock_type: String,
}

#[derive(Debug, Serialize)]
struct UnlockOutput {
    ok: bool,
    workspace: String,
    removed: bool,
}

#[derive(Debug, Serialize)]
struct StatusOutput {
    ok: bool,
    workspace: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    lock: Option<WorkspaceLock>,
    stale: bool,
}

fn fail(output: OutputMode, err: &WsLockError) -> anyhow::Error {
    let code = err.code();
    let message = err.to_string();
    let _ = render_error(
        output,
        &CliError {
            ok: false,
            error: &message,
            hint: code.hint(),
            code: code.code(),
        },
    );
    anyhow::anyhow!(message)
}

pub fn run_lock(
    args: &LockArgs,
    paths: &CoordPaths,
    repo: &ResolvedRepo,
    output: OutputMode,
) -> Result<()> {
    let config = load_config(paths)?;
    let lock_type = if args.persistent {
        LockType::Persistent
    } else {
        LockType::Transient
    };
    let command = args.command.as_deref().unwrap_or("dibs lock");

    let record = wslock::acquire_lock(
        &repo.git_root,
        command,
        lock_type,
        config.workspace_lock_max_age(),
        Utc::now(),
    )
    .map_err(|e| fail(output, &e))?;

    let result = LockOutput {
        ok: true,
        workspace: repo.git_root.to_string_lossy().into_owned(),
        pid: record.pid,
        lock_type: record.lock_type.to_string(),
    };
    render(output, &result, |r, w| {
        writeln!(w, "✓ locked {} ({}, pid {})", r.workspace, r.lock_type, r.pid)
    })?;
    Ok(())
}

pub fn run_unlock(
    args: &UnlockArgs,
    repo: &ResolvedRepo,
    output: OutputMode,
) -> Result<()> {
    let removed =
        wslock::release_lock(&repo.git_root, args.force).map_err(|e| fail(output, &e))?;

    let result = UnlockOutput {
        ok: true,
        workspace: repo.git_root.to_string_lossy().into_owned(),
        removed,
    };
    render(output, &result, |r, w| {
        if r.removed {
            writeln!(w, "✓ unlocked {}", r.workspace)
        } else {
            writeln!(w, "{} was not locked", r.workspace)
        }
    })?;
    Ok(())
}

pub fn run_status(paths: &CoordPaths, repo: &ResolvedRepo, output: OutputMode) -> Result<()> {
    let config = load_config(paths)?;
    let lock = wslock::lock_info(&repo.git_root).map_err(|e| fail(output, &e))?;
    let stale = lock
        .as_ref()
        .is_some_and(|record| {
            wslock::is_lock_stale(record, config.workspace_lock_max_age(), Utc::now())
        });

    let result = StatusOutput {
        ok: true,
        workspace: repo.git_root.to_string_lossy().into_owned(),
        lock,
        stale,
    };
    render(output, &result, |r, w| match &r.lock {
        None => writeln!(w, "{} is unlocked", r.workspace),
        Some(record) => {
            writeln!(
                w,
                "{} locked by pid {} on {} ({}, since {}){}",
                r.workspace,
                record.pid,
                record.hostname,
                record.lock_type,
                record.started_at.to_rfc3339(),
                if r.stale { " [stale]" } else { "" }
            )
        }
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::process::Command;

    fn git_workspace(dir: &Path) -> ResolvedRepo {
        let status = Command::new("git")
            .args(["init", "--quiet"])
            .current_dir(dir)
            .status()
            .expect("git init");
        assert!(status.success());
        crate::repo::resolve_repo(dir).expect("resolve")
    }

    #[test]
    fn lock_args_parse() {
        use clap::Parser;

        #[derive(Parser)]
        struct Wrapper {
            #[command(flatten)]
            args: LockArgs,
        }

        let w = Wrapper::parse_from(["test", "--command", "agent run", "--persistent"]);
        assert_eq!(w.args.command.as_deref(), Some("agent run"));
        assert!(w.args.persistent);
    }

    #[test]
    fn lock_unlock_cycle() {
        let root = tempfile::tempdir().expect("config root");
        let ws = tempfile::tempdir().expect("workspace");
        let repo = git_workspace(ws.path());
        let paths = CoordPaths::new(root.path());

        run_lock(
            &LockArgs {
                command: Some("agent run".to_string()),
                persistent: false,
            },
            &paths,
            &repo,
            OutputMode::Json,
        )
        .expect("lock");

        let info = wslock::lock_info(&repo.git_root).expect("info").expect("present");
        assert_eq!(info.pid, std::process::id());
        assert_eq!(info.command, "agent run");

        // A second lock attempt by anyone while we are alive fails.
        run_lock(
            &LockArgs {
                command: None,
                persistent: false,
            },
            &paths,
            &repo,
            OutputMode::Json,
        )
        .expect_err("second lock must fail");

        run_unlock(&UnlockArgs { force: false }, &repo, OutputMode::Json).expect("unlock");
        assert!(wslock::lock_info(&repo.git_root).expect("info").is_none());
    }

    #[test]
    fn unlock_of_unlocked_workspace_reports_removed_false() {
        let ws = tempfile::tempdir().expect("workspace");
        let repo = git_workspace(ws.path());
        run_unlock(&UnlockArgs { force: false }, &repo, OutputMode::Json).expect("unlock");
    }
}
