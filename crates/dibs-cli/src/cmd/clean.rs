//! `dibs clean` — remove assignments nobody has touched in a while.
//!
//! Listing and removal are two steps; the removal write is pinned to the
//! version read at listing time, so concurrent traffic aborts the cleanup
//! whole rather than leaving a partial result.

use crate::output::{CliError, OutputMode, render, render_error};
use crate::repo::ResolvedRepo;
use anyhow::Result;
use chrono::Utc;
use clap::Args;
use dibs_core::config::load_config;
use dibs_core::paths::CoordPaths;
use dibs_core::stale::{find_stale, remove_entries};
use dibs_core::store::Store;
use serde::Serialize;
use std::io::{BufRead, IsTerminal, Write};
use uuid::Uuid;

#[derive(Args, Debug)]
pub struct CleanArgs {
    /// Staleness threshold in days (defaults to the configured value).
    #[arg(long)]
    pub stale_days: Option<i64>,

    /// Skip the confirmation prompt.
    #[arg(short = 'y', long)]
    pub yes: bool,
}

#[derive(Debug, Serialize)]
struct CleanOutput {
    ok: bool,
    removed: Vec<Uuid>,
    version: u64,
}

pub fn run(
    args: &CleanArgs,
    paths: &CoordPaths,
    repo: &ResolvedRepo,
    output: OutputMode,
) -> Result<()> {
    let config = load_config(paths)?;
    let threshold_days = args.stale_days.unwrap_or(config.stale_assignment_days);
    let store = Store::new(paths.clone()).with_mutex_options(config.mutex.to_options());
    let now = Utc::now();

    let doc = store.read(&repo.identity.id)?;
    let stale: Vec<Uuid> = find_stale(&doc, threshold_days, now)
        .iter()
        .map(|(uuid, _)| *uuid)
        .collect();

    if stale.is_empty() {
        let result = CleanOutput {
            ok: true,
            removed: Vec::new(),
            version: doc.version,
        };
        render(output, &result, |_, w| {
            writeln!(w, "no assignments older than {threshold_days} days")
        })?;
        return Ok(());
    }

    if !args.yes && !confirm(output, &doc, &stale, threshold_days)? {
        anyhow::bail!("aborted");
    }

    match remove_entries(&store, &doc, &stale) {
        Ok(outcome) => {
            let result = CleanOutput {
                ok: true,
                removed: outcome.removed,
                version: outcome.version,
            };
            render(output, &result, |r, w| {
                writeln!(w, "✓ removed {} stale assignment(s) (v{})", r.removed.len(), r.version)
            })?;
            Ok(())
        }
        Err(e) if e.is_recoverable() => {
            let code = e.code();
            let message = format!("{e}; assignments changed during cleanup, re-run `dibs clean`");
            render_error(
                output,
                &CliError {
                    ok: false,
                    error: &message,
                    hint: code.hint(),
                    code: code.code(),
                },
            )?;
            anyhow::bail!(message);
        }
        Err(e) => {
            let code = e.code();
            let message = e.to_string();
            render_error(
                output,
                &CliError {
                    ok: false,
                    error: &message,
                    hint: code.hint(),
                    code: code.code(),
                },
            )?;
            anyhow::bail!(message);
        }
    }
}

/// Show what would be removed and ask. Non-interactive runs must pass
/// `--yes` explicitly.
fn confirm(
    output: OutputMode,
    doc: &dibs_core::AssignmentsDoc,
    stale: &[Uuid],
    threshold_days: i64,
) -> Result<bool> {
    if output.is_json() || !std::io::stdin().is_terminal() {
        anyhow::bail!("{} stale assignment(s) found; pass --yes to remove them", stale.len());
    }

    let stderr = std::io::stderr();
    let mut out = stderr.lock();
    writeln!(out, "assignments older than {threshold_days} days:")?;
    for uuid in stale {
        if let Some(entry) = doc.assignments.get(uuid) {
            writeln!(
                out,
                "  {}  workspaces: {}  updated: {}",
                uuid,
                entry
                    .workspace_paths
                    .iter()
                    .map(String::as_str)
                    .collect::<Vec<_>>()
                    .join(", "),
                entry.updated_at.to_rfc3339()
            )?;
        }
    }
    write!(out, "remove {} assignment(s)? [y/N] ", stale.len())?;
    out.flush()?;

    let mut answer = String::new();
    std::io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}
