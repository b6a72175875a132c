//! `dibs list` — show the assignments for this repository.

use crate::output::{CliError, OutputMode, render, render_error};
use crate::repo::ResolvedRepo;
use anyhow::Result;
use chrono::Utc;
use clap::Args;
use dibs_core::config::load_config;
use dibs_core::paths::CoordPaths;
use dibs_core::stale::is_stale_assignment;
use dibs_core::store::Store;
use serde::Serialize;
use uuid::Uuid;

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Only show assignments untouched for at least this many days.
    #[arg(long)]
    pub stale_days: Option<i64>,
}

#[derive(Debug, Serialize)]
struct ListRow {
    plan: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    plan_id: Option<i64>,
    workspaces: Vec<String>,
    users: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<String>,
    updated_at: String,
}

#[derive(Debug, Serialize)]
struct ListOutput {
    ok: bool,
    repository: String,
    version: u64,
    assignments: Vec<ListRow>,
}

pub fn run(
    args: &ListArgs,
    paths: &CoordPaths,
    repo: &ResolvedRepo,
    output: OutputMode,
) -> Result<()> {
    let config = load_config(paths)?;
    let store = Store::new(paths.clone()).with_mutex_options(config.mutex.to_options());

    let doc = match store.read(&repo.identity.id) {
        Ok(doc) => doc,
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
    };

    let now = Utc::now();
    let rows: Vec<ListRow> = doc
        .assignments
        .iter()
        .filter(|(_, entry)| {
            args.stale_days
                .is_none_or(|days| is_stale_assignment(entry, days, now))
        })
        .map(|(uuid, entry)| ListRow {
            plan: *uuid,
            plan_id: entry.plan_id,
            workspaces: entry.workspace_paths.iter().cloned().collect(),
            users: entry.users.iter().cloned().collect(),
            status: entry.status.clone(),
            updated_at: entry.updated_at.to_rfc3339(),
        })
        .collect();

    let result = ListOutput {
        ok: true,
        repository: repo.identity.id.clone(),
        version: doc.version,
        assignments: rows,
    };

    render(output, &result, |r, w| {
        if r.assignments.is_empty() {
            return writeln!(w, "no assignments for {}", r.repository);
        }
        writeln!(w, "{} (v{})", r.repository, r.version)?;
        for row in &r.assignments {
            let plan_id = row
                .plan_id
                .map_or_else(|| "-".to_string(), |id| id.to_string());
            writeln!(
                w,
                "{}  #{:<6} {:<12} {}",
                row.plan,
                plan_id,
                row.status.as_deref().unwrap_or("-"),
                row.updated_at
            )?;
            if !row.workspaces.is_empty() {
                writeln!(w, "    workspaces: {}", row.workspaces.join(", "))?;
            }
            if !row.users.is_empty() {
                writeln!(w, "    users: {}", row.users.join(", "))?;
            }
        }
        Ok(())
    })?;
    Ok(())
}
