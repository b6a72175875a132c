//! `dibs release` — remove this workspace (and user) from a plan's
//! assignment. Deletes the assignment entirely when the last holder leaves.

use crate::output::{CliError, OutputMode, render, render_error, render_warnings};
use crate::repo::ResolvedRepo;
use anyhow::Result;
use chrono::Utc;
use clap::Args;
use dibs_core::claim::release_plan;
use dibs_core::config::load_config;
use dibs_core::paths::CoordPaths;
use dibs_core::store::Store;
use serde::Serialize;
use uuid::Uuid;

#[derive(Args, Debug)]
pub struct ReleaseArgs {
    /// Plan UUID to release.
    pub uuid: Uuid,
}

#[derive(Debug, Serialize)]
struct ReleaseOutput {
    ok: bool,
    plan: Uuid,
    existed: bool,
    removed_workspace: bool,
    removed_user: bool,
    entry_removed: bool,
    persisted: bool,
    version: u64,
    warnings: Vec<String>,
}

pub fn run(
    args: &ReleaseArgs,
    paths: &CoordPaths,
    repo: &ResolvedRepo,
    user: Option<&str>,
    output: OutputMode,
) -> Result<()> {
    let config = load_config(paths)?;
    let workspace = repo.git_root.to_string_lossy().into_owned();
    let store = Store::new(paths.clone()).with_mutex_options(config.mutex.to_options());

    match release_plan(
        &store,
        &repo.identity.id,
        args.uuid,
        &workspace,
        user,
        Utc::now(),
    ) {
        Ok(outcome) => {
            render_warnings(output, &outcome.warnings)?;
            let result = ReleaseOutput {
                ok: true,
                plan: args.uuid,
                existed: outcome.existed,
                removed_workspace: outcome.removed_workspace,
                removed_user: outcome.removed_user,
                entry_removed: outcome.entry_removed,
                persisted: outcome.persisted,
                version: outcome.version,
                warnings: outcome.warnings,
            };
            render(output, &result, |r, w| {
                if !r.existed {
                    writeln!(w, "plan {} was not claimed", r.plan)
                } else if r.entry_removed {
                    writeln!(w, "✓ released plan {} (no holders remain, v{})", r.plan, r.version)
                } else if r.persisted {
                    writeln!(w, "✓ released plan {} (v{})", r.plan, r.version)
                } else {
                    writeln!(w, "plan {} was not claimed by this workspace", r.plan)
                }
            })?;
            Ok(())
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
