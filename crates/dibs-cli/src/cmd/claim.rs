//! `dibs claim` — add this workspace (and user) to a plan's assignment.
//!
//! Claiming is collaborative: other holders are surfaced as warnings, never
//! as failures. With `--auto`, the command defers to the auto-claim
//! configuration and exits quietly when auto-claiming is disabled.

use crate::output::{CliError, OutputMode, render, render_error, render_warnings};
use crate::repo::ResolvedRepo;
use anyhow::Result;
use chrono::Utc;
use clap::Args;
use dibs_core::claim::{ClaimRequest, claim_plan, effective_auto_claim};
use dibs_core::config::load_config;
use dibs_core::paths::CoordPaths;
use dibs_core::store::Store;
use serde::Serialize;
use uuid::Uuid;

/// Environment opt-out consulted by `--auto` claims.
pub const NO_AUTO_CLAIM_ENV: &str = "DIBS_NO_AUTO_CLAIM";

#[derive(Args, Debug)]
pub struct ClaimArgs {
    /// Plan UUID to claim.
    pub uuid: Uuid,

    /// Numeric plan id to record alongside the UUID (display only).
    #[arg(long)]
    pub plan_id: Option<i64>,

    /// Plan status to record, informational.
    #[arg(long)]
    pub status: Option<String>,

    /// Only claim when auto-claim is enabled (for agent integrations).
    #[arg(long)]
    pub auto: bool,
}

#[derive(Debug, Serialize)]
struct ClaimOutput {
    ok: bool,
    plan: Uuid,
    workspace: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    user: Option<String>,
    created: bool,
    added_workspace: bool,
    added_user: bool,
    persisted: bool,
    version: u64,
    warnings: Vec<String>,
}

#[derive(Debug, Serialize)]
struct SkippedOutput {
    ok: bool,
    skipped: bool,
    reason: &'static str,
}

pub fn run(
    args: &ClaimArgs,
    paths: &CoordPaths,
    repo: &ResolvedRepo,
    user: Option<&str>,
    output: OutputMode,
) -> Result<()> {
    let config = load_config(paths)?;

    if args.auto {
        let opt_out = std::env::var(NO_AUTO_CLAIM_ENV).ok();
        if !effective_auto_claim(config.auto_claim, opt_out.as_deref()) {
            let result = SkippedOutput {
                ok: true,
                skipped: true,
                reason: "auto-claim disabled",
            };
            render(output, &result, |_, w| {
                writeln!(w, "auto-claim disabled; not claiming")
            })?;
            return Ok(());
        }
    }

    let workspace = repo.git_root.to_string_lossy().into_owned();
    let store = Store::new(paths.clone()).with_mutex_options(config.mutex.to_options());
    let request = ClaimRequest {
        plan_uuid: args.uuid,
        workspace: &workspace,
        user,
        plan_id: args.plan_id,
        status: args.status.as_deref(),
    };

    match claim_plan(&store, &repo.identity, &request, Utc::now()) {
        Ok(outcome) => {
            render_warnings(output, &outcome.warnings)?;
            let result = ClaimOutput {
                ok: true,
                plan: args.uuid,
                workspace,
                user: user.map(ToString::to_string),
                created: outcome.created,
                added_workspace: outcome.added_workspace,
                added_user: outcome.added_user,
                persisted: outcome.persisted,
                version: outcome.version,
                warnings: outcome.warnings,
            };
            render(output, &result, |r, w| {
                if r.created {
                    writeln!(w, "✓ claimed plan {} (v{})", r.plan, r.version)
                } else if r.persisted {
                    writeln!(w, "✓ joined plan {} (v{})", r.plan, r.version)
                } else {
                    writeln!(w, "plan {} already claimed by this workspace", r.plan)
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
