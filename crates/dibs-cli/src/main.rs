#![forbid(unsafe_code)]

mod cmd;
mod output;
mod repo;
mod user;

use clap::{Parser, Subcommand};
use dibs_core::paths::CoordPaths;
use output::OutputMode;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "dibs: plan claims and workspace locks over a shared filesystem",
    long_about = None
)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON output instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,

    /// Override user identity (skips env resolution).
    #[arg(long, global = true)]
    user: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    fn output_mode(&self) -> OutputMode {
        output::resolve_output_mode(self.json)
    }

    fn user_flag(&self) -> Option<&str> {
        self.user.as_deref()
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        next_help_heading = "Assignments",
        about = "Claim a plan for this workspace",
        long_about = "Add this workspace (and the resolved user) to a plan's assignment.",
        after_help = "EXAMPLES:\n    # Claim a plan\n    dibs claim 7f5a1f2e-93c4-4c59-9aa1-0f6a1c2d3e4f\n\n    # Record the numeric plan id alongside the UUID\n    dibs claim 7f5a1f2e-93c4-4c59-9aa1-0f6a1c2d3e4f --plan-id 42\n\n    # Emit machine-readable output\n    dibs claim 7f5a1f2e-93c4-4c59-9aa1-0f6a1c2d3e4f --json"
    )]
    Claim(cmd::claim::ClaimArgs),

    #[command(
        next_help_heading = "Assignments",
        about = "Release a plan from this workspace",
        long_about = "Remove this workspace (and the resolved user) from a plan's assignment.",
        after_help = "EXAMPLES:\n    # Release a plan\n    dibs release 7f5a1f2e-93c4-4c59-9aa1-0f6a1c2d3e4f\n\n    # Emit machine-readable output\n    dibs release 7f5a1f2e-93c4-4c59-9aa1-0f6a1c2d3e4f --json"
    )]
    Release(cmd::release::ReleaseArgs),

    #[command(
        next_help_heading = "Assignments",
        about = "List assignments for this repository",
        after_help = "EXAMPLES:\n    # List all assignments\n    dibs list\n\n    # Only assignments untouched for two weeks\n    dibs list --stale-days 14\n\n    # Emit machine-readable output\n    dibs list --json"
    )]
    List(cmd::list::ListArgs),

    #[command(
        next_help_heading = "Assignments",
        about = "Remove stale assignments",
        long_about = "Remove assignments nobody has touched within the staleness threshold, \
                      in one atomic, version-checked write.",
        after_help = "EXAMPLES:\n    # Interactive cleanup with the configured threshold\n    dibs clean\n\n    # Scripted cleanup\n    dibs clean --stale-days 30 --yes"
    )]
    Clean(cmd::clean::CleanArgs),

    #[command(
        next_help_heading = "Workspace",
        about = "Take the workspace execution lock",
        after_help = "EXAMPLES:\n    # Lock for one agent run\n    dibs lock --command \"agent run\"\n\n    # Lock across commands until an explicit unlock\n    dibs lock --persistent"
    )]
    Lock(cmd::lock::LockArgs),

    #[command(
        next_help_heading = "Workspace",
        about = "Release the workspace execution lock",
        after_help = "EXAMPLES:\n    # Release our own lock\n    dibs unlock\n\n    # Clear a crashed process's lock\n    dibs unlock --force"
    )]
    Unlock(cmd::lock::UnlockArgs),

    #[command(
        next_help_heading = "Workspace",
        about = "Show the workspace execution lock",
        after_help = "EXAMPLES:\n    dibs lock-status\n    dibs lock-status --json"
    )]
    LockStatus,

    #[command(
        next_help_heading = "Maintenance",
        about = "Generate shell completion scripts",
        after_help = "EXAMPLES:\n    dibs completions bash\n    dibs completions zsh"
    )]
    Completions(cmd::completions::CompletionsArgs),
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "dibs=debug" } else { "dibs=warn" };
    let filter = EnvFilter::try_from_env("DIBS_LOG").unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let output = cli.output_mode();

    if let Commands::Completions(args) = &cli.command {
        cmd::completions::run::<Cli>(args);
        return Ok(());
    }

    let paths = CoordPaths::from_env()?;
    let cwd = std::env::current_dir()?;
    let repo = repo::resolve_repo(&cwd)?;
    let user = user::resolve_user(cli.user_flag());

    match &cli.command {
        Commands::Claim(args) => {
            cmd::claim::run(args, &paths, &repo, user.as_deref(), output)
        }
        Commands::Release(args) => {
            cmd::release::run(args, &paths, &repo, user.as_deref(), output)
        }
        Commands::List(args) => cmd::list::run(args, &paths, &repo, output),
        Commands::Clean(args) => cmd::clean::run(args, &paths, &repo, output),
        Commands::Lock(args) => cmd::lock::run_lock(args, &paths, &repo, output),
        Commands::Unlock(args) => cmd::lock::run_unlock(args, &repo, output),
        Commands::LockStatus => cmd::lock::run_status(&paths, &repo, output),
        Commands::Completions(_) => unreachable!("handled above"),
    }
}
