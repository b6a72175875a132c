//! User identity resolution for CLI commands.
//!
//! The resolution chain: `--user` flag > `DIBS_USER` env > `USER` env (TTY
//! only). Claims work without a user (workspace-only), but a resolved user
//! makes ownership visible to teammates, so commands warn when none is
//! found.

use std::env;

/// Environment reader seam for tests.
trait EnvReader {
    fn get(&self, key: &str) -> Option<String>;
    fn is_tty(&self) -> bool;
}

struct RealEnv;

impl EnvReader for RealEnv {
    fn get(&self, key: &str) -> Option<String> {
        env::var(key).ok().filter(|v| !v.is_empty())
    }

    fn is_tty(&self) -> bool {
        use std::io::IsTerminal;
        std::io::stdin().is_terminal()
    }
}

fn resolve_user_with(cli_flag: Option<&str>, env: &dyn EnvReader) -> Option<String> {
    if let Some(user) = cli_flag.filter(|u| !u.is_empty()) {
        return Some(user.to_string());
    }
    if let Some(user) = env.get("DIBS_USER") {
        return Some(user);
    }
    // USER is only trusted interactively; agents must identify explicitly.
    if env.is_tty() {
        if let Some(user) = env.get("USER") {
            return Some(user);
        }
    }
    None
}

/// Resolve the acting user, or `None` when no identity is available.
#[must_use]
pub fn resolve_user(cli_flag: Option<&str>) -> Option<String> {
    resolve_user_with(cli_flag, &RealEnv)
}
