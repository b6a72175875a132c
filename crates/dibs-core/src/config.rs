use crate::mutex::MutexOptions;
use crate::paths::CoordPaths;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Coordination settings, loaded from `<configRoot>/config.toml`.
///
/// Every field has a default so an absent file means default behavior; a
/// present-but-broken file is an error, never silently ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordConfig {
    /// Claim plans automatically when an agent starts work on them.
    #[serde(default = "default_true")]
    pub auto_claim: bool,
    /// Age in days after which an assignment counts as abandoned.
    #[serde(default = "default_stale_assignment_days")]
    pub stale_assignment_days: i64,
    /// Age in minutes after which a workspace execution lock counts as
    /// abandoned.
    #[serde(default = "default_workspace_lock_stale_minutes")]
    pub workspace_lock_stale_minutes: i64,
    #[serde(default)]
    pub mutex: MutexTuning,
}

impl Default for CoordConfig {
    fn default() -> Self {
        Self {
            auto_claim: default_true(),
            stale_assignment_days: default_stale_assignment_days(),
            workspace_lock_stale_minutes: default_workspace_lock_stale_minutes(),
            mutex: MutexTuning::default(),
        }
    }
}

/// Mutex timing, in config-file-friendly integer fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutexTuning {
    #[serde(default = "default_mutex_stale_secs")]
    pub stale_secs: u64,
    #[serde(default = "default_mutex_retry_ms")]
    pub retry_ms: u64,
    #[serde(default = "default_mutex_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for MutexTuning {
    fn default() -> Self {
        Self {
            stale_secs: default_mutex_stale_secs(),
            retry_ms: default_mutex_retry_ms(),
            timeout_ms: default_mutex_timeout_ms(),
        }
    }
}

impl MutexTuning {
    /// Convert to the mutex layer's option struct.
    #[must_use]
    pub const fn to_options(&self) -> MutexOptions {
        MutexOptions {
            stale_after: Duration::from_secs(self.stale_secs),
            retry_interval: Duration::from_millis(self.retry_ms),
            timeout: Duration::from_millis(self.timeout_ms),
        }
    }
}

impl CoordConfig {
    /// Workspace-lock staleness threshold as a chrono duration.
    #[must_use]
    pub fn workspace_lock_max_age(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.workspace_lock_stale_minutes)
    }
}

/// Load the coordination config under the given paths. Absent file means
/// defaults.
pub fn load_config(paths: &CoordPaths) -> Result<CoordConfig> {
    let path = paths.config_file();
    if !path.exists() {
        return Ok(CoordConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<CoordConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

const fn default_true() -> bool {
    true
}

const fn default_stale_assignment_days() -> i64 {
    30
}

const fn default_workspace_lock_stale_minutes() -> i64 {
    30
}

const fn default_mutex_stale_secs() -> u64 {
    300
}

const fn default_mutex_retry_ms() -> u64 {
    25
}

const fn default_mutex_timeout_ms() -> u64 {
    2000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_config_uses_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&CoordPaths::new(dir.path())).expect("load");
        assert!(cfg.auto_claim);
        assert_eq!(cfg.stale_assignment_days, 30);
        assert_eq!(cfg.workspace_lock_stale_minutes, 30);
        assert_eq!(cfg.mutex.stale_secs, 300);
        assert_eq!(cfg.mutex.retry_ms, 25);
        assert_eq!(cfg.mutex.timeout_ms, 2000);
    }

    #[test]
    fn partial_config_keeps_other_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(
            dir.path().join("config.toml"),
            "auto_claim = false\n\n[mutex]\ntimeout_ms = 5000\n",
        )
        .expect("write config");

        let cfg = load_config(&CoordPaths::new(dir.path())).expect("load");
        assert!(!cfg.auto_claim);
        assert_eq!(cfg.stale_assignment_days, 30);
        assert_eq!(cfg.mutex.timeout_ms, 5000);
        assert_eq!(cfg.mutex.retry_ms, 25);
    }

    #[test]
    fn broken_config_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("config.toml"), "auto_claim = maybe\n")
            .expect("write config");
        assert!(load_config(&CoordPaths::new(dir.path())).is_err());
    }

    #[test]
    fn mutex_tuning_converts_to_options() {
        let tuning = MutexTuning {
            stale_secs: 10,
            retry_ms: 7,
            timeout_ms: 900,
        };
        let options = tuning.to_options();
        assert_eq!(options.stale_after, Duration::from_secs(10));
        assert_eq!(options.retry_interval, Duration::from_millis(7));
        assert_eq!(options.timeout, Duration::from_millis(900));
    }
}
