//! Shared output layer for human/JSON parity across all CLI commands.
//!
//! Every command handler receives an [`OutputMode`] and formats its result
//! accordingly. Resolution precedence (highest wins):
//! 1. `--json` flag
//! 2. `DIBS_FORMAT` env var → `"human"` | `"json"`
//! 3. Default: human.

use serde::Serialize;
use std::io::{self, Write};

/// Output modes supported by the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Human-readable text.
    Human,
    /// Machine-readable JSON, one object per result.
    Json,
}

impl OutputMode {
    /// Returns `true` if JSON output was requested.
    #[must_use]
    pub fn is_json(self) -> bool {
        matches!(self, Self::Json)
    }
}

/// Resolve the output mode from the CLI flag and environment.
#[must_use]
pub fn resolve_output_mode(json_flag: bool) -> OutputMode {
    resolve_output_mode_inner(json_flag, std::env::var("DIBS_FORMAT").ok().as_deref())
}

fn resolve_output_mode_inner(json_flag: bool, format_env: Option<&str>) -> OutputMode {
    if json_flag {
        return OutputMode::Json;
    }
    match format_env.map(str::to_lowercase).as_deref() {
        Some("json") => OutputMode::Json,
        // Unknown values fall through to the default.
        _ => OutputMode::Human,
    }
}

/// Render a serializable result: JSON verbatim, or through the provided
/// human formatter.
pub fn render<T, F>(mode: OutputMode, value: &T, human: F) -> io::Result<()>
where
    T: Serialize,
    F: FnOnce(&T, &mut dyn Write) -> io::Result<()>,
{
    let stdout = io::stdout();
    let mut out = stdout.lock();
    match mode {
        OutputMode::Json => {
            serde_json::to_writer(&mut out, value)?;
            writeln!(out)
        }
        OutputMode::Human => human(value, &mut out),
    }
}

/// Machine-parseable error payload surfaced on every failure path.
#[derive(Debug, Serialize)]
pub struct CliError<'a> {
    pub ok: bool,
    pub error: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<&'a str>,
    pub code: &'a str,
}

impl<'a> CliError<'a> {
    #[allow(dead_code)]
    #[must_use]
    pub fn new(message: &'a str, code: &'a str) -> Self {
        Self {
            ok: false,
            error: message,
            hint: None,
            code,
        }
    }

    #[allow(dead_code)]
    #[must_use]
    pub fn with_hint(message: &'a str, hint: &'a str, code: &'a str) -> Self {
        Self {
            ok: false,
            error: message,
            hint: Some(hint),
            code,
        }
    }
}

/// Render an error to stderr (human) or stdout (JSON, so pipelines see one
/// stream of objects).
pub fn render_error(mode: OutputMode, err: &CliError<'_>) -> io::Result<()> {
    match mode {
        OutputMode::Json => {
            let stdout = io::stdout();
            let mut out = stdout.lock();
            serde_json::to_writer(&mut out, err)?;
            writeln!(out)
        }
        OutputMode::Human => {
            let stderr = io::stderr();
            let mut out = stderr.lock();
            writeln!(out, "error[{}]: {}", err.code, err.error)?;
            if let Some(hint) = err.hint {
                writeln!(out, "  hint: {hint}")?;
            }
            Ok(())
        }
    }
}

/// Print claim/release warnings on the human path; JSON consumers read them
/// from the result object instead.
pub fn render_warnings(mode: OutputMode, warnings: &[String]) -> io::Result<()> {
    if mode.is_json() {
        return Ok(());
    }
    let stderr = io::stderr();
    let mut out = stderr.lock();
    for warning in warnings {
        writeln!(out, "warning: {warning}")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_flag_wins_over_env() {
        assert_eq!(
            resolve_output_mode_inner(true, Some("human")),
            OutputMode::Json
        );
    }

    #[test]
    fn env_selects_json() {
        assert_eq!(
            resolve_output_mode_inner(false, Some("json")),
            OutputMode::Json
        );
        assert_eq!(
            resolve_output_mode_inner(false, Some("JSON")),
            OutputMode::Json
        );
    }

    #[test]
    fn unknown_env_falls_back_to_human() {
        assert_eq!(
            resolve_output_mode_inner(false, Some("yaml")),
            OutputMode::Human
        );
        assert_eq!(resolve_output_mode_inner(false, None), OutputMode::Human);
    }

    #[test]
    fn cli_error_serializes_with_code_and_hint() {
        let err = CliError::with_hint("boom", "try again", "E2001");
        let json = serde_json::to_string(&err).expect("serialize");
        assert!(json.contains("\"ok\":false"));
        assert!(json.contains("\"code\":\"E2001\""));
        assert!(json.contains("\"hint\":\"try again\""));

        let bare = CliError::new("boom", "E9001");
        let json = serde_json::to_string(&bare).expect("serialize");
        assert!(!json.contains("hint"));
    }
}
